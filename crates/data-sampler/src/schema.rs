// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use protobuf::reflect::MessageDescriptor;
use protobuf::MessageFull;

/// Shape of the samples a rule builder compiles against. Fixed at builder
/// construction time; determines which sample origins a compiled rule
/// accepts.
#[derive(Clone, Debug)]
pub enum Schema {
    /// No fixed shape: samples are exposed as string-keyed maps and every
    /// origin is accepted.
    Dynamic,
    /// A fixed message type: only proto-origin samples are accepted.
    Proto(MessageDescriptor),
}

impl Schema {
    pub fn dynamic() -> Self {
        Schema::Dynamic
    }

    pub fn proto<M: MessageFull>() -> Self {
        Schema::Proto(M::descriptor())
    }

    pub fn proto_from_descriptor(descriptor: MessageDescriptor) -> Self {
        Schema::Proto(descriptor)
    }
}
