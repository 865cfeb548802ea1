// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Exporter contract. The engine only depends on this interface; the wire
//! implementation that ships records off-process lives elsewhere.

use std::fmt;
use std::time::SystemTime;

use crate::config::StreamUid;

/// Error returned by an exporter implementation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExportError {
    message: String,
}

impl ExportError {
    pub fn new(message: impl Into<String>) -> Self {
        ExportError {
            message: message.into(),
        }
    }
}

/// What one record carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// A raw matched sample.
    Raw,
    /// A structural digest summary document.
    StructDigest,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Raw => write!(f, "raw"),
            RecordKind::StructDigest => write!(f, "struct-digest"),
        }
    }
}

/// Payload encoding tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordEncoding {
    Json,
}

/// One exportable record produced by the pipeline or a digest worker.
#[derive(Clone, Debug)]
pub struct SamplerRecord {
    /// Name of the resource the producing sampler is attached to.
    pub resource: String,
    /// Name of the producing sampler.
    pub sampler: String,
    pub ts: SystemTime,
    pub kind: RecordKind,
    pub encoding: RecordEncoding,
    /// UIDs of the streams the sample matched, or the digest's target
    /// stream.
    pub streams: Vec<StreamUid>,
    pub payload: Vec<u8>,
}

/// External sink for sampler records. Implementations must be callable from
/// both the synchronous pipeline path and the digest workers.
pub trait Exporter: Send + Sync {
    fn export(&self, records: &[SamplerRecord]) -> Result<(), ExportError>;
    fn close(&self) -> Result<(), ExportError>;
}
