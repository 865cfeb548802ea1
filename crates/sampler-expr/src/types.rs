// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static types inferred by the checker and the environment binding the
//! `sample` variable.

use std::fmt;

use protobuf::reflect::{MessageDescriptor, RuntimeFieldType, RuntimeType};

/// Identifier every expression is evaluated against.
pub const SAMPLE_KEY: &str = "sample";

/// The static type of an expression node.
///
/// `Dyn` stands for values whose shape is only known at evaluation time,
/// which is the common case when the schema is dynamic.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Dyn,
    Null,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Bytes,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Message(MessageDescriptor),
}

impl Type {
    pub(crate) fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Uint | Type::Float)
    }

    pub(crate) fn is_dyn(&self) -> bool {
        matches!(self, Type::Dyn)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dyn => write!(f, "dyn"),
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Uint => write!(f, "uint"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::List(elem) => write!(f, "list({elem})"),
            Type::Map(key, value) => write!(f, "map({key}, {value})"),
            Type::Message(desc) => write!(f, "{}", desc.full_name()),
        }
    }
}

/// Maps a protobuf field to the expression type it evaluates to.
pub(crate) fn field_type(field: RuntimeFieldType) -> Type {
    match field {
        RuntimeFieldType::Singular(ty) => scalar_type(ty),
        RuntimeFieldType::Repeated(ty) => Type::List(Box::new(scalar_type(ty))),
        RuntimeFieldType::Map(key, value) => {
            Type::Map(Box::new(scalar_type(key)), Box::new(scalar_type(value)))
        }
    }
}

fn scalar_type(ty: RuntimeType) -> Type {
    match ty {
        RuntimeType::I32 | RuntimeType::I64 => Type::Int,
        RuntimeType::U32 | RuntimeType::U64 => Type::Uint,
        RuntimeType::F32 | RuntimeType::F64 => Type::Float,
        RuntimeType::Bool => Type::Bool,
        RuntimeType::String => Type::String,
        RuntimeType::VecU8 => Type::Bytes,
        RuntimeType::Enum(_) => Type::Int,
        RuntimeType::Message(desc) => Type::Message(desc),
    }
}

/// Typed evaluation environment: binds the `sample` identifier to either a
/// free-form string-keyed map or a concrete message type. Built once per rule
/// builder and reused for every compilation.
#[derive(Clone, Debug)]
pub struct Env {
    sample: Type,
}

impl Env {
    /// Environment for schemaless samples: `sample` is a `map(string, dyn)`.
    pub fn dynamic() -> Self {
        Env {
            sample: Type::Map(Box::new(Type::String), Box::new(Type::Dyn)),
        }
    }

    /// Environment for samples of a fixed message type.
    pub fn message(descriptor: MessageDescriptor) -> Self {
        Env {
            sample: Type::Message(descriptor),
        }
    }

    pub(crate) fn ident_type(&self, name: &str) -> Option<Type> {
        if name == SAMPLE_KEY {
            Some(self.sample.clone())
        } else {
            None
        }
    }
}
