// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runtime value model shared by the evaluator and the callers that convert
//! samples into their generic form. Integer, unsigned and float values are
//! kept distinct so downstream consumers can tell them apart.

use std::collections::BTreeMap;

use protobuf::reflect::{MessageDescriptor, ReflectFieldRef, ReflectValueRef};
use protobuf::MessageDyn;

/// A dynamically-typed runtime value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Converts a JSON document into a value, preserving the distinction
    /// between signed, unsigned and floating point numbers the way
    /// `serde_json` reports them.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Map(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts a value back into a JSON document. Unsigned and signed
    /// integers keep their native representation; bytes are encoded as an
    /// array of numbers since JSON has no byte type.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Uint(u) => serde_json::Value::from(*u),
            Value::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => {
                serde_json::Value::Array(b.iter().map(|byte| serde_json::Value::from(*byte)).collect())
            }
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Converts a protobuf message into its generic map form through runtime
    /// reflection. Unset singular fields are omitted, matching the proto
    /// presence semantics.
    pub fn from_message(message: &dyn MessageDyn) -> Value {
        let descriptor = message.descriptor_dyn();
        Value::Map(message_fields(&descriptor, message))
    }
}

fn message_fields(
    descriptor: &MessageDescriptor,
    message: &dyn MessageDyn,
) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    for field in descriptor.fields() {
        match field.get_reflect(message) {
            ReflectFieldRef::Optional(optional) => {
                if let Some(value) = optional.value() {
                    fields.insert(field.name().to_string(), from_reflect(value));
                }
            }
            ReflectFieldRef::Repeated(repeated) => {
                let items = (0..repeated.len())
                    .map(|i| from_reflect(repeated.get(i)))
                    .collect();
                fields.insert(field.name().to_string(), Value::List(items));
            }
            ReflectFieldRef::Map(map) => {
                let mut entries = BTreeMap::new();
                for (key, value) in map.into_iter() {
                    let key = match key {
                        ReflectValueRef::String(s) => s.to_string(),
                        ReflectValueRef::I32(v) => v.to_string(),
                        ReflectValueRef::I64(v) => v.to_string(),
                        ReflectValueRef::U32(v) => v.to_string(),
                        ReflectValueRef::U64(v) => v.to_string(),
                        ReflectValueRef::Bool(v) => v.to_string(),
                        _ => continue,
                    };
                    entries.insert(key, from_reflect(value));
                }
                fields.insert(field.name().to_string(), Value::Map(entries));
            }
        }
    }
    fields
}

fn from_reflect(value: ReflectValueRef<'_>) -> Value {
    match value {
        ReflectValueRef::U32(v) => Value::Uint(u64::from(v)),
        ReflectValueRef::U64(v) => Value::Uint(v),
        ReflectValueRef::I32(v) => Value::Int(i64::from(v)),
        ReflectValueRef::I64(v) => Value::Int(v),
        ReflectValueRef::F32(v) => Value::Float(f64::from(v)),
        ReflectValueRef::F64(v) => Value::Float(v),
        ReflectValueRef::Bool(v) => Value::Bool(v),
        ReflectValueRef::String(v) => Value::String(v.to_string()),
        ReflectValueRef::Bytes(v) => Value::Bytes(v.to_vec()),
        ReflectValueRef::Enum(_, v) => Value::Int(i64::from(v)),
        ReflectValueRef::Message(m) => Value::from_message(&*m),
    }
}
