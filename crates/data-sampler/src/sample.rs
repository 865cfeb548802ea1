// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Origin-tagged sample data. A sample enters the engine as JSON text, a
//! native serializable value or a protobuf message; its generic value form
//! and its JSON encoding are computed lazily and cached so repeated rule
//! evaluations and digest updates don't re-convert.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::OnceCell;
use protobuf::MessageDyn;
use serde::Serialize;

use sampler_expr::Value;

/// How a sample entered the engine. Fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleOrigin {
    Json,
    Native,
    Proto,
}

impl fmt::Display for SampleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleOrigin::Json => write!(f, "json"),
            SampleOrigin::Native => write!(f, "native"),
            SampleOrigin::Proto => write!(f, "proto"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("couldn't unmarshal JSON sample: {0}")]
    Json(#[from] serde_json::Error),

    #[error("couldn't encode native sample: {0}")]
    Native(serde_json::Error),

    #[error("sample is not an object")]
    NotAnObject,
}

#[derive(Debug)]
enum Raw {
    Json(String),
    Native(serde_json::Value),
    Proto(Box<dyn MessageDyn>),
}

/// One observed data item, plus the determinant string used for
/// deterministic pre-sampling decisions.
#[derive(Debug)]
pub struct Data {
    origin: SampleOrigin,
    determinant: String,
    raw: Raw,
    value: OnceCell<Value>,
    json: OnceCell<String>,
}

impl Data {
    /// Builds a sample from a JSON object.
    pub fn from_json(json: impl Into<String>) -> Self {
        Data {
            origin: SampleOrigin::Json,
            determinant: String::new(),
            raw: Raw::Json(json.into()),
            value: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    /// Builds a sample from any serializable value. Only fields visible to
    /// the serializer become part of the sample.
    pub fn from_native<T: Serialize>(native: &T) -> Result<Self, SampleError> {
        let value = serde_json::to_value(native).map_err(SampleError::Native)?;
        Ok(Data {
            origin: SampleOrigin::Native,
            determinant: String::new(),
            raw: Raw::Native(value),
            value: OnceCell::new(),
            json: OnceCell::new(),
        })
    }

    /// Builds a sample from a protobuf message.
    pub fn from_proto(proto: Box<dyn MessageDyn>) -> Self {
        Data {
            origin: SampleOrigin::Proto,
            determinant: String::new(),
            raw: Raw::Proto(proto),
            value: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    pub fn with_determinant(mut self, determinant: impl Into<String>) -> Self {
        self.determinant = determinant.into();
        self
    }

    pub fn origin(&self) -> SampleOrigin {
        self.origin
    }

    pub fn determinant(&self) -> &str {
        &self.determinant
    }

    /// The sample's generic value form: a string-keyed map built from the
    /// origin representation. Proto origins decode through message
    /// reflection, keeping the signed/unsigned/float distinction.
    pub fn value(&self) -> Result<&Value, SampleError> {
        self.value.get_or_try_init(|| match &self.raw {
            Raw::Json(json) => {
                let parsed: serde_json::Value = serde_json::from_str(json)?;
                require_map(Value::from_json(&parsed))
            }
            Raw::Native(native) => require_map(Value::from_json(native)),
            Raw::Proto(proto) => require_map(Value::from_message(proto.as_ref())),
        })
    }

    /// The generic map form of [`value`](Self::value).
    pub fn map(&self) -> Result<&BTreeMap<String, Value>, SampleError> {
        match self.value()? {
            Value::Map(fields) => Ok(fields),
            _ => Err(SampleError::NotAnObject),
        }
    }

    /// JSON encoding of the sample, used for exported records.
    pub fn json(&self) -> Result<&str, SampleError> {
        self.json
            .get_or_try_init(|| match &self.raw {
                Raw::Json(json) => Ok(json.clone()),
                Raw::Native(native) => {
                    serde_json::to_string(native).map_err(SampleError::Native)
                }
                Raw::Proto(_) => {
                    let value = self.value()?;
                    serde_json::to_string(&value.to_json()).map_err(SampleError::Native)
                }
            })
            .map(String::as_str)
    }
}

fn require_map(value: Value) -> Result<Value, SampleError> {
    match value {
        Value::Map(_) => Ok(value),
        _ => Err(SampleError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct NestedSample {
        id: i64,
    }

    #[derive(Serialize)]
    struct NativeSample {
        id: i64,
        name: String,
        nested: NestedSample,
    }

    #[test]
    fn test_json_sample_map() {
        let data = Data::from_json(r#"{"id": 1, "tags": ["a", "b"]}"#);
        assert_eq!(data.origin(), SampleOrigin::Json);

        let map = data.map().unwrap();
        assert_eq!(map["id"], Value::Int(1));
        assert_eq!(
            map["tags"],
            Value::List(vec![Value::String("a".to_string()), Value::String("b".to_string())])
        );
    }

    #[test]
    fn test_json_sample_must_be_object() {
        let data = Data::from_json("[1, 2, 3]");
        assert!(matches!(data.map(), Err(SampleError::NotAnObject)));

        let data = Data::from_json("not json");
        assert!(matches!(data.map(), Err(SampleError::Json(_))));
    }

    #[test]
    fn test_native_sample_map() {
        let sample = NativeSample {
            id: 7,
            name: "seven".to_string(),
            nested: NestedSample { id: 77 },
        };
        let data = Data::from_native(&sample).unwrap();
        assert_eq!(data.origin(), SampleOrigin::Native);

        let map = data.map().unwrap();
        assert_eq!(map["id"], Value::Int(7));
        let Value::Map(nested) = &map["nested"] else {
            panic!("expected nested map");
        };
        assert_eq!(nested["id"], Value::Int(77));
    }

    #[test]
    fn test_proto_sample_map() {
        use protobuf::well_known_types::duration::Duration;

        let message = Duration {
            seconds: 3,
            nanos: 200,
            ..Default::default()
        };
        let data = Data::from_proto(Box::new(message));
        assert_eq!(data.origin(), SampleOrigin::Proto);

        let map = data.map().unwrap();
        assert_eq!(map["seconds"], Value::Int(3));
        assert_eq!(map["nanos"], Value::Int(200));
    }

    #[test]
    fn test_json_encoding_per_origin() {
        let data = Data::from_json(r#"{"id": 1}"#);
        assert_eq!(data.json().unwrap(), r#"{"id": 1}"#);

        let data = Data::from_native(&NestedSample { id: 5 }).unwrap();
        assert_eq!(data.json().unwrap(), r#"{"id":5}"#);

        use protobuf::well_known_types::duration::Duration;
        let data = Data::from_proto(Box::new(Duration {
            seconds: 3,
            nanos: 0,
            ..Default::default()
        }));
        assert_eq!(data.json().unwrap(), r#"{"seconds":3}"#);
    }

    #[test]
    fn test_determinant() {
        let data = Data::from_json("{}").with_determinant("trace-1");
        assert_eq!(data.determinant(), "trace-1");
        assert_eq!(Data::from_json("{}").determinant(), "");
    }
}
