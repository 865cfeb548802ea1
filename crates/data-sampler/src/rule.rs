// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compiled stream rules: a boolean program bound to a schema compatibility
//! mask. A rule is exclusively owned by the stream that references it and
//! carries the per-call-site state of its stateful functions, so evaluation
//! takes `&mut self` and must be serialized by the caller.

use sampler_expr::{CompileError, Env, EvalError, Program};

use crate::sample::{Data, SampleError, SampleOrigin};
use crate::schema::Schema;

const JSON_COMPAT: u8 = 1 << 0;
const NATIVE_COMPAT: u8 = 1 << 1;
const PROTO_COMPAT: u8 = 1 << 2;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("incompatible sample format")]
    IncompatibleFormat,

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("failed to evaluate sample: {0}")]
    Eval(#[from] EvalError),
}

/// Compiles rules against a fixed schema. The expression environment is
/// built once and reused for every rule.
#[derive(Clone, Debug)]
pub struct RuleBuilder {
    schema: Schema,
    env: Env,
}

impl RuleBuilder {
    pub fn new(schema: Schema) -> Self {
        let env = match &schema {
            Schema::Dynamic => Env::dynamic(),
            Schema::Proto(descriptor) => Env::message(descriptor.clone()),
        };
        RuleBuilder { schema, env }
    }

    pub fn build(&self, expression: &str) -> Result<Rule, CompileError> {
        let program = Program::compile(&self.env, expression)?;
        Ok(Rule {
            compat: compatibility_mask(&self.schema),
            program,
        })
    }
}

fn compatibility_mask(schema: &Schema) -> u8 {
    match schema {
        Schema::Dynamic => JSON_COMPAT | NATIVE_COMPAT | PROTO_COMPAT,
        Schema::Proto(_) => PROTO_COMPAT,
    }
}

/// A compiled predicate over samples.
#[derive(Debug)]
pub struct Rule {
    compat: u8,
    program: Program,
}

impl Rule {
    fn check_compatibility(&self, origin: SampleOrigin) -> Result<(), RuleError> {
        let bit = match origin {
            SampleOrigin::Json => JSON_COMPAT,
            SampleOrigin::Native => NATIVE_COMPAT,
            SampleOrigin::Proto => PROTO_COMPAT,
        };
        if self.compat & bit == 0 {
            return Err(RuleError::IncompatibleFormat);
        }
        Ok(())
    }

    /// Evaluates the rule against one sample.
    pub fn eval(&mut self, data: &Data) -> Result<bool, RuleError> {
        self.check_compatibility(data.origin())?;
        let value = data.value()?;
        Ok(self.program.eval(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobuf::well_known_types::duration::Duration;

    #[test]
    fn test_eval_json() {
        for (expression, sample, want) in [
            (r#"sample.sub_struct.id == 11"#, r#"{"id": 1, "sub_struct": {"id": 11}}"#, true),
            (r#"sample.id == 2"#, r#"{"id": 1}"#, false),
            (r#"sequence(sample.id, "asc")"#, r#"{"id": 1}"#, true),
            (r#"complete(sample.id, 1.0)"#, r#"{"id": 1}"#, true),
        ] {
            let builder = RuleBuilder::new(Schema::dynamic());
            let mut rule = builder.build(expression).unwrap();
            let got = rule.eval(&Data::from_json(sample)).unwrap();
            assert_eq!(got, want, "expected {expression} over {sample} to be {want}");
        }
    }

    #[test]
    fn test_eval_native() {
        #[derive(serde::Serialize)]
        struct SubStruct {
            id: i64,
        }
        #[derive(serde::Serialize)]
        struct TestSample {
            id: i64,
            sub_struct: SubStruct,
        }

        let sample = TestSample {
            id: 1,
            sub_struct: SubStruct { id: 11 },
        };
        let builder = RuleBuilder::new(Schema::dynamic());

        let mut rule = builder.build(r#"sample.sub_struct.id == 11"#).unwrap();
        assert!(rule.eval(&Data::from_native(&sample).unwrap()).unwrap());

        let mut rule = builder.build(r#"sample.id == 2"#).unwrap();
        assert!(!rule.eval(&Data::from_native(&sample).unwrap()).unwrap());
    }

    #[test]
    fn test_eval_proto() {
        let builder = RuleBuilder::new(Schema::proto::<Duration>());
        let mut rule = builder.build(r#"sample.seconds == 11"#).unwrap();

        let sample = Data::from_proto(Box::new(Duration {
            seconds: 11,
            nanos: 1,
            ..Default::default()
        }));
        assert!(rule.eval(&sample).unwrap());

        let sample = Data::from_proto(Box::new(Duration {
            seconds: 9,
            nanos: 1,
            ..Default::default()
        }));
        assert!(!rule.eval(&sample).unwrap());
    }

    #[test]
    fn test_dynamic_schema_accepts_all_origins() {
        let builder = RuleBuilder::new(Schema::dynamic());
        let mut rule = builder.build(r#"sample.seconds == 3"#).unwrap();

        assert!(rule.eval(&Data::from_json(r#"{"seconds": 3}"#)).unwrap());

        #[derive(serde::Serialize)]
        struct Native {
            seconds: i64,
        }
        assert!(rule
            .eval(&Data::from_native(&Native { seconds: 3 }).unwrap())
            .unwrap());

        let proto = Data::from_proto(Box::new(Duration {
            seconds: 3,
            nanos: 1,
            ..Default::default()
        }));
        assert!(rule.eval(&proto).unwrap());
    }

    #[test]
    fn test_proto_schema_rejects_other_origins() {
        let builder = RuleBuilder::new(Schema::proto::<Duration>());
        let mut rule = builder.build(r#"sample.seconds == 3"#).unwrap();

        let err = rule.eval(&Data::from_json(r#"{"seconds": 3}"#)).unwrap_err();
        assert!(matches!(err, RuleError::IncompatibleFormat));

        #[derive(serde::Serialize)]
        struct Native {
            seconds: i64,
        }
        let err = rule
            .eval(&Data::from_native(&Native { seconds: 3 }).unwrap())
            .unwrap_err();
        assert!(matches!(err, RuleError::IncompatibleFormat));
    }

    #[test]
    fn test_sequence_state_is_per_rule() {
        let builder = RuleBuilder::new(Schema::dynamic());
        let mut rule = builder.build(r#"sequence(sample.id, "asc")"#).unwrap();

        assert!(rule.eval(&Data::from_json(r#"{"id": 1}"#)).unwrap());
        assert!(rule.eval(&Data::from_json(r#"{"id": 2}"#)).unwrap());
        assert!(!rule.eval(&Data::from_json(r#"{"id": 1}"#)).unwrap());

        // a freshly built rule starts from scratch
        let mut fresh = builder.build(r#"sequence(sample.id, "asc")"#).unwrap();
        assert!(fresh.eval(&Data::from_json(r#"{"id": 1}"#)).unwrap());
    }

    #[test]
    fn test_compile_errors_produce_no_rule() {
        let builder = RuleBuilder::new(Schema::dynamic());
        assert!(builder.build(r#"sample.id =="#).is_err());
        assert!(builder.build(r#"sample.id"#).is_err());
        assert!(builder.build(r#"sequence(sample.id, sample.order)"#).is_err());
        assert!(builder.build(r#"complete(sample.id, "1")"#).is_err());
    }
}
