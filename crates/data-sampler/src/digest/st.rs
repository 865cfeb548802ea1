// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structural digest accumulator: merges one sample at a time into the
//! counting tree, under a per-call field budget.

use sampler_expr::Value;
use tracing::debug;

use crate::digest::value::{
    ArrayDigest, CountDigest, FixedLengthOrderedArrayDigest, NumberDigest, ObjDigest,
    StructureDigest, ValueDigest, VariableLengthArrayDigest,
};
use crate::digest::{Digest, DigestError};
use crate::error::ErrorForwarder;
use crate::sample::Data;

pub(crate) struct StructDigest {
    max_processed_fields: usize,
    errors: ErrorForwarder,
    digest: StructureDigest,
}

impl StructDigest {
    pub(crate) fn new(max_processed_fields: usize, errors: ErrorForwarder) -> Self {
        StructDigest {
            max_processed_fields,
            errors,
            digest: StructureDigest::default(),
        }
    }
}

impl Digest for StructDigest {
    /// Merges one sample into the tree. Exceeding the field budget keeps the
    /// partial mutation already applied, reports the condition through the
    /// error forwarder and still succeeds. Not thread safe.
    fn add_sample_data(&mut self, data: &Data) -> Result<(), DigestError> {
        let map = data.map()?;

        let mut walk = Walk {
            budget: FieldBudget::new(self.max_processed_fields),
            errors: &self.errors,
        };
        let result = walk.update_obj(&mut self.digest.obj, map);

        match result {
            Ok(()) => Ok(()),
            Err(err @ DigestError::MaxFieldsProcessed(_)) => {
                debug!("Structural digest stopped early: {err}");
                self.errors.forward(err.into());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn json(&self) -> Result<Vec<u8>, DigestError> {
        Ok(serde_json::to_vec(&self.digest)?)
    }

    fn reset(&mut self) {
        self.digest = StructureDigest::default();
    }

    fn name(&self) -> &'static str {
        "struct"
    }
}

struct FieldBudget {
    max: usize,
    used: usize,
}

impl FieldBudget {
    fn new(max: usize) -> Self {
        FieldBudget { max, used: 0 }
    }

    // One unit per recursive step.
    fn consume(&mut self) -> Result<(), DigestError> {
        self.used += 1;
        if self.used > self.max {
            return Err(DigestError::MaxFieldsProcessed(self.max));
        }
        Ok(())
    }
}

struct Walk<'a> {
    budget: FieldBudget,
    errors: &'a ErrorForwarder,
}

impl Walk<'_> {
    fn update_value(&mut self, node: &mut ValueDigest, value: &Value) -> Result<(), DigestError> {
        self.budget.consume()?;

        match value {
            Value::Int(_) | Value::Uint(_) | Value::Float(_) => {
                self.update_num(node.number.get_or_insert_with(Default::default), value)
            }
            Value::String(_) => {
                self.budget.consume()?;
                node.string.get_or_insert_with(Default::default).count += 1;
                Ok(())
            }
            Value::Bool(_) => {
                self.budget.consume()?;
                node.boolean.get_or_insert_with(Default::default).count += 1;
                Ok(())
            }
            Value::List(items) => self.update_array(&mut node.array, items),
            Value::Map(fields) => self.update_obj(&mut node.obj, fields),
            other => Err(DigestError::InvalidType(other.kind())),
        }
    }

    fn update_num(&mut self, node: &mut NumberDigest, value: &Value) -> Result<(), DigestError> {
        self.budget.consume()?;

        match value {
            Value::Int(_) => node.integer_num.get_or_insert_with(Default::default).count += 1,
            Value::Uint(_) => node.uinteger_num.get_or_insert_with(Default::default).count += 1,
            Value::Float(_) => node.float_num.get_or_insert_with(Default::default).count += 1,
            other => return Err(DigestError::InvalidType(other.kind())),
        }
        Ok(())
    }

    fn update_array(
        &mut self,
        prev: &mut Option<ArrayDigest>,
        items: &[Value],
    ) -> Result<(), DigestError> {
        self.budget.consume()?;

        let node = prev.get_or_insert_with(Default::default);
        node.count += 1;

        if node.fixed_length_ordered_array.is_none() && node.variable_length_array.is_none() {
            node.fixed_length_ordered_array = Some(FixedLengthOrderedArrayDigest {
                fields: vec![ValueDigest::default(); items.len()],
            });
        }

        let same_fixed_length = node
            .fixed_length_ordered_array
            .as_ref()
            .is_some_and(|fixed| fixed.fields.len() == items.len());

        if same_fixed_length {
            // Same length as every array seen so far: keep per-position
            // detail.
            let fixed = node
                .fixed_length_ordered_array
                .as_mut()
                .expect("checked above");
            for (child, item) in fixed.fields.iter_mut().zip(items) {
                match self.update_value(child, item) {
                    Ok(()) => {}
                    Err(err @ DigestError::MaxFieldsProcessed(_)) => return Err(err),
                    Err(err) => self.errors.forward(err.into()),
                }
            }
        } else if let Some(fixed) = node.fixed_length_ordered_array.take() {
            // First differing length: the switch to variable-length tracking
            // discards per-position detail and is irrevocable.
            node.variable_length_array = Some(VariableLengthArrayDigest {
                min_length: (fixed.fields.len().min(items.len())) as u64,
                max_length: (fixed.fields.len().max(items.len())) as u64,
                sum_length: (fixed.fields.len() + items.len()) as u64,
            });
        } else {
            let variable = node
                .variable_length_array
                .as_mut()
                .expect("array is either fixed or variable");
            variable.min_length = variable.min_length.min(items.len() as u64);
            variable.max_length = variable.max_length.max(items.len() as u64);
            variable.sum_length += items.len() as u64;
        }

        Ok(())
    }

    fn update_obj(
        &mut self,
        prev: &mut Option<ObjDigest>,
        fields: &std::collections::BTreeMap<String, Value>,
    ) -> Result<(), DigestError> {
        self.budget.consume()?;

        let node = prev.get_or_insert_with(Default::default);
        node.count += 1;

        for (name, value) in fields {
            let child = node.fields.entry(name.clone()).or_default();
            match self.update_value(child, value) {
                Ok(()) => {}
                Err(err @ DigestError::MaxFieldsProcessed(_)) => return Err(err),
                Err(err) => self.errors.forward(err.into()),
            }
        }

        Ok(())
    }
}
