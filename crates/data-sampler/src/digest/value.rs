// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serializable structural digest tree. Every node counts, per shape,
//! how many times that shape was observed at its position; absent sub-nodes
//! are omitted from the summary document.

use std::collections::BTreeMap;

use serde::Serialize;

/// Root of the summary document: `{"obj": {...}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StructureDigest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obj: Option<ObjDigest>,
}

/// Plain occurrence counter shared by the scalar shapes.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CountDigest {
    pub count: u64,
}

/// Number occurrences, split by native representation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberDigest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integer_num: Option<CountDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uinteger_num: Option<CountDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float_num: Option<CountDigest>,
}

/// Array occurrences. Starts out tracking per-position detail; once any
/// differing length is observed it switches to variable-length tracking and
/// never switches back.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayDigest {
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_length_ordered_array: Option<FixedLengthOrderedArrayDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_length_array: Option<VariableLengthArrayDigest>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FixedLengthOrderedArrayDigest {
    pub fields: Vec<ValueDigest>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableLengthArrayDigest {
    pub min_length: u64,
    pub max_length: u64,
    pub sum_length: u64,
}

/// Object occurrences: one child value node per observed field name.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ObjDigest {
    pub count: u64,
    pub fields: BTreeMap<String, ValueDigest>,
}

/// One position in the sample shape. Each sub-node tracks its own shape
/// independently, so a field that alternates between a string and a number
/// counts both.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValueDigest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<NumberDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<CountDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean: Option<CountDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array: Option<ArrayDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obj: Option<ObjDigest>,
}
