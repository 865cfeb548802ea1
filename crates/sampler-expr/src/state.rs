// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-call-site mutable state backing the `sequence` and `complete`
//! functions. One state slot exists per call site per compiled program, is
//! never shared across programs, and is specialized to the first value type
//! it observes. Calls must be serialized by the caller; feeding a value of a
//! different type after specialization fails fast.

use crate::error::EvalError;
use crate::value::Value;

/// Expected ordering of a `sequence` call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug)]
enum SequenceSlot {
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
}

impl SequenceSlot {
    fn kind(&self) -> &'static str {
        match self {
            SequenceSlot::Int(_) => "int",
            SequenceSlot::Uint(_) => "uint",
            SequenceSlot::Float(_) => "float",
            SequenceSlot::String(_) => "string",
        }
    }
}

/// Ordering check across calls. The per-call result reports whether *this*
/// value kept the order; the cumulative [`is_ordered`] flag flips to false on
/// the first violation and never recovers.
///
/// [`is_ordered`]: SequenceState::is_ordered
#[derive(Debug)]
pub struct SequenceState {
    order: Order,
    ordered: bool,
    last: Option<SequenceSlot>,
}

impl SequenceState {
    pub fn new(order: Order) -> Self {
        SequenceState {
            order,
            ordered: true,
            last: None,
        }
    }

    pub fn call(&mut self, value: &Value) -> Result<bool, EvalError> {
        let order = self.order;
        let Some(last) = self.last.as_mut() else {
            self.last = Some(Self::slot(value)?);
            return Ok(true);
        };

        let in_order = match (last, value) {
            (SequenceSlot::Int(prev), Value::Int(v)) => {
                let ordering = v.cmp(prev);
                *prev = *v;
                keeps_order(order, ordering)
            }
            (SequenceSlot::Uint(prev), Value::Uint(v)) => {
                let ordering = v.cmp(prev);
                *prev = *v;
                keeps_order(order, ordering)
            }
            (SequenceSlot::Float(prev), Value::Float(v)) => {
                let ordering = v.partial_cmp(prev).unwrap_or(std::cmp::Ordering::Equal);
                *prev = *v;
                keeps_order(order, ordering)
            }
            (SequenceSlot::String(prev), Value::String(v)) => {
                let ordering = v.as_str().cmp(prev.as_str());
                *prev = v.clone();
                keeps_order(order, ordering)
            }
            (last, other) => {
                return Err(EvalError::StatefulType {
                    function: "sequence",
                    expected: last.kind(),
                    got: other.kind(),
                });
            }
        };

        if !in_order {
            self.ordered = false;
        }
        Ok(in_order)
    }

    /// Cumulative flag: false once any call has broken the order.
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    fn slot(value: &Value) -> Result<SequenceSlot, EvalError> {
        match value {
            Value::Int(v) => Ok(SequenceSlot::Int(*v)),
            Value::Uint(v) => Ok(SequenceSlot::Uint(*v)),
            Value::Float(v) => Ok(SequenceSlot::Float(*v)),
            Value::String(v) => Ok(SequenceSlot::String(v.clone())),
            other => Err(EvalError::StatefulType {
                function: "sequence",
                expected: "int, uint, float or string",
                got: other.kind(),
            }),
        }
    }
}

fn keeps_order(order: Order, ordering: std::cmp::Ordering) -> bool {
    match order {
        Order::Asc => ordering != std::cmp::Ordering::Less,
        Order::Desc => ordering != std::cmp::Ordering::Greater,
    }
}

#[derive(Debug)]
enum CompleteSlot {
    Int { next: i64, step: i64 },
    Uint { next: u64, step: u64 },
    Float { next: f64, step: f64 },
}

impl CompleteSlot {
    fn kind(&self) -> &'static str {
        match self {
            CompleteSlot::Int { .. } => "int",
            CompleteSlot::Uint { .. } => "uint",
            CompleteSlot::Float { .. } => "float",
        }
    }
}

/// Completeness check across calls: each value is expected to be the previous
/// value plus the configured step. The per-call result reports whether *this*
/// value was the expected one; the cumulative [`all_complete`] flag flips to
/// false on the first gap and never recovers.
///
/// [`all_complete`]: CompleteState::all_complete
#[derive(Debug)]
pub struct CompleteState {
    step: f64,
    all_complete: bool,
    slot: Option<CompleteSlot>,
}

impl CompleteState {
    pub fn new(step: f64) -> Self {
        CompleteState {
            step,
            all_complete: true,
            slot: None,
        }
    }

    pub fn call(&mut self, value: &Value) -> Result<bool, EvalError> {
        if self.slot.is_none() {
            self.slot = Some(match value {
                Value::Int(v) => CompleteSlot::Int {
                    next: *v,
                    step: self.step as i64,
                },
                Value::Uint(v) => CompleteSlot::Uint {
                    next: *v,
                    step: self.step as u64,
                },
                Value::Float(v) => CompleteSlot::Float {
                    next: *v,
                    step: self.step,
                },
                other => {
                    return Err(EvalError::StatefulType {
                        function: "complete",
                        expected: "int, uint or float",
                        got: other.kind(),
                    })
                }
            });
        }

        let slot = self.slot.as_mut().expect("slot was just initialized");
        let is_complete = match (slot, value) {
            (CompleteSlot::Int { next, step }, Value::Int(v)) => {
                let is_complete = *v == *next;
                *next = v.wrapping_add(*step);
                is_complete
            }
            (CompleteSlot::Uint { next, step }, Value::Uint(v)) => {
                let is_complete = *v == *next;
                *next = v.wrapping_add(*step);
                is_complete
            }
            (CompleteSlot::Float { next, step }, Value::Float(v)) => {
                let is_complete = *v == *next;
                *next = *v + *step;
                is_complete
            }
            (slot, other) => {
                return Err(EvalError::StatefulType {
                    function: "complete",
                    expected: slot.kind(),
                    got: other.kind(),
                })
            }
        };

        if !is_complete {
            self.all_complete = false;
        }
        Ok(is_complete)
    }

    /// Cumulative flag: false once any call has observed a gap.
    pub fn all_complete(&self) -> bool {
        self.all_complete
    }
}

/// One state slot owned by a compiled program, addressed by the index the
/// injection pass appended to the rewritten call.
#[derive(Debug)]
pub(crate) enum StateSlot {
    Sequence(SequenceState),
    Complete(CompleteState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_asc() {
        let mut state = SequenceState::new(Order::Asc);
        assert!(state.call(&Value::Int(1)).unwrap());
        assert!(state.call(&Value::Int(1)).unwrap());
        assert!(state.call(&Value::Int(2)).unwrap());
        assert!(state.is_ordered());

        assert!(!state.call(&Value::Int(0)).unwrap());
        assert!(!state.is_ordered());

        // per-call result recovers, the cumulative flag does not
        assert!(state.call(&Value::Int(5)).unwrap());
        assert!(!state.is_ordered());
    }

    #[test]
    fn test_sequence_desc() {
        let mut state = SequenceState::new(Order::Desc);
        assert!(state.call(&Value::Int(5)).unwrap());
        assert!(state.call(&Value::Int(3)).unwrap());
        assert!(!state.call(&Value::Int(4)).unwrap());
        assert!(!state.is_ordered());
    }

    #[test]
    fn test_sequence_strings() {
        let mut state = SequenceState::new(Order::Asc);
        assert!(state.call(&Value::String("a".to_string())).unwrap());
        assert!(state.call(&Value::String("b".to_string())).unwrap());
        assert!(!state.call(&Value::String("a".to_string())).unwrap());
    }

    #[test]
    fn test_sequence_type_mismatch_fails_fast() {
        let mut state = SequenceState::new(Order::Asc);
        assert!(state.call(&Value::Int(1)).unwrap());
        let err = state.call(&Value::String("a".to_string())).unwrap_err();
        assert!(matches!(err, EvalError::StatefulType { function: "sequence", .. }));
        // the slot keeps its specialization
        assert!(state.call(&Value::Int(2)).unwrap());
    }

    #[test]
    fn test_complete_step_one() {
        let mut state = CompleteState::new(1.0);
        for v in [0, 1, 2, 3] {
            assert!(state.call(&Value::Int(v)).unwrap());
        }
        assert!(state.all_complete());
    }

    #[test]
    fn test_complete_gap_flips_flag() {
        let mut state = CompleteState::new(1.0);
        assert!(state.call(&Value::Int(0)).unwrap());
        assert!(state.call(&Value::Int(1)).unwrap());
        assert!(!state.call(&Value::Int(5)).unwrap());
        assert!(!state.all_complete());

        // the expected value restarts from the last observed one
        assert!(state.call(&Value::Int(6)).unwrap());
        assert!(!state.all_complete());
    }

    #[test]
    fn test_complete_negative_step() {
        let mut state = CompleteState::new(-1.0);
        assert!(state.call(&Value::Int(3)).unwrap());
        assert!(state.call(&Value::Int(2)).unwrap());
        assert!(state.call(&Value::Int(1)).unwrap());
        assert!(state.all_complete());
    }

    #[test]
    fn test_complete_floats() {
        let mut state = CompleteState::new(0.5);
        assert!(state.call(&Value::Float(1.0)).unwrap());
        assert!(state.call(&Value::Float(1.5)).unwrap());
        assert!(!state.call(&Value::Float(3.0)).unwrap());
        assert!(!state.all_complete());
    }

    #[test]
    fn test_complete_type_mismatch_fails_fast() {
        let mut state = CompleteState::new(1.0);
        assert!(state.call(&Value::Uint(1)).unwrap());
        let err = state.call(&Value::Int(2)).unwrap_err();
        assert!(matches!(err, EvalError::StatefulType { function: "complete", .. }));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Once broken, the cumulative order flag never recovers.
            #[test]
            fn sequence_broken_flag_is_monotone(values in proptest::collection::vec(any::<i64>(), 1..64)) {
                let mut state = SequenceState::new(Order::Asc);
                let mut broken = false;
                for v in values {
                    let _ = state.call(&Value::Int(v)).unwrap();
                    if broken {
                        prop_assert!(!state.is_ordered());
                    }
                    broken = !state.is_ordered();
                }
            }

            // The per-call result is true iff the value did not decrease.
            #[test]
            fn sequence_call_matches_pairwise_order(values in proptest::collection::vec(any::<i64>(), 2..64)) {
                let mut state = SequenceState::new(Order::Asc);
                prop_assert!(state.call(&Value::Int(values[0])).unwrap());
                for window in values.windows(2) {
                    let got = state.call(&Value::Int(window[1])).unwrap();
                    prop_assert_eq!(got, window[1] >= window[0]);
                }
            }

            // Once a gap is seen, all_complete stays false.
            #[test]
            fn complete_flag_is_monotone(values in proptest::collection::vec(-1000i64..1000, 1..64)) {
                let mut state = CompleteState::new(1.0);
                let mut incomplete = false;
                for v in values {
                    let _ = state.call(&Value::Int(v)).unwrap();
                    if incomplete {
                        prop_assert!(!state.all_complete());
                    }
                    incomplete = !state.all_complete();
                }
            }
        }
    }
}
