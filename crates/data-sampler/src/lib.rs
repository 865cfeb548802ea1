// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process data-sampling engine.
//!
//! The engine decides, per observed sample, whether to keep it, classifies
//! it into configured streams by evaluating compiled boolean rules,
//! aggregates matched samples into structural digests on asynchronous
//! per-digest workers, and forwards records to an external exporter — all
//! under token-bucket rate budgets and without ever blocking the producing
//! thread.
//!
//! The expression language the stream rules are written in lives in the
//! `sampler-expr` crate.

pub mod config;
pub mod deterministic;
pub mod digest;
pub mod error;
pub mod exporter;
pub mod rate_limiter;
pub mod rule;
pub mod sample;
pub mod sampler;
pub mod schema;

pub use config::{
    DeterministicSamplingConfig, DigestConfig, DigestKind, DigestUid, LimiterConfig,
    SamplerConfig, StreamConfig, StreamUid,
};
pub use deterministic::DeterministicSampler;
pub use digest::DigestError;
pub use error::{ErrorForwarder, SamplerError};
pub use exporter::{ExportError, Exporter, RecordEncoding, RecordKind, SamplerRecord};
pub use rate_limiter::RateLimiter;
pub use rule::{Rule, RuleBuilder, RuleError};
pub use sample::{Data, SampleError, SampleOrigin};
pub use sampler::{Sampler, SamplerSettings, SamplerStats};
pub use schema::Schema;
