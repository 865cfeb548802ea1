// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoded control-plane configuration. The wire protocol that distributes
//! these settings lives outside the engine; applying a [`SamplerConfig`] is
//! always a full replace of the previous one.

use std::fmt;
use std::time::Duration;

/// Identifies one configured stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamUid(String);

impl StreamUid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamUid {
    fn from(uid: &str) -> Self {
        StreamUid(uid.to_string())
    }
}

impl From<String> for StreamUid {
    fn from(uid: String) -> Self {
        StreamUid(uid)
    }
}

impl fmt::Display for StreamUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one configured digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DigestUid(String);

impl DigestUid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DigestUid {
    fn from(uid: &str) -> Self {
        DigestUid(uid.to_string())
    }
}

impl From<String> for DigestUid {
    fn from(uid: String) -> Self {
        DigestUid(uid)
    }
}

impl fmt::Display for DigestUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named classification over samples: every stream's rule is evaluated
/// against every sample passing the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConfig {
    pub uid: StreamUid,
    /// Boolean expression compiled by the rule builder.
    pub expression: String,
    /// Whether raw matched samples are forwarded to the exporter, in
    /// addition to being digested.
    pub export_raw_samples: bool,
}

/// Kind of summary a digest worker maintains.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DigestKind {
    #[default]
    Unknown,
    /// Structural summary: a counting tree over the sample shapes.
    Struct,
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestKind::Unknown => write!(f, "unknown"),
            DigestKind::Struct => write!(f, "struct"),
        }
    }
}

pub const DEFAULT_DIGEST_FLUSH_PERIOD: Duration = Duration::from_secs(60);
pub const DEFAULT_DIGEST_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_DIGEST_MAX_PROCESSED_FIELDS: usize = 100;

/// One digest worker definition. Zero values fall back to the defaults
/// above when the worker is built.
#[derive(Clone, Debug, PartialEq)]
pub struct DigestConfig {
    pub uid: DigestUid,
    /// Stream whose matched samples feed this digest.
    pub stream_uid: StreamUid,
    pub kind: DigestKind,
    pub flush_period: Duration,
    /// Capacity of the worker input queue; enqueueing never blocks and
    /// overflow drops the sample.
    pub buffer_size: usize,
    /// Budget of fields processed per sample before the structural walk
    /// stops early.
    pub max_processed_fields: usize,
}

impl DigestConfig {
    pub fn new(uid: impl Into<DigestUid>, stream_uid: impl Into<StreamUid>, kind: DigestKind) -> Self {
        DigestConfig {
            uid: uid.into(),
            stream_uid: stream_uid.into(),
            kind,
            flush_period: Duration::ZERO,
            buffer_size: 0,
            max_processed_fields: 0,
        }
    }
}

/// Token-bucket limiter settings. A negative limit disables limiting, zero
/// blocks everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimiterConfig {
    pub limit: i64,
}

/// Deterministic pre-sampler settings: keep one out of `sample_rate` samples
/// based on a digest of the determinant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeterministicSamplingConfig {
    pub sample_rate: u32,
    pub sample_empty_determinant: bool,
}

/// Full sampler configuration, replaced wholesale on every update. The
/// stream set is swapped atomically; digests are reconciled worker by
/// worker.
#[derive(Clone, Debug, Default)]
pub struct SamplerConfig {
    pub streams: Vec<StreamConfig>,
    pub limiter_in: Option<LimiterConfig>,
    pub sampling_in: Option<DeterministicSamplingConfig>,
    pub limiter_out: Option<LimiterConfig>,
    pub digests: Vec<DigestConfig>,
}
