// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Engine-wide error type and the non-blocking forwarder used to surface
//! non-fatal runtime errors without ever stalling the sampling hot path.

use tokio::sync::mpsc;
use tracing::debug;

use sampler_expr::CompileError;

use crate::config::StreamUid;
use crate::digest::DigestError;
use crate::exporter::ExportError;
use crate::rule::RuleError;
use crate::sample::SampleError;

/// Errors reported by the engine at runtime. Everything here is non-fatal:
/// the affected sample, stream or digest is skipped and processing continues.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("couldn't build rule for stream {uid}: {source}")]
    RuleBuild {
        uid: StreamUid,
        #[source]
        source: CompileError,
    },

    #[error("couldn't evaluate rule for stream {uid}: {source}")]
    RuleEval {
        uid: StreamUid,
        #[source]
        source: RuleError,
    },

    #[error("invalid sampler configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error("couldn't export samples: {0}")]
    Export(#[from] ExportError),
}

/// Single-slot, non-blocking error channel. `forward` never waits: when the
/// receiver has not drained the previous error, the new one is dropped.
#[derive(Clone, Debug, Default)]
pub struct ErrorForwarder {
    tx: Option<mpsc::Sender<SamplerError>>,
}

impl ErrorForwarder {
    /// Creates a forwarder together with the receiving half.
    pub fn channel() -> (Self, mpsc::Receiver<SamplerError>) {
        let (tx, rx) = mpsc::channel(1);
        (ErrorForwarder { tx: Some(tx) }, rx)
    }

    /// Forwarder that discards every error.
    pub fn disabled() -> Self {
        ErrorForwarder { tx: None }
    }

    pub fn forward(&self, err: SamplerError) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.try_send(err).is_err() {
            debug!("Error channel is full or closed, dropping error");
        }
    }
}
