// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deterministic pre-sampler: keeps 1/N samples based on a digest of a
//! caller-provided determinant, so two processes observing related samples
//! reach the same keep/drop decision without coordinating.

use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    #[error("sample rate must be >= 1")]
    InvalidSampleRate,
}

#[derive(Clone, Debug)]
pub struct DeterministicSampler {
    sample_rate: u32,
    sample_empty_determinant: bool,
    upper_bound: u32,
}

impl DeterministicSampler {
    pub fn new(sample_rate: u32, sample_empty_determinant: bool) -> Result<Self, SamplingError> {
        if sample_rate < 1 {
            return Err(SamplingError::InvalidSampleRate);
        }

        // Largest hash value that is still kept. A rate of 1 keeps the whole
        // range.
        let upper_bound = u32::MAX / sample_rate;
        Ok(DeterministicSampler {
            sample_rate,
            sample_empty_determinant,
            upper_bound,
        })
    }

    /// Returns true when the sample should be kept.
    pub fn sample(&self, determinant: &str) -> bool {
        if self.sample_rate == 1 || (determinant.is_empty() && self.sample_empty_determinant) {
            return true;
        }
        let digest = Sha256::digest(determinant.as_bytes());
        let hash = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        hash <= self.upper_bound
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
