// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-sample decision pipeline.
//!
//! `sample` runs on whatever thread feeds the sampler and never blocks:
//! limiters are try-acquire only and digest hand-off drops on overflow. The
//! stream set lives behind a mutex because compiled rules carry per-call
//! stateful-function state and their evaluations must be serialized; the
//! limiter and pre-sampler handles are replaced wholesale on configuration
//! updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use tracing::{debug, error};

use crate::config::{SamplerConfig, StreamUid};
use crate::deterministic::DeterministicSampler;
use crate::digest::{Digester, DigesterSettings};
use crate::error::{ErrorForwarder, SamplerError};
use crate::exporter::{Exporter, RecordEncoding, RecordKind, SamplerRecord};
use crate::rate_limiter::RateLimiter;
use crate::rule::{Rule, RuleBuilder};
use crate::sample::Data;
use crate::schema::Schema;

pub struct SamplerSettings {
    /// Name of the resource the sampler observes.
    pub resource: String,
    /// Name of this sampler.
    pub name: String,
    pub schema: Schema,
    pub exporter: Arc<dyn Exporter>,
    pub errors: ErrorForwarder,
}

/// Counters snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub samples_evaluated: u64,
    pub samples_exported: u64,
}

#[derive(Default)]
struct StatsCounters {
    evaluated: AtomicU64,
    exported: AtomicU64,
}

struct StreamEntry {
    uid: StreamUid,
    export_raw_samples: bool,
    rule: Rule,
}

/// The sampling engine: decides, per observed sample, whether to keep it,
/// which streams it belongs to, and forwards it to the digesters and the
/// exporter under the configured budgets.
pub struct Sampler {
    resource: String,
    name: String,
    rule_builder: RuleBuilder,
    exporter: Arc<dyn Exporter>,
    errors: ErrorForwarder,
    stats: StatsCounters,

    limiter_in: RwLock<Option<RateLimiter>>,
    sampler_in: RwLock<Option<DeterministicSampler>>,
    limiter_out: RwLock<Option<RateLimiter>>,
    streams: Mutex<Vec<StreamEntry>>,
    digester: Mutex<Digester>,
}

impl Sampler {
    pub fn new(settings: SamplerSettings) -> Self {
        let digester = Digester::new(DigesterSettings {
            resource: settings.resource.clone(),
            name: settings.name.clone(),
            exporter: Arc::clone(&settings.exporter),
            errors: settings.errors.clone(),
        });

        Sampler {
            resource: settings.resource,
            name: settings.name,
            rule_builder: RuleBuilder::new(settings.schema),
            exporter: settings.exporter,
            errors: settings.errors,
            stats: StatsCounters::default(),

            limiter_in: RwLock::new(None),
            sampler_in: RwLock::new(None),
            limiter_out: RwLock::new(None),
            streams: Mutex::new(Vec::new()),
            digester: Mutex::new(digester),
        }
    }

    /// Applies a new configuration. The stream set is replaced in full (a
    /// stream whose rule fails to compile is dropped and the error
    /// forwarded), limiters and the pre-sampler are rebuilt, and the digest
    /// worker set is reconciled.
    pub fn set_config(&self, config: &SamplerConfig) {
        *self.limiter_in.write().expect("lock poisoned") = config
            .limiter_in
            .map(|limiter| RateLimiter::new(limiter.limit));

        *self.sampler_in.write().expect("lock poisoned") = match &config.sampling_in {
            Some(sampling) => {
                match DeterministicSampler::new(
                    sampling.sample_rate,
                    sampling.sample_empty_determinant,
                ) {
                    Ok(sampler) => Some(sampler),
                    Err(err) => {
                        error!("Couldn't initialize the deterministic sampler: {err}");
                        self.errors.forward(SamplerError::Config(err.to_string()));
                        None
                    }
                }
            }
            None => None,
        };

        let mut entries = Vec::with_capacity(config.streams.len());
        for stream in &config.streams {
            match self.rule_builder.build(&stream.expression) {
                Ok(rule) => entries.push(StreamEntry {
                    uid: stream.uid.clone(),
                    export_raw_samples: stream.export_raw_samples,
                    rule,
                }),
                Err(err) => {
                    // The stream is dropped from the new set; the remaining
                    // streams still apply.
                    error!(
                        "Couldn't build rule {:?} for stream {}: {err}",
                        stream.expression, stream.uid
                    );
                    self.errors.forward(SamplerError::RuleBuild {
                        uid: stream.uid.clone(),
                        source: err,
                    });
                }
            }
        }
        *self.streams.lock().expect("lock poisoned") = entries;

        *self.limiter_out.write().expect("lock poisoned") = config
            .limiter_out
            .map(|limiter| RateLimiter::new(limiter.limit));

        self.digester
            .lock()
            .expect("lock poisoned")
            .set_digests_config(&config.digests);
    }

    /// Runs the per-sample decision sequence. Returns true when the sample
    /// was accepted (matched at least one stream and passed every budget).
    pub fn sample(&self, data: Data) -> bool {
        self.stats.evaluated.fetch_add(1, Ordering::Relaxed);

        if let Some(limiter) = &*self.limiter_in.read().expect("lock poisoned") {
            if !limiter.try_acquire() {
                return false;
            }
        }

        if let Some(sampler) = &*self.sampler_in.read().expect("lock poisoned") {
            if !sampler.sample(data.determinant()) {
                return false;
            }
        }

        // Cost saving: with no output tokens available the sample cannot be
        // exported, so skip rule evaluation entirely. Best effort, may race
        // with a concurrent refill.
        if let Some(limiter) = &*self.limiter_out.read().expect("lock poisoned") {
            if limiter.tokens() <= 0 {
                return false;
            }
        }

        let data = Arc::new(data);
        let mut matches: Vec<StreamUid> = Vec::new();
        let mut export_raw = false;
        {
            let mut streams = self.streams.lock().expect("lock poisoned");
            for entry in streams.iter_mut() {
                match entry.rule.eval(&data) {
                    Ok(true) => {
                        export_raw |= entry.export_raw_samples;
                        matches.push(entry.uid.clone());
                    }
                    Ok(false) => {}
                    Err(err) => {
                        // An evaluation error only makes this stream a
                        // non-match; the sample keeps going.
                        self.errors.forward(SamplerError::RuleEval {
                            uid: entry.uid.clone(),
                            source: err,
                        });
                    }
                }
            }
        }

        if matches.is_empty() {
            return false;
        }

        if let Some(limiter) = &*self.limiter_out.read().expect("lock poisoned") {
            if !limiter.try_acquire() {
                return false;
            }
        }

        self.digester
            .lock()
            .expect("lock poisoned")
            .process_sample(&matches, &data);

        if export_raw {
            if let Err(err) = self.export_raw_sample(&data, matches) {
                self.errors.forward(err);
                return false;
            }
            self.stats.exported.fetch_add(1, Ordering::Relaxed);
        }

        true
    }

    fn export_raw_sample(
        &self,
        data: &Data,
        matches: Vec<StreamUid>,
    ) -> Result<(), SamplerError> {
        let payload = data.json()?.as_bytes().to_vec();
        let record = SamplerRecord {
            resource: self.resource.clone(),
            sampler: self.name.clone(),
            ts: SystemTime::now(),
            kind: RecordKind::Raw,
            encoding: RecordEncoding::Json,
            streams: matches,
            payload,
        };
        self.exporter.export(&[record])?;
        Ok(())
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            samples_evaluated: self.stats.evaluated.load(Ordering::Relaxed),
            samples_exported: self.stats.exported.load(Ordering::Relaxed),
        }
    }

    /// Stops the digest workers (each flushes once, best effort) and closes
    /// the exporter.
    pub fn close(&self) -> Result<(), SamplerError> {
        debug!("Sampler {} closing", self.name);
        self.digester.lock().expect("lock poisoned").close();
        self.exporter.close()?;
        Ok(())
    }
}
