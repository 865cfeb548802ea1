// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Digest lifecycle management.
//!
//! The digester owns one asynchronous worker per digest configuration. Each
//! worker reads its own bounded input queue and interleaves accumulation
//! with a periodic flush on a single task, so a flush never overlaps a
//! mutation of the same accumulator. Handing a sample to a worker never
//! blocks: when the queue is full the sample is dropped and reported.

mod st;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::config::{
    DigestConfig, DigestKind, DigestUid, StreamUid, DEFAULT_DIGEST_BUFFER_SIZE,
    DEFAULT_DIGEST_FLUSH_PERIOD, DEFAULT_DIGEST_MAX_PROCESSED_FIELDS,
};
use crate::error::ErrorForwarder;
use crate::exporter::{Exporter, RecordEncoding, RecordKind, SamplerRecord};
use crate::sample::{Data, SampleError};

use st::StructDigest;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("max number of fields processed reached ({0})")]
    MaxFieldsProcessed(usize),

    #[error("digest worker for stream {0} buffer is full")]
    BufferFull(StreamUid),

    #[error("unknown digest type")]
    UnknownKind,

    #[error("invalid value type {0}")]
    InvalidType(&'static str),

    #[error("failed to marshal digest to json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sample(#[from] SampleError),
}

/// One digest accumulator implementation.
trait Digest: Send {
    fn add_sample_data(&mut self, data: &Data) -> Result<(), DigestError>;
    fn json(&self) -> Result<Vec<u8>, DigestError>;
    fn reset(&mut self);
    fn name(&self) -> &'static str;
}

pub(crate) struct DigesterSettings {
    pub resource: String,
    pub name: String,
    pub exporter: Arc<dyn Exporter>,
    pub errors: ErrorForwarder,
}

/// Builds, replaces and stops digest workers as the digest configuration
/// set changes.
pub(crate) struct Digester {
    resource: String,
    name: String,
    exporter: Arc<dyn Exporter>,
    errors: ErrorForwarder,
    workers: HashMap<DigestUid, WorkerHandle>,
}

impl Digester {
    pub(crate) fn new(settings: DigesterSettings) -> Self {
        Digester {
            resource: settings.resource,
            name: settings.name,
            exporter: settings.exporter,
            errors: settings.errors,
            workers: HashMap::new(),
        }
    }

    /// Reconciles the worker set against a new configuration. Every worker
    /// whose UID is present in the new set is torn down and rebuilt, even
    /// when its configuration did not change; workers whose UID disappeared
    /// are stopped and discarded.
    pub(crate) fn set_digests_config(&mut self, configs: &[DigestConfig]) {
        for config in configs {
            if let Some(existing) = self.workers.remove(&config.uid) {
                existing.stop();
            }

            match self.spawn_worker(config) {
                Ok(worker) => {
                    self.workers.insert(config.uid.clone(), worker);
                }
                Err(err) => {
                    warn!("Couldn't build digest worker {}: {err}", config.uid);
                    self.errors.forward(err.into());
                }
            }
        }

        let removed: Vec<DigestUid> = self
            .workers
            .keys()
            .filter(|uid| !configs.iter().any(|config| &config.uid == *uid))
            .cloned()
            .collect();
        for uid in removed {
            if let Some(worker) = self.workers.remove(&uid) {
                worker.stop();
            }
        }
    }

    fn spawn_worker(&self, config: &DigestConfig) -> Result<WorkerHandle, DigestError> {
        let max_processed_fields = if config.max_processed_fields == 0 {
            DEFAULT_DIGEST_MAX_PROCESSED_FIELDS
        } else {
            config.max_processed_fields
        };

        let digest: Box<dyn Digest> = match config.kind {
            DigestKind::Struct => {
                Box::new(StructDigest::new(max_processed_fields, self.errors.clone()))
            }
            DigestKind::Unknown => return Err(DigestError::UnknownKind),
        };

        let flush_period = if config.flush_period.is_zero() {
            DEFAULT_DIGEST_FLUSH_PERIOD
        } else {
            config.flush_period
        };
        let buffer_size = if config.buffer_size == 0 {
            DEFAULT_DIGEST_BUFFER_SIZE
        } else {
            config.buffer_size
        };

        let (tx, rx) = mpsc::channel(buffer_size);
        let worker = Worker {
            resource: self.resource.clone(),
            name: self.name.clone(),
            stream_uid: config.stream_uid.clone(),
            digest,
            rx,
            flush_period,
            exporter: Arc::clone(&self.exporter),
            errors: self.errors.clone(),
            pending: 0,
        };
        tokio::spawn(worker.run());

        Ok(WorkerHandle {
            stream_uid: config.stream_uid.clone(),
            tx,
            errors: self.errors.clone(),
        })
    }

    /// Hands the sample to every worker whose target stream matched.
    pub(crate) fn process_sample(&self, streams: &[StreamUid], data: &Arc<Data>) {
        for worker in self.workers.values() {
            if streams.contains(&worker.stream_uid) {
                worker.process_sample(Arc::clone(data));
            }
        }
    }

    pub(crate) fn worker_uids(&self) -> Vec<DigestUid> {
        self.workers.keys().cloned().collect()
    }

    /// Stops every worker. Each performs one best-effort final flush; this
    /// does not wait for flushes already in flight.
    pub(crate) fn close(&mut self) {
        for (_, worker) in self.workers.drain() {
            worker.stop();
        }
    }
}

struct WorkerHandle {
    stream_uid: StreamUid,
    tx: mpsc::Sender<Arc<Data>>,
    errors: ErrorForwarder,
}

impl WorkerHandle {
    /// Non-blocking enqueue: a full queue drops the sample and reports it.
    fn process_sample(&self, data: Arc<Data>) {
        if let Err(TrySendError::Full(_) | TrySendError::Closed(_)) = self.tx.try_send(data) {
            self.errors
                .forward(DigestError::BufferFull(self.stream_uid.clone()).into());
        }
    }

    /// Closing the input queue makes the worker drain it, flush once and
    /// exit.
    fn stop(self) {
        drop(self.tx);
    }
}

struct Worker {
    resource: String,
    name: String,
    stream_uid: StreamUid,
    digest: Box<dyn Digest>,
    rx: mpsc::Receiver<Arc<Data>>,
    flush_period: std::time::Duration,
    exporter: Arc<dyn Exporter>,
    errors: ErrorForwarder,
    pending: u64,
}

impl Worker {
    async fn run(mut self) {
        debug!(
            "Digest worker started (stream: {}, digest: {})",
            self.stream_uid,
            self.digest.name()
        );

        let mut ticker = tokio::time::interval(self.flush_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick of an interval completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                maybe_sample = self.rx.recv() => match maybe_sample {
                    Some(data) => {
                        if let Err(err) = self.digest.add_sample_data(&data) {
                            self.errors.forward(err.into());
                        }
                        self.pending += 1;
                    }
                    None => break,
                },
                _ = ticker.tick() => self.export_digest(),
            }
        }

        self.export_digest();
        debug!("Digest worker stopped (stream: {})", self.stream_uid);
    }

    fn export_digest(&mut self) {
        if self.pending == 0 {
            return;
        }

        match self.digest.json() {
            Ok(payload) => {
                let record = SamplerRecord {
                    resource: self.resource.clone(),
                    sampler: self.name.clone(),
                    ts: SystemTime::now(),
                    kind: RecordKind::StructDigest,
                    encoding: RecordEncoding::Json,
                    streams: vec![self.stream_uid.clone()],
                    payload,
                };
                if let Err(err) = self.exporter.export(&[record]) {
                    self.errors.forward(err.into());
                }
            }
            Err(err) => self.errors.forward(err.into()),
        }

        self.digest.reset();
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::exporter::ExportError;

    #[derive(Default)]
    struct MockExporter {
        records: Mutex<Vec<SamplerRecord>>,
    }

    impl MockExporter {
        fn recorded(&self) -> Vec<SamplerRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl Exporter for MockExporter {
        fn export(&self, records: &[SamplerRecord]) -> Result<(), ExportError> {
            self.records.lock().unwrap().extend_from_slice(records);
            Ok(())
        }

        fn close(&self) -> Result<(), ExportError> {
            Ok(())
        }
    }

    fn digester(exporter: Arc<MockExporter>, errors: ErrorForwarder) -> Digester {
        Digester::new(DigesterSettings {
            resource: "test_resource".to_string(),
            name: "test_sampler".to_string(),
            exporter,
            errors,
        })
    }

    fn struct_config(uid: &str, stream: &str) -> DigestConfig {
        DigestConfig::new(uid, stream, DigestKind::Struct)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_set_digests_config_reconciles_workers() {
        let exporter = Arc::new(MockExporter::default());
        let mut digester = digester(exporter, ErrorForwarder::disabled());

        // new worker
        digester.set_digests_config(&[struct_config("digest_uid", "stream_uid")]);
        assert_eq!(digester.worker_uids(), vec![DigestUid::from("digest_uid")]);

        // updated worker is rebuilt under the same uid
        let mut updated = struct_config("digest_uid", "stream_uid");
        updated.max_processed_fields = 20;
        digester.set_digests_config(&[updated]);
        assert_eq!(digester.worker_uids(), vec![DigestUid::from("digest_uid")]);

        // removed worker is discarded
        digester.set_digests_config(&[]);
        assert!(digester.worker_uids().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_digest_kind_is_reported() {
        let exporter = Arc::new(MockExporter::default());
        let (errors, mut rx) = ErrorForwarder::channel();
        let mut digester = digester(exporter, errors);

        digester.set_digests_config(&[DigestConfig::new(
            "digest_uid",
            "stream_uid",
            DigestKind::Unknown,
        )]);
        assert!(digester.worker_uids().is_empty());
        let err = rx.try_recv().unwrap();
        assert!(matches!(
            err,
            crate::error::SamplerError::Digest(DigestError::UnknownKind)
        ));
    }

    #[tokio::test]
    async fn test_worker_flushes_periodically() {
        let exporter = Arc::new(MockExporter::default());
        let mut digester = digester(Arc::clone(&exporter), ErrorForwarder::disabled());

        let mut config = struct_config("digest_uid", "stream_uid");
        config.flush_period = Duration::from_millis(50);
        digester.set_digests_config(&[config]);

        let data = Arc::new(Data::from_json(r#"{"id": 1}"#));
        digester.process_sample(&[StreamUid::from("stream_uid")], &data);

        wait_for(|| !exporter.recorded().is_empty()).await;

        let records = exporter.recorded();
        let record = &records[0];
        assert_eq!(record.kind, RecordKind::StructDigest);
        assert_eq!(record.encoding, RecordEncoding::Json);
        assert_eq!(record.streams, vec![StreamUid::from("stream_uid")]);
        assert_eq!(record.resource, "test_resource");
        assert_eq!(record.sampler, "test_sampler");
        assert_eq!(
            String::from_utf8(record.payload.clone()).unwrap(),
            r#"{"obj":{"count":1,"fields":{"id":{"number":{"integerNum":{"count":1}}}}}}"#
        );
    }

    #[tokio::test]
    async fn test_flush_resets_accumulator() {
        let exporter = Arc::new(MockExporter::default());
        let mut digester = digester(Arc::clone(&exporter), ErrorForwarder::disabled());

        let mut config = struct_config("digest_uid", "stream_uid");
        config.flush_period = Duration::from_millis(30);
        digester.set_digests_config(&[config]);

        let data = Arc::new(Data::from_json(r#"{"id": 1}"#));
        digester.process_sample(&[StreamUid::from("stream_uid")], &data);
        wait_for(|| exporter.recorded().len() == 1).await;

        // a second sample after the flush starts a fresh tree
        digester.process_sample(&[StreamUid::from("stream_uid")], &data);
        wait_for(|| exporter.recorded().len() == 2).await;

        let records = exporter.recorded();
        assert_eq!(records[0].payload, records[1].payload);
    }

    #[tokio::test]
    async fn test_idle_worker_does_not_flush() {
        let exporter = Arc::new(MockExporter::default());
        let mut digester = digester(Arc::clone(&exporter), ErrorForwarder::disabled());

        let mut config = struct_config("digest_uid", "stream_uid");
        config.flush_period = Duration::from_millis(20);
        digester.set_digests_config(&[config]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(exporter.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_stop_performs_final_flush() {
        let exporter = Arc::new(MockExporter::default());
        let mut digester = digester(Arc::clone(&exporter), ErrorForwarder::disabled());

        // long flush period: only the final flush can produce the record
        let mut config = struct_config("digest_uid", "stream_uid");
        config.flush_period = Duration::from_secs(3600);
        digester.set_digests_config(&[config]);

        let data = Arc::new(Data::from_json(r#"{"id": 1}"#));
        digester.process_sample(&[StreamUid::from("stream_uid")], &data);
        digester.close();

        wait_for(|| !exporter.recorded().is_empty()).await;
        assert_eq!(exporter.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_sample() {
        let (errors, mut rx) = ErrorForwarder::channel();

        // bypass the worker task entirely: a handle whose queue has capacity
        // one and no consumer
        let (tx, _queue) = mpsc::channel(1);
        let handle = WorkerHandle {
            stream_uid: StreamUid::from("stream_uid"),
            tx,
            errors,
        };

        let data = Arc::new(Data::from_json(r#"{"id": 1}"#));
        handle.process_sample(Arc::clone(&data));
        handle.process_sample(Arc::clone(&data));

        let err = rx.try_recv().unwrap();
        assert!(matches!(
            err,
            crate::error::SamplerError::Digest(DigestError::BufferFull(uid))
                if uid == StreamUid::from("stream_uid")
        ));
    }

    #[tokio::test]
    async fn test_samples_only_reach_matching_stream_workers() {
        let exporter = Arc::new(MockExporter::default());
        let mut digester = digester(Arc::clone(&exporter), ErrorForwarder::disabled());

        let mut first = struct_config("digest_a", "stream_a");
        first.flush_period = Duration::from_millis(30);
        let mut second = struct_config("digest_b", "stream_b");
        second.flush_period = Duration::from_millis(30);
        digester.set_digests_config(&[first, second]);

        let data = Arc::new(Data::from_json(r#"{"id": 1}"#));
        digester.process_sample(&[StreamUid::from("stream_a")], &data);

        wait_for(|| !exporter.recorded().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let records = exporter.recorded();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].streams, vec![StreamUid::from("stream_a")]);
    }
}
