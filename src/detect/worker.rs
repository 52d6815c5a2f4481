//! Asynchronous detector.
//!
//! `AsyncDetector` runs a `DetectorBackend` on its own worker thread. The control
//! loop submits frames fire-and-forget; results come back later, out of band,
//! through the registered callback together with the originating timestamp.
//!
//! Delivery guarantees match a live-stream detector:
//! - at most one callback per submitted frame
//! - frames are dropped (no callback) while the worker is busy
//! - a failing backend produces no callback for that frame
//!
//! Callers must therefore tolerate missing or late results.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionBatch};
use crate::frame::Frame;

/// Frames that may wait while the worker is busy. Anything beyond is dropped.
const QUEUE_DEPTH: usize = 1;

/// Result callback, invoked on the worker thread.
pub type ResultCallback = Box<dyn FnMut(DetectionBatch) + Send + 'static>;

/// Post-processing applied to every backend result before delivery.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorOptions {
    /// Keep at most this many detections, highest scores first.
    pub max_results: usize,
    /// Drop detections scoring below this value.
    pub score_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            score_threshold: 0.6,
        }
    }
}

impl DetectorOptions {
    /// Apply the score threshold and max-results cap.
    ///
    /// Survivors are ordered by descending score; ties keep backend order.
    pub fn filter(&self, mut detections: Vec<Detection>) -> Vec<Detection> {
        detections.retain(|d| d.score >= self.score_threshold);
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        detections.truncate(self.max_results);
        detections
    }
}

enum WorkerCommand {
    Detect(Frame),
    Shutdown,
}

/// Counters shared between the submitting thread and the worker.
#[derive(Debug, Default)]
struct DetectorCounters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of detector activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub submitted: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

/// Live-stream detector running a backend on a dedicated thread.
pub struct AsyncDetector {
    command_tx: Option<SyncSender<WorkerCommand>>,
    thread: Option<JoinHandle<()>>,
    counters: Arc<DetectorCounters>,
    backend_name: &'static str,
}

impl AsyncDetector {
    /// Spawn the worker. The backend is warmed up on the calling thread first so
    /// a broken model fails startup instead of silently producing no results.
    pub fn spawn(
        mut backend: Box<dyn DetectorBackend>,
        options: DetectorOptions,
        callback: ResultCallback,
    ) -> Result<Self> {
        backend.warm_up().context("detector warm-up failed")?;
        let backend_name = backend.name();

        let (command_tx, command_rx) = mpsc::sync_channel(QUEUE_DEPTH);
        let counters = Arc::new(DetectorCounters::default());
        let worker_counters = Arc::clone(&counters);

        let thread = thread::Builder::new()
            .name(format!("detector-{backend_name}"))
            .spawn(move || run_worker(backend, options, callback, command_rx, worker_counters))
            .map_err(|e| anyhow!("failed to spawn detector worker: {}", e))?;

        log::info!(
            "detector '{}' running (max_results={}, score_threshold={:.2})",
            backend_name,
            options.max_results,
            options.score_threshold
        );

        Ok(Self {
            command_tx: Some(command_tx),
            thread: Some(thread),
            counters,
            backend_name,
        })
    }

    /// Submit a frame for detection. Never blocks.
    ///
    /// Returns `false` when the frame was dropped because the worker is busy or
    /// has stopped.
    pub fn submit(&self, frame: Frame) -> bool {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let Some(tx) = self.command_tx.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        match tx.try_send(WorkerCommand::Detect(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("detector busy, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("detector worker is gone, dropping frame");
                false
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker and wait for it. Idempotent.
    ///
    /// A frame already being processed finishes and may still be delivered.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            // Blocking send: the queue may hold a pending frame.
            let _ = tx.send(WorkerCommand::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("detector worker panicked");
            } else {
                log::info!("detector '{}' stopped", self.backend_name);
            }
        }
    }
}

impl Drop for AsyncDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    mut backend: Box<dyn DetectorBackend>,
    options: DetectorOptions,
    mut callback: ResultCallback,
    command_rx: Receiver<WorkerCommand>,
    counters: Arc<DetectorCounters>,
) {
    while let Ok(command) = command_rx.recv() {
        let frame = match command {
            WorkerCommand::Detect(frame) => frame,
            WorkerCommand::Shutdown => break,
        };
        match backend.detect(&frame) {
            Ok(detections) => {
                let batch = DetectionBatch::new(options.filter(detections), frame.timestamp_ms);
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                callback(batch);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("detector '{}' failed: {:#}", backend.name(), e);
            }
        }
    }
}
