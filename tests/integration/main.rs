//! Sluice integration test harness.
//!
//! These tests drive whole pipelines: real files on disk, slow sinks,
//! failing stages. Run with:
//!
//!   cargo test --test integration
//!
//! Every test works in its own scratch directory under the system temp
//! dir and removes it when done.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sluice_core::{Chunk, PipelineError};
use sluice_pipeline::{PipelineEvent, PipelineEvents, Sink, Source};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Fresh scratch directory for one test.
pub fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sluice-it-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Deterministic test data; byte `i` is `i % 251`.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Record every event published on `events`, in order.
pub fn record_events(events: &PipelineEvents) -> Arc<Mutex<Vec<PipelineEvent>>> {
    use sluice_pipeline::EventKind::*;

    let log = Arc::new(Mutex::new(Vec::new()));
    for kind in [Data, Pause, Resume, End, Error, SourceEnded, SinkFinished, SinkClosed] {
        let log = log.clone();
        events.subscribe(kind, move |e| log.lock().unwrap().push(e.clone()));
    }
    log
}

// ── Sources and sinks ─────────────────────────────────────────────────────────

/// Emits `total` chunks of `chunk_size` pattern bytes and counts them.
pub struct CountingSource {
    produced: Arc<AtomicU64>,
    total: u64,
    chunk_size: usize,
    next: u64,
    offset: usize,
}

impl CountingSource {
    pub fn new(total: u64, chunk_size: usize, produced: Arc<AtomicU64>) -> Self {
        Self {
            produced,
            total,
            chunk_size,
            next: 0,
            offset: 0,
        }
    }
}

impl Source for CountingSource {
    async fn read(&mut self) -> Result<Option<Chunk>, PipelineError> {
        if self.next == self.total {
            return Ok(None);
        }
        let chunk: Vec<u8> = (self.offset..self.offset + self.chunk_size)
            .map(|i| (i % 251) as u8)
            .collect();
        self.next += 1;
        self.offset += self.chunk_size;
        self.produced.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Chunk::from(chunk)))
    }
}

/// Sleeps before every write and tracks how far the source ran ahead.
pub struct SlowSink {
    pub delay: Duration,
    pub produced: Arc<AtomicU64>,
    pub written: Arc<AtomicU64>,
    /// Largest `produced - written` seen at the start of a write.
    pub max_ahead: Arc<AtomicU64>,
    pub hasher: Arc<Mutex<blake3::Hasher>>,
    pub finished: Arc<AtomicU64>,
}

impl SlowSink {
    pub fn new(delay: Duration, produced: Arc<AtomicU64>) -> Self {
        Self {
            delay,
            produced,
            written: Arc::new(AtomicU64::new(0)),
            max_ahead: Arc::new(AtomicU64::new(0)),
            hasher: Arc::new(Mutex::new(blake3::Hasher::new())),
            finished: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn handles(&self) -> SlowSink {
        SlowSink {
            delay: self.delay,
            produced: self.produced.clone(),
            written: self.written.clone(),
            max_ahead: self.max_ahead.clone(),
            hasher: self.hasher.clone(),
            finished: self.finished.clone(),
        }
    }
}

impl Sink for SlowSink {
    async fn write(&mut self, chunk: Chunk) -> Result<(), PipelineError> {
        let written = self.written.fetch_add(1, Ordering::SeqCst) + 1;
        let ahead = self.produced.load(Ordering::SeqCst).saturating_sub(written);
        self.max_ahead.fetch_max(ahead, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.hasher.lock().unwrap().update(&chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn abort(&mut self) {}
}

// ── Test modules ──────────────────────────────────────────────────────────────

mod backpressure;
mod dirs;
mod failures;
