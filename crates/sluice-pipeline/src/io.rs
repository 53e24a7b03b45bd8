//! Source and sink adapters.
//!
//! A `Source` yields chunks until it returns `Ok(None)`. A `Sink`
//! consumes chunks, then either `finish`es (flush and close) or is
//! `abort`ed (close without flushing). Both release their handle
//! exactly once, at the latest when dropped.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sluice_core::{Chunk, PipelineError};

pub trait Source: Send {
    /// Next chunk, or `None` once the origin is exhausted.
    fn read(&mut self) -> impl Future<Output = Result<Option<Chunk>, PipelineError>> + Send;
}

pub trait Sink: Send {
    fn write(&mut self, chunk: Chunk) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Flush everything written and close.
    fn finish(&mut self) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Close without flushing. Called on error and cancellation.
    fn abort(&mut self) -> impl Future<Output = ()> + Send;
}

// ── Reader / writer adapters ──────────────────────────────────────────────────

/// Chunks any `AsyncRead`. The reader is dropped as soon as it hits EOF.
pub struct ReaderSource<R> {
    reader: Option<R>,
    chunk_size: usize,
    label: String,
}

pub type FileSource = ReaderSource<File>;

impl<R: AsyncRead + Unpin + Send> ReaderSource<R> {
    pub fn new(reader: R, chunk_size: usize, label: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            chunk_size: chunk_size.max(1),
            label: label.into(),
        }
    }
}

impl ReaderSource<File> {
    /// Open a file for reading. A missing path is `SourceNotFound`.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, PipelineError> {
        let file = File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::SourceNotFound(path.to_path_buf()),
            _ => PipelineError::io(format!("failed to open {}", path.display()), e),
        })?;
        Ok(Self::new(file, chunk_size, path.display().to_string()))
    }
}

/// The process's standard input.
pub fn stdin(chunk_size: usize) -> ReaderSource<tokio::io::Stdin> {
    ReaderSource::new(tokio::io::stdin(), chunk_size, "stdin")
}

impl<R: AsyncRead + Unpin + Send> Source for ReaderSource<R> {
    async fn read(&mut self) -> Result<Option<Chunk>, PipelineError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; self.chunk_size];
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| PipelineError::io(format!("failed to read {}", self.label), e))?;
        if n == 0 {
            self.reader = None;
            tracing::debug!(source = %self.label, "source exhausted");
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Chunk::from(buf)))
    }
}

/// Writes chunks to any `AsyncWrite`.
pub struct WriterSink<W> {
    writer: Option<W>,
    label: String,
}

pub type FileSink = WriterSink<File>;

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    pub fn new(writer: W, label: impl Into<String>) -> Self {
        Self {
            writer: Some(writer),
            label: label.into(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }
}

impl WriterSink<File> {
    /// Create (or truncate) a file for writing.
    pub async fn create(path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path)
            .await
            .map_err(|e| PipelineError::io(format!("failed to create {}", path.display()), e))?;
        Ok(Self::new(file, path.display().to_string()))
    }
}

/// The process's standard output.
pub fn stdout() -> WriterSink<tokio::io::Stdout> {
    WriterSink::new(tokio::io::stdout(), "stdout")
}

impl<W: AsyncWrite + Unpin + Send> Sink for WriterSink<W> {
    async fn write(&mut self, chunk: Chunk) -> Result<(), PipelineError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(PipelineError::Closed {
                stage: self.label.clone(),
            });
        };
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| PipelineError::io(format!("failed to write {}", self.label), e))
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .flush()
            .await
            .map_err(|e| PipelineError::io(format!("failed to flush {}", self.label), e))?;
        writer
            .shutdown()
            .await
            .map_err(|e| PipelineError::io(format!("failed to close {}", self.label), e))?;
        tracing::debug!(sink = %self.label, "sink closed");
        Ok(())
    }

    async fn abort(&mut self) {
        if self.writer.take().is_some() {
            tracing::debug!(sink = %self.label, "sink closed without flushing");
        }
    }
}

// ── In-memory adapters ────────────────────────────────────────────────────────

/// Yields a fixed list of chunks.
#[derive(Debug, Default)]
pub struct MemorySource {
    chunks: VecDeque<Chunk>,
}

impl MemorySource {
    pub fn new(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
        }
    }

    pub fn from_bytes(data: impl Into<bytes::Bytes>, chunk_size: usize) -> Self {
        Self::new(Chunk::split(data, chunk_size))
    }
}

impl Source for MemorySource {
    async fn read(&mut self) -> Result<Option<Chunk>, PipelineError> {
        Ok(self.chunks.pop_front())
    }
}

/// Generates numbered text lines, packed into chunks of about `chunk_size` bytes.
pub struct LineSource {
    next: u64,
    total: u64,
    chunk_size: usize,
}

impl LineSource {
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            next: 0,
            total,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn line(n: u64) -> String {
        format!("This is line number {n} in an automatically generated stream\n")
    }
}

impl Source for LineSource {
    async fn read(&mut self) -> Result<Option<Chunk>, PipelineError> {
        if self.next >= self.total {
            return Ok(None);
        }
        let mut buf = String::with_capacity(self.chunk_size);
        while self.next < self.total && buf.len() < self.chunk_size {
            buf.push_str(&Self::line(self.next));
            self.next += 1;
        }
        Ok(Some(Chunk::from(buf.into_bytes())))
    }
}

#[derive(Debug, Default)]
pub struct MemorySinkState {
    pub data: Vec<u8>,
    pub writes: u64,
    pub finished: bool,
    pub aborted: bool,
    pub closes: u32,
}

/// Collects everything written. Clones share the same buffer, so a test
/// can keep one handle and give the other to a pipeline.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemorySinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contents(&self) -> Vec<u8> {
        self.state().data.clone()
    }
}

impl Sink for MemorySink {
    async fn write(&mut self, chunk: Chunk) -> Result<(), PipelineError> {
        let mut state = self.state();
        if state.finished || state.aborted {
            return Err(PipelineError::Closed {
                stage: "memory sink".to_string(),
            });
        }
        state.data.extend_from_slice(&chunk);
        state.writes += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        let mut state = self.state();
        if !state.finished {
            state.finished = true;
            state.closes += 1;
        }
        Ok(())
    }

    async fn abort(&mut self) {
        let mut state = self.state();
        if !state.finished && !state.aborted {
            state.aborted = true;
            state.closes += 1;
        }
    }
}
