//! Pipeline composer — source → stage₁ → … → stageₙ → sink.
//!
//! A pipeline is driven by a single task. At most one source read and
//! one sink write are in flight at a time; while the sink is busy the
//! source keeps being read and chunks pile up in stage buffers until a
//! stage pauses. A paused stage blocks its upstream link, so the pause
//! travels back to the source, which is then left alone until the sink
//! has drained the chain below the low-water marks again.
//!
//! Memory is bounded by `stages × (high_water_mark + 1)` buffered chunks
//! plus one chunk in each of the read and the write.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use sluice_core::config::PipelineConfig;
use sluice_core::{Chunk, Identity, PipelineError, Transform};

use crate::event::{PipelineEvent, PipelineEvents};
use crate::io::{Sink, Source};
use crate::stage::{Flow, Output, Stage};

/// Result of one `connect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// The producer has nothing more to give right now.
    Drained,
    /// The consumer asked to pause.
    Blocked,
    /// End-of-stream was handed to the consumer.
    Ended,
}

/// Move queued output from `producer` into `consumer` until the
/// producer is empty, the consumer pauses, or end-of-stream passes.
/// An error means the consumer failed and has closed itself.
pub fn connect(producer: &mut Stage, consumer: &mut Stage) -> Result<Link, PipelineError> {
    if consumer.is_paused() {
        return Ok(Link::Blocked);
    }
    while let Some(out) = producer.take() {
        match out {
            Output::Data(chunk) => {
                if consumer.accept(chunk)? == Flow::Pause {
                    return Ok(Link::Blocked);
                }
            }
            Output::End => {
                consumer.end()?;
                return Ok(Link::Ended);
            }
        }
    }
    Ok(Link::Drained)
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub chunks_in: u64,
    pub bytes_in: u64,
    pub chunks_out: u64,
    pub bytes_out: u64,
    /// Times any stage asked upstream to pause.
    pub pauses: u64,
    /// Largest number of chunks each stage held at once.
    pub peak_buffered: Vec<usize>,
    pub elapsed: Duration,
}

/// Builder for a [`Pipeline`].
pub struct PipelineBuilder {
    transforms: Vec<Box<dyn Transform>>,
    high_water_mark: usize,
    low_water_mark: usize,
    events: PipelineEvents,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            transforms: Vec::new(),
            high_water_mark: config.high_water_mark,
            low_water_mark: config.low_water_mark,
            events: PipelineEvents::new(),
            shutdown: None,
        }
    }

    pub fn stage(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn boxed_stage(mut self, transform: Box<dyn Transform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn watermarks(mut self, high: usize, low: usize) -> Self {
        self.high_water_mark = high;
        self.low_water_mark = low;
        self
    }

    /// Publish events on an existing bus instead of a private one.
    pub fn events(mut self, events: PipelineEvents) -> Self {
        self.events = events;
        self
    }

    /// Abort the run once `shutdown` holds `true`, including when it
    /// already does before the run starts.
    pub fn shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Pipeline {
        let mut transforms = self.transforms;
        if transforms.is_empty() {
            transforms.push(Box::new(Identity));
        }
        let stages = transforms
            .into_iter()
            .map(|t| Stage::new(t, self.high_water_mark, self.low_water_mark))
            .collect();
        Pipeline {
            stages,
            events: self.events,
            shutdown: self.shutdown,
        }
    }
}

type ReadFuture<S> = Pin<Box<dyn Future<Output = (S, Result<Option<Chunk>, PipelineError>)> + Send>>;
type WriteFuture<K> = Pin<Box<dyn Future<Output = (K, Result<(), PipelineError>)> + Send>>;

/// What the drive loop stopped on.
enum Halt {
    Failed { stage: Option<usize>, error: PipelineError },
    Aborted,
}

pub struct Pipeline {
    stages: Vec<Stage>,
    events: PipelineEvents,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    pub fn events(&self) -> &PipelineEvents {
        &self.events
    }

    /// Run the pipeline to completion.
    ///
    /// On success every chunk has been written and the sink finished.
    /// On failure or abort no further chunks are delivered anywhere, every
    /// stage is closed with the error, and both the source and the sink
    /// have been released before this returns.
    pub async fn run<S, K>(&mut self, source: S, sink: K) -> Result<PipelineStats, PipelineError>
    where
        S: Source + 'static,
        K: Sink + 'static,
    {
        let started = Instant::now();
        let mut stats = PipelineStats::default();
        let mut source = Some(source);
        let mut sink = Some(sink);
        let mut reading: Option<ReadFuture<S>> = None;
        let mut writing: Option<WriteFuture<K>> = None;

        let outcome = self
            .drive(&mut source, &mut sink, &mut reading, &mut writing, &mut stats)
            .await;

        // Release the source first so no more input can be scheduled.
        drop(reading.take());
        drop(source.take());

        stats.peak_buffered = self.stages.iter().map(Stage::peak_buffered).collect();
        stats.elapsed = started.elapsed();

        let result = match outcome {
            Ok(()) => {
                self.events.publish(&PipelineEvent::SinkFinished {
                    chunks: stats.chunks_out,
                    bytes: stats.bytes_out,
                });
                tracing::debug!(
                    chunks_in = stats.chunks_in,
                    bytes_out = stats.bytes_out,
                    pauses = stats.pauses,
                    elapsed_ms = stats.elapsed.as_millis() as u64,
                    "pipeline finished"
                );
                Ok(stats)
            }
            Err(halt) => {
                // An in-flight write owns the sink. Give it one more poll so
                // the sink can be aborted properly; if it is still blocked,
                // dropping it closes the handle.
                if let Some(mut fut) = writing.take() {
                    let done = tokio::select! {
                        biased;
                        out = &mut fut => Some(out),
                        _ = std::future::ready(()) => None,
                    };
                    if let Some((k, _)) = done {
                        sink = Some(k);
                    }
                }
                if let Some(mut k) = sink.take() {
                    k.abort().await;
                }
                let (stage, error) = match halt {
                    Halt::Failed { stage, error } => (stage, error),
                    Halt::Aborted => (None, PipelineError::Aborted),
                };
                self.close_all(stage, &error);
                tracing::warn!(stage = ?stage, error = %error, "pipeline aborted");
                self.events.publish(&PipelineEvent::Error {
                    stage,
                    message: error.to_string(),
                });
                Err(error)
            }
        };

        self.events.publish(&PipelineEvent::SinkClosed);
        result
    }

    async fn drive<S, K>(
        &mut self,
        source: &mut Option<S>,
        sink: &mut Option<K>,
        reading: &mut Option<ReadFuture<S>>,
        writing: &mut Option<WriteFuture<K>>,
        stats: &mut PipelineStats,
    ) -> Result<(), Halt>
    where
        S: Source + 'static,
        K: Sink + 'static,
    {
        let mut shutdown = self.shutdown.take();
        let mut source_done = false;

        loop {
            self.pump(stats)?;

            if reading.is_none() && !source_done && !self.stages[0].is_paused() {
                if let Some(mut src) = source.take() {
                    *reading = Some(Box::pin(async move {
                        let result = src.read().await;
                        (src, result)
                    }));
                }
            }

            if writing.is_none() {
                if let Some(mut k) = sink.take() {
                    match self.take_last() {
                        Some(Output::Data(chunk)) => {
                            stats.chunks_out += 1;
                            stats.bytes_out += chunk.len() as u64;
                            *writing = Some(Box::pin(async move {
                                let result = k.write(chunk).await;
                                (k, result)
                            }));
                        }
                        Some(Output::End) => {
                            let finished = tokio::select! {
                                biased;
                                _ = shutdown_signal(&mut shutdown) => None,
                                r = k.finish() => Some(r),
                            };
                            *sink = Some(k);
                            return match finished {
                                Some(Ok(())) => Ok(()),
                                Some(Err(error)) => Err(Halt::Failed { stage: None, error }),
                                None => Err(Halt::Aborted),
                            };
                        }
                        None => *sink = Some(k),
                    }
                }
            }

            if reading.is_none() && writing.is_none() {
                // Every stage is empty and nothing is in flight, yet the
                // end marker never reached the sink.
                return Err(Halt::Failed {
                    stage: None,
                    error: PipelineError::Stalled,
                });
            }

            tokio::select! {
                biased;
                _ = shutdown_signal(&mut shutdown) => {
                    tracing::info!("shutdown requested, aborting pipeline");
                    return Err(Halt::Aborted);
                }
                (k, result) = in_flight(writing) => {
                    *writing = None;
                    *sink = Some(k);
                    result.map_err(|error| Halt::Failed { stage: None, error })?;
                }
                (src, result) = in_flight(reading) => {
                    *reading = None;
                    *source = Some(src);
                    match result.map_err(|error| Halt::Failed { stage: None, error })? {
                        Some(chunk) => self.feed(chunk, stats)?,
                        None => {
                            source_done = true;
                            tracing::debug!(chunks = stats.chunks_in, bytes = stats.bytes_in, "source ended");
                            self.events.publish(&PipelineEvent::SourceEnded {
                                chunks: stats.chunks_in,
                                bytes: stats.bytes_in,
                            });
                            self.stages[0]
                                .end()
                                .map_err(|error| Halt::Failed { stage: Some(0), error })?;
                        }
                    }
                }
            }
        }
    }

    /// Hand a chunk from the source to the first stage.
    fn feed(&mut self, chunk: Chunk, stats: &mut PipelineStats) -> Result<(), Halt> {
        stats.chunks_in += 1;
        stats.bytes_in += chunk.len() as u64;
        let bytes = chunk.len();
        tracing::trace!(bytes, "chunk read");
        let flow = self.stages[0]
            .accept(chunk)
            .map_err(|error| Halt::Failed { stage: Some(0), error })?;
        self.events.publish(&PipelineEvent::Data { stage: 0, bytes });
        if flow == Flow::Pause {
            self.note_pause(0, stats);
        }
        Ok(())
    }

    /// Run `connect` over every adjacent pair, downstream first so that
    /// freed space is visible to the links above it.
    fn pump(&mut self, stats: &mut PipelineStats) -> Result<(), Halt> {
        for i in (0..self.stages.len().saturating_sub(1)).rev() {
            let (upper, lower) = self.stages.split_at_mut(i + 1);
            let producer = &mut upper[i];
            let consumer = &mut lower[0];

            let producer_paused = producer.is_paused();
            let consumer_paused = consumer.is_paused();
            let before = consumer.accepted();

            let link = connect(producer, consumer);

            let moved = consumer.accepted() - before;
            let resumed = producer_paused && !producer.is_paused();
            let paused = !consumer_paused && consumer.is_paused();

            if moved > 0 {
                tracing::trace!(from = i, to = i + 1, chunks = moved, "chunks forwarded");
            }
            if resumed {
                self.resumed(i);
            }
            match link {
                Ok(Link::Blocked) if paused => self.note_pause(i + 1, stats),
                Ok(Link::Ended) => self.ended(i),
                Ok(_) => {}
                Err(error) => {
                    return Err(Halt::Failed {
                        stage: Some(i + 1),
                        error,
                    })
                }
            }
        }
        Ok(())
    }

    /// Pop the next output of the last stage, publishing flow events.
    fn take_last(&mut self) -> Option<Output> {
        let last = self.stages.len() - 1;
        let was_paused = self.stages[last].is_paused();
        let out = self.stages[last].take();
        if was_paused && !self.stages[last].is_paused() {
            self.resumed(last);
        }
        if matches!(out, Some(Output::End)) {
            self.ended(last);
        }
        out
    }

    fn note_pause(&self, stage: usize, stats: &mut PipelineStats) {
        stats.pauses += 1;
        tracing::debug!(stage, name = self.stages[stage].name(), "stage paused upstream");
        self.events.publish(&PipelineEvent::Pause { stage });
    }

    fn resumed(&self, stage: usize) {
        tracing::debug!(stage, name = self.stages[stage].name(), "stage resumed");
        self.events.publish(&PipelineEvent::Resume { stage });
    }

    fn ended(&self, stage: usize) {
        tracing::trace!(stage, name = self.stages[stage].name(), "stage ended");
        self.events.publish(&PipelineEvent::End { stage });
    }

    /// Close every stage. Stages downstream of the failure (all of them
    /// for source/sink failures) receive the error itself; stages above
    /// it are closed as aborted.
    fn close_all(&mut self, failed: Option<usize>, error: &PipelineError) {
        for (i, stage) in self.stages.iter_mut().enumerate() {
            match failed {
                Some(f) if i < f => stage.fail(PipelineError::Aborted),
                _ => stage.fail(error.duplicate()),
            }
        }
    }
}

/// Await an in-flight operation; pending forever when there is none.
async fn in_flight<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// Resolves once the shutdown flag is set. A dropped sender is not a
/// shutdown request.
async fn shutdown_signal(rx: &mut Option<watch::Receiver<bool>>) {
    let requested = match rx.as_mut() {
        Some(rx) => rx.wait_for(|stop| *stop).await.is_ok(),
        None => false,
    };
    if !requested {
        std::future::pending::<()>().await;
    }
}
