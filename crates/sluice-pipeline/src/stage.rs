//! Chunked transform stage.
//!
//! A stage wraps one `Transform` and a bounded output buffer. Input
//! arrives through `accept` and `end`; output leaves through `take`.
//! Once the buffer holds `high_water_mark` chunks the stage reports
//! `Flow::Pause`, and it stays paused until `take` has drained it to
//! `low_water_mark`.
//!
//! ```text
//! Idle ─accept─▶ Receiving ─end─▶ Draining ─take(End)─▶ Closed
//!   └──────────────┴───────────────┴─── fail ───────────▶ Closed(error)
//! ```

use std::collections::VecDeque;

use sluice_core::{Chunk, PipelineError, Transform};

/// Flow-control answer to `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Receiving,
    Draining,
    Closed,
}

/// Next item leaving a stage.
#[derive(Debug)]
pub enum Output {
    Data(Chunk),
    End,
}

pub struct Stage {
    name: String,
    transform: Box<dyn Transform>,
    buffer: VecDeque<Chunk>,
    end_queued: bool,
    state: StageState,
    error: Option<PipelineError>,
    paused: bool,
    high_water_mark: usize,
    low_water_mark: usize,
    accepted: u64,
    peak_buffered: usize,
}

impl Stage {
    pub fn new(transform: Box<dyn Transform>, high_water_mark: usize, low_water_mark: usize) -> Self {
        let high_water_mark = high_water_mark.max(1);
        Self {
            name: transform.name().to_string(),
            transform,
            buffer: VecDeque::with_capacity(high_water_mark + 1),
            end_queued: false,
            state: StageState::Idle,
            error: None,
            paused: false,
            high_water_mark,
            low_water_mark: low_water_mark.min(high_water_mark),
            accepted: 0,
            peak_buffered: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// The failure that closed this stage, if any.
    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn peak_buffered(&self) -> usize {
        self.peak_buffered
    }

    /// Number of chunks handed to this stage.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn has_output(&self) -> bool {
        !self.buffer.is_empty() || self.end_queued
    }

    /// Transform one chunk and queue the result.
    pub fn accept(&mut self, chunk: Chunk) -> Result<Flow, PipelineError> {
        match self.state {
            StageState::Idle => self.state = StageState::Receiving,
            StageState::Receiving => {}
            StageState::Draining | StageState::Closed => {
                return Err(PipelineError::Closed {
                    stage: self.name.clone(),
                })
            }
        }
        self.accepted += 1;

        match self.transform.transform(chunk) {
            Ok(Some(out)) => self.enqueue(out),
            Ok(None) => {}
            Err(e) => {
                self.fail(e.duplicate());
                return Err(e);
            }
        }

        if self.buffer.len() >= self.high_water_mark {
            self.paused = true;
        }
        Ok(if self.paused { Flow::Pause } else { Flow::Continue })
    }

    /// No more input. Flushes the transform and queues end-of-stream
    /// behind everything already buffered.
    pub fn end(&mut self) -> Result<(), PipelineError> {
        match self.state {
            StageState::Closed => {
                return Err(PipelineError::Closed {
                    stage: self.name.clone(),
                })
            }
            StageState::Draining => return Ok(()),
            StageState::Idle | StageState::Receiving => {}
        }

        match self.transform.flush() {
            Ok(Some(out)) => self.enqueue(out),
            Ok(None) => {}
            Err(e) => {
                self.fail(e.duplicate());
                return Err(e);
            }
        }

        self.end_queued = true;
        self.state = StageState::Draining;
        tracing::trace!(stage = %self.name, buffered = self.buffer.len(), "stage draining");
        Ok(())
    }

    /// Close with an error. Buffered output is discarded.
    pub fn fail(&mut self, error: PipelineError) {
        if self.state == StageState::Closed && self.error.is_some() {
            return;
        }
        self.buffer.clear();
        self.end_queued = false;
        self.paused = false;
        self.state = StageState::Closed;
        self.error = Some(error);
    }

    /// Pop the next output in order. End-of-stream comes only after all data.
    pub fn take(&mut self) -> Option<Output> {
        if let Some(chunk) = self.buffer.pop_front() {
            if self.paused && self.buffer.len() <= self.low_water_mark {
                self.paused = false;
            }
            return Some(Output::Data(chunk));
        }
        if self.end_queued {
            self.end_queued = false;
            self.paused = false;
            self.state = StageState::Closed;
            return Some(Output::End);
        }
        None
    }

    fn enqueue(&mut self, chunk: Chunk) {
        self.buffer.push_back(chunk);
        self.peak_buffered = self.peak_buffered.max(self.buffer.len());
    }
}
