//! Events published while a pipeline runs.

use sluice_core::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    Pause,
    Resume,
    End,
    Error,
    SourceEnded,
    SinkFinished,
    SinkClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A chunk was handed to `stage`.
    Data { stage: usize, bytes: usize },
    /// `stage` asked its upstream to stop.
    Pause { stage: usize },
    /// `stage` drained to its low-water mark.
    Resume { stage: usize },
    /// `stage` emitted end-of-stream and closed.
    End { stage: usize },
    /// The pipeline failed. `stage` is None for source/sink failures.
    Error { stage: Option<usize>, message: String },
    /// The source is exhausted.
    SourceEnded { chunks: u64, bytes: u64 },
    /// Every chunk reached the sink and the sink flushed.
    SinkFinished { chunks: u64, bytes: u64 },
    /// The sink released its handle. Published once per run.
    SinkClosed,
}

impl Event for PipelineEvent {
    type Kind = EventKind;

    fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::Data { .. } => EventKind::Data,
            PipelineEvent::Pause { .. } => EventKind::Pause,
            PipelineEvent::Resume { .. } => EventKind::Resume,
            PipelineEvent::End { .. } => EventKind::End,
            PipelineEvent::Error { .. } => EventKind::Error,
            PipelineEvent::SourceEnded { .. } => EventKind::SourceEnded,
            PipelineEvent::SinkFinished { .. } => EventKind::SinkFinished,
            PipelineEvent::SinkClosed => EventKind::SinkClosed,
        }
    }
}

pub type PipelineEvents = sluice_core::events::EventBus<PipelineEvent>;
