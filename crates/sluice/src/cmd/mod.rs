//! CLI command modules.

pub mod copy;
pub mod generate;
pub mod transform;

use sluice_pipeline::{EventKind, PipelineEvent, PipelineEvents};

const COMMANDS: &[&str] = &["transform", "copy", "copy-dir", "generate", "help"];

/// Whether `word` names a subcommand rather than a path.
pub fn is_command(word: &str) -> bool {
    COMMANDS.contains(&word)
}

/// Trace the lifecycle events of every pipeline run on `events`.
pub fn log_events(events: &PipelineEvents) {
    events.subscribe(EventKind::SourceEnded, |e| {
        if let PipelineEvent::SourceEnded { chunks, bytes } = e {
            tracing::debug!(chunks, bytes, "source ended");
        }
    });
    events.subscribe(EventKind::SinkFinished, |e| {
        if let PipelineEvent::SinkFinished { chunks, bytes } = e {
            tracing::debug!(chunks, bytes, "sink finished");
        }
    });
    events.subscribe(EventKind::SinkClosed, |_| tracing::debug!("sink closed"));
    events.subscribe(EventKind::Error, |e| {
        if let PipelineEvent::Error { stage, message } = e {
            tracing::debug!(stage = ?stage, %message, "pipeline error");
        }
    });
}
