//! Pipeline error taxonomy.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("source {} doesn't exist", .0.display())]
    SourceNotFound(PathBuf),

    #[error("stage {stage} failed: {reason}")]
    TransformFailure { stage: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stage {stage} is closed")]
    Closed { stage: String },

    #[error("pipeline stalled before end of stream")]
    Stalled,

    #[error("pipeline aborted")]
    Aborted,
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn transform(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransformFailure {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by how the program was invoked.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::MissingArgument(_) | Self::InvalidArgument { .. })
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_usage() {
            2
        } else {
            1
        }
    }

    /// Cheap copy used to hand the same failure to several stages.
    /// `io::Error` is not `Clone`, so the kind and message are preserved.
    pub fn duplicate(&self) -> Self {
        match self {
            Self::MissingArgument(name) => Self::MissingArgument(*name),
            Self::InvalidArgument { name, reason } => Self::InvalidArgument {
                name: *name,
                reason: reason.clone(),
            },
            Self::SourceNotFound(path) => Self::SourceNotFound(path.clone()),
            Self::TransformFailure { stage, reason } => Self::TransformFailure {
                stage: stage.clone(),
                reason: reason.clone(),
            },
            Self::Io { context, source } => Self::Io {
                context: context.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::Closed { stage } => Self::Closed {
                stage: stage.clone(),
            },
            Self::Stalled => Self::Stalled,
            Self::Aborted => Self::Aborted,
        }
    }
}
