//! File operations built on the pipeline: copy, directory copy, generation.

use std::path::{Path, PathBuf};

use tokio::sync::watch;

use sluice_core::config::{FilesConfig, PipelineConfig};
use sluice_core::PipelineError;

use crate::event::PipelineEvents;
use crate::io::{FileSink, FileSource, LineSource, Sink, Source};
use crate::pipeline::{Pipeline, PipelineBuilder, PipelineStats};

/// Shared settings for one file operation.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub pipeline: PipelineConfig,
    pub events: PipelineEvents,
    /// Set to `true` to abort the running pipeline and any that follow.
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl RunOptions {
    pub fn new(pipeline: PipelineConfig) -> Self {
        Self {
            pipeline,
            ..Self::default()
        }
    }

    pub fn builder(&self) -> PipelineBuilder {
        let builder = PipelineBuilder::from_config(&self.pipeline).events(self.events.clone());
        match &self.shutdown {
            Some(rx) => builder.shutdown(rx.clone()),
            None => builder,
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn check_shutdown(&self) -> Result<(), PipelineError> {
        if self.shutdown_requested() {
            return Err(PipelineError::Aborted);
        }
        Ok(())
    }
}

/// A finished copy of one file.
#[derive(Debug, Clone)]
pub struct CopiedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub stats: PipelineStats,
}

/// `<dir>/<name><suffix>` next to `source`.
pub fn default_copy_destination(source: &Path, suffix: &str) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{name}{suffix}"))
}

/// `<parent>/<prefix><dirname>` next to `source`.
pub fn default_dir_destination(source: &Path, prefix: &str) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{prefix}{name}"))
}

/// Copy one file through a pass-through pipeline.
///
/// The source is opened first, so a missing source fails before the
/// destination is created.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    options: &RunOptions,
) -> Result<CopiedFile, PipelineError> {
    if is_same_file(source, destination).await {
        return Err(PipelineError::InvalidArgument {
            name: "destination",
            reason: "source and destination are the same file".to_string(),
        });
    }
    let reader = FileSource::open(source, options.pipeline.chunk_size).await?;
    let writer = FileSink::create(destination).await?;
    let stats = run_once(options.builder().build(), reader, writer).await?;

    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        bytes = stats.bytes_out,
        chunks = stats.chunks_out,
        "file copied"
    );
    Ok(CopiedFile {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        stats,
    })
}

/// Copy every regular file in `source` into a fresh `destination`.
///
/// An existing destination is removed first, unless it contains the
/// source or lies inside it. Files are copied one at a time in name
/// order; with `number_copies` each copy is named `"{n}. {name}"`.
/// A shutdown request stops the copy before the next file.
pub async fn copy_dir(
    source: &Path,
    destination: &Path,
    files: &FilesConfig,
    options: &RunOptions,
) -> Result<Vec<CopiedFile>, PipelineError> {
    match tokio::fs::metadata(source).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(PipelineError::InvalidArgument {
                name: "source",
                reason: format!("{} is not a directory", source.display()),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::SourceNotFound(source.to_path_buf()))
        }
        Err(e) => return Err(PipelineError::io(format!("failed to stat {}", source.display()), e)),
    }
    if nested(source, destination).await {
        return Err(PipelineError::InvalidArgument {
            name: "destination",
            reason: format!(
                "{} and {} contain one another",
                source.display(),
                destination.display()
            ),
        });
    }
    options.check_shutdown()?;

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(source)
        .await
        .map_err(|e| PipelineError::io(format!("failed to list {}", source.display()), e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::io(format!("failed to list {}", source.display()), e))?
    {
        // metadata follows symlinks, so linked files are copied too
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) if meta.is_file() => names.push(entry.file_name()),
            Ok(_) => tracing::debug!(entry = ?entry.file_name(), "skipping non-file entry"),
            Err(e) => tracing::warn!(
                entry = %entry.path().display(),
                error = %e,
                "skipping unreadable entry"
            ),
        }
    }
    names.sort();

    if tokio::fs::try_exists(destination).await.unwrap_or(false) {
        tracing::warn!(path = %destination.display(), "destination exists, replacing it");
        tokio::fs::remove_dir_all(destination).await.map_err(|e| {
            PipelineError::io(format!("failed to remove {}", destination.display()), e)
        })?;
    }
    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|e| PipelineError::io(format!("failed to create {}", destination.display()), e))?;

    let mut copied = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let target_name = if files.number_copies {
            format!("{}. {}", index + 1, name.to_string_lossy())
        } else {
            name.to_string_lossy().into_owned()
        };
        options.check_shutdown()?;
        let file = copy_file(&source.join(name), &destination.join(target_name), options).await?;
        copied.push(file);
    }

    tracing::info!(
        source = %source.display(),
        destination = %destination.display(),
        files = copied.len(),
        "directory copied"
    );
    Ok(copied)
}

/// Write `lines` generated lines to `path`.
pub async fn generate(path: &Path, lines: u64, options: &RunOptions) -> Result<PipelineStats, PipelineError> {
    let source = LineSource::new(lines, options.pipeline.chunk_size);
    let sink = FileSink::create(path).await?;
    let stats = run_once(options.builder().build(), source, sink).await?;
    tracing::info!(path = %path.display(), lines, bytes = stats.bytes_out, "file generated");
    Ok(stats)
}

async fn run_once<S, K>(mut pipeline: Pipeline, source: S, sink: K) -> Result<PipelineStats, PipelineError>
where
    S: Source + 'static,
    K: Sink + 'static,
{
    pipeline.run(source, sink).await
}

/// Whether either directory is `a` itself or lies inside the other.
/// A destination that does not exist yet can't contain anything.
async fn nested(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a.starts_with(&b) || b.starts_with(&a),
        _ => false,
    }
}

async fn is_same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
