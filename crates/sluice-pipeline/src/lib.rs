//! sluice-pipeline — chunked transform stages, the pipeline composer,
//! and the source/sink adapters that feed it.

pub mod event;
pub mod files;
pub mod io;
pub mod pipeline;
pub mod stage;

pub use event::{EventKind, PipelineEvent, PipelineEvents};
pub use files::{copy_dir, copy_file, generate, CopiedFile, RunOptions};
pub use io::{
    FileSink, FileSource, LineSource, MemorySink, MemorySource, ReaderSource, Sink, Source,
    WriterSink,
};
pub use pipeline::{connect, Link, Pipeline, PipelineBuilder, PipelineStats};
pub use stage::{Flow, Output, Stage, StageState};
