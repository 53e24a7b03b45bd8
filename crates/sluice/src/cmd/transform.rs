//! Standard input → named stages → standard output.

use anyhow::Result;

use sluice_core::transform::by_name;
use sluice_core::{PipelineError, Transform};
use sluice_pipeline::io::{stdin, stdout};
use sluice_pipeline::RunOptions;

pub async fn cmd_transform(options: &RunOptions, names: &[&str]) -> Result<()> {
    let stages = resolve(names)?;
    let mut builder = options.builder();
    for stage in stages {
        builder = builder.boxed_stage(stage);
    }
    let mut pipeline = builder.build();

    let stats = pipeline
        .run(stdin(options.pipeline.chunk_size), stdout())
        .await?;
    tracing::debug!(
        stages = ?names,
        bytes_in = stats.bytes_in,
        bytes_out = stats.bytes_out,
        "transform finished"
    );
    Ok(())
}

fn resolve(names: &[&str]) -> Result<Vec<Box<dyn Transform>>, PipelineError> {
    names
        .iter()
        .map(|name| {
            by_name(name).ok_or_else(|| PipelineError::InvalidArgument {
                name: "stage",
                reason: format!("unknown stage {name:?} (expected upper, lower, reverse or identity)"),
            })
        })
        .collect()
}
