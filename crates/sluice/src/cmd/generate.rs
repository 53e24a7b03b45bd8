//! Generated text files.

use std::path::Path;

use anyhow::Result;

use sluice_core::PipelineError;
use sluice_pipeline::RunOptions;

pub async fn cmd_generate(options: &RunOptions, path: &str, lines: &str) -> Result<()> {
    let lines = parse_lines(lines)?;
    let stats = sluice_pipeline::generate(Path::new(path), lines, options).await?;
    println!("Generated {path}: {lines} lines, {} bytes", stats.bytes_out);
    Ok(())
}

fn parse_lines(value: &str) -> Result<u64, PipelineError> {
    value.parse().map_err(|_| PipelineError::InvalidArgument {
        name: "lines",
        reason: format!("{value:?} is not a line count"),
    })
}
