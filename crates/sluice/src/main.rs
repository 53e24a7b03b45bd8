//! sluice — stream files and standard input through chunked transform pipelines.

use anyhow::{Context, Result};
use tokio::sync::watch;

use sluice_core::config::SluiceConfig;
use sluice_core::PipelineError;
use sluice_pipeline::RunOptions;

mod cmd;

const DEFAULT_STAGES: &[&str] = &["upper", "reverse"];

fn print_usage() {
    eprintln!("Usage: sluice [options] [command]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  (none)                      stdin → upper → reverse → stdout");
    eprintln!("  transform <stage>...        stdin → stages → stdout (upper, lower, reverse, identity)");
    eprintln!("  copy <src> [<dst>]          Copy a file (default dst: \"<src> - copy\")");
    eprintln!("  <src> <dst>                 Same as copy <src> <dst>");
    eprintln!("  copy-dir <src> [<dst>]      Copy every file of a directory (default dst: copied-<src>)");
    eprintln!("  generate <path> <lines>     Write <lines> generated text lines to <path>");
    eprintln!("  help                        Show this message");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>       Config file (default: $SLUICE_CONFIG or ~/.config/sluice/config.toml)");
    eprintln!("  --chunk-size <bytes>  Bytes per source read");
    eprintln!("  --high-water <n>      Chunks buffered per stage before pausing upstream");
    eprintln!("  --low-water <n>       Chunks buffered per stage before resuming");
    eprintln!("  --verify              After copy, compare BLAKE3 digests of source and destination");
}

/// Options that may appear anywhere on the command line.
#[derive(Default)]
struct Flags {
    config: Option<String>,
    chunk_size: Option<usize>,
    high_water: Option<usize>,
    low_water: Option<usize>,
    verify: bool,
}

fn parse_number(name: &'static str, value: Option<&String>) -> Result<usize, PipelineError> {
    let value = value.ok_or(PipelineError::MissingArgument(name))?;
    value.parse().map_err(|_| PipelineError::InvalidArgument {
        name,
        reason: format!("{value:?} is not a number"),
    })
}

fn split_flags(args: &[String]) -> Result<(Flags, Vec<&str>), PipelineError> {
    let mut flags = Flags::default();
    let mut remaining = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                flags.config = Some(args.get(i).ok_or(PipelineError::MissingArgument("--config"))?.clone());
            }
            "--chunk-size" => {
                i += 1;
                flags.chunk_size = Some(parse_number("--chunk-size", args.get(i))?);
            }
            "--high-water" => {
                i += 1;
                flags.high_water = Some(parse_number("--high-water", args.get(i))?);
            }
            "--low-water" => {
                i += 1;
                flags.low_water = Some(parse_number("--low-water", args.get(i))?);
            }
            "--verify" => flags.verify = true,
            other => remaining.push(other),
        }
        i += 1;
    }
    Ok((flags, remaining))
}

fn load_config(flags: &Flags) -> Result<SluiceConfig> {
    let mut config = match &flags.config {
        Some(path) => SluiceConfig::load_from(std::path::Path::new(path))?,
        None => SluiceConfig::load()?,
    };
    if let Some(v) = flags.chunk_size {
        config.pipeline.chunk_size = v;
    }
    if let Some(v) = flags.high_water {
        config.pipeline.high_water_mark = v;
        if flags.low_water.is_none() {
            config.pipeline.low_water_mark = config.pipeline.low_water_mark.min(v);
        }
    }
    if let Some(v) = flags.low_water {
        config.pipeline.low_water_mark = v;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(args: Vec<String>) -> Result<()> {
    let (flags, remaining) = split_flags(&args)?;

    if matches!(remaining.as_slice(), ["help"] | ["--help"] | ["-h"]) {
        print_usage();
        return Ok(());
    }

    let config = load_config(&flags)?;
    tracing::debug!(
        chunk_size = config.pipeline.chunk_size,
        high_water_mark = config.pipeline.high_water_mark,
        low_water_mark = config.pipeline.low_water_mark,
        "configuration loaded"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    // First Ctrl-C sets the flag; every pipeline, current or later, sees it.
    // A second Ctrl-C exits immediately.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("interrupt received, stopping (press Ctrl-C again to force)");
        shutdown_tx.send_replace(true);
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second interrupt, exiting");
            std::process::exit(130);
        }
    });

    let options = RunOptions {
        pipeline: config.pipeline.clone(),
        shutdown: Some(shutdown_rx),
        ..RunOptions::default()
    };
    cmd::log_events(&options.events);

    match remaining.as_slice() {
        [] => cmd::transform::cmd_transform(&options, DEFAULT_STAGES).await,
        ["transform"] => Err(PipelineError::MissingArgument("stage").into()),
        ["transform", stages @ ..] => cmd::transform::cmd_transform(&options, stages).await,
        ["copy"] => Err(PipelineError::MissingArgument("source").into()),
        ["copy", src] => cmd::copy::cmd_copy(&options, &config.files, src, None, flags.verify).await,
        ["copy", src, dst] => {
            cmd::copy::cmd_copy(&options, &config.files, src, Some(*dst), flags.verify).await
        }
        ["copy-dir"] => Err(PipelineError::MissingArgument("source directory").into()),
        ["copy-dir", src] => cmd::copy::cmd_copy_dir(&options, &config.files, src, None).await,
        ["copy-dir", src, dst] => {
            cmd::copy::cmd_copy_dir(&options, &config.files, src, Some(*dst)).await
        }
        ["generate"] => Err(PipelineError::MissingArgument("path").into()),
        ["generate", _] => Err(PipelineError::MissingArgument("lines").into()),
        ["generate", path, lines] => cmd::generate::cmd_generate(&options, path, lines).await,
        [src, dst] if !cmd::is_command(src) => {
            cmd::copy::cmd_copy(&options, &config.files, src, Some(*dst), flags.verify).await
        }
        other => Err(PipelineError::InvalidArgument {
            name: "command",
            reason: format!("unknown command: {}", other.join(" ")),
        }
        .into()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(args).await {
        let pipeline_error = e.downcast_ref::<PipelineError>();
        match pipeline_error {
            // already carries its cause in the message
            Some(p) => eprintln!("sluice: {p}"),
            None => eprintln!("sluice: {e:#}"),
        }
        if pipeline_error.is_some_and(PipelineError::is_usage) {
            eprintln!();
            print_usage();
        }
        std::process::exit(pipeline_error.map(PipelineError::exit_code).unwrap_or(1));
    }
}
