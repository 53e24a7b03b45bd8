//! File and directory copy commands.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use sluice_core::config::FilesConfig;
use sluice_core::PipelineError;
use sluice_pipeline::files::{default_copy_destination, default_dir_destination};
use sluice_pipeline::RunOptions;

pub async fn cmd_copy(
    options: &RunOptions,
    files: &FilesConfig,
    source: &str,
    destination: Option<&str>,
    verify: bool,
) -> Result<()> {
    let source = PathBuf::from(source);
    let destination = match destination {
        Some(d) => PathBuf::from(d),
        None => default_copy_destination(&source, &files.copy_suffix),
    };

    let copied = sluice_pipeline::copy_file(&source, &destination, options).await?;
    println!(
        "File was copied: {} → {} ({} bytes)",
        copied.source.display(),
        copied.destination.display(),
        copied.stats.bytes_out
    );

    if verify {
        if options.shutdown_requested() {
            return Err(PipelineError::Aborted.into());
        }
        let (a, b) = tokio::try_join!(digest(source.clone()), digest(destination.clone()))?;
        if a != b {
            bail!(
                "verification failed: {} and {} differ",
                source.display(),
                destination.display()
            );
        }
        println!("  blake3: {}", hex::encode(a.as_bytes()));
    }
    Ok(())
}

pub async fn cmd_copy_dir(
    options: &RunOptions,
    files: &FilesConfig,
    source: &str,
    destination: Option<&str>,
) -> Result<()> {
    let source = PathBuf::from(source);
    let destination = match destination {
        Some(d) => PathBuf::from(d),
        None => default_dir_destination(&source, &files.copy_dir_prefix),
    };

    let copied = sluice_pipeline::copy_dir(&source, &destination, files, options).await?;
    for file in &copied {
        println!(
            "File was copied: {} → {}",
            file.source.display(),
            file.destination.display()
        );
    }
    let bytes: u64 = copied.iter().map(|f| f.stats.bytes_out).sum();
    println!(
        "{} file(s), {} bytes copied into {}",
        copied.len(),
        bytes,
        destination.display()
    );
    Ok(())
}

/// BLAKE3 digest of a file, hashed on the blocking pool.
async fn digest(path: PathBuf) -> Result<blake3::Hash> {
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .context("digest task panicked")?
}

fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let mut file =
        std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
