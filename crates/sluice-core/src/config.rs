//! Configuration system for Sluice.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SLUICE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/sluice/config.toml
//!   3. ~/.config/sluice/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chunk::{DEFAULT_READ_SIZE, MAX_CHUNK_SIZE};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SluiceConfig {
    pub pipeline: PipelineConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bytes requested per source read.
    pub chunk_size: usize,
    /// A stage asks upstream to pause once this many chunks are buffered.
    pub high_water_mark: usize,
    /// A paused stage resumes once its buffer drains to this many chunks.
    pub low_water_mark: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Appended to the source file name when `copy` gets no destination.
    pub copy_suffix: String,
    /// Prepended to the source directory name when `copy-dir` gets no destination.
    pub copy_dir_prefix: String,
    /// Prefix each file copied by `copy-dir` with "{n}. ".
    pub number_copies: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_READ_SIZE,
            high_water_mark: 16,
            low_water_mark: 4,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            copy_suffix: " - copy".to_string(),
            copy_dir_prefix: "copied-".to_string(),
            number_copies: true,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("sluice")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SluiceConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        if path.exists() {
            return Self::load_from(&path);
        }
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        let mut config = SluiceConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, still honouring env overrides.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = %path.display(), "loading config file");
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SLUICE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Apply SLUICE_* env var overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_usize("SLUICE_PIPELINE__CHUNK_SIZE")? {
            self.pipeline.chunk_size = v;
        }
        if let Some(v) = env_usize("SLUICE_PIPELINE__HIGH_WATER_MARK")? {
            self.pipeline.high_water_mark = v;
        }
        if let Some(v) = env_usize("SLUICE_PIPELINE__LOW_WATER_MARK")? {
            self.pipeline.low_water_mark = v;
        }
        if let Some(v) = env_bool("SLUICE_FILES__NUMBER_COPIES")? {
            self.files.number_copies = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.chunk_size == 0 || p.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidValue(
                "pipeline.chunk_size",
                format!("must be between 1 and {MAX_CHUNK_SIZE}"),
            ));
        }
        if p.high_water_mark == 0 {
            return Err(ConfigError::InvalidValue(
                "pipeline.high_water_mark",
                "must be at least 1".to_string(),
            ));
        }
        if p.low_water_mark > p.high_water_mark {
            return Err(ConfigError::InvalidValue(
                "pipeline.low_water_mark",
                format!("must not exceed high_water_mark ({})", p.high_water_mark),
            ));
        }
        Ok(())
    }
}

fn env_usize(key: &'static str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, format!("{v:?} is not a number"))),
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue(key, format!("{v:?} is not a boolean"))),
        Err(_) => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
