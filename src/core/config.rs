//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{MdfError, Result};

/// One mebibyte, the unit the reserve margin is expressed in.
pub const MIB: u64 = 1_048_576;

/// Full mdf configuration model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub reserve: ReserveConfig,
    pub fill: FillConfig,
    pub paths: PathsConfig,
}

/// Reserve margin left untouched on a filled volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReserveConfig {
    /// Megabytes left free on the volume after a fill.
    pub margin_mb: u64,
}

/// Fill engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FillConfig {
    /// Chunk size for the manual zero-write loop.
    pub chunk_size_bytes: u64,
    /// How far short of the fill target an ENOSPC is still counted as a
    /// completed fill. Running out further from the target is an error.
    pub enospc_slack_bytes: u64,
    /// Probe native tools (fsutil / fallocate / dd) before the manual loop.
    pub prefer_native: bool,
}

/// Filesystem paths used by mdf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            margin_mb: crate::filler::reserve::DEFAULT_RESERVE_MARGIN_MB,
        }
    }
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: MIB,
            enospc_slack_bytes: 10 * MIB,
            prefer_native: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[MDF-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("mdf").join("config.toml"),
            jsonl_log: home_dir
                .join(".local")
                .join("share")
                .join("mdf")
                .join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default
    /// path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| MdfError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(MdfError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        set_env_u64("MDF_RESERVE_MARGIN_MB", &mut self.reserve.margin_mb)?;
        set_env_u64("MDF_FILL_CHUNK_SIZE_BYTES", &mut self.fill.chunk_size_bytes)?;
        set_env_u64(
            "MDF_FILL_ENOSPC_SLACK_BYTES",
            &mut self.fill.enospc_slack_bytes,
        )?;
        set_env_bool("MDF_FILL_PREFER_NATIVE", &mut self.fill.prefer_native)?;
        if let Some(raw) = env_var("MDF_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Reject configurations the engines cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.fill.chunk_size_bytes == 0 {
            return Err(MdfError::InvalidConfig {
                details: "fill.chunk_size_bytes must be > 0".to_string(),
            });
        }
        // A slack wider than the reserve would let a badly short fill pass
        // as success.
        let reserve_bytes = self.reserve.margin_mb.saturating_mul(MIB);
        if self.reserve.margin_mb > 0 && self.fill.enospc_slack_bytes > reserve_bytes {
            return Err(MdfError::InvalidConfig {
                details: format!(
                    "fill.enospc_slack_bytes ({}) must not exceed the reserve margin ({} bytes)",
                    self.fill.enospc_slack_bytes, reserve_bytes
                ),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| MdfError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| MdfError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
