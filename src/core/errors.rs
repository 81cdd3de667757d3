//! MDF-prefixed error types with structured error codes.
//!
//! Every fill/release failure names the mount and artifact path involved so
//! the operator can clean up manually when automation cannot.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MdfError>;

/// Top-level error type for mock_disk_full.
#[derive(Debug, Error)]
pub enum MdfError {
    #[error("[MDF-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[MDF-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[MDF-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[MDF-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[MDF-2001] volume stats failure for {mount}: {details}")]
    VolumeStats { mount: String, details: String },

    #[error("[MDF-2002] mount table parse failure: {details}")]
    MountParse { details: String },

    #[error("[MDF-2003] volume no longer available: {mount}")]
    VolumeUnavailable { mount: String },

    #[error("[MDF-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[MDF-3001] permission denied on {mount} for {path}")]
    PermissionDenied { mount: String, path: PathBuf },

    #[error("[MDF-3002] write to filler artifact failed on {mount} at {path}: {details}")]
    WriteFailed {
        mount: String,
        path: PathBuf,
        details: String,
    },

    #[error(
        "[MDF-3003] refusing to touch {path} on {mount}: \
         not the tool-reserved filler artifact path"
    )]
    InvalidTarget { mount: String, path: PathBuf },

    #[error("[MDF-3101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MDF-3201] invalid operation transition: {action} while {phase}")]
    StateViolation {
        phase: &'static str,
        action: &'static str,
    },

    #[error("[MDF-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl MdfError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "MDF-1001",
            Self::MissingConfig { .. } => "MDF-1002",
            Self::ConfigParse { .. } => "MDF-1003",
            Self::UnsupportedPlatform { .. } => "MDF-1101",
            Self::VolumeStats { .. } => "MDF-2001",
            Self::MountParse { .. } => "MDF-2002",
            Self::VolumeUnavailable { .. } => "MDF-2003",
            Self::Serialization { .. } => "MDF-2101",
            Self::PermissionDenied { .. } => "MDF-3001",
            Self::WriteFailed { .. } => "MDF-3002",
            Self::InvalidTarget { .. } => "MDF-3003",
            Self::Io { .. } => "MDF-3101",
            Self::StateViolation { .. } => "MDF-3201",
            Self::Runtime { .. } => "MDF-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// A retry still requires a fresh confirmation cycle; this only marks
    /// failures that are plausibly transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::VolumeStats { .. }
                | Self::WriteFailed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for MdfError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MdfError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
