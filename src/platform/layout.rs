//! Filler artifact path conventions and native tool choices per platform.
//!
//! The two layouts reproduce the tool's fixed naming convention exactly:
//!
//! - Windows-style volumes: container `<mount>\FAKETMP\`, artifact
//!   `<mount>\FAKETMP\fakefile.tmp`
//! - POSIX-style volumes: artifact `<mount>/testfile`, no container
//!
//! One concrete layout is selected once at startup by platform detection;
//! both are always compiled so the path logic stays testable everywhere.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Container directory name on Windows-style volumes.
pub const WINDOWS_CONTAINER_DIR: &str = "FAKETMP";
/// Artifact file name on Windows-style volumes.
pub const WINDOWS_ARTIFACT_FILE: &str = "fakefile.tmp";
/// Artifact file name on POSIX-style volumes.
pub const POSIX_ARTIFACT_FILE: &str = "testfile";

/// A fully-formed external tool command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

/// Platform path layout + native tool strategy for filler artifacts.
pub trait VolumeLayout: Send + Sync {
    /// Layout label for logs and reports.
    fn name(&self) -> &'static str;

    /// The tool-reserved artifact path on the given volume.
    fn artifact_path(&self, mount: &str) -> PathBuf;

    /// Container directory the layout introduces, if any.
    fn container_dir(&self, mount: &str) -> Option<PathBuf>;

    /// Fast native preallocation: create a file of exactly `size_bytes`.
    fn preallocate_command(&self, artifact: &Path, size_bytes: u64) -> Option<ToolCommand>;

    /// Native bulk zero-fill writing `chunk_count` chunks of `chunk_bytes`.
    fn zero_fill_command(
        &self,
        artifact: &Path,
        chunk_bytes: u64,
        chunk_count: u64,
    ) -> Option<ToolCommand>;
}

/// `<mount>\FAKETMP\fakefile.tmp`, preallocated with `fsutil`.
///
/// Drive mounts are expected in rooted form (`C:\`), which is how the
/// catalog reports them; a bare `C:` would be drive-relative.
#[derive(Debug, Default)]
pub struct WindowsLayout;

impl VolumeLayout for WindowsLayout {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn artifact_path(&self, mount: &str) -> PathBuf {
        let mut path = PathBuf::from(mount);
        path.push(WINDOWS_CONTAINER_DIR);
        path.push(WINDOWS_ARTIFACT_FILE);
        path
    }

    fn container_dir(&self, mount: &str) -> Option<PathBuf> {
        let mut path = PathBuf::from(mount);
        path.push(WINDOWS_CONTAINER_DIR);
        Some(path)
    }

    fn preallocate_command(&self, artifact: &Path, size_bytes: u64) -> Option<ToolCommand> {
        // fsutil file createnew <path> <length>
        Some(ToolCommand {
            program: "fsutil",
            args: vec![
                "file".to_string(),
                "createnew".to_string(),
                artifact.to_string_lossy().into_owned(),
                size_bytes.to_string(),
            ],
        })
    }

    fn zero_fill_command(&self, _artifact: &Path, _chunk: u64, _count: u64) -> Option<ToolCommand> {
        None
    }
}

/// `<mount>/testfile`, preallocated with `fallocate`, zero-filled with `dd`.
#[derive(Debug, Default)]
pub struct PosixLayout;

impl VolumeLayout for PosixLayout {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn artifact_path(&self, mount: &str) -> PathBuf {
        Path::new(mount).join(POSIX_ARTIFACT_FILE)
    }

    fn container_dir(&self, _mount: &str) -> Option<PathBuf> {
        None
    }

    fn preallocate_command(&self, artifact: &Path, size_bytes: u64) -> Option<ToolCommand> {
        // fallocate -l <length> <path> — instant on ext4/xfs, absent on macOS
        // (the runner reports it unavailable and the dd path runs instead).
        Some(ToolCommand {
            program: "fallocate",
            args: vec![
                "-l".to_string(),
                size_bytes.to_string(),
                artifact.to_string_lossy().into_owned(),
            ],
        })
    }

    fn zero_fill_command(
        &self,
        artifact: &Path,
        chunk_bytes: u64,
        chunk_count: u64,
    ) -> Option<ToolCommand> {
        // dd if=/dev/zero of=<path> bs=<chunk> count=<n>
        Some(ToolCommand {
            program: "dd",
            args: vec![
                "if=/dev/zero".to_string(),
                format!("of={}", artifact.to_string_lossy()),
                format!("bs={chunk_bytes}"),
                format!("count={chunk_count}"),
            ],
        })
    }
}

/// Select the layout for the running platform.
#[must_use]
pub fn detect_layout() -> Arc<dyn VolumeLayout> {
    #[cfg(windows)]
    {
        Arc::new(WindowsLayout)
    }
    #[cfg(not(windows))]
    {
        Arc::new(PosixLayout)
    }
}
