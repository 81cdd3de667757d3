//! Fill engine: create a single filler artifact sized to (free − reserve).
//!
//! Strategy selection is a capability probe, not a fixed choice: native
//! preallocation first (`fsutil` / `fallocate`), then native bulk zero-fill
//! (`dd`), then an in-process chunked write loop. Reaching the platform's
//! actual ENOSPC at (or near) the target is the expected end state of a
//! correctly sized fill and is reported as success.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::VolumeInfo;
use crate::core::config::FillConfig;
use crate::core::errors::{MdfError, Result};
use crate::platform::layout::VolumeLayout;
use crate::platform::process::{Invocation, ProcessRunner};

/// Everything needed to later reverse one fill operation.
///
/// The artifact persists across process restarts; a job can be
/// reconstructed from disk via [`crate::filler::release::ReleaseEngine::discover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillJob {
    pub volume: VolumeInfo,
    pub reserve_bytes: u64,
    pub fill_size_bytes: u64,
    pub artifact_path: PathBuf,
    pub container_dir_created: bool,
}

/// How the artifact was (or wasn't) produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMethod {
    /// Fast native preallocation created the file instantly.
    NativePreallocate,
    /// A native zero-writing tool produced the bulk of the file.
    BulkZeroFill,
    /// The in-process chunked write loop ran.
    ChunkedWrite,
    /// Free space was at or below the reserve; a zero-size artifact marks
    /// the volume as filled.
    Empty,
    /// An artifact from a prior run already occupies the reserved path.
    AlreadyFilled,
}

impl FillMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NativePreallocate => "native_preallocate",
            Self::BulkZeroFill => "bulk_zero_fill",
            Self::ChunkedWrite => "chunked_write",
            Self::Empty => "empty",
            Self::AlreadyFilled => "already_filled",
        }
    }
}

/// Outcome of one fill call.
#[derive(Debug, Clone)]
pub struct FillReport {
    pub job: FillJob,
    pub method: FillMethod,
    pub bytes_written: u64,
}

/// Bytes to consume on a volume: `max(0, free − reserve)`.
#[must_use]
pub const fn fill_size_bytes(free_bytes: u64, reserve_bytes: u64) -> u64 {
    free_bytes.saturating_sub(reserve_bytes)
}

/// Creates filler artifacts using the fastest available platform mechanism.
pub struct FillEngine {
    layout: Arc<dyn VolumeLayout>,
    runner: Arc<dyn ProcessRunner>,
    tuning: FillConfig,
}

impl FillEngine {
    #[must_use]
    pub fn new(
        layout: Arc<dyn VolumeLayout>,
        runner: Arc<dyn ProcessRunner>,
        tuning: FillConfig,
    ) -> Self {
        Self {
            layout,
            runner,
            tuning,
        }
    }

    /// The tool-reserved artifact path for a volume.
    #[must_use]
    pub fn artifact_path(&self, volume: &VolumeInfo) -> PathBuf {
        self.layout.artifact_path(&volume.mount)
    }

    /// Fill `volume`, leaving `reserve_bytes` untouched.
    ///
    /// Filling a volume that already carries the tool's artifact reports the
    /// existing job rather than double-creating. A fill target of zero is a
    /// success that produces a zero-size artifact.
    pub fn fill(&self, volume: &VolumeInfo, reserve_bytes: u64) -> Result<FillReport> {
        if !Path::new(&volume.mount).is_dir() {
            return Err(MdfError::VolumeUnavailable {
                mount: volume.mount.clone(),
            });
        }

        let artifact = self.layout.artifact_path(&volume.mount);
        if artifact.exists() {
            return self.report_existing(volume, reserve_bytes, artifact);
        }

        let container = self.layout.container_dir(&volume.mount);
        let container_dir_created = match &container {
            Some(dir) if !dir.exists() => {
                fs::create_dir_all(dir)
                    .map_err(|error| classify_io(volume, dir, "create container", &error))?;
                true
            }
            _ => false,
        };

        let target = fill_size_bytes(volume.free_bytes, reserve_bytes);
        let job = FillJob {
            volume: volume.clone(),
            reserve_bytes,
            fill_size_bytes: target,
            artifact_path: artifact.clone(),
            container_dir_created,
        };

        let outcome = self.create_artifact(volume, &artifact, target);
        match outcome {
            Ok((method, bytes_written)) => Ok(FillReport {
                job,
                method,
                bytes_written,
            }),
            Err(error) => {
                // Leave no partial artifact behind a failed fill.
                let _ = fs::remove_file(&artifact);
                if container_dir_created
                    && let Some(dir) = &container
                {
                    let _ = fs::remove_dir(dir);
                }
                Err(error)
            }
        }
    }

    fn report_existing(
        &self,
        volume: &VolumeInfo,
        reserve_bytes: u64,
        artifact: PathBuf,
    ) -> Result<FillReport> {
        let size = fs::metadata(&artifact)
            .map_err(|e| MdfError::io(&artifact, e))?
            .len();
        let container_dir_created = self
            .layout
            .container_dir(&volume.mount)
            .is_some_and(|dir| dir.is_dir());
        Ok(FillReport {
            job: FillJob {
                volume: volume.clone(),
                reserve_bytes,
                fill_size_bytes: size,
                artifact_path: artifact,
                container_dir_created,
            },
            method: FillMethod::AlreadyFilled,
            bytes_written: 0,
        })
    }

    fn create_artifact(
        &self,
        volume: &VolumeInfo,
        artifact: &Path,
        target: u64,
    ) -> Result<(FillMethod, u64)> {
        if target == 0 {
            File::create(artifact)
                .map_err(|error| classify_io(volume, artifact, "create artifact", &error))?;
            return Ok((FillMethod::Empty, 0));
        }

        if self.tuning.prefer_native {
            if let Some(written) = self.try_preallocate(volume, artifact, target)? {
                return Ok((FillMethod::NativePreallocate, written));
            }
            if let Some(written) = self.try_bulk_zero_fill(volume, artifact, target)? {
                return Ok((FillMethod::BulkZeroFill, written));
            }
        }

        let written = self.chunked_write(volume, artifact, target)?;
        Ok((FillMethod::ChunkedWrite, written))
    }

    /// Probe the fast preallocation tool. `None` means "strategy did not
    /// apply" and the next one runs; only environment breakage is an error.
    fn try_preallocate(
        &self,
        volume: &VolumeInfo,
        artifact: &Path,
        target: u64,
    ) -> Result<Option<u64>> {
        let Some(cmd) = self.layout.preallocate_command(artifact, target) else {
            return Ok(None);
        };

        match self.runner.run(cmd.program, &cmd.args)? {
            Invocation::Unavailable => Ok(None),
            Invocation::Completed(out) if !out.success => {
                eprintln!(
                    "[mdf] {} failed on {} ({}); trying the next strategy",
                    cmd.program,
                    volume.mount,
                    out.diagnostic()
                );
                let _ = fs::remove_file(artifact);
                Ok(None)
            }
            Invocation::Completed(_) => {
                let actual = fs::metadata(artifact).map(|m| m.len()).unwrap_or(0);
                if actual == target {
                    Ok(Some(actual))
                } else {
                    // The tool reported success but the size is off; a
                    // truncated artifact would mask a miscalculated fill.
                    eprintln!(
                        "[mdf] {} produced {actual} bytes instead of {target} on {}; \
                         trying the next strategy",
                        cmd.program, volume.mount
                    );
                    let _ = fs::remove_file(artifact);
                    Ok(None)
                }
            }
        }
    }

    /// Probe the native bulk zero-fill tool for the MiB-aligned prefix,
    /// then extend in-process to the exact byte target.
    fn try_bulk_zero_fill(
        &self,
        volume: &VolumeInfo,
        artifact: &Path,
        target: u64,
    ) -> Result<Option<u64>> {
        let chunk = self.tuning.chunk_size_bytes;
        let chunk_count = target / chunk;
        if chunk_count == 0 {
            return Ok(None);
        }
        let Some(cmd) = self.layout.zero_fill_command(artifact, chunk, chunk_count) else {
            return Ok(None);
        };

        match self.runner.run(cmd.program, &cmd.args)? {
            Invocation::Unavailable => Ok(None),
            Invocation::Completed(out) if !out.success => {
                eprintln!(
                    "[mdf] {} failed on {} ({}); trying the next strategy",
                    cmd.program,
                    volume.mount,
                    out.diagnostic()
                );
                let _ = fs::remove_file(artifact);
                Ok(None)
            }
            Invocation::Completed(_) => {
                let aligned = fs::metadata(artifact).map(|m| m.len()).unwrap_or(0);
                if aligned != chunk * chunk_count {
                    eprintln!(
                        "[mdf] {} produced {aligned} bytes instead of {} on {}; \
                         trying the next strategy",
                        cmd.program,
                        chunk * chunk_count,
                        volume.mount
                    );
                    let _ = fs::remove_file(artifact);
                    return Ok(None);
                }
                let written = self.extend_to_target(volume, artifact, aligned, target)?;
                Ok(Some(written))
            }
        }
    }

    /// Append the sub-chunk tail so the artifact reaches the exact target.
    fn extend_to_target(
        &self,
        volume: &VolumeInfo,
        artifact: &Path,
        current: u64,
        target: u64,
    ) -> Result<u64> {
        let remainder = target.saturating_sub(current);
        if remainder == 0 {
            return Ok(current);
        }
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(artifact)
            .map_err(|error| classify_io(volume, artifact, "open artifact", &error))?;
        #[allow(clippy::cast_possible_truncation)]
        let tail = vec![0u8; remainder as usize];
        match file.write_all(&tail) {
            Ok(()) => {
                file.sync_all().map_err(|e| MdfError::io(artifact, e))?;
                Ok(target)
            }
            Err(error) if is_disk_full(&error) && remainder <= self.tuning.enospc_slack_bytes => {
                Ok(fs::metadata(artifact).map(|m| m.len()).unwrap_or(current))
            }
            Err(error) => Err(classify_io(volume, artifact, "extend artifact", &error)),
        }
    }

    /// Manual fallback: stream zero chunks until the target is reached.
    ///
    /// Disk-full at or past (target − slack) is the expected terminal
    /// condition and counts as completion; running out further short
    /// signals a miscalculation or a concurrent consumer.
    fn chunked_write(&self, volume: &VolumeInfo, artifact: &Path, target: u64) -> Result<u64> {
        let mut file = File::create(artifact)
            .map_err(|error| classify_io(volume, artifact, "create artifact", &error))?;

        #[allow(clippy::cast_possible_truncation)]
        let chunk_len = self.tuning.chunk_size_bytes.min(target) as usize;
        let chunk = vec![0u8; chunk_len];
        let mut written: u64 = 0;

        while written < target {
            let remaining = target - written;
            #[allow(clippy::cast_possible_truncation)]
            let to_write = remaining.min(chunk_len as u64) as usize;

            match file.write_all(&chunk[..to_write]) {
                Ok(()) => written += to_write as u64,
                Err(error) if is_disk_full(&error) => {
                    let shortfall = target - written;
                    if shortfall <= self.tuning.enospc_slack_bytes {
                        let _ = file.sync_all();
                        return Ok(written);
                    }
                    return Err(MdfError::WriteFailed {
                        mount: volume.mount.clone(),
                        path: artifact.to_path_buf(),
                        details: format!(
                            "out of space {shortfall} bytes short of the {target}-byte target"
                        ),
                    });
                }
                Err(error) => {
                    return Err(classify_io(volume, artifact, "write artifact", &error));
                }
            }
        }

        file.sync_all().map_err(|e| MdfError::io(artifact, e))?;
        Ok(written)
    }
}

fn classify_io(
    volume: &VolumeInfo,
    path: &Path,
    action: &str,
    error: &std::io::Error,
) -> MdfError {
    if error.kind() == std::io::ErrorKind::PermissionDenied {
        MdfError::PermissionDenied {
            mount: volume.mount.clone(),
            path: path.to_path_buf(),
        }
    } else {
        MdfError::WriteFailed {
            mount: volume.mount.clone(),
            path: path.to_path_buf(),
            details: format!("{action}: {error}"),
        }
    }
}

fn is_disk_full(error: &std::io::Error) -> bool {
    if error.kind() == std::io::ErrorKind::StorageFull {
        return true;
    }
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(nix::errno::Errno::ENOSPC as i32)
    }
    #[cfg(not(unix))]
    {
        false
    }
}
