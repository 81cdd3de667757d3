//! Platform metrics sources: mount enumeration and per-volume byte counts.
//!
//! Linux reads `/proc/self/mounts`; macOS shells out to `df -P` through the
//! process-runner seam. Byte counts always come from `statvfs`. Every query
//! is fresh — filling and releasing change the numbers, so nothing here is
//! cached.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::errors::{MdfError, Result};
#[cfg(target_os = "macos")]
use crate::platform::process::SystemProcessRunner;
use crate::platform::process::{Invocation, ProcessRunner};

/// One row of the platform mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub path: PathBuf,
    pub device: String,
    pub fs_type: String,
    /// Pseudo-filesystems (proc, tmpfs, cgroups, ...) that are not real
    /// storage volumes and must not be offered for filling.
    pub is_virtual: bool,
}

/// Byte counts for one volume, straight from the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// OS abstraction the volume catalog is built on.
pub trait Platform: Send + Sync {
    /// Preferred enumeration: the full mount table.
    fn mount_entries(&self) -> Result<Vec<MountEntry>>;

    /// Byte counts for the volume mounted at `mount`.
    fn usage(&self, mount: &Path) -> Result<VolumeUsage>;

    /// Reduced enumeration used when the mount table is unavailable:
    /// the root volume plus the home volume.
    fn fallback_roots(&self) -> Vec<PathBuf>;
}

fn default_fallback_roots() -> Vec<PathBuf> {
    let mut roots = vec![PathBuf::from("/")];
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        let resolved = home.canonicalize().unwrap_or(home);
        if resolved.is_dir() {
            roots.push(resolved);
        }
    }
    roots
}

#[cfg(unix)]
fn statvfs_usage(mount: &Path) -> Result<VolumeUsage> {
    let stat = nix::sys::statvfs::statvfs(mount).map_err(|error| MdfError::VolumeStats {
        mount: mount.to_string_lossy().into_owned(),
        details: error.to_string(),
    })?;
    let fragment = stat.fragment_size();
    let total_bytes = stat.blocks().saturating_mul(fragment);
    // Matches df: "free" is what an unprivileged writer can use, "used"
    // excludes the filesystem's own reserved blocks. used + free ≈ total.
    let free_bytes = stat.blocks_available().saturating_mul(fragment);
    let used_bytes = total_bytes.saturating_sub(stat.blocks_free().saturating_mul(fragment));
    Ok(VolumeUsage {
        total_bytes,
        used_bytes,
        free_bytes,
    })
}

// ──────────────────── Linux ────────────────────

/// Linux implementation backed by `/proc/self/mounts` + `statvfs`.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Platform for LinuxPlatform {
    fn mount_entries(&self) -> Result<Vec<MountEntry>> {
        let raw =
            std::fs::read_to_string("/proc/self/mounts").map_err(|source| MdfError::Io {
                path: PathBuf::from("/proc/self/mounts"),
                source,
            })?;
        Ok(parse_mounts_table(&raw))
    }

    fn usage(&self, mount: &Path) -> Result<VolumeUsage> {
        statvfs_usage(mount)
    }

    fn fallback_roots(&self) -> Vec<PathBuf> {
        default_fallback_roots()
    }
}

// ──────────────────── macOS ────────────────────

/// macOS implementation backed by `df -P` + `statvfs`.
///
/// APFS containers share a device, so `df` output (not `st_dev` grouping)
/// is the authoritative mount listing.
#[cfg(unix)]
pub struct MacPlatform {
    runner: Arc<dyn ProcessRunner>,
}

#[cfg(unix)]
impl MacPlatform {
    #[must_use]
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[cfg(unix)]
impl Platform for MacPlatform {
    fn mount_entries(&self) -> Result<Vec<MountEntry>> {
        let invocation = self
            .runner
            .run("df", &["-P".to_string(), "-k".to_string()])?;
        match invocation {
            Invocation::Completed(out) if out.success => parse_df_output(&out.stdout),
            Invocation::Completed(out) => Err(MdfError::MountParse {
                details: format!("df exited unsuccessfully: {}", out.diagnostic()),
            }),
            Invocation::Unavailable => Err(MdfError::MountParse {
                details: "df not found on PATH".to_string(),
            }),
        }
    }

    fn usage(&self, mount: &Path) -> Result<VolumeUsage> {
        statvfs_usage(mount)
    }

    fn fallback_roots(&self) -> Vec<PathBuf> {
        default_fallback_roots()
    }
}

// ──────────────────── mock ────────────────────

/// In-memory implementation for deterministic tests.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    entries: Vec<MountEntry>,
    usage_by_mount: std::collections::HashMap<PathBuf, VolumeUsage>,
    table_available: bool,
    roots: Vec<PathBuf>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self {
            entries,
            usage_by_mount: std::collections::HashMap::new(),
            table_available: true,
            roots: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_usage(mut self, mount: impl Into<PathBuf>, usage: VolumeUsage) -> Self {
        self.usage_by_mount.insert(mount.into(), usage);
        self
    }

    /// Simulate an unavailable mount table (forces the degraded fallback).
    #[must_use]
    pub fn without_mount_table(mut self, roots: Vec<PathBuf>) -> Self {
        self.table_available = false;
        self.roots = roots;
        self
    }
}

impl Platform for MockPlatform {
    fn mount_entries(&self) -> Result<Vec<MountEntry>> {
        if self.table_available {
            Ok(self.entries.clone())
        } else {
            Err(MdfError::MountParse {
                details: "mock mount table offline".to_string(),
            })
        }
    }

    fn usage(&self, mount: &Path) -> Result<VolumeUsage> {
        self.usage_by_mount
            .get(mount)
            .copied()
            .ok_or_else(|| MdfError::VolumeStats {
                mount: mount.to_string_lossy().into_owned(),
                details: "mock usage not configured".to_string(),
            })
    }

    fn fallback_roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }
}

/// Detect the active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(MacPlatform::new(Arc::new(SystemProcessRunner))))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(MdfError::UnsupportedPlatform {
            details: "volume metrics are implemented for Linux and macOS".to_string(),
        })
    }
}

// ──────────────────── parsing ────────────────────

fn parse_mounts_table(raw: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            eprintln!("[mdf] warning: skipping malformed mount table line: {line}");
            continue;
        }
        let device = fields[0].to_string();
        entries.push(MountEntry {
            path: decode_mount_path(fields[1]),
            is_virtual: !is_device_backed(&device),
            device,
            fs_type: fields[2].to_string(),
        });
    }
    entries
}

fn parse_df_output(raw: &str) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();
    // First line is the column header.
    for line in raw.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            if !line.trim().is_empty() {
                eprintln!("[mdf] warning: skipping malformed df line: {line}");
            }
            continue;
        }
        let device = fields[0].to_string();
        // Mount paths may contain spaces; everything past the capacity
        // column belongs to the path.
        let mount = fields[5..].join(" ");
        entries.push(MountEntry {
            path: PathBuf::from(mount),
            is_virtual: !is_device_backed(&device),
            device,
            fs_type: String::new(),
        });
    }
    if entries.is_empty() {
        return Err(MdfError::MountParse {
            details: "df produced no mount rows".to_string(),
        });
    }
    Ok(entries)
}

fn is_device_backed(device: &str) -> bool {
    device.starts_with("/dev/")
}

/// Decode the kernel's octal escapes (`\040` for space, etc.) in mount
/// paths, preserving raw bytes for non-UTF-8 names.
fn decode_mount_path(raw: &str) -> PathBuf {
    let raw_bytes = raw.as_bytes();
    let mut bytes = Vec::with_capacity(raw_bytes.len());
    let mut i = 0;
    while i < raw_bytes.len() {
        let rest = &raw_bytes[i..];
        if rest.len() >= 4 && rest[0] == b'\\' && rest[1..4].iter().all(u8::is_ascii_digit) {
            let octal = [rest[1], rest[2], rest[3]];
            if octal.iter().all(|d| (b'0'..=b'7').contains(d)) {
                bytes.push((octal[0] - b'0') * 64 + (octal[1] - b'0') * 8 + (octal[2] - b'0'));
                i += 4;
                continue;
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}
