//! Volume catalog: eager snapshots of mounted volumes with byte counts.
//!
//! Downstream code repeatedly re-derives percentages from a listing, so
//! `list_volumes` returns a fully materialized snapshot rather than a lazy
//! iterator. A snapshot is only valid until the next fill or release; the
//! catalog is re-queried for every operation.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MdfError, Result};
use crate::platform::pal::Platform;

/// Read-only snapshot of a single mounted volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Drive letter or mount path.
    pub mount: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl VolumeInfo {
    /// Free space as a percentage of total capacity.
    #[must_use]
    pub fn free_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            (self.free_bytes as f64 * 100.0) / self.total_bytes as f64
        }
    }
}

/// Result of one catalog query.
///
/// `degraded` marks the reduced fallback enumeration; `skipped` carries the
/// mounts whose stats query failed. Both are metadata, not errors — a
/// partial listing is the correct degraded result.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub volumes: Vec<VolumeInfo>,
    pub degraded: bool,
    pub skipped: Vec<String>,
}

impl CatalogSnapshot {
    /// Look up a volume by its exact mount identifier.
    #[must_use]
    pub fn find(&self, mount: &str) -> Option<&VolumeInfo> {
        self.volumes.iter().find(|v| v.mount == mount)
    }
}

/// Enumerates mounted, non-virtual volumes.
pub struct VolumeCatalog {
    platform: Arc<dyn Platform>,
}

impl VolumeCatalog {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Produce a fresh snapshot of all mounted, non-virtual volumes.
    ///
    /// Never fails: an unavailable mount table degrades to the reduced
    /// root/home enumeration, and a stats failure for one volume excludes
    /// that volume only.
    pub fn list_volumes(&self) -> CatalogSnapshot {
        match self.platform.mount_entries() {
            Ok(entries) => self.snapshot_from_mount_table(entries),
            Err(error) => {
                eprintln!(
                    "[mdf] warning: mount enumeration unavailable ({error}); \
                     falling back to a reduced volume listing"
                );
                self.snapshot_from_fallback_roots()
            }
        }
    }

    /// Resolve an arbitrary path to its containing volume by longest
    /// mount-prefix match.
    pub fn volume_for_path(&self, path: &Path) -> Result<VolumeInfo> {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let snapshot = self.list_volumes();
        snapshot
            .volumes
            .iter()
            .filter(|v| resolved.starts_with(Path::new(&v.mount)))
            .max_by_key(|v| v.mount.len())
            .cloned()
            .ok_or_else(|| MdfError::VolumeUnavailable {
                mount: path.to_string_lossy().into_owned(),
            })
    }

    fn snapshot_from_mount_table(
        &self,
        entries: Vec<crate::platform::pal::MountEntry>,
    ) -> CatalogSnapshot {
        let mut volumes: Vec<VolumeInfo> = Vec::new();
        let mut skipped = Vec::new();

        for entry in entries.into_iter().filter(|e| !e.is_virtual) {
            let mount = entry.path.to_string_lossy().into_owned();
            match self.platform.usage(&entry.path) {
                Ok(usage) => {
                    let info = VolumeInfo {
                        mount,
                        total_bytes: usage.total_bytes,
                        used_bytes: usage.used_bytes,
                        free_bytes: usage.free_bytes,
                    };
                    // An overmounted path appears twice; the later table row
                    // is the visible filesystem.
                    if let Some(pos) = volumes.iter().position(|v| v.mount == info.mount) {
                        volumes[pos] = info;
                    } else {
                        volumes.push(info);
                    }
                }
                Err(error) => {
                    eprintln!("[mdf] warning: excluding volume {mount}: {error}");
                    skipped.push(mount);
                }
            }
        }

        CatalogSnapshot {
            volumes,
            degraded: false,
            skipped,
        }
    }

    fn snapshot_from_fallback_roots(&self) -> CatalogSnapshot {
        let mut volumes = Vec::new();
        let mut skipped = Vec::new();
        // Root and home often share a volume; identical byte counts mean
        // the same filesystem.
        let mut seen = HashSet::<(u64, u64)>::new();

        for root in self.platform.fallback_roots() {
            let mount = root.to_string_lossy().into_owned();
            match self.platform.usage(&root) {
                Ok(usage) => {
                    if seen.insert((usage.total_bytes, usage.free_bytes)) {
                        volumes.push(VolumeInfo {
                            mount,
                            total_bytes: usage.total_bytes,
                            used_bytes: usage.used_bytes,
                            free_bytes: usage.free_bytes,
                        });
                    }
                }
                Err(error) => {
                    eprintln!("[mdf] warning: excluding volume {mount}: {error}");
                    skipped.push(mount);
                }
            }
        }

        CatalogSnapshot {
            volumes,
            degraded: true,
            skipped,
        }
    }
}
