//! Release engine: remove a filler artifact and restore the consumed space.
//!
//! Deletion is guarded by the tool's reserved naming convention — a job
//! whose artifact path does not match the layout's path for that volume is
//! refused, so a corrupted or hand-edited job can never delete unrelated
//! files. Releasing an already-released job is a successful no-op.

#![allow(missing_docs)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::VolumeInfo;
use crate::core::errors::{MdfError, Result};
use crate::filler::fill::FillJob;
use crate::platform::layout::VolumeLayout;

/// Outcome of one release call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseReport {
    pub freed_bytes: u64,
    pub artifact_removed: bool,
    pub container_removed: bool,
}

/// Removes filler artifacts created by the fill engine.
pub struct ReleaseEngine {
    layout: Arc<dyn VolumeLayout>,
}

impl ReleaseEngine {
    #[must_use]
    pub fn new(layout: Arc<dyn VolumeLayout>) -> Self {
        Self { layout }
    }

    /// Delete the job's artifact and, when this tool created it and it is
    /// now empty, the container directory.
    pub fn release(&self, job: &FillJob) -> Result<ReleaseReport> {
        let mount = &job.volume.mount;
        let expected = self.layout.artifact_path(mount);
        if job.artifact_path != expected {
            return Err(MdfError::InvalidTarget {
                mount: mount.clone(),
                path: job.artifact_path.clone(),
            });
        }

        let metadata = match fs::symlink_metadata(&expected) {
            Ok(metadata) => metadata,
            // A prior partial run or manual cleanup already removed it.
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReleaseReport {
                    freed_bytes: 0,
                    artifact_removed: false,
                    container_removed: false,
                });
            }
            Err(error) => return Err(MdfError::io(&expected, error)),
        };

        // Whatever sits at the reserved path, only a regular file can be
        // our artifact. A directory or symlink there is not ours to delete.
        if !metadata.is_file() {
            return Err(MdfError::InvalidTarget {
                mount: mount.clone(),
                path: expected,
            });
        }

        let freed_bytes = metadata.len();
        fs::remove_file(&expected).map_err(|error| {
            if error.kind() == std::io::ErrorKind::PermissionDenied {
                MdfError::PermissionDenied {
                    mount: mount.clone(),
                    path: expected.clone(),
                }
            } else {
                MdfError::io(&expected, error)
            }
        })?;

        let container_removed = job.container_dir_created && self.try_remove_container(mount);

        Ok(ReleaseReport {
            freed_bytes,
            artifact_removed: true,
            container_removed,
        })
    }

    /// Reconstruct the job for an artifact left by a prior run, if any.
    ///
    /// The reconstructed job carries a zero reserve — the original margin
    /// is not recorded on disk and is not needed to release.
    pub fn discover(&self, volume: &VolumeInfo) -> Result<Option<FillJob>> {
        let artifact = self.layout.artifact_path(&volume.mount);
        let metadata = match fs::symlink_metadata(&artifact) {
            Ok(metadata) => metadata,
            // NotADirectory covers bind-mounted single files showing up in
            // the mount table; nothing can live under them.
            Err(error)
                if matches!(
                    error.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                return Ok(None);
            }
            Err(error) => return Err(MdfError::io(&artifact, error)),
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        Ok(Some(FillJob {
            volume: volume.clone(),
            reserve_bytes: 0,
            fill_size_bytes: metadata.len(),
            artifact_path: artifact,
            container_dir_created: self
                .layout
                .container_dir(&volume.mount)
                .is_some_and(|dir| dir.is_dir()),
        }))
    }

    /// Remove the container directory only when it is empty — it may hold
    /// user data added after the fill.
    fn try_remove_container(&self, mount: &str) -> bool {
        let Some(dir) = self.layout.container_dir(mount) else {
            return false;
        };
        if !is_empty_dir(&dir) {
            return false;
        }
        match fs::remove_dir(&dir) {
            Ok(()) => true,
            Err(error) => {
                eprintln!(
                    "[mdf] warning: could not remove container {}: {error}",
                    dir.display()
                );
                false
            }
        }
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{FillConfig, MIB};
    use crate::filler::fill::{FillEngine, FillMethod};
    use crate::platform::layout::{PosixLayout, WindowsLayout};
    use crate::platform::process::{Invocation, ProcessRunner};

    /// Every native tool is absent; fills take the chunked path.
    struct NoTools;

    impl ProcessRunner for NoTools {
        fn run(&self, _program: &str, _args: &[String]) -> Result<Invocation> {
            Ok(Invocation::Unavailable)
        }
    }

    fn volume_at(dir: &Path, free_bytes: u64) -> VolumeInfo {
        VolumeInfo {
            mount: dir.to_string_lossy().into_owned(),
            total_bytes: free_bytes * 2,
            used_bytes: free_bytes,
            free_bytes,
        }
    }

    fn filled_job(dir: &Path, layout: Arc<dyn VolumeLayout>, free: u64, reserve: u64) -> FillJob {
        let engine = FillEngine::new(layout, Arc::new(NoTools), FillConfig::default());
        let report = engine.fill(&volume_at(dir, free), reserve).unwrap();
        assert_ne!(report.method, FillMethod::AlreadyFilled);
        report.job
    }

    #[test]
    fn release_frees_the_artifact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let job = filled_job(dir.path(), Arc::new(PosixLayout), 2 * MIB + 77, MIB);

        let engine = ReleaseEngine::new(Arc::new(PosixLayout));
        let report = engine.release(&job).expect("release should succeed");

        assert_eq!(report.freed_bytes, MIB + 77);
        assert!(report.artifact_removed);
        assert!(!job.artifact_path.exists());
    }

    #[test]
    fn releasing_twice_is_a_successful_noop() {
        let dir = tempfile::tempdir().unwrap();
        let job = filled_job(dir.path(), Arc::new(PosixLayout), 2 * MIB, 0);
        let engine = ReleaseEngine::new(Arc::new(PosixLayout));

        let first = engine.release(&job).unwrap();
        assert!(first.artifact_removed);

        let second = engine.release(&job).expect("second release is a no-op");
        assert_eq!(second.freed_bytes, 0);
        assert!(!second.artifact_removed);
    }

    #[test]
    fn release_refuses_paths_outside_the_reserved_convention() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("precious.dat");
        fs::write(&victim, b"user data").unwrap();

        let mut job = filled_job(dir.path(), Arc::new(PosixLayout), MIB, 0);
        job.artifact_path = victim.clone();

        let engine = ReleaseEngine::new(Arc::new(PosixLayout));
        let err = engine.release(&job).expect_err("tampered path must be refused");
        assert!(matches!(err, MdfError::InvalidTarget { .. }));
        assert!(victim.exists(), "unrelated file must survive");
    }

    #[test]
    fn release_refuses_a_directory_at_the_reserved_path() {
        let dir = tempfile::tempdir().unwrap();
        let job = filled_job(dir.path(), Arc::new(PosixLayout), MIB, 0);
        fs::remove_file(&job.artifact_path).unwrap();
        fs::create_dir(&job.artifact_path).unwrap();

        let engine = ReleaseEngine::new(Arc::new(PosixLayout));
        let err = engine.release(&job).expect_err("directory is not our artifact");
        assert!(matches!(err, MdfError::InvalidTarget { .. }));
        assert!(job.artifact_path.is_dir());
    }

    #[test]
    fn empty_container_dir_is_removed_with_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let job = filled_job(dir.path(), Arc::new(WindowsLayout), MIB, 0);
        assert!(job.container_dir_created);

        let engine = ReleaseEngine::new(Arc::new(WindowsLayout));
        let report = engine.release(&job).unwrap();

        assert!(report.container_removed);
        assert!(!dir.path().join("FAKETMP").exists());
    }

    #[test]
    fn container_dir_with_user_data_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let job = filled_job(dir.path(), Arc::new(WindowsLayout), MIB, 0);

        // The operator dropped a file next to the artifact after the fill.
        let stray = dir.path().join("FAKETMP").join("notes.txt");
        fs::write(&stray, b"keep me").unwrap();

        let engine = ReleaseEngine::new(Arc::new(WindowsLayout));
        let report = engine.release(&job).unwrap();

        assert!(report.artifact_removed);
        assert!(!report.container_removed);
        assert!(stray.exists());
    }

    #[test]
    fn container_dir_not_created_by_us_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("FAKETMP")).unwrap();
        let job = filled_job(dir.path(), Arc::new(WindowsLayout), MIB, 0);
        assert!(!job.container_dir_created);

        let engine = ReleaseEngine::new(Arc::new(WindowsLayout));
        let report = engine.release(&job).unwrap();

        assert!(report.artifact_removed);
        assert!(!report.container_removed);
        assert!(dir.path().join("FAKETMP").is_dir());
    }

    #[test]
    fn discover_rebuilds_a_job_from_a_prior_run() {
        let dir = tempfile::tempdir().unwrap();
        let original = filled_job(dir.path(), Arc::new(PosixLayout), 3 * MIB, MIB);

        // A fresh process knows nothing but the path convention.
        let engine = ReleaseEngine::new(Arc::new(PosixLayout));
        let volume = volume_at(dir.path(), MIB);
        let found = engine
            .discover(&volume)
            .unwrap()
            .expect("artifact should be discovered");

        assert_eq!(found.artifact_path, original.artifact_path);
        assert_eq!(found.fill_size_bytes, 2 * MIB);

        let report = engine.release(&found).unwrap();
        assert_eq!(report.freed_bytes, 2 * MIB);
    }

    #[test]
    fn discover_returns_none_without_an_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ReleaseEngine::new(Arc::new(PosixLayout));
        let volume = volume_at(dir.path(), MIB);
        assert!(engine.discover(&volume).unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn discover_tolerates_a_file_as_mount_point() {
        // Containers bind-mount single files (e.g. /etc/hosts), and those
        // rows reach the catalog like any other mount.
        let dir = tempfile::tempdir().unwrap();
        let file_mount = dir.path().join("hosts");
        fs::write(&file_mount, b"127.0.0.1 localhost").unwrap();

        let engine = ReleaseEngine::new(Arc::new(PosixLayout));
        let volume = volume_at(&file_mount, MIB);
        assert!(engine.discover(&volume).unwrap().is_none());
    }
}
