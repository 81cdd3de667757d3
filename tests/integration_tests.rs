//! Integration tests: CLI smoke tests against the built binary, plus
//! full-pipeline scenarios through the public library API.
//!
//! The CLI tests stay strictly non-destructive: no invocation here ever
//! passes `--yes`, so nothing can fill or delete on the host running them.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use mock_disk_full::catalog::VolumeInfo;
use mock_disk_full::core::config::{FillConfig, MIB};
use mock_disk_full::core::errors::Result;
use mock_disk_full::filler::fill::{FillEngine, FillMethod, fill_size_bytes};
use mock_disk_full::filler::release::ReleaseEngine;
use mock_disk_full::filler::reserve::ReserveCalculator;
use mock_disk_full::platform::layout::PosixLayout;
use mock_disk_full::platform::process::{Invocation, ProcessRunner};

// ──────────────────── CLI smoke tests ────────────────────

#[test]
fn help_prints_usage() {
    let result = common::run_mdf("help_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "--help should succeed; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: mdf"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn no_arguments_shows_help_and_fails() {
    let result = common::run_mdf("no_arguments_shows_help_and_fails", &[]);
    assert!(
        !result.status.success(),
        "bare invocation should not succeed; log: {}",
        result.log_path.display()
    );
    let combined = format!("{}{}", result.stdout, result.stderr);
    assert!(
        combined.contains("Usage"),
        "bare invocation should print usage; log: {}",
        result.log_path.display()
    );
}

#[test]
fn subcommand_help_flags_work() {
    let subcommands = [
        "list",
        "fill",
        "release",
        "status",
        "config",
        "version",
        "completions",
    ];
    for subcmd in subcommands {
        let case = format!("subcommand_{subcmd}_help");
        let result = common::run_mdf(&case, &[subcmd, "--help"]);
        assert!(
            result.status.success(),
            "'{subcmd} --help' failed; log: {}",
            result.log_path.display()
        );
        assert!(
            result.stdout.contains("Usage"),
            "'{subcmd} --help' missing usage; log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn unknown_subcommand_is_rejected() {
    let result = common::run_mdf("unknown_subcommand_is_rejected", &["frobnicate"]);
    assert!(
        !result.status.success(),
        "unknown subcommand should fail; log: {}",
        result.log_path.display()
    );
}

#[test]
fn fill_requires_a_path_argument() {
    let result = common::run_mdf("fill_requires_a_path_argument", &["fill"]);
    assert!(
        !result.status.success(),
        "fill without a path should fail; log: {}",
        result.log_path.display()
    );
}

#[test]
fn fill_without_confirmation_is_refused() {
    // stdin is not a terminal here and --yes is absent, so the run must
    // stop before anything is written, with the user-error exit code.
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_mdf(
        "fill_without_confirmation_is_refused",
        &["fill", dir.path().to_str().unwrap()],
    );
    assert_eq!(
        result.status.code(),
        Some(1),
        "unconfirmed fill should exit 1; log: {}",
        result.log_path.display()
    );
}

#[test]
fn release_scan_without_tty_never_deletes() {
    // With no artifacts the scan reports an empty result; with artifacts it
    // must stop at the missing confirmation. Either way it produces output
    // and deletes nothing.
    let result = common::run_mdf("release_scan_without_tty_never_deletes", &["release"]);
    let combined = format!("{}{}", result.stdout, result.stderr);
    assert!(
        !combined.is_empty(),
        "release scan should report something; log: {}",
        result.log_path.display()
    );
}

#[test]
fn list_emits_machine_readable_snapshot() {
    let result = common::run_mdf("list_emits_machine_readable_snapshot", &["list", "--json"]);
    assert!(
        result.status.success(),
        "list --json should succeed; log: {}",
        result.log_path.display()
    );
    let line = result
        .stdout
        .lines()
        .next()
        .expect("list --json should emit one line");
    let payload: Value = serde_json::from_str(line).expect("list output should be valid JSON");
    assert_eq!(payload["command"], "list");
    assert!(payload["volumes"].is_array());
}

#[test]
fn status_reports_occupancy() {
    let result = common::run_mdf("status_reports_occupancy", &["status", "--json"]);
    let combined = format!("{}{}", result.stdout, result.stderr);
    assert!(
        !combined.is_empty(),
        "status --json should produce output; log: {}",
        result.log_path.display()
    );
    if result.status.success() {
        assert!(
            result.stdout.contains("\"command\":\"status\""),
            "status payload missing command field; log: {}",
            result.log_path.display()
        );
    }
}

// ──────────────────── configuration surface ────────────────────

#[test]
fn config_path_names_the_resolved_file() {
    let result = common::run_mdf("config_path_names_the_resolved_file", &["config", "path"]);
    assert!(
        result.status.success(),
        "config path should succeed; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("config.toml"),
        "config path should name the file; log: {}",
        result.log_path.display()
    );
}

#[test]
fn config_validate_accepts_a_well_formed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[reserve]\nmargin_mb = 64\n").unwrap();

    let result = common::run_mdf(
        "config_validate_accepts_a_well_formed_file",
        &["--config", path.to_str().unwrap(), "config", "validate"],
    );
    assert!(
        result.status.success(),
        "valid config should validate; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("valid"),
        "validate should confirm validity; log: {}",
        result.log_path.display()
    );
}

#[test]
fn config_validate_rejects_a_zero_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[fill]\nchunk_size_bytes = 0\n").unwrap();

    let result = common::run_mdf(
        "config_validate_rejects_a_zero_chunk_size",
        &["--config", path.to_str().unwrap(), "config", "validate"],
    );
    assert_eq!(
        result.status.code(),
        Some(2),
        "invalid config should exit 2; log: {}",
        result.log_path.display()
    );
}

#[test]
fn explicitly_missing_config_file_fails() {
    let result = common::run_mdf(
        "explicitly_missing_config_file_fails",
        &["--config", "/nonexistent/mdf/config.toml", "config", "validate"],
    );
    assert_eq!(
        result.status.code(),
        Some(2),
        "missing explicit config should exit 2; log: {}",
        result.log_path.display()
    );
}

#[test]
fn config_show_round_trips_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[reserve]\nmargin_mb = 128\n").unwrap();

    let result = common::run_mdf(
        "config_show_round_trips_the_file",
        &["--config", path.to_str().unwrap(), "config", "show", "--json"],
    );
    assert!(
        result.status.success(),
        "config show should succeed; log: {}",
        result.log_path.display()
    );
    let payload: Value =
        serde_json::from_str(result.stdout.lines().next().unwrap()).expect("valid JSON");
    assert_eq!(payload["reserve"]["margin_mb"], 128);
}

#[test]
fn env_override_beats_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[reserve]\nmargin_mb = 128\n").unwrap();

    let result = common::run_mdf_env(
        "env_override_beats_the_config_file",
        &["--config", path.to_str().unwrap(), "config", "show", "--json"],
        &[("MDF_RESERVE_MARGIN_MB", "64")],
    );
    assert!(
        result.status.success(),
        "config show should succeed; log: {}",
        result.log_path.display()
    );
    let payload: Value =
        serde_json::from_str(result.stdout.lines().next().unwrap()).expect("valid JSON");
    assert_eq!(payload["reserve"]["margin_mb"], 64);
}

#[test]
fn malformed_env_override_fails() {
    let result = common::run_mdf_env(
        "malformed_env_override_fails",
        &["config", "validate"],
        &[("MDF_RESERVE_MARGIN_MB", "lots")],
    );
    assert_eq!(
        result.status.code(),
        Some(2),
        "unparseable env override should exit 2; log: {}",
        result.log_path.display()
    );
}

// ──────────────────── version / completions ────────────────────

#[test]
fn version_reports_binary_and_version() {
    let result = common::run_mdf("version_reports_binary_and_version", &["version", "--json"]);
    assert!(
        result.status.success(),
        "version should succeed; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("\"binary\":\"mdf\""),
        "version payload missing binary; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains(env!("CARGO_PKG_VERSION")),
        "version payload missing version; log: {}",
        result.log_path.display()
    );
}

#[test]
fn completions_script_mentions_the_binary() {
    let result = common::run_mdf(
        "completions_script_mentions_the_binary",
        &["completions", "bash"],
    );
    assert!(
        result.status.success(),
        "completions should succeed; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("mdf"),
        "completion script should mention mdf; log: {}",
        result.log_path.display()
    );
}

// ──────────────────── public API pipeline ────────────────────

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

#[test]
fn public_api_fill_discover_release_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let volume = volume_at(dir.path(), 4 * MIB);
    let layout = Arc::new(PosixLayout);

    let fill = FillEngine::new(layout.clone(), Arc::new(NoTools), FillConfig::default());
    let report = fill.fill(&volume, MIB).expect("fill should succeed");
    assert_eq!(report.method, FillMethod::ChunkedWrite);
    assert_eq!(report.bytes_written, 3 * MIB);

    let release = ReleaseEngine::new(layout);
    let job = release
        .discover(&volume)
        .unwrap()
        .expect("artifact should be discoverable");
    let released = release.release(&job).expect("release should succeed");
    assert_eq!(released.freed_bytes, 3 * MIB);
    assert!(!job.artifact_path.exists());
}

#[test]
fn public_api_zero_target_fill_creates_a_marker() {
    let dir = tempfile::tempdir().unwrap();
    let volume = volume_at(dir.path(), 400 * MIB);
    let layout = Arc::new(PosixLayout);

    let fill = FillEngine::new(layout.clone(), Arc::new(NoTools), FillConfig::default());
    let reserve = ReserveCalculator::default();
    let report = fill
        .fill(&volume, reserve.reserve_bytes())
        .expect("below-reserve fill is a success");
    assert_eq!(report.method, FillMethod::Empty);
    assert_eq!(fs::metadata(&report.job.artifact_path).unwrap().len(), 0);

    let release = ReleaseEngine::new(layout);
    let released = release.release(&report.job).unwrap();
    assert_eq!(released.freed_bytes, 0);
    assert!(released.artifact_removed);
}

#[test]
fn documented_reserve_arithmetic_holds() {
    let reserve = ReserveCalculator::default();
    assert_eq!(reserve.reserve_bytes(), 510 * MIB);
    assert_eq!(fill_size_bytes(1000 * MIB, reserve.reserve_bytes()), 490 * MIB);
    assert_eq!(fill_size_bytes(400 * MIB, reserve.reserve_bytes()), 0);
}
