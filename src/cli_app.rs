//! Top-level CLI definition and dispatch.
//!
//! This layer is glue: it validates a volume selection, collects an explicit
//! confirmation, and drives the operation state machine. All decision logic
//! lives in the library crate.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use mock_disk_full::catalog::{VolumeCatalog, VolumeInfo};
use mock_disk_full::core::config::Config;
use mock_disk_full::core::errors::MdfError;
use mock_disk_full::core::state::OperationGate;
use mock_disk_full::filler::fill::{FillEngine, FillMethod, FillReport, fill_size_bytes};
use mock_disk_full::filler::release::ReleaseEngine;
use mock_disk_full::filler::reserve::ReserveCalculator;
use mock_disk_full::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use mock_disk_full::platform::layout::detect_layout;
use mock_disk_full::platform::pal::detect_platform;
use mock_disk_full::platform::process::SystemProcessRunner;

/// mock_disk_full — fill a volume to near capacity, and undo it.
#[derive(Debug, Parser)]
#[command(
    name = "mdf",
    author,
    version,
    about = "Simulate a nearly-full disk by creating a removable filler file",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List mounted volumes with total/used/free space.
    List,
    /// Fill a volume, leaving only the configured reserve free.
    Fill(FillArgs),
    /// Delete filler artifacts and restore the space.
    Release(ReleaseArgs),
    /// Show which volumes currently carry a filler artifact.
    Status,
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct FillArgs {
    /// Mount point, or any path on the volume to fill.
    #[arg(value_name = "PATH")]
    path: PathBuf,
    /// Override the reserve margin for this run (megabytes).
    #[arg(long, value_name = "MB")]
    reserve_mb: Option<u64>,
    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Clone, Args)]
struct ReleaseArgs {
    /// Limit the release to the volume containing this path.
    /// All volumes are scanned when omitted.
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,
    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::List => run_list(cli),
        Command::Fill(args) => run_fill(cli, args),
        Command::Release(args) => run_release(cli, args),
        Command::Status => run_status(cli),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── list / status ────────────────────

fn run_list(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let catalog = build_catalog()?;
    let snapshot = catalog.list_volumes();

    let mut log = JsonlWriter::open(config.paths.jsonl_log.clone());
    let mut entry = LogEntry::new(EventType::CatalogQuery, Severity::Info);
    entry.details = Some(format!(
        "{} volumes, degraded={}",
        snapshot.volumes.len(),
        snapshot.degraded
    ));
    log.write_entry(&entry);
    log.flush();

    match output_mode(cli) {
        OutputMode::Human => {
            if snapshot.degraded {
                println!(
                    "{}",
                    "Note: full mount enumeration unavailable; showing a reduced listing."
                        .yellow()
                );
            }
            print_volume_table(&snapshot.volumes);
            if !snapshot.skipped.is_empty() {
                if cli.verbose {
                    for mount in &snapshot.skipped {
                        println!("  {} {mount}", "excluded:".yellow());
                    }
                } else {
                    println!(
                        "  ({} volume(s) excluded due to stats failures; -v for details)",
                        snapshot.skipped.len()
                    );
                }
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "list",
                "degraded": snapshot.degraded,
                "skipped": snapshot.skipped,
                "volumes": serde_json::to_value(&snapshot.volumes)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_status(cli: &Cli) -> Result<(), CliError> {
    let catalog = build_catalog()?;
    let layout = detect_layout();
    let release = ReleaseEngine::new(layout);
    let snapshot = catalog.list_volumes();

    let mut rows = Vec::new();
    for volume in &snapshot.volumes {
        let job = release
            .discover(volume)
            .map_err(|e| CliError::Runtime(e.to_string()))?;
        rows.push((volume.clone(), job));
    }

    match output_mode(cli) {
        OutputMode::Human => {
            println!("Filler occupancy");
            println!("{}", "-".repeat(72));
            for (volume, job) in &rows {
                match job {
                    Some(job) => println!(
                        "  {:<28} {} ({} at {})",
                        volume.mount,
                        "FILLED".red(),
                        format_bytes(job.fill_size_bytes),
                        job.artifact_path.display(),
                    ),
                    None => println!("  {:<28} {}", volume.mount, "clear".green()),
                }
            }
            println!("{}", "-".repeat(72));
        }
        OutputMode::Json => {
            let volumes: Vec<Value> = rows
                .iter()
                .map(|(volume, job)| {
                    json!({
                        "mount": volume.mount,
                        "free_bytes": volume.free_bytes,
                        "filled": job.is_some(),
                        "artifact": job.as_ref().map(|j| j.artifact_path.to_string_lossy().into_owned()),
                        "artifact_bytes": job.as_ref().map(|j| j.fill_size_bytes),
                    })
                })
                .collect();
            let payload = json!({
                "command": "status",
                "degraded": snapshot.degraded,
                "volumes": volumes,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── fill ────────────────────

fn run_fill(cli: &Cli, args: &FillArgs) -> Result<(), CliError> {
    let mut config = load_config(cli)?;
    if let Some(margin) = args.reserve_mb {
        config.reserve.margin_mb = margin;
        config
            .validate()
            .map_err(|e| CliError::User(e.to_string()))?;
    }

    let catalog = build_catalog()?;
    let volume = catalog
        .volume_for_path(&args.path)
        .map_err(|e| CliError::User(e.to_string()))?;

    let reserve = ReserveCalculator::from_config(&config.reserve);
    let reserve_bytes = reserve.reserve_bytes();
    let layout = detect_layout();
    let engine = FillEngine::new(
        layout.clone(),
        Arc::new(SystemProcessRunner),
        config.fill.clone(),
    );
    let artifact = engine.artifact_path(&volume);
    let planned = fill_size_bytes(volume.free_bytes, reserve_bytes);

    let mut gate = OperationGate::new();
    gate.select_volume()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    if output_mode(cli) == OutputMode::Human && !cli.quiet {
        println!("About to fill:");
        println!("  Volume:   {}", volume.mount);
        println!("  Total:    {}", format_bytes(volume.total_bytes));
        println!("  Free:     {}", format_bytes(volume.free_bytes));
        println!(
            "  Reserve:  {} ({} MB)",
            format_bytes(reserve_bytes),
            reserve.margin_mb()
        );
        println!("  Fill:     {}", format_bytes(planned).bold());
        println!("  Artifact: {}", artifact.display());
        println!();
    }

    if !confirm_destructive(
        &format!("This will consume nearly all free space on {}. Continue?", volume.mount),
        args.yes,
    )? {
        gate.reset();
        if output_mode(cli) == OutputMode::Human {
            println!("Canceled; nothing was written.");
        }
        return Ok(());
    }

    gate.confirm().map_err(|e| CliError::Runtime(e.to_string()))?;
    gate.begin().map_err(|e| CliError::Runtime(e.to_string()))?;

    let mut log = JsonlWriter::open(config.paths.jsonl_log.clone());
    match engine.fill(&volume, reserve_bytes) {
        Ok(report) => {
            gate.complete()
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            log_fill(&mut log, &report);
            emit_fill_report(cli, &catalog, &report)?;
            Ok(())
        }
        Err(error) => {
            let _ = gate.fail();
            log_failure(&mut log, EventType::Fill, &volume, &error);
            Err(CliError::Runtime(error.to_string()))
        }
    }
}

fn emit_fill_report(
    cli: &Cli,
    catalog: &VolumeCatalog,
    report: &FillReport,
) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            match report.method {
                FillMethod::AlreadyFilled => println!(
                    "{} {} already carries a filler artifact ({} at {}); nothing written.",
                    "Already filled:".yellow(),
                    report.job.volume.mount,
                    format_bytes(report.job.fill_size_bytes),
                    report.job.artifact_path.display(),
                ),
                FillMethod::Empty => println!(
                    "{} free space is at or below the reserve; created an empty marker at {}.",
                    "Nothing to fill:".yellow(),
                    report.job.artifact_path.display(),
                ),
                _ => println!(
                    "{} wrote {} to {} ({})",
                    "Fill complete:".green(),
                    format_bytes(report.bytes_written),
                    report.job.artifact_path.display(),
                    report.method.as_str(),
                ),
            }

            // Re-query so the operator sees the after-fill picture.
            if !cli.quiet
                && let Some(after) = catalog
                    .list_volumes()
                    .find(&report.job.volume.mount)
                    .cloned()
            {
                println!();
                println!("Volume after fill:");
                print_volume_table(std::slice::from_ref(&after));
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "fill",
                "mount": report.job.volume.mount,
                "artifact": report.job.artifact_path.to_string_lossy(),
                "method": report.method.as_str(),
                "reserve_bytes": report.job.reserve_bytes,
                "fill_size_bytes": report.job.fill_size_bytes,
                "bytes_written": report.bytes_written,
                "container_dir_created": report.job.container_dir_created,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── release ────────────────────

fn run_release(cli: &Cli, args: &ReleaseArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let catalog = build_catalog()?;
    let layout = detect_layout();
    let release = ReleaseEngine::new(layout);

    let volumes: Vec<VolumeInfo> = match &args.path {
        Some(path) => vec![
            catalog
                .volume_for_path(path)
                .map_err(|e| CliError::User(e.to_string()))?,
        ],
        None => catalog.list_volumes().volumes,
    };

    let mut jobs = Vec::new();
    for volume in &volumes {
        if let Some(job) = release
            .discover(volume)
            .map_err(|e| CliError::Runtime(e.to_string()))?
        {
            jobs.push(job);
        }
    }

    if jobs.is_empty() {
        match output_mode(cli) {
            OutputMode::Human => {
                println!("No filler artifacts detected; nothing to release.");
            }
            OutputMode::Json => {
                write_json_line(&json!({
                    "command": "release",
                    "released": [],
                    "freed_bytes": 0,
                }))?;
            }
        }
        return Ok(());
    }

    if output_mode(cli) == OutputMode::Human && !cli.quiet {
        println!("Filler artifacts found:");
        for job in &jobs {
            println!(
                "  {} ({} on {})",
                job.artifact_path.display(),
                format_bytes(job.fill_size_bytes),
                job.volume.mount,
            );
        }
        println!();
    }

    let mut gate = OperationGate::new();
    gate.select_volume()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    if !confirm_destructive("Delete the artifacts above and restore the space?", args.yes)? {
        gate.reset();
        if output_mode(cli) == OutputMode::Human {
            println!("Canceled; nothing was deleted.");
        }
        return Ok(());
    }

    gate.confirm().map_err(|e| CliError::Runtime(e.to_string()))?;
    gate.begin().map_err(|e| CliError::Runtime(e.to_string()))?;

    let mut log = JsonlWriter::open(config.paths.jsonl_log.clone());
    let mut freed_total: u64 = 0;
    let mut released = Vec::new();
    let mut failures = Vec::new();

    for job in &jobs {
        match release.release(job) {
            Ok(report) => {
                freed_total += report.freed_bytes;
                let mut entry = LogEntry::new(EventType::Release, Severity::Info);
                entry.mount = Some(job.volume.mount.clone());
                entry.artifact = Some(job.artifact_path.to_string_lossy().into_owned());
                entry.bytes = Some(report.freed_bytes);
                log.write_entry(&entry);
                released.push((job, report));
            }
            Err(error) => {
                log_failure(&mut log, EventType::Release, &job.volume, &error);
                eprintln!("mdf: {error}");
                failures.push(error);
            }
        }
    }
    log.flush();

    let all_ok = failures.is_empty();
    if gate.phase() == mock_disk_full::core::state::Phase::Executing {
        let result = if all_ok { gate.complete() } else { gate.fail() };
        result.map_err(|e| CliError::Runtime(e.to_string()))?;
    }

    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "{} {} freed across {} artifact(s).",
                if all_ok {
                    "Release complete:".green()
                } else {
                    "Release partially complete:".yellow()
                },
                format_bytes(freed_total),
                released.len(),
            );
        }
        OutputMode::Json => {
            let rows: Vec<Value> = released
                .iter()
                .map(|(job, report)| {
                    json!({
                        "mount": job.volume.mount,
                        "artifact": job.artifact_path.to_string_lossy(),
                        "freed_bytes": report.freed_bytes,
                        "container_removed": report.container_removed,
                    })
                })
                .collect();
            let payload = json!({
                "command": "release",
                "released": rows,
                "freed_bytes": freed_total,
                "failures": failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
            });
            write_json_line(&payload)?;
        }
    }

    if all_ok {
        Ok(())
    } else {
        Err(CliError::Partial(format!(
            "{} artifact(s) could not be released",
            failures.len()
        )))
    }
}

// ──────────────────── config / version ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command.as_ref().unwrap_or(&ConfigCommand::Show) {
        ConfigCommand::Path => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(Config::default_path);
            match output_mode(cli) {
                OutputMode::Human => println!("{}", path.display()),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                }))?,
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let rendered = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(e.to_string()))?;
                    print!("{rendered}");
                }
                OutputMode::Json => {
                    let mut payload = serde_json::to_value(&config)?;
                    if let Some(obj) = payload.as_object_mut() {
                        obj.insert("command".to_string(), json!("config show"));
                    }
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        ConfigCommand::Validate => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => println!(
                    "Configuration at {} is valid.",
                    config.paths.config_file.display()
                ),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config validate",
                    "valid": true,
                    "path": config.paths.config_file.to_string_lossy(),
                }))?,
            }
            Ok(())
        }
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("mdf {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "mdf",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── shared helpers ────────────────────

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

fn build_catalog() -> Result<VolumeCatalog, CliError> {
    let platform = detect_platform().map_err(|e| CliError::Runtime(e.to_string()))?;
    Ok(VolumeCatalog::new(platform))
}

/// Ask for an explicit `y`/`yes`. Non-interactive runs must pass `--yes`;
/// a destructive action is never inferred from silence.
fn confirm_destructive(prompt: &str, assume_yes: bool) -> Result<bool, CliError> {
    if assume_yes {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        return Err(CliError::User(
            "confirmation required: re-run with --yes, or run interactively".to_string(),
        ));
    }
    print!("{prompt} (y/N): ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn log_fill(log: &mut JsonlWriter, report: &FillReport) {
    let mut entry = LogEntry::new(EventType::Fill, Severity::Info);
    entry.mount = Some(report.job.volume.mount.clone());
    entry.artifact = Some(report.job.artifact_path.to_string_lossy().into_owned());
    entry.bytes = Some(report.bytes_written);
    entry.method = Some(report.method.as_str().to_string());
    log.write_entry(&entry);
    log.flush();
}

fn log_failure(log: &mut JsonlWriter, event: EventType, volume: &VolumeInfo, error: &MdfError) {
    let mut entry = LogEntry::new(event, Severity::Critical);
    entry.mount = Some(volume.mount.clone());
    entry.error_code = Some(error.code().to_string());
    entry.error_message = Some(error.to_string());
    log.write_entry(&entry);
    log.flush();
}

fn print_volume_table(volumes: &[VolumeInfo]) {
    println!(
        "  {:<28} {:>10} {:>10} {:>10} {:>7}",
        "Mount", "Total", "Used", "Free", "Free%"
    );
    println!("  {}", "-".repeat(70));
    for volume in volumes {
        println!(
            "  {:<28} {:>10} {:>10} {:>10} {:>6.1}%",
            truncate_mount(&volume.mount, 28),
            format_bytes(volume.total_bytes),
            format_bytes(volume.used_bytes),
            format_bytes(volume.free_bytes),
            volume.free_pct(),
        );
    }
}

fn truncate_mount(mount: &str, max_len: usize) -> String {
    if mount.len() <= max_len {
        mount.to_string()
    } else {
        format!("...{}", &mount[mount.len() - (max_len - 3)..])
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.2} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("MDF_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        Some("auto") | None => fallback,
        Some(_) => fallback,
    }
}
