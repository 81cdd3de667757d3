use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

/// Captured outcome of one `mdf` invocation, with a transcript on disk for
/// postmortem inspection when an assertion fires.
pub struct CliRun {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn transcript_name(case: &str) -> String {
    let safe: String = case
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    format!("{safe}-{stamp}.log")
}

/// Run the `mdf` binary with `args`, redirecting its activity log into the
/// test scratch area so runs never touch the operator's real log.
pub fn run_mdf(case: &str, args: &[&str]) -> CliRun {
    run_mdf_env(case, args, &[])
}

/// Same as [`run_mdf`], with extra environment variables set for the child.
pub fn run_mdf_env(case: &str, args: &[&str], envs: &[(&str, &str)]) -> CliRun {
    let scratch = std::env::temp_dir().join("mdf-test-logs");
    fs::create_dir_all(&scratch).expect("create test scratch dir");
    let log_path = scratch.join(transcript_name(case));

    let output = Command::new(env!("CARGO_BIN_EXE_mdf"))
        .args(args)
        .env("MDF_JSONL_LOG", scratch.join("activity.jsonl"))
        .env("RUST_BACKTRACE", "1")
        .envs(envs.iter().copied())
        .output()
        .expect("execute mdf");

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let transcript = format!(
        "case={case}\nargs={args:?}\nstatus={}\n\
         ----- stdout -----\n{stdout}\n----- stderr -----\n{stderr}\n",
        output.status
    );
    fs::write(&log_path, transcript).expect("write test transcript");

    CliRun {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
