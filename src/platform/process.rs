//! Process-execution seam for native tool invocation.
//!
//! The fill engine probes platform tools (`fsutil`, `fallocate`, `dd`)
//! through this trait so tests can simulate success, absence, or failure
//! without touching a real filesystem. "Tool not installed" is a normal
//! outcome (`Invocation::Unavailable`), not an error — it just means the
//! next strategy in the chain runs.

#![allow(missing_docs)]

use std::process::Command;

use crate::core::errors::{MdfError, Result};

/// Captured output of a completed tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Whether the process exited successfully.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// First non-empty diagnostic line, for error reporting.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let raw = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        raw.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("no diagnostic output")
            .to_string()
    }
}

/// Outcome of attempting to run an external tool.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// The tool ran to completion (successfully or not).
    Completed(ToolOutput),
    /// The tool binary is not present on this system.
    Unavailable,
}

/// Abstraction over spawning external tools.
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`, blocking until it exits.
    fn run(&self, program: &str, args: &[String]) -> Result<Invocation>;
}

/// Real implementation backed by `std::process::Command`.
#[derive(Debug, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<Invocation> {
        match Command::new(program).args(args).output() {
            Ok(output) => Ok(Invocation::Completed(ToolOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(Invocation::Unavailable)
            }
            Err(error) => Err(MdfError::Runtime {
                details: format!("failed to spawn {program}: {error}"),
            }),
        }
    }
}
