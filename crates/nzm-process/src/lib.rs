//! Process management for hook commands: spawning through the host shell,
//! timeout enforcement, and separate stdout/stderr capture.
//!
//! The [`ProcessRunner`] trait is the narrow seam the hook executor depends
//! on. [`ShellRunner`] is the production implementation; tests substitute a
//! scripted runner so sequencing logic can be exercised without spawning.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

mod shell;

pub use shell::{DEFAULT_SHELL, ShellRunner};

/// Everything needed to run one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Shell command text, passed to `<shell> -c`.
    pub command: String,
    /// Complete process environment. The child does not inherit anything else.
    pub env: Vec<(OsString, OsString)>,
    /// Working directory; `None` inherits the caller's.
    pub work_dir: Option<PathBuf>,
    /// Hard upper bound on wall-clock runtime.
    pub timeout: Duration,
}

/// Captured outcome of a finished (or killed) process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    /// Exit code. `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// True when the timeout expired and the process was killed.
    pub timed_out: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    /// True only for a clean zero exit within the time bound.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs a single command to completion or timeout.
///
/// Implementations must reap the child and close its pipes on every path.
/// An `Err` means the process could not be started or waited on at all;
/// non-zero exits and timeouts are reported through [`ProcessOutput`].
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, request: ProcessRequest) -> Result<ProcessOutput>;
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
