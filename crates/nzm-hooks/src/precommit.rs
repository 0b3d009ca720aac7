//! Pre-commit gate: scan the staged files and block the commit when issue
//! counts exceed the configured thresholds.
//!
//! A missing scanner degrades to a pass with `scanner_available = false`, so
//! installing the git hook never makes a repository uncommittable.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::duration::{format_duration, serialize_millis};
use crate::scanner::{ScanOptions, ScanReport, ScanScope, Scanner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCommitConfig {
    pub max_critical: u32,
    pub max_warning: u32,
    /// Warnings above `max_warning` block the commit.
    pub fail_on_warning: bool,
    /// Bound on the scan. Zero means unbounded.
    pub timeout: Duration,
    pub verbose: bool,
    /// Pass immediately when nothing is staged.
    pub skip_empty: bool,
}

impl Default for PreCommitConfig {
    fn default() -> Self {
        Self {
            max_critical: 0,
            max_warning: 0,
            fail_on_warning: true,
            timeout: Duration::from_secs(60),
            verbose: false,
            skip_empty: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreCommitResult {
    pub passed: bool,
    pub staged_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub scanner_available: bool,
}

impl PreCommitResult {
    fn pass(staged_files: Vec<String>, scanner_available: bool, duration: Duration) -> Self {
        Self {
            passed: true,
            staged_files,
            scan: None,
            block_reason: None,
            duration,
            scanner_available,
        }
    }

    /// Process exit code for the git hook: 0 pass, 1 blocked.
    pub fn exit_code(&self) -> i32 {
        if self.passed { 0 } else { 1 }
    }
}

/// Run the pre-commit policy for the repository at `repo`.
pub async fn run_pre_commit(
    repo: &Path,
    config: &PreCommitConfig,
    scanner: &dyn Scanner,
) -> Result<PreCommitResult> {
    let started = Instant::now();
    let scanner_available = scanner.is_available();

    let staged = staged_files(repo).await?;
    if staged.is_empty() && config.skip_empty {
        tracing::debug!(repo = %repo.display(), "No staged files, skipping scan");
        return Ok(PreCommitResult::pass(staged, scanner_available, Duration::ZERO));
    }

    if !scanner_available {
        tracing::warn!("Scanner not installed, pre-commit check skipped");
        return Ok(PreCommitResult::pass(staged, false, started.elapsed()));
    }

    let options = ScanOptions {
        fail_on_warning: config.fail_on_warning,
        verbose: config.verbose,
        timeout: (!config.timeout.is_zero()).then_some(config.timeout),
        ..ScanOptions::default()
    };
    let scan = scanner.scan(ScanScope::Staged, repo, &options);
    let report = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, scan).await.map_err(|_| {
            anyhow::anyhow!("pre-commit scan timed out after {}", format_duration(&limit))
        })?,
        None => scan.await,
    }
    .context("running pre-commit scan")?;

    let block_reason = block_reason(&report, config);
    if let Some(reason) = &block_reason {
        tracing::info!(
            critical = report.totals.critical,
            warning = report.totals.warning,
            "Pre-commit check failed: {reason}"
        );
    }

    Ok(PreCommitResult {
        passed: block_reason.is_none(),
        staged_files: staged,
        scan: Some(report),
        block_reason,
        duration: started.elapsed(),
        scanner_available: true,
    })
}

/// Why `report` blocks the commit under `config`, if it does.
///
/// Critical issues are checked first; warnings only count when
/// `fail_on_warning` is set.
pub fn block_reason(report: &ScanReport, config: &PreCommitConfig) -> Option<String> {
    let totals = &report.totals;
    if totals.critical > config.max_critical {
        Some(format!(
            "critical issues exceeded threshold: {} > {}",
            totals.critical, config.max_critical
        ))
    } else if config.fail_on_warning && totals.warning > config.max_warning {
        Some(format!(
            "warning issues exceeded threshold: {} > {}",
            totals.warning, config.max_warning
        ))
    } else {
        None
    }
}

/// Added, copied, modified and renamed paths in the index.
pub async fn staged_files(repo: &Path) -> Result<Vec<String>> {
    let output = tokio::process::Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["diff", "--name-only", "--cached", "--diff-filter=ACMR"])
        .output()
        .await
        .context("failed to run git diff")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git diff --cached failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
#[path = "precommit_tests.rs"]
mod tests;
