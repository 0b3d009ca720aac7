//! Static-analysis scanner seam and the `ubs` command-line implementation.
//!
//! The pre-commit policy only needs two things from a scanner: whether it is
//! installed, and a [`ScanReport`] for a path. [`UbsScanner`] provides both by
//! shelling out to `ubs --format=json`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::duration::{format_duration, serialize_millis};

pub const UBS_BINARY: &str = "ubs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rule_id: String,
}

/// Per-language summary reported by the scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageSummary {
    pub language: String,
    pub project: String,
    pub files: u32,
    pub critical: u32,
    pub warning: u32,
    pub info: u32,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanTotals {
    pub critical: u32,
    pub warning: u32,
    pub info: u32,
    pub files: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanReport {
    pub project: String,
    pub timestamp: String,
    pub scanners: Vec<LanguageSummary>,
    pub totals: ScanTotals,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(skip_deserializing, rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub exit_code: i32,
}

impl ScanReport {
    /// No critical and no warning issues.
    pub fn is_healthy(&self) -> bool {
        self.totals.critical == 0 && self.totals.warning == 0
    }

    pub fn has_critical(&self) -> bool {
        self.totals.critical > 0
    }

    pub fn has_warning(&self) -> bool {
        self.totals.warning > 0
    }

    pub fn total_issues(&self) -> u32 {
        self.totals.critical + self.totals.warning + self.totals.info
    }

    pub fn filter_by_severity(&self, severity: Severity) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .collect()
    }

    pub fn filter_by_file(&self, file: &str) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.file == file).collect()
    }
}

/// Which files under the path get scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanScope {
    /// Everything under the path.
    #[default]
    All,
    /// Files staged in the git index.
    Staged,
    /// Files modified in the working tree.
    Diff,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Restrict to these languages; empty means auto-detect.
    pub languages: Vec<String>,
    pub exclude_languages: Vec<String>,
    /// Stable output for CI.
    pub ci: bool,
    pub fail_on_warning: bool,
    pub verbose: bool,
    /// `None` lets the scan run unbounded.
    pub timeout: Option<Duration>,
}

/// A static-analysis tool the pre-commit policy can consult.
#[async_trait]
pub trait Scanner: Send + Sync {
    fn is_available(&self) -> bool;

    async fn scan(&self, scope: ScanScope, path: &Path, options: &ScanOptions)
    -> Result<ScanReport>;
}

/// Scanner backed by the `ubs` binary.
#[derive(Debug, Clone, Default)]
pub struct UbsScanner {
    binary: Option<PathBuf>,
}

impl UbsScanner {
    /// Look `ubs` up on `PATH`.
    pub fn locate() -> Self {
        Self {
            binary: which::which(UBS_BINARY).ok(),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }
}

#[async_trait]
impl Scanner for UbsScanner {
    fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    async fn scan(
        &self,
        scope: ScanScope,
        path: &Path,
        options: &ScanOptions,
    ) -> Result<ScanReport> {
        let Some(binary) = self.binary.as_deref() else {
            bail!("{UBS_BINARY} is not installed");
        };

        let args = build_args(scope, path, options);
        tracing::debug!(binary = %binary.display(), ?args, "Running scanner");

        let child = tokio::process::Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", binary.display()))?;

        let started = Instant::now();
        let output = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| anyhow::anyhow!("scan timed out after {}", format_duration(&limit)))?,
            None => child.wait_with_output().await,
        }
        .context("failed while waiting for scanner")?;
        let duration = started.elapsed();

        let exit_code = output.status.code().unwrap_or(-1);
        let mut report = match parse_output(&output.stdout) {
            Ok(report) => report,
            Err(_) if output.status.success() => ScanReport {
                project: path.display().to_string(),
                ..ScanReport::default()
            },
            Err(e) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(e).context(format!(
                    "scanner exited with code {exit_code} (stderr: {})",
                    stderr.trim()
                ));
            }
        };
        report.duration = duration;
        report.exit_code = exit_code;

        tracing::debug!(
            critical = report.totals.critical,
            warning = report.totals.warning,
            info = report.totals.info,
            exit_code,
            "Scanner finished"
        );
        Ok(report)
    }
}

/// Command-line arguments for one `ubs` run.
pub fn build_args(scope: ScanScope, path: &Path, options: &ScanOptions) -> Vec<String> {
    let mut args = vec!["--format=json".to_string()];

    if !options.languages.is_empty() {
        args.push(format!("--only={}", options.languages.join(",")));
    }
    if !options.exclude_languages.is_empty() {
        args.push(format!("--exclude={}", options.exclude_languages.join(",")));
    }
    if options.ci {
        args.push("--ci".into());
    }
    if options.fail_on_warning {
        args.push("--fail-on-warning".into());
    }
    if options.verbose {
        args.push("-v".into());
    }
    match scope {
        ScanScope::All => {}
        ScanScope::Staged => args.push("--staged".into()),
        ScanScope::Diff => args.push("--diff".into()),
    }

    args.push(path.display().to_string());
    args
}

/// Parse `ubs --format=json` output. Empty output is an empty report.
pub fn parse_output(stdout: &[u8]) -> Result<ScanReport> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(ScanReport::default());
    }
    serde_json::from_slice(stdout).context("failed to parse scanner output")
}

#[cfg(test)]
#[path = "scanner_tests.rs"]
mod tests;
