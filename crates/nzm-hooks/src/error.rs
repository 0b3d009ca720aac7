//! Error types for hook loading and hook execution.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::duration::format_duration;
use crate::event::valid_event_names;

/// A single hook declaration that fails its field rules.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("hook command cannot be empty")]
    EmptyCommand,

    #[error("invalid hook event: {0:?} (valid: {valid})", valid = valid_event_names())]
    InvalidEvent(String),

    #[error("hook timeout {} exceeds maximum ({})", format_duration(.timeout), format_duration(.max))]
    TimeoutExceedsMax { timeout: Duration, max: Duration },
}

/// Failure to load a hook set from one source. Loading is fail-closed:
/// any of these means the source contributed no hooks at all.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading hooks config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing hooks config {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid hooks config {origin}: command_hooks[{index}]: {source}")]
    Invalid {
        origin: String,
        index: usize,
        #[source]
        source: ValidationError,
    },
}

/// Why a hook run did not succeed, or why a sequence stopped early.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    #[error("hook {hook:?} failed with exit code {code}{}", stderr_suffix(.stderr))]
    ExitStatus {
        hook: String,
        code: i32,
        stderr: String,
    },

    #[error("hook {hook:?} was terminated by a signal")]
    Signal { hook: String },

    #[error("hook {hook:?} timed out after {}", format_duration(.timeout))]
    TimedOut { hook: String, timeout: Duration },

    #[error("hook {hook:?} failed to start: {message}")]
    Spawn { hook: String, message: String },

    #[error("hook execution cancelled")]
    Cancelled,

    #[error("hook execution deadline exceeded")]
    DeadlineExceeded,
}

impl HookError {
    /// Identifier of the hook the error belongs to, if any.
    pub fn hook(&self) -> Option<&str> {
        match self {
            HookError::ExitStatus { hook, .. }
            | HookError::Signal { hook }
            | HookError::TimedOut { hook, .. }
            | HookError::Spawn { hook, .. } => Some(hook),
            HookError::Cancelled | HookError::DeadlineExceeded => None,
        }
    }

    /// True for errors that stop a sequence without any hook failing.
    pub fn is_interruption(&self) -> bool {
        matches!(self, HookError::Cancelled | HookError::DeadlineExceeded)
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// One failed hook inside an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub hook: String,
    pub error: HookError,
}

/// Every failure from a run, kept individually; joined only for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailures(Vec<HookFailure>);

impl HookFailures {
    pub(crate) fn new(failures: Vec<HookFailure>) -> Self {
        Self(failures)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HookFailure> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for HookFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("hook errors: ")?;
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for HookFailures {}
