//! A single command hook declaration and its effective values.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::HookTimeout;
use crate::error::ValidationError;
use crate::event::CommandEvent;
use crate::expand::expand_with;

/// Timeout used when a hook declares none (or a non-positive one).
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest timeout a hook may declare.
pub const MAX_HOOK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Whether a hook runs. "Not configured" and "configured false" are
/// different states; only the latter disables the hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Enablement {
    #[default]
    Unspecified,
    Enabled,
    Disabled,
}

impl Enablement {
    pub fn resolve(self) -> bool {
        !matches!(self, Enablement::Disabled)
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Enablement::Unspecified)
    }
}

impl From<Option<bool>> for Enablement {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => Enablement::Unspecified,
            Some(true) => Enablement::Enabled,
            Some(false) => Enablement::Disabled,
        }
    }
}

impl From<Enablement> for Option<bool> {
    fn from(value: Enablement) -> Self {
        match value {
            Enablement::Unspecified => None,
            Enablement::Enabled => Some(true),
            Enablement::Disabled => Some(false),
        }
    }
}

impl From<bool> for Enablement {
    fn from(value: bool) -> Self {
        Some(value).into()
    }
}

/// Binding of a shell command to a lifecycle event.
///
/// ```toml
/// [[command_hooks]]
/// event = "pre-spawn"
/// name = "stash"
/// command = "git stash --include-untracked"
/// timeout = "1m"
/// workdir = "${PROJECT}"
/// continue_on_error = true
/// env = { GIT_TERMINAL_PROMPT = "0" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHook {
    pub event: CommandEvent,

    #[serde(default)]
    pub command: String,

    #[serde(default, skip_serializing_if = "is_unset_timeout")]
    pub timeout: HookTimeout,

    #[serde(default, skip_serializing_if = "Enablement::is_unspecified")]
    pub enabled: Enablement,

    /// Working directory template; empty means the project directory.
    #[serde(default, rename = "workdir", skip_serializing_if = "String::is_empty")]
    pub work_dir: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub continue_on_error: bool,

    /// Extra environment, overriding ambient variables of the same name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

fn is_unset_timeout(timeout: &HookTimeout) -> bool {
    *timeout == HookTimeout::UNSET
}

impl CommandHook {
    pub fn new(event: CommandEvent, command: impl Into<String>) -> Self {
        Self {
            event,
            command: command.into(),
            timeout: HookTimeout::UNSET,
            enabled: Enablement::Unspecified,
            work_dir: String::new(),
            description: String::new(),
            name: String::new(),
            continue_on_error: false,
            env: HashMap::new(),
        }
    }

    /// Declared timeout when strictly positive, otherwise the default.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.positive().unwrap_or(DEFAULT_HOOK_TIMEOUT)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.resolve()
    }

    /// Name for logs and error messages: the declared name, else the command.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.command
        } else {
            &self.name
        }
    }

    /// Check field rules. Event validity is enforced when the event is parsed.
    ///
    /// A negative timeout is accepted and falls back to the default, but is
    /// logged since it is almost certainly a typo.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.command.is_empty() {
            return Err(ValidationError::EmptyCommand);
        }
        if let Some(timeout) = self.timeout.positive() {
            if timeout > MAX_HOOK_TIMEOUT {
                return Err(ValidationError::TimeoutExceedsMax {
                    timeout,
                    max: MAX_HOOK_TIMEOUT,
                });
            }
        } else if self.timeout.is_negative() {
            tracing::warn!(
                hook = %self.display_name(),
                timeout = %self.timeout,
                "Negative hook timeout, using default of {}s",
                DEFAULT_HOOK_TIMEOUT.as_secs()
            );
        }
        Ok(())
    }

    /// Resolve the working directory for a run.
    ///
    /// Empty templates resolve to `project_dir`. Otherwise `~/` is replaced by
    /// the home directory, then `${SESSION}` and `${PROJECT}`, then any
    /// remaining environment references.
    pub fn expand_workdir(&self, session: &str, project_dir: &str) -> String {
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        self.expand_workdir_with(session, project_dir, home.as_deref(), |name| {
            std::env::var(name).ok()
        })
    }

    pub(crate) fn expand_workdir_with<F>(
        &self,
        session: &str,
        project_dir: &str,
        home: Option<&Path>,
        lookup: F,
    ) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.work_dir.is_empty() {
            return project_dir.to_string();
        }

        let work_dir = match (self.work_dir.strip_prefix("~/"), home) {
            (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
            _ => self.work_dir.clone(),
        };

        let work_dir = work_dir
            .replace("${SESSION}", session)
            .replace("${PROJECT}", project_dir);
        expand_with(&work_dir, lookup)
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
