//! Sequential execution of the command hooks bound to an event.
//!
//! One invocation runs the enabled hooks for a single event strictly in
//! declaration order, one subprocess at a time. A failing hook halts the
//! sequence unless it sets `continue_on_error`. The caller's [`RunScope`]
//! can cancel the invocation or impose a deadline; both are checked only
//! at hook boundaries, never while a hook is running, but the deadline
//! also shortens the timeout given to each hook.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nzm_process::{ProcessOutput, ProcessRequest, ProcessRunner, ShellRunner};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{CommandHooksConfig, HookPaths, load_all_command_hooks};
use crate::error::HookError;
use crate::event::CommandEvent;
use crate::hook::CommandHook;

/// Messages longer than this many characters are truncated before injection.
pub const MAX_MESSAGE_CHARS: usize = 1000;
const TRUNCATION_MARKER: &str = "...";

pub const ENV_SESSION: &str = "NZM_SESSION";
pub const ENV_PROJECT_DIR: &str = "NZM_PROJECT_DIR";
pub const ENV_PANE: &str = "NZM_PANE";
pub const ENV_HOOK_EVENT: &str = "NZM_HOOK_EVENT";
pub const ENV_HOOK_NAME: &str = "NZM_HOOK_NAME";
pub const ENV_MESSAGE: &str = "NZM_MESSAGE";

/// Caller-supplied data for one triggering action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub session_name: String,
    pub project_dir: String,
    pub pane: String,
    /// Message being sent, for the send events.
    pub message: Option<String>,
    /// Extra variables. These override everything else.
    pub additional_env: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new(session_name: impl Into<String>, project_dir: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            project_dir: project_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_pane(mut self, pane: impl Into<String>) -> Self {
        self.pane = pane.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_env.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub hook: CommandHook,
    pub success: bool,
    /// The hook was not run. Counts as neither success nor failure.
    pub skipped: bool,
    pub error: Option<HookError>,
    /// Process exit code, `-1` when there is none.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Result for a hook that was filtered out and never started.
    pub fn skipped(hook: &CommandHook) -> Self {
        Self {
            hook: hook.clone(),
            success: false,
            skipped: true,
            error: None,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    fn from_output(hook: &CommandHook, output: ProcessOutput, bound: Duration) -> Self {
        let name = hook.display_name().to_string();
        let error = if output.timed_out {
            Some(HookError::TimedOut {
                hook: name,
                timeout: bound,
            })
        } else {
            match output.exit_code {
                Some(0) => None,
                Some(code) => Some(HookError::ExitStatus {
                    hook: name,
                    code,
                    stderr: output.stderr.clone(),
                }),
                None => Some(HookError::Signal { hook: name }),
            }
        };

        Self {
            hook: hook.clone(),
            success: output.succeeded(),
            skipped: false,
            error,
            exit_code: output.exit_code.unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
            duration: output.duration,
            timed_out: output.timed_out,
        }
    }

    fn spawn_failure(hook: &CommandHook, err: &anyhow::Error, duration: Duration) -> Self {
        Self {
            hook: hook.clone(),
            success: false,
            skipped: false,
            error: Some(HookError::Spawn {
                hook: hook.display_name().to_string(),
                message: format!("{err:#}"),
            }),
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            timed_out: false,
        }
    }

    /// Ran and did not succeed.
    pub fn failed(&self) -> bool {
        !self.success && !self.skipped
    }
}

/// Cancellation and deadline for one invocation.
///
/// Clones share the same token, so a clone handed to a signal handler can
/// cancel a run in progress.
#[derive(Debug, Clone, Default)]
pub struct RunScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RunScope {
    /// No deadline, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Deadline `timeout` from now. A timeout too large to represent as an
    /// instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// Scope observing an existing token, e.g. a parent's child token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why a new hook must not start, if any.
    fn interruption(&self) -> Option<HookError> {
        if self.is_cancelled() {
            return Some(HookError::Cancelled);
        }
        match self.remaining() {
            Some(left) if left.is_zero() => Some(HookError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Per-hook bound: the hook's timeout, shortened to fit the deadline.
    fn bound(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(left) => timeout.min(left),
            None => timeout,
        }
    }
}

/// Everything one invocation produced.
///
/// `error` is set exactly when the sequence stopped early: a hook failed
/// without `continue_on_error`, or the scope was cancelled or ran out of
/// time. Failures of `continue_on_error` hooks only appear in `results`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventReport {
    pub results: Vec<ExecutionResult>,
    pub error: Option<HookError>,
}

impl EventReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the hooks of a [`CommandHooksConfig`].
pub struct Executor {
    config: CommandHooksConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl Executor {
    /// Executor running hooks through `sh -c`.
    pub fn new(config: CommandHooksConfig) -> Self {
        Self::with_runner(config, Arc::new(ShellRunner::default()))
    }

    pub fn with_runner(config: CommandHooksConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// Load both hook sources from the default locations.
    pub fn from_default_config() -> anyhow::Result<Self> {
        let config = match HookPaths::discover() {
            Some(paths) => load_all_command_hooks(&paths)?,
            None => {
                tracing::debug!("No config directory found, running without command hooks");
                CommandHooksConfig::default()
            }
        };
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &CommandHooksConfig {
        &self.config
    }

    pub fn hooks_for_event(&self, event: CommandEvent) -> Vec<&CommandHook> {
        self.config.hooks_for_event(event)
    }

    pub fn has_hooks_for_event(&self, event: CommandEvent) -> bool {
        self.config.has_hooks_for_event(event)
    }

    /// Run every enabled hook for `event`, in order.
    pub async fn run_hooks_for_event(
        &self,
        scope: &RunScope,
        event: CommandEvent,
        ctx: &ExecutionContext,
    ) -> EventReport {
        let hooks = self.hooks_for_event(event);
        let mut report = EventReport {
            results: Vec::with_capacity(hooks.len()),
            error: None,
        };
        if hooks.is_empty() {
            return report;
        }

        tracing::debug!(event = %event, count = hooks.len(), "Running command hooks");

        for hook in hooks {
            if let Some(err) = scope.interruption() {
                tracing::info!(
                    event = %event,
                    completed = report.results.len(),
                    "Stopping command hooks: {err}"
                );
                report.error = Some(err);
                return report;
            }

            let bound = scope.bound(hook.effective_timeout());
            let result = self.run_single_hook(hook, bound, ctx).await;
            let halt = result.failed() && !hook.continue_on_error;
            let error = result.error.clone();
            report.results.push(result);

            if halt {
                report.error = error;
                return report;
            }
        }

        report
    }

    async fn run_single_hook(
        &self,
        hook: &CommandHook,
        bound: Duration,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let work_dir = hook.expand_workdir(&ctx.session_name, &ctx.project_dir);
        let request = ProcessRequest {
            command: hook.command.clone(),
            env: build_environment(hook, ctx, std::env::vars_os()),
            work_dir: (!work_dir.is_empty()).then(|| PathBuf::from(work_dir)),
            timeout: bound,
        };

        tracing::debug!(
            event = %hook.event,
            hook = %hook.display_name(),
            timeout_ms = bound.as_millis() as u64,
            "Executing command hook"
        );

        let started = Instant::now();
        let result = match self.runner.run(request).await {
            Ok(output) => ExecutionResult::from_output(hook, output, bound),
            Err(e) => ExecutionResult::spawn_failure(hook, &e, started.elapsed()),
        };

        match &result.error {
            None => tracing::debug!(
                event = %hook.event,
                hook = %hook.display_name(),
                elapsed_ms = result.duration.as_millis() as u64,
                "Command hook succeeded"
            ),
            Some(err) => tracing::warn!(
                event = %hook.event,
                hook = %hook.display_name(),
                exit_code = result.exit_code,
                continue_on_error = hook.continue_on_error,
                "Command hook failed: {err}"
            ),
        }
        result
    }
}

/// Process environment for one hook run.
///
/// Layers, later wins: `ambient`, the injected `NZM_*` variables, the
/// hook's own `env`, then the context's additional variables. Ambient
/// variables pass through byte for byte, UTF-8 or not.
pub fn build_environment<I>(
    hook: &CommandHook,
    ctx: &ExecutionContext,
    ambient: I,
) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: BTreeMap<OsString, OsString> = ambient.into_iter().collect();
    let mut set = |key: &str, value: &str| {
        env.insert(key.into(), value.into());
    };

    set(ENV_SESSION, &ctx.session_name);
    set(ENV_PROJECT_DIR, &ctx.project_dir);
    set(ENV_PANE, &ctx.pane);
    set(ENV_HOOK_EVENT, hook.event.as_str());
    if !hook.name.is_empty() {
        set(ENV_HOOK_NAME, &hook.name);
    }
    if let Some(message) = ctx.message.as_deref().filter(|m| !m.is_empty()) {
        set(ENV_MESSAGE, &truncate_message(message));
    }
    for (key, value) in hook.env.iter().chain(&ctx.additional_env) {
        set(key, value);
    }

    env.into_iter().collect()
}

/// First [`MAX_MESSAGE_CHARS`] characters plus `...` when longer.
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &message[..cut]),
        None => message.to_string(),
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
