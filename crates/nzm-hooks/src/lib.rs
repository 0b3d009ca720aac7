//! Command hooks for nzm session lifecycle events.
//!
//! Operators bind shell commands to events such as `pre-spawn` or
//! `post-send`. Hooks for one event run sequentially in declaration order,
//! each under its own timeout, with fail-fast semantics unless a hook opts
//! into `continue_on_error`.
//!
//! ## Configuration
//!
//! Hooks are read from two files in `$XDG_CONFIG_HOME/nzm/` (default
//! `~/.config/nzm/`): the dedicated `hooks.toml`, then any
//! `[[command_hooks]]` tables in `config.toml`.
//!
//! ```toml
//! [[command_hooks]]
//! event = "post-spawn"
//! name = "announce"
//! command = "notify-send \"session $NZM_SESSION ready\""
//! timeout = "10s"
//! continue_on_error = true
//! ```
//!
//! ## Environment
//!
//! Every hook sees the ambient environment plus `NZM_SESSION`,
//! `NZM_PROJECT_DIR`, `NZM_PANE`, `NZM_HOOK_EVENT`, `NZM_HOOK_NAME` (named
//! hooks only) and `NZM_MESSAGE` (send events, truncated to 1000 characters).
//! The hook's `env` table and the caller's extra variables override these.
//!
//! ## Git integration
//!
//! [`git_hooks`] installs a managed `pre-commit` script that runs
//! [`precommit::run_pre_commit`] against the staged files.

pub mod aggregate;
pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod executor;
pub mod expand;
pub mod git_hooks;
pub mod hook;
pub mod precommit;
pub mod scanner;

// Re-export key types
pub use aggregate::{ResultCounts, all_errors, any_failed, count_results};
pub use config::{
    CommandHooksConfig, HookPaths, load_all_command_hooks, load_command_hooks,
    load_command_hooks_from_main_config, load_command_hooks_from_toml,
};
pub use duration::HookTimeout;
pub use error::{ConfigError, HookError, HookFailure, HookFailures, ValidationError};
pub use event::CommandEvent;
pub use executor::{EventReport, ExecutionContext, ExecutionResult, Executor, RunScope};
pub use git_hooks::{GitHookError, GitHookInfo, GitHookKind, GitHookManager};
pub use hook::{CommandHook, DEFAULT_HOOK_TIMEOUT, Enablement, MAX_HOOK_TIMEOUT};
pub use precommit::{PreCommitConfig, PreCommitResult, run_pre_commit};
pub use scanner::{ScanOptions, ScanReport, ScanScope, Scanner, UbsScanner};
