use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use nzm_hooks::{CommandEvent, GitHookKind};

#[derive(Parser)]
#[command(name = "nzm")]
#[command(about = "nzm: lifecycle command hooks for multi-agent sessions")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("NZM_GIT_DESCRIBE"), ")"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Output format for CLI responses
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage and run command hooks
    Hooks {
        #[command(subcommand)]
        cmd: HooksCommands,
    },
}

#[derive(Subcommand)]
pub enum HooksCommands {
    /// List configured command hooks
    List {
        /// Only hooks bound to this event
        #[arg(long)]
        event: Option<CommandEvent>,
    },

    /// Load and validate the hook configuration
    Validate,

    /// Run the hooks for an event
    Fire {
        /// Event to fire (e.g. pre-spawn, post-send)
        event: CommandEvent,

        /// Session name (exported as NZM_SESSION)
        #[arg(long)]
        session: String,

        /// Project directory; defaults to the current directory
        #[arg(long)]
        project_dir: Option<PathBuf>,

        /// Pane identifier (exported as NZM_PANE)
        #[arg(long, default_value = "")]
        pane: String,

        /// Message for send events (exported as NZM_MESSAGE)
        #[arg(long)]
        message: Option<String>,

        /// Extra environment for every hook, KEY=VALUE (repeatable)
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        env: Vec<(String, String)>,

        /// Overall deadline in seconds for the whole event
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Install a managed git hook in the current repository
    Install {
        #[arg(default_value = "pre-commit")]
        kind: GitHookKind,

        /// Replace an existing hook, keeping it as <kind>.backup
        #[arg(long)]
        force: bool,
    },

    /// Remove a managed git hook
    Uninstall {
        #[arg(default_value = "pre-commit")]
        kind: GitHookKind,

        /// Do not restore the <kind>.backup hook
        #[arg(long)]
        no_restore: bool,
    },

    /// Show git hook installation status
    Status,

    /// Run a git hook check directly
    Run {
        #[command(subcommand)]
        cmd: RunCommands,
    },
}

#[derive(Subcommand)]
pub enum RunCommands {
    /// Scan staged files and block the commit on issues
    PreCommit {
        /// Verbose scanner output
        #[arg(short, long)]
        verbose: bool,

        /// Treat warnings above the threshold as blocking
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        fail_on_warning: bool,

        /// Scan timeout in seconds (0 = unbounded)
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Critical issues tolerated before blocking
        #[arg(long, default_value_t = 0)]
        max_critical: u32,

        /// Warnings tolerated before blocking
        #[arg(long, default_value_t = 0)]
        max_warning: u32,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}
