use std::time::Duration;

use anyhow::Result;
use clap::Parser;

mod cli;
mod hooks_cmd;

use cli::{Cli, Commands, HooksCommands, RunCommands};
use nzm_hooks::PreCommitConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (output to stderr, initialize only once)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let format = cli.format;

    match cli.command {
        Commands::Hooks { cmd } => match cmd {
            HooksCommands::List { event } => hooks_cmd::handle_list(event, format)?,
            HooksCommands::Validate => {
                let exit_code = hooks_cmd::handle_validate(format)?;
                std::process::exit(exit_code);
            }
            HooksCommands::Fire {
                event,
                session,
                project_dir,
                pane,
                message,
                env,
                timeout,
            } => {
                let args = hooks_cmd::FireArgs {
                    event,
                    session,
                    project_dir,
                    pane,
                    message,
                    env,
                    timeout,
                };
                let exit_code = hooks_cmd::handle_fire(args, format).await?;
                std::process::exit(exit_code);
            }
            HooksCommands::Install { kind, force } => hooks_cmd::handle_install(kind, force)?,
            HooksCommands::Uninstall { kind, no_restore } => {
                hooks_cmd::handle_uninstall(kind, !no_restore)?
            }
            HooksCommands::Status => hooks_cmd::handle_status(format)?,
            HooksCommands::Run { cmd } => match cmd {
                RunCommands::PreCommit {
                    verbose,
                    fail_on_warning,
                    timeout,
                    max_critical,
                    max_warning,
                } => {
                    let config = PreCommitConfig {
                        max_critical,
                        max_warning,
                        fail_on_warning,
                        timeout: Duration::from_secs(timeout),
                        verbose,
                        ..PreCommitConfig::default()
                    };
                    let exit_code = hooks_cmd::handle_run_pre_commit(config, format).await?;
                    std::process::exit(exit_code);
                }
            },
        },
    }

    Ok(())
}
