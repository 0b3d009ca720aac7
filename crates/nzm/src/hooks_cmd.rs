//! `nzm hooks ...` handlers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use nzm_hooks::executor::ExecutionResult;
use nzm_hooks::{
    CommandEvent, CommandHook, CommandHooksConfig, EventReport, ExecutionContext, Executor,
    GitHookKind, GitHookManager, HookPaths, PreCommitConfig, PreCommitResult, RunScope,
    UbsScanner, all_errors, any_failed, count_results, load_all_command_hooks, run_pre_commit,
};
use serde_json::json;

use crate::cli::OutputFormat;

const MAX_LISTED_FINDINGS: usize = 5;

fn hook_paths() -> Result<HookPaths> {
    HookPaths::discover().context("Could not determine config directory (set XDG_CONFIG_HOME)")
}

fn load_hooks(paths: &HookPaths) -> Result<CommandHooksConfig> {
    load_all_command_hooks(paths).context("Failed to load command hooks")
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to determine current directory")
}

fn hook_json(hook: &CommandHook) -> serde_json::Value {
    json!({
        "event": hook.event,
        "name": hook.name,
        "command": hook.command,
        "description": hook.description,
        "timeout_ms": hook.effective_timeout().as_millis() as u64,
        "enabled": hook.is_enabled(),
        "workdir": hook.work_dir,
        "continue_on_error": hook.continue_on_error,
        "env": hook.env,
    })
}

pub(crate) fn handle_list(event: Option<CommandEvent>, format: OutputFormat) -> Result<()> {
    let config = load_hooks(&hook_paths()?)?;
    let hooks: Vec<&CommandHook> = config
        .hooks
        .iter()
        .filter(|h| event.is_none_or(|e| h.event == e))
        .collect();

    match format {
        OutputFormat::Json => {
            let items: Vec<_> = hooks.iter().map(|h| hook_json(h)).collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if hooks.is_empty() {
                eprintln!("No command hooks configured.");
                return Ok(());
            }
            for hook in hooks {
                let state = if hook.is_enabled() { "" } else { " [disabled]" };
                println!(
                    "{:<14} {:<20} timeout={}{}",
                    hook.event.as_str(),
                    hook.display_name(),
                    nzm_hooks::duration::format_duration(&hook.effective_timeout()),
                    state
                );
                if hook.display_name() != hook.command {
                    println!("{:<14} $ {}", "", hook.command);
                }
            }
        }
    }
    Ok(())
}

/// Returns the process exit code: 0 valid, 1 invalid.
pub(crate) fn handle_validate(format: OutputFormat) -> Result<i32> {
    let paths = hook_paths()?;
    let dedicated = nzm_hooks::load_command_hooks(&paths.hooks_file);
    let main = nzm_hooks::load_command_hooks_from_main_config(&paths.main_config);

    let sources = [
        (&paths.hooks_file, dedicated.as_ref().map(|c| c.hooks.len())),
        (&paths.main_config, main.as_ref().map(|c| c.hooks.len())),
    ];
    let valid = sources.iter().all(|(_, r)| r.is_ok());

    match format {
        OutputFormat::Json => {
            let items: Vec<_> = sources
                .iter()
                .map(|(path, result)| match result {
                    Ok(count) => json!({"path": path, "valid": true, "hooks": count}),
                    Err(e) => json!({"path": path, "valid": false, "error": e.to_string()}),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({"valid": valid, "sources": items}))?
            );
        }
        OutputFormat::Text => {
            for (path, result) in &sources {
                match result {
                    Ok(count) => println!("✓ {} ({count} hooks)", path.display()),
                    Err(e) => println!("✗ {e}"),
                }
            }
        }
    }
    Ok(if valid { 0 } else { 1 })
}

pub(crate) struct FireArgs {
    pub event: CommandEvent,
    pub session: String,
    pub project_dir: Option<PathBuf>,
    pub pane: String,
    pub message: Option<String>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<u64>,
}

/// Returns 1 when any hook failed or the sequence stopped early.
pub(crate) async fn handle_fire(args: FireArgs, format: OutputFormat) -> Result<i32> {
    let executor = Executor::from_default_config().context("Failed to load command hooks")?;
    let project_dir = match args.project_dir {
        Some(dir) => dir,
        None => current_dir()?,
    };

    let mut ctx = ExecutionContext::new(args.session, project_dir.to_string_lossy())
        .with_pane(args.pane);
    ctx.message = args.message;
    ctx.additional_env.extend(args.env);

    let scope = match args.timeout {
        Some(secs) => RunScope::with_timeout(Duration::from_secs(secs)),
        None => RunScope::new(),
    };
    let interrupt = scope.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, no further hooks will start");
            interrupt.cancel();
        }
    });

    let report = executor.run_hooks_for_event(&scope, args.event, &ctx).await;
    signal_task.abort();

    match format {
        OutputFormat::Json => print_report_json(args.event, &report)?,
        OutputFormat::Text => print_report_text(args.event, &report),
    }

    let failed = report.error.is_some() || any_failed(&report.results);
    Ok(if failed { 1 } else { 0 })
}

fn result_json(result: &ExecutionResult) -> serde_json::Value {
    json!({
        "hook": result.hook.display_name(),
        "command": result.hook.command,
        "success": result.success,
        "skipped": result.skipped,
        "exit_code": result.exit_code,
        "timed_out": result.timed_out,
        "duration_ms": result.duration.as_millis() as u64,
        "stdout": result.stdout,
        "stderr": result.stderr,
        "error": result.error.as_ref().map(ToString::to_string),
    })
}

fn print_report_json(event: CommandEvent, report: &EventReport) -> Result<()> {
    let results: Vec<_> = report.results.iter().map(result_json).collect();
    let errors: Vec<String> = all_errors(&report.results)
        .map(|failures| failures.iter().map(|f| f.error.to_string()).collect())
        .unwrap_or_default();
    let value = json!({
        "event": event,
        "results": results,
        "counts": count_results(&report.results),
        "errors": errors,
        "error": report.error.as_ref().map(ToString::to_string),
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_report_text(event: CommandEvent, report: &EventReport) {
    if report.results.is_empty() && report.error.is_none() {
        eprintln!("No hooks for {event}.");
        return;
    }

    for result in &report.results {
        let name = result.hook.display_name();
        let elapsed = result.duration.as_millis();
        if result.skipped {
            println!("- {name} (skipped)");
        } else if result.success {
            println!("✓ {name} ({elapsed}ms)");
        } else {
            let reason = result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| format!("exit code {}", result.exit_code));
            println!("✗ {name} ({elapsed}ms): {reason}");
        }
        if !result.stdout.trim().is_empty() {
            for line in result.stdout.trim_end().lines() {
                println!("    {line}");
            }
        }
    }

    let counts = count_results(&report.results);
    println!(
        "{event}: {} succeeded, {} failed, {} skipped",
        counts.success, counts.failed, counts.skipped
    );
    if let Some(err) = &report.error {
        eprintln!("Stopped: {err}");
    }
}

fn git_manager() -> Result<GitHookManager> {
    Ok(GitHookManager::new(&current_dir()?)?)
}

pub(crate) fn handle_install(kind: GitHookKind, force: bool) -> Result<()> {
    let manager = git_manager()?;
    manager.install(kind, force)?;
    eprintln!(
        "✓ Installed {kind} hook at {}",
        manager.hook_path(kind).display()
    );
    Ok(())
}

pub(crate) fn handle_uninstall(kind: GitHookKind, restore: bool) -> Result<()> {
    let manager = git_manager()?;
    manager.uninstall(kind, restore)?;
    eprintln!("✓ Removed {kind} hook");
    Ok(())
}

pub(crate) fn handle_status(format: OutputFormat) -> Result<()> {
    let manager = git_manager()?;
    let infos = manager.list_all()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&infos)?),
        OutputFormat::Text => {
            println!("Repository: {}", manager.repo_root().display());
            for info in infos {
                let state = match (info.installed, info.managed) {
                    (false, _) => "not installed",
                    (true, true) => "installed (nzm)",
                    (true, false) => "installed (other)",
                };
                let backup = if info.has_backup { ", backup present" } else { "" };
                println!("  {:<12} {state}{backup}", info.kind.as_str());
            }
        }
    }
    Ok(())
}

/// Returns the policy's exit code.
pub(crate) async fn handle_run_pre_commit(config: PreCommitConfig, format: OutputFormat) -> Result<i32> {
    let repo = current_dir()?;
    let scanner = UbsScanner::locate();
    let result = run_pre_commit(&repo, &config, &scanner).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_pre_commit(&result, &repo),
    }
    Ok(result.exit_code())
}

fn print_pre_commit(result: &PreCommitResult, repo: &Path) {
    println!("nzm pre-commit check ({})", repo.display());
    println!("  Staged files: {}", result.staged_files.len());
    println!("  Duration:     {}ms", result.duration.as_millis());

    if result.staged_files.is_empty() && result.scan.is_none() {
        println!("  • No staged files to check");
        return;
    }
    if !result.scanner_available {
        println!("  ⚠ ubs not installed, skipping scan");
        return;
    }

    if let Some(scan) = &result.scan {
        println!("  Critical: {}", scan.totals.critical);
        println!("  Warning:  {}", scan.totals.warning);
        println!("  Info:     {}", scan.totals.info);
        for finding in scan.findings.iter().take(MAX_LISTED_FINDINGS) {
            println!(
                "    {} {}:{} - {}",
                finding.severity, finding.file, finding.line, finding.message
            );
        }
        if scan.findings.len() > MAX_LISTED_FINDINGS {
            println!(
                "    ... and {} more",
                scan.findings.len() - MAX_LISTED_FINDINGS
            );
        }
    }

    match &result.block_reason {
        None => println!("✓ Pre-commit check passed"),
        Some(reason) => {
            println!("✗ Pre-commit check failed: {reason}");
            println!("  Run 'ubs $(git diff --name-only --cached)' to see details.");
        }
    }
}
