use super::*;
use crate::duration::HookTimeout;
use crate::hook::Enablement;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Scripted runner
// ---------------------------------------------------------------------------

enum Step {
    Exit(i32),
    TimedOut,
    Signalled,
    SpawnError,
    /// Exit 0 after cancelling the given token.
    CancelThenOk(CancellationToken),
}

#[derive(Default)]
struct ScriptedRunner {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProcessRequest>>,
}

impl ScriptedRunner {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }

    fn request(&self, index: usize) -> ProcessRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, request: ProcessRequest) -> anyhow::Result<ProcessOutput> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Exit(0));
        let exit = |code| ProcessOutput {
            exit_code: Some(code),
            stderr: if code == 0 { String::new() } else { "boom\n".into() },
            duration: Duration::from_millis(5),
            ..ProcessOutput::default()
        };
        match step {
            Step::Exit(code) => Ok(exit(code)),
            Step::TimedOut => Ok(ProcessOutput {
                timed_out: true,
                ..ProcessOutput::default()
            }),
            Step::Signalled => Ok(ProcessOutput::default()),
            Step::SpawnError => Err(anyhow!("No such file or directory")),
            Step::CancelThenOk(token) => {
                token.cancel();
                Ok(exit(0))
            }
        }
    }
}

fn named(event: CommandEvent, name: &str, command: &str) -> CommandHook {
    CommandHook {
        name: name.into(),
        ..CommandHook::new(event, command)
    }
}

fn continuing(hook: CommandHook) -> CommandHook {
    CommandHook {
        continue_on_error: true,
        ..hook
    }
}

fn scripted(hooks: Vec<CommandHook>, runner: &Arc<ScriptedRunner>) -> Executor {
    Executor::with_runner(CommandHooksConfig::new(hooks), runner.clone())
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new("sess", "/tmp")
}

fn string_env(env: Vec<(OsString, OsString)>) -> HashMap<String, String> {
    env.into_iter()
        .map(|(k, v)| (k.into_string().unwrap(), v.into_string().unwrap()))
        .collect()
}

fn os_pairs(pairs: &[(&str, &str)]) -> Vec<(OsString, OsString)> {
    pairs.iter().map(|(k, v)| (k.into(), v.into())).collect()
}

// ---------------------------------------------------------------------------
// Sequencing and failure policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_zero_hooks_no_results_no_error() {
    let runner = ScriptedRunner::new(vec![]);
    let executor = scripted(
        vec![named(CommandEvent::PostSend, "other", "true")],
        &runner,
    );

    let report = executor
        .run_hooks_for_event(&RunScope::new(), CommandEvent::PreSend, &ctx())
        .await;
    assert!(report.results.is_empty());
    assert!(report.error.is_none());
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn test_runs_in_declaration_order_and_skips_disabled() {
    let runner = ScriptedRunner::new(vec![]);
    let disabled = CommandHook {
        enabled: Enablement::Disabled,
        ..named(CommandEvent::PreSpawn, "off", "c2")
    };
    let executor = scripted(
        vec![
            named(CommandEvent::PreSpawn, "a", "c1"),
            disabled,
            named(CommandEvent::PostSpawn, "x", "other"),
            named(CommandEvent::PreSpawn, "b", "c3"),
        ],
        &runner,
    );

    let report = executor
        .run_hooks_for_event(&RunScope::new(), CommandEvent::PreSpawn, &ctx())
        .await;
    assert!(report.is_ok());
    assert_eq!(runner.commands(), ["c1", "c3"]);
    assert!(report.results.iter().all(|r| r.success && r.exit_code == 0));
}

#[tokio::test]
async fn test_fail_fast_halts_after_failing_hook() {
    let runner = ScriptedRunner::new(vec![Step::Exit(0), Step::Exit(3)]);
    let executor = scripted(
        vec![
            named(CommandEvent::PreAdd, "one", "c1"),
            named(CommandEvent::PreAdd, "two", "c2"),
            named(CommandEvent::PreAdd, "three", "c3"),
        ],
        &runner,
    );

    let report = executor
        .run_hooks_for_event(&RunScope::new(), CommandEvent::PreAdd, &ctx())
        .await;

    assert_eq!(report.results.len(), 2);
    assert_eq!(runner.commands(), ["c1", "c2"]);
    let failed = &report.results[1];
    assert!(!failed.success);
    assert_eq!(failed.exit_code, 3);
    assert_eq!(
        report.error,
        Some(HookError::ExitStatus {
            hook: "two".into(),
            code: 3,
            stderr: "boom\n".into(),
        })
    );
    assert_eq!(
        report.error.unwrap().to_string(),
        "hook \"two\" failed with exit code 3: boom"
    );
}

#[tokio::test]
async fn test_continue_on_error_runs_everything() {
    let runner = ScriptedRunner::new(vec![Step::Exit(1), Step::Exit(2), Step::Exit(0)]);
    let executor = scripted(
        vec![
            continuing(named(CommandEvent::PostAdd, "a", "c1")),
            continuing(named(CommandEvent::PostAdd, "b", "c2")),
            continuing(named(CommandEvent::PostAdd, "c", "c3")),
        ],
        &runner,
    );

    let report = executor
        .run_hooks_for_event(&RunScope::new(), CommandEvent::PostAdd, &ctx())
        .await;

    assert_eq!(report.results.len(), 3);
    assert!(report.error.is_none());
    assert!(report.results[0].failed());
    assert!(report.results[1].failed());
    assert!(report.results[2].success);
}

#[tokio::test]
async fn test_timeout_result_and_halt() {
    let runner = ScriptedRunner::new(vec![Step::TimedOut]);
    let hook = CommandHook {
        timeout: HookTimeout::from_secs(2),
        ..named(CommandEvent::PreCreate, "slow", "sleep 10")
    };
    let executor = scripted(vec![hook, named(CommandEvent::PreCreate, "next", "c2")], &runner);

    let report = executor
        .run_hooks_for_event(&RunScope::new(), CommandEvent::PreCreate, &ctx())
        .await;

    assert_eq!(report.results.len(), 1);
    let result = &report.results[0];
    assert!(result.timed_out);
    assert!(!result.success);
    assert_eq!(result.exit_code, -1);
    assert_eq!(
        report.error,
        Some(HookError::TimedOut {
            hook: "slow".into(),
            timeout: Duration::from_secs(2),
        })
    );
    assert_eq!(runner.request(0).timeout, Duration::from_secs(2));
}

#[tokio::test]
async fn test_signal_and_spawn_failures() {
    let runner = ScriptedRunner::new(vec![Step::Signalled, Step::SpawnError]);
    let executor = scripted(
        vec![
            continuing(named(CommandEvent::PreShutdown, "sig", "c1")),
            named(CommandEvent::PreShutdown, "", "missing-binary"),
        ],
        &runner,
    );

    let report = executor
        .run_hooks_for_event(&RunScope::new(), CommandEvent::PreShutdown, &ctx())
        .await;

    assert_eq!(
        report.results[0].error,
        Some(HookError::Signal { hook: "sig".into() })
    );
    match &report.error {
        Some(HookError::Spawn { hook, message }) => {
            // Unnamed hooks are identified by their command.
            assert_eq!(hook, "missing-binary");
            assert!(message.contains("No such file"));
        }
        other => panic!("expected spawn error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Cancellation and deadline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_pre_cancelled_scope_runs_nothing() {
    let runner = ScriptedRunner::new(vec![]);
    let executor = scripted(vec![named(CommandEvent::PreSend, "a", "c1")], &runner);

    let scope = RunScope::new();
    scope.cancel();
    let report = executor
        .run_hooks_for_event(&scope, CommandEvent::PreSend, &ctx())
        .await;

    assert!(report.results.is_empty());
    assert_eq!(report.error, Some(HookError::Cancelled));
    assert!(runner.commands().is_empty());
}

#[tokio::test]
async fn test_cancel_is_observed_between_hooks() {
    let scope = RunScope::new();
    let runner = ScriptedRunner::new(vec![Step::CancelThenOk(scope.token().clone())]);
    let executor = scripted(
        vec![
            named(CommandEvent::PostSend, "a", "c1"),
            named(CommandEvent::PostSend, "b", "c2"),
        ],
        &runner,
    );

    let report = executor
        .run_hooks_for_event(&scope, CommandEvent::PostSend, &ctx())
        .await;

    // The running hook completes; the next one never starts.
    assert_eq!(report.results.len(), 1);
    assert!(report.results[0].success);
    assert_eq!(report.error, Some(HookError::Cancelled));
    assert!(report.error.as_ref().unwrap().is_interruption());
}

#[tokio::test]
async fn test_expired_deadline_runs_nothing() {
    let runner = ScriptedRunner::new(vec![]);
    let executor = scripted(vec![named(CommandEvent::PreSpawn, "a", "c1")], &runner);

    let scope = RunScope::with_deadline(Instant::now());
    let report = executor
        .run_hooks_for_event(&scope, CommandEvent::PreSpawn, &ctx())
        .await;

    assert!(report.results.is_empty());
    assert_eq!(report.error, Some(HookError::DeadlineExceeded));
}

#[tokio::test]
async fn test_deadline_shortens_hook_timeout() {
    let runner = ScriptedRunner::new(vec![]);
    let executor = scripted(vec![named(CommandEvent::PreSpawn, "a", "c1")], &runner);

    let scope = RunScope::with_timeout(Duration::from_secs(5));
    let report = executor
        .run_hooks_for_event(&scope, CommandEvent::PreSpawn, &ctx())
        .await;

    assert!(report.is_ok());
    let bound = runner.request(0).timeout;
    assert!(bound <= Duration::from_secs(5), "{bound:?}");
    assert!(bound > Duration::from_secs(4), "{bound:?}");
}

#[test]
fn test_scope_without_deadline_keeps_hook_timeout() {
    let scope = RunScope::new();
    assert_eq!(scope.remaining(), None);
    assert_eq!(scope.bound(Duration::from_secs(30)), Duration::from_secs(30));
    assert!(scope.interruption().is_none());
}

#[test]
fn test_scope_clones_share_cancellation() {
    let scope = RunScope::new();
    let handle = scope.clone();
    handle.cancel();
    assert!(scope.is_cancelled());
}

#[test]
fn test_scope_with_huge_timeout_has_no_deadline() {
    let scope = RunScope::with_timeout(Duration::from_secs(u64::MAX));
    assert_eq!(scope.deadline(), None);
    assert!(scope.interruption().is_none());
    assert_eq!(scope.bound(Duration::from_secs(30)), Duration::from_secs(30));

    let scope = RunScope::with_timeout(Duration::from_secs(60));
    assert!(scope.deadline().is_some());
}

#[test]
fn test_scope_follows_parent_token() {
    let parent = CancellationToken::new();
    let scope = RunScope::from_token(parent.child_token());
    assert!(scope.interruption().is_none());

    parent.cancel();
    assert_eq!(scope.interruption(), Some(HookError::Cancelled));
    assert!(scope.token().is_cancelled());
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_request_carries_workdir_and_env() {
    let runner = ScriptedRunner::new(vec![]);
    let hook = CommandHook {
        work_dir: "${PROJECT}/sub".into(),
        env: HashMap::from([("FROM_HOOK".to_string(), "1".to_string())]),
        ..named(CommandEvent::PreSend, "env-check", "env")
    };
    let executor = scripted(vec![hook], &runner);

    let context = ExecutionContext::new("alpha", "/work/proj")
        .with_pane("%3")
        .with_message("hello");
    executor
        .run_hooks_for_event(&RunScope::new(), CommandEvent::PreSend, &context)
        .await;

    let request = runner.request(0);
    assert_eq!(request.work_dir, Some(PathBuf::from("/work/proj/sub")));
    let env = string_env(request.env);
    assert_eq!(env[ENV_SESSION], "alpha");
    assert_eq!(env[ENV_PROJECT_DIR], "/work/proj");
    assert_eq!(env[ENV_PANE], "%3");
    assert_eq!(env[ENV_HOOK_EVENT], "pre-send");
    assert_eq!(env[ENV_HOOK_NAME], "env-check");
    assert_eq!(env[ENV_MESSAGE], "hello");
    assert_eq!(env["FROM_HOOK"], "1");
}

#[test]
fn test_environment_precedence() {
    let hook = CommandHook {
        env: HashMap::from([
            ("SHARED".to_string(), "hook".to_string()),
            ("NZM_PANE".to_string(), "hook-pane".to_string()),
        ]),
        ..CommandHook::new(CommandEvent::PostSpawn, "true")
    };
    let context = ExecutionContext::new("s", "/p")
        .with_pane("ctx-pane")
        .with_env("SHARED", "context");
    let ambient = os_pairs(&[
        ("SHARED", "ambient"),
        ("NZM_SESSION", "stale"),
        ("PATH", "/bin"),
    ]);

    let env = string_env(build_environment(&hook, &context, ambient));

    assert_eq!(env["PATH"], "/bin");
    assert_eq!(env["NZM_SESSION"], "s");
    assert_eq!(env["NZM_PANE"], "hook-pane");
    assert_eq!(env["SHARED"], "context");
}

#[test]
fn test_environment_omits_optional_variables() {
    let hook = CommandHook::new(CommandEvent::PostSpawn, "true");
    let env = string_env(build_environment(
        &hook,
        &ExecutionContext::new("s", "/p"),
        Vec::new(),
    ));

    assert!(!env.contains_key(ENV_HOOK_NAME));
    assert!(!env.contains_key(ENV_MESSAGE));
    assert_eq!(env[ENV_PANE], "");
}

#[cfg(unix)]
#[test]
fn test_environment_keeps_non_utf8_ambient_values() {
    use std::os::unix::ffi::OsStringExt;

    let raw = OsString::from_vec(b"a\xffb".to_vec());
    let mut ambient = os_pairs(&[("PLAIN", "ok")]);
    ambient.push(("RAW_BYTES".into(), raw.clone()));

    let hook = CommandHook::new(CommandEvent::PreSend, "true");
    let env: HashMap<_, _> = build_environment(&hook, &ctx(), ambient)
        .into_iter()
        .collect();

    assert_eq!(env[&OsString::from("RAW_BYTES")], raw);
    assert_eq!(env[&OsString::from("PLAIN")], "ok");
    assert_eq!(env[&OsString::from(ENV_SESSION)], "sess");
}

#[test]
fn test_truncate_message() {
    assert_eq!(truncate_message("short"), "short");

    let exact = "x".repeat(MAX_MESSAGE_CHARS);
    assert_eq!(truncate_message(&exact), exact);

    let long = "y".repeat(2000);
    let truncated = truncate_message(&long);
    assert_eq!(truncated.chars().count(), 1003);
    assert!(truncated.ends_with("y..."));

    // Counts characters, not bytes.
    let wide = "é".repeat(1500);
    assert_eq!(truncate_message(&wide).chars().count(), 1003);
}

// ---------------------------------------------------------------------------
// Real shell
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod shell {
    use super::*;

    fn run_in(dir: &std::path::Path) -> ExecutionContext {
        ExecutionContext::new("shell-test", dir.to_string_lossy())
    }

    #[tokio::test]
    async fn test_fail_fast_marker_never_created() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::new(CommandHooksConfig::new(vec![
            named(CommandEvent::PreSpawn, "ok", "true"),
            named(CommandEvent::PreSpawn, "fails", "echo nope >&2; exit 7"),
            named(CommandEvent::PreSpawn, "marker", "touch marker"),
        ]));

        let report = executor
            .run_hooks_for_event(&RunScope::new(), CommandEvent::PreSpawn, &run_in(dir.path()))
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[1].exit_code, 7);
        assert_eq!(report.results[1].stderr.trim(), "nope");
        assert!(!dir.path().join("marker").exists());
        assert!(matches!(report.error, Some(HookError::ExitStatus { code: 7, .. })));
    }

    #[tokio::test]
    async fn test_continue_on_error_reaches_last_hook() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::new(CommandHooksConfig::new(vec![
            continuing(named(CommandEvent::PostSpawn, "a", "exit 1")),
            continuing(named(CommandEvent::PostSpawn, "b", "exit 2")),
            named(CommandEvent::PostSpawn, "marker", "touch marker"),
        ]));

        let report = executor
            .run_hooks_for_event(&RunScope::new(), CommandEvent::PostSpawn, &run_in(dir.path()))
            .await;

        assert_eq!(report.results.len(), 3);
        assert!(report.error.is_none());
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_long_message_observed_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::new(CommandHooksConfig::new(vec![named(
            CommandEvent::PreSend,
            "len",
            "printf '%s' \"${#NZM_MESSAGE}\"",
        )]));

        let context = run_in(dir.path()).with_message("m".repeat(2000));
        let report = executor
            .run_hooks_for_event(&RunScope::new(), CommandEvent::PreSend, &context)
            .await;

        assert!(report.is_ok(), "{:?}", report.error);
        assert_eq!(report.results[0].stdout, "1003");
    }

    #[tokio::test]
    async fn test_hook_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let hook = CommandHook {
            timeout: HookTimeout::from_millis(200),
            ..named(CommandEvent::PreCreate, "sleepy", "sleep 5")
        };
        let executor = Executor::new(CommandHooksConfig::new(vec![hook]));

        let started = std::time::Instant::now();
        let report = executor
            .run_hooks_for_event(&RunScope::new(), CommandEvent::PreCreate, &run_in(dir.path()))
            .await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(report.results[0].timed_out);
        assert!(matches!(report.error, Some(HookError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_scope_deadline_bounds_running_hook() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::new(CommandHooksConfig::new(vec![
            continuing(named(CommandEvent::PreCreate, "sleepy", "sleep 5")),
            named(CommandEvent::PreCreate, "after", "true"),
        ]));

        let scope = RunScope::with_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        let report = executor
            .run_hooks_for_event(&scope, CommandEvent::PreCreate, &run_in(dir.path()))
            .await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].timed_out);
        assert_eq!(report.error, Some(HookError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_workdir_defaults_to_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Executor::new(CommandHooksConfig::new(vec![named(
            CommandEvent::PostCreate,
            "where",
            "pwd -P",
        )]));

        let report = executor
            .run_hooks_for_event(&RunScope::new(), CommandEvent::PostCreate, &run_in(dir.path()))
            .await;

        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            report.results[0].stdout.trim(),
            expected.to_string_lossy()
        );
    }
}
