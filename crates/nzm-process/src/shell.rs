//! Host-shell implementation of [`ProcessRunner`].

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{ProcessOutput, ProcessRequest, ProcessRunner};

pub const DEFAULT_SHELL: &str = "sh";

/// How long to keep draining stdout/stderr after the shell itself exited.
/// Background descendants may hold the pipes open indefinitely.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Runs commands as `<shell> -c <command>` in their own process group.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    fn build_command(&self, request: &ProcessRequest) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&request.command);
        cmd.env_clear();
        cmd.envs(request.env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &request.work_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        // Own process group so a timeout can take down the whole tree,
        // not just the shell (which would orphan its children).
        // SAFETY: setsid() is async-signal-safe and runs before exec,
        // so no Rust runtime state exists in the child yet.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        cmd
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(&self, request: ProcessRequest) -> Result<ProcessOutput> {
        let mut cmd = self.build_command(&request);
        let start = Instant::now();

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{} -c {}`", self.shell, request.command))?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let waited = tokio::time::timeout(request.timeout, child.wait()).await;
        let (exit_code, timed_out) = match waited {
            Ok(Ok(status)) => {
                let code = status.code();
                if code.is_none() {
                    warn!(command = %request.command, "Hook process terminated by signal");
                }
                (code, false)
            }
            Ok(Err(e)) => {
                stdout.0.abort();
                stderr.0.abort();
                return Err(e).context("failed to wait for hook process");
            }
            Err(_) => {
                debug!(
                    command = %request.command,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Hook process timed out, killing process group"
                );
                kill_process_tree(&mut child);
                // Reap so no zombie is left behind.
                let _ = child.wait().await;
                (None, true)
            }
        };
        let duration = start.elapsed();

        Ok(ProcessOutput {
            exit_code,
            stdout: drain(stdout).await,
            stderr: drain(stderr).await,
            timed_out,
            duration,
        })
    }
}

type Reader = (JoinHandle<()>, Arc<Mutex<Vec<u8>>>);

fn spawn_reader<R>(pipe: Option<R>) -> Reader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buf);
    let handle = tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .extend_from_slice(&chunk[..n]),
            }
        }
    });
    (handle, buf)
}

/// Wait briefly for the reader to hit EOF, then take whatever was captured.
/// Dropping the aborted task closes our end of the pipe.
async fn drain((handle, buf): Reader) -> String {
    let abort = handle.abort_handle();
    if tokio::time::timeout(PIPE_DRAIN_GRACE, handle).await.is_err() {
        debug!("Pipe still open after process exit, abandoning drain");
        abort.abort();
    }
    let bytes = buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    String::from_utf8_lossy(&bytes).into_owned()
}

fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: kill() is async-signal-safe. Negative PID targets the
        // entire process group created by setsid() in pre_exec.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
        return;
    }
    let _ = child.start_kill();
}
