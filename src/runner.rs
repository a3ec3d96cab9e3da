//! Process launching.
//!
//! A [`ProcessRunner`] spawns exactly one child process, wires its output
//! into the registered listeners and hands back a [`ProcessFuture`]. The
//! child is owned by a supervising task which drains both output streams
//! before it reports the exit, and which kills the child (and its process
//! group on unix) when the future is cancelled.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::future::{Completion, ProcessFuture, ProcessState};
use crate::listeners::{CollectingLineListener, ListenerSet, OutputLineListener};
use crate::output::{decode_line, StreamKind};

// Upper bound on how long the supervisor waits for the readers after exit.
// A grandchild holding the pipes open must not block completion forever.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// Consecutive read errors tolerated before a reader gives up on its pipe.
const MAX_READ_FAILURES: u32 = 16;

/// Whether [`ProcessRunner::run`] waits for the process to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Sync,
    Async,
}

/// Single-use process launcher.
#[derive(Debug, Default)]
pub struct ProcessRunner {
    mode: RunMode,
    listeners: ListenerSet,
    capture_output: bool,
    launched: AtomicBool,
}

impl ProcessRunner {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn listeners(mut self, listeners: ListenerSet) -> Self {
        self.listeners = listeners;
        self
    }

    /// Pipe the child's output even when no line listener is registered, so
    /// that the returned future collects stdout.
    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Launch `command`.
    ///
    /// In [`RunMode::Sync`] this returns once the process has exited, and a
    /// non-zero exit code is an error. In [`RunMode::Async`] this returns
    /// right after spawning, and every failure after validation surfaces
    /// through the returned future.
    pub async fn run(
        &self,
        command: &Command,
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<ProcessFuture> {
        if self.launched.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyLaunched);
        }

        info!(command = %command, mode = ?self.mode, "submitting command");

        let piped = self.capture_output || self.listeners.has_output_listeners();
        let mut process = tokio::process::Command::new(command.program());
        process.args(command.args());
        if let Some(dir) = working_dir {
            process.current_dir(dir);
        }
        if !env.is_empty() {
            process.envs(env);
        }
        if piped {
            process
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            #[cfg(unix)]
            unsafe {
                process.pre_exec(|| {
                    let _ = libc::setpgid(0, 0);
                    Ok(())
                });
            }
        } else {
            process
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }
        process.kill_on_drop(true);

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(program = command.program(), error = %err, "failed to launch");
                return match self.mode {
                    RunMode::Sync => Err(Error::ProcessLaunch {
                        program: command.program().to_string(),
                        source: err,
                    }),
                    RunMode::Async => Ok(ProcessFuture::launch_failed(command.program(), &err)),
                };
            }
        };

        let pid = child.id();
        self.listeners.notify_start(pid);

        let collector = piped.then(|| Arc::new(CollectingLineListener::new()));
        let readers = self.spawn_readers(&mut child, collector.clone());

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (future, completion) =
            ProcessFuture::new(command.program(), pid, Some(cancel_tx), collector);

        tokio::spawn(supervise(
            child,
            readers,
            cancel_rx,
            self.listeners.clone(),
            completion,
        ));

        if self.mode == RunMode::Sync {
            let exit_code = future.wait_exit_code().await?;
            if exit_code != 0 {
                return Err(Error::ProcessExecution { exit_code });
            }
        }
        Ok(future)
    }

    fn spawn_readers(
        &self,
        child: &mut Child,
        collector: Option<Arc<CollectingLineListener>>,
    ) -> Vec<JoinHandle<()>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let mut listeners = self.listeners.stdout.clone();
            if let Some(collector) = collector {
                listeners.push(collector);
            }
            readers.push(tokio::spawn(read_stream(
                StreamKind::Stdout,
                stdout,
                listeners,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_stream(
                StreamKind::Stderr,
                stderr,
                self.listeners.stderr.clone(),
            )));
        }
        readers
    }
}

async fn supervise(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut cancel_rx: oneshot::Receiver<()>,
    listeners: ListenerSet,
    completion: Completion,
) {
    let pid = child.id();
    let (status, cancelled) = tokio::select! {
        status = child.wait() => (status, false),
        Ok(()) = &mut cancel_rx => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            if let Err(err) = child.kill().await {
                warn!(error = %err, "failed to kill cancelled process");
            }
            (child.wait().await, true)
        }
    };

    // A signal-terminated process has no code.
    let exit_code = status.as_ref().ok().map(|status| status.code().unwrap_or(-1));
    if let (Some(code), false) = (exit_code, cancelled) {
        completion.mark_exited(code);
    }

    drain(readers).await;

    let state = match status {
        Ok(_) => {
            let code = exit_code.unwrap_or(-1);
            listeners.notify_exit(code);
            if cancelled {
                ProcessState::Cancelled
            } else {
                ProcessState::Exited(code)
            }
        }
        Err(err) => {
            warn!(error = %err, "failed waiting for process");
            ProcessState::WaitFailed(err.to_string())
        }
    };
    completion.resolve(state);
}

async fn drain(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut reader).await.is_err() {
            debug!("output still open after exit, abandoning reader");
            reader.abort();
        }
    }
}

async fn read_stream<R>(
    stream: StreamKind,
    reader: R,
    listeners: Vec<Arc<dyn OutputLineListener>>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    let mut failures = 0;
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                failures = 0;
                let line = decode_line(&raw);
                debug!(%stream, "{line}");
                for listener in &listeners {
                    listener.on_line(&line);
                }
            }
            Err(err) => {
                failures += 1;
                warn!(%stream, error = %err, "failed reading output");
                if failures >= MAX_READ_FAILURES {
                    break;
                }
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    unsafe {
        let pid = pid as i32;
        let _ = libc::kill(-pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Output of a synchronous, fully captured run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `command` to completion and capture both streams, without treating a
/// non-zero exit code as an error.
pub async fn run_captured(
    command: &Command,
    working_dir: Option<&Path>,
    env: &HashMap<String, String>,
) -> Result<CapturedOutput> {
    let stdout = Arc::new(CollectingLineListener::new());
    let stderr = Arc::new(CollectingLineListener::new());
    let runner = ProcessRunner::new(RunMode::Async).listeners(
        ListenerSet::new()
            .stdout(stdout.clone())
            .stderr(stderr.clone()),
    );
    let future = runner.run(command, working_dir, env).await?;
    let exit_code = future.wait_exit_code().await?;
    Ok(CapturedOutput {
        stdout: stdout.text(),
        stderr: stderr.text(),
        exit_code,
    })
}
