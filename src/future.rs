//! Future handle for one launched process.
//!
//! A [`ProcessFuture`] is returned by every launch. It is backed by a watch
//! channel that the runner's supervising task resolves exactly once, after
//! the output streams are drained. The exit code is published separately as
//! soon as the child is reaped, so [`ProcessFuture::is_done`] never has to
//! poll the OS process and never lags behind it.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::error::{Error, Result};
use crate::listeners::CollectingLineListener;

/// Lifecycle of a launched process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProcessState {
    Running,
    Exited(i32),
    Cancelled,
    LaunchFailed { kind: io::ErrorKind, message: String },
    WaitFailed(String),
}

impl ProcessState {
    fn is_terminal(&self) -> bool {
        !matches!(self, ProcessState::Running)
    }
}

/// Turns the collected stdout of a successful run into a value.
pub trait ResultConverter<T> {
    fn convert(&self, output: &str) -> Result<T>;
}

/// Parses stdout as a single JSON document (for `--format=json` commands).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonConverter;

impl<T: DeserializeOwned> ResultConverter<T> for JsonConverter {
    fn convert(&self, output: &str) -> Result<T> {
        Ok(serde_json::from_str(output)?)
    }
}

/// Write side of a [`ProcessFuture`], held by the runner.
#[derive(Debug)]
pub(crate) struct Completion {
    state: watch::Sender<ProcessState>,
    reaped: Arc<OnceLock<i32>>,
}

impl Completion {
    /// Record that the child exited on its own, before its output is drained.
    pub(crate) fn mark_exited(&self, exit_code: i32) {
        let _ = self.reaped.set(exit_code);
    }

    pub(crate) fn resolve(&self, state: ProcessState) {
        debug!(?state, "process resolved");
        self.state.send_replace(state);
    }
}

/// Cancellable, awaitable handle on one launched process.
#[derive(Debug)]
pub struct ProcessFuture {
    program: String,
    pid: Option<u32>,
    state: watch::Receiver<ProcessState>,
    reaped: Arc<OnceLock<i32>>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    cancelled: AtomicBool,
    stdout: Option<Arc<CollectingLineListener>>,
}

impl ProcessFuture {
    pub(crate) fn new(
        program: impl Into<String>,
        pid: Option<u32>,
        cancel: Option<oneshot::Sender<()>>,
        stdout: Option<Arc<CollectingLineListener>>,
    ) -> (Self, Completion) {
        let (tx, rx) = watch::channel(ProcessState::Running);
        let reaped = Arc::new(OnceLock::new());
        let future = Self {
            program: program.into(),
            pid,
            state: rx,
            reaped: reaped.clone(),
            cancel: Mutex::new(cancel),
            cancelled: AtomicBool::new(false),
            stdout,
        };
        (future, Completion { state: tx, reaped })
    }

    /// A future that is already resolved as a launch failure.
    pub(crate) fn launch_failed(program: impl Into<String>, err: &io::Error) -> Self {
        let (future, completion) = Self::new(program, None, None, None);
        completion.resolve(ProcessState::LaunchFailed {
            kind: err.kind(),
            message: err.to_string(),
        });
        future
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request destruction of the process.
    ///
    /// With `force == false` a process that has already exited is left
    /// alone and `false` is returned. Otherwise the process is killed (if it
    /// is still alive), the future is marked cancelled and `true` is
    /// returned. Termination is best-effort.
    pub fn cancel(&self, force: bool) -> bool {
        if !force && self.has_exited() {
            return false;
        }
        let sender = self
            .cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(sender) = sender {
            if sender.send(()).is_err() {
                debug!(program = %self.program, "process already finished while cancelling");
            }
        }
        self.cancelled.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the process exited (successfully or not), failed to
    /// launch, or was cancelled.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.has_exited()
    }

    /// Exit code, once the process has exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        if let Some(code) = self.reaped.get() {
            return Some(*code);
        }
        match *self.state.borrow() {
            ProcessState::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Stdout collected so far, joined with `\n`. Empty when the process
    /// inherited the parent's streams.
    pub fn output(&self) -> String {
        self.stdout
            .as_ref()
            .map(|collector| collector.text())
            .unwrap_or_default()
    }

    /// Wait for the process to finish and return its stdout.
    pub async fn get(&self) -> Result<String> {
        let state = self.wait_terminal().await?;
        self.resolve(state)
    }

    /// [`get`](Self::get) bounded by `timeout`.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<String> {
        tokio::time::timeout(timeout, self.get())
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Wait for the process and convert its stdout.
    pub async fn get_with<T, C: ResultConverter<T>>(&self, converter: &C) -> Result<T> {
        let output = self.get().await?;
        converter.convert(&output)
    }

    /// Wait for the process and parse its stdout as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self) -> Result<T> {
        self.get_with(&JsonConverter).await
    }

    /// Wait for exit and return the raw exit code, without treating a
    /// non-zero code as an error.
    pub(crate) async fn wait_exit_code(&self) -> Result<i32> {
        match self.wait_terminal().await? {
            ProcessState::Exited(code) => Ok(code),
            other => self.resolve(other).map(|_| -1),
        }
    }

    pub(crate) fn failed_to_launch(&self) -> bool {
        matches!(*self.state.borrow(), ProcessState::LaunchFailed { .. })
    }

    fn has_exited(&self) -> bool {
        self.reaped.get().is_some() || self.state.borrow().is_terminal()
    }

    async fn wait_terminal(&self) -> Result<ProcessState> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(ProcessState::is_terminal)
            .await
            .map_err(|_| Error::Interrupted(format!("lost track of {}", self.program)))?
            .clone();
        Ok(state)
    }

    fn resolve(&self, state: ProcessState) -> Result<String> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match state {
            ProcessState::Exited(0) => Ok(self.output()),
            ProcessState::Exited(exit_code) => Err(Error::ProcessExecution { exit_code }),
            ProcessState::Cancelled => Err(Error::Cancelled),
            ProcessState::LaunchFailed { kind, message } => Err(Error::ProcessLaunch {
                program: self.program.clone(),
                source: io::Error::new(kind, message),
            }),
            ProcessState::WaitFailed(message) => Err(Error::Interrupted(message)),
            ProcessState::Running => Err(Error::Interrupted(format!(
                "{} is still running",
                self.program
            ))),
        }
    }
}
