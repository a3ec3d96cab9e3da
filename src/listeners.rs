//! Output listener bus.
//!
//! Listeners are registered on a [`ListenerSet`] before a process is
//! launched and are invoked from the runner's background tasks:
//!
//! - stdout/stderr line listeners are called once per line, in the order the
//!   lines were produced on that stream. There is no ordering between the two
//!   streams.
//! - start listeners are called right after the process was spawned.
//! - exit listeners are called once, after both streams have been drained.
//!
//! Closures implement the listener traits directly, so
//! `Arc::new(|line: &str| println!("{line}"))` is a valid stdout listener.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use regex::Regex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};
use crate::output::sanitize_text;

/// Readiness pattern printed by the local development server once it is
/// accepting requests.
pub const DEV_SERVER_READY_PATTERN: &str =
    r".*(Dev App Server is now running|INFO:oejs\.Server:main: Started).*";

pub trait OutputLineListener: Send + Sync {
    fn on_line(&self, line: &str);
}

pub trait StartListener: Send + Sync {
    /// `pid` is `None` only if the OS did not report one.
    fn on_start(&self, pid: Option<u32>);
}

pub trait ExitListener: Send + Sync {
    /// `exit_code` is `-1` when the process was terminated by a signal.
    fn on_exit(&self, exit_code: i32);
}

impl<F> OutputLineListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_line(&self, line: &str) {
        self(line)
    }
}

impl<F> StartListener for F
where
    F: Fn(Option<u32>) + Send + Sync,
{
    fn on_start(&self, pid: Option<u32>) {
        self(pid)
    }
}

impl<F> ExitListener for F
where
    F: Fn(i32) + Send + Sync,
{
    fn on_exit(&self, exit_code: i32) {
        self(exit_code)
    }
}

/// Callbacks attached to one launch.
#[derive(Clone, Default)]
pub struct ListenerSet {
    pub(crate) stdout: Vec<Arc<dyn OutputLineListener>>,
    pub(crate) stderr: Vec<Arc<dyn OutputLineListener>>,
    pub(crate) start: Vec<Arc<dyn StartListener>>,
    pub(crate) exit: Vec<Arc<dyn ExitListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdout<L: OutputLineListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.stdout.push(listener);
        self
    }

    pub fn stderr<L: OutputLineListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.stderr.push(listener);
        self
    }

    pub fn start<L: StartListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.start.push(listener);
        self
    }

    pub fn exit<L: ExitListener + 'static>(mut self, listener: Arc<L>) -> Self {
        self.exit.push(listener);
        self
    }

    /// Attach a readiness waiter to both output streams and to process exit.
    pub fn waiter(self, waiter: Arc<WaitingLineListener>) -> Self {
        self.stdout(waiter.clone())
            .stderr(waiter.clone())
            .exit(waiter)
    }

    /// Whether any stdout or stderr listener is registered. When none is,
    /// the runner lets the child inherit the parent's streams.
    pub fn has_output_listeners(&self) -> bool {
        !self.stdout.is_empty() || !self.stderr.is_empty()
    }

    pub(crate) fn notify_start(&self, pid: Option<u32>) {
        for listener in &self.start {
            listener.on_start(pid);
        }
    }

    pub(crate) fn notify_exit(&self, exit_code: i32) {
        for listener in &self.exit {
            listener.on_exit(exit_code);
        }
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("stdout", &self.stdout.len())
            .field("stderr", &self.stderr.len())
            .field("start", &self.start.len())
            .field("exit", &self.exit.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Accumulates every line it sees.
#[derive(Debug, Default)]
pub struct CollectingLineListener {
    lines: Mutex<Vec<String>>,
    strip_ansi: bool,
}

impl CollectingLineListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect lines with ANSI escape codes removed.
    pub fn stripping_ansi() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            strip_ansi: true,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    /// All collected lines joined with `\n`.
    pub fn text(&self) -> String {
        lock(&self.lines).join("\n")
    }
}

impl OutputLineListener for CollectingLineListener {
    fn on_line(&self, line: &str) {
        lock(&self.lines).push(sanitize_text(line, self.strip_ansi));
    }
}

/// Remembers the most recent exit code.
#[derive(Debug, Default)]
pub struct ExitCodeRecorder {
    exit_code: Mutex<Option<i32>>,
}

impl ExitCodeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn most_recent_exit_code(&self) -> Option<i32> {
        *lock(&self.exit_code)
    }

    /// True only once an exit code of `0` has been recorded.
    pub fn exited_successfully(&self) -> bool {
        self.most_recent_exit_code() == Some(0)
    }
}

impl ExitListener for ExitCodeRecorder {
    fn on_exit(&self, exit_code: i32) {
        *lock(&self.exit_code) = Some(exit_code);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Waiting,
    Matched,
    Exited(i32),
}

/// Blocks a waiter until a line matching `pattern` shows up on either
/// stream, the process exits, or `timeout` elapses.
#[derive(Debug)]
pub struct WaitingLineListener {
    pattern: Regex,
    timeout: Duration,
    state: watch::Sender<WaitState>,
}

impl WaitingLineListener {
    pub fn new(pattern: &str, timeout: Duration) -> Result<Self> {
        let pattern = Regex::new(pattern)?;
        let (state, _) = watch::channel(WaitState::Waiting);
        Ok(Self {
            pattern,
            timeout,
            state,
        })
    }

    /// Waiter for the development server's "now running" banner.
    pub fn dev_server(timeout: Duration) -> Result<Self> {
        Self::new(DEV_SERVER_READY_PATTERN, timeout)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a matching line has been observed.
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == WaitState::Matched
    }

    /// Wait for readiness.
    ///
    /// Fails with [`Error::WaitTimeout`] once the timeout elapses and with
    /// [`Error::ProcessExitedBeforeReady`] if the process exits first.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let outcome = tokio::time::timeout(
            self.timeout,
            rx.wait_for(|state| *state != WaitState::Waiting),
        )
        .await;

        match outcome {
            Err(_) => Err(Error::WaitTimeout {
                pattern: self.pattern.as_str().to_string(),
                timeout: self.timeout,
            }),
            Ok(Err(_)) => Err(Error::Interrupted(
                "readiness signal dropped".to_string(),
            )),
            Ok(Ok(state)) => match *state {
                WaitState::Exited(exit_code) => Err(Error::ProcessExitedBeforeReady {
                    pattern: self.pattern.as_str().to_string(),
                    exit_code,
                }),
                _ => Ok(()),
            },
        }
    }
}

impl OutputLineListener for WaitingLineListener {
    fn on_line(&self, line: &str) {
        if !self.pattern.is_match(line) {
            return;
        }
        let matched = self.state.send_if_modified(|state| {
            if *state == WaitState::Waiting {
                *state = WaitState::Matched;
                true
            } else {
                false
            }
        });
        if matched {
            debug!(pattern = %self.pattern, "readiness line observed");
        }
    }
}

impl ExitListener for WaitingLineListener {
    fn on_exit(&self, exit_code: i32) {
        self.state.send_if_modified(|state| {
            if *state == WaitState::Waiting {
                *state = WaitState::Exited(exit_code);
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn collector_joins_lines() {
        let collector = CollectingLineListener::new();
        collector.on_line("one");
        collector.on_line("two");
        assert_eq!(collector.text(), "one\ntwo");
        assert_eq!(collector.lines(), vec!["one", "two"]);
    }

    #[test]
    fn collector_can_strip_ansi() {
        let collector = CollectingLineListener::stripping_ansi();
        collector.on_line("\u{1b}[32mok\u{1b}[0m");
        assert_eq!(collector.text(), "ok");
    }

    #[test]
    fn exit_recorder_reports_success_only_for_zero() {
        let recorder = ExitCodeRecorder::new();
        assert!(!recorder.exited_successfully());
        recorder.on_exit(127);
        assert!(!recorder.exited_successfully());
        recorder.on_exit(0);
        assert!(recorder.exited_successfully());
        assert_eq!(recorder.most_recent_exit_code(), Some(0));
    }

    #[test]
    fn closures_are_listeners() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let set = ListenerSet::new().stdout(Arc::new(move |_: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(set.has_output_listeners());
        for listener in &set.stdout {
            listener.on_line("x");
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiter_registers_on_both_streams_and_exit() {
        let waiter = Arc::new(WaitingLineListener::new("ready", Duration::from_secs(1)).unwrap());
        let set = ListenerSet::new().waiter(waiter);
        assert_eq!(set.stdout.len(), 1);
        assert_eq!(set.stderr.len(), 1);
        assert_eq!(set.exit.len(), 1);
    }

    #[test]
    fn dev_server_pattern_matches_both_banners() {
        let waiter = WaitingLineListener::dev_server(Duration::from_secs(1)).unwrap();
        waiter.on_line("INFO 2016 Dev App Server is now running at http://localhost:8080");
        assert!(waiter.is_ready());

        let jetty = WaitingLineListener::dev_server(Duration::from_secs(1)).unwrap();
        jetty.on_line("[INFO] INFO:oejs.Server:main: Started @1234ms");
        assert!(jetty.is_ready());
    }

    #[tokio::test]
    async fn waiter_unblocks_on_match() {
        let waiter = Arc::new(WaitingLineListener::new("ready", Duration::from_secs(5)).unwrap());
        let feeder = waiter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            feeder.on_line("booting");
            feeder.on_line("server ready on :8080");
        });
        waiter.wait().await.unwrap();
    }

    #[tokio::test]
    async fn waiter_fails_when_process_exits_first() {
        let waiter = WaitingLineListener::new("ready", Duration::from_secs(5)).unwrap();
        waiter.on_line("crashing");
        waiter.on_exit(3);
        match waiter.wait().await {
            Err(Error::ProcessExitedBeforeReady { exit_code, .. }) => assert_eq!(exit_code, 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exit_after_match_keeps_ready() {
        let waiter = WaitingLineListener::new("ready", Duration::from_secs(5)).unwrap();
        waiter.on_line("ready");
        waiter.on_exit(0);
        waiter.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_times_out() {
        let waiter = WaitingLineListener::new("ready", Duration::from_secs(2)).unwrap();
        let started = tokio::time::Instant::now();
        let err = waiter.wait().await.unwrap_err();
        assert!(matches!(err, Error::WaitTimeout { .. }));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = WaitingLineListener::new("(", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern(_)));
    }
}
