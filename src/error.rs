//! Error taxonomy for toolrack.
//!
//! Validation and precondition errors (`InvalidFlag`, `InvalidConfiguration`,
//! `InvalidDirectory`) are raised before anything is spawned. Launch and
//! execution errors of asynchronous runs only surface through
//! [`ProcessFuture`](crate::future::ProcessFuture).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid flag {flag}: {reason}")]
    InvalidFlag { flag: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid directory {}: {reason}", path.display())]
    InvalidDirectory { path: PathBuf, reason: String },

    #[error("cloud sdk not found: {0}")]
    SdkNotFound(String),

    #[error("app engine java components not installed: {0}")]
    ComponentsNotInstalled(String),

    #[error("failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("process exited with code {exit_code}")]
    ProcessExecution { exit_code: i32 },

    #[error("interrupted while waiting for process: {0}")]
    Interrupted(String),

    #[error("process runner has already launched a process")]
    AlreadyLaunched,

    #[error("process was cancelled")]
    Cancelled,

    #[error("process did not finish within {0:?}")]
    Timeout(Duration),

    #[error("no output line matched '{pattern}' within {timeout:?}")]
    WaitTimeout { pattern: String, timeout: Duration },

    #[error("process exited with code {exit_code} before any line matched '{pattern}'")]
    ProcessExitedBeforeReady { pattern: String, exit_code: i32 },

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_flag(flag: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidFlag {
            flag: flag.into(),
            reason: reason.into(),
        }
    }

    /// Exit code carried by the error, if the process ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ProcessExecution { exit_code } => Some(*exit_code),
            Error::ProcessExitedBeforeReady { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
