//! toolrack: drives the Cloud SDK command-line tools on behalf of typed,
//! validated actions.
//!
//! A typical run builds a [`CloudSdk`] for an SDK root, constructs an action
//! (flags are validated on construction) and executes it:
//!
//! ```no_run
//! use toolrack::{CloudSdk, DeployAction, Flag, FlagMap, RunMode};
//!
//! # async fn deploy() -> toolrack::Result<()> {
//! let sdk = CloudSdk::builder("/opt/google-cloud-sdk")
//!     .mode(RunMode::Async)
//!     .build()?;
//! let flags = FlagMap::new().with(Flag::Version, "v1");
//! let future = sdk.execute(DeployAction::new("build/staged", flags)?).await?;
//! future.get().await?;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod args;
pub mod command;
pub mod config;
pub mod error;
pub mod flag;
pub mod flags;
pub mod future;
pub mod listeners;
pub mod output;
pub mod runner;
pub mod sdk;

pub use actions::{
    Action, DeleteModulesAction, DeployAction, GenConfigAction, GenRepoInfoFileAction,
    GetLogsAction, ListModulesAction, ManagedBy, RunAction, SetDefaultAction, SetManagedByAction,
    StageAction, StartModulesAction, StopModulesAction,
};
pub use command::{Command, Invocation, Tool};
pub use error::{Error, Result};
pub use flag::{Flag, FlagKind};
pub use flags::FlagMap;
pub use future::{JsonConverter, ProcessFuture, ResultConverter};
pub use listeners::{
    CollectingLineListener, ExitCodeRecorder, ExitListener, ListenerSet, OutputLineListener,
    StartListener, WaitingLineListener,
};
pub use runner::{run_captured, CapturedOutput, ProcessRunner, RunMode};
pub use sdk::CloudSdk;
