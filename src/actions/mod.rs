//! Actions: one orchestrated unit of work each.
//!
//! An action is validated when it is constructed, so a value of any action
//! type always carries an accepted flag set. Turning it into an
//! [`Invocation`] consumes it.

mod app;
mod modules;

pub use app::{DeployAction, GenConfigAction, GenRepoInfoFileAction, RunAction, StageAction};
pub use modules::{
    DeleteModulesAction, GetLogsAction, ListModulesAction, ManagedBy, SetDefaultAction,
    SetManagedByAction, StartModulesAction, StopModulesAction,
};

use crate::command::Invocation;
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::flags::FlagMap;
use crate::sdk::CloudSdk;

pub trait Action {
    /// Command name used in validation messages, e.g. `deploy`.
    const NAME: &'static str;

    fn accepted_flags() -> &'static [Flag];

    /// Check preconditions and assemble the command.
    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation>;
}

pub(crate) fn check_flags<A: Action>(flags: &FlagMap) -> Result<()> {
    flags.validate(A::accepted_flags(), A::NAME)
}

pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidConfiguration(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}
