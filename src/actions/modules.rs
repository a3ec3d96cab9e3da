//! `gcloud app modules ...`

use std::fmt;
use std::path::PathBuf;

use crate::actions::{check_flags, require, Action};
use crate::command::Invocation;
use crate::error::Result;
use crate::flag::Flag;
use crate::flags::FlagMap;
use crate::sdk::CloudSdk;

const DEFAULT_MODULE: &str = "default";

fn module_args(subcommand: &str, modules: Vec<String>) -> Vec<String> {
    let mut arguments = vec!["modules".to_string(), subcommand.to_string()];
    arguments.extend(modules);
    arguments
}

fn version_args(version: String) -> [String; 2] {
    ["--version".to_string(), version]
}

/// `modules list [modules...]`.
#[derive(Debug, Clone)]
pub struct ListModulesAction {
    modules: Vec<String>,
    flags: FlagMap,
}

impl ListModulesAction {
    pub fn new(modules: Vec<String>, flags: FlagMap) -> Result<Self> {
        check_flags::<Self>(&flags)?;
        Ok(Self { modules, flags })
    }
}

impl Action for ListModulesAction {
    const NAME: &'static str = "modules list";

    fn accepted_flags() -> &'static [Flag] {
        &[Flag::Server]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        let mut arguments = module_args("list", self.modules);
        arguments.extend(self.flags.to_args());
        sdk.app_invocation(arguments)
    }
}

// start, stop and set-default share one shape: modules, a required version
// and the server flag.
macro_rules! versioned_module_action {
    ($(#[$doc:meta])* $action:ident, $subcommand:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $action {
            modules: Vec<String>,
            version: String,
            flags: FlagMap,
        }

        impl $action {
            pub fn new(modules: Vec<String>, version: impl Into<String>, flags: FlagMap) -> Result<Self> {
                let version = version.into();
                require(&version, "version")?;
                check_flags::<Self>(&flags)?;
                Ok(Self { modules, version, flags })
            }
        }

        impl Action for $action {
            const NAME: &'static str = concat!("modules ", $subcommand);

            fn accepted_flags() -> &'static [Flag] {
                &[Flag::Server]
            }

            fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
                let mut arguments = module_args($subcommand, self.modules);
                arguments.extend(version_args(self.version));
                arguments.extend(self.flags.to_args());
                sdk.app_invocation(arguments)
            }
        }
    };
}

versioned_module_action!(
    /// `modules start <modules...> --version <v>`.
    StartModulesAction,
    "start"
);
versioned_module_action!(
    /// `modules stop <modules...> --version <v>`.
    StopModulesAction,
    "stop"
);
versioned_module_action!(
    /// `modules set-default <modules...> --version <v>`.
    SetDefaultAction,
    "set-default"
);

/// `modules delete <modules...> --version <v>`; with no modules the
/// `default` module is deleted.
#[derive(Debug, Clone)]
pub struct DeleteModulesAction {
    modules: Vec<String>,
    version: String,
    flags: FlagMap,
}

impl DeleteModulesAction {
    pub fn new(modules: Vec<String>, version: impl Into<String>, flags: FlagMap) -> Result<Self> {
        let version = version.into();
        require(&version, "version")?;
        check_flags::<Self>(&flags)?;
        Ok(Self {
            modules,
            version,
            flags,
        })
    }
}

impl Action for DeleteModulesAction {
    const NAME: &'static str = "modules delete";

    fn accepted_flags() -> &'static [Flag] {
        &[Flag::Server]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        let modules = if self.modules.is_empty() {
            vec![DEFAULT_MODULE.to_string()]
        } else {
            self.modules
        };
        let mut arguments = module_args("delete", modules);
        arguments.extend(version_args(self.version));
        arguments.extend(self.flags.to_args());
        sdk.app_invocation(arguments)
    }
}

/// `modules get-logs <modules...> [log_file] --version <v>`.
#[derive(Debug, Clone)]
pub struct GetLogsAction {
    modules: Vec<String>,
    version: String,
    log_file: Option<PathBuf>,
    flags: FlagMap,
}

impl GetLogsAction {
    pub fn new(
        modules: Vec<String>,
        version: impl Into<String>,
        log_file: Option<PathBuf>,
        flags: FlagMap,
    ) -> Result<Self> {
        let version = version.into();
        require(&version, "version")?;
        check_flags::<Self>(&flags)?;
        Ok(Self {
            modules,
            version,
            log_file,
            flags,
        })
    }
}

impl Action for GetLogsAction {
    const NAME: &'static str = "modules get-logs";

    fn accepted_flags() -> &'static [Flag] {
        &[
            Flag::Append,
            Flag::Days,
            Flag::Details,
            Flag::EndDate,
            Flag::Server,
            Flag::Severity,
            Flag::Vhost,
        ]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        let mut arguments = module_args("get-logs", self.modules);
        arguments.extend(
            self.log_file
                .filter(|path| !path.as_os_str().is_empty())
                .map(|path| path.to_string_lossy().into_owned()),
        );
        arguments.extend(version_args(self.version));
        arguments.extend(self.flags.to_args());
        sdk.app_invocation(arguments)
    }
}

/// Who manages a module's VM instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedBy {
    Google,
    OwnedBySelf,
}

impl ManagedBy {
    fn flag(self) -> Flag {
        match self {
            ManagedBy::Google => Flag::Google,
            ManagedBy::OwnedBySelf => Flag::OwnedBySelf,
        }
    }
}

impl fmt::Display for ManagedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.flag())
    }
}

/// `modules set-managed-by <modules...> --version <v> (--google | --self)`.
#[derive(Debug, Clone)]
pub struct SetManagedByAction {
    modules: Vec<String>,
    version: String,
    managed_by: ManagedBy,
    flags: FlagMap,
}

impl SetManagedByAction {
    pub fn new(
        modules: Vec<String>,
        version: impl Into<String>,
        managed_by: ManagedBy,
        flags: FlagMap,
    ) -> Result<Self> {
        let version = version.into();
        require(&version, "version")?;
        check_flags::<Self>(&flags)?;
        Ok(Self {
            modules,
            version,
            managed_by,
            flags,
        })
    }
}

impl Action for SetManagedByAction {
    const NAME: &'static str = "modules set-managed-by";

    fn accepted_flags() -> &'static [Flag] {
        &[Flag::Instance, Flag::Server]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        let mut arguments = module_args("set-managed-by", self.modules);
        arguments.extend(version_args(self.version));
        arguments.push(self.managed_by.flag().long_form());
        arguments.extend(self.flags.to_args());
        sdk.app_invocation(arguments)
    }
}
