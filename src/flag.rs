//! Catalog of the command-line flags understood by the wrapped tools.
//!
//! Every [`Flag`] carries a long form (`--server`), an optional short form
//! (`-s`) and the kind of value it accepts. The catalog is fixed at compile
//! time; declaration order doubles as the order in which flags are emitted
//! into an assembled command.

use std::fmt;

const LONG_FORM_PREFIX: &str = "--";
const SHORT_FORM_PREFIX: &str = "-";

/// The kind of value a flag accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    String,
    Integer,
    Boolean,
}

/// Static metadata for one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSpec {
    pub name: &'static str,
    pub short: Option<&'static str>,
    pub kind: FlagKind,
}

macro_rules! flag_catalog {
    ($( $variant:ident => ($name:literal, $short:expr, $kind:ident) ),+ $(,)?) => {
        /// A recognized command-line flag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Flag {
            $( $variant, )+
        }

        impl Flag {
            /// Every flag, in declaration order.
            pub const ALL: &'static [Flag] = &[ $( Flag::$variant, )+ ];

            /// Metadata for this flag.
            pub const fn spec(self) -> FlagSpec {
                match self {
                    $( Flag::$variant => FlagSpec {
                        name: $name,
                        short: $short,
                        kind: FlagKind::$kind,
                    }, )+
                }
            }
        }
    };
}

flag_catalog! {
    EnableQuickstart => ("enable_quickstart", None, Boolean),
    DisableUpdateCheck => ("disable_update_check", None, Boolean),
    EnableJarSplitting => ("enable_jar_splitting", None, Boolean),
    JarSplittingExcludes => ("jar_splitting_excludes", None, String),
    RetainUploadDir => ("retain_upload_dir", None, Boolean),
    CompileEncoding => ("compile_encoding", None, String),
    Force => ("force", Some("f"), Boolean),
    DeleteJsps => ("delete_jsps", None, Boolean),
    EnableJarClasses => ("enable_jar_classes", None, Boolean),
    Runtime => ("runtime", Some("r"), String),
    UseRemoteResourceLimits => ("use_remote_resource_limits", None, Boolean),
    DisableJarJsps => ("disable_jar_jsps", None, Boolean),
    Server => ("server", Some("s"), String),
    DockerBuild => ("docker-build", None, String),
    ImageUrl => ("image-url", None, String),
    Remote => ("remote", None, Boolean),
    Bucket => ("bucket", None, String),
    Promote => ("promote", None, Boolean),
    Port => ("port", None, Integer),
    AdminPort => ("admin_port", None, Integer),
    Host => ("host", None, String),
    Append => ("append", None, String),
    Days => ("days", None, Integer),
    Details => ("details", None, Boolean),
    EndDate => ("end_date", None, String),
    Severity => ("severity", None, String),
    Vhost => ("vhost", None, String),
    Instance => ("instance", None, String),
    Google => ("google", None, Boolean),
    OwnedBySelf => ("self", None, Boolean),
    AdminHost => ("admin_host", None, String),
    AuthDomain => ("auth_domain", None, String),
    StoragePath => ("storage_path", None, String),
    LogLevel => ("log_level", None, String),
    MaxModuleInstances => ("max_module_instances", None, Integer),
    UseMtimeFileWatcher => ("use_mtime_file_watcher", None, Boolean),
    ThreadsafeOverride => ("threadsafe_override", None, String),
    PythonStartupScript => ("python_startup_script", None, String),
    PythonStartupArgs => ("python_startup_args", None, String),
    JvmFlag => ("jvm_flag", None, String),
    CustomEntrypoint => ("custom_entrypoint", None, String),
    AllowSkippedFiles => ("allow_skipped_files", None, String),
    ApiPort => ("api_port", None, Integer),
    AutomaticRestart => ("automatic_restart", None, Boolean),
    DevAppserverLogLevel => ("dev_appserver_log_level", None, String),
    SkipSdkUpdateCheck => ("skip_sdk_update_check", None, String),
    DefaultGcsBucketName => ("default_gcs_bucket_name", None, String),
    Config => ("config", None, String),
    Custom => ("custom", None, Boolean),
    Version => ("version", Some("v"), String),
    Project => ("project", None, String),
    StopPreviousVersion => ("stop-previous-version", None, Boolean),
}

impl Flag {
    /// Bare flag name without the `--` prefix, e.g. `server`.
    pub const fn name(self) -> &'static str {
        self.spec().name
    }

    pub const fn kind(self) -> FlagKind {
        self.spec().kind
    }

    /// `--server`
    pub fn long_form(self) -> String {
        format!("{LONG_FORM_PREFIX}{}", self.name())
    }

    /// `-s`, if the flag has a short form.
    pub fn short_form(self) -> Option<String> {
        self.spec()
            .short
            .map(|short| format!("{SHORT_FORM_PREFIX}{short}"))
    }

    /// Look a flag up by its bare name, its long form or its short form.
    pub fn lookup(raw: &str) -> Option<Flag> {
        let raw = raw.trim();
        if let Some(name) = raw.strip_prefix(LONG_FORM_PREFIX) {
            return Flag::ALL.iter().copied().find(|flag| flag.name() == name);
        }
        if let Some(short) = raw.strip_prefix(SHORT_FORM_PREFIX) {
            return Flag::ALL
                .iter()
                .copied()
                .find(|flag| flag.spec().short == Some(short));
        }
        Flag::ALL.iter().copied().find(|flag| flag.name() == raw)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LONG_FORM_PREFIX}{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn long_forms_are_unique() {
        let names: HashSet<_> = Flag::ALL.iter().map(|flag| flag.name()).collect();
        assert_eq!(names.len(), Flag::ALL.len());
    }

    #[test]
    fn short_forms_are_unique() {
        let shorts: Vec<_> = Flag::ALL.iter().filter_map(|flag| flag.spec().short).collect();
        let unique: HashSet<_> = shorts.iter().collect();
        assert_eq!(unique.len(), shorts.len());
    }

    #[test]
    fn forms_carry_prefixes() {
        assert_eq!(Flag::Server.long_form(), "--server");
        assert_eq!(Flag::Server.short_form().as_deref(), Some("-s"));
        assert_eq!(Flag::Bucket.short_form(), None);
        assert_eq!(Flag::AdminHost.to_string(), "--admin_host");
    }

    #[test]
    fn lookup_accepts_every_spelling() {
        assert_eq!(Flag::lookup("server"), Some(Flag::Server));
        assert_eq!(Flag::lookup("--server"), Some(Flag::Server));
        assert_eq!(Flag::lookup("-s"), Some(Flag::Server));
        assert_eq!(Flag::lookup("--docker-build"), Some(Flag::DockerBuild));
        assert_eq!(Flag::lookup("--nope"), None);
    }

    #[test]
    fn all_is_in_declaration_order() {
        let mut sorted = Flag::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Flag::ALL);
    }
}
