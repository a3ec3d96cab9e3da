use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::actions::{check_flags, require, Action};
use crate::args;
use crate::command::{ensure_directory, ensure_exists, Invocation};
use crate::config::{DeployConfig, DevServerConfig, GenRepoInfoConfig};
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::flags::FlagMap;
use crate::sdk::CloudSdk;

#[derive(Debug, Clone)]
enum DeployTarget {
    Staged(PathBuf),
    Deployables(DeployConfig),
}

/// `gcloud app deploy`.
#[derive(Debug, Clone)]
pub struct DeployAction {
    target: DeployTarget,
    flags: FlagMap,
}

impl DeployAction {
    /// Deploy `<staged_dir>/app.yaml`, running from inside the staged
    /// directory.
    pub fn new(staged_dir: impl Into<PathBuf>, flags: FlagMap) -> Result<Self> {
        check_flags::<Self>(&flags)?;
        Ok(Self {
            target: DeployTarget::Staged(staged_dir.into()),
            flags,
        })
    }

    /// Deploy an explicit list of deployables.
    pub fn from_config(config: DeployConfig) -> Result<Self> {
        if config.deployables.is_empty() {
            return Err(Error::InvalidConfiguration(
                "at least one deployable is required".to_string(),
            ));
        }
        Ok(Self {
            target: DeployTarget::Deployables(config),
            flags: FlagMap::new(),
        })
    }
}

impl Action for DeployAction {
    const NAME: &'static str = "deploy";

    fn accepted_flags() -> &'static [Flag] {
        &[
            Flag::Bucket,
            Flag::DockerBuild,
            Flag::Force,
            Flag::ImageUrl,
            Flag::Promote,
            Flag::Server,
            Flag::Version,
        ]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        match self.target {
            DeployTarget::Staged(dir) => {
                ensure_directory(&dir)?;
                let mut arguments = vec![
                    "deploy".to_string(),
                    dir.join("app.yaml").to_string_lossy().into_owned(),
                ];
                arguments.extend(self.flags.to_args());
                Ok(sdk.app_invocation(arguments)?.working_dir(dir))
            }
            DeployTarget::Deployables(config) => {
                let mut arguments = vec!["deploy".to_string()];
                for deployable in &config.deployables {
                    ensure_exists(deployable, "deployable")?;
                    arguments.push(deployable.to_string_lossy().into_owned());
                }
                arguments.extend(args::string("bucket", config.bucket.as_deref()));
                arguments.extend(args::string("docker-build", config.docker_build.as_deref()));
                arguments.extend(args::bool_with_no("force", config.force));
                arguments.extend(args::string("image-url", config.image_url.as_deref()));
                arguments.extend(args::string("project", config.project.as_deref()));
                arguments.extend(args::bool_with_no("promote", config.promote));
                arguments.extend(args::string("server", config.server.as_deref()));
                arguments.extend(args::bool_with_no(
                    "stop-previous-version",
                    config.stop_previous_version,
                ));
                arguments.extend(args::string("version", config.version.as_deref()));
                sdk.app_invocation(arguments)
            }
        }
    }
}

#[derive(Debug, Clone)]
enum DevServerSource {
    Flags { app_yaml: String, flags: FlagMap },
    Config(DevServerConfig),
}

/// Local development server (`dev_appserver.py`).
///
/// Whether the run blocks is decided by the [`CloudSdk`]'s run mode.
#[derive(Debug, Clone)]
pub struct RunAction {
    source: DevServerSource,
}

impl RunAction {
    pub fn new(app_yaml: impl Into<String>, flags: FlagMap) -> Result<Self> {
        let app_yaml = app_yaml.into();
        require(&app_yaml, "app.yaml location")?;
        check_flags::<Self>(&flags)?;
        Ok(Self {
            source: DevServerSource::Flags { app_yaml, flags },
        })
    }

    pub fn from_config(config: DevServerConfig) -> Result<Self> {
        if config.app_yamls.is_empty() {
            return Err(Error::InvalidConfiguration(
                "at least one app.yaml is required".to_string(),
            ));
        }
        Ok(Self {
            source: DevServerSource::Config(config),
        })
    }
}

impl Action for RunAction {
    const NAME: &'static str = "run";

    fn accepted_flags() -> &'static [Flag] {
        &[
            Flag::Host,
            Flag::Port,
            Flag::AdminHost,
            Flag::AdminPort,
            Flag::AuthDomain,
            Flag::StoragePath,
            Flag::LogLevel,
            Flag::MaxModuleInstances,
            Flag::UseMtimeFileWatcher,
            Flag::ThreadsafeOverride,
            Flag::PythonStartupScript,
            Flag::PythonStartupArgs,
            Flag::JvmFlag,
            Flag::CustomEntrypoint,
            Flag::Runtime,
            Flag::AllowSkippedFiles,
            Flag::ApiPort,
            Flag::AutomaticRestart,
            Flag::DevAppserverLogLevel,
            Flag::SkipSdkUpdateCheck,
            Flag::DefaultGcsBucketName,
        ]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        match self.source {
            DevServerSource::Flags { app_yaml, flags } => {
                let mut arguments = vec![app_yaml];
                arguments.extend(flags.to_args());
                sdk.dev_appserver_invocation(arguments, &HashMap::new())
            }
            DevServerSource::Config(config) => {
                let mut env = HashMap::new();
                if let Some(java_home) = config.java_home_dir.as_deref().filter(|s| !s.is_empty()) {
                    env.insert("JAVA_HOME".to_string(), java_home.to_string());
                }
                sdk.dev_appserver_invocation(dev_server_args(&config), &env)
            }
        }
    }
}

fn dev_server_args(config: &DevServerConfig) -> Vec<String> {
    let mut arguments: Vec<String> = config
        .app_yamls
        .iter()
        .map(|app_yaml| app_yaml.to_string_lossy().into_owned())
        .collect();
    arguments.extend(args::string("host", config.host.as_deref()));
    arguments.extend(args::integer("port", config.port));
    arguments.extend(args::string("admin_host", config.admin_host.as_deref()));
    arguments.extend(args::integer("admin_port", config.admin_port));
    arguments.extend(args::string("auth_domain", config.auth_domain.as_deref()));
    arguments.extend(args::string("storage_path", config.storage_path.as_deref()));
    arguments.extend(args::string("log_level", config.log_level.as_deref()));
    arguments.extend(args::integer(
        "max_module_instances",
        config.max_module_instances,
    ));
    arguments.extend(args::bool(
        "use_mtime_file_watcher",
        config.use_mtime_file_watcher,
    ));
    arguments.extend(args::string(
        "threadsafe_override",
        config.threadsafe_override.as_deref(),
    ));
    arguments.extend(args::string(
        "python_startup_script",
        config.python_startup_script.as_deref(),
    ));
    arguments.extend(args::string(
        "python_startup_args",
        config.python_startup_args.as_deref(),
    ));
    arguments.extend(args::repeated("jvm_flag", &config.jvm_flags));
    arguments.extend(args::string(
        "custom_entrypoint",
        config.custom_entrypoint.as_deref(),
    ));
    arguments.extend(args::string("runtime", config.runtime.as_deref()));
    arguments.extend(args::bool("allow_skipped_files", config.allow_skipped_files));
    arguments.extend(args::integer("api_port", config.api_port));
    arguments.extend(args::bool("automatic_restart", config.automatic_restart));
    arguments.extend(args::string(
        "dev_appserver_log_level",
        config.dev_appserver_log_level.as_deref(),
    ));
    arguments.extend(args::bool(
        "skip_sdk_update_check",
        config.skip_sdk_update_check,
    ));
    arguments.extend(args::string(
        "default_gcs_bucket_name",
        config.default_gcs_bucket_name.as_deref(),
    ));
    arguments
}

/// `gcloud app gen-config [source_dir]`.
#[derive(Debug, Clone)]
pub struct GenConfigAction {
    source_dir: Option<String>,
    flags: FlagMap,
}

impl GenConfigAction {
    pub fn new(source_dir: Option<String>, flags: FlagMap) -> Result<Self> {
        check_flags::<Self>(&flags)?;
        Ok(Self { source_dir, flags })
    }
}

impl Action for GenConfigAction {
    const NAME: &'static str = "gen-config";

    fn accepted_flags() -> &'static [Flag] {
        &[Flag::Config, Flag::Custom, Flag::Runtime]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        let mut arguments = vec!["gen-config".to_string()];
        arguments.extend(self.source_dir.filter(|dir| !dir.is_empty()));
        arguments.extend(self.flags.to_args());
        sdk.app_invocation(arguments)
    }
}

/// AppCfg `stage <source> <staging>`.
#[derive(Debug, Clone)]
pub struct StageAction {
    source_dir: PathBuf,
    staging_dir: PathBuf,
    flags: FlagMap,
}

impl StageAction {
    /// The source directory must already exist.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        flags: FlagMap,
    ) -> Result<Self> {
        check_flags::<Self>(&flags)?;
        let source_dir = source_dir.into();
        ensure_directory(&source_dir)?;
        Ok(Self {
            source_dir,
            staging_dir: staging_dir.into(),
            flags,
        })
    }
}

impl Action for StageAction {
    const NAME: &'static str = "stage";

    fn accepted_flags() -> &'static [Flag] {
        &[
            Flag::EnableQuickstart,
            Flag::DisableUpdateCheck,
            Flag::Version,
            Flag::Project,
            Flag::EnableJarSplitting,
            Flag::JarSplittingExcludes,
            Flag::RetainUploadDir,
            Flag::CompileEncoding,
            Flag::Force,
            Flag::DeleteJsps,
            Flag::EnableJarClasses,
            Flag::Runtime,
        ]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        let mut arguments = vec![
            "stage".to_string(),
            absolute(&self.source_dir)?,
            absolute(&self.staging_dir)?,
        ];
        arguments.extend(self.flags.to_args());
        sdk.appcfg_invocation(arguments)
    }
}

fn absolute(path: &Path) -> Result<String> {
    Ok(std::path::absolute(path)?.to_string_lossy().into_owned())
}

/// `gcloud beta debug source gen-repo-info-file`.
#[derive(Debug, Clone, Default)]
pub struct GenRepoInfoFileAction {
    config: GenRepoInfoConfig,
}

impl GenRepoInfoFileAction {
    pub fn new(config: GenRepoInfoConfig) -> Self {
        Self { config }
    }
}

impl Action for GenRepoInfoFileAction {
    const NAME: &'static str = "gen-repo-info-file";

    fn accepted_flags() -> &'static [Flag] {
        &[]
    }

    fn invocation(self, sdk: &CloudSdk) -> Result<Invocation> {
        let mut arguments = vec!["gen-repo-info-file".to_string()];
        arguments.extend(args::path(
            "output-directory",
            self.config.output_directory.as_deref(),
        ));
        arguments.extend(args::path(
            "source-directory",
            self.config.source_directory.as_deref(),
        ));
        sdk.source_invocation(arguments)
    }
}
