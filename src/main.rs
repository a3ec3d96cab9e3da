//! toolrack: run Cloud SDK actions from the command line.
//!
//! This is the entry point of the binary. It parses command-line arguments,
//! loads `toolrack.toml`, builds the SDK facade and executes one action.

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::{error, info, warn};

use toolrack::config::{self, GenRepoInfoConfig, Settings};
use toolrack::{
    Action, CloudSdk, DeleteModulesAction, DeployAction, FlagMap, GenConfigAction,
    GenRepoInfoFileAction, GetLogsAction, ListModulesAction, ManagedBy, RunAction, RunMode,
    SetDefaultAction, SetManagedByAction, StageAction, StartModulesAction, StopModulesAction,
};

use crate::logging::LogLevel;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "toolrack",
    version,
    about = "Drive gcloud, dev_appserver and AppCfg from typed actions",
    styles = help_styles(),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to toolrack.toml configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ignore any toolrack.toml in the current directory.
    #[arg(long, global = true)]
    no_config: bool,
    /// Root of the Cloud SDK installation.
    #[arg(long, global = true)]
    sdk_path: Option<PathBuf>,
    /// gcloud output format (json, yaml, ...).
    #[arg(long, global = true)]
    format: Option<String>,
    /// Credential file passed as --credential-file-override.
    #[arg(long, global = true)]
    credential_file: Option<PathBuf>,
    /// Value for CLOUDSDK_METRICS_ENVIRONMENT.
    #[arg(long, global = true)]
    metrics_environment: Option<String>,
    /// Value for CLOUDSDK_METRICS_ENVIRONMENT_VERSION.
    #[arg(long, global = true)]
    metrics_environment_version: Option<String>,
    /// Launch without blocking; Ctrl-C stops the process.
    #[arg(long = "async", global = true)]
    run_async: bool,
    /// Capture tool output and print it when the tool finishes.
    #[arg(long, global = true)]
    capture: bool,
    /// Seconds an async dev server run waits for the "now running" line.
    #[arg(long, global = true)]
    wait_secs: Option<u64>,
    /// Log level (overrides TOOLRACK_LOG).
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,
}

/// Repeated `-F name=value` (or bare `-F name` for boolean flags).
#[derive(Debug, Args)]
struct FlagArgs {
    #[arg(short = 'F', long = "flag", value_name = "NAME[=VALUE]")]
    flags: Vec<String>,
}

impl FlagArgs {
    fn parse(&self) -> Result<FlagMap> {
        FlagMap::parse(&self.flags).context("invalid -F flag")
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy a staged application (or the [deploy] section of toolrack.toml).
    Deploy {
        staged_dir: Option<PathBuf>,
        #[command(flatten)]
        flags: FlagArgs,
    },
    /// Run the local development server (or the [dev_server] section).
    Run {
        app_yaml: Option<String>,
        #[command(flatten)]
        flags: FlagArgs,
    },
    /// Generate configuration files for a source directory.
    GenConfig {
        source_dir: Option<String>,
        #[command(flatten)]
        flags: FlagArgs,
    },
    /// Stage an application with AppCfg.
    Stage {
        source_dir: PathBuf,
        staging_dir: PathBuf,
        #[command(flatten)]
        flags: FlagArgs,
    },
    /// Manage deployed modules.
    #[command(subcommand)]
    Modules(ModulesCommand),
    /// Generate a source context file for the debugger.
    GenRepoInfo {
        #[arg(long)]
        output_directory: Option<PathBuf>,
        #[arg(long)]
        source_directory: Option<PathBuf>,
    },
    /// List installed SDK components, or check one by id.
    Components { id: Option<String> },
}

#[derive(Debug, Subcommand)]
enum ModulesCommand {
    List {
        modules: Vec<String>,
        #[command(flatten)]
        flags: FlagArgs,
    },
    Start(VersionedModules),
    Stop(VersionedModules),
    Delete(VersionedModules),
    SetDefault(VersionedModules),
    GetLogs {
        #[command(flatten)]
        target: VersionedModules,
        /// Write the logs to this file instead of stdout.
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    #[command(group(ArgGroup::new("owner").required(true).args(["google", "self_managed"])))]
    SetManagedBy {
        #[command(flatten)]
        target: VersionedModules,
        #[arg(long)]
        google: bool,
        #[arg(long = "self")]
        self_managed: bool,
    },
}

#[derive(Debug, Args)]
struct VersionedModules {
    modules: Vec<String>,
    #[arg(long)]
    version: String,
    #[command(flatten)]
    flags: FlagArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level)?;

    match dispatch(cli).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let exit_code = err
                .downcast_ref::<toolrack::Error>()
                .and_then(toolrack::Error::exit_code);
            match exit_code {
                Some(code) => {
                    error!("{err:#}");
                    std::process::exit(code);
                }
                None => Err(err),
            }
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    let sdk = build_sdk(&cli, &settings)?;

    match cli.command {
        Commands::Deploy { staged_dir, flags } => {
            let action = match staged_dir {
                Some(dir) => DeployAction::new(dir, flags.parse()?)?,
                None => {
                    let config = settings
                        .deploy
                        .clone()
                        .ok_or_else(|| anyhow!("no staged directory and no [deploy] section"))?;
                    DeployAction::from_config(config)?
                }
            };
            launch(&sdk, action).await
        }
        Commands::Run { app_yaml, flags } => {
            let action = match app_yaml {
                Some(app_yaml) => RunAction::new(app_yaml, flags.parse()?)?,
                None => {
                    let config = settings
                        .dev_server
                        .clone()
                        .ok_or_else(|| anyhow!("no app.yaml and no [dev_server] section"))?;
                    RunAction::from_config(config)?
                }
            };
            launch(&sdk, action).await
        }
        Commands::GenConfig { source_dir, flags } => {
            launch(&sdk, GenConfigAction::new(source_dir, flags.parse()?)?).await
        }
        Commands::Stage {
            source_dir,
            staging_dir,
            flags,
        } => launch(&sdk, StageAction::new(source_dir, staging_dir, flags.parse()?)?).await,
        Commands::Modules(command) => dispatch_modules(&sdk, command).await,
        Commands::GenRepoInfo {
            output_directory,
            source_directory,
        } => {
            let config = GenRepoInfoConfig {
                output_directory,
                source_directory,
            };
            launch(&sdk, GenRepoInfoFileAction::new(config)).await
        }
        Commands::Components { id } => match id {
            Some(id) => {
                let installed = sdk
                    .is_component_installed(&id)
                    .await
                    .context("failed to list SDK components")?;
                println!("{id}: {}", if installed { "installed" } else { "not installed" });
                Ok(())
            }
            None => {
                let components = sdk
                    .components()
                    .await
                    .context("failed to list SDK components")?;
                for component in components {
                    let state = component
                        .state
                        .as_ref()
                        .map(|state| state.name.as_str())
                        .unwrap_or("unknown");
                    println!("{}\t{}", component.id, state);
                }
                Ok(())
            }
        },
    }
}

async fn dispatch_modules(sdk: &CloudSdk, command: ModulesCommand) -> Result<()> {
    match command {
        ModulesCommand::List { modules, flags } => {
            launch(sdk, ListModulesAction::new(modules, flags.parse()?)?).await
        }
        ModulesCommand::Start(target) => {
            let flags = target.flags.parse()?;
            launch(sdk, StartModulesAction::new(target.modules, target.version, flags)?).await
        }
        ModulesCommand::Stop(target) => {
            let flags = target.flags.parse()?;
            launch(sdk, StopModulesAction::new(target.modules, target.version, flags)?).await
        }
        ModulesCommand::Delete(target) => {
            let flags = target.flags.parse()?;
            launch(sdk, DeleteModulesAction::new(target.modules, target.version, flags)?).await
        }
        ModulesCommand::SetDefault(target) => {
            let flags = target.flags.parse()?;
            launch(sdk, SetDefaultAction::new(target.modules, target.version, flags)?).await
        }
        ModulesCommand::GetLogs { target, log_file } => {
            let flags = target.flags.parse()?;
            let action = GetLogsAction::new(target.modules, target.version, log_file, flags)?;
            launch(sdk, action).await
        }
        ModulesCommand::SetManagedBy {
            target,
            google,
            self_managed: _,
        } => {
            let managed_by = if google {
                ManagedBy::Google
            } else {
                ManagedBy::OwnedBySelf
            };
            let flags = target.flags.parse()?;
            let action = SetManagedByAction::new(target.modules, target.version, managed_by, flags)?;
            launch(sdk, action).await
        }
    }
}

async fn launch<A: Action>(sdk: &CloudSdk, action: A) -> Result<()> {
    let future = sdk
        .execute(action)
        .await
        .with_context(|| format!("{} failed", A::NAME))?;

    if sdk.mode() == RunMode::Sync {
        print_output(&future.output());
        return Ok(());
    }

    info!(pid = ?future.pid(), "{} running, Ctrl-C to stop", A::NAME);
    tokio::select! {
        result = future.get() => {
            let output = result.with_context(|| format!("{} failed", A::NAME))?;
            print_output(&output);
        }
        _ = shutdown_signal() => {
            warn!("stopping {}", A::NAME);
            future.cancel(true);
        }
    }
    Ok(())
}

fn print_output(output: &str) {
    if !output.is_empty() {
        println!("{output}");
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    if cli.no_config {
        return Ok(Settings::default());
    }
    let path = cli.config.clone().or_else(config::default_config_path);
    match path {
        Some(path) => config::load_config(&path)
            .with_context(|| format!("failed to load config file {}", path.display())),
        None => Ok(Settings::default()),
    }
}

fn build_sdk(cli: &Cli, settings: &Settings) -> Result<CloudSdk> {
    let sdk_path = cli
        .sdk_path
        .clone()
        .or_else(|| settings.sdk_path.clone())
        .ok_or_else(|| anyhow!("no Cloud SDK path (use --sdk-path or sdk_path in toolrack.toml)"))?;

    let mode = if cli.run_async || settings.run_async.unwrap_or(false) {
        RunMode::Async
    } else {
        RunMode::Sync
    };
    let inherit_output = !cli.capture && settings.inherit_output.unwrap_or(true);

    let mut builder = CloudSdk::builder(sdk_path)
        .mode(mode)
        .inherit_output(inherit_output)
        .env(settings.env.clone());
    if let Some(format) = cli.format.clone().or_else(|| settings.output_format.clone()) {
        builder = builder.output_format(format);
    }
    if let Some(file) = cli
        .credential_file
        .clone()
        .or_else(|| settings.credential_file.clone())
    {
        builder = builder.credential_file(file);
    }
    if let Some(environment) = cli
        .metrics_environment
        .clone()
        .or_else(|| settings.metrics_environment.clone())
    {
        builder = builder.metrics_environment(environment);
    }
    if let Some(version) = cli
        .metrics_environment_version
        .clone()
        .or_else(|| settings.metrics_environment_version.clone())
    {
        builder = builder.metrics_environment_version(version);
    }
    let wait = cli
        .wait_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .or_else(|| settings.dev_server_wait());
    if let Some(wait) = wait {
        builder = builder.dev_server_wait(wait);
    }
    Ok(builder.build()?)
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_flags() {
        let cli = Cli::parse_from([
            "toolrack",
            "--sdk-path",
            "/sdk",
            "deploy",
            "build/staged",
            "-F",
            "version=v1",
            "-F",
            "promote",
        ]);
        match cli.command {
            Commands::Deploy { staged_dir, flags } => {
                assert_eq!(staged_dir, Some(PathBuf::from("build/staged")));
                let flags = flags.parse().unwrap();
                assert_eq!(flags.get(toolrack::Flag::Version), Some("v1"));
                assert_eq!(flags.get(toolrack::Flag::Promote), Some(""));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn set_managed_by_requires_an_owner() {
        let parsed = Cli::try_parse_from([
            "toolrack", "modules", "set-managed-by", "api", "--version", "v1",
        ]);
        assert!(parsed.is_err());
        let cli = Cli::parse_from([
            "toolrack", "modules", "set-managed-by", "api", "--version", "v1", "--self",
        ]);
        assert!(matches!(
            cli.command,
            Commands::Modules(ModulesCommand::SetManagedBy { google: false, .. })
        ));
    }

    #[test]
    fn cli_values_override_settings() {
        let settings: Settings = toml::from_str(
            r#"
sdk_path = "/from/file"
async = true
"#,
        )
        .unwrap();
        let cli = Cli::parse_from(["toolrack", "--sdk-path", "/from/cli", "modules", "list"]);
        let sdk = build_sdk(&cli, &settings).unwrap();
        assert_eq!(sdk.sdk_path(), std::path::Path::new("/from/cli"));
        assert_eq!(sdk.mode(), RunMode::Async);
    }

    #[test]
    fn missing_sdk_path_is_an_error() {
        let cli = Cli::parse_from(["toolrack", "components"]);
        assert!(build_sdk(&cli, &Settings::default()).is_err());
    }
}
