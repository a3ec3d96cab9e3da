//! Configuration for toolrack.
//!
//! This module defines the structure of the `toolrack.toml` settings file and
//! the typed configurations accepted by the deploy, dev server and repo-info
//! actions. All of them deserialize with serde, so they can be written in the
//! settings file or built in code.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Top-level structure of `toolrack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Root of the Cloud SDK installation.
    pub sdk_path: Option<PathBuf>,
    /// Value for `CLOUDSDK_METRICS_ENVIRONMENT`.
    pub metrics_environment: Option<String>,
    /// Value for `CLOUDSDK_METRICS_ENVIRONMENT_VERSION`.
    pub metrics_environment_version: Option<String>,
    /// Credential file passed as `--credential-file-override`.
    pub credential_file: Option<PathBuf>,
    /// gcloud `--format` (json, yaml, ...).
    pub output_format: Option<String>,
    /// Launch commands without waiting for them (default: false).
    #[serde(rename = "async")]
    pub run_async: Option<bool>,
    /// Let child processes write straight to the terminal (default: true).
    pub inherit_output: Option<bool>,
    /// How long an async dev server run waits for the "now running" line.
    pub dev_server_wait_secs: Option<u64>,
    /// Extra environment variables for every invocation.
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub deploy: Option<DeployConfig>,
    pub dev_server: Option<DevServerConfig>,
}

impl Settings {
    pub fn dev_server_wait(&self) -> Option<Duration> {
        self.dev_server_wait_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// `gcloud app deploy` of explicit deployables (app.yaml, cron.yaml, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeployConfig {
    pub deployables: Vec<PathBuf>,
    pub bucket: Option<String>,
    pub docker_build: Option<String>,
    pub force: Option<bool>,
    pub image_url: Option<String>,
    pub project: Option<String>,
    pub promote: Option<bool>,
    pub server: Option<String>,
    pub stop_previous_version: Option<bool>,
    pub version: Option<String>,
}

/// Local development server run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DevServerConfig {
    pub app_yamls: Vec<PathBuf>,
    pub host: Option<String>,
    pub port: Option<i32>,
    pub admin_host: Option<String>,
    pub admin_port: Option<i32>,
    pub auth_domain: Option<String>,
    pub storage_path: Option<String>,
    pub log_level: Option<String>,
    pub max_module_instances: Option<i32>,
    pub use_mtime_file_watcher: Option<bool>,
    pub threadsafe_override: Option<String>,
    pub python_startup_script: Option<String>,
    pub python_startup_args: Option<String>,
    #[serde(default)]
    pub jvm_flags: Vec<String>,
    pub custom_entrypoint: Option<String>,
    pub runtime: Option<String>,
    pub allow_skipped_files: Option<bool>,
    pub api_port: Option<i32>,
    pub automatic_restart: Option<bool>,
    pub dev_appserver_log_level: Option<String>,
    pub skip_sdk_update_check: Option<bool>,
    pub default_gcs_bucket_name: Option<String>,
    /// Exported as `JAVA_HOME` for the server process.
    pub java_home_dir: Option<String>,
}

/// `gcloud beta debug source gen-repo-info-file`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenRepoInfoConfig {
    pub output_directory: Option<PathBuf>,
    pub source_directory: Option<PathBuf>,
}

/// Loads and parses the settings from a file path.
pub fn load_config(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&raw)?;
    Ok(settings)
}

/// `toolrack.toml` in the current directory, if there is one.
pub fn default_config_path() -> Option<PathBuf> {
    let path = Path::new("toolrack.toml");
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}
