//! Cloud SDK facade.
//!
//! [`CloudSdk`] owns the injected SDK root and knows how each of the three
//! wrapped tools is invoked: `gcloud`, `dev_appserver.py` and the AppCfg
//! packaging tool. Actions produce an [`Invocation`] through it and
//! [`CloudSdk::execute`] launches that invocation on a fresh
//! [`ProcessRunner`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::actions::Action;
use crate::args;
use crate::command::{Command, Invocation, Tool};
use crate::error::{Error, Result};
use crate::future::ProcessFuture;
use crate::listeners::{ListenerSet, WaitingLineListener};
use crate::runner::{run_captured, ProcessRunner, RunMode};

const GCLOUD: &str = "bin/gcloud";
const DEV_APPSERVER_PY: &str = "bin/dev_appserver.py";
const JAVA_APPENGINE_SDK_PATH: &str = "platform/google_appengine/google/appengine/tools/java/lib";
const JAVA_TOOLS_JAR: &str = "appengine-tools-api.jar";
const WINDOWS_BUNDLED_PYTHON: &str = "platform/bundledpython/python.exe";
const APPCFG_MAIN_CLASS: &str = "com.google.appengine.tools.admin.AppCfg";

/// Handle on one Cloud SDK installation.
#[derive(Debug, Clone)]
pub struct CloudSdk {
    sdk_path: PathBuf,
    metrics_environment: Option<String>,
    metrics_environment_version: Option<String>,
    credential_file: Option<PathBuf>,
    output_format: Option<String>,
    mode: RunMode,
    listeners: ListenerSet,
    inherit_output: bool,
    dev_server_wait: Option<Duration>,
    env: HashMap<String, String>,
}

#[derive(Debug)]
pub struct CloudSdkBuilder {
    sdk: CloudSdk,
    inherit_output: Option<bool>,
}

impl CloudSdkBuilder {
    pub fn metrics_environment(mut self, environment: impl Into<String>) -> Self {
        self.sdk.metrics_environment = Some(environment.into());
        self
    }

    pub fn metrics_environment_version(mut self, version: impl Into<String>) -> Self {
        self.sdk.metrics_environment_version = Some(version.into());
        self
    }

    /// Passed to gcloud as `--credential-file-override`.
    pub fn credential_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sdk.credential_file = Some(path.into());
        self
    }

    /// gcloud `--format`: csv, default, flattened, json, list, multi, none,
    /// table, text, value or yaml.
    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.sdk.output_format = Some(format.into());
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.sdk.mode = mode;
        self
    }

    pub fn listeners(mut self, listeners: ListenerSet) -> Self {
        self.sdk.listeners = listeners;
        self
    }

    /// Let child processes write to this process's stdout and stderr.
    /// Cannot be combined with output listeners. When left unset, output is
    /// inherited only if no output listener is registered.
    pub fn inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = Some(inherit);
        self
    }

    /// Make asynchronous dev server runs wait until the server reports that
    /// it is running. The server's output is piped while waiting.
    pub fn dev_server_wait(mut self, timeout: Duration) -> Self {
        self.sdk.dev_server_wait = Some(timeout);
        self
    }

    /// Extra environment for every invocation.
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.sdk.env = env;
        self
    }

    pub fn build(mut self) -> Result<CloudSdk> {
        let listening = self.sdk.listeners.has_output_listeners();
        self.sdk.inherit_output = match self.inherit_output {
            Some(true) if listening => {
                return Err(Error::InvalidConfiguration(
                    "output cannot be both inherited and sent to listeners".to_string(),
                ));
            }
            Some(inherit) => inherit,
            None => !listening,
        };
        Ok(self.sdk)
    }
}

/// One record of `gcloud components list --format=json`.
#[derive(Debug, Clone, Deserialize)]
pub struct SdkComponent {
    pub id: String,
    pub name: Option<String>,
    pub current_version_string: Option<String>,
    pub latest_version_string: Option<String>,
    #[serde(rename = "size")]
    pub size_in_bytes: Option<u64>,
    pub state: Option<ComponentState>,
    pub is_configuration: Option<bool>,
    pub is_hidden: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentState {
    pub name: String,
}

impl SdkComponent {
    pub fn is_installed(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| state.name == "Installed")
    }
}

impl CloudSdk {
    pub fn builder(sdk_path: impl Into<PathBuf>) -> CloudSdkBuilder {
        CloudSdkBuilder {
            sdk: CloudSdk {
                sdk_path: sdk_path.into(),
                metrics_environment: None,
                metrics_environment_version: None,
                credential_file: None,
                output_format: None,
                mode: RunMode::Sync,
                listeners: ListenerSet::new(),
                inherit_output: true,
                dev_server_wait: None,
                env: HashMap::new(),
            },
            inherit_output: None,
        }
    }

    pub fn sdk_path(&self) -> &Path {
        &self.sdk_path
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Whether child processes write straight to this process's streams.
    pub fn inherits_output(&self) -> bool {
        self.inherit_output
    }

    pub fn gcloud_path(&self) -> PathBuf {
        if cfg!(windows) {
            self.sdk_path.join(format!("{GCLOUD}.cmd"))
        } else {
            self.sdk_path.join(GCLOUD)
        }
    }

    pub fn dev_appserver_path(&self) -> PathBuf {
        self.sdk_path.join(DEV_APPSERVER_PY)
    }

    pub fn java_appengine_sdk_path(&self) -> PathBuf {
        self.sdk_path.join(JAVA_APPENGINE_SDK_PATH)
    }

    /// Location of a jar shipped with the App Engine Java component.
    pub fn jar_path(&self, jar_name: &str) -> Option<PathBuf> {
        match jar_name {
            "servlet-api.jar" | "jsp-api.jar" => {
                Some(self.java_appengine_sdk_path().join("shared").join(jar_name))
            }
            JAVA_TOOLS_JAR => Some(self.java_appengine_sdk_path().join(JAVA_TOOLS_JAR)),
            _ => None,
        }
    }

    /// Check that the SDK root holds gcloud and dev_appserver.py.
    pub fn validate(&self) -> Result<()> {
        if !self.sdk_path.is_dir() {
            return Err(Error::SdkNotFound(format!(
                "SDK location '{}' is not a directory",
                self.sdk_path.display()
            )));
        }
        let gcloud = self.gcloud_path();
        if !gcloud.is_file() {
            return Err(Error::SdkNotFound(format!(
                "gcloud location '{}' is not a file",
                gcloud.display()
            )));
        }
        let dev_appserver = self.dev_appserver_path();
        if !dev_appserver.is_file() {
            return Err(Error::SdkNotFound(format!(
                "dev_appserver.py location '{}' is not a file",
                dev_appserver.display()
            )));
        }
        Ok(())
    }

    pub fn validate_app_engine_java_components(&self) -> Result<()> {
        if !self.java_appengine_sdk_path().is_dir() {
            return Err(Error::ComponentsNotInstalled(
                "Java App Engine components not installed. \
                 Fix by running 'gcloud components install app-engine-java'"
                    .to_string(),
            ));
        }
        let tools_jar = self.java_appengine_sdk_path().join(JAVA_TOOLS_JAR);
        if !tools_jar.is_file() {
            return Err(Error::ComponentsNotInstalled(format!(
                "Java tools jar location '{}' is not a file",
                tools_jar.display()
            )));
        }
        Ok(())
    }

    /// `gcloud app <args> --quiet [--format ..] [--credential-file-override ..]`.
    pub fn app_invocation(&self, args: Vec<String>) -> Result<Invocation> {
        self.gcloud_invocation(&["app"], args)
    }

    /// `gcloud beta debug source <args> ...`.
    pub fn source_invocation(&self, args: Vec<String>) -> Result<Invocation> {
        self.gcloud_invocation(&["beta", "debug", "source"], args)
    }

    fn gcloud_invocation(&self, group: &[&str], args: Vec<String>) -> Result<Invocation> {
        self.validate()?;

        let mut command = Command::builder(self.gcloud_path().to_string_lossy())
            .fixed(group.iter().copied())
            .args(args)
            .positional("--quiet")
            .args(args::string("format", self.output_format.as_deref()));

        let mut invocation_env = self.env.clone();
        if let Some(credential_file) = &self.credential_file {
            command = command.args(args::path(
                "credential-file-override",
                Some(credential_file.as_path()),
            ));
            invocation_env.insert("CLOUDSDK_APP_USE_GSUTIL".to_string(), "0".to_string());
        }
        if let Some(environment) = &self.metrics_environment {
            invocation_env.insert(
                "CLOUDSDK_METRICS_ENVIRONMENT".to_string(),
                environment.clone(),
            );
        }
        if let Some(version) = &self.metrics_environment_version {
            invocation_env.insert(
                "CLOUDSDK_METRICS_ENVIRONMENT_VERSION".to_string(),
                version.clone(),
            );
        }

        Ok(Invocation::new(Tool::Gcloud, command.build()).envs(&invocation_env))
    }

    /// `[python] dev_appserver.py <args>` with prompts disabled.
    pub fn dev_appserver_invocation(
        &self,
        args: Vec<String>,
        env: &HashMap<String, String>,
    ) -> Result<Invocation> {
        self.validate()?;

        let command = if cfg!(windows) {
            Command::builder(self.windows_python_path()?.to_string_lossy())
                .positional(self.dev_appserver_path().to_string_lossy())
        } else {
            Command::builder(self.dev_appserver_path().to_string_lossy())
        }
        .args(args)
        .build();

        // Quiet mode also auto-installs the app-engine-java component.
        Ok(Invocation::new(Tool::DevAppServer, command)
            .envs(&self.env)
            .envs(env)
            .env("CLOUDSDK_CORE_DISABLE_PROMPTS", "1"))
    }

    /// `java -Dappengine.sdk.root=.. -cp appengine-tools-api.jar AppCfg <args>`.
    pub fn appcfg_invocation(&self, args: Vec<String>) -> Result<Invocation> {
        self.validate_app_engine_java_components()?;

        let java = std::env::var_os("JAVA_HOME")
            .map(|home| PathBuf::from(home).join("bin").join("java"))
            .unwrap_or_else(|| PathBuf::from("java"));
        let command = Command::builder(java.to_string_lossy())
            .positional(format!(
                "-Dappengine.sdk.root={}",
                self.java_appengine_sdk_path().display()
            ))
            .positional("-cp")
            .positional(
                self.java_appengine_sdk_path()
                    .join(JAVA_TOOLS_JAR)
                    .to_string_lossy(),
            )
            .positional(APPCFG_MAIN_CLASS)
            .args(args)
            .build();

        Ok(Invocation::new(Tool::AppCfg, command).envs(&self.env))
    }

    // CLOUDSDK_PYTHON wins, then the bundled interpreter, then whatever
    // `python` resolves to.
    fn windows_python_path(&self) -> Result<PathBuf> {
        if let Some(python) = std::env::var_os("CLOUDSDK_PYTHON") {
            let python = PathBuf::from(python);
            if python.exists() {
                return Ok(python);
            }
            return Err(Error::InvalidConfiguration(format!(
                "python binary not found at CLOUDSDK_PYTHON location {}",
                python.display()
            )));
        }
        let bundled = self.sdk_path.join(WINDOWS_BUNDLED_PYTHON);
        if bundled.exists() {
            Ok(bundled)
        } else {
            Ok(PathBuf::from("python"))
        }
    }

    /// Launch an invocation on a fresh runner.
    pub async fn run(&self, invocation: Invocation) -> Result<ProcessFuture> {
        let mut listeners = self.listeners.clone();
        let waiter = match (invocation.tool, self.mode, self.dev_server_wait) {
            (Tool::DevAppServer, RunMode::Async, Some(timeout)) => {
                let waiter = Arc::new(WaitingLineListener::dev_server(timeout)?);
                listeners = listeners.waiter(waiter.clone());
                Some(waiter)
            }
            _ => None,
        };

        let runner = ProcessRunner::new(self.mode)
            .listeners(listeners)
            .capture_output(!self.inherit_output);
        let future = runner
            .run(
                &invocation.command,
                invocation.working_dir.as_deref(),
                &invocation.env,
            )
            .await?;

        if let Some(waiter) = waiter {
            // Nothing was spawned, so no exit will ever reach the waiter.
            if future.failed_to_launch() {
                return Ok(future);
            }
            if let Err(err) = waiter.wait().await {
                warn!(error = %err, "dev server did not become ready");
                future.cancel(true);
                return Err(err);
            }
            info!(pid = ?future.pid(), "dev server is running");
        }
        Ok(future)
    }

    /// Assemble and launch an action. The action is consumed.
    pub async fn execute<A: Action>(&self, action: A) -> Result<ProcessFuture> {
        let invocation = action.invocation(self)?;
        self.run(invocation).await
    }

    /// Every component reported by `gcloud components list`.
    pub async fn components(&self) -> Result<Vec<SdkComponent>> {
        self.validate()?;
        let command = Command::builder(self.gcloud_path().to_string_lossy())
            .fixed(["components", "list", "--format=json"])
            .build();
        let output = run_captured(&command, None, &self.env).await?;
        if !output.success() {
            return Err(Error::ProcessExecution {
                exit_code: output.exit_code,
            });
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }

    /// Whether the component with `id` (e.g. `app-engine-java`) is installed.
    pub async fn is_component_installed(&self, id: &str) -> Result<bool> {
        let components = self.components().await?;
        Ok(components
            .iter()
            .any(|component| component.id == id && component.is_installed()))
    }
}

/// An SDK root holding empty gcloud and dev_appserver.py files.
#[cfg(test)]
pub(crate) fn fake_sdk() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("bin")).unwrap();
    std::fs::write(dir.path().join(GCLOUD), "").unwrap();
    std::fs::write(dir.path().join(format!("{GCLOUD}.cmd")), "").unwrap();
    std::fs::write(dir.path().join(DEV_APPSERVER_PY), "").unwrap();
    dir
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::listeners::CollectingLineListener;

    #[test]
    fn inherit_and_listeners_conflict() {
        let err = CloudSdk::builder("/sdk")
            .inherit_output(true)
            .listeners(ListenerSet::new().stdout(Arc::new(CollectingLineListener::new())))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn registering_output_listeners_captures_output() {
        let sdk = CloudSdk::builder("/sdk")
            .listeners(ListenerSet::new().stdout(Arc::new(CollectingLineListener::new())))
            .build()
            .unwrap();
        assert!(!sdk.inherits_output());

        let sdk = CloudSdk::builder("/sdk").build().unwrap();
        assert!(sdk.inherits_output());

        let exits_only = ListenerSet::new().exit(Arc::new(|_code: i32| {}));
        let sdk = CloudSdk::builder("/sdk").listeners(exits_only).build().unwrap();
        assert!(sdk.inherits_output());
    }

    #[test]
    fn missing_sdk_is_reported() {
        let sdk = CloudSdk::builder("/definitely/not/an/sdk").build().unwrap();
        assert!(matches!(sdk.validate(), Err(Error::SdkNotFound(_))));

        let dir = tempfile::tempdir().unwrap();
        let sdk = CloudSdk::builder(dir.path()).build().unwrap();
        match sdk.validate() {
            Err(Error::SdkNotFound(message)) => assert!(message.contains("gcloud")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn java_components_are_checked() {
        let dir = fake_sdk();
        let sdk = CloudSdk::builder(dir.path()).build().unwrap();
        assert!(matches!(
            sdk.validate_app_engine_java_components(),
            Err(Error::ComponentsNotInstalled(_))
        ));
        fs::create_dir_all(sdk.java_appengine_sdk_path()).unwrap();
        assert!(sdk.validate_app_engine_java_components().is_err());
        fs::write(sdk.jar_path(JAVA_TOOLS_JAR).unwrap(), "").unwrap();
        sdk.validate_app_engine_java_components().unwrap();
    }

    #[test]
    fn app_invocation_appends_global_flags_and_env() {
        let dir = fake_sdk();
        let sdk = CloudSdk::builder(dir.path())
            .output_format("json")
            .credential_file("/creds.json")
            .metrics_environment("gradle")
            .metrics_environment_version("2.0")
            .build()
            .unwrap();
        let invocation = sdk
            .app_invocation(vec!["modules".into(), "list".into()])
            .unwrap();
        let args = invocation.command.args();
        assert_eq!(&args[..3], ["app", "modules", "list"]);
        assert!(invocation.command.contains_sequence(&["list", "--quiet", "--format", "json"]));
        assert!(invocation
            .command
            .contains_sequence(&["--credential-file-override", "/creds.json"]));
        assert_eq!(invocation.env.get("CLOUDSDK_APP_USE_GSUTIL").map(String::as_str), Some("0"));
        assert_eq!(
            invocation.env.get("CLOUDSDK_METRICS_ENVIRONMENT").map(String::as_str),
            Some("gradle")
        );
        assert_eq!(
            invocation
                .env
                .get("CLOUDSDK_METRICS_ENVIRONMENT_VERSION")
                .map(String::as_str),
            Some("2.0")
        );
    }

    #[test]
    fn plain_app_invocation_sets_no_env() {
        let dir = fake_sdk();
        let sdk = CloudSdk::builder(dir.path()).build().unwrap();
        let invocation = sdk.app_invocation(vec!["gen-config".into()]).unwrap();
        assert_eq!(invocation.command.args().last().map(String::as_str), Some("--quiet"));
        assert!(invocation.env.is_empty());
    }

    #[test]
    fn source_invocation_uses_debug_group() {
        let dir = fake_sdk();
        let sdk = CloudSdk::builder(dir.path()).build().unwrap();
        let invocation = sdk
            .source_invocation(vec!["gen-repo-info-file".into()])
            .unwrap();
        assert!(invocation
            .command
            .contains_sequence(&["beta", "debug", "source", "gen-repo-info-file"]));
    }

    #[cfg(unix)]
    #[test]
    fn dev_appserver_invocation_disables_prompts() {
        let dir = fake_sdk();
        let sdk = CloudSdk::builder(dir.path()).build().unwrap();
        let env = HashMap::from([("JAVA_HOME".to_string(), "/jdk".to_string())]);
        let invocation = sdk
            .dev_appserver_invocation(vec!["app.yaml".into()], &env)
            .unwrap();
        assert_eq!(invocation.tool, Tool::DevAppServer);
        assert!(invocation.command.program().ends_with("dev_appserver.py"));
        assert_eq!(invocation.command.args(), ["app.yaml"]);
        assert_eq!(
            invocation.env.get("CLOUDSDK_CORE_DISABLE_PROMPTS").map(String::as_str),
            Some("1")
        );
        assert_eq!(invocation.env.get("JAVA_HOME").map(String::as_str), Some("/jdk"));
    }

    #[test]
    fn appcfg_invocation_passes_sdk_root_explicitly() {
        let dir = fake_sdk();
        let sdk = CloudSdk::builder(dir.path()).build().unwrap();
        fs::create_dir_all(sdk.java_appengine_sdk_path()).unwrap();
        fs::write(sdk.jar_path(JAVA_TOOLS_JAR).unwrap(), "").unwrap();

        let invocation = sdk.appcfg_invocation(vec!["stage".into()]).unwrap();
        let args = invocation.command.args();
        assert_eq!(
            args[0],
            format!("-Dappengine.sdk.root={}", sdk.java_appengine_sdk_path().display())
        );
        assert_eq!(args[1], "-cp");
        assert!(args[2].ends_with(JAVA_TOOLS_JAR));
        assert_eq!(args[3], APPCFG_MAIN_CLASS);
        assert_eq!(args[4], "stage");
    }

    #[test]
    fn component_records_deserialize() {
        let raw = r#"[
            {"id": "app-engine-java", "name": "App Engine Java", "size": 123,
             "state": {"name": "Installed"}, "is_hidden": false},
            {"id": "kubectl", "state": {"name": "Not Installed"}}
        ]"#;
        let components: Vec<SdkComponent> = serde_json::from_str(raw).unwrap();
        assert!(components[0].is_installed());
        assert_eq!(components[0].size_in_bytes, Some(123));
        assert!(!components[1].is_installed());
    }
}
