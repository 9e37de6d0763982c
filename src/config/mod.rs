// ABOUTME: Orchestrator settings from the environment and an optional dokkurc.yml.
// ABOUTME: The settings file is parsed as data, never executed.

mod file;

pub use file::SettingsFile;

use crate::error::{Error, Result};
use crate::types::DEFAULT_NAMESPACE;
use std::path::PathBuf;
use std::time::Duration;

pub const ROOT_ENV: &str = "DOKKU_ROOT";
pub const PLUGIN_PATH_ENV: &str = "PLUGIN_PATH";
pub const DEFAULT_ROOT: &str = "/home/dokku";
pub const DEFAULT_PLUGIN_PATH: &str = "/var/lib/dokku/plugins";
pub const RC_FILENAME: &str = "dokkurc.yml";

pub const DEFAULT_BUILD_IMAGE: &str = "progrium/buildstep";
pub const DEFAULT_APP_PORT: u16 = 5000;
pub const DEFAULT_SERVICE_USER: &str = "dokku";

/// Everything the components need to know about this host.
///
/// Built once at startup and handed to each component's constructor.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding one sub-directory per application.
    pub root: PathBuf,
    /// Directory holding one sub-directory per plugin.
    pub plugin_path: PathBuf,
    /// Container runtime CLI.
    pub docker: String,
    /// Hook dispatcher CLI.
    pub pluginhook: String,
    pub image_namespace: String,
    /// Generic image used to unpack sources and run the build procedure.
    pub build_image: String,
    /// Port the application listens on inside its container.
    pub app_port: u16,
    /// Identity the orchestrator runs as.
    pub service_user: String,
    /// Public hostname used for URLs. Falls back to `<root>/HOSTNAME`, then the machine name.
    pub hostname: Option<String>,
    /// Deadline for the `check-deploy` hook. `None` waits indefinitely.
    pub check_timeout: Option<Duration>,
    /// Serialize deploys of the same app with a lock file.
    pub deploy_lock: bool,
    pub lock_stale_after: Duration,
}

impl Settings {
    /// Built-in defaults for the given directories.
    pub fn new(root: impl Into<PathBuf>, plugin_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            plugin_path: plugin_path.into(),
            docker: "docker".to_string(),
            pluginhook: "pluginhook".to_string(),
            image_namespace: DEFAULT_NAMESPACE.to_string(),
            build_image: DEFAULT_BUILD_IMAGE.to_string(),
            app_port: DEFAULT_APP_PORT,
            service_user: DEFAULT_SERVICE_USER.to_string(),
            hostname: None,
            check_timeout: None,
            deploy_lock: false,
            lock_stale_after: Duration::from_secs(60 * 60),
        }
    }

    /// Resolve settings from `DOKKU_ROOT`, `PLUGIN_PATH` and `<root>/dokkurc.yml`.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var_os(ROOT_ENV)
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_ROOT), PathBuf::from);
        let plugin_path = std::env::var_os(PLUGIN_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_PLUGIN_PATH), PathBuf::from);

        Self::new(root, plugin_path).load_rc()
    }

    pub fn rc_path(&self) -> PathBuf {
        self.root.join(RC_FILENAME)
    }

    /// Overlay `<root>/dokkurc.yml` if it exists.
    pub fn load_rc(self) -> Result<Self> {
        let path = self.rc_path();
        if !path.is_file() {
            return Ok(self);
        }
        tracing::debug!(path = %path.display(), "loading settings file");
        let content = std::fs::read_to_string(&path)?;
        self.apply_yaml(&content)
    }

    /// Overlay settings from YAML text.
    pub fn apply_yaml(self, yaml: &str) -> Result<Self> {
        // An empty file deserializes to unit, not to an empty map.
        if yaml.trim().is_empty() {
            return Ok(self);
        }
        let file: SettingsFile = serde_yaml::from_str(yaml)?;
        self.apply(file)
    }

    pub fn apply(mut self, file: SettingsFile) -> Result<Self> {
        if let Some(docker) = file.docker {
            self.docker = non_empty("docker", docker)?;
        }
        if let Some(pluginhook) = file.pluginhook {
            self.pluginhook = non_empty("pluginhook", pluginhook)?;
        }
        if let Some(namespace) = file.image_namespace {
            self.image_namespace = non_empty("image_namespace", namespace)?;
        }
        if let Some(build_image) = file.build_image {
            self.build_image = non_empty("build_image", build_image)?;
        }
        if let Some(port) = file.app_port {
            if port == 0 {
                return Err(Error::InvalidConfig("app_port must be non-zero".to_string()));
            }
            self.app_port = port;
        }
        if let Some(user) = file.service_user {
            self.service_user = non_empty("service_user", user)?;
        }
        if let Some(hostname) = file.hostname {
            self.hostname = Some(non_empty("hostname", hostname)?);
        }
        if file.check_timeout.is_some() {
            self.check_timeout = file.check_timeout;
        }
        if let Some(lock) = file.deploy_lock {
            self.deploy_lock = lock;
        }
        if let Some(stale) = file.lock_stale_after {
            self.lock_stale_after = stale;
        }
        Ok(self)
    }
}

fn non_empty(key: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::InvalidConfig(format!("{key} cannot be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}
