// ABOUTME: Per-application state directories under DOKKU_ROOT.
// ABOUTME: Reads ENV and routing records, promotes new routing state, manages the build cache.

mod error;
mod routing;

pub use error::RegistryError;
pub use routing::{CONTAINER_FILE, PORT_FILE, RoutingState, URL_FILE};

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::types::{AppName, ContainerId};

pub const ENV_FILE: &str = "ENV";
pub const CACHE_DIR: &str = "cache";
pub const HOSTNAME_FILE: &str = "HOSTNAME";

/// Filesystem view of all applications on this host.
#[derive(Debug, Clone)]
pub struct AppRegistry {
    root: PathBuf,
    hostname: Option<String>,
}

impl AppRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            root: settings.root.clone(),
            hostname: settings.hostname.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_dir(&self, app: &AppName) -> PathBuf {
        self.root.join(app.as_str())
    }

    /// Directory of an app that must already exist.
    ///
    /// App directories are created by whoever provisions the app, never here.
    pub fn require(&self, app: &AppName) -> Result<PathBuf, RegistryError> {
        let dir = self.app_dir(app);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(RegistryError::UnknownApp(app.to_string()))
        }
    }

    /// Every application directory, sorted by name.
    ///
    /// Entries that are not directories or not valid app names are skipped.
    pub fn list_apps(&self) -> Result<Vec<AppName>, RegistryError> {
        let entries = fs::read_dir(&self.root).map_err(|e| RegistryError::read(&self.root, e))?;

        let mut apps = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RegistryError::read(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            match AppName::new(&name.to_string_lossy()) {
                Ok(app) => apps.push(app),
                Err(e) => {
                    tracing::debug!(entry = ?name, error = %e, "skipping non-app directory");
                }
            }
        }
        apps.sort();
        Ok(apps)
    }

    /// Raw contents of the app's ENV record, if it has one.
    pub fn env_record(&self, app: &AppName) -> Result<Option<Vec<u8>>, RegistryError> {
        let path = self.app_dir(app).join(ENV_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|e| RegistryError::read(path, e))
    }

    /// The instance currently recorded as serving the app.
    pub fn incumbent(&self, app: &AppName) -> Result<Option<ContainerId>, RegistryError> {
        routing::read_record(&self.app_dir(app).join(CONTAINER_FILE))
            .map(|id| id.map(ContainerId::new))
    }

    pub fn routing_state(&self, app: &AppName) -> Result<Option<RoutingState>, RegistryError> {
        RoutingState::read_from(&self.app_dir(app))
    }

    /// Point the app's routing records at a new instance.
    pub fn promote(&self, app: &AppName, state: &RoutingState) -> Result<(), RegistryError> {
        let dir = self.require(app)?;
        state.write_to(&dir)?;
        tracing::debug!(app = %app, container = %state.container, port = state.port, "routing state promoted");
        Ok(())
    }

    /// Put back the routing records that were live before a promotion.
    pub fn restore(
        &self,
        app: &AppName,
        previous: Option<&RoutingState>,
    ) -> Result<(), RegistryError> {
        let dir = self.app_dir(app);
        match previous {
            Some(state) => state.write_to(&dir),
            None => RoutingState::clear(&dir),
        }
    }

    /// The recorded public URL of the app.
    pub fn url(&self, app: &AppName) -> Result<Option<String>, RegistryError> {
        routing::read_record(&self.app_dir(app).join(URL_FILE))
    }

    /// The app's build cache directory, created if missing.
    pub fn ensure_cache_dir(&self, app: &AppName) -> Result<PathBuf, RegistryError> {
        let dir = self.require(app)?.join(CACHE_DIR);
        fs::create_dir_all(&dir).map_err(|e| RegistryError::write(&dir, e))?;
        Ok(dir)
    }

    /// Public hostname for URLs.
    ///
    /// Configured value first, then `<root>/HOSTNAME`, then the machine name.
    pub fn hostname(&self) -> String {
        if let Some(hostname) = &self.hostname {
            return hostname.clone();
        }
        match routing::read_record(&self.root.join(HOSTNAME_FILE)) {
            Ok(Some(contents)) => {
                if let Some(first) = contents.lines().next() {
                    return first.trim().to_string();
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read HOSTNAME file: {}", e),
        }
        gethostname::gethostname().to_string_lossy().into_owned()
    }
}
