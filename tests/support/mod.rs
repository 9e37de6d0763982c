// ABOUTME: Test support utilities.
// ABOUTME: Provides the fake process runner and a throwaway DOKKU_ROOT with app directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use dokku::config::Settings;
use dokku::process::ProcessRunner;
use dokku::types::AppName;
use tempfile::TempDir;

// Each test binary only uses some of these modules, so allow dead_code.
#[allow(dead_code)]
pub mod fake_runner;

#[allow(unused_imports)]
pub use fake_runner::FakeRunner;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("dokku=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A temporary DOKKU_ROOT and plugin path.
#[allow(dead_code)]
pub struct TestHost {
    pub dir: TempDir,
    pub settings: Settings,
}

#[allow(dead_code)]
impl TestHost {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("home");
        let plugins = dir.path().join("plugins");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&plugins).unwrap();

        let mut settings = Settings::new(root, plugins);
        settings.hostname = Some("apps.test".to_string());
        Self { dir, settings }
    }

    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    /// Create the directory of an app and return its name.
    pub fn add_app(&self, name: &str) -> AppName {
        fs::create_dir_all(self.root().join(name)).unwrap();
        AppName::new(name).unwrap()
    }

    pub fn app_dir(&self, app: &AppName) -> PathBuf {
        self.root().join(app.as_str())
    }

    pub fn write(&self, app: &AppName, file: &str, contents: &str) {
        fs::write(self.app_dir(app).join(file), contents).unwrap();
    }

    pub fn read(&self, app: &AppName, file: &str) -> Option<String> {
        fs::read_to_string(self.app_dir(app).join(file)).ok()
    }

    /// Record `container` on `port` as the live instance of `app`.
    pub fn set_incumbent(&self, app: &AppName, container: &str, port: u16) {
        self.write(app, "CONTAINER", container);
        self.write(app, "PORT", &port.to_string());
        self.write(app, "URL", &format!("http://apps.test:{port}"));
    }
}

#[allow(dead_code)]
pub fn runner(fake: &Arc<FakeRunner>) -> Arc<dyn ProcessRunner> {
    fake.clone()
}
