// ABOUTME: On-disk shape of the optional dokkurc.yml settings file.
// ABOUTME: Every key is optional; absent keys keep the built-in defaults.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    #[serde(default)]
    pub docker: Option<String>,

    #[serde(default)]
    pub pluginhook: Option<String>,

    #[serde(default)]
    pub image_namespace: Option<String>,

    #[serde(default)]
    pub build_image: Option<String>,

    #[serde(default)]
    pub app_port: Option<u16>,

    #[serde(default)]
    pub service_user: Option<String>,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub check_timeout: Option<Duration>,

    #[serde(default)]
    pub deploy_lock: Option<bool>,

    #[serde(default, with = "humantime_serde")]
    pub lock_stale_after: Option<Duration>,
}
