// ABOUTME: Name of the single current image of an application.
// ABOUTME: Formats as <namespace>/<app> and is overwritten by every commit.

use std::fmt;

use super::AppName;

pub const DEFAULT_NAMESPACE: &str = "dokku";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    namespace: String,
    app: AppName,
}

impl ImageName {
    pub fn new(namespace: impl Into<String>, app: &AppName) -> Self {
        Self {
            namespace: namespace.into(),
            app: app.clone(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn app(&self) -> &AppName {
        &self.app
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.app)
    }
}
