// ABOUTME: Persisted routing state: the CONTAINER, PORT and URL records of an app.
// ABOUTME: All three are staged to temporary files before any is renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::ContainerId;

use super::error::RegistryError;

pub const CONTAINER_FILE: &str = "CONTAINER";
pub const PORT_FILE: &str = "PORT";
pub const URL_FILE: &str = "URL";

const STAGING_SUFFIX: &str = ".new";

/// Which instance serves an app, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingState {
    pub container: ContainerId,
    pub port: u16,
    pub url: String,
}

impl RoutingState {
    pub fn new(container: ContainerId, port: u16, hostname: &str) -> Self {
        Self {
            container,
            port,
            url: format!("http://{hostname}:{port}"),
        }
    }

    fn records(&self) -> [(&'static str, String); 3] {
        [
            (CONTAINER_FILE, self.container.to_string()),
            (PORT_FILE, self.port.to_string()),
            (URL_FILE, self.url.clone()),
        ]
    }

    /// Replace the records in `dir` with this state.
    ///
    /// Every record is written to `<NAME>.new` first. Only when all three
    /// are staged are they renamed over the live files, in the order
    /// CONTAINER, PORT, URL. A failure while staging leaves the live
    /// records untouched.
    pub(crate) fn write_to(&self, dir: &Path) -> Result<(), RegistryError> {
        let records = self.records();
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(records.len());

        for (name, value) in &records {
            let live = dir.join(name);
            let staging = dir.join(format!("{name}{STAGING_SUFFIX}"));
            if let Err(e) = fs::write(&staging, value) {
                discard(&staged);
                let _ = fs::remove_file(&staging);
                return Err(RegistryError::write(staging, e));
            }
            staged.push((staging, live));
        }

        for (staging, live) in &staged {
            fs::rename(staging, live).map_err(|e| RegistryError::write(live.clone(), e))?;
        }
        Ok(())
    }

    /// Read the records from `dir`. `None` until the first promotion.
    pub(crate) fn read_from(dir: &Path) -> Result<Option<Self>, RegistryError> {
        let Some(container) = read_record(&dir.join(CONTAINER_FILE))? else {
            return Ok(None);
        };
        let port_path = dir.join(PORT_FILE);
        let Some(port) = read_record(&port_path)? else {
            return Ok(None);
        };
        let port = port.parse().map_err(|_| RegistryError::InvalidPort {
            path: port_path,
            value: port.clone(),
        })?;
        let url = read_record(&dir.join(URL_FILE))?.unwrap_or_default();

        Ok(Some(Self {
            container: ContainerId::new(container),
            port,
            url,
        }))
    }

    /// Remove all three records, used to undo a first-ever promotion.
    pub(crate) fn clear(dir: &Path) -> Result<(), RegistryError> {
        for name in [CONTAINER_FILE, PORT_FILE, URL_FILE] {
            let path = dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(RegistryError::write(path, e)),
            }
        }
        Ok(())
    }
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (staging, _) in staged {
        let _ = fs::remove_file(staging);
    }
}

/// Read a single-line record, treating a missing or blank file as absent.
pub(crate) fn read_record(path: &Path) -> Result<Option<String>, RegistryError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegistryError::read(path, e)),
    }
}
