// ABOUTME: Validated application name.
// ABOUTME: Names become directory names and image repository names, so both rule sets apply.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest accepted application name.
pub const MAX_APP_NAME_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppNameError {
    #[error("app name cannot be empty")]
    Empty,

    #[error("app name exceeds maximum length of {MAX_APP_NAME_LEN} characters")]
    TooLong,

    #[error("app name must start with a lowercase letter or digit")]
    InvalidStart,

    #[error("app name must be lowercase")]
    NotLowercase,

    #[error("invalid character in app name: '{0}'")]
    InvalidChar(char),
}

/// The unique name of a deployed application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppName(String);

impl AppName {
    pub fn new(value: &str) -> Result<Self, AppNameError> {
        let first = value.chars().next().ok_or(AppNameError::Empty)?;

        if value.len() > MAX_APP_NAME_LEN {
            return Err(AppNameError::TooLong);
        }

        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(if first.is_ascii_uppercase() {
                AppNameError::NotLowercase
            } else {
                AppNameError::InvalidStart
            });
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(AppNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && !matches!(c, '-' | '_' | '.') {
                return Err(AppNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AppName {
    type Err = AppNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for AppName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
