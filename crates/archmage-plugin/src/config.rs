//! Host configuration.

use crate::error::ApiError;
use crate::events::DEFAULT_LEAK_THRESHOLD;

/// Default maximum length of one console message.
pub const DEFAULT_CONSOLE_MAX_LEN: usize = 2048;

/// Configuration for a plugin host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Host version reported to extensions; must be valid semver
    /// (default: this crate's version).
    pub version: String,
    /// Listener count per emitter above which a leak warning is logged
    /// (default: 100).
    pub listener_leak_threshold: usize,
    /// Console messages longer than this are truncated (default: 2048).
    pub console_max_message_len: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            listener_leak_threshold: DEFAULT_LEAK_THRESHOLD,
            console_max_message_len: DEFAULT_CONSOLE_MAX_LEN,
        }
    }
}

impl HostConfig {
    /// Build config from environment variables, falling back to defaults
    /// for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            version: std::env::var("ARCHMAGE_HOST_VERSION")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.version),
            listener_leak_threshold: std::env::var("ARCHMAGE_LISTENER_LEAK_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.listener_leak_threshold),
            console_max_message_len: std::env::var("ARCHMAGE_CONSOLE_MAX_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.console_max_message_len),
        }
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        semver::Version::parse(self.version.trim())?;
        if self.listener_leak_threshold == 0 {
            return Err(ApiError::InvalidConfig(
                "listener_leak_threshold must be greater than 0".into(),
            ));
        }
        if self.console_max_message_len == 0 {
            return Err(ApiError::InvalidConfig(
                "console_max_message_len must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
