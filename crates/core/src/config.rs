//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{
    DEFAULT_LOCKED_STATE, DEFAULT_PUBLIC_STATE, DEFAULT_RECENT_CHANGE_HOURS,
    DEFAULT_REGISTRY_FILE,
};
use crate::{RegistryError, RegistryResult};
use chrono::Duration;
use mdr_types::RegistrationState;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    registry_file: PathBuf,
    default_locked_state: RegistrationState,
    default_public_state: RegistrationState,
    recent_change_window: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidInput`] if `registry_file` is empty or names a directory.
    pub fn new(
        registry_file: PathBuf,
        default_locked_state: RegistrationState,
        default_public_state: RegistrationState,
    ) -> RegistryResult<Self> {
        if registry_file.as_os_str().is_empty() {
            return Err(RegistryError::InvalidInput(
                "registry_file cannot be empty".into(),
            ));
        }
        if registry_file.is_dir() {
            return Err(RegistryError::InvalidInput(format!(
                "registry_file must be a file, not a directory: {}",
                registry_file.display()
            )));
        }

        Ok(Self {
            registry_file,
            default_locked_state,
            default_public_state,
            recent_change_window: Duration::hours(DEFAULT_RECENT_CHANGE_HOURS),
        })
    }

    /// Overrides the window used by `was_modified_recently`.
    pub fn with_recent_change_window(mut self, window: Duration) -> Self {
        self.recent_change_window = window;
        self
    }

    pub fn registry_file(&self) -> &Path {
        &self.registry_file
    }

    pub fn default_locked_state(&self) -> RegistrationState {
        self.default_locked_state
    }

    pub fn default_public_state(&self) -> RegistrationState {
        self.default_public_state
    }

    pub fn recent_change_window(&self) -> Duration {
        self.recent_change_window
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            registry_file: PathBuf::from(DEFAULT_REGISTRY_FILE),
            default_locked_state: DEFAULT_LOCKED_STATE,
            default_public_state: DEFAULT_PUBLIC_STATE,
            recent_change_window: Duration::hours(DEFAULT_RECENT_CHANGE_HOURS),
        }
    }
}

/// Resolve the registry snapshot file without reading environment variables.
///
/// If `override_file` is provided it is used as-is; otherwise the default file name is used
/// relative to the current working directory.
pub fn resolve_registry_file(override_file: Option<PathBuf>) -> PathBuf {
    override_file
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REGISTRY_FILE))
}

/// Parse a registration state from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `default`. Both state names
/// (`"recorded"`, `"Preferred Standard"`) and numeric values (`"3"`) are accepted.
///
/// # Errors
///
/// Returns [`RegistryError::State`] if the value is not a known state.
pub fn registration_state_from_env_value(
    value: Option<String>,
    default: RegistrationState,
) -> RegistryResult<RegistrationState> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value.map(|v| v.parse::<RegistrationState>()).transpose()?;

    Ok(parsed.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_env_value_defaults_when_missing_or_blank() {
        let state = registration_state_from_env_value(None, RegistrationState::Recorded)
            .expect("default state");
        assert_eq!(state, RegistrationState::Recorded);

        let state =
            registration_state_from_env_value(Some("  ".into()), RegistrationState::Candidate)
                .expect("default state");
        assert_eq!(state, RegistrationState::Candidate);
    }

    #[test]
    fn test_state_from_env_value_parses_names_and_numbers() {
        let state = registration_state_from_env_value(
            Some("standard".into()),
            RegistrationState::Recorded,
        )
        .expect("parse name");
        assert_eq!(state, RegistrationState::Standard);

        let state =
            registration_state_from_env_value(Some("2".into()), RegistrationState::Recorded)
                .expect("parse number");
        assert_eq!(state, RegistrationState::Candidate);
    }

    #[test]
    fn test_state_from_env_value_rejects_unknown() {
        let err = registration_state_from_env_value(
            Some("approved".into()),
            RegistrationState::Recorded,
        )
        .expect_err("unknown state");
        assert!(matches!(err, RegistryError::State(_)));
    }

    #[test]
    fn test_config_rejects_empty_and_directory_paths() {
        let err = CoreConfig::new(
            PathBuf::new(),
            DEFAULT_LOCKED_STATE,
            DEFAULT_PUBLIC_STATE,
        )
        .expect_err("empty path");
        assert!(matches!(err, RegistryError::InvalidInput(_)));

        let dir = tempfile::TempDir::new().expect("temp dir");
        let err = CoreConfig::new(
            dir.path().to_path_buf(),
            DEFAULT_LOCKED_STATE,
            DEFAULT_PUBLIC_STATE,
        )
        .expect_err("directory path");
        assert!(matches!(err, RegistryError::InvalidInput(_)));
    }

    #[test]
    fn test_resolve_registry_file_falls_back_to_default() {
        assert_eq!(
            resolve_registry_file(None),
            PathBuf::from(DEFAULT_REGISTRY_FILE)
        );
        assert_eq!(
            resolve_registry_file(Some(PathBuf::from("/tmp/mdr.yaml"))),
            PathBuf::from("/tmp/mdr.yaml")
        );
    }
}
