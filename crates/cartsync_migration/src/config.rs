//! Coordinator configuration.

use serde::{Deserialize, Serialize};

/// Errors produced while loading a [`CoordinatorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("failed to parse coordinator config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field held an unusable value.
    #[error("invalid coordinator config: {0}")]
    Invalid(String),
}

/// Tunables for [`ContextSwitchCoordinator`](crate::ContextSwitchCoordinator).
///
/// # Example
///
/// ```
/// use cartsync_migration::CoordinatorConfig;
///
/// let config = CoordinatorConfig::from_json(r#"{ "clear_attempts": 3 }"#)
///     .expect("valid config");
/// assert_eq!(config.clear_attempts, 3);
/// assert!(!config.migrate_on_initial_identity);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// How many times the anonymous store's `clear` is attempted after a
    /// successful write. `1` means no retry.
    pub clear_attempts: u32,

    /// Whether an identity already present in the first observed context is
    /// treated as a fresh sign-in.
    ///
    /// When `false` (the default) the first observed context only establishes
    /// the baseline, and migration runs solely on a later anonymous-to-identified
    /// change.
    pub migrate_on_initial_identity: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            clear_attempts: 1,
            migrate_on_initial_identity: false,
        }
    }
}

impl CoordinatorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the JSON is malformed or a value is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `clear_attempts` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clear_attempts == 0 {
            return Err(ConfigError::Invalid(
                "clear_attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Sets the number of clear attempts. Zero is raised to one.
    #[must_use]
    pub fn with_clear_attempts(mut self, attempts: u32) -> Self {
        self.clear_attempts = attempts.max(1);
        self
    }

    /// Sets whether the first observed identity triggers a migration.
    #[must_use]
    pub fn with_migrate_on_initial_identity(mut self, enabled: bool) -> Self {
        self.migrate_on_initial_identity = enabled;
        self
    }
}
