//! Data manager configuration.

use relstore_storage::StoreConfig;
use std::time::Duration;

/// What to do when a source-owned relationship points at a missing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePolicy {
    /// Fail the read with [`CoreError::DanglingReference`](crate::CoreError::DanglingReference).
    Strict,
    /// Log a warning and treat the reference as absent.
    Lenient,
}

impl Default for ReferencePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

/// Configuration for opening a [`DataManager`](crate::DataManager).
#[derive(Debug, Clone)]
pub struct Config {
    /// Dangling reference handling on reads.
    pub reference_policy: ReferencePolicy,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// How long to wait on a locked database.
    pub busy_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_policy: ReferencePolicy::default(),
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dangling reference policy.
    #[must_use]
    pub const fn reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference_policy = policy;
        self
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Returns the storage-level subset of this configuration.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new()
            .create_if_missing(self.create_if_missing)
            .busy_timeout(self.busy_timeout)
    }
}
