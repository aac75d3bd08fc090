//! Store configuration.

use std::time::Duration;

/// Configuration for opening an [`EavStore`](crate::EavStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the database file if it doesn't exist.
    pub create_if_missing: bool,

    /// How long a connection waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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
}
