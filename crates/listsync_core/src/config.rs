//! Entity store configuration.

/// Configuration for opening an [`EntityStore`](crate::EntityStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Delete orphaned item records from the record store when they are
    /// dropped on load. When false they are only skipped in memory.
    pub repair_on_load: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            repair_on_load: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether orphaned records are deleted on load.
    #[must_use]
    pub const fn repair_on_load(mut self, value: bool) -> Self {
        self.repair_on_load = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        assert!(StoreConfig::default().repair_on_load);
        assert!(!StoreConfig::new().repair_on_load(false).repair_on_load);
    }
}
