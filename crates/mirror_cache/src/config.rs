use std::{env, time::Duration};

use crate::notify::DEFAULT_CAPACITY;

/// Caching decorator configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Cache fill timeout in milliseconds, 0 disables it (default: 30,000)
    pub fill_timeout_ms: u64,
    /// Events buffered per subscriber on the decorator's bus (default: 1,024)
    pub change_bus_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MIRROR_FILL_TIMEOUT_MS` - Cache fill timeout in ms, 0 for none (default: 30,000)
    /// - `CHANGE_BUS_CAPACITY` - Buffered events per subscriber (default: 1,024)
    pub fn from_env() -> Self {
        Self {
            fill_timeout_ms: env::var("MIRROR_FILL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30_000),
            change_bus_capacity: env::var("CHANGE_BUS_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_CAPACITY),
        }
    }

    /// Get the fill timeout as a Duration, `None` when disabled.
    pub fn fill_timeout(&self) -> Option<Duration> {
        (self.fill_timeout_ms > 0).then(|| Duration::from_millis(self.fill_timeout_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_timeout_conversion() {
        let config = Config {
            fill_timeout_ms: 250,
            change_bus_capacity: 16,
        };

        assert_eq!(config.fill_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_fill_timeout_disables_it() {
        let config = Config {
            fill_timeout_ms: 0,
            change_bus_capacity: 16,
        };

        assert_eq!(config.fill_timeout(), None);
    }

    #[test]
    fn test_default_values() {
        // Clear environment variables to test defaults
        env::remove_var("MIRROR_FILL_TIMEOUT_MS");
        env::remove_var("CHANGE_BUS_CAPACITY");

        let config = Config::from_env();

        assert_eq!(config.fill_timeout_ms, 30_000);
        assert_eq!(config.change_bus_capacity, 1_024);
    }
}
