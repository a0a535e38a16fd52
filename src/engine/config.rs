//! Engine configuration.
//!
//! All parameters are fixed at construction; there is no runtime
//! reconfiguration.

use log::warn;
use std::time::Duration;

/// Default duplicate-retention window.
pub const DEFAULT_DEDUP_RETENTION: Duration = Duration::from_secs(120);

/// Default stream timeout for incomplete cycles.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of completed measurements held for [`take_completed`].
///
/// [`take_completed`]: crate::engine::Engine::take_completed
pub const DEFAULT_COMPLETED_QUEUE_CAPACITY: usize = 256;

/// Environment variable overriding the retention window (seconds).
pub const ENV_DEDUP_RETENTION_SECS: &str = "MPBLE_DEDUP_RETENTION_SECS";
/// Environment variable overriding the stream timeout (seconds).
pub const ENV_STREAM_TIMEOUT_SECS: &str = "MPBLE_STREAM_TIMEOUT_SECS";
/// Environment variable overriding the sweep interval (seconds).
pub const ENV_SWEEP_INTERVAL_SECS: &str = "MPBLE_SWEEP_INTERVAL_SECS";
/// Environment variable setting an open cycle cap (unbounded when unset).
pub const ENV_MAX_ACTIVE_CYCLES: &str = "MPBLE_MAX_ACTIVE_CYCLES";
/// Environment variable overriding the completed queue capacity.
pub const ENV_COMPLETED_QUEUE_CAPACITY: &str = "MPBLE_COMPLETED_QUEUE_CAPACITY";

/// Configuration for the reassembly engine.
///
/// Note: This is `Copy` for efficient passing to constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a packet key is remembered to reject retransmissions.
    pub dedup_retention: Duration,
    /// How long an incomplete cycle may go without a new packet.
    pub stream_timeout: Duration,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
    /// Optional cap on open cycles. At the cap, packets that would open a
    /// new cycle are refused; open cycles are never dropped early.
    pub max_active_cycles: Option<usize>,
    /// Completed measurements kept for polling; the oldest is dropped when
    /// full.
    pub completed_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_retention: DEFAULT_DEDUP_RETENTION,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            max_active_cycles: None,
            completed_queue_capacity: DEFAULT_COMPLETED_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if any duration is zero, a cap of 0 cycles is set, or
    /// the completed queue has no capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup_retention.is_zero() {
            return Err(ConfigError::Invalid(
                "dedup_retention must be greater than 0",
            ));
        }
        if self.stream_timeout.is_zero() {
            return Err(ConfigError::Invalid("stream_timeout must be greater than 0"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid("sweep_interval must be greater than 0"));
        }
        if self.max_active_cycles == Some(0) {
            return Err(ConfigError::Invalid(
                "max_active_cycles must be greater than 0",
            ));
        }
        if self.completed_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "completed_queue_capacity must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Build a configuration from `MPBLE_*` environment variables.
    ///
    /// Missing variables keep their defaults; unparsable ones are logged
    /// and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            parse_var(&lookup, name).map_or(default, Duration::from_secs)
        };
        Self {
            dedup_retention: secs(ENV_DEDUP_RETENTION_SECS, defaults.dedup_retention),
            stream_timeout: secs(ENV_STREAM_TIMEOUT_SECS, defaults.stream_timeout),
            sweep_interval: secs(ENV_SWEEP_INTERVAL_SECS, defaults.sweep_interval),
            max_active_cycles: parse_var(&lookup, ENV_MAX_ACTIVE_CYCLES)
                .map(|n| n as usize)
                .or(defaults.max_active_cycles),
            completed_queue_capacity: parse_var(&lookup, ENV_COMPLETED_QUEUE_CAPACITY)
                .map_or(defaults.completed_queue_capacity, |n| n as usize),
        }
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let value = lookup(name)?;
    match value.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", name, value, e);
            None
        }
    }
}

/// Error type for engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration parameter.
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.dedup_retention, Duration::from_secs(120));
        assert_eq!(config.stream_timeout, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.max_active_cycles, None);
        assert_eq!(config.completed_queue_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let cases = [
            EngineConfig {
                dedup_retention: Duration::ZERO,
                ..EngineConfig::default()
            },
            EngineConfig {
                stream_timeout: Duration::ZERO,
                ..EngineConfig::default()
            },
            EngineConfig {
                sweep_interval: Duration::ZERO,
                ..EngineConfig::default()
            },
            EngineConfig {
                max_active_cycles: Some(0),
                ..EngineConfig::default()
            },
            EngineConfig {
                completed_queue_capacity: 0,
                ..EngineConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DEDUP_RETENTION_SECS, "60"),
            (ENV_STREAM_TIMEOUT_SECS, " 15 "),
            (ENV_MAX_ACTIVE_CYCLES, "32"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.dedup_retention, Duration::from_secs(60));
        assert_eq!(config.stream_timeout, Duration::from_secs(15));
        assert_eq!(config.sweep_interval, DEFAULT_SWEEP_INTERVAL);
        assert_eq!(config.max_active_cycles, Some(32));
        assert_eq!(config.completed_queue_capacity, DEFAULT_COMPLETED_QUEUE_CAPACITY);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = EngineConfig::from_lookup(|name| {
            (name == ENV_SWEEP_INTERVAL_SECS).then(|| "soon".to_string())
        });
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::Invalid("test message");
        assert_eq!(format!("{}", err), "invalid config: test message");
    }
}
