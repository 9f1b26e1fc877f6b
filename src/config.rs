use std::env;

use crate::error::ConfigError;
use crate::severity::Severity;

/// Environment variable overriding [`SessionConfig::initial_channel_capacity`].
pub const ENV_CHANNEL_CAPACITY: &str = "BINLOG_CHANNEL_CAPACITY";
/// Environment variable overriding [`SessionConfig::max_channel_bytes`].
pub const ENV_MAX_CHANNEL_BYTES: &str = "BINLOG_MAX_CHANNEL_BYTES";
/// Environment variable overriding [`SessionConfig::min_severity`].
pub const ENV_MIN_SEVERITY: &str = "BINLOG_MIN_SEVERITY";
/// Environment variable overriding [`SessionConfig::write_chunk_size`].
pub const ENV_WRITE_CHUNK: &str = "BINLOG_WRITE_CHUNK";

const DEFAULT_CHANNEL_CAPACITY: usize = 64 * 1024;
const DEFAULT_MAX_CHANNEL_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_WRITE_CHUNK: usize = 64 * 1024;

/// Tuning knobs of a [`Session`](crate::Session).
///
/// Each producer gets its own channel that starts at
/// `initial_channel_capacity` bytes and doubles on demand up to
/// `max_channel_bytes`. Once a channel is at its ceiling, further records are
/// dropped and counted until the next `consume` empties it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub initial_channel_capacity: usize,
    pub max_channel_bytes: usize,
    pub min_severity: Severity,
    /// Bytes staged by `consume` before each sink write.
    pub write_chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_channel_bytes: DEFAULT_MAX_CHANNEL_BYTES,
            min_severity: Severity::Trace,
            write_chunk_size: DEFAULT_WRITE_CHUNK,
        }
    }
}

impl SessionConfig {
    pub fn with_initial_channel_capacity(mut self, bytes: usize) -> Self {
        self.initial_channel_capacity = bytes;
        self
    }

    pub fn with_max_channel_bytes(mut self, bytes: usize) -> Self {
        self.max_channel_bytes = bytes;
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_write_chunk_size(mut self, bytes: usize) -> Self {
        self.write_chunk_size = bytes;
        self
    }

    /// Checks the invariants `Session::new` relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_channel_bytes == 0 {
            return Err(ConfigError::Zero("max_channel_bytes"));
        }
        if self.write_chunk_size == 0 {
            return Err(ConfigError::Zero("write_chunk_size"));
        }
        if self.max_channel_bytes > u32::MAX as usize {
            return Err(ConfigError::CeilingTooLarge(self.max_channel_bytes));
        }
        if self.initial_channel_capacity > self.max_channel_bytes {
            return Err(ConfigError::CapacityAboveCeiling {
                initial: self.initial_channel_capacity,
                max: self.max_channel_bytes,
            });
        }
        Ok(())
    }

    /// Builds a configuration from the defaults overridden by the
    /// `BINLOG_*` environment variables.
    ///
    /// Sizes accept a plain byte count or a `k`/`m` suffix (`256k`, `4m`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_CHANNEL_CAPACITY) {
            config.initial_channel_capacity = parse_size(ENV_CHANNEL_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CHANNEL_BYTES) {
            config.max_channel_bytes = parse_size(ENV_MAX_CHANNEL_BYTES, &value)?;
        }
        if let Some(value) = lookup(ENV_MIN_SEVERITY) {
            config.min_severity = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_MIN_SEVERITY,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_WRITE_CHUNK) {
            config.write_chunk_size = parse_size(ENV_WRITE_CHUNK, &value)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_size(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    };
    let trimmed = value.trim().to_ascii_lowercase();
    let (digits, multiplier) = match trimmed.as_bytes().last() {
        Some(b'k') => (&trimmed[..trimmed.len() - 1], 1024),
        Some(b'm') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        _ => (trimmed.as_str(), 1),
    };
    digits
        .parse::<usize>()
        .map_err(|_| invalid())?
        .checked_mul(multiplier)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            (ENV_CHANNEL_CAPACITY, "4k"),
            (ENV_MAX_CHANNEL_BYTES, "1m"),
            (ENV_MIN_SEVERITY, "warning"),
            (ENV_WRITE_CHUNK, "512"),
        ]))
        .unwrap();

        assert_eq!(config.initial_channel_capacity, 4096);
        assert_eq!(config.max_channel_bytes, 1024 * 1024);
        assert_eq!(config.min_severity, Severity::Warning);
        assert_eq!(config.write_chunk_size, 512);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = SessionConfig::from_lookup(lookup_from(&[(ENV_MAX_CHANNEL_BYTES, "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_MAX_CHANNEL_BYTES,
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_capacity_above_ceiling_is_rejected() {
        let config = SessionConfig::default()
            .with_initial_channel_capacity(2048)
            .with_max_channel_bytes(1024);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CapacityAboveCeiling { .. })
        ));
    }
}
