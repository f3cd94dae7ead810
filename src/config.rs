use std::path::PathBuf;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use thiserror::Error;

/// Server settings, read from `SLOTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// Offset of the reference timezone that request timestamps are written in.
    pub utc_offset: FixedOffset,
    /// JSON file of facilities loaded at startup.
    pub facilities_seed: Option<PathBuf>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{key}: {value} minutes is not a valid UTC offset")]
    OffsetOutOfRange { key: &'static str, value: i32 },
    #[error("SLOTBOOK_MAX_CONNECTIONS must be at least 1")]
    NoConnections,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 7420,
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            utc_offset: Utc.fix(),
            facilities_seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(bind) = get("SLOTBOOK_BIND") {
            config.bind = bind.trim().to_string();
        }
        if let Some(port) = parsed(&get, "SLOTBOOK_PORT")? {
            config.port = port;
        }
        if let Some(dir) = get("SLOTBOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(max) = parsed(&get, "SLOTBOOK_MAX_CONNECTIONS")? {
            if max == 0 {
                return Err(ConfigError::NoConnections);
            }
            config.max_connections = max;
        }
        if let Some(threshold) = parsed(&get, "SLOTBOOK_COMPACT_THRESHOLD")? {
            config.compact_threshold = threshold;
        }
        config.metrics_port = parsed(&get, "SLOTBOOK_METRICS_PORT")?;
        if let Some(minutes) = parsed::<i32>(&get, "SLOTBOOK_UTC_OFFSET_MINUTES")? {
            config.utc_offset = minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or(ConfigError::OffsetOutOfRange {
                    key: "SLOTBOOK_UTC_OFFSET_MINUTES",
                    value: minutes,
                })?;
        }
        config.facilities_seed = get("SLOTBOOK_FACILITIES").map(PathBuf::from);

        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotbook.wal")
    }
}

fn parsed<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:7420");
        assert_eq!(config.wal_path(), PathBuf::from("./data/slotbook.wal"));
    }

    #[test]
    fn reads_every_key() {
        let config = Config::from_lookup(lookup(&[
            ("SLOTBOOK_BIND", "127.0.0.1"),
            ("SLOTBOOK_PORT", "9000"),
            ("SLOTBOOK_DATA_DIR", "/var/lib/slotbook"),
            ("SLOTBOOK_MAX_CONNECTIONS", "8"),
            ("SLOTBOOK_COMPACT_THRESHOLD", "50"),
            ("SLOTBOOK_METRICS_PORT", "9090"),
            ("SLOTBOOK_UTC_OFFSET_MINUTES", "420"),
            ("SLOTBOOK_FACILITIES", "facilities.json"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/slotbook"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.metrics_port, Some(9090));
        assert_eq!(config.utc_offset.local_minus_utc(), 7 * 3600);
        assert_eq!(config.facilities_seed, Some(PathBuf::from("facilities.json")));
    }

    #[test]
    fn blank_values_keep_defaults() {
        let env = lookup(&[("SLOTBOOK_PORT", "  "), ("SLOTBOOK_METRICS_PORT", "")]);
        let config = Config::from_lookup(env).unwrap();
        assert_eq!(config.port, 7420);
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn unparseable_values_fail() {
        let err = Config::from_lookup(lookup(&[("SLOTBOOK_PORT", "seventy")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "SLOTBOOK_PORT",
                value: "seventy".into()
            }
        );
        assert!(Config::from_lookup(lookup(&[("SLOTBOOK_COMPACT_THRESHOLD", "-1")])).is_err());
    }

    #[test]
    fn rejects_zero_connections_and_wild_offsets() {
        assert_eq!(
            Config::from_lookup(lookup(&[("SLOTBOOK_MAX_CONNECTIONS", "0")])).unwrap_err(),
            ConfigError::NoConnections
        );
        assert!(matches!(
            Config::from_lookup(lookup(&[("SLOTBOOK_UTC_OFFSET_MINUTES", "1500")])).unwrap_err(),
            ConfigError::OffsetOutOfRange { value: 1500, .. }
        ));
    }
}
