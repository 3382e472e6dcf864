//! Configuration manager for identa.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
/// Hour of day (UTC) at which the reclamation sweep fires.
pub const DEFAULT_RECLAIM_HOUR: u32 = 1;
/// Bound, in seconds, on delivery-provider calls.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 5;

/// Error raised while reading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot open configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Tunables for the lifecycle core. Every field is optional; the core
/// runs with defaults when no file is provided.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(skip)]
    path: PathBuf,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Wall-clock hour (UTC, 0-23) of the daily reclamation sweep.
    pub reclaim_hour: Option<u32>,
    /// Timeout applied to SMS/email delivery collaborator calls.
    pub delivery_timeout_secs: Option<u64>,
}

impl Configuration {
    /// Update configuration file path.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Read configuration from the YAML file at `path`, or at
    /// `config.yaml` when no path was set.
    pub fn read(mut self) -> Result<Self, ConfigError> {
        if self.path.as_os_str().is_empty() {
            self.path = DEFAULT_CONFIG_PATH.into();
        }

        let file = File::open(&self.path)?;
        let mut config: Configuration = serde_yaml::from_reader(file)?;
        config.path = self.path;
        Ok(config)
    }

    /// Effective sweep hour.
    pub fn reclaim_hour(&self) -> u32 {
        self.reclaim_hour.unwrap_or(DEFAULT_RECLAIM_HOUR).min(23)
    }

    /// Effective delivery timeout.
    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.delivery_timeout_secs
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
        )
    }
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory size in kibibytes, between 8*`parallelism` and (2^32)-1.
    pub memory_cost: u32,
    /// Number of passes, between 1 and (2^32)-1.
    pub iterations: u32,
    /// Degree of parallelism, between 1 and 255.
    pub parallelism: u32,
    /// Size of the output in bytes.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 19, // 19 MiB.
            iterations: 2,
            parallelism: 1,
            hash_length: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Configuration::default();

        assert_eq!(config.reclaim_hour(), DEFAULT_RECLAIM_HOUR);
        assert_eq!(
            config.delivery_timeout(),
            std::time::Duration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn parses_yaml() {
        let config: Configuration = serde_yaml::from_str(
            r#"
reclaim_hour: 3
delivery_timeout_secs: 2
argon2:
  memory_cost: 8192
  iterations: 1
  parallelism: 1
  hash_length: 32
"#,
        )
        .unwrap();

        assert_eq!(config.reclaim_hour(), 3);
        assert_eq!(config.argon2.unwrap().memory_cost, 8192);
    }

    #[test]
    fn out_of_range_hour_is_clamped() {
        let config = Configuration {
            reclaim_hour: Some(99),
            ..Default::default()
        };

        assert_eq!(config.reclaim_hour(), 23);
    }
}
