//! Configuration system for the FIOS CLI.

use fios_core::{MAX_PAYLOAD_SIZE, SessionConfig};
use fios_transport::serial::SUPPORTED_BAUD_RATES;
use fios_transport::{AUTO_DEVICE, DEFAULT_BAUD_RATE, SerialConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// FIOS configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Serial line configuration
    #[serde(default)]
    pub serial: SerialSection,
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial line configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSection {
    /// Device used when the command line says `auto`
    #[serde(default = "default_device")]
    pub device: String,
    /// Line speed in bits per second
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Payload bytes per DATA frame
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Delay between polls of the session
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up when nothing changes for this long (0 disables)
    #[serde(default)]
    pub stall_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_device() -> String {
    AUTO_DEVICE.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_chunk_size() -> usize {
    MAX_PAYLOAD_SIZE
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            poll_interval_ms: default_poll_interval_ms(),
            stall_timeout_secs: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("cannot parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("fios/config.toml")
    }

    /// Load config from the default path, falling back to built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.serial.device.trim().is_empty() {
            anyhow::bail!("Serial device must not be empty (use \"{AUTO_DEVICE}\" for the default)");
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            anyhow::bail!(
                "Invalid baud rate: {}. Must be one of: {:?}",
                self.serial.baud_rate,
                SUPPORTED_BAUD_RATES
            );
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > MAX_PAYLOAD_SIZE {
            anyhow::bail!("Chunk size must be between 1 and {MAX_PAYLOAD_SIZE} bytes");
        }

        if self.transfer.poll_interval_ms == 0 || self.transfer.poll_interval_ms > 10_000 {
            anyhow::bail!("Poll interval must be between 1 and 10000 ms");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Device to open for a command-line device argument.
    ///
    /// `auto` on the command line defers to the configured device, and an
    /// `auto` there resolves to the platform default.
    #[must_use]
    pub fn device_for(&self, requested: &str) -> String {
        if requested == AUTO_DEVICE {
            fios_transport::resolve_device(&self.serial.device)
        } else {
            requested.to_string()
        }
    }

    /// Serial line settings
    #[must_use]
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.serial.baud_rate,
            ..SerialConfig::default()
        }
    }

    /// Protocol engine settings
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_size: self.transfer.chunk_size,
            ..SessionConfig::default()
        }
    }

    /// Delay between session polls
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.transfer.poll_interval_ms)
    }

    /// Stall watchdog limit, if enabled
    #[must_use]
    pub fn stall_timeout(&self) -> Option<Duration> {
        (self.transfer.stall_timeout_secs > 0)
            .then(|| Duration::from_secs(self.transfer.stall_timeout_secs))
    }
}
