//! Tag configuration file
//!
//! Optional TOML file; every field has a default matching the DWM1001
//! factory setup (115200 baud, 10 Hz reporting).

use crate::error::{Result, TagError};
use crate::logging::timestamp_prefix;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default baud rate of the DWM1001 UART shell
pub const DWM1001_DEFAULT_BAUD: u32 = 115200;

/// Delays used by the shell handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellTiming {
    /// Pause after opening the port before the first write
    pub settle_ms: u64,
    /// Pause after each command so the device can answer
    pub command_delay_ms: u64,
    /// Sampling window used to decide whether the tag is streaming.
    ///
    /// Must be longer than the tag's report interval (100 ms at 10 Hz).
    pub report_window_ms: u64,
}

impl Default for ShellTiming {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            command_delay_ms: 100,
            report_window_ms: 2000,
        }
    }
}

impl ShellTiming {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn report_window(&self) -> Duration {
        Duration::from_millis(self.report_window_ms)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Serial port path; auto-detected when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Per-read timeout on the serial port
    pub read_timeout_ms: u64,
    pub timing: ShellTiming,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DWM1001_DEFAULT_BAUD,
            read_timeout_ms: 100,
            timing: ShellTiming::default(),
        }
    }
}

impl TagConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            log::error!("failed to read configuration file {}", path.display());
            TagError::Config(format!("{}: {}", path.display(), e))
        })?;

        Self::parse(&content).map_err(|e| {
            log::error!("failed to load configuration file {}", path.display());
            e
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: TagConfig =
            toml::from_str(content).map_err(|e| TagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the handshake meaningless
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(TagError::Config("baud_rate must be non-zero".to_string()));
        }
        if self.timing.report_window_ms == 0 {
            return Err(TagError::Config(
                "timing.report_window_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Render the configuration as TOML, prefixed with a generation stamp
    pub fn to_toml(&self) -> Result<String> {
        let body = toml::to_string_pretty(self).map_err(|e| TagError::Config(e.to_string()))?;
        Ok(format!("# generated {}\n{}", timestamp_prefix(false).trim_end(), body))
    }
}
