//! Serial port configuration and connection management
//!
//! Handles the UART link to the DWM1001 shell. The shell logic itself only
//! sees the [`ShellPort`] trait so it can run against a scripted port in tests.

use crate::config::{TagConfig, DWM1001_DEFAULT_BAUD};
use crate::error::{Result, TagError};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

#[cfg(unix)]
type NativePort = serialport::TTYPort;
#[cfg(windows)]
type NativePort = serialport::COMPort;

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/serial0, /dev/tty.usbmodem0001)
    pub port_path: String,
    /// Baud rate (default: 115200)
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from("/dev/serial0"),
            baud_rate: DWM1001_DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Duration::from_millis(100),
        }
    }
}

impl PortConfig {
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Build from a loaded tag configuration and a resolved port path
    pub fn from_tag_config(port_path: &str, config: &TagConfig) -> Self {
        Self::new(port_path)
            .with_baud_rate(config.baud_rate)
            .with_timeout(config.read_timeout())
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Byte-level operations the DWM1001 shell exchange needs
pub trait ShellPort {
    /// Path or name of the underlying port, for log lines
    fn name(&self) -> &str;

    /// Number of bytes waiting in the input buffer
    fn bytes_to_read(&mut self) -> Result<u32>;

    /// Discard unread input
    fn clear_input(&mut self) -> Result<()>;

    /// Write a complete command
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Read everything currently buffered without waiting for more
    fn read_available(&mut self) -> Result<Vec<u8>>;

    /// Read one line, `None` on timeout with nothing received
    fn read_line(&mut self) -> Result<Option<String>>;
}

/// Open serial connection to a tag
pub struct SerialConnection {
    port: NativePort,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open_native()?;

        log::debug!(
            "opened {} at {} baud",
            config.port_path,
            config.baud_rate
        );

        Ok(Self { port, config })
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn path(&self) -> &str {
        &self.config.port_path
    }

    /// Flush output buffer
    pub fn flush(&mut self) -> Result<()> {
        self.port
            .flush()
            .map_err(|e| TagError::io("Failed to flush serial port", e))
    }
}

#[cfg(unix)]
impl std::os::unix::io::AsRawFd for SerialConnection {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.port.as_raw_fd()
    }
}

impl ShellPort for SerialConnection {
    fn name(&self) -> &str {
        &self.config.port_path
    }

    fn bytes_to_read(&mut self) -> Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn clear_input(&mut self) -> Result<()> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .map_err(|e| TagError::io("Failed to write to serial port", e))?;
        self.flush()
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let waiting = self.port.bytes_to_read()? as usize;
        let mut buffer = vec![0u8; waiting];
        let mut filled = 0;

        while filled < waiting {
            match self.port.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(TagError::io("Failed to read from serial port", e)),
            }
        }

        buffer.truncate(filled);
        Ok(buffer)
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match self.port.read(&mut byte) {
                Ok(1) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    buffer.push(byte[0]);
                }
                Ok(_) => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    if buffer.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Err(e) => return Err(TagError::io("Failed to read from serial port", e)),
            }
        }

        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }

        Ok(Some(String::from_utf8_lossy(&buffer).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.port_path, "/dev/serial0");
    }

    #[test]
    fn test_config_builder() {
        let config = PortConfig::new("/dev/ttyACM0")
            .with_baud_rate(9600)
            .with_timeout(Duration::from_secs(1));

        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_from_tag_config() {
        let tag = TagConfig {
            baud_rate: 57600,
            read_timeout_ms: 250,
            ..Default::default()
        };
        let config = PortConfig::from_tag_config("/dev/ttyUSB1", &tag);
        assert_eq!(config.port_path, "/dev/ttyUSB1");
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialConnection::open(PortConfig::new("/dev/does-not-exist-uwb"));
        assert!(matches!(result, Err(TagError::Serial(_))));
    }
}
