//! Error types for tag communication
//!
//! Every routine in this crate is a single-shot request/response primitive:
//! failures propagate straight to the caller, which owns any retry policy.

use std::io;
use thiserror::Error;

/// Errors raised while locating, locking or talking to a tag
#[derive(Debug, Error)]
pub enum TagError {
    /// Port discovery is not implemented for this operating system
    #[error("unsupported platform for serial port discovery: {0}")]
    Platform(String),

    /// No candidate serial port could be opened
    #[error("no usable serial port found for the UWB tag")]
    NoPort,

    /// Another process holds the advisory lock on the port
    #[error("port {path} is busy: another process is accessing it")]
    PortBusy { path: String },

    /// The port guard was already released
    #[error("serial port {path} is closed")]
    PortClosed { path: String },

    /// A field could not be extracted from a shell reply
    #[error("failed to parse {field} from shell response")]
    Parse { field: &'static str },

    /// A telemetry line does not follow the CSV report layout
    #[error("malformed telemetry line: {0}")]
    Format(String),

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TagError {
    /// Wrap an I/O error with a short description of the failed operation
    pub fn io(context: &'static str, source: io::Error) -> Self {
        TagError::Io { context, source }
    }

    /// True when the error means another process owns the port
    pub fn is_busy(&self) -> bool {
        matches!(self, TagError::PortBusy { .. })
    }
}

/// Result type for tag operations
pub type Result<T> = std::result::Result<T, TagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TagError::PortBusy {
            path: "/dev/serial0".to_string(),
        };
        assert!(err.is_busy());
        assert_eq!(
            err.to_string(),
            "port /dev/serial0 is busy: another process is accessing it"
        );

        let err = TagError::Parse { field: "pan_id" };
        assert_eq!(err.to_string(), "failed to parse pan_id from shell response");
        assert!(!err.is_busy());
    }

    #[test]
    fn test_io_context() {
        let err = TagError::io(
            "Failed to write to serial port",
            io::Error::new(io::ErrorKind::BrokenPipe, "gone"),
        );
        assert_eq!(err.to_string(), "Failed to write to serial port: gone");
    }
}
