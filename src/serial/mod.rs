//! Serial port access for the DWM1001 tag
//!
//! This module provides functionality for:
//! - Discovering the tag's serial port on each platform
//! - Opening the UART link with the shell's settings
//! - The [`ShellPort`] seam the shell exchange is written against

pub mod discovery;
pub mod port;

#[cfg(test)]
pub mod mock;

pub use discovery::{candidate_ports, locate_tag_ports, PortInfo};
pub use port::{PortConfig, SerialConnection, ShellPort};
