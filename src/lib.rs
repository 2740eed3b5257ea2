//! DWM1001 UWB tag utilities
//!
//! Talks to a Decawave DWM1001 positioning tag over its UART shell:
//!
//! - [`serial`]: find and open the tag's serial port
//! - [`lock`]: advisory locking so one process owns the port
//! - [`shell`]: wake the shell, pause streaming, query system info
//! - [`telemetry`]: decode the CSV anchor/position reports
//!
//! ```no_run
//! use uwb_tag::{config::TagConfig, lock::PortGuard, serial::PortConfig, shell};
//!
//! # fn main() -> uwb_tag::Result<()> {
//! let config = TagConfig::default();
//! let mut port = PortGuard::open(PortConfig::from_tag_config("/dev/serial0", &config))?;
//! shell::initialize(&mut port, &config.timing)?;
//! let info = shell::query_system_info(&mut port, &config.timing)?;
//! println!("{}", info);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod serial;
pub mod shell;
pub mod telemetry;

pub use error::{Result, TagError};
pub use shell::SystemInfo;
pub use telemetry::{decode_report, parse_telemetry, AnchorReading, Position, PositionReport, Telemetry};
