//! DWM1001 UART shell exchange
//!
//! The tag's shell is line oriented: a double carriage return wakes it, and
//! each command is a short ASCII word terminated by `\r`. While the tag
//! streams location reports the shell does not answer, so streaming has to
//! be paused before any query.

pub mod commands;
pub mod session;
pub mod sysinfo;

pub use session::{initialize, is_reporting, is_shell_ok, pause_reporting, start_reporting};
pub use sysinfo::{parse_system_info, query_system_info, SystemInfo};
