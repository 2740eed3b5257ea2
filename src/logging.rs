//! Timestamped logging
//!
//! Status lines (port ready/busy/closed, parse failures) are meant for an
//! operator watching the terminal, so every record carries a local
//! wall-clock prefix and optionally the UTC time as well.

use chrono::{Local, Utc};
use std::io::Write;

/// Build the log prefix, e.g. `[2024-05-01 12:00:00.123456 local] `
pub fn timestamp_prefix(include_utc: bool) -> String {
    let local = format!("[{} local] ", Local::now().format("%Y-%m-%d %H:%M:%S%.6f"));
    if include_utc {
        format!("{}[{} UTC] ", local, Utc::now().format("%Y-%m-%d %H:%M:%S"))
    } else {
        local
    }
}

/// Initialize env_logger with the timestamp formatter.
///
/// `RUST_LOG` still wins over the default level.
pub fn init(verbose: bool, include_utc: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(move |buf, record| {
            writeln!(
                buf,
                "{}{}: {}",
                timestamp_prefix(include_utc),
                record.level(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_prefix_shape() {
        let prefix = timestamp_prefix(false);
        assert!(prefix.starts_with('['));
        assert!(prefix.ends_with(" local] "));
        // "[YYYY-MM-DD HH:MM:SS.ffffff local] "
        assert_eq!(prefix.len(), 1 + 26 + " local] ".len());
    }

    #[test]
    fn test_utc_prefix() {
        let prefix = timestamp_prefix(true);
        assert!(prefix.contains(" local] ["));
        assert!(prefix.ends_with(" UTC] "));
    }
}
