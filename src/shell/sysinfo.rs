//! `si` system info query
//!
//! The reply is free-form log text. Only three values are pulled out, each
//! by fixed literal tokens around it:
//!
//! ```text
//! [000014.560 INF] uwb0: panid=x1788 addr=xDECA2C9A5B3C0A9D
//! [000014.600 INF] cfg: ... upd_rate_stat=10 label=DW0A9D
//! ```

use super::commands::SYSTEM_INFO;
use super::session::{is_reporting, pause_reporting};
use crate::config::ShellTiming;
use crate::error::{Result, TagError};
use crate::serial::ShellPort;
use serde::Serialize;
use std::fmt;
use std::thread::sleep;

const PAN_ID_LEN: usize = 5;
const DEVICE_ID_LEN: usize = 17;

/// System configuration reported by the tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    /// PAN identifier, e.g. `x1788`
    pub pan_id: String,
    /// UWB address, e.g. `xDECA2C9A5B3C0A9D`
    pub device_id: String,
    /// Location update rate while stationary
    pub upd_rate: u32,
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pan_id={} device_id={} upd_rate={}",
            self.pan_id, self.device_id, self.upd_rate
        )
    }
}

/// Ask the tag for its system info.
///
/// Pauses a running location stream first. A reply that is empty or
/// malformed (tag not settled, wrong shell mode) fails with
/// [`TagError::Parse`]; retrying is up to the caller.
pub fn query_system_info<P: ShellPort + ?Sized>(
    port: &mut P,
    timing: &ShellTiming,
) -> Result<SystemInfo> {
    log::info!("Fetching system information of UWB...");

    if is_reporting(port, timing)? {
        pause_reporting(port, timing)?;
    }

    port.clear_input()?;
    port.write_all(SYSTEM_INFO)?;
    sleep(timing.command_delay());

    let raw = port.read_available()?;
    port.clear_input()?;

    let text = String::from_utf8_lossy(&raw);
    log::debug!("Raw system info fetched as:\n{}", text);

    parse_system_info(&text).map_err(|e| {
        log::error!("{}", e);
        e
    })
}

/// Extract [`SystemInfo`] from the text of an `si` reply
pub fn parse_system_info(text: &str) -> Result<SystemInfo> {
    let (pan_id, after_addr) =
        find_pan_id(text).ok_or(TagError::Parse { field: "pan_id" })?;

    let device_id = split_chars(after_addr, DEVICE_ID_LEN)
        .map(|(id, _)| id)
        .filter(|id| !id.contains(&['\r', '\n'][..]))
        .ok_or(TagError::Parse { field: "device_id" })?;

    let upd_rate = find_upd_rate(text).ok_or(TagError::Parse { field: "upd_rate" })?;

    Ok(SystemInfo {
        pan_id: pan_id.to_string(),
        device_id: device_id.to_string(),
        upd_rate,
    })
}

/// `panid=<5 chars><whitespace>addr=`; returns the id and the text after `addr=`
fn find_pan_id(text: &str) -> Option<(&str, &str)> {
    text.match_indices("panid=").find_map(|(idx, token)| {
        let rest = &text[idx + token.len()..];
        let (pan_id, tail) = split_chars(rest, PAN_ID_LEN)?;
        if pan_id.contains(&['\r', '\n'][..]) {
            return None;
        }

        let mut chars = tail.chars();
        if !chars.next()?.is_whitespace() {
            return None;
        }
        let after = chars.as_str().strip_prefix("addr=")?;
        Some((pan_id, after))
    })
}

/// `upd_rate_stat=<value><whitespace>label=` on a single line
fn find_upd_rate(text: &str) -> Option<u32> {
    text.match_indices("upd_rate_stat=").find_map(|(idx, token)| {
        let rest = &text[idx + token.len()..];
        let line = rest.split(&['\r', '\n'][..]).next().unwrap_or("");

        line.rmatch_indices("label=").find_map(|(label_at, _)| {
            let value = &line[..label_at];
            if !value.ends_with(char::is_whitespace) {
                return None;
            }
            value.trim().parse().ok()
        })
    })
}

/// Split after `n` characters, `None` if the text is shorter
fn split_chars(s: &str, n: usize) -> Option<(&str, &str)> {
    match s.char_indices().nth(n) {
        Some((idx, _)) => Some(s.split_at(idx)),
        None if s.chars().count() == n => Some((s, "")),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::MockPort;

    const SI_REPLY: &str = "si\r\n\
[000014.560 INF] sys: fw2 fw_ver=x01030001 cfg_ver=x00010700\r\n\
[000014.560 INF] uwb0: panid=x1788 addr=xDECA2C9A5B3C0A9D\r\n\
[000014.570 INF] mode: tn (act,twr,np,nole)\r\n\
[000014.580 INF] ble: addr=F1:04:D8:74:AE:F7\r\n\
[000014.590 INF] cfg: sl=0 ble=1 leds=1 le=1 lp=0 stat_det=1 upd_rate_norm=1 upd_rate_stat=10 label=DW0A9D\r\n\
dwm> ";

    fn fast() -> ShellTiming {
        ShellTiming {
            settle_ms: 0,
            command_delay_ms: 0,
            report_window_ms: 1,
        }
    }

    #[test]
    fn test_parse_fixture() {
        let info = parse_system_info(SI_REPLY).unwrap();
        assert_eq!(info.pan_id, "x1788");
        assert_eq!(info.device_id, "xDECA2C9A5B3C0A9D");
        assert_eq!(info.upd_rate, 10);
    }

    #[test]
    fn test_fixed_width_boundaries() {
        // five characters exactly, whitespace and addr= must follow
        let info = parse_system_info("panid=x1788 addr=0123456789ABCDEFG upd_rate_stat=1 label=X")
            .unwrap();
        assert_eq!(info.pan_id.len(), 5);
        assert_eq!(info.device_id, "0123456789ABCDEFG");

        // firmware prints the id as `x1788`; without the `x` the fifth
        // character is the space, so `addr=` no longer lines up
        assert!(matches!(
            parse_system_info("panid=1788 addr=0123456789ABCDEFG upd_rate_stat=1 label=X"),
            Err(TagError::Parse { field: "pan_id" })
        ));
    }

    #[test]
    fn test_short_device_id() {
        assert!(matches!(
            parse_system_info("panid=x1788 addr=xDECA\nupd_rate_stat=1 label=X"),
            Err(TagError::Parse { field: "device_id" })
        ));
    }

    #[test]
    fn test_upd_rate_must_be_integer() {
        let text = "panid=x1788 addr=xDECA2C9A5B3C0A9D upd_rate_stat=fast label=X";
        assert!(matches!(
            parse_system_info(text),
            Err(TagError::Parse { field: "upd_rate" })
        ));
    }

    #[test]
    fn test_upd_rate_label_on_next_line() {
        let text = "panid=x1788 addr=xDECA2C9A5B3C0A9D upd_rate_stat=10\nlabel=X";
        assert!(matches!(
            parse_system_info(text),
            Err(TagError::Parse { field: "upd_rate" })
        ));
    }

    #[test]
    fn test_empty_reply() {
        assert!(matches!(
            parse_system_info(""),
            Err(TagError::Parse { field: "pan_id" })
        ));
    }

    #[test]
    fn test_query_pauses_stream_and_sends_si() {
        let mut port = MockPort::streaming().respond(SYSTEM_INFO, SI_REPLY.as_bytes());
        let info = query_system_info(&mut port, &fast()).unwrap();

        assert_eq!(info.pan_id, "x1788");
        assert!(!port.streaming);
        assert_eq!(port.written.last().unwrap(), &SYSTEM_INFO.to_vec());
        assert!(port.input.is_empty());
    }

    #[test]
    fn test_query_silent_tag_is_parse_error() {
        let mut port = MockPort::new();
        let err = query_system_info(&mut port, &fast()).unwrap_err();
        assert!(matches!(err, TagError::Parse { .. }));
    }
}
