//! Shell session handshake
//!
//! Detection is purely time based: a tag that never answers is not an
//! error here, later reads simply come back empty.

use super::commands::{PAUSE_STREAM, WAKE};
use crate::config::ShellTiming;
use crate::error::Result;
use crate::serial::ShellPort;
use std::thread::sleep;

/// Wake the shell and leave the tag in command mode.
///
/// The caller keeps the port inside a [`PortGuard`](crate::lock::PortGuard)
/// so it is unlocked and closed on every exit path. Returns `true` if a
/// running location stream had to be paused.
pub fn initialize<P: ShellPort + ?Sized>(port: &mut P, timing: &ShellTiming) -> Result<bool> {
    sleep(timing.settle());

    port.write_all(WAKE)?;
    sleep(timing.command_delay());
    port.clear_input()?;

    if is_reporting(port, timing)? {
        pause_reporting(port, timing)?;
        log::info!("{}: location stream paused", port.name());
        return Ok(true);
    }

    log::debug!("{}: shell ready, no location stream", port.name());
    Ok(false)
}

/// Whether the tag is streaming location data.
///
/// Samples the input buffer, waits `timing.report_window`, samples again:
/// streaming iff the byte count strictly grew.
pub fn is_reporting<P: ShellPort + ?Sized>(port: &mut P, timing: &ShellTiming) -> Result<bool> {
    let initial = port.bytes_to_read()?;
    sleep(timing.report_window());
    let last = port.bytes_to_read()?;

    sleep(timing.command_delay());
    log::debug!(
        "{}: {} -> {} bytes waiting over {:?}",
        port.name(),
        initial,
        last,
        timing.report_window()
    );
    Ok(last > initial)
}

/// Send `lec` to stop a running stream
pub fn pause_reporting<P: ShellPort + ?Sized>(port: &mut P, timing: &ShellTiming) -> Result<()> {
    port.write_all(PAUSE_STREAM)?;
    sleep(timing.command_delay());
    Ok(())
}

/// Make sure the CSV stream is running. Returns `true` if it was started here.
pub fn start_reporting<P: ShellPort + ?Sized>(port: &mut P, timing: &ShellTiming) -> Result<bool> {
    if is_reporting(port, timing)? {
        return Ok(false);
    }
    port.write_all(PAUSE_STREAM)?;
    sleep(timing.command_delay());
    Ok(true)
}

/// Whether the shell answers a wake sequence at all
pub fn is_shell_ok<P: ShellPort + ?Sized>(port: &mut P, timing: &ShellTiming) -> Result<bool> {
    port.clear_input()?;
    port.write_all(WAKE)?;
    sleep(timing.command_delay());

    if log::log_enabled!(log::Level::Debug) {
        let waiting = port.read_available()?;
        log::debug!("shell echo: {:?}", String::from_utf8_lossy(&waiting));
        return Ok(!waiting.is_empty());
    }
    Ok(port.bytes_to_read()? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::mock::MockPort;

    fn fast() -> ShellTiming {
        ShellTiming {
            settle_ms: 0,
            command_delay_ms: 0,
            report_window_ms: 1,
        }
    }

    #[test]
    fn test_initialize_pauses_stream() {
        let mut port = MockPort::streaming();
        let paused = initialize(&mut port, &fast()).unwrap();

        assert!(paused);
        assert!(!port.streaming);
        assert_eq!(port.written, vec![WAKE.to_vec(), PAUSE_STREAM.to_vec()]);
    }

    #[test]
    fn test_initialize_quiet_tag() {
        let mut port = MockPort::new();
        let paused = initialize(&mut port, &fast()).unwrap();

        assert!(!paused);
        assert_eq!(port.written, vec![WAKE.to_vec()]);
    }

    #[test]
    fn test_initialize_clears_wake_echo() {
        let mut port = MockPort::new().respond(WAKE, b"\r\ndwm> ");
        initialize(&mut port, &fast()).unwrap();
        assert!(port.input.is_empty());
    }

    #[test]
    fn test_is_reporting_needs_strict_growth() {
        let mut idle = MockPort::new();
        idle.input.extend_from_slice(b"stale bytes");
        assert!(!is_reporting(&mut idle, &fast()).unwrap());

        let mut streaming = MockPort::streaming();
        assert!(is_reporting(&mut streaming, &fast()).unwrap());
    }

    #[test]
    fn test_start_reporting_only_when_idle() {
        let mut idle = MockPort::new();
        assert!(start_reporting(&mut idle, &fast()).unwrap());
        assert!(idle.streaming);

        let mut streaming = MockPort::streaming();
        assert!(!start_reporting(&mut streaming, &fast()).unwrap());
        assert!(!streaming.wrote(PAUSE_STREAM));
    }

    #[test]
    fn test_shell_ok() {
        let mut answering = MockPort::new().respond(WAKE, b"dwm> ");
        assert!(is_shell_ok(&mut answering, &fast()).unwrap());

        let mut silent = MockPort::new();
        assert!(!is_shell_ok(&mut silent, &fast()).unwrap());
    }
}
