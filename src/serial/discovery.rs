//! Serial port discovery for the DWM1001 tag
//!
//! Candidate paths follow each OS's device naming:
//! - Raspberry Pi hat: the UART is exposed as `/dev/serial0`
//! - other Linux hosts: every `/dev/tty[A-Za-z]*` node
//! - macOS: the J-Link CDC port shows up as `/dev/tty.usbmodem*`
//! - Windows: whatever COM ports the system enumerates

use crate::error::{Result, TagError};
use crate::serial::{PortConfig, SerialConnection};
use colored::Colorize;
use std::path::Path;
use walkdir::WalkDir;

/// SEGGER J-Link vendor ID, the USB bridge on the DWM1001-DEV board
pub const JLINK_VID: u16 = 0x1366;

/// UART device on a Raspberry Pi with the serial overlay enabled
pub const RPI_SERIAL_PORT: &str = "/dev/serial0";

/// A port the OS enumerates, reduced to what identifies a tag board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub path: String,
    /// USB vendor id; `None` for UART, PCI and Bluetooth ports
    pub vid: Option<u16>,
    /// Product and manufacturer strings reported by the USB bridge
    pub description: Option<String>,
}

impl PortInfo {
    pub fn is_jlink(&self) -> bool {
        self.vid == Some(JLINK_VID)
    }
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(port: serialport::SerialPortInfo) -> Self {
        let (vid, description) = match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let description = match (usb.product, usb.manufacturer) {
                    (Some(product), Some(mfg)) => Some(format!("{} ({})", product, mfg)),
                    (product, mfg) => product.or(mfg),
                };
                (Some(usb.vid), description)
            }
            serialport::SerialPortType::BluetoothPort => (None, Some("Bluetooth".to_string())),
            serialport::SerialPortType::PciPort | serialport::SerialPortType::Unknown => {
                (None, None)
            }
        };

        Self {
            path: port.port_name,
            vid,
            description,
        }
    }
}

/// List all serial ports the OS enumerates
pub fn list_ports() -> Result<Vec<PortInfo>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(PortInfo::from)
        .collect())
}

/// Ports whose USB bridge is a J-Link, i.e. a DWM1001-DEV board
pub fn detect_jlink_ports() -> Result<Vec<PortInfo>> {
    Ok(list_ports()?.into_iter().filter(PortInfo::is_jlink).collect())
}

/// Candidate device paths for the tag on this platform
pub fn candidate_ports() -> Result<Vec<String>> {
    if cfg!(target_os = "linux") {
        if is_raspberry_pi() {
            return Ok(vec![RPI_SERIAL_PORT.to_string()]);
        }
        Ok(scan_dev(Path::new("/dev"), is_linux_tty))
    } else if cfg!(target_os = "macos") {
        Ok(scan_dev(Path::new("/dev"), |name| {
            name.starts_with("tty.usbmodem")
        }))
    } else if cfg!(windows) {
        Ok(list_ports()?.into_iter().map(|p| p.path).collect())
    } else {
        Err(TagError::Platform(std::env::consts::OS.to_string()))
    }
}

/// Open and close each candidate, keeping the ones that work.
///
/// Candidates that fail to open are logged and skipped.
pub fn locate_tag_ports(baud_rate: u32) -> Result<Vec<String>> {
    log::info!("Fetching serialport...");

    let mut usable = Vec::new();
    for path in candidate_ports()? {
        match SerialConnection::open(PortConfig::new(&path).with_baud_rate(baud_rate)) {
            Ok(conn) => {
                drop(conn);
                usable.push(path);
            }
            Err(e) => log::warn!("Wrong serial port detected for UWB tag: {} ({})", path, e),
        }
    }

    if usable.is_empty() {
        log::error!("no candidate serial port could be opened");
        return Err(TagError::NoPort);
    }

    log::info!("Serialport fetched as: {:?}", usable);
    Ok(usable)
}

/// `/dev/tty[A-Za-z]*`
fn is_linux_tty(name: &str) -> bool {
    name.strip_prefix("tty")
        .and_then(|rest| rest.chars().next())
        .map_or(false, |c| c.is_ascii_alphabetic())
}

fn scan_dev(dir: &Path, matches: impl Fn(&str) -> bool) -> Vec<String> {
    let mut ports: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_str().map_or(false, &matches))
        .map(|e| e.path().to_string_lossy().to_string())
        .collect();
    ports.sort();
    ports
}

#[cfg(unix)]
fn is_raspberry_pi() -> bool {
    let mut uts = std::mem::MaybeUninit::<libc::utsname>::uninit();
    // SAFETY: uname fills the struct on success and we only read it then
    unsafe {
        if libc::uname(uts.as_mut_ptr()) != 0 {
            return false;
        }
        let uts = uts.assume_init();
        [uts.nodename.as_ptr(), uts.machine.as_ptr(), uts.version.as_ptr()]
            .iter()
            .any(|field| {
                std::ffi::CStr::from_ptr(*field)
                    .to_string_lossy()
                    .contains("raspberrypi")
            })
    }
}

#[cfg(not(unix))]
fn is_raspberry_pi() -> bool {
    false
}

/// Print the enumerated ports, flagging DWM1001-DEV boards
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports enumerated".yellow());
        println!("  Connect the DWM1001-DEV board over USB, or enable the Pi UART");
        println!("  and add your user to the 'dialout' group.");
        return Ok(());
    }

    println!("{}", "Serial ports:".green().bold());
    for port in ports {
        let vid = port.vid.map_or_else(|| "----".to_string(), |v| format!("{:04x}", v));
        let description = port.description.as_deref().unwrap_or("");
        let marker = if port.is_jlink() {
            " [DWM1001-DEV]".green().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {} {}{}",
            format!("{:<24}", port.path).white().bold(),
            vid.dimmed(),
            description,
            marker
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_linux_tty_pattern() {
        assert!(is_linux_tty("ttyUSB0"));
        assert!(is_linux_tty("ttyACM0"));
        assert!(is_linux_tty("ttyS0"));
        assert!(!is_linux_tty("tty0"));
        assert!(!is_linux_tty("tty"));
        assert!(!is_linux_tty("serial0"));
    }

    #[test]
    fn test_scan_dev_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["ttyUSB1", "ttyACM0", "tty1", "null"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let ports = scan_dev(dir.path(), is_linux_tty);
        let names: Vec<&str> = ports
            .iter()
            .map(|p| p.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(names, vec!["ttyACM0", "ttyUSB1"]);
    }

    #[test]
    fn test_jlink_detection() {
        let port = PortInfo {
            path: "/dev/ttyACM0".to_string(),
            vid: Some(0x1366),
            description: Some("J-Link (SEGGER)".to_string()),
        };
        assert!(port.is_jlink());

        let other = PortInfo {
            vid: Some(0x0403),
            ..port
        };
        assert!(!other.is_jlink());
    }

    #[test]
    fn test_non_usb_port_has_no_vid() {
        let info = PortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: serialport::SerialPortType::PciPort,
        });
        assert_eq!(info.path, "/dev/ttyS0");
        assert_eq!(info.vid, None);
        assert!(!info.is_jlink());

        let bt = PortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/rfcomm0".to_string(),
            port_type: serialport::SerialPortType::BluetoothPort,
        });
        assert_eq!(bt.description.as_deref(), Some("Bluetooth"));
    }
}
