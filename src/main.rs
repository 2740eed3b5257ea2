//! uwb-tag
//!
//! Command line front end for a DWM1001 UWB tag on a serial port.
//!
//! # Usage
//!
//! ```bash
//! # List serial ports, marking DWM1001-DEV boards
//! uwb-tag ports
//!
//! # Print the tag's PAN id, address and update rate
//! uwb-tag info -p /dev/serial0
//!
//! # Stream decoded positions until Ctrl+C / SIGTERM
//! uwb-tag stream -p /dev/ttyACM0 --json
//!
//! # Decode a captured line
//! uwb-tag decode "DIST,1,AN0,022E,7.94,8.03,0.00,3.44,POS,6.95,5.37,-1.97,52"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uwb_tag::config::TagConfig;
use uwb_tag::lock::{install_termination_handler, PortGuard};
use uwb_tag::serial::{discovery, PortConfig, ShellPort};
use uwb_tag::telemetry::{parse_telemetry, Telemetry};
use uwb_tag::{logging, shell};

/// DWM1001 UWB tag shell utility
#[derive(Parser)]
#[command(name = "uwb-tag")]
#[command(version = "0.1.0")]
#[command(about = "Query and stream a DWM1001 UWB tag over its UART shell")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Add UTC time to log timestamps
    #[arg(long, global = true)]
    utc: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports and tag candidates
    Ports {
        /// Also open each candidate to check it is usable
        #[arg(long)]
        check: bool,
    },

    /// Initialize the shell and print system info
    Info {
        /// Serial port path (auto-detected if omitted)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (overrides config)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Streaming detection window in milliseconds (overrides config)
        #[arg(long)]
        window_ms: Option<u64>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream and decode location reports
    Stream {
        /// Serial port path (auto-detected if omitted)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (overrides config)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Streaming detection window in milliseconds (overrides config)
        #[arg(long)]
        window_ms: Option<u64>,

        /// Stop after this many decoded records
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Decode a single telemetry line
    Decode {
        /// CSV line as printed by the tag
        line: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a configuration file with default values
    GenerateConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.utc);

    if let Err(e) = run(cli) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.config {
        Some(ref path) => TagConfig::load(path)?,
        None => TagConfig::default(),
    };

    // commands that hold the port release it on SIGINT/SIGTERM
    let running = if matches!(cli.command, Commands::Info { .. } | Commands::Stream { .. }) {
        install_termination_handler()?
    } else {
        Arc::new(AtomicBool::new(true))
    };

    match cli.command {
        Commands::Ports { check } => handle_ports(&config, check),

        Commands::Info {
            port,
            baud,
            window_ms,
            json,
        } => {
            apply_overrides(&mut config, port, baud, window_ms)?;
            handle_info(&config, json, &running)
        }

        Commands::Stream {
            port,
            baud,
            window_ms,
            count,
            json,
        } => {
            apply_overrides(&mut config, port, baud, window_ms)?;
            handle_stream(&config, count, json, &running)
        }

        Commands::Decode { line, json } => {
            let telemetry = parse_telemetry(&line)?;
            print_telemetry(&telemetry, json)
        }

        Commands::GenerateConfig { output } => {
            let text = config.to_toml()?;
            if let Some(path) = output {
                std::fs::write(&path, &text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!(
                    "{} Config written to {}",
                    "[OK]".green().bold(),
                    path.display()
                );
            } else {
                print!("{}", text);
            }
            Ok(())
        }
    }
}

fn apply_overrides(
    config: &mut TagConfig,
    port: Option<String>,
    baud: Option<u32>,
    window_ms: Option<u64>,
) -> Result<()> {
    if port.is_some() {
        config.port = port;
    }
    if let Some(baud) = baud {
        config.baud_rate = baud;
    }
    if let Some(window_ms) = window_ms {
        config.timing.report_window_ms = window_ms;
    }
    config.validate()?;
    Ok(())
}

/// Configured port, else a J-Link board, else the first candidate that opens
fn resolve_port(config: &TagConfig) -> Result<String> {
    if let Some(ref port) = config.port {
        return Ok(port.clone());
    }

    if let Ok(jlink) = discovery::detect_jlink_ports() {
        if let Some(port) = jlink.into_iter().next() {
            log::info!("Auto-detected DWM1001-DEV at {}", port.path);
            return Ok(port.path);
        }
    }

    let ports = discovery::locate_tag_ports(config.baud_rate)?;
    Ok(ports[0].clone())
}

fn open_tag(config: &TagConfig) -> Result<PortGuard> {
    let path = resolve_port(config)?;
    let port = PortGuard::open(PortConfig::from_tag_config(&path, config))?;
    Ok(port)
}

fn handle_ports(config: &TagConfig, check: bool) -> Result<()> {
    discovery::print_ports()?;

    let candidates = discovery::candidate_ports()?;
    println!("\n{}", "Tag candidates:".cyan().bold());
    if candidates.is_empty() {
        println!("  {}", "none".yellow());
    }
    for path in &candidates {
        println!("  {}", path);
    }

    if check {
        let usable = discovery::locate_tag_ports(config.baud_rate)?;
        println!("\n{}", "Usable:".green().bold());
        for path in usable {
            println!("  {}", path.white().bold());
        }
    }

    Ok(())
}

fn handle_info(config: &TagConfig, json: bool, running: &AtomicBool) -> Result<()> {
    let mut port = open_tag(config)?;

    shell::initialize(&mut port, &config.timing)?;
    if port.release_if_stopped(running) {
        return Ok(());
    }

    let info = shell::query_system_info(&mut port, &config.timing)?;
    if port.release_if_stopped(running) {
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{}", "UWB Tag System Info".cyan().bold());
        println!("  Port:        {}", port.path().white());
        println!("  PAN ID:      {}", info.pan_id.white().bold());
        println!("  Device ID:   {}", info.device_id.white().bold());
        println!("  Update rate: {}", info.upd_rate);
    }

    port.release();
    Ok(())
}

fn handle_stream(
    config: &TagConfig,
    count: Option<usize>,
    json: bool,
    running: &AtomicBool,
) -> Result<()> {
    let mut port = open_tag(config)?;

    shell::initialize(&mut port, &config.timing)?;
    if port.release_if_stopped(running) {
        return Ok(());
    }
    shell::start_reporting(&mut port, &config.timing)?;
    log::info!("Streaming from {}", port.name());

    let mut decoded = 0usize;
    while running.load(Ordering::SeqCst) {
        let Some(line) = port.read_line()? else {
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_telemetry(&line) {
            Ok(telemetry) => {
                print_telemetry(&telemetry, json)?;
                decoded += 1;
                if count.map_or(false, |n| decoded >= n) {
                    break;
                }
            }
            Err(e) => log::debug!("skipping {:?}: {}", line, e),
        }
    }

    if !port.release_if_stopped(running) {
        shell::pause_reporting(&mut port, &config.timing)?;
        port.release();
    }

    log::info!("{} records decoded", decoded);
    Ok(())
}

fn print_telemetry(telemetry: &Telemetry, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(telemetry)?);
        return Ok(());
    }

    match telemetry {
        Telemetry::Report(report) => {
            for (label, anchor) in report.iter() {
                println!(
                    "  {} {} at {} dist {:.2} m",
                    label.cyan(),
                    anchor.anchor_id.dimmed(),
                    anchor.position(),
                    anchor.distance
                );
            }
            println!(
                "{} {} quality {}",
                "est".green().bold(),
                report.estimated_position(),
                report.quality()
            );
        }
        Telemetry::Position { position, quality } => {
            println!("{} {} quality {}", "pos".green().bold(), position, quality);
        }
    }
    Ok(())
}
