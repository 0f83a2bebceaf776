// src/cli.rs
//
// Command line options. Options that map onto a persisted setting are
// applied to the loaded settings and saved.

use clap::Parser;
use std::path::PathBuf;

use crate::io::serial::{check_baud_rate, FlowControl, Parity};
use crate::io::socketcan::parse_filter;
use crate::io::InterfaceType;
use crate::parser::{parse_interval_ms, InputMode, MIN_INTERVAL_MS};
use crate::repeat::PresetSlot;
use crate::settings::Settings;

/// Interactive terminal for serial lines and SocketCAN interfaces
#[derive(Parser, Debug, Default)]
#[command(name = "busterm", version, about)]
pub struct Args {
    /// Serial device path (selects the serial interface)
    #[arg(short = 'd', short_alias = 'D', long)]
    pub device: Option<String>,

    /// Serial baud rate
    #[arg(short = 'b', long)]
    pub baud: Option<u32>,

    /// Serial data bits (5-8)
    #[arg(short = 'i', long = "databits", value_parser = clap::value_parser!(u8).range(5..=8))]
    pub data_bits: Option<u8>,

    /// Serial parity: N, E or O
    #[arg(short = 'p', long, value_parser = parse_parity)]
    pub parity: Option<Parity>,

    /// Serial stop bits (1 or 2)
    #[arg(short = 's', long = "stop", value_parser = clap::value_parser!(u8).range(1..=2))]
    pub stop_bits: Option<u8>,

    /// Serial flow control: none, hardware or software
    #[arg(short = 'f', long, value_parser = parse_flow)]
    pub flow: Option<FlowControl>,

    /// CAN interface name (selects the CAN interface)
    #[arg(short = 'c', long = "can", value_name = "IFACE")]
    pub can_interface: Option<String>,

    /// CAN bitrate in bits/second
    #[arg(long = "canbitrate")]
    pub can_bitrate: Option<u32>,

    /// Default CAN transmit id, e.g. 0x123
    #[arg(long = "canid")]
    pub can_id: Option<String>,

    /// CAN receive filter in hex, ID:MASK
    #[arg(long, value_name = "ID:MASK")]
    pub filter: Option<String>,

    /// Interpret typed lines as hex bytes
    #[arg(long, conflicts_with = "normal")]
    pub hex: bool,

    /// Send typed lines as text
    #[arg(long)]
    pub normal: bool,

    /// Append CR LF to text lines
    #[arg(long, conflicts_with = "no_crlf")]
    pub crlf: bool,

    /// Do not append CR LF to text lines
    #[arg(long = "no-crlf")]
    pub no_crlf: bool,

    /// Send preset N (1-10) once and exit
    #[arg(long, value_name = "N", value_parser = parse_slot)]
    pub preset: Option<PresetSlot>,

    /// Start repeating preset N every MS milliseconds
    #[arg(long, value_name = "N,MS", value_parser = parse_repeat)]
    pub repeat: Option<(PresetSlot, u32)>,

    /// Use the CAN interface as already configured
    #[arg(long)]
    pub skip_can_setup: bool,

    /// Settings file (default: <config dir>/busterm/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write the log to a timestamped file in DIR
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

fn parse_parity(s: &str) -> Result<Parity, String> {
    Parity::parse(s).ok_or_else(|| format!("invalid parity '{}' (N, E or O)", s))
}

fn parse_flow(s: &str) -> Result<FlowControl, String> {
    FlowControl::parse(s).ok_or_else(|| format!("invalid flow control '{}'", s))
}

fn parse_slot(s: &str) -> Result<PresetSlot, String> {
    s.trim()
        .parse::<u8>()
        .ok()
        .and_then(PresetSlot::new)
        .ok_or_else(|| format!("invalid preset '{}' (1-10)", s))
}

fn parse_repeat(s: &str) -> Result<(PresetSlot, u32), String> {
    let (slot, ms) = s
        .split_once(',')
        .ok_or_else(|| format!("invalid repeat '{}' (expected N,MS)", s))?;
    let slot = parse_slot(slot)?;
    let ms = parse_interval_ms(ms.trim())
        .ok_or_else(|| format!("invalid interval '{}' (integer >= {} ms)", ms, MIN_INTERVAL_MS))?;
    Ok((slot, ms))
}

impl Args {
    /// Apply persisted overrides. Returns whether anything changed.
    pub fn apply(&self, settings: &mut Settings) -> Result<bool, String> {
        let before = settings.clone();

        if let Some(device) = &self.device {
            settings.serial.device = device.clone();
            settings.interface = InterfaceType::Serial;
        }
        if let Some(baud) = self.baud {
            settings.serial.baud = check_baud_rate(baud)?;
        }
        if let Some(bits) = self.data_bits {
            settings.serial.data_bits = bits;
        }
        if let Some(parity) = self.parity {
            settings.serial.parity = parity;
        }
        if let Some(bits) = self.stop_bits {
            settings.serial.stop_bits = bits;
        }
        if let Some(flow) = self.flow {
            settings.serial.flow = flow;
        }
        if let Some(iface) = &self.can_interface {
            settings.can.interface = iface.clone();
            settings.interface = InterfaceType::Can;
        }
        if let Some(bitrate) = self.can_bitrate {
            settings.can.bitrate = bitrate;
        }
        if let Some(id) = &self.can_id {
            settings.can.tx_id = id.clone();
        }
        if let Some(filter) = &self.filter {
            if filter.eq_ignore_ascii_case("none") {
                settings.can.filter = None;
            } else {
                parse_filter(filter)?;
                settings.can.filter = Some(filter.clone());
            }
        }
        if self.hex {
            settings.mode = InputMode::Hex;
        } else if self.normal {
            settings.mode = InputMode::Text;
        }
        if self.crlf {
            settings.crlf = true;
        } else if self.no_crlf {
            settings.crlf = false;
        }

        Ok(*settings != before)
    }
}
