// src/io/serial/utils.rs
//
// Line settings for the serial driver and their conversions to the
// serialport crate's types.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl as SpFlowControl, Parity as SpParity, StopBits};

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Parity {
    /// Parse `N`/`E`/`O` or the spelled-out names, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "n" | "none" => Some(Parity::None),
            "o" | "odd" => Some(Parity::Odd),
            "e" | "even" => Some(Parity::Even),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Flow control setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    Software,
}

impl FlowControl {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(FlowControl::None),
            "hardware" | "rtscts" => Some(FlowControl::Hardware),
            "software" | "xonxoff" => Some(FlowControl::Software),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlowControl::None => "none",
            FlowControl::Hardware => "hardware",
            FlowControl::Software => "software",
        }
    }
}

/// Baud rates the terminal accepts
pub const SUPPORTED_BAUD_RATES: [u32; 22] = [
    300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 500000, 576000,
    921600, 1000000, 1152000, 1500000, 2000000, 2500000, 3000000, 3500000, 4000000,
];

/// Validate a baud rate against the supported table
pub fn check_baud_rate(baud: u32) -> Result<u32, String> {
    if SUPPORTED_BAUD_RATES.contains(&baud) {
        Ok(baud)
    } else {
        Err(format!("Unsupported baud rate: {}", baud))
    }
}

// ============================================================================
// serialport Conversions
// ============================================================================

impl From<Parity> for SpParity {
    fn from(p: Parity) -> Self {
        match p {
            Parity::None => SpParity::None,
            Parity::Odd => SpParity::Odd,
            Parity::Even => SpParity::Even,
        }
    }
}

impl From<FlowControl> for SpFlowControl {
    fn from(f: FlowControl) -> Self {
        match f {
            FlowControl::None => SpFlowControl::None,
            FlowControl::Hardware => SpFlowControl::Hardware,
            FlowControl::Software => SpFlowControl::Software,
        }
    }
}

/// Anything outside 5..=7 is eight data bits
pub fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

pub fn stop_bits(bits: u8) -> StopBits {
    if bits == 2 {
        StopBits::Two
    } else {
        StopBits::One
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_parse_and_letter() {
        for (input, parity) in [("N", Parity::None), ("e", Parity::Even), ("Odd", Parity::Odd)] {
            assert_eq!(Parity::parse(input), Some(parity));
        }
        assert_eq!(Parity::parse("x"), None);
        assert_eq!(Parity::Even.letter(), 'E');
        assert_eq!(Parity::default(), Parity::None);
    }

    #[test]
    fn test_flow_control_aliases() {
        assert_eq!(FlowControl::parse("RTSCTS"), Some(FlowControl::Hardware));
        assert_eq!(FlowControl::parse("xonxoff"), Some(FlowControl::Software));
        assert_eq!(FlowControl::parse("both"), None);
        assert_eq!(FlowControl::Software.name(), "software");
    }

    #[test]
    fn test_check_baud_rate() {
        assert_eq!(check_baud_rate(115200), Ok(115200));
        assert_eq!(check_baud_rate(4000000), Ok(4000000));
        assert_eq!(check_baud_rate(12345), Err("Unsupported baud rate: 12345".to_string()));
    }

    #[test]
    fn test_line_settings_reach_serialport() {
        assert_eq!(SpParity::from(Parity::Odd), SpParity::Odd);
        assert_eq!(SpFlowControl::from(FlowControl::Hardware), SpFlowControl::Hardware);
        assert_eq!(data_bits(7), DataBits::Seven);
        assert_eq!(data_bits(9), DataBits::Eight);
        assert_eq!(stop_bits(2), StopBits::Two);
        assert_eq!(stop_bits(0), StopBits::One);
    }
}
