// src/io/socketcan/codec.rs
//
// Platform-independent helpers for the SocketCAN driver: receive filter
// parsing, identifier classification and `ip link` argument validation.

use crate::io::codec::{parse_hex_u32, CAN_EFF_MAX, CAN_SFF_MAX};

/// A receive filter in `id:mask` form
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterSpec {
    pub id: u32,
    pub mask: u32,
}

/// Parse `id:mask` (both hex, `0x` optional)
pub fn parse_filter(s: &str) -> Result<FilterSpec, String> {
    let (id, mask) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("Invalid filter '{}': expected ID:MASK", s))?;

    let id = parse_hex_u32(id).ok_or_else(|| format!("Invalid filter id '{}'", id))?;
    let mask = parse_hex_u32(mask).ok_or_else(|| format!("Invalid filter mask '{}'", mask))?;

    if id > CAN_EFF_MAX || mask > CAN_EFF_MAX {
        return Err(format!("Invalid filter '{}': value out of range", s));
    }
    Ok(FilterSpec { id, mask })
}

/// Identifiers above the 11-bit range go out as extended frames
pub fn is_extended_id(id: u32) -> bool {
    id > CAN_SFF_MAX
}

/// Interface names are passed to a privileged shell, so only letters and
/// digits are accepted.
pub fn validate_interface_name(name: &str) -> Result<(), String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Invalid CAN interface name '{}'", name));
    }
    Ok(())
}

pub fn validate_bitrate(bitrate: &str) -> Result<u32, String> {
    if bitrate.is_empty() || !bitrate.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Invalid CAN bitrate '{}'", bitrate));
    }
    bitrate
        .parse::<u32>()
        .ok()
        .filter(|b| *b > 0)
        .ok_or_else(|| format!("Invalid CAN bitrate '{}'", bitrate))
}
