// src/io/codec.rs
//
// Conversions between operator-typed tokens and byte payloads.
//
// Everything here is stateless and total: malformed input is reported through
// CodecError, never by panicking.

use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Maximum data length of a classic CAN frame
pub const CAN_MAX_DATA: usize = 8;

/// Highest 11-bit standard identifier
pub const CAN_SFF_MAX: u32 = 0x7FF;

/// Highest 29-bit extended identifier
pub const CAN_EFF_MAX: u32 = 0x1FFF_FFFF;

// ============================================================================
// Errors
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("odd number of hex digits")]
    OddLength,
    #[error("invalid hex digits '{0}'")]
    InvalidDigit(String),
}

// ============================================================================
// Hex payloads
// ============================================================================

/// Decode a hex string into bytes. Whitespace anywhere is ignored, so
/// `"AB CD"`, `"ABCD"` and `"A B C D"` all decode to `[0xAB, 0xCD]`.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let chars: Vec<char> = compact.chars().collect();

    if chars.len() % 2 != 0 {
        return Err(CodecError::OddLength);
    }

    if let Some(pair) = chars
        .chunks(2)
        .find(|pair| !pair.iter().all(|c| c.is_ascii_hexdigit()))
    {
        return Err(CodecError::InvalidDigit(pair.iter().collect()));
    }

    hex::decode(&compact).map_err(|_| CodecError::InvalidDigit(compact.clone()))
}

/// Check that a token is exactly one byte written as two hex digits.
pub fn decode_hex_byte(token: &str) -> Option<u8> {
    if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}

/// Render bytes as space-separated `0xHH` values for inbound echo.
pub fn encode_display(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// CAN helpers
// ============================================================================

/// Limit a payload to what fits in a classic CAN frame.
pub fn clamp_can_payload(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(CAN_MAX_DATA)]
}

/// Parse a CAN identifier written as `0x` followed by one or more hex digits.
///
/// Identifiers wider than 29 bits are rejected.
pub fn parse_can_id(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))?;
    parse_hex_digits(digits)
}

/// Like `parse_can_id`, but the `0x` prefix is optional.
pub fn parse_hex_u32(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    parse_hex_digits(digits)
}

fn parse_hex_digits(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16)
        .ok()
        .filter(|id| *id <= CAN_EFF_MAX)
}

/// Format a CAN id the way every TX/RX line shows it
pub fn format_can_id(id: u32) -> String {
    format!("0x{:03X}", id)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hex_ignores_whitespace_placement() {
        let expected = vec![0xAB, 0xCD];
        assert_eq!(decode_hex("AB CD").unwrap(), expected);
        assert_eq!(decode_hex("ABCD").unwrap(), expected);
        assert_eq!(decode_hex(" A B\tC D ").unwrap(), expected);
        assert_eq!(decode_hex("abcd").unwrap(), expected);
    }

    #[test]
    fn test_decode_hex_empty_input() {
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("   ").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_hex_odd_length() {
        assert_eq!(decode_hex("ABC"), Err(CodecError::OddLength));
        assert_eq!(decode_hex("A BC D E"), Err(CodecError::OddLength));
    }

    #[test]
    fn test_decode_hex_invalid_digit() {
        assert_eq!(decode_hex("GG"), Err(CodecError::InvalidDigit("GG".to_string())));
        assert_eq!(decode_hex("AA 1Z"), Err(CodecError::InvalidDigit("1Z".to_string())));
    }

    #[test]
    fn test_decode_hex_non_ascii_never_panics() {
        assert!(decode_hex("é1").is_err());
        assert!(decode_hex("ü").is_err());
    }

    #[test]
    fn test_decode_hex_byte() {
        assert_eq!(decode_hex_byte("AA"), Some(0xAA));
        assert_eq!(decode_hex_byte("0f"), Some(0x0F));
        assert_eq!(decode_hex_byte("A"), None);
        assert_eq!(decode_hex_byte("AAB"), None);
        assert_eq!(decode_hex_byte("+1"), None);
    }

    #[test]
    fn test_encode_display() {
        assert_eq!(encode_display(&[0x01, 0xAB, 0xFF]), "0x01 0xAB 0xFF");
        assert_eq!(encode_display(&[]), "");
    }

    #[test]
    fn test_clamp_can_payload() {
        let ten: Vec<u8> = (0..10).collect();
        assert_eq!(clamp_can_payload(&ten), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(clamp_can_payload(&[1, 2]), &[1, 2]);
    }

    #[test]
    fn test_parse_can_id_requires_prefix() {
        assert_eq!(parse_can_id("0x10"), Some(0x10));
        assert_eq!(parse_can_id("0X7ff"), Some(0x7FF));
        assert_eq!(parse_can_id("10"), None);
        assert_eq!(parse_can_id("0x"), None);
        assert_eq!(parse_can_id("0xZZ"), None);
        assert_eq!(parse_can_id("0x20000000"), None);
    }

    #[test]
    fn test_parse_hex_u32_prefix_optional() {
        assert_eq!(parse_hex_u32("123"), Some(0x123));
        assert_eq!(parse_hex_u32("0x123"), Some(0x123));
        assert_eq!(parse_hex_u32(""), None);
    }
}
