// src/transmit.rs
//
// Transmission dispatcher: one payload in, exactly one transport write out,
// and a one-line outcome for the operator.
//
// There is no retry logic. A failed or short write is reported and the
// caller moves on; an armed repeat simply tries again at its next tick.

use crate::io::codec::{clamp_can_payload, format_can_id};
use crate::io::{Outbound, Transport};
use crate::parser::{Payload, PayloadBody};

// ============================================================================
// Types
// ============================================================================

/// Where a payload goes, resolved from the current settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    Serial { append_crlf: bool },
    Can { default_id: u32 },
}

/// Result of one transmission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub ok: bool,
    /// `TX[..]` on success, `TX FAILED[..]: reason` on failure
    pub descriptor: String,
    pub error: Option<String>,
}

impl Outcome {
    fn sent(tag: String) -> Self {
        Self {
            ok: true,
            descriptor: format!("TX[{}]", tag),
            error: None,
        }
    }

    pub(crate) fn failed(tag: String, reason: impl std::fmt::Display) -> Self {
        let reason = reason.to_string();
        Self {
            ok: false,
            descriptor: format!("TX FAILED[{}]: {}", tag, reason),
            error: Some(reason),
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Send `payload` once
pub fn send(transport: &mut dyn Transport, destination: &Destination, payload: &Payload) -> Outcome {
    match *destination {
        Destination::Can { default_id } => {
            let id = payload.can_id.unwrap_or(default_id);
            let data = clamp_can_payload(payload.bytes());
            let tag = format!("ID:{} DLC:{}", format_can_id(id), data.len());
            write_all(transport, Outbound::Frame { id, data }, tag)
        }
        Destination::Serial { append_crlf } => {
            let mut bytes = payload.bytes().to_vec();
            let tag = format!("{} bytes", bytes.len());
            if let PayloadBody::Text { append_terminator: true, .. } = payload.body {
                if append_crlf {
                    bytes.extend_from_slice(b"\r\n");
                }
            }
            write_all(transport, Outbound::Bytes(&bytes), tag)
        }
    }
}

fn write_all(transport: &mut dyn Transport, out: Outbound<'_>, tag: String) -> Outcome {
    let expected = out.len();
    match transport.write(out) {
        Ok(written) if written == expected => Outcome::sent(tag),
        Ok(written) => {
            tlog!("[transmit] Short write: {} of {} bytes", written, expected);
            Outcome::failed(tag, format!("short write ({} of {} bytes)", written, expected))
        }
        Err(e) => {
            tlog!("[transmit] Write failed: {}", e);
            Outcome::failed(tag, e)
        }
    }
}
