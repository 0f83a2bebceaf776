// src/io/types.rs
//
// Shared types exchanged between the transports and the terminal core.

use serde::{Deserialize, Serialize};

use super::codec::{encode_display, format_can_id};

/// Which kind of transport the terminal talks to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    #[default]
    Serial,
    Can,
}

impl std::fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceType::Serial => write!(f, "SERIAL"),
            InterfaceType::Can => write!(f, "CAN"),
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// One transport write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outbound<'a> {
    /// Unstructured bytes for a serial line
    Bytes(&'a [u8]),
    /// A classic CAN data frame (at most 8 data bytes)
    Frame { id: u32, data: &'a [u8] },
}

impl Outbound<'_> {
    /// Number of payload bytes a complete write accounts for
    pub fn len(&self) -> usize {
        match self {
            Outbound::Bytes(b) => b.len(),
            Outbound::Frame { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// A CAN frame read from the bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub id: u32,
    pub is_extended: bool,
    pub data: Vec<u8>,
}

/// Data read from a transport in one wake-up
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Bytes(Vec<u8>),
    Frame(ReceivedFrame),
}

impl Inbound {
    /// Operator-facing echo line
    pub fn describe(&self) -> String {
        match self {
            Inbound::Bytes(bytes) => {
                format!("RX[{} bytes]: {}", bytes.len(), encode_display(bytes))
            }
            Inbound::Frame(frame) => format!(
                "RX[ID:{} DLC:{}]: {}",
                format_can_id(frame.id),
                frame.data.len(),
                encode_display(&frame.data)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_describe_serial() {
        let rx = Inbound::Bytes(vec![0x48, 0x69, 0x0A]);
        assert_eq!(rx.describe(), "RX[3 bytes]: 0x48 0x69 0x0A");
    }

    #[test]
    fn test_inbound_describe_can() {
        let rx = Inbound::Frame(ReceivedFrame {
            id: 0x123,
            is_extended: false,
            data: vec![0xAA, 0xBB],
        });
        assert_eq!(rx.describe(), "RX[ID:0x123 DLC:2]: 0xAA 0xBB");
    }

    #[test]
    fn test_outbound_len() {
        assert_eq!(Outbound::Bytes(&[1, 2, 3]).len(), 3);
        assert_eq!(Outbound::Frame { id: 1, data: &[9] }.len(), 1);
        assert!(Outbound::Bytes(&[]).is_empty());
    }
}
