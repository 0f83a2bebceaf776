// src/io/mod.rs
//
// Transport abstraction for the terminal.
// A transport is either a serial line (unstructured bytes) or a SocketCAN
// interface (discrete frames). The event loop waits on the transport's file
// descriptor and calls `read_available` when it is readable.

pub mod codec;
mod error;
#[cfg(test)]
pub mod mock;
pub mod serial;
pub mod socketcan;
mod types;

use std::os::unix::io::AsRawFd;

pub use error::IoError;
pub use types::{Inbound, InterfaceType, Outbound, ReceivedFrame};

use crate::settings::Settings;

// ============================================================================
// Transport Trait
// ============================================================================

/// An open connection the terminal reads from and writes to
pub trait Transport: AsRawFd {
    fn kind(&self) -> InterfaceType;

    /// Short description for status lines, e.g. `/dev/ttyUSB0 @ 115200 baud`
    fn describe(&self) -> String;

    /// Write one unit and return how many payload bytes the device accepted.
    /// A count below `out.len()` is a short write.
    fn write(&mut self, out: Outbound<'_>) -> Result<usize, IoError>;

    /// Non-blocking read of whatever is pending. `Ok(None)` means nothing
    /// was available; an error means the transport is gone.
    fn read_available(&mut self) -> Result<Option<Inbound>, IoError>;
}

/// Open the transport selected by `settings.interface`
pub fn open_transport(settings: &Settings, configure_can: bool) -> Result<Box<dyn Transport>, IoError> {
    match settings.interface {
        InterfaceType::Serial => Ok(Box::new(serial::SerialTransport::open(&settings.serial)?)),
        InterfaceType::Can => Ok(Box::new(socketcan::CanTransport::open(
            &settings.can,
            configure_can,
        )?)),
    }
}
