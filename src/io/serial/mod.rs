// src/io/serial/mod.rs
//
// Serial port driver.
//
// The line is an unstructured byte stream: writes go out as-is and reads
// return whatever bytes are pending, one chunk per wake-up.

mod port;
pub(crate) mod utils;

pub use port::{list_serial_ports, SerialPortInfo, SerialTransport};
pub use utils::{check_baud_rate, FlowControl, Parity};
