// src/io/serial/port.rs
//
// Serial line transport. The port is opened through the native unix TTY
// handle so the event loop can wait on its file descriptor.

use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use serialport::{SerialPortType, TTYPort};

use super::utils::{check_baud_rate, data_bits, stop_bits};
use crate::io::error::IoError;
use crate::io::types::{Inbound, InterfaceType, Outbound};
use crate::io::Transport;
use crate::settings::SerialSettings;

/// Bytes read per wake-up
pub const READ_CHUNK: usize = 256;

/// Information about an available serial port
#[derive(Clone, Debug)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// List the serial ports the OS knows about
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, String> {
    let ports =
        serialport::available_ports().map_err(|e| format!("Failed to list serial ports: {}", e))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product) = match p.port_type {
                SerialPortType::UsbPort(info) => ("USB".to_string(), info.manufacturer, info.product),
                SerialPortType::PciPort => ("PCI".to_string(), None, None),
                SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None, None),
                SerialPortType::Unknown => ("Unknown".to_string(), None, None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
            }
        })
        .collect())
}

// ============================================================================
// Serial Transport
// ============================================================================

pub struct SerialTransport {
    port: TTYPort,
    device: String,
    baud_rate: u32,
}

impl SerialTransport {
    /// Open and configure the port described by `config`
    pub fn open(config: &SerialSettings) -> Result<Self, IoError> {
        let baud_rate =
            check_baud_rate(config.baud).map_err(|e| IoError::connection(&config.device, e))?;

        let port = serialport::new(&config.device, baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(config.stop_bits))
            .parity(config.parity.into())
            .flow_control(config.flow.into())
            .timeout(Duration::from_millis(1))
            .open_native()
            .map_err(|e| IoError::connection(&config.device, e.to_string()))?;

        tlog!(
            "[serial] Opened {} at {} baud ({}-{}-{}, flow {})",
            config.device,
            baud_rate,
            config.data_bits,
            config.parity.letter(),
            config.stop_bits,
            config.flow.name()
        );

        Ok(Self {
            port,
            device: config.device.clone(),
            baud_rate,
        })
    }
}

impl Transport for SerialTransport {
    fn kind(&self) -> InterfaceType {
        InterfaceType::Serial
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.device, self.baud_rate)
    }

    fn write(&mut self, out: Outbound<'_>) -> Result<usize, IoError> {
        let bytes = match out {
            Outbound::Bytes(b) => b,
            Outbound::Frame { .. } => {
                return Err(IoError::Unsupported(
                    "Serial ports do not carry CAN frames".to_string(),
                ));
            }
        };
        if bytes.is_empty() {
            return Ok(0);
        }

        let written = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(written)
    }

    fn read_available(&mut self) -> Result<Option<Inbound>, IoError> {
        let mut buf = [0u8; READ_CHUNK];
        match self.port.read(&mut buf) {
            Ok(0) => Err(IoError::connection(&self.device, "Device disconnected")),
            Ok(n) => Ok(Some(Inbound::Bytes(buf[..n].to_vec()))),
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(IoError::connection(&self.device, format!("Read error: {}", e))),
        }
    }
}

impl AsRawFd for SerialTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.port.as_raw_fd()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        tlog!("[serial] Closed {}", self.device);
    }
}
