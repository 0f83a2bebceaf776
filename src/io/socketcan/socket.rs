// src/io/socketcan/socket.rs
//
// SocketCAN transport for Linux native CAN interfaces.
//
// The interface can be brought up by the terminal itself (down, bitrate, up
// through pkexec) or used as already configured:
//   sudo ip link set can0 up type can bitrate 500000
//
// This module is only functional on Linux.

#[cfg(target_os = "linux")]
mod linux_impl {
    use socketcan::{
        CanDataFrame, CanFilter, CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Id,
        Socket, SocketOptions, StandardId,
    };
    use std::os::unix::io::{AsRawFd, RawFd};

    use super::super::codec::{is_extended_id, parse_filter, validate_bitrate, validate_interface_name};
    use crate::io::codec::CAN_MAX_DATA;
    use crate::io::error::IoError;
    use crate::io::types::{Inbound, InterfaceType, Outbound, ReceivedFrame};
    use crate::io::Transport;
    use crate::settings::CanSettings;

    // ============================================================================
    // Interface Configuration
    // ============================================================================

    /// Take `interface` down, set its bitrate and bring it up again, as root
    /// through pkexec.
    pub fn configure_interface(interface: &str, bitrate: u32) -> Result<(), String> {
        use std::process::Command;

        validate_interface_name(interface)?;
        let bitrate = validate_bitrate(&bitrate.to_string())?;
        tlog!("[socketcan] Setting {} to {} bit/s via pkexec", interface, bitrate);

        // `down` fails harmlessly when the link is already down
        let script = format!(
            "ip link set {0} down 2>/dev/null; ip link set {0} type can bitrate {1} && ip link set {0} up",
            interface, bitrate
        );

        let output = match Command::new("pkexec").args(["sh", "-c", &script]).output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err("pkexec not found; configure the interface manually".to_string());
            }
            Err(e) => return Err(format!("Failed to run pkexec: {}", e)),
        };
        if output.status.success() {
            tlog!("[socketcan] {} is up", interface);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match stderr.trim() {
            s if s.contains("dismissed") || s.contains("cancelled") => {
                "authentication cancelled".to_string()
            }
            s if s.contains("Not authorized") => "not authorised".to_string(),
            "" => format!("exit code {:?}", output.status.code()),
            s => s.to_string(),
        };
        Err(format!("Failed to configure {}: {}", interface, reason))
    }

    // ============================================================================
    // CAN Transport
    // ============================================================================

    pub struct CanTransport {
        socket: CanSocket,
        interface: String,
        device: String,
        bitrate: u32,
    }

    impl CanTransport {
        /// Open a raw CAN socket on `config.interface`.
        ///
        /// When `configure` is set the interface is reconfigured to the
        /// settings' bitrate first; a failure there is fatal. A malformed
        /// receive filter is reported and the socket stays unfiltered.
        pub fn open(config: &CanSettings, configure: bool) -> Result<Self, IoError> {
            let device = format!("socketcan({})", config.interface);

            validate_interface_name(&config.interface)
                .map_err(|e| IoError::connection(&device, e))?;

            if configure {
                configure_interface(&config.interface, config.bitrate).map_err(|e| {
                    IoError::connection(
                        &device,
                        format!(
                            "{}. Try:\n  sudo ip link set {iface} type can bitrate {}\n  sudo ip link set {iface} up",
                            e,
                            config.bitrate,
                            iface = config.interface
                        ),
                    )
                })?;
            }

            let socket = CanSocket::open(&config.interface)
                .map_err(|e| IoError::connection(&device, e.to_string()))?;
            socket
                .set_nonblocking(true)
                .map_err(|e| IoError::protocol(&device, format!("set nonblocking: {}", e)))?;

            if let Some(filter) = config.filter.as_deref().filter(|f| !f.is_empty() && *f != "none") {
                match parse_filter(filter) {
                    Ok(spec) => {
                        socket
                            .set_filters(&[CanFilter::new(spec.id, spec.mask)])
                            .map_err(|e| IoError::protocol(&device, format!("set filter: {}", e)))?;
                        tlog!(
                            "[socketcan] Receive filter 0x{:X}:0x{:X} on {}",
                            spec.id,
                            spec.mask,
                            config.interface
                        );
                    }
                    Err(e) => tlog!("[socketcan] {} (ignored)", e),
                }
            }

            tlog!("[socketcan] Opened {}", config.interface);

            Ok(Self {
                socket,
                interface: config.interface.clone(),
                device,
                bitrate: config.bitrate,
            })
        }
    }

    fn build_frame(id: u32, data: &[u8]) -> Result<CanDataFrame, String> {
        let data = &data[..data.len().min(CAN_MAX_DATA)];
        let id = if is_extended_id(id) {
            Id::Extended(ExtendedId::new(id).ok_or_else(|| format!("Invalid extended ID: 0x{:08X}", id))?)
        } else {
            Id::Standard(
                StandardId::new(id as u16).ok_or_else(|| format!("Invalid standard ID: 0x{:03X}", id))?,
            )
        };
        CanDataFrame::new(id, data).ok_or_else(|| "Failed to create frame".to_string())
    }

    impl Transport for CanTransport {
        fn kind(&self) -> InterfaceType {
            InterfaceType::Can
        }

        fn describe(&self) -> String {
            format!("{} @ {} bps", self.interface, self.bitrate)
        }

        fn write(&mut self, out: Outbound<'_>) -> Result<usize, IoError> {
            let (id, data) = match out {
                Outbound::Frame { id, data } => (id, data),
                Outbound::Bytes(data) => {
                    return Err(IoError::Unsupported(format!(
                        "{} needs a frame id for {} bytes",
                        self.device,
                        data.len()
                    )));
                }
            };

            let frame = build_frame(id, data).map_err(|e| IoError::protocol(&self.device, e))?;
            self.socket
                .write_frame(&frame)
                .map_err(|e| IoError::connection(&self.device, format!("Write error: {}", e)))?;
            Ok(frame.data().len())
        }

        fn read_available(&mut self) -> Result<Option<Inbound>, IoError> {
            let socket = &self.socket;
            match first_data_frame(|| socket.read_frame()) {
                Ok(Some(frame)) => Ok(Some(Inbound::Frame(ReceivedFrame {
                    id: frame.raw_id(),
                    is_extended: frame.is_extended(),
                    data: frame.data().to_vec(),
                }))),
                Ok(None) => Ok(None),
                Err(e) => Err(IoError::connection(&self.device, format!("Read error: {}", e))),
            }
        }
    }

    /// Read until a data frame arrives or the socket runs dry. Remote and
    /// error frames are consumed without being echoed.
    fn first_data_frame<F>(mut read: F) -> std::io::Result<Option<CanDataFrame>>
    where
        F: FnMut() -> std::io::Result<CanFrame>,
    {
        loop {
            match read() {
                Ok(CanFrame::Data(frame)) => return Ok(Some(frame)),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(e),
            }
        }
    }

    impl AsRawFd for CanTransport {
        fn as_raw_fd(&self) -> RawFd {
            self.socket.as_raw_fd()
        }
    }

    impl Drop for CanTransport {
        fn drop(&mut self) {
            tlog!("[socketcan] Closed {}", self.interface);
        }
    }

}

#[cfg(target_os = "linux")]
pub use linux_impl::CanTransport;

// ============================================================================
// Non-Linux Stub
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub {
    use std::os::unix::io::{AsRawFd, RawFd};

    use crate::io::error::IoError;
    use crate::io::types::{Inbound, InterfaceType, Outbound};
    use crate::io::Transport;
    use crate::settings::CanSettings;

    /// Never constructed off Linux
    pub struct CanTransport {
        _never: std::convert::Infallible,
    }

    impl CanTransport {
        pub fn open(config: &CanSettings, _configure: bool) -> Result<Self, IoError> {
            Err(IoError::connection(
                &format!("socketcan({})", config.interface),
                "SocketCAN is only available on Linux",
            ))
        }
    }

    impl Transport for CanTransport {
        fn kind(&self) -> InterfaceType {
            InterfaceType::Can
        }

        fn describe(&self) -> String {
            match self._never {}
        }

        fn write(&mut self, _out: Outbound<'_>) -> Result<usize, IoError> {
            match self._never {}
        }

        fn read_available(&mut self) -> Result<Option<Inbound>, IoError> {
            match self._never {}
        }
    }

    impl AsRawFd for CanTransport {
        fn as_raw_fd(&self) -> RawFd {
            match self._never {}
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use stub::CanTransport;
