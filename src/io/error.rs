// src/io/error.rs
//
// Transport error type shared by the serial and SocketCAN drivers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    /// Opening or configuring a device failed
    #[error("{device}: {message}")]
    Connection { device: String, message: String },
    /// The device answered in a way we cannot use
    #[error("{device}: {message}")]
    Protocol { device: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Unsupported(String),
}

impl IoError {
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn protocol(device: &str, message: impl Into<String>) -> Self {
        IoError::Protocol {
            device: device.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_device() {
        let err = IoError::connection("/dev/ttyUSB0", "No such file or directory");
        assert_eq!(err.to_string(), "/dev/ttyUSB0: No such file or directory");

        let err = IoError::protocol("socketcan(can0)", "frame too short");
        assert_eq!(err.to_string(), "socketcan(can0): frame too short");
    }
}
