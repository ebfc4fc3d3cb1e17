//! Error types for the FTDI transport

use thiserror::Error;

/// Result type for FTDI operations
pub type Result<T> = std::result::Result<T, FtdiError>;

/// Errors that can occur during FTDI operations
#[derive(Debug, Error)]
pub enum FtdiError {
    /// No Saturn module found
    #[error("unable to find saturn device")]
    DeviceNotFound,

    /// More than one Saturn module attached
    #[error("too many saturn devices connected ({0})")]
    TooManyDevices(usize),

    /// The selected module is not the only device with its VID/PID
    #[error("{0} devices share the Saturn VID/PID; disconnect all but one")]
    AmbiguousDevice(usize),

    /// Failed to open device
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// Failed to configure device
    #[error("failed to configure device: {0}")]
    ConfigFailed(String),

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// USB enumeration error
    #[error("USB error: {0}")]
    UsbError(String),

    /// libftdi error
    #[error("libftdi error: {0}")]
    LibFtdi(String),
}

impl From<nusb::Error> for FtdiError {
    fn from(e: nusb::Error) -> Self {
        FtdiError::UsbError(e.to_string())
    }
}

impl From<ftdi::Error> for FtdiError {
    fn from(e: ftdi::Error) -> Self {
        FtdiError::LibFtdi(e.to_string())
    }
}

impl From<FtdiError> for saturn_core::Error {
    fn from(e: FtdiError) -> Self {
        saturn_core::Error::Transport(e.to_string())
    }
}
