//! Error types for saturn-core

use thiserror::Error;

/// Kind of mutating flash operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Sector or bulk erase
    Erase,
    /// Page program
    Program,
}

/// A mutating flash command whose completion is confirmed by polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipOperation {
    /// Whole-chip erase
    BulkErase,
    /// 64 KiB sector erase
    SectorErase {
        /// Sector index (0-255)
        sector: u8,
    },
    /// Page program
    PageProgram {
        /// Page index (0-65535)
        page: u16,
    },
}

impl ChipOperation {
    /// Whether the operation erases or programs
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::BulkErase | Self::SectorErase { .. } => OperationKind::Erase,
            Self::PageProgram { .. } => OperationKind::Program,
        }
    }

    /// Whether this is an erase operation
    pub fn is_erase(&self) -> bool {
        self.kind() == OperationKind::Erase
    }
}

impl core::fmt::Display for ChipOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BulkErase => write!(f, "bulk erase"),
            Self::SectorErase { sector } => write!(f, "sector erase (sector {})", sector),
            Self::PageProgram { page } => write!(f, "page program (page {})", page),
        }
    }
}

/// Errors produced while talking to the flash or running a session
#[derive(Debug, Error)]
pub enum Error {
    /// The transport failed to complete a transaction or pin change
    #[error("transport error: {0}")]
    Transport(String),

    /// The flash did not identify as an N25Q128A
    #[error(
        "flash id mismatch: manufacturer 0x{manufacturer:02X}, device 0x{device:04X} \
         (expected 0x20, 0x18BA)"
    )]
    IdentityMismatch {
        /// Manufacturer id read from the chip
        manufacturer: u8,
        /// Device id read from the chip
        device: u16,
    },

    /// The flag status register reported a failure after erase/program
    #[error("{}", chip_failure_message(.operation))]
    ChipOperationFailed {
        /// The operation that failed
        operation: ChipOperation,
        /// Raw flag status register value
        flag_status: u8,
    },

    /// Readback after programming does not match the image
    #[error(
        "flash mismatch at 0x{offset:06X}: expected 0x{expected:02X}, found 0x{found:02X}"
    )]
    ValidationMismatch {
        /// First differing byte offset
        offset: u32,
        /// Byte from the image
        expected: u8,
        /// Byte read back from flash
        found: u8,
    },

    /// PROGRAM_B could not be driven; the FPGA may be left in reset
    #[error("unable to change PROGRAM_B pin: {message}")]
    PinControlFailed {
        /// Description of the pin failure
        message: String,
        /// Error that was already being handled when the pin failed
        pending: Option<Box<Error>>,
    },

    /// Status polling exceeded the configured timeout
    #[error("timed out waiting for {operation} to complete")]
    Timeout {
        /// The operation being polled
        operation: ChipOperation,
    },

    /// The image has no bytes
    #[error("file length was 0 bytes")]
    EmptyImage,

    /// The image does not fit in the flash
    #[error("file length ({len} bytes) exceeds flash capacity")]
    ImageTooLarge {
        /// Image length in bytes
        len: usize,
    },

    /// Page program data longer than one page
    #[error("page program of {len} bytes exceeds the 256-byte page")]
    PageOverflow {
        /// Requested length
        len: usize,
    },
}

fn chip_failure_message(operation: &ChipOperation) -> &'static str {
    match operation {
        ChipOperation::BulkErase => "flash bulk erase failed",
        ChipOperation::SectorErase { .. } => "flash sector erase failed",
        ChipOperation::PageProgram { .. } => "flash program failed",
    }
}

impl Error {
    /// Whether the error may have left the FPGA held in reset
    pub fn is_pin_failure(&self) -> bool {
        matches!(self, Self::PinControlFailed { .. })
    }

    /// Attach the error that was being handled when a pin failure occurred.
    ///
    /// Other errors are returned unchanged.
    pub fn with_pending(self, pending: Error) -> Error {
        match self {
            Self::PinControlFailed { message, .. } => Self::PinControlFailed {
                message,
                pending: Some(Box::new(pending)),
            },
            other => other,
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
