//! FTDI MPSSE protocol constants for the Saturn board

/// FTDI vendor ID
pub const SATURN_VID: u16 = 0x0403;

/// FT2232H product ID
pub const SATURN_PID: u16 = 0x6010;

/// USB product string of the Saturn module
pub const SATURN_DESCRIPTION: &str = "Saturn Spartan 6 FPGA Module";

// ============================================================================
// MPSSE Commands
// ============================================================================

/// Write bytes on negative clock edge (SPI mode 0)
pub const MPSSE_DO_WRITE: u8 = 0x10;

/// Read bytes on positive clock edge (SPI mode 0)
pub const MPSSE_DO_READ: u8 = 0x20;

/// Write on negative clock edge
pub const MPSSE_WRITE_NEG: u8 = 0x01;

/// Set data bits low byte
pub const SET_BITS_LOW: u8 = 0x80;

/// Disable loopback mode
pub const LOOPBACK_END: u8 = 0x85;

/// Set clock divisor
pub const TCK_DIVISOR: u8 = 0x86;

/// Send immediate (flush buffers)
pub const SEND_IMMEDIATE: u8 = 0x87;

/// Disable divide-by-5 prescaler (60 MHz clock)
pub const DIS_DIV_5: u8 = 0x8A;

/// Longest byte transfer a single MPSSE command can carry
pub const MPSSE_MAX_TRANSFER: usize = 65536;

// ============================================================================
// Low byte pin assignment
// ============================================================================

/// ADBUS0: SCK
pub const PIN_SCK: u8 = 0x01;

/// ADBUS1: MOSI
pub const PIN_DO: u8 = 0x02;

/// ADBUS3: flash chip select (active low)
pub const PIN_CS: u8 = 0x08;

/// ADBUS7 (GPIOL3): FPGA PROGRAM_B
pub const PIN_GPIOL3: u8 = 0x80;

/// Output pins; MISO (ADBUS2) and GPIOL0-2 stay inputs
pub const PIN_DIR: u8 = PIN_SCK | PIN_DO | PIN_CS | PIN_GPIOL3;

/// Base clock of the FT2232H MPSSE with the prescaler disabled
pub const BASE_CLOCK_MHZ: f64 = 60.0;

/// FT2232H channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtdiInterface {
    /// Channel A (default)
    #[default]
    A,
    /// Channel B
    B,
}

impl FtdiInterface {
    /// Parse interface from character
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(FtdiInterface::A),
            'B' => Some(FtdiInterface::B),
            _ => None,
        }
    }

    /// Get the channel letter
    pub fn letter(&self) -> char {
        match self {
            FtdiInterface::A => 'A',
            FtdiInterface::B => 'B',
        }
    }
}
