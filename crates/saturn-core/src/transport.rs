//! Transport trait definitions
//!
//! A transport is the primitive a programmer provides to the flash driver:
//! chip-select framed byte exchange plus control of the FPGA's PROGRAM_B
//! line. Everything is blocking; a command is fully written (and its
//! response fully read) before the call returns.

use crate::error::Result;

/// GPIO lines the core drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    /// Spartan 6 PROGRAM_B hold line
    ProgramB,
}

/// Logic level of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Driven low
    Low,
    /// Driven high
    High,
}

impl Level {
    /// Level that holds the FPGA in configuration reset.
    ///
    /// PROGRAM_B is active-low at the FPGA, but the Saturn board inverts
    /// the line between the FTDI GPIO and the FPGA.
    pub const HOLD: Level = Level::High;
    /// Level that lets the FPGA boot from flash
    pub const RELEASE: Level = Level::Low;
}

/// Byte-level SPI transport with one GPIO control line
///
/// A flash command is issued as `begin()`, one or more `write()`/`read()`
/// calls, then `end()`. Implementations must keep chip select asserted for
/// the whole sequence.
pub trait Transport {
    /// Assert chip select and start a transaction
    fn begin(&mut self) -> Result<()>;

    /// Clock `data` out to the chip
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Clock `buf.len()` bytes in from the chip
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Deassert chip select and finish the transaction
    fn end(&mut self) -> Result<()>;

    /// Drive a GPIO line to the given level
    fn set_pin(&mut self, pin: Pin, level: Level) -> Result<()>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }

    fn end(&mut self) -> Result<()> {
        (**self).end()
    }

    fn set_pin(&mut self, pin: Pin, level: Level) -> Result<()> {
        (**self).set_pin(pin, level)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

