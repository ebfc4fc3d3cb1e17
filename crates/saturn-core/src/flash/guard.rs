//! PROGRAM_B hold guard

use core::ops::{Deref, DerefMut};

use crate::error::{Error, Result};
use crate::protocol::N25q128a;
use crate::transport::{Level, Pin, Transport};

/// Holds the FPGA in configuration reset while the flash is rewritten.
///
/// Creating the guard asserts PROGRAM_B; [`HoldGuard::release`] deasserts it
/// and reports failure. If the guard is dropped without being released
/// (early return, panic) the pin is deasserted from `Drop` and any failure
/// is logged.
pub struct HoldGuard<'a, T: Transport> {
    flash: &'a mut N25q128a<T>,
    held: bool,
}

impl<'a, T: Transport> HoldGuard<'a, T> {
    /// Assert PROGRAM_B
    pub fn engage(flash: &'a mut N25q128a<T>) -> Result<Self> {
        flash
            .transport_mut()
            .set_pin(Pin::ProgramB, Level::HOLD)
            .map_err(pin_error)?;
        log::debug!("PROGRAM_B asserted, FPGA held in reset");
        Ok(Self { flash, held: true })
    }

    /// Deassert PROGRAM_B
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        self.flash
            .transport_mut()
            .set_pin(Pin::ProgramB, Level::RELEASE)
            .map_err(pin_error)?;
        log::debug!("PROGRAM_B released");
        Ok(())
    }
}

fn pin_error(err: Error) -> Error {
    Error::PinControlFailed {
        message: err.to_string(),
        pending: None,
    }
}

impl<T: Transport> Deref for HoldGuard<'_, T> {
    type Target = N25q128a<T>;

    fn deref(&self) -> &Self::Target {
        self.flash
    }
}

impl<T: Transport> DerefMut for HoldGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.flash
    }
}

impl<T: Transport> Drop for HoldGuard<'_, T> {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        match self
            .flash
            .transport_mut()
            .set_pin(Pin::ProgramB, Level::RELEASE)
        {
            Ok(()) => log::debug!("PROGRAM_B released on unwind"),
            Err(e) => log::error!("Unable to release PROGRAM_B, FPGA left in reset: {}", e),
        }
    }
}
