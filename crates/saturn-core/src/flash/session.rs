//! Erase/program/validate orchestration

use crate::error::{Error, Result};
use crate::flash::guard::HoldGuard;
use crate::flash::image::Image;
use crate::flash::progress::{Phase, Progress};
use crate::protocol::opcodes::SECTOR_SIZE;
use crate::protocol::{FlashIdentity, N25q128a, PollConfig};
use crate::transport::Transport;

/// Number of sectors the erase scan may visit (sectors 0..=254)
pub const ERASE_SCAN_SECTORS: usize = 255;

/// Options for [`Session::program`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Read the image back and compare after programming
    pub validate: bool,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Summary of a completed [`Session::program`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramReport {
    /// Sectors read during the erase scan
    pub sectors_scanned: usize,
    /// Sectors that were erased
    pub sectors_erased: usize,
    /// Pages programmed, partial page included
    pub pages_programmed: usize,
    /// Bytes programmed
    pub bytes_programmed: usize,
    /// Whether the readback comparison ran
    pub validated: bool,
}

/// One exclusive session with an identified N25Q128A
pub struct Session<T: Transport> {
    flash: N25q128a<T>,
    identity: FlashIdentity,
}

impl<T: Transport> Session<T> {
    /// Identify the flash behind `transport`.
    ///
    /// Fails with [`Error::IdentityMismatch`] before anything is written if
    /// the chip is not an N25Q128A. The transport is dropped (closing the
    /// connection) on failure.
    pub fn open(transport: T, poll: PollConfig, progress: &mut dyn Progress) -> Result<Self> {
        progress.phase(Phase::Initializing);
        let mut flash = N25q128a::new(transport, poll);

        let identity = match flash.identify() {
            Ok(identity) => identity,
            Err(e) => {
                progress.phase(Phase::Aborting);
                return Err(e);
            }
        };
        log::info!("Flash identity: {}", identity);

        if !identity.is_expected() {
            progress.phase(Phase::Aborting);
            return Err(Error::IdentityMismatch {
                manufacturer: identity.manufacturer_id,
                device: identity.device_id,
            });
        }

        Ok(Self { flash, identity })
    }

    /// Identity read when the session was opened
    pub fn identity(&self) -> &FlashIdentity {
        &self.identity
    }

    /// Close the session and hand back the transport
    pub fn into_transport(self) -> T {
        self.flash.into_inner()
    }

    /// Erase, program and optionally validate `image` at address 0.
    ///
    /// The FPGA is held in reset for the duration and released on every
    /// exit path. A release failure is reported as
    /// [`Error::PinControlFailed`], carrying any earlier error as `pending`.
    pub fn program(
        &mut self,
        image: &Image,
        options: ProgramOptions,
        progress: &mut dyn Progress,
    ) -> Result<ProgramReport> {
        let mut report = ProgramReport::default();
        let mut flash = match HoldGuard::engage(&mut self.flash) {
            Ok(guard) => guard,
            Err(e) => {
                progress.phase(Phase::Aborting);
                return Err(e);
            }
        };

        let result = run_program(&mut *flash, image, options, progress, &mut report);
        finish(flash, result, progress).map(|()| report)
    }

    /// Erase the whole chip with a bulk erase
    pub fn erase_chip(&mut self, progress: &mut dyn Progress) -> Result<()> {
        let mut flash = match HoldGuard::engage(&mut self.flash) {
            Ok(guard) => guard,
            Err(e) => {
                progress.phase(Phase::Aborting);
                return Err(e);
            }
        };

        progress.phase(Phase::Erasing);
        let result = write_enabled(&mut *flash, |flash| flash.bulk_erase())
            .and_then(|()| flash.write_disable());

        finish(flash, result, progress)
    }
}

fn run_program<T: Transport>(
    flash: &mut N25q128a<T>,
    image: &Image,
    options: ProgramOptions,
    progress: &mut dyn Progress,
    report: &mut ProgramReport,
) -> Result<()> {
    erase_leading_sectors(flash, progress, report)?;
    program_pages(flash, image, progress, report)?;
    if options.validate {
        validate(flash, image, progress)?;
        report.validated = true;
    }
    Ok(())
}

/// Release PROGRAM_B and merge the outcome with the phase result
fn finish<T: Transport>(
    guard: HoldGuard<'_, T>,
    result: Result<()>,
    progress: &mut dyn Progress,
) -> Result<()> {
    if result.is_err() {
        progress.phase(Phase::Aborting);
    }

    match (result, guard.release()) {
        (Ok(()), Ok(())) => {
            progress.phase(Phase::Done);
            Ok(())
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), Err(pin)) => {
            progress.phase(Phase::Aborting);
            Err(pin)
        }
        (Err(e), Err(pin)) => Err(pin.with_pending(e)),
    }
}

/// Issue write enable, run `op`, and on failure attempt a write disable
/// before returning the error from `op`.
fn write_enabled<T: Transport>(
    flash: &mut N25q128a<T>,
    op: impl FnOnce(&mut N25q128a<T>) -> Result<()>,
) -> Result<()> {
    let result = flash.write_enable().and_then(|()| op(&mut *flash));
    if result.is_err() {
        if let Err(e) = flash.write_disable() {
            log::warn!("Write disable after failed operation also failed: {}", e);
        }
    }
    result
}

/// Erase the leading run of non-blank sectors.
///
/// Sectors are scanned from 0 and each non-blank one is erased; the scan
/// stops at the first sector that already reads blank. Sector 255 is never
/// scanned and the final byte of each sector is not compared.
fn erase_leading_sectors<T: Transport>(
    flash: &mut N25q128a<T>,
    progress: &mut dyn Progress,
    report: &mut ProgramReport,
) -> Result<()> {
    progress.phase(Phase::Erasing);
    let mut sector_data = vec![0u8; SECTOR_SIZE];

    for sector in 0..ERASE_SCAN_SECTORS as u8 {
        flash.read(sector as u32 * SECTOR_SIZE as u32, &mut sector_data)?;
        report.sectors_scanned += 1;

        if is_blank(&sector_data) {
            log::debug!("Sector {} is blank, erase scan complete", sector);
            progress.sector_scanned(sector, false);
            break;
        }

        log::debug!("Erasing sector {}", sector);
        write_enabled(flash, |flash| flash.sector_erase(sector))?;
        flash.write_disable()?;
        report.sectors_erased += 1;
        progress.sector_scanned(sector, true);
    }

    log::info!(
        "Erase scan: {} sectors read, {} erased",
        report.sectors_scanned,
        report.sectors_erased
    );
    Ok(())
}

fn is_blank(sector_data: &[u8]) -> bool {
    sector_data[..SECTOR_SIZE - 1].iter().all(|&b| b == 0xFF)
}

/// Program every page of the image, then leave the chip write-disabled
fn program_pages<T: Transport>(
    flash: &mut N25q128a<T>,
    image: &Image,
    progress: &mut dyn Progress,
    report: &mut ProgramReport,
) -> Result<()> {
    progress.phase(Phase::Programming);
    let total = image.len();

    for (page, data) in image.pages() {
        write_enabled(flash, |flash| flash.page_program(page, data))?;
        report.pages_programmed += 1;
        report.bytes_programmed += data.len();
        progress.program_progress(report.bytes_programmed, total);
    }

    log::info!(
        "Programmed {} pages ({} bytes)",
        report.pages_programmed,
        report.bytes_programmed
    );
    flash.write_disable()
}

/// Read the image back from address 0 and compare
fn validate<T: Transport>(
    flash: &mut N25q128a<T>,
    image: &Image,
    progress: &mut dyn Progress,
) -> Result<()> {
    progress.phase(Phase::Validating);
    let readback = flash.read_vec(0, image.len())?;

    let mismatch = image
        .as_bytes()
        .iter()
        .zip(&readback)
        .position(|(expected, found)| expected != found);
    progress.validate_progress(image.len(), image.len());

    match mismatch {
        Some(offset) => Err(Error::ValidationMismatch {
            offset: offset as u32,
            expected: image.as_bytes()[offset],
            found: readback[offset],
        }),
        None => {
            log::info!("Validated {} bytes", image.len());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_check_ignores_last_byte() {
        let mut data = vec![0xFFu8; SECTOR_SIZE];
        assert!(is_blank(&data));

        data[SECTOR_SIZE - 1] = 0x00;
        assert!(is_blank(&data));

        data[SECTOR_SIZE - 2] = 0xFE;
        assert!(!is_blank(&data));
    }

    #[test]
    fn test_default_options_validate() {
        assert!(ProgramOptions::default().validate);
    }
}
