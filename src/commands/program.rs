//! Program command implementation

use std::path::Path;

use saturn_core::flash::{Image, ProgramOptions};
use saturn_core::protocol::PollConfig;
use saturn_ftdi::FtdiConfig;

use super::progress::IndicatifProgress;
use super::{announce, open_session, CliError};

/// Run the program command
pub fn run_program(
    path: &Path,
    validate: bool,
    config: &FtdiConfig,
    poll: PollConfig,
) -> Result<(), CliError> {
    let image = read_image(path)?;

    let mut progress = IndicatifProgress::new("flashing chip..");
    let mut session = open_session(config, poll, &mut progress)?;
    let report = session.program(&image, ProgramOptions { validate }, &mut progress)?;

    log::info!(
        "{} of {} sectors erased, {} pages ({} bytes) written{}",
        report.sectors_erased,
        report.sectors_scanned,
        report.pages_programmed,
        report.bytes_programmed,
        if report.validated { ", validated" } else { "" }
    );
    Ok(())
}

/// Read the input file and check it fits the flash
fn read_image(path: &Path) -> Result<Image, CliError> {
    announce("reading input file..");

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(source) => {
            println!("failed!");
            return Err(CliError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    match Image::new(data) {
        Ok(image) => {
            println!();
            log::debug!(
                "Read {} bytes ({} pages) from {}",
                image.len(),
                image.page_count(),
                path.display()
            );
            Ok(image)
        }
        Err(e) => {
            println!("failed!");
            Err(e.into())
        }
    }
}
