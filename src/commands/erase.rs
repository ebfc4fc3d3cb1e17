//! Erase command implementation

use saturn_core::protocol::PollConfig;
use saturn_ftdi::FtdiConfig;

use super::progress::IndicatifProgress;
use super::{open_session, CliError};

/// Run the erase command (bulk erase of the whole chip)
pub fn run_erase(config: &FtdiConfig, poll: PollConfig) -> Result<(), CliError> {
    let mut progress = IndicatifProgress::new("erasing chip..");
    let mut session = open_session(config, poll, &mut progress)?;
    session.erase_chip(&mut progress)?;
    Ok(())
}
