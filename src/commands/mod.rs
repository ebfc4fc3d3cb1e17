//! CLI command implementations
//!
//! Each command prints the tool's one-line progress protocol on stdout
//! ("initializing saturn..", "flashing chip..", then "success!" or
//! "failed!"); progress bars and log output go to stderr.

mod erase;
mod list;
mod program;
mod progress;

use std::io::Write;
use std::path::PathBuf;

use saturn_core::flash::{Progress, Session};
use saturn_core::protocol::PollConfig;
use saturn_ftdi::{FtdiConfig, FtdiError, FtdiTransport};
use thiserror::Error;

pub use erase::run_erase;
pub use list::run_list;
pub use program::run_program;

/// Errors surfaced by the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Malformed invocation or programmer option
    #[error("{0}")]
    Usage(String),

    /// Input file could not be read
    #[error("could not open '{}': {source}", .path.display())]
    Io {
        /// Path given on the command line
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Device discovery or USB setup failed
    #[error(transparent)]
    Ftdi(#[from] FtdiError),

    /// Flash protocol or session failure
    #[error(transparent)]
    Core(#[from] saturn_core::Error),
}

/// Print a protocol message without a newline
fn announce(message: &str) {
    print!("{}", message);
    let _ = std::io::stdout().flush();
}

/// Open the single attached module and identify its flash
fn open_session(
    config: &FtdiConfig,
    poll: PollConfig,
    progress: &mut dyn Progress,
) -> Result<Session<FtdiTransport>, CliError> {
    announce("initializing saturn..");

    let transport = match FtdiTransport::open(config) {
        Ok(transport) => transport,
        Err(e) => {
            println!("failed!");
            return Err(e.into());
        }
    };

    // Session::open reports its own failure through the progress observer
    let session = Session::open(transport, poll, progress)?;
    println!();
    Ok(session)
}
