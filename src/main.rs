//! saturn-loader - Flash programmer for the Saturn Spartan 6 FPGA module
//!
//! Writes a bitstream into the module's N25Q128A configuration flash over
//! the on-board FT2232H, holding the FPGA in reset while the flash is
//! rewritten.
//!
//! ```text
//! saturn-loader <file> [-s]      erase, program and validate
//! saturn-loader -l               list attached modules
//! saturn-loader -e               bulk erase the flash
//! ```

mod cli;
mod commands;

use std::io::Write;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use cli::{Cli, Mode};
use commands::CliError;
use saturn_core::protocol::PollConfig;
use saturn_ftdi::{parse_options, FtdiConfig};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit 1 rather than clap's 2
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    // stdout carries the progress protocol, so logging stays quiet by default
    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // A half-finished erase or program leaves the flash in an undefined
    // state, so Ctrl-C only tells the operator to wait
    if let Err(e) = ctrlc::set_handler(|| {
        print!("\nplease wait..");
        let _ = std::io::stdout().flush();
    }) {
        log::warn!("Unable to install SIGINT handler: {}", e);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = ftdi_config(cli)?;
    let poll = poll_config(cli);
    log::debug!("Using {:?}, {:?}", config, poll);

    match cli.mode() {
        Mode::Program { file, validate } => {
            commands::run_program(&file, validate, &config, poll)
        }
        Mode::List => commands::run_list(&config),
        Mode::Erase => commands::run_erase(&config, poll),
    }
}

fn ftdi_config(cli: &Cli) -> Result<FtdiConfig, CliError> {
    parse_options(&cli.option_pairs()).map_err(|e| CliError::Usage(e.to_string()))
}

fn poll_config(cli: &Cli) -> PollConfig {
    let poll = PollConfig::default().interval_us(cli.poll_interval);
    match cli.poll_timeout {
        Some(ms) => poll.timeout_us(ms.saturating_mul(1000)),
        None => poll,
    }
}

/// Print an error, including whatever was in flight when PROGRAM_B failed
fn report(err: &CliError) {
    match err {
        CliError::Core(saturn_core::Error::PinControlFailed { message, pending }) => {
            eprintln!("error: unable to change PROGRAM_B pin!");
            eprintln!("error: {}", message);
            if let Some(pending) = pending {
                eprintln!("error: {}", pending);
            }
        }
        _ => eprintln!("error: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("saturn-loader").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_poll_config_defaults_unbounded() {
        let poll = poll_config(&parse(&["-e"]));
        assert_eq!(poll, PollConfig::default());
    }

    #[test]
    fn test_poll_timeout_in_milliseconds() {
        let poll = poll_config(&parse(&["-e", "--poll-interval", "100", "--poll-timeout", "5"]));
        assert_eq!(poll.interval_us, 100);
        assert_eq!(poll.timeout_us, Some(5000));
    }

    #[test]
    fn test_bad_programmer_option_is_usage_error() {
        let err = ftdi_config(&parse(&["-l", "-o", "divisor=3"])).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn test_programmer_options_reach_config() {
        let config = ftdi_config(&parse(&["-l", "-o", "serial=FT01"])).unwrap();
        assert_eq!(config.serial.as_deref(), Some("FT01"));
    }
}
