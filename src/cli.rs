//! CLI argument parsing

use clap::{ArgAction, ArgGroup, Parser};
use std::path::PathBuf;

/// Parse a `key=value` programmer option
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid option '{}': expected key=value", s))?;
    if key.is_empty() {
        return Err(format!("Invalid option '{}': empty key", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Parser, Debug)]
#[command(name = "saturn-loader")]
#[command(
    author,
    version,
    about = "Flash programmer for the Saturn Spartan 6 FPGA module",
    long_about = None
)]
#[command(disable_version_flag = true)]
#[command(override_usage = "saturn-loader <FILE> [-s]\n       saturn-loader [-l | -e | -h | -v]")]
#[command(group(
    ArgGroup::new("mode")
        .args(["file", "list", "erase"])
        .required(true)
))]
pub struct Cli {
    /// Bitstream image to write at address 0
    pub file: Option<PathBuf>,

    /// Skip validation
    #[arg(short, long, requires = "file")]
    pub skip_validation: bool,

    /// List devices
    #[arg(short, long)]
    pub list: bool,

    /// Erase chip
    #[arg(short, long)]
    pub erase: bool,

    /// Show version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Verbosity level (--verbose, --verbose --verbose, ...)
    #[arg(long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Programmer option, repeatable (port=<A|B>, divisor=<N>, serial=<S>,
    /// description=<S>)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub options: Vec<(String, String)>,

    /// Delay between status polls in microseconds
    #[arg(long, value_name = "US", default_value_t = 0)]
    pub poll_interval: u32,

    /// Give up waiting for an erase/program after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub poll_timeout: Option<u64>,
}

/// What one invocation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Erase, program and optionally validate an image
    Program {
        /// Image path
        file: PathBuf,
        /// Read back and compare afterwards
        validate: bool,
    },
    /// List attached modules
    List,
    /// Bulk erase the whole chip
    Erase,
}

impl Cli {
    /// The selected mode; clap guarantees exactly one is present
    pub fn mode(&self) -> Mode {
        match &self.file {
            Some(file) => Mode::Program {
                file: file.clone(),
                validate: !self.skip_validation,
            },
            None if self.list => Mode::List,
            None => Mode::Erase,
        }
    }

    /// Programmer options as borrowed pairs
    pub fn option_pairs(&self) -> Vec<(&str, &str)> {
        self.options
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}
