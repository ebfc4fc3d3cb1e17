//! saturn-core - Flash programming core for the Saturn Spartan 6 FPGA module
//!
//! The Saturn module boots its FPGA from a Micron N25Q128A SPI NOR flash
//! (16 MiB, 256 sectors of 64 KiB, 256-byte pages). This crate contains:
//!
//! - [`transport`]: the byte-level SPI/GPIO primitive a programmer provides
//! - [`protocol`]: the N25Q128A command set on top of a transport
//! - [`flash`]: the erase/program/validate session that rewrites the whole
//!   device while the FPGA is held in reset via PROGRAM_B
//!
//! # Example
//!
//! ```ignore
//! use saturn_core::flash::{Image, NoProgress, ProgramOptions, Session};
//! use saturn_core::protocol::PollConfig;
//!
//! let image = Image::new(std::fs::read("top.bin")?)?;
//! let mut session = Session::open(transport, PollConfig::default(), &mut NoProgress)?;
//! let report = session.program(&image, ProgramOptions::default(), &mut NoProgress)?;
//! println!("{} pages written", report.pages_programmed);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod flash;
pub mod protocol;
pub mod transport;

pub use error::{ChipOperation, Error, OperationKind, Result};
