//! saturn-ftdi - FTDI MPSSE transport for the Saturn FPGA module
//!
//! The Saturn Spartan 6 module carries an FT2232H whose channel A drives
//! the configuration flash over SPI (mode 0, MSB first) and the FPGA's
//! PROGRAM_B line through GPIOL3.
//!
//! # Example
//!
//! ```no_run
//! use saturn_core::flash::{NoProgress, Session};
//! use saturn_core::protocol::PollConfig;
//! use saturn_ftdi::{FtdiConfig, FtdiTransport};
//!
//! let transport = FtdiTransport::open(&FtdiConfig::default())?;
//! let session = Session::open(transport, PollConfig::default(), &mut NoProgress)?;
//! println!("{}", session.identity());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Programmer Options
//!
//! When using the CLI, the following options are available:
//!
//! - `port=<A|B>` - Channel to use (default: A)
//! - `divisor=<N>` - Clock divisor (2-65534, even; default: 2)
//! - `serial=<string>` - USB serial number filter
//! - `description=<string>` - USB product description filter
//!   (default: "Saturn Spartan 6 FPGA Module")
//!
//! # SPI Clock Speed
//!
//! ```text
//! SPI_clock = 60 MHz / divisor
//! ```
//!
//! | Divisor | SPI Clock |
//! |---------|-----------|
//! | 2       | 30 MHz    |
//! | 4       | 15 MHz    |
//! | 6       | 10 MHz    |
//! | 60      | 1 MHz     |

mod device;
mod error;
mod protocol;

pub use device::{list_devices, parse_options, FtdiConfig, FtdiTransport, SaturnDeviceInfo};
pub use error::{FtdiError, Result};
pub use protocol::{FtdiInterface, SATURN_DESCRIPTION, SATURN_PID, SATURN_VID};
