//! Whole-device flashing session
//!
//! A [`Session`] owns the flash driver for one exclusive connection to a
//! Saturn module. It identifies the chip on open, and rewrites the device
//! with the FPGA held in reset through PROGRAM_B:
//!
//! ```text
//! Idle -> Initializing -> Erasing -> Programming -> Validating -> Done
//!                \            \            \             \
//!                 `------------`------------`-------------`--> Aborting
//! ```
//!
//! PROGRAM_B is released on every exit path, see [`HoldGuard`].

mod guard;
mod image;
mod progress;
mod session;

pub use guard::HoldGuard;
pub use image::Image;
pub use progress::{NoProgress, Phase, Progress};
pub use session::{ProgramOptions, ProgramReport, Session, ERASE_SCAN_SECTORS};
