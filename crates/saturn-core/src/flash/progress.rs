//! Session phases and progress reporting

use core::fmt;

/// Phase of a flashing session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing started yet
    Idle,
    /// Reading and checking the flash identity
    Initializing,
    /// Erasing sectors (or the whole chip)
    Erasing,
    /// Programming pages
    Programming,
    /// Reading back and comparing
    Validating,
    /// Finished successfully, PROGRAM_B released
    Done,
    /// A phase failed; cleanup is running
    Aborting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Initializing => "initializing",
            Phase::Erasing => "erasing",
            Phase::Programming => "programming",
            Phase::Validating => "validating",
            Phase::Done => "done",
            Phase::Aborting => "aborting",
        };
        f.write_str(name)
    }
}

/// Observer for session progress
///
/// All methods default to doing nothing.
pub trait Progress {
    /// A new phase started
    fn phase(&mut self, _phase: Phase) {}

    /// A sector was checked during the erase scan; `erased` is false when
    /// the sector was already blank
    fn sector_scanned(&mut self, _sector: u8, _erased: bool) {}

    /// Bytes programmed so far
    fn program_progress(&mut self, _bytes_done: usize, _bytes_total: usize) {}

    /// Bytes compared so far
    fn validate_progress(&mut self, _bytes_done: usize, _bytes_total: usize) {}
}

/// Progress observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}
