//! N25Q128A opcodes, register bits and geometry
//!
//! Values from the Micron N25Q128A datasheet as used by the Saturn module.

use bitflags::bitflags;

// ============================================================================
// Identification
// ============================================================================

/// Expected JEDEC manufacturer id (Micron)
pub const MANUFACTURER_ID: u8 = 0x20;
/// Expected device id, reassembled high:low from wire bytes 2 and 1
pub const DEVICE_ID: u16 = 0x18BA;

/// Read identification (manufacturer, device, unique id)
pub const RDID: u8 = 0x9F;
/// Number of bytes returned by RDID
pub const RDID_LEN: usize = 20;
/// Length of the unique id field of the RDID response
pub const UNIQUE_ID_LEN: usize = 17;

// ============================================================================
// Read / register access
// ============================================================================

/// Read data bytes (3-byte address)
pub const READ: u8 = 0x03;
/// Read status register
pub const RDSR: u8 = 0x05;
/// Read flag status register
pub const RFSR: u8 = 0x70;

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any erase/program
pub const WREN: u8 = 0x06;
/// Write Disable - clears the write enable latch
pub const WRDI: u8 = 0x04;

// ============================================================================
// Program / erase
// ============================================================================

/// Page Program (up to 256 bytes)
pub const PP: u8 = 0x02;
/// Sector Erase (64 KiB)
pub const SE: u8 = 0xD8;
/// Bulk Erase (whole chip)
pub const BE: u8 = 0xC7;

// ============================================================================
// Geometry
// ============================================================================

/// Bytes per program page
pub const PAGE_SIZE: usize = 256;
/// Number of pages
pub const PAGE_COUNT: usize = 65536;
/// Bytes per erase sector
pub const SECTOR_SIZE: usize = 65536;
/// Number of sectors
pub const SECTOR_COUNT: usize = 256;
/// Total device capacity in bytes
pub const TOTAL_SIZE: usize = 16 * 1024 * 1024;

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Erase or program in progress
        const WRITE_IN_PROGRESS = 1 << 0;
        /// Write enable latch
        const WRITE_ENABLE_LATCH = 1 << 1;
    }
}

bitflags! {
    /// Flag status register failure masks
    ///
    /// These are matched with `intersects`: the chip reports other flag
    /// bits at the same time, so any overlap counts as a failure.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlagStatus: u8 {
        /// Set after a failed sector or bulk erase
        const ERASE_FAILURE = 0x06;
        /// Set after a failed page program
        const PROGRAM_FAILURE = 0x05;
    }
}

impl Status {
    /// Whether an erase or program is still running
    pub fn is_busy(&self) -> bool {
        self.contains(Status::WRITE_IN_PROGRESS)
    }
}

/// Encode a 24-bit address, most significant byte first
pub fn encode_address(address: u32) -> [u8; 3] {
    [(address >> 16) as u8, (address >> 8) as u8, address as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_address() {
        assert_eq!(encode_address(0x000000), [0x00, 0x00, 0x00]);
        assert_eq!(encode_address(0x123456), [0x12, 0x34, 0x56]);
        assert_eq!(encode_address(0xFF0000), [0xFF, 0x00, 0x00]);
        // Only 24 bits reach the wire
        assert_eq!(encode_address(0x01ABCDEF), [0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn test_flag_masks_intersect() {
        let erase_fail = FlagStatus::from_bits_retain(0x82);
        assert!(erase_fail.intersects(FlagStatus::ERASE_FAILURE));

        let ready = FlagStatus::from_bits_retain(0x80);
        assert!(!ready.intersects(FlagStatus::ERASE_FAILURE));
        assert!(!ready.intersects(FlagStatus::PROGRAM_FAILURE));

        let program_fail = FlagStatus::from_bits_retain(0x81);
        assert!(program_fail.intersects(FlagStatus::PROGRAM_FAILURE));
        assert!(!program_fail.intersects(FlagStatus::ERASE_FAILURE));
    }

    #[test]
    fn test_geometry() {
        assert_eq!(PAGE_SIZE * PAGE_COUNT, TOTAL_SIZE);
        assert_eq!(SECTOR_SIZE * SECTOR_COUNT, TOTAL_SIZE);
    }
}
