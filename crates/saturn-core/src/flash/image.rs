//! Flash image validation and page splitting

use crate::error::{Error, Result};
use crate::protocol::opcodes::{PAGE_SIZE, TOTAL_SIZE};

/// Bytes to be written at address 0 of the flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
}

impl Image {
    /// Wrap image bytes, rejecting empty or oversized images
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyImage);
        }
        if data.len() > TOTAL_SIZE {
            return Err(Error::ImageTooLarge { len: data.len() });
        }
        Ok(Self { data })
    }

    /// Image length in bytes (1..=16 MiB)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; an image holds at least one byte
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Image contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of complete 256-byte pages
    pub fn full_pages(&self) -> usize {
        self.data.len() / PAGE_SIZE
    }

    /// Length of the trailing partial page (0 if none)
    pub fn partial_len(&self) -> usize {
        self.data.len() % PAGE_SIZE
    }

    /// Total number of pages to program, partial page included
    pub fn page_count(&self) -> usize {
        self.data.len().div_ceil(PAGE_SIZE)
    }

    /// Iterate `(page index, page data)` in address order, full pages first
    /// and the partial page (if any) last
    pub fn pages(&self) -> impl Iterator<Item = (u16, &[u8])> + '_ {
        self.data
            .chunks(PAGE_SIZE)
            .enumerate()
            .map(|(index, chunk)| (index as u16, chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(Image::new(Vec::new()), Err(Error::EmptyImage)));
    }

    #[test]
    fn test_rejects_oversized() {
        let err = Image::new(vec![0u8; TOTAL_SIZE + 1]).unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { len } if len == TOTAL_SIZE + 1));
    }

    #[test]
    fn test_full_device_image() {
        let image = Image::new(vec![0u8; TOTAL_SIZE]).unwrap();
        assert_eq!(image.full_pages(), 65536);
        assert_eq!(image.partial_len(), 0);
        assert_eq!(image.pages().last().map(|(page, _)| page), Some(65535));
    }

    #[test]
    fn test_partial_page_split() {
        let image = Image::new(vec![0x5A; 300]).unwrap();
        assert_eq!(image.full_pages(), 1);
        assert_eq!(image.partial_len(), 44);
        assert_eq!(image.page_count(), 2);

        let pages: Vec<_> = image.pages().map(|(i, d)| (i, d.len())).collect();
        assert_eq!(pages, vec![(0, 256), (1, 44)]);
    }

    #[test]
    fn test_single_byte_image() {
        let image = Image::new(vec![0x00]).unwrap();
        assert_eq!(image.full_pages(), 0);
        assert_eq!(image.partial_len(), 1);
        assert_eq!(image.pages().count(), 1);
    }
}
