//! LC-3 program image format.
//!
//! An image (`.obj`) is a flat big-endian byte stream:
//! - the first word is the origin, the address the program loads at
//! - every following word is copied into memory from the origin upwards

use crate::cpu::memory::MEMORY_SIZE;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// A parsed program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    /// Load address of the first word.
    pub origin: u16,
    /// Program words, in load order.
    pub words: Vec<u16>,
}

impl ProgramImage {
    /// Parse an image from its raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < 2 {
            return Err(ImageError::MissingOrigin);
        }
        if bytes.len() % 2 != 0 {
            return Err(ImageError::OddLength(bytes.len()));
        }

        let mut words = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        let origin = words.next().ok_or(ImageError::MissingOrigin)?;
        let words: Vec<u16> = words.collect();

        if usize::from(origin) + words.len() > MEMORY_SIZE {
            return Err(ImageError::TooLarge { origin, words: words.len() });
        }

        Ok(Self { origin, words })
    }

    /// Address one past the last loaded word.
    pub fn end(&self) -> usize {
        usize::from(self.origin) + self.words.len()
    }

    /// Get the number of program words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| ImageError::Io(format!("{}: {}", path.display(), e)))?;

    let image = ProgramImage::parse(&bytes)?;
    debug!(
        "loaded {} words at {:#06x} from {}",
        image.len(),
        image.origin,
        path.display()
    );
    Ok(image)
}

/// Errors that can occur while reading an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("image is missing its origin word")]
    MissingOrigin,

    #[error("image length {0} is not a whole number of words")]
    OddLength(usize),

    #[error("{words} words at origin {origin:#06x} run past the end of memory")]
    TooLarge { origin: u16, words: usize },
}
