//! Decoded canvas pixels.

use crate::error::{Error, Result};

/// Bytes per BGRA pixel
pub const PIXEL_SIZE: usize = 4;

/// A 32-bit BGRA image, rows stored top to bottom without padding
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Wrap existing BGRA data, which has to be exactly `width * height * 4` bytes
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * PIXEL_SIZE;
        if data.len() != expected {
            return Err(Error::Validation(format!(
                "a {width}x{height} bitmap needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A bitmap filled with a single BGRA color
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let data = bgra.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub(crate) fn from_raw_parts(width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width * height * PIXEL_SIZE);
        Self {
            width: width as u32,
            height: height as u32,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// BGRA value at the given coordinate
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * PIXEL_SIZE;
        self.data[offset..offset + PIXEL_SIZE].try_into().ok()
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgra: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * PIXEL_SIZE;
        self.data[offset..offset + PIXEL_SIZE].copy_from_slice(&bgra);
    }

    /// Iterate over all pixels in row order
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.data
            .chunks_exact(PIXEL_SIZE)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }
}
