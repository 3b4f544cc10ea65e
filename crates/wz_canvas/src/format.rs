//! Pixel format identifiers used by canvas nodes.

use derive_more::Display;

use crate::error::Error;

/// Storage format of a canvas payload
///
/// The discriminants are written to disk and must never change.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PixelFormat {
    /// 4 bits per channel, two bytes per pixel
    #[display("BGRA4444")]
    Bgra4444 = 1,

    /// 8 bits per channel, stored as is
    #[display("BGRA8888")]
    Bgra8888 = 2,

    /// DXT3 blocks, picked by the encoder for grayscale art with alpha
    #[display("DXT3 (grayscale)")]
    Dxt3Gray = 3,

    /// 1 bit alpha, 5 bits per color channel
    #[display("ARGB1555")]
    Argb1555 = 257,

    /// 5/6/5 bits color, fully opaque
    #[display("RGB565")]
    Rgb565 = 513,

    /// One RGB565 sample per 16x16 tile
    #[display("RGB565 (16x16 tiles)")]
    Rgb565Tiled = 517,

    /// DXT3 blocks with explicit 4 bit alpha
    #[display("DXT3")]
    Dxt3 = 1026,

    /// DXT5 blocks with interpolated alpha
    #[display("DXT5")]
    Dxt5 = 2050,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 8] = [
        PixelFormat::Bgra4444,
        PixelFormat::Bgra8888,
        PixelFormat::Dxt3Gray,
        PixelFormat::Argb1555,
        PixelFormat::Rgb565,
        PixelFormat::Rgb565Tiled,
        PixelFormat::Dxt3,
        PixelFormat::Dxt5,
    ];

    /// The on-disk id of this format
    pub const fn id(self) -> i32 {
        self as u16 as i32
    }

    /// Whether the format is made of 4x4 compressed blocks
    pub const fn is_block_compressed(self) -> bool {
        matches!(
            self,
            PixelFormat::Dxt3Gray | PixelFormat::Dxt3 | PixelFormat::Dxt5
        )
    }

    /// Inflate buffer size the client allocates for an image of this format.
    ///
    /// For the block formats this is an upper bound rather than the exact
    /// amount of block data. `None` when the size does not fit in memory.
    pub fn decoded_len(self, width: usize, height: usize) -> Option<usize> {
        let pixels = width.checked_mul(height)?;
        match self {
            PixelFormat::Bgra4444 | PixelFormat::Argb1555 | PixelFormat::Rgb565 => pixels.checked_mul(2),
            PixelFormat::Bgra8888 | PixelFormat::Dxt3Gray | PixelFormat::Dxt3 => pixels.checked_mul(4),
            PixelFormat::Rgb565Tiled => Some(pixels / 128),
            PixelFormat::Dxt5 => Some(pixels),
        }
    }

    /// Number of bytes the decoder actually consumes for the given geometry
    pub fn required_len(self, width: usize, height: usize) -> Option<usize> {
        match self {
            PixelFormat::Bgra4444 | PixelFormat::Argb1555 | PixelFormat::Rgb565 => {
                width.checked_mul(height)?.checked_mul(2)
            }
            PixelFormat::Bgra8888 => width.checked_mul(height)?.checked_mul(4),
            PixelFormat::Rgb565Tiled => (width / 16).checked_mul(height / 16)?.checked_mul(2),
            PixelFormat::Dxt3Gray | PixelFormat::Dxt3 | PixelFormat::Dxt5 => width
                .div_ceil(4)
                .checked_mul(height.div_ceil(4))?
                .checked_mul(16),
        }
    }

    /// Bytes to request from the inflater, enough for both the client's
    /// buffer and the decoder's needs
    pub fn inflate_limit(self, width: usize, height: usize) -> Option<usize> {
        let decoded = self.decoded_len(width, height)?;
        let required = self.required_len(width, height)?;
        Some(decoded.max(required))
    }
}

impl TryFrom<i32> for PixelFormat {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        PixelFormat::ALL
            .into_iter()
            .find(|f| f.id() == value)
            .ok_or(Error::UnknownFormat(value))
    }
}

impl From<PixelFormat> for i32 {
    fn from(value: PixelFormat) -> Self {
        value.id()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::error::Error;
    use crate::format::PixelFormat;

    #[test]
    fn ids_are_stable() {
        let ids = PixelFormat::ALL.map(PixelFormat::id);
        assert_eq!(ids, [1, 2, 3, 257, 513, 517, 1026, 2050]);
    }

    #[test]
    fn from_id() {
        assert_eq!(PixelFormat::try_from(2050).ok(), Some(PixelFormat::Dxt5));
        assert!(matches!(
            PixelFormat::try_from(4),
            Err(Error::UnknownFormat(4))
        ));
    }

    #[test]
    fn decoded_sizes() {
        assert_eq!(PixelFormat::Bgra4444.decoded_len(16, 16), Some(512));
        assert_eq!(PixelFormat::Bgra8888.decoded_len(16, 16), Some(1024));
        assert_eq!(PixelFormat::Dxt3Gray.decoded_len(16, 16), Some(1024));
        assert_eq!(PixelFormat::Argb1555.decoded_len(16, 16), Some(512));
        assert_eq!(PixelFormat::Rgb565.decoded_len(16, 16), Some(512));
        assert_eq!(PixelFormat::Rgb565Tiled.decoded_len(32, 32), Some(8));
        assert_eq!(PixelFormat::Dxt3.decoded_len(16, 16), Some(1024));
        assert_eq!(PixelFormat::Dxt5.decoded_len(16, 16), Some(256));
    }

    #[test]
    fn block_formats_cover_partial_blocks() {
        assert_eq!(PixelFormat::Dxt5.required_len(5, 3), Some(32));
        assert_eq!(PixelFormat::Dxt5.inflate_limit(1, 1), Some(16));
        assert_eq!(PixelFormat::Dxt3.inflate_limit(8, 8), Some(256));
    }

    #[test]
    fn oversized_geometry_has_no_length() {
        assert_eq!(PixelFormat::Bgra8888.required_len(usize::MAX, 2), None);
        assert_eq!(PixelFormat::Dxt5.inflate_limit(usize::MAX, usize::MAX), None);
    }
}
