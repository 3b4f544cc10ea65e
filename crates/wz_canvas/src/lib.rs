//! This library decodes and encodes the pixel payloads of **canvas** nodes in WZ archives.
//!
//! # Canvas Payload Format
//!
//! A canvas payload is a compressed block of raw pixel data. The geometry
//! (`width`, `height`) and the pixel format id are stored next to it in the
//! property tree and are needed to interpret the data.
//!
//! ## Compression
//!
//! | First two bytes           | Layout                                                     |
//! |---------------------------|------------------------------------------------------------|
//! | `78 9C`/`78 DA`/`78 01`/`78 5E` | zlib stream                                          |
//! | anything else             | repeated `u32` length + chunk, each chunk XOR-ed with the keystream, the concatenation is a zlib stream |
//!
//! ## Pixel Formats
//!
//! | Id   | Name           | Raw size        | Layout                                             |
//! |------|----------------|-----------------|----------------------------------------------------|
//! | 1    | BGRA4444       | `w*h*2`         | 4 bits per channel                                 |
//! | 2    | BGRA8888       | `w*h*4`         | 8 bits per channel                                 |
//! | 3    | DXT3 grayscale | `w*h*4` (bound) | DXT3 blocks                                        |
//! | 257  | ARGB1555       | `w*h*2`         | 1 bit alpha, 5 bits per color                      |
//! | 513  | RGB565         | `w*h*2`         | opaque 16 bit color                                |
//! | 517  | RGB565 tiles   | `w*h/128`       | one RGB565 sample per 16x16 tile                   |
//! | 1026 | DXT3           | `w*h*4` (bound) | DXT3 blocks                                        |
//! | 2050 | DXT5           | `w*h`           | DXT5 blocks                                        |
//!
//! Every format decodes to a canonical 32-bit BGRA [`Bitmap`].
//!
//! ```
//! use wz_canvas::{Bitmap, CanvasCodec, PixelFormat};
//! use wz_crypto::Keystream;
//!
//! let codec = CanvasCodec::default();
//! let red = Bitmap::filled(4, 4, [0x00, 0x00, 0xFF, 0xFF]);
//! let encoded = codec.encode(&red, Some(PixelFormat::Dxt3))?;
//! let decoded = codec.decode(&encoded.payload, &Keystream::neutral(), 4, 4, encoded.format)?;
//! assert_eq!(decoded, red);
//! # Ok::<(), wz_canvas::error::Error>(())
//! ```

use bon::Builder;
use tracing::{debug, instrument};
use wz_crypto::Keystream;

pub mod bitmap;
pub mod compression;
pub mod dxt;
pub mod error;
pub mod format;
pub mod pixel;
pub mod select;

pub use bitmap::Bitmap;
pub use format::PixelFormat;

use crate::dxt::BlockAlpha;
use crate::error::{Error, Result};

/// Settings for decoding and encoding canvas payloads
#[derive(Debug, Clone, Copy, Builder)]
pub struct CodecOptions {
    /// Whether DXT formats may be picked when selecting a format automatically.
    ///
    /// Older clients cannot read them.
    #[builder(default = true)]
    pub allow_dxt: bool,

    /// zlib level used when compressing payloads
    #[builder(default = 6)]
    pub compression_level: u32,

    /// Whether block formats are decoded on the rayon pool
    #[builder(default = true)]
    pub parallel: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// An encoded and compressed canvas ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCanvas {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// zlib compressed pixel data
    pub payload: Vec<u8>,
}

/// Largest ratio of decoded bitmap bytes to raw bytes, reached by the
/// tiled format where two bytes cover a 16x16 tile
pub const MAX_EXPANSION: usize = 512;

/// Decode raw, already decompressed pixel data
pub fn decode_pixels(
    raw: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    parallel: bool,
) -> Result<Bitmap> {
    let (w, h) = (width as usize, height as usize);
    let required = format
        .required_len(w, h)
        .ok_or_else(|| Error::Format(format!("{width}x{height} {format} is too large")))?;
    if raw.len() < required {
        return Err(Error::Truncated {
            expected: required,
            found: raw.len(),
        });
    }

    // every input byte expands to at most MAX_EXPANSION output bytes
    let output = w.checked_mul(h).and_then(|pixels| pixels.checked_mul(4));
    if output.map_or(true, |len| len > raw.len().saturating_mul(MAX_EXPANSION)) {
        return Err(Error::Format(format!(
            "{width}x{height} {format} does not fit {} bytes of pixel data",
            raw.len()
        )));
    }

    Ok(match format {
        PixelFormat::Bgra4444 => pixel::decode_bgra4444(raw, w, h),
        PixelFormat::Bgra8888 => pixel::decode_bgra8888(raw, w, h),
        PixelFormat::Argb1555 => pixel::decode_argb1555(raw, w, h),
        PixelFormat::Rgb565 => pixel::decode_rgb565(raw, w, h),
        PixelFormat::Rgb565Tiled => pixel::decode_rgb565_tiled(raw, w, h),
        PixelFormat::Dxt3Gray | PixelFormat::Dxt3 => {
            dxt::decode(raw, w, h, BlockAlpha::Explicit, parallel)
        }
        PixelFormat::Dxt5 => dxt::decode(raw, w, h, BlockAlpha::Interpolated, parallel),
    })
}

/// Encode a bitmap into raw, uncompressed pixel data
pub fn encode_pixels(bitmap: &Bitmap, format: PixelFormat, parallel: bool) -> Result<Vec<u8>> {
    Ok(match format {
        PixelFormat::Bgra4444 => pixel::encode_bgra4444(bitmap),
        PixelFormat::Bgra8888 => bitmap.data().to_vec(),
        PixelFormat::Argb1555 => pixel::encode_argb1555(bitmap),
        PixelFormat::Rgb565 => pixel::encode_rgb565(bitmap),
        PixelFormat::Dxt3Gray | PixelFormat::Dxt3 => {
            dxt::encode(bitmap, BlockAlpha::Explicit, parallel)
        }
        PixelFormat::Dxt5 => dxt::encode(bitmap, BlockAlpha::Interpolated, parallel),
        PixelFormat::Rgb565Tiled => {
            return Err(Error::Validation(format!(
                "{format} can be read but not written"
            )))
        }
    })
}

/// Entry point for turning stored payloads into bitmaps and back
#[derive(Debug, Clone, Copy, Default)]
pub struct CanvasCodec {
    options: CodecOptions,
}

impl CanvasCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Decompress and decode a stored payload
    #[instrument(skip(self, payload, keystream), fields(size = payload.len()), err)]
    pub fn decode(
        &self,
        payload: &[u8],
        keystream: &Keystream,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Bitmap> {
        let limit = format
            .inflate_limit(width as usize, height as usize)
            .ok_or_else(|| Error::Format(format!("{width}x{height} {format} is too large")))?;
        let raw = compression::decompress(payload, keystream, limit)?;
        decode_pixels(&raw, width, height, format, self.options.parallel)
    }

    /// Encode and compress a bitmap, selecting a format when none is given
    #[instrument(skip(self, bitmap), fields(width = bitmap.width(), height = bitmap.height()), err)]
    pub fn encode(&self, bitmap: &Bitmap, format: Option<PixelFormat>) -> Result<EncodedCanvas> {
        let format = match format {
            Some(format) => format,
            None => {
                let selected = select::select_format(bitmap, &self.options);
                debug!(%selected, "selected pixel format");
                selected
            }
        };

        let raw = encode_pixels(bitmap, format, self.options.parallel)?;
        Ok(EncodedCanvas {
            width: bitmap.width(),
            height: bitmap.height(),
            format,
            payload: compression::compress(&raw, self.options.compression_level)?,
        })
    }
}
