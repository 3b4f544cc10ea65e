//! DXT3 and DXT5 block compression.
//!
//! Both formats store 4x4 pixel blocks of 16 bytes. The last 8 bytes of a block
//! are a DXT1 style color block: two RGB565 endpoints followed by 2 bit palette
//! indices. The first 8 bytes hold alpha, either as 16 explicit 4 bit values
//! (DXT3) or as two endpoints and 3 bit indices into an interpolated ramp
//! (DXT5).
//!
//! Rows of blocks touch disjoint input and output ranges, so both directions
//! are split per block row and may run on the rayon pool.

use byteorder::{ByteOrder, LittleEndian};

use crate::bitmap::{Bitmap, PIXEL_SIZE};
use crate::pixel::{bgra_to_rgb565, expand4, rgb565_to_bgra};

/// Bytes in a single compressed block
pub const BLOCK_SIZE: usize = 16;

type Pixels = [[u8; 4]; 16];

/// Alpha encoding used inside a block
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockAlpha {
    /// 4 bit explicit alpha
    Explicit,
    /// Interpolated alpha ramp
    Interpolated,
}

fn color_palette(c0: u16, c1: u16) -> [[u8; 4]; 4] {
    let a = rgb565_to_bgra(c0);
    let b = rgb565_to_bgra(c1);
    let mix = |wa: u16, wb: u16, div: u16| -> [u8; 4] {
        let channel = |i: usize| ((wa * a[i] as u16 + wb * b[i] as u16) / div) as u8;
        [channel(0), channel(1), channel(2), 0xFF]
    };

    if c0 > c1 {
        [a, b, mix(2, 1, 3), mix(1, 2, 3)]
    } else {
        [a, b, mix(1, 1, 2), [0x00, 0x00, 0x00, 0xFF]]
    }
}

fn alpha_ramp(a0: u8, a1: u8) -> [u8; 8] {
    let (a0w, a1w) = (a0 as u16, a1 as u16);
    let mut ramp = [a0, a1, 0, 0, 0, 0, 0, 0];
    if a0 > a1 {
        for i in 1..7u16 {
            ramp[i as usize + 1] = (((7 - i) * a0w + i * a1w) / 7) as u8;
        }
    } else {
        for i in 1..5u16 {
            ramp[i as usize + 1] = (((5 - i) * a0w + i * a1w) / 5) as u8;
        }
        ramp[6] = 0x00;
        ramp[7] = 0xFF;
    }
    ramp
}

fn decode_color(block: &[u8], pixels: &mut Pixels) {
    let c0 = LittleEndian::read_u16(&block[0..2]);
    let c1 = LittleEndian::read_u16(&block[2..4]);
    let palette = color_palette(c0, c1);

    for (row, &bits) in block[4..8].iter().enumerate() {
        for col in 0..4 {
            let index = (bits >> (col * 2)) & 0x03;
            let color = palette[index as usize];
            let pixel = &mut pixels[row * 4 + col];
            pixel[..3].copy_from_slice(&color[..3]);
        }
    }
}

/// Decode a single DXT3 block into BGRA pixels, row major
pub fn decode_dxt3_block(block: &[u8]) -> Pixels {
    let mut pixels = [[0u8; 4]; 16];
    for (i, &byte) in block[..8].iter().enumerate() {
        pixels[i * 2][3] = expand4(byte & 0x0F);
        pixels[i * 2 + 1][3] = expand4(byte >> 4);
    }
    decode_color(&block[8..16], &mut pixels);
    pixels
}

/// Decode a single DXT5 block into BGRA pixels, row major
pub fn decode_dxt5_block(block: &[u8]) -> Pixels {
    let mut pixels = [[0u8; 4]; 16];
    let ramp = alpha_ramp(block[0], block[1]);
    let bits = LittleEndian::read_u48(&block[2..8]);
    for (i, pixel) in pixels.iter_mut().enumerate() {
        pixel[3] = ramp[((bits >> (3 * i)) & 0x07) as usize];
    }
    decode_color(&block[8..16], &mut pixels);
    pixels
}

fn distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

fn nearest<T>(candidates: &[T], mut dist: impl FnMut(&T) -> u32) -> usize {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| dist(c))
        .map(|(i, _)| i)
        .unwrap_or_default()
}

fn encode_color(pixels: &Pixels, out: &mut [u8]) {
    let mut max = [0u8; 3];
    let mut min = [0xFFu8; 3];
    for p in pixels {
        for c in 0..3 {
            max[c] = max[c].max(p[c]);
            min[c] = min[c].min(p[c]);
        }
    }

    let c0 = bgra_to_rgb565([max[0], max[1], max[2], 0xFF]);
    let c1 = bgra_to_rgb565([min[0], min[1], min[2], 0xFF]);
    let palette = color_palette(c0, c1);

    LittleEndian::write_u16(&mut out[0..2], c0);
    LittleEndian::write_u16(&mut out[2..4], c1);
    for row in 0..4 {
        let mut bits = 0u8;
        for col in 0..4 {
            let pixel = &pixels[row * 4 + col];
            let index = nearest(&palette, |c| distance(&c[..3], &pixel[..3]));
            bits |= (index as u8) << (col * 2);
        }
        out[4 + row] = bits;
    }
}

/// Encode 16 BGRA pixels as a DXT3 block
pub fn encode_dxt3_block(pixels: &Pixels) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    let quantize = |a: u8| ((a as u16 * 15 + 127) / 255) as u8;
    for i in 0..8 {
        block[i] = quantize(pixels[i * 2][3]) | (quantize(pixels[i * 2 + 1][3]) << 4);
    }
    encode_color(pixels, &mut block[8..16]);
    block
}

/// Encode 16 BGRA pixels as a DXT5 block
pub fn encode_dxt5_block(pixels: &Pixels) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    let a0 = pixels.iter().map(|p| p[3]).max().unwrap_or(0xFF);
    let a1 = pixels.iter().map(|p| p[3]).min().unwrap_or(0xFF);
    block[0] = a0;
    block[1] = a1;

    if a0 != a1 {
        let ramp = alpha_ramp(a0, a1);
        let mut bits = 0u64;
        for (i, p) in pixels.iter().enumerate() {
            let index = nearest(&ramp, |&r| r.abs_diff(p[3]) as u32);
            bits |= (index as u64) << (3 * i);
        }
        LittleEndian::write_u48(&mut block[2..8], bits);
    }
    encode_color(pixels, &mut block[8..16]);
    block
}

fn block_fn(alpha: BlockAlpha) -> fn(&[u8]) -> Pixels {
    match alpha {
        BlockAlpha::Explicit => decode_dxt3_block,
        BlockAlpha::Interpolated => decode_dxt5_block,
    }
}

/// Decode block data into a bitmap. `raw` must hold every block of the image.
pub fn decode(raw: &[u8], width: usize, height: usize, alpha: BlockAlpha, parallel: bool) -> Bitmap {
    let mut out = vec![0u8; width * height * PIXEL_SIZE];
    if width == 0 || height == 0 {
        return Bitmap::from_raw_parts(width, height, out);
    }

    let blocks_wide = width.div_ceil(4);
    let row_in = blocks_wide * BLOCK_SIZE;
    let row_out = width * 4 * PIXEL_SIZE;
    let decode_block = block_fn(alpha);

    let decode_row = |(by, dst): (usize, &mut [u8])| {
        let src = &raw[by * row_in..(by + 1) * row_in];
        let rows = dst.len() / (width * PIXEL_SIZE);
        for (bx, block) in src.chunks_exact(BLOCK_SIZE).enumerate() {
            let pixels = decode_block(block);
            for j in 0..rows {
                for i in 0..4 {
                    let x = bx * 4 + i;
                    if x >= width {
                        break;
                    }
                    let offset = (j * width + x) * PIXEL_SIZE;
                    dst[offset..offset + PIXEL_SIZE].copy_from_slice(&pixels[j * 4 + i]);
                }
            }
        }
    };

    #[cfg(feature = "parallel")]
    {
        if parallel {
            use rayon::prelude::*;
            out.par_chunks_mut(row_out)
                .enumerate()
                .for_each(&decode_row);
            return Bitmap::from_raw_parts(width, height, out);
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    out.chunks_mut(row_out).enumerate().for_each(decode_row);
    Bitmap::from_raw_parts(width, height, out)
}

/// Encode a bitmap as block data, edge blocks repeat the border pixels
pub fn encode(bitmap: &Bitmap, alpha: BlockAlpha, parallel: bool) -> Vec<u8> {
    let width = bitmap.width() as usize;
    let height = bitmap.height() as usize;
    let blocks_wide = width.div_ceil(4);
    let blocks_high = height.div_ceil(4);
    let row_out = blocks_wide * BLOCK_SIZE;
    let mut out = vec![0u8; blocks_wide * blocks_high * BLOCK_SIZE];
    if out.is_empty() {
        return out;
    }

    let encode_block = match alpha {
        BlockAlpha::Explicit => encode_dxt3_block,
        BlockAlpha::Interpolated => encode_dxt5_block,
    };

    let encode_row = |(by, dst): (usize, &mut [u8])| {
        for (bx, block) in dst.chunks_exact_mut(BLOCK_SIZE).enumerate() {
            let mut pixels = [[0u8; 4]; 16];
            for (k, pixel) in pixels.iter_mut().enumerate() {
                let x = (bx * 4 + k % 4).min(width - 1);
                let y = (by * 4 + k / 4).min(height - 1);
                let offset = (y * width + x) * PIXEL_SIZE;
                pixel.copy_from_slice(&bitmap.data()[offset..offset + PIXEL_SIZE]);
            }
            block.copy_from_slice(&encode_block(&pixels));
        }
    };

    #[cfg(feature = "parallel")]
    {
        if parallel {
            use rayon::prelude::*;
            out.par_chunks_mut(row_out)
                .enumerate()
                .for_each(&encode_row);
            return out;
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    out.chunks_mut(row_out).enumerate().for_each(encode_row);
    out
}
