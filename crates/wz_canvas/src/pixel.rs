//! Packed 16 and 32 bit pixel formats.

use byteorder::{ByteOrder, LittleEndian};

use crate::bitmap::{Bitmap, PIXEL_SIZE};

#[inline]
pub(crate) fn expand4(v: u8) -> u8 {
    v | (v << 4)
}

#[inline]
pub(crate) fn expand5(v: u16) -> u8 {
    ((v << 3) | (v >> 2)) as u8
}

#[inline]
pub(crate) fn expand6(v: u16) -> u8 {
    ((v << 2) | (v >> 4)) as u8
}

/// RGB565 to opaque BGRA
#[inline]
pub(crate) fn rgb565_to_bgra(c: u16) -> [u8; 4] {
    [
        expand5(c & 0x1F),
        expand6((c >> 5) & 0x3F),
        expand5((c >> 11) & 0x1F),
        0xFF,
    ]
}

/// BGRA to RGB565, dropping alpha
#[inline]
pub(crate) fn bgra_to_rgb565(p: [u8; 4]) -> u16 {
    ((p[2] as u16 >> 3) << 11) | ((p[1] as u16 >> 2) << 5) | (p[0] as u16 >> 3)
}

/// Each byte holds two channels, low nibble first: B|G, R|A
pub(crate) fn decode_bgra4444(raw: &[u8], width: usize, height: usize) -> Bitmap {
    let pixels = width * height;
    let mut out = Vec::with_capacity(pixels * PIXEL_SIZE);
    for &byte in &raw[..pixels * 2] {
        out.push(expand4(byte & 0x0F));
        out.push(expand4(byte >> 4));
    }
    Bitmap::from_raw_parts(width, height, out)
}

pub(crate) fn encode_bgra4444(bitmap: &Bitmap) -> Vec<u8> {
    bitmap
        .data()
        .chunks_exact(2)
        .map(|pair| (pair[0] >> 4) | (pair[1] & 0xF0))
        .collect()
}

pub(crate) fn decode_bgra8888(raw: &[u8], width: usize, height: usize) -> Bitmap {
    Bitmap::from_raw_parts(width, height, raw[..width * height * PIXEL_SIZE].to_vec())
}

fn decode_rows16(
    raw: &[u8],
    width: usize,
    height: usize,
    convert: impl Fn(u16) -> [u8; 4],
) -> Bitmap {
    let stride = width * 2;
    let mut out = vec![0u8; width * height * PIXEL_SIZE];
    for (src, dst) in raw
        .chunks_exact(stride.max(1))
        .zip(out.chunks_exact_mut((width * PIXEL_SIZE).max(1)))
        .take(height)
    {
        for (sample, pixel) in src.chunks_exact(2).zip(dst.chunks_exact_mut(PIXEL_SIZE)) {
            pixel.copy_from_slice(&convert(LittleEndian::read_u16(sample)));
        }
    }
    Bitmap::from_raw_parts(width, height, out)
}

fn encode16(bitmap: &Bitmap, convert: impl Fn([u8; 4]) -> u16) -> Vec<u8> {
    let mut out = vec![0u8; bitmap.width() as usize * bitmap.height() as usize * 2];
    for (pixel, dst) in bitmap.pixels().zip(out.chunks_exact_mut(2)) {
        LittleEndian::write_u16(dst, convert(pixel));
    }
    out
}

pub(crate) fn decode_argb1555(raw: &[u8], width: usize, height: usize) -> Bitmap {
    decode_rows16(raw, width, height, |c| {
        [
            expand5(c & 0x1F),
            expand5((c >> 5) & 0x1F),
            expand5((c >> 10) & 0x1F),
            if c & 0x8000 != 0 { 0xFF } else { 0x00 },
        ]
    })
}

pub(crate) fn encode_argb1555(bitmap: &Bitmap) -> Vec<u8> {
    encode16(bitmap, |p| {
        let alpha = if p[3] >= 0x80 { 0x8000 } else { 0 };
        alpha | ((p[2] as u16 >> 3) << 10) | ((p[1] as u16 >> 3) << 5) | (p[0] as u16 >> 3)
    })
}

pub(crate) fn decode_rgb565(raw: &[u8], width: usize, height: usize) -> Bitmap {
    decode_rows16(raw, width, height, rgb565_to_bgra)
}

pub(crate) fn encode_rgb565(bitmap: &Bitmap) -> Vec<u8> {
    encode16(bitmap, bgra_to_rgb565)
}

/// One RGB565 sample covers a 16x16 tile.
///
/// The first pixel row of each tile row is expanded sample by sample, the
/// remaining fifteen rows are copies of it.
pub(crate) fn decode_rgb565_tiled(raw: &[u8], width: usize, height: usize) -> Bitmap {
    let mut out = vec![0u8; width * height * PIXEL_SIZE];
    let row_len = width * PIXEL_SIZE;
    let tiles_wide = width / 16;

    for tile_y in 0..height / 16 {
        let line = tile_y * 16 * row_len;
        for tile_x in 0..tiles_wide {
            let index = (tile_y * tiles_wide + tile_x) * 2;
            let color = rgb565_to_bgra(LittleEndian::read_u16(&raw[index..index + 2]));
            let start = line + tile_x * 16 * PIXEL_SIZE;
            for pixel in out[start..start + 16 * PIXEL_SIZE].chunks_exact_mut(PIXEL_SIZE) {
                pixel.copy_from_slice(&color);
            }
        }
        for k in 1..16 {
            out.copy_within(line..line + row_len, line + k * row_len);
        }
    }
    Bitmap::from_raw_parts(width, height, out)
}
