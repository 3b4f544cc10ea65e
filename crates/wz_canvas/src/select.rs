//! Automatic pixel format selection for re-encoded bitmaps.

use std::collections::HashSet;

use crate::bitmap::Bitmap;
use crate::format::PixelFormat;
use crate::pixel::{bgra_to_rgb565, rgb565_to_bgra};
use crate::CodecOptions;

/// Alpha values within this distance of 0 or 255 count as binary
pub const ALPHA_TOLERANCE: u8 = 8;

/// Maximum channel spread for a pixel to count as gray
pub const GRAY_TOLERANCE: u8 = 6;

/// Distinct colors above which an image counts as detailed
pub const MANY_COLORS: usize = 256;

/// Distinct alpha levels that survive 4 bit quantization
pub const FEW_ALPHA_LEVELS: usize = 16;

/// Opaque images up to this many pixels always use RGB565
pub const SMALL_IMAGE_PIXELS: usize = 64 * 64;

/// Mean alpha step between neighbours below which alpha counts as smooth
pub const SMOOTH_GRADIENT: f64 = 32.0;

/// Statistics gathered in a single pass over a bitmap
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapAnalysis {
    pub distinct_colors: usize,
    pub distinct_alpha: usize,
    pub has_alpha: bool,
    pub has_partial_alpha: bool,
    pub is_grayscale: bool,
    pub fits_rgb565: bool,
    /// Mean absolute alpha difference over horizontally adjacent pixels whose
    /// alpha differs
    pub alpha_gradient: f64,
    pub block_aligned: bool,
    pub pixels: usize,
}

impl BitmapAnalysis {
    pub fn of(bitmap: &Bitmap) -> Self {
        let mut colors = HashSet::new();
        let mut alphas = [false; 256];
        let mut has_alpha = false;
        let mut has_partial_alpha = false;
        let mut is_grayscale = true;
        let mut fits_rgb565 = true;
        let mut gradient_sum = 0u64;
        let mut gradient_count = 0u64;

        let width = bitmap.width() as usize;
        for (i, p) in bitmap.pixels().enumerate() {
            let [b, g, r, a] = p;
            colors.insert(u32::from_le_bytes([b, g, r, 0]));
            alphas[a as usize] = true;

            if a != 0xFF {
                has_alpha = true;
                if a > ALPHA_TOLERANCE && a < 0xFF - ALPHA_TOLERANCE {
                    has_partial_alpha = true;
                }
            }
            if r.abs_diff(g) > GRAY_TOLERANCE || g.abs_diff(b) > GRAY_TOLERANCE {
                is_grayscale = false;
            }
            if fits_rgb565 && rgb565_to_bgra(bgra_to_rgb565(p))[..3] != p[..3] {
                fits_rgb565 = false;
            }
            if width > 0 && i % width != 0 {
                let left = bitmap.data()[(i - 1) * 4 + 3];
                let step = left.abs_diff(a);
                if step != 0 {
                    gradient_sum += step as u64;
                    gradient_count += 1;
                }
            }
        }

        Self {
            distinct_colors: colors.len(),
            distinct_alpha: alphas.iter().filter(|&&seen| seen).count(),
            has_alpha,
            has_partial_alpha,
            is_grayscale,
            fits_rgb565,
            alpha_gradient: if gradient_count == 0 {
                0.0
            } else {
                gradient_sum as f64 / gradient_count as f64
            },
            block_aligned: bitmap.width() % 4 == 0 && bitmap.height() % 4 == 0,
            pixels: width * bitmap.height() as usize,
        }
    }

    /// Pick the format that stores this image best
    pub fn select(&self, options: &CodecOptions) -> PixelFormat {
        let dxt = self.block_aligned && options.allow_dxt;

        if self.is_grayscale && self.has_alpha && dxt {
            return PixelFormat::Dxt3Gray;
        }

        if !self.has_alpha {
            return if self.fits_rgb565 || self.pixels <= SMALL_IMAGE_PIXELS {
                PixelFormat::Rgb565
            } else {
                PixelFormat::Bgra8888
            };
        }

        if self.distinct_colors > MANY_COLORS {
            if dxt {
                return if self.has_partial_alpha && self.alpha_gradient < SMOOTH_GRADIENT {
                    PixelFormat::Dxt5
                } else {
                    PixelFormat::Dxt3
                };
            }
            return if !self.has_partial_alpha {
                PixelFormat::Argb1555
            } else if self.distinct_alpha <= FEW_ALPHA_LEVELS {
                PixelFormat::Bgra4444
            } else {
                PixelFormat::Bgra8888
            };
        }

        if !self.has_partial_alpha {
            PixelFormat::Argb1555
        } else if self.distinct_alpha <= FEW_ALPHA_LEVELS {
            PixelFormat::Bgra4444
        } else if dxt {
            PixelFormat::Dxt3
        } else {
            PixelFormat::Bgra8888
        }
    }
}

/// Analyse `bitmap` and pick a storage format for it
pub fn select_format(bitmap: &Bitmap, options: &CodecOptions) -> PixelFormat {
    BitmapAnalysis::of(bitmap).select(options)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::bitmap::Bitmap;
    use crate::format::PixelFormat;
    use crate::select::{select_format, BitmapAnalysis};
    use crate::CodecOptions;

    fn gradient(width: u32, height: u32, alpha: impl Fn(u32, u32) -> u8) -> Bitmap {
        let mut bitmap = Bitmap::filled(width, height, [0, 0, 0, 0]);
        for y in 0..height {
            for x in 0..width {
                let b = (x * 255 / width.max(1)) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                bitmap.set_pixel(x, y, [b, g, b ^ g, alpha(x, y)]);
            }
        }
        bitmap
    }

    #[test]
    fn opaque_small_image_is_rgb565() {
        let bitmap = gradient(32, 32, |_, _| 0xFF);
        assert_eq!(select_format(&bitmap, &CodecOptions::default()), PixelFormat::Rgb565);
    }

    #[test]
    fn opaque_large_detailed_image_is_bgra8888() {
        let bitmap = gradient(128, 128, |_, _| 0xFF);
        let analysis = BitmapAnalysis::of(&bitmap);
        assert!(!analysis.fits_rgb565);
        assert_eq!(analysis.select(&CodecOptions::default()), PixelFormat::Bgra8888);
    }

    #[test]
    fn grayscale_with_alpha_is_dxt3_gray() {
        let bitmap = Bitmap::filled(8, 8, [0x80, 0x82, 0x7F, 0x40]);
        assert_eq!(select_format(&bitmap, &CodecOptions::default()), PixelFormat::Dxt3Gray);
    }

    #[test]
    fn smooth_alpha_prefers_dxt5() {
        let bitmap = gradient(64, 64, |x, _| (x * 4) as u8);
        let analysis = BitmapAnalysis::of(&bitmap);
        assert!(analysis.has_partial_alpha);
        assert!(analysis.alpha_gradient < 32.0);
        assert_eq!(analysis.select(&CodecOptions::default()), PixelFormat::Dxt5);
    }

    #[test]
    fn sharp_alpha_prefers_dxt3() {
        let bitmap = gradient(64, 64, |x, _| if x % 2 == 0 { 0x00 } else { 0x80 });
        assert_eq!(select_format(&bitmap, &CodecOptions::default()), PixelFormat::Dxt3);
    }

    #[test]
    fn binary_alpha_without_dxt_is_argb1555() {
        let bitmap = gradient(64, 64, |x, _| if x < 32 { 0x00 } else { 0xFF });
        let options = CodecOptions::builder().allow_dxt(false).build();
        assert_eq!(select_format(&bitmap, &options), PixelFormat::Argb1555);
    }

    #[test]
    fn few_colors_few_alpha_levels_is_bgra4444() {
        let bitmap = gradient(2, 2, |x, y| ((x + y) * 0x44) as u8);
        assert_eq!(select_format(&bitmap, &CodecOptions::default()), PixelFormat::Bgra4444);
    }

    #[test]
    fn unaligned_images_never_pick_dxt() {
        let bitmap = gradient(63, 64, |x, _| (x * 4) as u8);
        let format = select_format(&bitmap, &CodecOptions::default());
        assert!(!format.is_block_compressed());
    }
}
