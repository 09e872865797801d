// ============================================================================
// SCALED SOURCE CACHE — memoized downscale of the blur input
// ============================================================================
//
// Blurring a full-resolution photo for a small on-screen target wastes most
// of the convolution work, so the source is first downscaled to cover the
// target. The expensive resample is keyed on the requested target size and
// reused across radius changes; only a size change invalidates it.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};

use crate::bitmap::{Bitmap, PixelBuffer, PixelSize};

/// The resampling primitive. A seam so the cache policy can be exercised
/// with call counters and injected failures.
pub trait Resampler: Send + Sync {
    /// Resample `src` to exactly `width` x `height`. `None` signals failure
    /// (allocation or conversion error); the pipeline then falls back to the
    /// unmodified source image.
    fn resample(&self, src: &PixelBuffer, width: u32, height: u32) -> Option<PixelBuffer>;
}

/// High-quality resampling via the `image` crate's Lanczos3 filter.
pub struct LanczosResampler;

impl Resampler for LanczosResampler {
    fn resample(&self, src: &PixelBuffer, width: u32, height: u32) -> Option<PixelBuffer> {
        if width == 0 || height == 0 {
            return None;
        }
        // Borrow the raw bytes as an image view; no copy of the source.
        let view: ImageBuffer<Rgba<u8>, &[u8]> =
            ImageBuffer::from_raw(src.width, src.height, src.data.as_slice())?;
        let scaled = imageops::resize(&view, width, height, FilterType::Lanczos3);
        PixelBuffer::from_image(&scaled).ok()
    }
}

/// At most one cached buffer plus the target size it was computed for.
#[derive(Default)]
pub struct SourceCache {
    key: Option<PixelSize>,
    buffer: Option<PixelBuffer>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The blur input for `target`: the source downscaled to cover the target,
    /// or the source unscaled when it is not strictly larger in both
    /// dimensions. Recomputed only when the requested size changes; a failed
    /// recompute caches the failure for that size (`None` until the size
    /// changes again).
    pub fn scaled_for(
        &mut self,
        source: &Bitmap,
        target: PixelSize,
        resampler: &dyn Resampler,
    ) -> Option<&PixelBuffer> {
        if self.key != Some(target) {
            self.buffer = Self::compute(source, target, resampler);
            self.key = Some(target);
        }
        self.buffer.as_ref()
    }

    fn compute(
        source: &Bitmap,
        target: PixelSize,
        resampler: &dyn Resampler,
    ) -> Option<PixelBuffer> {
        let decoded = match source.decode() {
            Ok(buffer) => buffer,
            Err(e) => {
                crate::log_warn!("blur cache: decode failed: {}", e);
                return None;
            }
        };

        // Uniform downscale that covers the target in both dimensions.
        // Never upscale: a source not strictly larger than the target in
        // both dimensions is used as-is.
        let mut ratio = 1.0f64;
        if decoded.width > target.width && decoded.height > target.height {
            ratio = f64::max(
                target.width as f64 / decoded.width as f64,
                target.height as f64 / decoded.height as f64,
            );
        }
        if ratio == 1.0 {
            return Some(decoded);
        }

        let dst_w = (decoded.width as f64 * ratio).floor() as u32;
        let dst_h = (decoded.height as f64 * ratio).floor() as u32;
        match resampler.resample(&decoded, dst_w, dst_h) {
            Some(scaled) => Some(scaled),
            None => {
                crate::log_warn!(
                    "blur cache: resample to {}x{} failed, falling back to original",
                    dst_w,
                    dst_h
                );
                None
            }
        }
    }
}
