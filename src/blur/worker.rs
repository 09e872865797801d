// ============================================================================
// BLUR WORKER — one source image plus its scaled-source cache
// ============================================================================

use std::sync::{Arc, Mutex};

use crate::bitmap::{Bitmap, PixelSize};

use super::cache::{LanczosResampler, Resampler, SourceCache};

/// Wraps an image and keeps the downscaled blur input cached across calls,
/// so repeated radius changes at a stable target size (a slider dragging
/// over the same view) pay the expensive resample only once.
pub struct BlurWorker {
    image: Arc<Bitmap>,
    cache: Mutex<SourceCache>,
    resampler: Arc<dyn Resampler>,
}

impl BlurWorker {
    pub fn new(image: Arc<Bitmap>) -> Self {
        Self::with_resampler(image, Arc::new(LanczosResampler))
    }

    /// Construct with a custom resampling primitive.
    pub fn with_resampler(image: Arc<Bitmap>, resampler: Arc<dyn Resampler>) -> Self {
        Self { image, cache: Mutex::new(SourceCache::new()), resampler }
    }

    /// The wrapped source image.
    pub fn image(&self) -> &Arc<Bitmap> {
        &self.image
    }

    /// Blur the wrapped image to `radius` for the given target pixel size.
    ///
    /// `radius <= 0` and every failure path return the original image; the
    /// result always carries the original's scale and orientation.
    pub fn blur(&self, radius: f32, target: PixelSize) -> Arc<Bitmap> {
        if radius <= 0.0 {
            return Arc::clone(&self.image);
        }
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        match super::blur_scaled(&self.image, &mut cache, radius, target, self.resampler.as_ref())
        {
            Some(blurred) => Arc::new(blurred),
            None => Arc::clone(&self.image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Orientation;
    use crate::blur::testing::{CountingResampler, FailingResampler};
    use image::{Rgba, RgbaImage};

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([230, 230, 230, 255])
            } else {
                Rgba([20, 20, 20, 255])
            }
        })
    }

    fn worker_with_counter(w: u32, h: u32) -> (BlurWorker, Arc<CountingResampler>) {
        let resampler = Arc::new(CountingResampler::new());
        let image = Arc::new(Bitmap::with_metadata(checker(w, h), 2.0, Orientation::Right));
        let worker = BlurWorker::with_resampler(image, resampler.clone());
        (worker, resampler)
    }

    #[test]
    fn zero_radius_returns_the_original_untouched() {
        let (worker, resampler) = worker_with_counter(64, 64);
        let out = worker.blur(0.0, PixelSize::new(16, 16));
        assert!(Arc::ptr_eq(&out, worker.image()));
        assert_eq!(resampler.calls(), 0);
    }

    #[test]
    fn repeated_radii_share_one_resample() {
        let (worker, resampler) = worker_with_counter(256, 256);
        let target = PixelSize::new(32, 32);
        let mut results = Vec::new();
        for radius in [1.0f32, 3.0, 6.0, 9.0, 12.0] {
            results.push(worker.blur(radius, target));
        }
        assert_eq!(resampler.calls(), 1);
        // Each radius convolved independently: outputs differ.
        assert_ne!(results[0].pixels().as_raw(), results[4].pixels().as_raw());
    }

    #[test]
    fn changing_target_size_invalidates_the_cache() {
        let (worker, resampler) = worker_with_counter(256, 256);
        worker.blur(4.0, PixelSize::new(32, 32));
        worker.blur(4.0, PixelSize::new(48, 48));
        worker.blur(7.0, PixelSize::new(48, 48));
        assert_eq!(resampler.calls(), 2);
    }

    #[test]
    fn blurred_output_has_the_downscaled_dimensions_and_original_metadata() {
        let image = Arc::new(Bitmap::with_metadata(checker(512, 512), 3.0, Orientation::Left));
        let worker = BlurWorker::new(image);
        let out = worker.blur(10.0, PixelSize::new(64, 64));
        assert_eq!((out.width(), out.height()), (64, 64));
        assert_eq!(out.scale(), 3.0);
        assert_eq!(out.orientation(), Orientation::Left);
    }

    #[test]
    fn resample_failure_degrades_to_the_original() {
        let image = Arc::new(Bitmap::new(checker(128, 128)));
        let worker = BlurWorker::with_resampler(image, Arc::new(FailingResampler));
        let out = worker.blur(5.0, PixelSize::new(16, 16));
        assert!(Arc::ptr_eq(&out, worker.image()));
    }

    #[test]
    fn small_source_blurs_at_native_size() {
        // Source not strictly larger than the target: no downscale, output
        // keeps the source dimensions.
        let image = Arc::new(Bitmap::new(checker(24, 24)));
        let worker = BlurWorker::new(image);
        let out = worker.blur(2.0, PixelSize::new(100, 100));
        assert_eq!((out.width(), out.height()), (24, 24));
    }
}
