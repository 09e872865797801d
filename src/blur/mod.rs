// ============================================================================
// BLUR PIPELINE — cached, scheduled CPU blur for interactive image views
// ============================================================================
//
// Layers, leaves first:
//   engine     — separable tent convolution
//   cache      — memoized downscale of the blur input
//   worker     — one source image + its cache
//   scheduler  — single-flight, latest-wins task queue

pub mod cache;
pub mod engine;
pub mod scheduler;
pub mod worker;

pub use cache::{LanczosResampler, Resampler, SourceCache};
pub use scheduler::{BlurScheduler, BlurTask, ConsumerId};
pub use worker::BlurWorker;

use crate::bitmap::{Bitmap, PixelSize};

/// Scale (through `cache`) then convolve then re-encode. `None` means the
/// pipeline failed somewhere and the caller should fall back to the
/// unmodified source image.
pub(crate) fn blur_scaled(
    source: &Bitmap,
    cache: &mut SourceCache,
    radius: f32,
    target: PixelSize,
    resampler: &dyn Resampler,
) -> Option<Bitmap> {
    let scaled = cache.scaled_for(source, target, resampler)?;
    match engine::tent_blur(scaled, radius) {
        Ok(out) => match Bitmap::from_buffer(out, source.scale(), source.orientation()) {
            Ok(bitmap) => Some(bitmap),
            Err(e) => {
                crate::log_err!("blur: re-encode failed: {}", e);
                None
            }
        },
        Err(e) => {
            crate::log_warn!("blur: tent convolve failed: {}", e);
            None
        }
    }
}

/// Blur a single image once, without a persistent cache. Repeated calls pay
/// the scale cost every time — use a [`BlurWorker`] when the same image is
/// blurred at varying radii.
///
/// Returns the source unchanged for `radius <= 0`, and `None` when the
/// pipeline fails (the caller shows the unblurred image).
pub fn render_once(source: &Bitmap, radius: f32, target: PixelSize) -> Option<Bitmap> {
    if radius <= 0.0 {
        return Some(source.clone());
    }
    let mut cache = SourceCache::new();
    blur_scaled(source, &mut cache, radius, target, &LanczosResampler)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::cache::{LanczosResampler, Resampler};
    use crate::bitmap::PixelBuffer;

    /// Lanczos resampler that counts how many times it runs.
    pub struct CountingResampler {
        calls: AtomicUsize,
        inner: LanczosResampler,
    }

    impl CountingResampler {
        pub fn new() -> Self {
            Self { calls: AtomicUsize::new(0), inner: LanczosResampler }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Resampler for CountingResampler {
        fn resample(&self, src: &PixelBuffer, width: u32, height: u32) -> Option<PixelBuffer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resample(src, width, height)
        }
    }

    /// Resampler that always reports failure.
    pub struct FailingResampler;

    impl Resampler for FailingResampler {
        fn resample(&self, _src: &PixelBuffer, _w: u32, _h: u32) -> Option<PixelBuffer> {
            None
        }
    }
}
