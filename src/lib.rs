// ============================================================================
// FastBlur — asynchronous, cached CPU image blur for interactive views
// ============================================================================
//
// A consumer (typically an image view bound to a slider) submits "blur this
// image to radius R for target size S" tasks to a shared scheduler. Blur
// work runs on one background thread, newest request first, and redundant
// requests for the same consumer are coalesced away. A per-image worker
// caches the downscaled blur input so dragging a radius slider pays the
// expensive resample only once per view size.

pub mod bitmap;
pub mod blur;
pub mod logger;

pub use bitmap::{Bitmap, Orientation, PixelBuffer, PixelSize};
pub use blur::{BlurScheduler, BlurTask, BlurWorker, ConsumerId};
