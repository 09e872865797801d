// ============================================================================
// BITMAP & PIXEL BUFFERS — decoded images and their raw packed representation
// ============================================================================

use image::RgbaImage;

/// Bytes per packed pixel. All buffers are 32-bit RGBA8888.
pub const BYTES_PER_PIXEL: usize = 4;

/// EXIF-style display orientation. The blur pipeline never rotates pixels;
/// this tag rides along unchanged so the presenting layer can apply it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    Left,
    LeftMirrored,
    Right,
    RightMirrored,
}

/// A size in physical pixels (logical points already multiplied by the
/// device pixel ratio).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Convert a size in logical points to physical pixels.
    pub fn from_points(width: f32, height: f32, scale: f32) -> Self {
        Self {
            width: (width * scale).round().max(0.0) as u32,
            height: (height * scale).round().max(0.0) as u32,
        }
    }
}

/// A decoded bitmap: pixel data plus the display metadata every transform
/// must carry through unchanged.
#[derive(Clone, Debug)]
pub struct Bitmap {
    pixels: RgbaImage,
    scale: f32,
    orientation: Orientation,
}

impl Bitmap {
    /// Wrap decoded pixels with default metadata (scale 1.0, upright).
    pub fn new(pixels: RgbaImage) -> Self {
        Self::with_metadata(pixels, 1.0, Orientation::Up)
    }

    pub fn with_metadata(pixels: RgbaImage, scale: f32, orientation: Orientation) -> Self {
        Self { pixels, scale, orientation }
    }

    /// Re-encode a raw buffer into a bitmap, attaching the given metadata.
    pub fn from_buffer(
        buffer: PixelBuffer,
        scale: f32,
        orientation: Orientation,
    ) -> Result<Self, String> {
        let PixelBuffer { data, width, height, .. } = buffer;
        let pixels = RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| format!("buffer does not match {}x{} RGBA dimensions", width, height))?;
        Ok(Self::with_metadata(pixels, scale, orientation))
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Decode into an owned raw pixel buffer.
    pub fn decode(&self) -> Result<PixelBuffer, String> {
        let (w, h) = self.pixels.dimensions();
        if w == 0 || h == 0 {
            return Err(format!("cannot decode empty bitmap ({}x{})", w, h));
        }
        Ok(PixelBuffer {
            data: self.pixels.as_raw().clone(),
            width: w,
            height: h,
            row_bytes: w as usize * BYTES_PER_PIXEL,
        })
    }
}

/// An owned raw pixel buffer: packed RGBA8888 rows, `row_bytes` apart.
/// Exactly one owner — dropping the buffer frees the backing storage, so
/// every exit path of the blur pipeline releases its intermediates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub row_bytes: usize,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer with dense rows.
    pub fn new(width: u32, height: u32) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("cannot allocate empty pixel buffer ({}x{})", width, height));
        }
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        Ok(Self {
            data: vec![0u8; row_bytes * height as usize],
            width,
            height,
            row_bytes,
        })
    }

    /// Copy an `RgbaImage` into a dense buffer.
    pub fn from_image(image: &RgbaImage) -> Result<Self, String> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(format!("cannot decode empty image ({}x{})", w, h));
        }
        Ok(Self {
            data: image.as_raw().clone(),
            width: w,
            height: h,
            row_bytes: w as usize * BYTES_PER_PIXEL,
        })
    }

    /// Reinterpret the buffer as an `RgbaImage`. Fails when the byte count
    /// does not match the stated dimensions.
    pub fn into_image(self) -> Result<RgbaImage, String> {
        let Self { data, width, height, .. } = self;
        RgbaImage::from_raw(width, height, data)
            .ok_or_else(|| format!("buffer does not match {}x{} RGBA dimensions", width, height))
    }

    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }
}
