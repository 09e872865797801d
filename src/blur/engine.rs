// ============================================================================
// BLUR ENGINE — separable tent convolution (rayon-parallelized)
// ============================================================================
//
// An iterated box / triangular kernel is a close, much cheaper approximation
// of a true Gaussian. The kernel span is derived from the requested Gaussian
// radius and forced odd; out-of-range samples clamp to the nearest edge
// pixel (edge-extension, no wrapping or zero padding).

use rayon::prelude::*;

use crate::bitmap::{BYTES_PER_PIXEL, PixelBuffer};

/// Tent kernel span per unit of Gaussian radius.
const GAUSSIAN_TO_TENT_RATIO: f32 = 5.0;

/// Kernel span for a given blur radius: `floor(radius * 5.0)` forced to the
/// nearest odd value ≥ 1. The convolution requires an odd span so the kernel
/// has a center tap.
pub fn tent_box_size(radius: f32) -> u32 {
    let mut size = (radius * GAUSSIAN_TO_TENT_RATIO).floor() as u32;
    size |= 1;
    size
}

/// Build a normalized 1-D triangular kernel of odd length `box_size`.
fn build_tent_kernel(box_size: u32) -> Vec<f32> {
    let half = (box_size / 2) as i32;
    let len = box_size as usize;
    let mut kernel = vec![0.0f32; len];
    let mut sum = 0.0f32;
    for (i, tap) in kernel.iter_mut().enumerate() {
        let v = (half + 1 - (i as i32 - half).abs()) as f32;
        *tap = v;
        sum += v;
    }
    let inv = 1.0 / sum;
    for tap in &mut kernel {
        *tap *= inv;
    }
    kernel
}

/// Apply a tent convolution of the given radius, producing a new buffer of
/// identical dimensions. The caller guarantees `radius > 0`.
pub fn tent_blur(src: &PixelBuffer, radius: f32) -> Result<PixelBuffer, String> {
    let w = src.width as usize;
    let h = src.height as usize;
    if w == 0 || h == 0 {
        return Err(format!("cannot convolve empty buffer ({}x{})", w, h));
    }
    if src.data.len() < src.row_bytes * h || src.row_bytes < w * BYTES_PER_PIXEL {
        return Err(format!(
            "buffer too short for {}x{} rows of {} bytes",
            w, h, src.row_bytes
        ));
    }

    let box_size = tent_box_size(radius);
    if box_size <= 1 {
        // Single-tap kernel is the identity.
        return Ok(src.clone());
    }

    let kernel = build_tent_kernel(box_size);
    let half = kernel.len() / 2;
    let stride = w * BYTES_PER_PIXEL;
    let pixel_count = w * h * BYTES_PER_PIXEL;

    // Densify into an f32 working buffer (drops any row padding).
    let mut buf_in: Vec<f32> = Vec::with_capacity(pixel_count);
    for y in 0..h {
        let row = &src.data[y * src.row_bytes..y * src.row_bytes + stride];
        buf_in.extend(row.iter().map(|&b| b as f32));
    }

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; pixel_count];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * stride..(y + 1) * stride];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - half as isize)
                    .max(0)
                    .min(w as isize - 1) as usize;
                let idx = sx * BYTES_PER_PIXEL;
                for c in 0..4 {
                    acc[c] += row_in[idx + c] * kv;
                }
            }
            let out_idx = x * BYTES_PER_PIXEL;
            row_out[out_idx..out_idx + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut buf_v = vec![0.0f32; pixel_count];
    buf_v.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - half as isize)
                    .max(0)
                    .min(h as isize - 1) as usize;
                let idx = sy * stride + x * BYTES_PER_PIXEL;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            let out_idx = x * BYTES_PER_PIXEL;
            row_out[out_idx..out_idx + 4].copy_from_slice(&acc);
        }
    });

    let data: Vec<u8> = buf_v
        .iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();

    Ok(PixelBuffer {
        data,
        width: src.width,
        height: src.height,
        row_bytes: stride,
    })
}
