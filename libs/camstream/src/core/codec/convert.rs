// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Fixed-point NV12 to packed RGB24 conversion.
//!
//! Pure-CPU fallback for the hardware blit path, and the reference
//! implementation its output is judged against. Integer-only math: the
//! coefficients are BT.601 scaled by 1024 so a row converts with shifts and
//! adds, no floating point in the per-pixel loop.

use crate::core::{Result, StreamError};

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert one NV12 image (separate Y plane, interleaved UV plane at half
/// vertical resolution) into packed RGB24.
///
/// Strides are byte distances between row starts and may exceed the visible
/// width; `out` must hold `out_stride * height` bytes. Rows beyond `width`
/// pixels in the output are left untouched.
pub fn nv12_to_rgb(
    y_plane: &[u8],
    y_stride: usize,
    uv_plane: &[u8],
    uv_stride: usize,
    width: usize,
    height: usize,
    out: &mut [u8],
    out_stride: usize,
) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(StreamError::Conversion("zero-sized frame".into()));
    }
    if y_stride < width || out_stride < width * 3 {
        return Err(StreamError::Conversion(format!(
            "stride smaller than row: y_stride={y_stride} out_stride={out_stride} width={width}"
        )));
    }
    let uv_rows = height.div_ceil(2);
    // The last pixel of an odd-width row still reads a full UV pair.
    let uv_span = width.div_ceil(2) * 2;
    if y_plane.len() < y_stride * (height - 1) + width
        || uv_plane.len() < uv_stride * (uv_rows - 1) + uv_span
        || out.len() < out_stride * height
    {
        return Err(StreamError::Conversion("plane buffer too small".into()));
    }

    for y in 0..height {
        let y_row = &y_plane[y * y_stride..];
        let uv_row = &uv_plane[(y / 2) * uv_stride..];
        let rgb_row = &mut out[y * out_stride..];

        for x in 0..width {
            let luma = y_row[x] as i32;
            let uv_index = x & !1;
            let u = uv_row[uv_index] as i32 - 128;
            let v = uv_row[uv_index + 1] as i32 - 128;

            let r = luma + ((1436 * v) >> 10);
            let g = luma - ((352 * u + 731 * v) >> 10);
            let b = luma + ((1815 * u) >> 10);

            let rgb_index = x * 3;
            rgb_row[rgb_index] = clamp_u8(r);
            rgb_row[rgb_index + 1] = clamp_u8(g);
            rgb_row[rgb_index + 2] = clamp_u8(b);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an NV12 image filled with a single (Y, U, V) value.
    fn solid_nv12(width: usize, height: usize, y: u8, u: u8, v: u8) -> (Vec<u8>, Vec<u8>) {
        let y_plane = vec![y; width * height];
        let mut uv_plane = Vec::with_capacity(width * height.div_ceil(2));
        for _ in 0..(width / 2) * height.div_ceil(2) {
            uv_plane.push(u);
            uv_plane.push(v);
        }
        (y_plane, uv_plane)
    }

    #[test]
    fn test_neutral_chroma_is_grey() {
        let (y, uv) = solid_nv12(4, 4, 128, 128, 128);
        let mut out = vec![0u8; 4 * 4 * 3];
        nv12_to_rgb(&y, 4, &uv, 4, 4, 4, &mut out, 12).unwrap();
        assert!(out.iter().all(|&b| b == 128));
    }

    #[test]
    fn test_saturated_red_clamps_blue() {
        // Y=76 U=84 V=255 is (nearly) pure red in BT.601; blue underflows
        // and must clamp to 0 instead of wrapping.
        let (y, uv) = solid_nv12(2, 2, 76, 84, 255);
        let mut out = vec![0u8; 2 * 2 * 3];
        nv12_to_rgb(&y, 2, &uv, 2, 2, 2, &mut out, 6).unwrap();
        assert_eq!((out[0], out[1], out[2]), (254, 1, 0));
    }

    #[test]
    fn test_white_clamps_high() {
        let (y, uv) = solid_nv12(2, 2, 255, 128, 255);
        let mut out = vec![0u8; 12];
        nv12_to_rgb(&y, 2, &uv, 2, 2, 2, &mut out, 6).unwrap();
        assert_eq!(out[0], 255);
    }

    #[test]
    fn test_padded_strides() {
        // 2x2 visible image inside 8-byte-wide planes and 16-byte output rows.
        let mut y = vec![0u8; 8 * 2];
        y[0] = 128;
        y[1] = 128;
        y[8] = 128;
        y[9] = 128;
        let mut uv = vec![0u8; 8];
        uv[0] = 128;
        uv[1] = 128;
        let mut out = vec![0xAAu8; 16 * 2];
        nv12_to_rgb(&y, 8, &uv, 8, 2, 2, &mut out, 16).unwrap();
        assert_eq!(out[0], 128);
        // Padding bytes are never written.
        assert_eq!(out[6], 0xAA);
        assert_eq!(out[16], 128);
    }

    #[test]
    fn test_odd_pixel_shares_chroma_pair() {
        // Two horizontally adjacent pixels sample the same UV pair.
        let y = vec![100u8, 120u8];
        let uv = vec![90u8, 200u8];
        let mut out = vec![0u8; 6];
        nv12_to_rgb(&y, 2, &uv, 2, 2, 1, &mut out, 6).unwrap();
        let left_shift = (out[0] as i32 - 100, out[1] as i32 - 100, out[2] as i32 - 100);
        let right_shift = (out[3] as i32 - 120, out[4] as i32 - 120, out[5] as i32 - 120);
        assert_eq!(left_shift, right_shift);
    }

    #[test]
    fn test_odd_width_reads_full_chroma_pair() {
        // Width 3 samples two full UV pairs, so a 3-byte UV row is short.
        let y = vec![128u8; 3];
        let uv = vec![128u8; 4];
        let mut out = vec![0u8; 9];
        nv12_to_rgb(&y, 3, &uv, 4, 3, 1, &mut out, 9).unwrap();
        assert!(out.iter().all(|&b| b == 128));

        let short_uv = vec![128u8; 3];
        assert!(nv12_to_rgb(&y, 3, &short_uv, 4, 3, 1, &mut out, 9).is_err());
    }

    #[test]
    fn test_undersized_buffer_rejected() {
        let (y, uv) = solid_nv12(4, 4, 128, 128, 128);
        let mut out = vec![0u8; 8];
        assert!(nv12_to_rgb(&y, 4, &uv, 4, 4, 4, &mut out, 12).is_err());
    }
}
