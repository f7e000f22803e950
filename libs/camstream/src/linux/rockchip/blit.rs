// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! RGA blit wrapper: NV12 decoder output to packed RGB888 in hardware.
//!
//! Buffers move by DMA-BUF file descriptor whenever possible; the engine
//! requires destination row starts on a 16-pixel boundary, so callers must
//! allocate output with [`aligned_width`] and carry that stride through to
//! the emitted frame.

use super::sys;
use crate::core::{Result, StreamError};

/// RGA wstride granularity in pixels.
const STRIDE_ALIGN: u32 = 16;

/// Round a pixel width up to the blit engine's stride boundary.
pub(crate) fn aligned_width(width: u32) -> u32 {
    (width + (STRIDE_ALIGN - 1)) & !(STRIDE_ALIGN - 1)
}

/// Which conversion path a decoder instance is on.
///
/// Demotion is one-way: after the first blit failure the instance stays on
/// the CPU path so output never alternates between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConvertPath {
    Blit,
    Cpu,
}

impl ConvertPath {
    pub(crate) fn demote(&mut self) {
        *self = ConvertPath::Cpu;
    }

    pub(crate) fn is_blit(self) -> bool {
        matches!(self, ConvertPath::Blit)
    }
}

/// Handle to an initialized RGA engine. Deinitialized on drop.
pub(crate) struct RgaEngine {
    _private: (),
}

impl RgaEngine {
    pub(crate) fn new() -> Result<Self> {
        // SAFETY: plain init call, no preconditions.
        let ret = unsafe { sys::c_RkRgaInit() };
        if ret != 0 {
            return Err(StreamError::Conversion(format!(
                "RGA initialization failed ({ret})"
            )));
        }
        Ok(Self { _private: () })
    }

    /// Convert one NV12 image referenced by `src_fd` into RGB888 written
    /// to the `dst_fd` pool buffer.
    ///
    /// `y_stride`/`v_stride` are the decoder's horizontal/vertical strides;
    /// the destination stride is derived via [`aligned_width`] and must
    /// match the caller's output allocation.
    pub(crate) fn blit_nv12_to_rgb(
        &self,
        src_fd: std::os::raw::c_int,
        width: u32,
        height: u32,
        y_stride: u32,
        v_stride: u32,
        dst_fd: std::os::raw::c_int,
    ) -> Result<()> {
        if src_fd < 0 || y_stride < width || v_stride < height {
            return Err(StreamError::Conversion(format!(
                "implausible blit source: fd={src_fd} stride={y_stride}x{v_stride} image={width}x{height}"
            )));
        }
        if dst_fd < 0 {
            return Err(StreamError::Conversion("invalid output descriptor".into()));
        }

        let mut src = sys::rga_info_t::zeroed();
        src.fd = src_fd;
        src.mmuFlag = 1;
        sys::rga_set_rect(
            &mut src.rect,
            0,
            0,
            width as i32,
            height as i32,
            y_stride as i32,
            v_stride as i32,
            sys::RK_FORMAT_YCBCR_420_SP,
        );

        let mut dst = sys::rga_info_t::zeroed();
        dst.fd = dst_fd;
        dst.mmuFlag = 1;
        sys::rga_set_rect(
            &mut dst.rect,
            0,
            0,
            width as i32,
            height as i32,
            aligned_width(width) as i32,
            height as i32,
            sys::RK_FORMAT_RGB_888,
        );

        // SAFETY: both descriptors reference live buffers sized for their
        // rects; the engine reads/writes only within the strides set above.
        let ret = unsafe { sys::c_RkRgaBlit(&mut src, &mut dst, std::ptr::null_mut()) };
        if ret != 0 {
            return Err(StreamError::Conversion(format!("RGA blit failed ({ret})")));
        }
        Ok(())
    }
}

impl Drop for RgaEngine {
    fn drop(&mut self) {
        // SAFETY: paired with the successful init in `new`.
        unsafe { sys::c_RkRgaDeInit() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_width() {
        assert_eq!(aligned_width(1920), 1920);
        assert_eq!(aligned_width(1280), 1280);
        assert_eq!(aligned_width(1281), 1296);
        assert_eq!(aligned_width(1), 16);
        assert_eq!(aligned_width(16), 16);
    }

    #[test]
    fn test_demotion_is_one_way() {
        let mut path = ConvertPath::Blit;
        assert!(path.is_blit());
        path.demote();
        assert!(!path.is_blit());
        // There is no promote; demoting again must be a no-op.
        path.demote();
        assert_eq!(path, ConvertPath::Cpu);
    }
}
