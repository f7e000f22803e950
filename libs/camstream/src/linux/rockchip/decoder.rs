// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! MPP accelerated decoder.
//!
//! Decodes H.264/H.265 on the Rockchip VPU, pulls NV12 frames from the
//! accelerator's ION buffer pool and converts them to RGB888, through the
//! RGA blit engine when it is healthy, otherwise pixel-by-pixel on the CPU.
//! The blit→CPU switch is a latch: it never flips back for the lifetime of
//! the decoder instance.

use std::ptr;

use ffmpeg_next as ffmpeg;

use super::blit::{aligned_width, ConvertPath, RgaEngine};
use super::sys;
use crate::core::codec::convert::nv12_to_rgb;
use crate::core::codec::{DecoderBackend, TrackParameters};
use crate::core::frames::DecodedFrame;
use crate::core::{Result, StreamError};

/// RGB output scratch, reallocated on resolution changes.
enum RgbBuffer {
    None,
    /// Pool allocation the blit engine can address by descriptor.
    Pool { buffer: sys::MppBuffer, len: usize },
    /// Plain heap memory for the CPU path.
    Heap(Vec<u8>),
}

pub struct MppDecoder {
    ctx: sys::MppCtx,
    api: *mut sys::MppApi,
    frame_group: sys::MppBufferGroup,
    rga: Option<RgaEngine>,
    path: ConvertPath,
    rgb: RgbBuffer,
    out_stride: usize,
    width: u32,
    height: u32,
    initialized: bool,
}

impl MppDecoder {
    pub fn new() -> Self {
        // Bring up the blit engine eagerly; if it is unavailable the
        // instance starts (and stays) on the CPU path.
        let (rga, path) = match RgaEngine::new() {
            Ok(engine) => (Some(engine), ConvertPath::Blit),
            Err(e) => {
                tracing::warn!("RGA unavailable, using CPU conversion: {}", e);
                (None, ConvertPath::Cpu)
            }
        };
        Self {
            ctx: ptr::null_mut(),
            api: ptr::null_mut(),
            frame_group: ptr::null_mut(),
            rga,
            path,
            rgb: RgbBuffer::None,
            out_stride: 0,
            width: 0,
            height: 0,
            initialized: false,
        }
    }

    fn coding_for(codec_id: ffmpeg::codec::Id) -> Result<std::os::raw::c_int> {
        match codec_id {
            ffmpeg::codec::Id::H264 => Ok(sys::MPP_VIDEO_CODING_AVC),
            ffmpeg::codec::Id::HEVC => Ok(sys::MPP_VIDEO_CODING_HEVC),
            other => Err(StreamError::DecoderInit(format!(
                "accelerator has no profile for {other:?}"
            ))),
        }
    }

    /// (Re)allocate the RGB output for the current resolution.
    ///
    /// On the blit path the buffer comes from the MPP pool so RGA can reach
    /// it by descriptor, with the engine's stride alignment; if the pool
    /// refuses, the instance demotes to the CPU path and plain memory.
    fn alloc_output(&mut self) {
        self.release_output();

        if self.path.is_blit() {
            let stride = aligned_width(self.width) as usize * 3;
            let len = stride * self.height as usize;
            let mut buffer: sys::MppBuffer = ptr::null_mut();
            // SAFETY: group is live; buffer is an out-param.
            let ret = unsafe { sys::mpp_buffer_get(self.frame_group, &mut buffer, len) };
            if ret == sys::MPP_OK && !buffer.is_null() {
                self.rgb = RgbBuffer::Pool { buffer, len };
                self.out_stride = stride;
                return;
            }
            tracing::warn!("pool output allocation failed ({ret}), using CPU conversion");
            self.path.demote();
        }

        let stride = self.width as usize * 3;
        self.rgb = RgbBuffer::Heap(vec![0u8; stride * self.height as usize]);
        self.out_stride = stride;
    }

    fn release_output(&mut self) {
        if let RgbBuffer::Pool { buffer, .. } = self.rgb {
            // SAFETY: buffer came from mpp_buffer_get and is unreferenced
            // by hardware once the previous frame's copy-out finished.
            unsafe { sys::mpp_buffer_put(buffer) };
        }
        self.rgb = RgbBuffer::None;
        self.out_stride = 0;
    }

    /// Output scratch as a writable slice.
    fn output_slice(&mut self) -> Result<&mut [u8]> {
        match &mut self.rgb {
            RgbBuffer::Heap(data) => Ok(data.as_mut_slice()),
            RgbBuffer::Pool { buffer, len } => {
                // SAFETY: pool allocations are CPU-mapped; ptr stays valid
                // until mpp_buffer_put.
                let ptr = unsafe { sys::mpp_buffer_get_ptr(*buffer) };
                if ptr.is_null() {
                    return Err(StreamError::Conversion("pool buffer unmapped".into()));
                }
                Ok(unsafe { std::slice::from_raw_parts_mut(ptr as *mut u8, *len) })
            }
            RgbBuffer::None => Err(StreamError::Conversion("no output buffer".into())),
        }
    }

    /// Hardware conversion into the pool/heap output.
    fn convert_by_blit(&mut self, frame: sys::MppFrame) -> Result<()> {
        let Some(engine) = self.rga.as_ref() else {
            return Err(StreamError::Conversion("blit engine not initialized".into()));
        };

        // SAFETY: frame is a live decoder output for all accessor calls.
        let (src_buffer, y_stride, v_stride) = unsafe {
            (
                sys::mpp_frame_get_buffer(frame),
                sys::mpp_frame_get_hor_stride(frame),
                sys::mpp_frame_get_ver_stride(frame),
            )
        };
        if src_buffer.is_null() {
            return Err(StreamError::Conversion("frame has no buffer".into()));
        }
        let src_fd = unsafe { sys::mpp_buffer_get_fd(src_buffer) };

        let dst_fd = match &self.rgb {
            RgbBuffer::Pool { buffer, .. } => unsafe { sys::mpp_buffer_get_fd(*buffer) },
            RgbBuffer::Heap(_) | RgbBuffer::None => {
                // Blit path always allocates from the pool; reaching here
                // means the output was torn down underneath us.
                return Err(StreamError::Conversion("no blit output buffer".into()));
            }
        };

        engine.blit_nv12_to_rgb(src_fd, self.width, self.height, y_stride, v_stride, dst_fd)
    }

    /// Fixed-point CPU conversion into the current output.
    fn convert_by_cpu(&mut self, frame: sys::MppFrame) -> Result<()> {
        // SAFETY: frame is a live decoder output for all accessor calls.
        let (buffer, y_stride, v_stride) = unsafe {
            (
                sys::mpp_frame_get_buffer(frame),
                sys::mpp_frame_get_hor_stride(frame) as usize,
                sys::mpp_frame_get_ver_stride(frame) as usize,
            )
        };
        if buffer.is_null() {
            return Err(StreamError::Conversion("frame has no buffer".into()));
        }
        let base = unsafe { sys::mpp_buffer_get_ptr(buffer) };
        if base.is_null() {
            return Err(StreamError::Conversion("frame buffer unmapped".into()));
        }

        let (width, height, out_stride) = (self.width as usize, self.height as usize, self.out_stride);
        // NV12 pool layout: Y plane of y_stride * v_stride bytes, then the
        // interleaved UV plane at half vertical resolution.
        let luma_len = y_stride * v_stride;
        // SAFETY: the pool allocation spans the full NV12 image.
        let planes = unsafe { std::slice::from_raw_parts(base as *const u8, luma_len * 3 / 2) };
        let (y_plane, uv_plane) = planes.split_at(luma_len);

        let out = self.output_slice()?;
        nv12_to_rgb(
            y_plane, y_stride, uv_plane, y_stride, width, height, out, out_stride,
        )
    }

    /// Copy the converted image out of the reused scratch buffer.
    fn emit_frame(&mut self) -> Result<DecodedFrame> {
        let (width, height, stride) = (self.width, self.height, self.out_stride);
        let data = self.output_slice()?[..stride * height as usize].to_vec();
        Ok(DecodedFrame::new(width, height, stride, data, 0))
    }
}

impl Default for MppDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderBackend for MppDecoder {
    fn init(&mut self, track: &TrackParameters) -> Result<()> {
        let coding = Self::coding_for(track.codec_id)?;

        // SAFETY: out-params into null-initialized fields; every failure
        // path below tears down what was created (via Drop).
        let ret = unsafe { sys::mpp_create(&mut self.ctx, &mut self.api) };
        if ret != sys::MPP_OK {
            return Err(StreamError::DecoderInit(format!("mpp_create failed ({ret})")));
        }
        let ret = unsafe { sys::mpp_init(self.ctx, sys::MPP_CTX_DEC, coding) };
        if ret != sys::MPP_OK {
            return Err(StreamError::DecoderInit(format!("mpp_init failed ({ret})")));
        }

        // Fast output keeps end-to-end latency down; error concealment
        // stays on so glitched references degrade instead of stalling.
        unsafe {
            let mut cfg: sys::MppDecCfg = ptr::null_mut();
            sys::mpp_dec_cfg_init(&mut cfg);
            if !cfg.is_null() {
                sys::mpp_dec_cfg_set_u32(cfg, c"base:fast_out".as_ptr(), 1);
                sys::mpp_dec_cfg_set_u32(cfg, c"base:disable_error".as_ptr(), 0);
                ((*self.api).control)(self.ctx, sys::MPP_DEC_SET_CFG, cfg);
                sys::mpp_dec_cfg_deinit(cfg);
            }
        }

        self.width = track.width;
        self.height = track.height;

        let ret = unsafe {
            sys::mpp_buffer_group_get_internal(&mut self.frame_group, sys::MPP_BUFFER_TYPE_ION)
        };
        if ret != sys::MPP_OK {
            return Err(StreamError::DecoderInit(format!(
                "frame buffer group failed ({ret})"
            )));
        }
        let ret = unsafe {
            ((*self.api).control)(
                self.ctx,
                sys::MPP_DEC_SET_EXT_BUF_GROUP,
                self.frame_group,
            )
        };
        if ret != sys::MPP_OK {
            return Err(StreamError::DecoderInit(format!(
                "attaching buffer group failed ({ret})"
            )));
        }

        self.alloc_output();
        self.initialized = true;
        tracing::debug!(
            "MPP decoder ready for {:?} ({}x{}, {:?} conversion)",
            track.codec_id,
            self.width,
            self.height,
            self.path
        );
        Ok(())
    }

    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        if !self.initialized {
            return Err(StreamError::Decode("decoder not initialized".into()));
        }
        let Some(data) = packet.data() else {
            return Ok(());
        };

        let mut mpp_packet: sys::MppPacket = ptr::null_mut();
        // SAFETY: the packet borrows `data` only for the duration of the
        // put call; MPP copies compressed bytes into its own stream buffer.
        unsafe {
            let ret = sys::mpp_packet_init(
                &mut mpp_packet,
                data.as_ptr() as *mut std::os::raw::c_void,
                data.len(),
            );
            if ret != sys::MPP_OK {
                return Err(StreamError::Decode(format!("packet init failed ({ret})")));
            }
            sys::mpp_packet_set_pts(mpp_packet, packet.pts().unwrap_or(0));

            let ret = ((*self.api).decode_put_packet)(self.ctx, mpp_packet);
            sys::mpp_packet_deinit(&mut mpp_packet);

            // A full stream buffer is not a failure: draining frames on
            // the next receive calls makes room.
            if ret != sys::MPP_OK && ret != sys::MPP_ERR_BUFFER_FULL {
                return Err(StreamError::Decode(format!("put packet failed ({ret})")));
            }
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>> {
        if !self.initialized {
            return Err(StreamError::Decode("decoder not initialized".into()));
        }

        let mut frame: sys::MppFrame = ptr::null_mut();
        // SAFETY: ctx/api are live; frame is an out-param we deinit on
        // every path below.
        let ret = unsafe { ((*self.api).decode_get_frame)(self.ctx, &mut frame) };
        if ret != sys::MPP_OK || frame.is_null() {
            return Ok(None);
        }

        // Resolution change arrives in-band instead of a frame: resize the
        // output, tell the decoder we are ready, and report "no frame yet".
        if unsafe { sys::mpp_frame_get_info_change(frame) } != 0 {
            let (width, height) = unsafe {
                (
                    sys::mpp_frame_get_width(frame),
                    sys::mpp_frame_get_height(frame),
                )
            };
            tracing::info!(
                "decoder resolution change: {}x{} -> {}x{}",
                self.width,
                self.height,
                width,
                height
            );
            self.width = width;
            self.height = height;
            self.alloc_output();
            unsafe {
                sys::mpp_frame_deinit(&mut frame);
                ((*self.api).control)(self.ctx, sys::MPP_DEC_SET_INFO_CHANGE_READY, ptr::null_mut());
            }
            return Ok(None);
        }

        if unsafe { sys::mpp_frame_get_eos(frame) } != 0 {
            unsafe { sys::mpp_frame_deinit(&mut frame) };
            return Ok(None);
        }

        // Only hopeless frames are discarded; concealed errors still show.
        let errinfo = unsafe { sys::mpp_frame_get_errinfo(frame) };
        if errinfo & sys::MPP_FRAME_ERR_UNKNOW != 0 {
            unsafe { sys::mpp_frame_deinit(&mut frame) };
            return Ok(None);
        }

        let converted = if self.path.is_blit() {
            match self.convert_by_blit(frame) {
                Ok(()) => Ok(()),
                Err(e) => {
                    // One-way demotion: finish this frame on the CPU and
                    // never try the engine again on this instance.
                    tracing::warn!("blit failed, demoting to CPU conversion: {}", e);
                    self.path.demote();
                    self.convert_by_cpu(frame)
                }
            }
        } else {
            self.convert_by_cpu(frame)
        };

        unsafe { sys::mpp_frame_deinit(&mut frame) };

        converted?;
        self.emit_frame().map(Some)
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for MppDecoder {
    fn drop(&mut self) {
        self.release_output();
        if !self.frame_group.is_null() {
            // SAFETY: group was created in init and all its buffers are
            // released above / by the decoder teardown below.
            unsafe { sys::mpp_buffer_group_put(self.frame_group) };
            self.frame_group = ptr::null_mut();
        }
        if !self.ctx.is_null() {
            // SAFETY: ctx came from mpp_create.
            unsafe { sys::mpp_destroy(self.ctx) };
            self.ctx = ptr::null_mut();
            self.api = ptr::null_mut();
        }
        self.initialized = false;
    }
}

// SAFETY: the MPP context is only ever driven from the worker thread that
// owns the decoder; the raw pointers are not shared.
unsafe impl Send for MppDecoder {}
