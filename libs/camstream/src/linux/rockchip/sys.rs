// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hand-maintained FFI bindings to librockchip_mpp and librga.
//!
//! Only the subset the decode path touches. Several MPP "functions" are
//! convenience macros in the C headers expanding to `*_with_tag` /
//! `*_with_caller` symbols; the helpers below mirror those macros so the
//! decoder reads like its C counterpart.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};

pub type MppCtx = *mut c_void;
pub type MppPacket = *mut c_void;
pub type MppFrame = *mut c_void;
pub type MppBuffer = *mut c_void;
pub type MppBufferGroup = *mut c_void;
pub type MppDecCfg = *mut c_void;
pub type MppParam = *mut c_void;

pub type MPP_RET = c_int;
pub const MPP_OK: MPP_RET = 0;
pub const MPP_ERR_BASE: MPP_RET = -1000;
pub const MPP_ERR_BUFFER_FULL: MPP_RET = MPP_ERR_BASE - 12;

/// MppCtxType
pub const MPP_CTX_DEC: c_int = 0;

/// MppCodingType (OMX coding ids)
pub const MPP_VIDEO_CODING_AVC: c_int = 7;
pub const MPP_VIDEO_CODING_HEVC: c_int = 0x0100_0005;

/// MppBufferType / MppBufferMode
pub const MPP_BUFFER_TYPE_ION: c_int = 1;
pub const MPP_BUFFER_INTERNAL: c_int = 0;

/// MpiCmd: CMD_MODULE_CODEC | CMD_CTX_ID_DEC
pub const MPP_DEC_CMD_BASE: c_int = 0x0031_0000;
pub const MPP_DEC_SET_EXT_BUF_GROUP: c_int = MPP_DEC_CMD_BASE + 2;
pub const MPP_DEC_SET_INFO_CHANGE_READY: c_int = MPP_DEC_CMD_BASE + 3;
pub const MPP_DEC_SET_CFG: c_int = MPP_DEC_CMD_BASE + 18;

/// mpp_frame_get_errinfo flag for undecodable content.
pub const MPP_FRAME_ERR_UNKNOW: u32 = 0x0001;

const MODULE_TAG: &CStr = c"camstream";

/// Decoder entry points reached through the MppApi vtable returned by
/// `mpp_create`. Field order must match `MppApi_t` in rk_mpi.h.
#[repr(C)]
pub struct MppApi {
    pub size: u32,
    pub version: u32,
    pub decode: unsafe extern "C" fn(MppCtx, MppPacket, *mut MppFrame) -> MPP_RET,
    pub decode_put_packet: unsafe extern "C" fn(MppCtx, MppPacket) -> MPP_RET,
    pub decode_get_frame: unsafe extern "C" fn(MppCtx, *mut MppFrame) -> MPP_RET,
    pub encode: unsafe extern "C" fn(MppCtx, MppFrame, *mut MppPacket) -> MPP_RET,
    pub encode_put_frame: unsafe extern "C" fn(MppCtx, MppFrame) -> MPP_RET,
    pub encode_get_packet: unsafe extern "C" fn(MppCtx, *mut MppPacket) -> MPP_RET,
    pub isp: unsafe extern "C" fn(MppCtx, MppFrame, *mut MppPacket) -> MPP_RET,
    pub isp_put_frame: unsafe extern "C" fn(MppCtx, MppFrame) -> MPP_RET,
    pub isp_get_packet: unsafe extern "C" fn(MppCtx, *mut MppPacket) -> MPP_RET,
    pub poll: unsafe extern "C" fn(MppCtx, c_int, c_int) -> MPP_RET,
    pub dequeue: unsafe extern "C" fn(MppCtx, c_int, *mut c_void) -> MPP_RET,
    pub enqueue: unsafe extern "C" fn(MppCtx, c_int, *mut c_void) -> MPP_RET,
    pub reset: unsafe extern "C" fn(MppCtx) -> MPP_RET,
    pub control: unsafe extern "C" fn(MppCtx, c_int, MppParam) -> MPP_RET,
    pub reserv: [u32; 16],
}

#[link(name = "rockchip_mpp")]
unsafe extern "C" {
    pub fn mpp_create(ctx: *mut MppCtx, mpi: *mut *mut MppApi) -> MPP_RET;
    pub fn mpp_init(ctx: MppCtx, ctx_type: c_int, coding: c_int) -> MPP_RET;
    pub fn mpp_destroy(ctx: MppCtx) -> MPP_RET;

    pub fn mpp_packet_init(packet: *mut MppPacket, data: *mut c_void, size: usize) -> MPP_RET;
    pub fn mpp_packet_deinit(packet: *mut MppPacket) -> MPP_RET;
    pub fn mpp_packet_set_pts(packet: MppPacket, pts: i64);

    pub fn mpp_frame_deinit(frame: *mut MppFrame) -> MPP_RET;
    pub fn mpp_frame_get_width(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_height(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_hor_stride(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_ver_stride(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_info_change(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_eos(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_errinfo(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_buffer(frame: MppFrame) -> MppBuffer;

    pub fn mpp_buffer_group_get(
        group: *mut MppBufferGroup,
        buffer_type: c_int,
        mode: c_int,
        tag: *const c_char,
        caller: *const c_char,
    ) -> MPP_RET;
    pub fn mpp_buffer_group_put(group: MppBufferGroup) -> MPP_RET;
    pub fn mpp_buffer_get_with_tag(
        group: MppBufferGroup,
        buffer: *mut MppBuffer,
        size: usize,
        tag: *const c_char,
        caller: *const c_char,
    ) -> MPP_RET;
    pub fn mpp_buffer_put_with_caller(buffer: MppBuffer, caller: *const c_char) -> MPP_RET;
    pub fn mpp_buffer_get_ptr_with_caller(buffer: MppBuffer, caller: *const c_char)
        -> *mut c_void;
    pub fn mpp_buffer_get_fd_with_caller(buffer: MppBuffer, caller: *const c_char) -> c_int;

    pub fn mpp_dec_cfg_init(cfg: *mut MppDecCfg) -> MPP_RET;
    pub fn mpp_dec_cfg_deinit(cfg: MppDecCfg) -> MPP_RET;
    pub fn mpp_dec_cfg_set_u32(cfg: MppDecCfg, name: *const c_char, val: u32) -> MPP_RET;
}

// Macro equivalents from mpp_buffer.h.

pub unsafe fn mpp_buffer_group_get_internal(
    group: *mut MppBufferGroup,
    buffer_type: c_int,
) -> MPP_RET {
    unsafe {
        mpp_buffer_group_get(
            group,
            buffer_type,
            MPP_BUFFER_INTERNAL,
            MODULE_TAG.as_ptr(),
            MODULE_TAG.as_ptr(),
        )
    }
}

pub unsafe fn mpp_buffer_get(
    group: MppBufferGroup,
    buffer: *mut MppBuffer,
    size: usize,
) -> MPP_RET {
    unsafe { mpp_buffer_get_with_tag(group, buffer, size, MODULE_TAG.as_ptr(), MODULE_TAG.as_ptr()) }
}

pub unsafe fn mpp_buffer_put(buffer: MppBuffer) -> MPP_RET {
    unsafe { mpp_buffer_put_with_caller(buffer, MODULE_TAG.as_ptr()) }
}

pub unsafe fn mpp_buffer_get_ptr(buffer: MppBuffer) -> *mut c_void {
    unsafe { mpp_buffer_get_ptr_with_caller(buffer, MODULE_TAG.as_ptr()) }
}

pub unsafe fn mpp_buffer_get_fd(buffer: MppBuffer) -> c_int {
    unsafe { mpp_buffer_get_fd_with_caller(buffer, MODULE_TAG.as_ptr()) }
}

// ============================================================================
// RGA (2D blit engine)
// ============================================================================

/// Pixel formats from rga.h (value << 8 encoding).
pub const RK_FORMAT_RGB_888: c_int = 0x2 << 8;
pub const RK_FORMAT_YCBCR_420_SP: c_int = 0xa << 8;

#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct rga_rect_t {
    pub xoffset: c_int,
    pub yoffset: c_int,
    pub width: c_int,
    pub height: c_int,
    pub wstride: c_int,
    pub hstride: c_int,
    pub format: c_int,
    pub size: c_int,
}

/// One side of a blit. Zero-initialize and fill only what applies, exactly
/// like the C callers do with memset.
#[repr(C)]
pub struct rga_info_t {
    pub fd: c_int,
    pub virAddr: *mut c_void,
    pub phyAddr: *mut c_void,
    pub hnd: c_uint,
    pub format: c_int,
    pub rect: rga_rect_t,
    pub blend: c_uint,
    pub bufferSize: c_int,
    pub rotation: c_int,
    pub color: c_int,
    pub testLog: c_int,
    pub mmuFlag: c_int,
    pub colorkey_en: c_int,
    pub colorkey_mode: c_int,
    pub colorkey_max: c_int,
    pub colorkey_min: c_int,
    pub in_fence_fd: c_int,
    pub out_fence_fd: c_int,
    pub core: c_int,
    pub priority: c_int,
    pub reserve: [c_char; 402],
}

impl rga_info_t {
    pub fn zeroed() -> Self {
        // SAFETY: all fields are plain C scalars/arrays; the all-zero bit
        // pattern is the documented initial state.
        unsafe { std::mem::zeroed() }
    }
}

/// Mirror of the `rga_set_rect` inline helper from RgaUtils.
pub fn rga_set_rect(
    rect: &mut rga_rect_t,
    x: c_int,
    y: c_int,
    width: c_int,
    height: c_int,
    wstride: c_int,
    hstride: c_int,
    format: c_int,
) {
    rect.xoffset = x;
    rect.yoffset = y;
    rect.width = width;
    rect.height = height;
    rect.wstride = wstride;
    rect.hstride = hstride;
    rect.format = format;
}

#[link(name = "rga")]
unsafe extern "C" {
    pub fn c_RkRgaInit() -> c_int;
    pub fn c_RkRgaDeInit();
    pub fn c_RkRgaBlit(
        src: *mut rga_info_t,
        dst: *mut rga_info_t,
        src1: *mut rga_info_t,
    ) -> c_int;
}
