// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Build-time decoder selection.
//!
//! Exactly one backend is compiled in per target:
//! - Rockchip boards (`rockchip` feature): MPP accelerated decode with RGA
//!   color conversion,
//! - everywhere else: libavcodec software decode.
//!
//! This is a compile-time swap, not a runtime strategy; the worker never
//! learns which backend it is driving.

use ffmpeg_next as ffmpeg;

use super::{DecoderBackend, TrackParameters};
use crate::core::frames::DecodedFrame;
use crate::core::Result;

/// The decoder backend compiled into this build.
pub struct VideoDecoder {
    #[cfg(all(target_os = "linux", feature = "rockchip"))]
    inner: crate::linux::rockchip::MppDecoder,

    #[cfg(not(all(target_os = "linux", feature = "rockchip")))]
    inner: super::SoftwareDecoder,
}

impl VideoDecoder {
    /// Create and initialize the platform backend for the given track.
    pub fn new(track: &TrackParameters) -> Result<Self> {
        #[cfg(all(target_os = "linux", feature = "rockchip"))]
        let mut inner = crate::linux::rockchip::MppDecoder::new();

        #[cfg(not(all(target_os = "linux", feature = "rockchip")))]
        let mut inner = super::SoftwareDecoder::new();

        inner.init(track)?;
        Ok(Self { inner })
    }
}

impl DecoderBackend for VideoDecoder {
    fn init(&mut self, track: &TrackParameters) -> Result<()> {
        self.inner.init(track)
    }

    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        self.inner.send_packet(packet)
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>> {
        self.inner.receive_frame()
    }

    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }
}
