// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! camstream: multi-camera RTSP ingest and decode core.
//!
//! Opens live RTSP feeds, decodes them (software codec, or the platform
//! accelerator on Rockchip boards), converts frames to packed RGB and
//! delivers them to a consumer over channels, reconnecting automatically
//! across network drops. One worker thread per camera; the supervisor
//! routes commands and tags everything with the originating camera.
//!
//! ```no_run
//! use camstream::{CameraId, StreamConfig, StreamSupervisor};
//!
//! let (mut supervisor, channels) = StreamSupervisor::new(StreamConfig::default());
//! supervisor.add_stream(CameraId(1), "rtsp://192.168.1.10/stream1")?;
//!
//! std::thread::spawn(move || {
//!     for tagged in channels.frames.iter() {
//!         // paint tagged.frame for tagged.camera_id
//!     }
//! });
//! # Ok::<(), camstream::StreamError>(())
//! ```

// Some conversion entry points legitimately take a full set of plane
// geometry parameters.
#![allow(clippy::too_many_arguments)]

pub mod core;

#[cfg(target_os = "linux")]
pub mod linux;

pub use self::core::{
    CameraFrame, CameraId, DecodedFrame, Result, RtspTransport, StreamChannels, StreamConfig,
    StreamError, StreamEvent, StreamState, StreamSupervisor, StreamWorker,
};
