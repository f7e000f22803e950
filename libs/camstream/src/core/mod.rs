// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod codec;
pub mod config;
pub mod demux;
pub mod error;
pub mod events;
pub mod frames;
pub mod supervisor;
pub mod worker;

pub use config::{RtspTransport, StreamConfig};
pub use error::{Result, StreamError};
pub use events::{CameraFrame, CameraId, StreamEvent};
pub use frames::DecodedFrame;
pub use supervisor::{StreamChannels, StreamSupervisor};
pub use worker::{StreamState, StreamWorker};
