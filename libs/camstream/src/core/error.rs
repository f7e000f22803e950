// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to open source: {0}")]
    Open(String),

    #[error("source has no video track: {0}")]
    NoVideoTrack(String),

    #[error("decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("color conversion failed: {0}")]
    Conversion(String),

    #[error("camera slot already occupied: {0}")]
    SlotOccupied(String),

    #[error("camera not found: {0}")]
    NotFound(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("media library error: {0}")]
    Media(#[from] ffmpeg_next::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
