// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Decoder backends: compressed packets in, displayable RGB frames out.
//!
//! Exactly one backend is compiled into a given build ([`VideoDecoder`]
//! selects it); the trait exists so the stream worker, the software path
//! and the platform hardware path all speak the same contract.

pub mod convert;
mod software;
mod video_decoder;

pub use software::SoftwareDecoder;
pub use video_decoder::VideoDecoder;

use ffmpeg_next as ffmpeg;

use super::frames::DecodedFrame;
use super::Result;

/// Codec parameters of the demuxed video track, captured at connect time.
#[derive(Clone)]
pub struct TrackParameters {
    pub parameters: ffmpeg::codec::Parameters,
    pub codec_id: ffmpeg::codec::Id,
    pub width: u32,
    pub height: u32,
}

impl TrackParameters {
    pub(crate) fn from_stream(stream: &ffmpeg::format::stream::Stream) -> Self {
        let parameters = stream.parameters();
        let codec_id = parameters.id();
        // Coded dimensions have no safe accessor on Parameters.
        // SAFETY: the pointer is valid for the life of `parameters`, which
        // keeps the owning format context alive.
        let (width, height) = unsafe {
            let par = parameters.as_ptr();
            ((*par).width.max(0) as u32, (*par).height.max(0) as u32)
        };
        Self {
            parameters,
            codec_id,
            width,
            height,
        }
    }
}

/// One decode backend instance, bound to a single connection.
///
/// Feed order is `init` once, then any interleaving of `send_packet` and
/// `receive_frame`. `receive_frame` returning `Ok(None)` means "no frame
/// ready this call", not an error; one packet may yield zero or several
/// frames. Resources are released on drop.
pub trait DecoderBackend {
    /// Open the decoder for the given track.
    fn init(&mut self, track: &TrackParameters) -> Result<()>;

    /// Hand one compressed packet to the decoder.
    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()>;

    /// Pull the next decoded, color-converted frame if one is ready.
    ///
    /// The returned frame's `frame_number` is left at zero; the caller
    /// stamps arrival order.
    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>>;

    /// Currently negotiated output dimensions.
    fn dimensions(&self) -> (u32, u32);
}
