// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Software decode path: libavcodec decode plus swscale conversion to RGB24.

use ffmpeg_next as ffmpeg;

use ffmpeg::software::scaling;
use ffmpeg::util::format::Pixel;
use ffmpeg::util::frame;

use super::{DecoderBackend, TrackParameters};
use crate::core::frames::DecodedFrame;
use crate::core::{Result, StreamError};

/// Generic software decoder for whatever codec the track negotiated.
///
/// Decodes to the codec's native planar format and converts with a
/// persistent scaling context sized to the current resolution. The scratch
/// frames are reused every iteration; emitted frames are copies.
pub struct SoftwareDecoder {
    decoder: Option<ffmpeg::decoder::Video>,
    scaler: Option<scaling::Context>,
    decoded: frame::Video,
    rgb: frame::Video,
    src_format: Pixel,
    width: u32,
    height: u32,
}

impl SoftwareDecoder {
    pub fn new() -> Self {
        Self {
            decoder: None,
            scaler: None,
            decoded: frame::Video::empty(),
            rgb: frame::Video::empty(),
            src_format: Pixel::None,
            width: 0,
            height: 0,
        }
    }

    /// (Re)build the conversion context for the current decoded format.
    ///
    /// Called lazily on the first frame and again whenever the source
    /// changes resolution or pixel format mid-session.
    fn renegotiate(&mut self, format: Pixel, width: u32, height: u32) -> Result<()> {
        if self.scaler.is_some() {
            tracing::info!(
                "decoded format changed: {:?} {}x{} -> {:?} {}x{}",
                self.src_format,
                self.width,
                self.height,
                format,
                width,
                height
            );
        }
        let scaler = scaling::Context::get(
            format,
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| StreamError::Conversion(format!("scaler setup: {e}")))?;
        self.scaler = Some(scaler);
        self.rgb = frame::Video::empty();
        self.src_format = format;
        self.width = width;
        self.height = height;
        Ok(())
    }
}

impl Default for SoftwareDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderBackend for SoftwareDecoder {
    fn init(&mut self, track: &TrackParameters) -> Result<()> {
        let context = ffmpeg::codec::context::Context::from_parameters(track.parameters.clone())
            .map_err(|e| StreamError::DecoderInit(format!("{:?}: {e}", track.codec_id)))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| StreamError::DecoderInit(format!("{:?}: {e}", track.codec_id)))?;
        self.width = decoder.width();
        self.height = decoder.height();
        self.decoder = Some(decoder);
        tracing::debug!(
            "software decoder ready for {:?} ({}x{})",
            track.codec_id,
            self.width,
            self.height
        );
        Ok(())
    }

    fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| StreamError::Decode("decoder not initialized".into()))?;
        match decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            // Output queue full; drain via receive_frame and move on.
            Err(ffmpeg::Error::Other { errno }) if errno == libc::EAGAIN => Ok(()),
            Err(e) => Err(StreamError::Media(e)),
        }
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| StreamError::Decode("decoder not initialized".into()))?;

        match decoder.receive_frame(&mut self.decoded) {
            Ok(()) => {}
            Err(ffmpeg::Error::Other { errno }) if errno == libc::EAGAIN => return Ok(None),
            Err(ffmpeg::Error::Eof) => return Ok(None),
            Err(e) => return Err(StreamError::Decode(e.to_string())),
        }

        let (format, width, height) = (
            self.decoded.format(),
            self.decoded.width(),
            self.decoded.height(),
        );
        if self.scaler.is_none()
            || format != self.src_format
            || width != self.width
            || height != self.height
        {
            self.renegotiate(format, width, height)?;
        }
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(StreamError::Conversion("no conversion context".into()));
        };
        scaler
            .run(&self.decoded, &mut self.rgb)
            .map_err(|e| StreamError::Conversion(e.to_string()))?;

        let stride = self.rgb.stride(0);
        let data = self.rgb.data(0).to_vec();
        Ok(Some(DecodedFrame::new(width, height, stride, data, 0)))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
