// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Media source open/probe and packet reading.
//!
//! Thin wrapper over the FFmpeg format layer: opens a URL (RTSP or anything
//! else libavformat understands), locates the video track, and reads
//! compressed packets with the failure classification the worker's retry
//! machinery needs.

use std::sync::Once;

use ffmpeg_next as ffmpeg;

use super::codec::TrackParameters;
use super::config::StreamConfig;
use super::{Result, StreamError};

static LIBRARY_INIT: Once = Once::new();

/// How a single packet read ended.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The packet was filled and is ready for the decoder.
    Packet,
    /// The read failed without terminating the stream; retry the same
    /// connection after a short sleep.
    Transient(ffmpeg::Error),
    /// End of stream or a connection-level failure; tear down and
    /// reconnect.
    Disconnected(ffmpeg::Error),
}

/// One open media source with its selected video track.
///
/// Holds no state beyond the open handle; a reconnect discards the whole
/// demuxer and opens a fresh one.
pub struct Demuxer {
    input: ffmpeg::format::context::Input,
    video_index: usize,
    track: TrackParameters,
}

impl Demuxer {
    /// Open `url` and probe it for a video track.
    ///
    /// The open call is bounded by `config.connect_timeout()` via the
    /// session options; without it a hung TCP handshake would park the
    /// calling thread indefinitely.
    pub fn open(url: &str, config: &StreamConfig) -> Result<Self> {
        LIBRARY_INIT.call_once(|| {
            if let Err(e) = ffmpeg::init() {
                tracing::error!("media library initialization failed: {}", e);
            }
        });

        let mut options = ffmpeg::Dictionary::new();
        options.set("rtsp_transport", config.rtsp_transport.as_option_value());
        // Microseconds; bounds both the handshake and stalled reads.
        let timeout_us = config.connect_timeout().as_micros().to_string();
        options.set("stimeout", &timeout_us);
        options.set("fflags", "nobuffer");
        options.set("flags", "low_delay");
        options.set("max_delay", "500000");

        let input = ffmpeg::format::input_with_dictionary(&url, options)
            .map_err(|e| StreamError::Open(format!("{url}: {e}")))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| StreamError::NoVideoTrack(url.to_string()))?;
        let video_index = stream.index();
        let track = TrackParameters::from_stream(&stream);

        tracing::debug!(
            "opened {}: video track {} ({:?}, {}x{})",
            url,
            video_index,
            track.codec_id,
            track.width,
            track.height
        );

        Ok(Self {
            input,
            video_index,
            track,
        })
    }

    /// Index of the selected video track; packets from other tracks are
    /// skipped by the caller.
    pub fn video_index(&self) -> usize {
        self.video_index
    }

    /// Codec parameters of the selected video track.
    pub fn track_parameters(&self) -> &TrackParameters {
        &self.track
    }

    /// Read the next compressed packet into `packet`.
    ///
    /// Blocks until data arrives, the session's socket timeout fires, or
    /// the stream ends.
    pub fn read_into(&mut self, packet: &mut ffmpeg::Packet) -> ReadOutcome {
        match packet.read(&mut self.input) {
            Ok(()) => ReadOutcome::Packet,
            Err(e) => classify_read_error(e),
        }
    }
}

/// Split read failures into retry-in-place versus reconnect.
///
/// EOF and socket-level errors mean the session is gone; a blocked or
/// corrupt read is worth retrying on the same connection.
pub(crate) fn classify_read_error(error: ffmpeg::Error) -> ReadOutcome {
    match error {
        ffmpeg::Error::Other { errno } if errno == libc::EAGAIN || errno == libc::EINTR => {
            ReadOutcome::Transient(error)
        }
        // A single undecodable unit does not terminate an RTP session.
        ffmpeg::Error::InvalidData => ReadOutcome::Transient(error),
        _ => ReadOutcome::Disconnected(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_means_disconnect() {
        assert!(matches!(
            classify_read_error(ffmpeg::Error::Eof),
            ReadOutcome::Disconnected(_)
        ));
    }

    #[test]
    fn test_connection_errors_mean_disconnect() {
        for errno in [libc::ECONNRESET, libc::EPIPE, libc::EIO, libc::ETIMEDOUT] {
            assert!(matches!(
                classify_read_error(ffmpeg::Error::Other { errno }),
                ReadOutcome::Disconnected(_)
            ));
        }
    }

    #[test]
    fn test_blocked_read_is_transient() {
        assert!(matches!(
            classify_read_error(ffmpeg::Error::Other {
                errno: libc::EAGAIN
            }),
            ReadOutcome::Transient(_)
        ));
    }

    #[test]
    fn test_corrupt_unit_is_transient() {
        assert!(matches!(
            classify_read_error(ffmpeg::Error::InvalidData),
            ReadOutcome::Transient(_)
        ));
    }

    #[test]
    fn test_open_unreachable_source_fails() {
        // Nothing listens on the discard port; the open must fail with an
        // Open error rather than hang (bounded by connect_timeout).
        let config = StreamConfig {
            connect_timeout_ms: 2_000,
            ..StreamConfig::default()
        };
        let result = Demuxer::open("rtsp://127.0.0.1:9/live", &config);
        assert!(matches!(result, Err(StreamError::Open(_))));
    }
}
