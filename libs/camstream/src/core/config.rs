// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-stream ingest configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// RTSP transport selection passed down to the media session.
///
/// TCP interleaving is the default: camera feeds routinely cross NAT and
/// lossy Wi-Fi segments where UDP RTP drops entire GOPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RtspTransport {
    #[default]
    Tcp,
    Udp,
}

impl RtspTransport {
    pub(crate) fn as_option_value(self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
        }
    }
}

/// Tunables shared by every stream worker.
///
/// All durations are milliseconds so configs stay plain-data friendly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// RTSP transport for the underlying session.
    pub rtsp_transport: RtspTransport,

    /// Upper bound on connect/handshake time. The session open call has no
    /// inherent timeout, so a hung TCP handshake would otherwise park the
    /// worker thread forever.
    pub connect_timeout_ms: u64,

    /// Sleep before retrying after a failed open (unreachable source, no
    /// video track, decoder refused to come up).
    pub open_retry_delay_ms: u64,

    /// Sleep before re-connecting after an established stream drops.
    pub reconnect_backoff_ms: u64,

    /// Sleep before retrying a single failed read that did not terminate
    /// the stream.
    pub transient_retry_ms: u64,

    /// Capacity of the decoded-frame channel shared by all cameras. Frames
    /// beyond this are dropped, never queued.
    pub frame_queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            rtsp_transport: RtspTransport::Tcp,
            connect_timeout_ms: 10_000,
            open_retry_delay_ms: 1_000,
            reconnect_backoff_ms: 2_000,
            transient_retry_ms: 50,
            frame_queue_depth: 4,
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn open_retry_delay(&self) -> Duration {
        Duration::from_millis(self.open_retry_delay_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn transient_retry(&self) -> Duration {
        Duration::from_millis(self.transient_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.rtsp_transport, RtspTransport::Tcp);
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(2));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.frame_queue_depth > 0);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: StreamConfig =
            serde_json::from_str(r#"{"reconnect_backoff_ms": 500}"#).unwrap();
        assert_eq!(config.reconnect_backoff_ms, 500);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn test_transport_serializes_lowercase() {
        let json = serde_json::to_string(&RtspTransport::Tcp).unwrap();
        assert_eq!(json, r#""tcp""#);
    }
}
