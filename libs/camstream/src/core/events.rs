// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame and lifecycle event delivery to the consumer.
//!
//! Replaces in-process signal/slot wiring with two channels per supervisor:
//!
//! - decoded frames ride a bounded channel written with non-blocking sends;
//!   when the consumer is busy the frame is dropped, so a slow consumer can
//!   never stall ingestion,
//! - lifecycle events (disconnect, reconnect) ride an unbounded channel and
//!   are never dropped.
//!
//! Every message is tagged with the originating [`CameraId`] so concurrent
//! streams are never confused with one another.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::frames::DecodedFrame;

/// Stable identity of one camera position (1..N in the surrounding app).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct CameraId(pub u32);

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded frame tagged with its source camera.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub camera_id: CameraId,
    pub frame: DecodedFrame,
}

/// Lifecycle notifications forwarded to the consumer.
///
/// `Disconnected` fires once per unexpected loss of connection (never on an
/// explicit stop); `Reconnecting` fires once the backoff has elapsed and a
/// new connection attempt is about to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Disconnected { camera_id: CameraId, url: String },
    Reconnecting { camera_id: CameraId, url: String },
}

/// Sending half of the decoded-frame channel.
///
/// Sends are non-blocking: if the channel is full the frame is dropped and
/// the decode loop moves on. Newer frames win over older ones on a lagging
/// consumer.
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<CameraFrame>,
}

impl FrameSender {
    /// Deliver a frame, dropping it if the consumer is behind.
    ///
    /// Returns whether the frame was accepted; the caller only uses this
    /// for diagnostics.
    pub fn send(&self, camera_id: CameraId, frame: DecodedFrame) -> bool {
        let accepted = self.tx.try_send(CameraFrame { camera_id, frame }).is_ok();
        if !accepted {
            tracing::trace!("[camera {}] consumer busy, frame dropped", camera_id);
        }
        accepted
    }
}

/// Sending half of the lifecycle event channel. Lossless.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<StreamEvent>,
}

impl EventSender {
    pub fn send(&self, event: StreamEvent) {
        // A departed consumer is not an error; the worker keeps running
        // until explicitly stopped.
        let _ = self.tx.send(event);
    }
}

/// Create the bounded frame channel shared by all workers of a supervisor.
pub fn frame_channel(capacity: usize) -> (FrameSender, Receiver<CameraFrame>) {
    let (tx, rx) = bounded(capacity);
    (FrameSender { tx }, rx)
}

/// Create the unbounded lifecycle event channel.
pub fn event_channel() -> (EventSender, Receiver<StreamEvent>) {
    let (tx, rx) = unbounded();
    (EventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_frame(frame_number: u64) -> DecodedFrame {
        DecodedFrame::new(2, 2, 6, vec![0u8; 12], frame_number)
    }

    #[test]
    fn test_frames_are_tagged_with_camera_id() {
        let (tx, rx) = frame_channel(4);
        tx.send(CameraId(1), test_frame(0));
        tx.send(CameraId(2), test_frame(0));

        assert_eq!(rx.recv().unwrap().camera_id, CameraId(1));
        assert_eq!(rx.recv().unwrap().camera_id, CameraId(2));
    }

    #[test]
    fn test_frame_dropped_when_consumer_busy() {
        let (tx, rx) = frame_channel(1);
        assert!(tx.send(CameraId(1), test_frame(0)));
        // Channel full, consumer hasn't drained: frame is dropped.
        assert!(!tx.send(CameraId(1), test_frame(1)));

        assert_eq!(rx.recv().unwrap().frame.frame_number, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_frame_send_never_blocks() {
        let (tx, _rx) = frame_channel(1);
        tx.send(CameraId(1), test_frame(0));

        let start = std::time::Instant::now();
        tx.send(CameraId(1), test_frame(1));
        assert!(
            start.elapsed() < Duration::from_millis(1),
            "send must not block on a full channel"
        );
    }

    #[test]
    fn test_lifecycle_events_are_lossless() {
        let (tx, rx) = event_channel();
        for _ in 0..100 {
            tx.send(StreamEvent::Disconnected {
                camera_id: CameraId(3),
                url: "rtsp://cam/3".into(),
            });
        }
        assert_eq!(rx.len(), 100);
    }

    #[test]
    fn test_event_send_survives_dropped_consumer() {
        let (tx, rx) = event_channel();
        drop(rx);
        // Must not panic or error out of the worker loop.
        tx.send(StreamEvent::Reconnecting {
            camera_id: CameraId(1),
            url: "rtsp://cam/1".into(),
        });
    }
}
