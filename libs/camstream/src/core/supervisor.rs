// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Orchestration of a fleet of stream workers.
//!
//! The supervisor owns one worker per occupied camera slot, routes
//! per-camera commands to it and hands the consumer two channels: decoded
//! frames (bounded, lossy) and lifecycle events (unbounded, lossless), all
//! tagged with the originating camera. It never decodes and never blocks
//! on delivery.

use std::collections::HashMap;

use crossbeam_channel::Receiver;

use super::config::StreamConfig;
use super::events::{
    event_channel, frame_channel, CameraFrame, CameraId, EventSender, FrameSender, StreamEvent,
};
use super::worker::{StreamState, StreamWorker};
use super::{Result, StreamError};

/// Consumer-side receivers created with the supervisor.
pub struct StreamChannels {
    pub frames: Receiver<CameraFrame>,
    pub events: Receiver<StreamEvent>,
}

/// Manager of all live camera sessions.
pub struct StreamSupervisor {
    config: StreamConfig,
    workers: HashMap<CameraId, StreamWorker>,
    frames: FrameSender,
    events: EventSender,
}

impl StreamSupervisor {
    /// Create the supervisor and the channels its workers will deliver on.
    pub fn new(config: StreamConfig) -> (Self, StreamChannels) {
        let (frames, frame_rx) = frame_channel(config.frame_queue_depth);
        let (events, event_rx) = event_channel();
        (
            Self {
                config,
                workers: HashMap::new(),
                frames,
                events,
            },
            StreamChannels {
                frames: frame_rx,
                events: event_rx,
            },
        )
    }

    /// Create a worker for `camera_id` and start it on `url`.
    ///
    /// Fails if the camera slot is already occupied; use
    /// [`StreamSupervisor::start_stream`] to redirect an existing worker.
    pub fn add_stream(&mut self, camera_id: CameraId, url: &str) -> Result<()> {
        if self.workers.contains_key(&camera_id) {
            return Err(StreamError::SlotOccupied(camera_id.to_string()));
        }
        let mut worker = StreamWorker::new(
            camera_id,
            self.config.clone(),
            self.frames.clone(),
            self.events.clone(),
        );
        worker.start_stream(url)?;
        tracing::info!("[camera {}] stream added: {}", camera_id, url);
        self.workers.insert(camera_id, worker);
        Ok(())
    }

    /// Start or redirect the existing worker for `camera_id`.
    pub fn start_stream(&mut self, camera_id: CameraId, url: &str) -> Result<()> {
        self.worker_mut(camera_id)?.start_stream(url)
    }

    /// Stop the camera's worker, wait for its thread to exit and release
    /// the slot.
    pub fn remove_stream(&mut self, camera_id: CameraId) -> Result<()> {
        let mut worker = self
            .workers
            .remove(&camera_id)
            .ok_or_else(|| StreamError::NotFound(camera_id.to_string()))?;
        worker.stop_stream();
        worker.join()?;
        tracing::info!("[camera {}] stream removed", camera_id);
        Ok(())
    }

    pub fn pause_stream(&self, camera_id: CameraId) -> Result<()> {
        self.worker(camera_id)?.pause_stream();
        Ok(())
    }

    pub fn resume_stream(&self, camera_id: CameraId) -> Result<()> {
        self.worker(camera_id)?.resume_stream();
        Ok(())
    }

    pub fn is_paused(&self, camera_id: CameraId) -> Result<bool> {
        Ok(self.worker(camera_id)?.is_paused())
    }

    pub fn state(&self, camera_id: CameraId) -> Result<StreamState> {
        Ok(self.worker(camera_id)?.state())
    }

    /// Occupied camera slots, ascending.
    pub fn camera_ids(&self) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self.workers.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stop every worker, then join them all.
    ///
    /// Stop flags are raised across the fleet before the first join so
    /// shutdown latency is the slowest worker, not the sum.
    pub fn shutdown(&mut self) {
        for worker in self.workers.values() {
            worker.stop_stream();
        }
        for (camera_id, mut worker) in self.workers.drain() {
            if let Err(e) = worker.join() {
                tracing::error!("[camera {}] shutdown join failed: {}", camera_id, e);
            }
        }
    }
}

impl Drop for StreamSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl StreamSupervisor {
    fn worker(&self, camera_id: CameraId) -> Result<&StreamWorker> {
        self.workers
            .get(&camera_id)
            .ok_or_else(|| StreamError::NotFound(camera_id.to_string()))
    }

    fn worker_mut(&mut self, camera_id: CameraId) -> Result<&mut StreamWorker> {
        self.workers
            .get_mut(&camera_id)
            .ok_or_else(|| StreamError::NotFound(camera_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on the discard port; workers spin in their retry
    // loop, which is all these tests need.
    const DEAD_URL: &str = "rtsp://127.0.0.1:9/live";

    fn test_config() -> StreamConfig {
        StreamConfig {
            connect_timeout_ms: 2_000,
            open_retry_delay_ms: 100,
            reconnect_backoff_ms: 100,
            ..StreamConfig::default()
        }
    }

    #[test]
    fn test_duplicate_camera_slot_rejected() {
        let (mut supervisor, _channels) = StreamSupervisor::new(test_config());
        supervisor.add_stream(CameraId(1), DEAD_URL).unwrap();

        let result = supervisor.add_stream(CameraId(1), DEAD_URL);
        assert!(matches!(result, Err(StreamError::SlotOccupied(_))));
        assert_eq!(supervisor.len(), 1);
    }

    #[test]
    fn test_remove_unknown_camera_fails() {
        let (mut supervisor, _channels) = StreamSupervisor::new(test_config());
        assert!(matches!(
            supervisor.remove_stream(CameraId(9)),
            Err(StreamError::NotFound(_))
        ));
    }

    #[test]
    fn test_commands_to_unknown_camera_fail() {
        let (supervisor, _channels) = StreamSupervisor::new(test_config());
        assert!(supervisor.pause_stream(CameraId(1)).is_err());
        assert!(supervisor.is_paused(CameraId(1)).is_err());
        assert!(supervisor.state(CameraId(1)).is_err());
    }

    #[test]
    fn test_camera_ids_sorted_and_forgotten_on_remove() {
        let (mut supervisor, _channels) = StreamSupervisor::new(test_config());
        supervisor.add_stream(CameraId(3), DEAD_URL).unwrap();
        supervisor.add_stream(CameraId(1), DEAD_URL).unwrap();
        supervisor.add_stream(CameraId(2), DEAD_URL).unwrap();
        assert_eq!(
            supervisor.camera_ids(),
            vec![CameraId(1), CameraId(2), CameraId(3)]
        );

        supervisor.remove_stream(CameraId(2)).unwrap();
        assert_eq!(supervisor.camera_ids(), vec![CameraId(1), CameraId(3)]);
    }

    #[test]
    fn test_pause_is_per_camera() {
        let (mut supervisor, _channels) = StreamSupervisor::new(test_config());
        supervisor.add_stream(CameraId(1), DEAD_URL).unwrap();
        supervisor.add_stream(CameraId(2), DEAD_URL).unwrap();

        supervisor.pause_stream(CameraId(1)).unwrap();
        assert!(supervisor.is_paused(CameraId(1)).unwrap());
        assert!(!supervisor.is_paused(CameraId(2)).unwrap());

        supervisor.resume_stream(CameraId(1)).unwrap();
        assert!(!supervisor.is_paused(CameraId(1)).unwrap());
    }

    #[test]
    fn test_shutdown_joins_all_workers() {
        let (mut supervisor, _channels) = StreamSupervisor::new(test_config());
        for id in 1..=4 {
            supervisor.add_stream(CameraId(id), DEAD_URL).unwrap();
        }

        let start = std::time::Instant::now();
        supervisor.shutdown();
        assert!(supervisor.is_empty());
        assert!(
            start.elapsed() < std::time::Duration::from_secs(10),
            "shutdown took {:?}",
            start.elapsed()
        );
    }
}
