// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-camera stream worker.
//!
//! One dedicated OS thread per camera owns the demuxer/decoder pair and
//! runs the read → decode → convert → emit loop. Commands (start, stop,
//! pause, resume, URL change) arrive through a mutex-guarded control block
//! paired with a condition variable; the worker observes them once per loop
//! iteration and after every blocking wait.
//!
//! Failure policy: everything short of an explicit stop loops back to a
//! retry. An unreachable source is retried indefinitely; an established
//! stream that drops emits `Disconnected`, sleeps the backoff, emits
//! `Reconnecting` and connects again from scratch.

use std::sync::Arc;
use std::time::Instant;

use ffmpeg_next as ffmpeg;
use parking_lot::{Condvar, Mutex};

use super::codec::{DecoderBackend, VideoDecoder};
use super::config::StreamConfig;
use super::demux::{Demuxer, ReadOutcome};
use super::events::{CameraId, EventSender, FrameSender, StreamEvent};
use super::{Result, StreamError};

/// Lifecycle of one camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed or parked; no URL to serve.
    Idle,
    /// Opening the source and bringing up the decoder.
    Connecting,
    /// Decoding and emitting frames.
    Streaming,
    /// Connected, frame emission suspended.
    Paused,
    /// Connection lost; waiting out the backoff before reconnecting.
    Reconnecting,
    /// Terminal; reached only through an explicit stop.
    Stopped,
}

/// Shared command flags. Invariant: every read and write, and every
/// condvar wait/wake, happens under this one mutex.
struct ControlBlock {
    url: String,
    stop: bool,
    pause: bool,
    state: StreamState,
}

struct WorkerShared {
    control: Mutex<ControlBlock>,
    wakeup: Condvar,
}

/// Handle to one camera's worker thread.
///
/// Dropping the handle stops the worker and joins the thread.
pub struct StreamWorker {
    camera_id: CameraId,
    config: StreamConfig,
    shared: Arc<WorkerShared>,
    thread: Option<std::thread::JoinHandle<()>>,
    frames: FrameSender,
    events: EventSender,
}

impl StreamWorker {
    pub fn new(
        camera_id: CameraId,
        config: StreamConfig,
        frames: FrameSender,
        events: EventSender,
    ) -> Self {
        Self {
            camera_id,
            config,
            shared: Arc::new(WorkerShared {
                control: Mutex::new(ControlBlock {
                    url: String::new(),
                    stop: false,
                    pause: false,
                    state: StreamState::Idle,
                }),
                wakeup: Condvar::new(),
            }),
            thread: None,
            frames,
            events,
        }
    }

    /// Begin (or redirect) this worker's connection.
    ///
    /// Starts the worker thread on first use, otherwise wakes the parked
    /// thread. Calling again with the same URL while streaming is a no-op;
    /// a different URL forces a reconnect on the next loop iteration.
    pub fn start_stream(&mut self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(StreamError::Open("empty stream url".into()));
        }

        {
            let mut control = self.shared.control.lock();
            control.url = url.to_string();
            control.stop = false;
        }

        // A previously stopped thread is joined before respawning so the
        // worker slot can be reused for a new source.
        if self
            .thread
            .as_ref()
            .is_some_and(|handle| handle.is_finished())
        {
            self.join()?;
        }

        if self.thread.is_none() {
            let camera_id = self.camera_id;
            let shared = Arc::clone(&self.shared);
            let config = self.config.clone();
            let frames = self.frames.clone();
            let events = self.events.clone();
            let handle = std::thread::Builder::new()
                .name(format!("camera-{}", self.camera_id))
                .spawn(move || run_worker(camera_id, shared, config, frames, events))
                .map_err(|e| StreamError::Runtime(format!("failed to spawn worker: {e}")))?;
            self.thread = Some(handle);
        } else {
            self.shared.wakeup.notify_all();
        }
        Ok(())
    }

    /// Request termination. Terminal; follow with [`StreamWorker::join`].
    pub fn stop_stream(&self) {
        let mut control = self.shared.control.lock();
        control.stop = true;
        self.shared.wakeup.notify_all();
    }

    /// Suspend frame emission without closing the connection.
    pub fn pause_stream(&self) {
        self.shared.control.lock().pause = true;
    }

    /// Resume a paused stream. No re-negotiation happens.
    pub fn resume_stream(&self) {
        let mut control = self.shared.control.lock();
        control.pause = false;
        self.shared.wakeup.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.control.lock().pause
    }

    pub fn state(&self) -> StreamState {
        self.shared.control.lock().state
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    /// Wait for the worker thread to exit and release its resources.
    pub fn join(&mut self) -> Result<()> {
        if let Some(handle) = self.thread.take() {
            handle.join().map_err(|panic_err| {
                tracing::error!(
                    "[camera {}] worker thread panicked: {:?}",
                    self.camera_id,
                    panic_err
                );
                StreamError::Runtime(format!("camera {} worker panicked", self.camera_id))
            })?;
        }
        Ok(())
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.stop_stream();
        let _ = self.join();
    }
}

/// Why one connection cycle ended.
enum ConnectionEnd {
    /// Stop was requested; the worker exits.
    Stopped,
    /// The URL changed under us; reconnect immediately to the new source.
    Redirected,
    /// Open, probe or decoder bring-up failed; retry after a delay.
    OpenFailed,
    /// An established stream died; run the reconnect path.
    Disconnected,
}

/// How a backoff wait ended.
enum BackoffEnd {
    Elapsed,
    Stopped,
    Redirected,
}

fn run_worker(
    camera_id: CameraId,
    shared: Arc<WorkerShared>,
    config: StreamConfig,
    frames: FrameSender,
    events: EventSender,
) {
    tracing::debug!("[camera {}] worker thread started", camera_id);

    loop {
        // Park until there is a URL to serve, or exit on stop.
        let url = {
            let mut control = shared.control.lock();
            loop {
                if control.stop {
                    control.state = StreamState::Stopped;
                    tracing::debug!("[camera {}] worker stopped while idle", camera_id);
                    return;
                }
                if !control.url.is_empty() {
                    break;
                }
                control.state = StreamState::Idle;
                shared.wakeup.wait(&mut control);
            }
            control.state = StreamState::Connecting;
            control.url.clone()
        };

        let end = run_connection(camera_id, &url, &shared, &config, &frames);

        match end {
            ConnectionEnd::Stopped => {
                shared.control.lock().state = StreamState::Stopped;
                tracing::info!("[camera {}] worker stopped", camera_id);
                return;
            }
            ConnectionEnd::Redirected => {
                tracing::info!("[camera {}] redirecting to new source", camera_id);
                continue;
            }
            ConnectionEnd::OpenFailed | ConnectionEnd::Disconnected => {
                // Stop may have raced the failure; never report a loss the
                // caller asked for.
                {
                    let mut control = shared.control.lock();
                    if control.stop {
                        control.state = StreamState::Stopped;
                        tracing::info!("[camera {}] worker stopped", camera_id);
                        return;
                    }
                }

                events.send(StreamEvent::Disconnected {
                    camera_id,
                    url: url.clone(),
                });

                // A lost stream waits out the backoff in Reconnecting; a
                // source that never opened parks back in Idle between
                // attempts.
                let (delay, wait_state) = match end {
                    ConnectionEnd::Disconnected => {
                        (config.reconnect_backoff(), StreamState::Reconnecting)
                    }
                    _ => (config.open_retry_delay(), StreamState::Idle),
                };
                match wait_backoff(&shared, delay, wait_state, &url) {
                    BackoffEnd::Stopped => {
                        shared.control.lock().state = StreamState::Stopped;
                        tracing::info!("[camera {}] worker stopped", camera_id);
                        return;
                    }
                    BackoffEnd::Redirected => continue,
                    BackoffEnd::Elapsed => {
                        events.send(StreamEvent::Reconnecting {
                            camera_id,
                            url: url.clone(),
                        });
                    }
                }
            }
        }
    }
}

/// Sleep out a retry delay on the worker's condvar so stop and URL changes
/// cut it short.
fn wait_backoff(
    shared: &WorkerShared,
    delay: std::time::Duration,
    wait_state: StreamState,
    url: &str,
) -> BackoffEnd {
    let deadline = Instant::now() + delay;
    let mut control = shared.control.lock();
    control.state = wait_state;
    loop {
        if control.stop {
            return BackoffEnd::Stopped;
        }
        if control.url != url {
            return BackoffEnd::Redirected;
        }
        if shared
            .wakeup
            .wait_until(&mut control, deadline)
            .timed_out()
        {
            break;
        }
    }
    if control.stop {
        return BackoffEnd::Stopped;
    }
    control.state = StreamState::Connecting;
    BackoffEnd::Elapsed
}

/// One full connection cycle: open, probe, decode until the stream ends or
/// a command interrupts. The demuxer/decoder pair lives exactly as long as
/// this call; a reconnect always rebuilds both.
fn run_connection(
    camera_id: CameraId,
    url: &str,
    shared: &WorkerShared,
    config: &StreamConfig,
    frames: &FrameSender,
) -> ConnectionEnd {
    let mut demuxer = match Demuxer::open(url, config) {
        Ok(demuxer) => demuxer,
        Err(e) => {
            tracing::warn!("[camera {}] open failed: {}", camera_id, e);
            return ConnectionEnd::OpenFailed;
        }
    };

    let mut decoder = match VideoDecoder::new(demuxer.track_parameters()) {
        Ok(decoder) => decoder,
        Err(e) => {
            tracing::warn!("[camera {}] decoder init failed: {}", camera_id, e);
            return ConnectionEnd::OpenFailed;
        }
    };

    let (width, height) = decoder.dimensions();
    tracing::info!(
        "[camera {}] streaming {} ({}x{})",
        camera_id,
        url,
        width,
        height
    );
    shared.control.lock().state = StreamState::Streaming;

    let mut packet = ffmpeg::Packet::empty();
    let mut next_frame: u64 = 0;

    loop {
        match demuxer.read_into(&mut packet) {
            ReadOutcome::Packet => {
                if packet.stream() == demuxer.video_index() {
                    match decoder.send_packet(&packet) {
                        Ok(()) => {
                            drain_frames(&mut decoder, camera_id, frames, &mut next_frame);
                        }
                        Err(e) => {
                            tracing::debug!(
                                "[camera {}] packet rejected by decoder: {}",
                                camera_id,
                                e
                            );
                        }
                    }
                }
            }
            ReadOutcome::Transient(e) => {
                tracing::debug!("[camera {}] transient read error: {}", camera_id, e);
                std::thread::sleep(config.transient_retry());
            }
            ReadOutcome::Disconnected(e) => {
                tracing::warn!("[camera {}] stream lost: {}", camera_id, e);
                return ConnectionEnd::Disconnected;
            }
        }

        // Observe commands once per iteration. Pausing blocks right here,
        // so upstream buffering stays bounded by the library's own queue
        // and resume continues without re-negotiation.
        let mut control = shared.control.lock();
        while control.pause && !control.stop && control.url == url {
            control.state = StreamState::Paused;
            shared.wakeup.wait(&mut control);
        }
        if control.stop {
            return ConnectionEnd::Stopped;
        }
        if control.url != url {
            return ConnectionEnd::Redirected;
        }
        control.state = StreamState::Streaming;
    }
}

/// Pull every frame the backend will produce for the packets sent so far,
/// stamping arrival order and emitting each immediately.
///
/// Decode hiccups end the drain for this iteration but never escalate; the
/// connection only dies on read failures.
fn drain_frames(
    decoder: &mut dyn DecoderBackend,
    camera_id: CameraId,
    frames: &FrameSender,
    next_frame: &mut u64,
) -> usize {
    let mut emitted = 0;
    loop {
        match decoder.receive_frame() {
            Ok(Some(mut frame)) => {
                frame.frame_number = *next_frame;
                *next_frame += 1;
                frames.send(camera_id, frame);
                emitted += 1;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("[camera {}] frame discarded: {}", camera_id, e);
                break;
            }
        }
    }
    emitted
}
