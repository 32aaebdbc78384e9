// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Incremental playback of streamed audio chunks.

use crate::configuration::StreamerSettings;
use bytes::{Bytes, BytesMut};
use derive_more::Display;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Display, Clone, PartialEq)]
pub enum MediaError {
    #[display("Unsupported audio format: {_0}")]
    Unsupported(String),
    #[display("Playback error: {_0}")]
    Runtime(String),
}

impl std::error::Error for MediaError {}

/// Result of [`MediaBackend::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    /// The chunk has been appended.
    Done,
    /// The append operation is still running. Its completion must be reported with
    /// [`AudioStreamer::on_append_complete`].
    Pending,
}

/// Audio output used by the [`AudioStreamer`].
pub trait MediaBackend {
    /// Whether the content type can be played incrementally.
    fn is_supported(&self, mime_type: &str) -> bool;

    /// Append a chunk to the streaming buffer. Only one append operation is active at a time.
    fn append(&mut self, chunk: &[u8]) -> Result<AppendStatus, MediaError>;

    /// Duration of buffered audio ahead of the playback position.
    fn buffered_ahead(&self) -> Duration;

    /// Start playback of the streaming buffer.
    fn play(&mut self) -> Result<(), MediaError>;

    /// No more chunks will be appended to the streaming buffer.
    fn end_of_stream(&mut self);

    /// Play a complete audio object as one unit.
    fn play_all(&mut self, data: Bytes) -> Result<(), MediaError>;

    /// Stop playback and discard the streaming buffer.
    fn stop(&mut self);

    /// Whether all audio handed to the backend has been played.
    ///
    /// Backends reporting the end asynchronously keep the default; their owner calls
    /// [`AudioStreamer::on_playback_ended`] instead.
    fn playback_finished(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StreamMode {
    /// Chunks are appended to the streaming buffer one after another.
    Streaming,
    /// Chunks are collected and played as one unit when the stream finishes.
    Fallback,
}

/// Plays a sequence of audio chunks with low latency.
///
/// Chunks are appended one at a time and playback starts once enough audio is buffered. If the
/// backend can't stream the format or fails, the streamer permanently switches to fallback mode:
/// all chunks of the response are concatenated and played when the stream is finished.
pub struct AudioStreamer<B: MediaBackend> {
    backend: B,
    start_threshold: Duration,
    mode: StreamMode,
    queue: VecDeque<Bytes>,
    /// All chunks of the current response, for the fallback playback
    received: BytesMut,
    appending: bool,
    playing: bool,
    finished: bool,
}

impl<B: MediaBackend> AudioStreamer<B> {
    pub fn new(backend: B, settings: &StreamerSettings) -> Self {
        let mode = if backend.is_supported(&settings.mime_type) {
            StreamMode::Streaming
        } else {
            warn!(
                "Streaming of {} not supported, using fallback playback",
                settings.mime_type
            );
            StreamMode::Fallback
        };
        Self {
            backend,
            start_threshold: settings.start_threshold,
            mode,
            queue: Default::default(),
            received: BytesMut::new(),
            appending: false,
            playing: false,
            finished: false,
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.backend.playback_finished()
    }

    /// Number of chunks waiting to be appended.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Queue a chunk of the current response.
    pub fn push(&mut self, chunk: Bytes) {
        if self.finished {
            // a new response starts
            self.reset();
        }
        self.received.extend_from_slice(&chunk);
        if self.mode == StreamMode::Streaming {
            self.queue.push_back(chunk);
            self.pump();
        }
    }

    /// The pending append operation of the backend completed.
    pub fn on_append_complete(&mut self) {
        if !self.appending {
            debug!("Ignoring append completion without pending append");
            return;
        }
        self.appending = false;
        self.appended();
        self.pump();
    }

    /// The backend reported an error during streaming playback.
    pub fn on_error(&mut self, error: MediaError) {
        self.enter_fallback(error);
    }

    /// The backend finished playing all audio.
    pub fn on_playback_ended(&mut self) {
        self.playing = false;
    }

    /// All chunks of the response have been pushed.
    ///
    /// Playback starts with whatever is buffered if the start threshold hasn't been reached.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        match self.mode {
            StreamMode::Fallback => self.play_fallback(),
            StreamMode::Streaming => self.end_if_drained(),
        }
    }

    /// Stop playback and discard all queued chunks, e.g. if the user interrupts the response.
    pub fn stop(&mut self) {
        info!("Stopping audio playback");
        self.backend.stop();
        self.reset();
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.received.clear();
        self.appending = false;
        self.playing = false;
        self.finished = false;
    }

    /// Append the next queued chunk if no append is active.
    fn pump(&mut self) {
        while !self.appending && self.mode == StreamMode::Streaming {
            let Some(chunk) = self.queue.pop_front() else {
                self.end_if_drained();
                return;
            };
            match self.backend.append(&chunk) {
                Ok(AppendStatus::Pending) => self.appending = true,
                Ok(AppendStatus::Done) => self.appended(),
                Err(e) => {
                    self.enter_fallback(e);
                    return;
                }
            }
        }
    }

    fn appended(&mut self) {
        if !self.playing && self.backend.buffered_ahead() >= self.start_threshold {
            self.start_playback();
        }
    }

    fn start_playback(&mut self) {
        debug!("Starting playback");
        match self.backend.play() {
            Ok(_) => self.playing = true,
            Err(e) => self.enter_fallback(e),
        }
    }

    fn end_if_drained(&mut self) {
        if !self.finished || self.appending || !self.queue.is_empty() {
            return;
        }
        if !self.playing {
            self.start_playback();
        }
        if self.mode == StreamMode::Streaming {
            self.backend.end_of_stream();
        }
    }

    fn enter_fallback(&mut self, error: MediaError) {
        if self.mode == StreamMode::Fallback {
            return;
        }
        warn!("{error}, switching to fallback playback");
        self.mode = StreamMode::Fallback;
        self.backend.stop();
        self.queue.clear();
        self.appending = false;
        self.playing = false;
        if self.finished {
            self.play_fallback();
        }
    }

    fn play_fallback(&mut self) {
        if self.received.is_empty() {
            return;
        }
        let data = self.received.split().freeze();
        debug!("Playing {} bytes of buffered audio", data.len());
        match self.backend.play_all(data) {
            Ok(_) => self.playing = true,
            Err(e) => warn!("Fallback playback failed: {e}"),
        }
    }
}
