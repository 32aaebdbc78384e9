// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Voice pipeline: voice activity detection, response audio streaming and barge-in.

mod client;
mod file_output;
mod monitor;
pub mod protocol;
mod session;
mod streamer;
mod vad;

pub use client::{Close, MediaEvent, SendAudio, VoiceClient};
pub use file_output::FileOutput;
pub use monitor::{AudioSampler, VadMonitor};
pub use session::{SessionUpdate, VoiceSession};
pub use streamer::{AppendStatus, AudioStreamer, MediaBackend, MediaError, StreamMode};
pub use vad::{VadEvent, VoiceActivityDetector, rms};
