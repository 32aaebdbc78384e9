// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Energy based voice activity detection.

use crate::configuration::VadSettings;
use actix::Message;
use log::debug;
use std::time::Instant;

/// Speech activity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Message, strum::Display)]
#[rtype(result = "()")]
#[strum(serialize_all = "snake_case")]
pub enum VadEvent {
    SpeechStart,
    SpeechEnd,
}

/// Root mean square energy of unsigned 8-bit time-domain samples.
///
/// Samples are normalized from `0..=255` to `-1..1` with 128 as the zero line. Returns a value in
/// `0..=1`, or 0 for an empty window.
pub fn rms(samples: &[u8]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples
        .iter()
        .map(|s| {
            let v = (*s as f32 - 128.0) / 128.0;
            v * v
        })
        .sum();
    (sum / samples.len() as f32).sqrt()
}

/// Classifies sample windows as speech or silence.
///
/// Speech start is debounced: the energy has to stay above the threshold for at least the minimum
/// speech duration. Speech end is reported with the first window at or below the threshold.
#[derive(Debug)]
pub struct VoiceActivityDetector {
    settings: VadSettings,
    /// Time the energy first exceeded the threshold in the current excursion.
    speech_candidate: Option<Instant>,
    speaking: bool,
}

impl VoiceActivityDetector {
    pub fn new(settings: VadSettings) -> Self {
        Self {
            settings,
            speech_candidate: None,
            speaking: false,
        }
    }

    pub fn settings(&self) -> &VadSettings {
        &self.settings
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Process a window of samples captured at `now`.
    pub fn process(&mut self, samples: &[u8], now: Instant) -> Option<VadEvent> {
        self.process_energy(rms(samples), now)
    }

    /// Process a precomputed RMS energy value.
    pub fn process_energy(&mut self, energy: f32, now: Instant) -> Option<VadEvent> {
        if energy > self.settings.threshold {
            if self.speaking {
                return None;
            }
            let since = *self.speech_candidate.get_or_insert(now);
            if now.saturating_duration_since(since) >= self.settings.min_speech_duration {
                debug!("Speech detected, energy: {energy:.3}");
                self.speaking = true;
                return Some(VadEvent::SpeechStart);
            }
            None
        } else {
            self.speech_candidate = None;
            if self.speaking {
                debug!("Speech ended, energy: {energy:.3}");
                self.speaking = false;
                Some(VadEvent::SpeechEnd)
            } else {
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.speech_candidate = None;
        self.speaking = false;
    }
}
