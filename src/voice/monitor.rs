// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Actix actor polling an audio source for voice activity.

use crate::voice::vad::{VadEvent, VoiceActivityDetector};
use actix::{Actor, AsyncContext, Context, Recipient};
use log::{debug, info};
use std::time::Instant;

/// Source of time-domain audio samples, e.g. the analyser of a microphone input.
pub trait AudioSampler {
    /// Current window of unsigned 8-bit samples. `None` if no samples are available right now.
    fn sample(&mut self) -> Option<Vec<u8>>;
}

/// Polls an [`AudioSampler`] in the configured interval and sends speech transitions to a
/// recipient. Stopping the actor stops polling.
pub struct VadMonitor<S: AudioSampler> {
    sampler: S,
    detector: VoiceActivityDetector,
    recipient: Recipient<VadEvent>,
}

impl<S: AudioSampler> VadMonitor<S> {
    pub fn new(sampler: S, detector: VoiceActivityDetector, recipient: Recipient<VadEvent>) -> Self {
        Self {
            sampler,
            detector,
            recipient,
        }
    }

    fn poll(&mut self) {
        let Some(samples) = self.sampler.sample() else {
            return;
        };
        if let Some(event) = self.detector.process(&samples, Instant::now()) {
            debug!("Voice activity: {event}");
            self.recipient.do_send(event);
        }
    }
}

impl<S: AudioSampler + Unpin + 'static> Actor for VadMonitor<S> {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let interval = self.detector.settings().poll_interval;
        info!("Starting voice activity monitor ({interval:?} interval)");
        ctx.run_interval(interval, |act, _| act.poll());
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        // a speech start without end must not leave the consumer in speaking state
        if self.detector.is_speaking() {
            self.detector.reset();
            self.recipient.do_send(VadEvent::SpeechEnd);
        }
        info!("Voice activity monitor stopped");
    }
}
