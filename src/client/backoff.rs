// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Exponential reconnection backoff.

use crate::configuration::ReconnectSettings;
use std::time::Duration;

/// Tracks reconnection attempts since the last successful connection.
pub struct Backoff {
    settings: ReconnectSettings,
    attempt: u32,
}

impl Backoff {
    pub fn new(settings: ReconnectSettings) -> Self {
        Self {
            settings,
            attempt: 0,
        }
    }

    /// Number of reconnection attempts scheduled since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.attempts
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Schedule the next attempt.
    ///
    /// Returns the delay before the next attempt, or `None` if the maximum number of attempts has
    /// been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.settings.attempts > 0 && self.attempt >= self.settings.attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.delay_for(self.attempt))
    }

    /// Delay of the 1-based retry `attempt`: `min(duration * factor^(attempt-1), duration_max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.settings.duration.as_millis() as f64
            * (self.settings.backoff_factor as f64).powi(exponent);
        let max = self.settings.duration_max.as_millis() as f64;
        Duration::from_millis(delay.min(max) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1000)]
    #[case(2, 2000)]
    #[case(3, 4000)]
    #[case(4, 8000)]
    #[case(5, 16000)]
    #[case(6, 32000)]
    #[case(7, 32000)]
    #[case(10, 32000)]
    #[case(1000, 32000)]
    fn delay_is_exponential_and_capped(#[case] attempt: u32, #[case] expected_ms: u64) {
        let backoff = Backoff::new(ReconnectSettings::default());
        assert_eq!(Duration::from_millis(expected_ms), backoff.delay_for(attempt));
    }

    #[test]
    fn next_delay_stops_after_max_attempts() {
        let mut backoff = Backoff::new(ReconnectSettings::default());
        for k in 1..=10 {
            let expected = Duration::from_millis((1000u64 << (k - 1)).min(32000));
            assert_eq!(Some(expected), backoff.next_delay(), "attempt {k}");
        }
        assert_eq!(None, backoff.next_delay());
        assert_eq!(10, backoff.attempt());
    }

    #[test]
    fn reset_restarts_with_initial_delay() {
        let mut backoff = Backoff::new(ReconnectSettings::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(Some(Duration::from_secs(1)), backoff.next_delay());
    }

    #[test]
    fn zero_attempts_retries_forever() {
        let mut backoff = Backoff::new(ReconnectSettings {
            attempts: 0,
            ..Default::default()
        });
        for _ in 0..100 {
            assert!(backoff.next_delay().is_some());
        }
    }
}
