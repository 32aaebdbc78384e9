// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Voice activity detection test tool: runs the detector over a WAV file.

use clap::Parser;
use ha_live::APP_VERSION;
use ha_live::configuration::{VadSettings, get_configuration};
use ha_live::voice::{VadEvent, VoiceActivityDetector, rms};
use log::{debug, info};
use std::path::PathBuf;
use std::process::exit;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(version = APP_VERSION, about = "Voice activity detection test", long_about = None, author = "Unfolded Circle ApS")]
pub struct Opt {
    /// WAV file. Must be mono, 16-bit signed PCM.
    pub audio_file: PathBuf,
    /// Configuration file with the `voice.vad` settings.
    #[arg(short, long)]
    pub config: Option<String>,
    /// RMS energy threshold (overrides configuration).
    #[arg(short, long)]
    pub threshold: Option<f32>,
    /// Minimum speech duration in milliseconds (overrides configuration).
    #[arg(short, long)]
    pub min_speech_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    let opt = Opt::parse();

    let mut settings = get_configuration(opt.config.as_deref())?.voice.vad;
    if let Some(threshold) = opt.threshold {
        settings.threshold = threshold;
    }
    if let Some(ms) = opt.min_speech_ms {
        settings.min_speech_duration = Duration::from_millis(ms);
    }

    let mut reader = hound::WavReader::open(&opt.audio_file)?;
    let spec = reader.spec();
    if spec.channels != 1 {
        eprintln!("Audio file must be mono");
        exit(1);
    }
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        eprintln!("Audio file must be 16-bit signed PCM");
        exit(1);
    }

    let samples = reader
        .samples::<i16>()
        .map(|s| s.map(to_u8))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Scanning {} ({} Hz, {:.1}s) with {settings:?}",
        opt.audio_file.display(),
        spec.sample_rate,
        samples.len() as f32 / spec.sample_rate as f32
    );

    for (offset, event) in scan(&samples, spec.sample_rate, settings) {
        println!("{:>8.2}s {event}", offset.as_secs_f32());
    }

    Ok(())
}

/// Convert a signed 16-bit sample to the unsigned 8-bit representation of an audio analyser.
fn to_u8(sample: i16) -> u8 {
    ((sample as i32 + 32768) >> 8) as u8
}

/// Feed one window per poll interval through the detector with synthetic timestamps.
fn scan(samples: &[u8], sample_rate: u32, settings: VadSettings) -> Vec<(Duration, VadEvent)> {
    let window = (sample_rate as u128 * settings.poll_interval.as_millis() / 1000).max(1) as usize;
    let start = Instant::now();
    let mut detector = VoiceActivityDetector::new(settings);
    let mut events = Vec::new();

    for (i, chunk) in samples.chunks(window).enumerate() {
        let offset = settings.poll_interval * i as u32;
        debug!("{:>8.2}s energy {:.4}", offset.as_secs_f32(), rms(chunk));
        if let Some(event) = detector.process(chunk, start + offset) {
            events.push((offset, event));
        }
    }
    if detector.is_speaking() {
        let offset = Duration::from_secs_f32(samples.len() as f32 / sample_rate as f32);
        events.push((offset, VadEvent::SpeechEnd));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(i16::MIN, 0)]
    #[case(0, 128)]
    #[case(i16::MAX, 255)]
    fn sample_conversion(#[case] sample: i16, #[case] expected: u8) {
        assert_eq!(expected, to_u8(sample));
    }

    #[test]
    fn scan_reports_speech_segment() {
        let settings = VadSettings {
            threshold: 0.1,
            min_speech_duration: Duration::from_millis(200),
            poll_interval: Duration::from_millis(100),
        };
        // 1 kHz: 100 samples per window. 0.5s silence, 0.5s loud, 0.5s silence
        let samples: Vec<u8> = std::iter::repeat_n(128, 500)
            .chain((0..500).map(|i| if i % 2 == 0 { 228 } else { 28 }))
            .chain(std::iter::repeat_n(128, 500))
            .collect();

        let events = scan(&samples, 1000, settings);

        assert_eq!(
            vec![
                (Duration::from_millis(700), VadEvent::SpeechStart),
                (Duration::from_millis(1000), VadEvent::SpeechEnd)
            ],
            events
        );
    }
}
