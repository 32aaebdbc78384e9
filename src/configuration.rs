// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Configuration file handling.

use config::Config;
use log::warn;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use std::fmt::{Display, Formatter};
use std::time::Duration;
use url::Url;

/// Default configuration file.
pub const DEF_CONFIG_FILE: &str = "configuration.yaml";

pub const DEF_HA_URL: &str = "ws://homeassistant.local:8123/api/websocket";

pub const DEF_VOICE_URL: &str = "ws://localhost:8000/ws/voice";

/// Prefix of environment variables overriding configuration keys.
pub const ENV_PREFIX: &str = "HALIVE";

/// Environment variable to enable Home Assistant server WebSocket message tracing.
///
/// Valid values:
/// - `all`: enable incoming and outgoing message traces
/// - `in`: only incoming messages
/// - `out`: only outgoing messages
///
/// The access token of the `auth` message is never traced.
pub const ENV_HASS_MSG_TRACING: &str = "HALIVE_MSG_TRACING";

#[derive(Default, Clone, serde::Deserialize, serde::Serialize)]
pub struct Settings {
    pub hass: HomeAssistantSettings,
    pub voice: VoiceSettings,
}

#[derive(Clone, serde::Deserialize, serde::Serialize)]
pub struct HomeAssistantSettings {
    url: Url,
    token: String,
    /// WebSocket connection timeout in seconds.
    /// This is the max time allowed to connect to the remote host, including DNS name resolution.
    pub connection_timeout: u8,
    pub max_frame_size_kb: usize,
    pub reconnect: ReconnectSettings,
    pub heartbeat: HeartbeatSettings,
}

impl Default for HomeAssistantSettings {
    fn default() -> Self {
        Self {
            url: Url::parse(DEF_HA_URL).unwrap(),
            token: "".to_string(),
            connection_timeout: 6,
            max_frame_size_kb: 5120,
            reconnect: Default::default(),
            heartbeat: Default::default(),
        }
    }
}

impl HomeAssistantSettings {
    pub fn get_url(&self) -> Url {
        self.url.clone()
    }

    pub fn get_token(&self) -> String {
        self.token.clone()
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    pub fn set_token(&mut self, token: impl AsRef<str>) {
        self.token = token.as_ref().trim().to_string();
    }
}

/// Reconnection policy after an unexpected connection loss.
///
/// The delay of retry `k` is `duration * backoff_factor^(k-1)`, capped at `duration_max`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ReconnectSettings {
    /// Maximum number of reconnection attempts. 0 = retry forever.
    pub attempts: u32,
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "duration_ms")]
    pub duration: Duration,
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "duration_max_ms")]
    pub duration_max: Duration,
    pub backoff_factor: f32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            duration: Duration::from_secs(1),
            duration_max: Duration::from_secs(32),
            backoff_factor: 2.0,
        }
    }
}

/// WebSocket heartbeat settings for sending [ping messages](https://developers.home-assistant.io/docs/api/websocket/#pings-and-pongs).
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct HeartbeatSettings {
    /// How often heartbeat pings are sent
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "interval_sec")]
    pub interval: Duration,
    /// How long before lack of server response closes the connection. 0 = disabled, a dead
    /// connection is then only detected by the transport's close event.
    #[serde_as(as = "DurationSeconds")]
    #[serde(rename = "timeout_sec")]
    pub timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::ZERO,
        }
    }
}

impl HeartbeatSettings {
    pub fn timeout_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }
}

impl Display for HeartbeatSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Heartbeat interval={:?}, timeout={:?}",
            self.interval, self.timeout
        )
    }
}

#[derive(Clone, serde::Deserialize, serde::Serialize)]
pub struct VoiceSettings {
    /// Voice pipeline WebSocket server.
    pub url: Url,
    pub vad: VadSettings,
    pub streamer: StreamerSettings,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            url: Url::parse(DEF_VOICE_URL).unwrap(),
            vad: Default::default(),
            streamer: Default::default(),
        }
    }
}

/// Voice activity detection settings.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VadSettings {
    /// RMS energy threshold in the range 0..1.
    pub threshold: f32,
    /// Energy must stay above the threshold at least this long before speech is reported.
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "min_speech_duration_ms")]
    pub min_speech_duration: Duration,
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "poll_interval_ms")]
    pub poll_interval: Duration,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            min_speech_duration: Duration::from_millis(300),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Audio response playback settings.
#[serde_as]
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StreamerSettings {
    /// Playback starts once this much audio is buffered ahead.
    #[serde_as(as = "DurationMilliSeconds")]
    #[serde(rename = "start_threshold_ms")]
    pub start_threshold: Duration,
    /// Content type of the streamed audio chunks.
    pub mime_type: String,
}

impl Default for StreamerSettings {
    fn default() -> Self {
        Self {
            start_threshold: Duration::from_millis(300),
            mime_type: "audio/mpeg".into(),
        }
    }
}

/// Load the configuration settings.
///
/// The application provides default values which can be overriden in the following order:
/// 1. Configuration settings in the read-only yaml configuration file specified in `filename`
/// 2. Environment variables with prefix `HALIVE_` (works only for cfg keys not containing a `_`!)
pub fn get_configuration(filename: Option<&str>) -> Result<Settings, config::ConfigError> {
    // default configuration
    let mut config = Config::builder().add_source(Config::try_from(&Settings::default())?);
    // read optional configuration file to override defaults
    if let Some(filename) = filename {
        config = config.add_source(config::File::with_name(filename));
    }

    // E.g. `HALIVE_HASS_TOKEN=abc` would set the `hass.token` key
    // This does NOT WORK for nested configurations! https://github.com/mehcode/config-rs/issues/312
    let config = config
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("_"))
        .build()?;

    let settings: Settings = config.try_deserialize()?;

    check_cfg_values(settings)
}

fn check_cfg_values(mut settings: Settings) -> Result<Settings, config::ConfigError> {
    if settings.hass.reconnect.backoff_factor < 1.0
        || settings.hass.reconnect.duration.as_millis() < 100
        || settings.hass.reconnect.duration_max.as_millis() < 1000
    {
        warn!("Invalid HA reconnect settings, using defaults.");
        settings.hass.reconnect = Default::default();
    }

    let heartbeat = settings.hass.heartbeat;
    if heartbeat.interval.as_secs() < 5
        || (heartbeat.timeout_enabled() && heartbeat.timeout <= heartbeat.interval)
    {
        warn!("Invalid HA heartbeat settings, using defaults.");
        settings.hass.heartbeat = Default::default();
    }

    let vad = settings.voice.vad;
    if !(0.0..1.0).contains(&vad.threshold) || vad.poll_interval.as_millis() < 10 {
        warn!("Invalid voice activity detection settings, using defaults.");
        settings.voice.vad = Default::default();
    }

    check_ws_url(&mut settings.hass.url, "hass.url")?;
    check_ws_url(&mut settings.voice.url, "voice.url")?;

    Ok(settings)
}

/// Rewrite `http(s)` to `ws(s)`, all other schemes except `ws(s)` are rejected.
fn check_ws_url(url: &mut Url, key: &str) -> Result<(), config::ConfigError> {
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        "http" => set_scheme(url, "ws"),
        "https" => set_scheme(url, "wss"),
        scheme => Err(config::ConfigError::Message(format!(
            "invalid scheme in {key}: {scheme}. Valid: [ws, wss]"
        ))),
    }
}

fn set_scheme(url: &mut Url, scheme: &str) -> Result<(), config::ConfigError> {
    url.set_scheme(scheme).map_err(|_| {
        config::ConfigError::Message(format!("Failed to set scheme {scheme} in url {url}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_reconnect_settings_match_dashboard_policy() {
        let reconnect = ReconnectSettings::default();
        assert_eq!(10, reconnect.attempts);
        assert_eq!(Duration::from_millis(1000), reconnect.duration);
        assert_eq!(Duration::from_millis(32000), reconnect.duration_max);
        assert_eq!(2.0, reconnect.backoff_factor);
    }

    #[test]
    fn default_heartbeat_has_no_pong_timeout() {
        let heartbeat = HeartbeatSettings::default();
        assert_eq!(Duration::from_secs(30), heartbeat.interval);
        assert!(!heartbeat.timeout_enabled());
    }

    #[rstest]
    #[case("http://hass.local:8123/api/websocket", "ws://hass.local:8123/api/websocket")]
    #[case("https://hass.local/api/websocket", "wss://hass.local/api/websocket")]
    #[case("wss://hass.local/api/websocket", "wss://hass.local/api/websocket")]
    fn check_cfg_values_rewrites_http_schemes(#[case] input: &str, #[case] expected: &str) {
        let mut settings = Settings::default();
        settings.hass.set_url(Url::parse(input).unwrap());

        let settings = check_cfg_values(settings).expect("valid settings");

        assert_eq!(expected, settings.hass.get_url().as_str());
    }

    #[test]
    fn check_cfg_values_with_invalid_scheme_returns_err() {
        let mut settings = Settings::default();
        settings.hass.set_url(Url::parse("ftp://hass.local").unwrap());

        assert!(check_cfg_values(settings).is_err());
    }

    #[rstest]
    #[case("http://localhost:8000/ws/voice", "ws://localhost:8000/ws/voice")]
    #[case("https://voice.local/ws/voice", "wss://voice.local/ws/voice")]
    #[case("ws://localhost:8000/ws/voice", "ws://localhost:8000/ws/voice")]
    fn check_cfg_values_rewrites_voice_url(#[case] input: &str, #[case] expected: &str) {
        let mut settings = Settings::default();
        settings.voice.url = Url::parse(input).unwrap();

        let settings = check_cfg_values(settings).expect("valid settings");

        assert_eq!(expected, settings.voice.url.as_str());
    }

    #[test]
    fn check_cfg_values_with_invalid_voice_scheme_returns_err() {
        let mut settings = Settings::default();
        settings.voice.url = Url::parse("ftp://localhost/ws/voice").unwrap();

        let err = check_cfg_values(settings).err().expect("invalid scheme");
        assert!(err.to_string().contains("voice.url"), "{err}");
    }

    #[test]
    fn check_cfg_values_resets_invalid_reconnect_settings() {
        let mut settings = Settings::default();
        settings.hass.reconnect.backoff_factor = 0.5;

        let settings = check_cfg_values(settings).expect("valid settings");

        assert_eq!(ReconnectSettings::default(), settings.hass.reconnect);
    }

    #[rstest]
    #[case(Duration::from_secs(2), Duration::ZERO)]
    #[case(Duration::from_secs(30), Duration::from_secs(30))]
    #[case(Duration::from_secs(30), Duration::from_secs(10))]
    fn check_cfg_values_resets_invalid_heartbeat_settings(
        #[case] interval: Duration,
        #[case] timeout: Duration,
    ) {
        let mut settings = Settings::default();
        settings.hass.heartbeat = HeartbeatSettings { interval, timeout };

        let settings = check_cfg_values(settings).expect("valid settings");

        assert_eq!(HeartbeatSettings::default(), settings.hass.heartbeat);
    }

    #[test]
    fn check_cfg_values_keeps_enabled_pong_timeout() {
        let mut settings = Settings::default();
        let heartbeat = HeartbeatSettings {
            interval: Duration::from_secs(20),
            timeout: Duration::from_secs(60),
        };
        settings.hass.heartbeat = heartbeat;

        let settings = check_cfg_values(settings).expect("valid settings");

        assert_eq!(heartbeat, settings.hass.heartbeat);
    }

    #[test]
    fn set_token_trims_whitespace() {
        let mut settings = HomeAssistantSettings::default();
        settings.set_token("  secret\n");
        assert_eq!("secret", settings.get_token());
    }
}
