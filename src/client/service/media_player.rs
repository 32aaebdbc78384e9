// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Media player entity specific HA service call logic.

use crate::client::service::{DeviceCommand, cmd_from_str, get_required_params};
use crate::errors::ServiceError;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum MediaPlayerCommand {
    On,
    Off,
    Toggle,
    PlayPause,
    Stop,
    Previous,
    Next,
    Volume,
    VolumeUp,
    VolumeDown,
    Mute,
    Unmute,
    SelectSource,
}

pub fn handle_media_player(msg: &DeviceCommand) -> Result<(String, Option<Value>), ServiceError> {
    let cmd: MediaPlayerCommand = cmd_from_str(&msg.cmd_id)?;

    let result = match cmd {
        MediaPlayerCommand::On => ("turn_on".into(), None),
        MediaPlayerCommand::Off => ("turn_off".into(), None),
        MediaPlayerCommand::Toggle => ("toggle".into(), None),
        MediaPlayerCommand::PlayPause => ("media_play_pause".into(), None),
        MediaPlayerCommand::Stop => ("media_stop".into(), None),
        MediaPlayerCommand::Previous => ("media_previous_track".into(), None),
        MediaPlayerCommand::Next => ("media_next_track".into(), None),
        MediaPlayerCommand::Volume => {
            let mut data = Map::new();
            let params = get_required_params(msg)?;
            if let Some(volume @ 0..=100) = params.get("volume").and_then(|v| v.as_u64()) {
                data.insert("volume_level".into(), (volume as f64 / 100_f64).into());
            } else {
                return Err(ServiceError::BadRequest(
                    "Invalid or missing params.volume attribute".into(),
                ));
            }
            ("volume_set".into(), Some(data.into()))
        }
        MediaPlayerCommand::VolumeUp => ("volume_up".into(), None),
        MediaPlayerCommand::VolumeDown => ("volume_down".into(), None),
        MediaPlayerCommand::Mute => (
            "volume_mute".into(),
            Some(json!({ "is_volume_muted": true })),
        ),
        MediaPlayerCommand::Unmute => (
            "volume_mute".into(),
            Some(json!({ "is_volume_muted": false })),
        ),
        MediaPlayerCommand::SelectSource => {
            let params = get_required_params(msg)?;
            match params.get("source").and_then(|v| v.as_str()) {
                Some(source) if !source.is_empty() => {
                    ("select_source".into(), Some(json!({ "source": source })))
                }
                _ => {
                    return Err(ServiceError::BadRequest(
                        "Invalid or missing params.source attribute".into(),
                    ));
                }
            }
        }
    };

    Ok(result)
}
