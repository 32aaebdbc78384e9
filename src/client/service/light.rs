// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Light entity specific HA service call logic.

use crate::client::service::{DeviceCommand, cmd_from_str, get_u64_in_range};
use crate::errors::ServiceError;
use serde_json::{Map, Value, json};

const DEFAULT_MIN_MIREDS: u16 = 153;
const DEFAULT_MAX_MIREDS: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum LightCommand {
    On,
    Off,
    Toggle,
}

pub(crate) fn handle_light(msg: &DeviceCommand) -> Result<(String, Option<Value>), ServiceError> {
    let cmd: LightCommand = cmd_from_str(&msg.cmd_id)?;

    let result = match cmd {
        LightCommand::On => {
            let mut data = Map::new();
            let params = msg.params.as_ref();
            if let Some(brightness) = get_u64_in_range(params, "brightness", 0, 255)? {
                data.insert("brightness".into(), brightness.into());
            }
            if let Some(color_temp_pct) = get_u64_in_range(params, "color_temperature", 0, 100)? {
                // the light's mired range is taken from the command if the card knows it
                let min_mireds = get_u64_in_range(params, "min_mireds", 1, u16::MAX as u64)?
                    .map(|v| v as u16)
                    .unwrap_or(DEFAULT_MIN_MIREDS);
                let max_mireds = get_u64_in_range(params, "max_mireds", 1, u16::MAX as u64)?
                    .map(|v| v as u16)
                    .unwrap_or(DEFAULT_MAX_MIREDS);
                let color_temp =
                    color_temp_percent_to_mired(color_temp_pct, min_mireds, max_mireds)?;
                data.insert("color_temp".into(), color_temp.into());
            }
            if let Some(rgb) = params.and_then(|p| p.get("rgb_color")) {
                data.insert("rgb_color".into(), parse_rgb(rgb)?);
            }
            if data.is_empty() {
                ("turn_on".into(), None)
            } else {
                ("turn_on".into(), Some(Value::Object(data)))
            }
        }
        LightCommand::Off => ("turn_off".into(), None),
        LightCommand::Toggle => ("toggle".into(), None),
    };

    Ok(result)
}

fn color_temp_percent_to_mired(
    value: u64,
    min_mireds: u16,
    max_mireds: u16,
) -> Result<u16, ServiceError> {
    if max_mireds <= min_mireds {
        return Err(ServiceError::BadRequest(format!(
            "Invalid min_mireds or max_mireds value! min_mireds={}, max_mireds={}",
            min_mireds, max_mireds
        )));
    }
    if value <= 100 {
        Ok((value * (max_mireds - min_mireds) as u64 / 100) as u16 + min_mireds)
    } else {
        Err(ServiceError::BadRequest(format!(
            "Invalid color_temperature value {}: Valid: 0..100",
            value
        )))
    }
}

fn parse_rgb(value: &Value) -> Result<Value, ServiceError> {
    let invalid = || {
        ServiceError::BadRequest(format!(
            "Invalid params.rgb_color value {value}: expected [r, g, b] with 0..255"
        ))
    };
    let channels = value.as_array().ok_or_else(invalid)?;
    if channels.len() != 3 {
        return Err(invalid());
    }
    let rgb = channels
        .iter()
        .map(|c| c.as_u64().filter(|c| *c <= 255).ok_or_else(invalid))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!(rgb))
}
