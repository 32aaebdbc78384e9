// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Climate entity specific HA service call logic.

use crate::client::service::{DeviceCommand, cmd_from_str, get_required_params};
use crate::errors::ServiceError;
use serde_json::{Map, Value, json};

/// Accepted target temperature range in °C or °F. The device enforces its own limits.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = -50.0..=150.0;

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ClimateCommand {
    On,
    Off,
    HvacMode,
    TargetTemperature,
}

pub(crate) fn handle_climate(msg: &DeviceCommand) -> Result<(String, Option<Value>), ServiceError> {
    let cmd: ClimateCommand = cmd_from_str(&msg.cmd_id)?;

    let result = match cmd {
        ClimateCommand::On => ("turn_on".into(), None),
        ClimateCommand::Off => ("turn_off".into(), None),
        ClimateCommand::HvacMode => {
            let mut data = Map::new();
            let params = get_required_params(msg)?;
            let mode = params
                .get("hvac_mode")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            match mode.to_lowercase().as_str() {
                m @ ("off" | "heat" | "cool" | "heat_cool" | "auto" | "dry" | "fan_only") => {
                    data.insert("hvac_mode".into(), m.into());
                }
                "fan" => {
                    data.insert("hvac_mode".into(), "fan_only".into());
                }
                _ => {
                    return Err(ServiceError::BadRequest(format!(
                        "Invalid or missing params.hvac_mode attribute: {}",
                        mode
                    )));
                }
            }
            ("set_hvac_mode".into(), Some(data.into()))
        }
        ClimateCommand::TargetTemperature => {
            let params = get_required_params(msg)?;
            match params.get("temperature").and_then(|v| v.as_f64()) {
                Some(temp) if TEMPERATURE_RANGE.contains(&temp) => (
                    "set_temperature".into(),
                    Some(json!({ "temperature": temp })),
                ),
                _ => {
                    return Err(ServiceError::BadRequest(
                        "Invalid or missing params.temperature attribute".into(),
                    ));
                }
            }
        }
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use crate::client::service::DeviceCommand;
    use crate::client::service::climate::handle_climate;
    use crate::errors::ServiceError;
    use rstest::rstest;
    use serde_json::{Value, json};

    #[test]
    fn turn_on() {
        let msg_data = json!({
            "cmd_id": "on",
            "entity_id": "climate.bathroom_floor_heating_mode"
        });
        let (cmd, data) = map_msg_data(msg_data);
        assert_eq!("turn_on", cmd);
        assert!(data.is_none(), "no cmd data allowed");
    }

    #[test]
    fn turn_off() {
        let msg_data = json!({
            "cmd_id": "off",
            "entity_id": "climate.bathroom_floor_heating_mode"
        });
        let (cmd, data) = map_msg_data(msg_data);
        assert_eq!("turn_off", cmd);
        assert!(data.is_none(), "no cmd data allowed");
    }

    #[rstest]
    #[case("OFF", "off")]
    #[case("heat", "heat")]
    #[case("COOL", "cool")]
    #[case("HEAT_COOL", "heat_cool")]
    #[case("auto", "auto")]
    #[case("FAN", "fan_only")]
    #[case("fan_only", "fan_only")]
    fn hvac_mode(#[case] mode: &str, #[case] ha_mode: &str) {
        let msg_data = json!({
            "cmd_id": "hvac_mode",
            "entity_id": "climate.bathroom_floor_heating_mode",
            "params": {
                "hvac_mode": mode
            }
        });
        let (cmd, data) = map_msg_data(msg_data);
        assert_eq!("set_hvac_mode", cmd);
        assert!(data.is_some(), "cmd data expected");
        let data = data.unwrap();
        assert_eq!(Some(&json!(ha_mode)), data.get("hvac_mode"));
    }

    #[test]
    fn set_temperature() {
        let msg_data = json!({
            "cmd_id": "target_temperature",
            "entity_id": "climate.bathroom_floor_heating_mode",
            "params": {
              "temperature": 22.5
            }
        });
        let (cmd, data) = map_msg_data(msg_data);
        assert_eq!("set_temperature", cmd);
        assert!(data.is_some(), "cmd data expected");
        let data = data.unwrap();
        assert_eq!(Some(&json!(22.5)), data.get("temperature"));
    }

    #[rstest]
    #[case("hvac_mode", json!({ "hvac_mode": "warp" }))]
    #[case("hvac_mode", json!({}))]
    #[case("target_temperature", json!({ "temperature": "warm" }))]
    #[case("target_temperature", json!({ "temperature": 1000 }))]
    #[case("target_temperature", Value::Null)]
    fn invalid_params_return_bad_request(#[case] cmd_id: &str, #[case] params: Value) {
        let cmd = DeviceCommand::new("climate.office", cmd_id).with_params(params);
        let result = handle_climate(&cmd);
        assert!(
            matches!(result, Err(ServiceError::BadRequest(_))),
            "Invalid value must return BadRequest, but got: {:?}",
            result
        );
    }

    fn map_msg_data(msg_data: Value) -> (String, Option<Value>) {
        let cmd: DeviceCommand = serde_json::from_value(msg_data).expect("invalid test data");
        let result = handle_climate(&cmd);
        assert!(
            result.is_ok(),
            "Expected successful cmd mapping but got: {:?}",
            result.unwrap_err()
        );
        result.unwrap()
    }
}
