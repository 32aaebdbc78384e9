// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Scene and script activation.

use crate::client::service::{DeviceCommand, cmd_from_str};
use crate::errors::ServiceError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SceneCommand {
    Activate,
    On,
}

/// Scenes are activated with `scene.turn_on`, scripts are called by their own service name
/// (`script.good_night` -> service `good_night` in the `script` domain).
pub(crate) fn handle_scene(msg: &DeviceCommand) -> Result<(String, Option<Value>), ServiceError> {
    let cmd: SceneCommand = cmd_from_str(&msg.cmd_id)?;

    let entity: Vec<&str> = msg.entity_id.split('.').collect();

    let service_call: &str = match entity[..] {
        ["script", name, ..] => name,
        _ => "turn_on",
    };

    let result = match cmd {
        SceneCommand::Activate | SceneCommand::On => (service_call.into(), None),
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::handle_scene;
    use crate::client::service::DeviceCommand;
    use rstest::rstest;

    #[rstest]
    #[case("script.foobar", "foobar")]
    #[case("script.turn_on_lights", "turn_on_lights")]
    #[case("script.my.complex.script.name", "my")]
    #[case("scene.morning", "turn_on")]
    #[case("scene.party_mode", "turn_on")]
    fn activation_service(#[case] entity_id: &str, #[case] expected_service: &str) {
        let result = handle_scene(&DeviceCommand::new(entity_id, "activate"));

        assert!(
            result.is_ok(),
            "Valid entity must return Ok, but got: {:?}",
            result.unwrap_err()
        );
        let (service, param) = result.unwrap();
        assert_eq!(expected_service, &service);
        assert!(param.is_none(), "Activation has no parameters");
    }

    #[test]
    fn on_is_an_alias_for_activate() {
        let (service, _) = handle_scene(&DeviceCommand::new("scene.evening", "on")).unwrap();
        assert_eq!("turn_on", service);
    }

    #[test]
    fn invalid_command_returns_error() {
        assert!(handle_scene(&DeviceCommand::new("scene.evening", "off")).is_err());
    }
}
