// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Generic on / off / toggle service call logic for switches and any other domain.

use crate::client::service::{DeviceCommand, cmd_from_str};
use crate::errors::ServiceError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum SwitchCommand {
    On,
    Off,
    Toggle,
}

pub(crate) fn handle_switch(msg: &DeviceCommand) -> Result<(String, Option<Value>), ServiceError> {
    let cmd: SwitchCommand = cmd_from_str(&msg.cmd_id)?;

    let result = match cmd {
        SwitchCommand::On => ("turn_on".into(), None),
        SwitchCommand::Off => ("turn_off".into(), None),
        SwitchCommand::Toggle => ("toggle".into(), None),
    };

    Ok(result)
}
