// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Cover entity specific HA service call logic.

use crate::client::service::{DeviceCommand, cmd_from_str, get_required_params, get_u64_in_range};
use crate::errors::ServiceError;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, strum::EnumString, strum::VariantNames)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum CoverCommand {
    Open,
    Close,
    Stop,
    Position,
}

pub(crate) fn handle_cover(msg: &DeviceCommand) -> Result<(String, Option<Value>), ServiceError> {
    let cmd: CoverCommand = cmd_from_str(&msg.cmd_id)?;

    let result = match cmd {
        CoverCommand::Open => ("open_cover".into(), None),
        CoverCommand::Close => ("close_cover".into(), None),
        CoverCommand::Stop => ("stop_cover".into(), None),
        CoverCommand::Position => {
            let params = get_required_params(msg)?;
            let Some(pos) = get_u64_in_range(Some(params), "position", 0, 100)? else {
                return Err(ServiceError::BadRequest(
                    "Missing params.position attribute".into(),
                ));
            };
            ("set_cover_position".into(), Some(json!({ "position": pos })))
        }
    };

    Ok(result)
}
