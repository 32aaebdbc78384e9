// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Home Assistant service call builders.
//! Translates device card commands into HA `call_service` requests.
//!
//! See <https://developers.home-assistant.io/docs/api/websocket/#calling-a-service> for further
//! information.

use crate::entity::Domain;
use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod climate;
mod cover;
mod light;
mod media_player;
mod scene;
mod switch;

/// Device command issued by a device card, e.g. `{"entity_id": "light.kitchen", "cmd_id": "on",
/// "params": {"brightness": 128}}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceCommand {
    pub entity_id: String,
    pub cmd_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl DeviceCommand {
    pub fn new(entity_id: impl Into<String>, cmd_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            cmd_id: cmd_id.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = match params {
            Value::Object(map) => Some(map),
            _ => None,
        };
        self
    }
}

/// A Home Assistant service call for a single target entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub entity_id: String,
    pub service_data: Option<Value>,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        entity_id: impl Into<String>,
        service_data: Option<Value>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            entity_id: entity_id.into(),
            service_data,
        }
    }
}

impl TryFrom<&DeviceCommand> for ServiceCall {
    type Error = ServiceError;

    /// Map a device command name and parameters to the HA service name and `service_data`
    /// payload. The conversion logic is delegated to domain specific functions.
    fn try_from(cmd: &DeviceCommand) -> Result<Self, Self::Error> {
        let domain = match cmd.entity_id.split_once('.') {
            Some((l, r)) if !l.is_empty() && !r.is_empty() => l.to_string(),
            _ => return Err(ServiceError::BadRequest("Invalid entity_id format".into())),
        };

        let (service, service_data) = match Domain::from_entity_id(&cmd.entity_id) {
            Domain::Light => light::handle_light(cmd),
            Domain::Climate => climate::handle_climate(cmd),
            Domain::Cover => cover::handle_cover(cmd),
            Domain::MediaPlayer => media_player::handle_media_player(cmd),
            Domain::Scene | Domain::Script => scene::handle_scene(cmd),
            Domain::Switch | Domain::Other => switch::handle_switch(cmd),
            d @ (Domain::Sensor | Domain::BinarySensor) => Err(ServiceError::BadRequest(format!(
                "{d} doesn't support sending commands to! Ignoring call"
            ))),
        }?;

        Ok(ServiceCall {
            domain,
            service,
            entity_id: cmd.entity_id.clone(),
            service_data,
        })
    }
}

pub fn cmd_from_str<T: std::str::FromStr + strum::VariantNames>(
    cmd: &str,
) -> Result<T, ServiceError> {
    T::from_str(cmd).map_err(|_| {
        ServiceError::BadRequest(format!(
            "Invalid cmd_id: {cmd}. Valid commands: {}",
            T::VARIANTS.to_vec().join(",")
        ))
    })
}

/// Get a serde_json::Map reference of the params attribute of the provided command.
///
/// A BadRequest error is returned if `params` is not set.
fn get_required_params(cmd: &DeviceCommand) -> Result<&Map<String, Value>, ServiceError> {
    if let Some(params) = cmd.params.as_ref() {
        Ok(params)
    } else {
        Err(ServiceError::BadRequest("Missing params object".into()))
    }
}

/// Get an optional unsigned integer parameter within the given inclusive range.
///
/// A BadRequest error is returned if the parameter is present but not a valid value.
fn get_u64_in_range(
    params: Option<&Map<String, Value>>,
    key: &str,
    min: u64,
    max: u64,
) -> Result<Option<u64>, ServiceError> {
    match params.and_then(|p| p.get(key)) {
        None => Ok(None),
        Some(value) => match value.as_u64() {
            Some(v) if (min..=max).contains(&v) => Ok(Some(v)),
            _ => Err(ServiceError::BadRequest(format!(
                "Invalid params.{key} value {value}: Valid: {min}..{max}"
            ))),
        },
    }
}
