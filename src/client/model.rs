// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! HA WebSocket data structure definitions for JSON serialization & deserialization.
//!
//! See <https://developers.home-assistant.io/docs/api/websocket> for the message definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub(crate) struct AuthMsg<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub access_token: &'a str,
}

impl<'a> AuthMsg<'a> {
    pub fn new(access_token: &'a str) -> Self {
        Self {
            msg_type: "auth",
            access_token,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubscribeEventsMsg {
    pub id: u32,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub event_type: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CallServiceMsg {
    pub id: u32,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub domain: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_data: Option<Value>,
    pub target: Target,
}

#[derive(Debug, Serialize)]
pub(crate) struct Target {
    pub entity_id: String,
}

/// Request message consisting only of an id and a type, e.g. `ping` or `get_states`.
#[derive(Debug, Serialize)]
pub(crate) struct RequestMsg {
    pub id: u32,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

/// Messages received from the Home Assistant server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ServerMsg {
    AuthRequired {
        ha_version: Option<String>,
    },
    AuthOk {
        ha_version: Option<String>,
    },
    AuthInvalid {
        message: Option<String>,
    },
    Event {
        id: Option<u32>,
        event: Event,
    },
    Result {
        id: u32,
        #[serde(default)]
        success: bool,
        result: Option<Value>,
        error: Option<ResultError>,
    },
    Pong {
        id: u32,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Event {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// State of a Home Assistant entity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// A `state_changed` event. `new_state` is `None` if the entity was removed, `old_state` is `None`
/// if the entity was added or if the state originates from a `get_states` snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StateChangedEvent {
    pub entity_id: String,
    #[serde(default)]
    pub old_state: Option<EntityState>,
    #[serde(default)]
    pub new_state: Option<EntityState>,
}

impl From<EntityState> for StateChangedEvent {
    fn from(state: EntityState) -> Self {
        Self {
            entity_id: state.entity_id.clone(),
            old_state: None,
            new_state: Some(state),
        }
    }
}
