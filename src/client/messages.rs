// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Actix Actor message definitions for HassConnection

use crate::client::callbacks::{Callback, SubscriptionId};
use crate::client::model::StateChangedEvent;
use crate::client::service::{DeviceCommand, ServiceCall};
use crate::client::status::StatusChange;
use crate::errors::ServiceError;
use actix::prelude::Message;
use derive_more::Constructor;
use serde_json::Value;
use url::Url;

/// Connect to Home Assistant. An existing connection is closed first.
#[derive(Debug, Message, Constructor)]
#[rtype(result = "()")]
pub struct Connect {
    pub url: Url,
    pub token: String,
}

/// Close the connection and stop reconnecting.
#[derive(Debug, Default, Message)]
#[rtype(result = "()")]
pub struct Disconnect;

/// Register a connection status callback.
///
/// The callback is immediately called with the current status, and for every status change after.
#[derive(Message)]
#[rtype(result = "SubscriptionId")]
pub struct SubscribeStatus(pub Callback<StatusChange>);

/// Register an entity state change callback.
#[derive(Message)]
#[rtype(result = "SubscriptionId")]
pub struct SubscribeStateChanges(pub Callback<StateChangedEvent>);

/// Remove a callback. Returns `false` if the subscription doesn't exist.
#[derive(Debug, Message)]
#[rtype(result = "bool")]
pub struct Unsubscribe(pub SubscriptionId);

/// Call a service in Home Assistant.
///
/// The request is dropped if there's no authenticated connection.
#[derive(Debug, Message)]
#[rtype(result = "Result<(), ServiceError>")]
pub struct CallService {
    pub call: ServiceCall,
}

impl TryFrom<&DeviceCommand> for CallService {
    type Error = ServiceError;

    fn try_from(command: &DeviceCommand) -> Result<Self, Self::Error> {
        Ok(Self {
            call: ServiceCall::try_from(command)?,
        })
    }
}

/// Send a raw Home Assistant WebSocket request. The message id is set by the connection.
#[derive(Debug, Message)]
#[rtype(result = "Result<(), ServiceError>")]
pub struct SendJson(pub Value);

/// Fetch all states from Home Assistant. The states are dispatched to the state change
/// subscribers.
#[derive(Debug, Default, Message)]
#[rtype(result = "()")]
pub struct GetStates;

/// Get the current connection status.
#[derive(Debug, Default, Message)]
#[rtype(result = "StatusChange")]
pub struct GetStatus;
