// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Transport independent Home Assistant connection manager.
//!
//! The manager owns the connection status, the authentication handshake, request id correlation,
//! the reconnection policy and the callback registries. It doesn't perform any I/O: every input
//! returns a list of [`Action`]s which the driver (see [`crate::client::HassConnection`]) executes.

use crate::client::backoff::Backoff;
use crate::client::callbacks::{Callback, CallbackRegistry, Listener, SubscriptionId};
use crate::client::model::{
    AuthMsg, CallServiceMsg, EntityState, RequestMsg, ServerMsg, StateChangedEvent,
    SubscribeEventsMsg, Target,
};
use crate::client::service::ServiceCall;
use crate::client::status::{ConnectionStatus, StatusChange, StatusMachine, Transition};
use crate::configuration::{ENV_HASS_MSG_TRACING, HeartbeatSettings, ReconnectSettings};
use crate::errors::ServiceError;
use crate::util::MessageTracing;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use url::Url;

const EVENT_STATE_CHANGED: &str = "state_changed";

/// Side effect requested by the [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a new WebSocket connection. Any previous socket has already been closed.
    OpenSocket(Url),
    /// Close the current WebSocket connection without reporting the close back.
    CloseSocket,
    /// Send a text frame on the current connection.
    SendText(String),
    /// Call [`ConnectionManager::on_reconnect_timer`] after the given delay.
    ScheduleReconnect(Duration),
    CancelReconnect,
    /// Call [`ConnectionManager::on_heartbeat`] in the given interval.
    StartHeartbeat(Duration),
    StopHeartbeat,
}

pub struct ConnectionManager {
    /// Log prefix
    id: String,
    url: Option<Url>,
    access_token: String,
    status: StatusMachine,
    error: Option<String>,
    /// Last used request id
    ws_id: u32,
    subscribe_events_id: Option<u32>,
    get_states_id: Option<u32>,
    ping_id: Option<u32>,
    /// Request id to message type of requests without a result yet
    pending_requests: HashMap<u32, String>,
    backoff: Backoff,
    reconnect_scheduled: bool,
    socket_active: bool,
    heartbeat_active: bool,
    user_disconnect: bool,
    heartbeat: HeartbeatSettings,
    /// Last time a message was received from the server
    last_hb: Instant,
    status_listeners: CallbackRegistry<StatusChange>,
    state_listeners: CallbackRegistry<StateChangedEvent>,
    msg_tracing: MessageTracing,
}

impl ConnectionManager {
    pub fn new(reconnect: ReconnectSettings, heartbeat: HeartbeatSettings) -> Self {
        Self {
            id: "hass".into(),
            url: None,
            access_token: Default::default(),
            status: StatusMachine::new(),
            error: None,
            ws_id: 0,
            subscribe_events_id: None,
            get_states_id: None,
            ping_id: None,
            pending_requests: Default::default(),
            backoff: Backoff::new(reconnect),
            reconnect_scheduled: false,
            socket_active: false,
            heartbeat_active: false,
            user_disconnect: false,
            heartbeat,
            last_hb: Instant::now(),
            status_listeners: CallbackRegistry::new(Listener::Status),
            state_listeners: CallbackRegistry::new(Listener::StateChange),
            msg_tracing: MessageTracing::from_env(ENV_HASS_MSG_TRACING),
        }
    }

    pub fn set_msg_tracing(&mut self, msg_tracing: MessageTracing) {
        self.msg_tracing = msg_tracing;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.status()
    }

    /// Error reason of the [`ConnectionStatus::Error`] status.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of reconnection attempts since the last successful authentication.
    pub fn reconnect_attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    /// Number of sent requests still waiting for a result.
    pub fn pending_requests(&self) -> usize {
        self.pending_requests.len()
    }

    /// Start a new connection cycle. An existing connection is closed first.
    pub fn connect(&mut self, url: Url, access_token: impl Into<String>) -> Vec<Action> {
        let mut actions = Vec::new();
        self.teardown(&mut actions);
        if !self.status().is_idle() {
            self.transition(Transition::Disconnect);
        }

        self.id = match (url.host_str(), url.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        };
        info!("[{}] Connecting to: {url}", self.id);

        self.user_disconnect = false;
        self.backoff.reset();
        self.url = Some(url.clone());
        self.access_token = access_token.into();
        self.open_socket(url, &mut actions);
        actions
    }

    /// Close the connection and stop all reconnection attempts.
    pub fn disconnect(&mut self) -> Vec<Action> {
        info!("[{}] Disconnecting", self.id);
        let mut actions = Vec::new();
        self.user_disconnect = true;
        self.backoff.reset();
        self.teardown(&mut actions);
        self.transition(Transition::Disconnect);
        actions
    }

    /// The WebSocket connection has been established.
    pub fn on_open(&mut self) -> Vec<Action> {
        debug!("[{}] WebSocket connected, waiting for auth_required", self.id);
        self.last_hb = Instant::now();
        Vec::new()
    }

    /// Handle a text message received from the server.
    pub fn on_text(&mut self, text: &str) -> Vec<Action> {
        if self.msg_tracing.incoming() {
            debug!("[{}] <- {text}", self.id);
        }
        self.last_hb = Instant::now();

        let msg: ServerMsg = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[{}] Ignoring invalid message: {e}", self.id);
                return Vec::new();
            }
        };

        let mut actions = Vec::new();
        match msg {
            ServerMsg::AuthRequired { ha_version } => {
                if self.status() != ConnectionStatus::Connecting {
                    warn!("[{}] Unexpected auth_required message", self.id);
                    return actions;
                }
                info!(
                    "[{}] Connected to Home Assistant {}, authenticating",
                    self.id,
                    ha_version.as_deref().unwrap_or("?")
                );
                self.transition(Transition::AuthRequired);
                let auth = AuthMsg::new(&self.access_token);
                actions.extend(self.text_action(&auth));
            }
            ServerMsg::AuthOk { ha_version } => {
                if self.status() != ConnectionStatus::Authenticating {
                    warn!("[{}] Unexpected auth_ok message", self.id);
                    return actions;
                }
                info!(
                    "[{}] Authenticated with Home Assistant {}",
                    self.id,
                    ha_version.as_deref().unwrap_or("?")
                );
                self.backoff.reset();
                self.transition(Transition::AuthOk);
                if let Some((id, action)) =
                    self.send_request(EVENT_STATE_CHANGED, |id| SubscribeEventsMsg {
                        id,
                        msg_type: "subscribe_events",
                        event_type: EVENT_STATE_CHANGED,
                    })
                {
                    self.subscribe_events_id = Some(id);
                    actions.push(action);
                }
                self.heartbeat_active = true;
                actions.push(Action::StartHeartbeat(self.heartbeat.interval));
            }
            ServerMsg::AuthInvalid { message } => {
                if self.status() != ConnectionStatus::Authenticating {
                    warn!("[{}] Unexpected auth_invalid message", self.id);
                    return actions;
                }
                let message = message.unwrap_or_else(|| "Invalid access token".into());
                error!("[{}] Authentication failed: {message}", self.id);
                self.error = Some(format!("Authentication failed: {message}"));
                self.transition(Transition::AuthInvalid);
                self.teardown(&mut actions);
            }
            ServerMsg::Event { id, event } => {
                if event.event_type != EVENT_STATE_CHANGED {
                    debug!(
                        "[{}] Ignoring {} event of subscription {id:?}",
                        self.id, event.event_type
                    );
                    return actions;
                }
                match serde_json::from_value::<StateChangedEvent>(event.data) {
                    Ok(change) => {
                        self.state_listeners.dispatch(&change);
                    }
                    Err(e) => warn!("[{}] Invalid state_changed event: {e}", self.id),
                }
            }
            ServerMsg::Result {
                id,
                success,
                result,
                error,
            } => {
                let msg_type = self.pending_requests.remove(&id);
                let reason = error
                    .map(|e| {
                        format!(
                            "{}: {}",
                            e.code.unwrap_or_default(),
                            e.message.unwrap_or_default()
                        )
                    })
                    .unwrap_or_default();

                if Some(id) == self.subscribe_events_id {
                    if success {
                        info!("[{}] Subscribed to state_changed events", self.id);
                    } else {
                        error!(
                            "[{}] Failed to subscribe to state_changed events: {reason}",
                            self.id
                        );
                    }
                } else if Some(id) == self.get_states_id {
                    self.get_states_id = None;
                    if !success {
                        warn!("[{}] get_states request failed: {reason}", self.id);
                        return actions;
                    }
                    match result.map(serde_json::from_value::<Vec<EntityState>>) {
                        Some(Ok(states)) => {
                            debug!("[{}] Received {} entity states", self.id, states.len());
                            for state in states {
                                self.state_listeners.dispatch(&state.into());
                            }
                        }
                        Some(Err(e)) => warn!("[{}] Invalid get_states result: {e}", self.id),
                        None => warn!("[{}] Missing get_states result", self.id),
                    }
                } else if !success {
                    warn!(
                        "[{}] Request {id} ({}) failed: {reason}",
                        self.id,
                        msg_type.as_deref().unwrap_or("unknown")
                    );
                }
            }
            ServerMsg::Pong { id } => {
                self.pending_requests.remove(&id);
                if Some(id) == self.ping_id {
                    self.ping_id = None;
                }
            }
            ServerMsg::Unknown => {
                debug!("[{}] Ignoring unsupported message", self.id);
            }
        }

        actions
    }

    /// The WebSocket connection was closed or couldn't be established.
    pub fn on_close(&mut self, reason: &str) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.socket_active {
            debug!("[{}] Ignoring close of inactive connection: {reason}", self.id);
            return actions;
        }
        self.socket_active = false;
        self.connection_lost(reason, &mut actions);
        actions
    }

    /// The reconnection delay has expired.
    pub fn on_reconnect_timer(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.reconnect_scheduled || self.user_disconnect {
            debug!("[{}] Ignoring stale reconnect timer", self.id);
            return actions;
        }
        self.reconnect_scheduled = false;

        match self.url.clone() {
            Some(url) => {
                info!(
                    "[{}] Reconnecting (attempt {})",
                    self.id,
                    self.backoff.attempt()
                );
                self.open_socket(url, &mut actions);
            }
            None => error!("[{}] Cannot reconnect: no server address", self.id),
        }
        actions
    }

    /// Heartbeat interval tick.
    pub fn on_heartbeat(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.heartbeat_active || self.status() != ConnectionStatus::Connected {
            return actions;
        }

        if self.heartbeat.timeout_enabled()
            && now.saturating_duration_since(self.last_hb) > self.heartbeat.timeout
        {
            warn!(
                "[{}] No message received within {:?}, closing connection",
                self.id, self.heartbeat.timeout
            );
            actions.push(Action::CloseSocket);
            self.socket_active = false;
            self.connection_lost("heartbeat timeout", &mut actions);
            return actions;
        }

        if let Some(id) = self.ping_id.take() {
            warn!("[{}] Ping {id} not answered", self.id);
            self.pending_requests.remove(&id);
        }
        if let Some((id, action)) = self.send_request("ping", |id| RequestMsg {
            id,
            msg_type: "ping",
        }) {
            self.ping_id = Some(id);
            actions.push(action);
        }
        actions
    }

    /// Send a Home Assistant request message. The `id` field is assigned by the manager.
    ///
    /// The message is dropped if the connection isn't authenticated.
    pub fn send_json(&mut self, msg: Value) -> Result<Vec<Action>, ServiceError> {
        let Value::Object(mut msg) = msg else {
            return Err(ServiceError::BadRequest("Message must be a JSON object".into()));
        };
        let msg_type = match msg.get("type").and_then(|v| v.as_str()) {
            Some(t) => t.to_string(),
            None => return Err(ServiceError::BadRequest("Missing message type".into())),
        };

        let action = self.send_request(&msg_type, move |id| {
            msg.insert("id".into(), id.into());
            msg
        });
        Ok(action.map(|(_, a)| a).into_iter().collect())
    }

    /// Call a Home Assistant service for an entity.
    pub fn call_service(&mut self, call: ServiceCall) -> Result<Vec<Action>, ServiceError> {
        if call.domain.is_empty() || call.service.is_empty() {
            return Err(ServiceError::BadRequest(
                "Service domain and name are required".into(),
            ));
        }
        if call.entity_id.is_empty() {
            return Err(ServiceError::BadRequest("Missing entity_id".into()));
        }
        if call.service_data.as_ref().is_some_and(|d| !d.is_object()) {
            return Err(ServiceError::BadRequest(
                "service_data must be a JSON object".into(),
            ));
        }

        info!(
            "[{}] Calling service {}.{} for {}",
            self.id, call.domain, call.service, call.entity_id
        );
        let action = self.send_request("call_service", |id| CallServiceMsg {
            id,
            msg_type: "call_service".into(),
            domain: call.domain,
            service: call.service,
            service_data: call.service_data,
            target: Target {
                entity_id: call.entity_id,
            },
        });
        Ok(action.map(|(_, a)| a).into_iter().collect())
    }

    /// Request the state of all entities. The states are dispatched to the state change
    /// subscribers.
    pub fn get_states(&mut self) -> Vec<Action> {
        match self.send_request("get_states", |id| RequestMsg {
            id,
            msg_type: "get_states",
        }) {
            Some((id, action)) => {
                self.get_states_id = Some(id);
                vec![action]
            }
            None => Vec::new(),
        }
    }

    /// Register a status callback. The callback is immediately called with the current status.
    pub fn subscribe_status(&mut self, callback: Callback<StatusChange>) -> SubscriptionId {
        let id = self.status_listeners.subscribe(callback);
        let current = self.status_change();
        self.status_listeners.dispatch_to(id, &current);
        id
    }

    pub fn subscribe_state_changes(
        &mut self,
        callback: Callback<StateChangedEvent>,
    ) -> SubscriptionId {
        self.state_listeners.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match id.kind() {
            Listener::Status => self.status_listeners.unsubscribe(id),
            Listener::StateChange => self.state_listeners.unsubscribe(id),
        }
    }

    fn status_change(&self) -> StatusChange {
        StatusChange {
            status: self.status(),
            error: self.error.clone(),
        }
    }

    fn transition(&mut self, input: Transition) {
        if let Some(status) = self.status.apply(input) {
            if status != ConnectionStatus::Error {
                self.error = None;
            }
            info!("[{}] Connection status: {status}", self.id);
            let change = self.status_change();
            self.status_listeners.dispatch(&change);
        }
    }

    fn open_socket(&mut self, url: Url, actions: &mut Vec<Action>) {
        self.transition(Transition::Connect);
        self.socket_active = true;
        actions.push(Action::OpenSocket(url));
    }

    /// Stop timers and close the socket. Doesn't change the status.
    fn teardown(&mut self, actions: &mut Vec<Action>) {
        if self.reconnect_scheduled {
            self.reconnect_scheduled = false;
            actions.push(Action::CancelReconnect);
        }
        if self.heartbeat_active {
            self.heartbeat_active = false;
            actions.push(Action::StopHeartbeat);
        }
        if self.socket_active {
            self.socket_active = false;
            actions.push(Action::CloseSocket);
        }
        self.clear_requests();
    }

    fn clear_requests(&mut self) {
        self.subscribe_events_id = None;
        self.get_states_id = None;
        self.ping_id = None;
        self.pending_requests.clear();
    }

    fn connection_lost(&mut self, reason: &str, actions: &mut Vec<Action>) {
        if self.heartbeat_active {
            self.heartbeat_active = false;
            actions.push(Action::StopHeartbeat);
        }
        self.clear_requests();

        if self.user_disconnect {
            return;
        }
        if self.status() == ConnectionStatus::Error {
            info!("[{}] Connection closed after error: {reason}", self.id);
            self.transition(Transition::Closed);
            return;
        }

        warn!("[{}] Connection lost: {reason}", self.id);
        self.transition(Transition::Closed);

        match self.backoff.next_delay() {
            Some(delay) => {
                info!(
                    "[{}] Reconnecting in {delay:?} (attempt {})",
                    self.id,
                    self.backoff.attempt()
                );
                self.reconnect_scheduled = true;
                actions.push(Action::ScheduleReconnect(delay));
            }
            None => {
                let message = format!(
                    "Max reconnection attempts ({}) reached",
                    self.backoff.max_attempts()
                );
                error!("[{}] {message}", self.id);
                self.error = Some(message);
                self.transition(Transition::GiveUp);
            }
        }
    }

    /// Assign a new request id, register the request as pending and serialize it.
    ///
    /// Returns `None` if the connection isn't authenticated or serialization failed.
    fn send_request<T, F>(&mut self, msg_type: &str, build: F) -> Option<(u32, Action)>
    where
        T: Serialize,
        F: FnOnce(u32) -> T,
    {
        if self.status() != ConnectionStatus::Connected {
            warn!(
                "[{}] Not connected ({}), dropping {msg_type} request",
                self.id,
                self.status()
            );
            return None;
        }
        self.ws_id += 1;
        let id = self.ws_id;
        let action = self.text_action(&build(id))?;
        self.pending_requests.insert(id, msg_type.to_string());
        Some((id, action))
    }

    fn text_action<T: Serialize>(&self, msg: &T) -> Option<Action> {
        let value = match serde_json::to_value(msg) {
            Ok(v) => v,
            Err(e) => {
                error!("[{}] Error serializing message: {e}", self.id);
                return None;
            }
        };
        if self.msg_tracing.outgoing() {
            match value.as_object() {
                Some(obj) if obj.contains_key("access_token") => {
                    let mut hidden = Map::new();
                    hidden.insert("type".into(), obj.get("type").cloned().unwrap_or_default());
                    hidden.insert("access_token".into(), "***".into());
                    debug!("[{}] -> {}", self.id, Value::Object(hidden));
                }
                _ => debug!("[{}] -> {value}", self.id),
            }
        }
        Some(Action::SendText(value.to_string()))
    }
}
