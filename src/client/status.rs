// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Connection status and the lifecycle state machine validating its transitions.

use log::warn;
use rust_fsm::*;
use serde::Serialize;

state_machine! {
    derive(Debug)
    Lifecycle(Disconnected)

    Disconnected => {
        Connect => Connecting,
        Disconnect => Disconnected,
        GiveUp => Error,
    },
    Connecting => {
        AuthRequired => Authenticating,
        Closed => Disconnected,
        Disconnect => Disconnected,
    },
    Authenticating => {
        AuthOk => Connected,
        AuthInvalid => Error,
        Closed => Disconnected,
        Disconnect => Disconnected,
    },
    Connected => {
        Closed => Disconnected,
        Disconnect => Disconnected,
    },
    Error => {
        Connect => Connecting,
        Closed => Error,
        Disconnect => Disconnected,
    },
}

/// Connection lifecycle events changing the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Connect,
    AuthRequired,
    AuthOk,
    AuthInvalid,
    Closed,
    Disconnect,
    GiveUp,
}

impl From<Transition> for LifecycleInput {
    fn from(value: Transition) -> Self {
        match value {
            Transition::Connect => LifecycleInput::Connect,
            Transition::AuthRequired => LifecycleInput::AuthRequired,
            Transition::AuthOk => LifecycleInput::AuthOk,
            Transition::AuthInvalid => LifecycleInput::AuthInvalid,
            Transition::Closed => LifecycleInput::Closed,
            Transition::Disconnect => LifecycleInput::Disconnect,
            Transition::GiveUp => LifecycleInput::GiveUp,
        }
    }
}

/// Home Assistant connection status.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Error,
}

impl ConnectionStatus {
    /// A new connection cycle may only be started from these states without a prior teardown.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

/// Status notification sent to all status subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub status: ConnectionStatus,
    /// Error reason if `status` is [`ConnectionStatus::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Single writer of the connection status.
pub(crate) struct StatusMachine {
    machine: StateMachine<Lifecycle>,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self {
            machine: StateMachine::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.machine.state() {
            LifecycleState::Disconnected => ConnectionStatus::Disconnected,
            LifecycleState::Connecting => ConnectionStatus::Connecting,
            LifecycleState::Authenticating => ConnectionStatus::Authenticating,
            LifecycleState::Connected => ConnectionStatus::Connected,
            LifecycleState::Error => ConnectionStatus::Error,
        }
    }

    /// Apply a transition.
    ///
    /// Returns the new status if the status changed, `None` for self-transitions and impossible
    /// transitions. Impossible transitions leave the status untouched.
    pub fn apply(&mut self, input: Transition) -> Option<ConnectionStatus> {
        let old = self.status();
        if self.machine.consume(&input.into()).is_err() {
            warn!("Ignoring invalid connection transition {input:?} in state {old}");
            return None;
        }
        let new = self.status();
        (new != old).then_some(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn successful_handshake_walks_through_all_states() {
        let mut machine = StatusMachine::new();
        assert_eq!(ConnectionStatus::Disconnected, machine.status());
        assert_eq!(
            Some(ConnectionStatus::Connecting),
            machine.apply(Transition::Connect)
        );
        assert_eq!(
            Some(ConnectionStatus::Authenticating),
            machine.apply(Transition::AuthRequired)
        );
        assert_eq!(
            Some(ConnectionStatus::Connected),
            machine.apply(Transition::AuthOk)
        );
    }

    #[test]
    fn auth_invalid_is_terminal_error() {
        let mut machine = StatusMachine::new();
        machine.apply(Transition::Connect);
        machine.apply(Transition::AuthRequired);
        assert_eq!(
            Some(ConnectionStatus::Error),
            machine.apply(Transition::AuthInvalid)
        );
        // the following socket close keeps the error state
        assert_eq!(None, machine.apply(Transition::Closed));
        assert_eq!(ConnectionStatus::Error, machine.status());
    }

    #[test]
    fn connect_is_rejected_while_connected() {
        let mut machine = StatusMachine::new();
        machine.apply(Transition::Connect);
        machine.apply(Transition::AuthRequired);
        machine.apply(Transition::AuthOk);

        assert_eq!(None, machine.apply(Transition::Connect));
        assert_eq!(ConnectionStatus::Connected, machine.status());
    }

    #[rstest]
    #[case(&[])]
    #[case(&[Transition::Connect])]
    #[case(&[Transition::Connect, Transition::AuthRequired])]
    #[case(&[Transition::Connect, Transition::AuthRequired, Transition::AuthOk])]
    #[case(&[Transition::Connect, Transition::AuthRequired, Transition::AuthInvalid])]
    fn disconnect_from_any_state_ends_disconnected(#[case] inputs: &[Transition]) {
        let mut machine = StatusMachine::new();
        for input in inputs {
            machine.apply(*input);
        }
        machine.apply(Transition::Disconnect);
        assert_eq!(ConnectionStatus::Disconnected, machine.status());
    }

    #[test]
    fn status_displays_lowercase() {
        assert_eq!("authenticating", ConnectionStatus::Authenticating.to_string());
        assert_eq!(
            "\"connected\"",
            serde_json::to_string(&ConnectionStatus::Connected).unwrap()
        );
    }
}
