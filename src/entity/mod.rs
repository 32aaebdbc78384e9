// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Consumer side entity snapshots, maintained from Home Assistant state change events.

mod domain;
mod store;

pub use domain::Domain;
pub use store::EntityStore;

use crate::client::EntityState;
use serde::Serialize;
use serde_json::{Map, Value};

pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Current state of a single Home Assistant entity, as displayed on a device card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    /// `friendly_name` attribute, or the entity id if not set.
    pub name: String,
    pub domain: Domain,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub online: bool,
}

impl EntitySnapshot {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Shortcut for the common `on` / `off` states.
    pub fn is_on(&self) -> bool {
        self.state == "on"
    }
}

impl From<EntityState> for EntitySnapshot {
    fn from(state: EntityState) -> Self {
        let name = state
            .attributes
            .get("friendly_name")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| state.entity_id.clone());

        Self {
            domain: Domain::from_entity_id(&state.entity_id),
            online: state.state != STATE_UNAVAILABLE,
            name,
            entity_id: state.entity_id,
            state: state.state,
            attributes: state.attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity_state(entity_id: &str, state: &str, attributes: Value) -> EntityState {
        serde_json::from_value(json!({
            "entity_id": entity_id,
            "state": state,
            "attributes": attributes
        }))
        .unwrap()
    }

    #[test]
    fn snapshot_uses_friendly_name() {
        let snapshot: EntitySnapshot = entity_state(
            "light.kitchen",
            "on",
            json!({"friendly_name": "Kitchen", "brightness": 200}),
        )
        .into();

        assert_eq!("Kitchen", snapshot.name);
        assert_eq!(Domain::Light, snapshot.domain);
        assert!(snapshot.online);
        assert!(snapshot.is_on());
        assert_eq!(Some(&json!(200)), snapshot.attribute("brightness"));
    }

    #[test]
    fn snapshot_without_friendly_name_uses_entity_id() {
        let snapshot: EntitySnapshot = entity_state("sensor.outdoor", "3.5", json!({})).into();
        assert_eq!("sensor.outdoor", snapshot.name);
    }

    #[test]
    fn unavailable_entity_is_offline() {
        let snapshot: EntitySnapshot =
            entity_state("media_player.tv", STATE_UNAVAILABLE, json!({})).into();
        assert!(!snapshot.online);
        assert!(!snapshot.is_on());
    }
}
