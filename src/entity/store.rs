// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

use crate::client::StateChangedEvent;
use crate::entity::{Domain, EntitySnapshot};
use log::debug;
use std::collections::HashMap;

/// Entity snapshots keyed by entity id.
///
/// The store is owned by the consumer and fed with the events of a state change subscription.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: HashMap<String, EntitySnapshot>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a state change: the entity is inserted or updated with the new state, or removed if
    /// there's no new state.
    ///
    /// Returns the updated snapshot, `None` if the entity was removed.
    pub fn apply(&mut self, event: &StateChangedEvent) -> Option<&EntitySnapshot> {
        match event.new_state.as_ref() {
            Some(state) => {
                let snapshot = EntitySnapshot::from(state.clone());
                let entity_id = event.entity_id.clone();
                self.entities.insert(entity_id.clone(), snapshot);
                self.entities.get(&entity_id)
            }
            None => {
                if self.entities.remove(&event.entity_id).is_some() {
                    debug!("Removed entity {}", event.entity_id);
                }
                None
            }
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntitySnapshot> {
        self.entities.get(entity_id)
    }

    /// All entities of a domain, sorted by entity id.
    pub fn by_domain(&self, domain: Domain) -> Vec<&EntitySnapshot> {
        let mut entities: Vec<_> = self
            .entities
            .values()
            .filter(|e| e.domain == domain)
            .collect();
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entities
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(entity_id: &str, new_state: Option<&str>) -> StateChangedEvent {
        serde_json::from_value(json!({
            "entity_id": entity_id,
            "old_state": null,
            "new_state": new_state.map(|state| json!({"entity_id": entity_id, "state": state}))
        }))
        .unwrap()
    }

    #[test]
    fn apply_upserts_entities() {
        let mut store = EntityStore::new();
        store.apply(&change("light.kitchen", Some("off")));
        let snapshot = store.apply(&change("light.kitchen", Some("on"))).cloned();

        assert_eq!(1, store.len());
        assert_eq!(Some("on"), snapshot.as_ref().map(|s| s.state.as_str()));
        assert_eq!(snapshot.as_ref(), store.get("light.kitchen"));
    }

    #[test]
    fn apply_without_new_state_removes_entity() {
        let mut store = EntityStore::new();
        store.apply(&change("switch.fan", Some("on")));

        assert!(store.apply(&change("switch.fan", None)).is_none());
        assert!(store.get("switch.fan").is_none());
        assert!(store.is_empty());
        // removing an unknown entity is a no-op
        assert!(store.apply(&change("switch.unknown", None)).is_none());
    }

    #[test]
    fn by_domain_returns_sorted_entities() {
        let mut store = EntityStore::new();
        store.apply(&change("light.office", Some("on")));
        store.apply(&change("switch.fan", Some("off")));
        store.apply(&change("light.bedroom", Some("off")));

        let lights: Vec<_> = store
            .by_domain(Domain::Light)
            .into_iter()
            .map(|e| e.entity_id.as_str())
            .collect();
        assert_eq!(vec!["light.bedroom", "light.office"], lights);
        assert!(store.by_domain(Domain::Climate).is_empty());
    }
}
