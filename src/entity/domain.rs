// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

use serde::Serialize;
use std::str::FromStr;

/// Home Assistant entity domain, the part of the entity id before the first dot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::EnumString,
    strum::Display,
    strum::AsRefStr,
    strum::VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Domain {
    Light,
    Switch,
    Climate,
    MediaPlayer,
    Cover,
    Scene,
    Script,
    Sensor,
    BinarySensor,
    /// Any domain without dedicated support.
    Other,
}

impl Domain {
    pub fn from_entity_id(entity_id: &str) -> Self {
        entity_id
            .split_once('.')
            .and_then(|(domain, _)| Domain::from_str(domain).ok())
            .unwrap_or(Domain::Other)
    }
}
