// Copyright (c) 2023 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

use std::env;
use std::ffi::OsStr;
use std::str::FromStr;

/// WebSocket message tracing direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MessageTracing {
    #[default]
    None,
    In,
    Out,
    All,
}

impl MessageTracing {
    /// Retrieves the tracing mode from the given environment variable.
    ///
    /// Returns [`MessageTracing::None`] if the variable is not defined or contains an invalid value.
    pub fn from_env<K: AsRef<OsStr>>(key: K) -> Self {
        env::var(key)
            .ok()
            .and_then(|v| Self::from_str(v.trim()).ok())
            .unwrap_or_default()
    }

    pub fn incoming(&self) -> bool {
        matches!(self, Self::In | Self::All)
    }

    pub fn outgoing(&self) -> bool {
        matches!(self, Self::Out | Self::All)
    }
}
