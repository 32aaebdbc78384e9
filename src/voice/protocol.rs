// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Voice pipeline WebSocket message definitions.
//!
//! Binary audio payloads are transferred as base64 encoded strings in the `data` field.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Messages sent to the voice server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Recorded user audio.
    AudioInput {
        #[serde(with = "base64_bytes")]
        data: Bytes,
    },
    /// The user interrupted the assistant response.
    Interrupt,
}

/// Messages received from the voice server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Transcript of the user audio.
    SttResult { text: String },
    /// Streamed token of the assistant response text.
    LlmToken { token: String },
    /// Chunk of the synthesized assistant response.
    AudioChunk {
        #[serde(with = "base64_bytes")]
        data: Bytes,
    },
    ResponseComplete,
    Error { message: String },
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
