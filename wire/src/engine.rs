//! Engine.IO v4 packets.
//!
//! FORMAT
//! ======
//! One ASCII digit for the packet type followed by the payload:
//! `0` open (JSON handshake), `1` close, `2` ping, `3` pong, `4` message,
//! `5` upgrade, `6` noop. Ping and pong may carry an optional probe string.

use serde::{Deserialize, Serialize};

use crate::CodecError;

/// Handshake sent by the server in the `open` packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default = "default_max_payload")]
    pub max_payload: u64,
}

fn default_max_payload() -> u64 {
    1_000_000
}

impl Handshake {
    /// Longest silence tolerated before the connection is considered dead.
    #[must_use]
    pub fn liveness_window_ms(&self) -> u64 {
        self.ping_interval.saturating_add(self.ping_timeout)
    }
}

/// A single Engine.IO packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(Option<String>),
    Pong(Option<String>),
    /// Carries an encoded Socket.IO packet.
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// Encode into the text frame sent over the websocket.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Payload`] if the open handshake cannot be
    /// serialized.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(match self {
            Self::Open(handshake) => format!("0{}", serde_json::to_string(handshake)?),
            Self::Close => "1".to_owned(),
            Self::Ping(probe) => format!("2{}", probe.as_deref().unwrap_or_default()),
            Self::Pong(probe) => format!("3{}", probe.as_deref().unwrap_or_default()),
            Self::Message(body) => format!("4{body}"),
            Self::Upgrade => "5".to_owned(),
            Self::Noop => "6".to_owned(),
        })
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Empty`] for an empty frame,
    /// [`CodecError::UnsupportedBinary`] for base64 `b` packets,
    /// [`CodecError::UnknownType`] for other unknown types, and
    /// [`CodecError::Payload`] for a malformed handshake.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(CodecError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(probe(rest))),
            '3' => Ok(Self::Pong(probe(rest))),
            '4' => Ok(Self::Message(rest.to_owned())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            'b' => Err(CodecError::UnsupportedBinary),
            found => Err(CodecError::UnknownType { layer: "engine.io", found }),
        }
    }
}

fn probe(rest: &str) -> Option<String> {
    (!rest.is_empty()).then(|| rest.to_owned())
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
