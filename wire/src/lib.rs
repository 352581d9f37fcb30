//! Realtime wire codec shared by the portal client, its CLI and tests.
//!
//! The backend speaks Socket.IO v5 on top of Engine.IO v4. Over the websocket
//! transport every text frame is one Engine.IO packet; Socket.IO packets ride
//! inside Engine.IO `message` packets. This crate owns both layers so the
//! client never builds protocol strings by hand.
//!
//! Binary attachments (Socket.IO packet types 5 and 6) are not supported and
//! decode to [`CodecError::UnsupportedBinary`].

pub mod engine;
pub mod socket;

pub use engine::{EnginePacket, Handshake};
pub use socket::{PacketKind, SocketPacket};

/// Default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO protocol revision sent in the connect query.
pub const ENGINE_IO_VERSION: u8 = 4;

/// Error returned when decoding either protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame carried no packet type character.
    #[error("empty packet")]
    Empty,
    /// The leading packet type is not known to the protocol layer.
    #[error("unknown {layer} packet type `{found}`")]
    UnknownType { layer: &'static str, found: char },
    /// Binary packets and attachments are not handled by this client.
    #[error("binary packets are not supported")]
    UnsupportedBinary,
    /// Ack identifier digits did not fit in a `u64`.
    #[error("invalid ack id `{0}`")]
    InvalidAckId(String),
    /// The JSON payload could not be parsed.
    #[error("invalid packet payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Build the Engine.IO websocket endpoint for a realtime origin.
///
/// `origin` is a `ws://` or `wss://` URL, optionally with a path; a trailing
/// slash is ignored. The default `/socket.io/` mount point is appended.
#[must_use]
pub fn endpoint_url(origin: &str) -> String {
    format!(
        "{}/socket.io/?EIO={ENGINE_IO_VERSION}&transport=websocket",
        origin.trim_end_matches('/')
    )
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
