//! Socket.IO v5 packets carried inside Engine.IO `message` packets.
//!
//! FORMAT
//! ======
//! `<type>[<namespace>,][<ack id>][<json>]` where the namespace is omitted for
//! `/`. Events carry a JSON array whose first element is the event name.

use std::fmt::Write;

use serde_json::Value;

use crate::{CodecError, DEFAULT_NAMESPACE};

/// Socket.IO packet type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl PacketKind {
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::ConnectError => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    fn from_char(value: char) -> Result<Self, CodecError> {
        match value {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError),
            '5' => Ok(Self::BinaryEvent),
            '6' => Ok(Self::BinaryAck),
            found => Err(CodecError::UnknownType { layer: "socket.io", found }),
        }
    }
}

/// A decoded Socket.IO packet.
#[derive(Clone, Debug, PartialEq)]
pub struct SocketPacket {
    pub kind: PacketKind,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    /// Namespace connect request sent by the client after the Engine.IO open.
    #[must_use]
    pub fn connect(namespace: &str) -> Self {
        Self { kind: PacketKind::Connect, namespace: namespace.to_owned(), ack_id: None, data: None }
    }

    #[must_use]
    pub fn disconnect(namespace: &str) -> Self {
        Self { kind: PacketKind::Disconnect, namespace: namespace.to_owned(), ack_id: None, data: None }
    }

    /// Event packet: `[name, payload]`.
    #[must_use]
    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        Self {
            kind: PacketKind::Event,
            namespace: namespace.to_owned(),
            ack_id: None,
            data: Some(Value::Array(vec![Value::String(name.to_owned()), payload])),
        }
    }

    /// Event name for `Event` packets.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        if self.kind != PacketKind::Event {
            return None;
        }
        self.data.as_ref()?.as_array()?.first()?.as_str()
    }

    /// Event arguments following the name. Empty for non-event packets.
    #[must_use]
    pub fn event_args(&self) -> &[Value] {
        match (&self.kind, self.data.as_ref().and_then(Value::as_array)) {
            (PacketKind::Event, Some(items)) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }

    /// Human readable reason carried by a `ConnectError` packet.
    #[must_use]
    pub fn connect_error_message(&self) -> Option<String> {
        if self.kind != PacketKind::ConnectError {
            return None;
        }
        match self.data.as_ref() {
            Some(Value::String(message)) => Some(message.clone()),
            Some(value) => Some(
                value
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| value.to_string(), ToOwned::to_owned),
            ),
            None => Some("connection refused".to_owned()),
        }
    }

    /// Encode into the body of an Engine.IO `message` packet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Payload`] if the data cannot be serialized.
    pub fn encode(&self) -> Result<String, CodecError> {
        let mut out = String::new();
        out.push(self.kind.as_char());
        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.ack_id {
            let _ = write!(out, "{id}");
        }
        if let Some(data) = &self.data {
            out.push_str(&serde_json::to_string(data)?);
        }
        Ok(out)
    }

    /// Decode the body of an Engine.IO `message` packet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Empty`], [`CodecError::UnknownType`],
    /// [`CodecError::UnsupportedBinary`] for binary packet types,
    /// [`CodecError::InvalidAckId`] for an overflowing ack id, or
    /// [`CodecError::Payload`] for malformed JSON.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut chars = text.chars();
        let kind = PacketKind::from_char(chars.next().ok_or(CodecError::Empty)?)?;
        if matches!(kind, PacketKind::BinaryEvent | PacketKind::BinaryAck) {
            return Err(CodecError::UnsupportedBinary);
        }

        let mut rest = chars.as_str();
        let mut namespace = DEFAULT_NAMESPACE.to_owned();
        if rest.starts_with('/') {
            if let Some(idx) = rest.find(',') {
                namespace = rest[..idx].to_owned();
                rest = &rest[idx + 1..];
            } else {
                namespace = rest.to_owned();
                rest = "";
            }
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let ack_id = if digits == 0 {
            None
        } else {
            let raw = &rest[..digits];
            Some(raw.parse::<u64>().map_err(|_| CodecError::InvalidAckId(raw.to_owned()))?)
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() { None } else { Some(serde_json::from_str(rest)?) };

        Ok(Self { kind, namespace, ack_id, data })
    }
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
