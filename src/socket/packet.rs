//! Wire codec for the two protocol layers carried over a single text stream.
//!
//! Every frame starts with an outer-layer type digit. Frames of type
//! [`EnginePacketType::Message`] carry a second digit selecting the
//! inner-layer type, followed by the packet payload.

use serde_json::Value;
use thiserror::Error;

/// Namespace that is never encoded as a payload prefix.
pub const DEFAULT_NAMESPACE: &str = "/";
/// Probe frame sent immediately after the transport comes up.
pub const PROBE_FRAME: &str = "2probe";

/// Outer-layer packet type, encoded as the first byte of every frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum EnginePacketType {
    Open = b'0',
    Close = b'1',
    Ping = b'2',
    Pong = b'3',
    Message = b'4',
    Upgrade = b'5',
    Noop = b'6',
}

impl EnginePacketType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Open),
            b'1' => Some(Self::Close),
            b'2' => Some(Self::Ping),
            b'3' => Some(Self::Pong),
            b'4' => Some(Self::Message),
            b'5' => Some(Self::Upgrade),
            b'6' => Some(Self::Noop),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Inner-layer packet type, valid only inside an outer
/// [`EnginePacketType::Message`] frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SocketPacketType {
    Connect = b'0',
    Disconnect = b'1',
    Event = b'2',
    Ack = b'3',
    Error = b'4',
    BinaryEvent = b'5',
    BinaryAck = b'6',
}

impl SocketPacketType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Connect),
            b'1' => Some(Self::Disconnect),
            b'2' => Some(Self::Event),
            b'3' => Some(Self::Ack),
            b'4' => Some(Self::Error),
            b'5' => Some(Self::BinaryEvent),
            b'6' => Some(Self::BinaryAck),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Errors produced while classifying inbound frames.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    /// Frame carried no bytes at all.
    #[error("empty frame")]
    Empty,

    /// First byte is not a known outer-layer type.
    #[error("unknown outer packet type byte {0}")]
    UnknownEngineType(u8),

    /// Message frame ended before the inner-layer type byte.
    #[error("message frame missing inner packet type")]
    TruncatedMessage,

    /// Second byte is not a known inner-layer type.
    #[error("unknown inner packet type byte {0}")]
    UnknownSocketType(u8),
}

/// Splits a raw frame into its outer-layer type and remaining payload.
pub fn decode_engine(frame: &[u8]) -> Result<(EnginePacketType, &[u8]), DecodeError> {
    let (&first, rest) = frame.split_first().ok_or(DecodeError::Empty)?;
    let kind = EnginePacketType::from_byte(first).ok_or(DecodeError::UnknownEngineType(first))?;
    Ok((kind, rest))
}

/// Splits a message-frame remainder into its inner-layer type and payload.
pub fn decode_socket(body: &[u8]) -> Result<(SocketPacketType, &[u8]), DecodeError> {
    let (&first, rest) = body.split_first().ok_or(DecodeError::TruncatedMessage)?;
    let kind = SocketPacketType::from_byte(first).ok_or(DecodeError::UnknownSocketType(first))?;
    Ok((kind, rest))
}

/// Builds the two-byte header prepended to every inner-layer send.
pub fn packet_header(engine: EnginePacketType, socket: SocketPacketType) -> String {
    let mut header = String::with_capacity(2);
    header.push(engine.as_byte() as char);
    header.push(socket.as_byte() as char);
    header
}

/// Builds a bare single-byte control frame such as the heartbeat ping.
pub fn control_frame(engine: EnginePacketType) -> String {
    (engine.as_byte() as char).to_string()
}

/// Serializes a named event with a text payload.
///
/// The payload becomes a JSON string element, so delimiter characters in it
/// survive the round trip unescaped on the application side.
pub fn encode_event(namespace: &str, event: &str, payload: &str) -> String {
    encode_event_value(namespace, event, Value::String(payload.to_owned()))
}

/// Serializes a named event with an arbitrary JSON payload.
///
/// Produces a compact two-element array `[event, payload]`, prefixed with
/// `"<namespace>,"` for any namespace other than [`DEFAULT_NAMESPACE`].
pub fn encode_event_value(namespace: &str, event: &str, payload: Value) -> String {
    let body = Value::Array(vec![Value::String(event.to_owned()), payload]).to_string();
    if namespace == DEFAULT_NAMESPACE {
        return body;
    }
    let mut message = String::with_capacity(namespace.len() + 1 + body.len());
    message.push_str(namespace);
    message.push(',');
    message.push_str(&body);
    message
}

/// Extracts `(event name, payload text)` from an inbound event payload.
///
/// For non-default namespaces everything before the first `[` is dropped
/// first. String payload elements are returned without their JSON quoting;
/// other payload shapes are re-serialized compactly. A payload that does not
/// parse as an array yields two empty strings.
pub fn decode_event_payload(payload: &str, namespace: &str) -> (String, String) {
    let body = if namespace == DEFAULT_NAMESPACE {
        payload
    } else {
        match payload.find('[') {
            Some(start) => &payload[start..],
            None => payload,
        }
    };

    let Ok(Value::Array(elements)) = serde_json::from_str::<Value>(body) else {
        return (String::new(), String::new());
    };

    let mut elements = elements.into_iter();
    let name = match elements.next() {
        Some(Value::String(name)) => name,
        _ => String::new(),
    };
    let body = match elements.next() {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    (name, body)
}
