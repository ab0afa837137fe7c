//! Decoded protocol messages
//!
//! A [`Message`] is the generic attribute mapping a binary frame decodes to.
//! Interceptors only ever need a handful of fields (`action`, `msgSerial`,
//! `presence`), so the mapping is kept untyped and the classification helpers
//! are tolerant of missing or mistyped fields.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Protocol message action codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolAction {
    Heartbeat = 0,
    Ack = 1,
    Nack = 2,
    Connect = 3,
    Connected = 4,
    Disconnect = 5,
    Disconnected = 6,
    Close = 7,
    Closed = 8,
    Error = 9,
    Attach = 10,
    Attached = 11,
    Detach = 12,
    Detached = 13,
    Presence = 14,
    Message = 15,
    Sync = 16,
    Auth = 17,
}

impl ProtocolAction {
    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn from_code(code: u64) -> Option<Self> {
        use ProtocolAction::*;
        let action = match code {
            0 => Heartbeat,
            1 => Ack,
            2 => Nack,
            3 => Connect,
            4 => Connected,
            5 => Disconnect,
            6 => Disconnected,
            7 => Close,
            8 => Closed,
            9 => Error,
            10 => Attach,
            11 => Attached,
            12 => Detach,
            13 => Detached,
            14 => Presence,
            15 => Message,
            16 => Sync,
            17 => Auth,
            _ => return None,
        };
        Some(action)
    }
}

/// Presence sub-action codes carried by entries of a PRESENCE message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PresenceAction {
    Absent = 0,
    Present = 1,
    Enter = 2,
    Leave = 3,
    Update = 4,
}

impl PresenceAction {
    pub fn code(self) -> u64 {
        self as u64
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    fields: Map<String, Value>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Message { fields }
    }

    /// Shorthand for a message carrying only an action code
    pub fn with_action(action: ProtocolAction) -> Self {
        Message::new().with_field("action", action.code())
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn action(&self) -> Option<ProtocolAction> {
        self.get("action")
            .and_then(Value::as_u64)
            .and_then(ProtocolAction::from_code)
    }

    pub fn is_action(&self, action: ProtocolAction) -> bool {
        self.get("action").and_then(Value::as_u64) == Some(action.code())
    }

    /// True when any entry in the `presence` array carries `action`
    pub fn is_presence_action(&self, action: PresenceAction) -> bool {
        self.get("presence")
            .and_then(Value::as_array)
            .map(|entries| {
                entries.iter().any(|entry| {
                    entry.get("action").and_then(Value::as_u64) == Some(action.code())
                })
            })
            .unwrap_or(false)
    }

    pub fn msg_serial(&self) -> Option<i64> {
        self.get("msgSerial").and_then(Value::as_i64)
    }

    /// Negative acknowledgement for `count` messages starting at `msg_serial`
    pub fn nack(
        msg_serial: i64,
        count: u32,
        error_code: u32,
        error_status_code: u16,
        error_message: &str,
    ) -> Self {
        Message::with_action(ProtocolAction::Nack)
            .with_field("msgSerial", msg_serial)
            .with_field("count", count)
            .with_field(
                "error",
                json!({
                    "code": error_code,
                    "statusCode": error_status_code,
                    "message": error_message,
                }),
            )
    }
}

impl From<Map<String, Value>> for Message {
    fn from(fields: Map<String, Value>) -> Self {
        Message::from_fields(fields)
    }
}

/// Error carried by every NACK the proxy fabricates
pub const INJECTED_NACK_CODE: u32 = 50000;
pub const INJECTED_NACK_STATUS: u16 = 500;
pub const INJECTED_NACK_MESSAGE: &str = "injected by proxy";

/// A non-fatal NACK for a single message serial
pub fn nonfatal_nack(msg_serial: i64) -> Message {
    Message::nack(
        msg_serial,
        1,
        INJECTED_NACK_CODE,
        INJECTED_NACK_STATUS,
        INJECTED_NACK_MESSAGE,
    )
}
