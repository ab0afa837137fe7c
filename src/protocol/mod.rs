//! Realtime Protocol Vocabulary
//!
//! The types every interceptor consumes and emits:
//! - [`Frame`] / [`FrameDirection`]: one observed unit on a proxied connection
//! - [`Action`]: what the proxy should send in place of an observed frame
//! - [`ConnectionParams`]: connection-establishment query parameters
//! - [`ResumeKey`]: structured view of the `resume` token

pub mod codec;
pub mod message;

pub use codec::{CodecError, JsonCodec, ProtocolCodec};
pub use message::{Message, PresenceAction, ProtocolAction};

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

/// Direction a frame travels through the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDirection {
    ClientToServer,
    ServerToClient,
}

impl fmt::Display for FrameDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDirection::ClientToServer => write!(f, "client->server"),
            FrameDirection::ServerToClient => write!(f, "server->client"),
        }
    }
}

/// A single WebSocket-level frame observed by the proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
    Ping(Bytes),
    Pong(Bytes),
    Close,
}

impl Frame {
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }

    /// Payload of a binary frame, `None` for every other frame type
    pub fn binary_payload(&self) -> Option<&[u8]> {
        match self {
            Frame::Binary(data) => Some(data.as_ref()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Binary(_) => "binary",
            Frame::Text(_) => "text",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close => "close",
        }
    }

    /// Short description for logs; never dumps the full payload
    pub fn describe(&self) -> String {
        match self {
            Frame::Binary(data) => format!("binary({} bytes)", data.len()),
            Frame::Text(text) => format!("text({} chars)", text.len()),
            Frame::Ping(_) | Frame::Pong(_) | Frame::Close => self.kind().to_string(),
        }
    }
}

/// One replacement frame emitted by an interceptor.
///
/// An interceptor returns an ordered list of these for every observed frame:
/// an empty list drops the frame, one entry passes or rewrites it, more entries
/// inject additional frames after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub direction: FrameDirection,
    pub frame: Frame,
    /// Send this frame, then terminate the underlying connection
    pub send_and_close: bool,
}

impl Action {
    pub fn new(direction: FrameDirection, frame: Frame) -> Self {
        Action {
            direction,
            frame,
            send_and_close: false,
        }
    }

    /// A close frame that also tears down the proxied connection
    pub fn close(direction: FrameDirection) -> Self {
        Action {
            direction,
            frame: Frame::Close,
            send_and_close: true,
        }
    }

    /// The identity result for a frame: forward it unchanged
    pub fn pass(direction: FrameDirection, frame: Frame) -> Vec<Action> {
        vec![Action::new(direction, frame)]
    }
}

/// Connection-establishment parameters from the client's connect URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    pub resume: Option<String>,
    pub other: BTreeMap<String, String>,
}

impl ConnectionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resume(mut self, resume: impl Into<String>) -> Self {
        self.resume = Some(resume.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.other.insert(key.into(), value.into());
        self
    }

    /// Parse a URL query string such as `key=abc&resume=x!y-z&format=msgpack`
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = ConnectionParams::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "resume" {
                params.resume = Some(value.into_owned());
            } else {
                params.other.insert(key.into_owned(), value.into_owned());
            }
        }
        params
    }

    /// Render back to a URL query string (no leading `?`)
    pub fn to_query(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.other {
            serializer.append_pair(key, value);
        }
        if let Some(resume) = &self.resume {
            serializer.append_pair("resume", resume);
        }
        serializer.finish()
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_query())
    }
}

/// Placeholder substituted for the connection id of a corrupted resume token
pub const FAKE_CONNECTION_ID: &str = "FakeFakeFakeFake";

/// A resume token of the shape `<prefix>!<connectionId>-<suffix>`.
///
/// The prefix runs up to the last `!`; the suffix starts at the last `-`
/// after it. Both separators are kept on reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeKey<'a> {
    pub prefix: &'a str,
    pub connection_id: &'a str,
    pub suffix: &'a str,
}

impl<'a> ResumeKey<'a> {
    pub fn parse(token: &'a str) -> Option<Self> {
        let bang = token.rfind('!')?;
        let rest = &token[bang + 1..];
        let dash = rest.rfind('-')?;
        Some(ResumeKey {
            prefix: &token[..bang],
            connection_id: &rest[..dash],
            suffix: &rest[dash + 1..],
        })
    }

    pub fn with_connection_id(&self, connection_id: &str) -> String {
        format!("{}!{}-{}", self.prefix, connection_id, self.suffix)
    }
}

/// Replace the connection id inside a resume token; other shapes pass unchanged
pub fn corrupt_resume_token(token: &str) -> String {
    match ResumeKey::parse(token) {
        Some(key) => key.with_connection_id(FAKE_CONNECTION_ID),
        None => token.to_string(),
    }
}
