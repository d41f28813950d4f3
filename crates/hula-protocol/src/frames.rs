//! Frame types for the hula channel protocol.
//!
//! Every message exchanged over the shared duplex channel is a [`Frame`].
//! Frames are tagged by a `type` field so the same shape works for both the
//! JSON text encoding and the MessagePack binary encoding.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query parameters carried by a call (the request-scoped state bag).
pub type Query = Map<String, Value>;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Hello,
    Call,
    Response,
    Reload,
}

impl FrameType {
    /// Stable lowercase name, used for log fields and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Hello => "hello",
            FrameType::Call => "call",
            FrameType::Response => "response",
            FrameType::Reload => "reload",
        }
    }
}

/// Client handshake, sent on every (re)connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Zero on the first connection, incremented on every reconnect.
    pub connection_ordinal: u64,
}

/// A call from a client to a server-side route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Caller-allocated correlation id.
    pub id: u64,
    /// Route to invoke.
    pub path: String,
    /// Query parameters.
    #[serde(default)]
    pub query: Query,
    /// Whether ancestor routes should be rendered around the target.
    #[serde(default)]
    pub parents: bool,
}

impl Call {
    /// Create a new call.
    #[must_use]
    pub fn new(id: u64, path: impl Into<String>, query: Query, parents: bool) -> Self {
        Self {
            id,
            path: path.into(),
            query,
            parents,
        }
    }
}

/// A server response to a [`Call`].
///
/// The call's fields are echoed back so the client can correlate without
/// any server-side bookkeeping. Exactly one of `result` / `error` is set on a
/// well-formed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the originating call.
    pub id: u64,
    /// Echoed call path.
    #[serde(default)]
    pub path: String,
    /// Echoed call query.
    #[serde(default)]
    pub query: Query,
    /// Echoed ancestor flag.
    #[serde(default)]
    pub parents: bool,
    /// Successful result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Human-readable error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Numeric error code (HTTP-equivalent), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// What a response resolved to, once its shape has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The call succeeded.
    Result(Value),
    /// The call failed with a message and optional code.
    Error { message: String, code: Option<u16> },
}

impl Response {
    /// Build a successful response echoing `call`.
    #[must_use]
    pub fn success(call: Call, result: Value) -> Self {
        Self {
            id: call.id,
            path: call.path,
            query: call.query,
            parents: call.parents,
            result: Some(result),
            error: None,
            code: None,
        }
    }

    /// Build a failed response echoing `call`.
    #[must_use]
    pub fn failure(call: Call, message: impl Into<String>, code: Option<u16>) -> Self {
        Self {
            id: call.id,
            path: call.path,
            query: call.query,
            parents: call.parents,
            result: None,
            error: Some(message.into()),
            code,
        }
    }

    /// Check the result/error exclusivity and extract the outcome.
    ///
    /// # Errors
    ///
    /// Returns a description of the violation when both or neither of
    /// `result` and `error` are present.
    pub fn outcome(self) -> Result<Outcome, &'static str> {
        match (self.result, self.error) {
            (Some(value), None) => Ok(Outcome::Result(value)),
            (None, Some(message)) => Ok(Outcome::Error {
                message,
                code: self.code,
            }),
            (Some(_), Some(_)) => Err("response carries both result and error"),
            (None, None) => Err("response carries neither result nor error"),
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Client -> server handshake.
    Hello(Hello),
    /// Client -> server call.
    Call(Call),
    /// Server -> client response.
    Response(Response),
    /// Server -> client: discard local state and reload from scratch.
    Reload,
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Hello(_) => FrameType::Hello,
            Frame::Call(_) => FrameType::Call,
            Frame::Response(_) => FrameType::Response,
            Frame::Reload => FrameType::Reload,
        }
    }

    /// Create a new Hello frame.
    #[must_use]
    pub fn hello(connection_ordinal: u64) -> Self {
        Frame::Hello(Hello { connection_ordinal })
    }

    /// Create a new Call frame.
    #[must_use]
    pub fn call(id: u64, path: impl Into<String>, query: Query, parents: bool) -> Self {
        Frame::Call(Call::new(id, path, query, parents))
    }

    /// Create a new Reload frame.
    #[must_use]
    pub fn reload() -> Self {
        Frame::Reload
    }
}
