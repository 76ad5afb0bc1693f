//! Core data model.
//!
//! A request is an opaque unit of work with a caller-assigned id; a
//! response is the result of processing it. Row state is never stored
//! directly: it is derived from which response columns are null.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// An opaque unit of work.
///
/// The id is assigned by the producer and must be unique within the queue
/// table. The payload may be empty but is never null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub data: Vec<u8>,
}

impl Request {
    pub fn new(id: i64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }
}

// Identity equality: two requests with the same id are the same request.
impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Request {}

impl std::hash::Hash for Request {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request {}", self.id)
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Result of processing a request.
///
/// The code is a result category interpreted by the embedder; a persisted
/// non-null code is what marks a request as handled. Compares structurally,
/// which delivery sinks can use to verify payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Response {
    pub code: i32,
    pub data: Vec<u8>,
}

impl Response {
    pub fn new(code: i32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Row state
// ---------------------------------------------------------------------------

/// Lifecycle state of a queue row, derived from column nullability.
///
/// A row only moves forward: New -> Handled -> Notified. Handled and
/// Notified rows may additionally be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Enqueued, no response yet.
    New,
    /// Response persisted, not yet delivered.
    Handled,
    /// Response delivered to the sink.
    Notified,
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestState::New => "new",
            RequestState::Handled => "handled",
            RequestState::Notified => "notified",
        };
        write!(f, "{s}")
    }
}
