//! Error types for relayq.
//!
//! One variant per failure kind: persistence faults and duplicate
//! enqueues are save failures, compute-callback faults are handle
//! failures, anything inside the respond pass is a respond failure, and
//! inspection or bulk-delete faults use the generic queue variant.

use thiserror::Error;

use crate::db::SqlError;
use crate::model::Request;

/// Boxed error carried by injected callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// An enqueue or a response write could not be persisted.
    #[error("save failed: {source}")]
    Save {
        #[source]
        source: SqlError,
        /// The request being enqueued when the fault was raised, if known.
        request: Option<Request>,
    },

    /// An enqueue was rejected because the id is already present.
    #[error("{request} already exists")]
    Duplicate { request: Request },

    /// The compute callback could not produce a response.
    #[error("handling request {request_id} failed: {source}")]
    Handle { request_id: i64, source: BoxError },

    /// The respond pass failed: the claim, the delivery callback, or the
    /// final mark or delete.
    #[error("respond failed: {source}")]
    Response {
        /// The request being delivered when the fault was raised, if any.
        request_id: Option<i64>,
        source: BoxError,
    },

    /// A fault outside the two processing passes (inspection, bulk delete).
    #[error("queue operation failed: {source}")]
    Queue {
        #[source]
        source: SqlError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
