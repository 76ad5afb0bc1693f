//! # relayq
//!
//! Durable, multi-consumer request/response queue whose state of record
//! lives in a relational database table.
//!
//! Producers enqueue requests under caller-assigned 64-bit ids. Worker
//! processes claim batches of rows under row-level locks with skip-locked
//! semantics, compute responses, and persist them atomically with the
//! claim; a second pass delivers the responses to an external sink and
//! marks the rows notified (or deletes them). Any number of cooperating
//! workers can run against the same table: the database's lock manager
//! guarantees at most one concurrent processor per request.
//!
//! The database driver and the two processing callbacks are injected. The
//! engine speaks to the database through the [`db`] traits and to the
//! embedder through [`engine::Worker`].

pub mod config;
pub mod db;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod model;
pub mod sql;
