//! Queue configuration, fixed at engine construction.

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Options for a [`RequestQueue`](crate::engine::RequestQueue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Fully-qualified table name interpolated into every statement.
    pub table: String,
    /// Database product the SQL is emitted for.
    pub dialect: Dialect,
    /// Delete each row after successful delivery instead of marking it
    /// notified.
    pub delete_after_response_sent: bool,
    /// Maximum rows claimed per `handle` call.
    pub fetch_for_handling_limit: u32,
    /// Maximum rows claimed per `respond` call.
    pub fetch_for_notification_limit: u32,
}

impl QueueConfig {
    /// Conservative defaults: keep notified rows, claim one row per pass.
    pub fn new(table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            table: table.into(),
            dialect,
            delete_after_response_sent: false,
            fetch_for_handling_limit: 1,
            fetch_for_notification_limit: 1,
        }
    }

    pub fn delete_after_response_sent(mut self, delete: bool) -> Self {
        self.delete_after_response_sent = delete;
        self
    }

    pub fn fetch_for_handling_limit(mut self, limit: u32) -> Self {
        self.fetch_for_handling_limit = limit;
        self
    }

    pub fn fetch_for_notification_limit(mut self, limit: u32) -> Self {
        self.fetch_for_notification_limit = limit;
        self
    }
}
