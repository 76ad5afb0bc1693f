//! SQL statement construction.
//!
//! A pure string layer: every statement is a deterministic function of the
//! configured table name, the dialect fragments, and the two batch limits.
//! Positional `?` placeholders throughout. Empty dialect fragments
//! contribute nothing, so statements never carry trailing whitespace.

use crate::config::QueueConfig;
use crate::dialect::DialectProfile;
use crate::model::RequestState;

/// Builder for the canonical statements of one queue instance.
#[derive(Debug, Clone)]
pub struct Statements {
    table: String,
    profile: DialectProfile,
    handling_limit: u32,
    notification_limit: u32,
}

impl Statements {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            table: config.table.clone(),
            profile: config.dialect.profile(),
            handling_limit: config.fetch_for_handling_limit,
            notification_limit: config.fetch_for_notification_limit,
        }
    }

    /// Enqueue one request. Binds: request_id, request.
    pub fn insert_new(&self) -> String {
        with_clause(
            format!(
                "INSERT INTO {} (request_id, request) VALUES (?, ?)",
                self.table
            ),
            self.profile.insert_conflict_clause,
        )
    }

    /// Persist a response. Binds: response_code, response, request_id.
    ///
    /// The `IS NULL` predicate makes the transition idempotent: a response
    /// can never be overwritten, and a save racing a completed peer simply
    /// affects zero rows.
    pub fn save_response(&self) -> String {
        format!(
            "UPDATE {} SET response_code = ?, response = ? \
             WHERE request_id = ? AND response_code IS NULL",
            self.table
        )
    }

    /// Stamp the delivery timestamp. Binds: request_id.
    pub fn mark_notified(&self) -> String {
        format!(
            "UPDATE {} SET response_notification_timestamp = CURRENT_TIMESTAMP \
             WHERE request_id = ?",
            self.table
        )
    }

    /// Delete one row. Binds: request_id.
    pub fn delete_one(&self) -> String {
        format!("DELETE FROM {} WHERE request_id = ?", self.table)
    }

    /// Delete every row.
    pub fn delete_all(&self) -> String {
        format!("DELETE FROM {}", self.table)
    }

    /// Claim a batch of new rows for handling, locking them where the
    /// dialect allows locks on a limited select.
    pub fn claim_new_batch(&self) -> String {
        with_clause(
            format!(
                "SELECT request_id, request FROM {} WHERE response_code IS NULL \
                 FETCH FIRST {} ROWS ONLY",
                self.table, self.handling_limit
            ),
            self.profile.batch_lock_clause,
        )
    }

    /// Claim a batch of handled-but-undelivered rows for notification.
    pub fn claim_handled_batch(&self) -> String {
        with_clause(
            format!(
                "SELECT request_id, response_code, response FROM {} \
                 WHERE response_code IS NOT NULL \
                 AND response_notification_timestamp IS NULL \
                 FETCH FIRST {} ROWS ONLY",
                self.table, self.notification_limit
            ),
            self.profile.batch_lock_clause,
        )
    }

    /// Re-lock one new row by id. Binds: request_id. Returns no rows when a
    /// peer holds the lock or has already handled the row.
    pub fn relock_new_by_id(&self) -> String {
        with_clause(
            format!(
                "SELECT request_id FROM {} WHERE response_code IS NULL AND request_id = ?",
                self.table
            ),
            self.profile.row_lock_clause,
        )
    }

    /// Re-lock one handled row by id. Binds: request_id.
    pub fn relock_handled_by_id(&self) -> String {
        with_clause(
            format!(
                "SELECT request_id FROM {} WHERE response_code IS NOT NULL \
                 AND response_notification_timestamp IS NULL AND request_id = ?",
                self.table
            ),
            self.profile.row_lock_clause,
        )
    }

    /// Unlocked inspection select for every id in the given state.
    pub fn ids_in_state(&self, state: RequestState) -> String {
        let predicate = match state {
            RequestState::New => "response_code IS NULL",
            RequestState::Handled => {
                "response_code IS NOT NULL AND response_notification_timestamp IS NULL"
            }
            RequestState::Notified => "response_notification_timestamp IS NOT NULL",
        };
        format!("SELECT request_id FROM {} WHERE {}", self.table, predicate)
    }
}

fn with_clause(base: String, clause: &'static str) -> String {
    if clause.is_empty() {
        base
    } else {
        format!("{base} {clause}")
    }
}
