//! Per-database SQL fragments.
//!
//! Pure data. Each supported database product contributes three clause
//! fragments that parameterize the statement builder; everything else the
//! engine emits is portable SQL.

use serde::{Deserialize, Serialize};

/// Database products the queue can run against. Fixed at engine
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    PostgreSql,
    Oracle,
    MySql,
    MsSqlServer,
    Db2,
}

/// The SQL fragments that differ between database products.
///
/// A dialect with an empty `batch_lock_clause` cannot lock rows in the
/// batch claim; its non-empty `row_lock_clause` makes the engine re-select
/// each candidate row individually to acquire the lock (or skip it when a
/// peer holds it). Dialects without an `insert_conflict_clause` raise a
/// constraint violation for duplicate inserts instead of reporting zero
/// affected rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectProfile {
    /// Appended to the batch claim selects to lock returned rows, skipping
    /// rows locked by peer transactions.
    pub batch_lock_clause: &'static str,
    /// Appended to the single-row re-lock selects.
    pub row_lock_clause: &'static str,
    /// Appended to the enqueue insert to turn duplicate-key inserts into
    /// zero-count no-ops.
    pub insert_conflict_clause: &'static str,
}

impl Dialect {
    /// Every supported dialect.
    pub const ALL: [Dialect; 5] = [
        Dialect::PostgreSql,
        Dialect::Oracle,
        Dialect::MySql,
        Dialect::MsSqlServer,
        Dialect::Db2,
    ];

    pub const fn profile(self) -> DialectProfile {
        match self {
            Dialect::PostgreSql => DialectProfile {
                batch_lock_clause: "FOR UPDATE SKIP LOCKED",
                row_lock_clause: "",
                insert_conflict_clause: "ON CONFLICT DO NOTHING",
            },
            // Oracle cannot combine a row limit with SKIP LOCKED in one
            // portable statement; the batch read goes unlocked and every
            // candidate row is re-locked individually.
            Dialect::Oracle => DialectProfile {
                batch_lock_clause: "",
                row_lock_clause: "FOR UPDATE SKIP LOCKED",
                insert_conflict_clause: "",
            },
            Dialect::MySql => DialectProfile {
                batch_lock_clause: "FOR UPDATE SKIP LOCKED",
                row_lock_clause: "",
                insert_conflict_clause: "",
            },
            Dialect::MsSqlServer => DialectProfile {
                batch_lock_clause: "FOR UPDATE READPAST",
                row_lock_clause: "",
                insert_conflict_clause: "",
            },
            Dialect::Db2 => DialectProfile {
                batch_lock_clause: "FOR UPDATE SKIP LOCKED DATA",
                row_lock_clause: "",
                insert_conflict_clause: "",
            },
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dialect::PostgreSql => "postgresql",
            Dialect::Oracle => "oracle",
            Dialect::MySql => "mysql",
            Dialect::MsSqlServer => "mssqlserver",
            Dialect::Db2 => "db2",
        };
        write!(f, "{s}")
    }
}
