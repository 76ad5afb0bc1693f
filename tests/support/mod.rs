//! SQLite-backed test double for the `db` traits.
//!
//! Real servers give the engine two things SQLite lacks: `FETCH FIRST n
//! ROWS ONLY` row limits and row locks. The harness rewrites the former to
//! `LIMIT n` and simulates the latter: ids in the shared lock set are
//! filtered out of any statement that carried a lock clause, which is
//! exactly the set of rows a skip-locked claim would not see. A statement
//! without a lock clause (the Oracle batch read) still sees "locked" rows,
//! so the two-step claim protocol is exercised faithfully.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use relayq::db::{Connection, DataSource, Row, SqlError, Value};
use relayq::engine::Worker;
use relayq::error::BoxError;
use relayq::model::{Request, Response};
use rusqlite::types::ValueRef;
use tempfile::TempDir;

/// Lock clauses the dialect profiles emit, longest first so the DB2
/// variant is not truncated by the plain SKIP LOCKED match.
const LOCK_CLAUSES: [&str; 3] = [
    " FOR UPDATE SKIP LOCKED DATA",
    " FOR UPDATE SKIP LOCKED",
    " FOR UPDATE READPAST",
];

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

/// A temp-file SQLite database holding one queue table. Cloning shares the
/// database, so a test can keep a handle while the engine owns another, or
/// run two engines against the same table.
#[derive(Clone)]
pub struct SqliteDataSource {
    inner: Arc<Inner>,
}

struct Inner {
    _dir: TempDir,
    path: PathBuf,
    locked: Mutex<HashSet<i64>>,
}

impl SqliteDataSource {
    /// Create a fresh database containing an empty queue table.
    pub fn new(table: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("queue.db");
        let conn = rusqlite::Connection::open(&path).expect("open database");
        conn.execute_batch(&format!(
            "CREATE TABLE {table} (
                request_id INTEGER PRIMARY KEY,
                request BLOB NOT NULL,
                response_code INTEGER,
                response BLOB,
                response_notification_timestamp TEXT
            )"
        ))
        .expect("create queue table");
        Self {
            inner: Arc::new(Inner {
                _dir: dir,
                path,
                locked: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Pretend a peer transaction holds the row lock for `id`.
    pub fn hold_lock(&self, id: i64) {
        self.inner.locked.lock().unwrap().insert(id);
    }

    /// Release a simulated peer lock.
    pub fn release_lock(&self, id: i64) {
        self.inner.locked.lock().unwrap().remove(&id);
    }
}

impl DataSource for SqliteDataSource {
    type Conn = SqliteConnection;

    fn connection(&self) -> Result<SqliteConnection, SqlError> {
        let conn = rusqlite::Connection::open(&self.inner.path).map_err(sql_err)?;
        conn.execute_batch("BEGIN").map_err(sql_err)?;
        Ok(SqliteConnection {
            conn,
            source: self.inner.clone(),
            committed: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    source: Arc<Inner>,
    committed: bool,
}

impl SqliteConnection {
    /// Rewrite one dialect statement into the SQLite equivalent, applying
    /// the simulated-lock filter where the statement asked for locks.
    fn rewrite(&self, sql: &str) -> String {
        let mut sql = sql.to_string();
        let mut wants_locks = false;
        for clause in LOCK_CLAUSES {
            if let Some(stripped) = sql.strip_suffix(clause) {
                sql = stripped.to_string();
                wants_locks = true;
                break;
            }
        }
        if wants_locks {
            let locked = self.source.locked.lock().unwrap();
            if !locked.is_empty() {
                let mut ids: Vec<i64> = locked.iter().copied().collect();
                ids.sort_unstable();
                let ids = ids
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let filter = format!(" AND request_id NOT IN ({ids})");
                match sql.find(" FETCH FIRST") {
                    Some(at) => sql.insert_str(at, &filter),
                    None => sql.push_str(&filter),
                }
            }
        }
        rewrite_fetch_first(&sql)
    }
}

/// `FETCH FIRST n ROWS ONLY` is SQL standard but not SQLite; use LIMIT.
fn rewrite_fetch_first(sql: &str) -> String {
    let Some(start) = sql.find("FETCH FIRST ") else {
        return sql.to_string();
    };
    let Some(len) = sql[start..].find(" ROWS ONLY") else {
        return sql.to_string();
    };
    let n = &sql[start + "FETCH FIRST ".len()..start + len];
    format!(
        "{}LIMIT {n}{}",
        &sql[..start],
        &sql[start + len + " ROWS ONLY".len()..]
    )
}

fn to_sql(params: &[Value]) -> Vec<rusqlite::types::Value> {
    params
        .iter()
        .map(|value| match value {
            Value::Int(v) => rusqlite::types::Value::Integer(i64::from(*v)),
            Value::BigInt(v) => rusqlite::types::Value::Integer(*v),
            Value::Bytes(v) => rusqlite::types::Value::Blob(v.clone()),
            Value::Null => rusqlite::types::Value::Null,
        })
        .collect()
}

fn sql_err(e: rusqlite::Error) -> SqlError {
    SqlError::with_source(e.to_string(), e)
}

impl Connection for SqliteConnection {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SqlError> {
        let sql = self.rewrite(sql);
        let mut stmt = self.conn.prepare(&sql).map_err(sql_err)?;
        let columns = stmt.column_count();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(to_sql(params)))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(sql_err)? {
            let mut values = Vec::with_capacity(columns);
            for index in 0..columns {
                let value = match row.get_ref(index).map_err(sql_err)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::BigInt(v),
                    ValueRef::Text(v) => Value::Bytes(v.to_vec()),
                    ValueRef::Blob(v) => Value::Bytes(v.to_vec()),
                    ValueRef::Real(_) => {
                        return Err(SqlError::new(format!("unexpected real column {index}")))
                    }
                };
                values.push(value);
            }
            out.push(Row::new(values));
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, SqlError> {
        let sql = self.rewrite(sql);
        let count = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(to_sql(params)))
            .map_err(sql_err)?;
        Ok(count as u64)
    }

    fn execute_batch(&mut self, sql: &str, bindings: &[Vec<Value>]) -> Result<Vec<u64>, SqlError> {
        let sql = self.rewrite(sql);
        let mut stmt = self.conn.prepare(&sql).map_err(sql_err)?;
        let mut counts = Vec::with_capacity(bindings.len());
        for params in bindings {
            let count = stmt
                .execute(rusqlite::params_from_iter(to_sql(params)))
                .map_err(sql_err)?;
            counts.push(count as u64);
        }
        Ok(counts)
    }

    fn commit(&mut self) -> Result<(), SqlError> {
        self.conn.execute_batch("COMMIT").map_err(sql_err)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

// ---------------------------------------------------------------------------
// Reference worker
// ---------------------------------------------------------------------------

/// Worker with one canned response per request id. Delivery verifies the
/// response structurally and discards the entry, so a draining map is the
/// test's proof that every response arrived intact exactly once.
#[derive(Clone)]
pub struct MapWorker {
    responses: Arc<Mutex<HashMap<i64, Response>>>,
    computed: Arc<Mutex<Vec<i64>>>,
}

impl MapWorker {
    pub fn new(requests: &[Request]) -> Self {
        let responses = requests
            .iter()
            .map(|r| {
                let data = format!("response{}", r.id).into_bytes();
                (r.id, Response::new(r.id as i32, data))
            })
            .collect();
        Self {
            responses: Arc::new(Mutex::new(responses)),
            computed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Responses not yet delivered.
    pub fn pending(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// Ids passed to `compute_response`, in order.
    pub fn computed(&self) -> Vec<i64> {
        self.computed.lock().unwrap().clone()
    }
}

impl<C: Connection> Worker<C> for MapWorker {
    fn compute_response(
        &mut self,
        request: &Request,
        _conn: &mut C,
    ) -> Result<Response, BoxError> {
        self.computed.lock().unwrap().push(request.id);
        self.responses
            .lock()
            .unwrap()
            .get(&request.id)
            .cloned()
            .ok_or_else(|| format!("no canned response for request {}", request.id).into())
    }

    fn deliver_response(&mut self, request_id: i64, response: &Response) -> Result<(), BoxError> {
        let mut responses = self.responses.lock().unwrap();
        match responses.get(&request_id) {
            Some(expected) if expected == response => {
                responses.remove(&request_id);
                Ok(())
            }
            Some(_) => Err(format!("response mismatch for request {request_id}").into()),
            None => Err(format!("unexpected delivery for request {request_id}").into()),
        }
    }
}

/// The two-request fixture used across the scenario tests.
pub fn requests() -> Vec<Request> {
    vec![Request::new(0, "request0"), Request::new(1, "request1")]
}
