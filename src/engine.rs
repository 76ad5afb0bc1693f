//! Queue engine. The public API for enqueueing, handling, and responding.
//!
//! Each public call opens one connection, does all its work inside that
//! connection's transaction, and commits once at the end. Nothing is
//! retried here; a failed call leaves the database exactly as it was and
//! surfaces the fault to the caller. Parallelism comes from the embedder
//! running several engines (or processes) against the same table: the
//! skip-locked claims keep their row sets disjoint without blocking.

use tracing::{debug, error, info};

use crate::config::QueueConfig;
use crate::db::{Connection, DataSource, SqlError, Value};
use crate::error::{BoxError, Error, Result};
use crate::model::{Request, RequestState, Response};
use crate::sql::Statements;

/// The injected processing capabilities.
///
/// Replaces what would otherwise be a subclassing seam: the engine is a
/// concrete value and the embedder supplies the two operations it cannot
/// know.
pub trait Worker<C: Connection> {
    /// Compute the response for a claimed request.
    ///
    /// Runs inside the claim transaction; any writes made through `conn`
    /// commit atomically with the response save. An error aborts the whole
    /// pass and nothing is committed.
    fn compute_response(
        &mut self,
        request: &Request,
        conn: &mut C,
    ) -> std::result::Result<Response, BoxError>;

    /// Push a response to the downstream sink.
    ///
    /// The only step that touches systems outside the database. Delivery
    /// is at-least-once: a crash between a successful delivery and the
    /// commit redelivers on the next pass, so sinks must be idempotent
    /// with respect to the request id.
    fn deliver_response(
        &mut self,
        request_id: i64,
        response: &Response,
    ) -> std::result::Result<(), BoxError>;
}

/// The queue engine.
///
/// Synchronous and blocking; every public call occupies the calling thread
/// until its commit or rollback. Holds exactly one connection per call and
/// releases it on every exit path (dropping an uncommitted connection
/// rolls back).
pub struct RequestQueue<S, W>
where
    S: DataSource,
    W: Worker<S::Conn>,
{
    config: QueueConfig,
    statements: Statements,
    source: S,
    worker: W,
}

impl<S, W> RequestQueue<S, W>
where
    S: DataSource,
    W: Worker<S::Conn>,
{
    pub fn new(config: QueueConfig, source: S, worker: W) -> Self {
        let statements = Statements::new(&config);
        Self {
            config,
            statements,
            source,
            worker,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Enqueue
    // -----------------------------------------------------------------------

    /// Enqueue a batch of new requests in a single transaction.
    ///
    /// With `fail_if_duplicate`, an already-present id fails the whole
    /// batch and nothing is inserted; otherwise duplicates are silently
    /// dropped where the dialect supports conflict-free inserts.
    pub fn add(&self, requests: &[Request], fail_if_duplicate: bool) -> Result<()> {
        info!(count = requests.len(), "adding new requests");
        match self.add_inner(requests, fail_if_duplicate) {
            Ok(added) => {
                info!(added, "adding new requests completed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "adding new requests failed");
                Err(e)
            }
        }
    }

    fn add_inner(&self, requests: &[Request], fail_if_duplicate: bool) -> Result<usize> {
        let mut conn = self.source.connection().map_err(save_fault)?;
        let bindings: Vec<Vec<Value>> = requests
            .iter()
            .map(|r| vec![Value::BigInt(r.id), Value::Bytes(r.data.clone())])
            .collect();
        let counts = conn
            .execute_batch(&self.statements.insert_new(), &bindings)
            .map_err(save_fault)?;
        if fail_if_duplicate {
            // A zero count is the conflict clause swallowing a duplicate.
            // Returning without commit rolls the whole batch back.
            if let Some(position) = counts.iter().position(|&count| count == 0) {
                return Err(Error::Duplicate {
                    request: requests[position].clone(),
                });
            }
        }
        let added = counts.iter().filter(|&&count| count > 0).count();
        conn.commit().map_err(save_fault)?;
        Ok(added)
    }

    // -----------------------------------------------------------------------
    // Handle pass
    // -----------------------------------------------------------------------

    /// Claim up to the handling limit of new rows, compute a response for
    /// each, and persist the responses, all in one transaction.
    pub fn handle(&mut self) -> Result<()> {
        info!("handling new requests");
        match self.handle_inner() {
            Ok(handled) => {
                info!(handled, "handling new requests completed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "handling new requests failed");
                Err(e)
            }
        }
    }

    fn handle_inner(&mut self) -> Result<usize> {
        let mut conn = self.source.connection().map_err(save_fault)?;
        let rows = conn
            .query(&self.statements.claim_new_batch(), &[])
            .map_err(save_fault)?;
        let relock_sql = self.statements.relock_new_by_id();
        let save_sql = self.statements.save_response();
        let mut handled = 0;
        for row in rows {
            let id = row.get_i64(0).map_err(save_fault)?;
            let data = row.get_bytes(1).map_err(save_fault)?;
            if !self.relock(&mut conn, &relock_sql, id).map_err(save_fault)? {
                // A peer claimed the row between the unlocked batch read
                // and the re-lock attempt.
                debug!(request_id = id, "skipping row claimed by a peer");
                continue;
            }
            let request = Request::new(id, data);
            let response = self
                .worker
                .compute_response(&request, &mut conn)
                .map_err(|source| Error::Handle {
                    request_id: id,
                    source,
                })?;
            let params = [
                Value::Int(response.code),
                Value::Bytes(response.data),
                Value::BigInt(id),
            ];
            // Zero rows affected means a peer already saved a response;
            // the IS NULL predicate keeps the first write authoritative.
            conn.execute(&save_sql, &params).map_err(save_fault)?;
            handled += 1;
        }
        conn.commit().map_err(save_fault)?;
        Ok(handled)
    }

    // -----------------------------------------------------------------------
    // Respond pass
    // -----------------------------------------------------------------------

    /// Claim up to the notification limit of handled rows, deliver each
    /// response to the sink, and mark the rows notified (or delete them),
    /// all in one transaction.
    pub fn respond(&mut self) -> Result<()> {
        info!("sending responses");
        match self.respond_inner() {
            Ok(sent) => {
                info!(sent, "sending responses completed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "sending responses failed");
                Err(e)
            }
        }
    }

    fn respond_inner(&mut self) -> Result<usize> {
        let mut conn = self.source.connection().map_err(respond_fault)?;
        let rows = conn
            .query(&self.statements.claim_handled_batch(), &[])
            .map_err(respond_fault)?;
        let relock_sql = self.statements.relock_handled_by_id();
        let finish_sql = if self.config.delete_after_response_sent {
            self.statements.delete_one()
        } else {
            self.statements.mark_notified()
        };
        let mut sent = 0;
        for row in rows {
            let id = row.get_i64(0).map_err(respond_fault)?;
            let code = row.get_i32(1).map_err(respond_fault)?;
            let data = row.get_bytes(2).map_err(respond_fault)?;
            if !self
                .relock(&mut conn, &relock_sql, id)
                .map_err(respond_fault)?
            {
                debug!(request_id = id, "skipping row claimed by a peer");
                continue;
            }
            let response = Response::new(code, data);
            self.worker
                .deliver_response(id, &response)
                .map_err(|source| Error::Response {
                    request_id: Some(id),
                    source,
                })?;
            conn.execute(&finish_sql, &[Value::BigInt(id)])
                .map_err(respond_fault)?;
            sent += 1;
        }
        conn.commit().map_err(respond_fault)?;
        Ok(sent)
    }

    /// Re-acquire the row lock on dialects whose batch claim cannot lock.
    /// Returns false when the row is gone or a peer holds it, in which
    /// case the caller skips the row silently.
    fn relock(
        &self,
        conn: &mut S::Conn,
        sql: &str,
        id: i64,
    ) -> std::result::Result<bool, SqlError> {
        if self.config.dialect.profile().row_lock_clause.is_empty() {
            // The batch claim already locked the row.
            return Ok(true);
        }
        Ok(!conn.query(sql, &[Value::BigInt(id)])?.is_empty())
    }

    // -----------------------------------------------------------------------
    // Inspection and bulk delete
    // -----------------------------------------------------------------------

    /// Ids of requests that have no response yet.
    pub fn not_handled_request_ids(&self) -> Result<Vec<i64>> {
        self.select_ids(RequestState::New)
    }

    /// Ids of requests whose response has not been delivered yet.
    pub fn not_notified_request_ids(&self) -> Result<Vec<i64>> {
        self.select_ids(RequestState::Handled)
    }

    /// Ids of requests whose response has been delivered.
    pub fn notified_request_ids(&self) -> Result<Vec<i64>> {
        self.select_ids(RequestState::Notified)
    }

    /// Unlocked id query on a fresh connection. For tests, operators, and
    /// admin tooling, not for hot paths.
    fn select_ids(&self, state: RequestState) -> Result<Vec<i64>> {
        debug!(%state, "inspecting request ids");
        let mut conn = self.source.connection().map_err(queue_fault)?;
        let rows = conn
            .query(&self.statements.ids_in_state(state), &[])
            .map_err(queue_fault)?;
        rows.iter()
            .map(|row| row.get_i64(0).map_err(queue_fault))
            .collect()
    }

    /// Delete every request regardless of state. Returns the number of
    /// deleted rows.
    pub fn delete_all(&self) -> Result<u64> {
        info!("deleting all requests");
        match self.delete_all_inner() {
            Ok(deleted) => {
                info!(deleted, "deleting all requests completed");
                Ok(deleted)
            }
            Err(e) => {
                error!(error = %e, "deleting all requests failed");
                Err(e)
            }
        }
    }

    fn delete_all_inner(&self) -> Result<u64> {
        let mut conn = self.source.connection().map_err(queue_fault)?;
        let deleted = conn
            .execute(&self.statements.delete_all(), &[])
            .map_err(queue_fault)?;
        conn.commit().map_err(queue_fault)?;
        Ok(deleted)
    }
}

fn save_fault(source: SqlError) -> Error {
    Error::Save {
        source,
        request: None,
    }
}

fn respond_fault(source: SqlError) -> Error {
    Error::Response {
        request_id: None,
        source: source.into(),
    }
}

fn queue_fault(source: SqlError) -> Error {
    Error::Queue { source }
}
