//! The engine for one named collection
//!
//! A [`Store`] owns the collection's version log and snapshot log:
//!
//! - `add_version` appends an immutable version for `(affinity_id, id)`
//! - `add_snapshot` promotes the caller's latest version to the current
//!   snapshot, closing the previous one in the same transaction
//! - `get_version`, `get`, `get_by_id`, `get_all` read the latest version or
//!   the current snapshots
//! - `get_snapshot`, `get_at`, `history`, `versions` expose the bitemporal
//!   timeline and the audit trail
//!
//! Payloads are any `Serialize`/`DeserializeOwned` type, stored as JSON text.

mod model;
mod read;
mod sql;
mod write;

pub use model::{
    Conflict, Promoted, Promotion, Snapshot, SnapshotId, Strategy, Version, VersionId,
    INFINITY_MICROS,
};

use crate::context::Context;
use crate::db::{self, Conn, Pool};
use crate::errors::{Result, StoreError};
use crate::tables::CollectionTables;
use crate::{context, log_op_end, log_op_error};
use rusqlite::Transaction;
use sql::Statements;
use std::sync::Arc;
use std::time::Instant;

/// Per-call options: an optional context and an optional open transaction
///
/// With a transaction, the operation joins it and never commits or rolls back
/// on its own; the transaction's owner decides. Without one, the operation
/// checks a connection out of the pool for its duration.
#[derive(Clone, Copy, Default)]
pub struct Options<'a> {
    ctx: Option<&'a Context>,
    tx: Option<&'a Transaction<'a>>,
}

impl<'a> Options<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, ctx: &'a Context) -> Self {
        self.ctx = Some(ctx);
        self
    }

    pub fn with_transaction(mut self, tx: &'a Transaction<'a>) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn context(&self) -> Option<&'a Context> {
        self.ctx
    }

    pub fn transaction(&self) -> Option<&'a Transaction<'a>> {
        self.tx
    }
}

impl std::fmt::Debug for Options<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("ctx", &self.ctx)
            .field("in_transaction", &self.tx.is_some())
            .finish()
    }
}

/// Versioned snapshot store for one collection
#[derive(Clone)]
pub struct Store {
    tables: Arc<CollectionTables>,
    sql: Arc<Statements>,
    pool: Pool,
    batch_size: u32,
}

impl Store {
    pub(crate) fn new(pool: Pool, tables: CollectionTables, batch_size: u32) -> Self {
        let sql = Statements::render(&tables);
        Self {
            tables: Arc::new(tables),
            sql: Arc::new(sql),
            pool,
            batch_size,
        }
    }

    pub fn collection(&self) -> &str {
        self.tables.collection()
    }

    pub fn tables(&self) -> &CollectionTables {
        &self.tables
    }

    /// The caller's transaction, or a pooled connection for this call only
    fn conn<'a>(&self, opts: &Options<'a>) -> Result<Conn<'a>> {
        match opts.transaction() {
            Some(tx) => {
                context::check(opts.context())?;
                Ok(Conn::Borrowed(tx))
            }
            None => Ok(Conn::Pooled(db::checkout(&self.pool, opts.context())?)),
        }
    }

    /// Emit the end event for an operation and attach context to its error
    fn finish<T>(
        &self,
        op: &'static str,
        entity_id: Option<&str>,
        started: Instant,
        result: Result<T>,
    ) -> Result<T> {
        let duration_ms = started.elapsed().as_millis() as u64;
        let entity = entity_id.unwrap_or("");
        match result {
            Ok(value) => {
                log_op_end!(
                    op,
                    duration_ms = duration_ms,
                    collection = self.collection(),
                    entity_id = entity
                );
                Ok(value)
            }
            Err(err) => {
                let err: StoreError = err.fill_context(op, self.collection(), entity_id);
                log_op_error!(
                    op,
                    &err,
                    duration_ms = duration_ms,
                    collection = self.collection(),
                    entity_id = entity
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("collection", &self.collection())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
