//! Forward-only cursor over current snapshot payloads
//!
//! Rows are fetched lazily in keyset-paginated batches (`snapshot_id > last`)
//! so an arbitrarily large collection never sits in memory at once. A cursor on
//! a pooled connection keeps that connection inside a read transaction, so
//! every page sees the same database snapshot; the connection goes back to the
//! pool on [`Cursor::close`], on exhaustion, or on drop.

use crate::context::{self, sqlite_error, Context, InterruptGuard};
use crate::db::Conn;
use crate::errors::{serialization, ErrorKind, Result, StoreError};
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::marker::PhantomData;

/// A paginated query: `?1` is the last seen key, `?2` the page size and, when
/// present, `?3` a JSON array of ids.
#[derive(Debug, Clone)]
pub(crate) struct PageQuery {
    sql: String,
    ids_json: Option<String>,
}

impl PageQuery {
    pub(crate) fn new(sql: String) -> Self {
        Self {
            sql,
            ids_json: None,
        }
    }

    pub(crate) fn with_ids(mut self, ids_json: String) -> Self {
        self.ids_json = Some(ids_json);
        self
    }
}

/// Lazy, single-pass sequence of decoded payloads
///
/// ```ignore
/// let mut cursor = store.get_all::<Widget>(&Options::new())?;
/// while cursor.advance() {
///     let widget = cursor.decode()?;
/// }
/// if let Some(err) = cursor.err() { /* query failed mid-stream */ }
/// cursor.close();
/// ```
pub struct Cursor<'a, T> {
    conn: Option<Conn<'a>>,
    in_read_tx: bool,
    ctx: Option<Context>,
    query: Option<PageQuery>,
    batch_size: u32,
    buffer: VecDeque<String>,
    current: Option<String>,
    last_key: i64,
    exhausted: bool,
    err: Option<StoreError>,
    _payload: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> Cursor<'a, T> {
    pub(crate) fn open(
        conn: Conn<'a>,
        query: PageQuery,
        batch_size: u32,
        ctx: Option<Context>,
    ) -> Result<Self> {
        let in_read_tx = matches!(conn, Conn::Pooled(_));
        if in_read_tx {
            conn.execute_batch("BEGIN DEFERRED")
                .map_err(|e| sqlite_error(ctx.as_ref(), "cursor_begin", e))?;
        }
        Ok(Self {
            conn: Some(conn),
            in_read_tx,
            ctx,
            query: Some(query),
            batch_size: batch_size.max(1),
            buffer: VecDeque::new(),
            current: None,
            last_key: 0,
            exhausted: false,
            err: None,
            _payload: PhantomData,
        })
    }

    /// A cursor that yields nothing
    pub(crate) fn empty() -> Self {
        Self {
            conn: None,
            in_read_tx: false,
            ctx: None,
            query: None,
            batch_size: 1,
            buffer: VecDeque::new(),
            current: None,
            last_key: 0,
            exhausted: true,
            err: None,
            _payload: PhantomData,
        }
    }

    /// Move to the next row
    ///
    /// Returns `false` once the rows are exhausted or an error was recorded;
    /// check [`Cursor::err`] afterwards.
    pub fn advance(&mut self) -> bool {
        self.current = None;
        if self.err.is_some() {
            return false;
        }
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_page() {
                self.err = Some(err);
                self.release();
                return false;
            }
        }
        match self.buffer.pop_front() {
            Some(data) => {
                self.current = Some(data);
                true
            }
            None => {
                self.release();
                false
            }
        }
    }

    /// Decode the payload of the current row
    ///
    /// Named apart from [`Iterator::scan`], which would otherwise shadow it.
    pub fn decode(&self) -> Result<T> {
        let data = self.current.as_deref().ok_or_else(|| {
            StoreError::new(ErrorKind::InvalidInput)
                .with_op("cursor_decode")
                .with_message("decode called without a current row")
        })?;
        serde_json::from_str(data).map_err(|e| serialization("cursor_decode", e))
    }

    fn fetch_page(&mut self) -> Result<()> {
        let (conn, query) = match (&self.conn, &self.query) {
            (Some(conn), Some(query)) => (conn, query),
            _ => {
                self.exhausted = true;
                return Ok(());
            }
        };
        context::check(self.ctx.as_ref())?;
        let rows = fetch_rows(conn, query, self.last_key, self.batch_size, self.ctx.as_ref())?;

        if rows.len() < self.batch_size as usize {
            self.exhausted = true;
        }
        for (key, data) in rows {
            self.last_key = key;
            self.buffer.push_back(data);
        }
        Ok(())
    }
}

impl<T> Cursor<'_, T> {
    /// The error that ended iteration, if any
    pub fn err(&self) -> Option<&StoreError> {
        self.err.as_ref()
    }

    /// Release the result set and its connection; idempotent
    pub fn close(&mut self) {
        self.current = None;
        self.release();
    }

    fn release(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
        if let Some(conn) = self.conn.take() {
            if self.in_read_tx {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %e, "Failed to end cursor read transaction");
                }
            }
        }
    }
}

fn page_row(row: &Row<'_>) -> rusqlite::Result<(i64, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn fetch_rows(
    conn: &Connection,
    query: &PageQuery,
    after: i64,
    limit: u32,
    ctx: Option<&Context>,
) -> Result<Vec<(i64, String)>> {
    let _guard = InterruptGuard::arm(conn, ctx);
    conn.prepare_cached(&query.sql)
        .and_then(|mut stmt| match &query.ids_json {
            Some(ids) => stmt
                .query_map(params![after, limit, ids], page_row)?
                .collect::<rusqlite::Result<Vec<_>>>(),
            None => stmt
                .query_map(params![after, limit], page_row)?
                .collect::<rusqlite::Result<Vec<_>>>(),
        })
        .map_err(|e| sqlite_error(ctx, "cursor_fetch", e))
}

impl<T: DeserializeOwned> Iterator for Cursor<'_, T> {
    type Item = Result<T>;

    /// Yields each decoded payload; a fetch error is yielded once and then
    /// iteration ends (the error is moved out of [`Cursor::err`]).
    fn next(&mut self) -> Option<Result<T>> {
        if self.advance() {
            Some(self.decode())
        } else {
            self.err.take().map(Err)
        }
    }
}

impl<T> Drop for Cursor<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> std::fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("open", &self.conn.is_some())
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .field("failed", &self.err.is_some())
            .finish()
    }
}
