//! Database connection management
//!
//! Every connection in the pool gets the same pragmas: foreign keys on, a busy
//! timeout so concurrent writers queue instead of failing, and the configured
//! journal mode (WAL by default).

use crate::config::{ClientConfig, JournalMode};
use crate::context::{self, sqlite_error, Context};
use crate::errors::{from_pool, from_rusqlite, Result};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::ops::Deref;
use std::time::{Duration, Instant};

/// Longest single busy wait before the context is polled again
const BUSY_POLL: Duration = Duration::from_millis(20);

/// Shared SQLite connection pool
pub type Pool = r2d2::Pool<SqliteConnectionManager>;

/// A connection checked out of the [`Pool`]
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Build a connection pool for the configured database file
pub fn open_pool(config: &ClientConfig) -> Result<Pool> {
    config.validate()?;
    let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
    let journal_mode = config.journal_mode;
    let manager = SqliteConnectionManager::file(&config.path)
        .with_init(move |conn: &mut Connection| configure(conn, busy_timeout, journal_mode));

    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .build(manager)
        .map_err(from_pool)?;

    tracing::debug!(
        path = %config.path.display(),
        pool_size = config.pool_size,
        journal_mode = journal_mode.as_str(),
        "Opened connection pool"
    );

    Ok(pool)
}

/// Configure a connection with the store's pragmas
pub fn configure(
    conn: &Connection,
    busy_timeout: Duration,
    journal_mode: JournalMode,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    // journal_mode answers with the mode actually in effect
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", journal_mode.as_str(), |row| {
            row.get(0)
        })?;
    Ok(())
}

/// Check a connection out of the pool, bounded by the context's deadline
pub(crate) fn checkout(pool: &Pool, ctx: Option<&Context>) -> Result<PooledConnection> {
    context::check(ctx)?;
    let result = match ctx.and_then(Context::remaining) {
        Some(remaining) => pool.get_timeout(remaining),
        None => pool.get(),
    };
    result.map_err(|e| {
        context::check(ctx)
            .err()
            .map(|ctx_err| ctx_err.with_op("pool_get"))
            .unwrap_or_else(|| from_pool(e))
    })
}

/// Begin an `IMMEDIATE` transaction, waiting for the write lock
///
/// SQLite's busy handler never sees the context, so with a context the wait
/// is split into short slices and the context is checked between them. The
/// total wait stays bounded by the connection's configured busy timeout.
pub(crate) fn begin_immediate<'c>(
    conn: &'c Connection,
    ctx: Option<&Context>,
    op: &str,
) -> Result<Transaction<'c>> {
    let ctx = match ctx {
        Some(ctx) => ctx,
        None => {
            return Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
                .map_err(|e| from_rusqlite(e).with_op(op.to_string()))
        }
    };

    let configured = busy_timeout(conn).map_err(|e| sqlite_error(Some(ctx), op, e))?;
    let result = acquire_write_lock(conn, ctx, Instant::now() + configured, op);
    if let Err(e) = conn.busy_timeout(configured) {
        tracing::warn!(error = %e, op = op, "Failed to restore busy timeout");
    }
    result
}

fn acquire_write_lock<'c>(
    conn: &'c Connection,
    ctx: &Context,
    give_up: Instant,
    op: &str,
) -> Result<Transaction<'c>> {
    loop {
        ctx.check().map_err(|e| e.with_op(op.to_string()))?;
        let mut slice = BUSY_POLL.min(give_up.saturating_duration_since(Instant::now()));
        if let Some(remaining) = ctx.remaining() {
            slice = slice.min(remaining);
        }
        conn.busy_timeout(slice)
            .map_err(|e| sqlite_error(Some(ctx), op, e))?;

        match Transaction::new_unchecked(conn, TransactionBehavior::Immediate) {
            Ok(tx) => return Ok(tx),
            Err(e) if is_busy(&e) && Instant::now() < give_up => continue,
            Err(e) => return Err(sqlite_error(Some(ctx), op, e)),
        }
    }
}

fn busy_timeout(conn: &Connection) -> rusqlite::Result<Duration> {
    let millis: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?;
    Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Either a connection owned for one operation or a caller's transaction
pub(crate) enum Conn<'a> {
    Pooled(PooledConnection),
    Borrowed(&'a Connection),
}

impl Deref for Conn<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Conn::Pooled(conn) => conn,
            Conn::Borrowed(conn) => conn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_configure_sets_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("pragmas.db")).unwrap();
        configure(&conn, Duration::from_millis(1234), JournalMode::Wal).unwrap();

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let busy: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(busy, 1234);
    }

    #[test]
    fn test_checkout_respects_cancelled_context() {
        let temp_dir = TempDir::new().unwrap();
        let pool = open_pool(&ClientConfig::with_path(temp_dir.path().join("p.db"))).unwrap();
        let ctx = Context::background();
        ctx.cancel();
        let err = checkout(&pool, Some(&ctx)).err().unwrap();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Cancelled);
    }

    fn locked_pair(dir: &TempDir) -> (Connection, Connection) {
        let path = dir.path().join("lock.db");
        let holder = Connection::open(&path).unwrap();
        configure(&holder, Duration::from_millis(5000), JournalMode::Wal).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();
        let waiter = Connection::open(&path).unwrap();
        configure(&waiter, Duration::from_millis(5000), JournalMode::Wal).unwrap();
        (holder, waiter)
    }

    #[test]
    fn test_begin_immediate_gives_up_at_deadline() {
        let temp_dir = TempDir::new().unwrap();
        let (_holder, waiter) = locked_pair(&temp_dir);

        let ctx = Context::with_timeout(Duration::from_millis(100));
        let started = Instant::now();
        let err = begin_immediate(&waiter, Some(&ctx), "begin").err().unwrap();
        assert_eq!(err.kind(), crate::errors::ErrorKind::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(2));

        // The configured timeout is back in place afterwards
        assert_eq!(busy_timeout(&waiter).unwrap(), Duration::from_millis(5000));
    }

    #[test]
    fn test_begin_immediate_observes_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        let (_holder, waiter) = locked_pair(&temp_dir);

        let ctx = Context::background();
        let canceller = ctx.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        let started = Instant::now();
        let err = begin_immediate(&waiter, Some(&ctx), "begin").err().unwrap();
        handle.join().unwrap();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_begin_immediate_waits_for_released_lock() {
        let temp_dir = TempDir::new().unwrap();
        let (holder, waiter) = locked_pair(&temp_dir);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            holder.execute_batch("COMMIT").unwrap();
        });
        let ctx = Context::with_timeout(Duration::from_secs(5));
        let tx = begin_immediate(&waiter, Some(&ctx), "begin").unwrap();
        tx.commit().unwrap();
        handle.join().unwrap();
    }
}
