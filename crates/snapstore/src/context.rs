//! Cancellation and deadlines
//!
//! A [`Context`] travels with [`Options`](crate::Options). It is checked before
//! each operation, bounds pool checkout by its remaining time, and interrupts
//! running SQLite statements through a progress handler.

use crate::errors::{from_rusqlite, ErrorKind, StoreError};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// SQLite VM instructions between cancellation polls
const PROGRESS_OPS: i32 = 1000;

/// Cancellation flag plus optional deadline
///
/// Clones share the cancellation flag, so a clone handed to another thread can
/// cancel an operation in flight.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never done unless cancelled
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Ok` while the context is live, otherwise the matching context error
    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_cancelled() {
            return Err(StoreError::new(ErrorKind::Cancelled).with_message("context cancelled"));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(
                StoreError::new(ErrorKind::DeadlineExceeded).with_message("context deadline exceeded")
            );
        }
        Ok(())
    }
}

/// Check an optional context
pub(crate) fn check(ctx: Option<&Context>) -> Result<(), StoreError> {
    ctx.map_or(Ok(()), Context::check)
}

/// Map a SQLite failure, preferring the context error when the context ended
///
/// An interrupted statement surfaces as a generic SQLite error; reporting it as
/// `Cancelled`/`DeadlineExceeded` lets callers tell "timed out" from "failed".
pub(crate) fn sqlite_error(ctx: Option<&Context>, op: &str, err: rusqlite::Error) -> StoreError {
    match ctx.map(Context::check) {
        Some(Err(ctx_err)) => ctx_err.with_op(op.to_string()).with_source(err),
        _ => from_rusqlite(err).with_op(op.to_string()),
    }
}

/// Installs a progress handler that aborts the running statement once the
/// context is done; removes it on drop.
pub(crate) struct InterruptGuard<'c> {
    conn: &'c Connection,
    armed: bool,
}

impl<'c> InterruptGuard<'c> {
    pub(crate) fn arm(conn: &'c Connection, ctx: Option<&Context>) -> Self {
        match ctx {
            Some(ctx) => {
                let ctx = ctx.clone();
                conn.progress_handler(PROGRESS_OPS, Some(move || ctx.is_done()));
                Self { conn, armed: true }
            }
            None => Self { conn, armed: false },
        }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}
