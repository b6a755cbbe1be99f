//! Write path: version append and snapshot promotion

use super::model::{
    from_micros, now_micros, Conflict, Promoted, Promotion, SnapshotId, Strategy, VersionId,
};
use super::{Options, Store};
use crate::context::{self, sqlite_error, Context, InterruptGuard};
use crate::db;
use crate::errors::{serialization, ErrorKind, Result, StoreError};
use crate::log_op_start;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::time::Instant;

/// The caller's latest version, as far as promotion needs it
struct VersionHead {
    version_id: VersionId,
    date_created: i64,
    snapshot_id: Option<SnapshotId>,
}

/// The current snapshot of an entity and who promoted it
struct CurrentHead {
    snapshot_id: SnapshotId,
    date_from: i64,
    affinity_id: Option<String>,
}

impl Store {
    /// Append a version of `id` for the writer lineage `affinity_id`
    ///
    /// The current snapshot is untouched. Returns the new `version_id`.
    ///
    /// # Errors
    ///
    /// - `Serialization`: `data` could not be encoded as JSON
    /// - `Persistence`: the insert failed
    /// - `Cancelled` / `DeadlineExceeded`: the context ended first
    pub fn add_version<T: Serialize + ?Sized>(
        &self,
        affinity_id: &str,
        id: &str,
        data: &T,
        opts: &Options<'_>,
    ) -> Result<VersionId> {
        let started = Instant::now();
        log_op_start!(
            "add_version",
            collection = self.collection(),
            entity_id = id,
            affinity_id = affinity_id
        );
        let result = self.insert_version(affinity_id, id, data, opts);
        if let Ok(version_id) = &result {
            tracing::debug!(
                collection = self.collection(),
                entity_id = id,
                version_id = *version_id,
                "Appended version"
            );
        }
        self.finish("add_version", Some(id), started, result)
    }

    fn insert_version<T: Serialize + ?Sized>(
        &self,
        affinity_id: &str,
        id: &str,
        data: &T,
        opts: &Options<'_>,
    ) -> Result<VersionId> {
        let json = serde_json::to_string(data).map_err(|e| serialization("add_version", e))?;
        let ctx = opts.context();
        if let Some(tx) = opts.transaction() {
            context::check(ctx)?;
            return self.insert_version_on(tx, ctx, affinity_id, id, &json);
        }

        // Taking the write lock up front keeps the lock wait cancellable
        let conn = db::checkout(&self.pool, ctx)?;
        let tx = db::begin_immediate(&conn, ctx, "add_version_begin")?;
        let version_id = self.insert_version_on(&tx, ctx, affinity_id, id, &json)?;
        context::check(ctx)?;
        tx.commit()
            .map_err(|e| sqlite_error(ctx, "add_version_commit", e))?;
        Ok(version_id)
    }

    fn insert_version_on(
        &self,
        conn: &Connection,
        ctx: Option<&Context>,
        affinity_id: &str,
        id: &str,
        json: &str,
    ) -> Result<VersionId> {
        let _guard = InterruptGuard::arm(conn, ctx);
        conn.prepare_cached(&self.sql.insert_version)
            .and_then(|mut stmt| stmt.execute(params![affinity_id, id, json, now_micros()]))
            .map_err(|e| sqlite_error(ctx, "add_version", e))?;
        Ok(conn.last_insert_rowid())
    }

    /// Promote the latest version of `(affinity_id, id)` to the current snapshot
    ///
    /// Closing the previous current snapshot, inserting the new one and
    /// backfilling `snapshot_id` on the version happen in one transaction:
    /// the caller's, if `opts` carries one, otherwise an `IMMEDIATE`
    /// transaction opened here so concurrent promoters serialize.
    ///
    /// Under [`Strategy::Abort`] a snapshot promoted by another affinity after
    /// the caller's latest version was written yields [`Promotion::Conflict`]
    /// and nothing is written.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no version exists for `(affinity_id, id)`
    /// - `AlreadyPromoted`: the latest version was promoted before and has
    ///   since been superseded
    /// - `Persistence`: a statement failed; the promotion was rolled back
    /// - `Cancelled` / `DeadlineExceeded`: the context ended first
    pub fn add_snapshot(
        &self,
        affinity_id: &str,
        id: &str,
        strategy: Strategy,
        opts: &Options<'_>,
    ) -> Result<Promotion> {
        let started = Instant::now();
        log_op_start!(
            "add_snapshot",
            collection = self.collection(),
            entity_id = id,
            affinity_id = affinity_id,
            strategy = strategy.as_str()
        );
        let result = self.promote(affinity_id, id, strategy, opts);
        match &result {
            Ok(Promotion::Promoted(p)) => tracing::debug!(
                collection = self.collection(),
                entity_id = id,
                snapshot_id = p.snapshot_id,
                version_id = p.version_id,
                was_duplicate = p.was_duplicate,
                "Promoted version"
            ),
            Ok(Promotion::Conflict(c)) => tracing::info!(
                collection = self.collection(),
                entity_id = id,
                affinity_id = affinity_id,
                current_snapshot_id = c.current_snapshot_id,
                "Promotion aborted by conflicting snapshot"
            ),
            Err(_) => {}
        }
        self.finish("add_snapshot", Some(id), started, result)
    }

    fn promote(
        &self,
        affinity_id: &str,
        id: &str,
        strategy: Strategy,
        opts: &Options<'_>,
    ) -> Result<Promotion> {
        let ctx = opts.context();
        if let Some(tx) = opts.transaction() {
            context::check(ctx)?;
            return self.promote_in_savepoint(tx, ctx, affinity_id, id, strategy);
        }

        let conn = db::checkout(&self.pool, ctx)?;
        let tx = db::begin_immediate(&conn, ctx, "add_snapshot_begin")?;

        // Any early return drops `tx`, which rolls back.
        let outcome = self.promote_on(&tx, ctx, affinity_id, id, strategy)?;
        if let Promotion::Promoted(promoted) = &outcome {
            if !promoted.was_duplicate {
                context::check(ctx)?;
                tx.commit()
                    .map_err(|e| sqlite_error(ctx, "add_snapshot_commit", e))?;
            }
        }
        Ok(outcome)
    }

    /// Promote inside a caller's transaction
    ///
    /// A savepoint keeps the promotion all-or-nothing even when the caller
    /// swallows the error and commits.
    fn promote_in_savepoint(
        &self,
        conn: &Connection,
        ctx: Option<&Context>,
        affinity_id: &str,
        id: &str,
        strategy: Strategy,
    ) -> Result<Promotion> {
        conn.execute_batch("SAVEPOINT add_snapshot")
            .map_err(|e| sqlite_error(ctx, "add_snapshot_savepoint", e))?;
        match self.promote_on(conn, ctx, affinity_id, id, strategy) {
            Ok(outcome) => {
                conn.execute_batch("RELEASE add_snapshot")
                    .map_err(|e| sqlite_error(ctx, "add_snapshot_release", e))?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(e) =
                    conn.execute_batch("ROLLBACK TO add_snapshot; RELEASE add_snapshot")
                {
                    tracing::warn!(error = %e, "Failed to roll back promotion savepoint");
                }
                Err(err)
            }
        }
    }

    fn promote_on(
        &self,
        conn: &Connection,
        ctx: Option<&Context>,
        affinity_id: &str,
        id: &str,
        strategy: Strategy,
    ) -> Result<Promotion> {
        let _guard = InterruptGuard::arm(conn, ctx);
        let sql_err = |e| sqlite_error(ctx, "add_snapshot", e);

        let version = conn
            .prepare_cached(&self.sql.latest_version)
            .and_then(|mut stmt| {
                stmt.query_row(params![affinity_id, id], |row| {
                    Ok(VersionHead {
                        version_id: row.get(0)?,
                        date_created: row.get(4)?,
                        snapshot_id: row.get(5)?,
                    })
                })
                .optional()
            })
            .map_err(sql_err)?
            .ok_or_else(|| {
                StoreError::new(ErrorKind::NotFound)
                    .with_message(format!("no version for affinity '{}'", affinity_id))
            })?;

        let current = conn
            .prepare_cached(&self.sql.current_head)
            .and_then(|mut stmt| {
                stmt.query_row(params![id], |row| {
                    Ok(CurrentHead {
                        snapshot_id: row.get(0)?,
                        date_from: row.get(1)?,
                        affinity_id: row.get(2)?,
                    })
                })
                .optional()
            })
            .map_err(sql_err)?;

        if strategy == Strategy::Abort {
            if let Some(head) = &current {
                let promoted_by_other = head.affinity_id.as_deref() != Some(affinity_id);
                if promoted_by_other && head.date_from >= version.date_created {
                    return Ok(Promotion::Conflict(Conflict {
                        id: id.to_string(),
                        version_id: version.version_id,
                        current_snapshot_id: head.snapshot_id,
                        current_affinity_id: head.affinity_id.clone(),
                        current_date_from: from_micros(head.date_from)?,
                    }));
                }
            }
        }

        if let Some(existing) = version.snapshot_id {
            return match &current {
                Some(head) if head.snapshot_id == existing => Ok(Promotion::Promoted(Promoted {
                    snapshot_id: existing,
                    version_id: version.version_id,
                    date_from: from_micros(head.date_from)?,
                    was_duplicate: true,
                })),
                _ => Err(StoreError::new(ErrorKind::AlreadyPromoted).with_message(format!(
                    "version {} was promoted to snapshot {} which has been superseded; append a new version",
                    version.version_id, existing
                ))),
            };
        }

        // date_from must move strictly forward even if the wall clock does not
        let mut date_from = now_micros();
        if let Some(head) = &current {
            date_from = date_from.max(head.date_from + 1);
            let closed = conn
                .prepare_cached(&self.sql.close_snapshot)
                .and_then(|mut stmt| stmt.execute(params![head.snapshot_id, date_from]))
                .map_err(sql_err)?;
            if closed != 1 {
                return Err(StoreError::new(ErrorKind::Internal).with_message(format!(
                    "current snapshot {} vanished while closing it",
                    head.snapshot_id
                )));
            }
        }

        conn.prepare_cached(&self.sql.insert_snapshot_from_version)
            .and_then(|mut stmt| stmt.execute(params![version.version_id, date_from]))
            .map_err(sql_err)?;
        let snapshot_id = conn.last_insert_rowid();

        let backfilled = conn
            .prepare_cached(&self.sql.backfill_snapshot_id)
            .and_then(|mut stmt| stmt.execute(params![snapshot_id, version.version_id]))
            .map_err(sql_err)?;
        if backfilled != 1 {
            return Err(StoreError::new(ErrorKind::Internal).with_message(format!(
                "version {} was promoted concurrently",
                version.version_id
            )));
        }

        Ok(Promotion::Promoted(Promoted {
            snapshot_id,
            version_id: version.version_id,
            date_from: from_micros(date_from)?,
            was_duplicate: false,
        }))
    }
}
