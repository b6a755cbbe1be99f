//! Read path: latest version, current snapshot, timeline, and streamed bulk reads

use super::model::{from_micros, until_from_micros, Snapshot, Version};
use super::{Options, Store};
use crate::context::{sqlite_error, InterruptGuard};
use crate::cursor::{Cursor, PageQuery};
use crate::errors::{serialization, ErrorKind, Result, StoreError};
use crate::log_op_start;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::time::Instant;

/// Raw snapshot row before payload decoding
struct SnapshotRow {
    snapshot_id: i64,
    id: String,
    data: String,
    date_from: i64,
    date_until: i64,
}

impl SnapshotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            snapshot_id: row.get(0)?,
            id: row.get(1)?,
            data: row.get(2)?,
            date_from: row.get(3)?,
            date_until: row.get(4)?,
        })
    }

    fn decode<T: DeserializeOwned>(self, op: &str) -> Result<Snapshot<T>> {
        Ok(Snapshot {
            snapshot_id: self.snapshot_id,
            data: decode(op, &self.data)?,
            id: self.id,
            date_from: from_micros(self.date_from)?,
            date_until: until_from_micros(self.date_until)?,
        })
    }
}

struct VersionRow {
    version_id: i64,
    affinity_id: String,
    id: String,
    data: String,
    date_created: i64,
    snapshot_id: Option<i64>,
}

impl VersionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            version_id: row.get(0)?,
            affinity_id: row.get(1)?,
            id: row.get(2)?,
            data: row.get(3)?,
            date_created: row.get(4)?,
            snapshot_id: row.get(5)?,
        })
    }

    fn decode<T: DeserializeOwned>(self, op: &str) -> Result<Version<T>> {
        Ok(Version {
            version_id: self.version_id,
            data: decode(op, &self.data)?,
            affinity_id: self.affinity_id,
            id: self.id,
            date_created: from_micros(self.date_created)?,
            snapshot_id: self.snapshot_id,
        })
    }
}

fn decode<T: DeserializeOwned>(op: &str, data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| serialization(op, e))
}

fn not_found(what: &str) -> StoreError {
    StoreError::new(ErrorKind::NotFound).with_message(what.to_string())
}

impl Store {
    /// Latest version of `(affinity_id, id)`, promoted or not
    ///
    /// # Errors
    ///
    /// - `NotFound`: the affinity never wrote a version of `id`
    /// - `Serialization`: the stored payload does not decode as `T`
    pub fn get_version<T: DeserializeOwned>(
        &self,
        affinity_id: &str,
        id: &str,
        opts: &Options<'_>,
    ) -> Result<T> {
        let started = Instant::now();
        log_op_start!(
            "get_version",
            collection = self.collection(),
            entity_id = id,
            affinity_id = affinity_id
        );
        let result = self.latest_version(affinity_id, id, opts).and_then(|row| {
            row.ok_or_else(|| not_found(&format!("no version for affinity '{}'", affinity_id)))?
                .decode::<T>("get_version")
                .map(|version| version.data)
        });
        self.finish("get_version", Some(id), started, result)
    }

    fn latest_version(
        &self,
        affinity_id: &str,
        id: &str,
        opts: &Options<'_>,
    ) -> Result<Option<VersionRow>> {
        let ctx = opts.context();
        let conn = self.conn(opts)?;
        let _guard = InterruptGuard::arm(&conn, ctx);
        conn.prepare_cached(&self.sql.latest_version)
            .and_then(|mut stmt| {
                stmt.query_row(params![affinity_id, id], VersionRow::from_row)
                    .optional()
            })
            .map_err(|e| sqlite_error(ctx, "get_version", e))
    }

    /// Payload of the current snapshot of `id`
    ///
    /// # Errors
    ///
    /// - `NotFound`: `id` was never promoted
    pub fn get<T: DeserializeOwned>(&self, id: &str, opts: &Options<'_>) -> Result<T> {
        let started = Instant::now();
        log_op_start!("get", collection = self.collection(), entity_id = id);
        let result = self
            .current_snapshot::<T>(id, opts, "get")
            .map(|snapshot| snapshot.data);
        self.finish("get", Some(id), started, result)
    }

    /// The current snapshot of `id` with its metadata
    pub fn get_snapshot<T: DeserializeOwned>(
        &self,
        id: &str,
        opts: &Options<'_>,
    ) -> Result<Snapshot<T>> {
        let started = Instant::now();
        log_op_start!("get_snapshot", collection = self.collection(), entity_id = id);
        let result = self.current_snapshot(id, opts, "get_snapshot");
        self.finish("get_snapshot", Some(id), started, result)
    }

    fn current_snapshot<T: DeserializeOwned>(
        &self,
        id: &str,
        opts: &Options<'_>,
        op: &'static str,
    ) -> Result<Snapshot<T>> {
        let ctx = opts.context();
        let conn = self.conn(opts)?;
        let _guard = InterruptGuard::arm(&conn, ctx);
        conn.prepare_cached(&self.sql.current_snapshot)
            .and_then(|mut stmt| stmt.query_row(params![id], SnapshotRow::from_row).optional())
            .map_err(|e| sqlite_error(ctx, op, e))?
            .ok_or_else(|| not_found("no current snapshot"))?
            .decode(op)
    }

    /// Payload of the snapshot of `id` that was current at `at`
    ///
    /// # Errors
    ///
    /// - `NotFound`: `at` precedes the first promotion of `id`
    pub fn get_at<T: DeserializeOwned>(
        &self,
        id: &str,
        at: DateTime<Utc>,
        opts: &Options<'_>,
    ) -> Result<T> {
        let started = Instant::now();
        log_op_start!(
            "get_at",
            collection = self.collection(),
            entity_id = id,
            at = %at
        );
        let result = self
            .snapshot_at::<T>(id, at, opts)
            .map(|snapshot| snapshot.data);
        self.finish("get_at", Some(id), started, result)
    }

    /// Snapshot timeline of `id`, oldest first
    ///
    /// Intervals are contiguous: each closed snapshot's `date_until` equals the
    /// next snapshot's `date_from`. Empty if `id` was never promoted.
    pub fn history<T: DeserializeOwned>(
        &self,
        id: &str,
        opts: &Options<'_>,
    ) -> Result<Vec<Snapshot<T>>> {
        let started = Instant::now();
        log_op_start!("history", collection = self.collection(), entity_id = id);
        let result = self.snapshot_history(id, opts);
        self.finish("history", Some(id), started, result)
    }

    /// Every version of `id` across all affinities, oldest first
    pub fn versions<T: DeserializeOwned>(
        &self,
        id: &str,
        opts: &Options<'_>,
    ) -> Result<Vec<Version<T>>> {
        let started = Instant::now();
        log_op_start!("versions", collection = self.collection(), entity_id = id);
        let result = self.version_rows(id, opts);
        self.finish("versions", Some(id), started, result)
    }

    /// Stream the current snapshot payload of each id in `ids`
    ///
    /// Ids without a current snapshot are absent from the stream. No order is
    /// promised beyond storage order.
    pub fn get_by_id<'a, T, S>(&self, ids: &[S], opts: &Options<'a>) -> Result<Cursor<'a, T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        let started = Instant::now();
        log_op_start!("get_by_id", collection = self.collection(), ids = ids.len());
        let result = self.by_id_cursor(ids, opts);
        self.finish("get_by_id", None, started, result)
    }

    /// Stream the current snapshot payload of every entity in the collection
    pub fn get_all<'a, T: DeserializeOwned>(&self, opts: &Options<'a>) -> Result<Cursor<'a, T>> {
        let started = Instant::now();
        log_op_start!("get_all", collection = self.collection());
        let result = self.open_cursor(PageQuery::new(self.sql.page_all_current.clone()), opts);
        self.finish("get_all", None, started, result)
    }
}

impl Store {
    fn snapshot_at<T: DeserializeOwned>(
        &self,
        id: &str,
        at: DateTime<Utc>,
        opts: &Options<'_>,
    ) -> Result<Snapshot<T>> {
        let ctx = opts.context();
        let conn = self.conn(opts)?;
        let _guard = InterruptGuard::arm(&conn, ctx);
        conn.prepare_cached(&self.sql.snapshot_at)
            .and_then(|mut stmt| {
                stmt.query_row(params![id, at.timestamp_micros()], SnapshotRow::from_row)
                    .optional()
            })
            .map_err(|e| sqlite_error(ctx, "get_at", e))?
            .ok_or_else(|| not_found(&format!("no snapshot current at {}", at)))?
            .decode("get_at")
    }

    fn snapshot_history<T: DeserializeOwned>(
        &self,
        id: &str,
        opts: &Options<'_>,
    ) -> Result<Vec<Snapshot<T>>> {
        let ctx = opts.context();
        let conn = self.conn(opts)?;
        let _guard = InterruptGuard::arm(&conn, ctx);
        let rows = conn
            .prepare_cached(&self.sql.snapshot_history)
            .and_then(|mut stmt| {
                stmt.query_map(params![id], SnapshotRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| sqlite_error(ctx, "history", e))?;
        rows.into_iter().map(|row| row.decode("history")).collect()
    }

    fn version_rows<T: DeserializeOwned>(
        &self,
        id: &str,
        opts: &Options<'_>,
    ) -> Result<Vec<Version<T>>> {
        let ctx = opts.context();
        let conn = self.conn(opts)?;
        let _guard = InterruptGuard::arm(&conn, ctx);
        let rows = conn
            .prepare_cached(&self.sql.versions_of)
            .and_then(|mut stmt| {
                stmt.query_map(params![id], VersionRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| sqlite_error(ctx, "versions", e))?;
        rows.into_iter().map(|row| row.decode("versions")).collect()
    }

    fn by_id_cursor<'a, T, S>(&self, ids: &[S], opts: &Options<'a>) -> Result<Cursor<'a, T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        if ids.is_empty() {
            return Ok(Cursor::empty());
        }
        let ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
        let ids_json = serde_json::to_string(&ids).map_err(|e| serialization("get_by_id", e))?;
        let query = PageQuery::new(self.sql.page_current_by_id.clone()).with_ids(ids_json);
        self.open_cursor(query, opts)
    }

    fn open_cursor<'a, T: DeserializeOwned>(
        &self,
        query: PageQuery,
        opts: &Options<'a>,
    ) -> Result<Cursor<'a, T>> {
        let conn = self.conn(opts)?;
        Cursor::open(conn, query, self.batch_size, opts.context().cloned())
    }
}
