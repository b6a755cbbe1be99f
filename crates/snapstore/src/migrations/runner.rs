//! Migration runner
//!
//! Applies the embedded templates for one collection, each in its own
//! `IMMEDIATE` transaction, recording `<collection>/<migration id>` and the
//! checksum of the rendered SQL.

use crate::errors::{checksum_mismatch, from_rusqlite, migration_error, Result};
use crate::migrations::checksums::compute_checksum;
use crate::migrations::embedded::get_migrations;
use crate::tables::CollectionTables;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

pub const SCHEMA_VERSION_TABLE: &str = "schema_version";

/// Apply all pending migrations for a collection
pub fn apply_collection_migrations(conn: &mut Connection, tables: &CollectionTables) -> Result<()> {
    create_schema_version_table(conn)?;

    for migration in get_migrations() {
        // Keyed by the lowercased name, matching the tables it provisions
        let migration_id = format!(
            "{}/{}",
            tables.collection().to_ascii_lowercase(),
            migration.id
        );
        let sql = tables.render(migration.sql);
        apply_migration(conn, &migration_id, &sql)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist
fn create_schema_version_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY,
            migration_id TEXT NOT NULL UNIQUE,
            applied_at INTEGER NOT NULL,
            checksum TEXT NOT NULL
        )",
        [],
    )
    .map_err(from_rusqlite)?;

    Ok(())
}

/// Apply a single migration if not already applied
fn apply_migration(conn: &mut Connection, migration_id: &str, sql: &str) -> Result<()> {
    let checksum = compute_checksum(sql);

    // IMMEDIATE so two processes provisioning the same collection serialize
    // on the applied check instead of racing past it.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(from_rusqlite)?;

    let recorded: Option<String> = tx
        .query_row(
            "SELECT checksum FROM schema_version WHERE migration_id = ?1",
            [migration_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_rusqlite)?;

    if let Some(recorded) = recorded {
        if recorded != checksum {
            return Err(checksum_mismatch(migration_id, &recorded, &checksum));
        }
        return Ok(());
    }

    tx.execute_batch(sql)
        .map_err(|e| migration_error(migration_id, &e.to_string()))?;

    let now = chrono::Utc::now().timestamp();
    tx.execute(
        "INSERT INTO schema_version (migration_id, applied_at, checksum) VALUES (?1, ?2, ?3)",
        rusqlite::params![migration_id, now, checksum],
    )
    .map_err(from_rusqlite)?;

    tx.commit().map_err(from_rusqlite)?;

    tracing::info!(migration_id = %migration_id, "Applied migration");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn widgets() -> CollectionTables {
        CollectionTables::for_collection("widgets").unwrap()
    }

    #[test]
    fn test_apply_migrations() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_collection_migrations(&mut conn, &widgets()).unwrap();

        let applied: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM schema_version WHERE migration_id LIKE 'widgets/%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(applied as usize, get_migrations().len());
    }

    #[test]
    fn test_idempotency() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_collection_migrations(&mut conn, &widgets()).unwrap();
        apply_collection_migrations(&mut conn, &widgets()).unwrap();
    }

    #[test]
    fn test_collections_are_independent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_collection_migrations(&mut conn, &widgets()).unwrap();
        let gadgets = CollectionTables::for_collection("gadgets").unwrap();
        apply_collection_migrations(&mut conn, &gadgets).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('widgets_versions', 'widgets_snapshots',
                              'gadgets_versions', 'gadgets_snapshots')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_collection_migrations(&mut conn, &widgets()).unwrap();
        conn.execute(
            "UPDATE schema_version SET checksum = 'tampered'
             WHERE migration_id = 'widgets/001_collection_logs'",
            [],
        )
        .unwrap();

        let err = apply_collection_migrations(&mut conn, &widgets()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }
}
