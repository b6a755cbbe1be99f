//! SQL for one collection, rendered once when the store is built

use crate::tables::CollectionTables;

const INSERT_VERSION: &str = r#"
INSERT INTO "{versions}" (affinity_id, id, data, date_created)
VALUES (?1, ?2, ?3, ?4)
"#;

const LATEST_VERSION: &str = r#"
SELECT version_id, affinity_id, id, data, date_created, snapshot_id
FROM "{versions}"
WHERE affinity_id = ?1 AND id = ?2
ORDER BY date_created DESC, version_id DESC
LIMIT 1
"#;

const VERSIONS_OF: &str = r#"
SELECT version_id, affinity_id, id, data, date_created, snapshot_id
FROM "{versions}"
WHERE id = ?1
ORDER BY date_created, version_id
"#;

/// Current snapshot of an entity and the affinity it was promoted from
const CURRENT_HEAD: &str = r#"
SELECT s.snapshot_id, s.date_from, v.affinity_id
FROM "{snapshots}" s
LEFT JOIN "{versions}" v ON v.snapshot_id = s.snapshot_id
WHERE s.id = ?1 AND s.date_until = 9223372036854775807
"#;

const CLOSE_SNAPSHOT: &str = r#"
UPDATE "{snapshots}"
SET date_until = ?2
WHERE snapshot_id = ?1 AND date_until = 9223372036854775807
"#;

/// Copies the payload verbatim from the promoted version
const INSERT_SNAPSHOT_FROM_VERSION: &str = r#"
INSERT INTO "{snapshots}" (id, data, date_from)
SELECT id, data, ?2 FROM "{versions}" WHERE version_id = ?1
"#;

const BACKFILL_SNAPSHOT_ID: &str = r#"
UPDATE "{versions}"
SET snapshot_id = ?1
WHERE version_id = ?2 AND snapshot_id IS NULL
"#;

const CURRENT_SNAPSHOT: &str = r#"
SELECT snapshot_id, id, data, date_from, date_until
FROM "{snapshots}"
WHERE id = ?1 AND date_until = 9223372036854775807
"#;

const SNAPSHOT_AT: &str = r#"
SELECT snapshot_id, id, data, date_from, date_until
FROM "{snapshots}"
WHERE id = ?1 AND date_from <= ?2 AND date_until > ?2
"#;

const SNAPSHOT_HISTORY: &str = r#"
SELECT snapshot_id, id, data, date_from, date_until
FROM "{snapshots}"
WHERE id = ?1
ORDER BY date_from
"#;

const PAGE_ALL_CURRENT: &str = r#"
SELECT snapshot_id, data
FROM "{snapshots}"
WHERE date_until = 9223372036854775807 AND snapshot_id > ?1
ORDER BY snapshot_id
LIMIT ?2
"#;

/// ?3 is a JSON array of ids
const PAGE_CURRENT_BY_ID: &str = r#"
SELECT snapshot_id, data
FROM "{snapshots}"
WHERE date_until = 9223372036854775807 AND snapshot_id > ?1
  AND id IN (SELECT value FROM json_each(?3))
ORDER BY snapshot_id
LIMIT ?2
"#;

#[derive(Debug)]
pub(crate) struct Statements {
    pub insert_version: String,
    pub latest_version: String,
    pub versions_of: String,
    pub current_head: String,
    pub close_snapshot: String,
    pub insert_snapshot_from_version: String,
    pub backfill_snapshot_id: String,
    pub current_snapshot: String,
    pub snapshot_at: String,
    pub snapshot_history: String,
    pub page_all_current: String,
    pub page_current_by_id: String,
}

impl Statements {
    pub(crate) fn render(tables: &CollectionTables) -> Self {
        Self {
            insert_version: tables.render(INSERT_VERSION),
            latest_version: tables.render(LATEST_VERSION),
            versions_of: tables.render(VERSIONS_OF),
            current_head: tables.render(CURRENT_HEAD),
            close_snapshot: tables.render(CLOSE_SNAPSHOT),
            insert_snapshot_from_version: tables.render(INSERT_SNAPSHOT_FROM_VERSION),
            backfill_snapshot_id: tables.render(BACKFILL_SNAPSHOT_ID),
            current_snapshot: tables.render(CURRENT_SNAPSHOT),
            snapshot_at: tables.render(SNAPSHOT_AT),
            snapshot_history: tables.render(SNAPSHOT_HISTORY),
            page_all_current: tables.render(PAGE_ALL_CURRENT),
            page_current_by_id: tables.render(PAGE_CURRENT_BY_ID),
        }
    }
}
