//! Embedded SQL migrations
//!
//! Templates are embedded with `include_str!` and rendered per collection by
//! [`CollectionTables::render`](crate::tables::CollectionTables::render).

/// Migration metadata
pub struct Migration {
    pub id: &'static str,
    pub sql: &'static str,
}

/// Get all embedded migration templates in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            id: "001_collection_logs",
            sql: include_str!("../../migrations/001_collection_logs.sql"),
        },
        Migration {
            id: "002_immutability_triggers",
            sql: include_str!("../../migrations/002_immutability_triggers.sql"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_ids_are_ordered_and_unique() {
        let ids: Vec<_> = get_migrations().iter().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_templates_use_placeholders() {
        for migration in get_migrations() {
            assert!(
                migration.sql.contains("{versions}") || migration.sql.contains("{snapshots}"),
                "{} has no table placeholder",
                migration.id
            );
        }
    }
}
