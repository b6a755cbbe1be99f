//! Table naming for collections
//!
//! Collection `name` owns `<name>_versions` and `<name>_snapshots`, with the
//! name lowercased. SQLite identifiers ignore ASCII case, so names that differ
//! only in case share tables; the two suffixes differ, so names that differ
//! otherwise never do.

use crate::errors::{invalid_collection, Result};

pub const VERSIONS_SUFFIX: &str = "_versions";
pub const SNAPSHOTS_SUFFIX: &str = "_snapshots";

/// Longest accepted collection name
pub const MAX_COLLECTION_NAME_LEN: usize = 48;

/// Validated table identifiers for one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTables {
    collection: String,
    versions: String,
    snapshots: String,
}

impl CollectionTables {
    pub fn for_collection(name: &str) -> Result<Self> {
        validate_collection_name(name)?;
        let base = name.to_ascii_lowercase();
        Ok(Self {
            collection: name.to_string(),
            versions: format!("{}{}", base, VERSIONS_SUFFIX),
            snapshots: format!("{}{}", base, SNAPSHOTS_SUFFIX),
        })
    }

    /// Whether both collections resolve to the same SQLite tables
    pub fn shares_tables_with(&self, other: &CollectionTables) -> bool {
        self.versions == other.versions
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn versions(&self) -> &str {
        &self.versions
    }

    pub fn snapshots(&self) -> &str {
        &self.snapshots
    }

    /// Substitute `{versions}` / `{snapshots}` placeholders in a SQL template
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{versions}", &self.versions)
            .replace("{snapshots}", &self.snapshots)
    }
}

/// Names are interpolated into SQL as identifiers, so only `[A-Za-z_][A-Za-z0-9_]*`
/// is accepted.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err(invalid_collection(name, "collection name is empty")),
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(invalid_collection(
            name,
            "collection name must start with a letter or underscore",
        ));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid_collection(
            name,
            "collection name may only contain ASCII letters, digits and underscores",
        ));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(invalid_collection(
            name,
            &format!("collection name exceeds {} characters", MAX_COLLECTION_NAME_LEN),
        ));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(invalid_collection(name, "the sqlite_ prefix is reserved"));
    }
    Ok(())
}
