//! Migration framework
//!
//! Provides:
//! - Per-collection SQL templates embedded at compile time
//! - Checksums recorded in `schema_version` to detect edited migrations
//! - Idempotent application

mod checksums;
mod embedded;
mod runner;

pub use checksums::compute_checksum;
pub use embedded::{get_migrations, Migration};
pub use runner::{apply_collection_migrations, SCHEMA_VERSION_TABLE};
