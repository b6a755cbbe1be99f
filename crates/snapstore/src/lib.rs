//! Snapstore - versioned snapshot store over SQLite
//!
//! Provides:
//! - Per-collection append-only version logs keyed by writer affinity
//! - Bitemporal snapshot logs with exactly one current snapshot per entity
//! - Optimistic promotion with `Mine` / `Abort` conflict strategies
//! - Lazy paginated cursors for bulk reads
//! - Caller-scoped transactions, cancellation and deadlines
//! - Embedded per-collection migrations with checksum verification

pub mod client;
pub mod config;
pub mod context;
pub mod cursor;
pub mod db;
pub mod errors;
pub mod logging_facility;
pub mod migrations;
pub mod store;
pub mod tables;

// Re-export key types
pub use client::{Client, DEFAULT_BATCH_SIZE};
pub use config::{ClientConfig, JournalMode};
pub use context::Context;
pub use cursor::Cursor;
pub use db::Pool;
pub use errors::{ErrorKind, Result, StoreError};
pub use store::{
    Conflict, Options, Promoted, Promotion, Snapshot, SnapshotId, Store, Strategy, Version,
    VersionId, INFINITY_MICROS,
};
