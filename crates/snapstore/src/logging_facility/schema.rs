//! Canonical field keys and event names for structured logging

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Entity identifiers
pub const FIELD_COLLECTION: &str = "collection";
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_AFFINITY_ID: &str = "affinity_id";
pub const FIELD_SNAPSHOT_ID: &str = "snapshot_id";
pub const FIELD_VERSION_ID: &str = "version_id";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
