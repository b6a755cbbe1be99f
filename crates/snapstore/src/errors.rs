//! Error facility for the snapshot store
//!
//! Every fallible operation returns [`StoreError`], a structured error carrying a
//! stable [`ErrorKind`] plus optional context (operation, collection, entity id).
//! Callers branch on [`StoreError::kind`]; the message is for humans only.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code suitable for logs, tests and
/// application-level error mapping (e.g. `Conflict` to an HTTP 409).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    // Lookup
    #[error("not found")]
    NotFound,

    // Optimistic concurrency
    #[error("conflicting promotion")]
    Conflict,
    #[error("version already promoted")]
    AlreadyPromoted,

    // Input / setup
    #[error("invalid input")]
    InvalidInput,
    #[error("invalid configuration")]
    Config,
    #[error("migration failed")]
    Migration,
    #[error("migration checksum mismatch")]
    ChecksumMismatch,

    // Integration/IO
    #[error("serialization failure")]
    Serialization,
    #[error("persistence failure")]
    Persistence,
    #[error("connection pool failure")]
    Pool,
    #[error("io failure")]
    Io,

    // Context
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,

    // Internal
    #[error("internal error")]
    Internal,
}

impl ErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "ERR_NOT_FOUND",
            ErrorKind::Conflict => "ERR_CONFLICT",
            ErrorKind::AlreadyPromoted => "ERR_ALREADY_PROMOTED",
            ErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ErrorKind::Config => "ERR_CONFIG",
            ErrorKind::Migration => "ERR_MIGRATION",
            ErrorKind::ChecksumMismatch => "ERR_CHECKSUM_MISMATCH",
            ErrorKind::Serialization => "ERR_SERIALIZATION",
            ErrorKind::Persistence => "ERR_PERSISTENCE",
            ErrorKind::Pool => "ERR_POOL",
            ErrorKind::Io => "ERR_IO",
            ErrorKind::Cancelled => "ERR_CANCELLED",
            ErrorKind::DeadlineExceeded => "ERR_DEADLINE_EXCEEDED",
            ErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// True for kinds raised by a cancelled or expired [`Context`](crate::Context)
    pub fn is_context(&self) -> bool {
        matches!(self, ErrorKind::Cancelled | ErrorKind::DeadlineExceeded)
    }
}

/// Canonical structured error type
#[derive(Debug)]
pub struct StoreError {
    kind: ErrorKind,
    op: Option<String>,
    collection: Option<String>,
    entity_id: Option<String>,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StoreError {
    /// Create a new error with the specified kind
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            op: None,
            collection: None,
            entity_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add collection context
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach the underlying cause
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Fill in operation context without overwriting what the origin recorded
    pub(crate) fn fill_context(
        mut self,
        op: &str,
        collection: &str,
        entity_id: Option<&str>,
    ) -> Self {
        self.op.get_or_insert_with(|| op.to_string());
        self.collection
            .get_or_insert_with(|| collection.to_string());
        if let Some(id) = entity_id {
            self.entity_id.get_or_insert_with(|| id.to_string());
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.kind)?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(collection) = &self.collection {
            write!(f, " (collection: {})", collection)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> StoreError {
    StoreError::new(ErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
        .with_source(err)
}

/// Create a pool checkout error
pub fn from_pool(err: r2d2::Error) -> StoreError {
    StoreError::new(ErrorKind::Pool)
        .with_op("pool_get")
        .with_message(err.to_string())
        .with_source(err)
}

/// Create a payload (de)serialization error
pub fn serialization(op: &str, err: serde_json::Error) -> StoreError {
    StoreError::new(ErrorKind::Serialization)
        .with_op(op.to_string())
        .with_message(err.to_string())
        .with_source(err)
}

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> StoreError {
    StoreError::new(ErrorKind::Migration)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> StoreError {
    StoreError::new(ErrorKind::ChecksumMismatch)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create an invalid collection name error
pub fn invalid_collection(name: &str, reason: &str) -> StoreError {
    StoreError::new(ErrorKind::InvalidInput)
        .with_op("register_collection")
        .with_collection(name)
        .with_message(reason.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> StoreError {
    StoreError::new(ErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let kinds = [
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::AlreadyPromoted,
            ErrorKind::InvalidInput,
            ErrorKind::Config,
            ErrorKind::Migration,
            ErrorKind::ChecksumMismatch,
            ErrorKind::Serialization,
            ErrorKind::Persistence,
            ErrorKind::Pool,
            ErrorKind::Io,
            ErrorKind::Cancelled,
            ErrorKind::DeadlineExceeded,
            ErrorKind::Internal,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_display_includes_context() {
        let err = StoreError::new(ErrorKind::NotFound)
            .with_op("get")
            .with_collection("widgets")
            .with_entity_id("W1")
            .with_message("no current snapshot");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[ERR_NOT_FOUND] not found"));
        assert!(rendered.contains("in operation 'get'"));
        assert!(rendered.contains("(collection: widgets)"));
        assert!(rendered.contains("(entity_id: W1)"));
    }

    #[test]
    fn test_source_is_exposed() {
        use std::error::Error;
        let err = from_rusqlite(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_context_kinds() {
        assert!(ErrorKind::Cancelled.is_context());
        assert!(ErrorKind::DeadlineExceeded.is_context());
        assert!(!ErrorKind::Persistence.is_context());
    }
}
