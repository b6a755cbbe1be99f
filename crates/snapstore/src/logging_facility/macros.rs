//! Canonical logging macros
//!
//! Every store operation emits exactly one `start` event and exactly one of
//! `end` / `end_error`.

/// Log the start of an operation
///
/// # Example
///
/// ```
/// # use snapstore::log_op_start;
/// log_op_start!("add_version");
/// log_op_start!("add_version", collection = "widgets", entity_id = "W1");
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::debug!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// # Example
///
/// ```
/// # use snapstore::log_op_end;
/// log_op_end!("add_version", duration_ms = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log an operation error
///
/// `$err` must be a `&StoreError`.
///
/// # Example
///
/// ```
/// # use snapstore::log_op_error;
/// # use snapstore::errors::{ErrorKind, StoreError};
/// let err = StoreError::new(ErrorKind::NotFound);
/// log_op_error!("get", &err, duration_ms = 1);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let store_err: &$crate::errors::StoreError = $err;
        tracing::warn!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?store_err.kind(),
            err.code = store_err.code(),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let store_err: &$crate::errors::StoreError = $err;
        tracing::warn!(
            component = module_path!(),
            op = $op,
            event = $crate::logging_facility::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?store_err.kind(),
            err.code = store_err.code(),
            $($field)*
        );
    }};
}
