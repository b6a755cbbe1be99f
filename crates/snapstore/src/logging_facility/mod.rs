//! Logging facility
//!
//! Op-lifecycle macros (`log_op_start!`, `log_op_end!`, `log_op_error!`), subscriber
//! initialization profiles, and an in-memory capture layer for test assertions.

pub mod init;
pub mod macros;
pub mod schema;
pub mod test_capture;

pub use init::{init, Profile};
