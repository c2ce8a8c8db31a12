//! Error types for the fault-tree editing core
//!
//! Two layers of errors exist:
//!
//! - **GraphError**: local invariant violations raised by the optimistic store
//!   (missing nodes, dangling edges, duplicate ids). These never leave the
//!   device; undo/redo turns them into skipped commands.
//! - **CoreError**: failures of remote persistence and the services behind it,
//!   categorised by [`CoreErrorKind`] so the sync layer can decide whether a
//!   call is worth retrying.
//!
//! # Examples
//!
//! ```rust
//! use fta::errors::{CoreError, GraphError};
//!
//! fn reserve_node(taken: &[&str], id: &str) -> Result<String, GraphError> {
//!     if taken.contains(&id) {
//!         return Err(GraphError::DuplicateNode(id.to_string()));
//!     }
//!     Ok(id.to_string())
//! }
//!
//! let err: CoreError = reserve_node(&["n1"], "n1").unwrap_err().into();
//! assert!(!err.is_retryable());
//! ```

pub mod core_error;
pub mod graph;

pub use core_error::{CoreError, CoreErrorKind};
pub use graph::GraphError;

/// Result type alias for local graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for remote persistence and service operations
pub type CoreResult<T> = Result<T, CoreError>;
