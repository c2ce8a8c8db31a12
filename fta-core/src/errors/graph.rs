//! Local graph error types
//!
//! These errors describe invariant violations against the optimistic store:
//! a command that targets an entity that no longer exists, or one that adds
//! an id the graph already holds.
//!
//! # Examples
//!
//! ```rust
//! use fta::errors::GraphError;
//!
//! let err = GraphError::NodeNotFound("n1".to_string());
//! assert!(err.is_not_found());
//!
//! let err = GraphError::SelfLoop("n1".to_string());
//! assert!(err.is_client_error());
//! ```

use thiserror::Error;

/// Errors raised by primitive mutations on the local fault-tree graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Node not found by identifier
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// Edge not found by identifier
    #[error("Edge '{0}' not found")]
    EdgeNotFound(String),

    /// Edge endpoint refers to a node that is not in the graph
    #[error("Edge '{edge}' references missing node '{node}'")]
    DanglingEdge {
        /// Edge identifier
        edge: String,
        /// Missing endpoint identifier
        node: String,
    },

    /// Edge connects a node to itself
    #[error("Edge on node '{0}' would create a self-loop")]
    SelfLoop(String),

    /// A node with this identifier is already in the graph
    #[error("Node '{0}' already exists")]
    DuplicateNode(String),

    /// An edge with this identifier is already in the graph
    #[error("Edge '{0}' already exists")]
    DuplicateEdge(String),

    /// Validation failed
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl GraphError {
    /// Check if this is a client error (400-series)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GraphError::DanglingEdge { .. }
                | GraphError::SelfLoop(_)
                | GraphError::DuplicateNode(_)
                | GraphError::DuplicateEdge(_)
                | GraphError::Validation(_)
        )
    }

    /// Check if the error reports an identifier that is already taken
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            GraphError::DuplicateNode(_) | GraphError::DuplicateEdge(_)
        )
    }

    /// Check if this is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GraphError::NodeNotFound(_) | GraphError::EdgeNotFound(_)
        )
    }

    /// Stable error code for API and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            GraphError::NodeNotFound(_) | GraphError::EdgeNotFound(_) => "NOT_FOUND",
            GraphError::DanglingEdge { .. } | GraphError::SelfLoop(_) => "INVALID_STRUCTURE",
            GraphError::DuplicateNode(_) | GraphError::DuplicateEdge(_) => "DUPLICATE_ID",
            GraphError::Validation(_) => "VALIDATION_FAILED",
        }
    }
}
