use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use sea_orm::{DbErr, SqlErr};

use super::GraphError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoreErrorKind {
    NotFound,
    Validation,
    Conflict,
    Unavailable,
    Internal,
}

/// Error returned by remote persistence and the services behind it.
#[derive(Debug)]
pub struct CoreError {
    kind: CoreErrorKind,
    message: String,
    fields: Option<BTreeMap<String, String>>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: None,
            source: None,
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("entity".to_string(), entity.into());
        fields.insert("id".to_string(), id.into());

        Self::new(CoreErrorKind::NotFound, "Resource not found").with_fields(fields)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Conflict, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::Internal, message)
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> CoreErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> Option<&BTreeMap<String, String>> {
        self.fields.as_ref()
    }

    /// Transient failures worth retrying. Rejections and internal faults
    /// would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        self.kind == CoreErrorKind::Unavailable
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(fields) = &self.fields {
            for (key, value) in fields {
                write!(f, " [{}={}]", key, value)?;
            }
        }
        Ok(())
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<DbErr> for CoreError {
    fn from(err: DbErr) -> Self {
        let message = format!("Database error: {}", err);
        let kind = match &err {
            DbErr::RecordNotFound(_) => CoreErrorKind::NotFound,
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => CoreErrorKind::Unavailable,
            _ => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => CoreErrorKind::Conflict,
                Some(SqlErr::ForeignKeyConstraintViolation(_)) => CoreErrorKind::Validation,
                // SQLite reports lock contention as a plain execution error
                _ if message.contains("database is locked") => CoreErrorKind::Unavailable,
                _ => CoreErrorKind::Internal,
            },
        };
        CoreError::new(kind, message).with_source(err)
    }
}

impl From<GraphError> for CoreError {
    fn from(err: GraphError) -> Self {
        let kind = if err.is_not_found() {
            CoreErrorKind::NotFound
        } else if err.is_duplicate() {
            CoreErrorKind::Conflict
        } else {
            CoreErrorKind::Validation
        };
        CoreError::new(kind, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_includes_fields() {
        let err = CoreError::not_found("FaultTreeNode", "n1");
        assert_eq!(err.kind(), CoreErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            "NotFound: Resource not found [entity=FaultTreeNode] [id=n1]"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_graph_error_conversion() {
        let err: CoreError = GraphError::NodeNotFound("n2".to_string()).into();
        assert_eq!(err.kind(), CoreErrorKind::NotFound);

        let err: CoreError = GraphError::SelfLoop("n2".to_string()).into();
        assert_eq!(err.kind(), CoreErrorKind::Validation);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_unavailable_is_retryable() {
        assert!(CoreError::unavailable("connection reset").is_retryable());
        assert!(!CoreError::validation("bad id").is_retryable());
        assert!(!CoreError::internal("metadata encoding").is_retryable());
    }

    #[test]
    fn test_db_errors_are_classified() {
        let err: CoreError = DbErr::RecordNotFound("fault_tree_nodes".to_string()).into();
        assert_eq!(err.kind(), CoreErrorKind::NotFound);
        assert!(!err.is_retryable());

        let err: CoreError = DbErr::Custom("column type mismatch".to_string()).into();
        assert_eq!(err.kind(), CoreErrorKind::Internal);
        assert!(!err.is_retryable());

        let err: CoreError = GraphError::DuplicateEdge("e1".to_string()).into();
        assert_eq!(err.kind(), CoreErrorKind::Conflict);
    }
}
