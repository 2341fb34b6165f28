use thiserror::Error;

/// Hierarchy engine error types
#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("Department not found: {0}")]
    NotFound(String),

    #[error("Department is inactive: {0}")]
    InactiveParent(String),

    #[error("Move would create a cycle: {0}")]
    CyclicMove(String),

    #[error("Path encoding failed: {0}")]
    Encoding(String),

    #[error("Path decoding failed: {0}")]
    Decoding(String),

    #[error("Lock contention: {0}")]
    Concurrency(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    #[error("Config error: {0}")]
    Config(String),
}

impl HierarchyError {
    /// Whether the caller may retry the operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, HierarchyError::Concurrency(_))
    }

    /// Whether the error indicates corrupted path data rather than bad input
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            HierarchyError::Encoding(_) | HierarchyError::Decoding(_)
        )
    }
}

/// Result type alias for the hierarchy engine
pub type HierarchyResult<T> = Result<T, HierarchyError>;

/// Helper trait for converting Option to HierarchyError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> HierarchyResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> HierarchyResult<T> {
        self.ok_or_else(|| HierarchyError::NotFound(msg.into()))
    }
}

/// Helper to convert anyhow errors from the config boundary
impl From<anyhow::Error> for HierarchyError {
    fn from(err: anyhow::Error) -> Self {
        HierarchyError::Config(err.to_string())
    }
}
