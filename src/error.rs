use thiserror::Error;

/// Errors returned by the closure-table APIs.
#[derive(Debug, Error)]
pub enum ClosureTableError {
    #[error("move not possible: {0}")]
    MoveNotPossible(String),

    #[error("operation requires two distinct nodes: {0}")]
    SameNode(String),

    #[error("delete not possible: {0}")]
    DeleteNotPossible(String),

    #[error("duplicate closure edge: {0}")]
    DuplicateEdge(String),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("closure-table invariant violation: {0}")]
    Invariant(String),
}

impl ClosureTableError {
    pub fn move_not_possible(detail: impl Into<String>) -> Self {
        Self::MoveNotPossible(detail.into())
    }

    pub fn same_node(detail: impl Into<String>) -> Self {
        Self::SameNode(detail.into())
    }

    pub fn delete_not_possible(detail: impl Into<String>) -> Self {
        Self::DeleteNotPossible(detail.into())
    }

    pub fn duplicate_edge(detail: impl Into<String>) -> Self {
        Self::DuplicateEdge(detail.into())
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::Invariant(detail.into())
    }
}
