//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations. Store
//! outcomes that callers are expected to handle (missing rows, name clashes,
//! cycles, dangling references) are lifted out of `DatabaseError` into their
//! own variants.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// Service operation errors
#[derive(Error, Debug)]
pub enum OrganizationServiceError {
    /// No organization with this identifier
    #[error("No organization with id {id} exists")]
    NotFound { id: Uuid },

    /// Validation failed for the organization
    #[error("Organization validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// A uniqueness constraint rejected the write
    #[error("Constraint violation: {context}")]
    ConstraintViolation { context: String },

    /// Circular reference detected
    #[error("Circular reference detected: {context}")]
    CircularReference { context: String },

    /// A relationship references an organization that is not stored
    #[error("Referenced organization does not exist: {id}")]
    UnknownReference { id: Uuid },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(DatabaseError),
}

impl OrganizationServiceError {
    /// Create a not found error
    pub fn not_found(id: Uuid) -> Self {
        Self::NotFound { id }
    }

    /// Whether the error reports a missing organization
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<DatabaseError> for OrganizationServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { id } => Self::NotFound { id },
            DatabaseError::ConstraintViolation { context } => Self::ConstraintViolation { context },
            DatabaseError::CircularReference { context } => Self::CircularReference { context },
            DatabaseError::UnknownReference { id } => Self::UnknownReference { id },
            other => Self::DatabaseError(other),
        }
    }
}
