//! Service Layer Error Types
//!
//! Every failure a page operation can report. All variants are plain values:
//! the caller decides whether to retry, and any error raised inside a
//! transaction rolls the whole cascade back.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// Page operation errors
#[derive(Error, Debug)]
pub enum PageServiceError {
    /// Entity missing, soft-deleted or in another workspace
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// Actor lacks the role or ownership the operation requires
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Delete requested on a page that is not archived
    #[error("Page {page_id} must be archived before it can be deleted")]
    MustArchiveFirst { page_id: Uuid },

    /// Unarchive requested while the immediate parent is still archived
    #[error("Cannot unarchive page {page_id}: parent {parent_id} is archived")]
    ParentStillArchived { page_id: Uuid, parent_id: Uuid },

    /// Move would make a page its own ancestor
    #[error("Moving page {page_id} under {new_parent_id} would create a cycle")]
    CycleDetected { page_id: Uuid, new_parent_id: Uuid },

    /// Parent or project belongs to another workspace
    #[error("Invalid reference: {context}")]
    InvalidReference { context: String },

    /// Content or metadata edit on a locked page
    #[error("Page {page_id} is locked")]
    Locked { page_id: Uuid },

    /// Content edit on an archived page
    #[error("Page {page_id} is archived")]
    Archived { page_id: Uuid },

    #[error("Page {page_id} is already archived")]
    AlreadyArchived { page_id: Uuid },

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Storage fault; the whole operation can be retried
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PageServiceError {
    pub fn page_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "Page", id }
    }

    pub fn version_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "Page version",
            id,
        }
    }

    pub fn project_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "Project",
            id,
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn invalid_reference(context: impl Into<String>) -> Self {
        Self::InvalidReference {
            context: context.into(),
        }
    }

    /// True for storage faults; domain outcomes never change on retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<serde_json::Error> for PageServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
