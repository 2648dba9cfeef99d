//! Business Services
//!
//! - `PageService` - Page lifecycle: create, edit, lock, access, archive,
//!   move, duplicate, delete and restore
//! - `collaborators` - Authorization and publish hooks supplied by the host
//! - `restore` - Pure planning of a version restore
//!
//! Services coordinate between the database layer and application logic,
//! implementing business rules and orchestrating multi-store transactions.

pub mod collaborators;
pub mod error;
pub mod page_service;
pub mod restore;
mod workspace_locks;

pub use collaborators::{AllowAll, Authorizer, NoopPublishHook, PageAction, PublishHook};
pub use error::PageServiceError;
pub use page_service::{CascadeOutcome, PageService, RestoreOutcome};
pub use restore::{plan_restore, RestorePlan};
pub use workspace_locks::WorkspaceLocks;
