//! Collaborators supplied by the host application
//!
//! The page tree does not know about sessions, feature flags or published
//! sites. The host plugs those concerns in through these traits; the defaults
//! allow everything and publish nothing.

use crate::models::{Actor, Page};
use async_trait::async_trait;
use uuid::Uuid;

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageAction {
    View,
    Create,
    Edit,
    Lock,
    ChangeAccess,
    Archive,
    Unarchive,
    Move,
    Duplicate,
    Delete,
    Restore,
}

/// Extra permission gate consulted before every operation
///
/// Runs before the built-in owner/admin rules, which always apply on top.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn allows(&self, actor: &Actor, page: &Page, action: PageAction) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn allows(&self, _actor: &Actor, _page: &Page, _action: PageAction) -> bool {
        true
    }
}

/// Removes the published copy of a page after it is deleted
///
/// Called after commit; failures are logged and never undo the delete.
#[async_trait]
pub trait PublishHook: Send + Sync {
    async fn remove_published(&self, workspace_id: Uuid, page_id: Uuid) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublishHook;

#[async_trait]
impl PublishHook for NoopPublishHook {
    async fn remove_published(&self, _workspace_id: Uuid, _page_id: Uuid) -> anyhow::Result<()> {
        Ok(())
    }
}
