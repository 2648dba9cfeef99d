//! Domain Events for the page tree
//!
//! Events emitted by `PageService` after a write transaction commits. They let
//! other parts of the system (notification fan-out, search reindexing, live
//! sidebars) react to page changes without coupling to the storage layer.
//!
//! # Architecture
//!
//! Events are sent on a tokio broadcast channel. Sending is fire-and-forget:
//! with no subscribers the event is dropped, and a lagging subscriber loses the
//! oldest events.
//!
//! # Event Flow
//!
//! 1. `PageService` commits a cascade (lock, archive, delete, ...)
//! 2. One `PageEvent` per affected page is emitted via the broadcast channel
//! 3. All subscribers receive the events asynchronously

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PageEventKind {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "updated")]
    Updated,
    #[serde(rename = "locked")]
    Locked,
    #[serde(rename = "unlocked")]
    Unlocked,
    #[serde(rename = "made-public")]
    MadePublic,
    #[serde(rename = "made-private")]
    MadePrivate,
    #[serde(rename = "archived")]
    Archived,
    #[serde(rename = "unarchived")]
    Unarchived,
    /// Parent link changed
    #[serde(rename = "moved_internally", rename_all = "camelCase")]
    Moved {
        old_parent_id: Option<Uuid>,
        new_parent_id: Option<Uuid>,
    },
    #[serde(rename = "duplicated")]
    Duplicated,
    #[serde(rename = "deleted")]
    Deleted,
    /// Page was restored from a version; `pruned_page_ids` were hard-deleted
    #[serde(rename = "restored", rename_all = "camelCase")]
    Restored { pruned_page_ids: Vec<Uuid> },
}

/// A committed change to one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEvent {
    pub workspace_id: Uuid,
    pub page_id: Uuid,
    /// User who triggered the change
    pub actor_id: Uuid,
    #[serde(flatten)]
    pub kind: PageEventKind,
}

impl PageEvent {
    pub fn new(workspace_id: Uuid, page_id: Uuid, actor_id: Uuid, kind: PageEventKind) -> Self {
        Self {
            workspace_id,
            page_id,
            actor_id,
            kind,
        }
    }

    /// Action name as recorded by activity consumers
    pub fn action(&self) -> &'static str {
        match self.kind {
            PageEventKind::Created => "created",
            PageEventKind::Updated => "updated",
            PageEventKind::Locked => "locked",
            PageEventKind::Unlocked => "unlocked",
            PageEventKind::MadePublic => "made-public",
            PageEventKind::MadePrivate => "made-private",
            PageEventKind::Archived => "archived",
            PageEventKind::Unarchived => "unarchived",
            PageEventKind::Moved { .. } => "moved_internally",
            PageEventKind::Duplicated => "duplicated",
            PageEventKind::Deleted => "deleted",
            PageEventKind::Restored { .. } => "restored",
        }
    }
}
