//! Page Service
//!
//! Lifecycle controller for the page tree. Every write follows the same shape:
//!
//! 1. Acquire the workspace lock
//! 2. Open a connection and `BEGIN IMMEDIATE`
//! 3. Load and authorize the target page, check the lifecycle rules
//! 4. Compute the affected subtree and mutate the stores
//! 5. Commit (or roll back everything on the first error)
//! 6. Emit one `PageEvent` per affected page and run post-commit hooks
//!
//! Reads skip the lock and the transaction.

use crate::config::PageTreeConfig;
use crate::db::{
    DatabaseService, FavoritesIndex, PageEvent, PageEventKind, PageStore, TreeWalker,
    VersionStore,
};
use crate::models::time::{SystemTimeProvider, TimeProvider};
use crate::models::{
    Actor, Favorite, NewPage, Page, PageAccess, PageContent, PageListFilter, PageUpdate,
    PageVersion, PageVersionLite, RecentVisit,
};
use crate::services::collaborators::{AllowAll, Authorizer, NoopPublishHook, PageAction, PublishHook};
use crate::services::error::PageServiceError;
use crate::services::restore::plan_restore;
use crate::services::workspace_locks::WorkspaceLocks;
use chrono::{DateTime, Utc};
use libsql::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, OwnedMutexGuard};
use uuid::Uuid;

/// Pages touched by a cascading operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeOutcome {
    pub root_id: Uuid,
    /// The root followed by its live descendants in breadth-first order
    pub affected: Vec<Uuid>,
    pub at: DateTime<Utc>,
}

/// Result of restoring a page from one of its versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub page: Page,
    /// Pages whose `deleted_at` was cleared or that were re-attached under the page
    pub restored: Vec<Uuid>,
    /// Live descendants the version did not know about, now hard-deleted
    pub pruned: Vec<Uuid>,
    pub restored_versions: Vec<Uuid>,
}

/// Orchestrates page lifecycle operations over the stores
///
/// Cheap to clone; clones share the database, the workspace locks and the
/// event channel.
#[derive(Clone)]
pub struct PageService {
    db: Arc<DatabaseService>,
    config: PageTreeConfig,
    clock: Arc<dyn TimeProvider>,
    authorizer: Arc<dyn Authorizer>,
    publish_hook: Arc<dyn PublishHook>,
    locks: Arc<WorkspaceLocks>,
    event_tx: broadcast::Sender<PageEvent>,
}

impl PageService {
    /// Create a service with the system clock, no extra authorization and no
    /// publish hook
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use pagetree_core::config::PageTreeConfig;
    /// # use pagetree_core::db::DatabaseService;
    /// # use pagetree_core::services::PageService;
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = PageTreeConfig::from_env();
    /// let db = Arc::new(DatabaseService::from_config(&config).await?);
    /// let service = PageService::new(db, config);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(db: Arc<DatabaseService>, config: PageTreeConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            db,
            config,
            clock: Arc::new(SystemTimeProvider),
            authorizer: Arc::new(AllowAll),
            publish_hook: Arc::new(NoopPublishHook),
            locks: Arc::new(WorkspaceLocks::new()),
            event_tx,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_publish_hook(mut self, publish_hook: Arc<dyn PublishHook>) -> Self {
        self.publish_hook = publish_hook;
        self
    }

    pub fn config(&self) -> &PageTreeConfig {
        &self.config
    }

    /// Subscribe to page events
    ///
    /// Events are sent after commit. A receiver that falls more than
    /// `event_channel_capacity` events behind loses the oldest ones.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<PageEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: PageEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_for_each(&self, workspace_id: Uuid, actor: &Actor, pages: &[Uuid], kind: PageEventKind) {
        for page_id in pages {
            self.emit_event(PageEvent::new(
                workspace_id,
                *page_id,
                actor.user_id,
                kind.clone(),
            ));
        }
    }

    async fn begin_write(
        &self,
        workspace_id: Uuid,
    ) -> Result<(OwnedMutexGuard<()>, Connection), PageServiceError> {
        let guard = self.locks.acquire(workspace_id).await;
        let conn = self.db.connect_with_timeout().await?;
        DatabaseService::begin_immediate(&conn).await?;
        Ok((guard, conn))
    }

    async fn authorize(
        &self,
        actor: &Actor,
        page: &Page,
        action: PageAction,
    ) -> Result<(), PageServiceError> {
        if self.authorizer.allows(actor, page, action).await {
            Ok(())
        } else {
            Err(PageServiceError::forbidden(format!(
                "{:?} on page {} denied for user {}",
                action, page.id, actor.user_id
            )))
        }
    }

    /// The page followed by its live descendants, or just the page
    async fn cascade_targets(
        conn: &Connection,
        workspace_id: Uuid,
        page_id: Uuid,
        cascade: bool,
    ) -> Result<Vec<Uuid>, PageServiceError> {
        let mut affected = vec![page_id];
        if cascade {
            affected.extend(
                TreeWalker::new(conn, workspace_id)
                    .descendant_ids(page_id)
                    .await?,
            );
        }
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Create / edit
    // ------------------------------------------------------------------

    /// Create a page owned by `actor`
    ///
    /// The parent must be a live, unarchived page of the same workspace and
    /// every project must be registered to that workspace.
    pub async fn create_page(
        &self,
        actor: &Actor,
        new_page: NewPage,
    ) -> Result<Page, PageServiceError> {
        new_page.validate()?;
        let workspace_id = new_page.workspace_id;
        let page = new_page.into_page(actor.user_id, self.clock.now());

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result = self.create_page_in_tx(&conn, actor, &page).await;
        DatabaseService::commit_or_rollback(&conn, result).await?;

        tracing::debug!("Created page {} in workspace {}", page.id, workspace_id);
        self.emit_event(PageEvent::new(
            workspace_id,
            page.id,
            actor.user_id,
            PageEventKind::Created,
        ));
        Ok(page)
    }

    async fn create_page_in_tx(
        &self,
        conn: &Connection,
        actor: &Actor,
        page: &Page,
    ) -> Result<(), PageServiceError> {
        let store = PageStore::new(conn, page.workspace_id);
        self.authorize(actor, page, PageAction::Create).await?;

        if let Some(parent_id) = page.parent_id {
            if let Some(parent) = store.find(parent_id).await? {
                if parent.is_archived() {
                    return Err(PageServiceError::Archived { page_id: parent_id });
                }
            }
        }

        store.create(page).await
    }

    /// Rename a page
    pub async fn update_page(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        update: PageUpdate,
    ) -> Result<Page, PageServiceError> {
        update.validate()?;
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Page, PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let mut page = store.get(page_id).await?;
            self.authorize(actor, &page, PageAction::Edit).await?;
            if page.is_locked {
                return Err(PageServiceError::Locked { page_id });
            }
            if update.is_empty() {
                return Ok(page);
            }

            if let Some(name) = &update.name {
                page.name = name.clone();
            }
            page.updated_at = now;
            store.update(&page).await?;
            Ok(page)
        }
        .await;
        let page = DatabaseService::commit_or_rollback(&conn, result).await?;

        self.emit_event(PageEvent::new(
            workspace_id,
            page_id,
            actor.user_id,
            PageEventKind::Updated,
        ));
        Ok(page)
    }

    /// Replace the document content of a page
    ///
    /// When the HTML changes, a version is recorded in the same transaction:
    /// the editor's latest version is rewritten if it was saved within the
    /// coalescing window, otherwise a new version is appended.
    pub async fn save_description(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        content: PageContent,
    ) -> Result<Page, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Page, PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let mut page = store.get(page_id).await?;
            self.authorize(actor, &page, PageAction::Edit).await?;
            if page.is_locked {
                return Err(PageServiceError::Locked { page_id });
            }
            if page.is_archived() {
                return Err(PageServiceError::Archived { page_id });
            }

            let html_changed = page.content.description_html != content.description_html;
            page.content = content;
            page.updated_at = now;
            store.update(&page).await?;

            if html_changed {
                let sub_pages = TreeWalker::new(&conn, workspace_id)
                    .subtree_snapshot(page_id)
                    .await?;
                VersionStore::new(&conn, workspace_id)
                    .snapshot(
                        &page,
                        actor.user_id,
                        sub_pages,
                        now,
                        self.config.coalesce_window(),
                    )
                    .await?;
            }
            Ok(page)
        }
        .await;
        let page = DatabaseService::commit_or_rollback(&conn, result).await?;

        self.emit_event(PageEvent::new(
            workspace_id,
            page_id,
            actor.user_id,
            PageEventKind::Updated,
        ));
        Ok(page)
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    /// Lock a page, and with `cascade` its whole live subtree
    pub async fn lock(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        cascade: bool,
    ) -> Result<CascadeOutcome, PageServiceError> {
        self.set_locked(actor, workspace_id, page_id, true, cascade)
            .await
    }

    pub async fn unlock(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        cascade: bool,
    ) -> Result<CascadeOutcome, PageServiceError> {
        self.set_locked(actor, workspace_id, page_id, false, cascade)
            .await
    }

    async fn set_locked(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        locked: bool,
        cascade: bool,
    ) -> Result<CascadeOutcome, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Vec<Uuid>, PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let page = store.get(page_id).await?;
            self.authorize(actor, &page, PageAction::Lock).await?;

            let affected = Self::cascade_targets(&conn, workspace_id, page_id, cascade).await?;
            store.set_locked(&affected, locked, now).await?;
            Ok(affected)
        }
        .await;
        let affected = DatabaseService::commit_or_rollback(&conn, result).await?;

        tracing::info!(
            "{} {} page(s) under {}",
            if locked { "Locked" } else { "Unlocked" },
            affected.len(),
            page_id
        );
        let kind = if locked {
            PageEventKind::Locked
        } else {
            PageEventKind::Unlocked
        };
        self.emit_for_each(workspace_id, actor, &affected, kind);

        Ok(CascadeOutcome {
            root_id: page_id,
            affected,
            at: now,
        })
    }

    /// Change page visibility, and with `cascade` the visibility of its live subtree
    ///
    /// Only the owner may change the access of a page. Re-applying the current
    /// access is allowed for anyone and still fans out with `cascade`.
    pub async fn set_access(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        access: PageAccess,
        cascade: bool,
    ) -> Result<CascadeOutcome, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Vec<Uuid>, PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let page = store.get(page_id).await?;
            self.authorize(actor, &page, PageAction::ChangeAccess).await?;
            if page.access != access && !actor.owns(&page) {
                return Err(PageServiceError::forbidden(
                    "access can only be changed by the page owner",
                ));
            }

            let affected = Self::cascade_targets(&conn, workspace_id, page_id, cascade).await?;
            store.set_access(&affected, access, now).await?;
            Ok(affected)
        }
        .await;
        let affected = DatabaseService::commit_or_rollback(&conn, result).await?;

        let kind = match access {
            PageAccess::Public => PageEventKind::MadePublic,
            PageAccess::Private => PageEventKind::MadePrivate,
        };
        self.emit_for_each(workspace_id, actor, &affected, kind);

        Ok(CascadeOutcome {
            root_id: page_id,
            affected,
            at: now,
        })
    }

    // ------------------------------------------------------------------
    // Archive / unarchive
    // ------------------------------------------------------------------

    /// Archive a page and every live descendant at the same instant
    ///
    /// Descendants archived earlier get the new timestamp too.
    pub async fn archive(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<CascadeOutcome, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Vec<Uuid>, PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let page = store.get(page_id).await?;
            self.authorize(actor, &page, PageAction::Archive).await?;
            if !actor.can_manage(&page) {
                return Err(PageServiceError::forbidden(
                    "only the owner or an admin can archive the page",
                ));
            }
            if page.is_archived() {
                return Err(PageServiceError::AlreadyArchived { page_id });
            }

            let affected = Self::cascade_targets(&conn, workspace_id, page_id, true).await?;
            store.set_archived_at(&affected, Some(now), now).await?;
            Ok(affected)
        }
        .await;
        let affected = DatabaseService::commit_or_rollback(&conn, result).await?;

        tracing::info!("Archived {} page(s) under {}", affected.len(), page_id);
        self.emit_for_each(workspace_id, actor, &affected, PageEventKind::Archived);

        Ok(CascadeOutcome {
            root_id: page_id,
            affected,
            at: now,
        })
    }

    /// Unarchive a page and its live subtree
    ///
    /// Fails while the immediate parent is still archived. Unarchiving a page
    /// that is not archived changes nothing and emits nothing.
    pub async fn unarchive(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<CascadeOutcome, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Vec<Uuid>, PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let page = store.get(page_id).await?;

            if let Some(parent_id) = page.parent_id {
                if let Some(parent) = store.find(parent_id).await? {
                    if parent.is_archived() {
                        return Err(PageServiceError::ParentStillArchived { page_id, parent_id });
                    }
                }
            }

            self.authorize(actor, &page, PageAction::Unarchive).await?;
            if !actor.can_manage(&page) {
                return Err(PageServiceError::forbidden(
                    "only the owner or an admin can unarchive the page",
                ));
            }
            if !page.is_archived() {
                return Ok(Vec::new());
            }

            let affected = Self::cascade_targets(&conn, workspace_id, page_id, true).await?;
            store.set_archived_at(&affected, None, now).await?;
            Ok(affected)
        }
        .await;
        let affected = DatabaseService::commit_or_rollback(&conn, result).await?;

        if !affected.is_empty() {
            tracing::info!("Unarchived {} page(s) under {}", affected.len(), page_id);
        }
        self.emit_for_each(workspace_id, actor, &affected, PageEventKind::Unarchived);

        Ok(CascadeOutcome {
            root_id: page_id,
            affected,
            at: now,
        })
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Re-parent a page; `None` makes it a root page
    ///
    /// A live page cannot be moved under an archived parent.
    pub async fn move_page(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        new_parent_id: Option<Uuid>,
    ) -> Result<Page, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<(Page, Option<Uuid>), PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let page = store.get(page_id).await?;
            self.authorize(actor, &page, PageAction::Move).await?;
            if let Some(parent_id) = new_parent_id {
                let parent = store.find(parent_id).await?;
                if parent.is_some_and(|parent| parent.is_archived()) && !page.is_archived() {
                    return Err(PageServiceError::Archived { page_id: parent_id });
                }
            }

            let old_parent_id = store.set_parent(page_id, new_parent_id, now).await?;
            let moved = store.get(page_id).await?;
            Ok((moved, old_parent_id))
        }
        .await;
        let (page, old_parent_id) = DatabaseService::commit_or_rollback(&conn, result).await?;

        tracing::debug!(
            "Moved page {} from {:?} to {:?}",
            page_id,
            old_parent_id,
            new_parent_id
        );
        self.emit_event(PageEvent::new(
            workspace_id,
            page_id,
            actor.user_id,
            PageEventKind::Moved {
                old_parent_id,
                new_parent_id,
            },
        ));
        Ok(page)
    }

    /// Announce a duplication of a page and its live subtree
    ///
    /// The copy itself is produced by the consumer of the `duplicated` events.
    pub async fn duplicate(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<CascadeOutcome, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Vec<Uuid>, PageServiceError> = async {
            let page = PageStore::new(&conn, workspace_id).get(page_id).await?;
            self.authorize(actor, &page, PageAction::Duplicate).await?;
            Self::cascade_targets(&conn, workspace_id, page_id, true).await
        }
        .await;
        let affected = DatabaseService::commit_or_rollback(&conn, result).await?;

        self.emit_for_each(workspace_id, actor, &affected, PageEventKind::Duplicated);

        Ok(CascadeOutcome {
            root_id: page_id,
            affected,
            at: now,
        })
    }

    // ------------------------------------------------------------------
    // Delete / restore
    // ------------------------------------------------------------------

    /// Soft-delete an archived page and its live subtree
    ///
    /// Versions of every affected page share the deletion timestamp, and all
    /// favorites and recent visits pointing at them are removed. After commit
    /// the publish hook runs once per deleted page.
    pub async fn delete_page(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<CascadeOutcome, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result: Result<Vec<Uuid>, PageServiceError> = async {
            let store = PageStore::new(&conn, workspace_id);
            let page = store.get(page_id).await?;
            if !page.is_archived() {
                return Err(PageServiceError::MustArchiveFirst { page_id });
            }
            self.authorize(actor, &page, PageAction::Delete).await?;
            if !actor.can_manage(&page) {
                return Err(PageServiceError::forbidden(
                    "only the owner or an admin can delete the page",
                ));
            }

            let affected = Self::cascade_targets(&conn, workspace_id, page_id, true).await?;
            store.soft_delete(&affected, now).await?;
            let versions = VersionStore::new(&conn, workspace_id)
                .soft_delete_for_pages(&affected, now)
                .await?;
            let purged = FavoritesIndex::new(&conn, workspace_id)
                .purge_pages(&affected)
                .await?;
            tracing::debug!(
                "Delete of {} touches {} version(s) and {} favorite/visit row(s)",
                page_id,
                versions,
                purged
            );
            Ok(affected)
        }
        .await;
        let affected = DatabaseService::commit_or_rollback(&conn, result).await?;

        tracing::info!("Deleted {} page(s) under {}", affected.len(), page_id);

        for deleted in &affected {
            if let Err(e) = self
                .publish_hook
                .remove_published(workspace_id, *deleted)
                .await
            {
                tracing::warn!("Failed to remove published copy of page {}: {:#}", deleted, e);
            }
        }
        self.emit_for_each(workspace_id, actor, &affected, PageEventKind::Deleted);

        Ok(CascadeOutcome {
            root_id: page_id,
            affected,
            at: now,
        })
    }

    /// Bring a page and its subtree back to the state recorded in `version_id`
    ///
    /// - A soft-deleted page is undeleted first
    /// - Descendants recorded in the version but missing from the live tree are
    ///   undeleted and re-attached under their recorded parent
    /// - Live descendants the version does not know about are hard-deleted
    /// - Versions saved within the restore window of each undeleted page's
    ///   deletion come back with it
    /// - The version's content is written back to the page
    ///
    /// Running the same restore twice leaves the tree unchanged the second time.
    pub async fn restore(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        version_id: Uuid,
    ) -> Result<RestoreOutcome, PageServiceError> {
        let now = self.clock.now();

        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result = self
            .restore_in_tx(&conn, actor, workspace_id, page_id, version_id, now)
            .await;
        let outcome = DatabaseService::commit_or_rollback(&conn, result).await?;

        tracing::info!(
            "Restored page {} from version {}: {} restored, {} pruned, {} version(s) recovered",
            page_id,
            version_id,
            outcome.restored.len(),
            outcome.pruned.len(),
            outcome.restored_versions.len()
        );
        self.emit_event(PageEvent::new(
            workspace_id,
            page_id,
            actor.user_id,
            PageEventKind::Restored {
                pruned_page_ids: outcome.pruned.clone(),
            },
        ));
        Ok(outcome)
    }

    async fn restore_in_tx(
        &self,
        conn: &Connection,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        version_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RestoreOutcome, PageServiceError> {
        let store = PageStore::new(conn, workspace_id);
        let versions = VersionStore::new(conn, workspace_id);
        let walker = TreeWalker::new(conn, workspace_id);
        let window = self.config.restore_window();

        let mut root = store
            .find_any(page_id)
            .await?
            .ok_or_else(|| PageServiceError::page_not_found(page_id))?;
        let version = versions
            .find_any(version_id)
            .await?
            .filter(|version| version.page_id == page_id)
            .ok_or_else(|| PageServiceError::version_not_found(version_id))?;

        self.authorize(actor, &root, PageAction::Restore).await?;
        // A deleted page cannot be unlocked, so the lock only guards live pages
        if root.is_locked && root.deleted_at.is_none() {
            return Err(PageServiceError::Locked { page_id });
        }

        let mut restored = Vec::new();
        let mut restored_versions = Vec::new();

        if let Some(deleted_at) = root.deleted_at {
            if let Some(parent_id) = root.parent_id {
                if store.find(parent_id).await?.is_none() {
                    tracing::warn!(
                        "Parent {} of restored page {} is gone; restoring it as a root page",
                        parent_id,
                        page_id
                    );
                    store.write_parent(page_id, None, now).await?;
                    root.parent_id = None;
                }
            }
            store.restore(page_id, now).await?;
            restored_versions.extend(
                versions
                    .restore_in_window(page_id, deleted_at, window, now)
                    .await?,
            );
            restored.push(page_id);
            root.deleted_at = None;
        }

        let live = walker.descendants(page_id).await?;
        let plan = plan_restore(page_id, &live, &version.sub_pages_data);
        tracing::debug!(
            "Restore plan for {}: {} to restore, {} to prune, {} to repoint",
            page_id,
            plan.to_restore.len(),
            plan.to_prune.len(),
            plan.reparented.len()
        );

        let mut skipped = HashSet::new();
        for id in &plan.to_restore {
            let page = match store.find_any(*id).await? {
                Some(page) => page,
                None => {
                    tracing::debug!("Recorded sub-page {} no longer exists; skipping", id);
                    skipped.insert(*id);
                    continue;
                }
            };
            if walker.is_ancestor(*id, page_id).await? {
                tracing::warn!(
                    "Recorded sub-page {} is now an ancestor of {}; skipping",
                    id,
                    page_id
                );
                skipped.insert(*id);
                continue;
            }

            let parent = plan
                .parents
                .get(id)
                .copied()
                .filter(|parent| !skipped.contains(parent))
                .unwrap_or(page_id);
            store.write_parent(*id, Some(parent), now).await?;
            store
                .set_archived_at(&[*id], root.archived_at, now)
                .await?;

            if let Some(deleted_at) = page.deleted_at {
                store.restore(*id, now).await?;
                restored_versions.extend(
                    versions
                        .restore_in_window(*id, deleted_at, window, now)
                        .await?,
                );
            }
            restored.push(*id);
        }

        store.hard_delete(&plan.to_prune).await?;
        for id in &plan.reparented {
            let parent = plan
                .parents
                .get(id)
                .copied()
                .filter(|parent| !skipped.contains(parent))
                .unwrap_or(page_id);
            store.write_parent(*id, Some(parent), now).await?;
        }

        root.content = version.content.clone();
        root.updated_at = now;
        store.update(&root).await?;

        Ok(RestoreOutcome {
            page: root,
            restored,
            pruned: plan.to_prune,
            restored_versions,
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    async fn visible_page(
        &self,
        conn: &Connection,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Page, PageServiceError> {
        let page = PageStore::new(conn, workspace_id).get(page_id).await?;
        if !actor.can_view(&page) {
            return Err(PageServiceError::forbidden(format!(
                "page {} is private",
                page_id
            )));
        }
        self.authorize(actor, &page, PageAction::View).await?;
        Ok(page)
    }

    /// Live page by id; private pages are only returned to their owner
    pub async fn get_page(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Page, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.visible_page(&conn, actor, workspace_id, page_id).await
    }

    /// `get_page` that also records the visit in the actor's recent list
    pub async fn open_page(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Page, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let page = self.visible_page(&conn, actor, workspace_id, page_id).await?;
        FavoritesIndex::new(&conn, workspace_id)
            .record_visit(
                actor.user_id,
                page_id,
                page.project_ids.first().copied(),
                self.clock.now(),
            )
            .await?;
        Ok(page)
    }

    /// Non-deleted versions of a page, newest first
    pub async fn list_versions(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Vec<PageVersionLite>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.visible_page(&conn, actor, workspace_id, page_id).await?;
        VersionStore::new(&conn, workspace_id)
            .list_for_page(page_id)
            .await
    }

    pub async fn get_version(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
        version_id: Uuid,
    ) -> Result<PageVersion, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.visible_page(&conn, actor, workspace_id, page_id).await?;
        VersionStore::new(&conn, workspace_id)
            .get(page_id, version_id)
            .await
    }

    /// Versions a restore of a deleted page would bring back, newest first
    ///
    /// These are the soft-deleted versions saved within the restore window of
    /// the page's `deleted_at`. Empty for a live page.
    pub async fn list_restore_candidates(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Vec<PageVersionLite>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let page = PageStore::new(&conn, workspace_id)
            .find_any(page_id)
            .await?
            .ok_or_else(|| PageServiceError::page_not_found(page_id))?;
        if !actor.can_view(&page) {
            return Err(PageServiceError::forbidden(format!(
                "page {} is private",
                page_id
            )));
        }
        self.authorize(actor, &page, PageAction::Restore).await?;

        let Some(deleted_at) = page.deleted_at else {
            return Ok(Vec::new());
        };
        VersionStore::new(&conn, workspace_id)
            .restore_window(page_id, deleted_at, self.config.restore_window())
            .await
    }

    /// Live children visible to the actor, oldest first
    pub async fn list_children(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Vec<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.visible_page(&conn, actor, workspace_id, page_id).await?;
        let children = PageStore::new(&conn, workspace_id)
            .list_children(page_id)
            .await?;
        Ok(children
            .into_iter()
            .filter(|page| actor.can_view(page))
            .collect())
    }

    /// Ancestors from the immediate parent up to the root
    pub async fn list_ancestors(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Vec<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        self.visible_page(&conn, actor, workspace_id, page_id).await?;

        let store = PageStore::new(&conn, workspace_id);
        let chain = TreeWalker::new(&conn, workspace_id)
            .ancestor_chain(page_id)
            .await?;

        let mut ancestors = Vec::with_capacity(chain.len());
        for ancestor_id in chain {
            ancestors.push(store.get(ancestor_id).await?);
        }
        Ok(ancestors)
    }

    /// Pages matching a sidebar filter, optionally narrowed by a name search
    pub async fn list_pages(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        filter: PageListFilter,
        search: Option<&str>,
    ) -> Result<Vec<Page>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let search = search.map(str::trim).filter(|term| !term.is_empty());
        PageStore::new(&conn, workspace_id)
            .list(filter, actor, search)
            .await
    }

    /// Register a project so pages of `workspace_id` may reference it
    pub async fn register_project(
        &self,
        workspace_id: Uuid,
        project_id: Uuid,
    ) -> Result<(), PageServiceError> {
        let now = self.clock.now();
        let (_guard, conn) = self.begin_write(workspace_id).await?;
        let result = PageStore::new(&conn, workspace_id)
            .register_project(project_id, now)
            .await;
        DatabaseService::commit_or_rollback(&conn, result).await
    }

    // ------------------------------------------------------------------
    // Favorites and recents
    // ------------------------------------------------------------------

    pub async fn add_favorite(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<Favorite, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let page = self.visible_page(&conn, actor, workspace_id, page_id).await?;
        FavoritesIndex::new(&conn, workspace_id)
            .add(
                actor.user_id,
                page_id,
                page.project_ids.first().copied(),
                self.clock.now(),
            )
            .await
    }

    /// Returns whether the page was a favorite
    pub async fn remove_favorite(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<bool, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        FavoritesIndex::new(&conn, workspace_id)
            .remove(actor.user_id, page_id)
            .await
    }

    pub async fn list_favorites(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
    ) -> Result<Vec<Favorite>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        FavoritesIndex::new(&conn, workspace_id)
            .list_favorites(actor.user_id)
            .await
    }

    pub async fn record_visit(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
        page_id: Uuid,
    ) -> Result<(), PageServiceError> {
        self.open_page(actor, workspace_id, page_id).await.map(|_| ())
    }

    /// The actor's most recent visits, newest first, capped by `recent_visits_limit`
    pub async fn list_recent(
        &self,
        actor: &Actor,
        workspace_id: Uuid,
    ) -> Result<Vec<RecentVisit>, PageServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        FavoritesIndex::new(&conn, workspace_id)
            .list_recent(actor.user_id, self.config.recent_visits_limit)
            .await
    }
}
