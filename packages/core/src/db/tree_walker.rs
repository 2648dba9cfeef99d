//! Tree Walker
//!
//! Descendant and ancestor computation over the `parent_id` back-references.
//! Pages never store their children, so every walk is a sequence of child
//! (or parent) lookups against the `pages` table.
//!
//! All walks keep an explicit visited set: a cycle left behind by a bad write
//! terminates the walk instead of looping.

use crate::db::database::{parse_optional_timestamp, parse_optional_uuid, parse_uuid};
use crate::db::error::SqlContext;
use crate::models::SubPageSnapshot;
use crate::services::PageServiceError;
use libsql::Connection;
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// Stateless walker scoped to one workspace
///
/// Borrows a connection so it can run inside the caller's transaction and
/// see its uncommitted writes.
pub struct TreeWalker<'a> {
    conn: &'a Connection,
    workspace_id: Uuid,
}

impl<'a> TreeWalker<'a> {
    pub fn new(conn: &'a Connection, workspace_id: Uuid) -> Self {
        Self { conn, workspace_id }
    }

    /// Live descendants of `page_id` in breadth-first order, excluding the page
    pub async fn descendant_ids(&self, page_id: Uuid) -> Result<Vec<Uuid>, PageServiceError> {
        Ok(self
            .descendants(page_id)
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect())
    }

    /// Live descendants with their parent links
    pub async fn descendants(
        &self,
        page_id: Uuid,
    ) -> Result<Vec<SubPageSnapshot>, PageServiceError> {
        self.walk(page_id, false).await
    }

    /// Every descendant, live or soft-deleted, as recorded in `sub_pages_data`
    ///
    /// Deleted pages are walked through, so live grandchildren of a deleted
    /// child still appear.
    pub async fn subtree_snapshot(
        &self,
        page_id: Uuid,
    ) -> Result<Vec<SubPageSnapshot>, PageServiceError> {
        self.walk(page_id, true).await
    }

    async fn walk(
        &self,
        root: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<SubPageSnapshot>, PageServiceError> {
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut entries = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in self.children(current, include_deleted).await? {
                if !visited.insert(child.id) {
                    tracing::warn!(
                        "Cycle guard: page {} reached twice while walking {}",
                        child.id,
                        root
                    );
                    continue;
                }
                queue.push_back(child.id);
                entries.push(child);
            }
        }

        tracing::debug!(
            "Walked {} descendant(s) of {} (include_deleted={})",
            entries.len(),
            root,
            include_deleted
        );

        Ok(entries)
    }

    async fn children(
        &self,
        parent_id: Uuid,
        include_deleted: bool,
    ) -> Result<Vec<SubPageSnapshot>, PageServiceError> {
        let sql = if include_deleted {
            "SELECT id, parent_id, deleted_at FROM pages
             WHERE workspace_id = ? AND parent_id = ?
             ORDER BY created_at, id"
        } else {
            "SELECT id, parent_id, deleted_at FROM pages
             WHERE workspace_id = ? AND parent_id = ? AND deleted_at IS NULL
             ORDER BY created_at, id"
        };

        let mut rows = self
            .conn
            .query(
                sql,
                libsql::params![self.workspace_id.to_string(), parent_id.to_string()],
            )
            .await
            .sql_context("Failed to query child pages")?;

        let mut children = Vec::new();
        while let Some(row) = rows.next().await.sql_context("Failed to read child row")? {
            let id: String = row.get(0).sql_context("Failed to get id")?;
            let parent: Option<String> = row.get(1).sql_context("Failed to get parent_id")?;
            let deleted_at: Option<String> = row.get(2).sql_context("Failed to get deleted_at")?;

            children.push(SubPageSnapshot {
                id: parse_uuid(&id)?,
                parent_id: parse_optional_uuid(parent)?,
                deleted_at: parse_optional_timestamp(deleted_at)?,
            });
        }

        Ok(children)
    }

    /// Ancestors from the immediate parent up to the root
    ///
    /// Stops at the first ancestor that is missing or soft-deleted.
    pub async fn ancestor_chain(&self, page_id: Uuid) -> Result<Vec<Uuid>, PageServiceError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([page_id]);

        let mut next = match self.parent_link(page_id).await? {
            Some((parent, _)) => parent,
            None => return Ok(chain),
        };

        while let Some(ancestor) = next {
            if !visited.insert(ancestor) {
                tracing::warn!("Cycle guard: ancestor {} of {} seen twice", ancestor, page_id);
                break;
            }
            match self.parent_link(ancestor).await? {
                Some((parent, false)) => {
                    chain.push(ancestor);
                    next = parent;
                }
                _ => break,
            }
        }

        Ok(chain)
    }

    /// True when `ancestor` is reachable by following parent links up from `page_id`
    ///
    /// Follows deleted pages too, so a parent change can never close a loop
    /// through a soft-deleted intermediate.
    pub async fn is_ancestor(&self, ancestor: Uuid, page_id: Uuid) -> Result<bool, PageServiceError> {
        let mut visited = HashSet::from([page_id]);
        let mut next = self.parent_link(page_id).await?.and_then(|(parent, _)| parent);

        while let Some(current) = next {
            if current == ancestor {
                return Ok(true);
            }
            if !visited.insert(current) {
                break;
            }
            next = self.parent_link(current).await?.and_then(|(parent, _)| parent);
        }

        Ok(false)
    }

    /// `(parent_id, is_deleted)` of a page, `None` when the row does not exist
    async fn parent_link(
        &self,
        page_id: Uuid,
    ) -> Result<Option<(Option<Uuid>, bool)>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                "SELECT parent_id, deleted_at FROM pages WHERE workspace_id = ? AND id = ?",
                libsql::params![self.workspace_id.to_string(), page_id.to_string()],
            )
            .await
            .sql_context("Failed to query parent link")?;

        match rows.next().await.sql_context("Failed to read parent link")? {
            Some(row) => {
                let parent: Option<String> = row.get(0).sql_context("Failed to get parent_id")?;
                let deleted_at: Option<String> =
                    row.get(1).sql_context("Failed to get deleted_at")?;
                Ok(Some((parse_optional_uuid(parent)?, deleted_at.is_some())))
            }
            None => Ok(None),
        }
    }
}
