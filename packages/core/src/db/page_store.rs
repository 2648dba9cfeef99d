//! Page Store
//!
//! Persistence for `Page` rows, their project links and the project registry.
//! Every `PageStore` is bound to one workspace; rows from other workspaces are
//! invisible to it, and references into another workspace are rejected.

use crate::db::database::{
    format_optional_timestamp, format_timestamp, parse_optional_timestamp, parse_optional_uuid,
    parse_timestamp, parse_uuid,
};
use crate::db::error::{DatabaseError, SqlContext};
use crate::db::favorites::FavoritesIndex;
use crate::db::tree_walker::TreeWalker;
use crate::models::{Actor, Page, PageAccess, PageContent, PageListFilter};
use crate::services::PageServiceError;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row};
use uuid::Uuid;

const PAGE_COLUMNS: &str = "id, workspace_id, parent_id, name, description_html, \
     description_binary, description_json, description_stripped, owned_by, is_locked, \
     access, archived_at, deleted_at, created_at, updated_at";

pub struct PageStore<'a> {
    conn: &'a Connection,
    workspace_id: Uuid,
}

impl<'a> PageStore<'a> {
    pub fn new(conn: &'a Connection, workspace_id: Uuid) -> Self {
        Self { conn, workspace_id }
    }

    /// Insert a new page after checking its parent and project references
    pub async fn create(&self, page: &Page) -> Result<(), PageServiceError> {
        if page.workspace_id != self.workspace_id {
            return Err(PageServiceError::invalid_reference(format!(
                "page {} belongs to workspace {}, not {}",
                page.id, page.workspace_id, self.workspace_id
            )));
        }
        if let Some(parent_id) = page.parent_id {
            self.check_parent_reference(parent_id).await?;
        }
        for project_id in &page.project_ids {
            self.check_project_reference(*project_id).await?;
        }

        self.conn
            .execute(
                &format!(
                    "INSERT INTO pages ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    PAGE_COLUMNS
                ),
                libsql::params![
                    page.id.to_string(),
                    page.workspace_id.to_string(),
                    page.parent_id.map(|id| id.to_string()),
                    page.name.clone(),
                    page.content.description_html.clone(),
                    page.content.description_binary.clone(),
                    serde_json::to_string(&page.content.description_json)?,
                    page.content.description_stripped.clone(),
                    page.owned_by.to_string(),
                    page.is_locked as i64,
                    page.access.as_i64(),
                    format_optional_timestamp(&page.archived_at),
                    format_optional_timestamp(&page.deleted_at),
                    format_timestamp(&page.created_at),
                    format_timestamp(&page.updated_at)
                ],
            )
            .await
            .sql_context("Failed to insert page")?;

        for project_id in &page.project_ids {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO page_projects (page_id, project_id, workspace_id) VALUES (?, ?, ?)",
                    libsql::params![
                        page.id.to_string(),
                        project_id.to_string(),
                        self.workspace_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to link page to project")?;
        }

        Ok(())
    }

    /// Live page by id, `NotFound` when missing or soft-deleted
    pub async fn get(&self, page_id: Uuid) -> Result<Page, PageServiceError> {
        self.find(page_id)
            .await?
            .ok_or_else(|| PageServiceError::page_not_found(page_id))
    }

    /// Live page by id
    pub async fn find(&self, page_id: Uuid) -> Result<Option<Page>, PageServiceError> {
        Ok(self
            .find_any(page_id)
            .await?
            .filter(|page| !page.is_deleted()))
    }

    /// Page by id including soft-deleted rows
    pub async fn find_any(&self, page_id: Uuid) -> Result<Option<Page>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM pages WHERE workspace_id = ? AND id = ?",
                    PAGE_COLUMNS
                ),
                libsql::params![self.workspace_id.to_string(), page_id.to_string()],
            )
            .await
            .sql_context("Failed to query page")?;

        let page = match rows.next().await.sql_context("Failed to read page row")? {
            Some(row) => row_to_page(&row)?,
            None => return Ok(None),
        };

        self.with_projects(page).await.map(Some)
    }

    /// Persist the mutable fields of `page`
    ///
    /// Parent changes go through `set_parent`, which runs the cycle checks.
    pub async fn update(&self, page: &Page) -> Result<(), PageServiceError> {
        let changed = self
            .conn
            .execute(
                "UPDATE pages SET name = ?, description_html = ?, description_binary = ?,
                     description_json = ?, description_stripped = ?, is_locked = ?, access = ?,
                     archived_at = ?, deleted_at = ?, updated_at = ?
                 WHERE workspace_id = ? AND id = ?",
                libsql::params![
                    page.name.clone(),
                    page.content.description_html.clone(),
                    page.content.description_binary.clone(),
                    serde_json::to_string(&page.content.description_json)?,
                    page.content.description_stripped.clone(),
                    page.is_locked as i64,
                    page.access.as_i64(),
                    format_optional_timestamp(&page.archived_at),
                    format_optional_timestamp(&page.deleted_at),
                    format_timestamp(&page.updated_at),
                    self.workspace_id.to_string(),
                    page.id.to_string()
                ],
            )
            .await
            .sql_context("Failed to update page")?;

        if changed == 0 {
            return Err(PageServiceError::page_not_found(page.id));
        }
        Ok(())
    }

    /// Re-parent a live page, returning its previous parent
    ///
    /// `None` makes the page a root. The new parent must be a live page of the
    /// same workspace that is neither the page itself nor one of its descendants.
    pub async fn set_parent(
        &self,
        page_id: Uuid,
        new_parent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, PageServiceError> {
        let page = self.get(page_id).await?;

        if let Some(parent_id) = new_parent_id {
            if parent_id == page_id {
                return Err(PageServiceError::CycleDetected {
                    page_id,
                    new_parent_id: parent_id,
                });
            }
            self.check_parent_reference(parent_id).await?;
            if TreeWalker::new(self.conn, self.workspace_id)
                .is_ancestor(page_id, parent_id)
                .await?
            {
                return Err(PageServiceError::CycleDetected {
                    page_id,
                    new_parent_id: parent_id,
                });
            }
        }

        self.write_parent(page_id, new_parent_id, now).await?;
        Ok(page.parent_id)
    }

    /// Parent write without reference checks, for restore repointing
    pub(crate) async fn write_parent(
        &self,
        page_id: Uuid,
        parent_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), PageServiceError> {
        self.conn
            .execute(
                "UPDATE pages SET parent_id = ?, updated_at = ? WHERE workspace_id = ? AND id = ?",
                libsql::params![
                    parent_id.map(|id| id.to_string()),
                    format_timestamp(&now),
                    self.workspace_id.to_string(),
                    page_id.to_string()
                ],
            )
            .await
            .sql_context("Failed to update parent")?;
        Ok(())
    }

    pub async fn set_locked(
        &self,
        page_ids: &[Uuid],
        locked: bool,
        now: DateTime<Utc>,
    ) -> Result<(), PageServiceError> {
        for page_id in page_ids {
            self.conn
                .execute(
                    "UPDATE pages SET is_locked = ?, updated_at = ? WHERE workspace_id = ? AND id = ?",
                    libsql::params![
                        locked as i64,
                        format_timestamp(&now),
                        self.workspace_id.to_string(),
                        page_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to update lock flag")?;
        }
        Ok(())
    }

    pub async fn set_access(
        &self,
        page_ids: &[Uuid],
        access: PageAccess,
        now: DateTime<Utc>,
    ) -> Result<(), PageServiceError> {
        for page_id in page_ids {
            self.conn
                .execute(
                    "UPDATE pages SET access = ?, updated_at = ? WHERE workspace_id = ? AND id = ?",
                    libsql::params![
                        access.as_i64(),
                        format_timestamp(&now),
                        self.workspace_id.to_string(),
                        page_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to update access")?;
        }
        Ok(())
    }

    /// Set (or clear, with `None`) `archived_at` on every page in `page_ids`
    pub async fn set_archived_at(
        &self,
        page_ids: &[Uuid],
        archived_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), PageServiceError> {
        for page_id in page_ids {
            self.conn
                .execute(
                    "UPDATE pages SET archived_at = ?, updated_at = ? WHERE workspace_id = ? AND id = ?",
                    libsql::params![
                        format_optional_timestamp(&archived_at),
                        format_timestamp(&now),
                        self.workspace_id.to_string(),
                        page_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to update archived_at")?;
        }
        Ok(())
    }

    /// Stamp `deleted_at` on live pages; pages not yet archived are archived at the same instant
    pub async fn soft_delete(
        &self,
        page_ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<(), PageServiceError> {
        let stamp = format_timestamp(&at);
        for page_id in page_ids {
            self.conn
                .execute(
                    "UPDATE pages SET deleted_at = ?, archived_at = COALESCE(archived_at, ?), updated_at = ?
                     WHERE workspace_id = ? AND id = ? AND deleted_at IS NULL",
                    libsql::params![
                        stamp.clone(),
                        stamp.clone(),
                        stamp.clone(),
                        self.workspace_id.to_string(),
                        page_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to soft-delete page")?;
        }
        Ok(())
    }

    /// Clear `deleted_at`
    pub async fn restore(&self, page_id: Uuid, now: DateTime<Utc>) -> Result<(), PageServiceError> {
        self.conn
            .execute(
                "UPDATE pages SET deleted_at = NULL, updated_at = ? WHERE workspace_id = ? AND id = ?",
                libsql::params![
                    format_timestamp(&now),
                    self.workspace_id.to_string(),
                    page_id.to_string()
                ],
            )
            .await
            .sql_context("Failed to restore page")?;
        Ok(())
    }

    /// Remove pages for good, together with their versions, project links,
    /// favorites and recent visits
    pub async fn hard_delete(&self, page_ids: &[Uuid]) -> Result<(), PageServiceError> {
        FavoritesIndex::new(self.conn, self.workspace_id)
            .purge_pages(page_ids)
            .await?;

        let workspace = self.workspace_id.to_string();
        for page_id in page_ids {
            let id = page_id.to_string();
            self.conn
                .execute(
                    "DELETE FROM page_versions WHERE workspace_id = ? AND page_id = ?",
                    libsql::params![workspace.clone(), id.clone()],
                )
                .await
                .sql_context("Failed to delete page versions")?;
            self.conn
                .execute(
                    "DELETE FROM page_projects WHERE workspace_id = ? AND page_id = ?",
                    libsql::params![workspace.clone(), id.clone()],
                )
                .await
                .sql_context("Failed to delete page project links")?;
            self.conn
                .execute(
                    "DELETE FROM pages WHERE workspace_id = ? AND id = ?",
                    libsql::params![workspace.clone(), id],
                )
                .await
                .sql_context("Failed to delete page")?;
        }

        tracing::debug!("Hard-deleted {} page(s)", page_ids.len());
        Ok(())
    }

    /// Live children of a page, oldest first
    pub async fn list_children(&self, parent_id: Uuid) -> Result<Vec<Page>, PageServiceError> {
        self.query_pages(
            &format!(
                "SELECT {} FROM pages
                 WHERE workspace_id = ? AND parent_id = ? AND deleted_at IS NULL
                 ORDER BY created_at, id",
                PAGE_COLUMNS
            ),
            libsql::params![self.workspace_id.to_string(), parent_id.to_string()],
        )
        .await
    }

    /// Non-deleted pages matching `filter`, newest first
    ///
    /// Private pages are only returned to their owner. With a search term the
    /// public filter matches pages at any depth instead of roots only.
    pub async fn list(
        &self,
        filter: PageListFilter,
        actor: &Actor,
        search: Option<&str>,
    ) -> Result<Vec<Page>, PageServiceError> {
        let visibility = "(access = 0 OR owned_by = ?2)";
        let condition = match filter {
            PageListFilter::Public if search.is_some() => {
                "access = 0 AND archived_at IS NULL".to_string()
            }
            PageListFilter::Public => {
                "parent_id IS NULL AND access = 0 AND archived_at IS NULL".to_string()
            }
            PageListFilter::Private => "access = 1 AND owned_by = ?2".to_string(),
            PageListFilter::Archived => format!("archived_at IS NOT NULL AND {}", visibility),
            PageListFilter::All => visibility.to_string(),
        };

        let pattern = format!("%{}%", escape_like(&search.unwrap_or_default().to_lowercase()));
        let sql = format!(
            "SELECT {} FROM pages
             WHERE workspace_id = ?1 AND deleted_at IS NULL AND {}
               AND (?3 = '%%' OR lower(name) LIKE ?3 ESCAPE '\\')
             ORDER BY created_at DESC, id",
            PAGE_COLUMNS, condition
        );

        self.query_pages(
            &sql,
            libsql::params![
                self.workspace_id.to_string(),
                actor.user_id.to_string(),
                pattern
            ],
        )
        .await
    }

    /// Add a project to the registry used for reference checks
    pub async fn register_project(
        &self,
        project_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), PageServiceError> {
        if let Some(owner) = self.project_workspace(project_id).await? {
            if owner != self.workspace_id {
                return Err(PageServiceError::invalid_reference(format!(
                    "project {} is registered to workspace {}",
                    project_id, owner
                )));
            }
            return Ok(());
        }

        self.conn
            .execute(
                "INSERT INTO projects (id, workspace_id, created_at) VALUES (?, ?, ?)",
                libsql::params![
                    project_id.to_string(),
                    self.workspace_id.to_string(),
                    format_timestamp(&now)
                ],
            )
            .await
            .sql_context("Failed to register project")?;
        Ok(())
    }

    async fn project_workspace(&self, project_id: Uuid) -> Result<Option<Uuid>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                "SELECT workspace_id FROM projects WHERE id = ?",
                libsql::params![project_id.to_string()],
            )
            .await
            .sql_context("Failed to query project")?;

        match rows.next().await.sql_context("Failed to read project row")? {
            Some(row) => {
                let workspace: String = row.get(0).sql_context("Failed to get workspace_id")?;
                Ok(Some(parse_uuid(&workspace)?))
            }
            None => Ok(None),
        }
    }

    async fn check_project_reference(&self, project_id: Uuid) -> Result<(), PageServiceError> {
        match self.project_workspace(project_id).await? {
            Some(owner) if owner == self.workspace_id => Ok(()),
            Some(owner) => Err(PageServiceError::invalid_reference(format!(
                "project {} belongs to workspace {}",
                project_id, owner
            ))),
            None => Err(PageServiceError::project_not_found(project_id)),
        }
    }

    /// A parent must exist in this workspace and be live
    async fn check_parent_reference(&self, parent_id: Uuid) -> Result<(), PageServiceError> {
        let mut rows = self
            .conn
            .query(
                "SELECT workspace_id, deleted_at FROM pages WHERE id = ?",
                libsql::params![parent_id.to_string()],
            )
            .await
            .sql_context("Failed to query parent page")?;

        let row = match rows.next().await.sql_context("Failed to read parent row")? {
            Some(row) => row,
            None => return Err(PageServiceError::page_not_found(parent_id)),
        };

        let workspace: String = row.get(0).sql_context("Failed to get workspace_id")?;
        let deleted_at: Option<String> = row.get(1).sql_context("Failed to get deleted_at")?;

        if parse_uuid(&workspace)? != self.workspace_id {
            return Err(PageServiceError::invalid_reference(format!(
                "parent page {} belongs to another workspace",
                parent_id
            )));
        }
        if deleted_at.is_some() {
            return Err(PageServiceError::page_not_found(parent_id));
        }
        Ok(())
    }

    async fn query_pages(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Page>, PageServiceError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .sql_context("Failed to query pages")?;

        let mut pages = Vec::new();
        while let Some(row) = rows.next().await.sql_context("Failed to read page row")? {
            pages.push(row_to_page(&row)?);
        }

        let mut loaded = Vec::with_capacity(pages.len());
        for page in pages {
            loaded.push(self.with_projects(page).await?);
        }
        Ok(loaded)
    }

    async fn with_projects(&self, mut page: Page) -> Result<Page, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                "SELECT project_id FROM page_projects WHERE page_id = ? ORDER BY project_id",
                libsql::params![page.id.to_string()],
            )
            .await
            .sql_context("Failed to query page projects")?;

        while let Some(row) = rows.next().await.sql_context("Failed to read project link")? {
            let project: String = row.get(0).sql_context("Failed to get project_id")?;
            page.project_ids.push(parse_uuid(&project)?);
        }
        Ok(page)
    }
}

/// Decode a row selected with `PAGE_COLUMNS`; `project_ids` is left empty
fn row_to_page(row: &Row) -> Result<Page, DatabaseError> {
    let id: String = row.get(0).sql_context("Failed to get id")?;
    let workspace_id: String = row.get(1).sql_context("Failed to get workspace_id")?;
    let parent_id: Option<String> = row.get(2).sql_context("Failed to get parent_id")?;
    let name: String = row.get(3).sql_context("Failed to get name")?;
    let description_html: String = row.get(4).sql_context("Failed to get description_html")?;
    let description_binary: Option<Vec<u8>> =
        row.get(5).sql_context("Failed to get description_binary")?;
    let description_json: String = row.get(6).sql_context("Failed to get description_json")?;
    let description_stripped: Option<String> =
        row.get(7).sql_context("Failed to get description_stripped")?;
    let owned_by: String = row.get(8).sql_context("Failed to get owned_by")?;
    let is_locked: i64 = row.get(9).sql_context("Failed to get is_locked")?;
    let access: i64 = row.get(10).sql_context("Failed to get access")?;
    let archived_at: Option<String> = row.get(11).sql_context("Failed to get archived_at")?;
    let deleted_at: Option<String> = row.get(12).sql_context("Failed to get deleted_at")?;
    let created_at: String = row.get(13).sql_context("Failed to get created_at")?;
    let updated_at: String = row.get(14).sql_context("Failed to get updated_at")?;

    Ok(Page {
        id: parse_uuid(&id)?,
        workspace_id: parse_uuid(&workspace_id)?,
        project_ids: Vec::new(),
        parent_id: parse_optional_uuid(parent_id)?,
        name,
        content: PageContent {
            description_html,
            description_binary,
            description_json: serde_json::from_str(&description_json).map_err(|e| {
                DatabaseError::invalid_row(format!("Invalid description_json for {}: {}", id, e))
            })?,
            description_stripped,
        },
        owned_by: parse_uuid(&owned_by)?,
        is_locked: is_locked != 0,
        access: PageAccess::from_i64(access)
            .map_err(|e| DatabaseError::invalid_row(format!("Page {}: {}", id, e)))?,
        archived_at: parse_optional_timestamp(archived_at)?,
        deleted_at: parse_optional_timestamp(deleted_at)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Escape `LIKE` wildcards so a search term matches literally (`ESCAPE '\'`)
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_quotes_wildcards() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
