//! Version Store
//!
//! Append-or-coalesce log of page content snapshots. Repeated saves by the
//! same editor inside the coalescing window rewrite the latest version in
//! place; anything else appends a new row.
//!
//! Versions share their page's soft-delete stamp and are brought back by
//! `restore_in_window` when the page is restored.

use crate::db::database::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, parse_uuid,
};
use crate::db::error::{DatabaseError, SqlContext};
use crate::models::{Page, PageContent, PageVersion, PageVersionLite, SubPageSnapshot};
use crate::services::PageServiceError;
use chrono::{DateTime, Duration, Utc};
use libsql::{Connection, Row};
use uuid::Uuid;

const VERSION_COLUMNS: &str = "id, page_id, workspace_id, owned_by, description_html, \
     description_binary, description_json, description_stripped, sub_pages_data, \
     last_saved_at, created_at, updated_at, deleted_at";

const VERSION_LITE_COLUMNS: &str =
    "id, page_id, workspace_id, owned_by, last_saved_at, created_at, updated_at";

pub struct VersionStore<'a> {
    conn: &'a Connection,
    workspace_id: Uuid,
}

impl<'a> VersionStore<'a> {
    pub fn new(conn: &'a Connection, workspace_id: Uuid) -> Self {
        Self { conn, workspace_id }
    }

    /// Most recent non-deleted version of a page by `last_saved_at`
    pub async fn latest(&self, page_id: Uuid) -> Result<Option<PageVersion>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM page_versions
                     WHERE workspace_id = ? AND page_id = ? AND deleted_at IS NULL
                     ORDER BY last_saved_at DESC, created_at DESC
                     LIMIT 1",
                    VERSION_COLUMNS
                ),
                libsql::params![self.workspace_id.to_string(), page_id.to_string()],
            )
            .await
            .sql_context("Failed to query latest version")?;

        match rows.next().await.sql_context("Failed to read version row")? {
            Some(row) => Ok(Some(row_to_version(&row)?)),
            None => Ok(None),
        }
    }

    /// Record the page's current content as a version
    ///
    /// Must run inside the caller's immediate transaction so the
    /// read-decide-write below is atomic.
    pub async fn snapshot(
        &self,
        page: &Page,
        editor: Uuid,
        sub_pages: Vec<SubPageSnapshot>,
        now: DateTime<Utc>,
        coalesce_window: Duration,
    ) -> Result<PageVersion, PageServiceError> {
        let sub_pages_json = serde_json::to_string(&sub_pages)?;
        let description_json = serde_json::to_string(&page.content.description_json)?;

        if let Some(mut latest) = self.latest(page.id).await? {
            if latest.owned_by == editor && now - latest.last_saved_at <= coalesce_window {
                self.conn
                    .execute(
                        "UPDATE page_versions SET description_html = ?, description_binary = ?,
                             description_json = ?, description_stripped = ?, sub_pages_data = ?,
                             last_saved_at = ?, updated_at = ?
                         WHERE id = ?",
                        libsql::params![
                            page.content.description_html.clone(),
                            page.content.description_binary.clone(),
                            description_json,
                            page.content.description_stripped.clone(),
                            sub_pages_json,
                            format_timestamp(&now),
                            format_timestamp(&now),
                            latest.id.to_string()
                        ],
                    )
                    .await
                    .sql_context("Failed to coalesce version")?;

                tracing::debug!("Coalesced save of page {} into version {}", page.id, latest.id);

                latest.content = page.content.clone();
                latest.sub_pages_data = sub_pages;
                latest.last_saved_at = now;
                latest.updated_at = now;
                return Ok(latest);
            }
        }

        let version = PageVersion {
            id: Uuid::new_v4(),
            page_id: page.id,
            workspace_id: self.workspace_id,
            owned_by: editor,
            content: page.content.clone(),
            sub_pages_data: sub_pages,
            last_saved_at: page.updated_at,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.conn
            .execute(
                &format!(
                    "INSERT INTO page_versions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    VERSION_COLUMNS
                ),
                libsql::params![
                    version.id.to_string(),
                    version.page_id.to_string(),
                    version.workspace_id.to_string(),
                    version.owned_by.to_string(),
                    version.content.description_html.clone(),
                    version.content.description_binary.clone(),
                    description_json,
                    version.content.description_stripped.clone(),
                    sub_pages_json,
                    format_timestamp(&version.last_saved_at),
                    format_timestamp(&version.created_at),
                    format_timestamp(&version.updated_at),
                    None::<String>
                ],
            )
            .await
            .sql_context("Failed to insert version")?;

        tracing::debug!("Appended version {} for page {}", version.id, page.id);
        Ok(version)
    }

    /// Non-deleted versions of a page, newest first
    pub async fn list_for_page(
        &self,
        page_id: Uuid,
    ) -> Result<Vec<PageVersionLite>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM page_versions
                     WHERE workspace_id = ? AND page_id = ? AND deleted_at IS NULL
                     ORDER BY last_saved_at DESC, created_at DESC",
                    VERSION_LITE_COLUMNS
                ),
                libsql::params![self.workspace_id.to_string(), page_id.to_string()],
            )
            .await
            .sql_context("Failed to list versions")?;

        let mut versions = Vec::new();
        while let Some(row) = rows.next().await.sql_context("Failed to read version row")? {
            versions.push(row_to_version_lite(&row)?);
        }
        Ok(versions)
    }

    /// Full projection of a non-deleted version of `page_id`
    pub async fn get(
        &self,
        page_id: Uuid,
        version_id: Uuid,
    ) -> Result<PageVersion, PageServiceError> {
        match self.find_any(version_id).await? {
            Some(version) if version.page_id == page_id && version.deleted_at.is_none() => {
                Ok(version)
            }
            _ => Err(PageServiceError::version_not_found(version_id)),
        }
    }

    /// Version by id including soft-deleted rows
    pub async fn find_any(&self, version_id: Uuid) -> Result<Option<PageVersion>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM page_versions WHERE workspace_id = ? AND id = ?",
                    VERSION_COLUMNS
                ),
                libsql::params![self.workspace_id.to_string(), version_id.to_string()],
            )
            .await
            .sql_context("Failed to query version")?;

        match rows.next().await.sql_context("Failed to read version row")? {
            Some(row) => Ok(Some(row_to_version(&row)?)),
            None => Ok(None),
        }
    }

    /// Stamp `deleted_at` on every live version of the given pages
    pub async fn soft_delete_for_pages(
        &self,
        page_ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<u64, PageServiceError> {
        let stamp = format_timestamp(&at);
        let mut total = 0;
        for page_id in page_ids {
            total += self
                .conn
                .execute(
                    "UPDATE page_versions SET deleted_at = ?, updated_at = ?
                     WHERE workspace_id = ? AND page_id = ? AND deleted_at IS NULL",
                    libsql::params![
                        stamp.clone(),
                        stamp.clone(),
                        self.workspace_id.to_string(),
                        page_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to soft-delete versions")?;
        }
        Ok(total)
    }

    /// Soft-deleted versions saved within `window` either side of `deleted_at`
    pub async fn restore_window(
        &self,
        page_id: Uuid,
        deleted_at: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<PageVersionLite>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM page_versions
                     WHERE workspace_id = ? AND page_id = ? AND deleted_at IS NOT NULL
                       AND last_saved_at >= ? AND last_saved_at <= ?
                     ORDER BY last_saved_at DESC",
                    VERSION_LITE_COLUMNS
                ),
                libsql::params![
                    self.workspace_id.to_string(),
                    page_id.to_string(),
                    format_timestamp(&(deleted_at - window)),
                    format_timestamp(&(deleted_at + window))
                ],
            )
            .await
            .sql_context("Failed to query restore window")?;

        let mut versions = Vec::new();
        while let Some(row) = rows.next().await.sql_context("Failed to read version row")? {
            versions.push(row_to_version_lite(&row)?);
        }
        Ok(versions)
    }

    /// Clear `deleted_at` on the versions `restore_window` selects
    pub async fn restore_in_window(
        &self,
        page_id: Uuid,
        deleted_at: DateTime<Utc>,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, PageServiceError> {
        let versions = self.restore_window(page_id, deleted_at, window).await?;
        for version in &versions {
            self.conn
                .execute(
                    "UPDATE page_versions SET deleted_at = NULL, updated_at = ? WHERE id = ?",
                    libsql::params![format_timestamp(&now), version.id.to_string()],
                )
                .await
                .sql_context("Failed to restore version")?;
        }
        Ok(versions.into_iter().map(|version| version.id).collect())
    }
}

fn row_to_version(row: &Row) -> Result<PageVersion, DatabaseError> {
    let id: String = row.get(0).sql_context("Failed to get id")?;
    let page_id: String = row.get(1).sql_context("Failed to get page_id")?;
    let workspace_id: String = row.get(2).sql_context("Failed to get workspace_id")?;
    let owned_by: String = row.get(3).sql_context("Failed to get owned_by")?;
    let description_html: String = row.get(4).sql_context("Failed to get description_html")?;
    let description_binary: Option<Vec<u8>> =
        row.get(5).sql_context("Failed to get description_binary")?;
    let description_json: String = row.get(6).sql_context("Failed to get description_json")?;
    let description_stripped: Option<String> =
        row.get(7).sql_context("Failed to get description_stripped")?;
    let sub_pages_data: String = row.get(8).sql_context("Failed to get sub_pages_data")?;
    let last_saved_at: String = row.get(9).sql_context("Failed to get last_saved_at")?;
    let created_at: String = row.get(10).sql_context("Failed to get created_at")?;
    let updated_at: String = row.get(11).sql_context("Failed to get updated_at")?;
    let deleted_at: Option<String> = row.get(12).sql_context("Failed to get deleted_at")?;

    let invalid_json =
        |field: &str, e: serde_json::Error| DatabaseError::invalid_row(format!("Invalid {} for version {}: {}", field, id, e));

    Ok(PageVersion {
        id: parse_uuid(&id)?,
        page_id: parse_uuid(&page_id)?,
        workspace_id: parse_uuid(&workspace_id)?,
        owned_by: parse_uuid(&owned_by)?,
        content: PageContent {
            description_html,
            description_binary,
            description_json: serde_json::from_str(&description_json)
                .map_err(|e| invalid_json("description_json", e))?,
            description_stripped,
        },
        sub_pages_data: serde_json::from_str(&sub_pages_data)
            .map_err(|e| invalid_json("sub_pages_data", e))?,
        last_saved_at: parse_timestamp(&last_saved_at)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        deleted_at: parse_optional_timestamp(deleted_at)?,
    })
}

fn row_to_version_lite(row: &Row) -> Result<PageVersionLite, DatabaseError> {
    let id: String = row.get(0).sql_context("Failed to get id")?;
    let page_id: String = row.get(1).sql_context("Failed to get page_id")?;
    let workspace_id: String = row.get(2).sql_context("Failed to get workspace_id")?;
    let owned_by: String = row.get(3).sql_context("Failed to get owned_by")?;
    let last_saved_at: String = row.get(4).sql_context("Failed to get last_saved_at")?;
    let created_at: String = row.get(5).sql_context("Failed to get created_at")?;
    let updated_at: String = row.get(6).sql_context("Failed to get updated_at")?;

    Ok(PageVersionLite {
        id: parse_uuid(&id)?,
        page_id: parse_uuid(&page_id)?,
        workspace_id: parse_uuid(&workspace_id)?,
        owned_by: parse_uuid(&owned_by)?,
        last_saved_at: parse_timestamp(&last_saved_at)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
