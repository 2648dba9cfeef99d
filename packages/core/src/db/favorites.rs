//! Favorites and recent visits
//!
//! Per-user side tables keyed by page id. Neither table holds a foreign key,
//! so page deletion purges them explicitly through `purge_pages`.

use crate::db::database::{format_timestamp, parse_optional_uuid, parse_timestamp, parse_uuid};
use crate::db::error::{DatabaseError, SqlContext};
use crate::models::{Favorite, RecentVisit, PAGE_ENTITY};
use crate::services::PageServiceError;
use chrono::{DateTime, Utc};
use libsql::{Connection, Row};
use uuid::Uuid;

const FAVORITE_COLUMNS: &str =
    "id, workspace_id, user_id, entity_type, entity_identifier, project_id, created_at";

const VISIT_COLUMNS: &str =
    "id, workspace_id, user_id, entity_name, entity_identifier, project_id, visited_at";

pub struct FavoritesIndex<'a> {
    conn: &'a Connection,
    workspace_id: Uuid,
}

impl<'a> FavoritesIndex<'a> {
    pub fn new(conn: &'a Connection, workspace_id: Uuid) -> Self {
        Self { conn, workspace_id }
    }

    /// Bookmark a page; adding an existing favorite returns the stored row
    pub async fn add(
        &self,
        user_id: Uuid,
        page_id: Uuid,
        project_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Favorite, PageServiceError> {
        self.conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO user_favorites ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    FAVORITE_COLUMNS
                ),
                libsql::params![
                    Uuid::new_v4().to_string(),
                    self.workspace_id.to_string(),
                    user_id.to_string(),
                    PAGE_ENTITY,
                    page_id.to_string(),
                    project_id.map(|id| id.to_string()),
                    format_timestamp(&now)
                ],
            )
            .await
            .sql_context("Failed to insert favorite")?;

        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM user_favorites
                     WHERE user_id = ? AND entity_type = ? AND entity_identifier = ?",
                    FAVORITE_COLUMNS
                ),
                libsql::params![user_id.to_string(), PAGE_ENTITY, page_id.to_string()],
            )
            .await
            .sql_context("Failed to query favorite")?;

        match rows.next().await.sql_context("Failed to read favorite row")? {
            Some(row) => Ok(row_to_favorite(&row)?),
            None => Err(DatabaseError::sql_execution(format!(
                "Favorite for page {} vanished after insert",
                page_id
            ))
            .into()),
        }
    }

    /// Remove a bookmark; returns whether one existed
    pub async fn remove(&self, user_id: Uuid, page_id: Uuid) -> Result<bool, PageServiceError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM user_favorites
                 WHERE workspace_id = ? AND user_id = ? AND entity_type = ? AND entity_identifier = ?",
                libsql::params![
                    self.workspace_id.to_string(),
                    user_id.to_string(),
                    PAGE_ENTITY,
                    page_id.to_string()
                ],
            )
            .await
            .sql_context("Failed to delete favorite")?;
        Ok(removed > 0)
    }

    /// A user's page favorites in this workspace, oldest first
    pub async fn list_favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM user_favorites
                     WHERE workspace_id = ? AND user_id = ? AND entity_type = ?
                     ORDER BY created_at, id",
                    FAVORITE_COLUMNS
                ),
                libsql::params![
                    self.workspace_id.to_string(),
                    user_id.to_string(),
                    PAGE_ENTITY
                ],
            )
            .await
            .sql_context("Failed to list favorites")?;

        let mut favorites = Vec::new();
        while let Some(row) = rows.next().await.sql_context("Failed to read favorite row")? {
            favorites.push(row_to_favorite(&row)?);
        }
        Ok(favorites)
    }

    /// Upsert a visit; revisiting bumps `visited_at`
    pub async fn record_visit(
        &self,
        user_id: Uuid,
        page_id: Uuid,
        project_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), PageServiceError> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO user_recent_visits ({}) VALUES (?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT (user_id, entity_name, entity_identifier)
                     DO UPDATE SET visited_at = excluded.visited_at",
                    VISIT_COLUMNS
                ),
                libsql::params![
                    Uuid::new_v4().to_string(),
                    self.workspace_id.to_string(),
                    user_id.to_string(),
                    PAGE_ENTITY,
                    page_id.to_string(),
                    project_id.map(|id| id.to_string()),
                    format_timestamp(&now)
                ],
            )
            .await
            .sql_context("Failed to record visit")?;
        Ok(())
    }

    /// A user's most recent page visits, newest first
    pub async fn list_recent(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<RecentVisit>, PageServiceError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM user_recent_visits
                     WHERE workspace_id = ? AND user_id = ? AND entity_name = ?
                     ORDER BY visited_at DESC, id
                     LIMIT ?",
                    VISIT_COLUMNS
                ),
                libsql::params![
                    self.workspace_id.to_string(),
                    user_id.to_string(),
                    PAGE_ENTITY,
                    limit as i64
                ],
            )
            .await
            .sql_context("Failed to list recent visits")?;

        let mut visits = Vec::new();
        while let Some(row) = rows.next().await.sql_context("Failed to read visit row")? {
            visits.push(row_to_visit(&row)?);
        }
        Ok(visits)
    }

    /// Drop every favorite and visit pointing at the given pages, for all users
    pub async fn purge_pages(&self, page_ids: &[Uuid]) -> Result<u64, PageServiceError> {
        let mut removed = 0;
        for page_id in page_ids {
            removed += self
                .conn
                .execute(
                    "DELETE FROM user_favorites
                     WHERE workspace_id = ? AND entity_type = ? AND entity_identifier = ?",
                    libsql::params![
                        self.workspace_id.to_string(),
                        PAGE_ENTITY,
                        page_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to purge favorites")?;
            removed += self
                .conn
                .execute(
                    "DELETE FROM user_recent_visits
                     WHERE workspace_id = ? AND entity_name = ? AND entity_identifier = ?",
                    libsql::params![
                        self.workspace_id.to_string(),
                        PAGE_ENTITY,
                        page_id.to_string()
                    ],
                )
                .await
                .sql_context("Failed to purge recent visits")?;
        }
        Ok(removed)
    }
}

fn row_to_favorite(row: &Row) -> Result<Favorite, DatabaseError> {
    let id: String = row.get(0).sql_context("Failed to get id")?;
    let workspace_id: String = row.get(1).sql_context("Failed to get workspace_id")?;
    let user_id: String = row.get(2).sql_context("Failed to get user_id")?;
    let entity_type: String = row.get(3).sql_context("Failed to get entity_type")?;
    let entity_identifier: String = row.get(4).sql_context("Failed to get entity_identifier")?;
    let project_id: Option<String> = row.get(5).sql_context("Failed to get project_id")?;
    let created_at: String = row.get(6).sql_context("Failed to get created_at")?;

    Ok(Favorite {
        id: parse_uuid(&id)?,
        workspace_id: parse_uuid(&workspace_id)?,
        user_id: parse_uuid(&user_id)?,
        entity_type,
        entity_identifier: parse_uuid(&entity_identifier)?,
        project_id: parse_optional_uuid(project_id)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_visit(row: &Row) -> Result<RecentVisit, DatabaseError> {
    let id: String = row.get(0).sql_context("Failed to get id")?;
    let workspace_id: String = row.get(1).sql_context("Failed to get workspace_id")?;
    let user_id: String = row.get(2).sql_context("Failed to get user_id")?;
    let entity_name: String = row.get(3).sql_context("Failed to get entity_name")?;
    let entity_identifier: String = row.get(4).sql_context("Failed to get entity_identifier")?;
    let project_id: Option<String> = row.get(5).sql_context("Failed to get project_id")?;
    let visited_at: String = row.get(6).sql_context("Failed to get visited_at")?;

    Ok(RecentVisit {
        id: parse_uuid(&id)?,
        workspace_id: parse_uuid(&workspace_id)?,
        user_id: parse_uuid(&user_id)?,
        entity_name,
        entity_identifier: parse_uuid(&entity_identifier)?,
        project_id: parse_optional_uuid(project_id)?,
        visited_at: parse_timestamp(&visited_at)?,
    })
}
