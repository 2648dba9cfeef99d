//! User bookmarks and visit history keyed to pages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity type recorded for page favorites and visits
pub const PAGE_ENTITY: &str = "page";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub entity_type: String,
    pub entity_identifier: Uuid,
    pub project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentVisit {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub entity_name: String,
    pub entity_identifier: Uuid,
    pub project_id: Option<Uuid>,
    pub visited_at: DateTime<Utc>,
}
