//! Page version snapshots
//!
//! A `PageVersion` records the content of a page together with the shape of
//! its subtree (`sub_pages_data`) at save time. The subtree record is what a
//! restore reconciles the live tree against.

use crate::models::PageContent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One descendant as it existed when a version was saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubPageSnapshot {
    pub id: Uuid,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SubPageSnapshot {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Full version projection (content + subtree snapshot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVersion {
    pub id: Uuid,
    pub page_id: Uuid,
    pub workspace_id: Uuid,
    pub owned_by: Uuid,
    #[serde(flatten)]
    pub content: PageContent,
    pub sub_pages_data: Vec<SubPageSnapshot>,
    pub last_saved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PageVersion {
    /// Ids of the descendants that were alive when this version was saved
    pub fn live_sub_page_ids(&self) -> Vec<Uuid> {
        self.sub_pages_data
            .iter()
            .filter(|entry| entry.is_live())
            .map(|entry| entry.id)
            .collect()
    }
}

/// Lite projection used for version listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVersionLite {
    pub id: Uuid,
    pub page_id: Uuid,
    pub workspace_id: Uuid,
    pub owned_by: Uuid,
    pub last_saved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PageVersion> for PageVersionLite {
    fn from(version: &PageVersion) -> Self {
        Self {
            id: version.id,
            page_id: version.page_id,
            workspace_id: version.workspace_id,
            owned_by: version.owned_by,
            last_saved_at: version.last_saved_at,
            created_at: version.created_at,
            updated_at: version.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sub_pages_data_accepts_entries_without_parent() {
        // Older snapshots only carried id + deleted_at
        let id = Uuid::new_v4();
        let entries: Vec<SubPageSnapshot> =
            serde_json::from_value(json!([{ "id": id, "deletedAt": null }])).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].parent_id, None);
        assert!(entries[0].is_live());
    }

    #[test]
    fn test_live_sub_page_ids_skips_deleted_entries() {
        let alive = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let now = Utc::now();
        let version = PageVersion {
            id: Uuid::new_v4(),
            page_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            owned_by: Uuid::new_v4(),
            content: PageContent::default(),
            sub_pages_data: vec![
                SubPageSnapshot {
                    id: alive,
                    parent_id: None,
                    deleted_at: None,
                },
                SubPageSnapshot {
                    id: gone,
                    parent_id: Some(alive),
                    deleted_at: Some(now),
                },
            ],
            last_saved_at: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        assert_eq!(version.live_sub_page_ids(), vec![alive]);

        let lite = PageVersionLite::from(&version);
        assert_eq!(lite.id, version.id);
        assert_eq!(lite.last_saved_at, now);
    }
}
