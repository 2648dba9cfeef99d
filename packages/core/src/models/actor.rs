//! The caller of a page operation, as resolved by the request layer

use crate::models::{Page, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workspace membership role
///
/// Stored upstream as an integer; only `Admin` may manage pages it does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    Guest,
    Member,
    Admin,
}

impl WorkspaceRole {
    pub fn as_i64(self) -> i64 {
        match self {
            WorkspaceRole::Guest => 5,
            WorkspaceRole::Member => 15,
            WorkspaceRole::Admin => 20,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self, ValidationError> {
        match value {
            5 => Ok(WorkspaceRole::Guest),
            15 => Ok(WorkspaceRole::Member),
            20 => Ok(WorkspaceRole::Admin),
            other => Err(ValidationError::InvalidRole(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: Uuid,
    pub role: WorkspaceRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: WorkspaceRole) -> Self {
        Self { user_id, role }
    }

    pub fn member(user_id: Uuid) -> Self {
        Self::new(user_id, WorkspaceRole::Member)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, WorkspaceRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == WorkspaceRole::Admin
    }

    pub fn owns(&self, page: &Page) -> bool {
        page.owned_by == self.user_id
    }

    /// Admin-or-owner gate used by archive, unarchive and delete
    pub fn can_manage(&self, page: &Page) -> bool {
        self.is_admin() || self.owns(page)
    }

    /// Private pages are only visible to their owner
    pub fn can_view(&self, page: &Page) -> bool {
        page.access == crate::models::PageAccess::Public || self.owns(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPage, PageAccess};
    use chrono::Utc;

    #[test]
    fn test_admin_or_owner_gate() {
        let owner = Uuid::new_v4();
        let page = NewPage::new(Uuid::new_v4(), "Roadmap").into_page(owner, Utc::now());

        assert!(Actor::member(owner).can_manage(&page));
        assert!(Actor::admin(Uuid::new_v4()).can_manage(&page));
        assert!(!Actor::member(Uuid::new_v4()).can_manage(&page));
        assert!(!Actor::new(Uuid::new_v4(), WorkspaceRole::Guest).can_manage(&page));
    }

    #[test]
    fn test_private_pages_hidden_from_non_owners() {
        let owner = Uuid::new_v4();
        let page = NewPage::new(Uuid::new_v4(), "Notes")
            .with_access(PageAccess::Private)
            .into_page(owner, Utc::now());

        assert!(Actor::member(owner).can_view(&page));
        assert!(!Actor::admin(Uuid::new_v4()).can_view(&page));
    }

    #[test]
    fn test_role_integer_mapping() {
        assert_eq!(WorkspaceRole::from_i64(20), Ok(WorkspaceRole::Admin));
        assert_eq!(WorkspaceRole::Member.as_i64(), 15);
        assert!(WorkspaceRole::from_i64(3).is_err());
    }
}
