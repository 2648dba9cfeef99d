//! Page Data Structures
//!
//! This module defines the `Page` struct and the input types used to create
//! and edit pages.
//!
//! # Architecture
//!
//! - **Back-reference tree**: a page only knows its `parent_id`; children are
//!   discovered by querying (see `db::TreeWalker`)
//! - **Soft delete**: `deleted_at` hides a page from normal reads but keeps the
//!   row for restore
//! - **Orthogonal flags**: `is_locked` and `access` are independent of the
//!   archive/delete lifecycle
//!
//! # Examples
//!
//! ```rust
//! use pagetree_core::models::{NewPage, PageAccess, PageContent};
//! use uuid::Uuid;
//!
//! let workspace_id = Uuid::new_v4();
//! let new_page = NewPage::new(workspace_id, "Roadmap")
//!     .with_access(PageAccess::Private)
//!     .with_content(PageContent::from_html("<p>Q3 goals</p>"));
//!
//! assert!(new_page.validate().is_ok());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of a page name (characters)
pub const MAX_PAGE_NAME_LENGTH: usize = 255;

/// Default HTML body for a page created without content
pub const EMPTY_DESCRIPTION_HTML: &str = "<p></p>";

/// Validation errors for Page operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Page name exceeds {max} characters (got {actual})")]
    NameTooLong { max: usize, actual: usize },

    #[error("Invalid access value: {0}")]
    InvalidAccess(i64),

    #[error("Invalid workspace role value: {0}")]
    InvalidRole(i64),
}

/// Page visibility
///
/// Stored as an integer (0 = public, 1 = private).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAccess {
    #[default]
    Public,
    Private,
}

impl PageAccess {
    pub fn as_i64(self) -> i64 {
        match self {
            PageAccess::Public => 0,
            PageAccess::Private => 1,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self, ValidationError> {
        match value {
            0 => Ok(PageAccess::Public),
            1 => Ok(PageAccess::Private),
            other => Err(ValidationError::InvalidAccess(other)),
        }
    }
}

/// Document content of a page (also the payload of a version snapshot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub description_html: String,

    /// Collaborative-editor document state (opaque to this crate)
    #[serde(default)]
    pub description_binary: Option<Vec<u8>>,

    pub description_json: Value,

    /// Plain text extracted from `description_html`
    #[serde(default)]
    pub description_stripped: Option<String>,
}

impl Default for PageContent {
    fn default() -> Self {
        Self::from_html(EMPTY_DESCRIPTION_HTML)
    }
}

impl PageContent {
    /// Build content from HTML, deriving the stripped text
    pub fn from_html(html: impl Into<String>) -> Self {
        let description_html = html.into();
        let stripped = strip_html(&description_html);
        Self {
            description_html,
            description_binary: None,
            description_json: json!({}),
            description_stripped: if stripped.is_empty() {
                None
            } else {
                Some(stripped)
            },
        }
    }

    pub fn with_binary(mut self, binary: Vec<u8>) -> Self {
        self.description_binary = Some(binary);
        self
    }

    pub fn with_json(mut self, json: Value) -> Self {
        self.description_json = json;
        self
    }
}

/// Remove markup tags, decode common entities and collapse whitespace
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    // `&amp;` last so "&amp;lt;" decodes to "&lt;" and not "<"
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A hierarchical document node within a workspace
///
/// # Fields
///
/// - `id`: Unique identifier
/// - `workspace_id`: Owning workspace (every query is scoped to it)
/// - `project_ids`: Projects the page is attached to (may be empty)
/// - `parent_id`: Parent page, `None` for a root page
/// - `owned_by`: Creator; owner-only operations check against it
/// - `archived_at` / `deleted_at`: Lifecycle timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: Uuid,
    pub workspace_id: Uuid,
    #[serde(default)]
    pub project_ids: Vec<Uuid>,
    pub parent_id: Option<Uuid>,
    pub name: String,
    #[serde(flatten)]
    pub content: PageContent,
    pub owned_by: Uuid,
    pub is_locked: bool,
    pub access: PageAccess,
    pub archived_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Input for creating a page
#[derive(Debug, Clone, PartialEq)]
pub struct NewPage {
    /// Optional client-generated ID; generated when `None`
    pub id: Option<Uuid>,
    pub workspace_id: Uuid,
    pub project_ids: Vec<Uuid>,
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub content: PageContent,
    pub access: PageAccess,
}

impl NewPage {
    pub fn new(workspace_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: None,
            workspace_id,
            project_ids: Vec::new(),
            parent_id: None,
            name: name.into(),
            content: PageContent::default(),
            access: PageAccess::Public,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_ids.push(project_id);
        self
    }

    pub fn with_access(mut self, access: PageAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_content(mut self, content: PageContent) -> Self {
        self.content = content;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)
    }

    /// Materialize the page row for `owner` at `now`
    pub fn into_page(self, owner: Uuid, now: DateTime<Utc>) -> Page {
        Page {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            workspace_id: self.workspace_id,
            project_ids: self.project_ids,
            parent_id: self.parent_id,
            name: self.name,
            content: self.content,
            owned_by: owner,
            is_locked: false,
            access: self.access,
            archived_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of page metadata (sparse: only provided fields change)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageUpdate {
    pub name: Option<String>,
}

impl PageUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.name {
            Some(name) => validate_name(name),
            None => Ok(()),
        }
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    let actual = name.chars().count();
    if actual > MAX_PAGE_NAME_LENGTH {
        return Err(ValidationError::NameTooLong {
            max: MAX_PAGE_NAME_LENGTH,
            actual,
        });
    }
    Ok(())
}

/// Listing filter, mirroring the page sidebar tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageListFilter {
    /// Public root pages that are not archived
    #[default]
    Public,
    /// The caller's own private pages
    Private,
    /// Archived pages visible to the caller
    Archived,
    /// Every visible, non-deleted page
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_removes_tags_and_collapses_whitespace() {
        assert_eq!(
            strip_html("<h1>Plan</h1>\n<p>Ship <b>v2</b>  soon</p>"),
            "Plan Ship v2 soon"
        );
        assert_eq!(strip_html("<p></p>"), "");
    }

    #[test]
    fn test_strip_html_decodes_entities() {
        assert_eq!(
            strip_html("<p>R&amp;D&nbsp;budget &lt; 5%</p>"),
            "R&D budget < 5%"
        );
        assert_eq!(strip_html("<p>&quot;draft&quot; &#39;v2&#39;</p>"), "\"draft\" 'v2'");
        assert_eq!(strip_html("a &amp;lt; b"), "a &lt; b");
    }

    #[test]
    fn test_default_content_is_empty_paragraph() {
        let content = PageContent::default();
        assert_eq!(content.description_html, EMPTY_DESCRIPTION_HTML);
        assert_eq!(content.description_stripped, None);
        assert_eq!(content.description_json, json!({}));
    }

    #[test]
    fn test_access_integer_mapping() {
        assert_eq!(PageAccess::from_i64(0), Ok(PageAccess::Public));
        assert_eq!(PageAccess::from_i64(1), Ok(PageAccess::Private));
        assert_eq!(PageAccess::Private.as_i64(), 1);
        assert_eq!(
            PageAccess::from_i64(7),
            Err(ValidationError::InvalidAccess(7))
        );
    }

    #[test]
    fn test_name_length_validation() {
        let workspace_id = Uuid::new_v4();
        assert!(NewPage::new(workspace_id, "").validate().is_ok());

        let long_name = "x".repeat(MAX_PAGE_NAME_LENGTH + 1);
        let err = NewPage::new(workspace_id, long_name).validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::NameTooLong {
                max: MAX_PAGE_NAME_LENGTH,
                actual: MAX_PAGE_NAME_LENGTH + 1
            }
        );

        let update = PageUpdate {
            name: Some("y".repeat(300)),
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_into_page_sets_owner_and_timestamps() {
        let workspace_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let now = Utc::now();

        let page = NewPage::new(workspace_id, "Child")
            .with_parent(parent)
            .into_page(owner, now);

        assert_eq!(page.owned_by, owner);
        assert_eq!(page.parent_id, Some(parent));
        assert_eq!(page.created_at, now);
        assert_eq!(page.updated_at, now);
        assert!(!page.is_locked);
        assert!(!page.is_archived());
        assert!(!page.is_deleted());
    }

    #[test]
    fn test_page_serializes_flattened_content_in_camel_case() {
        let page = NewPage::new(Uuid::new_v4(), "Doc").into_page(Uuid::new_v4(), Utc::now());
        let value = serde_json::to_value(&page).unwrap();

        assert_eq!(value["descriptionHtml"], EMPTY_DESCRIPTION_HTML);
        assert_eq!(value["access"], "public");
        assert!(value.get("content").is_none());
        assert!(value["parentId"].is_null());
    }
}
