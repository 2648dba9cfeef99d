//! Data Models
//!
//! This module contains the core data structures of the page tree:
//!
//! - `Page` - Hierarchical document node
//! - `PageVersion` - Content + subtree snapshot saved by an editor
//! - `Favorite` / `RecentVisit` - Per-user side index entries
//! - `Actor` - Caller identity and workspace role
//! - `time` - Clock abstraction used for every timestamp

mod actor;
mod favorite;
mod page;
pub mod time;
mod version;

pub use actor::{Actor, WorkspaceRole};
pub use favorite::{Favorite, RecentVisit, PAGE_ENTITY};
pub use page::{
    strip_html, NewPage, Page, PageAccess, PageContent, PageListFilter, PageUpdate,
    ValidationError, EMPTY_DESCRIPTION_HTML, MAX_PAGE_NAME_LENGTH,
};
pub use version::{PageVersion, PageVersionLite, SubPageSnapshot};
