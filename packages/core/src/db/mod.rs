//! Database Layer
//!
//! This module handles all database interactions using libsql (embedded SQLite):
//!
//! - Database initialization and connection management
//! - Page rows, project links and the project registry (`PageStore`)
//! - Version snapshots with coalescing (`VersionStore`)
//! - Subtree and ancestor walks over parent back-references (`TreeWalker`)
//! - Per-user favorites and recent visits (`FavoritesIndex`)
//! - Domain events emitted after commits
//!
//! # Architecture
//!
//! The stores are thin views over a borrowed `libsql::Connection` scoped to
//! one workspace. They never open transactions themselves: `PageService`
//! begins an immediate transaction, hands the same connection to every store
//! it needs, and commits once.

mod database;
mod error;
pub mod events;
mod favorites;
mod page_store;
mod tree_walker;
mod version_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::{PageEvent, PageEventKind};
pub use favorites::FavoritesIndex;
pub use page_store::PageStore;
pub use tree_walker::TreeWalker;
pub use version_store::VersionStore;
