//! PageTree Core Business Logic Layer
//!
//! Hierarchical, versioned documents ("pages") for a multi-tenant workspace
//! product: a per-workspace forest of pages with lock, access, archive, move,
//! soft-delete and point-in-time restore of whole subtrees.
//!
//! # Architecture
//!
//! - **Back-references only**: a page stores its `parent_id`; subtrees are
//!   computed by walking the table
//! - **libsql**: Embedded SQLite-compatible database, one immediate
//!   transaction per operation
//! - **Events after commit**: observers subscribe to a broadcast channel
//!
//! # Modules
//!
//! - [`models`] - Data structures (Page, PageVersion, Favorite, Actor)
//! - [`services`] - `PageService` and its collaborator traits
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Runtime configuration

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::PageTreeConfig;
pub use models::*;
pub use services::*;
