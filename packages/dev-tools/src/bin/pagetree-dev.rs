//! PageTree database inspector
//!
//! Opens the database named by `PAGETREE_DB_PATH` (see `PageTreeConfig::from_env`)
//! and prints what the tree walker and stores see, as JSON.
//!
//! ```text
//! pagetree-dev page      <workspace-id> <page-id>
//! pagetree-dev tree      <workspace-id> <page-id>
//! pagetree-dev ancestors <workspace-id> <page-id>
//! pagetree-dev versions  <workspace-id> <page-id>
//! ```
//!
//! Soft-deleted pages are included everywhere, so the output shows exactly
//! what a restore would reconcile against.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pagetree_core::db::{DatabaseService, PageStore, TreeWalker, VersionStore};
use pagetree_core::PageTreeConfig;
use serde_json::{json, Value};
use uuid::Uuid;

/// Inspect a PageTree database
#[derive(Parser, Debug)]
#[command(name = "pagetree-dev")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a page row, deleted or not
    Page(Target),

    /// Print the recorded sub-page snapshot of a page
    Tree(Target),

    /// Print the ancestor chain up to the root
    Ancestors(Target),

    /// Print the non-deleted versions of a page
    Versions(Target),
}

#[derive(Args, Debug)]
struct Target {
    /// Workspace the page belongs to
    workspace_id: Uuid,

    /// Page to inspect
    page_id: Uuid,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PageTreeConfig::from_env();
    tracing::info!("Opening {}", config.database_path.display());
    let db = DatabaseService::from_config(&config)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    let conn = db.connect_with_timeout().await?;

    let output: Value = match cli.command {
        Command::Page(Target {
            workspace_id,
            page_id,
        }) => {
            let page = PageStore::new(&conn, workspace_id)
                .find_any(page_id)
                .await?
                .with_context(|| format!("Page {} not found", page_id))?;
            serde_json::to_value(page)?
        }
        Command::Tree(Target {
            workspace_id,
            page_id,
        }) => {
            let entries = TreeWalker::new(&conn, workspace_id)
                .subtree_snapshot(page_id)
                .await?;
            json!({ "pageId": page_id, "subPages": entries })
        }
        Command::Ancestors(Target {
            workspace_id,
            page_id,
        }) => {
            let chain = TreeWalker::new(&conn, workspace_id)
                .ancestor_chain(page_id)
                .await?;
            json!({ "pageId": page_id, "ancestors": chain })
        }
        Command::Versions(Target {
            workspace_id,
            page_id,
        }) => {
            let versions = VersionStore::new(&conn, workspace_id)
                .list_for_page(page_id)
                .await?;
            json!({ "pageId": page_id, "versions": versions })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_subcommand_ids() {
        let workspace_id = Uuid::new_v4();
        let page_id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "pagetree-dev",
            "tree",
            &workspace_id.to_string(),
            &page_id.to_string(),
        ])
        .unwrap();

        match cli.command {
            Command::Tree(target) => {
                assert_eq!(target.workspace_id, workspace_id);
                assert_eq!(target.page_id, page_id);
            }
            other => panic!("expected tree, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_malformed_ids() {
        let result = Cli::try_parse_from(["pagetree-dev", "page", "not-a-uuid", "also-not"]);
        assert!(result.is_err());
    }
}
