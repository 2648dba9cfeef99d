//! Restore Tests
//!
//! Integration tests for `PageService::restore`: bringing a deleted page back,
//! reconciling its subtree against the version's recorded sub-pages, and
//! recovering versions saved around the deletion.

#[cfg(test)]
mod restore_tests {
    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pagetree_core::db::DatabaseService;
    use pagetree_core::models::time::MockTimeProvider;
    use pagetree_core::models::{Actor, NewPage, Page, PageContent};
    use pagetree_core::services::{PageService, PageServiceError};
    use pagetree_core::PageTreeConfig;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 20, 8, 0, 0).unwrap()
    }

    /// Helper to create a service over a fresh database with a fixed clock
    async fn create_test_service() -> Result<(PageService, Arc<MockTimeProvider>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let config = PageTreeConfig::with_database_path(temp_dir.path().join("test.db"));
        let db = Arc::new(DatabaseService::from_config(&config).await?);
        let clock = Arc::new(MockTimeProvider::with_time(start_time()));
        let service = PageService::new(db, config).with_clock(clock.clone());
        Ok((service, clock, temp_dir))
    }

    async fn child_of(service: &PageService, owner: &Actor, parent: &Page, name: &str) -> Result<Page> {
        Ok(service
            .create_page(
                owner,
                NewPage::new(parent.workspace_id, name).with_parent(parent.id),
            )
            .await?)
    }

    async fn save(service: &PageService, actor: &Actor, page: &Page, html: &str) -> Result<()> {
        service
            .save_description(actor, page.workspace_id, page.id, PageContent::from_html(html))
            .await?;
        Ok(())
    }

    fn ids(pages: &[Page]) -> HashSet<Uuid> {
        pages.iter().map(|page| page.id).collect()
    }

    #[tokio::test]
    async fn test_restore_recovers_only_versions_near_deletion() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let admin = Actor::admin(Uuid::new_v4());
        let ws = Uuid::new_v4();
        let t0 = start_time() + Duration::minutes(30);

        let a = service.create_page(&owner, NewPage::new(ws, "A")).await?;

        clock.set_time(t0 - Duration::minutes(5));
        save(&service, &owner, &a, "<p>older draft</p>").await?;

        clock.set_time(t0 - Duration::seconds(30));
        save(&service, &admin, &a, "<p>final words</p>").await?;

        let versions = service.list_versions(&owner, ws, a.id).await?;
        assert_eq!(versions.len(), 2);
        let v1 = versions[0].id;
        let v2 = versions[1].id;

        clock.set_time(t0 - Duration::seconds(10));
        service.archive(&owner, ws, a.id).await?;
        clock.set_time(t0);
        service.delete_page(&owner, ws, a.id).await?;

        let result = service.get_page(&owner, ws, a.id).await;
        assert!(matches!(result, Err(PageServiceError::NotFound { .. })));

        clock.set_time(t0 + Duration::minutes(1));
        let outcome = service.restore(&owner, ws, a.id, v1).await?;

        assert_eq!(outcome.restored, vec![a.id]);
        assert_eq!(outcome.restored_versions, vec![v1]);
        assert!(outcome.pruned.is_empty());
        assert_eq!(outcome.page.content.description_html, "<p>final words</p>");

        let page = service.get_page(&owner, ws, a.id).await?;
        assert!(page.deleted_at.is_none());
        assert_eq!(page.content.description_html, "<p>final words</p>");

        let versions = service.list_versions(&owner, ws, a.id).await?;
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].id, v1);
        assert!(versions.iter().all(|version| version.id != v2));

        Ok(())
    }

    #[tokio::test]
    async fn test_restore_prunes_pages_created_after_version() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = service.create_page(&owner, NewPage::new(ws, "A")).await?;
        let b = child_of(&service, &owner, &a, "B").await?;
        save(&service, &owner, &a, "<p>with B</p>").await?;
        let version = service.list_versions(&owner, ws, a.id).await?[0].id;

        clock.advance(Duration::minutes(1));
        let c = child_of(&service, &owner, &a, "C").await?;
        let c1 = child_of(&service, &owner, &c, "C1").await?;
        service.add_favorite(&owner, ws, c.id).await?;

        let mut events = service.subscribe_to_events();
        let outcome = service.restore(&owner, ws, a.id, version).await?;

        let pruned: HashSet<Uuid> = outcome.pruned.iter().copied().collect();
        assert_eq!(pruned, HashSet::from([c.id, c1.id]));
        assert!(outcome.restored.is_empty());

        let children = service.list_children(&owner, ws, a.id).await?;
        assert_eq!(ids(&children), HashSet::from([b.id]));

        let result = service.get_page(&owner, ws, c.id).await;
        assert!(matches!(result, Err(PageServiceError::NotFound { .. })));
        assert!(service.list_favorites(&owner, ws).await?.is_empty());

        let event = events.recv().await?;
        assert_eq!(event.page_id, a.id);
        assert_eq!(event.action(), "restored");
        let payload = serde_json::to_value(&event)?;
        let reported: HashSet<String> = payload["prunedPageIds"]
            .as_array()
            .expect("restored event should list pruned pages")
            .iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect();
        assert_eq!(
            reported,
            HashSet::from([c.id.to_string(), c1.id.to_string()])
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_restore_brings_back_deleted_descendants() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = service.create_page(&owner, NewPage::new(ws, "A")).await?;
        let b = child_of(&service, &owner, &a, "B").await?;
        let b1 = child_of(&service, &owner, &b, "B1").await?;
        save(&service, &owner, &a, "<p>full tree</p>").await?;
        let version = service.list_versions(&owner, ws, a.id).await?[0].id;

        clock.advance(Duration::minutes(10));
        service.archive(&owner, ws, b.id).await?;
        service.delete_page(&owner, ws, b.id).await?;
        assert!(service.list_children(&owner, ws, a.id).await?.is_empty());

        clock.advance(Duration::minutes(1));
        let outcome = service.restore(&owner, ws, a.id, version).await?;

        assert_eq!(outcome.restored, vec![b.id, b1.id]);
        assert!(outcome.pruned.is_empty());

        let restored_b = service.get_page(&owner, ws, b.id).await?;
        assert_eq!(restored_b.parent_id, Some(a.id));
        assert!(restored_b.archived_at.is_none());

        let restored_b1 = service.get_page(&owner, ws, b1.id).await?;
        assert_eq!(restored_b1.parent_id, Some(b.id));
        assert!(restored_b1.deleted_at.is_none());

        let ancestors = service.list_ancestors(&owner, ws, b1.id).await?;
        let chain: Vec<Uuid> = ancestors.iter().map(|page| page.id).collect();
        assert_eq!(chain, vec![b.id, a.id]);

        Ok(())
    }

    #[tokio::test]
    async fn test_restore_twice_changes_nothing_the_second_time() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = service.create_page(&owner, NewPage::new(ws, "A")).await?;
        let b = child_of(&service, &owner, &a, "B").await?;
        save(&service, &owner, &a, "<p>snapshot</p>").await?;
        let version = service.list_versions(&owner, ws, a.id).await?[0].id;

        clock.advance(Duration::minutes(15));
        child_of(&service, &owner, &a, "Late").await?;
        service.archive(&owner, ws, b.id).await?;
        service.delete_page(&owner, ws, b.id).await?;

        let first = service.restore(&owner, ws, a.id, version).await?;
        assert_eq!(first.restored, vec![b.id]);
        assert_eq!(first.pruned.len(), 1);
        let tree_after_first = ids(&service.list_children(&owner, ws, a.id).await?);

        clock.advance(Duration::minutes(1));
        let second = service.restore(&owner, ws, a.id, version).await?;
        assert!(second.restored.is_empty());
        assert!(second.pruned.is_empty());
        assert!(second.restored_versions.is_empty());

        let tree_after_second = ids(&service.list_children(&owner, ws, a.id).await?);
        assert_eq!(tree_after_first, tree_after_second);
        assert_eq!(tree_after_second, HashSet::from([b.id]));

        Ok(())
    }

    #[tokio::test]
    async fn test_deleted_page_with_missing_parent_restores_as_root() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let parent = service.create_page(&owner, NewPage::new(ws, "Parent")).await?;
        let child = child_of(&service, &owner, &parent, "Child").await?;
        save(&service, &owner, &child, "<p>orphan</p>").await?;
        let version = service.list_versions(&owner, ws, child.id).await?[0].id;

        // A deleted parent counts as gone
        clock.advance(Duration::minutes(20));
        service.archive(&owner, ws, child.id).await?;
        service.delete_page(&owner, ws, child.id).await?;
        service.archive(&owner, ws, parent.id).await?;
        service.delete_page(&owner, ws, parent.id).await?;

        let outcome = service.restore(&owner, ws, child.id, version).await?;
        assert_eq!(outcome.page.parent_id, None);
        assert_eq!(outcome.restored, vec![child.id]);

        let page = service.get_page(&owner, ws, child.id).await?;
        assert!(page.is_root());

        Ok(())
    }

    #[tokio::test]
    async fn test_restore_rejects_locked_page_and_foreign_version() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = service.create_page(&owner, NewPage::new(ws, "A")).await?;
        let other = service.create_page(&owner, NewPage::new(ws, "Other")).await?;
        save(&service, &owner, &a, "<p>a</p>").await?;
        save(&service, &owner, &other, "<p>other</p>").await?;
        let a_version = service.list_versions(&owner, ws, a.id).await?[0].id;
        let other_version = service.list_versions(&owner, ws, other.id).await?[0].id;

        let result = service.restore(&owner, ws, a.id, other_version).await;
        assert!(matches!(result, Err(PageServiceError::NotFound { .. })));

        service.lock(&owner, ws, a.id, false).await?;
        let result = service.restore(&owner, ws, a.id, a_version).await;
        assert!(matches!(result, Err(PageServiceError::Locked { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_page_locked_before_deletion_can_be_restored() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = service.create_page(&owner, NewPage::new(ws, "Frozen")).await?;
        save(&service, &owner, &a, "<p>final</p>").await?;
        let version = service.list_versions(&owner, ws, a.id).await?[0].id;

        service.lock(&owner, ws, a.id, false).await?;
        clock.advance(Duration::seconds(20));
        service.archive(&owner, ws, a.id).await?;
        service.delete_page(&owner, ws, a.id).await?;

        clock.advance(Duration::minutes(1));
        let outcome = service.restore(&owner, ws, a.id, version).await?;
        assert_eq!(outcome.restored, vec![a.id]);
        assert_eq!(outcome.restored_versions, vec![version]);

        let page = service.get_page(&owner, ws, a.id).await?;
        assert!(page.deleted_at.is_none());
        assert!(page.is_locked);

        service.unlock(&owner, ws, a.id, false).await?;
        assert!(!service.get_page(&owner, ws, a.id).await?.is_locked);

        Ok(())
    }

    #[tokio::test]
    async fn test_restore_candidates_of_deleted_page() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let admin = Actor::admin(Uuid::new_v4());
        let ws = Uuid::new_v4();
        let t0 = start_time() + Duration::hours(1);

        let a = service.create_page(&owner, NewPage::new(ws, "Journal")).await?;
        assert!(service.list_restore_candidates(&owner, ws, a.id).await?.is_empty());

        clock.set_time(t0 - Duration::minutes(5));
        save(&service, &owner, &a, "<p>older</p>").await?;
        clock.set_time(t0 - Duration::seconds(30));
        save(&service, &admin, &a, "<p>newer</p>").await?;
        let near = service.list_versions(&owner, ws, a.id).await?[0].id;

        clock.set_time(t0 - Duration::seconds(10));
        service.archive(&owner, ws, a.id).await?;
        clock.set_time(t0);
        service.delete_page(&owner, ws, a.id).await?;

        let result = service.list_versions(&owner, ws, a.id).await;
        assert!(matches!(result, Err(PageServiceError::NotFound { .. })));

        let candidates = service.list_restore_candidates(&owner, ws, a.id).await?;
        assert_eq!(candidates.iter().map(|v| v.id).collect::<Vec<_>>(), vec![near]);

        let result = service.list_restore_candidates(&owner, ws, Uuid::new_v4()).await;
        assert!(matches!(result, Err(PageServiceError::NotFound { .. })));

        service.restore(&owner, ws, a.id, candidates[0].id).await?;
        assert!(service.list_restore_candidates(&owner, ws, a.id).await?.is_empty());

        Ok(())
    }
}
