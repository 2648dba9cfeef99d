//! Page Lifecycle Tests
//!
//! Integration tests for the cascading lifecycle operations of `PageService`:
//! archive/unarchive, delete, lock, access changes and moves.
//!
//! ## Rules under test
//!
//! - Archive stamps the page and every live descendant
//! - Unarchive fails while the immediate parent is archived
//! - Delete requires an archived page and the owner or an admin
//! - Only the owner can change access
//! - A page can never be moved under itself or one of its descendants

#[cfg(test)]
mod lifecycle_tests {
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use pagetree_core::db::DatabaseService;
    use pagetree_core::models::time::MockTimeProvider;
    use pagetree_core::models::{Actor, NewPage, Page, PageAccess, PageContent, PageListFilter};
    use pagetree_core::services::{PageService, PageServiceError};
    use pagetree_core::PageTreeConfig;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Helper to create a service over a fresh database with a fixed clock
    async fn create_test_service() -> Result<(PageService, Arc<MockTimeProvider>, TempDir)> {
        let temp_dir = TempDir::new()?;
        let config = PageTreeConfig::with_database_path(temp_dir.path().join("test.db"));
        let db = Arc::new(DatabaseService::from_config(&config).await?);
        let clock = Arc::new(MockTimeProvider::with_time(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let service = PageService::new(db, config).with_clock(clock.clone());
        Ok((service, clock, temp_dir))
    }

    async fn create_page(
        service: &PageService,
        actor: &Actor,
        workspace_id: Uuid,
        name: &str,
        parent: Option<&Page>,
    ) -> Result<Page> {
        let mut new_page = NewPage::new(workspace_id, name);
        if let Some(parent) = parent {
            new_page = new_page.with_parent(parent.id);
        }
        Ok(service.create_page(actor, new_page).await?)
    }

    #[tokio::test]
    async fn test_archive_stamps_every_live_descendant() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;
        let c = create_page(&service, &owner, ws, "C", Some(&b)).await?;
        let d = create_page(&service, &owner, ws, "D", Some(&a)).await?;

        let outcome = service.archive(&owner, ws, a.id).await?;
        assert_eq!(outcome.affected[0], a.id);
        assert_eq!(
            outcome.affected.iter().copied().collect::<HashSet<_>>(),
            HashSet::from([a.id, b.id, c.id, d.id])
        );
        // Breadth-first: the grandchild comes last
        assert_eq!(outcome.affected[3], c.id);

        for id in [a.id, b.id, c.id, d.id] {
            let page = service.get_page(&owner, ws, id).await?;
            assert_eq!(page.archived_at, Some(outcome.at), "page {} not archived", page.name);
        }

        let again = service.archive(&owner, ws, a.id).await;
        assert!(matches!(again, Err(PageServiceError::AlreadyArchived { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_archive_overwrites_earlier_descendant_archive() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;

        let first = service.archive(&owner, ws, b.id).await?;
        clock.advance(Duration::minutes(5));
        let second = service.archive(&owner, ws, a.id).await?;

        let b = service.get_page(&owner, ws, b.id).await?;
        assert_ne!(first.at, second.at);
        assert_eq!(b.archived_at, Some(second.at));

        Ok(())
    }

    #[tokio::test]
    async fn test_unarchive_blocked_while_parent_archived() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;
        service.archive(&owner, ws, a.id).await?;

        let result = service.unarchive(&owner, ws, b.id).await;
        match result {
            Err(PageServiceError::ParentStillArchived { page_id, parent_id }) => {
                assert_eq!(page_id, b.id);
                assert_eq!(parent_id, a.id);
            }
            other => panic!("Expected ParentStillArchived, got {:?}", other),
        }

        // Root has no parent, so it can always be unarchived
        let outcome = service.unarchive(&owner, ws, a.id).await?;
        assert_eq!(outcome.affected, vec![a.id, b.id]);

        let b_page = service.get_page(&owner, ws, b.id).await?;
        assert!(!b_page.is_archived());

        // Unarchiving an active page is a no-op
        let noop = service.unarchive(&owner, ws, b.id).await?;
        assert!(noop.affected.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_unarchive_checks_parent_before_permissions() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let stranger = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;
        service.archive(&owner, ws, a.id).await?;

        let blocked = service.unarchive(&stranger, ws, b.id).await;
        assert!(matches!(
            blocked,
            Err(PageServiceError::ParentStillArchived { .. })
        ));

        let forbidden = service.unarchive(&stranger, ws, a.id).await;
        assert!(matches!(forbidden, Err(PageServiceError::Forbidden { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_requires_archive_then_owner_or_admin() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let member = Actor::member(Uuid::new_v4());
        let admin = Actor::admin(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;

        let not_archived = service.delete_page(&member, ws, a.id).await;
        assert!(matches!(
            not_archived,
            Err(PageServiceError::MustArchiveFirst { page_id }) if page_id == a.id
        ));

        let not_allowed = service.archive(&member, ws, a.id).await;
        assert!(matches!(not_allowed, Err(PageServiceError::Forbidden { .. })));

        service.archive(&owner, ws, a.id).await?;

        let not_allowed = service.delete_page(&member, ws, a.id).await;
        assert!(matches!(not_allowed, Err(PageServiceError::Forbidden { .. })));

        service.delete_page(&admin, ws, a.id).await?;
        let gone = service.get_page(&owner, ws, a.id).await;
        assert!(matches!(gone, Err(PageServiceError::NotFound { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_archive_then_delete_cascades_and_drops_favorites() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let reader = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;
        let c = create_page(&service, &owner, ws, "C", Some(&a)).await?;

        service.add_favorite(&reader, ws, b.id).await?;
        service.open_page(&reader, ws, b.id).await?;
        assert_eq!(service.list_favorites(&reader, ws).await?.len(), 1);

        service.archive(&owner, ws, a.id).await?;
        for id in [b.id, c.id] {
            assert!(service.get_page(&owner, ws, id).await?.is_archived());
        }

        let outcome = service.delete_page(&owner, ws, a.id).await?;
        assert_eq!(
            outcome.affected.iter().copied().collect::<HashSet<_>>(),
            HashSet::from([a.id, b.id, c.id])
        );

        for id in [a.id, b.id, c.id] {
            let result = service.get_page(&owner, ws, id).await;
            assert!(matches!(result, Err(PageServiceError::NotFound { .. })));
        }
        assert!(service.list_favorites(&reader, ws).await?.is_empty());
        assert!(service.list_recent(&reader, ws).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_lock_cascade_blocks_edits_in_subtree() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;

        let outcome = service.lock(&owner, ws, a.id, true).await?;
        assert_eq!(outcome.affected, vec![a.id, b.id]);

        let edit = service
            .save_description(&owner, ws, b.id, PageContent::from_html("<p>edit</p>"))
            .await;
        assert!(matches!(edit, Err(PageServiceError::Locked { page_id }) if page_id == b.id));

        // Without cascade only the page itself changes
        service.unlock(&owner, ws, a.id, false).await?;
        assert!(!service.get_page(&owner, ws, a.id).await?.is_locked);
        assert!(service.get_page(&owner, ws, b.id).await?.is_locked);

        Ok(())
    }

    #[tokio::test]
    async fn test_access_change_is_owner_only() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let admin = Actor::admin(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;

        let denied = service
            .set_access(&admin, ws, a.id, PageAccess::Private, true)
            .await;
        assert!(matches!(denied, Err(PageServiceError::Forbidden { .. })));

        // Re-applying the current access is not a change
        service
            .set_access(&admin, ws, a.id, PageAccess::Public, false)
            .await?;

        service
            .set_access(&owner, ws, a.id, PageAccess::Private, true)
            .await?;
        assert_eq!(
            service.get_page(&owner, ws, b.id).await?.access,
            PageAccess::Private
        );

        let hidden = service.get_page(&admin, ws, b.id).await;
        assert!(matches!(hidden, Err(PageServiceError::Forbidden { .. })));

        let private = service
            .list_pages(&owner, ws, PageListFilter::Private, None)
            .await?;
        assert_eq!(private.len(), 2);
        assert!(service
            .list_pages(&admin, ws, PageListFilter::Private, None)
            .await?
            .is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_move_rejects_cycles_including_self() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let b = create_page(&service, &owner, ws, "B", Some(&a)).await?;
        let c = create_page(&service, &owner, ws, "C", Some(&b)).await?;

        for target in [a.id, b.id, c.id] {
            let result = service.move_page(&owner, ws, a.id, Some(target)).await;
            assert!(
                matches!(result, Err(PageServiceError::CycleDetected { .. })),
                "moving A under {} should be a cycle",
                target
            );
        }

        let moved = service.move_page(&owner, ws, c.id, None).await?;
        assert!(moved.is_root());

        let moved = service.move_page(&owner, ws, a.id, Some(c.id)).await?;
        assert_eq!(moved.parent_id, Some(c.id));

        let ancestors = service.list_ancestors(&owner, ws, b.id).await?;
        let names: Vec<&str> = ancestors.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);

        Ok(())
    }

    #[tokio::test]
    async fn test_references_must_stay_inside_workspace() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();
        let other_ws = Uuid::new_v4();

        let a = create_page(&service, &owner, ws, "A", None).await?;
        let foreign = create_page(&service, &owner, other_ws, "Foreign", None).await?;

        let moved = service.move_page(&owner, ws, a.id, Some(foreign.id)).await;
        assert!(matches!(
            moved,
            Err(PageServiceError::InvalidReference { .. })
        ));

        let created = service
            .create_page(&owner, NewPage::new(ws, "Child").with_parent(foreign.id))
            .await;
        assert!(matches!(
            created,
            Err(PageServiceError::InvalidReference { .. })
        ));

        let foreign_project = Uuid::new_v4();
        service.register_project(other_ws, foreign_project).await?;
        let created = service
            .create_page(&owner, NewPage::new(ws, "Doc").with_project(foreign_project))
            .await;
        assert!(matches!(
            created,
            Err(PageServiceError::InvalidReference { .. })
        ));

        let missing = service
            .move_page(&owner, ws, a.id, Some(Uuid::new_v4()))
            .await;
        assert!(matches!(missing, Err(PageServiceError::NotFound { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_with_registered_project() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();
        let project = Uuid::new_v4();

        service.register_project(ws, project).await?;
        let page = service
            .create_page(&owner, NewPage::new(ws, "Plan").with_project(project))
            .await?;

        let loaded = service.get_page(&owner, ws, page.id).await?;
        assert_eq!(loaded.project_ids, vec![project]);

        let unknown = service
            .create_page(&owner, NewPage::new(ws, "Plan").with_project(Uuid::new_v4()))
            .await;
        assert!(matches!(unknown, Err(PageServiceError::NotFound { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_list_filters() -> Result<()> {
        let (service, clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let roadmap = create_page(&service, &owner, ws, "Roadmap", None).await?;
        clock.advance(Duration::seconds(1));
        let child = create_page(&service, &owner, ws, "Roadmap Q3", Some(&roadmap)).await?;
        clock.advance(Duration::seconds(1));
        let old = create_page(&service, &owner, ws, "Old notes", None).await?;
        service.archive(&owner, ws, old.id).await?;

        let public = service
            .list_pages(&owner, ws, PageListFilter::Public, None)
            .await?;
        assert_eq!(public.iter().map(|p| p.id).collect::<Vec<_>>(), vec![roadmap.id]);

        let searched = service
            .list_pages(&owner, ws, PageListFilter::Public, Some("roadmap"))
            .await?;
        assert_eq!(
            searched.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![child.id, roadmap.id]
        );

        let archived = service
            .list_pages(&owner, ws, PageListFilter::Archived, None)
            .await?;
        assert_eq!(archived.iter().map(|p| p.id).collect::<Vec<_>>(), vec![old.id]);

        let all = service.list_pages(&owner, ws, PageListFilter::All, None).await?;
        assert_eq!(all.len(), 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_move_under_archived_parent_rejected_for_live_page() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let shelf = create_page(&service, &owner, ws, "Shelf", None).await?;
        let draft = create_page(&service, &owner, ws, "Draft", None).await?;
        let stale = create_page(&service, &owner, ws, "Stale", None).await?;
        service.archive(&owner, ws, shelf.id).await?;

        let result = service.move_page(&owner, ws, draft.id, Some(shelf.id)).await;
        assert!(matches!(
            result,
            Err(PageServiceError::Archived { page_id }) if page_id == shelf.id
        ));
        assert!(service.get_page(&owner, ws, draft.id).await?.is_root());

        service.archive(&owner, ws, stale.id).await?;
        let moved = service.move_page(&owner, ws, stale.id, Some(shelf.id)).await?;
        assert_eq!(moved.parent_id, Some(shelf.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() -> Result<()> {
        let (service, _clock, _temp_dir) = create_test_service().await?;
        let owner = Actor::member(Uuid::new_v4());
        let ws = Uuid::new_v4();

        let discount = create_page(&service, &owner, ws, "50% off", None).await?;
        create_page(&service, &owner, ws, "Budget 2026", None).await?;
        let snake = create_page(&service, &owner, ws, "page_id notes", None).await?;
        create_page(&service, &owner, ws, "pageXid notes", None).await?;

        let percent = service
            .list_pages(&owner, ws, PageListFilter::All, Some("%"))
            .await?;
        assert_eq!(percent.iter().map(|p| p.id).collect::<Vec<_>>(), vec![discount.id]);

        let underscore = service
            .list_pages(&owner, ws, PageListFilter::All, Some("page_id"))
            .await?;
        assert_eq!(underscore.iter().map(|p| p.id).collect::<Vec<_>>(), vec![snake.id]);

        Ok(())
    }
}
