//! Repository Integration Tests
//!
//! The same contract checks run against the memory and SQLite collections.

#[cfg(test)]
mod tests {
    use crate::domain::{Category, ItemId, ItemPatch, NewItem};
    use crate::error::CollectionError;
    use crate::repository::{
        ChangeKind, CollectionEvent, DocumentCollection, MemoryCollection, SqliteCollection,
    };

    fn memory() -> MemoryCollection {
        MemoryCollection::new("dataItems")
    }

    fn sqlite() -> SqliteCollection {
        SqliteCollection::open_in_memory("dataItems").expect("Failed to open test DB")
    }

    fn trip() -> NewItem {
        NewItem::new("Trip", "Pack bags", Category::Travel)
    }

    async fn check_insert_assigns_fields(repo: &dyn DocumentCollection) {
        let created = repo.insert(&trip()).await.expect("Failed to create");

        assert!(!created.id.as_str().is_empty());
        assert_eq!(created.title, "Trip");
        assert_eq!(created.category, Category::Travel);
        assert_eq!(created.created_at, created.updated_at);

        let found = repo.find(&created.id).await.expect("Find failed");
        assert_eq!(found, Some(created));
    }

    async fn check_list_is_newest_first(repo: &dyn DocumentCollection) {
        let a = repo.insert(&trip()).await.unwrap();
        let b = repo
            .insert(&NewItem::new("Budget", "Monthly", Category::Finance))
            .await
            .unwrap();

        let items = repo.list_ordered().await.expect("List failed");
        let ids: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    async fn check_update_is_partial(repo: &dyn DocumentCollection) {
        let created = repo.insert(&trip()).await.unwrap();

        repo.update(&created.id, &ItemPatch::title("Holiday"))
            .await
            .expect("Update failed");

        let updated = repo.find(&created.id).await.unwrap().expect("Updated item missing");
        assert_eq!(updated.title, "Holiday");
        assert_eq!(updated.description, "Pack bags");
        assert_eq!(updated.category, Category::Travel);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    async fn check_update_missing(repo: &dyn DocumentCollection) {
        let missing = ItemId::new("nope");
        let err = repo.update(&missing, &ItemPatch::title("x")).await.unwrap_err();
        assert_eq!(err, CollectionError::NotFound(missing));
    }

    async fn check_delete(repo: &dyn DocumentCollection) {
        let created = repo.insert(&trip()).await.unwrap();

        repo.delete(&created.id).await.expect("Delete failed");

        assert!(repo.find(&created.id).await.unwrap().is_none());
        assert!(repo.list_ordered().await.unwrap().is_empty());
        assert!(matches!(
            repo.delete(&created.id).await,
            Err(CollectionError::NotFound(_))
        ));
    }

    async fn check_watch_sees_writes(repo: &dyn DocumentCollection) {
        let mut feed = repo.watch().await.expect("Watch failed");

        let created = repo.insert(&trip()).await.unwrap();
        repo.update(&created.id, &ItemPatch::category(Category::Other)).await.unwrap();
        repo.delete(&created.id).await.unwrap();

        for expected in [ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted] {
            let event = feed.recv().await.unwrap();
            assert_eq!(
                event,
                CollectionEvent::Changed {
                    kind: expected,
                    id: created.id.clone()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_memory_contract() {
        check_insert_assigns_fields(&memory()).await;
        check_list_is_newest_first(&memory()).await;
        check_update_is_partial(&memory()).await;
        check_update_missing(&memory()).await;
        check_delete(&memory()).await;
        check_watch_sees_writes(&memory()).await;
    }

    #[tokio::test]
    async fn test_sqlite_contract() {
        check_insert_assigns_fields(&sqlite()).await;
        check_list_is_newest_first(&sqlite()).await;
        check_update_is_partial(&sqlite()).await;
        check_update_missing(&sqlite()).await;
        check_delete(&sqlite()).await;
        check_watch_sees_writes(&sqlite()).await;
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_items.db");

        let first = {
            let repo = SqliteCollection::open(&path, "dataItems").unwrap();
            let item = repo.insert(&trip()).await.unwrap();
            repo.close().await;
            item
        };

        let repo = SqliteCollection::open(&path, "dataItems").unwrap();
        let items = repo.list_ordered().await.unwrap();
        assert_eq!(items, vec![first.clone()]);

        // Clock resumes after stored timestamps
        let second = repo.insert(&trip()).await.unwrap();
        assert!(second.created_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_sqlite_closed_is_unavailable() {
        let repo = sqlite();
        repo.close().await;

        assert!(matches!(repo.list_ordered().await, Err(CollectionError::Unavailable(_))));
        assert!(matches!(repo.watch().await, Err(CollectionError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_sqlite_trims_patch_text() {
        let repo = sqlite();
        let created = repo
            .insert(&NewItem::new("  Padded  ", " desc ", Category::Work))
            .await
            .unwrap();
        assert_eq!(created.title, "Padded");

        repo.update(&created.id, &ItemPatch::description("  tidy  "))
            .await
            .unwrap();
        let updated = repo.find(&created.id).await.unwrap().unwrap();
        assert_eq!(updated.description, "tidy");
    }

    #[tokio::test]
    async fn test_memory_fault_injection() {
        let repo = memory();

        repo.fail_next_write();
        assert!(matches!(repo.insert(&trip()).await, Err(CollectionError::Rejected(_))));
        assert!(repo.list_ordered().await.unwrap().is_empty());

        // Only the next write fails
        repo.insert(&trip()).await.unwrap();

        repo.set_offline(true);
        assert!(matches!(repo.list_ordered().await, Err(CollectionError::Unavailable(_))));
        assert!(matches!(repo.watch().await, Err(CollectionError::Unavailable(_))));
        repo.set_offline(false);
        assert_eq!(repo.list_ordered().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_break_feed() {
        let repo = memory();
        let mut feed = repo.watch().await.unwrap();
        assert_eq!(repo.watcher_count(), 1);

        repo.break_feed("connection reset");
        assert_eq!(
            feed.recv().await.unwrap(),
            CollectionEvent::Error("connection reset".to_string())
        );
    }
}
