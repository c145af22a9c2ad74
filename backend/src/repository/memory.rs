//! In-memory document collection
//!
//! Default backend when nothing is configured, and the test double for the
//! gateway. Fault injection switches simulate an unreachable store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;

use super::clock::ServerClock;
use super::traits::{
    sort_newest_first, ChangeFeed, ChangeKind, CollectionEvent, DocumentCollection, FEED_CAPACITY,
};
use crate::domain::{DataItem, ItemId, ItemPatch, NewItem};
use crate::error::{CollectionError, CollectionResult};

pub struct MemoryCollection {
    name: String,
    // Insertion order
    items: RwLock<Vec<DataItem>>,
    clock: ServerClock,
    changes: broadcast::Sender<CollectionEvent>,
    offline: AtomicBool,
    fail_next_write: AtomicBool,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            name: name.into(),
            items: RwLock::new(Vec::new()),
            clock: ServerClock::new(),
            changes,
            offline: AtomicBool::new(false),
            fail_next_write: AtomicBool::new(false),
        }
    }

    /// While offline every call fails with `Unavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Reject the next write with `Rejected`
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Push an error onto the change feed, as a dropped live connection would
    pub fn break_feed(&self, message: &str) {
        let _ = self.changes.send(CollectionEvent::Error(message.to_string()));
    }

    pub fn watcher_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn check_online(&self) -> CollectionResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CollectionError::Unavailable(format!("{} is offline", self.name)));
        }
        Ok(())
    }

    fn check_write(&self) -> CollectionResult<()> {
        self.check_online()?;
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(CollectionError::Rejected("write rejected by store".to_string()));
        }
        Ok(())
    }

    fn notify(&self, kind: ChangeKind, id: &ItemId) {
        // No receivers is fine
        let _ = self.changes.send(CollectionEvent::Changed { kind, id: id.clone() });
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, item: &NewItem) -> CollectionResult<DataItem> {
        self.check_write()?;

        let created = item.clone().into_item(ItemId::generate(), self.clock.now());
        {
            let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
            items.push(created.clone());
        }
        self.notify(ChangeKind::Created, &created.id);
        Ok(created)
    }

    async fn find(&self, id: &ItemId) -> CollectionResult<Option<DataItem>> {
        self.check_online()?;
        let items = self.items.read().unwrap_or_else(|e| e.into_inner());
        Ok(items.iter().find(|item| &item.id == id).cloned())
    }

    async fn list_ordered(&self) -> CollectionResult<Vec<DataItem>> {
        self.check_online()?;
        let mut items = self.items.read().unwrap_or_else(|e| e.into_inner()).clone();
        sort_newest_first(&mut items);
        Ok(items)
    }

    async fn update(&self, id: &ItemId, patch: &ItemPatch) -> CollectionResult<()> {
        self.check_write()?;

        {
            let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
            let item = items
                .iter_mut()
                .find(|item| &item.id == id)
                .ok_or_else(|| CollectionError::NotFound(id.clone()))?;
            item.apply(patch, self.clock.now());
        }
        self.notify(ChangeKind::Updated, id);
        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> CollectionResult<()> {
        self.check_write()?;

        {
            let mut items = self.items.write().unwrap_or_else(|e| e.into_inner());
            let before = items.len();
            items.retain(|item| &item.id != id);
            if items.len() == before {
                return Err(CollectionError::NotFound(id.clone()));
            }
        }
        self.notify(ChangeKind::Deleted, id);
        Ok(())
    }

    async fn watch(&self) -> CollectionResult<ChangeFeed> {
        self.check_online()?;
        Ok(self.changes.subscribe())
    }
}
