//! Repository Layer - Core Traits
//!
//! Defines the abstract interface to the document collection that stores
//! data items. Implementations can use memory, SQLite, Firestore, etc.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{DataItem, ItemId, ItemPatch, NewItem};
use crate::error::CollectionResult;

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Notification pushed on a collection's change feed
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    Changed { kind: ChangeKind, id: ItemId },
    /// Something may have changed; watchers should re-read everything
    Resync,
    /// The live connection failed; the feed may stop after this
    Error(String),
}

pub type ChangeFeed = broadcast::Receiver<CollectionEvent>;

/// Capacity of every collection's change broadcast
pub(crate) const FEED_CAPACITY: usize = 64;

/// A named collection of data items keyed by opaque id
///
/// The collection owns `id`, `created_at` and `updated_at`; writes are
/// all-or-nothing.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Collection name, used in logs
    fn name(&self) -> &str;

    /// Insert with a generated id and `created_at = updated_at = now`
    async fn insert(&self, item: &NewItem) -> CollectionResult<DataItem>;

    /// Find a record by id
    async fn find(&self, id: &ItemId) -> CollectionResult<Option<DataItem>>;

    /// Every record, newest `created_at` first
    async fn list_ordered(&self) -> CollectionResult<Vec<DataItem>>;

    /// Apply a partial update and stamp `updated_at`
    async fn update(&self, id: &ItemId, patch: &ItemPatch) -> CollectionResult<()>;

    /// Remove a record permanently
    async fn delete(&self, id: &ItemId) -> CollectionResult<()>;

    /// Attach to the change feed
    async fn watch(&self) -> CollectionResult<ChangeFeed>;
}

/// Sort newest first; ties keep their current relative order.
pub fn sort_newest_first(items: &mut [DataItem]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
