//! Record Store Gateway
//!
//! The only component that talks to the document collection. Every
//! operation is bounded by the configured timeout and returns a labeled
//! failure; nothing is retried here.

mod subscription;


use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{AppConfig, ReconnectPolicy};
use crate::domain::{DataItem, ItemId, ItemPatch, NewItem};
use crate::error::{CollectionResult, FailureCause, GatewayError, GatewayResult};
use crate::repository::{sort_newest_first, ChangeFeed, DocumentCollection};

pub use subscription::{
    Subscription, SubscriptionEvent, SubscriptionGuard, SubscriptionHandle, SubscriptionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    pub operation_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for GatewayOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            operation_timeout: config.operation_timeout(),
            reconnect: config.reconnect,
        }
    }
}

/// Handle to the record store; clones share the same collection
#[derive(Clone)]
pub struct Gateway {
    collection: Arc<dyn DocumentCollection>,
    options: GatewayOptions,
    subscriptions: subscription::Registry,
}

impl Gateway {
    pub fn new(collection: Arc<dyn DocumentCollection>, options: GatewayOptions) -> Self {
        Self {
            collection,
            options,
            subscriptions: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn options(&self) -> GatewayOptions {
        self.options
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Subscriptions that are neither cancelled nor disconnected
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Create an item and return its store-assigned id
    pub async fn create(&self, item: NewItem) -> GatewayResult<ItemId> {
        item.validate().map_err(GatewayError::Invalid)?;

        let created = self
            .bounded(self.collection.insert(&item.normalized()))
            .await
            .map_err(|cause| self.write_failed("create", None, cause))?;

        tracing::info!(id = %created.id, category = %created.category, "item created");
        Ok(created.id)
    }

    /// Every item, newest first
    pub async fn fetch_all(&self) -> GatewayResult<Vec<DataItem>> {
        let mut items = self
            .bounded(self.collection.list_ordered())
            .await
            .map_err(|cause| self.read_failed("fetch_all", cause))?;
        sort_newest_first(&mut items);
        Ok(items)
    }

    pub async fn get(&self, id: &ItemId) -> GatewayResult<Option<DataItem>> {
        self.bounded(self.collection.find(id))
            .await
            .map_err(|cause| self.read_failed("get", cause))
    }

    /// Change title/description/category; always stamps `updated_at`
    pub async fn update(&self, id: &ItemId, patch: ItemPatch) -> GatewayResult<()> {
        patch.validate().map_err(GatewayError::Invalid)?;

        self.bounded(self.collection.update(id, &patch.normalized()))
            .await
            .map_err(|cause| self.write_failed("update", Some(id), cause))?;

        tracing::info!(%id, "item updated");
        Ok(())
    }

    /// Remove permanently. An unknown id is a `WriteFailure(NotFound)`.
    pub async fn delete(&self, id: &ItemId) -> GatewayResult<()> {
        self.bounded(self.collection.delete(id))
            .await
            .map_err(|cause| self.write_failed("delete", Some(id), cause))?;

        tracing::info!(%id, "item deleted");
        Ok(())
    }

    /// Delete every item, returning how many were removed.
    ///
    /// Items that vanish concurrently are skipped; any other failure stops
    /// the sweep and is returned.
    pub async fn clear_all(&self) -> GatewayResult<usize> {
        let items = self.fetch_all().await?;
        let mut removed = 0;
        for item in &items {
            match self.delete(&item.id).await {
                Ok(()) => removed += 1,
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        tracing::info!(removed, "collection cleared");
        Ok(removed)
    }

    /// Open a live subscription.
    ///
    /// Returns the current snapshot together with a receiver that gets a new
    /// snapshot after every change.
    pub async fn subscribe(&self) -> GatewayResult<Subscription> {
        let (feed, initial) = self.open_feed().await?;
        let handle = SubscriptionHandle::register(&self.subscriptions);
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(subscription::run_feed(self.clone(), feed, handle.clone(), events_tx));
        tracing::debug!(subscription = handle.id(), items = initial.len(), "subscription opened");

        Ok(Subscription {
            handle,
            initial,
            events,
        })
    }

    /// Callback form of [`Gateway::subscribe`].
    ///
    /// The callback runs once immediately with the current snapshot, then for
    /// every later event until the handle is cancelled.
    pub async fn subscribe_to_items<F>(&self, callback: F) -> GatewayResult<SubscriptionHandle>
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        let Subscription {
            handle,
            initial,
            mut events,
        } = self.subscribe().await?;

        let mut callback = callback;
        callback(SubscriptionEvent::Snapshot(initial));

        let dispatch = handle.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if dispatch.is_cancelled() {
                    break;
                }
                callback(event);
            }
        });

        Ok(handle)
    }

    /// Attach to the change feed, then read a snapshot so no change between
    /// the two is missed.
    async fn open_feed(&self) -> GatewayResult<(ChangeFeed, Vec<DataItem>)> {
        let feed = self
            .bounded(self.collection.watch())
            .await
            .map_err(|cause| self.read_failed("subscribe", cause))?;
        let items = self.fetch_all().await?;
        Ok((feed, items))
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = CollectionResult<T>>,
    ) -> Result<T, FailureCause> {
        match tokio::time::timeout(self.options.operation_timeout, op).await {
            Ok(result) => result.map_err(FailureCause::from),
            Err(_) => Err(FailureCause::Timeout(self.options.operation_timeout)),
        }
    }

    fn read_failed(&self, operation: &str, cause: FailureCause) -> GatewayError {
        let collection = self.collection.name();
        tracing::error!(operation, collection, error = %cause, "read failed");
        GatewayError::ReadFailure(cause)
    }

    fn write_failed(
        &self,
        operation: &str,
        id: Option<&ItemId>,
        cause: FailureCause,
    ) -> GatewayError {
        match id {
            Some(id) => tracing::error!(operation, %id, error = %cause, "write failed"),
            None => tracing::error!(operation, error = %cause, "write failed"),
        }
        GatewayError::WriteFailure(cause)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("collection", &self.collection.name())
            .field("options", &self.options)
            .finish()
    }
}
