//! Live subscriptions
//!
//! Each subscription owns one task that listens to the collection's change
//! feed and delivers a fresh, ordered snapshot after every change. Feed
//! failures are reported as `Error` events and retried with backoff; when
//! the retries run out the subscription ends with `Disconnected`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};

use super::Gateway;
use crate::domain::DataItem;
use crate::error::{FailureCause, GatewayError};
use crate::repository::{ChangeFeed, CollectionEvent};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Full collection, newest first
    Snapshot(Vec<DataItem>),
    /// The live feed failed; a reconnect follows unless retries are exhausted
    Error(GatewayError),
    /// The feed is back; a snapshot follows
    Reconnected,
    /// Retries exhausted, no further events
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Reconnecting { attempt: u32 },
    Cancelled,
    Disconnected,
}

impl SubscriptionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionState::Cancelled | SubscriptionState::Disconnected)
    }
}

/// Result of [`Gateway::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    /// Snapshot taken when the subscription was set up
    pub initial: Vec<DataItem>,
    pub events: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

/// Ids of subscriptions that have not ended yet
pub(super) type Registry = Arc<Mutex<HashSet<u64>>>;

/// Cancels a subscription; cheap to clone, safe to cancel repeatedly
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    cancel: watch::Sender<bool>,
    state: watch::Sender<SubscriptionState>,
    registry: Registry,
}

impl SubscriptionHandle {
    pub(super) fn register(registry: &Registry) -> Self {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        registry.lock().unwrap_or_else(|e| e.into_inner()).insert(id);

        let (cancel, _) = watch::channel(false);
        let (state, _) = watch::channel(SubscriptionState::Active);
        Self {
            inner: Arc::new(HandleInner {
                id,
                cancel,
                state,
                registry: Arc::clone(registry),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Stop deliveries. Repeated calls are no-ops.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancel.send_replace(true);
        if was_cancelled {
            return;
        }
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = SubscriptionState::Cancelled;
            true
        });
        self.unregister();
        tracing::debug!(subscription = self.inner.id, "subscription cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel.borrow()
    }

    pub fn state(&self) -> SubscriptionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.state.subscribe()
    }

    /// Guard that cancels when dropped, for view teardown
    pub fn cancel_on_drop(self) -> SubscriptionGuard {
        SubscriptionGuard { handle: self }
    }

    fn set_state(&self, next: SubscriptionState) {
        self.inner.state.send_if_modified(|state| {
            if state.is_terminal() || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn mark_disconnected(&self) {
        self.set_state(SubscriptionState::Disconnected);
        self.unregister();
    }

    fn unregister(&self) {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.inner.id);
    }

    async fn cancelled(&self) {
        let mut rx = self.inner.cancel.subscribe();
        // The sender lives in `self`, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Cancels its subscription on drop
pub struct SubscriptionGuard {
    handle: SubscriptionHandle,
}

impl SubscriptionGuard {
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Sends events to one subscriber unless it has been cancelled
struct Delivery {
    handle: SubscriptionHandle,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
}

impl Delivery {
    /// False once nobody should receive further events
    fn send(&self, event: SubscriptionEvent) -> bool {
        if self.handle.is_cancelled() {
            return false;
        }
        self.events.send(event).is_ok()
    }
}

/// Drops the registry entry when the feed task ends, however it ends
struct Registration(SubscriptionHandle);

impl Drop for Registration {
    fn drop(&mut self) {
        self.0.unregister();
    }
}

/// Body of the per-subscription task
pub(super) async fn run_feed(
    gateway: Gateway,
    mut feed: ChangeFeed,
    handle: SubscriptionHandle,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
) {
    let delivery = Delivery {
        handle: handle.clone(),
        events,
    };
    let subscription = handle.id();
    let _registration = Registration(handle.clone());

    loop {
        let received = tokio::select! {
            biased;
            _ = handle.cancelled() => return,
            received = feed.recv() => received,
        };

        let failure = match received {
            Ok(CollectionEvent::Changed { kind, id }) => {
                tracing::debug!(subscription, ?kind, %id, "collection changed");
                None
            }
            Ok(CollectionEvent::Resync) => {
                tracing::debug!(subscription, "collection asked for a resync");
                None
            }
            // Snapshots are full, so skipped notifications only mean a refresh
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(subscription, skipped, "change feed lagged");
                None
            }
            Ok(CollectionEvent::Error(message)) => {
                Some(GatewayError::ReadFailure(FailureCause::Backend(message)))
            }
            Err(RecvError::Closed) => Some(GatewayError::ReadFailure(FailureCause::Backend(
                "change feed closed".to_string(),
            ))),
        };

        let failure = match failure {
            Some(err) => Some(err),
            None => match gateway.fetch_all().await {
                Ok(items) => {
                    if !delivery.send(SubscriptionEvent::Snapshot(items)) {
                        return;
                    }
                    None
                }
                Err(err) => Some(err),
            },
        };

        if let Some(err) = failure {
            tracing::warn!(subscription, error = %err, "subscription feed failed");
            if !delivery.send(SubscriptionEvent::Error(err)) {
                return;
            }
            match reconnect(&gateway, &delivery).await {
                Some(new_feed) => feed = new_feed,
                None => return,
            }
        }
    }
}

/// Retry with backoff; `None` when cancelled or out of attempts.
async fn reconnect(gateway: &Gateway, delivery: &Delivery) -> Option<ChangeFeed> {
    let handle = &delivery.handle;
    let policy = gateway.options().reconnect;

    for attempt in 1..=policy.max_attempts {
        handle.set_state(SubscriptionState::Reconnecting { attempt });
        let delay = policy.delay_for(attempt);
        tracing::info!(
            subscription = handle.id(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnecting"
        );

        tokio::select! {
            biased;
            _ = handle.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        match gateway.open_feed().await {
            Ok((feed, items)) => {
                handle.set_state(SubscriptionState::Active);
                tracing::info!(subscription = handle.id(), attempt, "subscription reconnected");
                if !delivery.send(SubscriptionEvent::Reconnected)
                    || !delivery.send(SubscriptionEvent::Snapshot(items))
                {
                    return None;
                }
                return Some(feed);
            }
            Err(err) => {
                tracing::warn!(
                    subscription = handle.id(),
                    attempt,
                    error = %err,
                    "reconnect attempt failed"
                );
            }
        }
    }

    if handle.is_cancelled() {
        return None;
    }
    tracing::error!(
        subscription = handle.id(),
        attempts = policy.max_attempts,
        "subscription disconnected"
    );
    handle.mark_disconnected();
    let _ = delivery.events.send(SubscriptionEvent::Disconnected);
    None
}
