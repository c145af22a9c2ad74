//! Global Item Store
//!
//! Keeps the latest snapshot from a gateway subscription so every screen
//! reads the same list. Screens redraw on [`ItemStore::changes`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::dashboard::DashboardStats;
use crate::models::{
    DataItem, Gateway, GatewayError, GatewayResult, SubscriptionEvent, SubscriptionHandle,
    SubscriptionState,
};
use crate::search::{filter_items, CategoryFilter};

/// What the screens render
#[derive(Clone, Debug, PartialEq)]
pub struct StoreState {
    /// Newest first
    pub items: Vec<DataItem>,
    /// True until the first snapshot arrives
    pub loading: bool,
    /// Most recent stream error, cleared on reconnect
    pub error: Option<GatewayError>,
    /// Set once the subscription is gone for good
    pub disconnected: bool,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
            error: None,
            disconnected: false,
        }
    }
}

impl StoreState {
    fn apply(&mut self, event: SubscriptionEvent) {
        match event {
            SubscriptionEvent::Snapshot(items) => {
                self.items = items;
                self.loading = false;
            }
            SubscriptionEvent::Error(err) => self.error = Some(err),
            SubscriptionEvent::Reconnected => self.error = None,
            SubscriptionEvent::Disconnected => {
                self.disconnected = true;
                self.loading = false;
            }
        }
    }
}

pub struct ItemStore {
    state: Arc<watch::Sender<StoreState>>,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore {
    /// Detached store in the loading state
    pub fn new() -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            state: Arc::new(state),
            handle: Mutex::new(None),
        }
    }

    /// Subscribe to the gateway, replacing any earlier subscription
    pub async fn attach(&self, gateway: &Gateway) -> GatewayResult<()> {
        self.detach();

        let state = Arc::clone(&self.state);
        let subscribed = gateway
            .subscribe_to_items(move |event| state.send_modify(|s| s.apply(event)))
            .await;

        match subscribed {
            Ok(handle) => {
                self.state.send_modify(|s| s.disconnected = false);
                *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load items");
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.error = Some(err.clone());
                });
                Err(err)
            }
        }
    }

    /// Cancel the subscription; the last snapshot stays readable
    pub fn detach(&self) {
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.cancel();
        }
    }

    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Receiver that wakes on every state change
    pub fn changes(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    pub fn items(&self) -> Vec<DataItem> {
        self.state.borrow().items.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn last_error(&self) -> Option<GatewayError> {
        self.state.borrow().error.clone()
    }

    /// `None` when not attached
    pub fn subscription_state(&self) -> Option<SubscriptionState> {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(SubscriptionHandle::state)
    }

    pub fn filtered(&self, query: &str, filter: CategoryFilter) -> Vec<DataItem> {
        filter_items(&self.state.borrow().items, query, filter)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> DashboardStats {
        DashboardStats::compute(&self.state.borrow().items, now)
    }
}

impl Drop for ItemStore {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore")
            .field("state", &*self.state.borrow())
            .field("subscription", &self.subscription_state())
            .finish()
    }
}
