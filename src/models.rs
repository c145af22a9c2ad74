//! Frontend Models
//!
//! Backend types used by the screens, plus display rows derived from them.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

pub use data_items_lib::domain::{
    Category, DataItem, Field, ItemId, ItemPatch, NewItem, ValidationErrors,
};
pub use data_items_lib::error::{FailureCause, GatewayError, GatewayResult};
pub use data_items_lib::gateway::{
    Gateway, SubscriptionEvent, SubscriptionHandle, SubscriptionState,
};

/// One row of the item list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemCard {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub created: NaiveDate,
    /// Only set when the item was edited after creation
    pub updated: Option<NaiveDate>,
}

impl ItemCard {
    /// Dates are shown in the device's local time zone
    pub fn from_item(item: &DataItem) -> Self {
        Self::in_zone(item, &Local)
    }

    pub fn in_zone<Tz: chrono::TimeZone>(item: &DataItem, zone: &Tz) -> Self {
        let day = |at: &DateTime<Utc>| at.with_timezone(zone).date_naive();
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            category: item.category,
            created: day(&item.created_at),
            updated: item.was_edited().then(|| day(&item.updated_at)),
        }
    }

    /// "Created: 2024-05-01"
    pub fn created_label(&self) -> String {
        format!("Created: {}", self.created)
    }

    pub fn updated_label(&self) -> Option<String> {
        self.updated.map(|date| format!("Updated: {date}"))
    }
}
