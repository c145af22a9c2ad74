//! Data Items View Models
//!
//! Screen state for the dashboard, the item list, the add-item form and the
//! settings screen. Everything goes through the backend [`Gateway`].

pub mod dashboard;
pub mod form;
pub mod models;
pub mod search;
pub mod settings;
pub mod store;

pub use dashboard::{recent_items, DashboardStats};
pub use form::ItemForm;
pub use models::{Category, DataItem, Gateway, GatewayError, ItemCard, ItemId};
pub use search::{filter_items, CategoryFilter};
pub use store::{ItemStore, StoreState};
