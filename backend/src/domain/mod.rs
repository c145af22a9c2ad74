//! Domain Layer
//!
//! Contains the data item entity and its validation rules.
//! This layer has NO storage dependencies.

mod entity;
mod item;
mod validation;

pub use entity::ItemId;
pub use item::{Category, DataItem, ItemPatch, NewItem};
pub use validation::{Field, ValidationErrors};
