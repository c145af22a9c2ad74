//! Data Item Entity
//!
//! A short user entry: title, description and a category from a fixed set.
//! `id`, `created_at` and `updated_at` are owned by the collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::entity::ItemId;
use super::validation::{Field, ValidationErrors};

/// Category label, a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Category {
    #[default]
    Personal,
    Work,
    Finance,
    Health,
    Education,
    Technology,
    Travel,
    Other,
}

impl Category {
    /// All labels in display order
    pub const ALL: [Category; 8] = [
        Category::Personal,
        Category::Work,
        Category::Finance,
        Category::Health,
        Category::Education,
        Category::Technology,
        Category::Travel,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Personal => "Personal",
            Category::Work => "Work",
            Category::Finance => "Finance",
            Category::Health => "Health",
            Category::Education => "Education",
            Category::Technology => "Technology",
            Category::Travel => "Travel",
            Category::Other => "Other",
        }
    }

    /// Strict lookup by label
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == label)
    }

    /// Lenient lookup for stored data: unknown labels become `Other`.
    pub fn from_stored(label: &str) -> Self {
        Self::parse(label).unwrap_or_else(|| {
            tracing::warn!(label, "unknown category in stored item, using Other");
            Category::Other
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// A persisted data item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataItem {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataItem {
    /// True once the item has been updated after creation
    pub fn was_edited(&self) -> bool {
        self.updated_at != self.created_at
    }

    /// Apply a patch in place, stamping `updated_at`
    pub fn apply(&mut self, patch: &ItemPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        self.updated_at = now;
    }
}

/// Fields supplied by the caller when creating an item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub category: Category,
}

impl NewItem {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.title.trim().is_empty() {
            errors.insert(Field::Title, "Title is required");
        }
        if self.description.trim().is_empty() {
            errors.insert(Field::Description, "Description is required");
        }
        errors.into_result()
    }

    /// Copy with surrounding whitespace removed
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            category: self.category,
        }
    }

    /// Materialize as a stored item with collection-owned fields
    pub fn into_item(self, id: ItemId, now: DateTime<Utc>) -> DataItem {
        let fields = self.normalized();
        DataItem {
            id,
            title: fields.title,
            description: fields.description,
            category: fields.category,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
}

impl ItemPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.category.is_none()
    }

    /// Copy with text fields trimmed
    pub fn normalized(&self) -> Self {
        Self {
            title: self.title.as_deref().map(|t| t.trim().to_string()),
            description: self.description.as_deref().map(|d| d.trim().to_string()),
            category: self.category,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            errors.insert(Field::Title, "Title is required");
        }
        if matches!(&self.description, Some(d) if d.trim().is_empty()) {
            errors.insert(Field::Description, "Description is required");
        }
        errors.into_result()
    }
}
