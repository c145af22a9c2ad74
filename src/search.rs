//! Search and category filter for the item list

use std::fmt;

use serde::Serialize;

use crate::models::{Category, DataItem};

/// Category chip selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    /// Chips in display order: "All" followed by every category
    pub fn options() -> Vec<CategoryFilter> {
        std::iter::once(CategoryFilter::All)
            .chain(Category::ALL.into_iter().map(CategoryFilter::Only))
            .collect()
    }

    pub fn label(&self) -> &'static str {
        match self {
            CategoryFilter::All => "All",
            CategoryFilter::Only(category) => category.as_str(),
        }
    }

    /// Inverse of [`CategoryFilter::label`]
    pub fn from_label(label: &str) -> Option<Self> {
        if label == "All" {
            return Some(CategoryFilter::All);
        }
        Category::parse(label).map(CategoryFilter::Only)
    }

    pub fn accepts(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(only) => *only == category,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Category> for CategoryFilter {
    fn from(category: Category) -> Self {
        CategoryFilter::Only(category)
    }
}

/// True when the item passes both the text query and the category filter.
///
/// `needle` must already be lowercase; `None` matches everything.
fn matches(item: &DataItem, needle: Option<&str>, filter: CategoryFilter) -> bool {
    if !filter.accepts(item.category) {
        return false;
    }
    match needle {
        None => true,
        Some(needle) => {
            item.title.to_lowercase().contains(needle)
                || item.description.to_lowercase().contains(needle)
        }
    }
}

/// Items matching `query` (case-insensitive, title or description) and
/// `filter`, in input order. A blank query matches every item.
pub fn filter_items(items: &[DataItem], query: &str, filter: CategoryFilter) -> Vec<DataItem> {
    let needle = (!query.trim().is_empty()).then(|| query.to_lowercase());

    items
        .iter()
        .filter(|item| matches(item, needle.as_deref(), filter))
        .cloned()
        .collect()
}

/// Subtitle under the list header
pub fn results_label(count: usize) -> String {
    match count {
        1 => "1 item found".to_string(),
        n => format!("{n} items found"),
    }
}
