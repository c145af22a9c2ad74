//! Dashboard
//!
//! Summary counters and the "Recent Items" section.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::DataItem;

/// Items shown under "Recent Items"
pub const RECENT_ITEMS_LIMIT: usize = 5;

/// Window for the "recent" counter
pub const RECENT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    /// Number of distinct categories in use
    pub categories: usize,
    /// Items created within the last day
    pub recent: usize,
}

impl DashboardStats {
    pub fn compute(items: &[DataItem], now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);
        let categories: HashSet<_> = items.iter().map(|item| item.category).collect();

        Self {
            total: items.len(),
            categories: categories.len(),
            recent: items.iter().filter(|item| item.created_at > cutoff).count(),
        }
    }
}

/// First `limit` items of a newest-first list
pub fn recent_items(items: &[DataItem], limit: usize) -> &[DataItem] {
    &items[..items.len().min(limit)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, ItemId};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn item(id: &str, category: Category, age: Duration) -> DataItem {
        let at = now() - age;
        DataItem {
            id: ItemId::new(id),
            title: id.to_uppercase(),
            description: format!("{id} description"),
            category,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_empty_collection() {
        assert_eq!(DashboardStats::compute(&[], now()), DashboardStats::default());
        assert!(recent_items(&[], RECENT_ITEMS_LIMIT).is_empty());
    }

    #[test]
    fn test_counts() {
        let items = vec![
            item("a", Category::Work, Duration::minutes(5)),
            item("b", Category::Work, Duration::hours(3)),
            item("c", Category::Travel, Duration::hours(30)),
            item("d", Category::Health, Duration::days(10)),
        ];

        let stats = DashboardStats::compute(&items, now());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.categories, 3);
        assert_eq!(stats.recent, 2);
    }

    #[test]
    fn test_recent_cutoff_is_exclusive() {
        let items = vec![
            item("edge", Category::Other, Duration::hours(24)),
            item("inside", Category::Other, Duration::hours(24) - Duration::microseconds(1)),
        ];

        assert_eq!(DashboardStats::compute(&items, now()).recent, 1);
    }

    #[test]
    fn test_recent_items_limit() {
        let items: Vec<_> = (0..7)
            .map(|i| item(&format!("i{i}"), Category::Personal, Duration::minutes(i)))
            .collect();

        let recent = recent_items(&items, RECENT_ITEMS_LIMIT);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].id, ItemId::new("i0"));
        assert_eq!(recent_items(&items[..2], RECENT_ITEMS_LIMIT).len(), 2);
    }
}
