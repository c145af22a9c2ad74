//! Store-side clock
//!
//! Timestamps are truncated to microseconds (the SQLite storage unit) and
//! strictly increase, so an update always moves `updated_at` forward.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct ServerClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock whose first reading is later than `floor`
    pub fn starting_after(floor: DateTime<Utc>) -> Self {
        Self {
            last: Mutex::new(Some(floor)),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let mut now = DateTime::from_timestamp_micros(wall.timestamp_micros()).unwrap_or(wall);

        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}
