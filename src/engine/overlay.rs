use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::Booking;

pub type SharedDay = Arc<Mutex<Vec<Booking>>>;

/// One facility on one calendar day. The unit of mutual exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DayKey {
    pub facility: String,
    pub day: NaiveDate,
}

impl DayKey {
    pub fn new(facility: &str, day: NaiveDate) -> Self {
        Self {
            facility: facility.to_string(),
            day,
        }
    }
}

/// Bookings confirmed in this session, kept so availability reads see them
/// before the remote store's read path does. Each day's list sits behind its
/// own lock; confirmation holds it from re-check through append.
pub struct PendingOverlay {
    days: DashMap<DayKey, SharedDay>,
    /// Reverse lookup: booking id → day
    by_id: DashMap<String, DayKey>,
}

impl Default for PendingOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingOverlay {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    /// The day's shared list, created empty on first use.
    pub fn day(&self, key: &DayKey) -> SharedDay {
        self.days.entry(key.clone()).or_default().value().clone()
    }

    pub fn day_of(&self, booking_id: &str) -> Option<DayKey> {
        self.by_id.get(booking_id).map(|e| e.value().clone())
    }

    pub async fn snapshot(&self, key: &DayKey) -> Vec<Booking> {
        match self.days.get(key).map(|e| e.value().clone()) {
            Some(day) => day.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Append, or replace the entry with the same id. Caller holds the day's lock.
    pub fn record(&self, key: &DayKey, entries: &mut Vec<Booking>, booking: Booking) {
        self.by_id.insert(booking.id.clone(), key.clone());
        match entries.iter_mut().find(|b| b.id == booking.id) {
            Some(existing) => *existing = booking,
            None => entries.push(booking),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
