use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{Booking, User};

use super::{sort_by_date, CacheError, LocalCache};

/// Volatile cache for tests and cacheless runs.
#[derive(Default)]
pub struct MemoryCache {
    users: DashMap<String, User>,
    bookings: DashMap<String, Booking>,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes fail while set; reads still work.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    fn check_write(&self) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, CacheError> {
        Ok(self.users.get(user_id).map(|e| e.value().clone()))
    }

    async fn last_user(&self) -> Result<Option<User>, CacheError> {
        Ok(self.users.iter().next().map(|e| e.value().clone()))
    }

    async fn save_user(&self, user: &User) -> Result<(), CacheError> {
        self.check_write()?;
        self.users.clear();
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn upsert_booking(&self, booking: &Booking) -> Result<(), CacheError> {
        self.check_write()?;
        self.bookings.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, CacheError> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect();
        sort_by_date(&mut out);
        Ok(out)
    }

    async fn clear_bookings(&self) -> Result<(), CacheError> {
        self.check_write()?;
        self.bookings.clear();
        Ok(())
    }

    async fn clear_users(&self) -> Result<(), CacheError> {
        self.check_write()?;
        self.users.clear();
        Ok(())
    }
}
