use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::model::*;

use super::{RemoteStore, StoreError, BOOKINGS, FACILITIES, USERS};

/// In-process stand-in for the remote store, with switches to simulate outages.
pub struct MemoryStore {
    facilities: DashMap<String, Facility>,
    users: DashMap<String, User>,
    bookings: DashMap<String, Booking>,
    calls: AtomicUsize,
    offline: AtomicBool,
    reject_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            facilities: DashMap::new(),
            users: DashMap::new(),
            bookings: DashMap::new(),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
        }
    }

    pub fn with_facilities(facilities: impl IntoIterator<Item = Facility>) -> Self {
        let store = Self::new();
        for f in facilities {
            store.facilities.insert(f.id.clone(), f);
        }
        store
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn insert_booking(&self, booking: Booking) {
        self.bookings.insert(booking.id.clone(), booking);
    }

    pub fn booking(&self, id: &str) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    /// Number of trait calls served (or refused) so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every call fails with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Writes fail with a 503 while set; reads still work.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("store is offline".into()));
        }
        Ok(())
    }

    fn enter_write(&self) -> Result<(), StoreError> {
        self.enter()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                code: 503,
                body: "writes disabled".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError> {
        self.enter()?;
        let mut all: Vec<Facility> = self.facilities.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_user(&self, user_id: &str) -> Result<User, StoreError> {
        self.enter()?;
        self.users
            .get(user_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("{USERS}/{user_id}")))
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.enter_write()?;
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn email_for_username(&self, username: &str) -> Result<Option<String>, StoreError> {
        self.enter()?;
        Ok(self
            .users
            .iter()
            .find(|e| e.value().username == username)
            .map(|e| e.value().email.clone()))
    }

    async fn bookings_on(&self, facility_name: &str, day: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        self.enter()?;
        Ok(self
            .bookings
            .iter()
            .filter(|e| e.value().facility_name == facility_name && e.value().day() == day)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.enter()?;
        Ok(self
            .bookings
            .iter()
            .filter(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn upsert_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.enter_write()?;
        self.bookings.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn fetch_raw(&self, collection: &str, _token: Option<&str>) -> Result<Bytes, StoreError> {
        self.enter()?;
        let body = match collection {
            BOOKINGS => {
                let mut all: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
                all.sort_by(|a, b| a.id.cmp(&b.id));
                serde_json::to_vec(&all)?
            }
            FACILITIES => {
                let all: Vec<Facility> = self.facilities.iter().map(|e| e.value().clone()).collect();
                serde_json::to_vec(&all)?
            }
            USERS => {
                let all: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
                serde_json::to_vec(&all)?
            }
            other => return Err(StoreError::NotFound(other.to_string())),
        };
        Ok(Bytes::from(body))
    }
}
