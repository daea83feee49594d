mod log;
mod memory;

pub use log::{CacheRecord, LogCache};
pub use memory::MemoryCache;

use async_trait::async_trait;

use crate::model::{Booking, User};

#[derive(Debug)]
pub enum CacheError {
    Io(std::io::Error),
    Encode(String),
    Unavailable(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "cache io: {e}"),
            CacheError::Encode(e) => write!(f, "cache encode: {e}"),
            CacheError::Unavailable(e) => write!(f, "cache unavailable: {e}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e)
    }
}

/// On-device copy of the signed-in user and their bookings, read when the
/// remote store is unreachable.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, CacheError>;
    /// The profile saved by the last sign-in, if any.
    async fn last_user(&self) -> Result<Option<User>, CacheError>;
    /// Replaces every cached profile with this one.
    async fn save_user(&self, user: &User) -> Result<(), CacheError>;
    async fn upsert_booking(&self, booking: &Booking) -> Result<(), CacheError>;
    /// The user's bookings, oldest first.
    async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, CacheError>;
    async fn clear_bookings(&self) -> Result<(), CacheError>;
    async fn clear_users(&self) -> Result<(), CacheError>;
}

pub(crate) fn sort_by_date(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
}
