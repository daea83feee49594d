mod document;
mod firestore;
mod memory;

pub use document::{Document, Value};
pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;

use crate::model::{Booking, Facility, User};

pub const FACILITIES: &str = "facility";
pub const USERS: &str = "users";
pub const BOOKINGS: &str = "bookings";

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Unauthorized,
    Forbidden,
    Status { code: u16, body: String },
    Transport(String),
    Decode(String),
}

impl StoreError {
    /// Errors that mean "there is no readable profile" rather than a failure.
    pub fn is_missing_profile(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_) | StoreError::Unauthorized | StoreError::Forbidden
        )
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::Unauthorized => write!(f, "unauthorized"),
            StoreError::Forbidden => write!(f, "forbidden"),
            StoreError::Status { code, body } => write!(f, "remote store returned {code}: {body}"),
            StoreError::Transport(e) => write!(f, "remote store unreachable: {e}"),
            StoreError::Decode(e) => write!(f, "malformed document: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// The remote document store the booking core reads from and writes to.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<User, StoreError>;

    /// Upsert the profile document keyed by `user.id`.
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;

    async fn email_for_username(&self, username: &str) -> Result<Option<String>, StoreError>;

    /// All bookings for a facility on one calendar day, any status.
    async fn bookings_on(&self, facility_name: &str, day: NaiveDate) -> Result<Vec<Booking>, StoreError>;

    /// All bookings for a user, in no particular order.
    async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// Insert or overwrite the booking keyed by `booking.id`.
    async fn upsert_booking(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Raw body of a whole collection. `token` overrides the store's own credentials.
    async fn fetch_raw(&self, collection: &str, token: Option<&str>) -> Result<Bytes, StoreError>;

    /// Bearer token for later requests. Stores without credentials ignore it.
    async fn set_token(&self, _token: Option<String>) {}
}
