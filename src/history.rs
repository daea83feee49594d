use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::{sort_by_date, CacheError, LocalCache};
use crate::connectivity::Connectivity;
use crate::model::Booking;
use crate::observability;
use crate::store::{RemoteStore, StoreError};

#[derive(Debug)]
pub enum HistoryError {
    Store(StoreError),
    Cache(CacheError),
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::Store(e) => write!(f, "could not load bookings: {e}"),
            HistoryError::Cache(e) => write!(f, "could not read saved bookings: {e}"),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HistoryError::Store(e) => Some(e),
            HistoryError::Cache(e) => Some(e),
        }
    }
}

impl From<StoreError> for HistoryError {
    fn from(e: StoreError) -> Self {
        HistoryError::Store(e)
    }
}

impl From<CacheError> for HistoryError {
    fn from(e: CacheError) -> Self {
        HistoryError::Cache(e)
    }
}

/// A user's bookings, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    pub bookings: Vec<Booking>,
    /// True when read from the cache because the store was unreachable.
    pub stale: bool,
}

pub struct BookingHistory {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<dyn LocalCache>,
    connectivity: Arc<dyn Connectivity>,
}

impl BookingHistory {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<dyn LocalCache>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            remote,
            cache,
            connectivity,
        }
    }

    /// Remote first with write-through; cache only when offline.
    pub async fn load(&self, user_id: &str) -> Result<History, HistoryError> {
        if !self.connectivity.is_online().await {
            let bookings = self.cache.bookings_for_user(user_id).await?;
            debug!("offline: {} cached bookings for {user_id}", bookings.len());
            metrics::counter!(observability::HISTORY_LOADS_TOTAL, "source" => "cache").increment(1);
            return Ok(History {
                bookings,
                stale: true,
            });
        }

        let mut bookings = self.remote.bookings_for_user(user_id).await?;
        metrics::counter!(observability::HISTORY_LOADS_TOTAL, "source" => "remote").increment(1);

        let writes = join_all(bookings.iter().map(|b| self.cache.upsert_booking(b))).await;
        for (booking, result) in bookings.iter().zip(writes) {
            if let Err(e) = result {
                warn!("cache write for booking {} failed: {e}", booking.id);
                metrics::counter!(observability::CACHE_WRITE_FAILURES_TOTAL).increment(1);
            }
        }

        sort_by_date(&mut bookings);
        Ok(History {
            bookings,
            stale: false,
        })
    }
}
