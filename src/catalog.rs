use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::model::{Category, Facility};
use crate::store::{RemoteStore, StoreError};

/// Facilities as last fetched from the store.
pub struct Catalog {
    store: Arc<dyn RemoteStore>,
    facilities: RwLock<Vec<Facility>>,
}

impl Catalog {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            facilities: RwLock::new(Vec::new()),
        }
    }

    /// Replace the cached list with the store's. On error the old list stays.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        let fetched = self.store.list_facilities().await?;
        let n = fetched.len();
        *self.facilities.write().await = fetched;
        info!("catalog refreshed: {n} facilities");
        Ok(n)
    }

    pub async fn all(&self) -> Vec<Facility> {
        self.facilities.read().await.clone()
    }

    pub async fn by_category(&self, category: &Category) -> Vec<Facility> {
        self.facilities
            .read()
            .await
            .iter()
            .filter(|f| &f.category == category)
            .cloned()
            .collect()
    }

    /// Look up by id, then by name ignoring case.
    pub async fn find(&self, key: &str) -> Option<Facility> {
        let facilities = self.facilities.read().await;
        facilities
            .iter()
            .find(|f| f.id == key)
            .or_else(|| facilities.iter().find(|f| f.name.eq_ignore_ascii_case(key)))
            .cloned()
    }
}
