use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::limits::REQUEST_TIMEOUT;
use crate::model::*;

use super::document::{decode_booking, decode_facility, decode_user, encode_booking, encode_user, Document};
use super::{RemoteStore, StoreError, BOOKINGS, FACILITIES, USERS};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    document: Option<Document>,
}

/// Firestore REST client: GET for reads, PATCH for upserts, `:runQuery` for lookups.
pub struct FirestoreStore {
    client: reqwest::Client,
    documents_url: String,
    token: RwLock<Option<String>>,
}

impl FirestoreStore {
    pub fn new(base_url: &str, project_id: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let documents_url = format!(
            "{}/v1/projects/{project_id}/databases/(default)/documents",
            base_url.trim_end_matches('/')
        );
        Ok(Self {
            client,
            documents_url,
            token: RwLock::new(None),
        })
    }

    async fn authorize(
        &self,
        req: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        match token {
            Some(t) => req.bearer_auth(t),
            None => match self.token.read().await.as_deref() {
                Some(t) => req.bearer_auth(t),
                None => req,
            },
        }
    }

    async fn send(
        &self,
        op: &'static str,
        req: reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> Result<reqwest::Response, StoreError> {
        let start = Instant::now();
        let result = self.authorize(req, token).await.send().await;
        metrics::histogram!(crate::observability::REMOTE_REQUEST_DURATION_SECONDS, "op" => op)
            .record(start.elapsed().as_secs_f64());
        let response = result?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        debug!("{op} failed with {status}");
        match status.as_u16() {
            401 => Err(StoreError::Unauthorized),
            403 => Err(StoreError::Forbidden),
            404 => Err(StoreError::NotFound(response.url().path().to_string())),
            code => Err(StoreError::Status {
                code,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}/{collection}", self.documents_url);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self.client.get(&url);
            if let Some(t) = &page_token {
                req = req.query(&[("pageToken", t)]);
            }
            let page: ListResponse = self.send("list", req, None).await?.json().await?;
            documents.extend(page.documents);
            match page.next_page_token {
                Some(t) if !t.is_empty() => page_token = Some(t),
                _ => break,
            }
        }
        Ok(documents)
    }

    async fn patch(&self, collection: &str, id: &str, doc: &Document) -> Result<(), StoreError> {
        let url = format!("{}/{collection}/{id}", self.documents_url);
        let body = json!({ "fields": doc.fields });
        self.send("upsert", self.client.patch(&url).json(&body), None)
            .await?;
        Ok(())
    }

    /// Field-equality query against one collection.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}:runQuery", self.documents_url);
        let mut query = json!({
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field },
                    "op": "EQUAL",
                    "value": { "stringValue": value }
                }
            }
        });
        if let Some(n) = limit {
            query["limit"] = json!(n);
        }
        let body = json!({ "structuredQuery": query });
        let rows: Vec<QueryRow> = self
            .send("query", self.client.post(&url).json(&body), None)
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().filter_map(|r| r.document).collect())
    }
}

fn decode_bookings(docs: &[Document]) -> Vec<Booking> {
    docs.iter()
        .filter_map(|doc| match decode_booking(doc) {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::warn!("skipping booking document {:?}: {e}", doc.name);
                None
            }
        })
        .collect()
}

#[async_trait]
impl RemoteStore for FirestoreStore {
    async fn list_facilities(&self) -> Result<Vec<Facility>, StoreError> {
        let docs = self.list(FACILITIES).await?;
        Ok(docs.iter().map(decode_facility).collect())
    }

    async fn get_user(&self, user_id: &str) -> Result<User, StoreError> {
        let url = format!("{}/{USERS}/{user_id}", self.documents_url);
        let doc: Document = self
            .send("get", self.client.get(&url), None)
            .await?
            .json()
            .await?;
        Ok(decode_user(user_id, &doc))
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.patch(USERS, &user.id, &encode_user(user)).await
    }

    async fn email_for_username(&self, username: &str) -> Result<Option<String>, StoreError> {
        let docs = self.query_eq(USERS, "username", username, Some(1)).await?;
        Ok(docs
            .iter()
            .find_map(|d| d.string("email").map(str::to_string)))
    }

    async fn bookings_on(&self, facility_name: &str, day: NaiveDate) -> Result<Vec<Booking>, StoreError> {
        // Stored dates may carry a time of day; match the day client-side.
        let docs = self.query_eq(BOOKINGS, "facilityName", facility_name, None).await?;
        let mut out = Vec::new();
        for doc in &docs {
            match decode_booking(doc) {
                Ok(b) if b.day() == day => out.push(b),
                Ok(_) => {}
                // An unreadable booking may hold a slot on this day, so the
                // day cannot be judged free.
                Err(e) => {
                    let other_day = doc
                        .timestamp("date")
                        .is_some_and(|at| at.naive_utc().date() != day);
                    if !other_day {
                        return Err(e);
                    }
                    tracing::warn!("skipping booking document {:?}: {e}", doc.name);
                }
            }
        }
        Ok(out)
    }

    async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let docs = self.query_eq(BOOKINGS, "userId", user_id, None).await?;
        Ok(decode_bookings(&docs))
    }

    async fn upsert_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        self.patch(BOOKINGS, &booking.id, &encode_booking(booking)).await
    }

    async fn fetch_raw(&self, collection: &str, token: Option<&str>) -> Result<Bytes, StoreError> {
        let url = format!("{}/{collection}", self.documents_url);
        let body = self
            .send("fetch_raw", self.client.get(&url), token)
            .await?
            .bytes()
            .await?;
        Ok(body)
    }

    async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }
}
