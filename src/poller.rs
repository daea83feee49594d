use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::limits::MIN_POLL_INTERVAL;
use crate::observability;
use crate::store::RemoteStore;

/// Periodically fetches one remote collection and hands the raw body to a
/// callback. A failed poll is logged and the loop keeps going.
pub struct Poller;

impl Poller {
    pub fn start<F>(
        store: Arc<dyn RemoteStore>,
        collection: impl Into<String>,
        token: Option<String>,
        interval: Duration,
        callback: F,
    ) -> PollHandle
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        let collection = collection.into();
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let period = interval.max(MIN_POLL_INTERVAL);

        let task = tokio::spawn(async move {
            info!("polling {collection} every {period:?}");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let started = Instant::now();
                let result = tokio::select! {
                    _ = child.cancelled() => break,
                    r = store.fetch_raw(&collection, token.as_deref()) => r,
                };
                metrics::histogram!(observability::POLL_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());

                match result {
                    Ok(body) => {
                        metrics::counter!(observability::POLLS_TOTAL, "status" => "ok").increment(1);
                        debug!("poll {collection}: {} bytes", body.len());
                        callback(body);
                    }
                    Err(e) => {
                        metrics::counter!(observability::POLLS_TOTAL, "status" => "error").increment(1);
                        warn!("poll {collection} failed: {e}");
                    }
                }
            }
            debug!("poller for {collection} stopped");
        });

        PollHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Owns the polling task. Dropping the handle cancels it.
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel and wait for the task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("poller task ended abnormally: {e}");
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::store::{MemoryStore, BOOKINGS};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, impl Fn(Bytes) + Send + Sync + 'static) {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        (seen, move |_body: Bytes| {
            s.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn first_poll_is_immediate_then_periodic() {
        let store = Arc::new(MemoryStore::new());
        let (seen, callback) = counting();
        let handle = Poller::start(store, BOOKINGS, None, Duration::from_millis(20), callback);

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(seen.load(Ordering::SeqCst) >= 3);
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test]
    async fn callback_receives_collection_body() {
        let store = Arc::new(MemoryStore::new());
        let mut draft = DraftBooking::new(
            "u1",
            Facility::new("f1", "Court A", Category::Badminton, 2000),
            chrono::NaiveDate::from_ymd_opt(2025, 11, 10).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            SlotRange::hours(10, 12),
            1,
            Contact::default(),
        );
        draft.id = "ABCD1234".into();
        store.insert_booking(draft.to_booking(BookingStatus::Confirmed));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = Poller::start(store, BOOKINGS, None, Duration::from_millis(50), move |body| {
            let _ = tx.send(body);
        });
        let body = rx.recv().await.unwrap();
        let parsed: Vec<Booking> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed[0].id, "ABCD1234");
        handle.stop().await;
    }

    #[tokio::test]
    async fn keeps_running_through_failures() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let (seen, callback) = counting();
        let handle = Poller::start(store.clone(), BOOKINGS, None, Duration::from_millis(20), callback);

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert!(store.call_count() >= 2);
        assert!(handle.is_running());

        store.set_offline(false);
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(seen.load(Ordering::SeqCst) >= 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn stops_on_cancel_and_on_drop() {
        let store = Arc::new(MemoryStore::new());
        let (seen, callback) = counting();
        let handle = Poller::start(store.clone(), BOOKINGS, None, Duration::from_millis(20), callback);
        tokio::time::sleep(Duration::from_millis(30)).await;

        handle.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_running());
        let after_cancel = seen.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(seen.load(Ordering::SeqCst), after_cancel);

        let (_, callback) = counting();
        let dropped = Poller::start(store.clone(), BOOKINGS, None, Duration::from_millis(20), callback);
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(dropped);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let calls = store.call_count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.call_count(), calls);
    }
}
