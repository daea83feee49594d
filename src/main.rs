use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use courtside::auth::{AuthBackend, PasswordAuth};
use courtside::cache::LogCache;
use courtside::catalog::Catalog;
use courtside::clock::{Clock, SystemClock};
use courtside::config::Config;
use courtside::connectivity::TcpProbe;
use courtside::engine::Engine;
use courtside::history::BookingHistory;
use courtside::model::{BookingEvent, Facility};
use courtside::notify::NotifyHub;
use courtside::poller::Poller;
use courtside::store::{FirestoreStore, RemoteStore, BOOKINGS};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    courtside::observability::init(config.metrics_port)?;

    let store: Arc<dyn RemoteStore> = Arc::new(FirestoreStore::new(&config.store_url, &config.project_id)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(store.clone(), notify.clone()));
    let catalog = Catalog::new(store.clone());
    let cache = Arc::new(LogCache::open(&config.cache_path, config.cache_compact_threshold)?);
    let history = BookingHistory::new(
        store.clone(),
        cache.clone(),
        Arc::new(TcpProbe::new(config.probe_addr.clone())),
    );
    let auth = PasswordAuth::new(
        &config.auth_url,
        &config.token_url,
        &config.api_key,
        store.clone(),
        clock.clone(),
    )?
    .with_cache(cache.clone());

    info!("courtside starting");
    info!("  project: {}", config.project_id);
    info!("  cache: {}", config.cache_path.display());
    info!("  poll interval: {:?}", config.poll_interval);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    if let Some(id_token) = config.id_token.clone() {
        match auth
            .restore(id_token, config.refresh_token.clone().unwrap_or_default())
            .await
        {
            Ok(user) => info!("resumed session for {} ({})", user.name, user.id),
            Err(e) => warn!("could not resume session: {e}"),
        }
    }

    if let Err(e) = catalog.refresh().await {
        warn!("catalog unavailable: {e}");
    }

    let user = match auth.current_user().await {
        Some(user) => Some(user),
        None => {
            let cached = auth.offline_user().await;
            if let Some(user) = &cached {
                info!("no live session; showing cached profile for {}", user.id);
            }
            cached
        }
    };
    if let Some(user) = user {
        match history.load(&user.id).await {
            Ok(h) => info!(
                "{} bookings on record{}",
                h.bookings.len(),
                if h.stale { " (offline copy)" } else { "" }
            ),
            Err(e) => warn!("booking history unavailable: {e}"),
        }
    }

    let watched = match &config.watch_facility {
        Some(name) => {
            let found = catalog.find(name).await;
            if found.is_none() {
                warn!("facility {name} not in catalog; nothing to watch");
            }
            found
        }
        None => None,
    };

    let poll = watched.map(|facility| {
        let (tx, rx) = mpsc::channel::<()>(1);
        tokio::spawn(watch_slots(engine.clone(), clock.clone(), facility.clone(), rx));
        tokio::spawn(log_events(notify.subscribe(&facility.name)));
        Poller::start(store.clone(), BOOKINGS, None, config.poll_interval, move |_body| {
            // a full channel already has a refresh queued
            let _ = tx.try_send(());
        })
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    if let Some(handle) = poll {
        handle.stop().await;
    }
    // no sign-out here: it clears the cached profile
    info!("courtside stopped");
    Ok(())
}

/// Recompute today's slot board each time the poller sees the collection.
async fn watch_slots(engine: Arc<Engine>, clock: Arc<dyn Clock>, facility: Facility, mut rx: mpsc::Receiver<()>) {
    while rx.recv().await.is_some() {
        let today = clock.now().date_naive();
        match engine.available_slots(&facility, today).await {
            Ok(board) => match &board.reason {
                Some(reason) => info!("{}: {reason}", facility.name),
                None => {
                    let free: Vec<String> = board.available().map(|s| s.range.to_string()).collect();
                    info!("{} {today}: {} of {} slots free [{}]", facility.name, free.len(), board.slots.len(), free.join(", "));
                }
            },
            Err(e) => warn!("{}: availability refresh failed: {e}", facility.name),
        }
    }
}

async fn log_events(mut rx: broadcast::Receiver<BookingEvent>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("missed {n} booking events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            BookingEvent::Confirmed(b) => info!("booking {} confirmed for {}", b.id, b.slot),
            BookingEvent::Rejected(b) => info!("booking {} rejected for {}", b.id, b.slot),
            BookingEvent::StatusChanged { id, status } => info!("booking {id} is now {status}"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
