use std::net::SocketAddr;

use crate::model::BookingStatus;

// ── Booking workflow ────────────────────────────────────────────

/// Counter: bookings confirmed (remote write may still have failed).
pub const BOOKINGS_CONFIRMED_TOTAL: &str = "courtside_bookings_confirmed_total";

/// Counter: confirmations rejected because the slot was taken.
pub const BOOKINGS_REJECTED_TOTAL: &str = "courtside_bookings_rejected_total";

/// Counter: confirmed bookings whose remote upsert failed.
pub const REMOTE_PERSIST_FAILURES_TOTAL: &str = "courtside_remote_persist_failures_total";

/// Counter: status changes. Labels: status.
pub const STATUS_UPDATES_TOTAL: &str = "courtside_status_updates_total";

/// Counter: availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "courtside_availability_queries_total";

// ── Background polling ──────────────────────────────────────────

/// Counter: polls attempted. Labels: status.
pub const POLLS_TOTAL: &str = "courtside_polls_total";

/// Histogram: poll round-trip in seconds.
pub const POLL_DURATION_SECONDS: &str = "courtside_poll_duration_seconds";

// ── History and cache ───────────────────────────────────────────

/// Counter: history loads. Labels: source (remote, cache).
pub const HISTORY_LOADS_TOTAL: &str = "courtside_history_loads_total";

/// Counter: write-through cache failures.
pub const CACHE_WRITE_FAILURES_TOTAL: &str = "courtside_cache_write_failures_total";

// ── Remote store and identity ───────────────────────────────────

/// Histogram: remote store request latency in seconds. Labels: op.
pub const REMOTE_REQUEST_DURATION_SECONDS: &str = "courtside_remote_request_duration_seconds";

/// Counter: failed logins, sign-ups and refreshes.
pub const AUTH_FAILURES_TOTAL: &str = "courtside_auth_failures_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a status to a short label for metrics.
pub fn status_label(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Draft => "draft",
        BookingStatus::Pending => "pending",
        BookingStatus::Confirmed => "confirmed",
        BookingStatus::Rejected => "rejected",
        BookingStatus::Cancelled => "cancelled",
    }
}
