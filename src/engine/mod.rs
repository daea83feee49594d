mod availability;
mod conflict;
mod error;
mod mutations;
mod overlay;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{merge_overlay, resolve};
pub use conflict::{final_cost_cents, format_cost};
pub use error::EngineError;
pub use overlay::{DayKey, PendingOverlay};

use std::sync::Arc;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::RemoteStore;

/// Outcome of a confirmation attempt. A taken slot is a `Rejected` booking,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub booking: Booking,
    /// False when the remote upsert failed; the booking is still held locally.
    pub remote_synced: bool,
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        self.booking.status == BookingStatus::Confirmed
    }

    /// Short text for the user.
    pub fn message(&self) -> String {
        let b = &self.booking;
        let when = format!("{} {}", b.date.format("%a %d %b %Y"), b.slot);
        match b.status {
            BookingStatus::Rejected => format!(
                "{} at {when} was just taken. Please pick another slot.",
                b.facility_name
            ),
            _ if !self.remote_synced => format!(
                "Booking {} for {} at {when} is saved on this device but could not reach the server.",
                b.id, b.facility_name
            ),
            _ => format!(
                "Booking {} confirmed: {} at {when}. Total {}.",
                b.id,
                b.facility_name,
                b.total_cost.as_deref().unwrap_or("RM 0.00")
            ),
        }
    }
}

/// The booking core: availability reads and confirmation writes against the
/// remote store, with this session's confirmations layered on top.
pub struct Engine {
    remote: Arc<dyn RemoteStore>,
    overlay: PendingOverlay,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(remote: Arc<dyn RemoteStore>, notify: Arc<NotifyHub>) -> Self {
        Self {
            remote,
            overlay: PendingOverlay::new(),
            notify,
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Number of bookings confirmed in this session.
    pub fn pending_count(&self) -> usize {
        self.overlay.len()
    }
}
