use tracing::{info, warn};

use crate::model::*;
use crate::observability;
use crate::rules::day_schedule;

use super::availability::merge_overlay;
use super::conflict::{final_cost_cents, find_conflict, find_holder, format_cost, validate_draft};
use super::overlay::DayKey;
use super::{Confirmation, Engine, EngineError};

impl Engine {
    /// Re-check the draft's slot, then confirm and persist it, or reject it.
    ///
    /// The day's overlay lock is held from the re-check until the booking is in
    /// the overlay, so two confirmations of one slot in this process serialize
    /// and the later one sees the earlier. A failed remote write is logged and
    /// reported through `remote_synced`; the booking stays confirmed locally.
    pub async fn confirm_booking(&self, draft: &DraftBooking) -> Result<Confirmation, EngineError> {
        validate_draft(draft)?;
        let day = draft.date.date();
        let schedule = day_schedule(&draft.facility.category, day);
        if !schedule.offers(&draft.slot) {
            return Err(EngineError::SlotNotOffered {
                slot: draft.slot,
                reason: schedule.closed_reason,
            });
        }

        let key = DayKey::new(&draft.facility.name, day);
        let shared = self.overlay.day(&key);
        let mut pending = shared.lock().await;

        let remote = self.remote.bookings_on(&draft.facility.name, day).await?;
        let current = merge_overlay(remote, &pending);

        if let Some(holder) = find_conflict(&current, draft) {
            info!(
                "rejecting {} for {} {} {}: held by {}",
                draft.id, draft.facility.name, day, draft.slot, holder.id
            );
            let booking = draft.to_booking(BookingStatus::Rejected);
            metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL).increment(1);
            self.notify
                .send(&draft.facility.name, &BookingEvent::Rejected(booking.clone()));
            return Ok(Confirmation {
                booking,
                remote_synced: false,
            });
        }

        let mut booking = draft.to_booking(BookingStatus::Confirmed);
        booking.date = truncate_to_day(draft.date);
        booking.total_cost = Some(format_cost(final_cost_cents(
            draft.facility.price_cents,
            &draft.contact.student_id,
        )));

        let remote_synced = match self.remote.upsert_booking(&booking).await {
            Ok(()) => true,
            Err(e) => {
                warn!("booking {} confirmed locally but not persisted: {e}", booking.id);
                metrics::counter!(observability::REMOTE_PERSIST_FAILURES_TOTAL).increment(1);
                false
            }
        };
        self.overlay.record(&key, &mut pending, booking.clone());
        drop(pending);

        info!(
            "confirmed {} for {} {} {} ({})",
            booking.id,
            booking.facility_name,
            day,
            booking.slot,
            booking.total_cost.as_deref().unwrap_or_default()
        );
        metrics::counter!(observability::BOOKINGS_CONFIRMED_TOTAL).increment(1);
        self.notify
            .send(&booking.facility_name, &BookingEvent::Confirmed(booking.clone()));
        Ok(Confirmation {
            booking,
            remote_synced,
        })
    }

    /// Persist a status change (e.g. a cancellation). `Draft` is never a
    /// target and terminal states stay terminal. A change that makes the
    /// booking occupy its slot re-checks the slot under the day lock, like
    /// `confirm_booking`.
    pub async fn update_status(
        &self,
        booking: &Booking,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let from = booking.status;
        if status == BookingStatus::Draft || (from.is_terminal() && from != status) {
            return Err(EngineError::InvalidTransition { from, to: status });
        }

        let mut updated = booking.clone();
        updated.status = status;

        let key = self
            .overlay
            .day_of(&booking.id)
            .unwrap_or_else(|| DayKey::new(&booking.facility_name, booking.day()));
        let shared = self.overlay.day(&key);
        let mut pending = shared.lock().await;

        let claims_slot = status.occupies_slot() && !from.occupies_slot();
        if claims_slot {
            let day = booking.day();
            let remote = self.remote.bookings_on(&booking.facility_name, day).await?;
            let current = merge_overlay(remote, &pending);
            if let Some(holder) =
                find_holder(&current, &booking.id, &booking.facility_name, day, &booking.slot)
            {
                info!(
                    "refusing {} -> {status} for {}: {} {} held by {}",
                    booking.id, booking.facility_name, day, booking.slot, holder.id
                );
                metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL).increment(1);
                return Err(EngineError::SlotTaken {
                    slot: booking.slot,
                    holder: holder.id.clone(),
                });
            }
        }

        self.remote.upsert_booking(&updated).await?;
        if claims_slot || pending.iter().any(|b| b.id == updated.id) {
            self.overlay.record(&key, &mut pending, updated.clone());
        }
        drop(pending);

        info!("booking {} is now {status}", updated.id);
        metrics::counter!(observability::STATUS_UPDATES_TOTAL, "status" => observability::status_label(status))
            .increment(1);
        self.notify.send(
            &updated.facility_name,
            &BookingEvent::StatusChanged {
                id: updated.id.clone(),
                status,
            },
        );
        Ok(updated)
    }
}
