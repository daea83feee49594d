use chrono::NaiveDate;

use crate::model::*;
use crate::observability;
use crate::rules::day_schedule;

use super::availability::{merge_overlay, resolve};
use super::overlay::DayKey;
use super::{Engine, EngineError};

impl Engine {
    /// The facility's slots for one day with availability filled in.
    /// Closed days answer from the rule table alone, without a remote read.
    pub async fn available_slots(
        &self,
        facility: &Facility,
        date: NaiveDate,
    ) -> Result<SlotBoard, EngineError> {
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        let schedule = day_schedule(&facility.category, date);
        if !schedule.is_open() {
            let reason = schedule
                .closed_reason
                .unwrap_or_else(|| format!("{} is closed on {date}.", facility.name));
            return Ok(SlotBoard::closed(date, reason));
        }

        let bookings = self.current_bookings(&facility.name, date).await?;
        Ok(SlotBoard {
            date,
            slots: resolve(&schedule.slots, &bookings),
            reason: None,
        })
    }

    pub async fn is_slot_available(
        &self,
        facility: &Facility,
        date: NaiveDate,
        slot: SlotRange,
    ) -> Result<bool, EngineError> {
        let board = self.available_slots(facility, date).await?;
        Ok(board
            .slots
            .iter()
            .any(|s| s.range == slot && s.available))
    }

    /// Remote bookings for the day merged with this session's overlay.
    pub async fn current_bookings(
        &self,
        facility_name: &str,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, EngineError> {
        let remote = self.remote.bookings_on(facility_name, date).await?;
        let pending = self
            .overlay
            .snapshot(&DayKey::new(facility_name, date))
            .await;
        Ok(merge_overlay(remote, &pending))
    }

    /// Bookings confirmed in this session for one facility and day.
    pub async fn pending_bookings(&self, facility_name: &str, date: NaiveDate) -> Vec<Booking> {
        self.overlay
            .snapshot(&DayKey::new(facility_name, date))
            .await
    }
}
