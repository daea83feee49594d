use std::collections::HashSet;

use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Mark each candidate slot available unless an occupying booking has the
/// identical range. Callers pass bookings for one facility and one day.
///
/// No overlap detection: slots never straddle each other, so exact range
/// equality is the whole test. Inputs are only read.
pub fn resolve(candidates: &[SlotRange], bookings: &[Booking]) -> Vec<TimeSlot> {
    let taken: HashSet<SlotRange> = bookings
        .iter()
        .filter(|b| b.status.occupies_slot())
        .map(|b| b.slot)
        .collect();

    candidates
        .iter()
        .enumerate()
        .map(|(i, range)| TimeSlot {
            range: *range,
            number: i as u32 + 1,
            available: !taken.contains(range),
            selected: false,
        })
        .collect()
}

/// Remote bookings plus this session's pending overlay. An overlay entry
/// replaces the remote copy with the same id (it is never older).
pub fn merge_overlay(remote: Vec<Booking>, pending: &[Booking]) -> Vec<Booking> {
    let pending_ids: HashSet<&str> = pending.iter().map(|b| b.id.as_str()).collect();
    let mut merged: Vec<Booking> = remote
        .into_iter()
        .filter(|b| !pending_ids.contains(b.id.as_str()))
        .collect();
    merged.extend_from_slice(pending);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn slots() -> Vec<SlotRange> {
        vec![SlotRange::hours(10, 12), SlotRange::hours(12, 14), SlotRange::hours(14, 16)]
    }

    fn booking(id: &str, slot: SlotRange, status: BookingStatus) -> Booking {
        Booking {
            id: id.into(),
            user_id: "u1".into(),
            facility_name: "Court".into(),
            facility_image: String::new(),
            location: String::new(),
            date: NaiveDate::from_ymd_opt(2025, 11, 10).unwrap().and_time(NaiveTime::MIN),
            slot,
            slot_number: 0,
            status,
            contact: Contact::default(),
            price_cents: 2000,
            total_cost: None,
        }
    }

    #[test]
    fn no_bookings_all_available() {
        let out = resolve(&slots(), &[]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|s| s.available && !s.selected));
        assert_eq!(out.iter().map(|s| s.number).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn exact_match_marks_unavailable() {
        let bookings = vec![booking("A", SlotRange::hours(12, 14), BookingStatus::Confirmed)];
        let out = resolve(&slots(), &bookings);
        assert!(out[0].available);
        assert!(!out[1].available);
        assert!(out[2].available);
    }

    #[test]
    fn overlapping_but_unequal_range_is_ignored() {
        // 11:00-13:00 straddles two slots but equals neither.
        let bookings = vec![booking("A", SlotRange::hours(11, 13), BookingStatus::Confirmed)];
        let out = resolve(&slots(), &bookings);
        assert!(out.iter().all(|s| s.available));
    }

    #[test]
    fn only_occupying_statuses_count() {
        let bookings = vec![
            booking("A", SlotRange::hours(10, 12), BookingStatus::Rejected),
            booking("B", SlotRange::hours(12, 14), BookingStatus::Cancelled),
            booking("C", SlotRange::hours(14, 16), BookingStatus::Draft),
        ];
        assert!(resolve(&slots(), &bookings).iter().all(|s| s.available));

        let bookings = vec![booking("D", SlotRange::hours(14, 16), BookingStatus::Pending)];
        assert!(!resolve(&slots(), &bookings)[2].available);
    }

    #[test]
    fn resolve_is_idempotent_and_pure() {
        let candidates = slots();
        let bookings = vec![booking("A", SlotRange::hours(10, 12), BookingStatus::Confirmed)];
        let before = bookings.clone();
        let first = resolve(&candidates, &bookings);
        let second = resolve(&candidates, &bookings);
        assert_eq!(first, second);
        assert_eq!(bookings, before);
        assert_eq!(candidates, slots());
    }

    #[test]
    fn empty_candidates_yield_nothing() {
        let bookings = vec![booking("A", SlotRange::hours(10, 12), BookingStatus::Confirmed)];
        assert!(resolve(&[], &bookings).is_empty());
    }

    #[test]
    fn overlay_replaces_remote_copy() {
        let remote = vec![
            booking("A", SlotRange::hours(10, 12), BookingStatus::Confirmed),
            booking("B", SlotRange::hours(12, 14), BookingStatus::Confirmed),
        ];
        let pending = vec![
            booking("A", SlotRange::hours(10, 12), BookingStatus::Cancelled),
            booking("C", SlotRange::hours(14, 16), BookingStatus::Confirmed),
        ];
        let merged = merge_overlay(remote, &pending);
        assert_eq!(merged.len(), 3);
        let a = merged.iter().find(|b| b.id == "A").unwrap();
        assert_eq!(a.status, BookingStatus::Cancelled);

        let out = resolve(&slots(), &merged);
        assert!(out[0].available);
        assert!(!out[1].available);
        assert!(!out[2].available);
    }
}
