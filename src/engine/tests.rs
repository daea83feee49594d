use super::*;
use crate::store::MemoryStore;
use chrono::{NaiveDate, NaiveDateTime};
use tokio_test::assert_ok;

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 10).unwrap()
}

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 11).unwrap()
}

fn at(day: NaiveDate, h: u32) -> NaiveDateTime {
    day.and_hms_opt(h, 0, 0).unwrap()
}

fn court() -> Facility {
    Facility::new("f1", "Court A", Category::Badminton, 2000)
}

fn contact(student_id: &str) -> Contact {
    Contact {
        name: "Aina".into(),
        student_id: student_id.into(),
        phone: "0123456789".into(),
    }
}

fn draft(user: &str, slot: SlotRange) -> DraftBooking {
    DraftBooking::new(user, court(), at(monday(), 15), slot, 1, contact("S12345"))
}

fn setup() -> (Arc<MemoryStore>, Engine) {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(store.clone(), Arc::new(NotifyHub::new()));
    (store, engine)
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn open_day_lists_schedule_numbered() {
    let (_, engine) = setup();
    let board = assert_ok!(engine.available_slots(&court(), monday()).await);
    assert_eq!(board.reason, None);
    let ranges: Vec<_> = board.slots.iter().map(|s| s.range).collect();
    assert_eq!(
        ranges,
        vec![SlotRange::hours(10, 12), SlotRange::hours(12, 14), SlotRange::hours(14, 16)]
    );
    assert_eq!(board.slots.iter().map(|s| s.number).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(board.slots.iter().all(|s| s.available && !s.selected));
}

#[tokio::test]
async fn closed_day_makes_no_remote_call() {
    let (store, engine) = setup();
    let board = assert_ok!(engine.available_slots(&court(), tuesday()).await);
    assert!(board.slots.is_empty());
    assert_eq!(
        board.reason.as_deref(),
        Some("Badminton is only available on Mon, Thu, and Fri.")
    );
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn remote_bookings_block_slots_by_status() {
    let (store, engine) = setup();
    let mut held = draft("u2", SlotRange::hours(10, 12)).to_booking(BookingStatus::Pending);
    held.id = "HELD0001".into();
    store.insert_booking(held);
    let mut gone = draft("u3", SlotRange::hours(12, 14)).to_booking(BookingStatus::Cancelled);
    gone.id = "GONE0001".into();
    store.insert_booking(gone);

    let board = assert_ok!(engine.available_slots(&court(), monday()).await);
    let avail: Vec<_> = board.slots.iter().map(|s| s.available).collect();
    assert_eq!(avail, vec![false, true, true]);
    assert!(!assert_ok!(engine.is_slot_available(&court(), monday(), SlotRange::hours(10, 12)).await));
    assert!(assert_ok!(engine.is_slot_available(&court(), monday(), SlotRange::hours(12, 14)).await));
}

#[tokio::test]
async fn remote_read_failure_is_an_error() {
    let (store, engine) = setup();
    store.set_offline(true);
    let result = engine.available_slots(&court(), monday()).await;
    assert!(matches!(result, Err(EngineError::Store(_))));
}

// ── Confirmation ─────────────────────────────────────────

#[tokio::test]
async fn confirm_persists_with_discounted_cost() {
    let (store, engine) = setup();
    let d = draft("u1", SlotRange::hours(10, 12));
    let c = assert_ok!(engine.confirm_booking(&d).await);

    assert!(c.is_confirmed());
    assert!(c.remote_synced);
    assert_eq!(c.booking.total_cost.as_deref(), Some("RM 18.00"));
    assert_eq!(c.booking.date, at(monday(), 0));
    assert!(c.message().contains(&d.id));

    let stored = store.booking(&d.id).unwrap();
    assert_eq!(stored.status, BookingStatus::Confirmed);
    assert_eq!(stored.total_cost.as_deref(), Some("RM 18.00"));
}

#[tokio::test]
async fn short_student_id_pays_full_price() {
    let (_, engine) = setup();
    let mut d = draft("u1", SlotRange::hours(10, 12));
    d.contact = contact("12345");
    let c = assert_ok!(engine.confirm_booking(&d).await);
    assert_eq!(c.booking.total_cost.as_deref(), Some("RM 20.00"));
}

#[tokio::test]
async fn taken_slot_is_rejected_and_not_persisted() {
    let (store, engine) = setup();
    let first = draft("u1", SlotRange::hours(10, 12));
    assert_ok!(engine.confirm_booking(&first).await);

    let second = draft("u2", SlotRange::hours(10, 12));
    let c = assert_ok!(engine.confirm_booking(&second).await);
    assert_eq!(c.booking.status, BookingStatus::Rejected);
    assert!(!c.is_confirmed());
    assert!(c.message().contains("just taken"));
    assert!(store.booking(&second.id).is_none());
    assert_eq!(store.booking_count(), 1);
}

#[tokio::test]
async fn resubmitting_same_draft_does_not_conflict_with_itself() {
    let (store, engine) = setup();
    let d = draft("u1", SlotRange::hours(10, 12));
    assert_ok!(engine.confirm_booking(&d).await);
    let again = assert_ok!(engine.confirm_booking(&d).await);
    assert!(again.is_confirmed());
    assert_eq!(store.booking_count(), 1);
    assert_eq!(engine.pending_bookings("Court A", monday()).await.len(), 1);
}

#[tokio::test]
async fn slot_outside_schedule_is_refused() {
    let (store, engine) = setup();
    let d = draft("u1", SlotRange::hours(16, 18));
    let result = engine.confirm_booking(&d).await;
    assert!(matches!(result, Err(EngineError::SlotNotOffered { reason: None, .. })));

    let closed = DraftBooking::new("u1", court(), at(tuesday(), 0), SlotRange::hours(10, 12), 1, contact(""));
    let result = engine.confirm_booking(&closed).await;
    assert!(matches!(result, Err(EngineError::SlotNotOffered { reason: Some(_), .. })));
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn invalid_draft_fails_before_remote() {
    let (store, engine) = setup();
    let d = draft("", SlotRange::hours(10, 12));
    assert!(matches!(engine.confirm_booking(&d).await, Err(EngineError::Invalid(_))));
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn remote_read_failure_aborts_confirmation() {
    let (store, engine) = setup();
    store.set_offline(true);
    let d = draft("u1", SlotRange::hours(10, 12));
    assert!(matches!(engine.confirm_booking(&d).await, Err(EngineError::Store(_))));
    assert!(engine.pending_bookings("Court A", monday()).await.is_empty());
}

#[tokio::test]
async fn persist_failure_still_blocks_slot_locally() {
    let (store, engine) = setup();
    store.set_reject_writes(true);

    let d = draft("u1", SlotRange::hours(12, 14));
    let c = assert_ok!(engine.confirm_booking(&d).await);
    assert!(c.is_confirmed());
    assert!(!c.remote_synced);
    assert!(c.message().contains("could not reach the server"));
    assert_eq!(store.booking_count(), 0);

    let board = assert_ok!(engine.available_slots(&court(), monday()).await);
    let taken: Vec<_> = board.slots.iter().filter(|s| !s.available).map(|s| s.range).collect();
    assert_eq!(taken, vec![SlotRange::hours(12, 14)]);

    let rival = draft("u2", SlotRange::hours(12, 14));
    let c = assert_ok!(engine.confirm_booking(&rival).await);
    assert_eq!(c.booking.status, BookingStatus::Rejected);
}

#[tokio::test]
async fn concurrent_confirmations_yield_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(Engine::new(store.clone(), Arc::new(NotifyHub::new())));

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let d = draft(&format!("u{i}"), SlotRange::hours(14, 16));
            engine.confirm_booking(&d).await
        }));
    }

    let mut confirmed = 0;
    let mut rejected = 0;
    for h in handles {
        let c = h.await.unwrap().unwrap();
        match c.booking.status {
            BookingStatus::Confirmed => confirmed += 1,
            BookingStatus::Rejected => rejected += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(confirmed, 1);
    assert_eq!(rejected, 7);
    assert_eq!(store.booking_count(), 1);
}

#[tokio::test]
async fn different_slots_confirm_independently() {
    let (_, engine) = setup();
    let a = assert_ok!(engine.confirm_booking(&draft("u1", SlotRange::hours(10, 12))).await);
    let b = assert_ok!(engine.confirm_booking(&draft("u2", SlotRange::hours(12, 14))).await);
    assert!(a.is_confirmed() && b.is_confirmed());
    assert_eq!(engine.pending_count(), 2);
}

#[tokio::test]
async fn confirm_and_reject_are_broadcast() {
    let (_, engine) = setup();
    let mut rx = engine.notify.subscribe("Court A");

    assert_ok!(engine.confirm_booking(&draft("u1", SlotRange::hours(10, 12))).await);
    assert_ok!(engine.confirm_booking(&draft("u2", SlotRange::hours(10, 12))).await);

    assert!(matches!(rx.recv().await.unwrap(), BookingEvent::Confirmed(b) if b.user_id == "u1"));
    assert!(matches!(rx.recv().await.unwrap(), BookingEvent::Rejected(b) if b.user_id == "u2"));
}

// ── Status updates ───────────────────────────────────────

#[tokio::test]
async fn cancel_frees_the_slot() {
    let (store, engine) = setup();
    let c = assert_ok!(engine.confirm_booking(&draft("u1", SlotRange::hours(10, 12))).await);

    let cancelled = assert_ok!(engine.update_status(&c.booking, BookingStatus::Cancelled).await);
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(store.booking(&c.booking.id).unwrap().status, BookingStatus::Cancelled);
    assert_eq!(
        engine.pending_bookings("Court A", monday()).await[0].status,
        BookingStatus::Cancelled
    );
    assert!(assert_ok!(engine.is_slot_available(&court(), monday(), SlotRange::hours(10, 12)).await));
}

#[tokio::test]
async fn invalid_transitions_are_refused() {
    let (store, engine) = setup();
    let c = assert_ok!(engine.confirm_booking(&draft("u1", SlotRange::hours(10, 12))).await);
    let calls = store.call_count();

    let result = engine.update_status(&c.booking, BookingStatus::Draft).await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));

    let cancelled = assert_ok!(engine.update_status(&c.booking, BookingStatus::Cancelled).await);
    let result = engine.update_status(&cancelled, BookingStatus::Confirmed).await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidTransition {
            from: BookingStatus::Cancelled,
            to: BookingStatus::Confirmed
        })
    ));
    // only the successful cancel reached the store
    assert_eq!(store.call_count(), calls + 1);
}

#[tokio::test]
async fn status_update_propagates_store_failure() {
    let (store, engine) = setup();
    let c = assert_ok!(engine.confirm_booking(&draft("u1", SlotRange::hours(10, 12))).await);
    store.set_reject_writes(true);
    let result = engine.update_status(&c.booking, BookingStatus::Cancelled).await;
    assert!(matches!(result, Err(EngineError::Store(_))));
    assert_eq!(
        engine.pending_bookings("Court A", monday()).await[0].status,
        BookingStatus::Confirmed
    );
}

#[tokio::test]
async fn pending_to_confirmed_for_remote_booking() {
    let (store, engine) = setup();
    let mut remote = draft("u9", SlotRange::hours(14, 16)).to_booking(BookingStatus::Pending);
    remote.date = at(monday(), 0);
    store.insert_booking(remote.clone());

    let updated = assert_ok!(engine.update_status(&remote, BookingStatus::Confirmed).await);
    assert_eq!(updated.status, BookingStatus::Confirmed);
    // not confirmed in this session, so the overlay stays empty
    assert!(engine.pending_bookings("Court A", monday()).await.is_empty());
}

#[tokio::test]
async fn promoting_a_draft_onto_a_taken_slot_is_refused() {
    let (store, engine) = setup();
    let first = assert_ok!(engine.confirm_booking(&draft("u1", SlotRange::hours(10, 12))).await);
    assert!(first.is_confirmed());

    let second = draft("u2", SlotRange::hours(10, 12)).to_booking(BookingStatus::Draft);
    let result = engine.update_status(&second, BookingStatus::Confirmed).await;
    match result {
        Err(EngineError::SlotTaken { slot, holder }) => {
            assert_eq!(slot, SlotRange::hours(10, 12));
            assert_eq!(holder, first.booking.id);
        }
        other => panic!("expected SlotTaken, got {other:?}"),
    }
    let result = engine.update_status(&second, BookingStatus::Pending).await;
    assert!(matches!(result, Err(EngineError::SlotTaken { .. })));

    assert!(store.booking(&second.id).is_none());
    assert_eq!(store.booking_count(), 1);
}

#[tokio::test]
async fn promoting_a_draft_onto_a_remote_hold_is_refused() {
    let (store, engine) = setup();
    let mut held = draft("u9", SlotRange::hours(12, 14)).to_booking(BookingStatus::Pending);
    held.id = "HELD0001".into();
    store.insert_booking(held);

    let mine = draft("u1", SlotRange::hours(12, 14)).to_booking(BookingStatus::Draft);
    let result = engine.update_status(&mine, BookingStatus::Confirmed).await;
    assert!(matches!(result, Err(EngineError::SlotTaken { holder, .. }) if holder == "HELD0001"));
}

#[tokio::test]
async fn promoted_draft_blocks_later_confirmations() {
    let (store, engine) = setup();
    let mine = draft("u1", SlotRange::hours(14, 16)).to_booking(BookingStatus::Draft);
    let updated = assert_ok!(engine.update_status(&mine, BookingStatus::Confirmed).await);
    assert_eq!(updated.status, BookingStatus::Confirmed);
    assert_eq!(engine.pending_bookings("Court A", monday()).await.len(), 1);
    assert_eq!(store.booking(&mine.id).unwrap().status, BookingStatus::Confirmed);

    let later = assert_ok!(engine.confirm_booking(&draft("u2", SlotRange::hours(14, 16))).await);
    assert_eq!(later.booking.status, BookingStatus::Rejected);
}

#[test]
fn confirmation_message_variants() {
    let d = DraftBooking::new("u1", court(), at(monday(), 0), SlotRange::hours(10, 12), 1, contact(""));
    let mut booking = d.to_booking(BookingStatus::Confirmed);
    booking.total_cost = Some("RM 20.00".into());
    let ok = Confirmation {
        booking: booking.clone(),
        remote_synced: true,
    };
    assert_eq!(
        ok.message(),
        format!("Booking {} confirmed: Court A at Mon 10 Nov 2025 10:00 - 12:00. Total RM 20.00.", d.id)
    );
}
