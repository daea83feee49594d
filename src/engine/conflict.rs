use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

fn check_len(field: &str, value: &str, max: usize) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::Invalid(format!("{field} too long")));
    }
    Ok(())
}

pub(crate) fn validate_draft(draft: &DraftBooking) -> Result<(), EngineError> {
    if draft.user_id.trim().is_empty() {
        return Err(EngineError::Invalid("missing user id".into()));
    }
    if draft.facility.name.trim().is_empty() {
        return Err(EngineError::Invalid("missing facility".into()));
    }
    check_len("facility name", &draft.facility.name, MAX_NAME_LEN)?;
    check_len("contact name", &draft.contact.name, MAX_CONTACT_FIELD_LEN)?;
    check_len("student id", &draft.contact.student_id, MAX_CONTACT_FIELD_LEN)?;
    check_len("phone", &draft.contact.phone, MAX_CONTACT_FIELD_LEN)?;
    if draft.facility.price_cents < 0 {
        return Err(EngineError::Invalid("negative price".into()));
    }
    if draft.facility.price_cents > MAX_PRICE_CENTS {
        return Err(EngineError::Invalid("price out of range".into()));
    }
    Ok(())
}

/// The booking already holding the draft's slot, if any. A booking with the
/// draft's own id is a resubmission, not a conflict.
pub(crate) fn find_conflict<'a>(bookings: &'a [Booking], draft: &DraftBooking) -> Option<&'a Booking> {
    find_holder(bookings, &draft.id, &draft.facility.name, draft.date.date(), &draft.slot)
}

/// Another booking (not `id`) blocking `slot` on `day` at `facility_name`.
pub(crate) fn find_holder<'a>(
    bookings: &'a [Booking],
    id: &str,
    facility_name: &str,
    day: NaiveDate,
    slot: &SlotRange,
) -> Option<&'a Booking> {
    bookings
        .iter()
        .filter(|b| b.id != id)
        .find(|b| b.occupies(facility_name, day, slot))
}

// ── Pricing ──────────────────────────────────────────────────────

/// Base price, less the student discount when the id is long enough.
/// Rounds half away from zero to the cent. Saturates instead of overflowing.
pub fn final_cost_cents(base_cents: i64, student_id: &str) -> i64 {
    if student_id.chars().count() <= DISCOUNT_STUDENT_ID_MIN_LEN {
        return base_cents;
    }
    let scaled = i128::from(base_cents) * i128::from(100 - DISCOUNT_PERCENT);
    let rounded = if scaled >= 0 {
        (scaled + 50) / 100
    } else {
        (scaled - 50) / 100
    };
    i64::try_from(rounded).unwrap_or(if rounded < 0 { i64::MIN } else { i64::MAX })
}

/// `"RM 1,234.50"`.
pub fn format_cost(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let units = (abs / 100).to_string();

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, c) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("RM {sign}{grouped}.{:02}", abs % 100)
}
