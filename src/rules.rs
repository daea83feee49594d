use chrono::{Datelike, NaiveDate, Weekday};

use crate::model::{Category, SlotRange};

const MORNING_TO_AFTERNOON: [SlotRange; 3] = [
    SlotRange::hours(10, 12),
    SlotRange::hours(12, 14),
    SlotRange::hours(14, 16),
];

const MORNING_TO_EVENING: [SlotRange; 4] = [
    SlotRange::hours(10, 12),
    SlotRange::hours(12, 14),
    SlotRange::hours(14, 16),
    SlotRange::hours(16, 18),
];

/// Candidate slots for one category on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub slots: Vec<SlotRange>,
    pub closed_reason: Option<String>,
}

impl DaySchedule {
    fn open(slots: &[SlotRange]) -> Self {
        Self {
            slots: slots.to_vec(),
            closed_reason: None,
        }
    }

    fn closed(reason: impl Into<String>) -> Self {
        Self {
            slots: Vec::new(),
            closed_reason: Some(reason.into()),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn offers(&self, slot: &SlotRange) -> bool {
        self.slots.contains(slot)
    }
}

/// The fixed weekly table. Pure; no state.
pub fn day_schedule(category: &Category, date: NaiveDate) -> DaySchedule {
    use Weekday::*;
    let day = date.weekday();
    match category {
        Category::Badminton => {
            if matches!(day, Mon | Thu | Fri) {
                DaySchedule::open(&MORNING_TO_AFTERNOON)
            } else {
                DaySchedule::closed("Badminton is only available on Mon, Thu, and Fri.")
            }
        }
        Category::PingPong => {
            if matches!(day, Mon | Fri) {
                DaySchedule::open(&MORNING_TO_AFTERNOON)
            } else {
                DaySchedule::closed("Ping-Pong is only available on Mon and Fri.")
            }
        }
        Category::Basketball => {
            if matches!(day, Sat | Sun) {
                DaySchedule::closed("Basketball is closed on weekends.")
            } else {
                DaySchedule::open(&MORNING_TO_EVENING)
            }
        }
        Category::Other(label) => DaySchedule::closed(format!("{label} has no booking schedule.")),
    }
}
