use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::BOOKING_ID_LEN;

/// Minutes since midnight.
pub type Minute = u16;

/// A bookable time range `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: Minute,
    pub end: Minute,
}

impl SlotRange {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "SlotRange start must be before end");
        Self { start, end }
    }

    pub const fn hours(start: u16, end: u16) -> Self {
        Self {
            start: start * 60,
            end: end * 60,
        }
    }

    pub fn duration_minutes(&self) -> Minute {
        self.end - self.start
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02} - {:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSlotError(pub String);

impl fmt::Display for ParseSlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time slot: {:?}", self.0)
    }
}

impl std::error::Error for ParseSlotError {}

fn parse_clock(s: &str) -> Option<Minute> {
    let (h, m) = s.trim().split_once(':')?;
    let h: Minute = h.trim().parse().ok()?;
    let m: Minute = m.trim().parse().ok()?;
    if h > 24 || m > 59 || (h == 24 && m != 0) {
        return None;
    }
    Some(h * 60 + m)
}

impl FromStr for SlotRange {
    type Err = ParseSlotError;

    /// Parses the `"HH:MM - HH:MM"` form used by the remote store.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSlotError(s.to_string());
        let (a, b) = s.split_once('-').ok_or_else(err)?;
        let start = parse_clock(a).ok_or_else(err)?;
        let end = parse_clock(b).ok_or_else(err)?;
        if start >= end {
            return Err(err());
        }
        Ok(Self { start, end })
    }
}

/// Sport category. Decides which weekday rules apply to a facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Badminton,
    PingPong,
    Basketball,
    Other(String),
}

impl Category {
    /// Case-insensitive; separators between words are ignored ("Ping-Pong", "ping pong").
    pub fn parse(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "badminton" => Category::Badminton,
            "pingpong" => Category::PingPong,
            "basketball" => Category::Basketball,
            _ => Category::Other(label.trim().to_string()),
        }
    }

    /// Guess the category from a facility display name, e.g. "Badminton Court A".
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("badminton") {
            Some(Category::Badminton)
        } else if ["ping-pong", "ping pong", "pingpong"]
            .iter()
            .any(|p| lower.contains(p))
        {
            Some(Category::PingPong)
        } else if lower.contains("basketball") {
            Some(Category::Basketball)
        } else {
            None
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Category::Badminton => "Badminton",
            Category::PingPong => "Ping-Pong",
            Category::Basketball => "Basketball",
            Category::Other(label) => label,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub location: String,
    /// Base price per slot, in cents.
    pub price_cents: i64,
    pub rating: f64,
    pub image: String,
}

impl Facility {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Category, price_cents: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            location: String::new(),
            price_cents,
            rating: 0.0,
            image: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Draft,
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Draft => "Draft",
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Rejected => "Rejected",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether a booking in this state blocks its slot for others.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(BookingStatus::Draft),
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "rejected" => Ok(BookingStatus::Rejected),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub student_id: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub facility_name: String,
    pub facility_image: String,
    pub location: String,
    pub date: NaiveDateTime,
    pub slot: SlotRange,
    pub slot_number: u32,
    pub status: BookingStatus,
    pub contact: Contact,
    /// Facility base price at booking time, in cents.
    pub price_cents: i64,
    /// Formatted final cost; set only once confirmed.
    pub total_cost: Option<String>,
}

impl Booking {
    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }

    /// True if this booking blocks `slot` on `day` at `facility_name`.
    pub fn occupies(&self, facility_name: &str, day: NaiveDate, slot: &SlotRange) -> bool {
        self.status.occupies_slot()
            && self.facility_name == facility_name
            && self.day() == day
            && self.slot == *slot
    }
}

/// Short uppercase booking code, e.g. `"7ZK2Q4XA"`.
pub fn generate_booking_id() -> String {
    let full = Ulid::new().to_string();
    full[full.len() - BOOKING_ID_LEN..].to_string()
}

/// Midnight of the given date-time's calendar day.
pub fn truncate_to_day(at: NaiveDateTime) -> NaiveDateTime {
    at.date().and_time(NaiveTime::MIN)
}

/// A booking built client-side against a possibly stale availability snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftBooking {
    pub id: String,
    pub user_id: String,
    pub facility: Facility,
    pub date: NaiveDateTime,
    pub slot: SlotRange,
    pub slot_number: u32,
    pub contact: Contact,
}

impl DraftBooking {
    pub fn new(
        user_id: impl Into<String>,
        facility: Facility,
        date: NaiveDateTime,
        slot: SlotRange,
        slot_number: u32,
        contact: Contact,
    ) -> Self {
        Self {
            id: generate_booking_id(),
            user_id: user_id.into(),
            facility,
            date,
            slot,
            slot_number,
            contact,
        }
    }

    pub fn to_booking(&self, status: BookingStatus) -> Booking {
        Booking {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            facility_name: self.facility.name.clone(),
            facility_image: self.facility.image.clone(),
            location: self.facility.location.clone(),
            date: self.date,
            slot: self.slot,
            slot_number: self.slot_number,
            status,
            contact: self.contact.clone(),
            price_cents: self.facility.price_cents,
            total_cost: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub range: SlotRange,
    /// 1-based position in the day's schedule.
    pub number: u32,
    pub available: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    Closed(String),
    NothingSelected,
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::Closed(reason) => f.write_str(reason),
            SelectionError::NothingSelected => f.write_str("Please select a time slot."),
        }
    }
}

impl std::error::Error for SelectionError {}

/// One facility's slots for one day, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotBoard {
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
    /// Why the facility is closed that day, if it is.
    pub reason: Option<String>,
}

impl SlotBoard {
    pub fn closed(date: NaiveDate, reason: String) -> Self {
        Self {
            date,
            slots: Vec::new(),
            reason: Some(reason),
        }
    }

    /// Select one available slot, clearing any previous selection.
    pub fn select(&mut self, range: SlotRange) -> bool {
        let Some(pos) = self
            .slots
            .iter()
            .position(|s| s.range == range && s.available)
        else {
            return false;
        };
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.selected = i == pos;
        }
        true
    }

    pub fn selected(&self) -> Option<&TimeSlot> {
        self.slots.iter().find(|s| s.selected)
    }

    pub fn available(&self) -> impl Iterator<Item = &TimeSlot> {
        self.slots.iter().filter(|s| s.available)
    }

    pub fn draft(
        &self,
        user_id: &str,
        facility: &Facility,
        contact: Contact,
    ) -> Result<DraftBooking, SelectionError> {
        let Some(slot) = self.selected() else {
            return Err(match &self.reason {
                Some(reason) => SelectionError::Closed(reason.clone()),
                None => SelectionError::NothingSelected,
            });
        };
        Ok(DraftBooking::new(
            user_id,
            facility.clone(),
            self.date.and_time(NaiveTime::MIN),
            slot.range,
            slot.number,
            contact,
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub student_id: String,
    pub phone: String,
    pub username: String,
}

impl User {
    /// Minimal record used when no profile can be read.
    pub fn guest(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Guest".into(),
            ..Default::default()
        }
    }
}

/// Broadcast to in-process observers of a facility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingEvent {
    Confirmed(Booking),
    Rejected(Booking),
    StatusChanged { id: String, status: BookingStatus },
}
