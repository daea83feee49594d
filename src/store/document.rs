use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::StoreError;

/// One typed field value in the document envelope, e.g. `{"stringValue": "x"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    StringValue(String),
    /// Integers travel as decimal strings.
    IntegerValue(String),
    DoubleValue(f64),
    /// RFC 3339.
    TimestampValue(String),
    BooleanValue(bool),
    NullValue(()),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::StringValue(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Value::IntegerValue(n.to_string())
    }

    pub fn timestamp(at: NaiveDateTime) -> Self {
        Value::TimestampValue(at.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// A stored document. Fields are kept raw so unknown value kinds don't
/// fail the whole document; typed accessors pick out what they understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn set(&mut self, key: &str, value: Value) {
        // Value always serializes to a JSON object.
        if let Ok(raw) = serde_json::to_value(value) {
            self.fields.insert(key.to_string(), raw);
        }
    }

    /// Last path segment of the document name.
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }

    fn raw(&self, key: &str, kind: &str) -> Option<&serde_json::Value> {
        self.fields.get(key).and_then(|v| v.get(kind))
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.raw(key, "stringValue").and_then(|v| v.as_str())
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        let v = self.raw(key, "integerValue")?;
        v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
    }

    /// Any numeric-looking field: integer, double, or a numeric string.
    pub fn number(&self, key: &str) -> Option<f64> {
        if let Some(i) = self.integer(key) {
            return Some(i as f64);
        }
        if let Some(d) = self.raw(key, "doubleValue").and_then(|v| v.as_f64()) {
            return Some(d);
        }
        self.string(key)
            .map(|s| s.trim().trim_start_matches("RM").trim())
            .and_then(|s| s.parse().ok())
    }

    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let s = self.raw(key, "timestampValue")?.as_str()?;
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn required<'a>(doc: &'a Document, key: &str) -> Result<&'a str, StoreError> {
    doc.string(key)
        .ok_or_else(|| StoreError::Decode(format!("missing field {key}")))
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

// ── Bookings ─────────────────────────────────────────────────────

pub fn encode_booking(b: &Booking) -> Document {
    let mut doc = Document::default();
    doc.set("id", Value::string(&b.id));
    doc.set("userId", Value::string(&b.user_id));
    doc.set("facilityName", Value::string(&b.facility_name));
    doc.set("facilityImage", Value::string(&b.facility_image));
    doc.set("location", Value::string(&b.location));
    doc.set("date", Value::timestamp(b.date));
    doc.set("timeSlot", Value::string(b.slot.to_string()));
    doc.set("slotNumber", Value::integer(b.slot_number as i64));
    doc.set("status", Value::string(b.status.as_str()));
    doc.set("contactName", Value::string(&b.contact.name));
    doc.set("contactStudentId", Value::string(&b.contact.student_id));
    doc.set("contactPhone", Value::string(&b.contact.phone));
    doc.set("price", Value::DoubleValue(b.price_cents as f64 / 100.0));
    match &b.total_cost {
        Some(cost) => doc.set("totalCost", Value::string(cost)),
        None => doc.set("totalCost", Value::NullValue(())),
    }
    doc
}

pub fn decode_booking(doc: &Document) -> Result<Booking, StoreError> {
    let id = doc
        .string("id")
        .or_else(|| doc.id())
        .ok_or_else(|| StoreError::Decode("booking without id".into()))?;
    let date = doc
        .timestamp("date")
        .ok_or_else(|| StoreError::Decode(format!("booking {id}: missing date")))?;
    let slot = required(doc, "timeSlot")?
        .parse::<SlotRange>()
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    let status = match doc.string("status") {
        Some(s) => s.parse().map_err(StoreError::Decode)?,
        None => BookingStatus::Pending,
    };
    let text = |key: &str| doc.string(key).unwrap_or_default().to_string();

    Ok(Booking {
        id: id.to_string(),
        user_id: text("userId"),
        facility_name: required(doc, "facilityName")?.to_string(),
        facility_image: text("facilityImage"),
        location: text("location"),
        date: date.naive_utc(),
        slot,
        slot_number: doc.integer("slotNumber").unwrap_or(0).max(0) as u32,
        status,
        contact: Contact {
            name: text("contactName"),
            student_id: text("contactStudentId"),
            phone: text("contactPhone"),
        },
        price_cents: doc.number("price").map(to_cents).unwrap_or(0),
        total_cost: doc.string("totalCost").map(str::to_string),
    })
}

// ── Users ────────────────────────────────────────────────────────

pub fn encode_user(u: &User) -> Document {
    let mut doc = Document::default();
    doc.set("name", Value::string(&u.name));
    doc.set("email", Value::string(&u.email));
    doc.set("studentId", Value::string(&u.student_id));
    doc.set("phoneNumber", Value::string(&u.phone));
    doc.set("username", Value::string(&u.username));
    doc
}

pub fn decode_user(id: &str, doc: &Document) -> User {
    let text = |key: &str| doc.string(key).unwrap_or_default().to_string();
    User {
        id: id.to_string(),
        name: text("name"),
        email: text("email"),
        student_id: text("studentId"),
        phone: text("phoneNumber"),
        username: text("username"),
    }
}

// ── Facilities ───────────────────────────────────────────────────

pub fn decode_facility(doc: &Document) -> Facility {
    let name = doc.string("facilityName").unwrap_or_default().to_string();
    let category = match doc.string("category").map(str::trim) {
        Some(label) if !label.is_empty() => Category::parse(label),
        _ => Category::from_name(&name).unwrap_or_else(|| Category::Other(String::new())),
    };
    Facility {
        id: doc.id().unwrap_or_default().to_string(),
        category,
        location: doc.string("location").unwrap_or_default().to_string(),
        price_cents: doc.number("price").map(to_cents).unwrap_or(0),
        rating: doc.number("rating").unwrap_or(0.0),
        image: doc.string("imageUrl").unwrap_or("dotnet_bot.png").to_string(),
        name,
    }
}
