use std::time::Duration;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_CONTACT_FIELD_LEN: usize = 128;
pub const BOOKING_ID_LEN: usize = 8;

/// Student ids strictly longer than this get the discount.
pub const DISCOUNT_STUDENT_ID_MIN_LEN: usize = 5;
pub const DISCOUNT_PERCENT: i64 = 10;
/// RM 1,000,000.00
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_CACHE_COMPACT_THRESHOLD: u64 = 1000;
pub const NOTIFY_CHANNEL_CAPACITY: usize = 256;
