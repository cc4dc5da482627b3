//! Time sources and stash timestamp formatting

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Timestamp layout embedded in stash names (second granularity)
pub const STASH_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock starting at the given unix timestamp (seconds)
    pub fn at_unix(secs: i64) -> Self {
        Self::new(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Render a time the way stash names carry it
pub fn format_stash_timestamp(time: &DateTime<Utc>) -> String {
    time.format(STASH_TIMESTAMP_FORMAT).to_string()
}

/// Parse a stash name timestamp; `None` when it is not in stash layout
pub fn parse_stash_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, STASH_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
