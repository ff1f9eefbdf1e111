use time::OffsetDateTime;

pub trait TimeSource {
    // Server receipt time, the only clock envelopes are stamped with
    fn current_time(&self) -> OffsetDateTime;
}

#[derive(Clone)]
pub struct SystemTime {}

impl TimeSource for SystemTime {
    fn current_time(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Milliseconds since the unix epoch, as carried by the envelope `timestamp` field.
pub fn epoch_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Same calendar date one year later, 29 February falls back to 365 days.
pub fn one_year_after(at: OffsetDateTime) -> OffsetDateTime {
    at.replace_year(at.year() + 1)
        .unwrap_or_else(|_| at + time::Duration::days(365))
}
