//! Local wall-clock formatting.
//!
//! The logger runs in a fixed-offset zone without DST, so a plain
//! [`UtcOffset`] is all the timezone handling needed.

use core::fmt::Write;

use heapless::String;
use time::{OffsetDateTime, UtcOffset};

/// `YYYY-MM-DD HH:MM:SS`
pub const TIMESTAMP_LEN: usize = 19;

pub type Timestamp = String<TIMESTAMP_LEN>;

/// Build an offset from whole hours, falling back to UTC when out of range.
pub fn offset_from_hours(hours: i8) -> UtcOffset {
    UtcOffset::from_hms(hours, 0, 0).unwrap_or(UtcOffset::UTC)
}

/// Unix seconds to local date-time. Out-of-range inputs clamp to the epoch.
pub fn to_local(unix: i64, offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(unix)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset)
}

pub fn format_local(unix: i64, offset: UtcOffset) -> Timestamp {
    let local = to_local(unix, offset);
    let mut out = Timestamp::new();
    // Only five-digit years overflow the buffer; those keep the truncated text.
    let _ = write!(
        out,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        local.year(),
        local.month() as u8,
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    );
    out
}
