//! Wall-clock aligned send slots.

use time::UtcOffset;

/// Next local time whose minute-of-hour is a multiple of `interval_min`, with
/// seconds zeroed, strictly after `now`. Times are unix seconds.
///
/// Minutes past the top of the hour roll into the next hour, so intervals that
/// do not divide 60 drift across hours.
pub fn next_send(now: i64, interval_min: u32, offset: UtcOffset) -> i64 {
    let interval = i64::from(interval_min.max(1)) * 60;
    let shift = i64::from(offset.whole_seconds());

    let local = now + shift;
    let minute_start = local - local.rem_euclid(60);
    let minute_of_hour = local.rem_euclid(3600) / 60;
    let past_slot = (minute_of_hour % (interval / 60)) * 60;

    let mut next = minute_start - past_slot + interval - shift;
    if next <= now {
        next += interval;
    }
    next
}

/// Seconds to wait until `target`, never negative.
pub fn seconds_until(target: i64, now: i64) -> u64 {
    u64::try_from(target - now).unwrap_or(0)
}
