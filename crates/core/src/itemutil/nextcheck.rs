use chrono::{DateTime, Utc};

use crate::error::DelayError;

/// Default interval for re-checking unsupported items, in seconds.
pub const DEFAULT_REFRESH_UNSUPPORTED: u64 = 600;

/// Longest accepted update interval, in seconds.
pub const MAX_DELAY: u64 = 86_400;

/// Parse an update interval (`30`, `30s`, `5m`, `1h`, `1d`, `1w`) into seconds.
///
/// Flexible and scheduling intervals after the first `;` are ignored.
pub fn parse_delay(delay: &str) -> Result<u64, DelayError> {
    let simple = delay.split(';').next().unwrap_or("").trim();
    if simple.is_empty() {
        return Err(DelayError::Empty);
    }

    let (digits, multiplier) = match simple.as_bytes()[simple.len() - 1] {
        b's' => (&simple[..simple.len() - 1], 1),
        b'm' => (&simple[..simple.len() - 1], 60),
        b'h' => (&simple[..simple.len() - 1], 3_600),
        b'd' => (&simple[..simple.len() - 1], 86_400),
        b'w' => (&simple[..simple.len() - 1], 604_800),
        _ => (simple, 1),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DelayError::Invalid(delay.to_string()));
    }

    let value: u64 = digits
        .parse()
        .map_err(|_| DelayError::Invalid(delay.to_string()))?;
    let seconds = value
        .checked_mul(multiplier)
        .ok_or(DelayError::OutOfRange(u64::MAX))?;
    if seconds == 0 || seconds > MAX_DELAY {
        return Err(DelayError::OutOfRange(seconds));
    }
    Ok(seconds)
}

/// Computes when an item is next due.
///
/// Checks are spread across the interval by item id so that items sharing an
/// interval do not all fire in the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextcheckPolicy {
    /// Interval used for unsupported items, in seconds.
    pub refresh_unsupported: u64,
}

impl Default for NextcheckPolicy {
    fn default() -> Self {
        Self {
            refresh_unsupported: DEFAULT_REFRESH_UNSUPPORTED,
        }
    }
}

impl NextcheckPolicy {
    /// Policy re-checking unsupported items every `refresh_unsupported`
    /// seconds, clamped to `1..=MAX_DELAY`.
    pub fn new(refresh_unsupported: u64) -> Self {
        Self {
            refresh_unsupported: refresh_unsupported.clamp(1, MAX_DELAY),
        }
    }

    /// First whole second strictly after `now` at which the item is due.
    pub fn nextcheck(
        &self,
        itemid: u64,
        delay: &str,
        unsupported: bool,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DelayError> {
        let interval = if unsupported {
            self.refresh_unsupported.clamp(1, MAX_DELAY)
        } else {
            parse_delay(delay)?
        };
        aligned(itemid, interval, now)
    }
}

/// [`NextcheckPolicy::nextcheck`] with the default unsupported interval.
pub fn get_nextcheck(
    itemid: u64,
    delay: &str,
    unsupported: bool,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, DelayError> {
    NextcheckPolicy::default().nextcheck(itemid, delay, unsupported, now)
}

fn aligned(itemid: u64, interval: u64, now: DateTime<Utc>) -> Result<DateTime<Utc>, DelayError> {
    let out_of_range = || DelayError::OutOfRange(interval);
    let step = i64::try_from(interval).map_err(|_| out_of_range())?;
    let offset = i64::try_from(itemid % interval).map_err(|_| out_of_range())?;
    let from = now.timestamp();

    // the slot start is within one step of `from`, so one advance suffices
    let mut next = step
        .checked_mul(from.div_euclid(step))
        .and_then(|start| start.checked_add(offset))
        .ok_or_else(out_of_range)?;
    if next <= from {
        next = next.checked_add(step).ok_or_else(out_of_range)?;
    }
    DateTime::<Utc>::from_timestamp(next, 0).ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn parse_delay_suffixes() {
        assert_eq!(parse_delay("60"), Ok(60));
        assert_eq!(parse_delay("30s"), Ok(30));
        assert_eq!(parse_delay("1m"), Ok(60));
        assert_eq!(parse_delay("2h"), Ok(7_200));
        assert_eq!(parse_delay("1d"), Ok(86_400));
    }

    #[test]
    fn parse_delay_ignores_flexible_intervals() {
        assert_eq!(parse_delay("30s;10/1-5,09:00-18:00"), Ok(30));
    }

    #[test]
    fn parse_delay_rejects_bad_values() {
        assert_eq!(parse_delay(""), Err(DelayError::Empty));
        assert_eq!(parse_delay("abc"), Err(DelayError::Invalid("abc".to_string())));
        assert_eq!(parse_delay("s"), Err(DelayError::Invalid("s".to_string())));
        assert_eq!(parse_delay("0"), Err(DelayError::OutOfRange(0)));
        assert_eq!(parse_delay("1w"), Err(DelayError::OutOfRange(604_800)));
    }

    #[test]
    fn nextcheck_is_spread_by_itemid() {
        let now = at(1_000);
        assert_eq!(get_nextcheck(0, "60", false, now), Ok(at(1_020)));
        assert_eq!(get_nextcheck(5, "60", false, now), Ok(at(1_025)));
        assert_eq!(get_nextcheck(45, "60", false, now), Ok(at(1_005)));
    }

    #[test]
    fn nextcheck_is_strictly_after_now() {
        let now = at(1_020);
        assert_eq!(get_nextcheck(0, "60", false, now), Ok(at(1_080)));
    }

    #[test]
    fn unsupported_items_use_refresh_interval() {
        let policy = NextcheckPolicy::new(600);
        let now = at(1_000);
        // Delay is not consulted for unsupported items.
        assert_eq!(policy.nextcheck(5, "bogus", true, now), Ok(at(1_205)));
    }

    #[test]
    fn refresh_interval_is_capped() {
        let now = at(1_000);
        assert_eq!(NextcheckPolicy::new(u64::MAX).refresh_unsupported, MAX_DELAY);
        assert_eq!(NextcheckPolicy::new(u64::MAX).nextcheck(0, "1s", true, now), Ok(at(86_400)));

        // a hand-built policy is capped at use
        let policy = NextcheckPolicy {
            refresh_unsupported: 10_000_000_000_000,
        };
        assert_eq!(policy.nextcheck(0, "1s", true, now), Ok(at(86_400)));
    }

    #[test]
    fn nextcheck_past_the_calendar_is_an_error() {
        let end = DateTime::<Utc>::MAX_UTC;
        assert_eq!(get_nextcheck(0, "60", false, end), Err(DelayError::OutOfRange(60)));
    }

    #[test]
    fn nextcheck_propagates_delay_errors() {
        assert!(get_nextcheck(1, "never", false, at(0)).is_err());
    }
}
