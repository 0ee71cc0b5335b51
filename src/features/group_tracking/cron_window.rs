//! Computes the `(start, end)` processing window for one fire of a tracked
//! group's cron schedule, given the group's timezone and its persisted
//! `last_run`.
//!
//! The `cron` crate only iterates forward, unlike the backward-iterating
//! cron library this was grounded on, so "the previous occurrence before
//! `from`" is found by iterating forward from a lookback bound and taking
//! the last candidate still short of `from`. Iterating forward through
//! `chrono-tz` also sidesteps the original's explicit DST "phantom hour" /
//! ambiguous-fold handling: forward iteration only ever yields local times
//! the timezone resolves unambiguously.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use cron::Schedule;

/// Gaps between the persisted `last_run` and the ideal window start larger
/// than this are capped rather than fully caught up, so one long outage
/// doesn't dump hours of backlog into a single extraction pass.
pub const MAX_CATCHUP_SECONDS: i64 = 900;

const INITIAL_LOOKBACK_DAYS: i64 = 8;
const LOOKBACK_WIDEN_ATTEMPTS: u32 = 6;

/// Bot configs store standard 5-field unix cron (`min hour day month dow`);
/// the `cron` crate requires a leading seconds field, so a 5-field
/// expression is normalized to fire at `:00` of its target minute.
pub fn parse_schedule(cron_expression: &str) -> Result<Schedule, cron::error::Error> {
    let normalized = if cron_expression.split_whitespace().count() == 5 {
        format!("0 {cron_expression}")
    } else {
        cron_expression.to_string()
    };
    Schedule::from_str(&normalized)
}

/// The latest scheduled occurrence strictly before `from`, in UTC.
fn prev_occurrence(schedule: &Schedule, tz: Tz, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let from_local = from.with_timezone(&tz);
    let mut lookback_days = INITIAL_LOOKBACK_DAYS;

    for _ in 0..LOOKBACK_WIDEN_ATTEMPTS {
        let window_start = from_local - Duration::days(lookback_days);
        let found = schedule.after(&window_start).take_while(|dt| *dt < from_local).last();
        if let Some(dt) = found {
            return Some(dt.with_timezone(&Utc));
        }
        lookback_days *= 4;
    }

    None
}

/// `last_run` is the persisted end of the previously processed window, if
/// any. Returns `None` if the cron expression or timezone fails to parse.
pub fn calculate_window(
    cron_expression: &str,
    timezone: &str,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let tz: Tz = timezone.parse().ok()?;
    let schedule = parse_schedule(cron_expression).ok()?;

    let end = prev_occurrence(&schedule, tz, now)?;
    let ideal_start = prev_occurrence(&schedule, tz, end)?;

    let start = match last_run {
        Some(last_run) if last_run < ideal_start => {
            let gap = ideal_start - last_run;
            if gap.num_seconds() <= MAX_CATCHUP_SECONDS {
                last_run
            } else {
                let capped = end - Duration::seconds(MAX_CATCHUP_SECONDS);
                if capped < last_run {
                    last_run
                } else {
                    capped
                }
            }
        }
        Some(last_run) => last_run,
        None => ideal_start,
    };

    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn first_run_uses_ideal_window() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 20, 5, 0).unwrap();
        let (start, end) = calculate_window("0 20 * * *", "UTC", now, None).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 0).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 7, 26, 20, 0, 0).unwrap());
    }

    #[test]
    fn small_gap_catches_up_from_last_run() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 30).unwrap();
        let last_run = Utc.with_ymd_and_hms(2026, 7, 26, 20, 5, 0).unwrap();
        let (start, end) = calculate_window("0 20 * * *", "UTC", now, Some(last_run)).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 0).unwrap());
        assert_eq!(start, last_run);
    }

    #[test]
    fn large_gap_is_capped_to_max_catchup() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 0).unwrap();
        let last_run = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let (start, end) = calculate_window("0 20 * * *", "UTC", now, Some(last_run)).unwrap();
        assert_eq!(end - start, Duration::seconds(MAX_CATCHUP_SECONDS));
    }

    #[test]
    fn last_run_at_or_after_ideal_start_is_used_verbatim() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 10).unwrap();
        let last_run = Utc.with_ymd_and_hms(2026, 7, 27, 19, 0, 0).unwrap();
        let (start, end) = calculate_window("0 20 * * *", "UTC", now, Some(last_run)).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 0).unwrap());
        assert_eq!(start, last_run);
    }

    #[test]
    fn unparseable_timezone_returns_none() {
        let now = Utc::now();
        assert!(calculate_window("0 20 * * *", "Not/A_Zone", now, None).is_none());
    }

    /// America/New_York springs forward on 2026-03-08: local clocks jump
    /// from 01:59:59 to 03:00:00, so 02:30 never occurs that day. A nightly
    /// 02:30 schedule must skip straight from 2026-03-07 to 2026-03-09 —
    /// exercising the forward-iteration claim above against a real DST gap
    /// rather than just UTC or non-DST zones.
    #[test]
    fn spring_forward_window_skips_nonexistent_local_time() {
        let tz: chrono_tz::Tz = "America/New_York".parse().unwrap();
        let now = tz.with_ymd_and_hms(2026, 3, 9, 12, 0, 0).unwrap().with_timezone(&Utc);

        let (start, end) = calculate_window("30 2 * * *", "America/New_York", now, None).unwrap();

        let expected_end = tz.with_ymd_and_hms(2026, 3, 9, 2, 30, 0).unwrap().with_timezone(&Utc);
        let expected_start = tz.with_ymd_and_hms(2026, 3, 7, 2, 30, 0).unwrap().with_timezone(&Utc);
        assert_eq!(end, expected_end);
        assert_eq!(start, expected_start);
        assert_eq!(end - start, Duration::days(2));
    }
}
