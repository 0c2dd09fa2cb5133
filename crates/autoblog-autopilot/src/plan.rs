//! Pure scheduling decisions.
//!
//! Given the persisted state and the current local time, decide what the
//! durable timer should do next. No I/O happens here; the caller persists
//! the mutated state.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use autoblog_types::JobState;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// What the timer should do after arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// The autopilot is not running; no timer.
    Disarmed,
    /// Run a generation job at `at`.
    Fire { at: DateTime<Utc>, delay: Duration },
    /// Today's quota is met; wake at the next local midnight.
    AwaitRollover { at: DateTime<Utc>, delay: Duration },
}

/// Decide the next timer action, updating `state` in place.
///
/// Rolls the daily counter over first, so a record left behind yesterday
/// with a full quota starts producing again today. A persisted
/// `next_run_at` in the future is honored; one in the past (missed while the
/// process was down) fires after `fire_soon`.
pub fn plan_next<Tz: TimeZone>(state: &mut JobState, now: DateTime<Tz>, fire_soon: Duration) -> Plan {
    if !state.running {
        return Plan::Disarmed;
    }

    state.roll_over(now.date_naive());
    let now_utc = now.with_timezone(&Utc);

    if state.quota_met() {
        let at = next_local_midnight(&now).with_timezone(&Utc);
        state.next_run_at = Some(at);
        return Plan::AwaitRollover {
            at,
            delay: until(now_utc, at),
        };
    }

    let at = match state.next_run_at {
        Some(next) if next > now_utc => next,
        _ => now_utc + to_delta(fire_soon),
    };
    state.next_run_at = Some(at);
    Plan::Fire {
        at,
        delay: until(now_utc, at),
    }
}

/// Spacing between jobs when `articles_per_day` are spread over a day.
pub fn slot_interval(articles_per_day: u32) -> Duration {
    DAY / articles_per_day.max(1)
}

/// First instant of the next calendar day in `now`'s time zone.
///
/// When local midnight does not exist (a DST gap at 00:00) this falls back
/// to 24 hours from `now`.
pub fn next_local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .unwrap_or_else(|| now.clone() + TimeDelta::hours(24))
}

/// Non-negative wait from `now` until `at`.
pub fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}

pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::days(365))
}
