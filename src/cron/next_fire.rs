//! Next-fire computation: DST-aware, timezone-local evaluation of a
//! [`CronExpression`] against a starting instant.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono::{Datelike, TimeZone};
use chrono_tz::Tz;

use crate::common::ServiceError;

use super::expr::CronExpression;

/// Bound on how far ahead we'll search for a firing instant. A few years is
/// generous for any expression that matches at least one valid calendar day
/// (day-of-month 31 in a month that has only 30 days, combined with a
/// restrictive month field, can push the next match out by a year or more).
const MAX_SEARCH_DAYS: i64 = 366 * 8;

impl CronExpression {
    /// Compute the earliest instant strictly after `after` at which this
    /// expression fires, interpreted in the given IANA timezone.
    pub fn next_fire_after(&self, tz: Tz, after: DateTime<Utc>) -> Result<DateTime<Utc>, ServiceError> {
        let after_local = after.with_timezone(&tz);
        let mut date = after_local.date_naive();
        let mut is_first_day = true;

        for _ in 0..=MAX_SEARCH_DAYS {
            if self.month.values.contains(&date.month()) && self.day_matches(date) {
                let floor = if is_first_day { Some(after_local.time()) } else { None };
                if let Some(naive_dt) = self.earliest_time_on(date, floor) {
                    if let Some(fire_local) = resolve_local_datetime(tz, naive_dt) {
                        let fire_utc = fire_local.with_timezone(&Utc);
                        if fire_utc > after {
                            return Ok(fire_utc);
                        }
                    }
                }
            }
            is_first_day = false;
            date = date
                .succ_opt()
                .ok_or_else(|| ServiceError::scheduler_internal("date overflow while computing next fire"))?;
        }

        Err(ServiceError::scheduler_internal(format!(
            "cron expression `{}` has no firing instant within {} days of {}",
            self.raw, MAX_SEARCH_DAYS, after
        )))
    }

    /// True if `date` satisfies the day-of-month/day-of-week union: when
    /// both fields are restricted, a day matching *either* qualifies; when
    /// only one is restricted, it alone governs; when neither is restricted,
    /// every day qualifies.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom_restricted = !self.day_of_month.is_wildcard;
        let dow_restricted = !self.day_of_week.is_wildcard;
        let dom_ok = self.day_of_month.values.contains(&date.day());
        let dow_ok = self
            .day_of_week
            .values
            .contains(&date.weekday().num_days_from_sunday());

        match (dom_restricted, dow_restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }

    /// Earliest (hour, minute) on `date` satisfying the hour/minute fields,
    /// optionally restricted to times strictly after `same_day_floor` (used
    /// only for the starting day of the search).
    fn earliest_time_on(&self, date: NaiveDate, same_day_floor: Option<NaiveTime>) -> Option<NaiveDateTime> {
        for &h in &self.hour.values {
            if let Some(floor) = same_day_floor {
                if h < floor.hour() {
                    continue;
                }
            }
            for &m in &self.minute.values {
                if let Some(floor) = same_day_floor {
                    if h == floor.hour() && m <= floor.minute() {
                        continue;
                    }
                }
                let time = NaiveTime::from_hms_opt(h, m, 0)?;
                return Some(NaiveDateTime::new(date, time));
            }
        }
        None
    }
}

/// Resolve a naive local datetime against a timezone, handling the two DST
/// edge cases explicitly: a spring-forward gap advances to the next valid
/// wall-clock instant; a fall-back ambiguity resolves to the earliest
/// (first) occurrence.
fn resolve_local_datetime(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _latest) => Some(earliest),
        LocalResult::None => {
            let mut probe = naive;
            for _ in 0..180 {
                probe += Duration::minutes(1);
                if let LocalResult::Single(dt) = tz.from_local_datetime(&probe) {
                    return Some(dt);
                }
            }
            None
        }
    }
}
