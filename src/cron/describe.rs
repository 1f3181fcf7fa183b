//! Human-readable descriptions of a cron expression, shown in the UI next
//! to the raw string. Common patterns get a hand-written phrase; anything
//! else falls back to a deterministic generated description.

use std::collections::BTreeSet;

use super::expr::CronExpression;

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const DAY_NAMES: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];

impl CronExpression {
    /// A plain-English description, e.g. "Every 15 minutes" or
    /// "At 9:00 AM on weekdays".
    pub fn describe(&self) -> String {
        if let Some(s) = common_pattern(&self.raw) {
            return s.to_string();
        }
        generate_description(self)
    }
}

fn common_pattern(raw: &str) -> Option<&'static str> {
    match raw.trim() {
        "* * * * *" => Some("Every minute"),
        "*/5 * * * *" => Some("Every 5 minutes"),
        "*/10 * * * *" => Some("Every 10 minutes"),
        "*/15 * * * *" => Some("Every 15 minutes"),
        "*/30 * * * *" => Some("Every 30 minutes"),
        "0 * * * *" => Some("Every hour, on the hour"),
        "0 0 * * *" => Some("Daily at midnight"),
        "0 9 * * *" => Some("Daily at 9:00 AM"),
        "0 12 * * *" => Some("Daily at noon"),
        "0 9 * * 1-5" => Some("Weekdays at 9:00 AM"),
        "0 0 * * 1-5" => Some("Weekdays at midnight"),
        "0 0 * * 0" => Some("Weekly on Sunday at midnight"),
        "0 0 1 * *" => Some("Monthly on the 1st at midnight"),
        "0 0 1 1 *" => Some("Yearly on January 1st at midnight"),
        _ => None,
    }
}

fn generate_description(e: &CronExpression) -> String {
    let mut parts = Vec::new();
    parts.push(minute_hour_phrase(e));

    if !e.day_of_month.is_wildcard {
        let days = list(&e.day_of_month.values, |d| d.to_string());
        parts.push(format!("on day {days} of the month"));
    }

    if !e.month.is_wildcard {
        let months = list(&e.month.values, |m| MONTH_NAMES[(m - 1) as usize].to_string());
        parts.push(format!("in {months}"));
    }

    if !e.day_of_week.is_wildcard {
        let days = list(&e.day_of_week.values, |d| DAY_NAMES[d as usize].to_string());
        parts.push(format!("on {days}"));
    }

    parts.join(" ")
}

fn minute_hour_phrase(e: &CronExpression) -> String {
    if e.minute.values.len() == 1 && e.hour.values.len() == 1 {
        let h = *e.hour.values.iter().next().unwrap();
        let m = *e.minute.values.iter().next().unwrap();
        return format!("At {}", clock(h, m));
    }

    if let Some(step) = detect_step(&e.minute.values, 0, 59) {
        if e.hour.is_wildcard {
            return format!("Every {step} minutes");
        }
    }

    let m = e.minute.values.iter().next().copied().unwrap_or(0);
    if e.hour.is_wildcard {
        return format!("At minute {m} of every hour");
    }

    if let Some(step) = detect_step(&e.hour.values, 0, 23) {
        return format!("At minute {m} past every {step} hours");
    }

    let hours = list(&e.hour.values, |h| h.to_string());
    format!("At minute {m} past hour {hours}")
}

fn clock(hour: u32, minute: u32) -> String {
    let period = if hour < 12 { "AM" } else { "PM" };
    let display_hour = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display_hour}:{minute:02} {period}")
}

fn list<F: Fn(u32) -> String>(values: &BTreeSet<u32>, render: F) -> String {
    values.iter().map(|&v| render(v)).collect::<Vec<_>>().join(", ")
}

/// Detect whether `set` is exactly the arithmetic sequence `*/step`
/// starting at `min`, i.e. the set `parse_part` would have produced for
/// that step. Returns `None` for anything else, including plain lists that
/// happen to be evenly spaced but weren't written as a step.
fn detect_step(set: &BTreeSet<u32>, min: u32, max: u32) -> Option<u32> {
    if set.len() < 2 {
        return None;
    }
    let mut iter = set.iter();
    let first = *iter.next().unwrap();
    if first != min {
        return None;
    }
    let second = *iter.next().unwrap();
    let step = second - first;
    if step == 0 {
        return None;
    }
    let expected: BTreeSet<u32> = (min..=max).step_by(step as usize).collect();
    if &expected == set {
        Some(step)
    } else {
        None
    }
}
