//! Cron expression grammar: parsing and field representation.
//!
//! Five whitespace-separated fields: minute(0-59) hour(0-23) day-of-month(1-31)
//! month(1-12) day-of-week(0-6, Sunday=0). No name aliases (no `SUN`, no
//! `JAN`) — the grammar is strictly numeric, matching the present corpus.

use std::collections::BTreeSet;

use crate::common::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct FieldSpec {
    pub values: BTreeSet<u32>,
    pub is_wildcard: bool,
}

/// A validated, parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    pub(super) raw: String,
    pub(super) minute: FieldSpec,
    pub(super) hour: FieldSpec,
    pub(super) day_of_month: FieldSpec,
    pub(super) month: FieldSpec,
    pub(super) day_of_week: FieldSpec,
}

impl CronExpression {
    /// Parse and validate a 5-field cron expression. Rejects anything the
    /// grammar does not accept; there is no fallback policy — a job that
    /// fails to parse fails its creation, it is never silently scheduled.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ServiceError::validation(format!(
                "cron expression must have exactly 5 fields, got {}: `{}`",
                fields.len(),
                raw
            )));
        }

        let minute = parse_field("minute", fields[0], 0, 59)?;
        let hour = parse_field("hour", fields[1], 0, 23)?;
        let day_of_month = parse_field("day-of-month", fields[2], 1, 31)?;
        let month = parse_field("month", fields[3], 1, 12)?;
        let day_of_week = parse_field("day-of-week", fields[4], 0, 6)?;

        Ok(Self {
            raw: raw.to_string(),
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for CronExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn parse_field(name: &str, field: &str, min: u32, max: u32) -> Result<FieldSpec, ServiceError> {
    if field.is_empty() {
        return Err(ServiceError::validation(format!("{name} field is empty")));
    }

    let is_wildcard = field == "*";
    let mut values = BTreeSet::new();
    for part in field.split(',') {
        parse_part(name, part, min, max, &mut values)?;
    }

    if values.is_empty() {
        return Err(ServiceError::validation(format!(
            "{name} field `{field}` matches no values"
        )));
    }

    Ok(FieldSpec { values, is_wildcard })
}

fn parse_part(
    name: &str,
    part: &str,
    min: u32,
    max: u32,
    values: &mut BTreeSet<u32>,
) -> Result<(), ServiceError> {
    if part.is_empty() {
        return Err(ServiceError::validation(format!("{name} field has an empty list entry")));
    }

    if part == "*" {
        values.extend(min..=max);
        return Ok(());
    }

    if let Some(step_str) = part.strip_prefix("*/") {
        let step = parse_step(name, step_str, max)?;
        values.extend((min..=max).step_by(step as usize));
        return Ok(());
    }

    if let Some((range_part, step_part)) = part.split_once('/') {
        let (a, b) = parse_range(name, range_part, min, max)?;
        let step = parse_step(name, step_part, max)?;
        values.extend((a..=b).step_by(step as usize));
        return Ok(());
    }

    if part.contains('-') {
        let (a, b) = parse_range(name, part, min, max)?;
        values.extend(a..=b);
        return Ok(());
    }

    let v = parse_u32(name, part)?;
    if v < min || v > max {
        return Err(ServiceError::validation(format!(
            "{name} value {v} out of range [{min}, {max}]"
        )));
    }
    values.insert(v);
    Ok(())
}

fn parse_range(name: &str, part: &str, min: u32, max: u32) -> Result<(u32, u32), ServiceError> {
    let (a_str, b_str) = part.split_once('-').ok_or_else(|| {
        ServiceError::validation(format!("{name} field has malformed range `{part}`"))
    })?;
    let a = parse_u32(name, a_str)?;
    let b = parse_u32(name, b_str)?;
    if a >= b {
        return Err(ServiceError::validation(format!(
            "{name} range `{part}` must have start < end"
        )));
    }
    if a < min || b > max {
        return Err(ServiceError::validation(format!(
            "{name} range `{part}` out of range [{min}, {max}]"
        )));
    }
    Ok((a, b))
}

fn parse_step(name: &str, s: &str, field_max_step: u32) -> Result<u32, ServiceError> {
    let step = parse_u32(name, s)?;
    if step < 1 || step > field_max_step {
        return Err(ServiceError::validation(format!(
            "{name} step {step} out of range [1, {field_max_step}]"
        )));
    }
    Ok(step)
}

fn parse_u32(name: &str, s: &str) -> Result<u32, ServiceError> {
    s.parse::<u32>()
        .map_err(|_| ServiceError::validation(format!("{name} field has invalid integer `{s}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_minute() {
        let e = CronExpression::parse("* * * * *").unwrap();
        assert!(e.minute.is_wildcard);
        assert_eq!(e.minute.values.len(), 60);
    }

    #[test]
    fn parses_step() {
        let e = CronExpression::parse("*/15 * * * *").unwrap();
        assert_eq!(e.minute.values, [0, 15, 30, 45].into_iter().collect());
    }

    #[test]
    fn parses_range_with_step() {
        let e = CronExpression::parse("0 9-17/2 * * *").unwrap();
        assert_eq!(e.hour.values, [9, 11, 13, 15, 17].into_iter().collect());
    }

    #[test]
    fn parses_comma_list() {
        let e = CronExpression::parse("0 9 * * 1,3,5").unwrap();
        assert_eq!(e.day_of_week.values, [1, 3, 5].into_iter().collect());
    }

    #[test]
    fn parses_weekday_range() {
        let e = CronExpression::parse("0 9 * * 1-5").unwrap();
        assert_eq!(e.day_of_week.values, [1, 2, 3, 4, 5].into_iter().collect());
        assert!(!e.day_of_week.is_wildcard);
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronExpression::parse("* * * *").is_err());
        assert!(CronExpression::parse("* * * * * *").is_err());
    }

    #[test]
    fn rejects_out_of_range_value() {
        assert!(CronExpression::parse("60 * * * *").is_err());
        assert!(CronExpression::parse("* 24 * * *").is_err());
        assert!(CronExpression::parse("* * 32 * *").is_err());
        assert!(CronExpression::parse("* * * 13 *").is_err());
        assert!(CronExpression::parse("* * * * 7").is_err());
    }

    #[test]
    fn rejects_name_aliases() {
        assert!(CronExpression::parse("0 9 * * SUN").is_err());
        assert!(CronExpression::parse("0 9 * JAN *").is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(CronExpression::parse("0 17-9 * * *").is_err());
        assert!(CronExpression::parse("0 9-9 * * *").is_err());
    }

    #[test]
    fn rejects_step_of_zero() {
        assert!(CronExpression::parse("*/0 * * * *").is_err());
    }

    #[test]
    fn tolerates_extra_whitespace() {
        let e = CronExpression::parse("  0    9   *  *   1-5 ").unwrap();
        assert_eq!(e.hour.values, [9].into_iter().collect());
    }
}
