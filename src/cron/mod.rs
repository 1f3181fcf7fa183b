//! The cron evaluator: expression grammar, DST-aware next-fire search, and
//! human-readable descriptions. This module owns no state and talks to no
//! external system — it is pure computation over `chrono`/`chrono_tz` types,
//! which is what makes it cheap to call on every dispatcher tick and every
//! job create/update.

mod describe;
mod expr;
mod next_fire;

pub use chrono_tz::Tz;
pub use expr::CronExpression;

use crate::common::ServiceError;

/// Parse an IANA timezone name (e.g. `"America/New_York"`, `"UTC"`). The
/// job repository rejects anything this returns an error for at creation
/// and update time; a job never carries an unparseable timezone string.
pub fn parse_timezone(name: &str) -> Result<Tz, ServiceError> {
    name.parse::<Tz>()
        .map_err(|_| ServiceError::validation(format!("unknown timezone `{name}`")))
}
