//! Cron Schedule Interpretation

use crate::BatchError;
use chrono::{DateTime, Duration, TimeZone};
use cron::Schedule;
use std::str::FromStr;

/// Next fire time and the gap to the one after it
#[derive(Debug, Clone, PartialEq)]
pub struct CronSchedule<Tz: TimeZone> {
    pub next: DateTime<Tz>,
    pub recurrence: Duration,
}

/// Interpret a cron expression relative to `now`.
///
/// Five-field expressions get a zero seconds field. Day-of-week names
/// (`MON`..`SUN`) are unambiguous; numeric days follow the `cron` crate,
/// where 1 is Sunday.
pub fn parse_cron<Tz: TimeZone>(
    expr: &str,
    now: &DateTime<Tz>,
) -> Result<CronSchedule<Tz>, BatchError> {
    let fields = expr.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    };

    let schedule = Schedule::from_str(&normalized).map_err(|e| BatchError::Cron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })?;

    let mut upcoming = schedule.after(now);
    let exhausted = || BatchError::Cron {
        expr: expr.to_string(),
        reason: "no upcoming occurrences".to_string(),
    };
    let next = upcoming.next().ok_or_else(exhausted)?;
    let following = upcoming.next().ok_or_else(exhausted)?;

    Ok(CronSchedule {
        recurrence: following.clone() - next.clone(),
        next,
    })
}
