use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;

use super::JobError;

/// A parsed cron schedule. Accepts the 5-field Unix form as well as the
/// 6/7-field form with seconds (and year).
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, JobError> {
        let schedule = Schedule::from_str(&to_cron_crate_format(expr)).map_err(|e| {
            JobError::InvalidSchedule {
                expr: expr.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            expr: expr.trim().to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Time to sleep from `now` until the next firing.
    pub fn until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.next_after(now)?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

// The cron crate wants seconds first and an optional trailing year.
fn to_cron_crate_format(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr} *")
    } else {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn five_field_hourly() {
        let s = CronSchedule::parse("0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 0).unwrap();
        assert_eq!(
            s.next_after(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap())
        );
        assert_eq!(s.until_next(now), Some(Duration::from_secs(45 * 60)));
    }

    #[test]
    fn six_field_with_seconds() {
        let s = CronSchedule::parse("30 */5 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 1, 0).unwrap();
        assert_eq!(
            s.next_after(now),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 5, 30).unwrap())
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let err = CronSchedule::parse("every tuesday").unwrap_err();
        assert!(matches!(err, JobError::InvalidSchedule { ref expr, .. } if expr == "every tuesday"));
        assert!(CronSchedule::parse("61 * * * *").is_err());
    }
}
