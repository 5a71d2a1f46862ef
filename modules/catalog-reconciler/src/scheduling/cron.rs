use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Days, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use catalog_common::ReconcileError;

const WEEKDAYS: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// A five-field cron expression evaluated in an IANA timezone.
///
/// Fields: minute hour day-of-month month day-of-week. Each field takes `*`,
/// a number, a range `a-b`, a step `*/n` or `a-b/n`, or a comma list of those.
/// Day-of-week is 0-7 with both 0 and 7 meaning Sunday. Restricting both day
/// fields at once is rejected.
///
/// The expression is translated to a daily iCalendar RRULE and evaluated by
/// `rrule`, which owns the timezone and DST handling.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    tz: Tz,
    rule: String,
}

impl CronSchedule {
    pub fn parse(expr: &str, timezone: &str) -> Result<Self, ReconcileError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| ReconcileError::Schedule(format!("unknown timezone {timezone:?}")))?;

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let &[minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(ReconcileError::Schedule(format!(
                "expected 5 fields in cron expression {expr:?}, got {}",
                fields.len()
            )));
        };
        if dom != "*" && dow != "*" {
            return Err(ReconcileError::Schedule(format!(
                "{expr:?} restricts both day-of-month and day-of-week; pick one"
            )));
        }

        let mut parts = vec!["FREQ=DAILY".to_string()];
        if month != "*" {
            parts.push(format!("BYMONTH={}", join(&parse_field(month, 1, 12, "month")?)));
        }
        if dom != "*" {
            parts.push(format!("BYMONTHDAY={}", join(&parse_field(dom, 1, 31, "day-of-month")?)));
        }
        if dow != "*" {
            let days: BTreeSet<u32> = parse_field(dow, 0, 7, "day-of-week")?
                .into_iter()
                .map(|d| d % 7)
                .collect();
            let days: Vec<&str> = days.iter().map(|d| WEEKDAYS[*d as usize]).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        // Always explicit: an RRULE without them inherits the time of DTSTART.
        parts.push(format!("BYHOUR={}", join(&parse_field(hour, 0, 23, "hour")?)));
        parts.push(format!("BYMINUTE={}", join(&parse_field(minute, 0, 59, "minute")?)));
        parts.push("BYSECOND=0".to_string());

        let schedule = Self {
            expr: fields.join(" "),
            tz,
            rule: parts.join(";"),
        };
        schedule.recurrence(Utc::now())?;
        Ok(schedule)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// The RRULE this schedule evaluates.
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Recurrence anchored at local noon the day before `around`. Noon keeps
    /// DTSTART clear of DST transitions.
    fn recurrence(&self, around: DateTime<Utc>) -> Result<RRuleSet, ReconcileError> {
        let day_before = around.with_timezone(&self.tz).date_naive() - Days::new(1);
        let anchor: NaiveDateTime = day_before.and_hms_opt(12, 0, 0).unwrap_or_default();
        format!(
            "DTSTART;TZID={}:{}\nRRULE:{}",
            self.tz.name(),
            anchor.format("%Y%m%dT%H%M%S"),
            self.rule
        )
        .parse::<RRuleSet>()
        .map_err(|e| ReconcileError::Schedule(format!("{self}: {e}")))
    }

    /// The first fire time strictly after `after`, in UTC.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let set = self.recurrence(after).ok()?;
        set.after(after.with_timezone(&rrule::Tz::UTC))
            .all(2)
            .dates
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .find(|dt| *dt > after)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.expr, self.tz.name())
    }
}

fn join(values: &BTreeSet<u32>) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_field(field: &str, min: u32, max: u32, name: &str) -> Result<BTreeSet<u32>, ReconcileError> {
    let invalid = |detail: &str| {
        ReconcileError::Schedule(format!("invalid {name} field {field:?}: {detail}"))
    };
    let number = |s: &str| -> Result<u32, ReconcileError> {
        let n: u32 = s.parse().map_err(|_| invalid("not a number"))?;
        if n < min || n > max {
            return Err(invalid(&format!("{n} outside {min}-{max}")));
        }
        Ok(n)
    };

    let mut values = BTreeSet::new();
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| invalid("bad step"))?;
                if step == 0 {
                    return Err(invalid("step must be positive"));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (a, b) = (number(a)?, number(b)?);
            if a > b {
                return Err(invalid("range start after end"));
            }
            (a, b)
        } else {
            let n = number(range)?;
            // `5/15` means "from 5, every 15".
            if step > 1 {
                (n, max)
            } else {
                (n, n)
            }
        };

        values.extend((lo..=hi).step_by(step as usize));
    }

    Ok(values)
}
