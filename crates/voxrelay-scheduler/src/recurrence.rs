//! RRULE expansion for standalone recurring reminders and recurring
//! calendar events. Grounded on `scheduler_service/app/main.py`'s
//! `generate_reminder_instances`/`generate_event_instances`, reimplemented
//! against the `rrule` crate instead of `dateutil.rrule`.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;
use std::collections::HashSet;

/// Protects against unbounded expansion (e.g. a misconfigured
/// `FREQ=SECONDLY` rule) the same way the original's `max_instances` does.
pub const MAX_INSTANCES: u16 = 100;

fn parse_rule_set(dtstart: DateTime<Utc>, recurrence_rule: &str) -> Option<RRuleSet> {
    let spec = format!("DTSTART:{}\nRRULE:{}", dtstart.format("%Y%m%dT%H%M%SZ"), recurrence_rule);
    spec.parse::<RRuleSet>().ok()
}

fn exception_set(exception_dates: &[DateTime<Utc>]) -> HashSet<chrono::NaiveDate> {
    exception_dates.iter().map(|d| d.date_naive()).collect()
}

/// Expands a recurring reminder's trigger times, skipping any occurrence
/// whose date falls in `exception_dates`.
pub fn expand_reminder_instances(
    trigger_time: DateTime<Utc>,
    recurrence_rule: &str,
    exception_dates: &[DateTime<Utc>],
) -> Vec<DateTime<Utc>> {
    let Some(rule_set) = parse_rule_set(trigger_time, recurrence_rule) else {
        return Vec::new();
    };
    let exceptions = exception_set(exception_dates);
    let result = rule_set.all(MAX_INSTANCES);
    result
        .dates
        .into_iter()
        .map(|d| d.with_timezone(&Utc))
        .filter(|d| !exceptions.contains(&d.date_naive()))
        .collect()
}

/// Expands a recurring calendar event's occurrences as `(start, end)` pairs,
/// preserving the event's duration across every occurrence.
pub fn expand_event_instances(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    recurrence_rule: &str,
    exception_dates: &[DateTime<Utc>],
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let duration = end_time - start_time;
    let Some(rule_set) = parse_rule_set(start_time, recurrence_rule) else {
        return Vec::new();
    };
    let exceptions = exception_set(exception_dates);
    let result = rule_set.all(MAX_INSTANCES);
    result
        .dates
        .into_iter()
        .map(|d| d.with_timezone(&Utc))
        .filter(|d| !exceptions.contains(&d.date_naive()))
        .map(|start| (start, start + duration))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expands_daily_reminder_capped_at_max_instances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let instances = expand_reminder_instances(start, "FREQ=DAILY", &[]);
        assert!(instances.len() <= MAX_INSTANCES as usize);
        assert_eq!(instances[0], start);
    }

    #[test]
    fn skips_exception_dates() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let second_day = Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap();
        let instances = expand_reminder_instances(start, "FREQ=DAILY;COUNT=3", &[second_day]);
        assert!(!instances.iter().any(|d| d.date_naive() == second_day.date_naive()));
    }

    #[test]
    fn expands_event_instances_preserving_duration() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let end = start + Duration::minutes(30);
        let instances = expand_event_instances(start, end, "FREQ=WEEKLY;COUNT=4", &[]);
        assert_eq!(instances.len(), 4);
        for (s, e) in &instances {
            assert_eq!(*e - *s, Duration::minutes(30));
        }
    }
}
