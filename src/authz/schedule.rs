//! Time-window evaluation for rules carrying an access schedule.
//!
//! A schedule is a pair of five-field cron expressions, `start` and `end`.
//! A rule is accessible when `start <= now <= end` against the recurring
//! schedule, both boundaries inclusive, with "now" quantized to the minute
//! and evaluated in UTC.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde_json::Value;

use crate::models::policy::Rule;

/// How far back the window scan walks before giving up. A schedule that fires
/// less often than yearly is treated as never open.
const SCAN_HORIZON_MINUTES: i64 = 366 * 24 * 60;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule payload is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("schedule payload must be an object with start and end")]
    NotAnObject,
    #[error("schedule is missing the {0} expression")]
    MissingField(&'static str),
    #[error("bad cron expression {expr:?}: {reason}")]
    BadExpression { expr: String, reason: String },
}

/// What to do when a stored schedule payload cannot be parsed.
///
/// Historically unreadable schedules were treated as always accessible, which
/// silently widens access on data corruption. The default here is `Closed`;
/// deployments relying on the old behavior opt back in with
/// `SCHEDULE_FAILURE_POLICY=open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleFailurePolicy {
    /// Treat the rule as inaccessible (default).
    #[default]
    Closed,
    /// Treat the rule as always accessible.
    Open,
}

impl ScheduleFailurePolicy {
    pub fn from_env() -> Self {
        static POLICY: OnceLock<ScheduleFailurePolicy> = OnceLock::new();
        *POLICY.get_or_init(|| {
            match std::env::var("SCHEDULE_FAILURE_POLICY")
                .unwrap_or_default()
                .to_lowercase()
                .as_str()
            {
                "open" => ScheduleFailurePolicy::Open,
                _ => ScheduleFailurePolicy::Closed,
            }
        })
    }
}

/// Decides whether a rule's time window admits a given instant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleEvaluator {
    on_parse_failure: ScheduleFailurePolicy,
}

impl ScheduleEvaluator {
    pub fn new(on_parse_failure: ScheduleFailurePolicy) -> Self {
        Self { on_parse_failure }
    }

    pub fn from_env() -> Self {
        Self::new(ScheduleFailurePolicy::from_env())
    }

    pub fn is_rule_accessible_now(&self, rule: &Rule) -> bool {
        self.is_rule_accessible_at(rule, Utc::now())
    }

    /// A rule without a schedule is always accessible. A malformed schedule
    /// resolves according to the configured failure policy.
    pub fn is_rule_accessible_at(&self, rule: &Rule, now: DateTime<Utc>) -> bool {
        let Some(payload) = &rule.access_schedule else {
            return true;
        };
        match AccessSchedule::from_value(payload) {
            Ok(schedule) => schedule.contains(now),
            Err(err) => {
                tracing::warn!(
                    rule_id = %rule.id,
                    error = %err,
                    policy = ?self.on_parse_failure,
                    "unreadable access schedule"
                );
                self.on_parse_failure == ScheduleFailurePolicy::Open
            }
        }
    }
}

/// A recurring access window bounded by two cron expressions.
#[derive(Debug, Clone)]
pub struct AccessSchedule {
    start: CronExpr,
    end: CronExpr,
}

impl AccessSchedule {
    pub fn parse(start: &str, end: &str) -> Result<Self, ScheduleError> {
        Ok(Self {
            start: start.parse()?,
            end: end.parse()?,
        })
    }

    /// Accepts either a `{"start", "end"}` object or a JSON-encoded string of
    /// the same shape.
    pub fn from_value(payload: &Value) -> Result<Self, ScheduleError> {
        let decoded;
        let object = match payload {
            Value::String(raw) => {
                decoded = serde_json::from_str::<Value>(raw)
                    .map_err(|err| ScheduleError::MalformedJson(err.to_string()))?;
                &decoded
            }
            other => other,
        };
        let map = object.as_object().ok_or(ScheduleError::NotAnObject)?;
        let start = map
            .get("start")
            .and_then(Value::as_str)
            .ok_or(ScheduleError::MissingField("start"))?;
        let end = map
            .get("end")
            .and_then(Value::as_str)
            .ok_or(ScheduleError::MissingField("end"))?;
        Self::parse(start, end)
    }

    /// True when `now` lies inside the inclusive window: walking backwards
    /// minute by minute, the closest boundary firing at or before `now` must
    /// be a `start` (an `end` firing exactly at `now` still counts, since the
    /// window closes inclusively).
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let mut cursor = quantize(now);
        if self.start.matches(cursor) || self.end.matches(cursor) {
            return true;
        }
        for _ in 0..SCAN_HORIZON_MINUTES {
            cursor = cursor - Duration::minutes(1);
            if self.start.matches(cursor) {
                return true;
            }
            if self.end.matches(cursor) {
                return false;
            }
        }
        false
    }
}

fn quantize(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// One five-field cron expression: minute, hour, day-of-month, month,
/// day-of-week. Supports `*`, lists, ranges and steps; day-of-week 0 and 7
/// both mean Sunday. When both day fields are restricted they combine with
/// the standard OR rule.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        if self.minutes & (1 << t.minute()) == 0
            || self.hours & (1 << t.hour()) == 0
            || self.months & (1 << t.month()) == 0
        {
            return false;
        }
        let dom_ok = self.days_of_month & (1 << t.day()) != 0;
        let dow_ok = self.days_of_week & (1 << t.weekday().num_days_from_sunday()) != 0;
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }
}

impl FromStr for CronExpr {
    type Err = ScheduleError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let bad = |reason: String| ScheduleError::BadExpression {
            expr: expr.to_string(),
            reason,
        };
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(bad(format!("expected 5 fields, got {}", fields.len())));
        }
        let (minutes, _) = parse_field(fields[0], 0, 59).map_err(&bad)?;
        let (hours, _) = parse_field(fields[1], 0, 23).map_err(&bad)?;
        let (days_of_month, dom_restricted) = parse_field(fields[2], 1, 31).map_err(&bad)?;
        let (months, _) = parse_field(fields[3], 1, 12).map_err(&bad)?;
        let (dow_raw, dow_restricted) = parse_field(fields[4], 0, 7).map_err(&bad)?;
        // Fold 7 (Sunday, alternate form) onto 0.
        let mut days_of_week = dow_raw;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }
        Ok(CronExpr {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted,
            dow_restricted,
        })
    }
}

/// Parses one cron field into a bitmask over `[min, max]`, returning whether
/// the field restricts anything (`*` alone does not).
fn parse_field(field: &str, min: u32, max: u32) -> Result<(u64, bool), String> {
    let full = || {
        let mut mask = 0u64;
        for v in min..=max {
            mask |= 1 << v;
        }
        mask
    };
    if field == "*" {
        return Ok((full(), false));
    }
    let parse_num = |s: &str| -> Result<u32, String> {
        s.parse::<u32>()
            .map_err(|_| format!("not a number: {s:?}"))
    };
    let mut mask = 0u64;
    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((range, step)) => (range, parse_num(step)?),
            None => (part, 1),
        };
        if step == 0 {
            return Err("step must be positive".to_string());
        }
        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            (parse_num(a)?, parse_num(b)?)
        } else {
            let v = parse_num(range_part)?;
            // Vixie cron: a bare value with a step means "from value to max".
            if part.contains('/') {
                (v, max)
            } else {
                (v, v)
            }
        };
        if lo < min || hi > max || lo > hi {
            return Err(format!("value out of range in {part:?}"));
        }
        let mut v = lo;
        while v <= hi {
            mask |= 1 << v;
            v += step;
        }
    }
    Ok((mask, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn rule_with_schedule(schedule: Option<Value>) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            policy_id: Uuid::new_v4(),
            function: "element:read".to_string(),
            environment_id: None,
            element_id: None,
            access_schedule: schedule,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parses_wildcards_lists_ranges_and_steps() {
        let expr: CronExpr = "*/15 9-17 1,15 * 1-5".parse().unwrap();
        // 2024-03-01 is a Friday.
        assert!(expr.matches(at(2024, 3, 1, 9, 0)));
        assert!(expr.matches(at(2024, 3, 1, 9, 45)));
        assert!(!expr.matches(at(2024, 3, 1, 9, 20)));
        assert!(!expr.matches(at(2024, 3, 1, 8, 0)));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!("* * * *".parse::<CronExpr>().is_err());
        assert!("61 * * * *".parse::<CronExpr>().is_err());
        assert!("* * * * 9".parse::<CronExpr>().is_err());
        assert!("a * * * *".parse::<CronExpr>().is_err());
        assert!("*/0 * * * *".parse::<CronExpr>().is_err());
        assert!("9-5 * * * *".parse::<CronExpr>().is_err());
    }

    #[test]
    fn day_of_week_seven_is_sunday() {
        let with_seven: CronExpr = "0 12 * * 7".parse().unwrap();
        let with_zero: CronExpr = "0 12 * * 0".parse().unwrap();
        // 2024-03-10 is a Sunday.
        assert!(with_seven.matches(at(2024, 3, 10, 12, 0)));
        assert!(with_zero.matches(at(2024, 3, 10, 12, 0)));
        assert!(!with_seven.matches(at(2024, 3, 11, 12, 0)));
    }

    #[test]
    fn restricted_day_fields_combine_with_or() {
        // Fires on the 15th of any month OR on Mondays.
        let expr: CronExpr = "0 0 15 * 1".parse().unwrap();
        assert!(expr.matches(at(2024, 3, 15, 0, 0))); // a Friday, the 15th
        assert!(expr.matches(at(2024, 3, 11, 0, 0))); // a Monday, the 11th
        assert!(!expr.matches(at(2024, 3, 12, 0, 0))); // a Tuesday, the 12th
    }

    #[test]
    fn business_hours_window() {
        let schedule = AccessSchedule::parse("0 9 * * 1-5", "0 17 * * 1-5").unwrap();
        // 2024-03-12 is a Tuesday, 2024-03-16 a Saturday.
        assert!(schedule.contains(at(2024, 3, 12, 14, 0)));
        assert!(!schedule.contains(at(2024, 3, 16, 14, 0)));
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let schedule = AccessSchedule::parse("0 9 * * 1-5", "0 17 * * 1-5").unwrap();
        assert!(schedule.contains(at(2024, 3, 12, 9, 0)));
        assert!(schedule.contains(at(2024, 3, 12, 17, 0)));
        assert!(!schedule.contains(at(2024, 3, 12, 17, 1)));
        assert!(!schedule.contains(at(2024, 3, 12, 8, 59)));
    }

    #[test]
    fn seconds_are_quantized_away() {
        let schedule = AccessSchedule::parse("0 9 * * 1-5", "0 17 * * 1-5").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 12, 17, 0, 42).unwrap();
        assert!(schedule.contains(now));
    }

    #[test]
    fn rule_without_schedule_is_always_accessible() {
        let evaluator = ScheduleEvaluator::new(ScheduleFailurePolicy::Closed);
        let rule = rule_with_schedule(None);
        assert!(evaluator.is_rule_accessible_at(&rule, at(2024, 3, 16, 3, 0)));
    }

    #[test]
    fn accepts_object_and_string_payloads() {
        let evaluator = ScheduleEvaluator::new(ScheduleFailurePolicy::Closed);
        let tuesday = at(2024, 3, 12, 14, 0);
        let saturday = at(2024, 3, 16, 14, 0);

        let object = rule_with_schedule(Some(
            json!({"start": "0 9 * * 1-5", "end": "0 17 * * 1-5"}),
        ));
        assert!(evaluator.is_rule_accessible_at(&object, tuesday));
        assert!(!evaluator.is_rule_accessible_at(&object, saturday));

        let encoded = rule_with_schedule(Some(Value::String(
            r#"{"start": "0 9 * * 1-5", "end": "0 17 * * 1-5"}"#.to_string(),
        )));
        assert!(evaluator.is_rule_accessible_at(&encoded, tuesday));
        assert!(!evaluator.is_rule_accessible_at(&encoded, saturday));
    }

    #[test]
    fn malformed_schedule_follows_failure_policy() {
        let now = at(2024, 3, 12, 14, 0);
        let payloads = [
            Some(Value::String("{not json".to_string())),
            Some(json!({"start": "0 9 * * 1-5"})),
            Some(json!({"start": "0 9 * * 1-5", "end": "not cron"})),
            Some(json!(["0 9 * * 1-5", "0 17 * * 1-5"])),
        ];
        for payload in payloads {
            let rule = rule_with_schedule(payload);
            assert!(!ScheduleEvaluator::new(ScheduleFailurePolicy::Closed)
                .is_rule_accessible_at(&rule, now));
            assert!(ScheduleEvaluator::new(ScheduleFailurePolicy::Open)
                .is_rule_accessible_at(&rule, now));
        }
    }

    #[test]
    fn never_opening_schedule_denies() {
        // End fires daily but start never does within the scan horizon
        // (Feb 30 does not exist).
        let schedule = AccessSchedule::parse("0 0 30 2 *", "0 17 * * *").unwrap();
        assert!(!schedule.contains(at(2024, 3, 12, 14, 0)));
    }
}
