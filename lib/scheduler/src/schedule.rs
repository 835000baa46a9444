//! Schedule rules for schedule trigger nodes.
//!
//! A rule is parsed from a trigger's resolved parameters and answers one
//! question: does a given wall-clock minute match?

use crate::error::ScheduleError;
use aura_workflow::Parameters;
use chrono::{Datelike, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use croner::Cron;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Time used when a trigger does not set one.
pub const DEFAULT_TIME: &str = "09:00";

/// A wall-clock `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    fn matches(self, at: NaiveDateTime) -> bool {
        at.hour() == self.hour && at.minute() == self.minute
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidTime {
            value: s.to_string(),
        };
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// When a schedule trigger fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleRule {
    Daily { at: TimeOfDay },
    Weekly { at: TimeOfDay, weekday: Weekday },
    /// Months without `day` never match.
    Monthly { at: TimeOfDay, day: u32 },
    Cron(CronSchedule),
}

impl ScheduleRule {
    /// Builds a rule from resolved `scheduleTrigger` parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`ScheduleError`] if the kind is unknown or a value is malformed.
    pub fn from_parameters(params: &Parameters) -> Result<Self, ScheduleError> {
        let kind = params.str("schedule").unwrap_or("daily");
        if kind == "cron" {
            let expression = params.str("cron_expression").unwrap_or_default();
            return Ok(Self::Cron(expression.parse()?));
        }

        let at: TimeOfDay = params.str("time").unwrap_or(DEFAULT_TIME).parse()?;
        match kind {
            "daily" => Ok(Self::Daily { at }),
            "weekly" => {
                let value = params.str("weekday").unwrap_or("monday");
                let weekday = value
                    .parse::<Weekday>()
                    .map_err(|_| ScheduleError::InvalidWeekday {
                        value: value.to_string(),
                    })?;
                Ok(Self::Weekly { at, weekday })
            }
            "monthly" => Ok(Self::Monthly {
                at,
                day: day_of_month(params.get("day_of_month"))?,
            }),
            other => Err(ScheduleError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }

    /// Returns true if the rule fires in the minute containing `at`.
    #[must_use]
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        match self {
            Self::Daily { at: time } => time.matches(at),
            Self::Weekly { at: time, weekday } => at.weekday() == *weekday && time.matches(at),
            Self::Monthly { at: time, day } => at.day() == *day && time.matches(at),
            Self::Cron(cron) => cron.matches(at),
        }
    }
}

fn day_of_month(value: Option<&JsonValue>) -> Result<u32, ScheduleError> {
    let day = match value {
        None | Some(JsonValue::Null) => Some(1),
        Some(JsonValue::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(JsonValue::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    day.filter(|day| (1..=31).contains(day))
        .ok_or_else(|| ScheduleError::InvalidDayOfMonth {
            value: value.map(ToString::to_string).unwrap_or_default(),
        })
}

/// A five-field cron expression:
/// `minute hour day-of-month month day-of-week`.
///
/// Day-of-week 0 and 7 are both Sunday. When both day fields are
/// restricted, a minute matches if either one does.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Returns true if the expression fires in the minute containing `at`.
    #[must_use]
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        let Some(minute) = at.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
            return false;
        };
        self.cron
            .is_time_matching(&Utc.from_utc_datetime(&minute))
            .unwrap_or(false)
    }
}

impl PartialEq for CronSchedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for CronSchedule {}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let expression = s.trim();
        let invalid = |reason: String| ScheduleError::InvalidCronExpression {
            expression: s.to_string(),
            reason,
        };
        let fields = expression.split_whitespace().count();
        if fields != 5 {
            return Err(invalid(format!("expected 5 fields, got {fields}")));
        }
        let cron = Cron::new(&expression.to_ascii_uppercase())
            .parse()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            expression: expression.to_string(),
            cron,
        })
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
