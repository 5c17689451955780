//! Repeat policies and time math for scheduled events

use chrono::{Duration, Months, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// How a scheduled event repeats after firing
///
/// Monthly and yearly advance by calendar field, not by a fixed duration,
/// so e.g. Jan 31 + 1 month clamps to the end of February.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Fire once, never repeat
    #[default]
    NoRepeat,
    /// Every 15 minutes
    QuarterHourly,
    /// Every 30 minutes
    HalfHourly,
    /// Every hour
    Hourly,
    /// Every day
    Daily,
    /// Every 7 days
    Weekly,
    /// Every calendar month
    Monthly,
    /// Every calendar year
    Yearly,
}

impl RepeatPolicy {
    /// Parse a policy from its wire name, falling back to `NoRepeat`
    /// for unknown names
    pub fn from_name(name: &str) -> Self {
        match name {
            "quarter_hourly" => Self::QuarterHourly,
            "half_hourly" => Self::HalfHourly,
            "hourly" => Self::Hourly,
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            _ => Self::NoRepeat,
        }
    }

    /// The wire name of this policy
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoRepeat => "no_repeat",
            Self::QuarterHourly => "quarter_hourly",
            Self::HalfHourly => "half_hourly",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Whether this policy produces further occurrences
    pub fn repeats(&self) -> bool {
        !matches!(self, Self::NoRepeat)
    }

    /// The occurrence following `time` under this policy
    ///
    /// `NoRepeat` returns the input unchanged.
    pub fn next(&self, time: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::NoRepeat => time,
            Self::QuarterHourly => time + Duration::minutes(15),
            Self::HalfHourly => time + Duration::minutes(30),
            Self::Hourly => time + Duration::hours(1),
            Self::Daily => time + Duration::days(1),
            Self::Weekly => time + Duration::weeks(1),
            Self::Monthly => time.checked_add_months(Months::new(1)).unwrap_or(time),
            Self::Yearly => time.checked_add_months(Months::new(12)).unwrap_or(time),
        }
    }

    /// Fast-forward `time` to the first occurrence strictly after `now`
    ///
    /// Handles entries that slept through several periods (e.g. after
    /// downtime) without producing a backlog burst. Returns the input
    /// unchanged when it is already in the future or the policy does not
    /// repeat.
    pub fn next_after(&self, mut time: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
        if !self.repeats() {
            return time;
        }
        while time <= now {
            let step = self.next(time);
            if step <= time {
                // saturated calendar arithmetic; cannot advance further
                break;
            }
            time = step;
        }
        time
    }
}

impl std::fmt::Display for RepeatPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
