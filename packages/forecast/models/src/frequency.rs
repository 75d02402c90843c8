//! Resampling frequencies.
//!
//! Frequencies use pandas-style aliases (`D`, `W`, `ME`, `2W`, ...). Every
//! timestamp maps to an integer *period ordinal* of its unit; a bucket of a
//! frequency with multiple `k` spans `k` consecutive ordinals.

use chrono::{DateTime, Datelike as _, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Output format for bucket labels.
pub const LABEL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The calendar unit of a [`Frequency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum FrequencyUnit {
    /// Hourly, labelled by the start of the hour.
    #[strum(to_string = "h", serialize = "H")]
    Hour,
    /// Daily, labelled by midnight.
    #[strum(serialize = "D")]
    Day,
    /// Weekly, Monday through Sunday, labelled by the Sunday.
    #[strum(to_string = "W-SUN", serialize = "W")]
    Week,
    /// Monthly, labelled by the last day of the month.
    #[strum(to_string = "ME", serialize = "M")]
    MonthEnd,
    /// Monthly, labelled by the first day of the month.
    #[strum(serialize = "MS")]
    MonthStart,
    /// Quarterly, labelled by the last day of the quarter.
    #[strum(to_string = "QE", serialize = "Q", serialize = "QE-DEC", serialize = "Q-DEC")]
    QuarterEnd,
    /// Quarterly, labelled by the first day of the quarter.
    #[strum(to_string = "QS", serialize = "QS-JAN")]
    QuarterStart,
    /// Yearly, labelled by December 31st.
    #[strum(to_string = "YE", serialize = "Y", serialize = "A", serialize = "YE-DEC")]
    YearEnd,
    /// Yearly, labelled by January 1st.
    #[strum(to_string = "YS", serialize = "AS", serialize = "YS-JAN")]
    YearStart,
}

impl FrequencyUnit {
    /// Returns `true` if buckets are labelled by their last period.
    #[must_use]
    pub const fn is_end_anchored(self) -> bool {
        matches!(
            self,
            Self::Week | Self::MonthEnd | Self::QuarterEnd | Self::YearEnd
        )
    }

    /// Returns the period ordinal containing `ts`.
    #[must_use]
    pub fn ordinal(self, ts: NaiveDateTime) -> i64 {
        let date = ts.date();
        match self {
            Self::Hour => ts.and_utc().timestamp().div_euclid(3600),
            Self::Day => i64::from(date.num_days_from_ce()),
            // Day 1 of the common era is a Monday.
            Self::Week => (i64::from(date.num_days_from_ce()) - 1).div_euclid(7),
            Self::MonthEnd | Self::MonthStart => month_ordinal(date),
            Self::QuarterEnd | Self::QuarterStart => month_ordinal(date).div_euclid(3),
            Self::YearEnd | Self::YearStart => i64::from(date.year()),
        }
    }

    /// Returns the label of the period with the given ordinal.
    #[must_use]
    pub fn label(self, ordinal: i64) -> Option<NaiveDateTime> {
        let date = match self {
            Self::Hour => {
                return DateTime::from_timestamp(ordinal.checked_mul(3600)?, 0)
                    .map(|dt| dt.naive_utc());
            }
            Self::Day => day_from_ce(ordinal)?,
            Self::Week => day_from_ce(ordinal.checked_mul(7)?.checked_add(7)?)?,
            Self::MonthEnd => month_start(ordinal.checked_add(1)?)?.pred_opt()?,
            Self::MonthStart => month_start(ordinal)?,
            Self::QuarterEnd => month_start(ordinal.checked_add(1)?.checked_mul(3)?)?.pred_opt()?,
            Self::QuarterStart => month_start(ordinal.checked_mul(3)?)?,
            Self::YearEnd => NaiveDate::from_ymd_opt(i32::try_from(ordinal).ok()?, 12, 31)?,
            Self::YearStart => NaiveDate::from_ymd_opt(i32::try_from(ordinal).ok()?, 1, 1)?,
        };
        Some(date.and_time(NaiveTime::MIN))
    }
}

fn month_ordinal(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn month_start(ordinal: i64) -> Option<NaiveDate> {
    let year = i32::try_from(ordinal.div_euclid(12)).ok()?;
    let month = u32::try_from(ordinal.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn day_from_ce(days: i64) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(i32::try_from(days).ok()?)
}

/// Error returned for an unrecognised frequency alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFrequencyError {
    /// The rejected input.
    pub input: String,
}

impl std::fmt::Display for ParseFrequencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported resample frequency '{}': expected an optional positive multiple \
             followed by one of h, D, W, ME, MS, QE, QS, YE, YS",
            self.input
        )
    }
}

impl std::error::Error for ParseFrequencyError {}

/// A resampling frequency: a unit and a positive multiple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Frequency {
    /// Calendar unit.
    pub unit: FrequencyUnit,
    /// Number of unit periods per bucket (at least 1).
    pub multiple: u32,
}

impl Frequency {
    /// Creates a frequency of one `unit` per bucket.
    #[must_use]
    pub const fn new(unit: FrequencyUnit) -> Self {
        Self { unit, multiple: 1 }
    }

    /// Returns the bucket index of `ts` relative to the bucket starting at
    /// `origin`, an ordinal of this frequency's unit.
    #[must_use]
    pub fn bucket_index(&self, origin: i64, ts: NaiveDateTime) -> i64 {
        (self.unit.ordinal(ts) - origin).div_euclid(i64::from(self.multiple))
    }

    /// Returns the first unit ordinal of bucket `index` relative to
    /// `origin`.
    #[must_use]
    pub fn bucket_start(&self, origin: i64, index: i64) -> i64 {
        origin + index * i64::from(self.multiple)
    }

    /// Returns the label of the bucket whose first unit ordinal is `start`.
    #[must_use]
    pub fn bucket_label(&self, start: i64) -> Option<NaiveDateTime> {
        if self.unit.is_end_anchored() {
            self.unit.label(start + i64::from(self.multiple) - 1)
        } else {
            self.unit.label(start)
        }
    }

    /// Formats a bucket label as `YYYY-MM-DDTHH:MM:SS`.
    #[must_use]
    pub fn format_label(label: NaiveDateTime) -> String {
        label.format(LABEL_FORMAT).to_string()
    }
}

impl std::str::FromStr for Frequency {
    type Err = ParseFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseFrequencyError {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(err)?;
        let (digits, alias) = trimmed.split_at(split);

        let multiple = if digits.is_empty() {
            1
        } else {
            digits.parse::<u32>().map_err(|_| err())?
        };
        if multiple == 0 {
            return Err(err());
        }

        let unit = alias.parse::<FrequencyUnit>().map_err(|_| err())?;
        Ok(Self { unit, multiple })
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.multiple == 1 {
            write!(f, "{}", self.unit)
        } else {
            write!(f, "{}{}", self.multiple, self.unit)
        }
    }
}

impl TryFrom<String> for Frequency {
    type Error = ParseFrequencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Frequency> for String {
    fn from(value: Frequency) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn label_of(freq: &str, at: &str) -> String {
        let freq: Frequency = freq.parse().unwrap();
        let ordinal = freq.unit.ordinal(ts(at));
        Frequency::format_label(freq.bucket_label(ordinal).unwrap())
    }

    #[test]
    fn parses_aliases_and_multiples() {
        assert_eq!("ME".parse::<Frequency>().unwrap(), Frequency::new(FrequencyUnit::MonthEnd));
        assert_eq!("M".parse::<Frequency>().unwrap().unit, FrequencyUnit::MonthEnd);
        assert_eq!("W".parse::<Frequency>().unwrap().to_string(), "W-SUN");
        assert_eq!("A".parse::<Frequency>().unwrap().to_string(), "YE");
        let two_weeks: Frequency = "2W".parse().unwrap();
        assert_eq!(two_weeks.multiple, 2);
        assert_eq!(two_weeks.to_string(), "2W-SUN");
        assert_eq!("H".parse::<Frequency>().unwrap().to_string(), "h");
    }

    #[test]
    fn rejects_unknown_aliases() {
        for bad in ["", "5", "0D", "X", "ME2", "fortnight"] {
            assert!(bad.parse::<Frequency>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn end_anchored_labels() {
        assert_eq!(label_of("ME", "2020-02-10 13:00:00"), "2020-02-29T00:00:00");
        assert_eq!(label_of("QE", "2021-05-01 00:00:00"), "2021-06-30T00:00:00");
        assert_eq!(label_of("YE", "2019-07-04 00:00:00"), "2019-12-31T00:00:00");
        // 2024-01-03 is a Wednesday; its week ends Sunday 2024-01-07.
        assert_eq!(label_of("W", "2024-01-03 08:00:00"), "2024-01-07T00:00:00");
        assert_eq!(label_of("W", "2024-01-07 23:00:00"), "2024-01-07T00:00:00");
        assert_eq!(label_of("W", "2024-01-08 00:00:00"), "2024-01-14T00:00:00");
    }

    #[test]
    fn start_anchored_labels() {
        assert_eq!(label_of("MS", "2020-02-10 13:00:00"), "2020-02-01T00:00:00");
        assert_eq!(label_of("QS", "2021-05-01 00:00:00"), "2021-04-01T00:00:00");
        assert_eq!(label_of("YS", "2019-07-04 00:00:00"), "2019-01-01T00:00:00");
        assert_eq!(label_of("D", "2019-07-04 18:30:00"), "2019-07-04T00:00:00");
        assert_eq!(label_of("h", "2019-07-04 18:30:00"), "2019-07-04T18:00:00");
    }

    #[test]
    fn multiples_group_consecutive_periods() {
        let freq: Frequency = "3ME".parse().unwrap();
        let origin = freq.unit.ordinal(ts("2020-01-15 00:00:00"));
        assert_eq!(freq.bucket_index(origin, ts("2020-03-31 23:00:00")), 0);
        assert_eq!(freq.bucket_index(origin, ts("2020-04-01 00:00:00")), 1);
        let label = freq.bucket_label(freq.bucket_start(origin, 1)).unwrap();
        assert_eq!(Frequency::format_label(label), "2020-06-30T00:00:00");
    }

    #[test]
    fn serde_uses_alias_string() {
        let freq: Frequency = serde_json::from_str("\"2D\"").unwrap();
        assert_eq!(freq.multiple, 2);
        assert_eq!(serde_json::to_string(&freq).unwrap(), "\"2D\"");
        assert!(serde_json::from_str::<Frequency>("\"nope\"").is_err());
    }
}
