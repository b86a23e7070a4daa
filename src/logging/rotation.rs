use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone};

use crate::error::{Error, Result};

/// Calendar unit between rollovers, spelled the way the settings file does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationUnit {
    Second,
    Minute,
    Hour,
    Day,
    Midnight,
    /// Weekly rollover on the given weekday, 0 is Monday.
    Weekday(u8),
}

impl RotationUnit {
    pub fn schedule(self, interval: u32) -> Result<Schedule> {
        if interval == 0 {
            return Err(Error::UnsupportedRotation {
                unit: self,
                interval,
            });
        }

        Ok(Schedule {
            unit: self,
            interval,
        })
    }
}

/// When a file rolls over and what suffix the rolled file gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    unit: RotationUnit,
    interval: u32,
}

impl Schedule {
    /// First rollover strictly after `from`.
    ///
    /// Fixed units count `interval` units from `from`. `midnight` rolls at the
    /// `interval`-th local midnight and `W<d>` at the start of the
    /// `interval`-th following weekday `d`.
    pub fn next_rollover<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> DateTime<Tz> {
        let count = i64::from(self.interval);

        match self.unit {
            RotationUnit::Second => from.clone() + TimeDelta::seconds(count),
            RotationUnit::Minute => from.clone() + TimeDelta::minutes(count),
            RotationUnit::Hour => from.clone() + TimeDelta::hours(count),
            RotationUnit::Day => from.clone() + TimeDelta::days(count),
            RotationUnit::Midnight => {
                let date = from.date_naive() + Days::new(u64::from(self.interval));
                start_of_day(&from.timezone(), date)
            }
            RotationUnit::Weekday(day) => {
                let today = from.date_naive().weekday().num_days_from_monday();
                let wait = match (u32::from(day) + 7 - today) % 7 {
                    0 => 7,
                    days => days,
                };
                let weeks = u64::from(self.interval - 1) * 7;
                let date = from.date_naive() + Days::new(u64::from(wait) + weeks);
                start_of_day(&from.timezone(), date)
            }
        }
    }

    /// `strftime` pattern appended to a rolled file, finer units keep more of the clock.
    pub fn suffix_format(&self) -> &'static str {
        match self.unit {
            RotationUnit::Second => "%Y-%m-%d_%H-%M-%S",
            RotationUnit::Minute => "%Y-%m-%d_%H-%M",
            RotationUnit::Hour => "%Y-%m-%d_%H",
            RotationUnit::Day | RotationUnit::Midnight | RotationUnit::Weekday(_) => "%Y-%m-%d",
        }
    }

    /// Whether `suffix` is something [`Schedule::suffix_format`] produces.
    pub fn is_suffix(&self, suffix: &str) -> bool {
        let sample = NaiveDate::default()
            .and_time(NaiveTime::MIN)
            .format(self.suffix_format())
            .to_string();

        suffix.len() == sample.len()
            && suffix.chars().zip(sample.chars()).all(|(c, s)| {
                if s.is_ascii_digit() {
                    c.is_ascii_digit()
                } else {
                    c == s
                }
            })
    }
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);

    // Midnight can fall into a DST gap, the first instant of the day is then later.
    tz.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}

impl FromStr for RotationUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unit = s.trim().to_ascii_uppercase();
        match unit.as_str() {
            "S" => Ok(RotationUnit::Second),
            "M" => Ok(RotationUnit::Minute),
            "H" => Ok(RotationUnit::Hour),
            "D" => Ok(RotationUnit::Day),
            "MIDNIGHT" => Ok(RotationUnit::Midnight),
            _ => match unit.strip_prefix('W').map(str::parse::<u8>) {
                Some(Ok(day)) if day <= 6 => Ok(RotationUnit::Weekday(day)),
                _ => Err(Error::InvalidRotationUnit(s.to_string())),
            },
        }
    }
}

impl Display for RotationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationUnit::Second => write!(f, "S"),
            RotationUnit::Minute => write!(f, "M"),
            RotationUnit::Hour => write!(f, "H"),
            RotationUnit::Day => write!(f, "D"),
            RotationUnit::Midnight => write!(f, "midnight"),
            RotationUnit::Weekday(day) => write!(f, "W{}", day),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn parses_units_case_insensitively() {
        assert_eq!("midnight".parse::<RotationUnit>().unwrap(), RotationUnit::Midnight);
        assert_eq!("MIDNIGHT".parse::<RotationUnit>().unwrap(), RotationUnit::Midnight);
        assert_eq!("h".parse::<RotationUnit>().unwrap(), RotationUnit::Hour);
        assert_eq!("W3".parse::<RotationUnit>().unwrap(), RotationUnit::Weekday(3));
    }

    #[test]
    fn rejects_unknown_units() {
        for unit in ["", "X", "W7", "Wx", "hourly"] {
            assert!(
                matches!(unit.parse::<RotationUnit>(), Err(Error::InvalidRotationUnit(_))),
                "{unit} should not parse"
            );
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, sec).unwrap()
    }

    #[test]
    fn fixed_units_count_whole_intervals() {
        // 2024-01-03 is a Wednesday.
        let from = at(2024, 1, 3, 10, 15, 30);

        let cases = [
            (RotationUnit::Second, 30, at(2024, 1, 3, 10, 16, 0)),
            (RotationUnit::Minute, 1, at(2024, 1, 3, 10, 16, 30)),
            (RotationUnit::Hour, 2, at(2024, 1, 3, 12, 15, 30)),
            (RotationUnit::Day, 7, at(2024, 1, 10, 10, 15, 30)),
        ];

        for (unit, interval, expected) in cases {
            let schedule = unit.schedule(interval).unwrap();
            assert_eq!(schedule.next_rollover(&from), expected, "{unit} x {interval}");
        }
    }

    #[test]
    fn midnight_rolls_at_the_start_of_a_later_day() {
        let from = at(2024, 1, 3, 23, 59, 59);

        let daily = RotationUnit::Midnight.schedule(1).unwrap();
        assert_eq!(daily.next_rollover(&from), at(2024, 1, 4, 0, 0, 0));

        let every_other = RotationUnit::Midnight.schedule(2).unwrap();
        assert_eq!(every_other.next_rollover(&from), at(2024, 1, 5, 0, 0, 0));
    }

    #[test]
    fn weekday_rolls_on_the_next_matching_day() {
        let wednesday = at(2024, 1, 3, 9, 0, 0);

        let friday = RotationUnit::Weekday(4).schedule(1).unwrap();
        assert_eq!(friday.next_rollover(&wednesday), at(2024, 1, 5, 0, 0, 0));

        let monday = RotationUnit::Weekday(0).schedule(1).unwrap();
        assert_eq!(monday.next_rollover(&wednesday), at(2024, 1, 8, 0, 0, 0));

        let same_day = RotationUnit::Weekday(2).schedule(1).unwrap();
        assert_eq!(same_day.next_rollover(&wednesday), at(2024, 1, 10, 0, 0, 0));

        let fortnightly = RotationUnit::Weekday(4).schedule(2).unwrap();
        assert_eq!(fortnightly.next_rollover(&wednesday), at(2024, 1, 12, 0, 0, 0));
    }

    #[test]
    fn zero_interval_is_rejected() {
        for unit in [RotationUnit::Hour, RotationUnit::Midnight, RotationUnit::Weekday(0)] {
            assert!(matches!(
                unit.schedule(0),
                Err(Error::UnsupportedRotation { interval: 0, .. })
            ));
        }
    }

    #[test]
    fn suffixes_follow_the_unit() {
        let stamp = at(2024, 1, 3, 10, 15, 30);
        let suffix = |unit: RotationUnit| {
            let schedule = unit.schedule(1).unwrap();
            stamp.format(schedule.suffix_format()).to_string()
        };

        assert_eq!(suffix(RotationUnit::Second), "2024-01-03_10-15-30");
        assert_eq!(suffix(RotationUnit::Minute), "2024-01-03_10-15");
        assert_eq!(suffix(RotationUnit::Hour), "2024-01-03_10");
        assert_eq!(suffix(RotationUnit::Midnight), "2024-01-03");
        assert_eq!(suffix(RotationUnit::Weekday(6)), "2024-01-03");
    }

    #[test]
    fn recognizes_only_its_own_suffixes() {
        let hourly = RotationUnit::Hour.schedule(1).unwrap();

        assert!(hourly.is_suffix("2024-01-03_10"));
        assert!(!hourly.is_suffix("2024-01-03"));
        assert!(!hourly.is_suffix("2024-01-03_10-15"));
        assert!(!hourly.is_suffix("backup"));
    }
}
