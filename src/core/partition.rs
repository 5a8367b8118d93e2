//! Partition model
//!
//! A [`PartitionGroup`] is a static description of how one slice of an entity's
//! work is cut up. [`PartitionGroup::generate_ranges`] turns it into concrete
//! [`Partition`]s for a run. Partitions are never persisted; the checkpoint
//! store identifies them only by name.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Overall load type requested for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    /// Re-extract full history in date-bounded partitions
    Initial,
    /// Pull changes since the last checkpoint using unbounded partitions
    Incremental,
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadType::Initial => write!(f, "initial"),
            LoadType::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for LoadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "initial" | "full" => Ok(LoadType::Initial),
            "incremental" => Ok(LoadType::Incremental),
            other => Err(format!(
                "Invalid load type '{other}'. Must be 'initial' or 'incremental'"
            )),
        }
    }
}

/// Claim category bitmask a partition belongs to
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PartitionType(u8);

impl PartitionType {
    pub const NONE: PartitionType = PartitionType(0);
    pub const PART_D: PartitionType = PartitionType(1);
    pub const INSTITUTIONAL: PartitionType = PartitionType(1 << 1);
    pub const PROFESSIONAL: PartitionType = PartitionType(1 << 2);
    pub const PAC: PartitionType = PartitionType(1 << 3);
    pub const ALL: PartitionType = PartitionType(1 << 4);

    const NAMES: [(PartitionType, &'static str); 5] = [
        (PartitionType::PART_D, "PART_D"),
        (PartitionType::INSTITUTIONAL, "INSTITUTIONAL"),
        (PartitionType::PROFESSIONAL, "PROFESSIONAL"),
        (PartitionType::PAC, "PAC"),
        (PartitionType::ALL, "ALL"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`
    pub const fn contains(self, other: PartitionType) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if `self` and `other` share at least one bit
    pub const fn intersects(self, other: PartitionType) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: PartitionType) -> PartitionType {
        PartitionType(self.0 | other.0)
    }
}

impl BitOr for PartitionType {
    type Output = PartitionType;

    fn bitor(self, rhs: PartitionType) -> PartitionType {
        self.union(rhs)
    }
}

impl fmt::Debug for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Step size between successive dated partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateInterval {
    Days(u32),
    Months(u32),
    Years(u32),
}

impl DateInterval {
    /// First day of the period containing `date`
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            DateInterval::Days(_) => date,
            DateInterval::Months(_) => date.with_day(1).unwrap_or(date),
            DateInterval::Years(_) => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    /// Start of the period following the one starting at `date`
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            DateInterval::Days(n) => date.checked_add_days(Days::new(u64::from(n.max(1)))),
            DateInterval::Months(n) => date.checked_add_months(Months::new(n.max(1))),
            DateInterval::Years(n) => date.checked_add_months(Months::new(n.max(1) * 12)),
        }
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateInterval::Days(n) => write!(f, "{n}d"),
            DateInterval::Months(n) => write!(f, "{n}m"),
            DateInterval::Years(n) => write!(f, "{n}y"),
        }
    }
}

impl FromStr for DateInterval {
    type Err = String;

    /// Parses `30d`, `6m` or `1y`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.is_ascii() {
            return Err(format!("Invalid partition interval '{s}'. Expected e.g. 30d, 6m, 1y"));
        }
        let (digits, unit) = s.split_at(s.len().saturating_sub(1));
        let n: u32 = digits
            .parse()
            .map_err(|_| format!("Invalid partition interval '{s}'. Expected e.g. 30d, 6m, 1y"))?;
        if n == 0 {
            return Err(format!("Partition interval '{s}' must be greater than zero"));
        }
        match unit.to_ascii_lowercase().as_str() {
            "d" => Ok(DateInterval::Days(n)),
            "m" => Ok(DateInterval::Months(n)),
            "y" => Ok(DateInterval::Years(n)),
            _ => Err(format!(
                "Invalid partition interval unit in '{s}'. Must be one of d, m, y"
            )),
        }
    }
}

/// Static description of a slice of an entity's extractable work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionGroup {
    pub name: &'static str,
    pub claim_type_codes: &'static [i32],
    pub partition_type: PartitionType,
    pub interval: Option<DateInterval>,
    pub priority: i32,
}

impl PartitionGroup {
    pub const fn new(
        name: &'static str,
        claim_type_codes: &'static [i32],
        partition_type: PartitionType,
        interval: Option<DateInterval>,
        priority: i32,
    ) -> Self {
        Self {
            name,
            claim_type_codes,
            partition_type,
            interval,
            priority,
        }
    }

    /// Replaces the interval of a dated group. Undated groups stay undated.
    pub fn with_interval_override(self, interval: Option<DateInterval>) -> Self {
        match (self.interval, interval) {
            (Some(_), Some(new)) => Self {
                interval: Some(new),
                ..self
            },
            _ => self,
        }
    }

    /// Expands the group into concrete partitions
    ///
    /// Incremental loads and undated groups yield a single unbounded partition
    /// named after the group. Otherwise partitions step by the group interval
    /// from the first-of-period containing `start_date` until a start would
    /// pass `today`.
    pub fn generate_ranges(
        &self,
        load_type: LoadType,
        start_date: NaiveDate,
        today: NaiveDate,
    ) -> PartitionRanges {
        let state = match (load_type, self.interval) {
            (LoadType::Incremental, _) | (_, None) => RangeState::Single,
            (LoadType::Initial, Some(interval)) => RangeState::Stepping {
                interval,
                next_start: interval.truncate(start_date),
                today,
            },
        };
        PartitionRanges {
            group: *self,
            state,
        }
    }

    /// The single unbounded partition of this group
    pub fn unbounded(&self) -> Partition {
        Partition {
            name: self.name.to_string(),
            claim_type_codes: self.claim_type_codes.to_vec(),
            partition_type: self.partition_type,
            start_date: None,
            end_date: None,
            priority: self.priority,
        }
    }
}

/// A concrete unit of extractable work for one entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub claim_type_codes: Vec<i32>,
    pub partition_type: PartitionType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub priority: i32,
}

impl Partition {
    /// Unbounded partition used for entities that declare no partition groups
    pub fn for_table(table: &str) -> Self {
        Self {
            name: table.to_string(),
            claim_type_codes: Vec::new(),
            partition_type: PartitionType::ALL,
            start_date: None,
            end_date: None,
            priority: 0,
        }
    }

    /// Both dates present
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.date_range().is_some()
    }

    /// Whether a claim type code passes this partition's filter
    pub fn accepts_claim_type(&self, code: i64) -> bool {
        self.claim_type_codes.is_empty()
            || self.claim_type_codes.iter().any(|c| i64::from(*c) == code)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone)]
enum RangeState {
    Single,
    Stepping {
        interval: DateInterval,
        next_start: NaiveDate,
        today: NaiveDate,
    },
    Done,
}

/// Lazy, finite, re-iterable sequence of partitions for one group
#[derive(Debug, Clone)]
pub struct PartitionRanges {
    group: PartitionGroup,
    state: RangeState,
}

impl Iterator for PartitionRanges {
    type Item = Partition;

    fn next(&mut self) -> Option<Partition> {
        match std::mem::replace(&mut self.state, RangeState::Done) {
            RangeState::Done => None,
            RangeState::Single => Some(self.group.unbounded()),
            RangeState::Stepping {
                interval,
                next_start,
                today,
            } => {
                if next_start > today {
                    return None;
                }
                let following = interval.advance(next_start)?;
                let end = following.pred_opt().unwrap_or(following);
                self.state = RangeState::Stepping {
                    interval,
                    next_start: following,
                    today,
                };
                Some(Partition {
                    name: format!(
                        "{}-{}-{}",
                        self.group.name,
                        next_start.format("%Y-%m-%d"),
                        end.format("%Y-%m-%d")
                    ),
                    claim_type_codes: self.group.claim_type_codes.to_vec(),
                    partition_type: self.group.partition_type,
                    start_date: Some(next_start),
                    end_date: Some(end),
                    priority: self.group.priority,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: PartitionGroup = PartitionGroup::new(
        "part_d",
        &[1, 2, 3, 4],
        PartitionType::PART_D,
        Some(DateInterval::Years(1)),
        1,
    );

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_yearly_ranges_truncate_to_first_of_year() {
        let parts: Vec<_> = GROUP
            .generate_ranges(LoadType::Initial, date(2020, 3, 15), date(2023, 6, 1))
            .collect();

        let starts: Vec<_> = parts.iter().map(|p| p.start_date.unwrap()).collect();
        assert_eq!(
            starts,
            vec![
                date(2020, 1, 1),
                date(2021, 1, 1),
                date(2022, 1, 1),
                date(2023, 1, 1)
            ]
        );
        for pair in parts.windows(2) {
            assert_eq!(
                pair[0].end_date.unwrap(),
                pair[1].start_date.unwrap().pred_opt().unwrap()
            );
        }
        assert_eq!(parts[0].name, "part_d-2020-01-01-2020-12-31");
    }

    #[test]
    fn test_incremental_yields_single_unbounded_partition() {
        let parts: Vec<_> = GROUP
            .generate_ranges(LoadType::Incremental, date(2000, 1, 1), date(2024, 1, 1))
            .collect();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "part_d");
        assert!(!parts[0].is_bounded());
    }

    #[test]
    fn test_undated_group_yields_single_partition() {
        let group = PartitionGroup::new("non_claim", &[], PartitionType::ALL, None, 0);
        let parts: Vec<_> = group
            .generate_ranges(LoadType::Initial, date(2014, 1, 1), date(2024, 1, 1))
            .collect();
        assert_eq!(parts.len(), 1);
        assert!(parts[0].claim_type_codes.is_empty());
    }

    #[test]
    fn test_ranges_are_reiterable() {
        let ranges = GROUP.generate_ranges(LoadType::Initial, date(2022, 5, 1), date(2024, 2, 1));
        let first: Vec<_> = ranges.clone().collect();
        let second: Vec<_> = ranges.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_monthly_interval() {
        let group = GROUP.with_interval_override(Some(DateInterval::Months(1)));
        let parts: Vec<_> = group
            .generate_ranges(LoadType::Initial, date(2024, 1, 20), date(2024, 3, 10))
            .collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].start_date, Some(date(2024, 2, 1)));
        assert_eq!(parts[1].end_date, Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_partition_type_bitmask() {
        let combined = PartitionType::PART_D | PartitionType::ALL;
        assert!(combined.contains(PartitionType::PART_D));
        assert!(!combined.contains(PartitionType::PAC));
        assert!(combined.intersects(PartitionType::ALL | PartitionType::PAC));
        assert!(!PartitionType::INSTITUTIONAL.intersects(PartitionType::PAC));
        assert_eq!(format!("{combined:?}"), "PART_D|ALL");
    }

    #[test]
    fn test_interval_parsing() {
        assert_eq!("1y".parse::<DateInterval>(), Ok(DateInterval::Years(1)));
        assert_eq!("6m".parse::<DateInterval>(), Ok(DateInterval::Months(6)));
        assert_eq!("30D".parse::<DateInterval>(), Ok(DateInterval::Days(30)));
        assert!("0y".parse::<DateInterval>().is_err());
        assert!("1w".parse::<DateInterval>().is_err());
        assert!("".parse::<DateInterval>().is_err());
    }

    #[test]
    fn test_load_type_parsing() {
        assert_eq!("initial".parse::<LoadType>(), Ok(LoadType::Initial));
        assert_eq!("INCREMENTAL".parse::<LoadType>(), Ok(LoadType::Incremental));
        assert!("weekly".parse::<LoadType>().is_err());
    }

    #[test]
    fn test_empty_claim_types_accept_everything() {
        let partition = Partition::for_table("idr.provider_history");
        assert!(partition.accepts_claim_type(1));
        assert!(partition.accepts_claim_type(2000));
    }
}
