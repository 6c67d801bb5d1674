//! Day/night modulation schedules for time-modulated pressure management.
//!
//! A schedule is a sequence of half-open `[start, end)` intervals tagged
//! day or night. Intervals must tile the simulation horizon with no gaps
//! and no overlaps; boundaries are closed on the left.

use crate::error::{NetworkError, NetworkResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayNight {
    Day,
    Night,
}

impl DayNight {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "DAY" => Some(Self::Day),
            "NIGHT" => Some(Self::Night),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Day => "DAY",
            Self::Night => "NIGHT",
        }
    }
}

/// One `[start, end)` interval of a schedule, in seconds of simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleInterval {
    pub start: u64,
    pub end: u64,
    pub mode: DayNight,
}

/// A validated modulation schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub name: String,
    intervals: Vec<ScheduleInterval>,
}

impl Schedule {
    /// Build a schedule from intervals, rejecting gaps, overlaps and
    /// zero-length entries. Intervals may arrive unsorted.
    pub fn new(
        name: impl Into<String>,
        mut intervals: Vec<ScheduleInterval>,
    ) -> NetworkResult<Self> {
        let name = name.into();
        if intervals.is_empty() {
            return Err(NetworkError::BadSchedule {
                name,
                what: "schedule has no intervals",
            });
        }
        intervals.sort_by_key(|iv| iv.start);
        for iv in &intervals {
            if iv.end <= iv.start {
                return Err(NetworkError::BadSchedule {
                    name: name.clone(),
                    what: "interval end must exceed its start",
                });
            }
        }
        for pair in intervals.windows(2) {
            if pair[1].start > pair[0].end {
                return Err(NetworkError::BadSchedule {
                    name: name.clone(),
                    what: "gap between intervals",
                });
            }
            if pair[1].start < pair[0].end {
                return Err(NetworkError::BadSchedule {
                    name: name.clone(),
                    what: "overlapping intervals",
                });
            }
        }
        Ok(Self { name, intervals })
    }

    pub fn intervals(&self) -> &[ScheduleInterval] {
        &self.intervals
    }

    /// Horizon covered by the schedule: `[start, end)`.
    pub fn span(&self) -> (u64, u64) {
        (
            self.intervals[0].start,
            self.intervals[self.intervals.len() - 1].end,
        )
    }

    /// Mode in effect at time `t`. Beyond the last interval the schedule
    /// repeats its final mode; before the first it uses the first mode.
    pub fn mode_at(&self, t: u64) -> DayNight {
        for iv in &self.intervals {
            if t < iv.end {
                return iv.mode;
            }
        }
        self.intervals[self.intervals.len() - 1].mode
    }

    /// Time of the next mode boundary strictly after `t`, if any.
    pub fn next_boundary_after(&self, t: u64) -> Option<u64> {
        self.intervals
            .iter()
            .map(|iv| iv.end)
            .find(|&end| end > t && end < self.span().1)
    }
}
