use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Earliest date of the default backfill span.
pub const DEFAULT_HISTORY_START: (i32, u32, u32) = (2006, 5, 16);
/// Cutoff of the default backfill span.
pub const DEFAULT_HISTORY_END: (i32, u32, u32) = (2021, 2, 18);

/// Half-open `[start, end)`. Consecutive windows share a boundary date,
/// which belongs to the later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedWindow {
                index: 0,
                start,
                end,
            });
        }
        Ok(Self { start, end })
    }

    pub fn start_str(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_str(), self.end_str())
    }
}

/// Parse a `YYYY-MM-DD` string.
pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}

/// The default backfill span as a `(start, end)` pair.
pub fn default_history_span() -> (NaiveDate, NaiveDate) {
    let (sy, sm, sd) = DEFAULT_HISTORY_START;
    let (ey, em, ed) = DEFAULT_HISTORY_END;
    (
        NaiveDate::from_ymd_opt(sy, sm, sd).unwrap_or(NaiveDate::MIN),
        NaiveDate::from_ymd_opt(ey, em, ed).unwrap_or(NaiveDate::MIN),
    )
}

/// One window per calendar year between `start` and `end`.
///
/// The first window starts at `start` (not 1 January) and the last ends at
/// `end`. Inner windows run from 1 January to 1 January of the next year.
/// When `end` falls on 1 January no empty trailing window is produced.
pub fn yearly_windows(start: NaiveDate, end: NaiveDate) -> Result<Vec<DateWindow>, ConfigError> {
    if start > end {
        return Err(ConfigError::InvertedWindow {
            index: 0,
            start,
            end,
        });
    }
    if start == end {
        return Ok(vec![DateWindow { start, end }]);
    }

    let mut windows = Vec::new();
    let mut cur = start;
    while cur < end {
        let next_year = NaiveDate::from_ymd_opt(cur.year() + 1, 1, 1).ok_or_else(|| {
            ConfigError::InvalidDate {
                value: format!("{}-01-01", cur.year() + 1),
            }
        })?;
        let win_end = next_year.min(end);
        windows.push(DateWindow {
            start: cur,
            end: win_end,
        });
        cur = win_end;
    }
    Ok(windows)
}

/// Pair explicit start and end lists into windows.
///
/// Fails fast when the lists differ in length, a window is inverted, or two
/// consecutive windows leave a gap or overlap.
pub fn windows_from_bounds(
    starts: &[NaiveDate],
    ends: &[NaiveDate],
) -> Result<Vec<DateWindow>, ConfigError> {
    if starts.len() != ends.len() {
        return Err(ConfigError::MismatchedBounds {
            starts: starts.len(),
            ends: ends.len(),
        });
    }
    if starts.is_empty() {
        return Err(ConfigError::NoWindows);
    }

    let windows: Vec<DateWindow> = starts
        .iter()
        .zip(ends)
        .enumerate()
        .map(|(index, (&start, &end))| {
            if start > end {
                Err(ConfigError::InvertedWindow { index, start, end })
            } else {
                Ok(DateWindow { start, end })
            }
        })
        .collect::<Result<_, _>>()?;

    validate_contiguous(&windows)?;
    Ok(windows)
}

/// Check that `windows[i].end == windows[i + 1].start` for every boundary.
pub fn validate_contiguous(windows: &[DateWindow]) -> Result<(), ConfigError> {
    for (index, pair) in windows.windows(2).enumerate() {
        if pair[0].end != pair[1].start {
            return Err(ConfigError::NonContiguous {
                index,
                end: pair[0].end,
                next_start: pair[1].start,
            });
        }
    }
    Ok(())
}
