//! Frost-date probability grid.
//!
//! Climate normals publish frost dates as a 6×9 grid: six temperature
//! thresholds (rows) by nine probabilities (columns). Each cell is queried
//! through its own data type id, e.g. `ANN-TMIN-PRBFST-T32FP50` for "50%
//! chance of the first 32°F frost by this date".

use std::collections::BTreeMap;
use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::types::ValidationError;

/// Temperature thresholds in °F, one per grid row.
pub const TEMPERATURES: [u8; 6] = [16, 20, 24, 28, 32, 36];
/// Probabilities in percent, one per grid column.
pub const PROBABILITIES: [u8; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 90];
/// Number of keys for one kind.
pub const KEY_COUNT: usize = TEMPERATURES.len() * PROBABILITIES.len();

/// Non-leap year the normals day-of-year values refer to.
pub const REFERENCE_YEAR: i32 = 2010;

/// First (fall) or last (spring) frost of the year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrostKind {
    First,
    Last,
}

impl FrostKind {
    fn datatype_code(self) -> &'static str {
        match self {
            Self::First => "PRBFST",
            Self::Last => "PRBLST",
        }
    }
}

impl FromStr for FrostKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            _ => Err(ValidationError::FrostKind(s.to_string())),
        }
    }
}

impl fmt::Display for FrostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Last => f.write_str("last"),
        }
    }
}

/// One cell of the frost-date grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrostDateKey {
    pub kind: FrostKind,
    pub temperature: u8,
    pub probability: u8,
}

impl FrostDateKey {
    /// All 54 keys of `kind`, temperature-major and probability-minor.
    pub fn all(kind: FrostKind) -> FrostDateKeys {
        FrostDateKeys { kind, index: 0 }
    }

    /// Grid row: `(temperature - 16) / 4`
    pub fn row(&self) -> usize {
        usize::from(self.temperature.saturating_sub(TEMPERATURES[0]) / 4)
    }

    /// Grid column: `probability / 10 - 1`
    pub fn column(&self) -> usize {
        usize::from(self.probability / 10).saturating_sub(1)
    }

    /// Data type id understood by the normals service
    pub fn datatype_id(&self) -> String {
        format!(
            "ANN-TMIN-{}-T{}FP{}",
            self.kind.datatype_code(),
            self.temperature,
            self.probability
        )
    }

    /// Inverse of [`datatype_id`](Self::datatype_id); case-insensitive.
    /// Returns `None` for ids outside the grid.
    pub fn from_datatype_id(id: &str) -> Option<Self> {
        let id = id.to_ascii_uppercase();
        let rest = id.strip_prefix("ANN-TMIN-")?;
        let (kind, rest) = if let Some(r) = rest.strip_prefix("PRBFST-T") {
            (FrostKind::First, r)
        } else if let Some(r) = rest.strip_prefix("PRBLST-T") {
            (FrostKind::Last, r)
        } else {
            return None;
        };
        let (temperature, probability) = rest.split_once("FP")?;
        let temperature: u8 = temperature.parse().ok()?;
        let probability: u8 = probability.parse().ok()?;
        if !TEMPERATURES.contains(&temperature) || !PROBABILITIES.contains(&probability) {
            return None;
        }
        Some(Self {
            kind,
            temperature,
            probability,
        })
    }
}

/// Iterator over the keys of one [`FrostKind`]
#[derive(Debug, Clone)]
pub struct FrostDateKeys {
    kind: FrostKind,
    index: usize,
}

impl Iterator for FrostDateKeys {
    type Item = FrostDateKey;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= KEY_COUNT {
            return None;
        }
        let temperature = TEMPERATURES[self.index / PROBABILITIES.len()];
        let probability = PROBABILITIES[self.index % PROBABILITIES.len()];
        self.index += 1;
        Some(FrostDateKey {
            kind: self.kind,
            temperature,
            probability,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = KEY_COUNT.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrostDateKeys {}

impl FusedIterator for FrostDateKeys {}

/// Calendar day in [`REFERENCE_YEAR`], shown as e.g. "Mar 01"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShortDate(NaiveDate);

impl ShortDate {
    /// Day 1 is Jan 01, day 60 is Mar 01, day 365 is Dec 31.
    pub fn from_day_of_year(day: u32) -> Option<Self> {
        NaiveDate::from_yo_opt(REFERENCE_YEAR, day).map(Self)
    }

    pub fn day_of_year(&self) -> u32 {
        self.0.ordinal()
    }
}

impl fmt::Display for ShortDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%b %d"))
    }
}

/// Frost dates for one station, keyed by grid cell
pub type FrostDates = BTreeMap<FrostDateKey, ShortDate>;

/// Frost dates placed into their 6×9 grid positions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrostDateGrid {
    cells: [[Option<ShortDate>; PROBABILITIES.len()]; TEMPERATURES.len()],
}

impl FrostDateGrid {
    pub fn from_dates(dates: &FrostDates) -> Self {
        let mut grid = Self::default();
        for (key, date) in dates {
            if let Some(cell) = grid
                .cells
                .get_mut(key.row())
                .and_then(|row| row.get_mut(key.column()))
            {
                *cell = Some(*date);
            }
        }
        grid
    }

    pub fn get(&self, row: usize, column: usize) -> Option<ShortDate> {
        self.cells.get(row)?.get(column).copied().flatten()
    }

    pub fn rows(&self) -> impl Iterator<Item = (u8, &[Option<ShortDate>])> {
        TEMPERATURES
            .iter()
            .copied()
            .zip(self.cells.iter().map(|r| r.as_slice()))
    }

    pub fn filled_cells(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }
}

impl fmt::Display for FrostDateGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}", "")?;
        for p in PROBABILITIES {
            write!(f, " {:>7}", format!("{}%", p))?;
        }
        writeln!(f)?;
        for (temperature, row) in self.rows() {
            write!(f, "{:>6}", format!("{}°F", temperature))?;
            for cell in row {
                match cell {
                    Some(date) => write!(f, " {:>7}", date.to_string())?,
                    None => write!(f, " {:>7}", "-")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
