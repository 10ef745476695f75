// src/tables/mod.rs
//! Report tables. Each builder returns a polars `DataFrame` ready to be
//! formatted or written out.

pub mod bins;
pub mod summary;

pub use bins::{by_bin, incidence_by_bin, mean_median_ratio, BinTable};
pub use summary::{
    demographic_table, growth_table, headline, repayment_table, summary_table, DemographicGroup,
    Headline, DEMOGRAPHIC_COLUMNS,
};

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StatsError};

/// Point statistic reported in a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Measure {
    #[default]
    Mean,
    Median,
}

impl FromStr for Measure {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Measure::Mean),
            "median" => Ok(Measure::Median),
            other => Err(StatsError::InvalidInput(format!("unknown measure '{}'", other))),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Mean => write!(f, "mean"),
            Measure::Median => write!(f, "median"),
        }
    }
}

/// A cell over an empty group is blank; any other failure is an error.
pub(crate) fn cell(value: Result<f64>) -> Result<Option<f64>> {
    match value {
        Ok(v) => Ok(Some(v)),
        Err(StatsError::EmptyInput | StatsError::ZeroWeights | StatsError::ZeroDenominator) => Ok(None),
        Err(e) => Err(e),
    }
}

pub(crate) const THOUSANDS: f64 = 1000.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_parse() {
        assert_eq!("Median".parse::<Measure>().unwrap(), Measure::Median);
        assert_eq!(Measure::default(), Measure::Mean);
        assert!("mode".parse::<Measure>().is_err());
    }

    #[test]
    fn test_cell_blanks_empty_groups() {
        assert_eq!(cell(Ok(2.0)).unwrap(), Some(2.0));
        assert_eq!(cell(Err(StatsError::EmptyInput)).unwrap(), None);
        assert!(cell(Err(StatsError::InvalidBinCount)).is_err());
    }
}
