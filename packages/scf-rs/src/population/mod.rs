// src/population/mod.rs
//! Survey waves, their populations and the domains (filtered views) over them.

pub mod source;

pub use source::{CachedSource, CsvSource, FrameSource, PopulationSource, RawCsvSource};

use std::fmt;

use log::warn;
use polars::prelude::*;

use crate::error::{Result, StatsError};

/// Name of the sampling-weight column in harmonized wave frames.
pub const WEIGHT_COL: &str = "wgt";

/// One fielding of the survey, identified by its year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wave(pub u16);

impl Wave {
    pub fn year(self) -> u16 {
        self.0
    }

    /// Two-digit year used by the public file names (`p19i6`).
    pub fn short_year(self) -> String {
        format!("{:02}", self.0 % 100)
    }
}

impl fmt::Display for Wave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Population
// ============================================================================

/// The full set of respondents of one wave. Immutable: derived fields are
/// added by building a new population, never by editing this one.
#[derive(Debug, Clone)]
pub struct Population {
    wave: Wave,
    frame: DataFrame,
    weight_col: String,
}

impl Population {
    /// Wrap a frame whose weight column is complete and strictly positive.
    pub fn new(wave: Wave, frame: DataFrame, weight_col: &str) -> Result<Self> {
        let mut frame = frame;
        let weights = frame.column(weight_col)?.cast(&DataType::Float64)?;
        for (index, w) in weights.f64()?.iter().enumerate() {
            match w {
                None => {
                    return Err(StatsError::MissingValue {
                        column: weight_col.to_string(),
                        index,
                    })
                }
                Some(w) if !(w > 0.0) => {
                    return Err(StatsError::InvalidInput(format!(
                        "weight {} at row {} is not positive",
                        w, index
                    )))
                }
                Some(_) => {}
            }
        }
        frame.with_column(weights)?;

        Ok(Self {
            wave,
            frame,
            weight_col: weight_col.to_string(),
        })
    }

    /// Like [`Population::new`], but first drops rows whose weight is missing
    /// or not positive.
    pub fn from_raw(wave: Wave, frame: DataFrame, weight_col: &str) -> Result<Self> {
        let weights = frame.column(weight_col)?.cast(&DataType::Float64)?;
        let keep: Vec<bool> = weights
            .f64()?
            .iter()
            .map(|w| matches!(w, Some(w) if w > 0.0))
            .collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        let frame = if dropped > 0 {
            warn!(
                "wave {}: dropping {} of {} rows without a positive weight",
                wave,
                dropped,
                keep.len()
            );
            frame.filter(&BooleanChunked::from_slice("keep".into(), &keep))?
        } else {
            frame
        };
        Self::new(wave, frame, weight_col)
    }

    pub fn wave(&self) -> Wave {
        self.wave
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn weight_col(&self) -> &str {
        &self.weight_col
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    pub fn weights(&self) -> Result<&Float64Chunked> {
        Ok(self.frame.column(&self.weight_col)?.f64()?)
    }

    /// Column cast to `f64`.
    pub fn column(&self, name: &str) -> Result<Float64Chunked> {
        let col = self.frame.column(name)?.cast(&DataType::Float64)?;
        Ok(col.f64()?.clone())
    }

    /// Column values as a plain vector. Missing values are an error.
    pub fn values(&self, name: &str) -> Result<Vec<f64>> {
        let ca = self.column(name)?;
        ca.iter()
            .enumerate()
            .map(|(index, v)| {
                v.ok_or_else(|| StatsError::MissingValue {
                    column: name.to_string(),
                    index,
                })
            })
            .collect()
    }

    pub fn weight_values(&self) -> Result<Vec<f64>> {
        self.values(&self.weight_col)
    }

    /// New population with `columns` appended. Existing columns are never
    /// replaced.
    pub fn with_columns(&self, columns: Vec<Series>) -> Result<Population> {
        let mut frame = self.frame.clone();
        for series in columns {
            if frame.get_column_index(series.name().as_str()).is_some() {
                return Err(StatsError::InvalidInput(format!(
                    "column '{}' already exists in wave {}",
                    series.name(),
                    self.wave
                )));
            }
            frame.with_column(series)?;
        }
        Ok(Population {
            wave: self.wave,
            frame,
            weight_col: self.weight_col.clone(),
        })
    }

    /// New population without the named columns. The weight column stays.
    pub fn without_columns(&self, names: &[String]) -> Result<Population> {
        if names.iter().any(|n| *n == self.weight_col) {
            return Err(StatsError::InvalidInput(format!(
                "cannot drop weight column '{}'",
                self.weight_col
            )));
        }
        let mut frame = self.frame.clone();
        for name in names {
            frame = frame.drop(name)?;
        }
        Ok(Population {
            wave: self.wave,
            frame,
            weight_col: self.weight_col.clone(),
        })
    }

    pub fn domain(&self, selector: &Selector) -> Result<Domain> {
        let n = self.height();
        let mask = match selector {
            Selector::All => BooleanChunked::full("all".into(), true, n),
            Selector::Positive(col) => self.threshold_mask(col, |v| v > 0.0)?,
            Selector::NonPositive(col) => self.threshold_mask(col, |v| v <= 0.0)?,
            Selector::InCategories { column, categories } => self.threshold_mask(column, |v| {
                categories.iter().any(|&c| f64::from(c) == v)
            })?,
        };
        Ok(Domain {
            name: selector.label(),
            mask,
        })
    }

    fn threshold_mask(&self, col: &str, pred: impl Fn(f64) -> bool) -> Result<BooleanChunked> {
        let ca = self.column(col)?;
        let flags: Vec<bool> = ca.iter().map(|v| v.map_or(false, &pred)).collect();
        Ok(BooleanChunked::from_slice(col.into(), &flags))
    }
}

// ============================================================================
// Domains
// ============================================================================

/// Row selection rule for a subpopulation.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    All,
    /// Rows with a strictly positive value, e.g. debtors.
    Positive(String),
    NonPositive(String),
    /// Rows whose categorical label is one of `categories`. Unlabelled rows are
    /// excluded.
    InCategories { column: String, categories: Vec<u32> },
}

impl Selector {
    pub fn debtors(debt_col: &str) -> Self {
        Selector::Positive(debt_col.to_string())
    }

    pub fn label(&self) -> String {
        match self {
            Selector::All => "all".to_string(),
            Selector::Positive(col) => format!("{}>0", col),
            Selector::NonPositive(col) => format!("{}<=0", col),
            Selector::InCategories { column, categories } => {
                let cats: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
                format!("{} in [{}]", column, cats.join(","))
            }
        }
    }
}

/// A filtered view of a population: a mask over its rows.
#[derive(Debug, Clone)]
pub struct Domain {
    name: String,
    mask: BooleanChunked,
}

impl Domain {
    pub fn new(name: &str, mask: BooleanChunked) -> Self {
        Self {
            name: name.to_string(),
            mask,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mask(&self) -> &BooleanChunked {
        &self.mask
    }

    pub fn count(&self) -> usize {
        self.mask.sum().unwrap_or(0) as usize
    }

    pub fn and(&self, other: &Domain) -> Domain {
        Domain {
            name: format!("{} & {}", self.name, other.name),
            mask: &self.mask & &other.mask,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
