// src/error.rs

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Empty input: at least one observation is required")]
    EmptyInput,

    #[error("Sum of weights is zero")]
    ZeroWeights,

    #[error("Weighted sum of denominator is zero")]
    ZeroDenominator,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Negative weight {weight} at index {index}")]
    NegativeWeight { index: usize, weight: f64 },

    #[error("Bin count must be at least 1")]
    InvalidBinCount,

    #[error("Invalid boundaries: {0}")]
    InvalidBoundaries(String),

    #[error("Value {value} at index {index} lies outside the partition range [{lower}, {upper}]")]
    OutOfRange {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Missing value in column '{column}' at row {index}")]
    MissingValue { column: String, index: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StatsError>;
