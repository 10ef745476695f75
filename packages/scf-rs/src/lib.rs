// src/lib.rs
//! Weighted distributional statistics for household-survey waves: weighted
//! quantiles and means, quantile partitions built on a full population and
//! applied to its subpopulations, wave harmonization and report tables.

pub mod error;
pub mod estimation;
pub mod harmonize;
pub mod partition;
pub mod population;
pub mod tables;

#[cfg(feature = "python")]
mod python;

pub use error::{Result, StatsError};
pub use estimation::{
    weighted_aggregate, weighted_mean, weighted_median, weighted_quantile, weighted_quantiles,
    QuantileMethod,
};
pub use partition::{assign_bins, build_partition, Partition, PartitionKey};
pub use population::{Domain, Population, PopulationSource, Selector, Wave};
