// src/partition/mod.rs
//! Quantile partitions built on a full population and applied to any of its
//! domains, plus fixed age brackets.

pub mod assign;
pub mod boundaries;
pub mod brackets;

pub use assign::{assign_bins, assign_bins_domain};
pub use boundaries::{
    bin_column_name, build_partition, build_partition_with, build_partitions, cut_probabilities,
    partition_population, Partition, PartitionKey, PartitionSet,
};
pub use brackets::{age_brackets, bulletin_age_brackets, Brackets, AGE_LABELS, BULLETIN_AGE_LABELS};
