// src/partition/boundaries.rs

use std::collections::HashMap;

use log::{debug, warn};
use rayon::prelude::*;

use super::assign::{assign_bins, distinct_edges};
use crate::error::{Result, StatsError};
use crate::estimation::{weighted_quantiles, QuantileMethod};
use crate::population::{Population, Wave};

/// Probabilities `0, 1/n, ..., 1` at which the cut points are evaluated.
pub fn cut_probabilities(bin_count: usize) -> Vec<f64> {
    (0..=bin_count).map(|j| j as f64 / bin_count as f64).collect()
}

// ============================================================================
// Partition
// ============================================================================

/// Equal-mass cut points of one variable over a reference population.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    bin_count: usize,
    boundaries: Vec<f64>,
}

impl Partition {
    /// Partition from explicit cut points (`bin_count + 1` of them).
    pub fn from_boundaries(boundaries: Vec<f64>) -> Result<Self> {
        distinct_edges(&boundaries)?;
        Ok(Self {
            bin_count: boundaries.len() - 1,
            boundaries,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn lower(&self) -> f64 {
        self.boundaries[0]
    }

    pub fn upper(&self) -> f64 {
        self.boundaries[self.bin_count]
    }

    /// Number of non-empty bins left once duplicate cut points collapse.
    pub fn effective_bins(&self) -> usize {
        let distinct = self.boundaries.windows(2).filter(|w| w[1] > w[0]).count();
        distinct.max(1)
    }

    pub fn is_collapsed(&self) -> bool {
        self.effective_bins() < self.bin_count
    }

    pub fn assign(&self, values: &[f64]) -> Result<Vec<u32>> {
        assign_bins(values, &self.boundaries)
    }
}

/// Cut points at `0, 1/bin_count, ..., 1` of the weighted distribution of the
/// reference population.
///
/// # Arguments
/// * `reference_values` - Variable over the full, unconditioned population
/// * `reference_weights` - Sampling weights parallel to `reference_values`
/// * `bin_count` - Number of bins (5 for quintiles, 10 for deciles)
pub fn build_partition(
    reference_values: &[f64],
    reference_weights: &[f64],
    bin_count: usize,
) -> Result<Partition> {
    build_partition_with(reference_values, reference_weights, bin_count, QuantileMethod::default())
}

pub fn build_partition_with(
    reference_values: &[f64],
    reference_weights: &[f64],
    bin_count: usize,
    method: QuantileMethod,
) -> Result<Partition> {
    if bin_count == 0 {
        return Err(StatsError::InvalidBinCount);
    }
    let probs = cut_probabilities(bin_count);
    let boundaries = weighted_quantiles(reference_values, reference_weights, &probs, method)?;
    Ok(Partition {
        bin_count,
        boundaries,
    })
}

// ============================================================================
// Keyed partitions over waves
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub wave: Wave,
    pub variable: String,
    pub bin_count: usize,
}

impl PartitionKey {
    pub fn new(wave: Wave, variable: &str, bin_count: usize) -> Self {
        Self {
            wave,
            variable: variable.to_string(),
            bin_count,
        }
    }

    /// Name of the label column this partition produces.
    pub fn column_name(&self) -> String {
        bin_column_name(&self.variable, self.bin_count)
    }
}

pub fn bin_column_name(variable: &str, bin_count: usize) -> String {
    format!("{}_cat{}", variable, bin_count)
}

pub type PartitionSet = HashMap<PartitionKey, Partition>;

/// Partition of `variable` over the whole of `population`.
pub fn partition_population(
    population: &Population,
    variable: &str,
    bin_count: usize,
    method: QuantileMethod,
) -> Result<Partition> {
    let values = population.values(variable)?;
    let weights = population.weight_values()?;
    let partition = build_partition_with(&values, &weights, bin_count, method)?;

    debug!(
        "wave {} {}: boundaries {:?}",
        population.wave(),
        bin_column_name(variable, bin_count),
        partition.boundaries()
    );
    if partition.is_collapsed() {
        warn!(
            "wave {} {}: duplicate cut points leave {} of {} bins",
            population.wave(),
            bin_column_name(variable, bin_count),
            partition.effective_bins(),
            bin_count
        );
    }
    Ok(partition)
}

/// Every (wave, variable, bin count) partition, computed in parallel. Each key
/// reads only its own wave's full population.
pub fn build_partitions(
    populations: &[&Population],
    variables: &[String],
    bin_counts: &[usize],
    method: QuantileMethod,
) -> Result<PartitionSet> {
    let tasks: Vec<(&Population, PartitionKey)> = populations
        .iter()
        .flat_map(|pop| {
            variables.iter().flat_map(move |var| {
                bin_counts
                    .iter()
                    .map(move |&n| (*pop, PartitionKey::new(pop.wave(), var, n)))
            })
        })
        .collect();

    let built: Result<Vec<(PartitionKey, Partition)>> = tasks
        .into_par_iter()
        .map(|(pop, key)| {
            let partition = partition_population(pop, &key.variable, key.bin_count, method)?;
            Ok((key, partition))
        })
        .collect();

    Ok(built?.into_iter().collect())
}

// ============================================================================
// Tests
// ============================================================================
