// src/partition/assign.rs

use log::warn;
use polars::prelude::*;

use super::boundaries::{bin_column_name, Partition, PartitionSet};
use crate::error::{Result, StatsError};
use crate::population::Population;

/// Validate `boundaries` and collapse runs of equal cut points.
pub(crate) fn distinct_edges(boundaries: &[f64]) -> Result<Vec<f64>> {
    if boundaries.len() < 2 {
        return Err(StatsError::InvalidBoundaries(format!(
            "need at least 2 cut points, got {}",
            boundaries.len()
        )));
    }
    // `!(a <= b)` also rejects NaN
    if let Some(pos) = boundaries.windows(2).position(|w| !(w[0] <= w[1])) {
        return Err(StatsError::InvalidBoundaries(format!(
            "cut points decrease at position {}: {} > {}",
            pos + 1,
            boundaries[pos],
            boundaries[pos + 1]
        )));
    }
    let mut edges = boundaries.to_vec();
    edges.dedup();
    Ok(edges)
}

/// Bin of `v` over distinct `edges`: bin i is `[e_i, e_{i+1})` and the last
/// bin also holds the upper edge.
fn locate(edges: &[f64], v: f64) -> Option<u32> {
    let last = edges.len() - 1;
    if last == 0 {
        return (v == edges[0]).then_some(0);
    }
    if !(v >= edges[0] && v <= edges[last]) {
        return None;
    }
    if v == edges[last] {
        return Some((last - 1) as u32);
    }
    Some((edges.partition_point(|&e| e <= v) - 1) as u32)
}

/// Label each value with the bin it falls in. Labels are dense from 0: when
/// adjacent cut points coincide the empty bins are skipped, so fewer than
/// `boundaries.len() - 1` labels may be used.
///
/// # Arguments
/// * `values` - Values to label, from any subpopulation of the reference
/// * `boundaries` - Non-decreasing cut points, usually from [`build_partition`](super::build_partition)
pub fn assign_bins(values: &[f64], boundaries: &[f64]) -> Result<Vec<u32>> {
    let edges = distinct_edges(boundaries)?;
    let lower = edges[0];
    let upper = edges[edges.len() - 1];
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            locate(&edges, value).ok_or(StatsError::OutOfRange {
                index,
                value,
                lower,
                upper,
            })
        })
        .collect()
}

/// Labels for a column, restricted to an optional domain. Rows outside the
/// domain get a null label. Selected rows must carry a value.
pub fn assign_bins_domain(
    values: &Float64Chunked,
    mask: Option<&BooleanChunked>,
    partition: &Partition,
    name: &str,
) -> Result<UInt32Chunked> {
    let edges = distinct_edges(partition.boundaries())?;
    let lower = partition.lower();
    let upper = partition.upper();
    if let Some(m) = mask {
        if m.len() != values.len() {
            return Err(StatsError::LengthMismatch { expected: values.len(), got: m.len() });
        }
    }

    let mut labels: Vec<Option<u32>> = Vec::with_capacity(values.len());
    for (index, v) in values.iter().enumerate() {
        let selected = mask.map_or(true, |m| m.get(index).unwrap_or(false));
        if !selected {
            labels.push(None);
            continue;
        }
        let value = v.ok_or_else(|| StatsError::MissingValue {
            column: values.name().to_string(),
            index,
        })?;
        let bin = locate(&edges, value).ok_or(StatsError::OutOfRange {
            index,
            value,
            lower,
            upper,
        })?;
        labels.push(Some(bin));
    }
    Ok(UInt32Chunked::from_slice_options(name.into(), &labels))
}

impl Population {
    /// Attach the `{variable}_cat{n}` label column for `partition`.
    pub fn with_bins(&self, variable: &str, partition: &Partition) -> Result<Population> {
        let name = bin_column_name(variable, partition.bin_count());
        let labels = assign_bins_domain(&self.column(variable)?, None, partition, &name)?;
        self.with_columns(vec![labels.into_series()])
    }

    /// Attach every partition in `set` that belongs to this wave, in key order.
    /// Label columns the frame already carries, e.g. from an earlier cleaning
    /// run, are dropped and recomputed from `set`.
    pub fn with_partition_set(&self, set: &PartitionSet) -> Result<Population> {
        let mut keys: Vec<_> = set.keys().filter(|k| k.wave == self.wave()).collect();
        keys.sort();

        let stale: Vec<String> = keys
            .iter()
            .map(|k| k.column_name())
            .filter(|name| self.has_column(name))
            .collect();
        let base = if stale.is_empty() {
            self.clone()
        } else {
            warn!(
                "wave {}: recomputing {} existing bin columns ({})",
                self.wave(),
                stale.len(),
                stale.join(", ")
            );
            self.without_columns(&stale)?
        };

        let mut columns = Vec::with_capacity(keys.len());
        for key in keys {
            let labels = assign_bins_domain(
                &base.column(&key.variable)?,
                None,
                &set[key],
                &key.column_name(),
            )?;
            columns.push(labels.into_series());
        }
        base.with_columns(columns)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{build_partition, PartitionKey};
    use crate::population::{Selector, Wave};

    #[test]
    fn test_half_open_bins() {
        let b = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(assign_bins(&[0.0, 9.99, 10.0, 25.0, 30.0], &b).unwrap(), vec![0, 0, 1, 2, 2]);
    }

    #[test]
    fn test_out_of_range_reports_record() {
        let err = assign_bins(&[5.0, 31.0], &[0.0, 10.0, 30.0]).unwrap_err();
        match err {
            StatsError::OutOfRange { index, value, lower, upper } => {
                assert_eq!(index, 1);
                assert_eq!(value, 31.0);
                assert_eq!(lower, 0.0);
                assert_eq!(upper, 30.0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(assign_bins(&[-0.1], &[0.0, 1.0]).is_err());
        assert!(assign_bins(&[f64::NAN], &[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_duplicate_boundaries_relabel_densely() {
        let b = [0.0, 0.0, 0.0, 5.0, 10.0];
        assert_eq!(assign_bins(&[0.0, 4.0, 5.0, 10.0], &b).unwrap(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_all_equal_boundaries_single_bin() {
        let b = [7.0, 7.0, 7.0];
        assert_eq!(assign_bins(&[7.0, 7.0], &b).unwrap(), vec![0, 0]);
        assert!(assign_bins(&[7.5], &b).is_err());
    }

    #[test]
    fn test_invalid_boundaries() {
        assert!(matches!(assign_bins(&[1.0], &[1.0]), Err(StatsError::InvalidBoundaries(_))));
        assert!(matches!(
            assign_bins(&[1.0], &[0.0, 2.0, 1.0]),
            Err(StatsError::InvalidBoundaries(_))
        ));
        assert!(matches!(
            assign_bins(&[1.0], &[0.0, f64::NAN, 2.0]),
            Err(StatsError::InvalidBoundaries(_))
        ));
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let values: Vec<f64> = (0..300).map(|i| ((i * 53) % 97) as f64).collect();
        let p = build_partition(&values, &vec![1.0; values.len()], 5).unwrap();
        let first = p.assign(&values).unwrap();
        let second = p.assign(&values).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_values_fill_every_bin() {
        let values: Vec<f64> = (0..1000).map(|i| ((i * 7919) % 1000) as f64).collect();
        let weights: Vec<f64> = (0..1000).map(|i| 1.0 + (i % 3) as f64).collect();
        for n in [5, 10] {
            let p = build_partition(&values, &weights, n).unwrap();
            let labels = p.assign(&values).unwrap();
            let mut counts = vec![0usize; n];
            for l in &labels {
                counts[*l as usize] += 1;
            }
            assert!(counts.iter().all(|&c| c > 0), "empty bin in {:?}", counts);
        }
    }

    fn population() -> Population {
        let df = df![
            "wgt" => [1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            "income" => [10.0, 20.0, 30.0, 40.0, 50.0, 60.0],
            "student_debt" => [0.0, 500.0, 0.0, 1000.0, 200.0, 0.0],
        ]
        .unwrap();
        Population::new(Wave(2019), df, "wgt").unwrap()
    }

    #[test]
    fn test_subset_labels_match_full_population_labels() {
        let pop = population();
        let p = build_partition(&pop.values("income").unwrap(), &pop.weight_values().unwrap(), 5)
            .unwrap();

        let full = assign_bins_domain(&pop.column("income").unwrap(), None, &p, "income_cat5").unwrap();
        let debtors = pop.domain(&Selector::debtors("student_debt")).unwrap();
        let sub = assign_bins_domain(&pop.column("income").unwrap(), Some(debtors.mask()), &p, "income_cat5")
            .unwrap();

        // Same boundaries for the subset: each debtor keeps its full-population bin
        for i in 0..pop.height() {
            if debtors.mask().get(i) == Some(true) {
                assert_eq!(sub.get(i), full.get(i));
            } else {
                assert_eq!(sub.get(i), None);
            }
        }
    }

    #[test]
    fn test_domain_mask_length_checked() {
        let pop = population();
        let p = Partition::from_boundaries(vec![0.0, 100.0]).unwrap();
        let short = BooleanChunked::from_slice("m".into(), &[true]);
        assert!(assign_bins_domain(&pop.column("income").unwrap(), Some(&short), &p, "x").is_err());
    }

    #[test]
    fn test_with_bins_and_partition_set() {
        let pop = population();
        let p = Partition::from_boundaries(vec![10.0, 35.0, 60.0]).unwrap();
        let binned = pop.with_bins("income", &p).unwrap();
        let col = binned.frame().column("income_cat2").unwrap();
        let labels: Vec<Option<u32>> = col.u32().unwrap().iter().collect();
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(1)]);

        let mut set = PartitionSet::new();
        set.insert(PartitionKey::new(Wave(2019), "income", 2), p.clone());
        set.insert(PartitionKey::new(Wave(2022), "income", 5), p);
        let attached = pop.with_partition_set(&set).unwrap();
        assert!(attached.has_column("income_cat2"));
        assert!(!attached.has_column("income_cat5"));
    }

    #[test]
    fn test_partition_set_replaces_existing_bin_columns() {
        // Frame written by an earlier run, with stale labels
        let stale = UInt32Chunked::from_vec("income_cat2".into(), vec![1, 1, 1, 1, 1, 1]);
        let pop = population().with_columns(vec![stale.into_series()]).unwrap();
        let p = Partition::from_boundaries(vec![10.0, 35.0, 60.0]).unwrap();

        let mut set = PartitionSet::new();
        set.insert(PartitionKey::new(Wave(2019), "income", 2), p);
        let attached = pop.with_partition_set(&set).unwrap();
        let labels: Vec<Option<u32>> =
            attached.frame().column("income_cat2").unwrap().u32().unwrap().iter().collect();
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(1)]);
        assert_eq!(attached.frame().width(), pop.frame().width());
    }
}
