// src/estimation/domain.rs
//! Estimators over polars columns, optionally restricted to a domain mask.
//!
//! A domain is a boolean mask over the full population: rows where the mask is
//! `true` take part, rows where it is `false` or null do not. Selected rows
//! must carry both a value and a weight.

use polars::prelude::*;

use super::weighted::{
    weighted_aggregate, weighted_mean, weighted_quantile_with, weighted_ratio, QuantileMethod,
};
use crate::error::{Result, StatsError};

fn selection(n: usize, mask: Option<&BooleanChunked>) -> Result<Vec<bool>> {
    match mask {
        Some(m) => {
            if m.len() != n {
                return Err(StatsError::LengthMismatch { expected: n, got: m.len() });
            }
            Ok(m.iter().map(|b| b.unwrap_or(false)).collect())
        }
        None => Ok(vec![true; n]),
    }
}

fn present(ca: &Float64Chunked, index: usize, value: Option<f64>) -> Result<f64> {
    value.ok_or_else(|| StatsError::MissingValue {
        column: ca.name().to_string(),
        index,
    })
}

/// Values and weights of the selected rows, in row order.
pub fn domain_pairs(
    y: &Float64Chunked,
    weights: &Float64Chunked,
    mask: Option<&BooleanChunked>,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = weights.len();
    if y.len() != n {
        return Err(StatsError::LengthMismatch { expected: n, got: y.len() });
    }
    let keep = selection(n, mask)?;

    let mut ys = Vec::new();
    let mut ws = Vec::new();
    for (i, ((yi, wi), k)) in y.iter().zip(weights.iter()).zip(keep.iter()).enumerate() {
        if !*k {
            continue;
        }
        ys.push(present(y, i, yi)?);
        ws.push(present(weights, i, wi)?);
    }
    Ok((ys, ws))
}

// ============================================================================
// Point Estimates
// ============================================================================

pub fn mean_chunked(y: &Float64Chunked, weights: &Float64Chunked) -> Result<f64> {
    let (ys, ws) = domain_pairs(y, weights, None)?;
    weighted_mean(&ys, &ws)
}

pub fn mean_domain(y: &Float64Chunked, weights: &Float64Chunked, mask: &BooleanChunked) -> Result<f64> {
    let (ys, ws) = domain_pairs(y, weights, Some(mask))?;
    weighted_mean(&ys, &ws)
}

pub fn total_chunked(y: &Float64Chunked, weights: &Float64Chunked) -> Result<f64> {
    let (ys, ws) = domain_pairs(y, weights, None)?;
    weighted_aggregate(&ys, &ws)
}

pub fn total_domain(y: &Float64Chunked, weights: &Float64Chunked, mask: &BooleanChunked) -> Result<f64> {
    let (ys, ws) = domain_pairs(y, weights, Some(mask))?;
    weighted_aggregate(&ys, &ws)
}

pub fn quantile_chunked(
    y: &Float64Chunked,
    weights: &Float64Chunked,
    p: f64,
    method: QuantileMethod,
) -> Result<f64> {
    let (ys, ws) = domain_pairs(y, weights, None)?;
    weighted_quantile_with(&ys, &ws, p, method)
}

pub fn quantile_domain(
    y: &Float64Chunked,
    weights: &Float64Chunked,
    mask: &BooleanChunked,
    p: f64,
    method: QuantileMethod,
) -> Result<f64> {
    let (ys, ws) = domain_pairs(y, weights, Some(mask))?;
    weighted_quantile_with(&ys, &ws, p, method)
}

pub fn median_domain(
    y: &Float64Chunked,
    weights: &Float64Chunked,
    mask: &BooleanChunked,
    method: QuantileMethod,
) -> Result<f64> {
    quantile_domain(y, weights, mask, 0.5, method)
}

/// `Σ y·w / Σ x·w` over the domain.
pub fn ratio_domain(
    y: &Float64Chunked,
    x: &Float64Chunked,
    weights: &Float64Chunked,
    mask: Option<&BooleanChunked>,
) -> Result<f64> {
    let (ys, ws) = domain_pairs(y, weights, mask)?;
    let (xs, _) = domain_pairs(x, weights, mask)?;
    weighted_ratio(&ys, &xs, &ws)
}

/// Weighted share of the `within` rows that also satisfy `numerator`.
pub fn weight_share_domain(
    weights: &Float64Chunked,
    numerator: &BooleanChunked,
    within: Option<&BooleanChunked>,
) -> Result<f64> {
    let n = weights.len();
    let hit = selection(n, Some(numerator))?;
    let keep = selection(n, within)?;

    let mut sum_num = 0.0;
    let mut sum_den = 0.0;
    for (i, ((wi, h), k)) in weights.iter().zip(hit.iter()).zip(keep.iter()).enumerate() {
        if !*k {
            continue;
        }
        let w = present(weights, i, wi)?;
        sum_den += w;
        if *h {
            sum_num += w;
        }
    }
    if sum_den == 0.0 {
        return Err(StatsError::ZeroWeights);
    }
    Ok(sum_num / sum_den)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> (Float64Chunked, Float64Chunked, BooleanChunked) {
        let y = Float64Chunked::from_vec("debt".into(), vec![0.0, 10.0, 0.0, 30.0, 50.0]);
        let w = Float64Chunked::from_vec("wgt".into(), vec![2.0, 1.0, 1.0, 1.0, 1.0]);
        let mask = BooleanChunked::from_slice("debtor".into(), &[false, true, false, true, true]);
        (y, w, mask)
    }

    #[test]
    fn test_mean_domain_restricts_rows() {
        let (y, w, mask) = sample();
        assert_relative_eq!(mean_chunked(&y, &w).unwrap(), 90.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(mean_domain(&y, &w, &mask).unwrap(), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_total_domain() {
        let (y, w, mask) = sample();
        assert_relative_eq!(total_chunked(&y, &w).unwrap(), 90.0, epsilon = 1e-12);
        assert_relative_eq!(total_domain(&y, &w, &mask).unwrap(), 90.0, epsilon = 1e-12);
    }

    #[test]
    fn test_median_domain() {
        let (y, w, mask) = sample();
        let median = median_domain(&y, &w, &mask, QuantileMethod::Interpolated).unwrap();
        assert_relative_eq!(median, 30.0, epsilon = 1e-12);
        let overall = quantile_chunked(&y, &w, 0.5, QuantileMethod::Interpolated).unwrap();
        assert!(overall <= median);
    }

    #[test]
    fn test_empty_domain_is_error() {
        let (y, w, _) = sample();
        let none = BooleanChunked::from_slice("none".into(), &[false; 5]);
        assert!(matches!(mean_domain(&y, &w, &none), Err(StatsError::EmptyInput)));
        assert!(matches!(
            median_domain(&y, &w, &none, QuantileMethod::Interpolated),
            Err(StatsError::EmptyInput)
        ));
        assert_eq!(total_domain(&y, &w, &none).unwrap(), 0.0);
    }

    #[test]
    fn test_missing_value_inside_domain_is_error() {
        let y = Float64Chunked::from_slice_options("debt".into(), &[Some(1.0), None, Some(3.0)]);
        let w = Float64Chunked::from_vec("wgt".into(), vec![1.0, 1.0, 1.0]);
        let outside = BooleanChunked::from_slice("m".into(), &[true, false, true]);
        assert_relative_eq!(mean_domain(&y, &w, &outside).unwrap(), 2.0, epsilon = 1e-12);

        let err = mean_chunked(&y, &w).unwrap_err();
        match err {
            StatsError::MissingValue { column, index } => {
                assert_eq!(column, "debt");
                assert_eq!(index, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mask_length_mismatch() {
        let (y, w, _) = sample();
        let short = BooleanChunked::from_slice("m".into(), &[true, false]);
        assert!(matches!(
            mean_domain(&y, &w, &short),
            Err(StatsError::LengthMismatch { expected: 5, got: 2 })
        ));
    }

    #[test]
    fn test_ratio_and_weight_share() {
        let (y, w, mask) = sample();
        let income = Float64Chunked::from_vec("income".into(), vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        let r = ratio_domain(&y, &income, &w, None).unwrap();
        assert_relative_eq!(r, 90.0 / 160.0, epsilon = 1e-12);

        // 3 of 6 units of weight hold debt
        assert_relative_eq!(weight_share_domain(&w, &mask, None).unwrap(), 0.5, epsilon = 1e-12);
        let first_three = BooleanChunked::from_slice("m".into(), &[true, true, true, false, false]);
        assert_relative_eq!(
            weight_share_domain(&w, &mask, Some(&first_three)).unwrap(),
            0.25,
            epsilon = 1e-12
        );
    }
}
