// src/estimation/weighted.rs

use std::str::FromStr;

use crate::error::{Result, StatsError};

// ============================================================================
// Enums & Config
// ============================================================================

/// Plotting position assigned to each sorted observation when building the
/// weighted empirical CDF. `S_k` is the cumulative weight up to and including
/// the k-th sorted point, `W` the total weight, `w_1` the weight of the
/// smallest point and `w_n` the weight of the largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantileMethod {
    /// `(S_k - (w_k + w_1) / 2) / (W - (w_1 + w_n) / 2)`: the smallest point
    /// sits at 0, the largest at 1, and both end weights count. With equal
    /// weights this is the usual linear-interpolation quantile.
    #[default]
    Interpolated,
    /// `S_k / W`
    CumulativeShare,
    /// `(S_k - w_k / 2) / W`
    Centered,
}

impl FromStr for QuantileMethod {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "interpolated" | "linear" => Ok(QuantileMethod::Interpolated),
            "cumulative" | "cumulative_share" | "share" => Ok(QuantileMethod::CumulativeShare),
            "centered" | "centred" => Ok(QuantileMethod::Centered),
            other => Err(StatsError::InvalidInput(format!("unknown quantile method '{}'", other))),
        }
    }
}

// ============================================================================
// Input checks
// ============================================================================

fn check_lengths(values: &[f64], weights: &[f64]) -> Result<()> {
    if values.len() != weights.len() {
        return Err(StatsError::LengthMismatch {
            expected: values.len(),
            got: weights.len(),
        });
    }
    Ok(())
}

fn check_inputs(values: &[f64], weights: &[f64]) -> Result<()> {
    check_lengths(values, weights)?;
    if values.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    if let Some((index, &weight)) = weights.iter().enumerate().find(|&(_, &w)| w < 0.0) {
        return Err(StatsError::NegativeWeight { index, weight });
    }
    Ok(())
}

fn check_probability(p: f64) -> Result<()> {
    if p.is_nan() {
        return Err(StatsError::InvalidInput("probability is NaN".to_string()));
    }
    Ok(())
}

// ============================================================================
// Weighted empirical CDF
// ============================================================================

/// Sorted values paired with their CDF positions.
///
/// Points with zero weight carry no mass and are left out. Positions are
/// strictly increasing because every retained weight is positive.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedCdf {
    values: Vec<f64>,
    positions: Vec<f64>,
}

impl WeightedCdf {
    pub fn new(values: &[f64], weights: &[f64], method: QuantileMethod) -> Result<Self> {
        check_inputs(values, weights)?;

        let mut pairs: Vec<(f64, f64)> = values
            .iter()
            .zip(weights.iter())
            .filter(|&(_, &w)| w > 0.0)
            .map(|(&v, &w)| (v, w))
            .collect();

        if pairs.is_empty() {
            return Err(StatsError::ZeroWeights);
        }

        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        let mut cumulative = Vec::with_capacity(n);
        let mut running = 0.0;
        for (_, w) in &pairs {
            running += w;
            cumulative.push(running);
        }
        let total = cumulative[n - 1];

        let positions: Vec<f64> = match method {
            QuantileMethod::Interpolated => {
                if n == 1 {
                    vec![0.0]
                } else {
                    // Centered positions shifted and rescaled onto [0, 1]
                    let first = pairs[0].1;
                    let last = pairs[n - 1].1;
                    let span = total - 0.5 * (first + last);
                    cumulative
                        .iter()
                        .zip(pairs.iter())
                        .map(|(s, (_, w))| (s - 0.5 * (w + first)) / span)
                        .collect()
                }
            }
            QuantileMethod::CumulativeShare => cumulative.iter().map(|s| s / total).collect(),
            QuantileMethod::Centered => cumulative
                .iter()
                .zip(pairs.iter())
                .map(|(s, (_, w))| (s - 0.5 * w) / total)
                .collect(),
        };

        let values = pairs.into_iter().map(|(v, _)| v).collect();
        Ok(Self { values, positions })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// Value at cumulative probability `p`, linear between neighbouring points.
    /// Probabilities below the first position or above the last clamp to the
    /// smallest or largest value.
    pub fn quantile(&self, p: f64) -> f64 {
        interpolate(&self.positions, &self.values, p)
    }
}

/// Piecewise-linear interpolation of `x` against increasing `xp`, clamped at
/// both ends. NaN for an empty table or a NaN `x`.
pub fn interpolate(xp: &[f64], fp: &[f64], x: f64) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 || x.is_nan() {
        return f64::NAN;
    }
    if n == 1 || x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }

    let right = xp.partition_point(|&c| c < x);
    let left = right - 1;
    let span = xp[right] - xp[left];
    if span <= 0.0 {
        return fp[right];
    }
    let t = (x - xp[left]) / span;
    fp[left] + t * (fp[right] - fp[left])
}

// ============================================================================
// Point Estimates
// ============================================================================

/// Weighted quantile at probability `p` using the default plotting position.
///
/// # Arguments
/// * `values` - Observations, any order
/// * `weights` - Non-negative sampling weights, parallel to `values`, not all zero
/// * `p` - Target probability in `[0, 1]`
pub fn weighted_quantile(values: &[f64], weights: &[f64], p: f64) -> Result<f64> {
    weighted_quantile_with(values, weights, p, QuantileMethod::default())
}

pub fn weighted_quantile_with(
    values: &[f64],
    weights: &[f64],
    p: f64,
    method: QuantileMethod,
) -> Result<f64> {
    check_probability(p)?;
    Ok(WeightedCdf::new(values, weights, method)?.quantile(p))
}

/// Several quantiles from a single sort. Identical to calling
/// [`weighted_quantile_with`] once per probability.
pub fn weighted_quantiles(
    values: &[f64],
    weights: &[f64],
    probabilities: &[f64],
    method: QuantileMethod,
) -> Result<Vec<f64>> {
    for &p in probabilities {
        check_probability(p)?;
    }
    let cdf = WeightedCdf::new(values, weights, method)?;
    Ok(probabilities.iter().map(|&p| cdf.quantile(p)).collect())
}

pub fn weighted_median(values: &[f64], weights: &[f64]) -> Result<f64> {
    weighted_quantile(values, weights, 0.5)
}

pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Result<f64> {
    check_inputs(values, weights)?;
    let sum_w: f64 = weights.iter().sum();
    if sum_w == 0.0 {
        return Err(StatsError::ZeroWeights);
    }
    let sum_wy: f64 = values.iter().zip(weights.iter()).map(|(v, w)| v * w).sum();
    Ok(sum_wy / sum_w)
}

/// Weighted total `Σ v·w`. Empty and zero-weight inputs sum to zero.
pub fn weighted_aggregate(values: &[f64], weights: &[f64]) -> Result<f64> {
    check_lengths(values, weights)?;
    Ok(values.iter().zip(weights.iter()).map(|(v, w)| v * w).sum())
}

/// Ratio of weighted totals `Σ y·w / Σ x·w`.
pub fn weighted_ratio(y: &[f64], x: &[f64], weights: &[f64]) -> Result<f64> {
    check_lengths(y, weights)?;
    check_lengths(x, weights)?;
    let sum_wx = weighted_aggregate(x, weights)?;
    if sum_wx == 0.0 {
        return Err(StatsError::ZeroDenominator);
    }
    Ok(weighted_aggregate(y, weights)? / sum_wx)
}

// ============================================================================
// Tests
// ============================================================================
