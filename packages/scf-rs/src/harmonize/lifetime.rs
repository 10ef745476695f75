// src/harmonize/lifetime.rs
//! Lifetime wealth: net worth plus the discounted value of projected income.

use log::info;
use ndarray::{Array2, Axis};
use polars::prelude::*;

use crate::error::{Result, StatsError};
use crate::estimation::{median_domain, QuantileMethod};
use crate::partition::{age_brackets, AGE_LABELS};
use crate::population::{Population, Selector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifetimeParams {
    /// Aggregate income growth added to every age-profile rate.
    pub growth: f64,
    /// Discount rate.
    pub rate: f64,
    /// Last age at which income is received.
    pub end_age: u32,
}

impl Default for LifetimeParams {
    fn default() -> Self {
        Self {
            growth: 0.0,
            rate: 0.04,
            end_age: 80,
        }
    }
}

/// `lt_wealth{100g}{100r}`, e.g. `lt_wealth04` for g = 0, r = 0.04.
pub fn lifetime_column_name(params: &LifetimeParams) -> String {
    format!(
        "lt_wealth{}{}",
        (100.0 * params.growth).round() as i64,
        (100.0 * params.rate).round() as i64
    )
}

/// Annual growth rate of income within each age category, from the weighted
/// medians of neighbouring categories. The oldest category grows at `growth`.
pub fn growth_rates(
    pop: &Population,
    income_col: &str,
    growth: f64,
    method: QuantileMethod,
) -> Result<Vec<f64>> {
    let income = pop.column(income_col)?;
    let weights = pop.weights()?;
    let medians: Vec<f64> = (0..AGE_LABELS.len() as u32)
        .map(|k| {
            let domain = pop.domain(&Selector::InCategories {
                column: "age_cat".to_string(),
                categories: vec![k],
            })?;
            let med = median_domain(&income, weights, domain.mask(), method)?;
            if med > 0.0 {
                Ok(med)
            } else {
                Err(StatsError::InvalidInput(format!(
                    "median {} of age category {} is not positive",
                    income_col, AGE_LABELS[k as usize]
                )))
            }
        })
        .collect::<Result<_>>()?;

    let mut rates: Vec<f64> = medians
        .windows(2)
        .map(|m| (m[1] / m[0]).ln() / 5.0 + growth)
        .collect();
    rates.push(growth);
    Ok(rates)
}

/// Discounted income schedule, one row per household, one column per year
/// from the current one onwards.
///
/// # Arguments
/// * `ages` - Current age of each household head
/// * `incomes` - Current income
/// * `rates` - Growth rate per age category, as from [`growth_rates`]
/// * `params` - Discount rate and last age
pub fn discounted_schedule(
    ages: &[f64],
    incomes: &[f64],
    rates: &[f64],
    params: &LifetimeParams,
) -> Result<Array2<f64>> {
    if ages.len() != incomes.len() {
        return Err(StatsError::LengthMismatch { expected: ages.len(), got: incomes.len() });
    }
    let brackets = age_brackets();
    if rates.len() != brackets.len() {
        return Err(StatsError::LengthMismatch { expected: brackets.len(), got: rates.len() });
    }

    let horizon = params.end_age.max(1) as usize;
    let mut schedule = Array2::<f64>::zeros((ages.len(), horizon));
    for (mut row, (&age, &income)) in schedule.axis_iter_mut(Axis(0)).zip(ages.iter().zip(incomes)) {
        row[0] = income;
        let mut projected = income;
        for t in 0..horizon - 1 {
            let next_age = age + (t + 1) as f64;
            if next_age > f64::from(params.end_age) {
                break;
            }
            let Some(k) = brackets.locate(age + t as f64) else {
                break;
            };
            projected *= rates[k as usize].exp();
            row[t + 1] = (-params.rate * (t + 1) as f64).exp() * projected;
        }
    }
    Ok(schedule)
}

/// Net worth plus the lifetime income in `schedule`.
pub fn lifetime_wealth(schedule: &Array2<f64>, networth: &[f64]) -> Result<Vec<f64>> {
    if schedule.nrows() != networth.len() {
        return Err(StatsError::LengthMismatch { expected: schedule.nrows(), got: networth.len() });
    }
    let income = schedule.sum_axis(Axis(1));
    Ok(income.iter().zip(networth).map(|(i, w)| i + w).collect())
}

/// Population with `lt_wealth{g}{r}` and `percap_lt_wealth{g}{r}` added, plus
/// the post-cancellation `lt_wealth{g}{r}_cancel` when `student_debt` is present.
pub fn with_lifetime_wealth(
    pop: &Population,
    params: &LifetimeParams,
    method: QuantileMethod,
) -> Result<Population> {
    let name = lifetime_column_name(params);
    let ages = pop.values("age")?;

    let mut columns = Vec::with_capacity(3);
    for (prefix, income_col, networth_col) in [
        ("", "income", "networth"),
        ("percap_", "percap_income", "percap_networth"),
    ] {
        let rates = growth_rates(pop, income_col, params.growth, method)?;
        let schedule = discounted_schedule(&ages, &pop.values(income_col)?, &rates, params)?;
        let wealth = lifetime_wealth(&schedule, &pop.values(networth_col)?)?;
        if prefix.is_empty() && pop.has_column("student_debt") {
            let cancelled: Vec<f64> = wealth
                .iter()
                .zip(pop.values("student_debt")?)
                .map(|(w, d)| w + d)
                .collect();
            columns.push(Series::new(format!("{}_cancel", name).into(), cancelled));
        }
        columns.push(Series::new(format!("{}{}", prefix, name).into(), wealth));
    }

    info!(
        "wave {}: {} with g = {}, r = {}, end age {}",
        pop.wave(),
        name,
        params.growth,
        params.rate,
        params.end_age
    );
    pop.with_columns(columns)
}

// ============================================================================
// Tests
// ============================================================================
