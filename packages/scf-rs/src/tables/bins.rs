// src/tables/bins.rs
//! Statistics of a debt variable by full-population bin of a partition
//! variable, one row per wave and one column per bin.

use polars::prelude::*;

use super::{cell, Measure};
use crate::error::Result;
use crate::estimation::{mean_domain, median_domain, weight_share_domain, QuantileMethod};
use crate::partition::bin_column_name;
use crate::population::{Domain, Population, Selector};

/// Request for one by-bin table.
#[derive(Debug, Clone, PartialEq)]
pub struct BinTable {
    /// Variable summarized in each cell, e.g. `student_debt`.
    pub variable: String,
    /// Partition variable whose bins form the columns, e.g. `income`.
    pub by: String,
    pub bin_count: usize,
    /// Rows taking part. Bins always come from the full population.
    pub domain: Selector,
    pub measure: Measure,
}

impl BinTable {
    pub fn bin_column(&self) -> String {
        bin_column_name(&self.by, self.bin_count)
    }

    /// File-friendly table name, e.g. `student_debt_mean_by_income_cat5_all`.
    pub fn name(&self) -> String {
        let domain = match &self.domain {
            Selector::All => "all".to_string(),
            Selector::Positive(c) if *c == self.variable => "debtors".to_string(),
            other => other
                .label()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect(),
        };
        format!(
            "{}_{}_by_{}_{}",
            self.variable,
            self.measure,
            self.bin_column(),
            domain
        )
    }
}

/// One domain per bin, each intersected with `within`.
fn bin_domains(pop: &Population, bin_col: &str, bin_count: usize, within: &Domain) -> Result<Vec<Domain>> {
    (0..bin_count as u32)
        .map(|b| {
            let bin = pop.domain(&Selector::InCategories {
                column: bin_col.to_string(),
                categories: vec![b],
            })?;
            Ok(within.and(&bin))
        })
        .collect()
}

fn wave_frame(populations: &[&Population], bin_count: usize, rows: Vec<Vec<Option<f64>>>) -> Result<DataFrame> {
    let waves: Vec<u32> = populations.iter().map(|p| u32::from(p.wave().year())).collect();
    let mut columns = vec![Column::new("wave".into(), waves)];
    for b in 0..bin_count {
        let values: Vec<Option<f64>> = rows.iter().map(|r| r[b]).collect();
        columns.push(Column::new(format!("{}", b + 1).into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Mean or median of `table.variable` within each bin of `table.by`.
pub fn by_bin(populations: &[&Population], table: &BinTable, method: QuantileMethod) -> Result<DataFrame> {
    let bin_col = table.bin_column();
    let mut rows = Vec::with_capacity(populations.len());
    for pop in populations {
        let y = pop.column(&table.variable)?;
        let w = pop.weights()?;
        let within = pop.domain(&table.domain)?;
        let row = bin_domains(pop, &bin_col, table.bin_count, &within)?
            .iter()
            .map(|d| {
                cell(match table.measure {
                    Measure::Mean => mean_domain(&y, w, d.mask()),
                    Measure::Median => median_domain(&y, w, d.mask(), method),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }
    wave_frame(populations, table.bin_count, rows)
}

/// Weighted share of each bin holding a positive `variable`.
pub fn incidence_by_bin(
    populations: &[&Population],
    variable: &str,
    by: &str,
    bin_count: usize,
) -> Result<DataFrame> {
    let bin_col = bin_column_name(by, bin_count);
    let mut rows = Vec::with_capacity(populations.len());
    for pop in populations {
        let holders = pop.domain(&Selector::Positive(variable.to_string()))?;
        let all = pop.domain(&Selector::All)?;
        let w = pop.weights()?;
        let row = bin_domains(pop, &bin_col, bin_count, &all)?
            .iter()
            .map(|d| cell(weight_share_domain(w, holders.mask(), Some(d.mask()))))
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }
    wave_frame(populations, bin_count, rows)
}

/// Ratio of mean to median `variable` among holders, by bin.
pub fn mean_median_ratio(
    populations: &[&Population],
    variable: &str,
    by: &str,
    bin_count: usize,
    method: QuantileMethod,
) -> Result<DataFrame> {
    let bin_col = bin_column_name(by, bin_count);
    let mut rows = Vec::with_capacity(populations.len());
    for pop in populations {
        let y = pop.column(variable)?;
        let w = pop.weights()?;
        let debtors = pop.domain(&Selector::Positive(variable.to_string()))?;
        let row = bin_domains(pop, &bin_col, bin_count, &debtors)?
            .iter()
            .map(|d| {
                let mean = cell(mean_domain(&y, w, d.mask()))?;
                let median = cell(median_domain(&y, w, d.mask(), method))?;
                Ok(match (mean, median) {
                    (Some(m), Some(med)) if med != 0.0 => Some(m / med),
                    _ => None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(row);
    }
    wave_frame(populations, bin_count, rows)
}
