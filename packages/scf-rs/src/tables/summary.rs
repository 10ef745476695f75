// src/tables/summary.rs

use polars::prelude::*;

use super::{cell, THOUSANDS};
use crate::error::{Result, StatsError};
use crate::estimation::{
    mean_domain, median_domain, ratio_domain, total_domain, weight_share_domain, QuantileMethod,
};
use crate::harmonize::{nopay_column, LoanSplit, NoPayReason};
use crate::partition::BULLETIN_AGE_LABELS;
use crate::population::{Domain, Population, Selector, Wave};

// ============================================================================
// Headline statistics
// ============================================================================

/// Headline figures for one wave.
#[derive(Debug, Clone, PartialEq)]
pub struct Headline {
    pub wave: Wave,
    pub median_debt_debtors: f64,
    pub mean_debt: f64,
    pub mean_debt_debtors: f64,
    /// Weighted share of households holding the debt.
    pub incidence: f64,
    pub debt_to_income: f64,
    pub debt_to_networth: f64,
    /// Loan-level aggregates, when the loan-level columns are present.
    pub federal_aggregate: Option<f64>,
    pub private_aggregate: Option<f64>,
    /// Share of debtors with a loan on income-driven repayment.
    pub idr_share: Option<f64>,
}

impl Headline {
    pub fn federal_share(&self) -> Option<f64> {
        match (self.federal_aggregate, self.private_aggregate) {
            (Some(f), Some(p)) if f + p > 0.0 => Some(f / (f + p)),
            _ => None,
        }
    }

    /// Long-format frame: one `statistic`, `value` row per figure.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let rows: Vec<(&str, Option<f64>)> = vec![
            ("median_debt_debtors", Some(self.median_debt_debtors)),
            ("mean_debt", Some(self.mean_debt)),
            ("mean_debt_debtors", Some(self.mean_debt_debtors)),
            ("incidence", Some(self.incidence)),
            ("debt_to_income", Some(self.debt_to_income)),
            ("debt_to_networth", Some(self.debt_to_networth)),
            ("federal_aggregate", self.federal_aggregate),
            ("private_aggregate", self.private_aggregate),
            ("federal_share", self.federal_share()),
            ("idr_share", self.idr_share),
        ];
        let n = rows.len();
        let (names, values): (Vec<&str>, Vec<Option<f64>>) = rows.into_iter().unzip();
        Ok(df![
            "wave" => vec![u32::from(self.wave.year()); n],
            "statistic" => names,
            "value" => values,
        ]?)
    }
}

/// Headline statistics of `debt_col` for one wave.
pub fn headline(pop: &Population, debt_col: &str, method: QuantileMethod) -> Result<Headline> {
    let debt = pop.column(debt_col)?;
    let w = pop.weights()?;
    let all = pop.domain(&Selector::All)?;
    let debtors = pop.domain(&Selector::debtors(debt_col))?;

    let aggregate = |col: &str| -> Result<Option<f64>> {
        if !pop.has_column(col) {
            return Ok(None);
        }
        Ok(Some(total_domain(&pop.column(col)?, w, all.mask())?))
    };
    let idr_share = if pop.has_column("idr") {
        let idr = pop.domain(&Selector::Positive("idr".to_string()))?;
        cell(weight_share_domain(w, idr.mask(), Some(debtors.mask())))?
    } else {
        None
    };

    Ok(Headline {
        wave: pop.wave(),
        median_debt_debtors: median_domain(&debt, w, debtors.mask(), method)?,
        mean_debt: mean_domain(&debt, w, all.mask())?,
        mean_debt_debtors: mean_domain(&debt, w, debtors.mask())?,
        incidence: weight_share_domain(w, debtors.mask(), None)?,
        debt_to_income: ratio_domain(&debt, &pop.column("income")?, w, None)?,
        debt_to_networth: ratio_domain(&debt, &pop.column("networth")?, w, None)?,
        federal_aggregate: aggregate("student_debt_fed_current")?,
        private_aggregate: aggregate("student_debt_private_current")?,
        idr_share,
    })
}

// ============================================================================
// Summary table
// ============================================================================

/// Median and mean income and net worth ($000s) for the whole population,
/// holders of `debt_col` and holders of `private_col`.
pub fn summary_table(
    pop: &Population,
    debt_col: &str,
    private_col: &str,
    method: QuantileMethod,
) -> Result<DataFrame> {
    let w = pop.weights()?;
    let groups = [
        ("Whole population", pop.domain(&Selector::All)?),
        ("Debtors", pop.domain(&Selector::debtors(debt_col))?),
        ("Private debtors", pop.domain(&Selector::debtors(private_col))?),
    ];
    let stats = [
        ("Median income", "income", true),
        ("Mean income", "income", false),
        ("Median networth", "networth", true),
        ("Mean networth", "networth", false),
    ];

    let mut columns = vec![Column::new(
        "statistic".into(),
        stats.iter().map(|s| s.0).collect::<Vec<_>>(),
    )];
    for (label, domain) in &groups {
        let mut values = Vec::with_capacity(stats.len());
        for (_, var, median) in stats {
            let y = pop.column(var)?;
            let v = if median {
                median_domain(&y, w, domain.mask(), method)
            } else {
                mean_domain(&y, w, domain.mask())
            };
            values.push(cell(v)?.map(|v| v / THOUSANDS));
        }
        columns.push(Column::new((*label).into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

// ============================================================================
// Repayment status
// ============================================================================

/// Share of loan-level balances not in repayment, overall and by reason, with
/// a row per federal / private split.
pub fn repayment_table(pop: &Population) -> Result<DataFrame> {
    let w = pop.weights()?;
    let statuses: Vec<Option<NoPayReason>> =
        std::iter::once(None).chain(NoPayReason::ALL.into_iter().map(Some)).collect();

    let mut columns = vec![Column::new(
        "split".into(),
        LoanSplit::ALL.iter().map(|s| s.label()).collect::<Vec<_>>(),
    )];
    for status in statuses {
        let mut values = Vec::with_capacity(LoanSplit::ALL.len());
        for split in LoanSplit::ALL {
            let num = pop.column(&nopay_column(status, split))?;
            let den = pop.column(split.balance_column())?;
            values.push(cell(ratio_domain(&num, &den, w, None))?);
        }
        let label = status.map_or("Not in repayment", NoPayReason::label);
        columns.push(Column::new(label.into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

// ============================================================================
// Demographic table
// ============================================================================

pub const DEMOGRAPHIC_COLUMNS: [&str; 4] = ["Median income", "Mean income", "Median net worth", "Mean net worth"];

/// A categorical variable and the labels of its codes.
#[derive(Debug, Clone, PartialEq)]
pub struct DemographicGroup {
    pub column: String,
    pub codes: Vec<u32>,
    pub labels: Vec<String>,
}

impl DemographicGroup {
    pub fn new(column: &str, codes: Vec<u32>, labels: &[&str]) -> Self {
        Self {
            column: column.to_string(),
            codes,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn age() -> Self {
        let labels: Vec<String> = BULLETIN_AGE_LABELS.iter().map(|l| format!("Age {}", l)).collect();
        Self {
            column: "age_cat_bulletin".to_string(),
            codes: (0..BULLETIN_AGE_LABELS.len() as u32).collect(),
            labels,
        }
    }

    pub fn education() -> Self {
        Self::new(
            "edcl",
            vec![1, 2, 3, 4],
            &["No high school diploma", "High school diploma", "Some college", "Bachelor's degree+"],
        )
    }

    pub fn race() -> Self {
        Self::new(
            "racecl4",
            vec![1, 2, 3, 4],
            &["White non-Hispanic", "Black/African-American", "Hispanic/Latino", "Other/multiple race"],
        )
    }

    /// Age, education and race, in report order.
    pub fn standard() -> Vec<Self> {
        vec![Self::age(), Self::education(), Self::race()]
    }
}

/// Median and mean income and net worth ($000s) for each code of each group.
pub fn demographic_table(
    pop: &Population,
    groups: &[DemographicGroup],
    method: QuantileMethod,
) -> Result<DataFrame> {
    let w = pop.weights()?;
    let income = pop.column("income")?;
    let networth = pop.column("networth")?;

    let mut group_labels: Vec<String> = Vec::new();
    let mut variables: Vec<String> = Vec::new();
    let mut stats: [Vec<Option<f64>>; 4] = Default::default();
    for group in groups {
        for (code, label) in group.codes.iter().zip(&group.labels) {
            let domain: Domain = pop.domain(&Selector::InCategories {
                column: group.column.clone(),
                categories: vec![*code],
            })?;
            let m = domain.mask();
            let cells = [
                median_domain(&income, w, m, method),
                mean_domain(&income, w, m),
                median_domain(&networth, w, m, method),
                mean_domain(&networth, w, m),
            ];
            for (slot, v) in stats.iter_mut().zip(cells) {
                slot.push(cell(v)?.map(|v| v / THOUSANDS));
            }
            group_labels.push(label.clone());
            variables.push(group.column.clone());
        }
    }

    let mut columns = vec![
        Column::new("variable".into(), variables),
        Column::new("group".into(), group_labels),
    ];
    for (name, values) in DEMOGRAPHIC_COLUMNS.iter().zip(stats) {
        columns.push(Column::new((*name).into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

/// Percent change of every statistic from `base` to `later`, the two being
/// demographic tables over the same groups.
pub fn growth_table(base: &DataFrame, later: &DataFrame) -> Result<DataFrame> {
    if base.height() != later.height() {
        return Err(StatsError::LengthMismatch { expected: base.height(), got: later.height() });
    }
    let base_groups = base.column("group")?.str()?;
    let later_groups = later.column("group")?.str()?;
    if base_groups.iter().zip(later_groups.iter()).any(|(a, b)| a != b) {
        return Err(StatsError::InvalidInput("tables cover different groups".to_string()));
    }

    let mut columns = vec![base.column("variable")?.clone(), base.column("group")?.clone()];
    for name in DEMOGRAPHIC_COLUMNS {
        let b = base.column(name)?.f64()?;
        let l = later.column(name)?.f64()?;
        let growth: Vec<Option<f64>> = b
            .iter()
            .zip(l.iter())
            .map(|(b, l)| match (b, l) {
                (Some(b), Some(l)) if b != 0.0 => Some(100.0 * (l / b - 1.0)),
                _ => None,
            })
            .collect();
        columns.push(Column::new(name.into(), growth));
    }
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn population(scale: f64) -> Population {
        let mut df = df![
            "wgt" => [1.0, 1.0, 2.0, 1.0],
            "income" => [20000.0, 40000.0, 60000.0, 100000.0],
            "networth" => [-5000.0, 10000.0, 200000.0, 500000.0],
            "student_debt" => [10000.0, 0.0, 30000.0, 0.0],
            "student_debt_fed_current" => [10000.0, 0.0, 20000.0, 0.0],
            "student_debt_private_current" => [0.0, 0.0, 10000.0, 0.0],
            "idr" => [true, false, false, false],
            "age_cat_bulletin" => [0u32, 0, 2, 4],
            "edcl" => [2u32, 4, 4, 4],
            "racecl4" => [1u32, 2, 1, 1],
        ]
        .unwrap();
        let scaled = df.column("income").unwrap().f64().unwrap() * scale;
        df.with_column(scaled.into_series()).unwrap();
        Population::new(Wave(2019), df, "wgt").unwrap()
    }

    #[test]
    fn test_headline() {
        let pop = population(1.0);
        let h = headline(&pop, "student_debt", QuantileMethod::Interpolated).unwrap();
        // Debtors: 10000 (w 1) and 30000 (w 2)
        assert_relative_eq!(h.mean_debt_debtors, 70000.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(h.mean_debt, 70000.0 / 5.0, epsilon = 1e-9);
        assert_relative_eq!(h.incidence, 0.6, epsilon = 1e-12);
        assert_relative_eq!(h.debt_to_income, 70000.0 / 280000.0, epsilon = 1e-12);
        assert_eq!(h.federal_aggregate, Some(50000.0));
        assert_eq!(h.private_aggregate, Some(20000.0));
        assert_relative_eq!(h.federal_share().unwrap(), 50000.0 / 70000.0, epsilon = 1e-12);
        assert_relative_eq!(h.idr_share.unwrap(), 1.0 / 3.0, epsilon = 1e-12);

        let frame = h.to_frame().unwrap();
        assert_eq!(frame.height(), 10);
        assert_eq!(frame.width(), 3);
    }

    #[test]
    fn test_summary_table_in_thousands() {
        let pop = population(1.0);
        let t = summary_table(&pop, "student_debt", "student_debt_private_current", QuantileMethod::Interpolated)
            .unwrap();
        assert_eq!(t.height(), 4);
        let private: Vec<Option<f64>> = t.column("Private debtors").unwrap().f64().unwrap().iter().collect();
        assert_eq!(private[0], Some(60.0));
        assert_eq!(private[3], Some(200.0));
        let whole = t.column("Whole population").unwrap().f64().unwrap();
        assert_relative_eq!(whole.get(1).unwrap(), 56.0, epsilon = 1e-9);
    }

    #[test]
    fn test_demographic_and_growth() {
        let base = demographic_table(&population(1.0), &DemographicGroup::standard(), QuantileMethod::Interpolated)
            .unwrap();
        assert_eq!(base.height(), 6 + 4 + 4);
        let mean_income = base.column("Mean income").unwrap().f64().unwrap();
        // Age band "<35": two households with 20k and 40k
        assert_relative_eq!(mean_income.get(0).unwrap(), 30.0, epsilon = 1e-9);
        // No household in "35-44"
        assert_eq!(mean_income.get(1), None);

        let later = demographic_table(&population(1.1), &DemographicGroup::standard(), QuantileMethod::Interpolated)
            .unwrap();
        let growth = growth_table(&base, &later).unwrap();
        let g = growth.column("Mean income").unwrap().f64().unwrap();
        assert_relative_eq!(g.get(0).unwrap(), 10.0, epsilon = 1e-9);
        assert_eq!(g.get(1), None);
        let nw = growth.column("Mean net worth").unwrap().f64().unwrap();
        assert_relative_eq!(nw.get(0).unwrap(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_growth_rejects_mismatched_tables() {
        let base = demographic_table(&population(1.0), &[DemographicGroup::race()], QuantileMethod::Interpolated)
            .unwrap();
        let later = demographic_table(&population(1.0), &[DemographicGroup::education()], QuantileMethod::Interpolated)
            .unwrap();
        assert!(growth_table(&base, &later).is_err());
    }

    #[test]
    fn test_repayment_table() {
        let df = df![
            "wgt" => [1.0, 1.0],
            "student_debt_ll_current" => [100.0, 300.0],
            "student_debt_fed_current" => [100.0, 100.0],
            "student_debt_ll_private_current" => [0.0, 200.0],
        ]
        .unwrap();
        let pop = Population::new(Wave(2022), df, "wgt").unwrap();
        let mut extra = Vec::new();
        let statuses = std::iter::once(None).chain(NoPayReason::ALL.into_iter().map(Some));
        for status in statuses {
            let (total, fed) = match status {
                None => ([100.0, 200.0], [100.0, 0.0]),
                Some(NoPayReason::Forbearance) => ([100.0, 0.0], [100.0, 0.0]),
                Some(NoPayReason::CannotAfford) => ([0.0, 200.0], [0.0, 0.0]),
                Some(_) => ([0.0, 0.0], [0.0, 0.0]),
            };
            extra.push(Series::new(nopay_column(status, LoanSplit::Total).into(), &total));
            extra.push(Series::new(nopay_column(status, LoanSplit::Federal).into(), &fed));
            let private = [total[0] - fed[0], total[1] - fed[1]];
            extra.push(Series::new(nopay_column(status, LoanSplit::Private).into(), &private));
        }
        let pop = pop.with_columns(extra).unwrap();

        let t = repayment_table(&pop).unwrap();
        assert_eq!(t.height(), 3);
        assert_eq!(t.width(), 6);
        let nopay = t.column("Not in repayment").unwrap().f64().unwrap();
        assert_relative_eq!(nopay.get(0).unwrap(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(nopay.get(1).unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(nopay.get(2).unwrap(), 1.0, epsilon = 1e-12);
        let afford = t.column("Cannot afford").unwrap().f64().unwrap();
        assert_relative_eq!(afford.get(2).unwrap(), 1.0, epsilon = 1e-12);
    }
}
