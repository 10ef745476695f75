// src/harmonize/mod.rs
//! Turn one wave's full public (loan-level) table and its summary table into a
//! single harmonized population in current dollars.

pub mod lifetime;

pub use lifetime::{lifetime_column_name, with_lifetime_wealth, LifetimeParams};

use std::collections::HashMap;

use log::{debug, info};
use polars::prelude::*;

use crate::error::{Result, StatsError};
use crate::partition::{age_brackets, bulletin_age_brackets};
use crate::population::{Population, Wave, WEIGHT_COL};

// ============================================================================
// Question codes
// ============================================================================

/// Amount still owed on each of the first six loans, then "all other loans".
pub const BALANCE_CODES: [&str; 7] = ["x7824", "x7847", "x7870", "x7924", "x7947", "x7970", "x7179"];
/// Payment set by income (IBR, PAYE, ICR). 1 = yes.
pub const IDR_CODES: [&str; 6] = ["x9306", "x9307", "x9308", "x9309", "x9310", "x9311"];
/// Federal student loan (Stafford, Direct, PLUS, Perkins). 1 = yes.
pub const FEDERAL_CODES: [&str; 6] = ["x7879", "x7884", "x7889", "x7894", "x7899", "x7994"];
/// Making payments on this loan now. 5 = no.
pub const PAYNOW_CODES: [&str; 6] = ["x7806", "x7829", "x7852", "x7906", "x7929", "x7952"];
/// Reason for not making payments, see [`NoPayReason`].
pub const WHYNOPAY_CODES: [&str; 6] = ["x9300", "x9301", "x9302", "x9303", "x9304", "x9305"];
pub const WAGE_CODE: &str = "x5702";
/// Full-public weight; five implicates, so divide by 5 to match `wgt`.
pub const FULL_WEIGHT_CODE: &str = "x42001";
pub const KEY_COLS: [&str; 2] = ["yy1", "y1"];

const YES: f64 = 1.0;
const NOT_PAYING: f64 = 5.0;
const IMPLICATES: f64 = 5.0;

/// Why a loan is not being repaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoPayReason {
    Forbearance,
    Forgiveness,
    CannotAfford,
    GracePeriod,
}

impl NoPayReason {
    pub const ALL: [NoPayReason; 4] = [
        NoPayReason::Forbearance,
        NoPayReason::Forgiveness,
        NoPayReason::CannotAfford,
        NoPayReason::GracePeriod,
    ];

    pub fn code(self) -> f64 {
        match self {
            NoPayReason::Forbearance => 1.0,
            NoPayReason::Forgiveness => 2.0,
            NoPayReason::CannotAfford => 3.0,
            NoPayReason::GracePeriod => 4.0,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            NoPayReason::Forbearance => "forbear",
            NoPayReason::Forgiveness => "forgive",
            NoPayReason::CannotAfford => "noafford",
            NoPayReason::GracePeriod => "grace",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NoPayReason::Forbearance => "Forbearance",
            NoPayReason::Forgiveness => "Forgiveness program",
            NoPayReason::CannotAfford => "Cannot afford",
            NoPayReason::GracePeriod => "Grace period",
        }
    }
}

/// Federal / private split of a loan-level balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoanSplit {
    Total,
    Federal,
    Private,
}

impl LoanSplit {
    pub const ALL: [LoanSplit; 3] = [LoanSplit::Total, LoanSplit::Federal, LoanSplit::Private];

    pub fn label(self) -> &'static str {
        match self {
            LoanSplit::Total => "Total",
            LoanSplit::Federal => "Federal",
            LoanSplit::Private => "Private",
        }
    }

    fn infix(self) -> &'static str {
        match self {
            LoanSplit::Total => "",
            LoanSplit::Federal => "fed_",
            LoanSplit::Private => "private_",
        }
    }

    /// Loan-level balance column this split is a share of.
    pub fn balance_column(self) -> &'static str {
        match self {
            LoanSplit::Total => "student_debt_ll_current",
            LoanSplit::Federal => "student_debt_fed_current",
            LoanSplit::Private => "student_debt_ll_private_current",
        }
    }
}

/// Column holding balances not in repayment, in total or for one reason.
pub fn nopay_column(reason: Option<NoPayReason>, split: LoanSplit) -> String {
    let status = reason.map_or("nopay", NoPayReason::key);
    format!("student_debt_{}_{}current", status, split.infix())
}

// ============================================================================
// Inflation
// ============================================================================

/// Factors bringing a wave's nominal dollars into current dollars. Assets and
/// debts are measured in the survey year, income in the year before.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InflationFactors {
    pub asset: f64,
    pub income: f64,
}

impl InflationFactors {
    pub fn new(asset: f64, income: f64) -> Self {
        Self { asset, income }
    }

    /// Published factors for the waves this crate knows about.
    pub fn published(wave: Wave) -> Option<Self> {
        match wave.year() {
            2019 => Some(Self::new(1.1592, 1.1802)),
            2022 => Some(Self::new(1.0, 1.0809)),
            _ => None,
        }
    }
}

pub fn published_factors() -> HashMap<Wave, InflationFactors> {
    [Wave(2019), Wave(2022)]
        .into_iter()
        .filter_map(|w| InflationFactors::published(w).map(|f| (w, f)))
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

pub fn lowercase_columns(mut frame: DataFrame) -> Result<DataFrame> {
    let names: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|n| n.to_lowercase())
        .collect();
    frame.set_column_names(names)?;
    Ok(frame)
}

/// Column as `f64` with missing answers read as 0 (inapplicable).
fn answers(frame: &DataFrame, code: &str) -> Result<Vec<f64>> {
    let col = frame.column(code)?.cast(&DataType::Float64)?;
    Ok(col.f64()?.iter().map(|v| v.unwrap_or(0.0)).collect())
}

fn answer_block<const N: usize>(frame: &DataFrame, codes: &[&str; N]) -> Result<Vec<Vec<f64>>> {
    codes.iter().map(|c| answers(frame, c)).collect()
}

fn keys(frame: &DataFrame) -> Result<Vec<(i64, i64)>> {
    let yy1 = frame.column(KEY_COLS[0])?.cast(&DataType::Int64)?;
    let y1 = frame.column(KEY_COLS[1])?.cast(&DataType::Int64)?;
    yy1.i64()?
        .iter()
        .zip(y1.i64()?.iter())
        .enumerate()
        .map(|(index, pair)| match pair {
            (Some(a), Some(b)) => Ok((a, b)),
            (None, _) => Err(StatsError::MissingValue { column: KEY_COLS[0].to_string(), index }),
            (_, None) => Err(StatsError::MissingValue { column: KEY_COLS[1].to_string(), index }),
        })
        .collect()
}

// ============================================================================
// Loan-level derivations
// ============================================================================

/// Derived loan-level columns for every row of the full public table.
pub fn derive_loan_level(full: &DataFrame, factors: InflationFactors) -> Result<DataFrame> {
    let n = full.height();
    let balances = answer_block(full, &BALANCE_CODES)?;
    let idr_flags = answer_block(full, &IDR_CODES)?;
    let federal = answer_block(full, &FEDERAL_CODES)?;
    let paynow = answer_block(full, &PAYNOW_CODES)?;
    let whynopay = answer_block(full, &WHYNOPAY_CODES)?;
    let wage = answers(full, WAGE_CODE)?;
    let full_weight = answers(full, FULL_WEIGHT_CODE)?;

    let mut sd_full = vec![0.0; n];
    let mut sd_ll = vec![0.0; n];
    let mut sd_fed = vec![0.0; n];
    let mut idr = vec![false; n];
    // [reason or total][split]: index 0 is all loans not being paid
    let mut nopay = vec![[vec![0.0; n], vec![0.0; n]]; NoPayReason::ALL.len() + 1];

    for r in 0..n {
        for (i, bal) in balances.iter().enumerate() {
            sd_full[r] += bal[r];
            if i >= BALANCE_CODES.len() - 1 {
                continue;
            }
            let b = bal[r];
            let is_fed = federal[i][r] == YES;
            sd_ll[r] += b;
            if is_fed {
                sd_fed[r] += b;
            }
            if idr_flags[i][r] == YES {
                idr[r] = true;
            }
            let mut add = |slot: usize| {
                nopay[slot][0][r] += b;
                if is_fed {
                    nopay[slot][1][r] += b;
                }
            };
            if paynow[i][r] == NOT_PAYING {
                add(0);
            }
            if let Some(k) = NoPayReason::ALL.iter().position(|x| x.code() == whynopay[i][r]) {
                add(1 + k);
            }
        }
    }

    let scale = |v: &[f64], f: f64| -> Vec<f64> { v.iter().map(|x| x * f).collect() };
    let a = factors.asset;
    let full_cur = scale(&sd_full, a);
    let ll_cur = scale(&sd_ll, a);
    let fed_cur = scale(&sd_fed, a);
    let private_cur: Vec<f64> = full_cur.iter().zip(&fed_cur).map(|(t, f)| t - f).collect();
    let ll_private_cur: Vec<f64> = ll_cur.iter().zip(&fed_cur).map(|(t, f)| t - f).collect();
    let wage_cur: Vec<f64> = wage.iter().map(|w| w.max(0.0) * factors.income).collect();
    let wgt_full: Vec<f64> = full_weight.iter().map(|w| w / IMPLICATES).collect();

    let mut columns = vec![
        Series::new("student_debt_full_current".into(), full_cur),
        Series::new("student_debt_ll_current".into(), ll_cur),
        Series::new("student_debt_fed_current".into(), fed_cur),
        Series::new("student_debt_private_current".into(), private_cur),
        Series::new("student_debt_ll_private_current".into(), ll_private_cur),
        Series::new("idr".into(), idr),
        Series::new("wageinc_full_current".into(), wage_cur),
        Series::new("wgt_full".into(), wgt_full),
    ];
    let statuses = std::iter::once(None).chain(NoPayReason::ALL.into_iter().map(Some));
    for (status, [total, fed]) in statuses.zip(nopay) {
        let total = scale(&total, a);
        let fed = scale(&fed, a);
        let private: Vec<f64> = total.iter().zip(&fed).map(|(t, f)| t - f).collect();
        columns.push(Series::new(nopay_column(status, LoanSplit::Total).into(), total));
        columns.push(Series::new(nopay_column(status, LoanSplit::Federal).into(), fed));
        columns.push(Series::new(nopay_column(status, LoanSplit::Private).into(), private));
    }

    let mut kept: Vec<&str> = KEY_COLS.to_vec();
    kept.push(FULL_WEIGHT_CODE);
    kept.extend(BALANCE_CODES);
    kept.extend(IDR_CODES);
    kept.extend(FEDERAL_CODES);
    kept.extend(PAYNOW_CODES);
    kept.extend(WHYNOPAY_CODES);
    kept.push(WAGE_CODE);

    let mut out = full.select(kept)?;
    for s in columns {
        out.with_column(s)?;
    }
    Ok(out)
}

/// Rows of `left` matched with rows of `right` on the household and implicate
/// keys. Unmatched rows on either side are dropped.
pub fn join_on_keys(left: &DataFrame, right: &DataFrame) -> Result<DataFrame> {
    let mut lookup: HashMap<(i64, i64), IdxSize> = HashMap::new();
    for (i, k) in keys(right)?.into_iter().enumerate() {
        lookup.entry(k).or_insert(i as IdxSize);
    }

    let mut left_idx: Vec<IdxSize> = Vec::new();
    let mut right_idx: Vec<IdxSize> = Vec::new();
    for (i, k) in keys(left)?.iter().enumerate() {
        if let Some(&j) = lookup.get(k) {
            left_idx.push(i as IdxSize);
            right_idx.push(j);
        }
    }

    let left_rows = left.take(&IdxCa::from_vec("idx".into(), left_idx))?;
    let extra: Vec<String> = right
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .filter(|n| left.get_column_index(n).is_none())
        .collect();
    let right_rows = right.select(extra)?.take(&IdxCa::from_vec("idx".into(), right_idx))?;
    Ok(left_rows.hstack(right_rows.get_columns())?)
}

// ============================================================================
// Summary-level derivations
// ============================================================================

/// Debt categories with an incidence flag `has_{category}`.
pub const DEBT_CATEGORIES: [&str; 4] = ["student_debt", "res_debt", "ccbal", "veh_inst"];
/// Variables with a per-capita counterpart `percap_{var}`.
pub const PERCAP_VARS: [&str; 5] = ["student_debt", "wageinc", "income", "asset", "networth"];

/// Derived analysis variables on a joined wave population.
pub fn derive_summary(pop: &Population) -> Result<Population> {
    let n = pop.height();
    let combine = |cols: &[&str], f: &dyn Fn(&[f64]) -> f64| -> Result<Vec<f64>> {
        let vals: Vec<Vec<f64>> = cols.iter().map(|c| pop.values(c)).collect::<Result<_>>()?;
        Ok((0..n)
            .map(|r| {
                let row: Vec<f64> = vals.iter().map(|v| v[r]).collect();
                f(&row)
            })
            .collect())
    };

    let student_debt = pop.values("edn_inst")?;
    let res_debt = combine(&["nh_mort", "heloc", "resdbt"], &|r| r.iter().sum())?;
    let debt = pop.values("debt")?;
    let nonres: Vec<f64> = debt.iter().zip(&res_debt).map(|(d, r)| d - r).collect();
    let nonres_nonsl: Vec<f64> = nonres.iter().zip(&student_debt).map(|(d, s)| d - s).collect();
    let inc_networth = combine(&["income", "networth"], &|r| r[0] + r[1])?;

    let age = pop.column("age")?;
    let mut columns = vec![
        Series::new("student_debt".into(), student_debt.clone()),
        Series::new("res_debt".into(), res_debt.clone()),
        Series::new("nonres_debt".into(), nonres),
        Series::new("nonres_nonsl_debt".into(), nonres_nonsl),
        age_brackets().assign_chunked(&age, "age_cat").into_series(),
        bulletin_age_brackets()
            .assign_chunked(&age, "age_cat_bulletin")
            .into_series(),
        Series::new("inc_networth".into(), inc_networth.clone()),
    ];

    for cat in DEBT_CATEGORIES {
        let vals = match cat {
            "student_debt" => student_debt.clone(),
            "res_debt" => res_debt.clone(),
            other => pop.values(other)?,
        };
        let flags: Vec<bool> = vals.iter().map(|v| *v > 0.0).collect();
        columns.push(Series::new(format!("has_{}", cat).into(), flags));
    }

    let married = pop.values("married")?;
    let share: Vec<f64> = married
        .iter()
        .map(|m| if *m == 1.0 { 0.5 } else { 1.0 })
        .collect();
    for var in PERCAP_VARS {
        let vals = if var == "student_debt" { student_debt.clone() } else { pop.values(var)? };
        let percap: Vec<f64> = vals.iter().zip(&share).map(|(v, s)| v * s).collect();
        columns.push(Series::new(format!("percap_{}", var).into(), percap));
    }

    let networth = pop.values("networth")?;
    let cancel = |base: &[f64]| -> Vec<f64> { base.iter().zip(&student_debt).map(|(b, s)| b + s).collect() };
    columns.push(Series::new("networth_cancel".into(), cancel(&networth)));
    columns.push(Series::new("inc_networth_cancel".into(), cancel(&inc_networth)));

    debug!("wave {}: {} derived summary columns", pop.wave(), columns.len());
    pop.with_columns(columns)
}

/// Harmonize one wave.
///
/// # Arguments
/// * `wave` - Survey wave both tables belong to
/// * `full` - Full public table (`p{yy}i6`), one row per household implicate
/// * `summary` - Summary extract (`rscfp{year}`), already in current dollars
/// * `factors` - Inflation factors for the full public table's nominal values
pub fn harmonize(
    wave: Wave,
    full: DataFrame,
    summary: DataFrame,
    factors: InflationFactors,
) -> Result<Population> {
    let full = lowercase_columns(full)?;
    let summary = lowercase_columns(summary)?;

    let loans = derive_loan_level(&full, factors)?;
    let joined = join_on_keys(&loans, &summary)?;
    info!(
        "wave {}: matched {} of {} loan-level rows with the summary table",
        wave,
        joined.height(),
        loans.height()
    );

    let pop = Population::from_raw(wave, joined, WEIGHT_COL)?;
    derive_summary(&pop)
}

// ============================================================================
// Tests
// ============================================================================
