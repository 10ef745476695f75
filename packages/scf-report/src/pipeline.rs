// src/pipeline.rs
//! Load waves, derive lifetime wealth, attach full-population partitions and
//! compute every report table.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use polars::prelude::*;
use rayon::prelude::*;
use serde_json::json;

use scf_rs::harmonize::{lifetime_column_name, with_lifetime_wealth};
use scf_rs::partition::build_partitions;
use scf_rs::population::{CachedSource, CsvSource, RawCsvSource};
use scf_rs::tables::{
    by_bin, demographic_table, growth_table, headline, incidence_by_bin, mean_median_ratio,
    repayment_table, summary_table, BinTable, DemographicGroup, Headline, Measure,
};
use scf_rs::{Population, PopulationSource, Selector};

use crate::config::{Config, Layout};

/// Computed tables, in the order they were produced.
#[derive(Debug, Default)]
pub struct Report {
    pub tables: Vec<(String, DataFrame)>,
    pub headlines: Vec<Headline>,
    pub skipped: Vec<String>,
}

impl Report {
    /// Keep `table` under `name`, or log and skip it.
    fn add(&mut self, name: String, table: scf_rs::Result<DataFrame>) {
        match table {
            Ok(df) => self.tables.push((name, df)),
            Err(e) => {
                warn!("skipping table {}: {}", name, e);
                self.skipped.push(name);
            }
        }
    }
}

fn source(config: &Config) -> Result<Box<dyn PopulationSource>> {
    Ok(match config.data.layout {
        Layout::Harmonized => Box::new(CachedSource::new(CsvSource::new(&config.data.dir))),
        Layout::Raw => {
            let mut raw = RawCsvSource::new(&config.data.dir);
            for (wave, factors) in config.inflation_factors()? {
                raw = raw.with_factors(wave, factors);
            }
            Box::new(CachedSource::new(raw))
        }
    })
}

/// Waves with lifetime wealth and every configured partition attached.
pub fn prepare(config: &Config, source: &dyn PopulationSource) -> Result<Vec<Population>> {
    let method = config.method()?;
    let loaded: Vec<Arc<Population>> = config
        .waves()
        .into_iter()
        .map(|wave| source.load(wave).with_context(|| format!("Failed to load wave {}", wave)))
        .collect::<Result<_>>()?;

    let params = config.lifetime.params();
    let with_lifetime: Vec<Population> = loaded
        .par_iter()
        .map(|pop| {
            let mut pop = Population::clone(pop);
            for p in &params {
                if pop.has_column(&lifetime_column_name(p)) {
                    continue;
                }
                pop = with_lifetime_wealth(&pop, p, method)?;
            }
            Ok(pop)
        })
        .collect::<scf_rs::Result<_>>()
        .context("Failed to compute lifetime wealth")?;

    let mut variables = config.partition_vars.clone();
    for p in &params {
        let name = lifetime_column_name(p);
        variables.push(format!("percap_{}", name));
        variables.push(name);
    }

    let refs: Vec<&Population> = with_lifetime.iter().collect();
    let partitions = build_partitions(&refs, &variables, &config.bin_counts, method)
        .context("Failed to build partitions")?;
    info!("built {} partitions over {} waves", partitions.len(), refs.len());

    with_lifetime
        .iter()
        .map(|pop| {
            pop.with_partition_set(&partitions)
                .with_context(|| format!("Failed to attach bins to wave {}", pop.wave()))
        })
        .collect()
}

/// Every report table over the prepared waves.
pub fn compute(config: &Config, waves: &[Population]) -> Result<Report> {
    let method = config.method()?;
    let refs: Vec<&Population> = waves.iter().collect();
    let debt = config.debt_variable.as_str();
    let n = config.report_bins;
    let mut report = Report::default();

    for pop in waves {
        match headline(pop, debt, method) {
            Ok(h) => {
                report.add(format!("headline_{}", pop.wave()), h.to_frame());
                report.headlines.push(h);
            }
            Err(e) => {
                warn!("skipping headline for wave {}: {}", pop.wave(), e);
                report.skipped.push(format!("headline_{}", pop.wave()));
            }
        }
        report.add(
            format!("summary_{}", pop.wave()),
            summary_table(pop, debt, &config.private_variable, method),
        );
        report.add(format!("repayment_{}", pop.wave()), repayment_table(pop));
    }

    let debt_vars = [config.debt_variable.clone(), config.private_variable.clone()];
    for by in &config.report_by {
        for variable in &debt_vars {
            for domain in [Selector::All, Selector::debtors(debt)] {
                let table = BinTable {
                    variable: variable.clone(),
                    by: by.clone(),
                    bin_count: n,
                    domain,
                    measure: Measure::Mean,
                };
                report.add(table.name(), by_bin(&refs, &table, method));
            }
            report.add(
                format!("{}_incidence_by_{}_cat{}", variable, by, n),
                incidence_by_bin(&refs, variable, by, n),
            );
        }
        report.add(
            format!("{}_mean_to_median_by_{}_cat{}", debt, by, n),
            mean_median_ratio(&refs, debt, by, n, method),
        );
    }

    let groups = DemographicGroup::standard();
    let mut demographic = Vec::new();
    for pop in waves {
        let name = format!("demographic_{}", pop.wave());
        match demographic_table(pop, &groups, method) {
            Ok(df) => {
                demographic.push(df.clone());
                report.tables.push((name, df));
            }
            Err(e) => report.add(name, Err(e)),
        }
    }
    if waves.len() > 1 && demographic.len() == waves.len() {
        if let (Some(first), Some(last)) = (demographic.first(), demographic.last()) {
            report.add("demographic_growth".to_string(), growth_table(first, last));
        }
    }

    info!("computed {} tables, skipped {}", report.tables.len(), report.skipped.len());
    Ok(report)
}

pub fn run(config: &Config) -> Result<Report> {
    let source = source(config)?;
    let waves = prepare(config, source.as_ref())?;
    compute(config, &waves)
}

/// One CSV per table plus `headline.json`.
pub fn write(report: &mut Report, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    for (name, df) in report.tables.iter_mut() {
        let path = out_dir.join(format!("{}.csv", name));
        let mut file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let headlines: Vec<serde_json::Value> = report
        .headlines
        .iter()
        .map(|h| {
            json!({
                "wave": h.wave.year(),
                "median_debt_debtors": h.median_debt_debtors,
                "mean_debt": h.mean_debt,
                "mean_debt_debtors": h.mean_debt_debtors,
                "incidence": h.incidence,
                "debt_to_income": h.debt_to_income,
                "debt_to_networth": h.debt_to_networth,
                "federal_aggregate": h.federal_aggregate,
                "private_aggregate": h.private_aggregate,
                "federal_share": h.federal_share(),
                "idr_share": h.idr_share,
            })
        })
        .collect();
    let path = out_dir.join("headline.json");
    fs::write(&path, serde_json::to_string_pretty(&headlines)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("wrote {} tables to {}", report.tables.len(), out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scf_rs::population::FrameSource;
    use scf_rs::Wave;

    /// A synthetic wave: households aged 26 to 70 with income rising by age.
    fn wave(year: u16, scale: f64) -> Population {
        let n = 90;
        let ages: Vec<f64> = (0..n).map(|i| 26.0 + (i % 45) as f64).collect();
        let income: Vec<f64> = ages.iter().enumerate().map(|(i, a)| scale * (a * 1000.0 + i as f64)).collect();
        let networth: Vec<f64> = (0..n).map(|i| scale * ((i * 37) % 90) as f64 * 1000.0).collect();
        let debt: Vec<f64> = (0..n).map(|i| if i % 3 == 0 { 5000.0 + i as f64 } else { 0.0 }).collect();
        let private: Vec<f64> = debt.iter().map(|d| d / 4.0).collect();
        let age_cat = scf_rs::partition::age_brackets()
            .assign_chunked(&Float64Chunked::from_vec("age".into(), ages.clone()), "age_cat");
        let bulletin = scf_rs::partition::bulletin_age_brackets()
            .assign_chunked(&Float64Chunked::from_vec("age".into(), ages.clone()), "age_cat_bulletin");
        let edcl: Vec<u32> = (0..n).map(|i| 1 + (i % 4) as u32).collect();
        let race: Vec<u32> = (0..n).map(|i| 1 + ((i / 3) % 4) as u32).collect();
        let mut df = df![
            "wgt" => vec![1.0; n],
            "age" => ages,
            "income" => income.clone(),
            "percap_income" => income,
            "networth" => networth.clone(),
            "percap_networth" => networth,
            "student_debt" => debt,
            "student_debt_private_current" => private,
            "edcl" => edcl,
            "racecl4" => race,
        ]
        .unwrap();
        df.with_column(age_cat.into_series()).unwrap();
        df.with_column(bulletin.into_series()).unwrap();
        Population::new(Wave(year), df, "wgt").unwrap()
    }

    #[test]
    fn test_pipeline_over_frames() {
        let mut source = FrameSource::new();
        source.insert(wave(2019, 1.0));
        source.insert(wave(2022, 1.1));
        let config = Config::default();

        let waves = prepare(&config, &source).unwrap();
        assert_eq!(waves.len(), 2);
        assert!(waves[0].has_column("lt_wealth04_cat5"));
        assert!(waves[0].has_column("percap_lt_wealth012_cat10"));
        assert!(waves[1].has_column("income_cat10"));
        assert!(waves[0].has_column("lt_wealth04_cancel"));

        let report = compute(&config, &waves).unwrap();
        let names: Vec<&str> = report.tables.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"summary_2019"));
        assert!(names.contains(&"student_debt_mean_by_income_cat5_debtors"));
        assert!(names.contains(&"student_debt_incidence_by_networth_cat5"));
        assert!(names.contains(&"demographic_growth"));
        assert_eq!(report.headlines.len(), 2);
        // No loan-level repayment columns in these frames
        assert!(report.skipped.contains(&"repayment_2019".to_string()));

        let (_, table) = report
            .tables
            .iter()
            .find(|(n, _)| n == "student_debt_mean_by_income_cat5_all")
            .unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(table.width(), 6);
    }

    #[test]
    fn test_write_outputs() {
        let mut source = FrameSource::new();
        source.insert(wave(2019, 1.0));
        let config = Config { waves: vec![2019], ..Config::default() };
        let waves = prepare(&config, &source).unwrap();
        let mut report = compute(&config, &waves).unwrap();

        let dir = std::env::temp_dir().join(format!("scf-report-{}", std::process::id()));
        write(&mut report, &dir).unwrap();
        assert!(dir.join("summary_2019.csv").exists());
        let json = fs::read_to_string(dir.join("headline.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["wave"].as_u64(), Some(2019));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_prebinned_wave_is_rebinned() {
        // Cleaned files already carry labels from an earlier run
        let pop = wave(2019, 1.0);
        let stale = UInt32Chunked::from_vec("income_cat5".into(), vec![0; pop.height()]);
        let pop = pop.with_columns(vec![stale.into_series()]).unwrap();
        let mut source = FrameSource::new();
        source.insert(pop);
        let config = Config { waves: vec![2019], ..Config::default() };

        let waves = prepare(&config, &source).unwrap();
        let labels = waves[0].values("income_cat5").unwrap();
        assert_eq!(labels.iter().cloned().fold(f64::MIN, f64::max), 4.0);
        assert_eq!(labels.iter().filter(|&&l| l == 0.0).count(), 18);
    }
}
