// src/config.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use scf_rs::harmonize::{InflationFactors, LifetimeParams};
use scf_rs::{QuantileMethod, Wave};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `scf{year}.csv`, already harmonized.
    #[default]
    Harmonized,
    /// Full public and summary tables, harmonized on load.
    Raw,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub layout: Layout,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            layout: Layout::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_out_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_out_dir() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifetimeConfig {
    #[serde(default)]
    pub growth: f64,
    #[serde(default = "default_rates")]
    pub rates: Vec<f64>,
    #[serde(default = "default_end_age")]
    pub end_age: u32,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            growth: 0.0,
            rates: default_rates(),
            end_age: default_end_age(),
        }
    }
}

impl LifetimeConfig {
    pub fn params(&self) -> Vec<LifetimeParams> {
        self.rates
            .iter()
            .map(|&rate| LifetimeParams {
                growth: self.growth,
                rate,
                end_age: self.end_age,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InflationConfig {
    pub asset: f64,
    pub income: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_waves")]
    pub waves: Vec<u16>,
    #[serde(default = "default_bin_counts")]
    pub bin_counts: Vec<usize>,
    #[serde(default = "default_partition_vars")]
    pub partition_vars: Vec<String>,
    /// Partition variables the by-bin tables are reported for.
    #[serde(default = "default_report_by")]
    pub report_by: Vec<String>,
    #[serde(default = "default_report_bins")]
    pub report_bins: usize,
    #[serde(default = "default_quantile_method")]
    pub quantile_method: String,
    #[serde(default = "default_debt_variable")]
    pub debt_variable: String,
    #[serde(default = "default_private_variable")]
    pub private_variable: String,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub lifetime: LifetimeConfig,
    /// Per-wave overrides keyed by year, e.g. `[inflation.2019]`.
    #[serde(default)]
    pub inflation: BTreeMap<String, InflationConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_rates() -> Vec<f64> {
    vec![0.04, 0.12]
}

fn default_end_age() -> u32 {
    80
}

fn default_waves() -> Vec<u16> {
    vec![2019, 2022]
}

fn default_bin_counts() -> Vec<usize> {
    vec![5, 10]
}

fn default_partition_vars() -> Vec<String> {
    ["income", "networth", "percap_income", "percap_networth"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_report_by() -> Vec<String> {
    vec!["income".to_string(), "networth".to_string()]
}

fn default_report_bins() -> usize {
    5
}

fn default_quantile_method() -> String {
    "interpolated".to_string()
}

fn default_debt_variable() -> String {
    "student_debt".to_string()
}

fn default_private_variable() -> String {
    "student_debt_private_current".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            waves: default_waves(),
            bin_counts: default_bin_counts(),
            partition_vars: default_partition_vars(),
            report_by: default_report_by(),
            report_bins: default_report_bins(),
            quantile_method: default_quantile_method(),
            debt_variable: default_debt_variable(),
            private_variable: default_private_variable(),
            data: DataConfig::default(),
            output: OutputConfig::default(),
            lifetime: LifetimeConfig::default(),
            inflation: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.waves.is_empty() {
            bail!("at least one wave is required");
        }
        if self.bin_counts.iter().any(|&n| n == 0) {
            bail!("bin counts must be positive");
        }
        if !self.bin_counts.contains(&self.report_bins) {
            bail!("report_bins = {} is not one of bin_counts {:?}", self.report_bins, self.bin_counts);
        }
        self.method()?;
        self.inflation_factors()?;
        Ok(())
    }

    pub fn waves(&self) -> Vec<Wave> {
        self.waves.iter().map(|&y| Wave(y)).collect()
    }

    pub fn method(&self) -> Result<QuantileMethod> {
        self.quantile_method
            .parse::<QuantileMethod>()
            .with_context(|| format!("Unknown quantile_method '{}'", self.quantile_method))
    }

    pub fn inflation_factors(&self) -> Result<Vec<(Wave, InflationFactors)>> {
        self.inflation
            .iter()
            .map(|(year, f)| {
                let year: u16 = year
                    .parse()
                    .with_context(|| format!("inflation key '{}' is not a year", year))?;
                Ok((Wave(year), InflationFactors::new(f.asset, f.income)))
            })
            .collect()
    }
}
