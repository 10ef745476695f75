// src/python.rs
use ndarray::Array1;
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1};
use polars::prelude::*;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::error::StatsError;
use crate::estimation::{self, QuantileMethod};
use crate::partition;
use crate::population::{Population, Selector, Wave};
use crate::tables::{self, BinTable, Measure};

fn to_py_err(e: StatsError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(e.to_string())
}

fn parse_method(method: Option<String>) -> PyResult<QuantileMethod> {
    match method {
        Some(m) => m
            .parse()
            .map_err(|e: StatsError| PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())),
        None => Ok(QuantileMethod::default()),
    }
}

// ============================================================================
// Estimators
// ============================================================================

#[pyfunction]
#[pyo3(signature = (values, weights, p, method=None))]
fn weighted_quantile(
    values: PyReadonlyArray1<f64>,
    weights: PyReadonlyArray1<f64>,
    p: f64,
    method: Option<String>,
) -> PyResult<f64> {
    let method = parse_method(method)?;
    let (v, w) = (values.as_array().to_vec(), weights.as_array().to_vec());
    estimation::weighted_quantile_with(&v, &w, p, method).map_err(to_py_err)
}

#[pyfunction]
fn weighted_mean(values: PyReadonlyArray1<f64>, weights: PyReadonlyArray1<f64>) -> PyResult<f64> {
    let (v, w) = (values.as_array().to_vec(), weights.as_array().to_vec());
    estimation::weighted_mean(&v, &w).map_err(to_py_err)
}

#[pyfunction]
fn weighted_aggregate(values: PyReadonlyArray1<f64>, weights: PyReadonlyArray1<f64>) -> PyResult<f64> {
    let (v, w) = (values.as_array().to_vec(), weights.as_array().to_vec());
    estimation::weighted_aggregate(&v, &w).map_err(to_py_err)
}

// ============================================================================
// Partitions
// ============================================================================

#[pyfunction]
#[pyo3(signature = (values, weights, bin_count, method=None))]
fn build_partition(
    py: Python<'_>,
    values: PyReadonlyArray1<f64>,
    weights: PyReadonlyArray1<f64>,
    bin_count: usize,
    method: Option<String>,
) -> PyResult<Py<PyArray1<f64>>> {
    let method = parse_method(method)?;
    let (v, w) = (values.as_array().to_vec(), weights.as_array().to_vec());
    let p = partition::build_partition_with(&v, &w, bin_count, method).map_err(to_py_err)?;
    let result = Array1::from_vec(p.boundaries().to_vec());
    Ok(result.into_pyarray(py).to_owned().into())
}

#[pyfunction]
fn assign_bins(values: PyReadonlyArray1<f64>, boundaries: PyReadonlyArray1<f64>) -> PyResult<Vec<u32>> {
    let (v, b) = (values.as_array().to_vec(), boundaries.as_array().to_vec());
    partition::assign_bins(&v, &b).map_err(to_py_err)
}

// ============================================================================
// Tables
// ============================================================================

/// Attach `{by}_cat{n}` to `data` from a partition of the full frame, then
/// compute the by-bin table for `domain_col > 0` (or everyone).
#[pyfunction]
#[pyo3(signature = (data, variable, by, weight_col, bin_count=5, domain_col=None, measure=None, method=None))]
fn by_bin(
    data: PyDataFrame,
    variable: String,
    by: String,
    weight_col: String,
    bin_count: usize,
    domain_col: Option<String>,
    measure: Option<String>,
    method: Option<String>,
) -> PyResult<PyDataFrame> {
    let method = parse_method(method)?;
    let measure: Measure = match measure {
        Some(m) => m.parse().map_err(to_py_err)?,
        None => Measure::default(),
    };
    let df: DataFrame = data.into();
    let pop = Population::new(Wave(0), df, &weight_col).map_err(to_py_err)?;
    let p = partition::partition_population(&pop, &by, bin_count, method).map_err(to_py_err)?;
    let pop = pop.with_bins(&by, &p).map_err(to_py_err)?;

    let table = BinTable {
        variable,
        by,
        bin_count,
        domain: domain_col.map_or(Selector::All, Selector::Positive),
        measure,
    };
    let result = tables::by_bin(&[&pop], &table, method).map_err(to_py_err)?;
    Ok(PyDataFrame(result))
}

#[pymodule]
fn _internal(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Estimators
    m.add_function(wrap_pyfunction!(weighted_quantile, m)?)?;
    m.add_function(wrap_pyfunction!(weighted_mean, m)?)?;
    m.add_function(wrap_pyfunction!(weighted_aggregate, m)?)?;

    // Partitions
    m.add_function(wrap_pyfunction!(build_partition, m)?)?;
    m.add_function(wrap_pyfunction!(assign_bins, m)?)?;

    // Tables
    m.add_function(wrap_pyfunction!(by_bin, m)?)?;
    Ok(())
}
