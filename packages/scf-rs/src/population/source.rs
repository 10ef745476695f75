// src/population/source.rs

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::info;
use polars::prelude::*;

use super::{Population, Wave, WEIGHT_COL};
use crate::error::{Result, StatsError};
use crate::harmonize::{harmonize, lowercase_columns, published_factors, InflationFactors};

/// Where wave populations come from.
pub trait PopulationSource {
    fn load(&self, wave: Wave) -> Result<Arc<Population>>;
}

pub fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(StatsError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )));
    }
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(frame)
}

// ============================================================================
// Harmonized files
// ============================================================================

/// Reads already-harmonized `scf{year}.csv` files.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, wave: Wave) -> PathBuf {
        self.dir.join(format!("scf{}.csv", wave.year()))
    }
}

impl PopulationSource for CsvSource {
    fn load(&self, wave: Wave) -> Result<Arc<Population>> {
        let path = self.path(wave);
        let frame = lowercase_columns(read_csv(&path)?)?;
        let pop = Population::from_raw(wave, frame, WEIGHT_COL)?;
        info!("wave {}: loaded {} households from {}", wave, pop.height(), path.display());
        Ok(Arc::new(pop))
    }
}

// ============================================================================
// Raw files
// ============================================================================

/// Reads the full public (`p{yy}i6.csv`) and summary (`rscfp{year}.csv`)
/// tables of a wave and harmonizes them.
#[derive(Debug, Clone)]
pub struct RawCsvSource {
    dir: PathBuf,
    factors: HashMap<Wave, InflationFactors>,
}

impl RawCsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            factors: published_factors(),
        }
    }

    pub fn with_factors(mut self, wave: Wave, factors: InflationFactors) -> Self {
        self.factors.insert(wave, factors);
        self
    }

    pub fn full_path(&self, wave: Wave) -> PathBuf {
        self.dir.join(format!("p{}i6.csv", wave.short_year()))
    }

    pub fn summary_path(&self, wave: Wave) -> PathBuf {
        self.dir.join(format!("rscfp{}.csv", wave.year()))
    }
}

impl PopulationSource for RawCsvSource {
    fn load(&self, wave: Wave) -> Result<Arc<Population>> {
        let factors = self.factors.get(&wave).copied().ok_or_else(|| {
            StatsError::InvalidInput(format!("no inflation factors for wave {}", wave))
        })?;
        let full = read_csv(&self.full_path(wave))?;
        let summary = read_csv(&self.summary_path(wave))?;
        let pop = harmonize(wave, full, summary, factors)?;
        info!("wave {}: harmonized {} households", wave, pop.height());
        Ok(Arc::new(pop))
    }
}

// ============================================================================
// In-memory and cached sources
// ============================================================================

/// Populations handed over directly, e.g. from Python.
#[derive(Debug, Default)]
pub struct FrameSource {
    populations: HashMap<Wave, Arc<Population>>,
}

impl FrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, population: Population) {
        self.populations.insert(population.wave(), Arc::new(population));
    }
}

impl PopulationSource for FrameSource {
    fn load(&self, wave: Wave) -> Result<Arc<Population>> {
        self.populations
            .get(&wave)
            .cloned()
            .ok_or_else(|| StatsError::InvalidInput(format!("wave {} not loaded", wave)))
    }
}

/// Loads each wave from `inner` at most once per process.
#[derive(Debug)]
pub struct CachedSource<S> {
    inner: S,
    cache: Mutex<HashMap<Wave, Arc<Population>>>,
}

impl<S: PopulationSource> CachedSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().map_or(0, |c| c.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Wave, Arc<Population>>>> {
        self.cache
            .lock()
            .map_err(|_| StatsError::InvalidInput("population cache lock poisoned".to_string()))
    }
}

impl<S: PopulationSource> PopulationSource for CachedSource<S> {
    /// The lock is not held while `inner` loads. Concurrent first loads of
    /// the same wave all receive the population stored first.
    fn load(&self, wave: Wave) -> Result<Arc<Population>> {
        if let Some(pop) = self.lock()?.get(&wave) {
            return Ok(Arc::clone(pop));
        }
        let pop = self.inner.load(wave)?;
        let mut cache = self.lock()?;
        Ok(Arc::clone(cache.entry(wave).or_insert(pop)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs::File;

    struct Counting {
        calls: Cell<usize>,
    }

    impl PopulationSource for Counting {
        fn load(&self, wave: Wave) -> Result<Arc<Population>> {
            self.calls.set(self.calls.get() + 1);
            let df = df!["wgt" => [1.0, 2.0], "income" => [3.0, 4.0]]?;
            Ok(Arc::new(Population::new(wave, df, "wgt")?))
        }
    }

    #[test]
    fn test_cached_source_loads_once() {
        let source = CachedSource::new(Counting { calls: Cell::new(0) });
        let a = source.load(Wave(2019)).unwrap();
        let b = source.load(Wave(2019)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        source.load(Wave(2022)).unwrap();
        assert_eq!(source.inner.calls.get(), 2);
        assert_eq!(source.cached(), 2);
    }

    struct Gated {
        gate: std::sync::Barrier,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl PopulationSource for Gated {
        fn load(&self, wave: Wave) -> Result<Arc<Population>> {
            // Both loaders must be inside `load` at once to get past here
            self.gate.wait();
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let df = df!["wgt" => [1.0], "income" => [f64::from(wave.year())]]?;
            Ok(Arc::new(Population::new(wave, df, "wgt")?))
        }
    }

    #[test]
    fn test_cached_source_loads_waves_concurrently() {
        let source = CachedSource::new(Gated {
            gate: std::sync::Barrier::new(2),
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let (a, b) = std::thread::scope(|s| {
            let a = s.spawn(|| source.load(Wave(2019)).unwrap());
            let b = s.spawn(|| source.load(Wave(2022)).unwrap());
            (a.join().unwrap(), b.join().unwrap())
        });
        assert_eq!(a.values("income").unwrap(), vec![2019.0]);
        assert_eq!(b.values("income").unwrap(), vec![2022.0]);
        assert_eq!(source.cached(), 2);
        assert!(Arc::ptr_eq(&a, &source.load(Wave(2019)).unwrap()));
        assert_eq!(source.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_frame_source() {
        let mut source = FrameSource::new();
        let df = df!["wgt" => [1.0], "income" => [3.0]].unwrap();
        source.insert(Population::new(Wave(2022), df, "wgt").unwrap());
        assert_eq!(source.load(Wave(2022)).unwrap().height(), 1);
        assert!(source.load(Wave(2019)).is_err());
    }

    #[test]
    fn test_csv_source_round_trip() {
        let dir = std::env::temp_dir().join(format!("scf-rs-source-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut df = df!["WGT" => [1.5, 0.0, 2.0], "Income" => [10.0, 20.0, 30.0]].unwrap();
        let path = dir.join("scf2019.csv");
        let mut file = File::create(&path).unwrap();
        CsvWriter::new(&mut file).include_header(true).finish(&mut df).unwrap();

        let source = CsvSource::new(&dir);
        let pop = source.load(Wave(2019)).unwrap();
        assert_eq!(pop.height(), 2);
        assert_eq!(pop.values("income").unwrap(), vec![10.0, 30.0]);

        let err = source.load(Wave(2022)).unwrap_err();
        assert!(matches!(err, StatsError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_raw_source_paths_and_factors() {
        let source = RawCsvSource::new("data");
        assert_eq!(source.full_path(Wave(2019)), PathBuf::from("data/p19i6.csv"));
        assert_eq!(source.summary_path(Wave(2022)), PathBuf::from("data/rscfp2022.csv"));
        assert!(matches!(source.load(Wave(2016)), Err(StatsError::InvalidInput(_))));
        let source = source.with_factors(Wave(2016), InflationFactors::new(1.2, 1.3));
        assert!(matches!(source.load(Wave(2016)), Err(StatsError::Io(_))));
    }
}
