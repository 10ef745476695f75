// src/partition/brackets.rs
//! Fixed, right-closed brackets: `(e_i, e_{i+1}]`, optionally with the lowest
//! edge included in the first bracket.

use polars::prelude::*;

use crate::error::{Result, StatsError};

#[derive(Debug, Clone, PartialEq)]
pub struct Brackets {
    edges: Vec<f64>,
    include_lowest: bool,
}

impl Brackets {
    pub fn new(edges: Vec<f64>, include_lowest: bool) -> Result<Self> {
        if edges.len() < 2 {
            return Err(StatsError::InvalidBoundaries(
                "brackets need at least 2 edges".to_string(),
            ));
        }
        if !edges.windows(2).all(|w| w[0] < w[1]) {
            return Err(StatsError::InvalidBoundaries(
                "bracket edges must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { edges, include_lowest })
    }

    pub fn len(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.edges.len() < 2
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Bracket of `v`, or `None` when it falls outside every bracket.
    pub fn locate(&self, v: f64) -> Option<u32> {
        let first = self.edges[0];
        let last = self.edges[self.edges.len() - 1];
        if v.is_nan() || v < first || v > last {
            return None;
        }
        if v == first {
            return self.include_lowest.then_some(0);
        }
        Some((self.edges.partition_point(|&e| e < v) - 1) as u32)
    }

    pub fn assign(&self, values: &[f64]) -> Vec<Option<u32>> {
        values.iter().map(|&v| self.locate(v)).collect()
    }

    pub fn assign_chunked(&self, values: &Float64Chunked, name: &str) -> UInt32Chunked {
        let labels: Vec<Option<u32>> = values.iter().map(|v| v.and_then(|v| self.locate(v))).collect();
        UInt32Chunked::from_slice_options(name.into(), &labels)
    }
}

// ============================================================================
// Standard brackets
// ============================================================================

pub const AGE_LABELS: [&str; 9] = [
    "26-30", "31-35", "36-40", "41-45", "46-50", "51-55", "56-60", "61-65", "66-70",
];

pub const BULLETIN_AGE_LABELS: [&str; 6] = ["<35", "35-44", "45-54", "55-64", "65-74", "75+"];

/// Five-year age categories from 25 to 70.
pub fn age_brackets() -> Brackets {
    Brackets {
        edges: (0..10).map(|k| 25.0 + 5.0 * k as f64).collect(),
        include_lowest: false,
    }
}

pub fn bulletin_age_brackets() -> Brackets {
    Brackets {
        edges: vec![0.0, 34.0, 44.0, 54.0, 64.0, 74.0, 1000.0],
        include_lowest: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_right_closed() {
        let ages = age_brackets();
        assert_eq!(ages.len(), AGE_LABELS.len());
        assert_eq!(ages.locate(25.0), None);
        assert_eq!(ages.locate(26.0), Some(0));
        assert_eq!(ages.locate(30.0), Some(0));
        assert_eq!(ages.locate(30.5), Some(1));
        assert_eq!(ages.locate(70.0), Some(8));
        assert_eq!(ages.locate(71.0), None);
    }

    #[test]
    fn test_include_lowest() {
        let closed = Brackets::new(vec![0.0, 1.0, 15000.0, 40000.0], true).unwrap();
        let open = Brackets::new(vec![0.0, 1.0, 15000.0, 40000.0], false).unwrap();
        assert_eq!(closed.assign(&[0.0, 1.0, 1.5, 15000.0, 39999.0, 40001.0]), vec![
            Some(0),
            Some(0),
            Some(1),
            Some(1),
            Some(2),
            None
        ]);
        assert_eq!(open.locate(0.0), None);
        assert_eq!(closed.locate(-1.0), None);
    }

    #[test]
    fn test_bulletin_ages() {
        let b = bulletin_age_brackets();
        assert_eq!(b.len(), BULLETIN_AGE_LABELS.len());
        assert_eq!(b.locate(34.0), Some(0));
        assert_eq!(b.locate(35.0), Some(1));
        assert_eq!(b.locate(80.0), Some(5));
    }

    #[test]
    fn test_chunked_nulls() {
        let b = bulletin_age_brackets();
        let ca = Float64Chunked::from_slice_options("age".into(), &[Some(40.0), None, Some(2000.0)]);
        let out = b.assign_chunked(&ca, "age_cat_bulletin");
        assert_eq!(out.get(0), Some(1));
        assert_eq!(out.get(1), None);
        assert_eq!(out.get(2), None);
    }

    #[test]
    fn test_new_validates() {
        assert!(Brackets::new(vec![0.0, 0.0, 1.0], false).is_err());
        assert!(Brackets::new(vec![0.0], false).is_err());
        assert!(Brackets::new(vec![0.0, 1.0], true).is_ok());
    }
}
