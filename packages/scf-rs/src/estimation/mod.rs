// src/estimation/mod.rs
pub mod weighted;
pub mod domain;

pub use weighted::{
    QuantileMethod, WeightedCdf,
    weighted_quantile, weighted_quantile_with, weighted_quantiles,
    weighted_median, weighted_mean, weighted_aggregate, weighted_ratio,
};
pub use domain::{
    domain_pairs,
    mean_chunked, mean_domain, total_chunked, total_domain,
    quantile_chunked, quantile_domain, median_domain,
    ratio_domain, weight_share_domain,
};
