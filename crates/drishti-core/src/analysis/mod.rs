//! Ratio and decomposition engine: vertical (common-size) analysis,
//! horizontal (growth) analysis and per-period financial ratios.

pub mod horizontal;
pub mod ratios;
pub mod vertical;
