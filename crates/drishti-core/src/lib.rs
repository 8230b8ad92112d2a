//! Forensic financial analysis with decimal precision.
//!
//! Pure, synchronous computation over normalized financial statements:
//! common-size and growth decomposition, financial ratios, Altman Z-Score,
//! Beneish M-Score, Benford first-digit analysis, rule-based anomaly
//! detection, composite risk scoring and regulatory compliance validation.
//! Orchestration lives in `drishti-engine`; this crate performs no I/O.

pub mod analysis;
pub mod anomaly;
pub mod compliance;
pub mod error;
pub mod forensics;
pub mod normalizer;
pub mod report;
pub mod risk;
pub mod types;

pub use error::ForensicError;
pub use types::*;

/// Standard result type for all forensic computations.
pub type ForensicResult<T> = Result<T, ForensicError>;
