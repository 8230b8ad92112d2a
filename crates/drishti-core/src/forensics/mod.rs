//! Statistical forensic library: Altman Z-Score with history, Beneish
//! M-Score with the eight year-over-year variables, and Benford's Law
//! first-digit analysis.

pub mod altman;
pub mod beneish;
pub mod benford;
