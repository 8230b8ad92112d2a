//! Benford's Law first-digit analysis.
//!
//! Tests whether the leading digits of all reported magnitudes follow the
//! logarithmic distribution expected of naturally occurring figures.
//! Deviation beyond the chi-squared critical value suggests fabricated
//! numbers.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ForensicError;
use crate::types::FinancialStatement;
use crate::ForensicResult;

/// Minimum number of extractable magnitudes for a meaningful test.
pub const MIN_SAMPLE_SIZE: usize = 10;

/// Chi-squared critical value at 95% confidence with 8 degrees of freedom.
pub const CRITICAL_VALUE: Decimal = dec!(15.507);

// ---------------------------------------------------------------------------
// Decimal math helpers
// ---------------------------------------------------------------------------

fn decimal_ln(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let ln2 = dec!(0.6931471805599453);
    let mut val = x;
    let mut adjust = Decimal::ZERO;
    while val > dec!(2.0) {
        val /= dec!(2);
        adjust += ln2;
    }
    while val < dec!(0.5) {
        val *= dec!(2);
        adjust -= ln2;
    }
    let z = (val - Decimal::ONE) / (val + Decimal::ONE);
    let z2 = z * z;
    let mut term = z;
    let mut sum = z;
    for k in 1u32..40 {
        term *= z2;
        sum += term / Decimal::from(2 * k + 1);
    }
    dec!(2) * sum + adjust
}

fn decimal_log10(x: Decimal) -> Decimal {
    decimal_ln(x) / dec!(2.302585092994046)
}

fn first_digit(val: Decimal) -> Option<u32> {
    if val.abs() == Decimal::ZERO {
        return None;
    }
    for ch in val.abs().to_string().chars() {
        if ch.is_ascii_digit() && ch != '0' {
            return ch.to_digit(10);
        }
    }
    None
}

/// Expected first-digit probability under Benford's Law: log10(1 + 1/d).
fn benford_expected(d: u32) -> Decimal {
    decimal_log10(Decimal::ONE + Decimal::ONE / Decimal::from(d))
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Frequency result for a single leading digit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitFrequency {
    pub digit: u32,
    pub observed_count: u32,
    pub observed_pct: Decimal,
    pub expected_pct: Decimal,
    pub deviation: Decimal,
}

/// Output of the first-digit chi-squared test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenfordOutput {
    pub sample_size: usize,
    pub digit_frequencies: Vec<DigitFrequency>,
    pub chi_square: Decimal,
    pub degrees_of_freedom: u32,
    pub critical_value: Decimal,
    pub is_anomalous: bool,
    pub interpretation: String,
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Collect every positive finite magnitude across all canonical fields of
/// all statements and run the first-digit test.
pub fn benford_analysis(statements: &[FinancialStatement]) -> ForensicResult<BenfordOutput> {
    let magnitudes: Vec<Decimal> = statements
        .iter()
        .flat_map(|s| s.data.values())
        .map(|v| v.abs())
        .filter(|v| !v.is_zero())
        .collect();
    analyze_magnitudes(&magnitudes)
}

/// Run the first-digit test over a prepared set of magnitudes.
pub fn analyze_magnitudes(magnitudes: &[Decimal]) -> ForensicResult<BenfordOutput> {
    let digits: Vec<u32> = magnitudes.iter().filter_map(|v| first_digit(*v)).collect();
    if digits.len() < MIN_SAMPLE_SIZE {
        return Err(ForensicError::InsufficientData(format!(
            "Benford analysis needs at least {} values, got {}.",
            MIN_SAMPLE_SIZE,
            digits.len()
        )));
    }

    let n = Decimal::from(digits.len() as u64);
    let hundred = dec!(100);
    let mut frequencies = Vec::with_capacity(9);
    let mut chi_square = Decimal::ZERO;

    for d in 1u32..=9 {
        let count = digits.iter().filter(|&&x| x == d).count() as u32;
        let p = benford_expected(d);
        let observed_pct = Decimal::from(count) / n * hundred;
        let expected_pct = p * hundred;
        let expected_count = p * n;
        if expected_count > Decimal::ZERO {
            let diff = Decimal::from(count) - expected_count;
            chi_square += diff * diff / expected_count;
        }
        frequencies.push(DigitFrequency {
            digit: d,
            observed_count: count,
            observed_pct,
            expected_pct,
            deviation: observed_pct - expected_pct,
        });
    }

    let is_anomalous = chi_square > CRITICAL_VALUE;
    let interpretation = if is_anomalous {
        format!(
            "Chi-square {} exceeds the 95% critical value {}; first-digit distribution \
             deviates significantly from Benford's Law.",
            chi_square.round_dp(3),
            CRITICAL_VALUE
        )
    } else {
        format!(
            "Chi-square {} is within the 95% critical value {}; first-digit distribution \
             is consistent with Benford's Law.",
            chi_square.round_dp(3),
            CRITICAL_VALUE
        )
    };

    Ok(BenfordOutput {
        sample_size: digits.len(),
        digit_frequencies: frequencies,
        chi_square,
        degrees_of_freedom: 8,
        critical_value: CRITICAL_VALUE,
        is_anomalous,
        interpretation,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalField, StatementType};
    use rust_decimal_macros::dec;

    fn approx_eq(a: Decimal, b: Decimal, eps: Decimal) -> bool {
        (a - b).abs() < eps
    }

    /// Scale-invariant data (powers, Fibonacci) that follows Benford.
    fn benford_data() -> Vec<Decimal> {
        let mut data = Vec::new();
        let mut v = dec!(2);
        for _ in 0..60 {
            data.push(v);
            v *= dec!(2);
        }
        v = dec!(3);
        for _ in 0..38 {
            data.push(v);
            v *= dec!(3);
        }
        let (mut a, mut b) = (Decimal::ONE, Decimal::ONE);
        for _ in 0..60 {
            data.push(a);
            let c = a + b;
            a = b;
            b = c;
        }
        data
    }

    /// First digits uniformly distributed across 1..9.
    fn uniform_data() -> Vec<Decimal> {
        (1u32..=9)
            .flat_map(|d| std::iter::repeat(Decimal::from(d) * dec!(100)).take(50))
            .collect()
    }

    #[test]
    fn test_benford_data_conforms() {
        let out = analyze_magnitudes(&benford_data()).unwrap();
        assert!(!out.is_anomalous, "chi2={}", out.chi_square);
    }

    #[test]
    fn test_uniform_digits_anomalous() {
        let out = analyze_magnitudes(&uniform_data()).unwrap();
        assert!(out.is_anomalous);
        assert!(out.chi_square > CRITICAL_VALUE);
    }

    #[test]
    fn test_nine_frequency_bins() {
        let out = analyze_magnitudes(&benford_data()).unwrap();
        assert_eq!(out.digit_frequencies.len(), 9);
        assert_eq!(out.degrees_of_freedom, 8);
    }

    #[test]
    fn test_observed_pct_sums_to_hundred() {
        let out = analyze_magnitudes(&benford_data()).unwrap();
        let total: Decimal = out.digit_frequencies.iter().map(|f| f.observed_pct).sum();
        assert!(approx_eq(total, dec!(100), dec!(0.001)), "total={}", total);
    }

    #[test]
    fn test_expected_pct_matches_log_formula() {
        let out = analyze_magnitudes(&benford_data()).unwrap();
        assert!(approx_eq(
            out.digit_frequencies[0].expected_pct,
            dec!(30.103),
            dec!(0.01)
        ));
        assert!(approx_eq(
            out.digit_frequencies[8].expected_pct,
            dec!(4.576),
            dec!(0.01)
        ));
    }

    #[test]
    fn test_expected_sums_to_hundred() {
        let total: Decimal = (1u32..=9).map(|d| benford_expected(d) * dec!(100)).sum();
        assert!(approx_eq(total, dec!(100), dec!(0.01)));
    }

    #[test]
    fn test_insufficient_sample_rejected() {
        let data: Vec<Decimal> = (1..=9).map(Decimal::from).collect();
        match analyze_magnitudes(&data).unwrap_err() {
            ForensicError::InsufficientData(msg) => assert!(msg.contains("at least 10")),
            e => panic!("Expected InsufficientData, got {e}"),
        }
    }

    #[test]
    fn test_statement_collection_ignores_sign() {
        let stmt = FinancialStatement {
            statement_type: StatementType::Income,
            period_end: "2023-03-31".parse().unwrap(),
            currency: "INR".into(),
            data: [
                (CanonicalField::TotalRevenue, dec!(123)),
                (CanonicalField::NetProfit, dec!(-456)),
            ]
            .into_iter()
            .collect(),
        };
        let statements: Vec<FinancialStatement> = (0..5)
            .map(|i| {
                let mut s = stmt.clone();
                s.period_end = format!("202{}-03-31", i).parse().unwrap();
                s
            })
            .collect();
        let out = benford_analysis(&statements).unwrap();
        assert_eq!(out.sample_size, 10);
    }

    #[test]
    fn test_chi_square_non_negative() {
        let out = analyze_magnitudes(&benford_data()).unwrap();
        assert!(out.chi_square >= Decimal::ZERO);
    }

    #[test]
    fn test_counts_sum_to_sample_size() {
        let data = benford_data();
        let out = analyze_magnitudes(&data).unwrap();
        let total: u32 = out.digit_frequencies.iter().map(|f| f.observed_count).sum();
        assert_eq!(total as usize, out.sample_size);
    }

    #[test]
    fn test_interpretation_mentions_verdict() {
        let anomalous = analyze_magnitudes(&uniform_data()).unwrap();
        assert!(anomalous.interpretation.contains("deviates"));
        let clean = analyze_magnitudes(&benford_data()).unwrap();
        assert!(clean.interpretation.contains("consistent"));
    }

    #[test]
    fn test_log10_ten() {
        assert!(approx_eq(decimal_log10(dec!(10)), Decimal::ONE, dec!(0.001)));
    }

    #[test]
    fn test_serde_roundtrip() {
        let out = analyze_magnitudes(&benford_data()).unwrap();
        let json = serde_json::to_string(&out).unwrap();
        let back: BenfordOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.is_anomalous, out.is_anomalous);
    }
}
