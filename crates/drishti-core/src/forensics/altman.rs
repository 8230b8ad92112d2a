//! Altman Z-Score (manufacturing variant) with historical series.
//!
//! Z = 1.2·X1 + 1.4·X2 + 3.3·X3 + 0.6·X4 + 1.0·X5 where
//! X1 = working capital / total assets, X2 = retained earnings / total
//! assets, X3 = EBIT / total assets, X4 = equity / total liabilities,
//! X5 = sales / total assets. Z > 2.99 is safe, 1.81..=2.99 grey,
//! below 1.81 distressed.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ForensicError;
use crate::types::{period_views, CanonicalField, FinancialStatement, StatementType};
use crate::ForensicResult;

/// X4 substitute when total liabilities are zero. Recorded in the output
/// via `x4_clamped`.
pub const X4_CLAMP_SENTINEL: Decimal = dec!(1000000);

const SAFE_THRESHOLD: Decimal = dec!(2.99);
const DISTRESS_THRESHOLD: Decimal = dec!(1.81);

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneClassification {
    Safe,
    Grey,
    Distress,
}

impl ZoneClassification {
    /// Pure function of the score against the {1.81, 2.99} thresholds.
    pub fn from_score(z: Decimal) -> Self {
        if z > SAFE_THRESHOLD {
            Self::Safe
        } else if z >= DISTRESS_THRESHOLD {
            Self::Grey
        } else {
            Self::Distress
        }
    }
}

/// Z-Score for a single period, with the five component ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScorePeriod {
    pub period_end: NaiveDate,
    pub z_score: Decimal,
    pub classification: ZoneClassification,
    pub x1: Decimal,
    pub x2: Decimal,
    pub x3: Decimal,
    pub x4: Decimal,
    pub x5: Decimal,
    pub x4_clamped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AltmanOutput {
    /// Latest computable period.
    pub current: ZScorePeriod,
    /// All computable periods, ascending.
    pub historical_z_scores: Vec<ZScorePeriod>,
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Compute the Z-Score for every period that has both an income statement
/// and a balance sheet with positive total assets. Missing component lines
/// are treated as zero.
pub fn altman_z_score(statements: &[FinancialStatement]) -> ForensicResult<AltmanOutput> {
    // A period qualifies only when both statement types were reported.
    let mut coverage: BTreeMap<NaiveDate, (bool, bool)> = BTreeMap::new();
    for stmt in statements {
        let entry = coverage.entry(stmt.period_end).or_default();
        match stmt.statement_type {
            StatementType::Income => entry.0 = true,
            StatementType::Balance => entry.1 = true,
            StatementType::CashFlow => {}
        }
    }

    let mut history = Vec::new();
    for view in period_views(statements) {
        if coverage.get(&view.period_end) != Some(&(true, true)) {
            continue;
        }
        let Some(total_assets) = view.get(CanonicalField::TotalAssets) else {
            continue;
        };
        if total_assets <= Decimal::ZERO {
            continue;
        }

        let get = |f: CanonicalField| view.get(f).unwrap_or(Decimal::ZERO);
        let working_capital =
            get(CanonicalField::CurrentAssets) - get(CanonicalField::CurrentLiabilities);
        let total_liabilities = get(CanonicalField::TotalLiabilities);

        let x1 = working_capital / total_assets;
        let x2 = get(CanonicalField::RetainedEarnings) / total_assets;
        let x3 = get(CanonicalField::OperatingIncome) / total_assets;
        let (x4, x4_clamped) = if total_liabilities.is_zero() {
            (X4_CLAMP_SENTINEL, true)
        } else {
            (get(CanonicalField::TotalEquity) / total_liabilities, false)
        };
        let x5 = get(CanonicalField::TotalRevenue) / total_assets;

        let z = dec!(1.2) * x1 + dec!(1.4) * x2 + dec!(3.3) * x3 + dec!(0.6) * x4 + x5;

        history.push(ZScorePeriod {
            period_end: view.period_end,
            z_score: z,
            classification: ZoneClassification::from_score(z),
            x1,
            x2,
            x3,
            x4,
            x5,
            x4_clamped,
        });
    }

    let current = history
        .last()
        .cloned()
        .ok_or_else(|| {
            ForensicError::InsufficientData(
                "No period has both an income statement and a balance sheet.".into(),
            )
        })?;

    Ok(AltmanOutput {
        current,
        historical_z_scores: history,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn approx_eq(a: Decimal, b: Decimal, eps: Decimal) -> bool {
        (a - b).abs() < eps
    }

    fn statement_pair(
        period: &str,
        income: &[(CanonicalField, Decimal)],
        balance: &[(CanonicalField, Decimal)],
    ) -> Vec<FinancialStatement> {
        vec![
            FinancialStatement {
                statement_type: StatementType::Income,
                period_end: period.parse().unwrap(),
                currency: "INR".into(),
                data: income.iter().cloned().collect(),
            },
            FinancialStatement {
                statement_type: StatementType::Balance,
                period_end: period.parse().unwrap(),
                currency: "INR".into(),
                data: balance.iter().cloned().collect(),
            },
        ]
    }

    fn healthy_pair(period: &str) -> Vec<FinancialStatement> {
        statement_pair(
            period,
            &[
                (CanonicalField::TotalRevenue, dec!(4000)),
                (CanonicalField::OperatingIncome, dec!(300)),
            ],
            &[
                (CanonicalField::TotalAssets, dec!(2000)),
                (CanonicalField::CurrentAssets, dec!(900)),
                (CanonicalField::CurrentLiabilities, dec!(400)),
                (CanonicalField::RetainedEarnings, dec!(800)),
                (CanonicalField::TotalEquity, dec!(1000)),
                (CanonicalField::TotalLiabilities, dec!(1000)),
            ],
        )
    }

    fn distressed_pair(period: &str) -> Vec<FinancialStatement> {
        statement_pair(
            period,
            &[
                (CanonicalField::TotalRevenue, dec!(500)),
                (CanonicalField::OperatingIncome, dec!(-100)),
            ],
            &[
                (CanonicalField::TotalAssets, dec!(1000)),
                (CanonicalField::CurrentAssets, dec!(200)),
                (CanonicalField::CurrentLiabilities, dec!(400)),
                (CanonicalField::RetainedEarnings, dec!(-500)),
                (CanonicalField::TotalEquity, dec!(50)),
                (CanonicalField::TotalLiabilities, dec!(950)),
            ],
        )
    }

    #[test]
    fn test_healthy_is_safe() {
        let out = altman_z_score(&healthy_pair("2023-03-31")).unwrap();
        assert_eq!(out.current.classification, ZoneClassification::Safe);
        assert!(out.current.z_score > dec!(2.99));
    }

    #[test]
    fn test_distressed_is_distress() {
        let out = altman_z_score(&distressed_pair("2023-03-31")).unwrap();
        assert_eq!(out.current.classification, ZoneClassification::Distress);
        assert!(out.current.z_score < dec!(1.81));
    }

    #[test]
    fn test_z_formula() {
        let out = altman_z_score(&healthy_pair("2023-03-31")).unwrap();
        let expected = dec!(1.2) * (dec!(500) / dec!(2000))
            + dec!(1.4) * (dec!(800) / dec!(2000))
            + dec!(3.3) * (dec!(300) / dec!(2000))
            + dec!(0.6) * (dec!(1000) / dec!(1000))
            + dec!(4000) / dec!(2000);
        assert!(approx_eq(out.current.z_score, expected, dec!(0.0001)));
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(
            ZoneClassification::from_score(dec!(3.00)),
            ZoneClassification::Safe
        );
        assert_eq!(
            ZoneClassification::from_score(dec!(2.99)),
            ZoneClassification::Grey
        );
        assert_eq!(
            ZoneClassification::from_score(dec!(1.81)),
            ZoneClassification::Grey
        );
        assert_eq!(
            ZoneClassification::from_score(dec!(1.80)),
            ZoneClassification::Distress
        );
    }

    #[test]
    fn test_history_ascending() {
        let mut statements = healthy_pair("2022-03-31");
        statements.extend(healthy_pair("2023-03-31"));
        statements.extend(healthy_pair("2021-03-31"));
        let out = altman_z_score(&statements).unwrap();
        assert_eq!(out.historical_z_scores.len(), 3);
        let periods: Vec<_> = out
            .historical_z_scores
            .iter()
            .map(|p| p.period_end)
            .collect();
        let mut sorted = periods.clone();
        sorted.sort();
        assert_eq!(periods, sorted);
        assert_eq!(out.current.period_end, "2023-03-31".parse().unwrap());
    }

    #[test]
    fn test_period_without_balance_skipped() {
        let mut statements = healthy_pair("2022-03-31");
        statements.push(FinancialStatement {
            statement_type: StatementType::Income,
            period_end: "2023-03-31".parse().unwrap(),
            currency: "INR".into(),
            data: [(CanonicalField::TotalRevenue, dec!(4000))]
                .into_iter()
                .collect(),
        });
        let out = altman_z_score(&statements).unwrap();
        assert_eq!(out.historical_z_scores.len(), 1);
        assert_eq!(out.current.period_end, "2022-03-31".parse().unwrap());
    }

    #[test]
    fn test_zero_liabilities_clamped() {
        let statements = statement_pair(
            "2023-03-31",
            &[(CanonicalField::TotalRevenue, dec!(100))],
            &[
                (CanonicalField::TotalAssets, dec!(1000)),
                (CanonicalField::TotalEquity, dec!(1000)),
            ],
        );
        let out = altman_z_score(&statements).unwrap();
        assert!(out.current.x4_clamped);
        assert_eq!(out.current.x4, X4_CLAMP_SENTINEL);
        assert_eq!(out.current.classification, ZoneClassification::Safe);
    }

    #[test]
    fn test_no_computable_period_is_error() {
        let statements = vec![FinancialStatement {
            statement_type: StatementType::Income,
            period_end: "2023-03-31".parse().unwrap(),
            currency: "INR".into(),
            data: [(CanonicalField::TotalRevenue, dec!(100))]
                .into_iter()
                .collect(),
        }];
        assert!(matches!(
            altman_z_score(&statements).unwrap_err(),
            ForensicError::InsufficientData(_)
        ));
    }

    #[test]
    fn test_missing_components_default_to_zero() {
        let statements = statement_pair(
            "2023-03-31",
            &[(CanonicalField::TotalRevenue, dec!(1000))],
            &[
                (CanonicalField::TotalAssets, dec!(1000)),
                (CanonicalField::TotalLiabilities, dec!(500)),
            ],
        );
        let out = altman_z_score(&statements).unwrap();
        assert_eq!(out.current.x1, Decimal::ZERO);
        assert_eq!(out.current.x2, Decimal::ZERO);
        assert_eq!(out.current.x3, Decimal::ZERO);
        assert_eq!(out.current.x5, Decimal::ONE);
    }

    #[test]
    fn test_serde_roundtrip() {
        let out = altman_z_score(&healthy_pair("2023-03-31")).unwrap();
        let json = serde_json::to_string(&out).unwrap();
        let back: AltmanOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back.current.z_score, out.current.z_score);
    }
}
