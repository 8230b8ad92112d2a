//! Vertical (common-size) analysis.
//!
//! Expresses every income-statement line as a percentage of total revenue
//! and every balance-sheet line as a percentage of total assets. A
//! statement with a missing or zero base yields an error entry without
//! affecting its siblings. Cash-flow statements have no common-size base
//! and are recorded as skipped.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{CanonicalField, FinancialStatement, StatementType};
use crate::ForensicResult;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Common-size decomposition of a single statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerticalStatement {
    pub period_end: NaiveDate,
    pub statement_type: StatementType,
    /// `"{field}_pct"` keys, rounded to 2 decimals. Empty when `error` set.
    pub lines: BTreeMap<String, Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerticalOutput {
    pub statements: Vec<VerticalStatement>,
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

fn base_field(statement_type: StatementType) -> Option<CanonicalField> {
    match statement_type {
        StatementType::Income => Some(CanonicalField::TotalRevenue),
        StatementType::Balance => Some(CanonicalField::TotalAssets),
        StatementType::CashFlow => None,
    }
}

/// Run vertical analysis over every statement independently.
pub fn vertical_analysis(statements: &[FinancialStatement]) -> ForensicResult<VerticalOutput> {
    let hundred = dec!(100);
    let mut out = Vec::with_capacity(statements.len());

    for stmt in statements {
        let Some(base) = base_field(stmt.statement_type) else {
            out.push(VerticalStatement {
                period_end: stmt.period_end,
                statement_type: stmt.statement_type,
                lines: BTreeMap::new(),
                error: Some("No common-size base defined for cash-flow statements.".into()),
            });
            continue;
        };

        let base_value = match stmt.get(base) {
            Some(v) if v != Decimal::ZERO => v,
            Some(_) => {
                out.push(VerticalStatement {
                    period_end: stmt.period_end,
                    statement_type: stmt.statement_type,
                    lines: BTreeMap::new(),
                    error: Some(format!("Base field '{}' is zero.", base)),
                });
                continue;
            }
            None => {
                out.push(VerticalStatement {
                    period_end: stmt.period_end,
                    statement_type: stmt.statement_type,
                    lines: BTreeMap::new(),
                    error: Some(format!("Base field '{}' is absent.", base)),
                });
                continue;
            }
        };

        let mut lines = BTreeMap::new();
        for (field, value) in &stmt.data {
            let pct = (*value / base_value * hundred).round_dp(2);
            lines.insert(format!("{}_pct", field), pct);
        }
        out.push(VerticalStatement {
            period_end: stmt.period_end,
            statement_type: stmt.statement_type,
            lines,
            error: None,
        });
    }

    Ok(VerticalOutput { statements: out })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn income(period: &str, data: &[(CanonicalField, Decimal)]) -> FinancialStatement {
        FinancialStatement {
            statement_type: StatementType::Income,
            period_end: period.parse().unwrap(),
            currency: "INR".into(),
            data: data.iter().cloned().collect(),
        }
    }

    #[test]
    fn test_income_net_profit_pct() {
        let stmt = income(
            "2023-03-31",
            &[
                (CanonicalField::TotalRevenue, dec!(1_000_000)),
                (CanonicalField::NetProfit, dec!(150_000)),
            ],
        );
        let out = vertical_analysis(&[stmt]).unwrap();
        assert_eq!(
            out.statements[0].lines.get("net_profit_pct"),
            Some(&dec!(15.00))
        );
        assert_eq!(
            out.statements[0].lines.get("total_revenue_pct"),
            Some(&dec!(100.00))
        );
    }

    #[test]
    fn test_balance_uses_total_assets_base() {
        let stmt = FinancialStatement {
            statement_type: StatementType::Balance,
            period_end: "2023-03-31".parse().unwrap(),
            currency: "INR".into(),
            data: [
                (CanonicalField::TotalAssets, dec!(2_000_000)),
                (CanonicalField::CurrentAssets, dec!(900_000)),
            ]
            .into_iter()
            .collect(),
        };
        let out = vertical_analysis(&[stmt]).unwrap();
        assert_eq!(
            out.statements[0].lines.get("current_assets_pct"),
            Some(&dec!(45.00))
        );
    }

    #[test]
    fn test_missing_base_does_not_poison_siblings() {
        let bad = income("2022-03-31", &[(CanonicalField::NetProfit, dec!(10))]);
        let good = income(
            "2023-03-31",
            &[
                (CanonicalField::TotalRevenue, dec!(100)),
                (CanonicalField::NetProfit, dec!(10)),
            ],
        );
        let out = vertical_analysis(&[bad, good]).unwrap();
        assert!(out.statements[0].error.is_some());
        assert!(out.statements[0].lines.is_empty());
        assert!(out.statements[1].error.is_none());
        assert_eq!(
            out.statements[1].lines.get("net_profit_pct"),
            Some(&dec!(10.00))
        );
    }

    #[test]
    fn test_cash_flow_skipped_with_note() {
        let stmt = FinancialStatement {
            statement_type: StatementType::CashFlow,
            period_end: "2023-03-31".parse().unwrap(),
            currency: "INR".into(),
            data: [(CanonicalField::OperatingCashFlow, dec!(100))]
                .into_iter()
                .collect(),
        };
        let out = vertical_analysis(&[stmt]).unwrap();
        assert!(out.statements[0].error.is_some());
    }

    #[test]
    fn test_rounding_two_decimals() {
        let stmt = income(
            "2023-03-31",
            &[
                (CanonicalField::TotalRevenue, dec!(3)),
                (CanonicalField::NetProfit, dec!(1)),
            ],
        );
        let out = vertical_analysis(&[stmt]).unwrap();
        assert_eq!(
            out.statements[0].lines.get("net_profit_pct"),
            Some(&dec!(33.33))
        );
    }

    #[test]
    fn test_negative_margin_preserved() {
        let stmt = income(
            "2023-03-31",
            &[
                (CanonicalField::TotalRevenue, dec!(100)),
                (CanonicalField::NetProfit, dec!(-25)),
            ],
        );
        let out = vertical_analysis(&[stmt]).unwrap();
        assert_eq!(
            out.statements[0].lines.get("net_profit_pct"),
            Some(&dec!(-25.00))
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let stmt = income(
            "2023-03-31",
            &[
                (CanonicalField::TotalRevenue, dec!(100)),
                (CanonicalField::NetProfit, dec!(10)),
            ],
        );
        let out = vertical_analysis(&[stmt]).unwrap();
        let json = serde_json::to_string(&out).unwrap();
        let _: VerticalOutput = serde_json::from_str(&json).unwrap();
    }
}
