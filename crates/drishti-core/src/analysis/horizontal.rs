//! Horizontal (period-over-period growth) analysis.
//!
//! Pairs statements of the same type in ascending period order and
//! computes the growth rate of every canonical field present in both
//! periods. A zero prior value yields a null growth rate, never an error
//! and never zero.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{FinancialStatement, StatementType};
use crate::ForensicResult;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Growth decomposition between two consecutive periods of one statement
/// type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizontalComparison {
    /// `"{prev}_to_{curr}_{statement_type}"`.
    pub key: String,
    pub prev_period: NaiveDate,
    pub curr_period: NaiveDate,
    pub statement_type: StatementType,
    /// `"{field}_growth_pct"` keys; None when the prior value is zero.
    pub growth: BTreeMap<String, Option<Decimal>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizontalOutput {
    pub comparisons: Vec<HorizontalComparison>,
}

impl HorizontalOutput {
    /// Look up a growth rate by comparison key and field key.
    pub fn growth(&self, key: &str, field_key: &str) -> Option<Decimal> {
        self.comparisons
            .iter()
            .find(|c| c.key == key)
            .and_then(|c| c.growth.get(field_key).copied().flatten())
    }

    /// Latest comparison for a statement type, if any.
    pub fn latest(&self, statement_type: StatementType) -> Option<&HorizontalComparison> {
        self.comparisons
            .iter()
            .filter(|c| c.statement_type == statement_type)
            .last()
    }
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Run horizontal analysis over consecutive same-type statement pairs.
pub fn horizontal_analysis(statements: &[FinancialStatement]) -> ForensicResult<HorizontalOutput> {
    let hundred = dec!(100);
    let mut comparisons = Vec::new();

    for statement_type in [
        StatementType::Income,
        StatementType::Balance,
        StatementType::CashFlow,
    ] {
        let mut of_type: Vec<&FinancialStatement> = statements
            .iter()
            .filter(|s| s.statement_type == statement_type)
            .collect();
        of_type.sort_by_key(|s| s.period_end);

        for pair in of_type.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            let mut growth = BTreeMap::new();
            for (field, prev_value) in &prev.data {
                let Some(curr_value) = curr.get(*field) else {
                    continue;
                };
                let rate = if prev_value.is_zero() {
                    None
                } else {
                    Some(((curr_value - prev_value) / prev_value * hundred).round_dp(2))
                };
                growth.insert(format!("{}_growth_pct", field), rate);
            }
            comparisons.push(HorizontalComparison {
                key: format!(
                    "{}_to_{}_{}",
                    prev.period_end,
                    curr.period_end,
                    statement_type.slug()
                ),
                prev_period: prev.period_end,
                curr_period: curr.period_end,
                statement_type,
                growth,
            });
        }
    }

    Ok(HorizontalOutput { comparisons })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
