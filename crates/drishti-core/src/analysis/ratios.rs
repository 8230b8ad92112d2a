//! Per-period financial ratios.
//!
//! Liquidity, profitability, leverage and efficiency ratios computed over
//! merged period views. A ratio is None when its inputs are absent or its
//! denominator is zero; a value is never NaN or infinite. All values are
//! rounded to 2 decimals on output.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{period_views, CanonicalField, FinancialStatement, PeriodView};
use crate::ForensicResult;

/// Ratio keys, in output order. Kept in sync with [`compute_period_ratios`].
pub const RATIO_NAMES: &[&str] = &[
    "current_ratio",
    "quick_ratio",
    "cash_ratio",
    "gross_margin_pct",
    "net_margin_pct",
    "return_on_equity_pct",
    "return_on_assets_pct",
    "debt_to_equity",
    "debt_to_assets",
    "interest_coverage",
    "asset_turnover",
    "receivables_turnover",
    "inventory_turnover",
    "days_sales_outstanding",
];

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// All ratios for one period. Every key from [`RATIO_NAMES`] is present;
/// None marks a ratio that could not be computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioPeriod {
    pub period_end: NaiveDate,
    pub ratios: BTreeMap<String, Option<Decimal>>,
}

impl RatioPeriod {
    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.ratios.get(name).copied().flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatioOutput {
    /// Ascending by period end.
    pub periods: Vec<RatioPeriod>,
}

impl RatioOutput {
    pub fn latest(&self) -> Option<&RatioPeriod> {
        self.periods.last()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn div(num: Option<Decimal>, den: Option<Decimal>) -> Option<Decimal> {
    let (n, d) = (num?, den?);
    if d.is_zero() {
        return None;
    }
    Some((n / d).round_dp(2))
}

fn div_pct(num: Option<Decimal>, den: Option<Decimal>) -> Option<Decimal> {
    let (n, d) = (num?, den?);
    if d.is_zero() {
        return None;
    }
    Some((n / d * dec!(100)).round_dp(2))
}

/// Total debt preferred as short-term + long-term borrowings; falls back
/// to total liabilities when no debt line survived normalization.
fn total_debt(view: &PeriodView) -> Option<Decimal> {
    let st = view.get(CanonicalField::ShortTermDebt);
    let lt = view.get(CanonicalField::LongTermDebt);
    match (st, lt) {
        (None, None) => view.get(CanonicalField::TotalLiabilities),
        (a, b) => Some(a.unwrap_or(Decimal::ZERO) + b.unwrap_or(Decimal::ZERO)),
    }
}

/// Gross profit, derived from revenue − cost of revenue when the line
/// itself is absent.
fn gross_profit(view: &PeriodView) -> Option<Decimal> {
    view.get(CanonicalField::GrossProfit).or_else(|| {
        Some(view.get(CanonicalField::TotalRevenue)? - view.get(CanonicalField::CostOfRevenue)?)
    })
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// Compute the full ratio set for one merged period view.
pub fn compute_period_ratios(view: &PeriodView) -> RatioPeriod {
    let revenue = view.get(CanonicalField::TotalRevenue);
    let assets = view.get(CanonicalField::TotalAssets);
    let equity = view.get(CanonicalField::TotalEquity);
    let ca = view.get(CanonicalField::CurrentAssets);
    let cl = view.get(CanonicalField::CurrentLiabilities);
    let cash = view.get(CanonicalField::CashAndEquivalents);
    let ar = view.get(CanonicalField::AccountsReceivable);
    let net_profit = view.get(CanonicalField::NetProfit);
    let cogs = view.get(CanonicalField::CostOfRevenue);

    // A missing inventory line means a company without inventory, not an
    // unknowable quick ratio.
    let inventory = view.get(CanonicalField::Inventory);
    let quick_assets = ca.map(|c| c - inventory.unwrap_or(Decimal::ZERO));

    let mut ratios: BTreeMap<String, Option<Decimal>> = BTreeMap::new();
    ratios.insert("current_ratio".into(), div(ca, cl));
    ratios.insert("quick_ratio".into(), div(quick_assets, cl));
    ratios.insert("cash_ratio".into(), div(cash, cl));
    ratios.insert("gross_margin_pct".into(), div_pct(gross_profit(view), revenue));
    ratios.insert("net_margin_pct".into(), div_pct(net_profit, revenue));
    ratios.insert("return_on_equity_pct".into(), div_pct(net_profit, equity));
    ratios.insert("return_on_assets_pct".into(), div_pct(net_profit, assets));
    ratios.insert("debt_to_equity".into(), div(total_debt(view), equity));
    ratios.insert("debt_to_assets".into(), div(total_debt(view), assets));
    ratios.insert(
        "interest_coverage".into(),
        div(
            view.get(CanonicalField::OperatingIncome),
            view.get(CanonicalField::InterestExpense),
        ),
    );
    ratios.insert("asset_turnover".into(), div(revenue, assets));
    ratios.insert("receivables_turnover".into(), div(revenue, ar));
    ratios.insert("inventory_turnover".into(), div(cogs, inventory));
    ratios.insert(
        "days_sales_outstanding".into(),
        div(ar.map(|a| a * dec!(365)), revenue),
    );

    debug_assert_eq!(ratios.len(), RATIO_NAMES.len());

    RatioPeriod {
        period_end: view.period_end,
        ratios,
    }
}

/// Compute ratios for every period present in the statements.
pub fn ratio_analysis(statements: &[FinancialStatement]) -> ForensicResult<RatioOutput> {
    let periods = period_views(statements)
        .iter()
        .map(compute_period_ratios)
        .collect();
    Ok(RatioOutput { periods })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
