use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of financial statement a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatementType {
    #[serde(rename = "INCOME")]
    Income,
    #[serde(rename = "BALANCE")]
    Balance,
    #[serde(rename = "CASHFLOW")]
    CashFlow,
}

impl StatementType {
    /// Lower-case slug used in horizontal-analysis comparison keys.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Income => "income_statement",
            Self::Balance => "balance_sheet",
            Self::CashFlow => "cash_flow",
        }
    }
}

/// Ordered severity scale shared by anomalies and compliance violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

macro_rules! canonical_fields {
    ($( $variant:ident => $name:literal ),+ $(,)?) => {
        /// Closed vocabulary of normalized statement line items.
        ///
        /// Every source-specific field name maps into this set (or is
        /// dropped); everything downstream of the normalizer works only in
        /// these terms.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum CanonicalField {
            $( #[serde(rename = $name)] $variant, )+
        }

        impl CanonicalField {
            pub const ALL: &'static [CanonicalField] = &[ $( CanonicalField::$variant, )+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( CanonicalField::$variant => $name, )+
                }
            }

            /// Parse an exact canonical name. Source aliases are handled by
            /// the normalizer, not here.
            pub fn parse(s: &str) -> Option<CanonicalField> {
                match s {
                    $( $name => Some(CanonicalField::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

canonical_fields! {
    TotalRevenue => "total_revenue",
    CostOfRevenue => "cost_of_revenue",
    GrossProfit => "gross_profit",
    OperatingIncome => "operating_income",
    OperatingExpenses => "operating_expenses",
    SellingGeneralAdmin => "selling_general_admin",
    DepreciationAmortization => "depreciation_amortization",
    InterestExpense => "interest_expense",
    TaxExpense => "tax_expense",
    NetProfit => "net_profit",
    Ebitda => "ebitda",
    TotalAssets => "total_assets",
    CurrentAssets => "current_assets",
    NonCurrentAssets => "non_current_assets",
    CashAndEquivalents => "cash_and_equivalents",
    ShortTermInvestments => "short_term_investments",
    AccountsReceivable => "accounts_receivable",
    Inventory => "inventory",
    PrepaidExpenses => "prepaid_expenses",
    PropertyPlantEquipment => "property_plant_equipment",
    Goodwill => "goodwill",
    IntangibleAssets => "intangible_assets",
    LongTermInvestments => "long_term_investments",
    CurrentLiabilities => "current_liabilities",
    NonCurrentLiabilities => "non_current_liabilities",
    TotalLiabilities => "total_liabilities",
    AccountsPayable => "accounts_payable",
    ShortTermDebt => "short_term_debt",
    LongTermDebt => "long_term_debt",
    DeferredRevenue => "deferred_revenue",
    DeferredTaxLiabilities => "deferred_tax_liabilities",
    TotalEquity => "total_equity",
    RetainedEarnings => "retained_earnings",
    ShareCapital => "share_capital",
    MinorityInterest => "minority_interest",
    OperatingCashFlow => "operating_cash_flow",
    InvestingCashFlow => "investing_cash_flow",
    FinancingCashFlow => "financing_cash_flow",
    CapitalExpenditure => "capital_expenditure",
    FreeCashFlow => "free_cash_flow",
    DividendsPaid => "dividends_paid",
    NetChangeInCash => "net_change_in_cash",
}

impl CanonicalField {
    /// Whether negative values are meaningful for this field. Unsigned
    /// fields (totals, revenues, asset and liability balances) drop
    /// non-positive values during normalization.
    pub fn signed(&self) -> bool {
        matches!(
            self,
            CanonicalField::GrossProfit
                | CanonicalField::OperatingIncome
                | CanonicalField::NetProfit
                | CanonicalField::Ebitda
                | CanonicalField::RetainedEarnings
                | CanonicalField::OperatingCashFlow
                | CanonicalField::InvestingCashFlow
                | CanonicalField::FinancingCashFlow
                | CanonicalField::CapitalExpenditure
                | CanonicalField::FreeCashFlow
                | CanonicalField::DividendsPaid
                | CanonicalField::NetChangeInCash
        )
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized financial statement. Produced by the normalizer and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    pub statement_type: StatementType,
    pub period_end: NaiveDate,
    pub currency: String,
    pub data: BTreeMap<CanonicalField, Decimal>,
}

impl FinancialStatement {
    pub fn get(&self, field: CanonicalField) -> Option<Decimal> {
        self.data.get(&field).copied()
    }
}

/// Merged view of all statement types for one period. Ratio and score
/// computations need income and balance lines side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodView {
    pub period_end: NaiveDate,
    pub fields: BTreeMap<CanonicalField, Decimal>,
}

impl PeriodView {
    pub fn get(&self, field: CanonicalField) -> Option<Decimal> {
        self.fields.get(&field).copied()
    }
}

/// Merge statements into per-period views, ascending by period end. When
/// the same field appears in two statements of one period the first
/// occurrence wins.
pub fn period_views(statements: &[FinancialStatement]) -> Vec<PeriodView> {
    let mut by_period: BTreeMap<NaiveDate, BTreeMap<CanonicalField, Decimal>> = BTreeMap::new();
    for stmt in statements {
        let entry = by_period.entry(stmt.period_end).or_default();
        for (field, value) in &stmt.data {
            entry.entry(*field).or_insert(*value);
        }
    }
    by_period
        .into_iter()
        .map(|(period_end, fields)| PeriodView { period_end, fields })
        .collect()
}
