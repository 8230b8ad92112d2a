//! Rule-based anomaly detection.
//!
//! A registry of declarative, order-independent rules evaluated over
//! normalized statements (plus the Benford result when available). Each
//! rule yields at most one anomaly per applicable period. The engine
//! aggregates and never fails.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::forensics::benford::BenfordOutput;
use crate::types::{period_views, CanonicalField, FinancialStatement, Severity, StatementType};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    RevenueDecline,
    ProfitCashDivergence,
    ReceivablesBuildup,
    BenfordViolation,
    /// Tag contributed by an externally registered rule.
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub period: String,
    pub description: String,
    pub evidence: BTreeMap<String, Value>,
}

/// Evaluation context shared by all rules.
pub struct AnomalyContext<'a> {
    pub statements: &'a [FinancialStatement],
    pub benford: Option<&'a BenfordOutput>,
}

/// A detection rule. Implement this and register the instance to extend
/// the engine.
pub trait AnomalyRule: Send + Sync {
    fn type_tag(&self) -> AnomalyType;
    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Vec<Anomaly>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyOutput {
    pub success: bool,
    pub anomalies: Vec<Anomaly>,
    pub anomalies_detected: usize,
}

fn json_number(value: Decimal) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

/// Revenue dropping more than 20% period over period.
pub struct RevenueDeclineRule;

const REVENUE_DECLINE_LIMIT: Decimal = dec!(-0.20);

impl AnomalyRule for RevenueDeclineRule {
    fn type_tag(&self) -> AnomalyType {
        AnomalyType::RevenueDecline
    }

    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Vec<Anomaly> {
        let mut income: Vec<&FinancialStatement> = ctx
            .statements
            .iter()
            .filter(|s| s.statement_type == StatementType::Income)
            .collect();
        income.sort_by_key(|s| s.period_end);

        let mut anomalies = Vec::new();
        for pair in income.windows(2) {
            let (Some(prev), Some(curr)) = (
                pair[0].get(CanonicalField::TotalRevenue),
                pair[1].get(CanonicalField::TotalRevenue),
            ) else {
                continue;
            };
            if prev <= Decimal::ZERO {
                continue;
            }
            let decline = (curr - prev) / prev;
            if decline < REVENUE_DECLINE_LIMIT {
                let growth_pct = (decline * dec!(100)).round_dp(2);
                anomalies.push(Anomaly {
                    anomaly_type: AnomalyType::RevenueDecline,
                    severity: Severity::High,
                    period: pair[1].period_end.to_string(),
                    description: format!(
                        "Revenue declined {}% from {} to {}.",
                        growth_pct, pair[0].period_end, pair[1].period_end
                    ),
                    evidence: BTreeMap::from([
                        ("previous_revenue".to_string(), json_number(prev)),
                        ("current_revenue".to_string(), json_number(curr)),
                        ("growth_rate".to_string(), json_number(growth_pct)),
                    ]),
                });
            }
        }
        anomalies
    }
}

/// Reported profit poorly backed by operating cash.
pub struct ProfitCashDivergenceRule;

const CASH_TO_PROFIT_FLOOR: Decimal = dec!(0.5);

impl AnomalyRule for ProfitCashDivergenceRule {
    fn type_tag(&self) -> AnomalyType {
        AnomalyType::ProfitCashDivergence
    }

    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for view in period_views(ctx.statements) {
            let (Some(net_profit), Some(ocf)) = (
                view.get(CanonicalField::NetProfit),
                view.get(CanonicalField::OperatingCashFlow),
            ) else {
                continue;
            };
            if net_profit <= Decimal::ZERO {
                continue;
            }
            let ratio = (ocf / net_profit).round_dp(2);
            if ratio < CASH_TO_PROFIT_FLOOR {
                anomalies.push(Anomaly {
                    anomaly_type: AnomalyType::ProfitCashDivergence,
                    severity: Severity::Medium,
                    period: view.period_end.to_string(),
                    description: format!(
                        "Operating cash flow covers only {} of reported net profit.",
                        ratio
                    ),
                    evidence: BTreeMap::from([
                        ("net_profit".to_string(), json_number(net_profit)),
                        ("operating_cash_flow".to_string(), json_number(ocf)),
                        ("cash_to_profit_ratio".to_string(), json_number(ratio)),
                    ]),
                });
            }
        }
        anomalies
    }
}

/// Receivables disproportionate to revenue.
pub struct ReceivablesBuildupRule;

const RECEIVABLES_TO_REVENUE_CEILING: Decimal = dec!(0.25);

impl AnomalyRule for ReceivablesBuildupRule {
    fn type_tag(&self) -> AnomalyType {
        AnomalyType::ReceivablesBuildup
    }

    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();
        for view in period_views(ctx.statements) {
            let (Some(receivables), Some(revenue)) = (
                view.get(CanonicalField::AccountsReceivable),
                view.get(CanonicalField::TotalRevenue),
            ) else {
                continue;
            };
            if revenue <= Decimal::ZERO {
                continue;
            }
            let ratio = (receivables / revenue).round_dp(2);
            if ratio > RECEIVABLES_TO_REVENUE_CEILING {
                anomalies.push(Anomaly {
                    anomaly_type: AnomalyType::ReceivablesBuildup,
                    severity: Severity::Medium,
                    period: view.period_end.to_string(),
                    description: format!(
                        "Accounts receivable stand at {} of revenue, above the 0.25 ceiling.",
                        ratio
                    ),
                    evidence: BTreeMap::from([
                        ("accounts_receivable".to_string(), json_number(receivables)),
                        ("total_revenue".to_string(), json_number(revenue)),
                        ("receivables_to_revenue".to_string(), json_number(ratio)),
                    ]),
                });
            }
        }
        anomalies
    }
}

/// Benford first-digit violation reported by the forensic library.
pub struct BenfordViolationRule;

impl AnomalyRule for BenfordViolationRule {
    fn type_tag(&self) -> AnomalyType {
        AnomalyType::BenfordViolation
    }

    fn evaluate(&self, ctx: &AnomalyContext<'_>) -> Vec<Anomaly> {
        let Some(benford) = ctx.benford else {
            return Vec::new();
        };
        if !benford.is_anomalous {
            return Vec::new();
        }
        vec![Anomaly {
            anomaly_type: AnomalyType::BenfordViolation,
            severity: Severity::Medium,
            period: "all".to_string(),
            description: benford.interpretation.clone(),
            evidence: BTreeMap::from([
                ("chi_square".to_string(), json_number(benford.chi_square)),
                (
                    "critical_value".to_string(),
                    json_number(benford.critical_value),
                ),
                (
                    "sample_size".to_string(),
                    Value::from(benford.sample_size as u64),
                ),
            ]),
        }]
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AnomalyEngine {
    rules: Vec<Box<dyn AnomalyRule>>,
}

impl AnomalyEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Engine preloaded with the four built-in rules.
    pub fn with_default_rules() -> Self {
        let mut engine = Self::new();
        engine.register(Box::new(RevenueDeclineRule));
        engine.register(Box::new(ProfitCashDivergenceRule));
        engine.register(Box::new(ReceivablesBuildupRule));
        engine.register(Box::new(BenfordViolationRule));
        engine
    }

    pub fn register(&mut self, rule: Box<dyn AnomalyRule>) {
        self.rules.push(rule);
    }

    pub fn rule_tags(&self) -> Vec<AnomalyType> {
        self.rules.iter().map(|r| r.type_tag()).collect()
    }

    /// Evaluate every rule and aggregate. Infallible.
    pub fn detect(&self, ctx: &AnomalyContext<'_>) -> AnomalyOutput {
        let mut anomalies: Vec<Anomaly> = self
            .rules
            .iter()
            .flat_map(|rule| rule.evaluate(ctx))
            .collect();
        anomalies.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.period.cmp(&b.period)));
        AnomalyOutput {
            success: true,
            anomalies_detected: anomalies.len(),
            anomalies,
        }
    }
}

impl Default for AnomalyEngine {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
