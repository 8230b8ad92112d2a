//! Rule-driven compliance validation.
//!
//! A rule pack maps regulatory frameworks (Ind AS, SEBI, Companies Act,
//! RBI) to declarative rules: a metric path, a comparator expressing the
//! requirement, a threshold and a severity. Rules evaluate against a flat
//! metric view assembled from the forensic outputs; failures become typed
//! violations which are weighted into per-framework and overall scores.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::analysis::horizontal::HorizontalOutput;
use crate::analysis::ratios::RatioOutput;
use crate::anomaly::Anomaly;
use crate::forensics::altman::AltmanOutput;
use crate::forensics::beneish::BeneishOutput;
use crate::types::{Severity, StatementType};
use crate::ForensicResult;

// ---------------------------------------------------------------------------
// Rule model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Framework {
    IndAs,
    Sebi,
    CompaniesAct,
    Rbi,
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IndAs => "IND_AS",
            Self::Sebi => "SEBI",
            Self::CompaniesAct => "COMPANIES_ACT",
            Self::Rbi => "RBI",
        };
        write!(f, "{}", s)
    }
}

/// The requirement a metric must satisfy; a violation is emitted when the
/// comparison fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Number(Decimal),
    Set(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Skip the rule; the framework's confidence is downgraded.
    #[default]
    Skip,
    /// Treat the absent value itself as a violation.
    Violate,
    /// Skip, with an additional confidence downgrade.
    DowngradeConfidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub id: String,
    pub framework: Framework,
    pub description: String,
    pub field_path: String,
    pub comparator: Comparator,
    pub threshold: Threshold,
    pub severity: Severity,
    pub reference: String,
    #[serde(default)]
    pub on_missing: MissingValuePolicy,
}

/// The external declarative document: frameworks mapped to their rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulePack {
    pub frameworks: BTreeMap<Framework, Vec<ComplianceRule>>,
}

impl RulePack {
    pub fn from_yaml(doc: &str) -> ForensicResult<Self> {
        Ok(serde_yaml::from_str(doc)?)
    }

    pub fn from_json(doc: &str) -> ForensicResult<Self> {
        Ok(serde_json::from_str(doc)?)
    }

    pub fn rule_count(&self) -> usize {
        self.frameworks.values().map(Vec::len).sum()
    }

    /// Rules registered for one framework; empty when it has none.
    pub fn rules_for(&self, framework: Framework) -> &[ComplianceRule] {
        self.frameworks
            .get(&framework)
            .map(|rules| rules.as_slice())
            .unwrap_or(&[])
    }

    /// Default Indian-market rule pack.
    pub fn builtin() -> Self {
        let rule = |id: &str,
                    framework: Framework,
                    description: &str,
                    field_path: &str,
                    comparator: Comparator,
                    threshold: Threshold,
                    severity: Severity,
                    reference: &str| ComplianceRule {
            id: id.into(),
            framework,
            description: description.into(),
            field_path: field_path.into(),
            comparator,
            threshold,
            severity,
            reference: reference.into(),
            on_missing: MissingValuePolicy::Skip,
        };

        let mut frameworks: BTreeMap<Framework, Vec<ComplianceRule>> = BTreeMap::new();
        frameworks.insert(
            Framework::IndAs,
            vec![
                rule(
                    "IND_AS_LIQ_1",
                    Framework::IndAs,
                    "Current ratio must support the going-concern presumption",
                    "ratios.current_ratio",
                    Comparator::Ge,
                    Threshold::Number(Decimal::ONE),
                    Severity::Medium,
                    "Ind AS 1.25 — going concern",
                ),
                rule(
                    "IND_AS_COV_1",
                    Framework::IndAs,
                    "Operating income must cover finance costs at least 1.5x",
                    "ratios.interest_coverage",
                    Comparator::Ge,
                    Threshold::Number(dec!(1.5)),
                    Severity::Medium,
                    "Ind AS 107 — liquidity risk disclosure",
                ),
            ],
        );
        frameworks.insert(
            Framework::Sebi,
            vec![
                rule(
                    "SEBI_LODR_33",
                    Framework::Sebi,
                    "Revenue deterioration beyond 20% requires board disclosure",
                    "growth.total_revenue_growth_pct",
                    Comparator::Ge,
                    Threshold::Number(dec!(-20)),
                    Severity::High,
                    "SEBI LODR Reg 33 — financial results",
                ),
                rule(
                    "SEBI_PFUTP_M",
                    Framework::Sebi,
                    "Earnings quality screen must not indicate manipulation",
                    "beneish.m_score",
                    Comparator::Le,
                    Threshold::Number(dec!(-1.78)),
                    Severity::High,
                    "SEBI PFUTP Reg 4 — manipulative practices",
                ),
                rule(
                    "SEBI_LODR_30",
                    Framework::Sebi,
                    "No unexplained high-severity anomalies in reported figures",
                    "anomalies.high_or_critical",
                    Comparator::Le,
                    Threshold::Number(Decimal::ZERO),
                    Severity::Medium,
                    "SEBI LODR Reg 30 — material events",
                ),
            ],
        );
        frameworks.insert(
            Framework::CompaniesAct,
            vec![
                rule(
                    "CA_S180_DEBT",
                    Framework::CompaniesAct,
                    "Borrowings should stay within prudent gearing",
                    "ratios.debt_to_equity",
                    Comparator::Le,
                    Threshold::Number(dec!(2)),
                    Severity::Medium,
                    "Companies Act 2013 s.180 — borrowing powers",
                ),
                rule(
                    "CA_S123_DIV",
                    Framework::CompaniesAct,
                    "Returns must be non-negative for dividend capacity",
                    "ratios.return_on_equity_pct",
                    Comparator::Ge,
                    Threshold::Number(Decimal::ZERO),
                    Severity::Low,
                    "Companies Act 2013 s.123 — declaration of dividend",
                ),
            ],
        );
        frameworks.insert(
            Framework::Rbi,
            vec![
                rule(
                    "RBI_SMA_Z",
                    Framework::Rbi,
                    "Solvency score must stay out of incipient-stress territory",
                    "altman.z_score",
                    Comparator::Ge,
                    Threshold::Number(dec!(1.81)),
                    Severity::High,
                    "RBI prudential framework — SMA classification",
                ),
                rule(
                    "RBI_WC_CR",
                    Framework::Rbi,
                    "Working-capital discipline expects a 1.33x current ratio",
                    "ratios.current_ratio",
                    Comparator::Ge,
                    Threshold::Number(dec!(1.33)),
                    Severity::Low,
                    "RBI working capital finance guidance",
                ),
                rule(
                    "RBI_DISTRESS",
                    Framework::Rbi,
                    "Borrower must not classify into the distress zone",
                    "altman.classification",
                    Comparator::NotIn,
                    Threshold::Set(vec!["DISTRESS".into()]),
                    Severity::High,
                    "RBI prudential framework — stressed assets",
                ),
            ],
        );
        RulePack { frameworks }
    }
}

// ---------------------------------------------------------------------------
// Metric view
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(Decimal),
    Text(String),
}

/// Inputs the validator draws its metric view from.
pub struct ComplianceInputs<'a> {
    pub ratios: &'a RatioOutput,
    pub horizontal: &'a HorizontalOutput,
    pub altman: Option<&'a AltmanOutput>,
    pub beneish: Option<&'a BeneishOutput>,
    pub anomalies: &'a [Anomaly],
}

/// Flatten the forensic outputs into `section.metric` paths.
pub fn build_metric_view(inputs: &ComplianceInputs<'_>) -> BTreeMap<String, MetricValue> {
    let mut metrics = BTreeMap::new();

    if let Some(latest) = inputs.ratios.latest() {
        for (name, value) in &latest.ratios {
            if let Some(v) = value {
                metrics.insert(format!("ratios.{}", name), MetricValue::Number(*v));
            }
        }
    }
    if let Some(cmp) = inputs.horizontal.latest(StatementType::Income) {
        for (key, value) in &cmp.growth {
            if let Some(v) = value {
                metrics.insert(format!("growth.{}", key), MetricValue::Number(*v));
            }
        }
    }
    if let Some(altman) = inputs.altman {
        metrics.insert(
            "altman.z_score".into(),
            MetricValue::Number(altman.current.z_score),
        );
        let classification = serde_json::to_value(altman.current.classification)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        metrics.insert(
            "altman.classification".into(),
            MetricValue::Text(classification),
        );
    }
    // A mostly-defaulted M-Score is not evidence; expose it only when at
    // least half the variables were computed from data.
    if let Some(beneish) = inputs.beneish {
        let current = &beneish.current;
        if !current.revenue_flagged && current.defaulted_variables.len() <= 4 {
            metrics.insert(
                "beneish.m_score".into(),
                MetricValue::Number(current.m_score),
            );
        }
    }
    metrics.insert(
        "anomalies.count".into(),
        MetricValue::Number(Decimal::from(inputs.anomalies.len() as u64)),
    );
    let severe = inputs
        .anomalies
        .iter()
        .filter(|a| a.severity >= Severity::High)
        .count();
    metrics.insert(
        "anomalies.high_or_critical".into(),
        MetricValue::Number(Decimal::from(severe as u64)),
    );

    metrics
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub framework: Framework,
    pub severity: Severity,
    pub description: String,
    pub regulatory_reference: String,
    pub detected_value: Option<MetricValue>,
    pub threshold: Threshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub company_id: String,
    pub assessment_date: NaiveDate,
    pub overall_score: Decimal,
    pub status: ComplianceStatus,
    pub framework_scores: BTreeMap<Framework, Decimal>,
    /// Fraction of each framework's rules that could actually evaluate.
    pub framework_confidence: BTreeMap<Framework, Decimal>,
    pub violations: Vec<Violation>,
    pub recommendations: Vec<String>,
    pub next_review_date: NaiveDate,
}

impl ComplianceAssessment {
    /// Violations grouped by severity, worst first.
    pub fn violation_summary(&self) -> BTreeMap<Severity, usize> {
        let mut summary = BTreeMap::new();
        for violation in &self.violations {
            *summary.entry(violation.severity).or_insert(0) += 1;
        }
        summary
    }
}

fn severity_weight(severity: Severity) -> Decimal {
    match severity {
        Severity::Critical => Decimal::ONE,
        Severity::High => dec!(0.6),
        Severity::Medium => dec!(0.3),
        Severity::Low => dec!(0.1),
    }
}

fn compare(value: &MetricValue, comparator: Comparator, threshold: &Threshold) -> Option<bool> {
    match (comparator, value, threshold) {
        (Comparator::Lt, MetricValue::Number(v), Threshold::Number(t)) => Some(v < t),
        (Comparator::Le, MetricValue::Number(v), Threshold::Number(t)) => Some(v <= t),
        (Comparator::Eq, MetricValue::Number(v), Threshold::Number(t)) => Some(v == t),
        (Comparator::Ge, MetricValue::Number(v), Threshold::Number(t)) => Some(v >= t),
        (Comparator::Gt, MetricValue::Number(v), Threshold::Number(t)) => Some(v > t),
        (Comparator::Eq, MetricValue::Text(v), Threshold::Set(set)) => {
            Some(set.first().map(|t| t == v).unwrap_or(false))
        }
        (Comparator::In, MetricValue::Text(v), Threshold::Set(set)) => Some(set.contains(v)),
        (Comparator::NotIn, MetricValue::Text(v), Threshold::Set(set)) => Some(!set.contains(v)),
        (Comparator::In, MetricValue::Number(v), Threshold::Set(set)) => {
            Some(set.contains(&v.to_string()))
        }
        (Comparator::NotIn, MetricValue::Number(v), Threshold::Set(set)) => {
            Some(!set.contains(&v.to_string()))
        }
        _ => None,
    }
}

/// Evaluate a rule pack against a prepared metric view.
pub fn validate_with_metrics(
    company_id: &str,
    assessment_date: NaiveDate,
    pack: &RulePack,
    metrics: &BTreeMap<String, MetricValue>,
) -> ComplianceAssessment {
    let mut framework_scores = BTreeMap::new();
    let mut framework_confidence = BTreeMap::new();
    let mut violations: Vec<Violation> = Vec::new();
    let mut recommendations: Vec<String> = Vec::new();

    for (framework, rules) in &pack.frameworks {
        if rules.is_empty() {
            framework_scores.insert(*framework, dec!(100));
            framework_confidence.insert(*framework, Decimal::ONE);
            continue;
        }
        let rule_count = Decimal::from(rules.len() as u64);
        let mut impact = Decimal::ZERO;
        let mut evaluated = 0u32;

        for rule in rules {
            let value = metrics.get(&rule.field_path);
            match value {
                None => match rule.on_missing {
                    MissingValuePolicy::Skip | MissingValuePolicy::DowngradeConfidence => {}
                    MissingValuePolicy::Violate => {
                        evaluated += 1;
                        impact += severity_weight(rule.severity);
                        violations.push(Violation {
                            rule_id: rule.id.clone(),
                            framework: *framework,
                            severity: rule.severity,
                            description: format!(
                                "{} (required metric '{}' absent)",
                                rule.description, rule.field_path
                            ),
                            regulatory_reference: rule.reference.clone(),
                            detected_value: None,
                            threshold: rule.threshold.clone(),
                        });
                    }
                },
                Some(value) => {
                    // Incompatible comparator/value shapes are treated as
                    // unevaluable, same as a missing metric.
                    if let Some(holds) = compare(value, rule.comparator, &rule.threshold) {
                        evaluated += 1;
                        if !holds {
                            impact += severity_weight(rule.severity);
                            violations.push(Violation {
                                rule_id: rule.id.clone(),
                                framework: *framework,
                                severity: rule.severity,
                                description: rule.description.clone(),
                                regulatory_reference: rule.reference.clone(),
                                detected_value: Some(value.clone()),
                                threshold: rule.threshold.clone(),
                            });
                            recommendations.push(format!(
                                "Address {}: {}.",
                                rule.reference, rule.description
                            ));
                        }
                    }
                }
            }
        }

        let score = (dec!(100) * (Decimal::ONE - impact / rule_count))
            .clamp(Decimal::ZERO, dec!(100))
            .round_dp(2);
        framework_scores.insert(*framework, score);
        framework_confidence.insert(
            *framework,
            (Decimal::from(evaluated) / rule_count).round_dp(2),
        );
    }

    let overall_score = if framework_scores.is_empty() {
        dec!(100)
    } else {
        (framework_scores.values().copied().sum::<Decimal>()
            / Decimal::from(framework_scores.len() as u64))
        .round_dp(2)
    };

    let status = if overall_score >= dec!(85) {
        ComplianceStatus::Compliant
    } else if overall_score >= dec!(60) {
        ComplianceStatus::PartiallyCompliant
    } else {
        ComplianceStatus::NonCompliant
    };

    let review_gap = if status == ComplianceStatus::Compliant {
        Duration::days(90)
    } else {
        Duration::days(30)
    };

    violations.sort_by(|a, b| b.severity.cmp(&a.severity));
    recommendations.dedup();

    ComplianceAssessment {
        company_id: company_id.to_string(),
        assessment_date,
        overall_score,
        status,
        framework_scores,
        framework_confidence,
        violations,
        recommendations,
        next_review_date: assessment_date + review_gap,
    }
}

/// Validate against the forensic outputs directly.
pub fn validate_compliance(
    company_id: &str,
    assessment_date: NaiveDate,
    pack: &RulePack,
    inputs: &ComplianceInputs<'_>,
) -> ComplianceAssessment {
    let metrics = build_metric_view(inputs);
    validate_with_metrics(company_id, assessment_date, pack, &metrics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
