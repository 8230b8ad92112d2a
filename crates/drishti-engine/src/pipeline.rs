//! Stage runners and the per-job result bundle.
//!
//! The analytical stages are pure drishti-core calls; the orchestrator
//! invokes them from blocking worker slots and carries their outputs in
//! an [`AnalysisBundle`] with explicit per-stage status, so a failed job
//! still exposes whatever stages did succeed.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use drishti_core::compliance::{validate_compliance, ComplianceAssessment, RulePack};
use drishti_core::normalizer::{normalize, DataSource, SourceStatement};
use drishti_core::report::{analyze_statements, ForensicReport};
use drishti_core::risk::{assess_risk, RiskAssessment};
use drishti_core::ForensicResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Forensic,
    Risk,
    Compliance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum StageStatus {
    Pending,
    Succeeded,
    Failed(String),
    Skipped,
}

/// Result bundle handed to the external report renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub company_symbol: String,
    pub assessment_date: NaiveDate,
    pub forensic: Option<ForensicReport>,
    pub risk: Option<RiskAssessment>,
    pub compliance: Option<ComplianceAssessment>,
    pub stage_status: BTreeMap<Stage, StageStatus>,
}

impl AnalysisBundle {
    pub fn new(company_symbol: &str, assessment_date: NaiveDate) -> Self {
        let stage_status = [Stage::Ingest, Stage::Forensic, Stage::Risk, Stage::Compliance]
            .into_iter()
            .map(|stage| (stage, StageStatus::Pending))
            .collect();
        Self {
            company_symbol: company_symbol.to_string(),
            assessment_date,
            forensic: None,
            risk: None,
            compliance: None,
            stage_status,
        }
    }

    pub fn set_stage(&mut self, stage: Stage, status: StageStatus) {
        self.stage_status.insert(stage, status);
    }
}

/// Normalize raw statements and run the full forensic pass. Normalizer
/// warnings are carried into the report notes.
pub fn run_forensic_stage(
    company_id: &str,
    assessment_date: NaiveDate,
    raw: &[SourceStatement],
    source: DataSource,
) -> ForensicResult<ForensicReport> {
    let normalized = normalize(raw, source)?;
    let mut report = analyze_statements(company_id, assessment_date, &normalized.statements)?;
    report.notes.extend(normalized.warnings);
    Ok(report)
}

/// Compliance then risk over a finished forensic report. Compliance runs
/// first so the risk scorer sees the real compliance score instead of its
/// placeholder; when compliance is not requested the risk scorer degrades
/// to the placeholder with reduced confidence.
pub fn run_scoring_stage(
    report: &ForensicReport,
    rule_pack: &RulePack,
    assessment_date: NaiveDate,
    analysis_types: &BTreeSet<String>,
) -> (Option<ComplianceAssessment>, RiskAssessment) {
    let compliance = analysis_types.contains("compliance").then(|| {
        validate_compliance(
            &report.company_id,
            assessment_date,
            rule_pack,
            &report.compliance_inputs(),
        )
    });
    let compliance_score = compliance.as_ref().map(|c| c.overall_score);
    let risk = assess_risk(
        &report.company_id,
        assessment_date,
        &report.risk_inputs(compliance_score, None),
    );
    (compliance, risk)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use drishti_core::compliance::ComplianceStatus;
    use drishti_core::risk::RiskCategory;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn raw_statement(
        stype: &str,
        period: &str,
        data: &[(&str, serde_json::Value)],
    ) -> SourceStatement {
        SourceStatement {
            statement_type: stype.into(),
            period_end: period.into(),
            currency: None,
            data: data
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    pub(crate) fn healthy_raw_statements() -> Vec<SourceStatement> {
        vec![
            raw_statement(
                "income_statement",
                "2022-03-31",
                &[
                    ("total_revenue", json!(900_000)),
                    ("cost_of_revenue", json!(540_000)),
                    ("gross_profit", json!(360_000)),
                    ("operating_income", json!(170_000)),
                    ("net_profit", json!(130_000)),
                    ("interest_expense", json!(28_000)),
                    ("tax_expense", json!(45_000)),
                    ("depreciation_amortization", json!(75_000)),
                ],
            ),
            raw_statement(
                "income_statement",
                "2023-03-31",
                &[
                    ("total_revenue", json!(1_000_000)),
                    ("cost_of_revenue", json!(600_000)),
                    ("gross_profit", json!(400_000)),
                    ("operating_income", json!(200_000)),
                    ("net_profit", json!(150_000)),
                    ("interest_expense", json!(30_000)),
                    ("tax_expense", json!(50_000)),
                    ("depreciation_amortization", json!(80_000)),
                ],
            ),
            raw_statement(
                "balance_sheet",
                "2022-03-31",
                &[
                    ("total_assets", json!(1_800_000)),
                    ("current_assets", json!(800_000)),
                    ("cash_and_equivalents", json!(210_000)),
                    ("accounts_receivable", json!(160_000)),
                    ("inventory", json!(110_000)),
                    ("property_plant_equipment", json!(790_000)),
                    ("current_liabilities", json!(420_000)),
                    ("total_liabilities", json!(900_000)),
                    ("total_equity", json!(900_000)),
                    ("retained_earnings", json!(700_000)),
                ],
            ),
            raw_statement(
                "balance_sheet",
                "2023-03-31",
                &[
                    ("total_assets", json!(2_000_000)),
                    ("current_assets", json!(900_000)),
                    ("cash_and_equivalents", json!(250_000)),
                    ("accounts_receivable", json!(180_000)),
                    ("inventory", json!(120_000)),
                    ("property_plant_equipment", json!(850_000)),
                    ("current_liabilities", json!(450_000)),
                    ("total_liabilities", json!(1_000_000)),
                    ("total_equity", json!(1_000_000)),
                    ("retained_earnings", json!(800_000)),
                ],
            ),
            raw_statement(
                "cash_flow",
                "2022-03-31",
                &[
                    ("operating_cash_flow", json!(165_000)),
                    ("capital_expenditure", json!(60_000)),
                ],
            ),
            raw_statement(
                "cash_flow",
                "2023-03-31",
                &[
                    ("operating_cash_flow", json!(190_000)),
                    ("capital_expenditure", json!(70_000)),
                ],
            ),
        ]
    }

    #[test]
    fn test_forensic_stage_end_to_end() {
        let report = run_forensic_stage(
            "TEST.NS",
            date("2023-04-15"),
            &healthy_raw_statements(),
            DataSource::Yahoo,
        )
        .unwrap();
        assert_eq!(report.periods_analyzed, 2);
        assert!(report.anomalies.is_empty());
        assert_eq!(
            report.ratios.latest().unwrap().get("current_ratio"),
            Some(dec!(2.00))
        );
    }

    #[test]
    fn test_forensic_stage_empty_input_fails() {
        let result = run_forensic_stage("TEST.NS", date("2023-04-15"), &[], DataSource::Yahoo);
        assert!(result.is_err());
    }

    #[test]
    fn test_scoring_stage_feeds_compliance_into_risk() {
        let report = run_forensic_stage(
            "TEST.NS",
            date("2023-04-15"),
            &healthy_raw_statements(),
            DataSource::Yahoo,
        )
        .unwrap();
        let (compliance, risk) = run_scoring_stage(
            &report,
            &RulePack::builtin(),
            date("2023-04-15"),
            &crate::job::JobRequest::default_analysis_types(),
        );
        let compliance = compliance.unwrap();
        assert_eq!(compliance.status, ComplianceStatus::Compliant);
        // Risk consumed the real compliance score, not the placeholder.
        let cr = &risk.category_scores[&RiskCategory::ComplianceRisk];
        assert_eq!(cr.confidence, dec!(0.9));
        assert!(risk.overall_score < dec!(50));
    }

    #[test]
    fn test_scoring_stage_without_compliance() {
        let report = run_forensic_stage(
            "TEST.NS",
            date("2023-04-15"),
            &healthy_raw_statements(),
            DataSource::Yahoo,
        )
        .unwrap();
        let types: BTreeSet<String> = ["forensic", "risk"].into_iter().map(String::from).collect();
        let (compliance, risk) =
            run_scoring_stage(&report, &RulePack::builtin(), date("2023-04-15"), &types);
        assert!(compliance.is_none());
        let cr = &risk.category_scores[&RiskCategory::ComplianceRisk];
        assert_eq!(cr.score, dec!(30));
        assert_eq!(cr.confidence, dec!(0.5));
    }

    #[test]
    fn test_bundle_stage_tracking() {
        let mut bundle = AnalysisBundle::new("TEST.NS", date("2023-04-15"));
        assert_eq!(bundle.stage_status.len(), 4);
        assert!(bundle
            .stage_status
            .values()
            .all(|s| *s == StageStatus::Pending));
        bundle.set_stage(Stage::Ingest, StageStatus::Succeeded);
        bundle.set_stage(Stage::Forensic, StageStatus::Failed("boom".into()));
        assert_eq!(bundle.stage_status[&Stage::Ingest], StageStatus::Succeeded);
        assert_eq!(
            bundle.stage_status[&Stage::Forensic],
            StageStatus::Failed("boom".into())
        );
    }

    #[test]
    fn test_bundle_roundtrip() {
        let report = run_forensic_stage(
            "TEST.NS",
            date("2023-04-15"),
            &healthy_raw_statements(),
            DataSource::Yahoo,
        )
        .unwrap();
        let (compliance, risk) = run_scoring_stage(
            &report,
            &RulePack::builtin(),
            date("2023-04-15"),
            &crate::job::JobRequest::default_analysis_types(),
        );
        let mut bundle = AnalysisBundle::new("TEST.NS", date("2023-04-15"));
        bundle.forensic = Some(report);
        bundle.risk = Some(risk);
        bundle.compliance = compliance;
        for stage in [Stage::Ingest, Stage::Forensic, Stage::Risk, Stage::Compliance] {
            bundle.set_stage(stage, StageStatus::Succeeded);
        }
        let json = serde_json::to_string(&bundle).unwrap();
        let back: AnalysisBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(
            serde_json::to_value(&back).unwrap(),
            serde_json::to_value(&bundle).unwrap()
        );
    }
}
