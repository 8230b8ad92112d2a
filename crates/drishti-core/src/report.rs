//! Forensic report assembly.
//!
//! Composes the decomposition analyses, the statistical models and the
//! anomaly rules over one company's normalized statements. Sections whose
//! data requirements are not met are omitted with an explanatory note
//! rather than failing the whole report.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analysis::horizontal::{horizontal_analysis, HorizontalOutput};
use crate::analysis::ratios::{ratio_analysis, RatioOutput};
use crate::analysis::vertical::{vertical_analysis, VerticalOutput};
use crate::anomaly::{Anomaly, AnomalyContext, AnomalyEngine};
use crate::compliance::ComplianceInputs;
use crate::error::ForensicError;
use crate::forensics::altman::{altman_z_score, AltmanOutput};
use crate::forensics::beneish::{beneish_m_score, BeneishOutput};
use crate::forensics::benford::{benford_analysis, BenfordOutput};
use crate::normalizer::validate_balance_sheet;
use crate::risk::RiskInputs;
use crate::types::{FinancialStatement, StatementType};
use crate::ForensicResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicReport {
    pub company_id: String,
    pub analysis_date: NaiveDate,
    pub periods_analyzed: usize,
    pub vertical: VerticalOutput,
    pub horizontal: HorizontalOutput,
    pub ratios: RatioOutput,
    pub altman: Option<AltmanOutput>,
    pub beneish: Option<BeneishOutput>,
    pub benford: Option<BenfordOutput>,
    pub anomalies: Vec<Anomaly>,
    pub anomalies_detected: usize,
    /// Explanations for skipped sections and data-quality findings.
    pub notes: Vec<String>,
}

impl ForensicReport {
    /// Borrow the report as risk-scorer inputs.
    pub fn risk_inputs<'a>(
        &'a self,
        compliance_score: Option<rust_decimal::Decimal>,
        market_sentiment: Option<rust_decimal::Decimal>,
    ) -> RiskInputs<'a> {
        RiskInputs {
            ratios: &self.ratios,
            vertical: &self.vertical,
            horizontal: &self.horizontal,
            altman: self.altman.as_ref(),
            beneish: self.beneish.as_ref(),
            anomalies: &self.anomalies,
            compliance_score,
            market_sentiment,
        }
    }

    /// Borrow the report as compliance-validator inputs.
    pub fn compliance_inputs(&self) -> ComplianceInputs<'_> {
        ComplianceInputs {
            ratios: &self.ratios,
            horizontal: &self.horizontal,
            altman: self.altman.as_ref(),
            beneish: self.beneish.as_ref(),
            anomalies: &self.anomalies,
        }
    }
}

/// Run the full forensic pass over normalized statements.
pub fn analyze_statements(
    company_id: &str,
    analysis_date: NaiveDate,
    statements: &[FinancialStatement],
) -> ForensicResult<ForensicReport> {
    if statements.is_empty() {
        return Err(ForensicError::InsufficientData(
            "No statements to analyze.".into(),
        ));
    }

    let mut notes: Vec<String> = Vec::new();

    for stmt in statements
        .iter()
        .filter(|s| s.statement_type == StatementType::Balance)
    {
        let (ok, findings) = validate_balance_sheet(stmt);
        if !ok {
            notes.extend(findings);
        }
    }

    let vertical = vertical_analysis(statements)?;
    let horizontal = horizontal_analysis(statements)?;
    let ratios = ratio_analysis(statements)?;

    let altman = match altman_z_score(statements) {
        Ok(out) => Some(out),
        Err(e) => {
            notes.push(format!("Altman Z-Score skipped: {}", e));
            None
        }
    };
    let beneish = match beneish_m_score(statements) {
        Ok(out) => Some(out),
        Err(e) => {
            notes.push(format!("Beneish M-Score skipped: {}", e));
            None
        }
    };
    let benford = match benford_analysis(statements) {
        Ok(out) => Some(out),
        Err(e) => {
            notes.push(format!("Benford analysis skipped: {}", e));
            None
        }
    };

    let detection = AnomalyEngine::with_default_rules().detect(&AnomalyContext {
        statements,
        benford: benford.as_ref(),
    });

    let periods_analyzed = {
        let mut periods: Vec<NaiveDate> = statements.iter().map(|s| s.period_end).collect();
        periods.sort();
        periods.dedup();
        periods.len()
    };

    Ok(ForensicReport {
        company_id: company_id.to_string(),
        analysis_date,
        periods_analyzed,
        vertical,
        horizontal,
        ratios,
        altman,
        beneish,
        benford,
        anomalies_detected: detection.anomalies_detected,
        anomalies: detection.anomalies,
        notes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
