//! Composite risk scoring.
//!
//! Six weighted risk categories, each scored 0-100 (higher = riskier) by
//! additive penalties over the forensic outputs, fused into an overall
//! score with fixed weights summing to exactly 1. Missing inputs degrade
//! a category's confidence, never its presence: a category with no signal
//! at all holds the neutral placeholder 30.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::analysis::horizontal::HorizontalOutput;
use crate::analysis::ratios::RatioOutput;
use crate::analysis::vertical::VerticalOutput;
use crate::anomaly::Anomaly;
use crate::forensics::altman::{AltmanOutput, ZoneClassification};
use crate::forensics::beneish::BeneishOutput;
use crate::types::{Severity, StatementType};

/// Neutral score used when a category has no usable signal.
const NEUTRAL_SCORE: Decimal = dec!(30);

// ---------------------------------------------------------------------------
// Categories and levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCategory {
    FinancialStability,
    MarketRisk,
    OperationalRisk,
    GrowthSustainability,
    ComplianceRisk,
    LiquidityRisk,
}

impl RiskCategory {
    pub const ALL: &'static [RiskCategory] = &[
        RiskCategory::FinancialStability,
        RiskCategory::MarketRisk,
        RiskCategory::OperationalRisk,
        RiskCategory::GrowthSustainability,
        RiskCategory::ComplianceRisk,
        RiskCategory::LiquidityRisk,
    ];

    /// Fixed fusion weight. The six weights sum to exactly 1.
    pub fn weight(&self) -> Decimal {
        match self {
            Self::FinancialStability => dec!(0.25),
            Self::MarketRisk => dec!(0.20),
            Self::OperationalRisk => dec!(0.15),
            Self::GrowthSustainability => dec!(0.15),
            Self::ComplianceRisk => dec!(0.15),
            Self::LiquidityRisk => dec!(0.10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: Decimal) -> Self {
        if score < dec!(30) {
            Self::Low
        } else if score < dec!(50) {
            Self::Medium
        } else if score < dec!(70) {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::Low => "RECOMMENDED",
            Self::Medium => "CAUTION",
            Self::High => "AVOID",
            Self::Critical => "STRONG AVOID",
        }
    }

    pub fn monitoring_frequency(&self) -> &'static str {
        match self {
            Self::Low => "QUARTERLY",
            Self::Medium => "MONTHLY",
            Self::High => "WEEKLY",
            Self::Critical => "DAILY",
        }
    }
}

// ---------------------------------------------------------------------------
// Input / Output
// ---------------------------------------------------------------------------

/// Everything the scorer consumes. All references to prior stage outputs;
/// the scorer itself performs no I/O.
pub struct RiskInputs<'a> {
    pub ratios: &'a RatioOutput,
    pub vertical: &'a VerticalOutput,
    pub horizontal: &'a HorizontalOutput,
    pub altman: Option<&'a AltmanOutput>,
    pub beneish: Option<&'a BeneishOutput>,
    pub anomalies: &'a [Anomaly],
    /// Overall compliance score 0-100, when the validator has run.
    pub compliance_score: Option<Decimal>,
    /// External sentiment risk 0-100, injected; absent means neutral.
    pub market_sentiment: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: Decimal,
    pub weight: Decimal,
    pub confidence: Decimal,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub company_id: String,
    pub assessment_date: NaiveDate,
    pub overall_score: Decimal,
    pub level: RiskLevel,
    pub category_scores: BTreeMap<RiskCategory, CategoryScore>,
    pub investment_recommendation: String,
    pub monitoring_frequency: String,
}

impl RiskAssessment {
    /// Factors of the riskiest categories first.
    pub fn key_risk_factors(&self) -> Vec<String> {
        let mut ranked: Vec<(&RiskCategory, &CategoryScore)> =
            self.category_scores.iter().collect();
        ranked.sort_by(|a, b| b.1.score.cmp(&a.1.score));
        ranked
            .into_iter()
            .flat_map(|(_, cs)| cs.factors.iter().cloned())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Category builder
// ---------------------------------------------------------------------------

struct CategoryBuilder {
    score: Decimal,
    penalized: bool,
    present: u32,
    required: u32,
    factors: Vec<String>,
    recommendations: Vec<String>,
}

impl CategoryBuilder {
    fn new(required: u32) -> Self {
        Self {
            score: Decimal::ZERO,
            penalized: false,
            present: 0,
            required,
            factors: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    fn mark_present(&mut self) {
        self.present += 1;
    }

    fn penalty(&mut self, points: Decimal, factor: &str) {
        self.score += points;
        self.penalized = true;
        self.factors.push(factor.to_string());
    }

    fn bonus(&mut self, points: Decimal) {
        self.score -= points;
    }

    fn recommend(&mut self, text: &str) {
        self.recommendations.push(text.to_string());
    }

    fn finish(mut self, weight: Decimal) -> CategoryScore {
        if self.present == 0 && !self.penalized {
            self.score = NEUTRAL_SCORE;
            self.factors
                .push("Insufficient data; neutral placeholder applied.".into());
        }
        let score = self.score.clamp(Decimal::ZERO, dec!(100));
        let confidence = if self.required == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(self.present) / Decimal::from(self.required)).round_dp(2)
        };
        CategoryScore {
            score,
            weight,
            confidence,
            factors: self.factors,
            recommendations: self.recommendations,
        }
    }
}

// ---------------------------------------------------------------------------
// Category scoring
// ---------------------------------------------------------------------------

/// An M-Score built mostly from neutral defaults is noise, not signal:
/// the manipulation penalty applies only when at least half of the eight
/// variables were actually computed from data.
fn credible_manipulation_signal(beneish: Option<&BeneishOutput>) -> bool {
    beneish
        .map(|b| {
            b.current.likely_manipulator
                && !b.current.revenue_flagged
                && b.current.defaulted_variables.len() <= 4
        })
        .unwrap_or(false)
}

fn latest_ratio(inputs: &RiskInputs<'_>, name: &str) -> Option<Decimal> {
    inputs.ratios.latest().and_then(|p| p.get(name))
}

fn income_growth(inputs: &RiskInputs<'_>, field_key: &str) -> Option<Decimal> {
    inputs
        .horizontal
        .latest(StatementType::Income)
        .and_then(|c| c.growth.get(field_key).copied().flatten())
}

fn financial_stability(inputs: &RiskInputs<'_>) -> CategoryScore {
    let mut cat = CategoryBuilder::new(6);

    if let Some(margin) = latest_ratio(inputs, "net_margin_pct") {
        cat.mark_present();
        if margin < Decimal::ZERO {
            cat.penalty(dec!(35), "Net margin is negative.");
            cat.recommend("Investigate loss drivers and cost structure.");
        } else if margin < dec!(5) {
            cat.penalty(dec!(20), "Net margin below 5%.");
        } else if margin < dec!(10) {
            cat.penalty(dec!(10), "Net margin below 10%.");
        }
    }
    if let Some(roe) = latest_ratio(inputs, "return_on_equity_pct") {
        cat.mark_present();
        if roe < Decimal::ZERO {
            cat.penalty(dec!(20), "Return on equity is negative.");
        } else if roe < dec!(5) {
            cat.penalty(dec!(15), "Return on equity below 5%.");
        } else if roe < dec!(10) {
            cat.penalty(dec!(8), "Return on equity below 10%.");
        }
    }
    if let Some(de) = latest_ratio(inputs, "debt_to_equity") {
        cat.mark_present();
        if de > dec!(2) {
            cat.penalty(dec!(20), "Debt-to-equity above 2x.");
            cat.recommend("Deleveraging plan needed to restore balance-sheet headroom.");
        } else if de > dec!(1) {
            cat.penalty(dec!(10), "Debt-to-equity above 1x.");
        }
    }
    if let Some(cr) = latest_ratio(inputs, "current_ratio") {
        cat.mark_present();
        if cr < Decimal::ONE {
            cat.penalty(dec!(15), "Current ratio below 1.");
        }
    }
    if let Some(altman) = inputs.altman {
        cat.mark_present();
        match altman.current.classification {
            ZoneClassification::Distress => {
                cat.penalty(dec!(25), "Altman Z-Score in distress zone.");
                cat.recommend("Review solvency and refinancing runway.");
            }
            ZoneClassification::Grey => {
                cat.penalty(dec!(10), "Altman Z-Score in grey zone.");
            }
            ZoneClassification::Safe => {}
        }
    }
    if inputs.beneish.is_some() {
        cat.mark_present();
        if credible_manipulation_signal(inputs.beneish) {
            cat.penalty(
                dec!(70),
                "Beneish M-Score indicates likely earnings manipulation.",
            );
            cat.recommend("Commission an independent audit of revenue recognition.");
        }
    }
    for anomaly in inputs.anomalies {
        let points = match anomaly.severity {
            Severity::Critical => dec!(20),
            Severity::High => dec!(15),
            Severity::Medium => dec!(8),
            Severity::Low => dec!(3),
        };
        cat.penalty(
            points,
            &format!("Anomaly detected: {}", anomaly.description),
        );
    }
    // Stable twin growth earns back some headroom.
    let revenue_growth = income_growth(inputs, "total_revenue_growth_pct");
    let profit_growth = income_growth(inputs, "net_profit_growth_pct");
    if let (Some(rg), Some(pg)) = (revenue_growth, profit_growth) {
        if rg > Decimal::ZERO && pg > Decimal::ZERO {
            cat.bonus(dec!(10));
        }
    }

    cat.finish(RiskCategory::FinancialStability.weight())
}

fn liquidity_risk(inputs: &RiskInputs<'_>) -> CategoryScore {
    let mut cat = CategoryBuilder::new(4);

    if let Some(cr) = latest_ratio(inputs, "current_ratio") {
        cat.mark_present();
        if cr < dec!(0.8) {
            cat.penalty(dec!(40), "Current ratio below 0.8.");
            cat.recommend("Secure committed short-term credit lines.");
        } else if cr < Decimal::ONE {
            cat.penalty(dec!(30), "Current ratio below 1.");
        } else if cr < dec!(1.5) {
            cat.penalty(dec!(15), "Current ratio below 1.5.");
        }
    }
    if let Some(qr) = latest_ratio(inputs, "quick_ratio") {
        cat.mark_present();
        if qr < dec!(0.5) {
            cat.penalty(dec!(25), "Quick ratio below 0.5.");
        } else if qr < Decimal::ONE {
            cat.penalty(dec!(10), "Quick ratio below 1.");
        }
    }
    if let Some(cashr) = latest_ratio(inputs, "cash_ratio") {
        cat.mark_present();
        if cashr < dec!(0.2) {
            cat.penalty(dec!(15), "Cash ratio below 0.2.");
        }
    }
    // Working-capital trend: liabilities outgrowing current assets.
    let balance_growth = inputs.horizontal.latest(StatementType::Balance);
    if let Some(cmp) = balance_growth {
        let ca = cmp.growth.get("current_assets_growth_pct").copied().flatten();
        let cl = cmp
            .growth
            .get("current_liabilities_growth_pct")
            .copied()
            .flatten();
        if let (Some(ca), Some(cl)) = (ca, cl) {
            cat.mark_present();
            if cl > ca {
                cat.penalty(
                    dec!(10),
                    "Current liabilities growing faster than current assets.",
                );
            }
        }
    }

    cat.finish(RiskCategory::LiquidityRisk.weight())
}

fn operational_risk(inputs: &RiskInputs<'_>) -> CategoryScore {
    let mut cat = CategoryBuilder::new(3);

    if let Some(turnover) = latest_ratio(inputs, "asset_turnover") {
        cat.mark_present();
        if turnover < dec!(0.5) {
            cat.penalty(dec!(15), "Asset turnover below 0.5x.");
        } else if turnover < Decimal::ONE {
            cat.penalty(dec!(8), "Asset turnover below 1x.");
        }
        // Trend against the prior period.
        if inputs.ratios.periods.len() >= 2 {
            let prev = &inputs.ratios.periods[inputs.ratios.periods.len() - 2];
            if let Some(prev_turnover) = prev.get("asset_turnover") {
                if turnover < prev_turnover {
                    cat.penalty(dec!(10), "Asset turnover deteriorating period over period.");
                }
            }
        }
    }

    // Cost-of-revenue share volatility across common-size income statements.
    let cost_pcts: Vec<Decimal> = inputs
        .vertical
        .statements
        .iter()
        .filter(|s| s.statement_type == StatementType::Income && s.error.is_none())
        .filter_map(|s| s.lines.get("cost_of_revenue_pct").copied())
        .collect();
    if cost_pcts.len() >= 2 {
        cat.mark_present();
        let max = cost_pcts.iter().copied().max().unwrap_or(Decimal::ZERO);
        let min = cost_pcts.iter().copied().min().unwrap_or(Decimal::ZERO);
        let swing = max - min;
        if swing > dec!(10) {
            cat.penalty(dec!(15), "Cost-of-revenue share swings above 10 points.");
            cat.recommend("Stabilize input-cost exposure or pricing pass-through.");
        } else if swing > dec!(5) {
            cat.penalty(dec!(8), "Cost-of-revenue share swings above 5 points.");
        }
    }

    // Operating margin from the latest common-size income statement.
    let op_margin = inputs
        .vertical
        .statements
        .iter()
        .filter(|s| s.statement_type == StatementType::Income && s.error.is_none())
        .last()
        .and_then(|s| s.lines.get("operating_income_pct").copied());
    if let Some(margin) = op_margin {
        cat.mark_present();
        if margin < Decimal::ZERO {
            cat.penalty(dec!(25), "Operating margin is negative.");
        } else if margin < dec!(10) {
            cat.penalty(dec!(10), "Operating margin below 10%.");
        }
    }

    cat.finish(RiskCategory::OperationalRisk.weight())
}

fn market_risk(inputs: &RiskInputs<'_>) -> CategoryScore {
    let mut cat = CategoryBuilder::new(2);

    // Revenue volatility across all income comparisons.
    let growth_rates: Vec<Decimal> = inputs
        .horizontal
        .comparisons
        .iter()
        .filter(|c| c.statement_type == StatementType::Income)
        .filter_map(|c| c.growth.get("total_revenue_growth_pct").copied().flatten())
        .collect();
    if !growth_rates.is_empty() {
        cat.mark_present();
        let max = growth_rates.iter().copied().max().unwrap_or(Decimal::ZERO);
        let min = growth_rates.iter().copied().min().unwrap_or(Decimal::ZERO);
        if growth_rates.len() >= 2 {
            let spread = max - min;
            if spread > dec!(30) {
                cat.penalty(dec!(20), "Revenue growth spread above 30 points.");
            } else if spread > dec!(15) {
                cat.penalty(dec!(10), "Revenue growth spread above 15 points.");
            }
        }
        if min < dec!(-20) {
            cat.penalty(dec!(20), "Revenue contracted more than 20% in a period.");
        }
        if max > dec!(40) {
            cat.penalty(dec!(10), "Revenue swung up more than 40% in a period.");
        }
    }

    // Injected sentiment, neutral 30 when absent.
    match inputs.market_sentiment {
        Some(sentiment) => {
            cat.mark_present();
            cat.penalty(
                sentiment.clamp(Decimal::ZERO, dec!(100)),
                "External market sentiment signal.",
            );
        }
        None => {
            cat.penalty(NEUTRAL_SCORE, "No sentiment feed; neutral market baseline.");
        }
    }

    if credible_manipulation_signal(inputs.beneish) {
        cat.penalty(
            dec!(30),
            "Disclosure repricing risk from suspected earnings manipulation.",
        );
    }

    cat.finish(RiskCategory::MarketRisk.weight())
}

fn growth_sustainability(inputs: &RiskInputs<'_>) -> CategoryScore {
    let mut cat = CategoryBuilder::new(3);

    let revenue_growth = income_growth(inputs, "total_revenue_growth_pct");
    let profit_growth = income_growth(inputs, "net_profit_growth_pct");

    if let Some(rg) = revenue_growth {
        cat.mark_present();
        if rg < Decimal::ZERO {
            cat.penalty(dec!(30), "Revenue is contracting.");
            cat.recommend("Reassess demand pipeline and pricing strategy.");
        } else if rg < dec!(5) {
            cat.penalty(dec!(15), "Revenue growth below 5%.");
        } else if rg > dec!(50) {
            cat.penalty(dec!(10), "Revenue growth above 50% is hard to sustain.");
        }
    }
    if let Some(pg) = profit_growth {
        cat.mark_present();
        if pg < Decimal::ZERO {
            cat.penalty(dec!(20), "Net profit is contracting.");
        }
        if let Some(rg) = revenue_growth {
            if pg < rg {
                cat.penalty(dec!(10), "Profit growing slower than revenue.");
            }
        }
    }
    // Reinvestment: capex coverage of operating cash flow.
    let capex_growth = inputs
        .horizontal
        .latest(StatementType::CashFlow)
        .and_then(|c| {
            c.growth
                .get("capital_expenditure_growth_pct")
                .copied()
                .flatten()
        });
    if let Some(cg) = capex_growth {
        cat.mark_present();
        if cg < dec!(-25) {
            cat.penalty(dec!(10), "Capital expenditure cut by more than 25%.");
        }
    }
    if credible_manipulation_signal(inputs.beneish) {
        cat.penalty(
            dec!(60),
            "Reported growth quality suspect under the Beneish screen.",
        );
    }
    if let Some(altman) = inputs.altman {
        if altman.current.classification == ZoneClassification::Distress {
            cat.penalty(dec!(15), "Distress-zone solvency limits reinvestment capacity.");
        }
    }

    cat.finish(RiskCategory::GrowthSustainability.weight())
}

fn compliance_risk(inputs: &RiskInputs<'_>) -> CategoryScore {
    let mut cat = CategoryBuilder::new(1);
    match inputs.compliance_score {
        Some(score) => {
            cat.mark_present();
            let inverted = (dec!(100) - score).clamp(Decimal::ZERO, dec!(100));
            if inverted > Decimal::ZERO {
                cat.penalty(inverted, "Compliance score shortfall.");
            }
            if inverted > dec!(40) {
                cat.recommend("Remediate open regulatory violations before next review.");
            }
        }
        None => {
            cat.penalty(
                NEUTRAL_SCORE,
                "Compliance validation unavailable; placeholder risk applied.",
            );
        }
    }
    let mut score = cat.finish(RiskCategory::ComplianceRisk.weight());
    // Placeholder carries reduced confidence rather than absence.
    if inputs.compliance_score.is_none() {
        score.confidence = dec!(0.5);
    } else {
        score.confidence = dec!(0.9);
    }
    score
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Fuse the six category scores into a composite assessment. Infallible:
/// missing inputs show up as degraded confidence and neutral placeholders.
pub fn assess_risk(
    company_id: &str,
    assessment_date: NaiveDate,
    inputs: &RiskInputs<'_>,
) -> RiskAssessment {
    let mut category_scores = BTreeMap::new();
    category_scores.insert(RiskCategory::FinancialStability, financial_stability(inputs));
    category_scores.insert(RiskCategory::MarketRisk, market_risk(inputs));
    category_scores.insert(RiskCategory::OperationalRisk, operational_risk(inputs));
    category_scores.insert(
        RiskCategory::GrowthSustainability,
        growth_sustainability(inputs),
    );
    category_scores.insert(RiskCategory::ComplianceRisk, compliance_risk(inputs));
    category_scores.insert(RiskCategory::LiquidityRisk, liquidity_risk(inputs));

    let overall_score: Decimal = category_scores
        .values()
        .map(|cs| cs.score * cs.weight)
        .sum();
    let level = RiskLevel::from_score(overall_score);

    RiskAssessment {
        company_id: company_id.to_string(),
        assessment_date,
        overall_score,
        level,
        category_scores,
        investment_recommendation: level.recommendation().to_string(),
        monitoring_frequency: level.monitoring_frequency().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::horizontal::horizontal_analysis;
    use crate::analysis::ratios::ratio_analysis;
    use crate::analysis::vertical::vertical_analysis;
    use crate::anomaly::{AnomalyContext, AnomalyEngine};
    use crate::forensics::altman::altman_z_score;
    use crate::forensics::beneish::{beneish_m_score, MScoreVariables};
    use crate::types::{CanonicalField, FinancialStatement};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn statement(
        statement_type: StatementType,
        period: &str,
        data: &[(CanonicalField, Decimal)],
    ) -> FinancialStatement {
        FinancialStatement {
            statement_type,
            period_end: period.parse().unwrap(),
            currency: "INR".into(),
            data: data.iter().cloned().collect(),
        }
    }

    /// Two clean periods of a growing, profitable company.
    fn healthy_statements() -> Vec<FinancialStatement> {
        vec![
            statement(
                StatementType::Income,
                "2022-03-31",
                &[
                    (CanonicalField::TotalRevenue, dec!(900_000)),
                    (CanonicalField::NetProfit, dec!(130_000)),
                    (CanonicalField::OperatingIncome, dec!(170_000)),
                ],
            ),
            statement(
                StatementType::Income,
                "2023-03-31",
                &[
                    (CanonicalField::TotalRevenue, dec!(1_000_000)),
                    (CanonicalField::NetProfit, dec!(150_000)),
                    (CanonicalField::OperatingIncome, dec!(200_000)),
                ],
            ),
            statement(
                StatementType::Balance,
                "2022-03-31",
                &[
                    (CanonicalField::TotalAssets, dec!(1_800_000)),
                    (CanonicalField::TotalEquity, dec!(900_000)),
                    (CanonicalField::TotalLiabilities, dec!(900_000)),
                    (CanonicalField::CurrentAssets, dec!(800_000)),
                    (CanonicalField::CurrentLiabilities, dec!(420_000)),
                    (CanonicalField::RetainedEarnings, dec!(700_000)),
                ],
            ),
            statement(
                StatementType::Balance,
                "2023-03-31",
                &[
                    (CanonicalField::TotalAssets, dec!(2_000_000)),
                    (CanonicalField::TotalEquity, dec!(1_000_000)),
                    (CanonicalField::TotalLiabilities, dec!(1_000_000)),
                    (CanonicalField::CurrentAssets, dec!(900_000)),
                    (CanonicalField::CurrentLiabilities, dec!(450_000)),
                    (CanonicalField::RetainedEarnings, dec!(800_000)),
                ],
            ),
        ]
    }

    fn assess(statements: &[FinancialStatement]) -> RiskAssessment {
        let ratios = ratio_analysis(statements).unwrap();
        let vertical = vertical_analysis(statements).unwrap();
        let horizontal = horizontal_analysis(statements).unwrap();
        let altman = altman_z_score(statements).ok();
        let beneish = beneish_m_score(statements).ok();
        let anomalies = AnomalyEngine::with_default_rules().detect(&AnomalyContext {
            statements,
            benford: None,
        });
        assess_risk(
            "TEST.NS",
            date("2023-04-15"),
            &RiskInputs {
                ratios: &ratios,
                vertical: &vertical,
                horizontal: &horizontal,
                altman: altman.as_ref(),
                beneish: beneish.as_ref(),
                anomalies: &anomalies.anomalies,
                compliance_score: None,
                market_sentiment: None,
            },
        )
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: Decimal = RiskCategory::ALL.iter().map(|c| c.weight()).sum();
        assert_eq!(total, Decimal::ONE);
    }

    #[test]
    fn test_overall_equals_weighted_sum() {
        let out = assess(&healthy_statements());
        let recomputed: Decimal = out
            .category_scores
            .values()
            .map(|cs| cs.score * cs.weight)
            .sum();
        assert_eq!(out.overall_score, recomputed);
    }

    #[test]
    fn test_all_categories_present() {
        let out = assess(&healthy_statements());
        assert_eq!(out.category_scores.len(), 6);
        for category in RiskCategory::ALL {
            assert!(out.category_scores.contains_key(category));
        }
    }

    #[test]
    fn test_healthy_company_low_or_medium() {
        let out = assess(&healthy_statements());
        assert!(
            out.overall_score < dec!(50),
            "score = {}",
            out.overall_score
        );
        assert!(matches!(out.level, RiskLevel::Low | RiskLevel::Medium));
    }

    #[test]
    fn test_revenue_collapse_penalizes_financial_stability() {
        let healthy = assess(&healthy_statements());
        let collapsed = vec![
            statement(
                StatementType::Income,
                "2022-03-31",
                &[(CanonicalField::TotalRevenue, dec!(150_000))],
            ),
            statement(
                StatementType::Income,
                "2023-03-31",
                &[(CanonicalField::TotalRevenue, dec!(100_000))],
            ),
        ];
        let out = assess(&collapsed);
        let fs = &out.category_scores[&RiskCategory::FinancialStability];
        let fs_healthy = &healthy.category_scores[&RiskCategory::FinancialStability];
        assert!(fs.score > fs_healthy.score);
        assert!(fs
            .factors
            .iter()
            .any(|f| f.contains("Anomaly detected")));
    }

    #[test]
    fn test_manipulation_drives_high_risk() {
        // Beneish-flagged company with receivables-led growth.
        let mut statements = healthy_statements();
        // Receivables spike without cash backing.
        statements[1]
            .data
            .insert(CanonicalField::TotalRevenue, dec!(1_500_000));
        statements[3]
            .data
            .insert(CanonicalField::AccountsReceivable, dec!(500_000));
        statements[2]
            .data
            .insert(CanonicalField::AccountsReceivable, dec!(100_000));
        statements[1]
            .data
            .insert(CanonicalField::OperatingCashFlow, dec!(20_000));
        let out = assess(&statements);
        assert!(
            out.level >= RiskLevel::High,
            "level = {:?}, score = {}",
            out.level,
            out.overall_score
        );
    }

    #[test]
    fn test_compliance_placeholder_confidence() {
        let out = assess(&healthy_statements());
        let cr = &out.category_scores[&RiskCategory::ComplianceRisk];
        assert_eq!(cr.score, dec!(30));
        assert_eq!(cr.confidence, dec!(0.5));
    }

    #[test]
    fn test_compliance_score_inverted() {
        let statements = healthy_statements();
        let ratios = ratio_analysis(&statements).unwrap();
        let vertical = vertical_analysis(&statements).unwrap();
        let horizontal = horizontal_analysis(&statements).unwrap();
        let out = assess_risk(
            "TEST.NS",
            date("2023-04-15"),
            &RiskInputs {
                ratios: &ratios,
                vertical: &vertical,
                horizontal: &horizontal,
                altman: None,
                beneish: None,
                anomalies: &[],
                compliance_score: Some(dec!(40)),
                market_sentiment: None,
            },
        );
        let cr = &out.category_scores[&RiskCategory::ComplianceRisk];
        assert_eq!(cr.score, dec!(60));
        assert_eq!(cr.confidence, dec!(0.9));
    }

    #[test]
    fn test_sentiment_neutral_when_absent() {
        let out = assess(&healthy_statements());
        let mr = &out.category_scores[&RiskCategory::MarketRisk];
        assert!(mr.factors.iter().any(|f| f.contains("neutral")));
        assert_eq!(mr.score, dec!(30));
    }

    #[test]
    fn test_worse_inputs_never_lower_score() {
        // Monotonicity: degrading the margin can only raise the category.
        let good = assess(&healthy_statements());
        let mut statements = healthy_statements();
        statements[1]
            .data
            .insert(CanonicalField::NetProfit, dec!(20_000));
        let bad = assess(&statements);
        assert!(
            bad.category_scores[&RiskCategory::FinancialStability].score
                >= good.category_scores[&RiskCategory::FinancialStability].score
        );
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(RiskLevel::from_score(dec!(29.99)), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(dec!(30)), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(dec!(49.99)), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(dec!(50)), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(dec!(70)), RiskLevel::Critical);
    }

    #[test]
    fn test_recommendation_table() {
        assert_eq!(RiskLevel::Low.recommendation(), "RECOMMENDED");
        assert_eq!(RiskLevel::Medium.recommendation(), "CAUTION");
        assert_eq!(RiskLevel::High.recommendation(), "AVOID");
        assert_eq!(RiskLevel::Critical.recommendation(), "STRONG AVOID");
        assert_eq!(RiskLevel::Low.monitoring_frequency(), "QUARTERLY");
        assert_eq!(RiskLevel::Medium.monitoring_frequency(), "MONTHLY");
        assert_eq!(RiskLevel::High.monitoring_frequency(), "WEEKLY");
        assert_eq!(RiskLevel::Critical.monitoring_frequency(), "DAILY");
    }

    #[test]
    fn test_scores_bounded() {
        let v = MScoreVariables {
            dsri: dec!(3),
            gmi: dec!(3),
            aqi: dec!(3),
            sgi: dec!(3),
            depi: dec!(3),
            sgai: dec!(3),
            lvgi: dec!(3),
            tata: dec!(1),
        };
        assert!(crate::forensics::beneish::m_score_from_variables(&v) > dec!(-1.78));
        let out = assess(&healthy_statements());
        for cs in out.category_scores.values() {
            assert!(cs.score >= Decimal::ZERO && cs.score <= dec!(100));
            assert!(cs.confidence >= Decimal::ZERO && cs.confidence <= Decimal::ONE);
        }
    }

    #[test]
    fn test_key_risk_factors_ranked() {
        let out = assess(&healthy_statements());
        let factors = out.key_risk_factors();
        assert!(!factors.is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let out = assess(&healthy_statements());
        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains("FINANCIAL_STABILITY"));
        let back: RiskAssessment = serde_json::from_str(&json).unwrap();
        assert_eq!(back.overall_score, out.overall_score);
    }
}
