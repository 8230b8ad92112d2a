//! Beneish M-Score with the eight year-over-year variables.
//!
//! DSRI, GMI, AQI, SGI, DEPI, SGAI, LVGI and TATA are computed for every
//! consecutive period pair. A variable whose inputs are missing (or whose
//! denominator vanishes) defaults to the neutral value 1 and is recorded;
//! a period with zero or missing revenue defaults all eight and is
//! flagged. M above −1.78 suggests likely earnings manipulation.
//!
//! All arithmetic uses `rust_decimal::Decimal`. No `f64`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ForensicError;
use crate::types::{period_views, CanonicalField, FinancialStatement, PeriodView, Severity};
use crate::ForensicResult;

// Coefficients (Beneish 1999).
const INTERCEPT: Decimal = dec!(-4.84);
const C_DSRI: Decimal = dec!(0.920);
const C_GMI: Decimal = dec!(0.528);
const C_AQI: Decimal = dec!(0.404);
const C_SGI: Decimal = dec!(0.892);
const C_DEPI: Decimal = dec!(0.115);
const C_SGAI: Decimal = dec!(-0.172);
const C_LVGI: Decimal = dec!(-0.327);
const C_TATA: Decimal = dec!(4.679);

pub const MANIPULATION_THRESHOLD: Decimal = dec!(-1.78);

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// The eight component variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MScoreVariables {
    pub dsri: Decimal,
    pub gmi: Decimal,
    pub aqi: Decimal,
    pub sgi: Decimal,
    pub depi: Decimal,
    pub sgai: Decimal,
    pub lvgi: Decimal,
    pub tata: Decimal,
}

/// M-Score for one year-over-year comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MScorePeriod {
    pub prev_period: NaiveDate,
    pub period_end: NaiveDate,
    pub m_score: Decimal,
    pub variables: MScoreVariables,
    pub likely_manipulator: bool,
    pub risk: Severity,
    /// Variables that fell back to the neutral value 1.
    pub defaulted_variables: Vec<String>,
    /// True when a zero/missing revenue period forced the defaults.
    pub revenue_flagged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeneishOutput {
    pub current: MScorePeriod,
    /// All comparisons, ascending by current period.
    pub historical_m_scores: Vec<MScorePeriod>,
}

// ---------------------------------------------------------------------------
// Variable computation
// ---------------------------------------------------------------------------

fn ratio(num: Decimal, den: Decimal) -> Option<Decimal> {
    if den.is_zero() {
        None
    } else {
        Some(num / den)
    }
}

/// Gross margin; falls back to revenue − cost of revenue.
fn gross_margin(view: &PeriodView, sales: Decimal) -> Option<Decimal> {
    let gp = view
        .get(CanonicalField::GrossProfit)
        .or_else(|| Some(sales - view.get(CanonicalField::CostOfRevenue)?))?;
    ratio(gp, sales)
}

/// Soft-asset fraction: 1 − (CA + PPE) / TA.
fn soft_assets(view: &PeriodView) -> Option<Decimal> {
    let ta = view.get(CanonicalField::TotalAssets)?;
    let ca = view.get(CanonicalField::CurrentAssets).unwrap_or(Decimal::ZERO);
    let ppe = view
        .get(CanonicalField::PropertyPlantEquipment)
        .unwrap_or(Decimal::ZERO);
    Some(Decimal::ONE - ratio(ca + ppe, ta)?)
}

fn depreciation_rate(view: &PeriodView) -> Option<Decimal> {
    let dep = view.get(CanonicalField::DepreciationAmortization)?;
    let ppe = view.get(CanonicalField::PropertyPlantEquipment)?;
    ratio(dep, dep + ppe)
}

fn leverage(view: &PeriodView) -> Option<Decimal> {
    let ta = view.get(CanonicalField::TotalAssets)?;
    let ltd = view.get(CanonicalField::LongTermDebt).unwrap_or(Decimal::ZERO);
    let cl = view
        .get(CanonicalField::CurrentLiabilities)
        .unwrap_or(Decimal::ZERO);
    ratio(ltd + cl, ta)
}

fn total_accruals(prev: &PeriodView, curr: &PeriodView) -> Option<Decimal> {
    let ta = curr.get(CanonicalField::TotalAssets)?;
    let wc = |v: &PeriodView| -> Option<Decimal> {
        Some(v.get(CanonicalField::CurrentAssets)? - v.get(CanonicalField::CurrentLiabilities)?)
    };
    let delta_wc = wc(curr)? - wc(prev)?;
    let delta_cash =
        curr.get(CanonicalField::CashAndEquivalents)? - prev.get(CanonicalField::CashAndEquivalents)?;
    let dep = curr.get(CanonicalField::DepreciationAmortization)?;
    ratio(delta_wc - delta_cash - dep, ta)
}

fn compare_periods(prev: &PeriodView, curr: &PeriodView) -> MScorePeriod {
    let mut defaulted: Vec<String> = Vec::new();
    let sales_curr = curr.get(CanonicalField::TotalRevenue).unwrap_or(Decimal::ZERO);
    let sales_prev = prev.get(CanonicalField::TotalRevenue).unwrap_or(Decimal::ZERO);
    let revenue_flagged = sales_curr.is_zero() || sales_prev.is_zero();

    let variables = if revenue_flagged {
        defaulted = vec![
            "dsri".into(),
            "gmi".into(),
            "aqi".into(),
            "sgi".into(),
            "depi".into(),
            "sgai".into(),
            "lvgi".into(),
            "tata".into(),
        ];
        MScoreVariables {
            dsri: Decimal::ONE,
            gmi: Decimal::ONE,
            aqi: Decimal::ONE,
            sgi: Decimal::ONE,
            depi: Decimal::ONE,
            sgai: Decimal::ONE,
            lvgi: Decimal::ONE,
            tata: Decimal::ONE,
        }
    } else {
        let mut var = |name: &str, value: Option<Decimal>| match value {
            Some(v) => v,
            None => {
                defaulted.push(name.to_string());
                Decimal::ONE
            }
        };

        let dsri = var(
            "dsri",
            (|| {
                let cur = ratio(curr.get(CanonicalField::AccountsReceivable)?, sales_curr)?;
                let pri = ratio(prev.get(CanonicalField::AccountsReceivable)?, sales_prev)?;
                ratio(cur, pri)
            })(),
        );
        let gmi = var(
            "gmi",
            (|| ratio(gross_margin(prev, sales_prev)?, gross_margin(curr, sales_curr)?))(),
        );
        let aqi = var(
            "aqi",
            (|| ratio(soft_assets(curr)?, soft_assets(prev)?))(),
        );
        let sgi = var("sgi", ratio(sales_curr, sales_prev));
        let depi = var(
            "depi",
            (|| ratio(depreciation_rate(prev)?, depreciation_rate(curr)?))(),
        );
        let sgai = var(
            "sgai",
            (|| {
                let cur = ratio(curr.get(CanonicalField::SellingGeneralAdmin)?, sales_curr)?;
                let pri = ratio(prev.get(CanonicalField::SellingGeneralAdmin)?, sales_prev)?;
                ratio(cur, pri)
            })(),
        );
        let lvgi = var("lvgi", (|| ratio(leverage(curr)?, leverage(prev)?))());
        let tata = var("tata", total_accruals(prev, curr));

        MScoreVariables {
            dsri,
            gmi,
            aqi,
            sgi,
            depi,
            sgai,
            lvgi,
            tata,
        }
    };

    let m_score = m_score_from_variables(&variables);
    let likely_manipulator = m_score > MANIPULATION_THRESHOLD;
    MScorePeriod {
        prev_period: prev.period_end,
        period_end: curr.period_end,
        m_score,
        variables,
        likely_manipulator,
        risk: if likely_manipulator {
            Severity::High
        } else {
            Severity::Low
        },
        defaulted_variables: defaulted,
        revenue_flagged,
    }
}

/// The Beneish discriminant over a fixed set of variables.
pub fn m_score_from_variables(v: &MScoreVariables) -> Decimal {
    INTERCEPT
        + C_DSRI * v.dsri
        + C_GMI * v.gmi
        + C_AQI * v.aqi
        + C_SGI * v.sgi
        + C_DEPI * v.depi
        + C_SGAI * v.sgai
        + C_LVGI * v.lvgi
        + C_TATA * v.tata
}

// ---------------------------------------------------------------------------
// Core function
// ---------------------------------------------------------------------------

/// Compute M-Scores for every consecutive period pair.
pub fn beneish_m_score(statements: &[FinancialStatement]) -> ForensicResult<BeneishOutput> {
    let views = period_views(statements);
    if views.len() < 2 {
        return Err(ForensicError::InsufficientData(
            "Beneish M-Score needs at least two periods.".into(),
        ));
    }

    let history: Vec<MScorePeriod> = views
        .windows(2)
        .map(|pair| compare_periods(&pair[0], &pair[1]))
        .collect();

    let Some(current) = history.last().cloned() else {
        return Err(ForensicError::InsufficientData(
            "No comparable period pairs.".into(),
        ));
    };

    Ok(BeneishOutput {
        current,
        historical_m_scores: history,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
