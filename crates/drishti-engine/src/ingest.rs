//! Ingest contract.
//!
//! Data connectors (Yahoo, NSE, BSE, FMP) live outside this crate; the
//! orchestrator only knows this async trait. Statements may arrive
//! pre-normalized or raw; the normalizer accepts both.

use std::collections::BTreeMap;

use async_trait::async_trait;
use drishti_core::normalizer::{DataSource, SourceStatement};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestError {
    pub message: String,
    /// Transient failures are retried with backoff; permanent ones fail
    /// the job immediately.
    pub transient: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub financial_statements: Vec<SourceStatement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IngestError>,
}

impl IngestOutcome {
    pub fn success(statements: Vec<SourceStatement>, company_id: Option<String>) -> Self {
        Self {
            success: true,
            financial_statements: statements,
            company_id,
            error: None,
        }
    }

    pub fn failure(message: &str, transient: bool) -> Self {
        Self {
            success: false,
            financial_statements: Vec::new(),
            company_id: None,
            error: Some(IngestError {
                message: message.to_string(),
                transient,
            }),
        }
    }
}

#[async_trait]
pub trait DataIngestor: Send + Sync {
    async fn fetch(&self, symbol: &str, source: DataSource, periods: u32) -> IngestOutcome;
}

// ---------------------------------------------------------------------------
// Fixture-backed ingestor
// ---------------------------------------------------------------------------

/// In-memory ingestor serving preloaded statements. Used by tests and by
/// the CLI's file-backed job mode.
pub struct StaticIngestor {
    statements: BTreeMap<String, Vec<SourceStatement>>,
}

impl StaticIngestor {
    pub fn new() -> Self {
        Self {
            statements: BTreeMap::new(),
        }
    }

    pub fn with_company(mut self, symbol: &str, statements: Vec<SourceStatement>) -> Self {
        self.statements.insert(symbol.to_string(), statements);
        self
    }
}

impl Default for StaticIngestor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataIngestor for StaticIngestor {
    async fn fetch(&self, symbol: &str, _source: DataSource, periods: u32) -> IngestOutcome {
        let Some(statements) = self.statements.get(symbol) else {
            return IngestOutcome::failure(&format!("No data held for '{}'", symbol), false);
        };
        // Keep only the trailing `periods` period-ends.
        let mut period_ends: Vec<String> =
            statements.iter().map(|s| s.period_end.clone()).collect();
        period_ends.sort();
        period_ends.dedup();
        let keep: Vec<String> = period_ends
            .into_iter()
            .rev()
            .take(periods as usize)
            .collect();
        let selected: Vec<SourceStatement> = statements
            .iter()
            .filter(|s| keep.contains(&s.period_end))
            .cloned()
            .collect();
        IngestOutcome::success(selected, Some(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stmt(period: &str) -> SourceStatement {
        SourceStatement {
            statement_type: "income_statement".into(),
            period_end: period.into(),
            currency: None,
            data: BTreeMap::from([("total_revenue".to_string(), json!(100))]),
        }
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_permanent_failure() {
        let ingestor = StaticIngestor::new();
        let outcome = ingestor.fetch("MISSING.NS", DataSource::Yahoo, 2).await;
        assert!(!outcome.success);
        assert!(!outcome.error.unwrap().transient);
    }

    #[tokio::test]
    async fn test_periods_truncated_to_latest() {
        let ingestor = StaticIngestor::new().with_company(
            "TCS.NS",
            vec![stmt("2021-03-31"), stmt("2022-03-31"), stmt("2023-03-31")],
        );
        let outcome = ingestor.fetch("TCS.NS", DataSource::Yahoo, 2).await;
        assert!(outcome.success);
        let periods: Vec<&str> = outcome
            .financial_statements
            .iter()
            .map(|s| s.period_end.as_str())
            .collect();
        assert_eq!(periods.len(), 2);
        assert!(periods.contains(&"2022-03-31"));
        assert!(periods.contains(&"2023-03-31"));
    }

    #[tokio::test]
    async fn test_company_id_reported() {
        let ingestor = StaticIngestor::new().with_company("INFY.NS", vec![stmt("2023-03-31")]);
        let outcome = ingestor.fetch("INFY.NS", DataSource::Nse, 4).await;
        assert_eq!(outcome.company_id.as_deref(), Some("INFY.NS"));
    }
}
