//! Typed event bus between pipeline stages.
//!
//! Stage tasks publish completion events; the orchestrator task is the
//! single consumer and the only place state is mutated, which gives
//! at-most-once delivery and per-symbol ordering for free (one FIFO
//! queue). External observers can tap a best-effort broadcast copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    DataIngestionCompleted,
    ForensicAnalysisCompleted,
    RiskScoringCompleted,
    ComplianceValidationCompleted,
    OrchestratorPipelineStarted,
    OrchestratorPipelineCompleted,
    OrchestratorStageFailed,
    OrchestratorJobFailed,
    OrchestratorJobCancelled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataIngestionCompleted => "DATA_INGESTION_COMPLETED",
            Self::ForensicAnalysisCompleted => "FORENSIC_ANALYSIS_COMPLETED",
            Self::RiskScoringCompleted => "RISK_SCORING_COMPLETED",
            Self::ComplianceValidationCompleted => "COMPLIANCE_VALIDATION_COMPLETED",
            Self::OrchestratorPipelineStarted => "ORCHESTRATOR_PIPELINE_STARTED",
            Self::OrchestratorPipelineCompleted => "ORCHESTRATOR_PIPELINE_COMPLETED",
            Self::OrchestratorStageFailed => "ORCHESTRATOR_STAGE_FAILED",
            Self::OrchestratorJobFailed => "ORCHESTRATOR_JOB_FAILED",
            Self::OrchestratorJobCancelled => "ORCHESTRATOR_JOB_CANCELLED",
        }
    }

    /// Parse a wire name. Unknown types yield None; callers log and drop.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DATA_INGESTION_COMPLETED" => Some(Self::DataIngestionCompleted),
            "FORENSIC_ANALYSIS_COMPLETED" => Some(Self::ForensicAnalysisCompleted),
            "RISK_SCORING_COMPLETED" => Some(Self::RiskScoringCompleted),
            "COMPLIANCE_VALIDATION_COMPLETED" => Some(Self::ComplianceValidationCompleted),
            "ORCHESTRATOR_PIPELINE_STARTED" => Some(Self::OrchestratorPipelineStarted),
            "ORCHESTRATOR_PIPELINE_COMPLETED" => Some(Self::OrchestratorPipelineCompleted),
            "ORCHESTRATOR_STAGE_FAILED" => Some(Self::OrchestratorStageFailed),
            "ORCHESTRATOR_JOB_FAILED" => Some(Self::OrchestratorJobFailed),
            "ORCHESTRATOR_JOB_CANCELLED" => Some(Self::OrchestratorJobCancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_type: EventType,
    pub source_agent: String,
    pub company_symbol: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(
        event_type: EventType,
        source_agent: &str,
        company_symbol: &str,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            source_agent: source_agent.to_string(),
            company_symbol: company_symbol.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Deserialize a wire event, dropping unknown event types with a log
    /// line rather than an error.
    pub fn from_wire(value: &Value) -> Option<Self> {
        let type_str = value.get("event_type")?.as_str()?;
        let Some(event_type) = EventType::parse(type_str) else {
            tracing::warn!(event_type = type_str, "Dropping event of unknown type");
            return None;
        };
        Some(Self {
            event_type,
            source_agent: value
                .get("source_agent")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            company_symbol: value
                .get("company_symbol")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data: value.get("data").cloned().unwrap_or(Value::Null),
            timestamp: value
                .get("timestamp")
                .and_then(|t| serde_json::from_value(t.clone()).ok())
                .unwrap_or_else(Utc::now),
        })
    }

    pub fn job_id(&self) -> Option<&str> {
        self.data.get("job_id").and_then(Value::as_str)
    }
}

/// Publisher half of the bus. Cloneable; held by stage tasks.
#[derive(Clone)]
pub struct EventBus {
    to_orchestrator: mpsc::Sender<AgentEvent>,
    observers: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (to_orchestrator, rx) = mpsc::channel(capacity);
        let (observers, _) = broadcast::channel(capacity);
        (
            Self {
                to_orchestrator,
                observers,
            },
            rx,
        )
    }

    /// Deliver to the orchestrator queue (at most once) and mirror to any
    /// observers. A saturated queue drops the event with a warning.
    pub fn publish(&self, event: AgentEvent) {
        tracing::debug!(
            event_type = event.event_type.as_str(),
            company = %event.company_symbol,
            "Event published"
        );
        let _ = self.observers.send(event.clone());
        if let Err(e) = self.to_orchestrator.try_send(event) {
            tracing::warn!(error = %e, "Event queue saturated; event dropped");
        }
    }

    /// Best-effort observer tap, used by tests and monitoring surfaces.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.observers.subscribe()
    }
}
