//! Pipeline orchestrator.
//!
//! A single orchestrator task owns all job state: submissions, the
//! pending-job priority queue, stage sequencing over the event bus, the
//! result cache and the terminal-job history. Stage tasks run the pure
//! analytical code in blocking worker slots and report back via events;
//! nothing outside the orchestrator task mutates job tables.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use drishti_core::compliance::RulePack;
use drishti_core::normalizer::SourceStatement;
use drishti_core::report::ForensicReport;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{AgentEvent, EventBus, EventType};
use crate::ingest::{DataIngestor, IngestError};
use crate::job::{Job, JobQueue, JobRequest, JobStatus};
use crate::pipeline::{run_forensic_stage, run_scoring_stage, AnalysisBundle, Stage, StageStatus};

const SOURCE_ORCHESTRATOR: &str = "orchestrator";
const DEADLINE_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

enum Command {
    Submit {
        request: JobRequest,
        reply: oneshot::Sender<EngineResult<String>>,
    },
    Status {
        job_id: String,
        reply: oneshot::Sender<EngineResult<Job>>,
    },
    Cancel {
        job_id: String,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Results {
        job_id: String,
        reply: oneshot::Sender<EngineResult<Option<AnalysisBundle>>>,
    },
    ReloadRules {
        rule_pack: Box<RulePack>,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Shutdown,
}

/// Cloneable client for a spawned orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    cmd_tx: mpsc::Sender<Command>,
    bus: EventBus,
}

impl OrchestratorHandle {
    async fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<EngineResult<T>>) -> Command,
    ) -> EngineResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::Internal("orchestrator stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| EngineError::Internal("orchestrator dropped reply".into()))?
    }

    pub async fn submit(&self, request: JobRequest) -> EngineResult<String> {
        self.send(|reply| Command::Submit { request, reply }).await
    }

    pub async fn status(&self, job_id: &str) -> EngineResult<Job> {
        let job_id = job_id.to_string();
        self.send(|reply| Command::Status { job_id, reply }).await
    }

    pub async fn cancel(&self, job_id: &str) -> EngineResult<()> {
        let job_id = job_id.to_string();
        self.send(|reply| Command::Cancel { job_id, reply }).await
    }

    pub async fn results(&self, job_id: &str) -> EngineResult<Option<AnalysisBundle>> {
        let job_id = job_id.to_string();
        self.send(|reply| Command::Results { job_id, reply }).await
    }

    /// Swap the compliance rule pack. Jobs whose scoring stage has not
    /// started yet pick up the new pack.
    pub async fn reload_rules(&self, rule_pack: RulePack) -> EngineResult<()> {
        let rule_pack = Box::new(rule_pack);
        self.send(|reply| Command::ReloadRules { rule_pack, reply })
            .await
    }

    /// Best-effort tap on the event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<AgentEvent> {
        self.bus.subscribe()
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Orchestrator state
// ---------------------------------------------------------------------------

struct CacheEntry {
    bundle: AnalysisBundle,
    stored_at: Instant,
}

struct OrchestratorState {
    config: EngineConfig,
    ingestor: Arc<dyn DataIngestor>,
    rule_pack: Arc<RulePack>,
    bus: EventBus,
    /// Pending and running jobs.
    active: HashMap<String, Job>,
    /// Jobs dispatched into the pipeline and not yet terminal.
    in_flight: HashSet<String>,
    queue: JobQueue,
    history: VecDeque<Job>,
    bundles: HashMap<String, AnalysisBundle>,
    cache: HashMap<String, CacheEntry>,
    deadlines: HashMap<String, Instant>,
}

pub struct Orchestrator;

impl Orchestrator {
    /// Start the orchestrator task and return its handle.
    pub fn spawn(
        config: EngineConfig,
        ingestor: Arc<dyn DataIngestor>,
        rule_pack: RulePack,
    ) -> OrchestratorHandle {
        let (bus, event_rx) = EventBus::new(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let state = OrchestratorState {
            queue: JobQueue::new(config.queue_capacity),
            config,
            ingestor,
            rule_pack: Arc::new(rule_pack),
            bus: bus.clone(),
            active: HashMap::new(),
            in_flight: HashSet::new(),
            history: VecDeque::new(),
            bundles: HashMap::new(),
            cache: HashMap::new(),
            deadlines: HashMap::new(),
        };
        tokio::spawn(run_loop(state, cmd_rx, event_rx));
        OrchestratorHandle { cmd_tx, bus }
    }
}

async fn run_loop(
    mut state: OrchestratorState,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut event_rx: mpsc::Receiver<AgentEvent>,
) {
    tracing::info!(
        max_concurrent = state.config.max_concurrent_jobs,
        queue_capacity = state.config.queue_capacity,
        "Orchestrator started"
    );
    let mut sweep = tokio::time::interval(DEADLINE_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                match command {
                    Some(Command::Submit { request, reply }) => {
                        let _ = reply.send(state.handle_submit(request));
                    }
                    Some(Command::Status { job_id, reply }) => {
                        let _ = reply.send(state.lookup_job(&job_id));
                    }
                    Some(Command::Cancel { job_id, reply }) => {
                        let _ = reply.send(state.handle_cancel(&job_id));
                    }
                    Some(Command::Results { job_id, reply }) => {
                        let _ = reply.send(state.handle_results(&job_id));
                    }
                    Some(Command::ReloadRules { rule_pack, reply }) => {
                        let count = rule_pack.rule_count();
                        state.rule_pack = Arc::new(*rule_pack);
                        tracing::info!(rules = count, "Compliance rule pack reloaded");
                        let _ = reply.send(Ok(()));
                    }
                    Some(Command::Shutdown) | None => {
                        tracing::info!("Orchestrator shutting down");
                        break;
                    }
                }
            }
            event = event_rx.recv() => {
                match event {
                    Some(event) => state.handle_event(event),
                    None => break,
                }
            }
            _ = sweep.tick() => {
                state.sweep_deadlines();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Command handling
// ---------------------------------------------------------------------------

impl OrchestratorState {
    fn handle_submit(&mut self, request: JobRequest) -> EngineResult<String> {
        if request.company_symbol.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "company_symbol must not be empty".into(),
            ));
        }

        let job_id = format!("job_{}", uuid::Uuid::new_v4());
        let job = Job::from_request(job_id.clone(), &request);

        // Cache short-circuit: an unexpired identical submission completes
        // immediately without touching the pipeline.
        if self.config.enable_caching {
            let key = job.cache_key();
            let fresh = self
                .cache
                .get(&key)
                .map(|entry| entry.stored_at.elapsed() < self.config.cache_ttl)
                .unwrap_or(false);
            if fresh {
                let bundle = self.cache.get(&key).map(|entry| entry.bundle.clone());
                if let Some(bundle) = bundle {
                    tracing::info!(job_id = %job_id, key = %key, "Cache hit; completing immediately");
                    let mut job = job;
                    let now = Utc::now();
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    job.started_at = Some(now);
                    job.completed_at = Some(now);
                    self.emit(
                        EventType::OrchestratorPipelineStarted,
                        &job.company_symbol,
                        json!({"job_id": job_id, "cached": true}),
                    );
                    self.emit(
                        EventType::OrchestratorPipelineCompleted,
                        &job.company_symbol,
                        json!({"job_id": job_id, "cached": true}),
                    );
                    self.bundles.insert(job_id.clone(), bundle);
                    self.push_history(job);
                    return Ok(job_id);
                }
            }
        }

        let has_slot = self.in_flight.len() < self.config.max_concurrent_jobs;
        if !has_slot && self.queue.is_full() {
            return Err(EngineError::QueueFull {
                capacity: self.config.queue_capacity,
            });
        }

        self.emit(
            EventType::OrchestratorPipelineStarted,
            &job.company_symbol,
            json!({
                "job_id": job_id,
                "analysis_types": job.analysis_types,
                "source": job.source,
                "periods": job.periods,
            }),
        );
        self.bundles.insert(
            job_id.clone(),
            AnalysisBundle::new(&job.company_symbol, Utc::now().date_naive()),
        );

        if has_slot {
            self.dispatch(&job);
        } else {
            self.queue.push(job_id.clone(), job.priority);
            tracing::debug!(job_id = %job_id, queued = self.queue.len(), "Job queued");
        }
        self.active.insert(job_id.clone(), job);
        Ok(job_id)
    }

    fn lookup_job(&self, job_id: &str) -> EngineResult<Job> {
        if let Some(job) = self.active.get(job_id) {
            return Ok(job.clone());
        }
        self.history
            .iter()
            .find(|job| job.job_id == job_id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidJobId(job_id.to_string()))
    }

    fn handle_cancel(&mut self, job_id: &str) -> EngineResult<()> {
        if self.history.iter().any(|job| job.job_id == job_id) {
            return Err(EngineError::JobAlreadyTerminal(job_id.to_string()));
        }
        let Some(mut job) = self.active.remove(job_id) else {
            return Err(EngineError::InvalidJobId(job_id.to_string()));
        };
        self.queue.remove(job_id);
        // An in-flight stage keeps running; its completion event will find
        // the job terminal and be discarded.
        self.in_flight.remove(job_id);
        self.deadlines.remove(job_id);
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        tracing::info!(job_id = %job_id, "Job cancelled");
        self.emit(
            EventType::OrchestratorJobCancelled,
            &job.company_symbol,
            json!({"job_id": job_id}),
        );
        self.push_history(job);
        self.dispatch_next();
        Ok(())
    }

    fn handle_results(&self, job_id: &str) -> EngineResult<Option<AnalysisBundle>> {
        let job = self.lookup_job(job_id)?;
        if !job.status.is_terminal() {
            return Ok(None);
        }
        Ok(self.bundles.get(job_id).cloned())
    }

    // -----------------------------------------------------------------------
    // Dispatch and stage tasks
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, job: &Job) {
        self.in_flight.insert(job.job_id.clone());
        self.deadlines
            .insert(job.job_id.clone(), Instant::now() + self.config.job_timeout);
        self.spawn_ingest(job);
    }

    fn dispatch_next(&mut self) {
        while self.in_flight.len() < self.config.max_concurrent_jobs {
            let Some(job_id) = self.queue.pop() else {
                break;
            };
            let Some(job) = self.active.get(&job_id).cloned() else {
                continue;
            };
            tracing::debug!(job_id = %job_id, "Dispatching queued job");
            self.dispatch(&job);
        }
    }

    fn spawn_ingest(&self, job: &Job) {
        let bus = self.bus.clone();
        let ingestor = self.ingestor.clone();
        let job_id = job.job_id.clone();
        let symbol = job.company_symbol.clone();
        let source = job.source;
        let periods = job.periods;
        let retries = self.config.retry_attempts;
        let base_delay = self.config.retry_base_delay;

        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let outcome = ingestor.fetch(&symbol, source, periods).await;
                if outcome.success {
                    bus.publish(AgentEvent::new(
                        EventType::DataIngestionCompleted,
                        "data_ingestion",
                        &symbol,
                        json!({
                            "job_id": job_id,
                            "company_id": outcome.company_id,
                            "statements": outcome.financial_statements,
                            "attempts": attempt,
                        }),
                    ));
                    return;
                }
                let error = outcome.error.unwrap_or(IngestError {
                    message: "unspecified ingest failure".into(),
                    transient: false,
                });
                if error.transient && attempt <= retries {
                    let delay = base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient ingest failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                bus.publish(stage_failed_event(
                    &job_id,
                    &symbol,
                    Stage::Ingest,
                    "DEPENDENCY_FAILURE",
                    &error.message,
                ));
                return;
            }
        });
    }

    fn spawn_forensic(&self, job: &Job, statements: Vec<SourceStatement>, company_id: String) {
        let bus = self.bus.clone();
        let job_id = job.job_id.clone();
        let symbol = job.company_symbol.clone();
        let source = job.source;
        let assessment_date = Utc::now().date_naive();

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                run_forensic_stage(&company_id, assessment_date, &statements, source)
            })
            .await;
            match result {
                Ok(Ok(report)) => {
                    bus.publish(AgentEvent::new(
                        EventType::ForensicAnalysisCompleted,
                        "forensic_analysis",
                        &symbol,
                        json!({"job_id": job_id, "report": report}),
                    ));
                }
                Ok(Err(e)) => {
                    bus.publish(stage_failed_event(
                        &job_id,
                        &symbol,
                        Stage::Forensic,
                        "INPUT_MALFORMED",
                        &e.to_string(),
                    ));
                }
                Err(e) => {
                    bus.publish(stage_failed_event(
                        &job_id,
                        &symbol,
                        Stage::Forensic,
                        "INTERNAL",
                        &e.to_string(),
                    ));
                }
            }
        });
    }

    fn spawn_scoring(&self, job: &Job, report: ForensicReport) {
        let bus = self.bus.clone();
        let rule_pack = self.rule_pack.clone();
        let job_id = job.job_id.clone();
        let symbol = job.company_symbol.clone();
        let analysis_types = job.analysis_types.clone();
        let assessment_date = Utc::now().date_naive();

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                run_scoring_stage(&report, &rule_pack, assessment_date, &analysis_types)
            })
            .await;
            match result {
                Ok((compliance, risk)) => {
                    if let Some(compliance) = compliance {
                        bus.publish(AgentEvent::new(
                            EventType::ComplianceValidationCompleted,
                            "compliance_validation",
                            &symbol,
                            json!({"job_id": job_id, "assessment": compliance}),
                        ));
                    }
                    bus.publish(AgentEvent::new(
                        EventType::RiskScoringCompleted,
                        "risk_scoring",
                        &symbol,
                        json!({"job_id": job_id, "assessment": risk}),
                    ));
                }
                Err(e) => {
                    bus.publish(stage_failed_event(
                        &job_id,
                        &symbol,
                        Stage::Risk,
                        "INTERNAL",
                        &e.to_string(),
                    ));
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Event handling
    // -----------------------------------------------------------------------

    fn handle_event(&mut self, event: AgentEvent) {
        let stage_event = matches!(
            event.event_type,
            EventType::DataIngestionCompleted
                | EventType::ForensicAnalysisCompleted
                | EventType::ComplianceValidationCompleted
                | EventType::RiskScoringCompleted
                | EventType::OrchestratorStageFailed
        );
        if !stage_event {
            return;
        }
        let Some(job_id) = event.job_id().map(str::to_string) else {
            tracing::warn!(event_type = event.event_type.as_str(), "Stage event without job_id");
            return;
        };
        if !self.active.contains_key(&job_id) {
            tracing::debug!(job_id = %job_id, "Discarding event for terminated job");
            return;
        }
        // Cooperative checkpoint: the wall clock is enforced between stages.
        if self.deadline_expired(&job_id) {
            self.fail_job(&job_id, "TIMEOUT", "wall-clock budget exceeded");
            return;
        }

        match event.event_type {
            EventType::DataIngestionCompleted => {
                let statements: Vec<SourceStatement> =
                    match data_field(&event, "statements") {
                        Some(statements) => statements,
                        None => {
                            self.fail_job(&job_id, "INTERNAL", "malformed ingest payload");
                            return;
                        }
                    };
                let company_id: String = data_field(&event, "company_id")
                    .unwrap_or_else(|| event.company_symbol.clone());
                let Some(job) = self.active.get_mut(&job_id).map(|job| {
                    job.status = JobStatus::Running;
                    job.started_at = Some(Utc::now());
                    job.progress = 25;
                    job.clone()
                }) else {
                    return;
                };
                self.set_stage(&job_id, Stage::Ingest, StageStatus::Succeeded);
                tracing::info!(job_id = %job_id, "Ingest complete; starting forensic analysis");
                self.spawn_forensic(&job, statements, company_id);
            }
            EventType::ForensicAnalysisCompleted => {
                let report: ForensicReport = match data_field(&event, "report") {
                    Some(report) => report,
                    None => {
                        self.fail_job(&job_id, "INTERNAL", "malformed forensic payload");
                        return;
                    }
                };
                let Some(job) = self.active.get_mut(&job_id).map(|job| {
                    job.progress = 75;
                    job.clone()
                }) else {
                    return;
                };
                if let Some(bundle) = self.bundles.get_mut(&job_id) {
                    bundle.forensic = Some(report.clone());
                }
                self.set_stage(&job_id, Stage::Forensic, StageStatus::Succeeded);
                tracing::info!(job_id = %job_id, "Forensic analysis complete; starting scoring");
                self.spawn_scoring(&job, report);
            }
            EventType::ComplianceValidationCompleted => {
                if let Some(assessment) = data_field(&event, "assessment") {
                    if let Some(bundle) = self.bundles.get_mut(&job_id) {
                        bundle.compliance = Some(assessment);
                    }
                    self.set_stage(&job_id, Stage::Compliance, StageStatus::Succeeded);
                }
            }
            EventType::RiskScoringCompleted => {
                let Some(assessment) = data_field(&event, "assessment") else {
                    self.fail_job(&job_id, "INTERNAL", "malformed risk payload");
                    return;
                };
                if let Some(bundle) = self.bundles.get_mut(&job_id) {
                    bundle.risk = Some(assessment);
                }
                self.set_stage(&job_id, Stage::Risk, StageStatus::Succeeded);
                self.complete_job(&job_id);
            }
            EventType::OrchestratorStageFailed => {
                let stage: Stage = data_field(&event, "stage").unwrap_or(Stage::Ingest);
                let kind: String =
                    data_field(&event, "kind").unwrap_or_else(|| "INTERNAL".to_string());
                let message: String =
                    data_field(&event, "message").unwrap_or_else(|| "stage failed".to_string());
                self.set_stage(&job_id, stage, StageStatus::Failed(message.clone()));
                self.fail_job(&job_id, &kind, &message);
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    fn complete_job(&mut self, job_id: &str) {
        let Some(mut job) = self.active.remove(job_id) else {
            return;
        };
        if !job.analysis_types.contains("compliance") {
            self.set_stage(job_id, Stage::Compliance, StageStatus::Skipped);
        }
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.completed_at = Some(Utc::now());
        self.in_flight.remove(job_id);
        self.deadlines.remove(job_id);

        if self.config.enable_caching {
            if let Some(bundle) = self.bundles.get(job_id) {
                self.cache.insert(
                    job.cache_key(),
                    CacheEntry {
                        bundle: bundle.clone(),
                        stored_at: Instant::now(),
                    },
                );
            }
        }

        tracing::info!(job_id = %job_id, company = %job.company_symbol, "Pipeline completed");
        self.emit(
            EventType::OrchestratorPipelineCompleted,
            &job.company_symbol,
            json!({"job_id": job_id}),
        );
        self.push_history(job);
        self.dispatch_next();
    }

    fn fail_job(&mut self, job_id: &str, kind: &str, message: &str) {
        let Some(mut job) = self.active.remove(job_id) else {
            return;
        };
        job.status = JobStatus::Failed;
        job.error = Some(format!("{}: {}", kind, message));
        job.completed_at = Some(Utc::now());
        self.in_flight.remove(job_id);
        self.deadlines.remove(job_id);
        tracing::warn!(job_id = %job_id, kind, message, "Job failed");
        self.emit(
            EventType::OrchestratorJobFailed,
            &job.company_symbol,
            json!({"job_id": job_id, "error": job.error}),
        );
        self.push_history(job);
        self.dispatch_next();
    }

    fn push_history(&mut self, job: Job) {
        self.history.push_back(job);
        while self.history.len() > self.config.history_limit {
            if let Some(evicted) = self.history.pop_front() {
                self.bundles.remove(&evicted.job_id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn set_stage(&mut self, job_id: &str, stage: Stage, status: StageStatus) {
        if let Some(bundle) = self.bundles.get_mut(job_id) {
            bundle.set_stage(stage, status);
        }
    }

    fn deadline_expired(&self, job_id: &str) -> bool {
        self.deadlines
            .get(job_id)
            .map(|deadline| Instant::now() > *deadline)
            .unwrap_or(false)
    }

    fn sweep_deadlines(&mut self) {
        let expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| Instant::now() > **deadline)
            .map(|(job_id, _)| job_id.clone())
            .collect();
        for job_id in expired {
            self.fail_job(&job_id, "TIMEOUT", "wall-clock budget exceeded");
        }
    }

    fn emit(&self, event_type: EventType, company_symbol: &str, data: Value) {
        self.bus.publish(AgentEvent::new(
            event_type,
            SOURCE_ORCHESTRATOR,
            company_symbol,
            data,
        ));
    }
}

fn stage_failed_event(
    job_id: &str,
    symbol: &str,
    stage: Stage,
    kind: &str,
    message: &str,
) -> AgentEvent {
    AgentEvent::new(
        EventType::OrchestratorStageFailed,
        SOURCE_ORCHESTRATOR,
        symbol,
        json!({
            "job_id": job_id,
            "stage": stage,
            "kind": kind,
            "message": message,
        }),
    )
}

fn data_field<T: serde::de::DeserializeOwned>(event: &AgentEvent, key: &str) -> Option<T> {
    event
        .data
        .get(key)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
