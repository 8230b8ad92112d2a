use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde_json::Value;

use drishti_core::normalizer::DataSource;
use drishti_engine::ingest::StaticIngestor;
use drishti_engine::job::{JobPriority, JobRequest, JobStatus};
use drishti_engine::orchestrator::Orchestrator;
use drishti_engine::EngineConfig;

use crate::commands::analyze::{load_rule_pack, parse_source, read_statements};
use crate::{EXIT_CANCELLED, EXIT_OK, EXIT_TIMEOUT, EXIT_UPSTREAM};

#[derive(Args)]
pub struct RunJobArgs {
    /// Company symbol, e.g. RELIANCE.NS
    #[arg(long)]
    pub company: String,

    /// JSON file with the company's source statements
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated analysis types (default: forensic,risk,compliance)
    #[arg(long)]
    pub types: Option<String>,

    #[arg(long, default_value = "yahoo", value_parser = parse_source)]
    pub source: DataSource,

    #[arg(long, default_value_t = 2)]
    pub periods: u32,

    /// low, normal, high or critical
    #[arg(long, default_value = "normal", value_parser = parse_priority)]
    pub priority: JobPriority,

    /// YAML rule pack; built-in pack when omitted
    #[arg(long)]
    pub rules: Option<String>,

    /// Wall-clock budget for the job in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

fn parse_priority(raw: &str) -> Result<JobPriority, String> {
    match raw.to_ascii_lowercase().as_str() {
        "low" => Ok(JobPriority::Low),
        "normal" => Ok(JobPriority::Normal),
        "high" => Ok(JobPriority::High),
        "critical" => Ok(JobPriority::Critical),
        other => Err(format!(
            "unknown priority '{}' (expected low, normal, high or critical)",
            other
        )),
    }
}

/// Submit a job against an in-process engine fed from a statement file
/// and drive it to a terminal state. The exit code mirrors the outcome.
pub async fn run_job(args: RunJobArgs) -> Result<(Value, i32), Box<dyn std::error::Error>> {
    let statements = read_statements(&args.input)?;
    let rule_pack = load_rule_pack(&args.rules)?;

    let config = EngineConfig {
        job_timeout: Duration::from_secs(args.timeout_secs),
        ..EngineConfig::default()
    };
    let ingestor = Arc::new(StaticIngestor::new().with_company(&args.company, statements));
    let handle = Orchestrator::spawn(config, ingestor, rule_pack);

    let mut request = JobRequest::new(&args.company);
    request.source = Some(args.source);
    request.periods = Some(args.periods);
    request.priority = Some(args.priority);
    if let Some(ref types) = args.types {
        let parsed: BTreeSet<String> = types
            .split(',')
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if parsed.is_empty() {
            return Err("--types must name at least one analysis type".into());
        }
        request.analysis_types = Some(parsed);
    }

    let job_id = handle.submit(request).await?;
    let job = loop {
        let job = handle.status(&job_id).await?;
        if job.status.is_terminal() {
            break job;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    let exit_code = match job.status {
        JobStatus::Completed => EXIT_OK,
        JobStatus::Cancelled => EXIT_CANCELLED,
        JobStatus::Failed
            if job
                .error
                .as_deref()
                .map(|e| e.starts_with("TIMEOUT"))
                .unwrap_or(false) =>
        {
            EXIT_TIMEOUT
        }
        _ => EXIT_UPSTREAM,
    };

    let results = handle.results(&job_id).await?;
    handle.shutdown().await;

    let output = serde_json::json!({
        "job": job,
        "results": results,
    });
    Ok((output, exit_code))
}
