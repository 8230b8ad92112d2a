use clap::Args;
use serde_json::Value;

use drishti_core::compliance::RulePack;
use drishti_core::normalizer::{DataSource, SourceStatement};
use drishti_engine::job::JobRequest;
use drishti_engine::pipeline::{
    run_forensic_stage, run_scoring_stage, AnalysisBundle, Stage, StageStatus,
};

use crate::input;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// JSON file holding a list of source statements
    #[arg(long)]
    pub input: Option<String>,

    /// Company identifier recorded in the report
    #[arg(long, default_value = "UNKNOWN")]
    pub company: String,

    /// Data source tag the statements came from
    #[arg(long, default_value = "yahoo", value_parser = parse_source)]
    pub source: DataSource,

    /// YAML rule pack; the built-in Indian-market pack when omitted
    #[arg(long)]
    pub rules: Option<String>,

    /// Run forensic and risk stages only
    #[arg(long)]
    pub skip_compliance: bool,
}

pub fn parse_source(raw: &str) -> Result<DataSource, String> {
    match raw.to_ascii_lowercase().as_str() {
        "yahoo" => Ok(DataSource::Yahoo),
        "nse" => Ok(DataSource::Nse),
        "bse" => Ok(DataSource::Bse),
        "fmp" => Ok(DataSource::Fmp),
        other => Err(format!(
            "unknown source '{}' (expected yahoo, nse, bse or fmp)",
            other
        )),
    }
}

pub fn read_statements(
    input: &Option<String>,
) -> Result<Vec<SourceStatement>, Box<dyn std::error::Error>> {
    if let Some(ref path) = input {
        input::file::read_json(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(serde_json::from_value(data)?)
    } else {
        Err("--input <statements.json> or stdin required".into())
    }
}

pub fn load_rule_pack(path: &Option<String>) -> Result<RulePack, Box<dyn std::error::Error>> {
    match path {
        Some(path) if path.ends_with(".json") => input::file::read_json(path),
        Some(path) => input::file::read_yaml(path),
        None => Ok(RulePack::builtin()),
    }
}

/// Offline pipeline over a statement file: normalize, forensic pass,
/// compliance and risk scoring.
pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let statements = read_statements(&args.input)?;
    let rule_pack = load_rule_pack(&args.rules)?;
    let today = chrono::Utc::now().date_naive();

    let report = run_forensic_stage(&args.company, today, &statements, args.source)?;

    let analysis_types = if args.skip_compliance {
        ["forensic", "risk"].into_iter().map(String::from).collect()
    } else {
        JobRequest::default_analysis_types()
    };
    let (compliance, risk) = run_scoring_stage(&report, &rule_pack, today, &analysis_types);

    let mut bundle = AnalysisBundle::new(&args.company, today);
    bundle.set_stage(Stage::Ingest, StageStatus::Skipped);
    bundle.set_stage(Stage::Forensic, StageStatus::Succeeded);
    bundle.set_stage(Stage::Risk, StageStatus::Succeeded);
    bundle.set_stage(
        Stage::Compliance,
        if compliance.is_some() {
            StageStatus::Succeeded
        } else {
            StageStatus::Skipped
        },
    );
    bundle.forensic = Some(report);
    bundle.risk = Some(risk);
    bundle.compliance = compliance;

    Ok(serde_json::to_value(bundle)?)
}
