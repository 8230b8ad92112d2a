use clap::Args;
use serde_json::{json, Value};

use crate::commands::analyze::load_rule_pack;

#[derive(Args)]
pub struct RulesArgs {
    /// Rule pack file (.yaml or .json); built-in pack when omitted
    #[arg(long)]
    pub input: Option<String>,
}

/// Load a compliance rule pack and summarize it per framework.
pub fn run_rules(args: RulesArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let pack = load_rule_pack(&args.input)?;
    let frameworks: Vec<Value> = pack
        .frameworks
        .iter()
        .map(|(framework, rules)| {
            json!({
                "framework": framework,
                "rules": rules.len(),
                "rule_ids": rules.iter().map(|r| r.id.clone()).collect::<Vec<_>>(),
            })
        })
        .collect();
    Ok(json!({
        "source": args.input.unwrap_or_else(|| "builtin".to_string()),
        "total_rules": pack.rule_count(),
        "frameworks": frameworks,
    }))
}
