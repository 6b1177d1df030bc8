use crate::config::Plan;
use crate::runner::variables::VariableContext;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Parses and resolves a plan without validating it, so callers can apply
/// command-line overrides first.
pub fn parse_plan(content: &str) -> Result<Plan> {
    let plan: Plan = serde_yaml::from_str(content).context("Failed to parse plan YAML")?;
    Ok(resolve(plan))
}

pub async fn load_plan(path: &Path) -> Result<Plan> {
    if !path.is_file() {
        anyhow::bail!("Plan file does not exist: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_plan(&content).with_context(|| format!("Invalid plan in {}", path.display()))
}

pub async fn load_plan_or_builtin(path: Option<&Path>) -> Result<Plan> {
    match path {
        Some(path) => load_plan(path).await,
        None => Ok(resolve(Plan::builtin())),
    }
}

fn resolve(plan: Plan) -> Plan {
    let ctx = VariableContext::new().with_plan_vars(&plan.vars);
    ctx.resolve_plan(plan)
}
