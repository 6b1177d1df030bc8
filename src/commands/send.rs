use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;

use crate::runner::executor::{evaluate_checks, RequestExecutor};
use crate::runner::parser::load_plan_or_builtin;
use crate::ui::{request_box, response_box, spinner::Spinner};
use crate::utils::parse_headers;

/// Sends one request of an exec target and shows what came back.
pub async fn handle_send(
    exec: String,
    plan: Option<PathBuf>,
    host: Option<String>,
    headers: Vec<String>,
) -> Result<()> {
    let mut plan = load_plan_or_builtin(plan.as_deref()).await?;
    if let Some(host) = host {
        plan.host = host;
    }
    plan.add_headers(&parse_headers(&headers)?);
    plan.validate()?;

    let request = plan.requests.get(&exec).with_context(|| {
        let known: Vec<_> = plan.requests.keys().map(String::as_str).collect();
        format!("Unknown exec '{}'. Known: {}", exec, known.join(", "))
    })?;

    let executor = RequestExecutor::new(&plan.host, plan.timeout)?;
    let url = executor.build_url(request)?;
    request_box::print_request_box(&exec, &request.method, url.as_str(), &request.headers);

    let (builder, _) = executor.request_builder(request)?;
    let spinner = Spinner::new("Waiting for response...");
    let start = Instant::now();
    let sent = builder.send().await;
    spinner.finish_and_clear();
    let response = sent.context("Failed to send HTTP request")?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;
    let duration = start.elapsed();

    let checks = request
        .expect
        .as_ref()
        .map(|expect| evaluate_checks(status.as_u16(), &body, expect))
        .unwrap_or_default();

    response_box::print_response_box(
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        duration,
        body.len() as u64,
        &headers,
        &checks,
    );

    if let Ok(json_value) = serde_json::from_slice::<Value>(&body) {
        let pretty_json = serde_json::to_string_pretty(&json_value)?;
        for (i, line) in pretty_json.lines().enumerate() {
            println!("{:>3}  {}", (i + 1).to_string().dimmed(), line);
        }
    } else if let Ok(text) = std::str::from_utf8(&body) {
        println!("{}", text);
    } else {
        println!("{}", "[Binary data]".dimmed());
    }

    if checks.iter().any(|c| !c.passed) {
        anyhow::bail!("Response did not meet the expectations of '{}'", exec);
    }

    Ok(())
}
