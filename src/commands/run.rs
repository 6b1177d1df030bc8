use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::load::{LoadMonitor, LoadRunner, RunResults};
use crate::report::ReportGenerator;
use crate::runner::parser::load_plan_or_builtin;
use crate::utils::{format_duration, parse_duration, parse_headers};

pub struct RunOptions {
    pub plan: Option<PathBuf>,
    pub scenarios: Vec<String>,
    pub vus: Option<u32>,
    pub duration: Option<String>,
    pub host: Option<String>,
    pub headers: Vec<String>,
    pub report: Option<String>,
    pub out: PathBuf,
    pub report_interval: String,
    pub ci: bool,
}

pub async fn handle_run(options: RunOptions) -> Result<RunResults> {
    let mut plan = load_plan_or_builtin(options.plan.as_deref()).await?;

    plan.select_scenarios(&options.scenarios)?;
    let duration = options
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()
        .context("Invalid --duration")?;
    plan.override_load(options.vus, duration);
    if let Some(host) = options.host {
        plan.host = host;
    }
    plan.add_headers(&parse_headers(&options.headers)?);
    let report_interval =
        parse_duration(&options.report_interval).context("Invalid --report-interval")?;

    let runner = LoadRunner::new(plan.clone())?;

    println!("{} Starting load test", "→".cyan());
    println!("Plan: {}", plan.name.bright_white());
    println!("Host: {}", plan.host.bright_white());
    for handle in runner.handles() {
        println!(
            "  {} {:<12} {} · {} VUs · starts at {} · window {} · gracefulStop {}",
            "•".dimmed(),
            handle.name.bright_white(),
            handle.executor,
            handle.schedule.max_vus(),
            format_duration(handle.start_time),
            format_duration(handle.schedule.run_window()),
            format_duration(handle.graceful_stop),
        );
    }
    println!(
        "Planned duration: {}",
        format_duration(runner.planned_duration()).bright_white()
    );
    println!();

    let abort = runner.abort_token();
    let signal_watch = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping all scenarios");
            abort.cancel();
        }
    });

    let monitor = LoadMonitor::new(report_interval, options.ci);
    let monitor_stop = tokio_util::sync::CancellationToken::new();
    let monitor_task = monitor.start_background_monitoring(
        runner.handles().to_vec(),
        runner.planned_duration(),
        monitor_stop.clone(),
    );

    let results = runner.run().await?;

    monitor_stop.cancel();
    let _ = monitor_task.await;
    signal_watch.abort();

    monitor.print_final_summary(&results);

    if let Some(formats) = options.report.as_deref() {
        let files = ReportGenerator::generate_reports(&results, formats, &options.out)?;
        for file in &files {
            info!(path = %file.display(), "report written");
            println!("{} Report saved: {}", "✔".green(), file.display());
        }
    }

    if results.aborted {
        anyhow::bail!("Load test aborted before completion");
    }
    if !results.thresholds_passed() {
        let breached: Vec<_> = results
            .thresholds
            .iter()
            .filter(|v| !v.passed)
            .map(|v| v.metric.as_str())
            .collect();
        anyhow::bail!("Thresholds breached: {}", breached.join(", "));
    }

    println!("{} Load test completed", "✔".green().bold());
    Ok(results)
}
