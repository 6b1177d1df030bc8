use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Plan;
use crate::load::schedule::VuSchedule;
use crate::runner::parser::load_plan_or_builtin;
use crate::utils::format_duration;

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub scenario: String,
    pub exec: String,
    pub max_vus: u32,
    pub start: Duration,
    pub window_end: Duration,
    pub hard_stop: Duration,
}

/// When each scenario starts, stops taking new iterations and is forcibly ended.
pub fn timeline(plan: &Plan) -> Result<Vec<TimelineEntry>> {
    plan.scenarios
        .iter()
        .map(|(name, config)| {
            let schedule = VuSchedule::from_config(name, config)?;
            let window_end = config.start_time.saturating_add(schedule.run_window());
            Ok(TimelineEntry {
                scenario: name.clone(),
                exec: config.exec.clone(),
                max_vus: schedule.max_vus(),
                start: config.start_time,
                window_end,
                hard_stop: window_end.saturating_add(config.graceful_stop),
            })
        })
        .collect()
}

pub async fn handle_plan(plan_path: Option<PathBuf>, check: bool, yaml: bool) -> Result<()> {
    let plan = load_plan_or_builtin(plan_path.as_deref()).await?;
    plan.validate()?;

    if check {
        println!("{} Plan '{}' is valid", "✔".green(), plan.name);
        return Ok(());
    }

    if yaml {
        print!("{}", plan.to_yaml()?);
        return Ok(());
    }

    println!("Plan: {}", plan.name.bright_white());
    println!("Host: {}", plan.host.bright_white());
    println!();
    println!(
        "  {:<12} {:<10} {:>5}  {:>8}  {:>8}  {:>8}",
        "scenario", "exec", "vus", "start", "stop", "end"
    );
    for entry in timeline(&plan)? {
        println!(
            "  {:<12} {:<10} {:>5}  {:>8}  {:>8}  {:>8}",
            entry.scenario,
            entry.exec,
            entry.max_vus,
            format_duration(entry.start),
            format_duration(entry.window_end),
            format_duration(entry.hard_stop),
        );
    }

    println!();
    for (name, request) in &plan.requests {
        let query: Vec<String> = request
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!(
            "  {} {} {}{}{} then sleep {}",
            name.bright_white(),
            request.method.bright_green(),
            request.path,
            if query.is_empty() { "" } else { "?" },
            query.join("&"),
            format_duration(request.sleep)
        );
    }

    Ok(())
}
