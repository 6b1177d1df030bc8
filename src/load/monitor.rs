use crate::load::metrics::{ScenarioPhase, ScenarioResults};
use crate::load::runner::{RunResults, ScenarioHandle};
use crate::ui::progress::create_progress_bar;
use indicatif::ProgressBar;
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct LoadMonitor {
    report_interval: Duration,
    interactive: bool,
}

impl LoadMonitor {
    pub fn new(report_interval: Duration, ci: bool) -> Self {
        Self {
            report_interval,
            interactive: !ci && atty::is(atty::Stream::Stdout),
        }
    }

    /// Prints a status line per scenario every report interval until `stop` fires.
    pub fn start_background_monitoring(
        &self,
        handles: Vec<ScenarioHandle>,
        planned: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let report_interval = self.report_interval;
        let progress = self
            .interactive
            .then(|| create_progress_bar(planned.as_secs().max(1)));

        tokio::spawn(async move {
            let start = Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            let mut last_report = Instant::now();

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if let Some(pb) = &progress {
                    let elapsed = start.elapsed();
                    pb.set_position(elapsed.as_secs());
                    let running: Vec<String> = handles
                        .iter()
                        .filter(|h| elapsed >= h.start_time && elapsed < h.end_offset())
                        .map(|h| {
                            format!(
                                "{}: {}",
                                h.name,
                                h.schedule.phase_description(elapsed - h.start_time)
                            )
                        })
                        .collect();
                    pb.set_message(running.join(" · "));
                }

                if report_interval.is_zero() || last_report.elapsed() < report_interval {
                    continue;
                }
                last_report = Instant::now();

                for handle in &handles {
                    let line = {
                        let metrics = handle.metrics.lock().await;
                        let results = metrics.calculate_results(
                            &handle.name,
                            &handle.executor,
                            handle.schedule.max_vus(),
                        );
                        format_status_line(metrics.phase, metrics.active_vus, &results)
                    };
                    emit(&progress, &line);
                }
            }

            if let Some(pb) = progress {
                pb.finish_and_clear();
            }
        })
    }

    /// Print the final summary when the run completes
    pub fn print_final_summary(&self, results: &RunResults) {
        println!();
        println!("{}", "=".repeat(60).dimmed());
        println!("{} Load Test Results: {}", "🎯".bright_white(), results.plan.bright_white());
        println!("{}", "=".repeat(60).dimmed());
        println!("  Host: {}", results.host);
        println!("  Run: {}", results.run_id);
        if results.aborted {
            println!("  {} Run was aborted before completion", "⚠".yellow());
        }

        for scenario in &results.scenarios {
            println!();
            println!(
                "{} {} ({}, {} VUs)",
                "▸".cyan(),
                scenario.name.bright_white().bold(),
                scenario.executor,
                scenario.max_vus
            );
            print_scenario_block(scenario);
        }

        println!();
        println!("{} Totals:", "📋".bright_white());
        print_scenario_block(&results.totals);

        if !results.thresholds.is_empty() {
            println!();
            println!("{} Thresholds:", "🔍".bright_white());
            for verdict in &results.thresholds {
                let mark = if verdict.passed {
                    "✓".green().to_string()
                } else {
                    "✗".red().to_string()
                };
                println!(
                    "  {} {} {} (observed {})",
                    mark, verdict.metric, verdict.condition, verdict.observed
                );
            }
        }

        println!("{}", "=".repeat(60).dimmed());
    }
}

fn emit(progress: &Option<ProgressBar>, line: &str) {
    match progress {
        Some(pb) => pb.println(line),
        None => println!("{}", line),
    }
}

pub fn format_status_line(phase: ScenarioPhase, active_vus: u32, results: &ScenarioResults) -> String {
    let phase = match phase {
        ScenarioPhase::Pending => "pending",
        ScenarioPhase::Running => "running",
        ScenarioPhase::Draining => "draining",
        ScenarioPhase::Finished => "finished",
    };
    format!(
        "  {:<12} {:<9} vus {:>4}/{:<4} reqs {:>7}  rps {:>8.1}  p95 {:>7.2}ms  failed {:>5.1}%",
        results.name,
        phase,
        active_vus,
        results.max_vus,
        results.total_requests,
        results.requests_per_second,
        as_millis_f64(results.p95_response_time),
        results.failure_rate * 100.0
    )
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn print_scenario_block(results: &ScenarioResults) {
    println!("  Duration: {:.2}s", results.duration.as_secs_f64());
    println!(
        "  Iterations: {} ({} interrupted, avg {:.2}ms)",
        results.iterations.to_string().bright_white(),
        results.interrupted_iterations,
        as_millis_f64(results.average_iteration_time)
    );
    println!(
        "  HTTP requests: {} ({:.1}/s)",
        results.total_requests.to_string().bright_white(),
        results.requests_per_second
    );

    let failed = format!(
        "{:.2}% ({} of {})",
        results.failure_rate * 100.0,
        results.failed_requests,
        results.total_requests
    );
    if results.failed_requests > 0 {
        println!("  Failed: {}", failed.red());
    } else {
        println!("  Failed: {}", failed.green());
    }
    if results.connection_errors > 0 {
        println!(
            "  {} Connection errors: {}",
            "⚠".yellow(),
            results.connection_errors
        );
    }

    println!(
        "  Latency: avg={:.2}ms min={:.2}ms med={:.2}ms p90={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms",
        as_millis_f64(results.average_response_time),
        as_millis_f64(results.min_response_time),
        as_millis_f64(results.p50_response_time),
        as_millis_f64(results.p90_response_time),
        as_millis_f64(results.p95_response_time),
        as_millis_f64(results.p99_response_time),
        as_millis_f64(results.max_response_time),
    );

    if !results.status_code_distribution.is_empty() {
        let codes: Vec<String> = results
            .status_code_distribution
            .iter()
            .map(|(code, count)| {
                let entry = format!("{}={}", code, count);
                if (200..300).contains(code) {
                    entry.green().to_string()
                } else if *code >= 400 {
                    entry.red().to_string()
                } else {
                    entry.yellow().to_string()
                }
            })
            .collect();
        println!("  Status codes: {}", codes.join(" "));
    }

    for (name, tally) in &results.checks {
        let mark = if tally.fails == 0 {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        println!("  {} {} ({} passed, {} failed)", mark, name, tally.passes, tally.fails);
    }

    if results.bytes_received > 0 {
        println!(
            "  Data: sent {} received {}",
            crate::ui::format_size(results.bytes_sent),
            crate::ui::format_size(results.bytes_received)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::metrics::ScenarioMetrics;

    #[test]
    fn test_format_status_line() {
        let mut results =
            ScenarioMetrics::new().calculate_results_over("normal", "constant-vus", 200, Duration::from_secs(1));
        results.total_requests = 350;
        results.requests_per_second = 350.0;
        results.p95_response_time = Duration::from_micros(12_500);
        results.failure_rate = 0.02;

        let line = format_status_line(ScenarioPhase::Running, 200, &results);
        assert!(line.contains("normal"));
        assert!(line.contains("running"));
        assert!(line.contains("200/200"));
        assert!(line.contains("350.0"));
        assert!(line.contains("12.50ms"));
        assert!(line.contains("2.0%"));
    }

    #[test]
    fn test_monitor_non_interactive_in_ci() {
        let monitor = LoadMonitor::new(Duration::from_secs(5), true);
        assert!(!monitor.interactive);
    }
}
