use crate::load::metrics::ScenarioResults;
use crate::load::runner::RunResults;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct ReportGenerator;

impl ReportGenerator {
    /// Writes one file per requested format (`json`, `html`, `junit`) into `output_dir`.
    pub fn generate_reports(
        results: &RunResults,
        formats: &str,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create report directory {}", output_dir.display())
        })?;

        let mut generated_files = Vec::new();

        for format in formats.split(',') {
            let format = format.trim().to_lowercase();
            match format.as_str() {
                "json" => generated_files.push(Self::generate_json_report(results, output_dir)?),
                "html" => generated_files.push(Self::generate_html_report(results, output_dir)?),
                "junit" => generated_files.push(Self::generate_junit_report(results, output_dir)?),
                "" => {}
                other => warn!(format = other, "unknown report format"),
            }
        }

        Ok(generated_files)
    }

    fn file_name(results: &RunResults, prefix: &str, extension: &str) -> String {
        let timestamp = results.started_at.format("%Y%m%d_%H%M%S");
        format!("{}_{}.{}", prefix, timestamp, extension)
    }

    fn generate_json_report(results: &RunResults, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(Self::file_name(results, "pricestorm_report", "json"));
        let json = serde_json::to_string_pretty(results)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    fn generate_html_report(results: &RunResults, output_dir: &Path) -> Result<PathBuf> {
        use tera::{Context, Tera};

        let path = output_dir.join(Self::file_name(results, "pricestorm_report", "html"));

        let mut tera = Tera::default();
        tera.add_raw_template("report.html", include_str!("../templates/report.html"))
            .map_err(|e| anyhow::anyhow!("Failed to add template: {}", e))?;

        let scenarios: Vec<_> = results
            .scenarios
            .iter()
            .chain(std::iter::once(&results.totals))
            .map(scenario_row)
            .collect();

        let mut context = Context::new();
        context.insert("report", results);
        context.insert(
            "timestamp",
            &results.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        context.insert("scenarios", &scenarios);

        let html = tera.render("report.html", &context)?;
        fs::write(&path, html)?;
        Ok(path)
    }

    fn generate_junit_report(results: &RunResults, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(Self::file_name(results, "pricestorm_junit", "xml"));

        let check_count: usize = results.scenarios.iter().map(|s| s.checks.len()).sum();
        let check_failures: usize = results
            .scenarios
            .iter()
            .map(|s| s.checks.values().filter(|t| t.fails > 0).count())
            .sum();
        let threshold_failures = results.thresholds.iter().filter(|t| !t.passed).count();

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuites name=\"{}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\">\n",
            escape_xml(&results.plan),
            check_count + results.thresholds.len(),
            check_failures + threshold_failures,
            results.totals.duration.as_secs_f64()
        ));

        for scenario in &results.scenarios {
            let failures = scenario.checks.values().filter(|t| t.fails > 0).count();
            xml.push_str(&format!(
                "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\">\n",
                escape_xml(&scenario.name),
                scenario.checks.len(),
                failures,
                scenario.duration.as_secs_f64()
            ));

            for (name, tally) in &scenario.checks {
                let name = escape_xml(name);
                if tally.fails == 0 {
                    xml.push_str(&format!("    <testcase name=\"{}\"/>\n", name));
                } else {
                    let message = format!("{} of {} checks failed", tally.fails, tally.passes + tally.fails);
                    xml.push_str(&format!("    <testcase name=\"{}\">\n", name));
                    xml.push_str(&format!(
                        "      <failure message=\"{}\">{}</failure>\n",
                        message, message
                    ));
                    xml.push_str("    </testcase>\n");
                }
            }

            xml.push_str("  </testsuite>\n");
        }

        if !results.thresholds.is_empty() {
            xml.push_str(&format!(
                "  <testsuite name=\"thresholds\" tests=\"{}\" failures=\"{}\">\n",
                results.thresholds.len(),
                threshold_failures
            ));
            for verdict in &results.thresholds {
                let name = escape_xml(&format!("{} {}", verdict.metric, verdict.condition));
                if verdict.passed {
                    xml.push_str(&format!("    <testcase name=\"{}\"/>\n", name));
                } else {
                    let message = escape_xml(&format!("observed {}", verdict.observed));
                    xml.push_str(&format!("    <testcase name=\"{}\">\n", name));
                    xml.push_str(&format!(
                        "      <failure message=\"{}\">{}</failure>\n",
                        message, message
                    ));
                    xml.push_str("    </testcase>\n");
                }
            }
            xml.push_str("  </testsuite>\n");
        }

        xml.push_str("</testsuites>\n");

        fs::write(&path, xml)?;
        Ok(path)
    }
}

fn scenario_row(results: &ScenarioResults) -> serde_json::Value {
    let ms = |d: std::time::Duration| format!("{:.2}", d.as_secs_f64() * 1000.0);
    let checks: Vec<_> = results
        .checks
        .iter()
        .map(|(name, tally)| {
            serde_json::json!({ "name": name, "passes": tally.passes, "fails": tally.fails })
        })
        .collect();

    serde_json::json!({
        "name": results.name,
        "executor": results.executor,
        "max_vus": results.max_vus,
        "iterations": results.iterations,
        "interrupted": results.interrupted_iterations,
        "requests": results.total_requests,
        "rps": format!("{:.1}", results.requests_per_second),
        "failed_pct": format!("{:.2}", results.failure_rate * 100.0),
        "avg_ms": ms(results.average_response_time),
        "p95_ms": ms(results.p95_response_time),
        "p99_ms": ms(results.p99_response_time),
        "checks": checks,
    })
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::metrics::ScenarioMetrics;
    use crate::load::thresholds::ThresholdVerdict;
    use crate::runner::executor::{CheckResult, RequestOutcome};
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sample_results() -> RunResults {
        let mut metrics = ScenarioMetrics::new();
        for (status, passed) in [(200, true), (200, true), (500, false)] {
            metrics.record_outcome(&RequestOutcome {
                status: Some(status),
                duration: Duration::from_millis(20),
                bytes_sent: 80,
                bytes_received: 120,
                error: None,
                checks: vec![CheckResult {
                    name: "status is 200".to_string(),
                    passed,
                }],
            });
        }
        let scenario =
            metrics.calculate_results_over("normal", "constant-vus", 2, Duration::from_secs(1));
        let totals =
            metrics.calculate_results_over("total", "-", 2, Duration::from_secs(1));

        RunResults {
            run_id: Uuid::new_v4(),
            plan: "prices".to_string(),
            host: "http://localhost:8080".to_string(),
            started_at: Utc::now(),
            scenarios: vec![scenario],
            totals,
            thresholds: vec![ThresholdVerdict {
                metric: "http_req_failed".to_string(),
                condition: "rate <= 1.00%".to_string(),
                observed: "33.33%".to_string(),
                passed: false,
            }],
            aborted: false,
        }
    }

    #[test]
    fn test_generate_json_report() {
        let temp_dir = TempDir::new().unwrap();
        let results = sample_results();

        let path = ReportGenerator::generate_json_report(&results, temp_dir.path()).unwrap();

        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("pricestorm_report_"));
        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: RunResults = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.scenarios[0].total_requests, 3);
        assert_eq!(parsed.scenarios[0].status_code_distribution.get(&500), Some(&1));
        assert!(!parsed.thresholds_passed());
    }

    #[test]
    fn test_generate_junit_report() {
        let temp_dir = TempDir::new().unwrap();
        let results = sample_results();

        let path = ReportGenerator::generate_junit_report(&results, temp_dir.path()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<testsuites name=\"prices\" tests=\"2\" failures=\"2\""));
        assert!(content.contains("<testsuite name=\"normal\""));
        assert!(content.contains("1 of 3 checks failed"));
        assert!(content.contains("http_req_failed rate &lt;= 1.00%"));
    }

    #[test]
    fn test_generate_html_report() {
        let temp_dir = TempDir::new().unwrap();
        let results = sample_results();

        let path = ReportGenerator::generate_html_report(&results, temp_dir.path()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<h1>prices</h1>"));
        assert!(content.contains("normal"));
        assert!(content.contains("status is 200"));
        assert!(content.contains("breached"));
    }

    #[test]
    fn test_generate_reports_multiple_formats() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("reports");

        let files =
            ReportGenerator::generate_reports(&sample_results(), "json, html,junit,bogus", &output)
                .unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.exists()));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b & \"c\">"), "a&lt;b &amp; &quot;c&quot;&gt;");
    }
}
