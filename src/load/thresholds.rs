use crate::config::Thresholds;
use crate::load::metrics::ScenarioResults;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub condition: String,
    pub observed: String,
    pub passed: bool,
}

/// Checks the run totals against every configured threshold.
pub fn evaluate(thresholds: &Thresholds, totals: &ScenarioResults) -> Vec<ThresholdVerdict> {
    let mut verdicts = Vec::new();

    if let Some(min_rate) = thresholds.checks {
        verdicts.push(ThresholdVerdict {
            metric: "checks".to_string(),
            condition: format!("rate >= {:.2}%", min_rate * 100.0),
            observed: format!("{:.2}%", totals.checks_rate * 100.0),
            passed: totals.checks_passed + totals.checks_failed == 0
                || totals.checks_rate >= min_rate,
        });
    }

    if let Some(max_rate) = thresholds.http_req_failed {
        verdicts.push(ThresholdVerdict {
            metric: "http_req_failed".to_string(),
            condition: format!("rate <= {:.2}%", max_rate * 100.0),
            observed: format!("{:.2}%", totals.failure_rate * 100.0),
            passed: totals.failure_rate <= max_rate,
        });
    }

    if let Some(max_p95) = thresholds.http_req_duration_p95 {
        verdicts.push(ThresholdVerdict {
            metric: "http_req_duration".to_string(),
            condition: format!("p(95) <= {:.2}ms", max_p95.as_secs_f64() * 1000.0),
            observed: format!(
                "{:.2}ms",
                totals.p95_response_time.as_secs_f64() * 1000.0
            ),
            passed: totals.p95_response_time <= max_p95,
        });
    }

    verdicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::metrics::ScenarioMetrics;
    use std::time::Duration;

    fn totals(failure_rate: f64, checks_rate: f64, p95_ms: u64) -> ScenarioResults {
        let mut results = ScenarioMetrics::new().calculate_results("total", "-", 1);
        results.failure_rate = failure_rate;
        results.checks_rate = checks_rate;
        results.checks_passed = 1;
        results.p95_response_time = Duration::from_millis(p95_ms);
        results
    }

    #[test]
    fn test_all_thresholds_pass() {
        let thresholds = Thresholds {
            checks: Some(0.95),
            http_req_failed: Some(0.01),
            http_req_duration_p95: Some(Duration::from_millis(500)),
        };
        let verdicts = evaluate(&thresholds, &totals(0.0, 1.0, 120));
        assert_eq!(verdicts.len(), 3);
        assert!(verdicts.iter().all(|v| v.passed));
    }

    #[test]
    fn test_breached_thresholds() {
        let thresholds = Thresholds {
            checks: Some(0.99),
            http_req_failed: Some(0.1),
            http_req_duration_p95: Some(Duration::from_millis(100)),
        };
        let verdicts = evaluate(&thresholds, &totals(0.5, 0.9, 250));
        assert!(verdicts.iter().all(|v| !v.passed));
        assert_eq!(verdicts[2].observed, "250.00ms");
    }

    #[test]
    fn test_unset_thresholds_yield_nothing() {
        assert!(evaluate(&Thresholds::default(), &totals(1.0, 0.0, 9000)).is_empty());
    }
}
