use crate::runner::executor::RequestOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioPhase {
    Pending,
    Running,
    Draining,
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

/// Raw samples for one scenario, shared by its VUs behind a mutex.
#[derive(Debug, Clone)]
pub struct ScenarioMetrics {
    pub phase: ScenarioPhase,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
    pub active_vus: u32,
    pub response_times: Vec<Duration>,
    pub iteration_times: Vec<Duration>,
    pub request_count: u64,
    pub failed_count: u64,
    pub connection_errors: u64,
    pub interrupted_iterations: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub checks: BTreeMap<String, CheckTally>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Default for ScenarioMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioMetrics {
    pub fn new() -> Self {
        Self {
            phase: ScenarioPhase::Pending,
            started: None,
            finished: None,
            active_vus: 0,
            response_times: Vec::new(),
            iteration_times: Vec::new(),
            request_count: 0,
            failed_count: 0,
            connection_errors: 0,
            interrupted_iterations: 0,
            status_codes: BTreeMap::new(),
            checks: BTreeMap::new(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn mark_started(&mut self) {
        self.phase = ScenarioPhase::Running;
        self.started = Some(Instant::now());
    }

    pub fn mark_finished(&mut self) {
        self.phase = ScenarioPhase::Finished;
        self.active_vus = 0;
        self.finished = Some(Instant::now());
    }

    pub fn record_outcome(&mut self, outcome: &RequestOutcome) {
        self.request_count += 1;
        self.bytes_sent += outcome.bytes_sent;
        self.bytes_received += outcome.bytes_received;

        if outcome.is_failed() {
            self.failed_count += 1;
        }

        match outcome.status {
            Some(status) => {
                self.response_times.push(outcome.duration);
                *self.status_codes.entry(status).or_insert(0) += 1;
            }
            None => self.connection_errors += 1,
        }

        for check in &outcome.checks {
            let tally = self.checks.entry(check.name.clone()).or_default();
            if check.passed {
                tally.passes += 1;
            } else {
                tally.fails += 1;
            }
        }
    }

    pub fn record_iteration(&mut self, duration: Duration) {
        self.iteration_times.push(duration);
    }

    pub fn record_interrupted(&mut self) {
        self.interrupted_iterations += 1;
    }

    /// Time between the first VU starting and the scenario finishing (or now).
    pub fn active_duration(&self) -> Duration {
        match (self.started, self.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn calculate_results(&self, name: &str, executor: &str, max_vus: u32) -> ScenarioResults {
        self.calculate_results_over(name, executor, max_vus, self.active_duration())
    }

    pub fn calculate_results_over(
        &self,
        name: &str,
        executor: &str,
        max_vus: u32,
        duration: Duration,
    ) -> ScenarioResults {
        let mut sorted_times = self.response_times.clone();
        sorted_times.sort();

        let secs = duration.as_secs_f64();
        let per_second = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };

        let checks_passed: u64 = self.checks.values().map(|t| t.passes).sum();
        let checks_failed: u64 = self.checks.values().map(|t| t.fails).sum();

        ScenarioResults {
            name: name.to_string(),
            executor: executor.to_string(),
            max_vus,
            iterations: self.iteration_times.len() as u64,
            interrupted_iterations: self.interrupted_iterations,
            average_iteration_time: average(&self.iteration_times),
            total_requests: self.request_count,
            failed_requests: self.failed_count,
            connection_errors: self.connection_errors,
            failure_rate: ratio(self.failed_count, self.request_count),
            requests_per_second: per_second(self.request_count),
            average_response_time: average(&sorted_times),
            min_response_time: sorted_times.first().copied().unwrap_or(Duration::ZERO),
            max_response_time: sorted_times.last().copied().unwrap_or(Duration::ZERO),
            p50_response_time: percentile(&sorted_times, 50),
            p90_response_time: percentile(&sorted_times, 90),
            p95_response_time: percentile(&sorted_times, 95),
            p99_response_time: percentile(&sorted_times, 99),
            status_code_distribution: self.status_codes.clone(),
            checks: self.checks.clone(),
            checks_passed,
            checks_failed,
            checks_rate: ratio(checks_passed, checks_passed + checks_failed),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            duration,
        }
    }

    pub fn merge(&mut self, other: &ScenarioMetrics) {
        self.response_times.extend(other.response_times.iter());
        self.iteration_times.extend(other.iteration_times.iter());
        self.request_count += other.request_count;
        self.failed_count += other.failed_count;
        self.connection_errors += other.connection_errors;
        self.interrupted_iterations += other.interrupted_iterations;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;

        for (status, count) in &other.status_codes {
            *self.status_codes.entry(*status).or_insert(0) += count;
        }
        for (name, tally) in &other.checks {
            let entry = self.checks.entry(name.clone()).or_default();
            entry.passes += tally.passes;
            entry.fails += tally.fails;
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn average(times: &[Duration]) -> Duration {
    if times.is_empty() {
        return Duration::ZERO;
    }
    let total: u128 = times.iter().map(|d| d.as_nanos()).sum();
    Duration::from_nanos((total / times.len() as u128) as u64)
}

/// Nearest-rank percentile: the smallest sample with at least `pct`% of
/// samples at or below it.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (sorted.len() * pct).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResults {
    pub name: String,
    pub executor: String,
    pub max_vus: u32,
    pub iterations: u64,
    pub interrupted_iterations: u64,
    #[serde(with = "duration_ms")]
    pub average_iteration_time: Duration,

    pub total_requests: u64,
    pub failed_requests: u64,
    pub connection_errors: u64,
    pub failure_rate: f64,
    pub requests_per_second: f64,

    #[serde(with = "duration_ms")]
    pub average_response_time: Duration,
    #[serde(with = "duration_ms")]
    pub min_response_time: Duration,
    #[serde(with = "duration_ms")]
    pub max_response_time: Duration,
    #[serde(with = "duration_ms")]
    pub p50_response_time: Duration,
    #[serde(with = "duration_ms")]
    pub p90_response_time: Duration,
    #[serde(with = "duration_ms")]
    pub p95_response_time: Duration,
    #[serde(with = "duration_ms")]
    pub p99_response_time: Duration,

    pub status_code_distribution: BTreeMap<u16, u64>,
    pub checks: BTreeMap<String, CheckTally>,
    pub checks_passed: u64,
    pub checks_failed: u64,
    pub checks_rate: f64,
    pub bytes_sent: u64,
    pub bytes_received: u64,

    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

// Durations are reported as fractional milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(millis / 1000.0))
    }
}
