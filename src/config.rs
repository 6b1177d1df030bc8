use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::load::schedule::VuSchedule;

pub const DEFAULT_HOST: &str = "${PRICES_HOST:http://host.docker.internal:8080}";

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("plan defines no scenarios")]
    NoScenarios,
    #[error("scenario '{scenario}' executes unknown request '{exec}'")]
    UnknownExec { scenario: String, exec: String },
    #[error("scenario '{scenario}' is missing required option '{field}'")]
    MissingField {
        scenario: String,
        field: &'static str,
    },
    #[error("scenario '{scenario}' has invalid '{field}': {reason}")]
    InvalidValue {
        scenario: String,
        field: &'static str,
        reason: String,
    },
    #[error("invalid host '{0}': expected an absolute http(s) URL")]
    InvalidHost(String),
    #[error("request '{request}' has unsupported method '{method}' (only GET is sent)")]
    InvalidMethod { request: String, method: String },
    #[error("request '{request}' expects invalid status '{status}' (use a code such as 404 or a class such as 4xx)")]
    InvalidStatus { request: String, status: String },
    #[error("threshold '{name}' must be a rate between 0 and 1, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
    #[error("no scenario named '{0}' in plan")]
    UnknownScenario(String),
}

/// A complete load test: where to send traffic, which scenarios to run and
/// what each scenario's iteration does.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_timeout", with = "time_string")]
    pub timeout: Duration,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub vars: IndexMap<String, String>,
    pub scenarios: IndexMap<String, ScenarioConfig>,
    pub requests: IndexMap<String, RequestSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    ConstantVus,
    PerVuIterations,
    RampingVus,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::ConstantVus => "constant-vus",
            ExecutorKind::PerVuIterations => "per-vu-iterations",
            ExecutorKind::RampingVus => "ramping-vus",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioConfig {
    pub executor: ExecutorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vus: Option<u32>,
    #[serde(
        default,
        with = "opt_time_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    pub exec: String,
    #[serde(default = "default_graceful_stop", with = "time_string")]
    pub graceful_stop: Duration,
    #[serde(
        default,
        with = "time_string",
        skip_serializing_if = "Duration::is_zero"
    )]
    pub start_time: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(
        default,
        with = "opt_time_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_duration: Option<Duration>,
    #[serde(default, rename = "startVUs", skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Stage {
    #[serde(with = "time_string")]
    pub duration: Duration,
    pub target: u32,
}

/// What one iteration of a scenario does: a single request followed by think time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(
        default,
        deserialize_with = "scalar_map",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub query: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(
        default,
        with = "time_string",
        skip_serializing_if = "Duration::is_zero"
    )]
    pub sleep: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Expectation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Expectation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusExpectation>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub json: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum StatusExpectation {
    Code(u16),
    /// A status class such as `2xx` or `4xx`.
    Class(String),
}

impl StatusExpectation {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusExpectation::Code(code) => *code == status,
            StatusExpectation::Class(class) => {
                let class = class.to_ascii_lowercase();
                match class.strip_suffix("xx") {
                    Some(digit) => digit == (status / 100).to_string(),
                    None => class == status.to_string(),
                }
            }
        }
    }

    /// A code in 100..=599, or a class `1xx` to `5xx`.
    pub fn is_well_formed(&self) -> bool {
        match self {
            StatusExpectation::Code(code) => (100..=599).contains(code),
            StatusExpectation::Class(class) => {
                let bytes = class.as_bytes();
                bytes.len() == 3
                    && (b'1'..=b'5').contains(&bytes[0])
                    && (bytes[1..].eq_ignore_ascii_case(b"xx")
                        || bytes[1..].iter().all(u8::is_ascii_digit))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            StatusExpectation::Code(code) => format!("status is {}", code),
            StatusExpectation::Class(class) => format!("status is {}", class),
        }
    }
}

impl std::fmt::Display for StatusExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusExpectation::Code(code) => write!(f, "{}", code),
            StatusExpectation::Class(class) => write!(f, "{}", class),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    /// Minimum share of checks that must pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<f64>,
    /// Maximum share of requests allowed to fail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_req_failed: Option<f64>,
    #[serde(
        default,
        with = "opt_time_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub http_req_duration_p95: Option<Duration>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

fn default_method() -> String {
    "GET".to_string()
}

impl Plan {
    /// The price lookup load test: normal, not-found and malformed-date
    /// traffic, 200 VUs each, run back to back.
    pub fn builtin() -> Self {
        let scenario = |exec: &str, start: u64| ScenarioConfig {
            executor: ExecutorKind::ConstantVus,
            vus: Some(200),
            duration: Some(Duration::from_secs(10)),
            exec: exec.to_string(),
            graceful_stop: Duration::ZERO,
            start_time: Duration::from_secs(start),
            iterations: None,
            max_duration: None,
            start_vus: None,
            stages: Vec::new(),
        };

        let request = |date: &str, brand: &str, expect: Expectation| RequestSpec {
            method: default_method(),
            path: "/prices".to_string(),
            query: IndexMap::from([
                ("applicationDate".to_string(), date.to_string()),
                ("productId".to_string(), "35455".to_string()),
                ("brandId".to_string(), brand.to_string()),
            ]),
            headers: IndexMap::new(),
            sleep: Duration::from_millis(500),
            expect: Some(expect),
        };

        let found = Expectation {
            status: Some(StatusExpectation::Code(200)),
            json: IndexMap::from([
                ("productId".to_string(), serde_json::json!(35455)),
                ("brandId".to_string(), serde_json::json!(1)),
            ]),
        };
        let status_only = |code| Expectation {
            status: Some(StatusExpectation::Code(code)),
            json: IndexMap::new(),
        };

        Self {
            name: "prices".to_string(),
            host: default_host(),
            timeout: default_timeout(),
            vars: IndexMap::new(),
            scenarios: IndexMap::from([
                ("normal".to_string(), scenario("normal", 0)),
                ("notFound".to_string(), scenario("notFound", 10)),
                ("error".to_string(), scenario("error", 20)),
            ]),
            requests: IndexMap::from([
                (
                    "normal".to_string(),
                    request("2025-06-14T10:00:00.000", "1", found),
                ),
                (
                    "notFound".to_string(),
                    request("2025-06-14T10:00:00.000", "2", status_only(404)),
                ),
                (
                    "error".to_string(),
                    request("2025-00:00:00.000", "1", status_only(400)),
                ),
            ]),
            thresholds: None,
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.scenarios.is_empty() {
            return Err(PlanError::NoScenarios);
        }

        let host = Url::parse(&self.host).map_err(|_| PlanError::InvalidHost(self.host.clone()))?;
        if !matches!(host.scheme(), "http" | "https") || host.host_str().is_none() {
            return Err(PlanError::InvalidHost(self.host.clone()));
        }

        for (name, scenario) in &self.scenarios {
            if !self.requests.contains_key(&scenario.exec) {
                return Err(PlanError::UnknownExec {
                    scenario: name.clone(),
                    exec: scenario.exec.clone(),
                });
            }
            VuSchedule::from_config(name, scenario)?;
        }

        for (name, request) in &self.requests {
            if !request.method.eq_ignore_ascii_case("GET") {
                return Err(PlanError::InvalidMethod {
                    request: name.clone(),
                    method: request.method.clone(),
                });
            }
            if let Some(status) = request.expect.as_ref().and_then(|e| e.status.as_ref()) {
                if !status.is_well_formed() {
                    return Err(PlanError::InvalidStatus {
                        request: name.clone(),
                        status: status.to_string(),
                    });
                }
            }
        }

        if let Some(thresholds) = &self.thresholds {
            for (name, value) in [
                ("checks", thresholds.checks),
                ("httpReqFailed", thresholds.http_req_failed),
            ] {
                if let Some(value) = value {
                    if !(0.0..=1.0).contains(&value) {
                        return Err(PlanError::InvalidThreshold { name, value });
                    }
                }
            }
        }

        Ok(())
    }

    /// Keeps only the named scenarios, in plan order.
    pub fn select_scenarios(&mut self, names: &[String]) -> Result<(), PlanError> {
        if names.is_empty() {
            return Ok(());
        }
        if let Some(missing) = names.iter().find(|n| !self.scenarios.contains_key(*n)) {
            return Err(PlanError::UnknownScenario(missing.clone()));
        }
        self.scenarios.retain(|name, _| names.contains(name));
        Ok(())
    }

    /// Overrides VU count and duration on every scenario whose executor takes them.
    pub fn override_load(&mut self, vus: Option<u32>, duration: Option<Duration>) {
        for scenario in self.scenarios.values_mut() {
            if let Some(vus) = vus {
                if scenario.executor != ExecutorKind::RampingVus {
                    scenario.vus = Some(vus);
                }
            }
            if let Some(duration) = duration {
                if scenario.executor == ExecutorKind::ConstantVus {
                    scenario.duration = Some(duration);
                }
            }
        }
    }

    /// Adds headers to every request, replacing same-named ones.
    pub fn add_headers(&mut self, headers: &HashMap<String, String>) {
        for request in self.requests.values_mut() {
            for (key, value) in headers {
                request.headers.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Accepts numbers and booleans where strings are expected, so that
/// `productId: 35455` works as well as `productId: "35455"`.
fn scalar_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let raw = IndexMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(D::Error::custom(format!(
                        "query parameter '{}' must be a scalar, got {}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

// Durations are written as time strings ("10s", "500ms") in plan files
pub(crate) mod time_string {
    use crate::utils::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod opt_time_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::time_string::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| crate::utils::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved_builtin() -> Plan {
        let mut plan = Plan::builtin();
        plan.host = "http://host.docker.internal:8080".to_string();
        plan
    }

    #[test]
    fn test_builtin_scenarios() {
        let plan = Plan::builtin();
        let names: Vec<_> = plan.scenarios.keys().cloned().collect();
        assert_eq!(names, vec!["normal", "notFound", "error"]);

        for (name, scenario) in &plan.scenarios {
            assert_eq!(scenario.executor, ExecutorKind::ConstantVus);
            assert_eq!(scenario.vus, Some(200));
            assert_eq!(scenario.duration, Some(Duration::from_secs(10)));
            assert_eq!(&scenario.exec, name);
            assert_eq!(scenario.graceful_stop, Duration::ZERO);
        }

        assert_eq!(plan.scenarios["normal"].start_time, Duration::ZERO);
        assert_eq!(plan.scenarios["notFound"].start_time, Duration::from_secs(10));
        assert_eq!(plan.scenarios["error"].start_time, Duration::from_secs(20));
    }

    #[test]
    fn test_builtin_requests() {
        let plan = Plan::builtin();
        let error = &plan.requests["error"];
        assert_eq!(error.path, "/prices");
        assert_eq!(error.query["applicationDate"], "2025-00:00:00.000");
        assert_eq!(error.sleep, Duration::from_millis(500));

        let not_found = &plan.requests["notFound"];
        assert_eq!(not_found.query["brandId"], "2");
        assert_eq!(
            not_found.expect.as_ref().unwrap().status,
            Some(StatusExpectation::Code(404))
        );
    }

    #[test]
    fn test_builtin_validates_once_resolved() {
        assert!(resolved_builtin().validate().is_ok());
        // The raw host still carries the ${PRICES_HOST:...} placeholder
        assert!(matches!(
            Plan::builtin().validate(),
            Err(PlanError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip_keeps_engine_option_names() {
        let plan = resolved_builtin();
        let yaml = plan.to_yaml().unwrap();
        assert!(yaml.contains("executor: constant-vus"));
        assert!(yaml.contains("gracefulStop: 0s"));
        assert!(yaml.contains("startTime: 10s"));
        assert!(yaml.contains("sleep: 500ms"));

        let parsed: Plan = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn test_scenario_defaults() {
        let yaml = r#"
executor: constant-vus
vus: 5
duration: 1m
exec: normal
"#;
        let scenario: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.graceful_stop, Duration::from_secs(30));
        assert_eq!(scenario.start_time, Duration::ZERO);
        assert_eq!(scenario.duration, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_numeric_query_values() {
        let yaml = r#"
path: /prices
query:
  productId: 35455
  brandId: 1
"#;
        let request: RequestSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.query["productId"], "35455");
        let keys: Vec<_> = request.query.keys().cloned().collect();
        assert_eq!(keys, vec!["productId", "brandId"]);
    }

    #[test]
    fn test_unknown_exec_rejected() {
        let mut plan = resolved_builtin();
        plan.scenarios["error"].exec = "missing".to_string();
        assert_eq!(
            plan.validate(),
            Err(PlanError::UnknownExec {
                scenario: "error".to_string(),
                exec: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_select_scenarios() {
        let mut plan = resolved_builtin();
        plan.select_scenarios(&["error".to_string(), "normal".to_string()])
            .unwrap();
        let names: Vec<_> = plan.scenarios.keys().cloned().collect();
        assert_eq!(names, vec!["normal", "error"]);

        assert_eq!(
            plan.select_scenarios(&["nope".to_string()]),
            Err(PlanError::UnknownScenario("nope".to_string()))
        );
    }

    #[test]
    fn test_override_load() {
        let mut plan = resolved_builtin();
        plan.override_load(Some(3), Some(Duration::from_secs(2)));
        for scenario in plan.scenarios.values() {
            assert_eq!(scenario.vus, Some(3));
            assert_eq!(scenario.duration, Some(Duration::from_secs(2)));
        }
    }

    #[test]
    fn test_add_headers_reaches_every_request() {
        let mut plan = resolved_builtin();
        let headers = HashMap::from([("Accept".to_string(), "application/json".to_string())]);
        plan.add_headers(&headers);
        assert!(plan
            .requests
            .values()
            .all(|r| r.headers.get("Accept").map(String::as_str) == Some("application/json")));
    }

    #[test]
    fn test_status_expectation_matching() {
        assert!(StatusExpectation::Code(404).matches(404));
        assert!(!StatusExpectation::Code(404).matches(400));
        assert!(StatusExpectation::Class("4xx".to_string()).matches(400));
        assert!(StatusExpectation::Class("2XX".to_string()).matches(204));
        assert!(!StatusExpectation::Class("2xx".to_string()).matches(500));

        let parsed: StatusExpectation = serde_json::from_str("\"5xx\"").unwrap();
        assert!(parsed.matches(503));
    }

    #[test]
    fn test_only_get_requests_accepted() {
        let mut plan = resolved_builtin();
        plan.requests["normal"].method = "get".to_string();
        assert!(plan.validate().is_ok());

        plan.requests["normal"].method = "DELETE".to_string();
        assert_eq!(
            plan.validate(),
            Err(PlanError::InvalidMethod {
                request: "normal".to_string(),
                method: "DELETE".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_status_expectation_rejected() {
        let mut plan = resolved_builtin();
        let expect = plan.requests["error"].expect.as_mut().unwrap();
        expect.status = Some(StatusExpectation::Class("ok".to_string()));
        assert_eq!(
            plan.validate(),
            Err(PlanError::InvalidStatus {
                request: "error".to_string(),
                status: "ok".to_string()
            })
        );

        for good in ["4xx", "2XX", "404"] {
            assert!(StatusExpectation::Class(good.to_string()).is_well_formed());
        }
        for bad in ["6xx", "xx", "4x", "40", "4xxx", "a04"] {
            assert!(!StatusExpectation::Class(bad.to_string()).is_well_formed());
        }
        assert!(!StatusExpectation::Code(42).is_well_formed());
    }

    #[test]
    fn test_threshold_rates_validated() {
        let mut plan = resolved_builtin();
        plan.thresholds = Some(Thresholds {
            checks: Some(1.5),
            ..Default::default()
        });
        assert_eq!(
            plan.validate(),
            Err(PlanError::InvalidThreshold {
                name: "checks",
                value: 1.5
            })
        );
    }
}
