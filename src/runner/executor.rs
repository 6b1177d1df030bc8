use crate::config::{Expectation, RequestSpec};
use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

/// Everything observed about one request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub status: Option<u16>,
    pub duration: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error: Option<String>,
    pub checks: Vec<CheckResult>,
}

impl RequestOutcome {
    /// Transport errors and 4xx/5xx responses count as failed requests.
    pub fn is_failed(&self) -> bool {
        self.status.map_or(true, |status| status >= 400)
    }

    pub fn is_connection_error(&self) -> bool {
        self.status.is_none()
    }
}

/// Sends plan requests through one pooled client shared by every VU.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    host: String,
}

impl RequestExecutor {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    /// `{host}{path}?k=v&...` with query pairs in declared order.
    pub fn build_url(&self, request: &RequestSpec) -> Result<Url> {
        let raw = if request.path.starts_with('/') {
            format!("{}{}", self.host, request.path)
        } else {
            format!("{}/{}", self.host, request.path)
        };
        let mut url = Url::parse(&raw).with_context(|| format!("Invalid URL: {}", raw))?;

        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    pub fn request_builder(&self, request: &RequestSpec) -> Result<(RequestBuilder, u64)> {
        let url = self.build_url(request)?;
        let method = request
            .method
            .to_ascii_uppercase()
            .parse::<Method>()
            .with_context(|| format!("Invalid HTTP method: {}", request.method))?;

        // Request line plus headers; the client adds a few more of its own
        let mut bytes_sent = (method.as_str().len() + url.as_str().len() + 16) as u64;
        let mut builder = self.client.request(method, url);
        for (key, value) in &request.headers {
            bytes_sent += (key.len() + value.len() + 4) as u64;
            builder = builder.header(key, value);
        }

        Ok((builder, bytes_sent))
    }

    pub async fn execute(&self, request: &RequestSpec) -> RequestOutcome {
        let start_time = Instant::now();

        let (builder, bytes_sent) = match self.request_builder(request) {
            Ok(built) => built,
            Err(e) => return failed_outcome(start_time.elapsed(), 0, e.to_string()),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return failed_outcome(start_time.elapsed(), bytes_sent, e.to_string()),
        };

        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return RequestOutcome {
                    status: Some(status),
                    duration: start_time.elapsed(),
                    bytes_sent,
                    bytes_received: 0,
                    error: Some(format!("Failed to read response body: {}", e)),
                    checks: Vec::new(),
                }
            }
        };
        let duration = start_time.elapsed();

        let checks = request
            .expect
            .as_ref()
            .map(|expect| evaluate_checks(status, &body, expect))
            .unwrap_or_default();

        RequestOutcome {
            status: Some(status),
            duration,
            bytes_sent,
            bytes_received: body.len() as u64,
            error: (status >= 400).then(|| format!("HTTP {}", status)),
            checks,
        }
    }
}

fn failed_outcome(duration: Duration, bytes_sent: u64, error: String) -> RequestOutcome {
    RequestOutcome {
        status: None,
        duration,
        bytes_sent,
        bytes_received: 0,
        error: Some(error),
        checks: Vec::new(),
    }
}

pub fn evaluate_checks(status: u16, body: &[u8], expect: &Expectation) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    if let Some(expected) = &expect.status {
        checks.push(CheckResult {
            name: expected.describe(),
            passed: expected.matches(status),
        });
    }

    if !expect.json.is_empty() {
        let json: Option<Value> = serde_json::from_slice(body).ok();
        for (path, expected) in &expect.json {
            let actual = json.as_ref().and_then(|json| extract_json_value(json, path));
            checks.push(CheckResult {
                name: format!("{} is {}", path, expected),
                passed: actual == Some(expected),
            });
        }
    }

    checks
}

/// Follows a dotted path such as `price.amount` or `$.items[0].id`.
pub fn extract_json_value<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").or_else(|| path.strip_prefix('$')).unwrap_or(path);
    let mut current = json;

    for part in path.split('.').filter(|p| !p.is_empty()) {
        match part.split_once('[') {
            Some((field, index)) => {
                if !field.is_empty() {
                    current = current.get(field)?;
                }
                let index: usize = index.strip_suffix(']')?.parse().ok()?;
                current = current.get(index)?;
            }
            None => current = current.get(part)?,
        }
    }

    Some(current)
}
