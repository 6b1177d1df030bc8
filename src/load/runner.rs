use crate::config::{Plan, ScenarioConfig};
use crate::load::metrics::{ScenarioMetrics, ScenarioPhase, ScenarioResults};
use crate::load::schedule::VuSchedule;
use crate::load::thresholds::{self, ThresholdVerdict};
use crate::load::vu::{run_vu, VuContext, VuSummary};
use crate::runner::executor::RequestExecutor;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Live handle on one scenario, shared with the monitor.
#[derive(Clone)]
pub struct ScenarioHandle {
    pub name: String,
    pub executor: String,
    pub schedule: Arc<VuSchedule>,
    pub start_time: Duration,
    pub graceful_stop: Duration,
    pub metrics: Arc<Mutex<ScenarioMetrics>>,
}

impl ScenarioHandle {
    /// Latest point at which this scenario can still be running, from run start.
    pub fn end_offset(&self) -> Duration {
        self.start_time
            .saturating_add(self.schedule.run_window())
            .saturating_add(self.graceful_stop)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub run_id: Uuid,
    pub plan: String,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioResults>,
    pub totals: ScenarioResults,
    pub thresholds: Vec<ThresholdVerdict>,
    pub aborted: bool,
}

impl RunResults {
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|v| v.passed)
    }
}

pub struct LoadRunner {
    plan: Plan,
    executor: RequestExecutor,
    handles: Vec<ScenarioHandle>,
    abort: CancellationToken,
}

impl LoadRunner {
    pub fn new(plan: Plan) -> Result<Self> {
        plan.validate().context("Plan is not runnable")?;
        let executor = RequestExecutor::new(&plan.host, plan.timeout)?;

        let handles = plan
            .scenarios
            .iter()
            .map(|(name, config)| {
                let schedule = VuSchedule::from_config(name, config)?;
                Ok(ScenarioHandle {
                    name: name.clone(),
                    executor: config.executor.as_str().to_string(),
                    schedule: Arc::new(schedule),
                    start_time: config.start_time,
                    graceful_stop: config.graceful_stop,
                    metrics: Arc::new(Mutex::new(ScenarioMetrics::new())),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            plan,
            executor,
            handles,
            abort: CancellationToken::new(),
        })
    }

    pub fn handles(&self) -> &[ScenarioHandle] {
        &self.handles
    }

    /// Cancelling this token halts every scenario immediately.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Longest time the run can take, including graceful stops.
    pub fn planned_duration(&self) -> Duration {
        self.handles
            .iter()
            .map(ScenarioHandle::end_offset)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub async fn run(&self) -> Result<RunResults> {
        let started_at = Utc::now();
        let run_start = Instant::now();
        info!(plan = %self.plan.name, scenarios = self.handles.len(), "run started");

        let mut scenarios = FuturesUnordered::new();
        for handle in &self.handles {
            let config = self.plan.scenarios[&handle.name].clone();
            let request = Arc::new(self.plan.requests[&config.exec].clone());
            let task = ScenarioTask {
                handle: handle.clone(),
                config,
                request,
                executor: self.executor.clone(),
                abort: self.abort.clone(),
            };
            scenarios.push(tokio::spawn(task.run(run_start)));
        }

        while let Some(joined) = scenarios.next().await {
            if let Err(e) = joined {
                warn!(error = %e, "scenario task failed");
            }
        }

        let aborted = self.abort.is_cancelled();
        let wall_duration = run_start.elapsed();
        info!(elapsed = ?wall_duration, aborted, "run finished");

        self.collect_results(started_at, wall_duration, aborted).await
    }

    async fn collect_results(
        &self,
        started_at: DateTime<Utc>,
        wall_duration: Duration,
        aborted: bool,
    ) -> Result<RunResults> {
        let mut totals = ScenarioMetrics::new();
        let mut scenarios = Vec::with_capacity(self.handles.len());

        for handle in &self.handles {
            let metrics = handle.metrics.lock().await;
            scenarios.push(metrics.calculate_results(
                &handle.name,
                &handle.executor,
                handle.schedule.max_vus(),
            ));
            totals.merge(&metrics);
        }

        let max_vus = self.handles.iter().map(|h| h.schedule.max_vus()).sum();
        let totals = totals.calculate_results_over("total", "-", max_vus, wall_duration);
        let thresholds = self
            .plan
            .thresholds
            .as_ref()
            .map(|t| thresholds::evaluate(t, &totals))
            .unwrap_or_default();

        Ok(RunResults {
            run_id: Uuid::new_v4(),
            plan: self.plan.name.clone(),
            host: self.plan.host.clone(),
            started_at,
            scenarios,
            totals,
            thresholds,
            aborted,
        })
    }
}

struct ScenarioTask {
    handle: ScenarioHandle,
    config: ScenarioConfig,
    request: Arc<crate::config::RequestSpec>,
    executor: RequestExecutor,
    abort: CancellationToken,
}

impl ScenarioTask {
    async fn run(self, run_start: Instant) {
        let name = self.handle.name.clone();

        let begin = tokio::time::Instant::from_std(run_start + self.config.start_time);
        tokio::select! {
            _ = sleep_until(begin) => {}
            _ = self.abort.cancelled() => {
                info!(scenario = %name, "scenario skipped");
                return;
            }
        }

        let halt = self.abort.child_token();
        let drain = halt.child_token();
        let started = Instant::now();
        {
            let mut metrics = self.handle.metrics.lock().await;
            metrics.mark_started();
            metrics.active_vus = self.handle.schedule.active_vus(Duration::ZERO);
        }
        info!(
            scenario = %name,
            executor = %self.handle.executor,
            vus = self.handle.schedule.max_vus(),
            exec = %self.config.exec,
            "scenario started"
        );

        let ctx = VuContext {
            scenario: Arc::from(name.as_str()),
            request: self.request,
            executor: self.executor,
            schedule: Arc::clone(&self.handle.schedule),
            metrics: Arc::clone(&self.handle.metrics),
            started,
            drain: drain.clone(),
            halt: halt.clone(),
        };

        let mut vus: FuturesUnordered<JoinHandle<VuSummary>> = (0..self.handle.schedule.max_vus())
            .map(|id| tokio::spawn(run_vu(id, ctx.clone())))
            .collect();

        let sampler = spawn_vu_sampler(self.handle.clone(), started, drain.clone());

        // Run window: ends early if every VU has finished its iterations
        join_until(&mut vus, sleep(self.handle.schedule.run_window())).await;
        drain.cancel();
        self.handle.metrics.lock().await.phase = ScenarioPhase::Draining;

        // Graceful stop: in-flight iterations may complete
        let finished_in_time = join_until(&mut vus, sleep(self.config.graceful_stop)).await;
        halt.cancel();
        if !finished_in_time {
            info!(scenario = %name, "graceful stop elapsed, interrupting iterations");
        }
        join_until(&mut vus, std::future::pending::<()>()).await;
        sampler.abort();

        let mut metrics = self.handle.metrics.lock().await;
        metrics.mark_finished();
        info!(
            scenario = %name,
            requests = metrics.request_count,
            interrupted = metrics.interrupted_iterations,
            "scenario finished"
        );
    }
}

/// Drains finished VUs until all are done (`true`) or `deadline` fires (`false`).
async fn join_until<F>(vus: &mut FuturesUnordered<JoinHandle<VuSummary>>, deadline: F) -> bool
where
    F: Future<Output = ()>,
{
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            joined = vus.next() => match joined {
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!(error = %e, "vu task failed"),
                None => return true,
            },
            _ = &mut deadline => return vus.is_empty(),
        }
    }
}

/// Keeps the live VU gauge current for ramping schedules.
fn spawn_vu_sampler(
    handle: ScenarioHandle,
    started: Instant,
    drain: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(250));
        loop {
            tokio::select! {
                _ = drain.cancelled() => break,
                _ = interval.tick() => {
                    let active = handle.schedule.active_vus(started.elapsed());
                    handle.metrics.lock().await.active_vus = active;
                }
            }
        }
    })
}
