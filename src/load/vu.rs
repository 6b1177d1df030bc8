use crate::config::RequestSpec;
use crate::load::metrics::ScenarioMetrics;
use crate::load::schedule::VuSchedule;
use crate::runner::executor::RequestExecutor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const IDLE_POLL: Duration = Duration::from_millis(50);

/// Everything a virtual user needs; cheap to clone per VU.
#[derive(Clone)]
pub struct VuContext {
    pub scenario: Arc<str>,
    pub request: Arc<RequestSpec>,
    pub executor: RequestExecutor,
    pub schedule: Arc<VuSchedule>,
    pub metrics: Arc<Mutex<ScenarioMetrics>>,
    pub started: Instant,
    /// No new iterations once cancelled
    pub drain: CancellationToken,
    /// Abandons the in-flight iteration once cancelled
    pub halt: CancellationToken,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VuSummary {
    pub iterations: u32,
    pub interrupted: bool,
}

/// Runs iterations until the schedule, `drain` or `halt` says stop.
pub async fn run_vu(id: u32, ctx: VuContext) -> VuSummary {
    let mut summary = VuSummary::default();
    let limit = ctx.schedule.iteration_limit();

    loop {
        if ctx.drain.is_cancelled() {
            break;
        }
        if limit.is_some_and(|limit| summary.iterations >= limit) {
            break;
        }

        // Ramping executors park the VUs above the current target
        if id >= ctx.schedule.active_vus(ctx.started.elapsed()) {
            tokio::select! {
                _ = ctx.drain.cancelled() => break,
                _ = sleep(IDLE_POLL) => continue,
            }
        }

        let iteration_start = Instant::now();
        tokio::select! {
            biased;
            _ = ctx.halt.cancelled() => {
                ctx.metrics.lock().await.record_interrupted();
                summary.interrupted = true;
                trace!(scenario = %ctx.scenario, vu = id, "iteration interrupted");
                break;
            }
            _ = iteration(&ctx) => {
                summary.iterations += 1;
                ctx.metrics
                    .lock()
                    .await
                    .record_iteration(iteration_start.elapsed());
            }
        }
    }

    debug!(
        scenario = %ctx.scenario,
        vu = id,
        iterations = summary.iterations,
        interrupted = summary.interrupted,
        "vu stopped"
    );
    summary
}

async fn iteration(ctx: &VuContext) {
    let outcome = ctx.executor.execute(&ctx.request).await;
    if let Some(error) = &outcome.error {
        trace!(scenario = %ctx.scenario, %error, "request failed");
    }
    ctx.metrics.lock().await.record_outcome(&outcome);

    if !ctx.request.sleep.is_zero() {
        sleep(ctx.request.sleep).await;
    }
}
