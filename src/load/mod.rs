pub mod metrics;
pub mod monitor;
pub mod runner;
pub mod schedule;
pub mod thresholds;
pub mod vu;

pub use metrics::{ScenarioMetrics, ScenarioResults};
pub use monitor::LoadMonitor;
pub use runner::{LoadRunner, RunResults};
pub use schedule::VuSchedule;
