use crate::config::{ExecutorKind, PlanError, ScenarioConfig, Stage};
use crate::utils::format_duration;
use std::time::Duration;

const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(600);
/// Latest a scenario may end, counting startTime, its window and gracefulStop.
pub const MAX_SCENARIO_END: Duration = Duration::from_secs(365 * 24 * 3600);

/// How many VUs a scenario runs at each point of its window.
#[derive(Debug, Clone, PartialEq)]
pub enum VuSchedule {
    /// A fixed number of VUs looping for a fixed time
    ConstantVus { vus: u32, duration: Duration },
    /// Each VU runs a fixed number of iterations, bounded by `max_duration`
    PerVuIterations {
        vus: u32,
        iterations: u32,
        max_duration: Duration,
    },
    /// VU count moves linearly toward each stage target
    RampingVus { start_vus: u32, stages: Vec<Stage> },
}

impl VuSchedule {
    pub fn from_config(name: &str, config: &ScenarioConfig) -> Result<Self, PlanError> {
        let schedule = Self::build(name, config)?;

        let window = match &schedule {
            VuSchedule::RampingVus { stages, .. } => stages
                .iter()
                .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration)),
            other => Some(other.run_window()),
        };
        let end = window
            .and_then(|window| config.start_time.checked_add(window))
            .and_then(|end| end.checked_add(config.graceful_stop));

        match end {
            Some(end) if end <= MAX_SCENARIO_END => Ok(schedule),
            _ => Err(PlanError::InvalidValue {
                scenario: name.to_string(),
                field: "startTime",
                reason: format!(
                    "startTime, run window and gracefulStop must add up to at most {}",
                    format_duration(MAX_SCENARIO_END)
                ),
            }),
        }
    }

    fn build(name: &str, config: &ScenarioConfig) -> Result<Self, PlanError> {
        let missing = |field| PlanError::MissingField {
            scenario: name.to_string(),
            field,
        };
        let invalid = |field, reason: &str| PlanError::InvalidValue {
            scenario: name.to_string(),
            field,
            reason: reason.to_string(),
        };

        match config.executor {
            ExecutorKind::ConstantVus => {
                let vus = config.vus.ok_or_else(|| missing("vus"))?;
                let duration = config.duration.ok_or_else(|| missing("duration"))?;
                if vus == 0 {
                    return Err(invalid("vus", "must be at least 1"));
                }
                if duration.is_zero() {
                    return Err(invalid("duration", "must be greater than 0s"));
                }
                Ok(VuSchedule::ConstantVus { vus, duration })
            }
            ExecutorKind::PerVuIterations => {
                let vus = config.vus.unwrap_or(1);
                let iterations = config.iterations.unwrap_or(1);
                if vus == 0 {
                    return Err(invalid("vus", "must be at least 1"));
                }
                if iterations == 0 {
                    return Err(invalid("iterations", "must be at least 1"));
                }
                let max_duration = config.max_duration.unwrap_or(DEFAULT_MAX_DURATION);
                if max_duration.is_zero() {
                    return Err(invalid("maxDuration", "must be greater than 0s"));
                }
                Ok(VuSchedule::PerVuIterations {
                    vus,
                    iterations,
                    max_duration,
                })
            }
            ExecutorKind::RampingVus => {
                if config.stages.is_empty() {
                    return Err(missing("stages"));
                }
                let schedule = VuSchedule::RampingVus {
                    start_vus: config.start_vus.unwrap_or(1),
                    stages: config.stages.clone(),
                };
                if schedule.max_vus() == 0 {
                    return Err(invalid("stages", "never reaches a single VU"));
                }
                Ok(schedule)
            }
        }
    }

    pub fn max_vus(&self) -> u32 {
        match self {
            VuSchedule::ConstantVus { vus, .. } | VuSchedule::PerVuIterations { vus, .. } => *vus,
            VuSchedule::RampingVus { start_vus, stages } => stages
                .iter()
                .map(|stage| stage.target)
                .fold(*start_vus, u32::max),
        }
    }

    /// Time during which new iterations may start; graceful stop comes after.
    pub fn run_window(&self) -> Duration {
        match self {
            VuSchedule::ConstantVus { duration, .. } => *duration,
            VuSchedule::PerVuIterations { max_duration, .. } => *max_duration,
            VuSchedule::RampingVus { stages, .. } => stages.iter().map(|s| s.duration).sum(),
        }
    }

    pub fn iteration_limit(&self) -> Option<u32> {
        match self {
            VuSchedule::PerVuIterations { iterations, .. } => Some(*iterations),
            _ => None,
        }
    }

    pub fn active_vus(&self, elapsed: Duration) -> u32 {
        if elapsed >= self.run_window() {
            return 0;
        }

        match self {
            VuSchedule::ConstantVus { vus, .. } | VuSchedule::PerVuIterations { vus, .. } => *vus,
            VuSchedule::RampingVus { start_vus, stages } => {
                let mut from = *start_vus;
                let mut stage_start = Duration::ZERO;

                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end {
                        let progress = (elapsed - stage_start).as_secs_f64()
                            / stage.duration.as_secs_f64();
                        let delta = stage.target as f64 - from as f64;
                        return (from as f64 + delta * progress).round() as u32;
                    }
                    from = stage.target;
                    stage_start = stage_end;
                }

                from
            }
        }
    }

    pub fn phase_description(&self, elapsed: Duration) -> String {
        let window = self.run_window();
        if elapsed >= window {
            return "Winding down".to_string();
        }

        match self {
            VuSchedule::ConstantVus { vus, .. } => {
                let progress = (elapsed.as_secs_f64() / window.as_secs_f64() * 100.0) as u32;
                format!("{} VUs ({}%)", vus, progress)
            }
            VuSchedule::PerVuIterations {
                vus, iterations, ..
            } => format!("{} VUs x {} iterations", vus, iterations),
            VuSchedule::RampingVus { .. } => {
                format!("Ramping ({}/{} VUs)", self.active_vus(elapsed), self.max_vus())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Plan;

    fn ramping(start_vus: u32, stages: &[(u64, u32)]) -> VuSchedule {
        VuSchedule::RampingVus {
            start_vus,
            stages: stages
                .iter()
                .map(|(secs, target)| Stage {
                    duration: Duration::from_secs(*secs),
                    target: *target,
                })
                .collect(),
        }
    }

    #[test]
    fn test_constant_vus() {
        let plan = Plan::builtin();
        let schedule = VuSchedule::from_config("normal", &plan.scenarios["normal"]).unwrap();

        assert_eq!(schedule.max_vus(), 200);
        assert_eq!(schedule.run_window(), Duration::from_secs(10));
        assert_eq!(schedule.active_vus(Duration::from_secs(5)), 200);
        assert_eq!(schedule.active_vus(Duration::from_secs(10)), 0);
        assert_eq!(schedule.iteration_limit(), None);
        assert_eq!(schedule.phase_description(Duration::from_secs(5)), "200 VUs (50%)");
    }

    #[test]
    fn test_constant_vus_requires_options() {
        let mut config = Plan::builtin().scenarios["normal"].clone();
        config.duration = None;
        assert_eq!(
            VuSchedule::from_config("normal", &config),
            Err(PlanError::MissingField {
                scenario: "normal".to_string(),
                field: "duration"
            })
        );

        config.duration = Some(Duration::from_secs(1));
        config.vus = Some(0);
        assert!(matches!(
            VuSchedule::from_config("normal", &config),
            Err(PlanError::InvalidValue { field: "vus", .. })
        ));
    }

    #[test]
    fn test_per_vu_iterations_defaults() {
        let mut config = Plan::builtin().scenarios["normal"].clone();
        config.executor = ExecutorKind::PerVuIterations;
        config.vus = Some(4);
        config.iterations = Some(3);

        let schedule = VuSchedule::from_config("normal", &config).unwrap();
        assert_eq!(schedule.iteration_limit(), Some(3));
        assert_eq!(schedule.run_window(), Duration::from_secs(600));
        assert_eq!(schedule.active_vus(Duration::from_secs(1)), 4);
    }

    #[test]
    fn test_ramping_interpolation() {
        let schedule = ramping(0, &[(10, 100), (10, 100), (10, 0)]);

        assert_eq!(schedule.max_vus(), 100);
        assert_eq!(schedule.run_window(), Duration::from_secs(30));
        assert_eq!(schedule.active_vus(Duration::ZERO), 0);
        assert_eq!(schedule.active_vus(Duration::from_secs(5)), 50);
        assert_eq!(schedule.active_vus(Duration::from_secs(15)), 100);
        assert_eq!(schedule.active_vus(Duration::from_secs(25)), 50);
        assert_eq!(schedule.active_vus(Duration::from_secs(30)), 0);
    }

    #[test]
    fn test_ramping_zero_length_stage_jumps() {
        let schedule = ramping(1, &[(0, 20), (10, 20)]);
        assert_eq!(schedule.active_vus(Duration::ZERO), 20);
        assert_eq!(schedule.active_vus(Duration::from_secs(3)), 20);
    }

    #[test]
    fn test_scenario_end_is_bounded() {
        let mut config = Plan::builtin().scenarios["normal"].clone();
        config.start_time = Duration::from_secs(18_000_000_000_000_000_000);
        config.duration = Some(Duration::from_secs(1_000_000_000_000_000_000));
        assert!(matches!(
            VuSchedule::from_config("normal", &config),
            Err(PlanError::InvalidValue { field: "startTime", .. })
        ));

        config.start_time = MAX_SCENARIO_END;
        config.duration = Some(Duration::from_secs(1));
        assert!(VuSchedule::from_config("normal", &config).is_err());

        config.start_time = Duration::from_secs(3600);
        assert!(VuSchedule::from_config("normal", &config).is_ok());
    }

    #[test]
    fn test_ramping_stage_sum_overflow_rejected() {
        let mut config = Plan::builtin().scenarios["normal"].clone();
        config.executor = ExecutorKind::RampingVus;
        config.stages = vec![
            Stage {
                duration: Duration::MAX,
                target: 5,
            },
            Stage {
                duration: Duration::from_secs(1),
                target: 0,
            },
        ];
        assert!(matches!(
            VuSchedule::from_config("normal", &config),
            Err(PlanError::InvalidValue { field: "startTime", .. })
        ));
    }

    #[test]
    fn test_ramping_requires_stages() {
        let mut config = Plan::builtin().scenarios["normal"].clone();
        config.executor = ExecutorKind::RampingVus;
        assert!(matches!(
            VuSchedule::from_config("normal", &config),
            Err(PlanError::MissingField { field: "stages", .. })
        ));
    }
}
