use nowify_core::AppConfig;
use std::time::Duration;

pub mod merge;
pub mod session;

pub use merge::{advance_progress, merge_poll_result, MergeOutcome};
pub use session::{spawn_engine, EngineClosed, EngineHandle, SessionPhase};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub progress_tick: Duration,
    pub progress_step_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2_500),
            progress_tick: Duration::from_millis(1_000),
            progress_step_ms: 1_000,
        }
    }
}

impl EngineConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        let tick_ms = cfg.intervals.progress_tick_ms.max(1);
        Self {
            poll_interval: Duration::from_millis(cfg.intervals.poll_ms.max(1)),
            progress_tick: Duration::from_millis(tick_ms),
            progress_step_ms: tick_ms,
        }
    }
}
