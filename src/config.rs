//! Run parameters, limits, and timing knobs for the labeling engine.

use std::time::Duration;

use crate::error::{EngineError, Result};

/// Largest batch the ingestor accepts.
pub const MAX_ITEMS: usize = 1000;
/// Largest worker pool the engine will spawn.
pub const MAX_WORKERS: usize = 50;
/// Simulated seconds per tick.
pub const TICK_SECONDS: f64 = 0.05;
/// Safety time limit in simulated seconds.
pub const DEFAULT_TIME_LIMIT_S: f64 = 120.0;
/// Recovery delay range after a fault, simulated milliseconds.
pub const RECOVERY_MS_MIN: u64 = 100;
pub const RECOVERY_MS_MAX: u64 = 1000;
/// Headroom applied by the workforce planner.
pub const SAFETY_MARGIN: f64 = 1.15;
/// Simulated seconds between progress snapshots.
pub const PROGRESS_INTERVAL_S: f64 = 5.0;

const PORT_MIN: u16 = 1024;

/// Physical layout of the cell, all lengths in cm.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineGeometry {
    /// Belt speed in cm/s.
    pub speed: f64,
    /// Side length of the square container; the transverse line width.
    pub container_side: f64,
    /// Length of the worked section of the belt.
    pub line_length: f64,
}

impl LineGeometry {
    /// Line position of the batch center when the run starts.
    pub fn start_position(&self) -> f64 {
        -(self.line_length / 2.0 + self.container_side)
    }
}

/// Everything a single engine run needs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub port: u16,
    pub workers: usize,
    pub geometry: LineGeometry,
    pub service_ms: u64,
    pub failure_probability: f64,
    pub seed: u64,
    /// Simulated seconds per wall-clock second.
    pub time_scale: f64,
    /// Simulated seconds before the run is cut off.
    pub time_limit_s: f64,
}

impl EngineConfig {
    /// Reject any parameter outside its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.port < PORT_MIN {
            return Err(EngineError::Configuration(format!(
                "port must be between {PORT_MIN} and 65535, got {}",
                self.port
            )));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(EngineError::Configuration(format!(
                "worker count must be between 1 and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        let g = &self.geometry;
        for (name, value) in [
            ("speed", g.speed),
            ("container side", g.container_side),
            ("line length", g.line_length),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::Configuration(format!(
                    "{name} must be > 0, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.failure_probability) {
            return Err(EngineError::Configuration(format!(
                "failure probability must be within [0, 1], got {}",
                self.failure_probability
            )));
        }
        if !(self.time_scale.is_finite() && self.time_scale > 0.0) {
            return Err(EngineError::Configuration(format!(
                "time scale must be > 0, got {}",
                self.time_scale
            )));
        }
        if !(self.time_limit_s.is_finite() && self.time_limit_s > 0.0) {
            return Err(EngineError::Configuration(format!(
                "time limit must be > 0, got {}",
                self.time_limit_s
            )));
        }
        Ok(())
    }

    /// Service duration in simulated seconds.
    pub fn service_seconds(&self) -> f64 {
        self.service_ms as f64 / 1000.0
    }

    /// Wall-clock wait corresponding to `sim_seconds` of simulated time.
    pub fn wall(&self, sim_seconds: f64) -> Duration {
        Duration::from_secs_f64((sim_seconds / self.time_scale).max(0.0))
    }

    /// Wall-clock length of one tick.
    pub fn tick_wall(&self) -> Duration {
        self.wall(TICK_SECONDS)
    }
}

#[cfg(test)]
pub(crate) fn test_config(workers: usize, failure_probability: f64) -> EngineConfig {
    EngineConfig {
        port: 9000,
        workers,
        geometry: LineGeometry {
            speed: 10.0,
            container_side: 10.0,
            line_length: 100.0,
        },
        service_ms: 0,
        failure_probability,
        seed: 7,
        time_scale: 50.0,
        time_limit_s: DEFAULT_TIME_LIMIT_S,
    }
}
