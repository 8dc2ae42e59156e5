//! Parameter sweep: minimum worker count per (item count, failure probability).

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::config::{DEFAULT_TIME_LIMIT_S, EngineConfig, LineGeometry, MAX_ITEMS};
use crate::error::{EngineError, Result};
use crate::generator;
use crate::ingest;
use crate::sim;

pub const FAILURE_PROBABILITIES: [f64; 4] = [0.0, 0.01, 0.05, 0.10];
/// Largest pool tried before a point is declared unreachable.
pub const MAX_CALIBRATION_WORKERS: usize = 20;
pub const TRIALS_PER_CONFIG: usize = 3;
pub const SUCCESS_THRESHOLD: f64 = 0.95;
const CURVE_POINTS: usize = 20;
const N_MAX_STRETCH: f64 = 1.2;

#[derive(Clone, Debug)]
pub struct CalibrationParams {
    pub n_min: usize,
    pub n_max: usize,
    pub geometry: LineGeometry,
    pub service_ms: u64,
    pub time_scale: f64,
    pub time_limit_s: f64,
    pub out_dir: PathBuf,
}

impl CalibrationParams {
    pub fn validate(&self) -> Result<()> {
        let top = self.n_top();
        if self.n_min == 0 || self.n_max < self.n_min || top > MAX_ITEMS {
            return Err(EngineError::Configuration(format!(
                "need 1 <= n_min <= n_max and 1.2 * n_max <= {MAX_ITEMS}, got {}..{}",
                self.n_min, self.n_max
            )));
        }
        if self.service_ms == 0 {
            return Err(EngineError::Configuration(
                "service time must be > 0".to_string(),
            ));
        }
        // The trial config re-checks geometry, time scale, and limit.
        self.trial_config(1, 0.0, 0).validate()
    }

    /// Upper end of the sweep: `n_max` stretched by 20%.
    pub fn n_top(&self) -> usize {
        (self.n_max as f64 * N_MAX_STRETCH) as usize
    }

    /// Item counts visited, `CURVE_POINTS` steps from `n_min` to `n_top`.
    pub fn n_values(&self) -> Vec<usize> {
        let top = self.n_top().max(self.n_min);
        let step = ((top - self.n_min) / CURVE_POINTS).max(1);
        (self.n_min..=top).step_by(step).collect()
    }

    fn trial_config(&self, workers: usize, failure_probability: f64, seed: u64) -> EngineConfig {
        EngineConfig {
            // Trials run in-process; the port is never bound.
            port: 9000 + (seed % 1000) as u16,
            workers,
            geometry: self.geometry,
            service_ms: self.service_ms,
            failure_probability,
            seed,
            time_scale: self.time_scale,
            time_limit_s: self.time_limit_s,
        }
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            n_min: 10,
            n_max: 50,
            geometry: LineGeometry {
                speed: 10.0,
                container_side: 30.0,
                line_length: 200.0,
            },
            service_ms: 200,
            time_scale: 10.0,
            time_limit_s: DEFAULT_TIME_LIMIT_S,
            out_dir: PathBuf::from("results"),
        }
    }
}

/// One row of a result table.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationRow {
    pub n: usize,
    /// `MAX_CALIBRATION_WORKERS + 1` when no pool size met the threshold.
    pub r_min: usize,
    pub success_rate: f64,
    pub avg_time_s: f64,
}

#[derive(Clone, Copy, Debug)]
struct TrialResult {
    success: f64,
    elapsed_s: f64,
}

fn trial_seed(n: usize, workers: usize, trial: usize, failure_probability: f64) -> u64 {
    ((n * 1000 + workers * 100 + trial) as u64) ^ ((failure_probability * 10_000.0) as u64)
}

/// Generate, serialize, ingest, and run one batch entirely in memory.
fn run_trial(
    params: &CalibrationParams,
    n: usize,
    workers: usize,
    failure_probability: f64,
    seed: u64,
    interrupt: &AtomicBool,
) -> Result<TrialResult> {
    let side = params.geometry.container_side;
    let items = generator::generate_batch(n, side, seed);
    let mut wire = Vec::new();
    generator::write_batch(&mut wire, side, &items)?;
    let batch = ingest::read_batch(Cursor::new(wire))?;
    let config = params.trial_config(workers, failure_probability, seed);
    let metrics = sim::run_batch(&config, batch, interrupt)?;
    Ok(TrialResult {
        success: metrics.tagged_ratio(),
        elapsed_s: metrics.timing.elapsed_s,
    })
}

/// Sweep item counts for one failure probability.
pub fn calibrate_curve(
    params: &CalibrationParams,
    failure_probability: f64,
    interrupt: &AtomicBool,
) -> Result<Vec<CalibrationRow>> {
    let mut rows = Vec::new();
    for n in params.n_values() {
        let mut row = CalibrationRow {
            n,
            r_min: MAX_CALIBRATION_WORKERS + 1,
            success_rate: 0.0,
            avg_time_s: 0.0,
        };
        for workers in 1..=MAX_CALIBRATION_WORKERS {
            if interrupt.load(Ordering::SeqCst) {
                return Err(EngineError::Interrupted);
            }
            let mut success = 0.0;
            let mut elapsed = 0.0;
            for trial in 0..TRIALS_PER_CONFIG {
                let seed = trial_seed(n, workers, trial, failure_probability);
                let result = run_trial(params, n, workers, failure_probability, seed, interrupt)?;
                success += result.success;
                elapsed += result.elapsed_s;
            }
            let avg_success = success / TRIALS_PER_CONFIG as f64;
            if avg_success >= SUCCESS_THRESHOLD {
                row.r_min = workers;
                row.success_rate = avg_success;
                row.avg_time_s = elapsed / TRIALS_PER_CONFIG as f64;
                break;
            }
        }
        info!(
            n,
            r_min = row.r_min,
            success_rate = row.success_rate,
            b = failure_probability,
            "calibration point"
        );
        rows.push(row);
    }
    Ok(rows)
}

/// Result table file for one failure probability.
pub fn table_path(dir: &Path, failure_probability: f64) -> PathBuf {
    dir.join(format!("r_vs_n_B{failure_probability:.3}.csv"))
}

pub fn write_table(path: &Path, rows: &[CalibrationRow]) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| EngineError::Resource(format!("create {}: {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "N,R_min,success_rate,avg_time_s")?;
    for row in rows {
        writeln!(
            out,
            "{},{},{:.4},{:.2}",
            row.n, row.r_min, row.success_rate, row.avg_time_s
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Run every curve and write one table per failure probability.
pub fn run_calibration(params: &CalibrationParams, interrupt: &AtomicBool) -> Result<Vec<PathBuf>> {
    params.validate()?;
    fs::create_dir_all(&params.out_dir).map_err(|e| {
        EngineError::Resource(format!("create {}: {e}", params.out_dir.display()))
    })?;
    let mut written = Vec::new();
    for b in FAILURE_PROBABILITIES {
        info!(b, "calibrating");
        let rows = calibrate_curve(params, b, interrupt)?;
        let path = table_path(&params.out_dir, b);
        write_table(&path, &rows)?;
        info!(path = %path.display(), "table written");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_params(out_dir: PathBuf) -> CalibrationParams {
        CalibrationParams {
            n_min: 1,
            n_max: 2,
            geometry: LineGeometry {
                speed: 20.0,
                container_side: 10.0,
                line_length: 20.0,
            },
            service_ms: 1,
            time_scale: 20.0,
            time_limit_s: 3.0,
            out_dir,
        }
    }

    #[test]
    fn n_grid_spans_stretched_range() {
        let params = CalibrationParams::default();
        let values = params.n_values();
        assert_eq!(values.first(), Some(&10));
        assert_eq!(params.n_top(), 60);
        assert_eq!(values, (10..=60).step_by(2).collect::<Vec<_>>());

        let tiny = quick_params(PathBuf::new());
        assert_eq!(tiny.n_values(), vec![1, 2]);
    }

    #[test]
    fn rejects_bad_ranges() {
        let mut params = quick_params(PathBuf::new());
        params.n_min = 0;
        assert!(params.validate().is_err());
        params.n_min = 5;
        assert!(params.validate().is_err());
        params.n_min = 1;
        params.n_max = MAX_ITEMS;
        assert!(params.validate().is_err());
        params.n_max = 2;
        params.geometry.speed = -1.0;
        assert!(params.validate().is_err());
    }

    #[test]
    fn trial_seeds_follow_grid_position() {
        assert_eq!(trial_seed(10, 2, 1, 0.0), 10_201);
        assert_eq!(trial_seed(10, 2, 1, 0.05), 10_201 ^ 500);
    }

    #[test]
    fn reliable_line_needs_one_worker() {
        let params = quick_params(PathBuf::new());
        let interrupt = AtomicBool::new(false);
        let rows = calibrate_curve(&params, 0.0, &interrupt).expect("curve");
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.r_min, 1, "n={}", row.n);
            assert!((row.success_rate - 1.0).abs() < 1e-12);
            assert!(row.avg_time_s > 0.0);
        }
    }

    #[test]
    fn table_has_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("mango_line_calibrate_{}", std::process::id()));
        fs::create_dir_all(&dir).expect("mkdir");
        let path = table_path(&dir, 0.05);
        assert!(path.ends_with("r_vs_n_B0.050.csv"));
        let rows = vec![
            CalibrationRow {
                n: 10,
                r_min: 2,
                success_rate: 1.0,
                avg_time_s: 3.25,
            },
            CalibrationRow {
                n: 12,
                r_min: MAX_CALIBRATION_WORKERS + 1,
                success_rate: 0.0,
                avg_time_s: 0.0,
            },
        ];
        write_table(&path, &rows).expect("write");
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(
            text,
            "N,R_min,success_rate,avg_time_s\n10,2,1.0000,3.25\n12,21,0.0000,0.00\n"
        );
        fs::remove_dir_all(&dir).expect("cleanup");
    }
}
