//! End-of-run summary built from the final item and worker state.

use std::fmt;

use crate::clock::RunOutcome;
use crate::item_store::ItemStore;
use crate::planner::WorkforceDirective;
use crate::types::{WorkerId, WorkerRole};
use crate::worker::WorkerReport;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
pub fn cpu_times_seconds() -> Option<(f64, f64)> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let usage = unsafe { usage.assume_init() };
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
pub fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkerMetrics {
    pub id: WorkerId,
    pub role: WorkerRole,
    pub tagged: usize,
    pub busy_s: f64,
    pub idle_s: f64,
    pub downtime_s: f64,
    pub failures: usize,
    /// Busy time over elapsed simulated time, in `[0, 1]` unless service overran the clock.
    pub utilization: f64,
}

/// Run-wide measurements that are not derived from item or worker state.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunTiming {
    pub elapsed_s: f64,
    pub wall_ms: f64,
    pub cpu_user_s: Option<f64>,
    pub cpu_sys_s: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct RunMetrics {
    pub outcome: RunOutcome,
    pub total: usize,
    pub tagged: usize,
    pub missed: usize,
    pub failures: usize,
    pub directive: WorkforceDirective,
    pub peak_active: usize,
    pub timing: RunTiming,
    pub workers: Vec<WorkerMetrics>,
}

/// Summarize a finished run. Call only after every worker has been joined.
pub fn aggregate(
    store: &ItemStore,
    reports: Vec<WorkerReport>,
    directive: WorkforceDirective,
    failures: usize,
    peak_active: usize,
    outcome: RunOutcome,
    timing: RunTiming,
) -> RunMetrics {
    let total = store.len();
    let tagged = (0..total).filter(|&id| store.is_claimed(id)).count();
    let workers = reports
        .into_iter()
        .map(|r| WorkerMetrics {
            utilization: if timing.elapsed_s > 0.0 {
                r.busy_s / timing.elapsed_s
            } else {
                0.0
            },
            id: r.id,
            role: r.role,
            tagged: r.tagged,
            busy_s: r.busy_s,
            idle_s: r.idle_s,
            downtime_s: r.downtime_s,
            failures: r.failures,
        })
        .collect();
    RunMetrics {
        outcome,
        total,
        tagged,
        missed: total - tagged,
        failures,
        directive,
        peak_active,
        timing,
        workers,
    }
}

impl RunMetrics {
    /// A run succeeds only when every item was tagged.
    pub fn success(&self) -> bool {
        self.tagged == self.total
    }

    pub fn tagged_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.tagged as f64 / self.total as f64
    }
}

/// Plain-text summary, one `key=value` per line.
impl fmt::Display for RunMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let na = |v: Option<f64>| v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "NA".to_string());
        writeln!(f, "RUN SUMMARY")?;
        writeln!(f, "outcome={}", self.outcome.label())?;
        writeln!(f, "items={}", self.total)?;
        writeln!(f, "tagged={}", self.tagged)?;
        writeln!(f, "missed={}", self.missed)?;
        writeln!(f, "tagged_pct={:.1}", self.tagged_ratio() * 100.0)?;
        writeln!(f, "sim_time_s={:.2}", self.timing.elapsed_s)?;
        writeln!(f, "wall_ms={:.0}", self.timing.wall_ms)?;
        writeln!(f, "cpu_user_s={}", na(self.timing.cpu_user_s))?;
        writeln!(f, "cpu_sys_s={}", na(self.timing.cpu_sys_s))?;
        writeln!(f, "worker_failures={}", self.failures)?;
        writeln!(
            f,
            "workers_needed={}/{} ({:.2})",
            self.directive.needed,
            self.directive.configured,
            self.directive.ratio()
        )?;
        writeln!(f, "peak_active_workers={}", self.peak_active)?;
        for w in &self.workers {
            writeln!(
                f,
                "worker[{}] role={} tagged={} utilization_pct={:.1} busy_s={:.2} idle_s={:.2} downtime_s={:.2} failures={}",
                w.id,
                w.role.label(),
                w.tagged,
                w.utilization * 100.0,
                w.busy_s,
                w.idle_s,
                w.downtime_s,
                w.failures
            )?;
        }
        writeln!(f, "success={}", self.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;

    fn report(id: WorkerId, role: WorkerRole, tagged: usize, busy_s: f64) -> WorkerReport {
        WorkerReport {
            id,
            role,
            tagged,
            busy_s,
            idle_s: 1.0,
            downtime_s: 0.0,
            failures: 0,
        }
    }

    #[test]
    fn tagged_plus_missed_is_total() {
        let store = ItemStore::new(vec![Item::default(); 5]);
        assert!(store.try_claim(0));
        assert!(store.try_claim(3));
        let metrics = aggregate(
            &store,
            vec![
                report(0, WorkerRole::Active, 2, 1.0),
                report(1, WorkerRole::Standby, 0, 0.0),
            ],
            WorkforceDirective {
                needed: 1,
                configured: 2,
            },
            3,
            1,
            RunOutcome::TimedOut,
            RunTiming {
                elapsed_s: 4.0,
                ..RunTiming::default()
            },
        );
        assert_eq!(metrics.tagged, 2);
        assert_eq!(metrics.missed, 3);
        assert_eq!(metrics.tagged + metrics.missed, metrics.total);
        assert!(!metrics.success());
        assert_eq!(metrics.failures, 3);
        assert!((metrics.workers[0].utilization - 0.25).abs() < 1e-12);
        assert_eq!(metrics.workers[1].utilization, 0.0);

        let text = metrics.to_string();
        assert!(text.contains("tagged=2\n"));
        assert!(text.contains("missed=3\n"));
        assert!(text.contains("worker[1] role=STANDBY"));
        assert!(text.contains("cpu_user_s=NA\n"));
        assert!(text.ends_with("success=false\n"));
    }

    #[test]
    fn zero_elapsed_time_gives_zero_utilization() {
        let store = ItemStore::new(vec![Item::default()]);
        assert!(store.try_claim(0));
        let metrics = aggregate(
            &store,
            vec![report(0, WorkerRole::Active, 1, 0.0)],
            WorkforceDirective {
                needed: 1,
                configured: 1,
            },
            0,
            1,
            RunOutcome::Completed,
            RunTiming::default(),
        );
        assert!(metrics.success());
        assert_eq!(metrics.workers[0].utilization, 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn cpu_times_are_available_on_unix() {
        let (user, sys) = cpu_times_seconds().expect("getrusage");
        assert!(user >= 0.0 && sys >= 0.0);
    }
}
