//! Engine runner: ingest a batch, plan the workforce, run clock and workers, summarize.

use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::clock::{self, RunOutcome};
use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::error::{EngineError, Result};
use crate::ingest::{self, Batch};
use crate::item_store::ItemStore;
use crate::metrics::{self, RunMetrics, RunTiming, cpu_times_seconds};
use crate::planner::needed_workers;
use crate::worker::{WorkerReport, WorkerSimulator};

/// Accept one batch on the configured port and run it to completion.
pub fn run_engine(config: &EngineConfig, interrupt: &AtomicBool) -> Result<RunMetrics> {
    config.validate()?;
    let batch = ingest::accept_batch(config.port, interrupt)?;
    run_batch(config, batch, interrupt)
}

/// Run an already-ingested batch.
pub fn run_batch(config: &EngineConfig, batch: Batch, interrupt: &AtomicBool) -> Result<RunMetrics> {
    let mut config = config.clone();
    if let Some(side) = batch.container_side {
        config.geometry.container_side = side;
    }
    config.validate()?;
    if batch.is_degraded() {
        warn!(
            received = batch.received,
            declared = batch.declared,
            "running with zero-valued placeholders for missing items"
        );
    }

    let store = ItemStore::new(batch.items);
    let directive = needed_workers(store.len(), config.service_ms, &config.geometry, config.workers);
    info!(
        items = store.len(),
        needed = directive.needed,
        configured = directive.configured,
        seed = config.seed,
        "workforce planned"
    );

    let ctx = RunContext::new(&config, &store, directive, interrupt);
    for (worker, zone) in ctx.zones.active_zones() {
        debug!(
            worker,
            lane_start = zone.lane_start,
            lane_width = zone.width(),
            station = zone.station,
            "initial zone"
        );
    }
    let cpu_start = cpu_times_seconds();
    let start = Instant::now();

    let (outcome, reports) = thread::scope(|scope| -> Result<(RunOutcome, Vec<WorkerReport>)> {
        let ctx = &ctx;
        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let worker = WorkerSimulator::new(id, ctx);
            let handle = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn_scoped(scope, move || worker.run())
                .map_err(|e| {
                    // Already-spawned workers see the stop and exit before the scope joins them.
                    ctx.clock.stop();
                    EngineError::Resource(format!("failed to spawn worker {id}: {e}"))
                })?;
            workers.push(handle);
        }
        let clock = thread::Builder::new()
            .name("clock".to_string())
            .spawn_scoped(scope, move || clock::drive(ctx))
            .map_err(|e| {
                ctx.clock.stop();
                EngineError::Resource(format!("failed to spawn clock: {e}"))
            })?;

        let outcome = clock.join().expect("clock thread panicked");
        let reports = workers
            .into_iter()
            .map(|handle| handle.join().expect("worker thread panicked"))
            .collect();
        Ok((outcome, reports))
    })?;

    let wall_ms = start.elapsed().as_secs_f64() * 1000.0;
    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };
    let timing = RunTiming {
        elapsed_s: ctx.clock.elapsed(),
        wall_ms,
        cpu_user_s,
        cpu_sys_s,
    };
    let summary = metrics::aggregate(
        &store,
        reports,
        directive,
        ctx.failures(),
        ctx.zones.peak_holders(),
        outcome,
        timing,
    );
    info!(
        outcome = outcome.label(),
        tagged = summary.tagged,
        missed = summary.missed,
        failures = summary.failures,
        "run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LineGeometry, test_config};
    use crate::types::{Item, WorkerRole};

    fn batch(items: Vec<Item>) -> Batch {
        let n = items.len();
        Batch {
            items,
            declared: n,
            received: n,
            container_side: None,
        }
    }

    #[test]
    fn single_item_single_worker_is_tagged() {
        let cfg = test_config(1, 0.0);
        let interrupt = AtomicBool::new(false);
        let metrics = run_batch(&cfg, batch(vec![Item::new(0.0, 0.0)]), &interrupt).expect("run");
        assert_eq!(metrics.outcome, RunOutcome::Completed);
        assert_eq!(metrics.tagged, 1);
        assert_eq!(metrics.missed, 0);
        assert!(metrics.success());
        assert_eq!(metrics.workers[0].tagged, 1);
    }

    #[test]
    fn twenty_items_four_workers_all_tagged() {
        let mut cfg = test_config(4, 0.0);
        cfg.geometry = LineGeometry {
            speed: 20.0,
            container_side: 30.0,
            line_length: 400.0,
        };
        cfg.service_ms = 20;
        let items = crate::generator::generate_batch(20, 30.0, 11);
        let interrupt = AtomicBool::new(false);
        let metrics = run_batch(&cfg, batch(items), &interrupt).expect("run");
        assert_eq!(metrics.tagged, 20);
        assert!(metrics.success());
        let by_workers: usize = metrics.workers.iter().map(|w| w.tagged).sum();
        assert_eq!(by_workers, 20, "each claim is serviced by exactly one worker");
        assert!(metrics.workers.iter().any(|w| w.role == WorkerRole::Standby));
    }

    #[test]
    fn degraded_batch_still_runs() {
        let cfg = test_config(2, 0.0);
        let mut items = vec![Item::default(); 5];
        items[0] = Item::new(-3.0, 1.0);
        items[1] = Item::new(2.0, -1.0);
        items[2] = Item::new(4.0, 0.0);
        let degraded = Batch {
            items,
            declared: 5,
            received: 3,
            container_side: None,
        };
        let interrupt = AtomicBool::new(false);
        let metrics = run_batch(&cfg, degraded, &interrupt).expect("run");
        assert_eq!(metrics.total, 5);
        assert_eq!(metrics.tagged + metrics.missed, 5);
    }

    #[test]
    fn certain_failure_tags_nothing_before_time_limit() {
        let mut cfg = test_config(3, 1.0);
        cfg.time_limit_s = 12.0;
        let items = vec![Item::default(); 4];
        let interrupt = AtomicBool::new(false);
        let metrics = run_batch(&cfg, batch(items), &interrupt).expect("run");
        assert_eq!(metrics.outcome, RunOutcome::TimedOut);
        assert_eq!(metrics.tagged, 0);
        assert_eq!(metrics.missed, 4);
        assert!(!metrics.success());
        assert!(metrics.failures > 0);
        assert!(metrics.timing.elapsed_s >= 12.0);
    }

    #[test]
    fn intermittent_failures_still_tag_every_item() {
        let mut cfg = test_config(3, 0.5);
        cfg.seed = 2024;
        cfg.geometry = LineGeometry {
            speed: 10.0,
            container_side: 30.0,
            line_length: 400.0,
        };
        cfg.service_ms = 20;
        // Items trail the batch center by up to 140 cm, so the single active
        // worker draws for faults over several hundred ticks while claiming.
        let items: Vec<Item> = (0..15)
            .map(|i| Item::new(-14.0 + 2.0 * i as f64, -10.0 * i as f64))
            .collect();
        let interrupt = AtomicBool::new(false);
        let metrics = run_batch(&cfg, batch(items), &interrupt).expect("run");
        assert!(metrics.failures > 0, "no fault in the whole run");
        assert_eq!(metrics.tagged + metrics.missed, 15);
        assert_eq!(metrics.outcome, RunOutcome::Completed);
        assert!(metrics.success());
        let by_workers: usize = metrics.workers.iter().map(|w| w.tagged).sum();
        assert_eq!(by_workers, metrics.tagged);
        let failures_by_workers: usize = metrics.workers.iter().map(|w| w.failures).sum();
        assert_eq!(failures_by_workers, metrics.failures);
    }

    #[test]
    fn header_side_overrides_configured_side() {
        let cfg = test_config(1, 0.0);
        let interrupt = AtomicBool::new(false);
        // x = 8 is outside a 10 cm container but inside a 20 cm one.
        let mut wide = batch(vec![Item::new(8.0, 0.0)]);
        wide.container_side = Some(20.0);
        let metrics = run_batch(&cfg, wide, &interrupt).expect("run");
        assert_eq!(metrics.tagged, 1);
    }

    #[test]
    fn interrupt_stops_run_cleanly() {
        let cfg = test_config(2, 0.0);
        let interrupt = AtomicBool::new(true);
        let metrics = run_batch(&cfg, batch(vec![Item::default(); 3]), &interrupt).expect("run");
        assert_eq!(metrics.outcome, RunOutcome::Interrupted);
        assert_eq!(metrics.tagged + metrics.missed, 3);
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let cfg = test_config(0, 0.0);
        let interrupt = AtomicBool::new(false);
        let err = run_batch(&cfg, batch(vec![Item::default()]), &interrupt).expect_err("invalid");
        assert!(matches!(err, EngineError::Configuration(_)));
    }
}
