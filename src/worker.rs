//! Per-worker simulation loop: fault check, zone scan, claim, service.

use std::thread;

use tracing::{debug, info};

use crate::config::TICK_SECONDS;
use crate::context::RunContext;
use crate::failure::FailureInjector;
use crate::types::{WorkerId, WorkerRole, WorkerStatus};

/// Final counters of one worker, read by the metrics aggregator.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub role: WorkerRole,
    pub tagged: usize,
    /// Simulated seconds spent servicing items.
    pub busy_s: f64,
    /// Simulated seconds with nothing to do (standby, or an empty scan).
    pub idle_s: f64,
    /// Simulated seconds spent failed.
    pub downtime_s: f64,
    pub failures: usize,
}

pub struct WorkerSimulator<'a> {
    ctx: &'a RunContext<'a>,
    injector: FailureInjector,
    report: WorkerReport,
}

impl<'a> WorkerSimulator<'a> {
    pub fn new(id: WorkerId, ctx: &'a RunContext<'a>) -> Self {
        let role = if ctx.directive.is_active(id) {
            WorkerRole::Active
        } else {
            WorkerRole::Standby
        };
        Self {
            ctx,
            injector: FailureInjector::new(ctx.config.seed, id, ctx.config.failure_probability),
            report: WorkerReport {
                id,
                role,
                tagged: 0,
                busy_s: 0.0,
                idle_s: 0.0,
                downtime_s: 0.0,
                failures: 0,
            },
        }
    }

    /// Tick until the run stops or every item is claimed.
    pub fn run(mut self) -> WorkerReport {
        debug!(worker = self.report.id, role = self.report.role.label(), "worker started");
        while self.ctx.should_continue() {
            if self.report.role == WorkerRole::Standby {
                self.report.idle_s += TICK_SECONDS;
                self.ctx.wait_tick();
                continue;
            }
            if self.injector.strikes() {
                // The fault consumes this tick; no scanning until the next one.
                self.fail_and_recover();
                continue;
            }
            if !self.scan() {
                self.report.idle_s += TICK_SECONDS;
            }
            self.ctx.wait_tick();
        }
        debug!(
            worker = self.report.id,
            tagged = self.report.tagged,
            busy_s = self.report.busy_s,
            idle_s = self.report.idle_s,
            "worker finished"
        );
        self.report
    }

    fn fail_and_recover(&mut self) {
        let id = self.report.id;
        self.ctx.zones.set_status(id, WorkerStatus::Failed);
        self.ctx.record_failure();
        self.report.failures += 1;
        let downtime = self.injector.recovery_seconds();
        info!(
            worker = id,
            t = self.ctx.clock.elapsed(),
            downtime_ms = (downtime * 1000.0).round() as u64,
            "worker failed"
        );
        self.report.downtime_s += self.ctx.pause(downtime);
        self.ctx.zones.set_status(id, WorkerStatus::Active);
        info!(worker = id, t = self.ctx.clock.elapsed(), "worker recovered");
    }

    /// One pass over the unclaimed items. Returns whether anything was serviced.
    fn scan(&mut self) -> bool {
        let ctx = self.ctx;
        let store = ctx.store;
        let Some(mut zone) = ctx.zones.zone_for(self.report.id) else {
            return false;
        };
        let mut worked = false;
        for id in store.unclaimed() {
            if !ctx.clock.is_running() {
                break;
            }
            let item = store.item(id);
            let position = ctx.clock.line_position() + item.y;
            if !(zone.in_lane(item.x) && zone.reaches(position)) {
                continue;
            }
            if !store.try_claim(id) {
                continue;
            }
            debug!(
                worker = self.report.id,
                item = id,
                x = item.x,
                position,
                t = ctx.clock.elapsed(),
                "claimed"
            );
            self.serve();
            worked = true;
            // Zones may have been rebalanced while this worker was busy.
            match ctx.zones.zone_for(self.report.id) {
                Some(current) => zone = current,
                None => break,
            }
        }
        worked
    }

    /// Service always runs to completion once an item is claimed.
    fn serve(&mut self) {
        let service_s = self.ctx.config.service_seconds();
        if service_s > 0.0 {
            thread::sleep(self.ctx.config.wall(service_s));
        }
        self.report.tagged += 1;
        self.report.busy_s += service_s;
    }
}
