//! Simulation clock: the only writer of elapsed time, line position, and the running flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::info;

use crate::config::{LineGeometry, PROGRESS_INTERVAL_S, TICK_SECONDS};
use crate::context::RunContext;

/// Why the clock stopped the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    TimedOut,
    Interrupted,
}

impl RunOutcome {
    pub fn label(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::TimedOut => "timed_out",
            RunOutcome::Interrupted => "interrupted",
        }
    }
}

/// Discrete simulated time. Position is derived from the tick count so the
/// two can never disagree.
pub struct SimClock {
    ticks: AtomicU64,
    running: AtomicBool,
    start_position: f64,
    speed: f64,
}

impl SimClock {
    pub fn new(geometry: &LineGeometry) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            running: AtomicBool::new(true),
            start_position: geometry.start_position(),
            speed: geometry.speed,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Simulated seconds since the run started.
    pub fn elapsed(&self) -> f64 {
        self.ticks() as f64 * TICK_SECONDS
    }

    /// Longitudinal position of the batch center.
    pub fn line_position(&self) -> f64 {
        self.start_position + self.speed * self.elapsed()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Advance the clock one tick at a time until the batch is done, the time
/// limit passes, or an interrupt arrives. Clears the running flag on exit.
pub fn drive(ctx: &RunContext<'_>) -> RunOutcome {
    let clock = &ctx.clock;
    let progress_every = ((PROGRESS_INTERVAL_S / TICK_SECONDS).round() as u64).max(1);
    let outcome = loop {
        if ctx.interrupted() {
            break RunOutcome::Interrupted;
        }
        if ctx.store.all_claimed() {
            break RunOutcome::Completed;
        }
        if clock.elapsed() >= ctx.config.time_limit_s {
            break RunOutcome::TimedOut;
        }
        let tick = clock.advance();
        if tick % progress_every == 0 {
            let tagged = ctx.store.claimed_count();
            let total = ctx.store.len();
            info!(
                elapsed_s = clock.elapsed(),
                position_cm = clock.line_position(),
                tagged,
                total,
                active = ctx.zones.holders(),
                workers = ctx.directive.configured,
                "progress"
            );
        }
        ctx.wait_tick();
    };
    clock.stop();
    info!(
        outcome = outcome.label(),
        elapsed_s = clock.elapsed(),
        "clock stopped"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::item_store::ItemStore;
    use crate::planner::needed_workers;
    use crate::types::Item;

    #[test]
    fn position_follows_ticks() {
        let cfg = test_config(1, 0.0);
        let clock = SimClock::new(&cfg.geometry);
        assert_eq!(clock.line_position(), -60.0);
        for _ in 0..20 {
            clock.advance();
        }
        assert!((clock.elapsed() - 1.0).abs() < 1e-9);
        assert!((clock.line_position() - -50.0).abs() < 1e-9);
        assert!(clock.is_running());
        clock.stop();
        assert!(!clock.is_running());
    }

    #[test]
    fn stops_at_time_limit() {
        let mut cfg = test_config(1, 0.0);
        cfg.time_limit_s = 0.5;
        let store = ItemStore::new(vec![Item::default()]);
        let directive = needed_workers(1, 0, &cfg.geometry, 1);
        let interrupt = AtomicBool::new(false);
        let ctx = RunContext::new(&cfg, &store, directive, &interrupt);
        assert_eq!(drive(&ctx), RunOutcome::TimedOut);
        assert!(!ctx.clock.is_running());
        assert!(ctx.clock.elapsed() >= 0.5);
        assert!(ctx.clock.elapsed() < 0.5 + 2.0 * TICK_SECONDS);
    }

    #[test]
    fn stops_immediately_when_everything_is_claimed() {
        let cfg = test_config(1, 0.0);
        let store = ItemStore::new(vec![Item::default()]);
        assert!(store.try_claim(0));
        let directive = needed_workers(1, 0, &cfg.geometry, 1);
        let interrupt = AtomicBool::new(false);
        let ctx = RunContext::new(&cfg, &store, directive, &interrupt);
        assert_eq!(drive(&ctx), RunOutcome::Completed);
        assert_eq!(ctx.clock.ticks(), 0);
    }

    #[test]
    fn interrupt_wins() {
        let cfg = test_config(1, 0.0);
        let store = ItemStore::new(vec![Item::default()]);
        let directive = needed_workers(1, 0, &cfg.geometry, 1);
        let interrupt = AtomicBool::new(true);
        let ctx = RunContext::new(&cfg, &store, directive, &interrupt);
        assert_eq!(drive(&ctx), RunOutcome::Interrupted);
        assert!(!ctx.clock.is_running());
    }
}
