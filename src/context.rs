//! Shared state of one run, borrowed by the clock and every worker thread.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crate::clock::SimClock;
use crate::config::{EngineConfig, TICK_SECONDS};
use crate::item_store::ItemStore;
use crate::planner::WorkforceDirective;
use crate::zones::ZoneAllocator;

pub struct RunContext<'a> {
    pub config: &'a EngineConfig,
    pub store: &'a ItemStore,
    pub directive: WorkforceDirective,
    pub clock: SimClock,
    pub zones: ZoneAllocator,
    failures: AtomicUsize,
    interrupt: &'a AtomicBool,
}

impl<'a> RunContext<'a> {
    pub fn new(
        config: &'a EngineConfig,
        store: &'a ItemStore,
        directive: WorkforceDirective,
        interrupt: &'a AtomicBool,
    ) -> Self {
        Self {
            config,
            store,
            directive,
            clock: SimClock::new(&config.geometry),
            zones: ZoneAllocator::new(&directive, config.geometry),
            failures: AtomicUsize::new(0),
            interrupt,
        }
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Workers keep going while the clock runs and something is left to claim.
    pub fn should_continue(&self) -> bool {
        self.clock.is_running() && !self.store.all_claimed()
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Wait one tick of wall-clock time.
    pub fn wait_tick(&self) {
        thread::sleep(self.config.tick_wall());
    }

    /// Wait up to `sim_seconds`, one tick at a time, returning early once the
    /// run stops. Returns the simulated seconds actually waited.
    pub fn pause(&self, sim_seconds: f64) -> f64 {
        let mut waited = 0.0;
        while waited < sim_seconds && self.clock.is_running() {
            let step = (sim_seconds - waited).min(TICK_SECONDS);
            thread::sleep(self.config.wall(step));
            waited += step;
        }
        waited
    }
}
