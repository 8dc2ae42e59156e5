//! Zone allocation: splits the line among workers that are active and healthy.

use std::sync::Mutex;

use tracing::debug;

use crate::config::LineGeometry;
use crate::planner::WorkforceDirective;
use crate::types::{WorkerId, WorkerStatus};

/// Responsibility of one worker: a transverse lane and a longitudinal reach window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Zone {
    pub lane_start: f64,
    pub lane_end: f64,
    /// The last lane is closed on the right so `Z/2` itself is covered.
    pub closed_end: bool,
    pub station: f64,
    pub reach_start: f64,
    pub reach_end: f64,
}

impl Zone {
    /// Whether a transverse offset falls in this lane.
    pub fn in_lane(&self, x: f64) -> bool {
        x >= self.lane_start && (x < self.lane_end || (self.closed_end && x <= self.lane_end))
    }

    /// Whether an absolute longitudinal position is within reach of the station.
    pub fn reaches(&self, position: f64) -> bool {
        position >= self.reach_start && position <= self.reach_end
    }

    pub fn width(&self) -> f64 {
        self.lane_end - self.lane_start
    }
}

/// Split the line among `holders` (ascending worker ids): equal lanes across
/// the container width and evenly spaced stations along the line.
pub fn partition(holders: &[WorkerId], geometry: &LineGeometry) -> Vec<(WorkerId, Zone)> {
    let count = holders.len();
    if count == 0 {
        return Vec::new();
    }
    let side = geometry.container_side;
    let lane_width = side / count as f64;
    let spacing = geometry.line_length / (count + 1) as f64;
    let reach = spacing / 2.0 + side / 2.0;
    holders
        .iter()
        .enumerate()
        .map(|(idx, &worker)| {
            let last = idx + 1 == count;
            let lane_start = -side / 2.0 + idx as f64 * lane_width;
            let lane_end = if last {
                side / 2.0
            } else {
                -side / 2.0 + (idx + 1) as f64 * lane_width
            };
            let station = -geometry.line_length / 2.0 + (idx + 1) as f64 * spacing;
            let zone = Zone {
                lane_start,
                lane_end,
                closed_end: last,
                station,
                reach_start: station - reach,
                reach_end: station + reach,
            };
            (worker, zone)
        })
        .collect()
}

struct ZoneTable {
    status: Vec<WorkerStatus>,
    zones: Vec<Option<Zone>>,
    holders: usize,
    peak_holders: usize,
    revision: u64,
}

impl ZoneTable {
    fn holder_ids(&self) -> Vec<WorkerId> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, status)| **status == WorkerStatus::Active)
            .map(|(id, _)| id)
            .collect()
    }

    fn reallocate(&mut self, geometry: &LineGeometry) {
        let holders = self.holder_ids();
        self.holders = holders.len();
        if holders.is_empty() {
            // Stale zones stay in place; only Active workers ever read them.
            return;
        }
        self.peak_holders = self.peak_holders.max(holders.len());
        for (worker, zone) in partition(&holders, geometry) {
            self.zones[worker] = Some(zone);
        }
        self.revision += 1;
        debug!(holders = self.holders, revision = self.revision, "zones reallocated");
    }
}

/// Zone table shared by all workers, guarded by a single lock.
pub struct ZoneAllocator {
    geometry: LineGeometry,
    table: Mutex<ZoneTable>,
}

impl ZoneAllocator {
    /// Build the table from the run's directive and compute the initial zones.
    pub fn new(directive: &WorkforceDirective, geometry: LineGeometry) -> Self {
        let status = (0..directive.configured)
            .map(|id| {
                if directive.is_active(id) {
                    WorkerStatus::Active
                } else {
                    WorkerStatus::Standby
                }
            })
            .collect::<Vec<_>>();
        let mut table = ZoneTable {
            zones: vec![None; status.len()],
            status,
            holders: 0,
            peak_holders: 0,
            revision: 0,
        };
        table.reallocate(&geometry);
        Self {
            geometry,
            table: Mutex::new(table),
        }
    }

    /// Change a worker's status and recompute zones if it changed.
    pub fn set_status(&self, worker: WorkerId, status: WorkerStatus) {
        let mut guard = self.table.lock().expect("zone mutex poisoned");
        if guard.status[worker] == status {
            return;
        }
        guard.status[worker] = status;
        guard.reallocate(&self.geometry);
    }

    /// Recompute zones for the current holder set.
    #[cfg(test)]
    fn reallocate(&self) {
        let mut guard = self.table.lock().expect("zone mutex poisoned");
        guard.reallocate(&self.geometry);
    }

    /// The worker's zone, or `None` unless it is currently Active.
    pub fn zone_for(&self, worker: WorkerId) -> Option<Zone> {
        let guard = self.table.lock().expect("zone mutex poisoned");
        match guard.status[worker] {
            WorkerStatus::Active => guard.zones[worker],
            WorkerStatus::Standby | WorkerStatus::Failed => None,
        }
    }

    #[cfg(test)]
    pub fn status(&self, worker: WorkerId) -> WorkerStatus {
        let guard = self.table.lock().expect("zone mutex poisoned");
        guard.status[worker]
    }

    /// Zones of every current holder, in worker-id order.
    pub fn active_zones(&self) -> Vec<(WorkerId, Zone)> {
        let guard = self.table.lock().expect("zone mutex poisoned");
        guard
            .holder_ids()
            .into_iter()
            .filter_map(|id| guard.zones[id].map(|zone| (id, zone)))
            .collect()
    }

    pub fn holders(&self) -> usize {
        self.table.lock().expect("zone mutex poisoned").holders
    }

    pub fn peak_holders(&self) -> usize {
        self.table.lock().expect("zone mutex poisoned").peak_holders
    }
}
