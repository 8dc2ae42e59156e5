//! Shared identifiers and the item/worker model used across the engine.

/// Index of an item within the ingested batch.
pub type ItemId = usize;
/// Identifier of a worker thread; workers are numbered from zero.
pub type WorkerId = usize;

/// A work item at a fixed position relative to the batch center (cm).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Item {
    /// Transverse offset, used for lane (zone) membership.
    pub x: f64,
    /// Longitudinal offset, added to the line position for reachability.
    pub y: f64,
}

impl Item {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Role assigned to a worker by the workforce directive at run start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerRole {
    Active,
    Standby,
}

impl WorkerRole {
    pub fn label(self) -> &'static str {
        match self {
            WorkerRole::Active => "ACTIVE",
            WorkerRole::Standby => "STANDBY",
        }
    }
}

/// Live activation state of a worker as seen by the zone allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStatus {
    Standby,
    Active,
    Failed,
}
