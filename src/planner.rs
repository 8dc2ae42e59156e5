//! Workforce planning: how many workers the batch needs.

use crate::config::{LineGeometry, SAFETY_MARGIN};

/// Fixed-at-start split of the worker pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkforceDirective {
    pub needed: usize,
    pub configured: usize,
}

impl WorkforceDirective {
    /// Worker ids below `needed` are active for the whole run.
    pub fn is_active(&self, worker: usize) -> bool {
        worker < self.needed
    }

    pub fn ratio(&self) -> f64 {
        self.needed as f64 / self.configured as f64
    }
}

/// Number of workers needed to label `items` within one pass of the batch.
///
/// `ceil(N * service / ((W + Z) / X) * 1.15)`, clamped to `[1, configured]`.
pub fn needed_workers(
    items: usize,
    service_ms: u64,
    geometry: &LineGeometry,
    configured: usize,
) -> WorkforceDirective {
    let available = (geometry.line_length + geometry.container_side) / geometry.speed;
    let required = items as f64 * (service_ms as f64 / 1000.0);
    let raw = (required / available * SAFETY_MARGIN).ceil();
    let needed = if raw.is_finite() { raw.max(1.0) as usize } else { configured };
    WorkforceDirective {
        needed: needed.clamp(1, configured.max(1)),
        configured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn geometry() -> LineGeometry {
        LineGeometry {
            speed: 10.0,
            container_side: 30.0,
            line_length: 200.0,
        }
    }

    #[test]
    fn applies_safety_margin() {
        // available = 23 s, required = 60 * 0.5 = 30 s -> 1.30 * 1.15 = 1.5 -> 2
        let directive = needed_workers(60, 500, &geometry(), 10);
        assert_eq!(directive.needed, 2);
        assert_eq!(directive.configured, 10);
        assert_eq!(needed_workers(30, 500, &geometry(), 10).needed, 1);
        // required = 100 * 0.5 = 50 s -> 2.17 * 1.15 = 2.5 -> 3
        assert_eq!(needed_workers(100, 500, &geometry(), 10).needed, 3);
    }

    #[test]
    fn clamps_to_pool_bounds() {
        assert_eq!(needed_workers(1, 0, &geometry(), 4).needed, 1);
        assert_eq!(needed_workers(1000, 2000, &geometry(), 4).needed, 4);
        let directive = needed_workers(1000, 2000, &geometry(), 4);
        assert!((directive.ratio() - 1.0).abs() < f64::EPSILON);
        assert!(directive.is_active(3));
        assert!(!directive.is_active(4));
    }

    proptest! {
        #[test]
        fn needed_is_monotonic_in_item_count(
            n1 in 1usize..1000,
            extra in 0usize..1000,
            service_ms in 0u64..3000,
            configured in 1usize..50,
        ) {
            let g = geometry();
            let a = needed_workers(n1, service_ms, &g, configured).needed;
            let b = needed_workers(n1 + extra, service_ms, &g, configured).needed;
            prop_assert!(a <= b);
            prop_assert!(b >= 1 && b <= configured);
        }
    }
}
