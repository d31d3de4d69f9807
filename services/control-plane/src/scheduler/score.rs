//! Placement scoring.
//!
//! A node scores by how much of each resource would remain free after placement,
//! as a percentage of its total, combined with fixed weights. Containers tend to be
//! memory-bound, so memory weighs the most.

use hoster_model::{Capacity, Resources};

pub const CPU_WEIGHT: f64 = 0.30;
pub const MEMORY_WEIGHT: f64 = 0.40;
pub const DISK_WEIGHT: f64 = 0.30;

/// Percentage of `total` left after adding `requested` to `used`, clamped to `[0, 100]`.
///
/// A dimension with no capacity scores 0.
fn free_after_pct(total: f64, used: f64, requested: f64) -> f64 {
    if total.is_nan() || total <= 0.0 {
        return 0.0;
    }
    let pct = (total - used - requested) / total * 100.0;
    if pct.is_nan() {
        return 0.0;
    }
    pct.clamp(0.0, 100.0)
}

/// Weighted free-after-placement score in `[0, 100]`.
pub fn score(capacity: &Capacity, request: &Resources) -> f64 {
    let cpu = free_after_pct(
        capacity.total.cpu_cores,
        capacity.used.cpu_cores,
        request.cpu_cores,
    );
    let memory = free_after_pct(
        capacity.total.memory_mb as f64,
        capacity.used.memory_mb as f64,
        request.memory_mb as f64,
    );
    let disk = free_after_pct(
        capacity.total.disk_mb as f64,
        capacity.used.disk_mb as f64,
        request.disk_mb as f64,
    );

    CPU_WEIGHT * cpu + MEMORY_WEIGHT * memory + DISK_WEIGHT * disk
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn capacity(total: (f64, u64, u64), used: (f64, u64, u64)) -> Capacity {
        Capacity::new(
            Resources::new(total.0, total.1, total.2),
            Resources::new(used.0, used.1, used.2),
        )
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert!((CPU_WEIGHT + MEMORY_WEIGHT + DISK_WEIGHT - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_node_empty_request_scores_100() {
        let cap = capacity((4.0, 8192, 100_000), (0.0, 0, 0));
        let s = score(&cap, &Resources::default());
        assert!((s - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_half_used_everywhere_scores_50() {
        let cap = capacity((4.0, 8192, 100_000), (1.0, 2048, 25_000));
        let s = score(&cap, &Resources::new(1.0, 2048, 25_000));
        assert!((s - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_memory_dominates() {
        // Same free fraction swapped between memory and disk.
        let mem_rich = capacity((4.0, 1000, 1000), (2.0, 0, 1000));
        let disk_rich = capacity((4.0, 1000, 1000), (2.0, 1000, 0));
        let req = Resources::default();
        assert!(score(&mem_rich, &req) > score(&disk_rich, &req));
    }

    #[test]
    fn test_zero_total_dimension_scores_zero() {
        let cap = capacity((0.0, 1000, 1000), (0.0, 0, 0));
        let s = score(&cap, &Resources::default());
        assert!((s - 70.0).abs() < 1e-9);
        assert!(!s.is_nan());
    }

    #[test]
    fn test_overcommitted_clamps_to_zero() {
        let cap = capacity((1.0, 100, 100), (2.0, 200, 200));
        assert_eq!(score(&cap, &Resources::default()), 0.0);
    }

    proptest! {
        #[test]
        fn prop_score_in_range(
            total_cpu in 0.0f64..64.0,
            used_cpu in 0.0f64..64.0,
            req_cpu in 0.0f64..64.0,
            total_mem in 0u64..1_000_000,
            used_mem in 0u64..1_000_000,
            req_mem in 0u64..1_000_000,
            total_disk in 0u64..10_000_000,
            used_disk in 0u64..10_000_000,
            req_disk in 0u64..10_000_000,
        ) {
            let cap = capacity((total_cpu, total_mem, total_disk), (used_cpu, used_mem, used_disk));
            let s = score(&cap, &Resources::new(req_cpu, req_mem, req_disk));
            prop_assert!((0.0..=100.0).contains(&s));
        }

        #[test]
        fn prop_more_usage_never_scores_higher(
            total_mem in 1u64..1_000_000,
            used_mem in 0u64..1_000_000,
            extra in 0u64..1_000_000,
            req_mem in 0u64..1_000_000,
        ) {
            let less = capacity((4.0, total_mem, 1000), (1.0, used_mem, 100));
            let more = capacity((4.0, total_mem, 1000), (1.0, used_mem.saturating_add(extra), 100));
            let req = Resources::new(0.5, req_mem, 10);
            prop_assert!(score(&more, &req) <= score(&less, &req));
        }
    }
}
