//! Render reduction: caps how many points reach a visualization consumer.
//!
//! Full-resolution buffers stay in the layer for processing and export;
//! only the view is thinned. Reduction keeps every Nth point, which
//! preserves spatial distribution well enough for navigation while keeping
//! the stride cheap to compute on every pipeline refresh.

use crate::models::PointBuffers;
use std::sync::Arc;

/// Keep-every-Nth stride that brings `total` at or under `ceiling`.
/// A ceiling of zero disables reduction.
pub fn decimation_stride(total: u64, ceiling: u64) -> u64 {
    if ceiling == 0 || total <= ceiling {
        1
    } else {
        total.div_ceil(ceiling)
    }
}

/// Subsample `data` so at most `ceiling` points reach the renderer.
/// Under the ceiling the input `Arc` is shared back untouched.
pub fn downsample(data: &Arc<PointBuffers>, ceiling: usize) -> Arc<PointBuffers> {
    let stride = decimation_stride(data.len() as u64, ceiling as u64);
    if stride <= 1 {
        return Arc::clone(data);
    }
    Arc::new(data.take_stride(stride as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffers(n: usize) -> Arc<PointBuffers> {
        let coords: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Arc::new(PointBuffers::from_xyz(
            coords.clone(),
            coords.clone(),
            coords,
        ))
    }

    #[test]
    fn test_under_ceiling_shares_input() {
        let data = buffers(100);
        let out = downsample(&data, 1000);
        assert!(Arc::ptr_eq(&data, &out));
    }

    #[test]
    fn test_over_ceiling_reduces() {
        let data = buffers(2_500);
        let out = downsample(&data, 1_000);
        // stride 3 keeps indices 0, 3, 6, ...
        assert_eq!(out.len(), 834);
        assert_eq!(out.x[0], 0.0);
        assert_eq!(out.x[1], 3.0);
    }

    #[test]
    fn test_exact_ceiling_untouched() {
        let data = buffers(1_000);
        let out = downsample(&data, 1_000);
        assert!(Arc::ptr_eq(&data, &out));
    }

    #[test]
    fn test_zero_ceiling_disables_reduction() {
        let data = buffers(50);
        let out = downsample(&data, 0);
        assert!(Arc::ptr_eq(&data, &out));
        assert_eq!(decimation_stride(1_000_000, 0), 1);
    }

    #[test]
    fn test_stride_values() {
        assert_eq!(decimation_stride(999, 1000), 1);
        assert_eq!(decimation_stride(1000, 1000), 1);
        assert_eq!(decimation_stride(1001, 1000), 2);
        assert_eq!(decimation_stride(3_200_000, 1_000_000), 4);
    }

    proptest! {
        #[test]
        fn prop_downsample_respects_ceiling(total in 1usize..20_000, ceiling in 1usize..5_000) {
            let data = buffers(total);
            let out = downsample(&data, ceiling);
            prop_assert!(out.len() <= ceiling);
            prop_assert!(out.len() <= total);
            prop_assert!(!out.is_empty());
            // first point always survives, so the view never drifts
            prop_assert_eq!(out.x[0], 0.0);
        }
    }
}
