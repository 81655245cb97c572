//! Greedy geometric set cover: select the smallest ordered set of scenes
//! whose footprints jointly cover the area of interest.
//!
//! The classic minimum-cardinality set cover is NP-hard; greedy selection
//! by largest marginal area gain is the standard approximation and is
//! adequate here because scene quality (cloud cover, size) only breaks
//! ties, it is never the primary objective.

use crate::core::geometry;
use crate::types::{CoverageResult, Footprint, Product};
use std::cmp::Ordering;

/// Ranking strategy for candidate scenes.
///
/// The quality tie-break only exists when candidates carry a cloud-cover
/// attribute (optical products); radar catalogs rank by intersection area
/// alone. Selecting the strategy from the data keeps the selector
/// source-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ranking {
    /// Intersection area desc, then cloud cover asc, then byte size desc
    Quality,
    /// Intersection area desc only
    AreaOnly,
}

impl Ranking {
    fn for_candidates(candidates: &[Product]) -> Self {
        if candidates.iter().any(|p| p.cloud_cover.is_some()) {
            Ranking::Quality
        } else {
            Ranking::AreaOnly
        }
    }

    fn compare(self, a: &(f64, &Product), b: &(f64, &Product)) -> Ordering {
        // Primary key: rounded intersection area, descending
        let by_area = b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal);
        if by_area != Ordering::Equal || self == Ranking::AreaOnly {
            return by_area;
        }
        // Quality keys: lower cloud cover wins, missing cloud cover ranks
        // last; larger products win the remaining ties.
        let cloud_a = a.1.cloud_cover.unwrap_or(f64::INFINITY);
        let cloud_b = b.1.cloud_cover.unwrap_or(f64::INFINITY);
        cloud_a
            .partial_cmp(&cloud_b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.1.size_bytes.cmp(&a.1.size_bytes))
    }
}

/// Select an ordered subset of `candidates` covering at least
/// `min_coverage` of the AOI area.
///
/// The algorithm repeatedly takes the candidate with the largest rounded
/// intersection with the current residual AOI, subtracts its footprint
/// from the residual and stops as soon as the uncovered area drops below
/// `(1 - min_coverage)` of the *original* AOI area. The coverage fraction
/// is always measured against the original AOI, never the shrinking
/// residual. Written as a loop bounded by `|candidates|`; each accepted
/// scene strictly shrinks the residual (a zero-gain top candidate aborts
/// with an incomplete result), so termination is guaranteed.
///
/// Ties on all ranking keys are resolved by catalog iteration order: the
/// sort is stable, so re-running on the same candidate list yields the
/// same ordered result.
pub fn select_coverage(
    candidates: &[Product],
    aoi: &Footprint,
    min_coverage: f64,
) -> CoverageResult {
    let aoi_area = geometry::area(aoi);
    if candidates.is_empty() || aoi_area <= 0.0 {
        return CoverageResult::incomplete(Vec::new());
    }

    let ranking = Ranking::for_candidates(candidates);
    let mut remaining: Vec<Product> = candidates.to_vec();
    let mut residual = aoi.clone();
    let mut selected: Vec<Product> = Vec::new();

    for _ in 0..candidates.len() {
        if remaining.is_empty() {
            break;
        }

        // Rank all remaining candidates against the current residual.
        // A strict comparison keeps the first-seen candidate on full ties,
        // so catalog iteration order decides and reruns are deterministic.
        let mut best_idx = 0;
        let mut gain = geometry::intersection_area(&residual, &remaining[0].footprint);
        for (i, p) in remaining.iter().enumerate().skip(1) {
            let candidate_gain = geometry::intersection_area(&residual, &p.footprint);
            if ranking.compare(&(candidate_gain, p), &(gain, &remaining[best_idx]))
                == Ordering::Less
            {
                best_idx = i;
                gain = candidate_gain;
            }
        }

        if gain == 0.0 {
            // No remaining candidate can contribute
            log::info!("the whole area could not be fully covered, scenes are missing");
            return CoverageResult::incomplete(selected);
        }

        let top = remaining.remove(best_idx);
        residual = geometry::difference(&residual, &top.footprint);
        let left_over = geometry::area(&residual);
        selected.push(top);

        if left_over < (1.0 - min_coverage) * aoi_area {
            return CoverageResult {
                products: selected,
                complete: true,
            };
        }

        log::info!(
            "looking for more scenes, uncovered AOI fraction = {:.3}",
            left_over / aoi_area
        );
    }

    CoverageResult::incomplete(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn product(id: &str, wkt: &str, cloud: Option<f64>, size: u64) -> Product {
        Product {
            id: id.to_string(),
            title: id.to_string(),
            footprint: Footprint::from_wkt(wkt).unwrap(),
            acquired: Utc.with_ymd_and_hms(2020, 1, 15, 0, 0, 0).unwrap(),
            cloud_cover: cloud,
            size_bytes: size,
        }
    }

    fn aoi_10x10() -> Footprint {
        Footprint::from_wkt("POLYGON((0 0,10 0,10 10,0 10,0 0))").unwrap()
    }

    #[test]
    fn test_single_scene_meeting_threshold_wins_over_cleaner_scene() {
        // X covers 95% with 10% cloud, Y covers 90% with 5% cloud.
        // X ranks first on area and alone satisfies min_coverage=0.90.
        let x = product("X", "POLYGON((0 0,9.5 0,9.5 10,0 10,0 0))", Some(10.0), 100);
        let y = product("Y", "POLYGON((0 0,9 0,9 10,0 10,0 0))", Some(5.0), 100);
        let result = select_coverage(&[x, y], &aoi_10x10(), 0.90);
        assert!(result.complete);
        assert_eq!(result.products.len(), 1);
        assert_eq!(result.products[0].id, "X");
    }

    #[test]
    fn test_two_disjoint_halves_are_both_selected() {
        let left = product("L", "POLYGON((0 0,6 0,6 10,0 10,0 0))", None, 0);
        let right = product("R", "POLYGON((6 0,10 0,10 10,6 10,6 0))", None, 0);
        let result = select_coverage(&[right.clone(), left.clone()], &aoi_10x10(), 0.90);
        assert!(result.complete);
        assert_eq!(result.products.len(), 2);
        // Larger raw intersection first
        assert_eq!(result.products[0].id, "L");
        assert_eq!(result.products[1].id, "R");
    }

    #[test]
    fn test_no_overlap_returns_incomplete_and_empty() {
        let far = product("F", "POLYGON((100 100,110 100,110 110,100 110,100 100))", None, 0);
        let result = select_coverage(&[far], &aoi_10x10(), 0.90);
        assert!(!result.complete);
        assert!(result.products.is_empty());
    }

    #[test]
    fn test_empty_candidate_set_is_incomplete() {
        let result = select_coverage(&[], &aoi_10x10(), 0.90);
        assert!(!result.complete);
        assert!(result.products.is_empty());
    }

    #[test]
    fn test_full_cover_by_single_scene() {
        let all = product("A", "POLYGON((-1 -1,11 -1,11 11,-1 11,-1 -1))", None, 0);
        let result = select_coverage(&[all], &aoi_10x10(), 0.90);
        assert!(result.complete);
        assert_eq!(result.products.len(), 1);
    }

    #[test]
    fn test_cloud_cover_breaks_exact_area_ties() {
        // Identical footprints, different cloud cover: cleaner scene first
        let cloudy = product("cloudy", "POLYGON((0 0,10 0,10 10,0 10,0 0))", Some(40.0), 10);
        let clear = product("clear", "POLYGON((0 0,10 0,10 10,0 10,0 0))", Some(2.0), 10);
        let result = select_coverage(&[cloudy, clear], &aoi_10x10(), 0.90);
        assert!(result.complete);
        assert_eq!(result.products[0].id, "clear");
    }

    #[test]
    fn test_ties_without_quality_keep_catalog_order() {
        let first = product("first", "POLYGON((0 0,10 0,10 10,0 10,0 0))", None, 0);
        let second = product("second", "POLYGON((0 0,10 0,10 10,0 10,0 0))", None, 0);
        let result = select_coverage(&[first, second], &aoi_10x10(), 0.90);
        assert_eq!(result.products[0].id, "first");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let candidates = vec![
            product("a", "POLYGON((0 0,7 0,7 10,0 10,0 0))", Some(12.0), 5),
            product("b", "POLYGON((4 0,10 0,10 10,4 10,4 0))", Some(3.0), 9),
            product("c", "POLYGON((0 5,10 5,10 10,0 10,0 5))", Some(3.0), 9),
        ];
        let r1 = select_coverage(&candidates, &aoi_10x10(), 0.95);
        let r2 = select_coverage(&candidates, &aoi_10x10(), 0.95);
        let ids1: Vec<&str> = r1.products.iter().map(|p| p.id.as_str()).collect();
        let ids2: Vec<&str> = r2.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids1, ids2);
        assert_eq!(r1.complete, r2.complete);
    }

    #[test]
    fn test_result_never_exceeds_candidate_count() {
        let candidates = vec![
            product("a", "POLYGON((0 0,3 0,3 3,0 3,0 0))", None, 0),
            product("b", "POLYGON((3 0,6 0,6 3,3 3,3 0))", None, 0),
            product("c", "POLYGON((0 3,3 3,3 6,0 6,0 3))", None, 0),
        ];
        let result = select_coverage(&candidates, &aoi_10x10(), 0.99);
        assert!(!result.complete);
        assert!(result.products.len() <= candidates.len());
    }

    #[test]
    fn test_complete_result_covers_min_fraction() {
        let candidates = vec![
            product("a", "POLYGON((0 0,6 0,6 10,0 10,0 0))", None, 0),
            product("b", "POLYGON((5 0,10 0,10 10,5 10,5 0))", None, 0),
        ];
        let aoi = aoi_10x10();
        let result = select_coverage(&candidates, &aoi, 0.90);
        assert!(result.complete);
        // Union coverage check: subtract all selected footprints from the AOI
        let mut residual = aoi.clone();
        for p in &result.products {
            residual = crate::core::geometry::difference(&residual, &p.footprint);
        }
        let uncovered = crate::core::geometry::area(&residual);
        assert!(uncovered <= 0.10 * crate::core::geometry::area(&aoi) + 1e-6);
    }
}
