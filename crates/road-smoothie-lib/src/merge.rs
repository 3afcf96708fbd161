//! Greedy merging of fetch rectangles under an area cap
//!
//! Rectangles are merged in input order only; the pass never reorders, so the
//! output is deterministic and linear in the input size, at the cost of not
//! being the minimal rectangle count.

use crate::geomath;
use geo::Rect;

/// Merge consecutive rectangles while the merged area stays within `max_area_km2`
///
/// The accumulator absorbs the next rectangle when the union's area is within
/// the cap, otherwise it is emitted and the candidate starts a new accumulator.
/// The final accumulator is always emitted.
pub fn merge_rects(rects: &[Rect<f64>], max_area_km2: f64) -> Vec<Rect<f64>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("merge::merge_rects");

    let Some((first, rest)) = rects.split_first() else {
        return Vec::new();
    };

    let cap = max_area_km2 * 1.0e6;
    let mut result = Vec::new();
    let mut accumulator = *first;

    for rect in rest {
        let merged = geomath::rect_union(&accumulator, rect);
        if geomath::rect_area(&merged) > cap {
            result.push(accumulator);
            accumulator = *rect;
        } else {
            accumulator = merged;
        }
    }
    result.push(accumulator);

    tracing::debug!("Merged {} rects into {}", rects.len(), result.len());
    result
}
