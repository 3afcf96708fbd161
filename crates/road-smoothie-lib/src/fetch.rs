//! Loading the network around the reference corridor
//!
//! The corridor's sub-boxes double as download rectangles. Those lying inside
//! a previously fetched rectangle are dropped, the rest are batched by
//! [`merge_rects`] and fetched one by one from a [`NetworkSource`].

use crate::{Diagnostics, Network, Reference, Result, geomath, merge_rects};
use geo::Rect;

/// Anything that can deliver the network inside a rectangle
pub trait NetworkSource {
    /// Ways touching `bounds`, with all of their vertices
    fn fetch(&mut self, bounds: Rect<f64>) -> Result<Network>;
}

impl NetworkSource for Network {
    fn fetch(&mut self, bounds: Rect<f64>) -> Result<Network> {
        Ok(self.extract(bounds))
    }
}

/// Rectangles still to fetch for a reference, in corridor order
pub fn plan_fetch(reference: &Reference, already_loaded: &[Rect<f64>], max_area: f64) -> Vec<Rect<f64>> {
    let missing: Vec<Rect<f64>> = reference
        .sub_boxes()
        .map(|b| b.bounds)
        .filter(|bounds| !already_loaded.iter().any(|loaded| geomath::rect_within(bounds, loaded)))
        .collect();

    let plan = merge_rects(&missing, max_area);
    tracing::debug!(
        "{} of {} sub-boxes need fetching in {} rects",
        missing.len(),
        reference.sub_boxes().count(),
        plan.len()
    );
    plan
}

/// Fetch every planned rectangle into `network`
///
/// A failing rectangle is recorded as an error and the remaining ones are
/// still attempted. Returns the number of rectangles fetched successfully.
pub fn fetch_network<S: NetworkSource + ?Sized>(
    source: &mut S,
    network: &mut Network,
    plan: &[Rect<f64>],
    diagnostics: &mut Diagnostics,
) -> usize {
    #[cfg(feature = "profiling")]
    profiling::scope!("fetch::fetch_network");

    let mut fetched = 0;
    for (i, rect) in plan.iter().enumerate() {
        diagnostics.info(format!("Downloading rect {} of {}", i + 1, plan.len()));
        match source.fetch(*rect) {
            Ok(mut part) => {
                part.extend_loaded_bounds(*rect);
                network.merge_from(part);
                fetched += 1;
            }
            Err(e) => diagnostics.error(format!("Failed to download rect {} of {}: {e}", i + 1, plan.len())),
        }
    }
    fetched
}
