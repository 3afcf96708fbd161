//! Indexed reference corridor
//!
//! A [`Reference`] is the chained sequence of reference fragments for one
//! run, each wrapped in a [`ReferencePath`] that carries precomputed metadata:
//! its buffered bounding box, its sub-box index and its length.

use crate::segment::{SegmentIndex, SubBox};
use crate::{Config, Diagnostics, Fragment, Result, SmoothieError, geomath};
use geo::{Coord, Rect};

/// Nearest reference segment found for a query point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentMatch {
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    /// Distance in meters from the query point to the segment
    pub distance: f64,
}

/// One reference fragment with its spatial index
#[derive(Clone, Debug)]
pub struct ReferencePath {
    fragment: Fragment,
    /// Bounding box buffered by the corridor width
    bounds: Rect<f64>,
    index: SegmentIndex,
    /// Cached length in meters (computed once during construction)
    cached_length: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ReferencePath {
    /// Index a fragment, reporting spans that cannot be bounded under the area cap
    pub fn new(
        fragment: Fragment,
        buffer_width: f64,
        max_area: f64,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let coords = fragment.coords();
        let raw_bounds = geomath::bounding_rect(coords)
            .unwrap_or_else(|| Rect::new(fragment.first_coord(), fragment.first_coord()));
        let bounds = geomath::buffer_rect(&raw_bounds, buffer_width);

        let index = SegmentIndex::build(coords, buffer_width, max_area);
        if let Some(start) = index.unbounded_from() {
            diagnostics.error(format!(
                "Too long segment in the reference: fragment {} cannot be bounded from vertex {}",
                fragment.id(),
                start
            ));
        }

        let cached_length = coords
            .windows(2)
            .map(|pair| geomath::distance(pair[0], pair[1]))
            .sum();

        Self {
            fragment,
            bounds,
            index,
            cached_length,
        }
    }

    #[inline]
    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    #[inline]
    pub fn coords(&self) -> &[Coord<f64>] {
        self.fragment.coords()
    }

    /// Buffered bounding box
    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    #[inline]
    pub fn sub_boxes(&self) -> &[SubBox] {
        self.index.boxes()
    }

    #[inline]
    pub fn index(&self) -> &SegmentIndex {
        &self.index
    }

    #[inline]
    pub fn total_points(&self) -> usize {
        self.coords().len()
    }

    /// Length in meters
    ///
    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn total_length(&self) -> f64 {
        self.cached_length
    }

    /// Nearest vertex to `p`, if `p` lies within the buffered bounds
    pub fn nearest_vertex(&self, p: Coord<f64>) -> Option<(Coord<f64>, f64)> {
        if !geomath::rect_contains(&self.bounds, p) {
            return None;
        }

        let mut best: Option<(Coord<f64>, f64)> = None;
        for &c in self.coords() {
            let d = geomath::distance(p, c);
            if best.is_none_or(|(_, min)| d < min) {
                best = Some((c, d));
            }
        }
        best
    }

    /// Nearest segment to `p` among the sub-boxes containing it
    pub fn nearest_segment(&self, p: Coord<f64>) -> Option<SegmentMatch> {
        if !geomath::rect_contains(&self.bounds, p) {
            return None;
        }

        let coords = self.coords();
        let mut best: Option<SegmentMatch> = None;
        for range in self.index.candidate_segments(p) {
            for j in range {
                let (a, b) = (coords[j - 1], coords[j]);
                let distance = geomath::distance_to_segment(p, a, b);
                if best.is_none_or(|m| distance < m.distance) {
                    best = Some(SegmentMatch {
                        start: a,
                        end: b,
                        distance,
                    });
                }
            }
        }
        best
    }
}

/// The chained reference corridor of a run
#[derive(Clone, Debug)]
pub struct Reference {
    /// Reference identifier (e.g. road number) shared by all paths
    name: String,
    /// Paths in traversal order
    paths: Vec<ReferencePath>,
    /// Union of the buffered path bounds
    bounds: Rect<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Reference {
    /// Index already ordered fragments
    pub fn build(
        name: impl Into<String>,
        fragments: Vec<Fragment>,
        config: &Config,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let paths: Vec<ReferencePath> = fragments
            .into_iter()
            .map(|f| ReferencePath::new(f, config.buffer_width, config.max_area, diagnostics))
            .collect();

        let bounds = paths
            .iter()
            .map(ReferencePath::bounds)
            .reduce(|acc, b| geomath::rect_union(&acc, &b))
            .ok_or(SmoothieError::EmptyReference)?;

        Ok(Self {
            name: name.into(),
            paths,
            bounds,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn paths(&self) -> &[ReferencePath] {
        &self.paths
    }

    /// Union of all buffered path bounds
    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Concatenated coordinates of all paths, in traversal order
    pub fn coordinates(&self) -> Vec<Coord<f64>> {
        self.paths
            .iter()
            .flat_map(|p| p.coords().iter().copied())
            .collect()
    }

    /// All sub-boxes in traversal order
    pub fn sub_boxes(&self) -> impl Iterator<Item = &SubBox> {
        self.paths.iter().flat_map(|p| p.sub_boxes().iter())
    }

    pub fn total_points(&self) -> usize {
        self.paths.iter().map(ReferencePath::total_points).sum()
    }

    /// Total length in meters
    pub fn total_length(&self) -> f64 {
        self.paths.iter().map(ReferencePath::total_length).sum()
    }

    /// Nearest reference vertex over all paths
    pub fn nearest_vertex(&self, p: Coord<f64>) -> Option<(Coord<f64>, f64)> {
        let mut best: Option<(Coord<f64>, f64)> = None;
        for candidate in self.paths.iter().filter_map(|path| path.nearest_vertex(p)) {
            if best.is_none_or(|(_, min)| candidate.1 < min) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Nearest reference segment over all paths
    pub fn nearest_segment(&self, p: Coord<f64>) -> Option<SegmentMatch> {
        let mut best: Option<SegmentMatch> = None;
        for candidate in self.paths.iter().filter_map(|path| path.nearest_segment(p)) {
            if best.is_none_or(|m| candidate.distance < m.distance) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Coordinate to center a view on: the start of the traversal
    ///
    /// When the first path touches the second one at its first vertex, the
    /// traversal actually starts at the first path's last vertex.
    pub fn focus(&self) -> Coord<f64> {
        let first = self.paths[0].fragment();
        match self.paths.get(1).map(ReferencePath::fragment) {
            Some(second)
                if first.first_coord() == second.first_coord()
                    || first.first_coord() == second.last_coord() =>
            {
                first.last_coord()
            }
            _ => first.first_coord(),
        }
    }
}
