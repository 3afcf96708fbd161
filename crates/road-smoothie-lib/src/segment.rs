//! Sub-box decomposition of a reference polyline for candidate filtering
//!
//! A polyline is split into contiguous index ranges whose buffered bounding
//! box stays under an area cap. Consecutive ranges share one vertex, so every
//! segment of the polyline lies entirely within at least one range. The boxes
//! double as fetch rectangles and as a coarse filter for nearest-segment
//! queries, which still check every segment in a matching range.

use crate::geomath;
use geo::{Coord, Rect};
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Slack on the area check so that buffer growth stays under the cap
const AREA_SAFETY_FACTOR: f64 = 2.0;

/// An area-capped box over a contiguous run of polyline vertices
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubBox {
    /// Range of vertex indices covered by this box
    pub indices: Range<usize>,
    /// Buffered bounding box of those vertices
    pub bounds: Rect<f64>,
}

impl SubBox {
    /// Range of segment end indices in this box (segment `j` joins `j - 1` and `j`)
    #[inline]
    pub fn segment_ends(&self) -> Range<usize> {
        (self.indices.start + 1)..self.indices.end
    }
}

/// Sub-boxes of one polyline, in vertex order
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentIndex {
    boxes: Vec<SubBox>,
    /// Number of vertices in the indexed polyline
    len: usize,
    /// First vertex index of a span that could not be bounded under the cap
    unbounded_from: Option<usize>,
}

impl SegmentIndex {
    /// Subdivide `coords` into boxes whose buffered area is under `max_area_km2`
    ///
    /// The window `[start, end)` starts at the full remaining length and is
    /// halved until it fits. When even a single segment does not fit, the rest
    /// of the polyline is left unindexed and reported via [`Self::unbounded_from`].
    pub fn build(coords: &[Coord<f64>], buffer_width: f64, max_area_km2: f64) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("segment::build");

        let cap = max_area_km2 * 1.0e6;
        let len = coords.len();
        let mut boxes = Vec::new();
        let mut unbounded_from = None;

        let mut start = 0;
        let mut end = len;
        while start < len {
            let bounds = match geomath::bounding_rect(&coords[start..end]) {
                Some(rect) => geomath::buffer_rect(&rect, buffer_width),
                None => break,
            };

            if geomath::rect_area(&bounds) * AREA_SAFETY_FACTOR < cap {
                boxes.push(SubBox {
                    indices: start..end,
                    bounds,
                });
                if end == len {
                    break;
                }
                start = end - 1;
                end = len;
            } else {
                // A single segment (or lone vertex) cannot shrink any further
                if end - start <= 2 {
                    unbounded_from = Some(start);
                    break;
                }
                end = ((start + end) / 2).max(start + 2);
            }
        }

        Self {
            boxes,
            len,
            unbounded_from,
        }
    }

    #[inline]
    pub fn boxes(&self) -> &[SubBox] {
        &self.boxes
    }

    /// First vertex of the span left without sub-boxes, if subdivision gave up
    #[inline]
    pub fn unbounded_from(&self) -> Option<usize> {
        self.unbounded_from
    }

    /// Whether the boxes cover every vertex
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.unbounded_from.is_none()
    }

    /// Segment end index ranges worth checking for a query point
    ///
    /// Ranges of boxes containing `p` come first, followed by the unindexed
    /// tail (if any), which always has to be scanned exhaustively.
    pub fn candidate_segments(&self, p: Coord<f64>) -> impl Iterator<Item = Range<usize>> + '_ {
        let tail = self
            .unbounded_from
            .map(|start| (start + 1).max(1)..self.len);

        self.boxes
            .iter()
            .filter(move |b| geomath::rect_contains(&b.bounds, p))
            .map(SubBox::segment_ends)
            .chain(tail)
    }
}
