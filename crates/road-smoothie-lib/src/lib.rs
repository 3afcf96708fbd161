//! Road Smoothie Library - Conflation of a Line Network onto a Reference Path
//!
//! This library aligns an independently digitized road network to a reference
//! polyline. Vertices are snapped or pulled onto the reference, corner-cutting
//! edges are refined with new vertices, and duplicates created along the way
//! are collapsed. The reference is also cut into area-capped boxes that drive
//! the download of the network around it.
//!
//! # Architecture
//!
//! - **[`geomath`]**: Local planar approximation of geodesic distances
//! - **[`Fragment`]** / **[`order_fragments`]**: Reference pieces and their chaining
//! - **[`SegmentIndex`]**: Area-capped sub-boxes over a polyline
//! - **[`Reference`]**: The indexed corridor used for nearest-vertex/segment queries
//! - **[`Network`]**: Arena of vertices and ways being edited
//! - **[`ConflationEngine`]**: The per-vertex adjustment, insertion and duplicate passes
//! - **[`smooth_to_reference`]**: The whole run, from selection to report
//!
//! # Performance Characteristics
//!
//! - **Index Build**: O(N log N) per reference path
//! - **Nearest Segment**: O(B + K) where B=boxes, K=segments in matching boxes
//! - **Memory**: O(N) for the reference plus O(V + W) for the network arena

mod chain;
mod config;
mod diagnostics;
mod engine;
mod fetch;
mod fragment;
pub mod geomath;
mod gpx_import;
mod merge;
mod network;
mod pipeline;
mod reference;
mod segment;

// Public API exports
pub use chain::order_fragments;
pub use config::Config;
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use engine::{ConflationEngine, RunReport};
pub use fetch::{NetworkSource, fetch_network, plan_fetch};
pub use fragment::{EndpointId, Fragment, FragmentId, Selection, select_reference};
pub use gpx_import::{endpoint_id, fragments_from_gpx, read_fragments};
pub use merge::merge_rects;
pub use network::{Network, Vertex, VertexId, Way, WayId};
pub use pipeline::{Outcome, smooth_to_reference};
pub use reference::{Reference, ReferencePath, SegmentMatch};
pub use segment::{SegmentIndex, SubBox};

/// Error types of the library
#[derive(Debug, thiserror::Error)]
pub enum SmoothieError {
    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown vertex {0}")]
    UnknownVertex(VertexId),

    #[error("Unknown way {0}")]
    UnknownWay(WayId),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty reference")]
    EmptyReference,
}

pub type Result<T> = std::result::Result<T, SmoothieError>;
