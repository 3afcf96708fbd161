//! Reference fragments from GPX tracks
//!
//! Every non-empty track segment becomes one fragment tagged with its track
//! name. Endpoints that share a coordinate (to 1e-7 degrees) get the same
//! identity, so fragments digitized as separate segments still chain.

use crate::{EndpointId, Fragment, FragmentId, Result};
use geo::Coord;
use std::io::Read;

/// Quantization step of endpoint coordinates, in degrees
const ENDPOINT_RESOLUTION: f64 = 1.0e-7;

/// Stride between latitude steps; larger than the whole longitude range
const LAT_STRIDE: i64 = 4_000_000_000;

/// Identity of an endpoint derived from its quantized coordinate
pub fn endpoint_id(c: Coord<f64>) -> EndpointId {
    let lat = (c.y / ENDPOINT_RESOLUTION).round() as i64;
    let lon = (c.x / ENDPOINT_RESOLUTION).round() as i64;
    EndpointId(lat * LAT_STRIDE + lon)
}

/// Fragments of all tracks, paired with their track name
pub fn fragments_from_gpx(gpx: &gpx::Gpx) -> Vec<(Option<String>, Fragment)> {
    let mut next_id = 1;
    let mut fragments = Vec::new();

    for track in &gpx.tracks {
        for segment in &track.segments {
            let coords: Vec<Coord<f64>> = segment
                .points
                .iter()
                .map(|waypoint| {
                    let point = waypoint.point();
                    Coord {
                        x: point.x(),
                        y: point.y(),
                    }
                })
                .collect();
            let (Some(&first), Some(&last)) = (coords.first(), coords.last()) else {
                continue;
            };

            let id = FragmentId(next_id);
            next_id += 1;
            match Fragment::new(id, endpoint_id(first), endpoint_id(last), coords) {
                Ok(fragment) => fragments.push((track.name.clone(), fragment)),
                Err(e) => tracing::warn!("Skipping track segment: {e}"),
            }
        }
    }

    tracing::debug!("Read {} reference fragments", fragments.len());
    fragments
}

/// Parse a GPX document and extract its fragments
pub fn read_fragments<R: Read>(reader: R) -> Result<Vec<(Option<String>, Fragment)>> {
    let gpx = gpx::read(reader)?;
    Ok(fragments_from_gpx(&gpx))
}
