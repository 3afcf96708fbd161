//! In-memory line network being conflated
//!
//! Vertices and ways live in arenas addressed by stable identifiers. Ways hold
//! lists of vertex identifiers; how many ways use a vertex is computed on
//! demand by scanning, so removals never leave dangling back-references.

use crate::{Result, SmoothieError, geomath};
use chrono::{DateTime, Utc};
use geo::{Coord, Rect};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a vertex in a [`Network`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct VertexId(pub usize);

/// Identifier of a way in a [`Network`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct WayId(pub usize);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for WayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// A point of the network
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vertex {
    /// Identifier in the source dataset, `None` for vertices created by a run
    #[cfg_attr(feature = "serde", serde(default))]
    pub external_id: Option<i64>,
    pub coord: Coord<f64>,
    /// Carries its own tags (crossings, signs...)
    #[cfg_attr(feature = "serde", serde(default))]
    pub tagged: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub modified: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_new: bool,
    /// Time of the last edit
    pub timestamp: DateTime<Utc>,
    /// Author of the last edit
    #[cfg_attr(feature = "serde", serde(default))]
    pub user: String,
}

impl Vertex {
    /// An existing vertex loaded from the source dataset
    pub fn new(
        external_id: i64,
        coord: Coord<f64>,
        timestamp: DateTime<Utc>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            external_id: Some(external_id),
            coord,
            tagged: false,
            modified: false,
            is_new: false,
            timestamp,
            user: user.into(),
        }
    }

    /// A vertex created during a run
    pub fn created(coord: Coord<f64>, now: DateTime<Utc>) -> Self {
        Self {
            external_id: None,
            coord,
            tagged: false,
            modified: false,
            is_new: true,
            timestamp: now,
            user: String::new(),
        }
    }

    pub fn with_tags(mut self, tagged: bool) -> Self {
        self.tagged = tagged;
        self
    }
}

/// An ordered sequence of vertices with classification tags
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Way {
    /// Identifier in the source dataset
    #[cfg_attr(feature = "serde", serde(default))]
    pub external_id: Option<i64>,
    pub vertices: Vec<VertexId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: BTreeMap<String, String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub modified: bool,
}

impl Way {
    pub fn new(external_id: i64, vertices: Vec<VertexId>) -> Self {
        Self {
            external_id: Some(external_id),
            vertices,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Leading integer of a tag value (`"2;3"` reads as 2), `None` when
    /// absent or not starting with a number
    pub fn tag_int(&self, key: &str) -> Option<i64> {
        let value = self.tag(key)?.trim_start();
        let end = value
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
            .map_or(value.len(), |(i, _)| i);
        value[..end].parse().ok()
    }

    /// Label for log messages: the source id when known
    pub fn label(&self, id: WayId) -> String {
        match self.external_id {
            Some(external) => external.to_string(),
            None => id.to_string(),
        }
    }
}

/// Arena of vertices and ways
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Network {
    /// Vertex slots; deleted vertices leave `None` so identifiers stay stable
    vertices: Vec<Option<Vertex>>,
    ways: Vec<Way>,
    /// Rectangles already fetched from the source
    #[cfg_attr(feature = "serde", serde(default))]
    loaded_bounds: Vec<Rect<f64>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexId {
        self.vertices.push(Some(vertex));
        VertexId(self.vertices.len() - 1)
    }

    /// Add a way; all its vertices must already exist
    pub fn add_way(&mut self, way: Way) -> Result<WayId> {
        if let Some(missing) = way.vertices.iter().find(|id| self.vertex(**id).is_none()) {
            return Err(SmoothieError::UnknownVertex(*missing));
        }
        self.ways.push(way);
        Ok(WayId(self.ways.len() - 1))
    }

    #[inline]
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0).and_then(Option::as_ref)
    }

    #[inline]
    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        self.vertices.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Coordinate of a live vertex
    pub fn coord(&self, id: VertexId) -> Result<Coord<f64>> {
        self.vertex(id)
            .map(|v| v.coord)
            .ok_or(SmoothieError::UnknownVertex(id))
    }

    #[inline]
    pub fn way(&self, id: WayId) -> Option<&Way> {
        self.ways.get(id.0)
    }

    #[inline]
    pub fn way_mut(&mut self, id: WayId) -> Option<&mut Way> {
        self.ways.get_mut(id.0)
    }

    pub fn ways(&self) -> impl Iterator<Item = (WayId, &Way)> {
        self.ways.iter().enumerate().map(|(i, w)| (WayId(i), w))
    }

    /// Live vertices
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &Vertex)> {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (VertexId(i), v)))
    }

    /// Number of live vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| v.is_some()).count()
    }

    #[inline]
    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    /// Number of distinct ways using a vertex
    pub fn reference_count(&self, id: VertexId) -> usize {
        self.ways.iter().filter(|w| w.vertices.contains(&id)).count()
    }

    /// Bounding box of a way's vertices
    pub fn way_bounds(&self, id: WayId) -> Option<Rect<f64>> {
        let way = self.way(id)?;
        let coords: Vec<Coord<f64>> = way
            .vertices
            .iter()
            .filter_map(|v| self.vertex(*v).map(|v| v.coord))
            .collect();
        geomath::bounding_rect(&coords)
    }

    /// Create a vertex and splice it into a way before `position`
    pub fn insert_vertex(&mut self, way: WayId, position: usize, vertex: Vertex) -> Result<VertexId> {
        let len = self.way(way).ok_or(SmoothieError::UnknownWay(way))?.vertices.len();
        if position > len {
            return Err(SmoothieError::InvalidGeometry(format!(
                "Cannot insert at {position} into way {way} of {len} vertices"
            )));
        }

        let id = self.add_vertex(vertex);
        let w = self.way_mut(way).ok_or(SmoothieError::UnknownWay(way))?;
        w.vertices.insert(position, id);
        w.modified = true;
        Ok(id)
    }

    /// Remove the vertex at `position` from a way
    ///
    /// The vertex itself is deleted once no way uses it anymore.
    pub fn remove_from_way(&mut self, way: WayId, position: usize) -> Result<VertexId> {
        let w = self.way_mut(way).ok_or(SmoothieError::UnknownWay(way))?;
        if position >= w.vertices.len() {
            return Err(SmoothieError::InvalidGeometry(format!(
                "Cannot remove vertex {position} of way {way} with {} vertices",
                w.vertices.len()
            )));
        }
        let id = w.vertices.remove(position);
        w.modified = true;

        if self.reference_count(id) == 0 {
            if let Some(slot) = self.vertices.get_mut(id.0) {
                *slot = None;
            }
        }
        Ok(id)
    }

    /// Rectangles already fetched from the source
    #[inline]
    pub fn loaded_bounds(&self) -> &[Rect<f64>] {
        &self.loaded_bounds
    }

    /// Whether `rect` lies inside a single fetched rectangle
    ///
    /// Gaps between fetched rectangles are never considered loaded.
    pub fn is_loaded(&self, rect: &Rect<f64>) -> bool {
        self.loaded_bounds
            .iter()
            .any(|loaded| geomath::rect_within(rect, loaded))
    }

    pub fn extend_loaded_bounds(&mut self, bounds: Rect<f64>) {
        if !self.is_loaded(&bounds) {
            self.loaded_bounds.push(bounds);
        }
    }

    /// Merge a fetched network into this one
    ///
    /// Vertices and ways already present (same external id) are kept as they
    /// are; new ones are appended with remapped identifiers.
    pub fn merge_from(&mut self, other: Network) {
        let mut known_vertices: HashMap<i64, VertexId> = self
            .vertices()
            .filter_map(|(id, v)| v.external_id.map(|e| (e, id)))
            .collect();
        let known_ways: Vec<i64> = self.ways.iter().filter_map(|w| w.external_id).collect();

        let mut remap: HashMap<VertexId, VertexId> = HashMap::new();
        for (index, slot) in other.vertices.into_iter().enumerate() {
            let Some(vertex) = slot else { continue };
            let id = match vertex.external_id {
                Some(external) => *known_vertices
                    .entry(external)
                    .or_insert_with(|| {
                        self.vertices.push(Some(vertex));
                        VertexId(self.vertices.len() - 1)
                    }),
                None => self.add_vertex(vertex),
            };
            remap.insert(VertexId(index), id);
        }

        for mut way in other.ways {
            if way.external_id.is_some_and(|e| known_ways.contains(&e)) {
                continue;
            }
            way.vertices = way
                .vertices
                .iter()
                .filter_map(|v| remap.get(v).copied())
                .collect();
            self.ways.push(way);
        }

        for bounds in other.loaded_bounds {
            self.extend_loaded_bounds(bounds);
        }
    }

    /// Sub-network of the ways touching `bounds`, with all their vertices
    pub fn extract(&self, bounds: Rect<f64>) -> Network {
        let mut result = Network::new();
        let mut remap: HashMap<VertexId, VertexId> = HashMap::new();

        for way in &self.ways {
            let touches = way.vertices.iter().any(|v| {
                self.vertex(*v)
                    .is_some_and(|v| geomath::rect_contains(&bounds, v.coord))
            });
            if !touches {
                continue;
            }

            let vertices = way
                .vertices
                .iter()
                .filter_map(|v| {
                    let vertex = self.vertex(*v)?;
                    Some(*remap
                        .entry(*v)
                        .or_insert_with(|| result.add_vertex(vertex.clone())))
                })
                .collect();
            result.ways.push(Way {
                vertices,
                ..way.clone()
            });
        }

        result.loaded_bounds = vec![bounds];
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geomath::latlon;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// Two ways sharing vertex B: A-B and B-C
    fn two_ways() -> (Network, [VertexId; 3], [WayId; 2]) {
        let mut network = Network::new();
        let a = network.add_vertex(Vertex::new(1, latlon(47.0, 19.0), timestamp(), "alice"));
        let b = network.add_vertex(Vertex::new(2, latlon(47.0, 19.001), timestamp(), "alice"));
        let c = network.add_vertex(Vertex::new(3, latlon(47.0, 19.002), timestamp(), "bob"));
        let ab = network.add_way(Way::new(10, vec![a, b])).unwrap();
        let bc = network.add_way(Way::new(11, vec![b, c])).unwrap();
        (network, [a, b, c], [ab, bc])
    }

    #[test]
    fn test_reference_count() {
        let (network, [a, b, c], _) = two_ways();
        assert_eq!(network.reference_count(a), 1);
        assert_eq!(network.reference_count(b), 2);
        assert_eq!(network.reference_count(c), 1);
    }

    #[test]
    fn test_add_way_rejects_unknown_vertex() {
        let mut network = Network::new();
        let result = network.add_way(Way::new(1, vec![VertexId(5)]));
        assert!(matches!(result, Err(SmoothieError::UnknownVertex(VertexId(5)))));
    }

    #[test]
    fn test_insert_vertex() {
        let (mut network, [a, b, _], [ab, _]) = two_ways();
        let mid = network
            .insert_vertex(ab, 1, Vertex::created(latlon(47.0, 19.0005), timestamp()))
            .unwrap();

        let way = network.way(ab).unwrap();
        assert_eq!(way.vertices, vec![a, mid, b]);
        assert!(way.modified);
        assert!(network.vertex(mid).unwrap().is_new);
        assert!(network.insert_vertex(ab, 9, Vertex::created(latlon(0.0, 0.0), timestamp())).is_err());
    }

    #[test]
    fn test_remove_unshared_vertex_deletes_it() {
        let (mut network, [a, _, _], [ab, _]) = two_ways();
        assert_eq!(network.remove_from_way(ab, 0).unwrap(), a);
        assert!(network.vertex(a).is_none());
        assert_eq!(network.vertex_count(), 2);
    }

    #[test]
    fn test_remove_shared_vertex_keeps_it() {
        let (mut network, [_, b, _], [ab, bc]) = two_ways();
        network.remove_from_way(ab, 1).unwrap();
        assert!(network.vertex(b).is_some());
        assert_eq!(network.reference_count(b), 1);
        assert_eq!(network.way(bc).unwrap().vertices[0], b);
    }

    #[test]
    fn test_way_bounds() {
        let (network, _, [ab, _]) = two_ways();
        let bounds = network.way_bounds(ab).unwrap();
        assert_eq!(bounds.min(), latlon(47.0, 19.0));
        assert_eq!(bounds.max(), latlon(47.0, 19.001));
    }

    #[test]
    fn test_way_tags() {
        let way = Way::new(1, vec![])
            .with_tag("highway", "secondary")
            .with_tag("lanes", " 2");
        assert_eq!(way.tag("highway"), Some("secondary"));
        assert_eq!(way.tag_int("lanes"), Some(2));
        assert_eq!(way.tag_int("highway"), None);

        let way = way
            .with_tag("lanes:forward", "2;3")
            .with_tag("lanes:backward", "-")
            .with_tag("width", "-1 m");
        assert_eq!(way.tag_int("lanes:forward"), Some(2));
        assert_eq!(way.tag_int("lanes:backward"), None);
        assert_eq!(way.tag_int("width"), Some(-1));
        assert_eq!(way.tag("ref"), None);
    }

    #[test]
    fn test_extract_and_merge_deduplicates() {
        let (source, _, _) = two_ways();
        let west = source.extract(Rect::new(latlon(46.9, 18.9), latlon(47.1, 19.0005)));
        assert_eq!(west.way_count(), 1);
        assert_eq!(west.vertex_count(), 2);

        let mut network = Network::new();
        network.merge_from(west);
        network.merge_from(source.extract(Rect::new(latlon(46.9, 18.9), latlon(47.1, 19.1))));

        // Way 10 and vertices 1, 2 are not duplicated by the second fetch
        assert_eq!(network.way_count(), 2);
        assert_eq!(network.vertex_count(), 3);
        let (_, bc) = network.ways().find(|(_, w)| w.external_id == Some(11)).unwrap();
        let b = bc.vertices[0];
        assert_eq!(network.reference_count(b), 2);
        assert_eq!(network.loaded_bounds().len(), 1);
    }

    #[test]
    fn test_gap_between_loaded_rects_is_not_loaded() {
        let mut network = Network::new();
        network.extend_loaded_bounds(Rect::new(latlon(0.0, 0.0), latlon(0.01, 0.01)));
        network.extend_loaded_bounds(Rect::new(latlon(0.99, 0.99), latlon(1.0, 1.0)));
        // Already covered by the first rect
        network.extend_loaded_bounds(Rect::new(latlon(0.0, 0.0), latlon(0.005, 0.005)));

        assert_eq!(network.loaded_bounds().len(), 2);
        assert!(network.is_loaded(&Rect::new(latlon(0.001, 0.001), latlon(0.002, 0.002))));
        assert!(!network.is_loaded(&Rect::new(latlon(0.5, 0.5), latlon(0.51, 0.51))));
    }
}
