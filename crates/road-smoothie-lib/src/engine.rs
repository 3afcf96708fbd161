//! Conflation of a line network onto a reference corridor
//!
//! A run walks every eligible way of the network once:
//!
//! 1. Existing vertices are snapped onto nearby reference vertices or pulled
//!    onto the nearest reference segment.
//! 2. Edges that cut a corner of the reference are split at their midpoint,
//!    and the new vertex is adjusted like the others.
//! 3. Consecutive vertices that ended up on the same coordinate are collapsed.
//!
//! Finally every vertex moved or created by the run is scattered by a small
//! random offset.

use crate::network::{Network, Vertex, VertexId, Way, WayId};
use crate::{Config, Diagnostics, Reference, Result, SmoothieError, geomath};
use chrono::{DateTime, Utc};
use geo::Coord;
use rand::Rng;
use std::collections::{BTreeSet, HashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on midpoint insertions in a single way
const MAX_INSERTIONS_PER_WAY: usize = 10_000;

/// Counters and diagnostics of a conflation run
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunReport {
    /// Eligible ways inside the reference corridor
    pub ways_processed: usize,
    /// Eligible ways skipped for leaving the corridor
    pub ways_skipped: usize,
    /// Vertex visits during the adjustment pass (shared vertices count once per way)
    pub vertices_seen: usize,
    pub vertices_moved: usize,
    pub vertices_inserted: usize,
    pub vertices_deleted: usize,
    /// Duplicate pairs that could not be collapsed
    pub conflicts: usize,
    /// Vertex visits with a recent edit timestamp
    pub fresh_vertices: usize,
    pub diagnostics: Diagnostics,
}

/// Which vertex of a duplicate pair goes away
enum Duplicate {
    Remove(usize),
    /// Both vertices are shared with other ways
    Conflict,
    /// Neither vertex was touched by this run
    Preexisting,
}

/// Aligns network vertices to a [`Reference`]
pub struct ConflationEngine<'a> {
    reference: &'a Reference,
    config: &'a Config,
    max_insertions: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> ConflationEngine<'a> {
    pub fn new(reference: &'a Reference, config: &'a Config) -> Self {
        Self {
            reference,
            config,
            max_insertions: MAX_INSERTIONS_PER_WAY,
        }
    }

    /// Limit the number of midpoints inserted into a single way
    pub fn with_max_insertions(mut self, limit: usize) -> Self {
        self.max_insertions = limit;
        self
    }

    /// Whether a way's tags make it a candidate for conflation
    ///
    /// The way must be a two-way road (not under construction, not part of a
    /// roundabout) carrying the reference identifier, with consistent lane tags.
    pub fn is_eligible(&self, way: &Way) -> bool {
        match way.tag("highway") {
            None | Some("construction") => return false,
            Some(_) => {}
        }
        if way.tag("ref") != Some(self.reference.name()) {
            return false;
        }
        if way.tag("oneway") == Some("yes") || way.tag("junction") == Some("roundabout") {
            return false;
        }

        let lanes = |key: &str| way.tag_int(key).filter(|n| *n != 0);
        let total = lanes("lanes");
        let backward = lanes("lanes:backward");
        let forward = lanes("lanes:forward");
        let split_matches = |side: Option<i64>| match (total, side) {
            (Some(total), Some(side)) => 2 * side == total,
            _ => true,
        };
        if !split_matches(backward) || !split_matches(forward) {
            return false;
        }
        !matches!((backward, forward), (Some(b), Some(f)) if b != f)
    }

    /// New position for a vertex, or `None` when it should stay put
    ///
    /// Untagged vertices already within `max_distance` of a reference vertex
    /// are left alone; otherwise those within `snap_radius` of one snap onto
    /// it (only reachable when `snap_radius >= max_distance`). Other
    /// vertices are pulled to the perpendicular foot on the nearest reference
    /// segment when their distance to it is over `max_error` and at most
    /// `buffer_width`. Tagged vertices never snap onto reference vertices.
    pub fn adjust_vertex(&self, p: Coord<f64>, tagged: bool) -> Option<Coord<f64>> {
        let nearest = if tagged {
            None
        } else {
            self.reference.nearest_vertex(p)
        };

        if let Some((target, distance)) = nearest {
            if distance < self.config.max_distance {
                return None;
            }
            if distance <= self.config.snap_radius {
                return (target != p).then_some(target);
            }
        }

        let segment = self.reference.nearest_segment(p)?;
        if segment.distance <= self.config.max_error || segment.distance > self.config.buffer_width {
            return None;
        }
        Some(geomath::perpendicular_foot(p, segment.start, segment.end))
    }

    /// Conflate every eligible way of `network`
    ///
    /// Edits are applied in place as the run progresses. Only structural
    /// inconsistencies of the network itself are returned as errors.
    pub fn run<R: Rng>(
        &self,
        network: &mut Network,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Result<RunReport> {
        #[cfg(feature = "profiling")]
        profiling::scope!("engine::run");

        let mut report = RunReport::default();
        let mut users: HashMap<String, usize> = HashMap::new();
        let fresh_since = now - self.config.recent_window;
        let corridor = self.reference.bounds();
        // Vertices moved or created by this run, the only ones scattered
        let mut touched: BTreeSet<VertexId> = BTreeSet::new();

        let ways: Vec<WayId> = network
            .ways()
            .filter(|(_, way)| self.is_eligible(way))
            .map(|(id, _)| id)
            .collect();
        tracing::debug!("{} eligible ways for ref {}", ways.len(), self.reference.name());

        for way_id in ways {
            let way = network.way(way_id).ok_or(SmoothieError::UnknownWay(way_id))?;
            let label = way.label(way_id);

            let inside = network
                .way_bounds(way_id)
                .is_some_and(|bounds| geomath::rect_within(&bounds, &corridor));
            if !inside {
                report
                    .diagnostics
                    .info(format!("Way {label} is out of the selected area. Skipped."));
                report.ways_skipped += 1;
                continue;
            }
            report.ways_processed += 1;

            let vertex_ids = way.vertices.clone();
            for id in vertex_ids {
                let vertex = network.vertex_mut(id).ok_or(SmoothieError::UnknownVertex(id))?;
                report.vertices_seen += 1;
                if vertex.timestamp > fresh_since {
                    report.fresh_vertices += 1;
                    *users.entry(vertex.user.clone()).or_default() += 1;
                }

                if let Some(target) = self.adjust_vertex(vertex.coord, vertex.tagged) {
                    vertex.coord = target;
                    vertex.modified = true;
                    touched.insert(id);
                    report.vertices_moved += 1;
                }
            }

            self.insert_midpoints(network, way_id, &label, now, &mut touched, &mut report)?;
            self.remove_duplicates(network, way_id, &label, &mut report)?;
        }

        if report.fresh_vertices > self.config.recent_warn_threshold {
            let mut users: Vec<(String, usize)> = users.into_iter().collect();
            users.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            let names = users
                .iter()
                .map(|(name, count)| format!("{name} ({count})"))
                .collect::<Vec<_>>()
                .join(", ");
            report.diagnostics.warn(format!(
                "{} of {} nodes were recently modified by {}",
                report.fresh_vertices, report.vertices_seen, names
            ));
        }

        self.scatter(network, &touched, rng);

        tracing::info!(
            "Conflated {} ways: {} moved, {} inserted, {} deleted",
            report.ways_processed,
            report.vertices_moved,
            report.vertices_inserted,
            report.vertices_deleted
        );
        Ok(report)
    }

    /// Split edges whose midpoint strays from the reference
    ///
    /// After an insertion the first half of the split edge is examined again,
    /// so long corner-cutting edges are refined until they follow the reference.
    fn insert_midpoints(
        &self,
        network: &mut Network,
        way_id: WayId,
        label: &str,
        now: DateTime<Utc>,
        touched: &mut BTreeSet<VertexId>,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut last_inserted: Option<Coord<f64>> = None;
        let mut inserted = 0;
        let mut i = 1;

        loop {
            let way = network.way(way_id).ok_or(SmoothieError::UnknownWay(way_id))?;
            if i >= way.vertices.len() {
                break;
            }
            let a = network.coord(way.vertices[i - 1])?;
            let b = network.coord(way.vertices[i])?;

            if geomath::distance(a, b) <= self.config.min_segment_length {
                i += 1;
                continue;
            }

            let mid = Coord {
                x: (a.x + b.x) / 2.0,
                y: (a.y + b.y) / 2.0,
            };
            let Some(segment) = self
                .reference
                .nearest_segment(mid)
                .filter(|s| s.distance <= self.config.buffer_width)
            else {
                report
                    .diagnostics
                    .info(format!("Way {label} is out of the selected area. Skipped."));
                break;
            };

            if segment.distance > self.config.max_distance {
                let target = self.adjust_vertex(mid, false);
                let coord = target.unwrap_or(mid);

                if last_inserted == Some(coord) {
                    report.diagnostics.warn(format!(
                        "Check {label}[{i}] @ {},{} -> {},{}, it would cause infinite loop.",
                        mid.x, mid.y, coord.x, coord.y
                    ));
                } else if inserted >= self.max_insertions {
                    report.diagnostics.warn(format!(
                        "Way {label} needed more than {} new nodes, stopped refining it.",
                        self.max_insertions
                    ));
                    break;
                } else {
                    let mut vertex = Vertex::created(coord, now);
                    vertex.modified = target.is_some();
                    touched.insert(network.insert_vertex(way_id, i, vertex)?);
                    last_inserted = Some(coord);
                    inserted += 1;
                    report.vertices_inserted += 1;
                    continue;
                }
            }

            i += 1;
        }

        Ok(())
    }

    /// Collapse consecutive vertices that share a coordinate
    fn remove_duplicates(
        &self,
        network: &mut Network,
        way_id: WayId,
        label: &str,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut i = 1;

        loop {
            let way = network.way(way_id).ok_or(SmoothieError::UnknownWay(way_id))?;
            if i >= way.vertices.len() {
                break;
            }
            let (id1, id2) = (way.vertices[i - 1], way.vertices[i]);
            let v1 = network.vertex(id1).ok_or(SmoothieError::UnknownVertex(id1))?;
            let v2 = network.vertex(id2).ok_or(SmoothieError::UnknownVertex(id2))?;

            if (v1.coord.x - v2.coord.x).abs() > geomath::EPSILON
                || (v1.coord.y - v2.coord.y).abs() > geomath::EPSILON
            {
                i += 1;
                continue;
            }

            let decision = if v2.is_new {
                Duplicate::Remove(i)
            } else if v1.is_new {
                Duplicate::Remove(i - 1)
            } else {
                let shared1 = network.reference_count(id1) >= 2;
                let shared2 = network.reference_count(id2) >= 2;
                match (shared1, shared2) {
                    (true, true) => Duplicate::Conflict,
                    (true, false) => Duplicate::Remove(i),
                    (false, true) => Duplicate::Remove(i - 1),
                    (false, false) if v2.modified => Duplicate::Remove(i),
                    (false, false) if v1.modified => Duplicate::Remove(i - 1),
                    (false, false) => Duplicate::Preexisting,
                }
            };

            match decision {
                Duplicate::Remove(position) => {
                    let removed = network.remove_from_way(way_id, position)?;
                    tracing::debug!("Removed duplicate {removed} from way {label}");
                    report.vertices_deleted += 1;
                    // The vertex before the removed one has a new successor
                    i = position.max(1);
                }
                Duplicate::Conflict => {
                    report.conflicts += 1;
                    report.diagnostics.warn(format!(
                        "Duplicate nodes {id1} and {id2} in way {label} are both shared with other ways, none removed."
                    ));
                    i += 1;
                }
                Duplicate::Preexisting => {
                    tracing::debug!("Untouched duplicate nodes {id1} and {id2} in way {label}");
                    i += 1;
                }
            }
        }

        Ok(())
    }

    /// Offset the given vertices by a random vector uniform on a disc
    ///
    /// Vertices deleted since they were touched are skipped.
    fn scatter<R: Rng>(&self, network: &mut Network, touched: &BTreeSet<VertexId>, rng: &mut R) {
        if self.config.variance <= 0.0 {
            return;
        }

        for id in touched {
            let Some(vertex) = network.vertex_mut(*id) else {
                continue;
            };
            let r = self.config.variance * rng.random::<f64>().sqrt();
            let theta = std::f64::consts::TAU * rng.random::<f64>();
            vertex.coord = geomath::offset(vertex.coord, r * theta.cos(), r * theta.sin());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geomath::latlon;
    use crate::{EndpointId, Fragment, FragmentId, Severity};
    use chrono::{Duration, TimeZone};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn last_year() -> DateTime<Utc> {
        now() - Duration::days(365)
    }

    fn reference(coords: Vec<Coord<f64>>) -> Reference {
        let fragment = Fragment::new(FragmentId(1), EndpointId(1), EndpointId(2), coords).unwrap();
        let mut diagnostics = Diagnostics::new();
        Reference::build("8", vec![fragment], &Config::default(), &mut diagnostics).unwrap()
    }

    /// About 111 m north along the prime meridian
    fn north_south() -> Reference {
        reference(vec![latlon(0.0, 0.0), latlon(0.001, 0.0)])
    }

    fn quiet_config() -> Config {
        Config {
            variance: 0.0,
            ..Config::default()
        }
    }

    /// Config where snapping to reference vertices is reachable
    fn snapping_config() -> Config {
        Config {
            snap_radius: 5.0,
            max_distance: 1.0,
            variance: 0.0,
            ..Config::default()
        }
    }

    fn road(vertices: Vec<VertexId>) -> Way {
        Way::new(100 + vertices.len() as i64, vertices)
            .with_tag("highway", "primary")
            .with_tag("ref", "8")
    }

    fn old_vertex(network: &mut Network, id: i64, lat: f64, lon: f64) -> VertexId {
        network.add_vertex(Vertex::new(id, latlon(lat, lon), last_year(), "mapper"))
    }

    #[test]
    fn test_pull_to_perpendicular_foot() {
        let reference = north_south();
        let config = Config::default();
        let engine = ConflationEngine::new(&reference, &config);

        // ~11 m east of the middle of the segment
        let moved = engine.adjust_vertex(latlon(0.0005, 0.0001), false).unwrap();
        assert!((moved.y - 0.0005).abs() < 1e-12);
        assert!(moved.x.abs() < 1e-12);
    }

    #[test]
    fn test_adjust_is_idempotent() {
        let reference = north_south();
        let config = Config::default();
        let engine = ConflationEngine::new(&reference, &config);

        let moved = engine.adjust_vertex(latlon(0.0005, 0.0001), false).unwrap();
        assert_eq!(engine.adjust_vertex(moved, false), None);
        assert_eq!(engine.adjust_vertex(moved, true), None);
    }

    #[test]
    fn test_close_to_reference_vertex_is_untouched() {
        let reference = north_south();
        let config = Config::default();
        let engine = ConflationEngine::new(&reference, &config);

        // ~1.6 m from (0, 0), well under max_distance
        assert_eq!(engine.adjust_vertex(latlon(0.00001, 0.00001), false), None);
    }

    #[test]
    fn test_tagged_vertex_is_pulled_not_snapped() {
        let reference = north_south();
        let config = Config::default();
        let engine = ConflationEngine::new(&reference, &config);

        let moved = engine.adjust_vertex(latlon(0.00001, 0.00001), true).unwrap();
        assert!((moved.y - 0.00001).abs() < 1e-12);
        assert!(moved.x.abs() < 1e-12);
    }

    #[test]
    fn test_snap_to_reference_vertex() {
        let reference = north_south();
        let config = snapping_config();
        let engine = ConflationEngine::new(&reference, &config);

        let snapped = engine.adjust_vertex(latlon(0.00001, 0.00001), false).unwrap();
        assert_eq!(snapped, latlon(0.0, 0.0));
        assert_eq!(engine.adjust_vertex(snapped, false), None);
    }

    #[test]
    fn test_far_vertex_is_untouched() {
        let reference = north_south();
        let config = Config::default();
        let engine = ConflationEngine::new(&reference, &config);

        // ~45 m east is still within the buffer width
        let moved = engine.adjust_vertex(latlon(0.0005, 0.0004), false).unwrap();
        assert!(moved.x.abs() < 1e-12);
        assert_eq!(engine.adjust_vertex(latlon(0.0005, 0.01), false), None);
    }

    #[test]
    fn test_eligibility_filter() {
        let reference = north_south();
        let config = Config::default();
        let engine = ConflationEngine::new(&reference, &config);
        let base = || road(vec![]);

        assert!(engine.is_eligible(&base()));
        assert!(engine.is_eligible(&base().with_tag("lanes", "2").with_tag("lanes:forward", "1")));
        assert!(engine.is_eligible(&base().with_tag("lanes:backward", "2").with_tag("lanes:forward", "2")));

        assert!(!engine.is_eligible(&Way::new(1, vec![]).with_tag("ref", "8")));
        assert!(!engine.is_eligible(&base().with_tag("ref", "81")));
        assert!(!engine.is_eligible(&base().with_tag("highway", "construction")));
        assert!(!engine.is_eligible(&base().with_tag("oneway", "yes")));
        assert!(!engine.is_eligible(&base().with_tag("junction", "roundabout")));
        assert!(!engine.is_eligible(&base().with_tag("lanes", "3").with_tag("lanes:backward", "1")));
        assert!(!engine.is_eligible(&base().with_tag("lanes", "4").with_tag("lanes:forward", "1")));
        assert!(!engine.is_eligible(&base().with_tag("lanes:backward", "1").with_tag("lanes:forward", "2")));
        assert!(!engine.is_eligible(&base().with_tag("lanes", "4").with_tag("lanes:forward", "1;2")));
    }

    #[test]
    fn test_run_moves_vertices_onto_reference() {
        let reference = north_south();
        let config = quiet_config();
        let engine = ConflationEngine::new(&reference, &config);

        let mut network = Network::new();
        let a = old_vertex(&mut network, 1, 0.0, 0.0001);
        let b = old_vertex(&mut network, 2, 0.0005, 0.0001);
        let c = old_vertex(&mut network, 3, 0.001, 0.0001);
        network.add_way(road(vec![a, b, c])).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let report = engine.run(&mut network, &mut rng, now()).unwrap();

        assert_eq!(report.ways_processed, 1);
        assert_eq!(report.vertices_seen, 3);
        assert_eq!(report.vertices_moved, 1);
        assert_eq!(report.vertices_inserted, 0);
        assert!(network.vertex(b).unwrap().modified);
        assert!(network.vertex(b).unwrap().coord.x.abs() < 1e-12);
        assert!(!network.vertex(a).unwrap().modified);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_run_pulls_tagged_vertex_near_reference_vertex() {
        let reference = north_south();
        let config = quiet_config();
        let engine = ConflationEngine::new(&reference, &config);

        // A crossing ~1.6 m from the reference start, untagged neighbour at the same offset
        let mut network = Network::new();
        let crossing = network.add_vertex(
            Vertex::new(1, latlon(0.00001, 0.00001), last_year(), "mapper").with_tags(true),
        );
        let plain = old_vertex(&mut network, 2, 0.00099, 0.00001);
        network.add_way(road(vec![crossing, plain])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_moved, 1);
        let moved = network.vertex(crossing).unwrap().coord;
        assert!(moved.x.abs() < 1e-12);
        assert!((moved.y - 0.00001).abs() < 1e-12);
        assert_eq!(network.vertex(plain).unwrap().coord, latlon(0.00099, 0.00001));
    }

    #[test]
    fn test_run_skips_ways_leaving_the_corridor() {
        let reference = north_south();
        let config = quiet_config();
        let engine = ConflationEngine::new(&reference, &config);

        let mut network = Network::new();
        let a = old_vertex(&mut network, 1, 0.0, 0.0001);
        let b = old_vertex(&mut network, 2, 0.002, 0.0001);
        let way = network.add_way(road(vec![a, b])).unwrap();
        network
            .add_way(Way::new(5, vec![a, b]).with_tag("highway", "track"))
            .unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.ways_skipped, 1);
        assert_eq!(report.ways_processed, 0);
        assert_eq!(
            report.diagnostics.messages(Severity::Info).next(),
            Some("Way 102 is out of the selected area. Skipped.")
        );
        assert!(!network.way(way).unwrap().modified);
        assert_eq!(network.vertex(a).unwrap().coord, latlon(0.0, 0.0001));
    }

    #[test]
    fn test_run_inserts_vertex_at_corner() {
        // L-shaped reference: north, then east
        let reference = reference(vec![latlon(0.0, 0.0), latlon(0.0004, 0.0), latlon(0.0004, 0.0004)]);
        let config = quiet_config();
        let engine = ConflationEngine::new(&reference, &config);

        // Diagonal way cutting the corner by ~22 m
        let mut network = Network::new();
        let a = old_vertex(&mut network, 1, 0.0, 0.0);
        let b = old_vertex(&mut network, 2, 0.0004, 0.0004);
        let way = network.add_way(road(vec![a, b])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_inserted, 1);
        let vertices = &network.way(way).unwrap().vertices;
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0], a);
        assert_eq!(vertices[2], b);

        let inserted = network.vertex(vertices[1]).unwrap();
        assert!(inserted.is_new);
        assert!(inserted.modified);
        assert!(reference.nearest_segment(inserted.coord).unwrap().distance < 1e-3);
        assert!(network.way(way).unwrap().modified);
    }

    #[test]
    fn test_run_removes_unshared_duplicate() {
        let reference = north_south();
        let config = snapping_config();
        let engine = ConflationEngine::new(&reference, &config);

        // A-B and B-C, where A and B both snap onto (0, 0)
        let mut network = Network::new();
        let a = old_vertex(&mut network, 1, 0.00001, 0.0);
        let b = old_vertex(&mut network, 2, -0.00001, 0.00001);
        let c = old_vertex(&mut network, 3, 0.001, 0.0);
        let ab = network.add_way(road(vec![a, b])).unwrap();
        let bc = network.add_way(road(vec![b, c])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_deleted, 1);
        assert_eq!(report.conflicts, 0);
        assert!(network.vertex(a).is_none());
        assert_eq!(network.way(ab).unwrap().vertices, vec![b]);
        assert_eq!(network.way(bc).unwrap().vertices, vec![b, c]);
        assert_eq!(network.vertex(b).unwrap().coord, latlon(0.0, 0.0));
    }

    #[test]
    fn test_run_reports_shared_duplicate_conflict() {
        let reference = north_south();
        let config = snapping_config();
        let engine = ConflationEngine::new(&reference, &config);

        let mut network = Network::new();
        let b = old_vertex(&mut network, 1, 0.00001, 0.0);
        let d = old_vertex(&mut network, 2, -0.00001, 0.00001);
        let x = old_vertex(&mut network, 3, 0.001, 0.0);
        let y = old_vertex(&mut network, 4, 0.0009, 0.0);
        let bd = network.add_way(road(vec![b, d])).unwrap();
        network.add_way(road(vec![b, x])).unwrap();
        network.add_way(road(vec![d, y])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(report.vertices_deleted, 0);
        assert_eq!(network.way(bd).unwrap().vertices, vec![b, d]);
        assert_eq!(report.diagnostics.messages(Severity::Warning).count(), 1);
    }

    /// Config where snapping is reachable and short edges are still split
    fn fine_snapping_config() -> Config {
        Config {
            min_segment_length: 1.0,
            ..snapping_config()
        }
    }

    #[test]
    fn test_run_skips_insertion_repeating_last_one() {
        let reference = north_south();
        let config = fine_snapping_config();
        let engine = ConflationEngine::new(&reference, &config);

        // Every midpoint between ~9 m south of the start and the start snaps back onto it
        let mut network = Network::new();
        let south = old_vertex(&mut network, 1, -0.00008, 0.0);
        let start = old_vertex(&mut network, 2, 0.0, 0.0);
        let way = network.add_way(road(vec![south, start])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_inserted, 1);
        let warnings: Vec<_> = report.diagnostics.messages(Severity::Warning).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Check 102[1] @ "));
        assert!(warnings[0].ends_with(", it would cause infinite loop."));

        // The inserted copy of the start vertex is the one collapsed
        assert_eq!(report.vertices_deleted, 1);
        assert_eq!(network.way(way).unwrap().vertices, vec![south, start]);
        assert_eq!(network.vertex_count(), 2);
    }

    #[test]
    fn test_run_removes_new_duplicate_in_either_position() {
        let reference = north_south();
        let config = fine_snapping_config();
        let engine = ConflationEngine::new(&reference, &config);

        let mut network = Network::new();
        let south = old_vertex(&mut network, 1, -0.00008, 0.0);
        let start = old_vertex(&mut network, 2, 0.0, 0.0);
        let forward = network.add_way(road(vec![south, start])).unwrap();
        let south2 = old_vertex(&mut network, 3, -0.00008, 0.0);
        let start2 = old_vertex(&mut network, 4, 0.0, 0.0);
        let backward = network.add_way(road(vec![start2, south2])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_inserted, 2);
        assert_eq!(report.vertices_deleted, 2);
        assert_eq!(report.conflicts, 0);
        assert_eq!(network.way(forward).unwrap().vertices, vec![south, start]);
        assert_eq!(network.way(backward).unwrap().vertices, vec![start2, south2]);
        assert!(network.vertices().all(|(_, v)| !v.is_new));
    }

    #[test]
    fn test_run_stops_refining_at_insertion_limit() {
        let reference = north_south();
        let config = quiet_config();
        let engine = ConflationEngine::new(&reference, &config).with_max_insertions(1);

        // From a corner of the corridor, out of reach, to the end of the reference:
        // every split edge keeps a midpoint over max_distance away
        let mut network = Network::new();
        let corner = old_vertex(&mut network, 1, -0.0004, 0.0004);
        let end = old_vertex(&mut network, 2, 0.001, 0.0);
        let way = network.add_way(road(vec![corner, end])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_moved, 0);
        assert_eq!(report.vertices_inserted, 1);
        assert_eq!(network.way(way).unwrap().vertices.len(), 3);
        assert_eq!(
            report.diagnostics.messages(Severity::Warning).next(),
            Some("Way 102 needed more than 1 new nodes, stopped refining it.")
        );

        // Without the limit the same way is refined further
        let mut network = Network::new();
        let corner = old_vertex(&mut network, 1, -0.0004, 0.0004);
        let end = old_vertex(&mut network, 2, 0.001, 0.0);
        network.add_way(road(vec![corner, end])).unwrap();
        let unlimited = ConflationEngine::new(&reference, &config);
        let report = unlimited.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();
        assert!(report.vertices_inserted > 1);
    }

    #[test]
    fn test_run_removes_modified_duplicate_of_untouched_vertex() {
        let reference = north_south();
        let config = snapping_config();
        let engine = ConflationEngine::new(&reference, &config);

        // `snapped` lands on the start vertex where `start` already sits
        let mut network = Network::new();
        let snapped = old_vertex(&mut network, 1, 0.00003, 0.0);
        let start = old_vertex(&mut network, 2, 0.0, 0.0);
        let first = network.add_way(road(vec![snapped, start])).unwrap();
        let snapped2 = old_vertex(&mut network, 3, 0.00003, 0.0);
        let start2 = old_vertex(&mut network, 4, 0.0, 0.0);
        let second = network.add_way(road(vec![start2, snapped2])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_moved, 2);
        assert_eq!(report.vertices_deleted, 2);
        assert_eq!(network.way(first).unwrap().vertices, vec![start]);
        assert_eq!(network.way(second).unwrap().vertices, vec![start2]);
        assert!(network.vertex(snapped).is_none());
        assert!(network.vertex(snapped2).is_none());
    }

    #[test]
    fn test_run_keeps_preexisting_duplicates() {
        let reference = north_south();
        let config = quiet_config();
        let engine = ConflationEngine::new(&reference, &config);

        let mut network = Network::new();
        let a = old_vertex(&mut network, 1, 0.0005, 0.0);
        let b = old_vertex(&mut network, 2, 0.0005, 0.0);
        let way = network.add_way(road(vec![a, b])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.vertices_moved, 0);
        assert_eq!(report.vertices_deleted, 0);
        assert_eq!(report.conflicts, 0);
        assert!(report.diagnostics.is_empty());
        assert_eq!(network.way(way).unwrap().vertices, vec![a, b]);
        assert!(!network.way(way).unwrap().modified);
    }

    #[test]
    fn test_second_run_does_not_scatter_again() {
        let reference = north_south();
        let config = Config {
            variance: 0.2,
            ..Config::default()
        };
        let engine = ConflationEngine::new(&reference, &config);

        let mut network = Network::new();
        let a = old_vertex(&mut network, 1, 0.0, 0.0);
        let b = old_vertex(&mut network, 2, 0.0005, 0.0001);
        let c = old_vertex(&mut network, 3, 0.001, 0.0);
        network.add_way(road(vec![a, b, c])).unwrap();

        // Flagged as edited in the loaded data, on a way no run processes
        let mut edited = Vertex::new(4, latlon(0.0005, 0.0003), last_year(), "mapper");
        edited.modified = true;
        let edited = network.add_vertex(edited);
        network
            .add_way(Way::new(5, vec![edited]).with_tag("highway", "track"))
            .unwrap();

        engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();
        let first: Vec<_> = network.vertices().map(|(id, v)| (id, v.coord)).collect();
        assert_eq!(network.vertex(edited).unwrap().coord, latlon(0.0005, 0.0003));

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(2), now()).unwrap();
        let second: Vec<_> = network.vertices().map(|(id, v)| (id, v.coord)).collect();

        assert_eq!(report.vertices_moved, 0);
        assert_eq!(report.vertices_inserted, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_recent_edits_warning() {
        let reference = north_south();
        let config = quiet_config();
        let engine = ConflationEngine::new(&reference, &config);

        let recent = now() - Duration::hours(1);
        let mut network = Network::new();
        let a = network.add_vertex(Vertex::new(1, latlon(0.0, 0.0), recent, "bob"));
        let b = network.add_vertex(Vertex::new(2, latlon(0.0005, 0.0), recent, "alice"));
        let c = network.add_vertex(Vertex::new(3, latlon(0.0008, 0.0), recent, "bob"));
        let d = old_vertex(&mut network, 4, 0.001, 0.0);
        network.add_way(road(vec![a, b, c, d])).unwrap();

        let report = engine.run(&mut network, &mut StdRng::seed_from_u64(1), now()).unwrap();

        assert_eq!(report.fresh_vertices, 3);
        assert_eq!(
            report.diagnostics.messages(Severity::Warning).next(),
            Some("3 of 4 nodes were recently modified by bob (2), alice (1)")
        );
    }

    #[test]
    fn test_scatter_is_bounded_and_seeded() {
        let reference = north_south();
        let config = Config {
            variance: 0.2,
            ..Config::default()
        };
        let engine = ConflationEngine::new(&reference, &config);

        let build = || {
            let mut network = Network::new();
            let a = old_vertex(&mut network, 1, 0.0, 0.0);
            let b = old_vertex(&mut network, 2, 0.0005, 0.0001);
            let c = old_vertex(&mut network, 3, 0.001, 0.0);
            network.add_way(road(vec![a, b, c])).unwrap();
            (network, a, b)
        };

        let (mut first, a, b) = build();
        let (mut second, _, _) = build();
        engine.run(&mut first, &mut StdRng::seed_from_u64(42), now()).unwrap();
        engine.run(&mut second, &mut StdRng::seed_from_u64(42), now()).unwrap();

        // Untouched vertices stay exactly where they were
        assert_eq!(first.vertex(a).unwrap().coord, latlon(0.0, 0.0));

        let scattered = first.vertex(b).unwrap().coord;
        let offset = geomath::distance(scattered, latlon(0.0005, 0.0));
        assert!(offset <= 0.2 + 1e-6);
        assert_eq!(scattered, second.vertex(b).unwrap().coord);
    }
}
