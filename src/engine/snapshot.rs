// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BTreeSet, HashMap};

use crate::geometry::{project_onto_polyline, AABox, Heading, Point2D};
use crate::index::SpatialIndex;
use crate::model::{Crosswalk, ElementKind, Junction, Lane, Map, Road, Signal, StopSign};
use crate::store::{MapStore, Record, Table};

/// Position of a point relative to a [Lane].
///
/// `L` is `&Lane` for results borrowed from a [Snapshot], and an owned [Lane]
/// for results returned by [HdMap](crate::HdMap).
#[derive(Debug, Clone, PartialEq)]
pub struct LaneProjection<L = Lane> {
    pub lane: L,

    /// Unsigned distance from the point to the lane centerline.
    pub distance: f64,

    /// Arc length along the centerline of the point closest to the query point,
    /// within `[0, lane.length()]`.
    pub s: f64,

    /// Signed lateral offset from the centerline, positive to the left of travel.
    pub l: f64,

    /// Heading of the centerline at the closest point.
    pub heading: Heading,
}

impl LaneProjection<&Lane> {
    /// Converts a borrowed projection into an owned one.
    pub fn cloned(&self) -> LaneProjection {
        LaneProjection {
            lane: self.lane.clone(),
            distance: self.distance,
            s: self.s,
            l: self.l,
            heading: self.heading,
        }
    }
}

/// An immutable, fully indexed map, answering all spatial queries.
///
/// Snapshots are created by [HdMap](crate::HdMap) on every successful load,
/// and can be held on to while other threads load different maps.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    store: MapStore,
    index: SpatialIndex,
}

impl Snapshot {
    /// Builds the [MapStore] and the [SpatialIndex] over a map dataset.
    pub fn new(map: Map) -> Self {
        let store = MapStore::new(map);
        let index = SpatialIndex::build(&store);
        Self { store, index }
    }

    pub fn store(&self) -> &MapStore {
        &self.store
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Extracts the part of the map inside the rectangle `[x ± range_x] × [y ± range_y]`
    /// (edges included).
    ///
    /// The result contains every lane, junction, signal, stop sign and crosswalk
    /// whose geometry intersects the rectangle, every road with at least one such lane,
    /// every overlap referring to at least one included record, and the dataset header.
    /// Records are ordered by id. Returns `None` if nothing intersects the rectangle.
    pub fn get_local_map(&self, x: f64, y: f64, range_x: f64, range_y: f64) -> Option<Map> {
        let rect = AABox::from_center(Point2D::new(x, y), range_x, range_y);
        let s = &self.store;

        let lanes = self.index.box_query(s, ElementKind::Lane, rect);
        let junctions = self.index.box_query(s, ElementKind::Junction, rect);
        let signals = self.index.box_query(s, ElementKind::Signal, rect);
        let stop_signs = self.index.box_query(s, ElementKind::StopSign, rect);
        let crosswalks = self.index.box_query(s, ElementKind::Crosswalk, rect);

        if lanes.is_empty()
            && junctions.is_empty()
            && signals.is_empty()
            && stop_signs.is_empty()
            && crosswalks.is_empty()
        {
            return None;
        }

        let roads: BTreeSet<usize> = lanes
            .iter()
            .flat_map(|&lane| s.roads_of_lane(lane).iter().copied())
            .collect();

        let mut overlaps = BTreeSet::new();
        let mut add_overlaps = |kind: ElementKind, id: &str| {
            overlaps.extend(s.overlaps_of(kind, id).iter().copied());
        };
        lanes.iter().for_each(|&p| add_overlaps(ElementKind::Lane, s.lanes().at(p).id()));
        junctions.iter().for_each(|&p| add_overlaps(ElementKind::Junction, s.junctions().at(p).id()));
        signals.iter().for_each(|&p| add_overlaps(ElementKind::Signal, s.signals().at(p).id()));
        stop_signs.iter().for_each(|&p| add_overlaps(ElementKind::StopSign, s.stop_signs().at(p).id()));
        crosswalks.iter().for_each(|&p| add_overlaps(ElementKind::Crosswalk, s.crosswalks().at(p).id()));
        roads.iter().for_each(|&p| add_overlaps(ElementKind::Road, s.roads().at(p).id()));

        Some(Map {
            header: s.header().clone(),
            lanes: clone_at(s.lanes(), lanes),
            junctions: clone_at(s.junctions(), junctions),
            roads: clone_at(s.roads(), roads),
            signals: clone_at(s.signals(), signals),
            stop_signs: clone_at(s.stop_signs(), stop_signs),
            crosswalks: clone_at(s.crosswalks(), crosswalks),
            overlaps: clone_at(s.overlaps(), overlaps),
        })
    }

    /// Finds the lane with the centerline closest to `(x, y)`, with ties broken by
    /// the lowest id. Returns `None` only if the map has no lanes.
    pub fn get_nearest_lane(&self, x: f64, y: f64) -> Option<LaneProjection<&Lane>> {
        let p = Point2D::new(x, y);
        let (pos, _, _) = self
            .index
            .nearest_query(&self.store, ElementKind::Lane, p, f64::INFINITY)?;
        project(self.store.lanes().at(pos), p)
    }

    /// Finds all lanes with the centerline no further than `distance` from `(x, y)`,
    /// whose heading at the closest point differs from `central_heading` by at most
    /// `max_heading_difference` (radians, with wraparound).
    ///
    /// Results are ordered by ascending distance, ties broken by id.
    pub fn get_lanes_with_heading(
        &self,
        x: f64,
        y: f64,
        distance: f64,
        central_heading: f64,
        max_heading_difference: f64,
    ) -> Vec<LaneProjection<&Lane>> {
        let p = Point2D::new(x, y);
        let central_heading = Heading::new(central_heading);

        self.index
            .range_query(&self.store, ElementKind::Lane, p, distance)
            .into_iter()
            .filter_map(|(pos, _)| project(self.store.lanes().at(pos), p))
            .filter(|proj| proj.heading.difference(central_heading) <= max_heading_difference)
            .collect()
    }

    /// Returns the first result of [Snapshot::get_lanes_with_heading].
    pub fn get_nearest_lane_with_heading(
        &self,
        x: f64,
        y: f64,
        distance: f64,
        central_heading: f64,
        max_heading_difference: f64,
    ) -> Option<LaneProjection<&Lane>> {
        self.get_lanes_with_heading(x, y, distance, central_heading, max_heading_difference)
            .into_iter()
            .next()
    }

    /// Finds all junctions no further than `distance` from `(x, y)`. Points inside
    /// a junction polygon are at distance zero. Results are ordered by ascending
    /// distance, ties broken by id.
    pub fn get_junctions(&self, x: f64, y: f64, distance: f64) -> Vec<&Junction> {
        self.in_range(ElementKind::Junction, self.store.junctions(), x, y, distance)
    }

    /// Finds all lanes with the centerline no further than `distance` from `(x, y)`,
    /// ordered by ascending distance, ties broken by id.
    pub fn get_lanes(&self, x: f64, y: f64, distance: f64) -> Vec<&Lane> {
        self.in_range(ElementKind::Lane, self.store.lanes(), x, y, distance)
    }

    /// Finds all roads containing at least one lane no further than `distance` from `(x, y)`,
    /// ordered by the distance to the closest such lane, ties broken by id.
    pub fn get_roads(&self, x: f64, y: f64, distance: f64) -> Vec<&Road> {
        let lanes = self.index.range_query(
            &self.store,
            ElementKind::Lane,
            Point2D::new(x, y),
            distance,
        );

        let mut closest: HashMap<usize, f64> = HashMap::new();
        for (lane, d) in lanes {
            for &road in self.store.roads_of_lane(lane) {
                // Lanes come ordered by distance, so the first hit is the closest one
                closest.entry(road).or_insert(d);
            }
        }

        let mut roads: Vec<(usize, f64)> = closest.into_iter().collect();
        roads.sort_by(|(a_pos, a_dist), (b_pos, b_dist)| {
            a_dist.total_cmp(b_dist).then_with(|| a_pos.cmp(b_pos))
        });
        roads
            .into_iter()
            .map(|(pos, _)| self.store.roads().at(pos))
            .collect()
    }

    /// Finds all signals with the boundary or a stop line no further than `distance`
    /// from `(x, y)`, ordered by ascending distance, ties broken by id.
    pub fn get_signals(&self, x: f64, y: f64, distance: f64) -> Vec<&Signal> {
        self.in_range(ElementKind::Signal, self.store.signals(), x, y, distance)
    }

    /// Finds all stop signs with a stop line no further than `distance` from `(x, y)`,
    /// ordered by ascending distance, ties broken by id.
    pub fn get_stop_signs(&self, x: f64, y: f64, distance: f64) -> Vec<&StopSign> {
        self.in_range(ElementKind::StopSign, self.store.stop_signs(), x, y, distance)
    }

    /// Finds all crosswalks no further than `distance` from `(x, y)`,
    /// ordered by ascending distance, ties broken by id.
    pub fn get_crosswalks(&self, x: f64, y: f64, distance: f64) -> Vec<&Crosswalk> {
        self.in_range(ElementKind::Crosswalk, self.store.crosswalks(), x, y, distance)
    }

    fn in_range<'a, T>(
        &'a self,
        kind: ElementKind,
        table: &'a Table<T>,
        x: f64,
        y: f64,
        distance: f64,
    ) -> Vec<&'a T> {
        self.index
            .range_query(&self.store, kind, Point2D::new(x, y), distance)
            .into_iter()
            .map(|(pos, _)| table.at(pos))
            .collect()
    }
}

fn project(lane: &Lane, p: Point2D) -> Option<LaneProjection<&Lane>> {
    let projection = project_onto_polyline(&lane.central_curve, p)?;
    Some(LaneProjection {
        lane,
        distance: projection.distance,
        s: projection.s.clamp(0.0, lane.length()),
        l: projection.l,
        heading: projection.heading,
    })
}

fn clone_at<T: Clone, I: IntoIterator<Item = usize>>(table: &Table<T>, positions: I) -> Vec<T> {
    positions.into_iter().map(|pos| table.at(pos).clone()).collect()
}
