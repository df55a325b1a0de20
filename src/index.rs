// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use crate::geometry::{
    polygon_distance, polygon_intersects_box, polyline_distance, polyline_intersects_box,
    polyline_segments, AABox, Point2D, Segment,
};
use crate::kd::{Entry, KDTree};
use crate::model::ElementKind;
use crate::store::MapStore;

/// Spatial acceleration structure over the geometry of records in a [MapStore].
///
/// The index only stores record positions and bounding boxes - exact geometry is
/// always read back from the store it was built from, which must be passed to every query.
///
/// Indexed geometry, per kind:
/// - lanes: every centerline segment,
/// - junctions and crosswalks: the polygon,
/// - signals: the boundary polygon (part 0) and every stop line (parts 1..),
/// - stop signs: every stop line.
///
/// Roads have no geometry of their own and are not indexed.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    lanes: Option<KDTree>,
    junctions: Option<KDTree>,
    signals: Option<KDTree>,
    stop_signs: Option<KDTree>,
    crosswalks: Option<KDTree>,
}

impl SpatialIndex {
    /// Builds the index over all records of a store.
    pub fn build(store: &MapStore) -> Self {
        let mut lanes = Vec::new();
        for (owner, lane) in store.lanes().iter().enumerate() {
            if lane.central_curve.is_empty() {
                log::warn!("lane {}: no centerline points, not indexed", lane.id);
            }
            lanes.extend(
                polyline_segments(&lane.central_curve)
                    .enumerate()
                    .map(|(part, segment)| Entry {
                        owner,
                        part,
                        bounds: segment.bounding_box(),
                    }),
            );
        }

        let mut junctions = Vec::new();
        for (owner, junction) in store.junctions().iter().enumerate() {
            match AABox::from_points(&junction.polygon) {
                Some(bounds) => junctions.push(Entry {
                    owner,
                    part: 0,
                    bounds,
                }),
                None => log::warn!("junction {}: empty polygon, not indexed", junction.id),
            }
        }

        let mut crosswalks = Vec::new();
        for (owner, crosswalk) in store.crosswalks().iter().enumerate() {
            match AABox::from_points(&crosswalk.polygon) {
                Some(bounds) => crosswalks.push(Entry {
                    owner,
                    part: 0,
                    bounds,
                }),
                None => log::warn!("crosswalk {}: empty polygon, not indexed", crosswalk.id),
            }
        }

        let mut signals = Vec::new();
        for (owner, signal) in store.signals().iter().enumerate() {
            if let Some(bounds) = AABox::from_points(&signal.boundary) {
                signals.push(Entry {
                    owner,
                    part: 0,
                    bounds,
                });
            }
            signals.extend(stop_line_entries(owner, 1, &signal.stop_lines));
        }

        let mut stop_signs = Vec::new();
        for (owner, stop_sign) in store.stop_signs().iter().enumerate() {
            stop_signs.extend(stop_line_entries(owner, 0, &stop_sign.stop_lines));
        }

        log::debug!(
            "building spatial index: {} lane segments, {} junctions, {} signal parts, {} stop lines, {} crosswalks",
            lanes.len(),
            junctions.len(),
            signals.len(),
            stop_signs.len(),
            crosswalks.len(),
        );

        Self {
            lanes: KDTree::build(&mut lanes),
            junctions: KDTree::build(&mut junctions),
            signals: KDTree::build(&mut signals),
            stop_signs: KDTree::build(&mut stop_signs),
            crosswalks: KDTree::build(&mut crosswalks),
        }
    }

    fn tree(&self, kind: ElementKind) -> Option<&KDTree> {
        match kind {
            ElementKind::Lane => self.lanes.as_ref(),
            ElementKind::Junction => self.junctions.as_ref(),
            ElementKind::Signal => self.signals.as_ref(),
            ElementKind::StopSign => self.stop_signs.as_ref(),
            ElementKind::Crosswalk => self.crosswalks.as_ref(),
            ElementKind::Road => None,
        }
    }

    /// Returns `true` if no geometry of the given kind is indexed.
    pub fn is_empty(&self, kind: ElementKind) -> bool {
        self.tree(kind).is_none()
    }

    /// Returns the number of indexed geometric parts of the given kind.
    pub fn parts(&self, kind: ElementKind) -> usize {
        self.tree(kind).map_or(0, KDTree::len)
    }

    /// Returns the bounding box of all indexed geometry, or `None` for an empty index.
    pub fn extent(&self) -> Option<AABox> {
        [
            &self.lanes,
            &self.junctions,
            &self.signals,
            &self.stop_signs,
            &self.crosswalks,
        ]
        .into_iter()
        .flatten()
        .map(KDTree::bounds)
        .reduce(AABox::union)
    }

    /// Finds all records of a given kind whose geometry lies within `radius` (inclusive)
    /// of `center`. Returns store positions with distances, ordered by ascending distance,
    /// ties broken by ascending position (and thus id).
    pub fn range_query(
        &self,
        store: &MapStore,
        kind: ElementKind,
        center: Point2D,
        radius: f64,
    ) -> Vec<(usize, f64)> {
        let Some(tree) = self.tree(kind) else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        tree.find_within(
            center,
            radius,
            &|e: &Entry| part_distance(store, kind, e, center),
            &mut hits,
        );

        // Reduce to the closest part of every record
        let mut closest: HashMap<usize, f64> = HashMap::with_capacity(hits.len());
        for (entry, d) in hits {
            closest
                .entry(entry.owner)
                .and_modify(|best| *best = best.min(d))
                .or_insert(d);
        }

        let mut result: Vec<(usize, f64)> = closest.into_iter().collect();
        result.sort_by(|(a_pos, a_dist), (b_pos, b_dist)| {
            a_dist.total_cmp(b_dist).then_with(|| a_pos.cmp(b_pos))
        });
        result
    }

    /// Finds the single record of a given kind closest to `point`, no further than
    /// `max_distance`. Ties are broken by ascending position (and thus id).
    ///
    /// Returns the record's store position, the index of its closest geometric part,
    /// and the distance.
    pub fn nearest_query(
        &self,
        store: &MapStore,
        kind: ElementKind,
        point: Point2D,
        max_distance: f64,
    ) -> Option<(usize, usize, f64)> {
        self.tree(kind)?
            .find_nearest(point, max_distance, &|e: &Entry| {
                part_distance(store, kind, e, point)
            })
            .map(|(entry, d)| (entry.owner, entry.part, d))
    }

    /// Finds all records of a given kind whose geometry intersects `rect`.
    /// Returns store positions in ascending order.
    pub fn box_query(&self, store: &MapStore, kind: ElementKind, rect: AABox) -> Vec<usize> {
        let Some(tree) = self.tree(kind) else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        tree.find_intersecting(
            rect,
            &|e: &Entry| part_intersects(store, kind, e, rect),
            &mut hits,
        );

        let mut result: Vec<usize> = hits.into_iter().map(|e| e.owner).collect();
        result.sort_unstable();
        result.dedup();
        result
    }
}

fn stop_line_entries(
    owner: usize,
    first_part: usize,
    stop_lines: &[Vec<Point2D>],
) -> impl Iterator<Item = Entry> + '_ {
    stop_lines
        .iter()
        .enumerate()
        .filter_map(move |(i, line)| {
            AABox::from_points(line).map(|bounds| Entry {
                owner,
                part: first_part + i,
                bounds,
            })
        })
}

/// Returns the centerline segment of a lane with the given index.
pub(crate) fn lane_segment(curve: &[Point2D], part: usize) -> Segment {
    if curve.len() == 1 {
        Segment::new(curve[0], curve[0])
    } else {
        Segment::new(curve[part], curve[part + 1])
    }
}

fn part_distance(store: &MapStore, kind: ElementKind, e: &Entry, p: Point2D) -> f64 {
    match kind {
        ElementKind::Lane => {
            lane_segment(&store.lanes().at(e.owner).central_curve, e.part).distance_to(p)
        }
        ElementKind::Junction => polygon_distance(&store.junctions().at(e.owner).polygon, p),
        ElementKind::Crosswalk => polygon_distance(&store.crosswalks().at(e.owner).polygon, p),
        ElementKind::Signal => {
            let signal = store.signals().at(e.owner);
            match e.part {
                0 => polygon_distance(&signal.boundary, p),
                n => polyline_distance(&signal.stop_lines[n - 1], p),
            }
        }
        ElementKind::StopSign => {
            polyline_distance(&store.stop_signs().at(e.owner).stop_lines[e.part], p)
        }
        ElementKind::Road => f64::INFINITY,
    }
}

fn part_intersects(store: &MapStore, kind: ElementKind, e: &Entry, rect: AABox) -> bool {
    match kind {
        ElementKind::Lane => {
            let s = lane_segment(&store.lanes().at(e.owner).central_curve, e.part);
            rect.intersects_segment(s.start, s.end)
        }
        ElementKind::Junction => {
            polygon_intersects_box(&store.junctions().at(e.owner).polygon, rect)
        }
        ElementKind::Crosswalk => {
            polygon_intersects_box(&store.crosswalks().at(e.owner).polygon, rect)
        }
        ElementKind::Signal => {
            let signal = store.signals().at(e.owner);
            match e.part {
                0 => polygon_intersects_box(&signal.boundary, rect),
                n => polyline_intersects_box(&signal.stop_lines[n - 1], rect),
            }
        }
        ElementKind::StopSign => {
            polyline_intersects_box(&store.stop_signs().at(e.owner).stop_lines[e.part], rect)
        }
        ElementKind::Road => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Junction, Lane, Map, StopSign};

    fn lane(id: &str, points: &[(f64, f64)]) -> Lane {
        Lane {
            id: id.to_string(),
            central_curve: points.iter().map(|&(x, y)| Point2D::new(x, y)).collect(),
            ..Default::default()
        }
    }

    fn sample_store() -> MapStore {
        MapStore::new(Map {
            lanes: vec![
                lane("b", &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]),
                lane("a", &[(0.0, 5.0), (20.0, 5.0)]),
                lane("c", &[(100.0, 100.0)]),
                lane("empty", &[]),
            ],
            junctions: vec![Junction {
                id: "j".to_string(),
                polygon: vec![
                    Point2D::new(30.0, -5.0),
                    Point2D::new(40.0, -5.0),
                    Point2D::new(40.0, 5.0),
                    Point2D::new(30.0, 5.0),
                ],
                ..Default::default()
            }],
            stop_signs: vec![StopSign {
                id: "ss".to_string(),
                stop_lines: vec![vec![Point2D::new(25.0, -2.0), Point2D::new(25.0, 2.0)]],
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[test]
    fn range_query_orders_by_distance_then_id() {
        let store = sample_store();
        let index = SpatialIndex::build(&store);

        // Equidistant from "a" (y=5) and "b" (y=0)
        let hits = index.range_query(&store, ElementKind::Lane, Point2D::new(10.0, 2.5), 2.5);
        let ids: Vec<&str> = hits
            .iter()
            .map(|&(pos, _)| store.lanes().at(pos).id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b"]);

        let hits = index.range_query(&store, ElementKind::Lane, Point2D::new(10.0, 1.0), 5.0);
        let ids: Vec<&str> = hits
            .iter()
            .map(|&(pos, _)| store.lanes().at(pos).id.as_str())
            .collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(hits[0].1, 1.0);
    }

    #[test]
    fn nearest_query() {
        let store = sample_store();
        let index = SpatialIndex::build(&store);

        let (pos, part, d) = index
            .nearest_query(&store, ElementKind::Lane, Point2D::new(15.0, -1.0), f64::INFINITY)
            .unwrap();
        assert_eq!(store.lanes().at(pos).id, "b");
        assert_eq!(part, 1);
        assert_eq!(d, 1.0);

        // Single point lane
        let (pos, _, _) = index
            .nearest_query(&store, ElementKind::Lane, Point2D::new(90.0, 90.0), f64::INFINITY)
            .unwrap();
        assert_eq!(store.lanes().at(pos).id, "c");

        assert!(index
            .nearest_query(&store, ElementKind::Lane, Point2D::new(90.0, 90.0), 1.0)
            .is_none());
        assert!(index
            .nearest_query(&store, ElementKind::Road, Point2D::new(0.0, 0.0), f64::INFINITY)
            .is_none());
    }

    #[test]
    fn junction_distance_is_zero_inside() {
        let store = sample_store();
        let index = SpatialIndex::build(&store);

        let hits = index.range_query(&store, ElementKind::Junction, Point2D::new(35.0, 0.0), 0.0);
        assert_eq!(hits, [(0, 0.0)]);

        let hits = index.range_query(&store, ElementKind::Junction, Point2D::new(45.0, 0.0), 5.0);
        assert_eq!(hits, [(0, 5.0)]);

        let hits = index.range_query(&store, ElementKind::Junction, Point2D::new(45.0, 0.0), 4.9);
        assert!(hits.is_empty());
    }

    #[test]
    fn box_query() {
        let store = sample_store();
        let index = SpatialIndex::build(&store);

        let rect = AABox::from_center(Point2D::new(25.0, 0.0), 1.0, 1.0);
        assert!(index.box_query(&store, ElementKind::Lane, rect).is_empty());
        assert_eq!(index.box_query(&store, ElementKind::StopSign, rect), [0]);

        let rect = AABox::from_center(Point2D::new(19.0, 2.5), 1.0, 2.5);
        let ids: Vec<&str> = index
            .box_query(&store, ElementKind::Lane, rect)
            .into_iter()
            .map(|pos| store.lanes().at(pos).id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn parts_and_extent() {
        let store = sample_store();
        let index = SpatialIndex::build(&store);

        assert_eq!(index.parts(ElementKind::Lane), 4);
        assert_eq!(index.parts(ElementKind::Junction), 1);
        assert_eq!(index.parts(ElementKind::Signal), 0);
        assert_eq!(index.parts(ElementKind::Road), 0);
        assert_eq!(
            index.extent(),
            Some(AABox::new(Point2D::new(0.0, -5.0), Point2D::new(100.0, 100.0))),
        );

        assert_eq!(SpatialIndex::default().extent(), None);
    }
}
