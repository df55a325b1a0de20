// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};

use crate::model::{
    Crosswalk, ElementKind, Header, Junction, Lane, Map, Overlap, Road, Signal, StopSign,
};

/// Common interface of all uniquely-identified map records.
pub trait Record {
    /// Human-readable name of the record kind, used in log messages.
    const KIND_NAME: &'static str;

    fn id(&self) -> &str;
}

macro_rules! impl_record {
    ($t:ty, $name:literal) => {
        impl Record for $t {
            const KIND_NAME: &'static str = $name;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

impl_record!(Lane, "lane");
impl_record!(Junction, "junction");
impl_record!(Road, "road");
impl_record!(Signal, "signal");
impl_record!(StopSign, "stop sign");
impl_record!(Crosswalk, "crosswalk");
impl_record!(Overlap, "overlap");

/// All records of a single kind, sorted by id, with expected O(1) lookup by id.
///
/// Records are addressed by their position in the sorted sequence, so comparing
/// positions is equivalent to comparing ids.
#[derive(Debug, Clone)]
pub struct Table<T> {
    records: Vec<T>,
    positions: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            records: Vec::default(),
            positions: HashMap::default(),
        }
    }
}

impl<T: Record> Table<T> {
    /// Builds a table from records in arbitrary order.
    /// If multiple records share an id, only the first one is kept.
    pub fn from_records(records: Vec<T>) -> Self {
        let mut records = records;
        // Stable sort, so that the dedup below keeps the first record with a given id
        records.sort_by(|a, b| a.id().cmp(b.id()));

        let before = records.len();
        records.dedup_by(|later, earlier| later.id() == earlier.id());
        if records.len() != before {
            log::warn!(
                "dropped {} {} record(s) with duplicate ids",
                before - records.len(),
                T::KIND_NAME,
            );
        }

        let positions = records
            .iter()
            .enumerate()
            .map(|(pos, record)| (record.id().to_string(), pos))
            .collect();

        Self { records, positions }
    }

    /// Retrieves a record with the provided id.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    /// Returns the position of a record with the provided id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }
}

impl<T> Table<T> {
    /// Retrieves a record at the provided position.
    ///
    /// Panics if `pos >= self.len()`; positions handed out by the
    /// [SpatialIndex](crate::SpatialIndex) are always valid for the table it was built from.
    pub fn at(&self, pos: usize) -> &T {
        &self.records[pos]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns an iterator over all records, ordered by id.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.records
    }
}

/// Owns all records of a loaded map dataset and provides read-only access to them.
///
/// Every reference between records held by the store resolves - dangling references
/// are removed when the store is built.
#[derive(Debug, Clone, Default)]
pub struct MapStore {
    header: Header,
    lanes: Table<Lane>,
    junctions: Table<Junction>,
    roads: Table<Road>,
    signals: Table<Signal>,
    stop_signs: Table<StopSign>,
    crosswalks: Table<Crosswalk>,
    overlaps: Table<Overlap>,

    /// Positions of roads containing the lane at a given position.
    lane_roads: Vec<Vec<usize>>,

    /// Positions of overlaps referring to a given object.
    object_overlaps: HashMap<(ElementKind, String), Vec<usize>>,
}

impl MapStore {
    /// Builds a store from a map dataset, pruning references to unknown records.
    pub fn new(mut map: Map) -> Self {
        let dangling = prune_dangling_references(&mut map);
        if dangling > 0 {
            log::warn!("removed {dangling} dangling reference(s) from the map");
        }

        let lanes = Table::from_records(map.lanes);
        let junctions = Table::from_records(map.junctions);
        let roads = Table::from_records(map.roads);
        let signals = Table::from_records(map.signals);
        let stop_signs = Table::from_records(map.stop_signs);
        let crosswalks = Table::from_records(map.crosswalks);
        let overlaps = Table::from_records(map.overlaps);

        let mut lane_roads = vec![Vec::default(); lanes.len()];
        for (road_pos, road) in roads.iter().enumerate() {
            for lane_id in road.lane_ids() {
                if let Some(lane_pos) = lanes.position(lane_id) {
                    let entry: &mut Vec<usize> = &mut lane_roads[lane_pos];
                    if entry.last() != Some(&road_pos) {
                        entry.push(road_pos);
                    }
                }
            }
        }

        let mut object_overlaps: HashMap<(ElementKind, String), Vec<usize>> = HashMap::new();
        for (overlap_pos, overlap) in overlaps.iter().enumerate() {
            for object in &overlap.objects {
                let entry = object_overlaps
                    .entry((object.kind, object.id.clone()))
                    .or_default();
                if entry.last() != Some(&overlap_pos) {
                    entry.push(overlap_pos);
                }
            }
        }

        Self {
            header: map.header,
            lanes,
            junctions,
            roads,
            signals,
            stop_signs,
            crosswalks,
            overlaps,
            lane_roads,
            object_overlaps,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn lanes(&self) -> &Table<Lane> {
        &self.lanes
    }

    pub fn junctions(&self) -> &Table<Junction> {
        &self.junctions
    }

    pub fn roads(&self) -> &Table<Road> {
        &self.roads
    }

    pub fn signals(&self) -> &Table<Signal> {
        &self.signals
    }

    pub fn stop_signs(&self) -> &Table<StopSign> {
        &self.stop_signs
    }

    pub fn crosswalks(&self) -> &Table<Crosswalk> {
        &self.crosswalks
    }

    pub fn overlaps(&self) -> &Table<Overlap> {
        &self.overlaps
    }

    pub fn get_lane(&self, id: &str) -> Option<&Lane> {
        self.lanes.get(id)
    }

    pub fn get_junction(&self, id: &str) -> Option<&Junction> {
        self.junctions.get(id)
    }

    pub fn get_road(&self, id: &str) -> Option<&Road> {
        self.roads.get(id)
    }

    pub fn get_signal(&self, id: &str) -> Option<&Signal> {
        self.signals.get(id)
    }

    pub fn get_stop_sign(&self, id: &str) -> Option<&StopSign> {
        self.stop_signs.get(id)
    }

    pub fn get_crosswalk(&self, id: &str) -> Option<&Crosswalk> {
        self.crosswalks.get(id)
    }

    pub fn get_overlap(&self, id: &str) -> Option<&Overlap> {
        self.overlaps.get(id)
    }

    /// Returns the positions (in [MapStore::roads]) of all roads containing the lane
    /// at the provided position (in [MapStore::lanes]), in ascending order.
    pub fn roads_of_lane(&self, lane_pos: usize) -> &[usize] {
        self.lane_roads
            .get(lane_pos)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Returns the positions (in [MapStore::overlaps]) of all overlaps referring to
    /// a specific object, in ascending order.
    pub fn overlaps_of(&self, kind: ElementKind, id: &str) -> &[usize] {
        self.object_overlaps
            .get(&(kind, id.to_string()))
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
            && self.junctions.is_empty()
            && self.roads.is_empty()
            && self.signals.is_empty()
            && self.stop_signs.is_empty()
            && self.crosswalks.is_empty()
            && self.overlaps.is_empty()
    }
}

/// Sets of all record ids present in a [Map], per kind.
struct KnownIds {
    lanes: HashSet<String>,
    junctions: HashSet<String>,
    roads: HashSet<String>,
    signals: HashSet<String>,
    stop_signs: HashSet<String>,
    crosswalks: HashSet<String>,
    overlaps: HashSet<String>,
}

impl KnownIds {
    fn of(map: &Map) -> Self {
        fn ids<T: Record>(records: &[T]) -> HashSet<String> {
            records.iter().map(|r| r.id().to_string()).collect()
        }

        Self {
            lanes: ids(&map.lanes),
            junctions: ids(&map.junctions),
            roads: ids(&map.roads),
            signals: ids(&map.signals),
            stop_signs: ids(&map.stop_signs),
            crosswalks: ids(&map.crosswalks),
            overlaps: ids(&map.overlaps),
        }
    }

    fn of_kind(&self, kind: ElementKind) -> &HashSet<String> {
        match kind {
            ElementKind::Lane => &self.lanes,
            ElementKind::Junction => &self.junctions,
            ElementKind::Signal => &self.signals,
            ElementKind::StopSign => &self.stop_signs,
            ElementKind::Crosswalk => &self.crosswalks,
            ElementKind::Road => &self.roads,
        }
    }
}

/// Helper for removing unresolvable references, counting and logging removals.
struct Pruner<'a> {
    known: &'a KnownIds,
    removed: usize,
}

impl Pruner<'_> {
    fn ids(&mut self, owner: &str, what: &str, ids: &mut Vec<String>, known: &HashSet<String>) {
        ids.retain(|id| {
            let ok = known.contains(id);
            if !ok {
                log::debug!("{owner}: dropping dangling {what} reference {id:?}");
            }
            ok
        });
    }

    fn optional_id(
        &mut self,
        owner: &str,
        what: &str,
        id: &mut Option<String>,
        known: &HashSet<String>,
    ) {
        if let Some(ref_) = id {
            if !known.contains(ref_) {
                log::debug!("{owner}: dropping dangling {what} reference {ref_:?}");
                *id = None;
                self.removed += 1;
            }
        }
    }

    fn count(&mut self, before: usize, after: usize) {
        self.removed += before - after;
    }

    fn lane(&mut self, lane: &mut Lane) {
        let k = self.known;
        let total = |l: &Lane| {
            l.predecessor_ids.len()
                + l.successor_ids.len()
                + l.left_neighbor_ids.len()
                + l.right_neighbor_ids.len()
                + l.overlap_ids.len()
        };
        let before = total(lane);
        let owner = format!("lane {}", lane.id);
        self.ids(&owner, "predecessor", &mut lane.predecessor_ids, &k.lanes);
        self.ids(&owner, "successor", &mut lane.successor_ids, &k.lanes);
        self.ids(&owner, "left neighbor", &mut lane.left_neighbor_ids, &k.lanes);
        self.ids(&owner, "right neighbor", &mut lane.right_neighbor_ids, &k.lanes);
        self.ids(&owner, "overlap", &mut lane.overlap_ids, &k.overlaps);
        self.count(before, total(lane));
        self.optional_id(&owner, "junction", &mut lane.junction_id, &k.junctions);
    }

    fn junction(&mut self, junction: &mut Junction) {
        let k = self.known;
        let before = junction.lane_ids.len() + junction.overlap_ids.len();
        let owner = format!("junction {}", junction.id);
        self.ids(&owner, "lane", &mut junction.lane_ids, &k.lanes);
        self.ids(&owner, "overlap", &mut junction.overlap_ids, &k.overlaps);
        self.count(before, junction.lane_ids.len() + junction.overlap_ids.len());
    }

    fn road(&mut self, road: &mut Road) {
        let k = self.known;
        let owner = format!("road {}", road.id);
        self.optional_id(&owner, "junction", &mut road.junction_id, &k.junctions);
        for section in &mut road.sections {
            let before = section.lane_ids.len();
            self.ids(&owner, "lane", &mut section.lane_ids, &k.lanes);
            self.count(before, section.lane_ids.len());
        }
    }

    fn overlap_ids(&mut self, owner: String, ids: &mut Vec<String>) {
        let k = self.known;
        let before = ids.len();
        self.ids(&owner, "overlap", ids, &k.overlaps);
        self.count(before, ids.len());
    }

    fn overlap(&mut self, overlap: &mut Overlap) {
        let k = self.known;
        let before = overlap.objects.len();
        let owner = &overlap.id;
        overlap.objects.retain(|object| {
            let ok = k.of_kind(object.kind).contains(&object.id);
            if !ok {
                log::debug!(
                    "overlap {owner}: dropping dangling {} reference {:?}",
                    object.kind,
                    object.id,
                );
            }
            ok
        });
        self.count(before, overlap.objects.len());
    }
}

/// Removes all references to records not present in the map.
/// Returns the number of removed references.
fn prune_dangling_references(map: &mut Map) -> usize {
    let known = KnownIds::of(map);
    let mut p = Pruner {
        known: &known,
        removed: 0,
    };

    map.lanes.iter_mut().for_each(|l| p.lane(l));
    map.junctions.iter_mut().for_each(|j| p.junction(j));
    map.roads.iter_mut().for_each(|r| p.road(r));
    for s in &mut map.signals {
        p.overlap_ids(format!("signal {}", s.id), &mut s.overlap_ids);
    }
    for s in &mut map.stop_signs {
        p.overlap_ids(format!("stop sign {}", s.id), &mut s.overlap_ids);
    }
    for c in &mut map.crosswalks {
        p.overlap_ids(format!("crosswalk {}", c.id), &mut c.overlap_ids);
    }
    map.overlaps.iter_mut().for_each(|o| p.overlap(o));

    p.removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2D;
    use crate::model::{ObjectRef, RoadSection};

    fn lane(id: &str) -> Lane {
        Lane {
            id: id.to_string(),
            central_curve: vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 0.0)],
            ..Default::default()
        }
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn table_lookup_and_order() {
        let t = Table::from_records(vec![lane("c"), lane("a"), lane("b")]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(t.position("b"), Some(1));
        assert_eq!(t.get("c").map(|l| l.id.as_str()), Some("c"));
        assert!(t.get("d").is_none());
        assert!(t.contains("a"));
        assert!(!t.contains("d"));
        assert_eq!(t.as_slice()[2].id, "c");
    }

    #[test]
    fn table_keeps_first_duplicate() {
        let mut first = lane("a");
        first.speed_limit = 10.0;
        let mut second = lane("a");
        second.speed_limit = 20.0;

        let t = Table::from_records(vec![first, second]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get("a").unwrap().speed_limit, 10.0);
    }

    #[test]
    fn dangling_references_are_pruned() {
        let mut a = lane("a");
        a.successor_ids = strings(&["b", "missing"]);
        a.predecessor_ids = strings(&["ghost"]);
        a.junction_id = Some("no_such_junction".to_string());
        a.overlap_ids = strings(&["o1", "o2"]);

        let map = Map {
            lanes: vec![a, lane("b")],
            junctions: vec![Junction {
                id: "j1".to_string(),
                lane_ids: strings(&["a", "zzz"]),
                ..Default::default()
            }],
            roads: vec![Road {
                id: "r1".to_string(),
                junction_id: Some("j1".to_string()),
                sections: vec![RoadSection {
                    id: "r1s1".to_string(),
                    lane_ids: strings(&["b", "nope"]),
                }],
            }],
            overlaps: vec![Overlap {
                id: "o1".to_string(),
                objects: vec![
                    ObjectRef {
                        id: "a".to_string(),
                        kind: ElementKind::Lane,
                    },
                    ObjectRef {
                        id: "a".to_string(),
                        kind: ElementKind::Crosswalk,
                    },
                ],
            }],
            ..Default::default()
        };

        let store = MapStore::new(map);

        let a = store.get_lane("a").unwrap();
        assert_eq!(a.successor_ids, ["b"]);
        assert!(a.predecessor_ids.is_empty());
        assert_eq!(a.junction_id, None);
        assert_eq!(a.overlap_ids, ["o1"]);

        assert_eq!(store.get_junction("j1").unwrap().lane_ids, ["a"]);

        let r1 = store.get_road("r1").unwrap();
        assert_eq!(r1.junction_id.as_deref(), Some("j1"));
        assert_eq!(r1.lane_ids().collect::<Vec<_>>(), ["b"]);

        let o1 = store.get_overlap("o1").unwrap();
        assert_eq!(o1.objects.len(), 1);
        assert_eq!(o1.objects[0].kind, ElementKind::Lane);
    }

    #[test]
    fn reverse_lookups() {
        let map = Map {
            lanes: vec![lane("a"), lane("b")],
            roads: vec![Road {
                id: "r1".to_string(),
                junction_id: None,
                sections: vec![RoadSection {
                    id: "s".to_string(),
                    lane_ids: strings(&["b"]),
                }],
            }],
            overlaps: vec![Overlap {
                id: "o1".to_string(),
                objects: vec![ObjectRef {
                    id: "a".to_string(),
                    kind: ElementKind::Lane,
                }],
            }],
            ..Default::default()
        };

        let store = MapStore::new(map);
        assert!(store.roads_of_lane(0).is_empty());
        assert_eq!(store.roads_of_lane(1), [0]);
        assert_eq!(store.overlaps_of(ElementKind::Lane, "a"), [0]);
        assert!(store.overlaps_of(ElementKind::Junction, "a").is_empty());
    }
}
