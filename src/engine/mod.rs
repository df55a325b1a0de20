// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::{Crosswalk, ElementKind, Junction, Lane, Map, Overlap, Road, Signal, StopSign};
use crate::reader::{self, FileFormat, Options};

mod error;
mod snapshot;

pub use error::LoadError;
pub use snapshot::{LaneProjection, Snapshot};

/// HdMap owns the currently loaded map and answers queries against it.
///
/// Loading builds a new [Snapshot] and atomically replaces the previous one.
/// Queries running concurrently with a load keep using the snapshot they started
/// with. Before the first successful load, all queries return empty results.
///
/// Query methods on HdMap return owned copies of records; use [HdMap::snapshot]
/// to run multiple queries against the same snapshot without copying.
#[derive(Debug, Default)]
pub struct HdMap {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl HdMap {
    /// Creates an HdMap with no map loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a map has been successfully loaded.
    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns the currently loaded [Snapshot], if any.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Loads a map dataset from a file, guessing its format from the file name
    /// and the content.
    pub fn load_map_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), LoadError> {
        self.load_map_from_file_with_options(path, &Options::default())
    }

    /// Loads a map dataset from a file, as per the provided [Options].
    /// With [FileFormat::Unknown], the format is guessed from the file name first.
    pub fn load_map_from_file_with_options<P: AsRef<Path>>(
        &self,
        path: P,
        options: &Options,
    ) -> Result<(), LoadError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| LoadError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;

        let mut options = *options;
        if options.file_format == FileFormat::Unknown {
            options.file_format = FileFormat::from_path(path);
        }

        log::debug!("loading map from {}", path.display());
        self.load_map_from_buffer(&data, &options)
    }

    /// Loads a map dataset from a static buffer, as per the provided [Options].
    pub fn load_map_from_buffer(&self, data: &[u8], options: &Options) -> Result<(), LoadError> {
        let map = reader::read_map_from_buffer(data, options)?;
        self.load_map(map);
        Ok(())
    }

    /// Indexes an in-memory map dataset and makes it the current one.
    pub fn load_map(&self, map: Map) {
        let snapshot = Arc::new(Snapshot::new(map));
        let store = snapshot.store();
        log::info!(
            "loaded map: {} lanes, {} junctions, {} roads, {} signals, {} stop signs, {} crosswalks, {} overlaps",
            store.lanes().len(),
            store.junctions().len(),
            store.roads().len(),
            store.signals().len(),
            store.stop_signs().len(),
            store.crosswalks().len(),
            store.overlaps().len(),
        );
        if let Some(extent) = snapshot.index().extent() {
            log::debug!(
                "map extent: ({}, {}) - ({}, {}), {} lane segments indexed",
                extent.min.x,
                extent.min.y,
                extent.max.x,
                extent.max.y,
                snapshot.index().parts(ElementKind::Lane),
            );
        }

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    fn query<T: Default, F: FnOnce(&Snapshot) -> T>(&self, f: F) -> T {
        self.snapshot().map(|s| f(&s)).unwrap_or_default()
    }

    /// See [Snapshot::get_local_map].
    pub fn get_local_map(&self, x: f64, y: f64, range_x: f64, range_y: f64) -> Option<Map> {
        self.query(|s| s.get_local_map(x, y, range_x, range_y))
    }

    /// See [Snapshot::get_nearest_lane].
    pub fn get_nearest_lane(&self, x: f64, y: f64) -> Option<LaneProjection> {
        self.query(|s| s.get_nearest_lane(x, y).map(|p| p.cloned()))
    }

    /// See [Snapshot::get_lanes_with_heading].
    pub fn get_lanes_with_heading(
        &self,
        x: f64,
        y: f64,
        distance: f64,
        central_heading: f64,
        max_heading_difference: f64,
    ) -> Vec<LaneProjection> {
        self.query(|s| {
            s.get_lanes_with_heading(x, y, distance, central_heading, max_heading_difference)
                .iter()
                .map(LaneProjection::cloned)
                .collect()
        })
    }

    /// See [Snapshot::get_nearest_lane_with_heading].
    pub fn get_nearest_lane_with_heading(
        &self,
        x: f64,
        y: f64,
        distance: f64,
        central_heading: f64,
        max_heading_difference: f64,
    ) -> Option<LaneProjection> {
        self.query(|s| {
            s.get_nearest_lane_with_heading(x, y, distance, central_heading, max_heading_difference)
                .map(|p| p.cloned())
        })
    }

    /// See [Snapshot::get_junctions].
    pub fn get_junctions(&self, x: f64, y: f64, distance: f64) -> Vec<Junction> {
        self.query(|s| cloned(s.get_junctions(x, y, distance)))
    }

    /// See [Snapshot::get_lanes].
    pub fn get_lanes(&self, x: f64, y: f64, distance: f64) -> Vec<Lane> {
        self.query(|s| cloned(s.get_lanes(x, y, distance)))
    }

    /// See [Snapshot::get_roads].
    pub fn get_roads(&self, x: f64, y: f64, distance: f64) -> Vec<Road> {
        self.query(|s| cloned(s.get_roads(x, y, distance)))
    }

    /// See [Snapshot::get_signals].
    pub fn get_signals(&self, x: f64, y: f64, distance: f64) -> Vec<Signal> {
        self.query(|s| cloned(s.get_signals(x, y, distance)))
    }

    /// See [Snapshot::get_stop_signs].
    pub fn get_stop_signs(&self, x: f64, y: f64, distance: f64) -> Vec<StopSign> {
        self.query(|s| cloned(s.get_stop_signs(x, y, distance)))
    }

    /// See [Snapshot::get_crosswalks].
    pub fn get_crosswalks(&self, x: f64, y: f64, distance: f64) -> Vec<Crosswalk> {
        self.query(|s| cloned(s.get_crosswalks(x, y, distance)))
    }

    pub fn get_lane_by_id(&self, id: &str) -> Option<Lane> {
        self.query(|s| s.store().get_lane(id).cloned())
    }

    pub fn get_junction_by_id(&self, id: &str) -> Option<Junction> {
        self.query(|s| s.store().get_junction(id).cloned())
    }

    pub fn get_road_by_id(&self, id: &str) -> Option<Road> {
        self.query(|s| s.store().get_road(id).cloned())
    }

    pub fn get_signal_by_id(&self, id: &str) -> Option<Signal> {
        self.query(|s| s.store().get_signal(id).cloned())
    }

    pub fn get_stop_sign_by_id(&self, id: &str) -> Option<StopSign> {
        self.query(|s| s.store().get_stop_sign(id).cloned())
    }

    pub fn get_crosswalk_by_id(&self, id: &str) -> Option<Crosswalk> {
        self.query(|s| s.store().get_crosswalk(id).cloned())
    }

    pub fn get_overlap_by_id(&self, id: &str) -> Option<Overlap> {
        self.query(|s| s.store().get_overlap(id).cloned())
    }
}

fn cloned<T: Clone>(records: Vec<&T>) -> Vec<T> {
    records.into_iter().cloned().collect()
}
