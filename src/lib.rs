// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Read-only spatial queries over high-definition road maps.
//!
//! A map dataset (lanes, junctions, roads, traffic signals, stop signs, crosswalks
//! and the overlaps between them) is loaded from a protobuf or XML file, optionally
//! compressed with gzip or bzip2, into an [HdMap]. Every load builds an immutable
//! [Snapshot]: a [MapStore] with id lookups and resolved references, plus a
//! [SpatialIndex] over the geometry of every record. Queries answer "what is around
//! this point" in planar map coordinates (meters).
//!
//! # Example
//!
//! ```no_run
//! let map = hdmap::HdMap::new();
//! map.load_map_from_file("path/to/base_map.bin")
//!     .expect("failed to load base_map.bin");
//!
//! if let Some(nearest) = map.get_nearest_lane(587_120.0, 4_141_360.0) {
//!     println!(
//!         "nearest lane: {} (s = {:.2}, l = {:.2})",
//!         nearest.lane.id, nearest.s, nearest.l,
//!     );
//! }
//!
//! let junctions = map.get_junctions(587_120.0, 4_141_360.0, 50.0);
//! println!("{} junctions within 50 m", junctions.len());
//! ```

pub mod c;
mod engine;
pub mod geometry;
mod index;
mod kd;
pub mod model;
pub mod reader;
mod store;
pub mod wire;

pub use engine::{HdMap, LaneProjection, LoadError, Snapshot};
pub use geometry::{AABox, Heading, Point2D};
pub use index::SpatialIndex;
pub use model::{
    Crosswalk, ElementKind, Header, Junction, Lane, LaneTurn, LaneType, Map, ObjectRef, Overlap,
    Road, RoadSection, Signal, SignalType, StopSign, WidthSample,
};
pub use reader::{FileFormat, Options};
pub use store::{MapStore, Record, Table};
