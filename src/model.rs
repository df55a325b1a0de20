// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::geometry::{polyline_length, Point2D};

/// Kind of a lane, as far as drivability is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum LaneType {
    #[default]
    None = 1,
    CityDriving = 2,
    Biking = 3,
    Sidewalk = 4,
    Parking = 5,
    Shoulder = 6,
}

/// Maneuver performed by a vehicle following a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum LaneTurn {
    #[default]
    NoTurn = 1,
    LeftTurn = 2,
    RightTurn = 3,
    UTurn = 4,
}

/// Arrangement of lamps of a traffic signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum SignalType {
    #[default]
    Unknown = 1,
    Mix2Horizontal = 2,
    Mix2Vertical = 3,
    Mix3Horizontal = 4,
    Mix3Vertical = 5,
    Single = 6,
}

/// Type of a map element, used by [Overlaps](Overlap) to refer to other records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Lane = 1,
    Junction = 2,
    Signal = 3,
    StopSign = 4,
    Crosswalk = 5,
    Road = 6,
}

macro_rules! impl_enum_conversions {
    ($t:ty, $( $variant:ident = $value:literal, $name:literal ),+ $(,)?) => {
        impl $t {
            pub fn from_i32(value: i32) -> Option<Self> {
                match value {
                    $( $value => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Returns the snake_case name used by the XML dataset format.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( $name => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

impl_enum_conversions!(
    LaneType,
    None = 1, "none",
    CityDriving = 2, "city_driving",
    Biking = 3, "biking",
    Sidewalk = 4, "sidewalk",
    Parking = 5, "parking",
    Shoulder = 6, "shoulder",
);

impl_enum_conversions!(
    LaneTurn,
    NoTurn = 1, "no_turn",
    LeftTurn = 2, "left_turn",
    RightTurn = 3, "right_turn",
    UTurn = 4, "u_turn",
);

impl_enum_conversions!(
    SignalType,
    Unknown = 1, "unknown",
    Mix2Horizontal = 2, "mix_2_horizontal",
    Mix2Vertical = 3, "mix_2_vertical",
    Mix3Horizontal = 4, "mix_3_horizontal",
    Mix3Vertical = 5, "mix_3_vertical",
    Single = 6, "single",
);

impl_enum_conversions!(
    ElementKind,
    Lane = 1, "lane",
    Junction = 2, "junction",
    Signal = 3, "signal",
    StopSign = 4, "stop_sign",
    Crosswalk = 5, "crosswalk",
    Road = 6, "road",
);

/// Lane width at a specific arc-length position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WidthSample {
    pub s: f64,
    pub width: f64,
}

/// Represents a drivable path segment.
///
/// All `*_id(s)` fields are weak references to other records of the same [Map];
/// once loaded into a [MapStore](crate::MapStore) all of them are guaranteed to resolve.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Lane {
    pub id: String,

    /// Ordered centerline points, in the direction of travel.
    pub central_curve: Vec<Point2D>,

    /// Distance from the centerline to the left boundary, sampled along the lane.
    pub left_samples: Vec<WidthSample>,

    /// Distance from the centerline to the right boundary, sampled along the lane.
    pub right_samples: Vec<WidthSample>,

    /// Speed limit in meters per second.
    pub speed_limit: f64,

    pub predecessor_ids: Vec<String>,
    pub successor_ids: Vec<String>,
    pub left_neighbor_ids: Vec<String>,
    pub right_neighbor_ids: Vec<String>,
    pub lane_type: LaneType,
    pub turn: LaneTurn,
    pub junction_id: Option<String>,
    pub overlap_ids: Vec<String>,
}

impl Lane {
    /// Returns the length of the centerline.
    pub fn length(&self) -> f64 {
        polyline_length(&self.central_curve)
    }

    /// Returns the total lane width (left + right) at arc length `s`.
    ///
    /// Widths are linearly interpolated between samples and clamped
    /// to the first/last sample outside of the sampled range.
    /// A lane without samples has zero width.
    pub fn width_at(&self, s: f64) -> f64 {
        interpolate_width(&self.left_samples, s) + interpolate_width(&self.right_samples, s)
    }
}

fn interpolate_width(samples: &[WidthSample], s: f64) -> f64 {
    match samples {
        [] => 0.0,
        [only] => only.width,
        [first, ..] if s <= first.s => first.width,
        [.., last] if s >= last.s => last.width,
        _ => samples
            .windows(2)
            .find(|pair| s >= pair[0].s && s <= pair[1].s)
            .map(|pair| {
                let span = pair[1].s - pair[0].s;
                if span <= 0.0 {
                    pair[0].width
                } else {
                    let t = (s - pair[0].s) / span;
                    pair[0].width + t * (pair[1].width - pair[0].width)
                }
            })
            .unwrap_or_default(),
    }
}

/// An area where multiple roads/lanes meet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Junction {
    pub id: String,
    pub polygon: Vec<Point2D>,
    pub lane_ids: Vec<String>,
    pub overlap_ids: Vec<String>,
}

/// Ordered group of lanes which belong to a part of a [Road].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoadSection {
    pub id: String,
    pub lane_ids: Vec<String>,
}

/// Groups lanes into a road. A road has no geometry on its own -
/// it spans the geometry of its lanes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Road {
    pub id: String,
    pub junction_id: Option<String>,
    pub sections: Vec<RoadSection>,
}

impl Road {
    /// Returns an iterator over the ids of all lanes in all sections of this road.
    pub fn lane_ids(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .flat_map(|section| section.lane_ids.iter().map(String::as_str))
    }
}

/// A traffic light.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signal {
    pub id: String,
    pub boundary: Vec<Point2D>,
    pub stop_lines: Vec<Vec<Point2D>>,
    pub signal_type: SignalType,
    pub overlap_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StopSign {
    pub id: String,
    pub stop_lines: Vec<Vec<Point2D>>,
    pub overlap_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Crosswalk {
    pub id: String,
    pub polygon: Vec<Point2D>,
    pub overlap_ids: Vec<String>,
}

/// Weak reference to a record of a specific kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: String,
    pub kind: ElementKind,
}

/// Marks that the geometry of multiple records overlaps (e.g. a lane and a crosswalk).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Overlap {
    pub id: String,
    pub objects: Vec<ObjectRef>,
}

/// Metadata of a map dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: String,
    pub date: String,

    /// [PROJ](https://proj.org/) definition of the planar coordinate frame.
    pub projection: String,

    pub district: String,
    pub vendor: String,
}

/// A complete or partial map dataset: the input of loading and the output of
/// [local map extraction](crate::Snapshot::get_local_map).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Map {
    pub header: Header,
    pub lanes: Vec<Lane>,
    pub junctions: Vec<Junction>,
    pub roads: Vec<Road>,
    pub signals: Vec<Signal>,
    pub stop_signs: Vec<StopSign>,
    pub crosswalks: Vec<Crosswalk>,
    pub overlaps: Vec<Overlap>,
}

impl Map {
    /// Returns `true` if the map contains no records (the header is ignored).
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

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_almost_eq {
        ($a:expr, $b:expr) => {
            assert!(
                (($a - $b).abs() < 1e-9),
                "assertion failed: {} ≈ {}",
                $a,
                $b
            )
        };
    }

    #[test]
    fn lane_width_interpolation() {
        let lane = Lane {
            id: "l1".to_string(),
            central_curve: vec![Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0)],
            left_samples: vec![
                WidthSample { s: 0.0, width: 1.0 },
                WidthSample { s: 10.0, width: 2.0 },
            ],
            right_samples: vec![WidthSample { s: 0.0, width: 1.5 }],
            ..Default::default()
        };

        assert_almost_eq!(lane.length(), 10.0);
        assert_almost_eq!(lane.width_at(-1.0), 2.5);
        assert_almost_eq!(lane.width_at(5.0), 3.0);
        assert_almost_eq!(lane.width_at(20.0), 3.5);
        assert_almost_eq!(Lane::default().width_at(1.0), 0.0);
    }

    #[test]
    fn enum_names() {
        assert_eq!(LaneTurn::from_name("u_turn"), Some(LaneTurn::UTurn));
        assert_eq!(LaneType::from_i32(2), Some(LaneType::CityDriving));
        assert_eq!(ElementKind::from_i32(0), None);
        assert_eq!(SignalType::Mix3Vertical.to_string(), "mix_3_vertical");
    }

    #[test]
    fn road_lane_ids() {
        let road = Road {
            id: "r1".to_string(),
            junction_id: None,
            sections: vec![
                RoadSection {
                    id: "s1".to_string(),
                    lane_ids: vec!["a".to_string(), "b".to_string()],
                },
                RoadSection {
                    id: "s2".to_string(),
                    lane_ids: vec!["c".to_string()],
                },
            ],
        };
        assert_eq!(road.lane_ids().collect::<Vec<_>>(), ["a", "b", "c"]);
    }
}
