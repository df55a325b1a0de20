// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::f64::consts::{PI, TAU};

/// Lengths below this are treated as zero when projecting onto segments.
const MIN_SEGMENT_LENGTH: f64 = 1e-10;

/// A position in a projected, planar coordinate frame (usually meters in UTM).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns the euclidean distance between two points.
    pub fn distance_to(self, other: Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Direction of travel in radians, normalized to (-π, π].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Heading(f64);

impl Heading {
    pub fn new(radians: f64) -> Self {
        Self(normalize_angle(radians))
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    /// Returns the absolute angle between two headings, in [0, π].
    /// The difference wraps around ±π, so headings of π and -π+0.05 are 0.05 apart.
    pub fn difference(self, other: Heading) -> f64 {
        angle_difference(self.0, other.0)
    }
}

/// Normalizes an angle (in radians) to (-π, π].
pub fn normalize_angle(radians: f64) -> f64 {
    let a = radians % TAU;
    if a <= -PI {
        a + TAU
    } else if a > PI {
        a - TAU
    } else {
        a
    }
}

/// Returns the circular difference between two angles (in radians),
/// that is `min(|a - b|, 2π - |a - b|)` after reducing modulo 2π.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % TAU;
    d.min(TAU - d)
}

/// Axis-aligned bounding box. All containment and overlap checks are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABox {
    pub min: Point2D,
    pub max: Point2D,
}

impl AABox {
    /// Creates a box spanning two arbitrary corners.
    pub fn new(a: Point2D, b: Point2D) -> Self {
        Self {
            min: Point2D::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point2D::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Creates a box centered at `center` with the provided half-extents.
    /// Negative half-extents are treated as their absolute values.
    pub fn from_center(center: Point2D, half_x: f64, half_y: f64) -> Self {
        let (half_x, half_y) = (half_x.abs(), half_y.abs());
        Self {
            min: Point2D::new(center.x - half_x, center.y - half_y),
            max: Point2D::new(center.x + half_x, center.y + half_y),
        }
    }

    /// Returns the smallest box containing all points, or `None` for an empty slice.
    pub fn from_points(points: &[Point2D]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(
            rest.iter()
                .fold(Self::new(*first, *first), |acc, &p| acc.union(Self::new(p, p))),
        )
    }

    pub fn union(self, other: AABox) -> Self {
        Self {
            min: Point2D::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point2D::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn center(self) -> Point2D {
        Point2D::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    pub fn contains(self, p: Point2D) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn overlaps(self, other: AABox) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Returns the distance from `p` to the closest point of the box (zero inside).
    /// This is a lower bound on the distance to any geometry inside the box.
    pub fn distance_to_point(self, p: Point2D) -> f64 {
        let dx = (self.min.x - p.x).max(p.x - self.max.x).max(0.0);
        let dy = (self.min.y - p.y).max(p.y - self.max.y).max(0.0);
        dx.hypot(dy)
    }

    /// Checks whether any point of the `a`-`b` segment lies in the box,
    /// using [Liang-Barsky clipping](https://en.wikipedia.org/wiki/Liang%E2%80%93Barsky_algorithm).
    pub fn intersects_segment(self, a: Point2D, b: Point2D) -> bool {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let mut t0 = 0.0_f64;
        let mut t1 = 1.0_f64;

        for (p, q) in [
            (-dx, a.x - self.min.x),
            (dx, self.max.x - a.x),
            (-dy, a.y - self.min.y),
            (dy, self.max.y - a.y),
        ] {
            if p == 0.0 {
                // Parallel to this edge - must be on the inner side
                if q < 0.0 {
                    return false;
                }
            } else {
                let r = q / p;
                if p < 0.0 {
                    if r > t1 {
                        return false;
                    }
                    t0 = t0.max(r);
                } else {
                    if r < t0 {
                        return false;
                    }
                    t1 = t1.min(r);
                }
            }
        }

        true
    }
}

/// Result of projecting a point onto a [Segment].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Distance along the segment from its start to the closest point, in `[0, length]`.
    pub along: f64,

    /// Distance between the point and the closest point of the segment.
    pub distance: f64,

    /// `distance` signed by side: positive to the left of the segment direction.
    pub lateral: f64,
}

/// A directed line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point2D,
    pub end: Point2D,
}

impl Segment {
    pub const fn new(start: Point2D, end: Point2D) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.start.distance_to(self.end)
    }

    /// Heading of the segment direction. Degenerate segments point along +x.
    pub fn heading(&self) -> Heading {
        if self.length() < MIN_SEGMENT_LENGTH {
            Heading::new(0.0)
        } else {
            Heading::new((self.end.y - self.start.y).atan2(self.end.x - self.start.x))
        }
    }

    pub fn bounding_box(&self) -> AABox {
        AABox::new(self.start, self.end)
    }

    pub fn project(&self, p: Point2D) -> SegmentProjection {
        let length = self.length();
        if length < MIN_SEGMENT_LENGTH {
            let distance = p.distance_to(self.start);
            return SegmentProjection {
                along: 0.0,
                distance,
                lateral: distance,
            };
        }

        let ux = (self.end.x - self.start.x) / length;
        let uy = (self.end.y - self.start.y) / length;
        let px = p.x - self.start.x;
        let py = p.y - self.start.y;

        let along = (px * ux + py * uy).clamp(0.0, length);
        let closest = Point2D::new(self.start.x + ux * along, self.start.y + uy * along);
        let distance = p.distance_to(closest);
        let cross = ux * py - uy * px;

        SegmentProjection {
            along,
            distance,
            lateral: if cross < 0.0 { -distance } else { distance },
        }
    }

    pub fn distance_to(&self, p: Point2D) -> f64 {
        self.project(p).distance
    }
}

/// Returns the consecutive segments of a polyline.
/// A single-point polyline yields one degenerate segment.
pub fn polyline_segments(points: &[Point2D]) -> impl Iterator<Item = Segment> + '_ {
    let single = match points {
        [p] => Some(Segment::new(*p, *p)),
        _ => None,
    };
    single
        .into_iter()
        .chain(points.windows(2).map(|pair| Segment::new(pair[0], pair[1])))
}

/// Returns the edges of a polygon, including the closing edge from the last
/// vertex back to the first one.
pub fn polygon_edges(polygon: &[Point2D]) -> impl Iterator<Item = Segment> + '_ {
    let closing = match polygon {
        [first, .., last] if polygon.len() > 2 => Some(Segment::new(*last, *first)),
        _ => None,
    };
    polyline_segments(polygon).chain(closing)
}

pub fn polyline_length(points: &[Point2D]) -> f64 {
    polyline_segments(points).map(|s| s.length()).sum()
}

/// Returns the distance from `p` to the closest point of a polyline,
/// or [f64::INFINITY] for an empty polyline.
pub fn polyline_distance(points: &[Point2D], p: Point2D) -> f64 {
    polyline_segments(points)
        .map(|s| s.distance_to(p))
        .fold(f64::INFINITY, f64::min)
}

pub fn polyline_intersects_box(points: &[Point2D], rect: AABox) -> bool {
    polyline_segments(points).any(|s| rect.intersects_segment(s.start, s.end))
}

/// Even-odd point-in-polygon test. Polygons with less than 3 vertices contain nothing.
pub fn polygon_contains(polygon: &[Point2D], p: Point2D) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Returns the distance from `p` to a polygon area: zero for points inside,
/// distance to the boundary otherwise, [f64::INFINITY] for an empty polygon.
pub fn polygon_distance(polygon: &[Point2D], p: Point2D) -> f64 {
    if polygon_contains(polygon, p) {
        0.0
    } else {
        polygon_edges(polygon)
            .map(|s| s.distance_to(p))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Checks whether a polygon area and a box share at least one point.
pub fn polygon_intersects_box(polygon: &[Point2D], rect: AABox) -> bool {
    polygon_edges(polygon).any(|s| rect.intersects_segment(s.start, s.end))
        || polygon_contains(polygon, rect.center())
}

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineProjection {
    /// Index of the segment containing the closest point.
    pub segment: usize,

    /// Arc length from the start of the polyline to the closest point.
    pub s: f64,

    /// Signed lateral offset, positive to the left of travel.
    pub l: f64,

    /// Unsigned distance to the closest point.
    pub distance: f64,

    /// Heading of the polyline at the closest point.
    pub heading: Heading,
}

/// Projects a point onto a polyline, choosing the first segment among equally close ones.
/// Zero-length segments (repeated points) are ignored, unless the whole polyline
/// collapses into a single point. Returns `None` for an empty polyline.
pub fn project_onto_polyline(points: &[Point2D], p: Point2D) -> Option<PolylineProjection> {
    let mut best: Option<PolylineProjection> = None;
    let mut accumulated = 0.0;
    let has_extent = polyline_segments(points).any(|s| s.length() >= MIN_SEGMENT_LENGTH);

    for (idx, segment) in polyline_segments(points).enumerate() {
        if has_extent && segment.length() < MIN_SEGMENT_LENGTH {
            continue;
        }

        let projection = segment.project(p);
        if best.map_or(true, |b| projection.distance < b.distance) {
            best = Some(PolylineProjection {
                segment: idx,
                s: accumulated + projection.along,
                l: projection.lateral,
                distance: projection.distance,
                heading: segment.heading(),
            });
        }
        accumulated += segment.length();
    }

    best
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

    fn square() -> Vec<Point2D> {
        vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(4.0, 0.0),
            Point2D::new(4.0, 4.0),
            Point2D::new(0.0, 4.0),
        ]
    }

    #[test]
    fn normalize() {
        assert_almost_eq!(normalize_angle(PI), PI);
        assert_almost_eq!(normalize_angle(-PI), PI);
        assert_almost_eq!(normalize_angle(3.0 * PI).abs(), PI);
        assert_almost_eq!(normalize_angle(TAU + 0.5), 0.5);
        assert_almost_eq!(normalize_angle(-TAU - 0.5), -0.5);
    }

    #[test]
    fn heading_difference_wraps() {
        let a = Heading::new(PI);
        let b = Heading::new(-PI + 0.05);
        assert_almost_eq!(a.difference(b), 0.05);
        assert_almost_eq!(b.difference(a), 0.05);
        assert_almost_eq!(Heading::new(0.25).difference(Heading::new(-0.25)), 0.5);
        assert_almost_eq!(Heading::new(0.0).difference(Heading::new(PI)), PI);
    }

    #[test]
    fn box_segment_intersection() {
        let rect = AABox::from_center(Point2D::new(0.0, 0.0), 1.0, 1.0);

        // Crossing without endpoints inside
        assert!(rect.intersects_segment(Point2D::new(-5.0, 0.0), Point2D::new(5.0, 0.0)));
        // Touching a corner
        assert!(rect.intersects_segment(Point2D::new(1.0, 1.0), Point2D::new(3.0, 3.0)));
        // Fully inside
        assert!(rect.intersects_segment(Point2D::new(-0.5, 0.5), Point2D::new(0.5, 0.5)));
        // Degenerate, inside and outside
        assert!(rect.intersects_segment(Point2D::new(0.2, 0.2), Point2D::new(0.2, 0.2)));
        assert!(!rect.intersects_segment(Point2D::new(2.0, 2.0), Point2D::new(2.0, 2.0)));
        // Passing by the corner
        assert!(!rect.intersects_segment(Point2D::new(0.0, 3.0), Point2D::new(3.0, 0.0)));
    }

    #[test]
    fn box_distance() {
        let rect = AABox::new(Point2D::new(0.0, 0.0), Point2D::new(2.0, 2.0));
        assert_almost_eq!(rect.distance_to_point(Point2D::new(1.0, 1.0)), 0.0);
        assert_almost_eq!(rect.distance_to_point(Point2D::new(5.0, 1.0)), 3.0);
        assert_almost_eq!(rect.distance_to_point(Point2D::new(5.0, 6.0)), 5.0);
    }

    #[test]
    fn segment_projection() {
        let s = Segment::new(Point2D::new(0.0, 0.0), Point2D::new(10.0, 0.0));

        let p = s.project(Point2D::new(5.0, 1.0));
        assert_almost_eq!(p.along, 5.0);
        assert_almost_eq!(p.distance, 1.0);
        assert_almost_eq!(p.lateral, 1.0);

        let p = s.project(Point2D::new(3.0, -2.0));
        assert_almost_eq!(p.lateral, -2.0);

        let p = s.project(Point2D::new(13.0, 4.0));
        assert_almost_eq!(p.along, 10.0);
        assert_almost_eq!(p.distance, 5.0);
    }

    #[test]
    fn polyline_projection() {
        let line = [
            Point2D::new(0.0, 0.0),
            Point2D::new(10.0, 0.0),
            Point2D::new(10.0, 10.0),
        ];
        let p = project_onto_polyline(&line, Point2D::new(11.0, 4.0)).unwrap();
        assert_eq!(p.segment, 1);
        assert_almost_eq!(p.s, 14.0);
        assert_almost_eq!(p.distance, 1.0);
        assert_almost_eq!(p.l, -1.0);
        assert_almost_eq!(p.heading.radians(), PI / 2.0);

        assert_almost_eq!(polyline_length(&line), 20.0);
        assert!(project_onto_polyline(&[], Point2D::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn polyline_projection_skips_repeated_points() {
        let line = [
            Point2D::new(0.0, 0.0),
            Point2D::new(0.0, 0.0),
            Point2D::new(0.0, 10.0),
        ];
        let p = project_onto_polyline(&line, Point2D::new(1.0, 0.0)).unwrap();
        assert_eq!(p.segment, 1);
        assert_almost_eq!(p.s, 0.0);
        assert_almost_eq!(p.l, -1.0);
        assert_almost_eq!(p.distance, 1.0);
        assert_almost_eq!(p.heading.radians(), PI / 2.0);

        // A polyline collapsed into one point still projects
        let point = [Point2D::new(2.0, 2.0), Point2D::new(2.0, 2.0)];
        let p = project_onto_polyline(&point, Point2D::new(2.0, 5.0)).unwrap();
        assert_eq!(p.segment, 0);
        assert_almost_eq!(p.distance, 3.0);
        assert_almost_eq!(p.heading.radians(), 0.0);
    }

    #[test]
    fn box_containment() {
        let b = AABox::from_center(Point2D::new(1.0, 1.0), 1.0, 2.0);
        assert!(b.contains(Point2D::new(1.0, 1.0)));
        assert!(b.contains(Point2D::new(2.0, 3.0)));
        assert!(!b.contains(Point2D::new(2.1, 1.0)));
        assert!(!b.contains(Point2D::new(1.0, -1.5)));
    }

    #[test]
    fn polygon_queries() {
        let sq = square();
        assert!(polygon_contains(&sq, Point2D::new(2.0, 2.0)));
        assert!(!polygon_contains(&sq, Point2D::new(5.0, 2.0)));
        assert_almost_eq!(polygon_distance(&sq, Point2D::new(2.0, 2.0)), 0.0);
        assert_almost_eq!(polygon_distance(&sq, Point2D::new(7.0, 2.0)), 3.0);
        assert_almost_eq!(polygon_distance(&sq, Point2D::new(-3.0, -4.0)), 5.0);
        assert_eq!(polygon_edges(&sq).count(), 4);

        // Box fully inside the polygon
        let inner = AABox::from_center(Point2D::new(2.0, 2.0), 0.5, 0.5);
        assert!(polygon_intersects_box(&sq, inner));
        // Polygon fully inside the box
        let outer = AABox::from_center(Point2D::new(2.0, 2.0), 10.0, 10.0);
        assert!(polygon_intersects_box(&sq, outer));
        // Disjoint
        let far = AABox::from_center(Point2D::new(20.0, 2.0), 1.0, 1.0);
        assert!(!polygon_intersects_box(&sq, far));
    }
}
