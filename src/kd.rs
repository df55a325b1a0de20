// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::cmp::Ordering;

use crate::geometry::{AABox, Point2D};

/// A single piece of indexed geometry - the `part`-th geometric part
/// (e.g. centerline segment) of the record at position `owner`.
///
/// The tree only knows the bounding box of an entry; exact geometry
/// is evaluated by callbacks provided at query time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub owner: usize,
    pub part: usize,
    pub bounds: AABox,
}

impl Entry {
    #[inline]
    fn key(&self) -> (usize, usize) {
        (self.owner, self.part)
    }
}

/// KDTree implements a [k-d tree](https://en.wikipedia.org/wiki/K-d_tree) over
/// axis-aligned bounding boxes of [Entries](Entry).
///
/// Entries are partitioned by the centers of their boxes, alternating between
/// the x and y axes. As boxes have an extent, the partitioning planes don't bound
/// subtrees - instead, every node keeps the bounding box of its whole subtree,
/// and queries prune subtrees by the distance to (or overlap with) that box.
#[derive(Debug, Clone)]
pub struct KDTree {
    pivot: Entry,
    bounds: AABox,
    left: Option<Box<KDTree>>,
    right: Option<Box<KDTree>>,
}

impl KDTree {
    /// Builds a k-d tree from a mutable slice of [Entries](Entry). Entries will be reordered
    /// in the slice to facilitate building the tree.
    ///
    /// The resulting tree does not depend on the initial order of entries,
    /// as long as `(owner, part)` pairs are unique.
    pub fn build(entries: &mut [Entry]) -> Option<Self> {
        Self::build_impl(entries, false)
    }

    fn build_impl(entries: &mut [Entry], y_divides: bool) -> Option<Self> {
        match entries.len() {
            0 => None,
            1 => Some(Self {
                pivot: entries[0],
                bounds: entries[0].bounds,
                left: None,
                right: None,
            }),
            _ => {
                entries.sort_by(|a, b| {
                    let (ca, cb) = (a.bounds.center(), b.bounds.center());
                    let by_axis = if y_divides {
                        ca.y.total_cmp(&cb.y)
                    } else {
                        ca.x.total_cmp(&cb.x)
                    };
                    by_axis.then_with(|| a.key().cmp(&b.key()))
                });

                let bounds = entries
                    .iter()
                    .skip(1)
                    .fold(entries[0].bounds, |acc, e| acc.union(e.bounds));

                let median = entries.len() / 2;
                let pivot = entries[median];
                let (left, right_and_pivot) = entries.split_at_mut(median);
                let right = &mut right_and_pivot[1..];
                Some(Self {
                    pivot,
                    bounds,
                    left: box_option(Self::build_impl(left, !y_divides)),
                    right: box_option(Self::build_impl(right, !y_divides)),
                })
            }
        }
    }

    /// Returns the bounding box of all entries in the tree.
    pub fn bounds(&self) -> AABox {
        self.bounds
    }

    /// Returns the number of entries in the tree.
    pub fn len(&self) -> usize {
        1 + self.left.as_ref().map_or(0, |t| t.len()) + self.right.as_ref().map_or(0, |t| t.len())
    }

    /// Finds the [Entry] closest to `p`, as measured by `distance`, which is no further away
    /// than `max_distance`. Ties are broken by the lowest `(owner, part)`.
    ///
    /// `distance` must never be smaller than the distance from `p` to the entry's bounding box.
    pub fn find_nearest<F>(&self, p: Point2D, max_distance: f64, distance: &F) -> Option<(Entry, f64)>
    where
        F: Fn(&Entry) -> f64,
    {
        let mut best = None;
        self.find_nearest_impl(p, max_distance, distance, &mut best);
        best
    }

    fn find_nearest_impl<F>(
        &self,
        p: Point2D,
        max_distance: f64,
        distance: &F,
        best: &mut Option<(Entry, f64)>,
    ) where
        F: Fn(&Entry) -> f64,
    {
        // A closer entry is possible in this subtree if and only if
        // its bounding box is not further away than the current best candidate.
        let limit = best.map_or(max_distance, |(_, d)| d);
        if !(self.bounds.distance_to_point(p) <= limit) {
            return;
        }

        if self.pivot.bounds.distance_to_point(p) <= limit {
            let d = distance(&self.pivot);
            if d <= max_distance && is_better(&self.pivot, d, best) {
                *best = Some((self.pivot, d));
            }
        }

        // Select which branch to recurse into first
        let left_dist = distance_to_branch(&self.left, p);
        let right_dist = distance_to_branch(&self.right, p);
        let (first, second) = if left_dist <= right_dist {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        if let Some(ref branch) = first {
            branch.find_nearest_impl(p, max_distance, distance, best);
        }
        if let Some(ref branch) = second {
            branch.find_nearest_impl(p, max_distance, distance, best);
        }
    }

    /// Collects all [Entries](Entry) no further than `radius` from `p` (as measured by
    /// `distance`), together with their distances. The order of results is unspecified.
    ///
    /// `distance` must never be smaller than the distance from `p` to the entry's bounding box.
    pub fn find_within<F>(&self, p: Point2D, radius: f64, distance: &F, out: &mut Vec<(Entry, f64)>)
    where
        F: Fn(&Entry) -> f64,
    {
        if !(self.bounds.distance_to_point(p) <= radius) {
            return;
        }

        if self.pivot.bounds.distance_to_point(p) <= radius {
            let d = distance(&self.pivot);
            if d <= radius {
                out.push((self.pivot, d));
            }
        }

        if let Some(ref branch) = self.left {
            branch.find_within(p, radius, distance, out);
        }
        if let Some(ref branch) = self.right {
            branch.find_within(p, radius, distance, out);
        }
    }

    /// Collects all [Entries](Entry) whose bounding box overlaps `rect` and for which
    /// `intersects` returns true. The order of results is unspecified.
    pub fn find_intersecting<F>(&self, rect: AABox, intersects: &F, out: &mut Vec<Entry>)
    where
        F: Fn(&Entry) -> bool,
    {
        if !self.bounds.overlaps(rect) {
            return;
        }

        if self.pivot.bounds.overlaps(rect) && intersects(&self.pivot) {
            out.push(self.pivot);
        }

        if let Some(ref branch) = self.left {
            branch.find_intersecting(rect, intersects, out);
        }
        if let Some(ref branch) = self.right {
            branch.find_intersecting(rect, intersects, out);
        }
    }
}

fn is_better(candidate: &Entry, d: f64, best: &Option<(Entry, f64)>) -> bool {
    match best {
        None => true,
        Some((b, bd)) => match d.total_cmp(bd) {
            Ordering::Less => true,
            Ordering::Equal => candidate.key() < b.key(),
            Ordering::Greater => false,
        },
    }
}

#[inline]
fn distance_to_branch(branch: &Option<Box<KDTree>>, p: Point2D) -> f64 {
    branch
        .as_ref()
        .map_or(f64::INFINITY, |b| b.bounds.distance_to_point(p))
}

#[inline]
fn box_option<T>(o: Option<T>) -> Option<Box<T>> {
    o.map(|thing| Box::new(thing))
}
