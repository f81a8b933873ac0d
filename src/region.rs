/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Integer regions made of disjoint rectangles.
//!
//! Regions carry invalidations from the DOM side into surface backings, and
//! describe the cursor ring and find-on-page highlight shapes drawn by
//! `GlExtras`. They stay small in practice, so the representation is a flat
//! list of non-overlapping rects rather than a banded structure.

use euclid::{point2, size2, Rect, Vector2D};
use crate::util::subtract_rect;

/// Half the extent used by `Region::infinite`, large enough to cover any
/// realistic content area without overflowing when translated.
const INFINITE_HALF_EXTENT: i32 = 100_000_000;

/// Orientation of a boundary run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeDirection {
    Horizontal,
    Vertical,
}

/// A straight run of a region's boundary, in the region's coordinates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BoundarySegment {
    pub direction: EdgeDirection,
    /// Fixed coordinate (y for horizontal runs, x for vertical runs).
    pub position: i32,
    pub start: i32,
    pub end: i32,
}

impl BoundarySegment {
    /// Returns the rect covering this segment inflated by `width` on every side.
    pub fn to_rect<U>(&self, width: i32) -> Rect<i32, U> {
        match self.direction {
            EdgeDirection::Horizontal => Rect::new(
                point2(self.start - width, self.position - width),
                size2(self.end - self.start + 2 * width, 2 * width),
            ),
            EdgeDirection::Vertical => Rect::new(
                point2(self.position - width, self.start - width),
                size2(2 * width, self.end - self.start + 2 * width),
            ),
        }
    }
}

pub struct Region<U> {
    rects: Vec<Rect<i32, U>>,
}

impl<U> Clone for Region<U> {
    fn clone(&self) -> Self {
        Region { rects: self.rects.clone() }
    }
}

impl<U> std::fmt::Debug for Region<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_list().entries(self.rects.iter()).finish()
    }
}

impl<U> Default for Region<U> {
    fn default() -> Self {
        Region::new()
    }
}

impl<U> Region<U> {
    pub fn new() -> Self {
        Region { rects: Vec::new() }
    }

    pub fn from_rect(rect: Rect<i32, U>) -> Self {
        let mut region = Region::new();
        region.union_rect(&rect);
        region
    }

    /// A region covering every reachable coordinate; used to force a full
    /// invalidation.
    pub fn infinite() -> Self {
        Region::from_rect(Rect::new(
            point2(-INFINITE_HALF_EXTENT, -INFINITE_HALF_EXTENT),
            size2(2 * INFINITE_HALF_EXTENT, 2 * INFINITE_HALF_EXTENT),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn rects(&self) -> &[Rect<i32, U>] {
        &self.rects
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(|r| r.size.width as i64 * r.size.height as i64).sum()
    }

    pub fn bounds(&self) -> Rect<i32, U> {
        let mut iter = self.rects.iter();
        match iter.next() {
            Some(first) => iter.fold(*first, |acc, r| acc.union(r)),
            None => Rect::zero(),
        }
    }

    pub fn union_rect(&mut self, rect: &Rect<i32, U>) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![*rect];
        for existing in &self.rects {
            pieces = pieces
                .iter()
                .flat_map(|piece| subtract_rect(piece, existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    pub fn union(&mut self, other: &Region<U>) {
        for rect in &other.rects {
            self.union_rect(rect);
        }
    }

    pub fn subtract_rect(&mut self, hole: &Rect<i32, U>) {
        self.rects = self.rects
            .iter()
            .flat_map(|rect| subtract_rect(rect, hole))
            .collect();
    }

    pub fn subtract(&mut self, other: &Region<U>) {
        for rect in &other.rects {
            self.subtract_rect(rect);
        }
    }

    pub fn intersects_rect(&self, rect: &Rect<i32, U>) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
    }

    pub fn intersect_rect(&self, clip: &Rect<i32, U>) -> Region<U> {
        Region {
            rects: self.rects.iter().filter_map(|r| r.intersection(clip)).filter(|r| !r.is_empty()).collect(),
        }
    }

    pub fn contains_rect(&self, rect: &Rect<i32, U>) -> bool {
        let mut remaining = vec![*rect];
        for existing in &self.rects {
            remaining = remaining
                .iter()
                .flat_map(|piece| subtract_rect(piece, existing))
                .collect();
            if remaining.is_empty() {
                return true;
            }
        }
        remaining.is_empty()
    }

    pub fn translate(&mut self, offset: Vector2D<i32, U>) {
        for rect in &mut self.rects {
            *rect = rect.translate(offset);
        }
    }

    /// Reinterprets the region in another coordinate space without changing values.
    pub fn cast_unit<V>(&self) -> Region<V> {
        Region {
            rects: self.rects.iter().map(|r| r.cast_unit()).collect(),
        }
    }

    /// Returns the straight runs making up the region's outline.
    ///
    /// Each rect edge contributes the portions that are not shared with a
    /// neighbouring rect on its outer side. Runs along the same line that
    /// touch are joined, so a single boundary run comes back as one segment.
    pub fn boundary_segments(&self) -> Vec<BoundarySegment> {
        let mut segments = Vec::new();
        for (index, rect) in self.rects.iter().enumerate() {
            let edges = [
                (EdgeDirection::Horizontal, rect.min_y(), rect.min_x(), rect.max_x(), -1),
                (EdgeDirection::Horizontal, rect.max_y(), rect.min_x(), rect.max_x(), 1),
                (EdgeDirection::Vertical, rect.min_x(), rect.min_y(), rect.max_y(), -1),
                (EdgeDirection::Vertical, rect.max_x(), rect.min_y(), rect.max_y(), 1),
            ];
            for &(direction, position, start, end, outward) in &edges {
                let mut runs = vec![(start, end)];
                for (other_index, other) in self.rects.iter().enumerate() {
                    if other_index == index {
                        continue;
                    }
                    // The neighbour must sit directly on the outer side of this edge.
                    let (touches, other_start, other_end) = match direction {
                        EdgeDirection::Horizontal => {
                            let touches = if outward < 0 {
                                other.max_y() == position
                            } else {
                                other.min_y() == position
                            };
                            (touches, other.min_x(), other.max_x())
                        }
                        EdgeDirection::Vertical => {
                            let touches = if outward < 0 {
                                other.max_x() == position
                            } else {
                                other.min_x() == position
                            };
                            (touches, other.min_y(), other.max_y())
                        }
                    };
                    if !touches {
                        continue;
                    }
                    runs = runs
                        .into_iter()
                        .flat_map(|(s, e)| {
                            let mut left = Vec::with_capacity(2);
                            if other_start > s {
                                left.push((s, e.min(other_start)));
                            }
                            if other_end < e {
                                left.push((s.max(other_end), e));
                            }
                            left.into_iter().filter(|&(s, e)| e > s)
                        })
                        .collect();
                }
                for (s, e) in runs {
                    segments.push(BoundarySegment { direction, position, start: s, end: e });
                }
            }
        }

        // Join collinear runs that touch.
        segments.sort_by_key(|s| (s.direction == EdgeDirection::Vertical, s.position, s.start));
        let mut merged: Vec<BoundarySegment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if let Some(last) = merged.last_mut() {
                if last.direction == segment.direction &&
                   last.position == segment.position &&
                   last.end >= segment.start {
                    last.end = last.end.max(segment.end);
                    continue;
                }
            }
            merged.push(segment);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LayerIntRect, LayerPixel};
    use euclid::{rect, vec2};

    type LayerRegion = Region<LayerPixel>;

    #[test]
    fn union_keeps_rects_disjoint() {
        let mut region = LayerRegion::new();
        region.union_rect(&rect(0, 0, 20, 20));
        region.union_rect(&rect(10, 10, 20, 20));
        assert_eq!(region.area(), 400 + 400 - 100);
        assert_eq!(region.bounds(), rect(0, 0, 30, 30));
        for (i, a) in region.rects().iter().enumerate() {
            for b in &region.rects()[i + 1..] {
                assert!(a.intersection(b).map_or(true, |r| r.is_empty()));
            }
        }
    }

    #[test]
    fn contained_rect_is_not_added_twice() {
        let mut region = LayerRegion::from_rect(rect(0, 0, 100, 100));
        region.union_rect(&rect(10, 10, 10, 10));
        assert_eq!(region.rects().len(), 1);
        assert!(region.contains_rect(&rect(50, 50, 10, 10)));
        assert!(!region.contains_rect(&rect(90, 90, 20, 20)));
    }

    #[test]
    fn subtract_and_translate() {
        let mut region = LayerRegion::from_rect(rect(0, 0, 10, 10));
        region.subtract_rect(&rect(0, 0, 5, 10));
        assert_eq!(region.bounds(), rect(5, 0, 5, 10));
        region.translate(vec2(10, 1));
        assert_eq!(region.bounds(), rect(15, 1, 5, 10));
        assert!(region.intersects_rect(&rect(16, 2, 1, 1)));
    }

    #[test]
    fn single_rect_boundary_has_four_runs() {
        let region = LayerRegion::from_rect(rect(0, 0, 10, 5));
        let segments = region.boundary_segments();
        assert_eq!(segments.len(), 4);
        let horizontal: Vec<_> = segments
            .iter()
            .filter(|s| s.direction == EdgeDirection::Horizontal)
            .collect();
        assert_eq!(horizontal.len(), 2);
        assert!(horizontal.iter().all(|s| s.start == 0 && s.end == 10));
    }

    #[test]
    fn shared_edges_are_not_boundary() {
        // Two rects stacked vertically form one 10x20 box.
        let mut region = LayerRegion::new();
        region.union_rect(&rect(0, 0, 10, 10));
        region.union_rect(&rect(0, 10, 10, 10));
        let segments = region.boundary_segments();
        assert!(segments
            .iter()
            .all(|s| !(s.direction == EdgeDirection::Horizontal && s.position == 10)));
        let vertical_left: Vec<_> = segments
            .iter()
            .filter(|s| s.direction == EdgeDirection::Vertical && s.position == 0)
            .collect();
        assert_eq!(vertical_left.len(), 1);
        assert_eq!((vertical_left[0].start, vertical_left[0].end), (0, 20));
    }

    #[test]
    fn segment_rect_is_inflated() {
        let segment = BoundarySegment {
            direction: EdgeDirection::Horizontal,
            position: 5,
            start: 0,
            end: 10,
        };
        let r: LayerIntRect = segment.to_rect(2);
        assert_eq!(r, rect(-2, 3, 14, 4));
    }
}
