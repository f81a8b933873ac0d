/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use euclid::{Rect, Transform3D};
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::precise_time_ns;

/// Logs the time spent between construction and drop at trace level.
pub struct ProfileScope {
    name: &'static str,
    t0: u64,
}

impl ProfileScope {
    pub fn new(name: &'static str) -> ProfileScope {
        ProfileScope {
            name,
            t0: precise_time_ns(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if log_enabled!(log::Level::Trace) {
            let t1 = precise_time_ns();
            let ms = (t1 - self.t0) as f64 / 1000000f64;
            trace!("{} {:.3}ms", self.name, ms);
        }
    }
}

/// Locks a mutex, recovering the data if a painting thread panicked while
/// holding it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub trait MatrixHelpers {
    /// Returns true if the transform only translates in the 2D plane.
    fn is_identity_or_translation(&self) -> bool;

    /// Returns true if this matrix transforms an axis-aligned 2D rectangle to another
    /// axis-aligned 2D rectangle.
    fn preserves_axis_alignment(&self) -> bool;
}

impl<Src, Dst> MatrixHelpers for Transform3D<f32, Src, Dst> {
    fn is_identity_or_translation(&self) -> bool {
        self.m11 == 1.0 && self.m12 == 0.0 && self.m13 == 0.0 && self.m14 == 0.0 &&
        self.m21 == 0.0 && self.m22 == 1.0 && self.m23 == 0.0 && self.m24 == 0.0 &&
        self.m31 == 0.0 && self.m32 == 0.0 && self.m33 == 1.0 && self.m34 == 0.0 &&
        self.m44 == 1.0
    }

    fn preserves_axis_alignment(&self) -> bool {
        self.m12 == 0.0 && self.m14 == 0.0 && self.m21 == 0.0 && self.m24 == 0.0 && self.m44 == 1.0
    }
}

/// Returns the parts of `rect` not covered by `hole`, as at most four rects.
pub fn subtract_rect<U>(rect: &Rect<i32, U>, hole: &Rect<i32, U>) -> Vec<Rect<i32, U>> {
    let hole = match rect.intersection(hole) {
        Some(hole) if !hole.is_empty() => hole,
        _ => return vec![*rect],
    };

    let mut result = Vec::with_capacity(4);
    // Top band, full width.
    if hole.min_y() > rect.min_y() {
        result.push(Rect::new(
            rect.origin,
            euclid::size2(rect.size.width, hole.min_y() - rect.min_y()),
        ));
    }
    // Bottom band, full width.
    if hole.max_y() < rect.max_y() {
        result.push(Rect::new(
            euclid::point2(rect.min_x(), hole.max_y()),
            euclid::size2(rect.size.width, rect.max_y() - hole.max_y()),
        ));
    }
    // Left and right of the hole, hole height.
    if hole.min_x() > rect.min_x() {
        result.push(Rect::new(
            euclid::point2(rect.min_x(), hole.min_y()),
            euclid::size2(hole.min_x() - rect.min_x(), hole.size.height),
        ));
    }
    if hole.max_x() < rect.max_x() {
        result.push(Rect::new(
            euclid::point2(hole.max_x(), hole.min_y()),
            euclid::size2(rect.max_x() - hole.max_x(), hole.size.height),
        ));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LayerIntRect, LayerTransform};
    use euclid::rect;

    #[test]
    fn subtract_center_hole() {
        let outer: LayerIntRect = rect(0, 0, 30, 30);
        let pieces = subtract_rect(&outer, &rect(10, 10, 10, 10));
        assert_eq!(pieces.len(), 4);
        let area: i32 = pieces.iter().map(|r| r.size.area()).sum();
        assert_eq!(area, 900 - 100);
    }

    #[test]
    fn subtract_disjoint_and_covering() {
        let outer: LayerIntRect = rect(0, 0, 10, 10);
        assert_eq!(subtract_rect(&outer, &rect(20, 20, 5, 5)), vec![outer]);
        assert!(subtract_rect(&outer, &rect(-5, -5, 50, 50)).is_empty());
    }

    #[test]
    fn translation_detection() {
        let t = LayerTransform::translation(4.0, 5.0, 0.0);
        assert!(t.is_identity_or_translation());
        assert!(!LayerTransform::scale(2.0, 2.0, 1.0).is_identity_or_translation());
        assert!(LayerTransform::scale(2.0, 2.0, 1.0).preserves_axis_alignment());
    }
}
