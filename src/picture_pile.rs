/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Recorded layer content, kept as a stack of pictures.
//!
//! A pile starts as one picture covering the whole content. Small
//! invalidations re-record only the invalidated area as a new picture stacked
//! on top of the older ones; large ones collapse the pile back to a single
//! full-size picture. Small re-recorded areas may also be rasterized at scale
//! 1 ("prerendered") so a tile can be patched by a copy instead of a repaint.

use euclid::{point2, Rect};
use std::sync::Arc;
use crate::canvas::{Bitmap, Canvas, Picture, PictureRecorder};
use crate::types::{LayerIntRect, LayerSize};

/// Invalidations covering at least this share of the content re-record everything.
const FULL_RERECORD_RATIO: f32 = 0.5;

/// Largest area, in content pixels, that gets prerendered.
const MAX_PRERENDERED_AREA: i32 = 256 * 256;

/// Upper bound on stacked pictures before the pile is collapsed.
const MAX_PICTURE_COUNT: usize = 16;

/// Supplies the drawing commands for a content area. Implemented by the
/// DOM side.
pub trait PicturePainter {
    fn paint_contents(&self, canvas: &mut dyn Canvas, area: &LayerIntRect);
}

/// A rasterized copy of a small invalidated area, at scale 1.
#[derive(Debug)]
pub struct PrerenderedInval {
    pub area: LayerIntRect,
    pub bitmap: Bitmap,
}

#[derive(Debug)]
struct PictureContainer {
    area: LayerIntRect,
    picture: Option<Picture>,
    prerendered: Option<Arc<PrerenderedInval>>,
    dirty: bool,
}

impl PictureContainer {
    fn new(area: LayerIntRect) -> PictureContainer {
        PictureContainer {
            area,
            picture: None,
            prerendered: None,
            dirty: true,
        }
    }
}

#[derive(Debug)]
pub struct PicturePile {
    width: i32,
    height: i32,
    containers: Vec<PictureContainer>,
    invals: Vec<LayerIntRect>,
}

impl PicturePile {
    pub fn new(width: i32, height: i32) -> PicturePile {
        let mut pile = PicturePile {
            width: width.max(0),
            height: height.max(0),
            containers: Vec::new(),
            invals: Vec::new(),
        };
        let bounds = pile.bounds();
        pile.invalidate(&bounds);
        pile
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn bounds(&self) -> LayerIntRect {
        Rect::new(point2(0, 0), euclid::size2(self.width, self.height))
    }

    /// Resizes the content. Growing invalidates the newly exposed area.
    pub fn set_size(&mut self, width: i32, height: i32) {
        let old_bounds = self.bounds();
        self.width = width.max(0);
        self.height = height.max(0);
        let bounds = self.bounds();
        for container in &mut self.containers {
            match container.area.intersection(&bounds) {
                Some(area) => container.area = area,
                None => container.area = Rect::zero(),
            }
        }
        self.containers.retain(|c| !c.area.is_empty());
        if !old_bounds.contains_rect(&bounds) {
            self.invalidate(&bounds);
        }
    }

    pub fn invalidate(&mut self, rect: &LayerIntRect) {
        if let Some(rect) = rect.intersection(&self.bounds()) {
            if !rect.is_empty() {
                self.invals.push(rect);
            }
        }
    }

    pub fn has_pending_invals(&self) -> bool {
        !self.invals.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.iter().all(|c| c.picture.is_none())
    }

    /// Re-records every invalidated area through `painter`.
    pub fn update_pictures_if_needed(&mut self, painter: &dyn PicturePainter, enable_prerender: bool) {
        self.apply_invals(enable_prerender);
        for container in &mut self.containers {
            if !container.dirty {
                continue;
            }
            let mut recorder = PictureRecorder::new(LayerSize::new(self.width as f32, self.height as f32));
            painter.paint_contents(&mut recorder, &container.area);
            let picture = recorder.finish();

            if let Some(ref prerendered) = container.prerendered {
                let mut bitmap = Bitmap::new(container.area.size.cast_unit());
                bitmap.translate(-container.area.origin.to_vector().to_f32());
                picture.playback(&mut bitmap);
                container.prerendered = Some(Arc::new(PrerenderedInval {
                    area: prerendered.area,
                    bitmap,
                }));
            }

            container.picture = Some(picture);
            container.dirty = false;
        }
    }

    fn apply_invals(&mut self, enable_prerender: bool) {
        if self.invals.is_empty() {
            return;
        }
        let bounds = self.bounds();
        let full_area = bounds.size.area() as f32;
        let invals = std::mem::replace(&mut self.invals, Vec::new());

        let needs_full = self.containers.is_empty() ||
            self.containers.len() + invals.len() > MAX_PICTURE_COUNT ||
            invals.iter().any(|r| r.size.area() as f32 >= full_area * FULL_RERECORD_RATIO);
        if needs_full {
            debug!("re-recording the whole pile ({} invals)", invals.len());
            self.containers.clear();
            self.containers.push(PictureContainer::new(bounds));
            return;
        }

        for inval in invals {
            // Older pictures entirely under the new one will never show.
            self.containers.retain(|c| !inval.contains_rect(&c.area));
            let mut container = PictureContainer::new(inval);
            if enable_prerender && inval.size.area() <= MAX_PRERENDERED_AREA {
                container.prerendered = Some(Arc::new(PrerenderedInval {
                    area: inval,
                    bitmap: Bitmap::new(euclid::size2(0, 0)),
                }));
            }
            self.containers.push(container);
        }
    }

    pub fn draw(&self, canvas: &mut dyn Canvas) {
        for container in &self.containers {
            let picture = match container.picture {
                Some(ref picture) => picture,
                None => continue,
            };
            canvas.save();
            canvas.clip_rect(&container.area.to_f32());
            picture.playback(canvas);
            canvas.restore();
        }
    }

    /// Returns the prerendered bitmap covering `area`, if a single recent
    /// re-recording produced one.
    pub fn prerendered_inval_for_area(&self, area: &LayerIntRect) -> Option<Arc<PrerenderedInval>> {
        for container in self.containers.iter().rev() {
            if !container.area.intersects(area) {
                continue;
            }
            // The topmost picture touching the area decides.
            return match container.prerendered {
                Some(ref prerendered) if !container.dirty && container.area.contains_rect(area) => {
                    Some(Arc::clone(prerendered))
                }
                _ => None,
            };
        }
        None
    }

    pub fn clear_prerenders(&mut self) {
        for container in &mut self.containers {
            container.prerendered = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColorF;
    use euclid::rect;
    use std::cell::Cell;

    struct SolidPainter {
        color: ColorF,
        calls: Cell<usize>,
    }

    impl PicturePainter for SolidPainter {
        fn paint_contents(&self, canvas: &mut dyn Canvas, area: &LayerIntRect) {
            self.calls.set(self.calls.get() + 1);
            canvas.fill_rect(&area.to_f32(), self.color);
        }
    }

    fn painter(color: ColorF) -> SolidPainter {
        SolidPainter { color, calls: Cell::new(0) }
    }

    #[test]
    fn first_update_records_everything() {
        let mut pile = PicturePile::new(100, 100);
        assert!(pile.is_empty());
        let p = painter(ColorF::BLACK);
        pile.update_pictures_if_needed(&p, true);
        assert_eq!(p.calls.get(), 1);
        assert!(!pile.is_empty());
        assert!(pile.prerendered_inval_for_area(&rect(0, 0, 10, 10)).is_none());

        // Nothing pending, nothing re-recorded.
        pile.update_pictures_if_needed(&p, true);
        assert_eq!(p.calls.get(), 1);
    }

    #[test]
    fn small_inval_is_prerendered() {
        let mut pile = PicturePile::new(1000, 1000);
        pile.update_pictures_if_needed(&painter(ColorF::BLACK), true);

        pile.invalidate(&rect(10, 10, 20, 20));
        let white = painter(ColorF::WHITE);
        pile.update_pictures_if_needed(&white, true);
        assert_eq!(white.calls.get(), 1);

        let prerendered = pile.prerendered_inval_for_area(&rect(15, 15, 5, 5)).unwrap();
        assert_eq!(prerendered.area, rect(10, 10, 20, 20));
        assert_eq!(prerendered.bitmap.pixel(0, 0), [255, 255, 255, 255]);

        // Partially covered areas cannot be blitted.
        assert!(pile.prerendered_inval_for_area(&rect(0, 0, 20, 20)).is_none());

        pile.clear_prerenders();
        assert!(pile.prerendered_inval_for_area(&rect(15, 15, 5, 5)).is_none());
    }

    #[test]
    fn later_pictures_draw_on_top() {
        let mut pile = PicturePile::new(8, 8);
        pile.update_pictures_if_needed(&painter(ColorF::BLACK), false);
        pile.invalidate(&rect(0, 0, 2, 2));
        pile.update_pictures_if_needed(&painter(ColorF::WHITE), false);

        let mut bitmap = Bitmap::new(euclid::size2(8, 8));
        pile.draw(&mut bitmap);
        assert_eq!(bitmap.pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(bitmap.pixel(5, 5), [0, 0, 0, 255]);
    }

    #[test]
    fn large_inval_collapses_pile() {
        let mut pile = PicturePile::new(10, 10);
        pile.update_pictures_if_needed(&painter(ColorF::BLACK), true);
        pile.invalidate(&rect(0, 0, 2, 2));
        pile.invalidate(&rect(0, 0, 9, 9));
        let p = painter(ColorF::WHITE);
        pile.update_pictures_if_needed(&p, true);
        assert_eq!(p.calls.get(), 1);
        assert!(pile.prerendered_inval_for_area(&rect(0, 0, 1, 1)).is_none());
    }
}
