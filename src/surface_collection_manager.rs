/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Scheduling of layer tree generations.
//!
//! Up to three generations are alive at once:
//!
//! * `drawing` is on screen.
//! * `painting` is having its tiles painted, and replaces `drawing` once
//!   they are all done.
//! * `queued` arrived while `painting` was still busy. A newer generation
//!   replaces it, inheriting its invalidations.
//!
//! A queued generation can only exist next to a painting one, which is
//! encoded in `PendingCollections`.

use euclid::vec3;
use std::sync::Arc;
use crate::compositor_state::{next_content_update, CompositorState};
use crate::device::Device;
use crate::gl_extras::GlExtras;
use crate::surface_collection::SurfaceCollection;
use crate::tiled_texture::TexturesResult;
use crate::types::{CollectionId, ColorF, DeviceIntRect, LayerId, WorldRect, WorldToDeviceTransform};

bitflags! {
    /// What the host should do after a call to `draw_gl`.
    #[derive(Default)]
    pub struct DrawStatus: u32 {
        /// Call `draw_gl` again soon, even without new input.
        const INVOKE = 0x1;
        /// A new frame was drawn and should be presented.
        const DRAW = 0x2;
    }
}

#[derive(Clone, Debug)]
pub struct FrameParams {
    /// Time in seconds, used to evaluate animations.
    pub current_time: f64,
    /// Area of the render target to draw into.
    pub viewport: DeviceIntRect,
    /// Visible part of the content, in world coordinates.
    pub visible_content_rect: WorldRect,
    pub scale: f32,
    pub scrolling: bool,
    /// When false, only tile bookkeeping happens and nothing is drawn.
    pub should_draw: bool,
    /// The host will redraw the whole view, so framework invals are not needed.
    pub unclipped_draw: bool,
}

impl FrameParams {
    pub fn new(current_time: f64, viewport: DeviceIntRect, visible_content_rect: WorldRect) -> FrameParams {
        FrameParams {
            current_time,
            viewport,
            visible_content_rect,
            scale: 1.0,
            scrolling: false,
            should_draw: true,
            unclipped_draw: false,
        }
    }

    fn world_to_device(&self) -> WorldToDeviceTransform {
        let visible = &self.visible_content_rect;
        WorldToDeviceTransform::translation(-visible.origin.x, -visible.origin.y, 0.0)
            .then_scale(self.scale, self.scale, 1.0)
            .then_translate(vec3(self.viewport.origin.x as f32, self.viewport.origin.y as f32, 0.0))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub status: DrawStatus,
    pub collections_swapped: bool,
    pub new_collection_has_animations: bool,
    pub textures: TexturesResult,
}

struct PendingCollections {
    painting: SurfaceCollection,
    queued: Option<SurfaceCollection>,
}

pub struct SurfaceCollectionManager {
    state: Arc<CompositorState>,
    drawing: Option<SurfaceCollection>,
    pending: Option<PendingCollections>,
    /// Swap tiles in as soon as they are painted, instead of waiting for the
    /// whole generation. Set while scrolling, cleared once content caught up.
    fast_swap_mode: bool,
    previously_scrolling: bool,
    new_painting_collection: bool,
}

impl SurfaceCollectionManager {
    pub fn new(state: Arc<CompositorState>) -> SurfaceCollectionManager {
        SurfaceCollectionManager {
            state,
            drawing: None,
            pending: None,
            fast_swap_mode: false,
            previously_scrolling: false,
            new_painting_collection: false,
        }
    }

    pub fn state(&self) -> &Arc<CompositorState> {
        &self.state
    }

    fn double_buffering(&self) -> bool {
        self.state.options().double_buffering
    }

    pub fn drawing_collection(&self) -> Option<&SurfaceCollection> {
        self.drawing.as_ref()
    }

    pub fn painting_collection(&self) -> Option<&SurfaceCollection> {
        self.pending.as_ref().map(|pending| &pending.painting)
    }

    pub fn queued_collection(&self) -> Option<&SurfaceCollection> {
        self.pending.as_ref().and_then(|pending| pending.queued.as_ref())
    }

    pub fn drawing_id(&self) -> Option<CollectionId> {
        self.drawing_collection().map(SurfaceCollection::id)
    }

    pub fn painting_id(&self) -> Option<CollectionId> {
        self.painting_collection().map(SurfaceCollection::id)
    }

    pub fn queued_id(&self) -> Option<CollectionId> {
        self.queued_collection().map(SurfaceCollection::id)
    }

    pub fn is_fast_swap_mode(&self) -> bool {
        self.fast_swap_mode
    }

    /// Drops every generation, cancelling their outstanding paint work first.
    pub fn clear_collections(&mut self) {
        if let Some(drawing) = self.drawing.take() {
            drawing.remove_painter_operations();
        }
        if let Some(pending) = self.pending.take() {
            pending.painting.remove_painter_operations();
            if let Some(queued) = pending.queued {
                queued.remove_painter_operations();
            }
        }
    }

    /// Takes a new generation from the content side.
    ///
    /// `brand_new` marks content unrelated to what is on screen, such as a
    /// new page; everything else is dropped. Returns true when the new
    /// generation has to wait behind the one on screen, which the content
    /// side uses to throttle itself.
    pub fn update_with_surface_collection(&mut self, collection: Option<SurfaceCollection>, brand_new: bool) -> bool {
        let mut collection = match collection {
            Some(collection) if !brand_new => collection,
            collection => {
                self.clear_collections();
                if let Some(mut collection) = collection {
                    collection.set_is_painting(None);
                    debug!("painting brand new collection {:?}", collection.id());
                    self.pending = Some(PendingCollections {
                        painting: collection,
                        queued: None,
                    });
                    self.new_painting_collection = true;
                }
                return false;
            }
        };

        debug!(
            "update with collection {:?}, composited layers {}, animations {}",
            collection.id(),
            collection.has_composited_layers(),
            collection.has_composited_animations(),
        );

        match self.pending {
            Some(ref mut pending) => {
                if let Some(queued) = pending.queued.take() {
                    // The replaced generation never painted, so its invals
                    // still have to be painted by its replacement.
                    queued.merge_invals_into(&mut collection);
                    queued.remove_painter_operations();
                    if !self.state.options().double_buffering {
                        next_content_update();
                    }
                    debug!("discarding queued collection {:?}", queued.id());
                }
                pending.queued = Some(collection);
            }
            None => {
                collection.set_is_painting(self.drawing.as_ref());
                self.pending = Some(PendingCollections {
                    painting: collection,
                    queued: None,
                });
                self.new_painting_collection = true;
            }
        }

        self.drawing.is_some() && self.double_buffering()
    }

    /// Puts the painting generation on screen and starts painting the queued
    /// one, if any.
    fn swap(&mut self) {
        debug_assert!(self.pending.is_some(), "swap without a painting collection");
        let PendingCollections { mut painting, queued } = match self.pending.take() {
            Some(pending) => pending,
            None => {
                error!("swap without a painting collection");
                return;
            }
        };
        debug!(
            "swapping, drawing {:?}, painting {:?}, queued {:?}",
            self.drawing_id(),
            painting.id(),
            queued.as_ref().map(SurfaceCollection::id),
        );

        if let Some(drawing) = self.drawing.take() {
            drawing.add_framework_invals();
            drawing.remove_painter_operations();
        }

        painting.set_is_drawing();
        painting.add_framework_invals();

        if let Some(mut queued) = queued {
            queued.set_is_painting(Some(&painting));
            self.pending = Some(PendingCollections {
                painting: queued,
                queued: None,
            });
            self.new_painting_collection = true;
        }
        self.drawing = Some(painting);
    }

    /// Scrolls the layer in every generation, so none of them jumps back
    /// when it goes on screen.
    pub fn update_scrollable_layer(&mut self, layer_id: LayerId, x: f32, y: f32) {
        if let Some(ref mut drawing) = self.drawing {
            drawing.update_scrollable_layer(layer_id, x, y);
        }
        if let Some(ref mut pending) = self.pending {
            pending.painting.update_scrollable_layer(layer_id, x, y);
            if let Some(ref mut queued) = pending.queued {
                queued.update_scrollable_layer(layer_id, x, y);
            }
        }
    }

    /// Runs one frame: advances painting, swaps generations when the next one
    /// is ready, and draws the one on screen.
    pub fn draw_gl(&mut self, params: &FrameParams, device: &mut dyn Device, extras: Option<&GlExtras>) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();
        let single_surface = self.state.is_single_surface_rendering_mode();
        self.fast_swap_mode |= params.scrolling || single_surface;

        let visible = params.visible_content_rect;
        let try_fast_blit = !self.fast_swap_mode;
        let double_buffering = self.double_buffering();
        let mut did_collection_swap = false;

        match (self.pending.as_mut(), self.drawing.as_mut()) {
            (Some(pending), _) => {
                let painting = &mut pending.painting;
                painting.evaluate_animations(params.current_time);
                painting.prepare_gl(&visible, params.scale, try_fast_blit);
                painting.compute_textures_amount(&mut outcome.textures);

                if !double_buffering || painting.is_ready() {
                    did_collection_swap = true;
                    outcome.collections_swapped = true;
                    outcome.new_collection_has_animations = painting.has_composited_animations();
                }
            }
            (None, Some(drawing)) => {
                drawing.prepare_gl(&visible, params.scale, false);
                drawing.compute_textures_amount(&mut outcome.textures);
            }
            (None, None) => {}
        }

        if did_collection_swap {
            self.fast_swap_mode = false;
            next_content_update();
            self.swap();
            outcome.status |= DrawStatus::DRAW;
        }

        if self.pending.is_some() {
            outcome.status |= DrawStatus::INVOKE;
        }

        if !params.should_draw {
            let drawing_ready = self.pending.is_none() && self.drawing.as_ref().map_or(false, |d| d.is_ready());
            if did_collection_swap || drawing_ready {
                // Either a swap just happened or all work is done, so the
                // next real draw can show everything.
                if let Some(ref drawing) = self.drawing {
                    drawing.swap_tiles(!params.unclipped_draw);
                }
                self.prepare_promoted_collection(did_collection_swap, params, try_fast_blit);
                outcome.status |= DrawStatus::DRAW;
            } else {
                outcome.status |= DrawStatus::INVOKE;
            }
            return outcome;
        }

        let mut background = ColorF::WHITE;
        let mut draw_background = true;
        if self.drawing.is_some() {
            let has_painting = self.pending.is_some();
            let fast_swap = self.fast_swap_mode;
            let drawing_ready = {
                let drawing = self.drawing.as_ref().map_or(false, |d| did_collection_swap || d.is_ready());
                if did_collection_swap || fast_swap || (drawing && !has_painting) {
                    if let Some(ref drawing) = self.drawing {
                        drawing.swap_tiles(!params.unclipped_draw);
                    }
                }
                drawing
            };

            self.prepare_promoted_collection(did_collection_swap, params, try_fast_blit);

            if drawing_ready {
                // Content caught up.
                self.fast_swap_mode = false;
            } else {
                outcome.status |= DrawStatus::INVOKE;
            }

            if let Some(ref mut drawing) = self.drawing {
                drawing.evaluate_animations(params.current_time);
                background = drawing.background_color();
                draw_background = drawing.is_missing_background_content();
            }
        } else if let Some(ref pending) = self.pending {
            background = pending.painting.background_color();
        }

        if single_surface {
            // The flattened base surface goes stale when scrolling stops or
            // when new content arrives.
            let require_dirty_all = (self.previously_scrolling && !params.scrolling) || self.new_painting_collection;
            if let Some(ref mut drawing) = self.drawing {
                if require_dirty_all {
                    drawing.dirty_all_tiles();
                }
                if !drawing.is_base_surface_ready() {
                    outcome.status |= DrawStatus::INVOKE;
                }
            }
        }
        self.previously_scrolling = params.scrolling;
        self.new_painting_collection = false;

        if draw_background && background.is_opaque() {
            device.clear(background);
        }
        if let Some(ref mut drawing) = self.drawing {
            if drawing.draw_gl(&visible, device, &params.world_to_device(), extras) {
                outcome.status |= DrawStatus::DRAW;
            }
        }

        outcome
    }

    /// After a swap, the queued generation that was promoted to painting has
    /// to be prepared against the new generation on screen.
    fn prepare_promoted_collection(&mut self, did_collection_swap: bool, params: &FrameParams, try_fast_blit: bool) {
        if !did_collection_swap {
            return;
        }
        if let Some(ref mut pending) = self.pending {
            pending
                .painting
                .prepare_gl(&params.visible_content_rect, params.scale, try_fast_blit);
        }
    }
}

impl Drop for SurfaceCollectionManager {
    fn drop(&mut self) {
        self.clear_collections();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor_state::CompositorOptions;
    use crate::device::RecordingDevice;
    use crate::layer::{LayerNode, LayerTree};
    use euclid::{rect, size2};

    fn manager(double_buffering: bool) -> SurfaceCollectionManager {
        SurfaceCollectionManager::new(Arc::new(CompositorState::new(CompositorOptions {
            tile_size: 64,
            worker_threads: 0,
            double_buffering,
            ..CompositorOptions::default()
        })))
    }

    fn collection(manager: &SurfaceCollectionManager) -> SurfaceCollection {
        let tree = LayerTree::new(LayerNode::new(LayerId(1), size2(100.0, 100.0))).unwrap();
        SurfaceCollection::new(tree, Arc::clone(manager.state()))
    }

    fn params() -> FrameParams {
        FrameParams::new(0.0, rect(0, 0, 100, 100), rect(0.0, 0.0, 100.0, 100.0))
    }

    #[test]
    fn generations_rotate_through_the_slots() {
        let mut manager = manager(true);
        let first = collection(&manager);
        let first_id = first.id();
        assert!(!manager.update_with_surface_collection(Some(first), false));
        assert_eq!(manager.painting_id(), Some(first_id));

        let second = collection(&manager);
        let second_id = second.id();
        manager.update_with_surface_collection(Some(second), false);
        assert_eq!(manager.queued_id(), Some(second_id));

        let third = collection(&manager);
        let third_id = third.id();
        manager.update_with_surface_collection(Some(third), false);
        assert_eq!(manager.queued_id(), Some(third_id));

        let mut device = RecordingDevice::new();
        let outcome = manager.draw_gl(&params(), &mut device, None);
        assert!(outcome.collections_swapped);
        assert_eq!(manager.drawing_id(), Some(first_id));
        assert_eq!(manager.painting_id(), Some(third_id));
        assert_eq!(manager.queued_id(), None);
        assert!(outcome.status.contains(DrawStatus::DRAW | DrawStatus::INVOKE));
    }

    #[test]
    fn brand_new_content_drops_history() {
        let mut manager = manager(true);
        let first = collection(&manager);
        manager.update_with_surface_collection(Some(first), false);
        manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
        assert!(manager.drawing_id().is_some());

        let fresh = collection(&manager);
        let fresh_id = fresh.id();
        assert!(!manager.update_with_surface_collection(Some(fresh), true));
        assert_eq!(manager.drawing_id(), None);
        assert_eq!(manager.painting_id(), Some(fresh_id));

        manager.update_with_surface_collection(None, false);
        assert_eq!(manager.painting_id(), None);
    }

    #[test]
    fn backpressure_only_with_double_buffering() {
        for &double_buffering in &[true, false] {
            let mut manager = manager(double_buffering);
            let first = collection(&manager);
            manager.update_with_surface_collection(Some(first), false);
            manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
            let next = collection(&manager);
            assert_eq!(manager.update_with_surface_collection(Some(next), false), double_buffering);
        }
    }

    #[test]
    fn nothing_to_draw_is_not_an_error() {
        let mut manager = manager(true);
        let outcome = manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
        assert_eq!(outcome.status, DrawStatus::empty());
        assert!(!outcome.collections_swapped);
    }

    #[test]
    fn scrolling_enters_fast_swap_mode() {
        let mut manager = manager(true);
        let mut scrolling = params();
        scrolling.scrolling = true;
        scrolling.should_draw = false;
        manager.draw_gl(&scrolling, &mut RecordingDevice::new(), None);
        assert!(manager.is_fast_swap_mode());
    }
}
