/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Surfaces: groups of layers drawn from one tiled backing store.
//!
//! A surface's backing is shared with the matching surface of the previous
//! generation (see `try_update_surface`), so the generation on screen keeps
//! drawing committed tiles while the next one repaints only what changed.

use euclid::{point2, Rect};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::canvas::Canvas;
use crate::compositor_state::{content_updates, CompositorState};
use crate::device::Device;
use crate::gl_extras::GlExtras;
use crate::layer::LayerTree;
use crate::layer_content::LayerContent;
use crate::picture_pile::PrerenderedInval;
use crate::region::Region;
use crate::tiled_texture::{PainterHandle, TexturesResult, TiledTexture, TilePainter};
use crate::types::{LayerId, LayerIntRect, LayerPixel, LayerPoint, LayerRect, LayerSize};
use crate::types::{LayerToWorldTransform, LayerTransform, LayerVector, PainterId};
use crate::types::{WorldRect, WorldToDeviceTransform};
use crate::util::MatrixHelpers;

struct PaintedLayer {
    /// Layer origin in surface space.
    offset: LayerVector,
    size: LayerSize,
    content: Arc<dyn LayerContent>,
}

/// Paints the member layers of a surface. Shared with paint workers.
struct SurfacePainter {
    layers: Vec<PaintedLayer>,
}

impl TilePainter for SurfacePainter {
    fn paint(&self, canvas: &mut dyn Canvas) {
        for layer in &self.layers {
            canvas.save();
            canvas.translate(layer.offset);
            canvas.clip_rect(&Rect::new(LayerPoint::zero(), layer.size));
            layer.content.draw(canvas);
            canvas.restore();
        }
    }

    fn can_update_with_blit(&self) -> bool {
        match self.layers[..] {
            [ref layer] => layer.offset == LayerVector::zero() && layer.content.can_update_with_blit(),
            _ => false,
        }
    }

    fn prerender_for_rect(&self, rect: &LayerIntRect) -> Option<Arc<PrerenderedInval>> {
        match self.layers[..] {
            [ref layer] if layer.offset == LayerVector::zero() => layer.content.prerender_for_rect(rect),
            _ => None,
        }
    }

    fn clear_prerenders(&self) {
        for layer in &self.layers {
            layer.content.clear_prerenders();
        }
    }
}

/// Arguments shared by every surface drawn in a frame.
pub struct DrawContext<'a> {
    pub world_to_device: WorldToDeviceTransform,
    pub extras: Option<&'a GlExtras>,
    pub tiles_disabled: bool,
}

pub struct Surface {
    /// Member layers, as indices into the generation's tree. The first one
    /// defines the surface's coordinate space and stacking position.
    layers: SmallVec<[usize; 4]>,
    layer_ids: SmallVec<[LayerId; 4]>,
    /// Member layer rects in surface space.
    layer_rects: SmallVec<[LayerRect; 4]>,
    /// Surface area in the first layer's space.
    area: LayerIntRect,
    is_base: bool,
    needs_texture: bool,
    update_count: usize,
    painter: PainterHandle,
    /// Paints every layer of the tree; only the base surface has one, used in
    /// single surface rendering mode.
    flattened_painter: Option<PainterHandle>,
    backing: Option<Rc<RefCell<TiledTexture>>>,
    state: Arc<CompositorState>,
}

impl Surface {
    pub fn new(
        tree: &LayerTree,
        layers: SmallVec<[usize; 4]>,
        is_base: bool,
        state: Arc<CompositorState>,
    ) -> Surface {
        debug_assert!(!layers.is_empty());
        let first_transform = *tree.layer(layers[0]).draw_transform();

        // Member offsets relative to the first layer. Merging only happens for
        // translations, so the difference of the translation terms is exact.
        let mut rects: SmallVec<[LayerRect; 4]> = SmallVec::new();
        for &index in &layers {
            let layer = tree.layer(index);
            let offset = LayerVector::new(
                layer.draw_transform().m41 - first_transform.m41,
                layer.draw_transform().m42 - first_transform.m42,
            );
            rects.push(layer.bounds().translate(offset));
        }
        let area = rects
            .iter()
            .fold(None, |acc: Option<LayerRect>, r| Some(acc.map_or(*r, |acc| acc.union(r))))
            .unwrap_or_else(LayerRect::zero)
            .round_out()
            .to_i32();
        let origin = area.origin.to_vector().to_f32();
        let layer_rects: SmallVec<[LayerRect; 4]> = rects.iter().map(|r| r.translate(-origin)).collect();

        let painted = layers
            .iter()
            .zip(layer_rects.iter())
            .filter_map(|(&index, rect)| {
                let layer = tree.layer(index);
                match layer.content() {
                    Some(content) if layer.needs_texture() => Some(PaintedLayer {
                        offset: rect.origin.to_vector(),
                        size: rect.size,
                        content: Arc::clone(content),
                    }),
                    _ => None,
                }
            })
            .collect::<Vec<_>>();
        let needs_texture = !painted.is_empty();

        let alive = Arc::new(AtomicBool::new(true));
        let id = PainterId::new();
        let painter = PainterHandle {
            id,
            alive: Arc::clone(&alive),
            source: Arc::new(SurfacePainter { layers: painted }),
        };
        let flattened_painter = if is_base {
            Some(PainterHandle {
                id,
                alive,
                source: Arc::new(flatten_tree(tree, &first_transform, &origin)),
            })
        } else {
            None
        };

        Surface {
            layer_ids: layers.iter().map(|&index| tree.layer(index).id()).collect(),
            layers,
            layer_rects,
            area,
            is_base,
            needs_texture,
            update_count: content_updates(),
            painter,
            flattened_painter,
            backing: None,
            state,
        }
    }

    pub fn first_layer(&self) -> usize {
        self.layers[0]
    }

    pub fn layer_ids(&self) -> &[LayerId] {
        &self.layer_ids
    }

    pub fn is_base(&self) -> bool {
        self.is_base
    }

    pub fn single_layer(&self) -> bool {
        self.layers.len() == 1
    }

    pub fn needs_texture(&self) -> bool {
        self.needs_texture
    }

    pub fn update_count(&self) -> usize {
        self.update_count
    }

    pub(crate) fn set_update_count(&mut self, update_count: usize) {
        self.update_count = update_count;
    }

    pub fn painter_id(&self) -> PainterId {
        self.painter.id
    }

    pub fn has_backing(&self) -> bool {
        self.backing.is_some()
    }

    /// True if this surface draws from the same backing store as `other`.
    pub fn shares_backing_with(&self, other: &Surface) -> bool {
        match (&self.backing, &other.backing) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn full_area(&self) -> LayerIntRect {
        Rect::new(point2(0, 0), self.area.size)
    }

    /// Surface space to world space.
    pub fn draw_transform(&self, tree: &LayerTree) -> LayerToWorldTransform {
        let origin = self.area.origin.to_f32();
        LayerTransform::translation(origin.x, origin.y, 0.0).then(tree.layer(self.first_layer()).draw_transform())
    }

    /// The part of the surface visible in the current frame, in surface space.
    fn compute_prepare_area(&self, tree: &LayerTree) -> LayerIntRect {
        let visible = self
            .layers
            .iter()
            .filter_map(|&index| tree.layer(index).draw_clip())
            .fold(None, |acc: Option<WorldRect>, r| Some(acc.map_or(r, |acc| acc.union(&r))));
        let visible = match visible {
            Some(visible) => visible,
            None => return LayerIntRect::zero(),
        };
        let to_surface = match self.draw_transform(tree).inverse() {
            Some(inverse) => inverse,
            None => return LayerIntRect::zero(),
        };
        to_surface
            .outer_transformed_rect(&visible)
            .map(|rect| rect.round_out().to_i32())
            .and_then(|rect| rect.intersection(&self.full_area()))
            .unwrap_or_else(LayerIntRect::zero)
    }

    pub fn can_update_with_blit(&self) -> bool {
        !self.needs_texture || self.painter.source.can_update_with_blit()
    }

    pub fn prepare(&mut self, tree: &LayerTree, scale: f32, layer_tiles_disabled: bool, try_blit: bool) {
        let single_surface = layer_tiles_disabled && self.is_base;
        if !self.needs_texture && !single_surface {
            return;
        }
        let tiles_disabled = layer_tiles_disabled && !self.is_base;
        let prepare_area = self.compute_prepare_area(tree);
        let full_area = self.full_area();

        let state = &self.state;
        let backing = self
            .backing
            .get_or_insert_with(|| Rc::new(RefCell::new(TiledTexture::new(Arc::clone(state)))));
        if tiles_disabled {
            backing.borrow_mut().discard_textures();
            return;
        }
        // An empty area still prepares, leaving no required tiles, so an
        // off-screen surface counts as ready.
        let painter = match self.flattened_painter {
            Some(ref flattened) if single_surface => flattened,
            _ => &self.painter,
        };
        backing.borrow_mut().prepare(scale, &prepare_area, &full_area, painter, try_blit);
    }

    /// Draws the backing and then the per-layer extras. Returns true if a
    /// member layer is still animating.
    pub fn draw(&self, tree: &LayerTree, device: &mut dyn Device, context: &DrawContext) -> bool {
        let first = tree.layer(self.first_layer());
        let ask_redraw = self.layers.iter().any(|&index| tree.layer(index).has_running_animations());
        if self.single_layer() && first.draw_clip().is_none() {
            return ask_redraw;
        }

        let tiles_disabled = context.tiles_disabled && !self.is_base;
        if let Some(backing) = self.backing.as_ref().filter(|_| !tiles_disabled) {
            let transform = self.draw_transform(tree).then(&context.world_to_device);
            let opacity = if self.single_layer() { first.draw_opacity() } else { 1.0 };
            backing.borrow_mut().draw(device, &transform, opacity);
        }

        if let Some(extras) = context.extras {
            for &index in &self.layers {
                extras.draw_gl(tree.layer(index), device, &context.world_to_device);
            }
        }
        ask_redraw
    }

    pub fn is_ready(&self) -> bool {
        self.backing.as_ref().map_or(true, |backing| backing.borrow().is_ready())
    }

    pub fn is_missing_content(&self) -> bool {
        self.backing.as_ref().map_or(true, |backing| backing.borrow().is_missing_content())
    }

    /// Commits painted tiles. With `calculate_framework_invals`, the screen
    /// area of every changed tile is reported to the host.
    pub fn swap_tiles(&self, tree: &LayerTree, calculate_framework_invals: bool) {
        let backing = match self.backing {
            Some(ref backing) => backing,
            None => return,
        };
        let swapped = backing.borrow_mut().swap_tiles();
        if !calculate_framework_invals || swapped.is_empty() {
            return;
        }
        let transform = self.draw_transform(tree);
        for rect in swapped {
            if let Some(world) = transform.outer_transformed_rect(&rect) {
                self.state.add_framework_inval(&world.round_out().to_i32());
            }
        }
    }

    pub fn mark_all_dirty(&self) {
        if let Some(ref backing) = self.backing {
            backing.borrow_mut().mark_all_dirty();
        }
    }

    pub fn remove_painter_operations(&self) {
        self.state.tile_generator().remove_operations_for_painter(self.painter.id);
    }

    /// Takes over the backing of `old`, the matching surface of the previous
    /// generation, invalidating whatever changed in between. Returns false if
    /// the surfaces do not match.
    pub fn try_update_surface(&mut self, tree: &LayerTree, old: &Surface, old_tree: &LayerTree) -> bool {
        if !self.needs_texture || !old.needs_texture {
            return false;
        }
        if self.layer_ids[0] != old.layer_ids[0] {
            return false;
        }
        // Tiles of a newer generation may already show content this one
        // does not have.
        if old.update_count >= self.update_count {
            warn!("surface {:?} refuses a backing from a newer generation", self.layer_ids[0]);
            return false;
        }

        self.backing = old.backing.clone();
        let backing = match self.backing {
            Some(ref backing) => backing,
            None => return true,
        };

        let mut inval: Region<LayerPixel> = Region::new();
        let mut full_inval = false;
        if self.single_layer() && old.single_layer() {
            let layer = tree.layer(self.first_layer());
            inval = layer.inval().clone();
            inval.translate(-self.area.origin.to_vector());
            if self.is_base {
                // The base surface paints outside its content to cover the
                // viewport, so a size change can leave stale tiles anywhere.
                let size = |tree: &LayerTree, index: usize| {
                    tree.layer(index).content().map(|c| (c.width(), c.height()))
                };
                full_inval = size(tree, self.first_layer()) != size(old_tree, old.first_layer());
            }
        } else {
            full_inval = self.layers.len() != old.layers.len();
            if !full_inval {
                for i in 0 .. self.layers.len() {
                    if self.layer_ids[i] != old.layer_ids[i] || self.layer_rects[i] != old.layer_rects[i] {
                        full_inval = true;
                        break;
                    }
                    let layer = tree.layer(self.layers[i]);
                    if !layer.inval().is_empty() {
                        let mut layer_inval = layer.inval().clone();
                        let origin = self.layer_rects[i].origin.round().to_i32();
                        layer_inval.translate(origin.to_vector());
                        inval.union(&layer_inval);
                    }
                }
            }
        }

        if full_inval {
            inval = Region::infinite();
        }
        debug!("surface {:?} adopts backing, full inval {}", self.layer_ids[0], full_inval);
        backing.borrow_mut().mark_as_dirty(&inval);
        true
    }

    pub fn compute_textures_amount(&self, tree: &LayerTree, result: &mut TexturesResult) {
        let backing = match self.backing {
            Some(ref backing) if !self.is_base => backing.borrow(),
            _ => return,
        };
        let layer = tree.layer(self.first_layer());
        let scale = backing.scale();
        let clipped = backing.textures_needed(&self.compute_prepare_area(tree), scale);
        let unclipped = backing.textures_needed(&self.full_area(), scale);

        if layer.is_fixed() {
            result.fixed += clipped;
        }
        if layer.is_scrollable() || layer.is_fixed() {
            result.scrollable += clipped;
        }
        result.clipped += clipped;
        result.full += if layer.is_scrollable() { clipped } else { unclipped };
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // Anything still painting for this surface must not commit.
        self.painter.alive.store(false, Ordering::Release);
        self.remove_painter_operations();
    }
}

/// Builds a painter drawing every layer whose placement relative to the
/// surface is a plain translation.
fn flatten_tree(tree: &LayerTree, base_transform: &LayerToWorldTransform, origin: &LayerVector) -> SurfacePainter {
    let mut layers = Vec::new();
    for layer in tree.layers() {
        let content = match layer.content() {
            Some(content) if layer.needs_texture() => content,
            _ => continue,
        };
        let transform = layer.draw_transform();
        if !transform.is_identity_or_translation() {
            continue;
        }
        let offset = LayerVector::new(
            transform.m41 - base_transform.m41,
            transform.m42 - base_transform.m42,
        ) - *origin;
        layers.push(PaintedLayer {
            offset,
            size: layer.size(),
            content: Arc::clone(content),
        });
    }
    SurfacePainter { layers }
}
