/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! One generation of composited content.
//!
//! A `SurfaceCollection` owns a layer tree and the surfaces its layers were
//! grouped into. Layers are merged into a shared surface while they can be
//! painted together (plain translations, no dynamic transform); everything
//! else gets a surface of its own. The first surface always holds the root
//! layer and is called the base surface.

use euclid::rect;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::sync::Arc;
use crate::compositor_state::{next_content_update, CompositorState};
use crate::device::Device;
use crate::gl_extras::GlExtras;
use crate::layer::LayerTree;
use crate::surface::{DrawContext, Surface};
use crate::tiled_texture::TexturesResult;
use crate::types::{CollectionId, ColorF, LayerId, WorldRect, WorldToDeviceTransform};
use crate::util::MatrixHelpers;

struct MergeState {
    surfaces: Vec<SmallVec<[usize; 4]>>,
    /// Index into `surfaces` of the surface later layers may join.
    current: Option<usize>,
    /// Depth of nested dynamic-transform layers; nothing merges inside them.
    no_merge_level: usize,
}

fn can_join_surface(tree: &LayerTree, surface: &[usize], index: usize) -> bool {
    let first = tree.layer(surface[0]);
    let layer = tree.layer(index);
    if layer.needs_isolated_surface() || first.needs_isolated_surface() {
        return false;
    }
    layer.draw_transform().is_identity_or_translation() &&
        first.draw_transform().is_identity_or_translation()
}

fn assign_surfaces(tree: &LayerTree, index: usize, state: &mut MergeState) {
    let joined = match state.current {
        Some(current) if state.no_merge_level == 0 && can_join_surface(tree, &state.surfaces[current], index) => {
            state.surfaces[current].push(index);
            true
        }
        _ => false,
    };
    if !joined {
        let mut layers = SmallVec::new();
        layers.push(index);
        state.surfaces.push(layers);
        state.current = Some(state.surfaces.len() - 1);
    }

    let layer = tree.layer(index);
    let dynamic = layer.has_dynamic_transform();
    if dynamic {
        state.no_merge_level += 1;
    }

    // Children paint back to front.
    let mut children = layer.children().to_vec();
    children.sort_by(|&a, &b| {
        tree.layer(b).z_value().partial_cmp(&tree.layer(a).z_value()).unwrap_or(Ordering::Equal)
    });
    for child in children {
        assign_surfaces(tree, child, state);
    }

    if dynamic {
        state.no_merge_level -= 1;
        // Layers painted later must not join a surface that can move.
        state.current = None;
    }
    if layer.needs_isolated_surface() {
        state.current = None;
    }
}

/// Sort key of a surface when drawing.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DrawKey {
    pub depth: f32,
    pub parent: Option<usize>,
}

/// Returns the order to draw surfaces in.
///
/// Surfaces keep the order they were assigned in, except that a surface is
/// moved ahead of earlier siblings that are nearer than it. Only surfaces
/// whose first layers share a parent are compared, and the base surface
/// always comes first.
pub(crate) fn draw_order(keys: &[DrawKey]) -> Vec<usize> {
    let mut order: Vec<usize> = (0 .. keys.len()).collect();
    for i in 2 .. order.len() {
        let mut j = i;
        while j > 1 {
            let (a, b) = (keys[order[j]], keys[order[j - 1]]);
            if a.depth > b.depth && a.parent == b.parent {
                order.swap(j, j - 1);
                j -= 1;
            } else {
                break;
            }
        }
    }
    order
}

pub struct SurfaceCollection {
    id: CollectionId,
    tree: LayerTree,
    surfaces: Vec<Surface>,
    state: Arc<CompositorState>,
}

impl SurfaceCollection {
    pub fn new(mut tree: LayerTree, state: Arc<CompositorState>) -> SurfaceCollection {
        // Transforms and depths only need to be relative to each other here.
        tree.update_positions(&rect(0.0, 0.0, 1.0, 1.0));

        let mut merge = MergeState {
            surfaces: Vec::new(),
            current: None,
            no_merge_level: 0,
        };
        assign_surfaces(&tree, 0, &mut merge);

        let update_count = next_content_update();
        let surfaces: Vec<Surface> = merge
            .surfaces
            .into_iter()
            .enumerate()
            .map(|(i, layers)| {
                let mut surface = Surface::new(&tree, layers, i == 0, Arc::clone(&state));
                surface.set_update_count(update_count);
                surface
            })
            .collect();

        let id = CollectionId::new();
        debug!("collection {:?}: {} layers in {} surfaces", id, tree.len(), surfaces.len());
        SurfaceCollection {
            id,
            tree,
            surfaces,
            state,
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn tree(&self) -> &LayerTree {
        &self.tree
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    fn single_surface_mode(&self) -> bool {
        self.state.is_single_surface_rendering_mode()
    }

    fn update_layer_positions(&mut self, visible: &WorldRect) {
        self.tree.update_positions(visible);
    }

    /// Schedules paint work for every visible dirty tile. Painting may be
    /// replaced by a blit of prerendered content only if every surface
    /// supports it.
    pub fn prepare_gl(&mut self, visible: &WorldRect, scale: f32, try_fast_blit: bool) {
        self.update_layer_positions(visible);
        let tiles_disabled = self.single_surface_mode();
        let try_fast_blit = !tiles_disabled &&
            try_fast_blit &&
            self.surfaces.iter().all(|surface| surface.can_update_with_blit());
        for surface in &mut self.surfaces {
            surface.prepare(&self.tree, scale, tiles_disabled, try_fast_blit);
        }
    }

    fn draw_keys(&self) -> Vec<DrawKey> {
        self.surfaces
            .iter()
            .map(|surface| {
                let layer = self.tree.layer(surface.first_layer());
                DrawKey {
                    depth: layer.z_value(),
                    parent: layer.parent(),
                }
            })
            .collect()
    }

    /// Draws every surface. Returns true if another frame is needed to
    /// finish running animations.
    pub fn draw_gl(
        &mut self,
        visible: &WorldRect,
        device: &mut dyn Device,
        world_to_device: &WorldToDeviceTransform,
        extras: Option<&GlExtras>,
    ) -> bool {
        self.update_layer_positions(visible);
        let context = DrawContext {
            world_to_device: *world_to_device,
            extras,
            tiles_disabled: self.single_surface_mode(),
        };

        let mut needs_redraw = false;
        for index in draw_order(&self.draw_keys()) {
            needs_redraw |= self.surfaces[index].draw(&self.tree, device, &context);
        }
        needs_redraw
    }

    /// First layer ids of the surfaces, in draw order.
    pub fn drawing_order(&self) -> Vec<LayerId> {
        draw_order(&self.draw_keys())
            .into_iter()
            .map(|index| self.surfaces[index].layer_ids()[0])
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        if self.single_surface_mode() {
            return self.surfaces[0].is_ready();
        }
        self.surfaces.iter().all(|surface| surface.is_ready())
    }

    pub fn is_missing_background_content(&self) -> bool {
        self.surfaces[0].is_missing_content()
    }

    pub fn is_base_surface_ready(&self) -> bool {
        self.surfaces[0].is_ready()
    }

    pub fn swap_tiles(&self, calculate_framework_invals: bool) {
        for surface in &self.surfaces {
            surface.swap_tiles(&self.tree, calculate_framework_invals);
        }
    }

    /// Called when this collection starts painting. Surfaces take over the
    /// backing of the matching surface in `drawing`, so only what changed is
    /// repainted.
    pub fn set_is_painting(&mut self, drawing: Option<&SurfaceCollection>) {
        let drawing = match drawing {
            Some(drawing) => drawing,
            None => return,
        };
        let mut adopted = 0;
        for surface in &mut self.surfaces {
            if !surface.needs_texture() {
                continue;
            }
            for old in &drawing.surfaces {
                if surface.try_update_surface(&self.tree, old, &drawing.tree) {
                    adopted += 1;
                    break;
                }
            }
        }
        debug!("collection {:?} adopted {} backings from {:?}", self.id, adopted, drawing.id);
    }

    /// Called when this collection goes on screen.
    pub fn set_is_drawing(&mut self) {
        self.tree.init_animations();
    }

    /// Carries invalidations over to `replacement`, which supersedes this
    /// collection before it was ever painted.
    pub fn merge_invals_into(&self, replacement: &mut SurfaceCollection) {
        self.tree.merge_invals_into(&mut replacement.tree);
    }

    pub fn evaluate_animations(&mut self, current_time: f64) -> bool {
        self.tree.evaluate_animations(current_time)
    }

    pub fn has_composited_layers(&self) -> bool {
        !self.tree.root().children().is_empty()
    }

    pub fn has_composited_animations(&self) -> bool {
        self.tree.has_animations()
    }

    pub fn update_scrollable_layer(&mut self, layer_id: LayerId, x: f32, y: f32) -> bool {
        self.tree.set_scroll_offset(layer_id, x, y)
    }

    pub fn compute_textures_amount(&self, result: &mut TexturesResult) {
        for surface in &self.surfaces {
            surface.compute_textures_amount(&self.tree, result);
        }
    }

    pub fn background_color(&self) -> ColorF {
        self.tree.background_color()
    }

    /// Reports the pending invalidations of this generation to the host.
    pub fn add_framework_invals(&self) {
        self.state.add_framework_invals(&self.tree.framework_invals());
    }

    pub fn remove_painter_operations(&self) {
        for surface in &self.surfaces {
            surface.remove_painter_operations();
        }
    }

    pub fn dirty_all_tiles(&mut self) {
        self.tree.mark_all_dirty();
        for surface in &self.surfaces {
            surface.mark_all_dirty();
        }
    }
}
