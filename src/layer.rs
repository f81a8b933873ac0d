/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Layer trees.
//!
//! The DOM side describes a generation as a nested `LayerNode`, which is
//! flattened into a `LayerTree` arena when it is handed to the compositor.
//! Nodes are stored in pre-order, so a parent always precedes its children,
//! and parents are referenced by index only.

use euclid::{point2, Rect};
use std::sync::Arc;
use crate::animation::{AnimatedValue, Animation, AnimationState};
use crate::error::CompositorError;
use crate::layer_content::LayerContent;
use crate::region::Region;
use crate::types::{ColorF, FastHashMap, LayerId, LayerPixel, LayerPoint, LayerRect};
use crate::types::{LayerSize, LayerToWorldTransform, LayerTransform, LayerVector};
use crate::types::{WorldPixel, WorldRect};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollState {
    pub offset: LayerVector,
    pub max_offset: LayerVector,
}

impl ScrollState {
    pub fn new(max_offset: LayerVector) -> ScrollState {
        ScrollState {
            offset: LayerVector::zero(),
            max_offset,
        }
    }

    fn scroll_to(&mut self, x: f32, y: f32) {
        self.offset = LayerVector::new(
            x.max(0.0).min(self.max_offset.x),
            y.max(0.0).min(self.max_offset.y),
        );
    }
}

/// Description of one layer and its subtree, as produced by layout.
pub struct LayerNode {
    pub id: LayerId,
    pub position: LayerPoint,
    /// Transform origin, relative to the layer size (0.5, 0.5 is the center).
    pub anchor: LayerPoint,
    pub size: LayerSize,
    pub transform: LayerTransform,
    pub z_index: i32,
    pub scroll: Option<ScrollState>,
    pub content: Option<Arc<dyn LayerContent>>,
    pub animations: Vec<Animation>,
    pub inval: Region<LayerPixel>,
    pub fixed_position: bool,
    pub intrinsically_composited: bool,
    pub masks_to_bounds: bool,
    pub background_color: Option<ColorF>,
    pub children: Vec<LayerNode>,
}

impl LayerNode {
    pub fn new(id: LayerId, size: LayerSize) -> LayerNode {
        LayerNode {
            id,
            position: LayerPoint::zero(),
            anchor: point2(0.5, 0.5),
            size,
            transform: LayerTransform::identity(),
            z_index: 0,
            scroll: None,
            content: None,
            animations: Vec::new(),
            inval: Region::new(),
            fixed_position: false,
            intrinsically_composited: false,
            masks_to_bounds: false,
            background_color: None,
            children: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: LayerPoint) -> Self {
        self.position = position;
        self
    }

    pub fn with_anchor(mut self, anchor: LayerPoint) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_transform(mut self, transform: LayerTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn scrollable(mut self, max_offset: LayerVector) -> Self {
        self.scroll = Some(ScrollState::new(max_offset));
        self.masks_to_bounds = true;
        self
    }

    pub fn with_content(mut self, content: Arc<dyn LayerContent>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_animation(mut self, animation: Animation) -> Self {
        self.animations.push(animation);
        self
    }

    pub fn with_inval(mut self, inval: Region<LayerPixel>) -> Self {
        self.inval = inval;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed_position = true;
        self
    }

    pub fn composited(mut self) -> Self {
        self.intrinsically_composited = true;
        self
    }

    pub fn masks_to_bounds(mut self) -> Self {
        self.masks_to_bounds = true;
        self
    }

    pub fn with_background_color(mut self, color: ColorF) -> Self {
        self.background_color = Some(color);
        self
    }

    pub fn add_child(mut self, child: LayerNode) -> Self {
        self.children.push(child);
        self
    }
}

pub struct Layer {
    id: LayerId,
    parent: Option<usize>,
    children: Vec<usize>,
    position: LayerPoint,
    anchor: LayerPoint,
    size: LayerSize,
    transform: LayerTransform,
    z_index: i32,
    scroll: Option<ScrollState>,
    content: Option<Arc<dyn LayerContent>>,
    animations: Vec<AnimationState>,
    inval: Region<LayerPixel>,
    fixed_position: bool,
    intrinsically_composited: bool,
    masks_to_bounds: bool,
    background_color: Option<ColorF>,

    // Animated values.
    animated_opacity: f32,
    animated_offset: LayerVector,
    animations_running: bool,

    // Computed by `update_positions`.
    draw_transform: LayerToWorldTransform,
    child_transform: LayerToWorldTransform,
    z_value: f32,
    draw_opacity: f32,
    clip: Option<WorldRect>,
    child_clip: Option<WorldRect>,
    draw_clip: Option<WorldRect>,
}

impl Layer {
    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn size(&self) -> LayerSize {
        self.size
    }

    pub fn bounds(&self) -> LayerRect {
        Rect::new(LayerPoint::zero(), self.size)
    }

    pub fn content(&self) -> Option<&Arc<dyn LayerContent>> {
        self.content.as_ref()
    }

    pub fn inval(&self) -> &Region<LayerPixel> {
        &self.inval
    }

    pub fn background_color(&self) -> Option<ColorF> {
        self.background_color
    }

    pub fn scroll_offset(&self) -> Option<LayerVector> {
        self.scroll.map(|s| s.offset)
    }

    pub fn is_scrollable(&self) -> bool {
        self.scroll.is_some()
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_position
    }

    pub fn has_animations(&self) -> bool {
        !self.animations.is_empty()
    }

    /// True if an animation of this layer was still running at the last evaluation.
    pub fn has_running_animations(&self) -> bool {
        self.animations_running
    }

    pub fn needs_texture(&self) -> bool {
        self.content.as_ref().map_or(false, |c| !c.is_empty())
    }

    /// Layers whose position can change without a new generation.
    pub fn has_dynamic_transform(&self) -> bool {
        self.is_scrollable() || self.fixed_position || self.has_animations()
    }

    /// Layers that must be drawn from their own backing store.
    pub fn needs_isolated_surface(&self) -> bool {
        (self.needs_texture() && self.intrinsically_composited) || self.has_dynamic_transform()
    }

    pub fn draw_transform(&self) -> &LayerToWorldTransform {
        &self.draw_transform
    }

    /// Depth of the layer relative to its siblings; larger is farther away.
    pub fn z_value(&self) -> f32 {
        self.z_value
    }

    pub fn draw_opacity(&self) -> f32 {
        self.draw_opacity
    }

    /// The visible part of the layer in world space, if any.
    pub fn draw_clip(&self) -> Option<WorldRect> {
        self.draw_clip
    }
}

pub struct LayerTree {
    layers: Vec<Layer>,
    id_to_index: FastHashMap<LayerId, usize>,
}

impl LayerTree {
    pub fn new(root: LayerNode) -> Result<LayerTree, CompositorError> {
        let mut tree = LayerTree {
            layers: Vec::new(),
            id_to_index: FastHashMap::default(),
        };
        tree.add_node(root, None)?;
        Ok(tree)
    }

    fn add_node(&mut self, node: LayerNode, parent: Option<usize>) -> Result<usize, CompositorError> {
        let index = self.layers.len();
        if self.id_to_index.insert(node.id, index).is_some() {
            return Err(CompositorError::DuplicateLayerId(node.id));
        }
        if let Some(parent) = parent {
            self.layers[parent].children.push(index);
        }
        self.layers.push(Layer {
            id: node.id,
            parent,
            children: Vec::new(),
            position: node.position,
            anchor: node.anchor,
            size: node.size,
            transform: node.transform,
            z_index: node.z_index,
            scroll: node.scroll,
            content: node.content,
            animations: node.animations.into_iter().map(AnimationState::new).collect(),
            inval: node.inval,
            fixed_position: node.fixed_position,
            intrinsically_composited: node.intrinsically_composited,
            masks_to_bounds: node.masks_to_bounds,
            background_color: node.background_color,
            animated_opacity: 1.0,
            animated_offset: LayerVector::zero(),
            animations_running: false,
            draw_transform: LayerToWorldTransform::identity(),
            child_transform: LayerToWorldTransform::identity(),
            z_value: 0.0,
            draw_opacity: 1.0,
            clip: None,
            child_clip: None,
            draw_clip: None,
        });
        for child in node.children {
            self.add_node(child, Some(index))?;
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn root(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn layer(&self, index: usize) -> &Layer {
        &self.layers[index]
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.id_to_index.get(&id).cloned()
    }

    pub fn find_by_id(&self, id: LayerId) -> Option<&Layer> {
        self.index_of(id).map(|index| &self.layers[index])
    }

    pub fn background_color(&self) -> ColorF {
        self.root().background_color.unwrap_or(ColorF::WHITE)
    }

    /// Recomputes draw transforms, depths and clips for every layer.
    ///
    /// Fixed-position layers are attached to `visible_rect` rather than to
    /// their parent, so results depend on the visible rect.
    pub fn update_positions(&mut self, visible_rect: &WorldRect) {
        for index in 0 .. self.layers.len() {
            let (parent_transform, parent_clip, parent_opacity) = match self.layers[index].parent {
                Some(parent) => {
                    let parent = &self.layers[parent];
                    (parent.child_transform, parent.child_clip, parent.draw_opacity)
                }
                None => (LayerToWorldTransform::identity(), None, 1.0),
            };

            let layer = &mut self.layers[index];
            let base_transform = if layer.fixed_position {
                LayerToWorldTransform::translation(visible_rect.origin.x, visible_rect.origin.y, 0.0)
            } else {
                parent_transform
            };

            let origin = layer.position.to_vector() + layer.animated_offset;
            let anchor = LayerVector::new(layer.anchor.x * layer.size.width, layer.anchor.y * layer.size.height);
            let local = LayerTransform::translation(-anchor.x, -anchor.y, 0.0)
                .then(&layer.transform)
                .then(&LayerTransform::translation(anchor.x + origin.x, anchor.y + origin.y, 0.0));

            layer.draw_transform = local.then(&base_transform);
            layer.z_value = -(layer.z_index as f32) - layer.draw_transform.m43;
            layer.draw_opacity = parent_opacity * layer.animated_opacity;

            let scroll = layer.scroll.map_or(LayerVector::zero(), |s| s.offset);
            layer.child_transform = LayerTransform::translation(-scroll.x, -scroll.y, 0.0)
                .then(&layer.draw_transform);

            let world_bounds = layer.draw_transform.outer_transformed_rect(&Rect::new(LayerPoint::zero(), layer.size));
            layer.clip = if layer.fixed_position { None } else { parent_clip };
            layer.child_clip = if layer.masks_to_bounds {
                match (layer.clip, world_bounds) {
                    (Some(clip), Some(bounds)) => Some(clip.intersection(&bounds).unwrap_or_else(WorldRect::zero)),
                    (None, bounds) => bounds,
                    (clip, None) => clip,
                }
            } else {
                layer.clip
            };
            layer.draw_clip = world_bounds
                .and_then(|bounds| match layer.clip {
                    Some(clip) => bounds.intersection(&clip),
                    None => Some(bounds),
                })
                .and_then(|bounds| bounds.intersection(visible_rect));
        }
    }

    pub fn has_animations(&self) -> bool {
        self.layers.iter().any(|layer| layer.has_animations())
    }

    pub fn init_animations(&mut self) {
        for layer in &mut self.layers {
            for animation in &mut layer.animations {
                animation.init();
            }
        }
    }

    /// Advances every animation to `time`. Returns true while any is running.
    pub fn evaluate_animations(&mut self, time: f64) -> bool {
        let mut running = false;
        for layer in &mut self.layers {
            layer.animations_running = false;
            for animation in &mut layer.animations {
                let (value, still_running) = animation.evaluate(time);
                layer.animations_running |= still_running;
                running |= still_running;
                match value {
                    Some(AnimatedValue::Opacity(opacity)) => layer.animated_opacity = opacity,
                    Some(AnimatedValue::Translate(offset)) => layer.animated_offset = offset,
                    None => {}
                }
            }
        }
        running
    }

    /// Scrolls the layer `id` if it is a scroll container.
    pub fn set_scroll_offset(&mut self, id: LayerId, x: f32, y: f32) -> bool {
        let index = match self.index_of(id) {
            Some(index) => index,
            None => return false,
        };
        match self.layers[index].scroll {
            Some(ref mut scroll) => {
                scroll.scroll_to(x, y);
                true
            }
            None => false,
        }
    }

    /// Adds this tree's pending invalidations to the layers of `other` that
    /// share an id.
    pub fn merge_invals_into(&self, other: &mut LayerTree) {
        for layer in &self.layers {
            if layer.inval.is_empty() {
                continue;
            }
            if let Some(index) = other.index_of(layer.id) {
                other.layers[index].inval.union(&layer.inval);
            }
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for layer in &mut self.layers {
            if layer.needs_texture() {
                let bounds = layer.bounds().round_out().to_i32();
                layer.inval.union_rect(&bounds);
            }
        }
    }

    /// Pending invalidations mapped to world space.
    pub fn framework_invals(&self) -> Region<WorldPixel> {
        let mut invals = Region::new();
        for layer in &self.layers {
            if layer.inval.is_empty() {
                continue;
            }
            let bounds = layer.inval.bounds().to_f32();
            if let Some(world) = layer.draw_transform.outer_transformed_rect(&bounds) {
                invals.union_rect(&world.round_out().to_i32());
            }
        }
        invals
    }
}
