/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Overlays drawn on top of a layer's composited content every frame.
//!
//! These are not part of the tile content, so changing them never causes a
//! repaint: the cursor ring and the find-on-page highlights are drawn as
//! solid rects straight from their regions.

use crate::device::Device;
use crate::layer::Layer;
use crate::region::Region;
use crate::types::{ColorF, LayerId, LayerIntRect, LayerPixel, LayerToDeviceTransform};
use crate::types::WorldToDeviceTransform;

/// Above this many matches only the active one is highlighted.
pub const MAX_NUMBER_OF_MATCHES_TO_DRAW: usize = 101;

const RING_BORDER_WIDTH: i32 = 1;

// Holo blue.
const HIGHLIGHT_COLOR: u32 = 0xFF33B5E5;
const FILL_ALPHA: f32 = 0.4;
const BORDER_ALPHA: f32 = 0.8;
const FIND_ALPHA: f32 = 0.25;

/// Extra content supplied by the embedder.
pub trait ExtraContent {
    fn draw_gl(&self, layer: &Layer, device: &mut dyn Device, transform: &LayerToDeviceTransform);
}

#[derive(Clone, Debug, PartialEq)]
pub struct CursorRing {
    pub layer_id: LayerId,
    pub rings: Vec<LayerIntRect>,
    pub is_pressed: bool,
    pub is_button: bool,
}

#[derive(Clone, Debug)]
pub struct MatchInfo {
    pub layer_id: LayerId,
    pub region: Region<LayerPixel>,
}

#[derive(Clone, Debug, Default)]
pub struct FindOnPage {
    pub matches: Vec<MatchInfo>,
    /// Index of the active match.
    pub current: Option<usize>,
}

pub enum DrawExtra {
    CursorRing(CursorRing),
    FindOnPage(FindOnPage),
    Other(Box<dyn ExtraContent + Send>),
}

#[derive(Default)]
pub struct GlExtras {
    draw_extra: Option<DrawExtra>,
}

impl GlExtras {
    pub fn new() -> GlExtras {
        GlExtras::default()
    }

    pub fn set_draw_extra(&mut self, extra: Option<DrawExtra>) {
        self.draw_extra = extra;
    }

    pub fn draw_extra(&self) -> Option<&DrawExtra> {
        self.draw_extra.as_ref()
    }

    /// Draws the active extra for `layer`, if it has any part on it.
    pub fn draw_gl(&self, layer: &Layer, device: &mut dyn Device, world_to_device: &WorldToDeviceTransform) {
        let extra = match self.draw_extra {
            Some(ref extra) => extra,
            None => return,
        };
        let transform = layer.draw_transform().then(world_to_device);
        match *extra {
            DrawExtra::CursorRing(ref ring) => draw_cursor_ring(ring, layer, device, &transform),
            DrawExtra::FindOnPage(ref find) => draw_find_on_page(find, layer, device, &transform),
            DrawExtra::Other(ref content) => content.draw_gl(layer, device, &transform),
        }
    }
}

fn draw_cursor_ring(ring: &CursorRing, layer: &Layer, device: &mut dyn Device, transform: &LayerToDeviceTransform) {
    if ring.layer_id != layer.id() || ring.rings.is_empty() {
        return;
    }
    let mut region = Region::new();
    for rect in &ring.rings {
        region.union_rect(rect);
    }
    let color = ColorF::from_argb(HIGHLIGHT_COLOR);
    let color = if ring.is_pressed {
        color.scale_alpha(FILL_ALPHA)
    } else {
        color.scale_alpha(BORDER_ALPHA)
    };
    draw_region(device, &region, ring.is_pressed, !ring.is_button, transform, color);
}

fn draw_find_on_page(find: &FindOnPage, layer: &Layer, device: &mut dyn Device, transform: &LayerToDeviceTransform) {
    let color = ColorF::from_argb(HIGHLIGHT_COLOR).scale_alpha(FIND_ALPHA);
    if find.matches.len() < MAX_NUMBER_OF_MATCHES_TO_DRAW {
        for (index, info) in find.matches.iter().enumerate() {
            if info.layer_id != layer.id() {
                continue;
            }
            let active = find.current == Some(index);
            let color = if active { color.scale_alpha(2.0) } else { color };
            draw_region(device, &info.region, active, false, transform, color);
        }
    } else if let Some(info) = find.current.and_then(|index| find.matches.get(index)) {
        if info.layer_id == layer.id() {
            draw_region(device, &info.region, true, false, transform, color.scale_alpha(2.0));
        }
    }
}

/// Draws `region` as filled rects, as its outline, or both.
///
/// The outline is built from the region's boundary runs inflated by the
/// border width. Overlapping corners are clipped against what was already
/// drawn so translucent borders keep a uniform color.
pub fn draw_region(
    device: &mut dyn Device,
    region: &Region<LayerPixel>,
    fill: bool,
    draw_border: bool,
    transform: &LayerToDeviceTransform,
    color: ColorF,
) {
    if region.is_empty() {
        return;
    }
    if fill {
        for rect in region.rects() {
            device.draw_solid_rect(&rect.to_f32(), transform, color);
        }
        if !draw_border {
            return;
        }
    }

    let width = if fill { RING_BORDER_WIDTH } else { RING_BORDER_WIDTH * 2 };
    let mut drawn: Region<LayerPixel> = Region::new();
    for segment in region.boundary_segments() {
        let mut piece = Region::from_rect(segment.to_rect::<LayerPixel>(width));
        piece.subtract(&drawn);
        for rect in piece.rects() {
            device.draw_solid_rect(&rect.to_f32(), transform, color);
        }
        drawn.union(&piece);
    }
}
