/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use euclid::{Point2D, Rect, Size2D, Transform3D, Vector2D};
use fnv::FnvHasher;
use std::collections::{HashMap, HashSet};
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};

pub type FastHashMap<K, V> = HashMap<K, V, BuildHasherDefault<FnvHasher>>;
pub type FastHashSet<K> = HashSet<K, BuildHasherDefault<FnvHasher>>;

/// Coordinates local to a layer, before its draw transform is applied.
#[derive(Hash, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct LayerPixel;

/// Document coordinates at a scale of 1.0. The visible content rect lives here.
#[derive(Hash, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct WorldPixel;

/// Texture and framebuffer pixels.
#[derive(Hash, Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct DevicePixel;

pub type LayerRect = Rect<f32, LayerPixel>;
pub type LayerIntRect = Rect<i32, LayerPixel>;
pub type LayerPoint = Point2D<f32, LayerPixel>;
pub type LayerIntPoint = Point2D<i32, LayerPixel>;
pub type LayerSize = Size2D<f32, LayerPixel>;
pub type LayerVector = Vector2D<f32, LayerPixel>;
pub type LayerIntVector = Vector2D<i32, LayerPixel>;
pub type LayerTransform = Transform3D<f32, LayerPixel, LayerPixel>;
pub type LayerToWorldTransform = Transform3D<f32, LayerPixel, WorldPixel>;
pub type WorldToLayerTransform = Transform3D<f32, WorldPixel, LayerPixel>;

pub type WorldRect = Rect<f32, WorldPixel>;
pub type WorldIntRect = Rect<i32, WorldPixel>;
pub type WorldPoint = Point2D<f32, WorldPixel>;
pub type WorldToDeviceTransform = Transform3D<f32, WorldPixel, DevicePixel>;

pub type DeviceIntRect = Rect<i32, DevicePixel>;
pub type DeviceIntPoint = Point2D<i32, DevicePixel>;
pub type DeviceIntSize = Size2D<i32, DevicePixel>;
pub type LayerToDeviceTransform = Transform3D<f32, LayerPixel, DevicePixel>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorF {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorF {
    pub const WHITE: ColorF = ColorF { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };
    pub const BLACK: ColorF = ColorF { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const TRANSPARENT: ColorF = ColorF { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> ColorF {
        ColorF { r, g, b, a }
    }

    /// Builds a color from a packed `0xAARRGGBB` value.
    pub fn from_argb(argb: u32) -> ColorF {
        ColorF {
            a: ((argb >> 24) & 0xff) as f32 / 255.0,
            r: ((argb >> 16) & 0xff) as f32 / 255.0,
            g: ((argb >> 8) & 0xff) as f32 / 255.0,
            b: (argb & 0xff) as f32 / 255.0,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    pub fn scale_alpha(&self, alpha: f32) -> ColorF {
        ColorF { a: self.a * alpha, ..*self }
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        let to_u8 = |v: f32| (v.max(0.0).min(1.0) * 255.0).round() as u8;
        [to_u8(self.r), to_u8(self.g), to_u8(self.b), to_u8(self.a)]
    }
}

/// Identifies a layer across generations. Assigned by the DOM side.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct LayerId(pub u32);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct TextureId(pub u32);

impl TextureId {
    pub const INVALID: TextureId = TextureId(0);
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct CollectionId(pub u64);

impl CollectionId {
    pub fn new() -> CollectionId {
        static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(1);
        CollectionId(NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifies the owner of scheduled paint work, used to cancel it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct PainterId(pub u64);

impl PainterId {
    pub fn new() -> PainterId {
        static NEXT_PAINTER_ID: AtomicU64 = AtomicU64::new(1);
        PainterId(NEXT_PAINTER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argb_unpacking() {
        let color = ColorF::from_argb(0x8033B5E5);
        assert_eq!(color.to_rgba8(), [0x33, 0xB5, 0xE5, 0x80]);
        assert!(!color.is_opaque());
        assert!(ColorF::WHITE.is_opaque());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(CollectionId::new(), CollectionId::new());
        assert_ne!(PainterId::new(), PainterId::new());
    }
}
