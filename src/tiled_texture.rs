/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The tiled backing store of a surface.
//!
//! Tiles are double buffered. Paint workers fill a tile's back buffer
//! (`TileWork::painted`); `swap_tiles` commits it as the new front content,
//! which is uploaded to a texture the next time the tile is drawn. The front
//! content stays on screen while the tile is dirty and being repainted.
//!
//! All coordinates here are in surface space: the content space of the
//! surface's first layer, shifted so the surface area starts at the origin.

use euclid::{point2, size2, Rect};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use crate::canvas::{Bitmap, Canvas};
use crate::compositor_state::CompositorState;
use crate::device::Device;
use crate::picture_pile::PrerenderedInval;
use crate::region::Region;
use crate::tile_generator::PaintOp;
use crate::types::{DeviceIntRect, FastHashMap, FastHashSet, LayerIntRect, LayerPixel};
use crate::types::{LayerRect, LayerToDeviceTransform, PainterId, TextureId};
use crate::util::{lock, ProfileScope};

/// Draws a surface's content for a tile.
pub trait TilePainter: Send + Sync {
    /// Paints the whole surface; the canvas is already transformed and
    /// clipped to the tile.
    fn paint(&self, canvas: &mut dyn Canvas);

    fn can_update_with_blit(&self) -> bool {
        false
    }

    fn prerender_for_rect(&self, _rect: &LayerIntRect) -> Option<Arc<PrerenderedInval>> {
        None
    }

    /// Called once a prerendered bitmap has been copied into the tiles.
    fn clear_prerenders(&self) {}
}

/// Identifies who schedules paint work, and whether they are still around.
#[derive(Clone)]
pub struct PainterHandle {
    pub id: PainterId,
    pub alive: Arc<AtomicBool>,
    pub source: Arc<dyn TilePainter>,
}

#[derive(Debug, Default)]
pub(crate) struct TileWork {
    pub(crate) dirty: bool,
    /// Bumped whenever the tile is invalidated; paints of older versions are dropped.
    pub(crate) version: u64,
    /// Version of the paint op in flight, if any.
    pub(crate) scheduled: Option<u64>,
    /// Back buffer, painted and waiting for `swap_tiles`.
    pub(crate) painted: Option<Bitmap>,
}

impl TileWork {
    fn invalidate(&mut self) {
        self.dirty = true;
        self.version += 1;
        self.painted = None;
    }
}

pub(crate) struct TileBuffer {
    pub(crate) work: Mutex<TileWork>,
}

struct Tile {
    buffer: Arc<TileBuffer>,
    texture: Option<TextureId>,
    front: Option<Arc<Bitmap>>,
    needs_upload: bool,
}

impl Tile {
    fn new() -> Tile {
        Tile {
            buffer: Arc::new(TileBuffer {
                work: Mutex::new(TileWork {
                    dirty: true,
                    ..TileWork::default()
                }),
            }),
            texture: None,
            front: None,
            needs_upload: false,
        }
    }
}

/// Texture counts used to decide on eviction policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TexturesResult {
    pub fixed: usize,
    pub scrollable: usize,
    pub clipped: usize,
    pub full: usize,
}

impl TexturesResult {
    pub fn add(&mut self, other: &TexturesResult) {
        self.fixed += other.fixed;
        self.scrollable += other.scrollable;
        self.clipped += other.clipped;
        self.full += other.full;
    }
}

pub struct TiledTexture {
    state: Arc<CompositorState>,
    tiles: FastHashMap<(i32, i32), Tile>,
    /// Tiles covering the area passed to the last `prepare`, in paint order.
    required: Vec<(i32, i32)>,
    scale: f32,
    prepared: bool,
    /// Invalidations since the last prepare, candidates for a blit.
    blit_region: Region<LayerPixel>,
}

impl TiledTexture {
    pub fn new(state: Arc<CompositorState>) -> TiledTexture {
        TiledTexture {
            state,
            tiles: FastHashMap::default(),
            required: Vec::new(),
            scale: 1.0,
            prepared: false,
            blit_region: Region::new(),
        }
    }

    fn tile_size(&self) -> i32 {
        self.state.options().tile_size.max(1) as i32
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Surface-space rect covered by a tile.
    fn tile_rect(&self, x: i32, y: i32) -> LayerRect {
        let size = self.tile_size() as f32 / self.scale;
        Rect::new(point2(x as f32 * size, y as f32 * size), size2(size, size))
    }

    fn tile_device_rect(&self, x: i32, y: i32) -> DeviceIntRect {
        let size = self.tile_size();
        Rect::new(point2(x * size, y * size), size2(size, size))
    }

    /// Range of tile coordinates covering `area` at `scale`, as (x0, y0, x1, y1).
    fn tile_range(&self, area: &LayerIntRect, scale: f32) -> Option<(i32, i32, i32, i32)> {
        if area.is_empty() {
            return None;
        }
        let size = self.tile_size() as f32;
        let scaled = area.to_f32().scale(scale, scale);
        Some((
            (scaled.min_x() / size).floor() as i32,
            (scaled.min_y() / size).floor() as i32,
            (scaled.max_x() / size).ceil() as i32,
            (scaled.max_y() / size).ceil() as i32,
        ))
    }

    /// Number of tiles needed to cover `area` at `scale`.
    pub fn textures_needed(&self, area: &LayerIntRect, scale: f32) -> usize {
        match self.tile_range(area, scale) {
            Some((x0, y0, x1, y1)) => ((x1 - x0) * (y1 - y0)) as usize,
            None => 0,
        }
    }

    /// Makes sure the tiles covering `area` exist and that every dirty one is
    /// either patched from a prerendered bitmap (when `try_blit` allows it) or
    /// scheduled for painting.
    pub fn prepare(
        &mut self,
        scale: f32,
        area: &LayerIntRect,
        full_area: &LayerIntRect,
        painter: &PainterHandle,
        try_blit: bool,
    ) {
        let _profile = ProfileScope::new("prepare tiles");

        if scale != self.scale {
            if !self.tiles.is_empty() {
                debug!("scale changed {} -> {}, discarding tiles", self.scale, scale);
            }
            self.discard_textures();
            self.scale = scale;
        }

        let area = area.intersection(full_area).unwrap_or_else(Rect::zero);
        self.required.clear();
        if let Some((x0, y0, x1, y1)) = self.tile_range(&area, scale) {
            let max_tiles = self.state.options().max_tiles_per_surface;
            'rows: for y in y0 .. y1 {
                for x in x0 .. x1 {
                    if self.required.len() >= max_tiles {
                        warn!("surface needs more than {} tiles, truncating", max_tiles);
                        break 'rows;
                    }
                    self.required.push((x, y));
                }
            }
        }

        let required: FastHashSet<(i32, i32)> = self.required.iter().cloned().collect();
        let state = &self.state;
        self.tiles.retain(|key, tile| {
            let keep = required.contains(key);
            if !keep {
                if let Some(texture) = tile.texture.take() {
                    state.release_texture(texture);
                }
            }
            keep
        });
        for key in &self.required {
            self.tiles.entry(*key).or_insert_with(Tile::new);
        }

        if try_blit && !self.blit_region.is_empty() {
            self.update_with_blit(painter);
        }
        self.blit_region.clear();

        let mut ops = Vec::new();
        for &(x, y) in &self.required {
            let tile = &self.tiles[&(x, y)];
            let mut work = lock(&tile.buffer.work);
            if !work.dirty || work.scheduled.is_some() {
                continue;
            }
            work.scheduled = Some(work.version);
            ops.push(PaintOp {
                painter: painter.id,
                alive: Arc::clone(&painter.alive),
                tile: Arc::clone(&tile.buffer),
                version: work.version,
                source: Arc::clone(&painter.source),
                rect: self.tile_device_rect(x, y),
                scale,
            });
        }
        if !ops.is_empty() {
            trace!("scheduling {} tile paints for {:?}", ops.len(), painter.id);
        }
        let generator = self.state.tile_generator();
        for op in ops {
            generator.schedule(op);
        }
        self.prepared = true;
    }

    /// Patches dirty tiles directly from a prerendered bitmap of the
    /// invalidated area. Returns false, leaving the tiles dirty, when that is
    /// not possible.
    pub fn update_with_blit(&mut self, painter: &PainterHandle) -> bool {
        if !painter.source.can_update_with_blit() {
            return false;
        }
        let dirty: Vec<(i32, i32)> = self
            .required
            .iter()
            .cloned()
            .filter(|key| lock(&self.tiles[key].buffer.work).dirty)
            .collect();
        if dirty.is_empty() || dirty.len() > self.state.options().blit_max_dirty_tiles {
            return false;
        }
        if dirty.iter().any(|key| self.tiles[key].front.is_none()) {
            return false;
        }
        let prerendered = match painter.source.prerender_for_rect(&self.blit_region.bounds()) {
            Some(prerendered) => prerendered,
            None => return false,
        };

        let _profile = ProfileScope::new("blit tiles");
        let scale = self.scale;
        for (x, y) in dirty {
            let origin = self.tile_device_rect(x, y).origin;
            let tile = match self.tiles.get_mut(&(x, y)) {
                Some(tile) => tile,
                None => continue,
            };
            let mut bitmap = match tile.front {
                Some(ref front) => (**front).clone(),
                None => continue,
            };
            bitmap.save();
            bitmap.translate(euclid::vec2(-origin.x as f32, -origin.y as f32));
            bitmap.scale(scale);
            bitmap.draw_bitmap(&prerendered.bitmap, &prerendered.area.to_f32());
            bitmap.restore();

            tile.front = Some(Arc::new(bitmap));
            tile.needs_upload = true;
            let mut work = lock(&tile.buffer.work);
            // Any paint in flight is now older than the blitted content.
            work.version += 1;
            work.dirty = false;
            work.painted = None;
        }
        painter.source.clear_prerenders();
        debug!("updated {:?} with a blit", prerendered.area);
        true
    }

    pub fn mark_as_dirty(&mut self, region: &Region<LayerPixel>) {
        if region.is_empty() {
            return;
        }
        for (&(x, y), tile) in &self.tiles {
            let rect = self.tile_rect(x, y).round_out().to_i32();
            if region.intersects_rect(&rect) {
                lock(&tile.buffer.work).invalidate();
            }
        }
        self.blit_region.union(region);
    }

    pub fn mark_all_dirty(&mut self) {
        for tile in self.tiles.values() {
            lock(&tile.buffer.work).invalidate();
        }
    }

    /// Commits painted back buffers. Returns the surface-space rects of the
    /// tiles whose visible content changed.
    pub fn swap_tiles(&mut self) -> Vec<LayerRect> {
        let mut swapped = Vec::new();
        let mut keys: Vec<(i32, i32)> = Vec::new();
        for (key, tile) in &mut self.tiles {
            let painted = lock(&tile.buffer.work).painted.take();
            if let Some(bitmap) = painted {
                tile.front = Some(Arc::new(bitmap));
                tile.needs_upload = true;
                keys.push(*key);
            }
        }
        for (x, y) in keys {
            swapped.push(self.tile_rect(x, y));
        }
        swapped
    }

    /// True when every required tile has up to date content, committed or
    /// waiting to be swapped in.
    pub fn is_ready(&self) -> bool {
        self.prepared && self.required.iter().all(|key| {
            let tile = &self.tiles[key];
            let work = lock(&tile.buffer.work);
            !work.dirty && (work.painted.is_some() || tile.front.is_some())
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.required
            .iter()
            .any(|key| lock(&self.tiles[key].buffer.work).dirty)
    }

    /// True when some required tile has nothing to show yet.
    pub fn is_missing_content(&self) -> bool {
        !self.prepared || self.required.iter().any(|key| self.tiles[key].front.is_none())
    }

    pub fn draw(&mut self, device: &mut dyn Device, transform: &LayerToDeviceTransform, opacity: f32) {
        let tile_size = self.tile_size();
        let required = self.required.clone();
        for (x, y) in required {
            let rect = self.tile_rect(x, y);
            let tile = match self.tiles.get_mut(&(x, y)) {
                Some(tile) => tile,
                None => continue,
            };
            let front = match tile.front {
                Some(ref front) => front,
                None => continue,
            };
            if tile.needs_upload {
                let texture = match tile.texture {
                    Some(texture) => texture,
                    None => {
                        let texture = device.create_texture(size2(tile_size, tile_size));
                        tile.texture = Some(texture);
                        texture
                    }
                };
                device.upload_texture(texture, front);
                tile.needs_upload = false;
            }
            if let Some(texture) = tile.texture {
                device.draw_texture(texture, &rect, transform, opacity);
            }
        }
    }

    /// Releases every tile and its texture.
    pub fn discard_textures(&mut self) {
        for (_, tile) in self.tiles.drain() {
            if let Some(texture) = tile.texture {
                self.state.release_texture(texture);
            }
        }
        self.required.clear();
        self.prepared = false;
    }
}

impl Drop for TiledTexture {
    fn drop(&mut self) {
        self.discard_textures();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor_state::CompositorOptions;
    use crate::device::{DeviceCommand, RecordingDevice};
    use crate::types::{ColorF, PainterId};
    use euclid::rect;
    use std::sync::atomic::Ordering;

    struct Solid(ColorF);

    impl TilePainter for Solid {
        fn paint(&self, canvas: &mut dyn Canvas) {
            canvas.fill_rect(&rect(0.0, 0.0, 10000.0, 10000.0), self.0);
        }
    }

    fn state() -> Arc<CompositorState> {
        Arc::new(CompositorState::new(CompositorOptions {
            tile_size: 64,
            worker_threads: 0,
            ..CompositorOptions::default()
        }))
    }

    fn handle(color: ColorF) -> PainterHandle {
        PainterHandle {
            id: PainterId::new(),
            alive: Arc::new(AtomicBool::new(true)),
            source: Arc::new(Solid(color)),
        }
    }

    #[test]
    fn prepare_schedules_each_dirty_tile_once() {
        let state = state();
        let mut texture = TiledTexture::new(Arc::clone(&state));
        let painter = handle(ColorF::BLACK);
        let full = rect(0, 0, 200, 100);

        texture.prepare(1.0, &full, &full, &painter, false);
        // 200x100 at 64px tiles is a 4x2 grid.
        assert_eq!(state.tile_generator().pending_count(), 8);
        texture.prepare(1.0, &full, &full, &painter, false);
        assert_eq!(state.tile_generator().pending_count(), 8);

        assert!(!texture.is_ready());
        assert!(texture.is_missing_content());
        state.tile_generator().paint_pending();
        assert!(texture.is_ready());
        assert!(texture.is_missing_content());

        assert_eq!(texture.swap_tiles().len(), 8);
        assert!(!texture.is_missing_content());
        assert!(texture.swap_tiles().is_empty());
    }

    #[test]
    fn dirty_tiles_keep_showing_front_content() {
        let state = state();
        let mut texture = TiledTexture::new(Arc::clone(&state));
        let painter = handle(ColorF::BLACK);
        let full = rect(0, 0, 128, 64);
        texture.prepare(1.0, &full, &full, &painter, false);
        state.tile_generator().paint_pending();
        texture.swap_tiles();

        texture.mark_as_dirty(&Region::from_rect(rect(70, 0, 4, 4)));
        assert!(texture.is_dirty());
        assert!(!texture.is_missing_content());
        texture.prepare(1.0, &full, &full, &painter, false);
        assert_eq!(state.tile_generator().pending_count(), 1);

        let mut device = RecordingDevice::new();
        texture.draw(&mut device, &LayerToDeviceTransform::identity(), 1.0);
        let draws = device
            .commands()
            .iter()
            .filter(|c| match **c {
                DeviceCommand::DrawTexture { .. } => true,
                _ => false,
            })
            .count();
        assert_eq!(draws, 2);
    }

    #[test]
    fn blit_patches_tiles_without_painting() {
        struct Blittable {
            cleared: AtomicBool,
        }

        impl TilePainter for Blittable {
            fn paint(&self, canvas: &mut dyn Canvas) {
                canvas.fill_rect(&rect(0.0, 0.0, 10000.0, 10000.0), ColorF::BLACK);
            }

            fn can_update_with_blit(&self) -> bool {
                true
            }

            fn prerender_for_rect(&self, area: &LayerIntRect) -> Option<Arc<PrerenderedInval>> {
                let mut bitmap = Bitmap::new(size2(area.size.width, area.size.height));
                bitmap.clear(ColorF::WHITE);
                Some(Arc::new(PrerenderedInval { area: *area, bitmap }))
            }

            fn clear_prerenders(&self) {
                self.cleared.store(true, Ordering::SeqCst);
            }
        }

        let state = state();
        let mut texture = TiledTexture::new(Arc::clone(&state));
        let source = Arc::new(Blittable {
            cleared: AtomicBool::new(false),
        });
        let painter = PainterHandle {
            id: PainterId::new(),
            alive: Arc::new(AtomicBool::new(true)),
            source: source.clone(),
        };
        let full = rect(0, 0, 64, 64);
        texture.prepare(1.0, &full, &full, &painter, true);
        state.tile_generator().paint_pending();
        texture.swap_tiles();

        texture.mark_as_dirty(&Region::from_rect(rect(8, 8, 4, 4)));
        texture.prepare(1.0, &full, &full, &painter, true);
        assert_eq!(state.tile_generator().pending_count(), 0);
        assert!(texture.is_ready());
        assert!(source.cleared.load(Ordering::SeqCst));

        let mut device = RecordingDevice::new();
        texture.draw(&mut device, &LayerToDeviceTransform::identity(), 1.0);
        let uploaded = device.uploaded_pixel(TextureId(1), 9, 9);
        assert_eq!(uploaded, Some([255, 255, 255, 255]));
        assert_eq!(device.uploaded_pixel(TextureId(1), 30, 30), Some([0, 0, 0, 255]));
    }

    #[test]
    fn dropping_releases_textures() {
        let state = state();
        let mut texture = TiledTexture::new(Arc::clone(&state));
        let painter = handle(ColorF::BLACK);
        let full = rect(0, 0, 64, 64);
        texture.prepare(1.0, &full, &full, &painter, false);
        state.tile_generator().paint_pending();
        texture.swap_tiles();
        let mut device = RecordingDevice::new();
        texture.draw(&mut device, &LayerToDeviceTransform::identity(), 1.0);

        painter.alive.store(false, Ordering::Release);
        drop(texture);
        assert_eq!(state.take_released_textures(), vec![TextureId(1)]);
    }

    #[test]
    fn counts_textures_for_areas() {
        let texture = TiledTexture::new(state());
        assert_eq!(texture.textures_needed(&rect(0, 0, 64, 64), 1.0), 1);
        assert_eq!(texture.textures_needed(&rect(0, 0, 65, 64), 1.0), 2);
        assert_eq!(texture.textures_needed(&rect(0, 0, 64, 64), 2.0), 4);
        assert_eq!(texture.textures_needed(&rect(0, 0, 0, 64), 1.0), 0);
    }
}
