/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use crate::region::Region;
use crate::tile_generator::TileGenerator;
use crate::types::{TextureId, WorldIntRect, WorldPixel};
use crate::util::lock;

static CONTENT_UPDATES: AtomicUsize = AtomicUsize::new(0);

/// Bumps the process-wide content update counter and returns the new value.
///
/// The counter only ever grows. It stamps surfaces so their age can be
/// compared across generations; the value itself carries no meaning.
pub fn next_content_update() -> usize {
    CONTENT_UPDATES.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn content_updates() -> usize {
    CONTENT_UPDATES.load(Ordering::SeqCst)
}

#[derive(Clone, Debug)]
pub struct CompositorOptions {
    /// Edge length of a tile, in device pixels.
    pub tile_size: u32,
    /// Keep showing the previous generation until the next one is fully
    /// painted. When false, generations are shown as soon as they arrive.
    pub double_buffering: bool,
    /// Paint worker threads. Zero paints only when the host calls
    /// `TileGenerator::paint_pending`.
    pub worker_threads: usize,
    pub max_tiles_per_surface: usize,
    /// A surface with more dirty tiles than this is repainted, not blitted.
    pub blit_max_dirty_tiles: usize,
    pub enable_prerender: bool,
}

impl Default for CompositorOptions {
    fn default() -> CompositorOptions {
        CompositorOptions {
            tile_size: 256,
            double_buffering: true,
            worker_threads: 2,
            max_tiles_per_surface: 256,
            blit_max_dirty_tiles: 4,
            enable_prerender: true,
        }
    }
}

/// State shared by everything composited into one view.
pub struct CompositorState {
    options: CompositorOptions,
    tile_generator: TileGenerator,
    released_textures: Mutex<Vec<TextureId>>,
    framework_invals: Mutex<Region<WorldPixel>>,
    single_surface_rendering: AtomicBool,
}

impl CompositorState {
    pub fn new(options: CompositorOptions) -> CompositorState {
        let tile_generator = TileGenerator::new(options.worker_threads);
        CompositorState {
            options,
            tile_generator,
            released_textures: Mutex::new(Vec::new()),
            framework_invals: Mutex::new(Region::new()),
            single_surface_rendering: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &CompositorOptions {
        &self.options
    }

    pub fn tile_generator(&self) -> &TileGenerator {
        &self.tile_generator
    }

    /// Queues a texture for deletion the next time the GL context is current.
    pub fn release_texture(&self, texture: TextureId) {
        lock(&self.released_textures).push(texture);
    }

    pub fn take_released_textures(&self) -> Vec<TextureId> {
        std::mem::replace(&mut *lock(&self.released_textures), Vec::new())
    }

    pub fn add_framework_inval(&self, rect: &WorldIntRect) {
        lock(&self.framework_invals).union_rect(rect);
    }

    pub fn add_framework_invals(&self, region: &Region<WorldPixel>) {
        lock(&self.framework_invals).union(region);
    }

    /// Returns and clears the screen areas whose content changed.
    pub fn take_framework_invals(&self) -> Region<WorldPixel> {
        std::mem::replace(&mut *lock(&self.framework_invals), Region::new())
    }

    /// Low-end fallback: paint the whole page into the base surface only.
    pub fn set_single_surface_rendering_mode(&self, enabled: bool) {
        let was = self.single_surface_rendering.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!("single surface rendering {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn is_single_surface_rendering_mode(&self) -> bool {
        self.single_surface_rendering.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.tile_generator.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.tile_generator.is_paused()
    }
}
