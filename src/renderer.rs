/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The UI thread side of the compositor.
//!
//! The `Renderer` owns the generation scheduler and turns messages from a
//! `RenderApi` into work on it. Everything here runs on the thread that owns
//! the GL context; only paint work leaves it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use crate::compositor_state::{CompositorOptions, CompositorState};
use crate::device::Device;
use crate::gl_extras::GlExtras;
use crate::region::Region;
use crate::render_api::{ApiMsg, RenderApi};
use crate::surface_collection::SurfaceCollection;
use crate::surface_collection_manager::{FrameOutcome, FrameParams, SurfaceCollectionManager};
use crate::types::WorldPixel;
use crate::util::ProfileScope;

pub struct Renderer {
    api_rx: Receiver<ApiMsg>,
    backed_up: Arc<AtomicBool>,
    state: Arc<CompositorState>,
    manager: SurfaceCollectionManager,
    extras: GlExtras,
}

impl Renderer {
    pub fn new(options: CompositorOptions) -> (Renderer, RenderApi) {
        let (api_tx, api_rx) = channel();
        let backed_up = Arc::new(AtomicBool::new(false));

        info!(
            "starting compositor, {}px tiles, {} paint workers, double buffering {}",
            options.tile_size,
            options.worker_threads,
            options.double_buffering,
        );
        let state = Arc::new(CompositorState::new(options));

        let renderer = Renderer {
            api_rx,
            backed_up: Arc::clone(&backed_up),
            manager: SurfaceCollectionManager::new(Arc::clone(&state)),
            state,
            extras: GlExtras::new(),
        };

        let api = RenderApi {
            tx: api_tx,
            backed_up,
        };

        (renderer, api)
    }

    pub fn state(&self) -> &Arc<CompositorState> {
        &self.state
    }

    pub fn manager(&self) -> &SurfaceCollectionManager {
        &self.manager
    }

    /// Applies every pending message. Returns false once all `RenderApi`
    /// handles are gone and nothing is left to apply.
    pub fn update(&mut self) -> bool {
        loop {
            let msg = match self.api_rx.try_recv() {
                Ok(msg) => msg,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            };
            match msg {
                ApiMsg::SetLayerTree(tree, brand_new) => {
                    let _profile = ProfileScope::new("build collection");
                    let collection = SurfaceCollection::new(tree, Arc::clone(&self.state));
                    let backed_up = self.manager.update_with_surface_collection(Some(collection), brand_new);
                    self.backed_up.store(backed_up, Ordering::Release);
                }
                ApiMsg::ScrollLayer(layer_id, x, y) => {
                    self.manager.update_scrollable_layer(layer_id, x, y);
                }
                ApiMsg::SetDrawExtra(extra) => {
                    self.extras.set_draw_extra(extra);
                }
                ApiMsg::ClearCollections => {
                    self.manager.update_with_surface_collection(None, false);
                    self.backed_up.store(false, Ordering::Release);
                }
            }
        }
    }

    /// Draws a frame into `device`.
    pub fn render(&mut self, device: &mut dyn Device, params: &FrameParams) -> FrameOutcome {
        let _profile = ProfileScope::new("render");
        device.begin_frame(&params.viewport);
        for texture in self.state.take_released_textures() {
            device.delete_texture(texture);
        }
        let outcome = self.manager.draw_gl(params, device, Some(&self.extras));
        device.end_frame();

        if outcome.collections_swapped && self.manager.painting_collection().is_none() {
            self.backed_up.store(false, Ordering::Release);
        }
        trace!("frame status {:?}, textures {:?}", outcome.status, outcome.textures);
        outcome
    }

    /// Screen areas that changed since the last call.
    pub fn take_framework_invals(&self) -> Region<WorldPixel> {
        self.state.take_framework_invals()
    }

    /// Paints all queued tiles on the calling thread. Only needed when no
    /// paint workers were configured.
    pub fn paint_pending(&self) -> usize {
        self.state.tile_generator().paint_pending()
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.set_paused(paused);
    }

    pub fn set_single_surface_rendering_mode(&self, enabled: bool) {
        self.state.set_single_surface_rendering_mode(enabled);
    }
}
