/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use crate::error::CompositorError;
use crate::gl_extras::DrawExtra;
use crate::layer::LayerTree;
use crate::types::LayerId;

pub enum ApiMsg {
    /// A new generation; the flag marks content unrelated to the current one.
    SetLayerTree(LayerTree, bool),
    ScrollLayer(LayerId, f32, f32),
    SetDrawExtra(Option<DrawExtra>),
    ClearCollections,
}

/// Handle used by the content side to feed the renderer.
#[derive(Clone)]
pub struct RenderApi {
    pub(crate) tx: Sender<ApiMsg>,
    pub(crate) backed_up: Arc<AtomicBool>,
}

impl RenderApi {
    fn send(&self, msg: ApiMsg) -> Result<(), CompositorError> {
        self.tx.send(msg).map_err(|_| CompositorError::Disconnected)
    }

    pub fn set_layer_tree(&self, tree: LayerTree, brand_new: bool) -> Result<(), CompositorError> {
        self.send(ApiMsg::SetLayerTree(tree, brand_new))
    }

    pub fn scroll_layer(&self, layer_id: LayerId, x: f32, y: f32) -> Result<(), CompositorError> {
        self.send(ApiMsg::ScrollLayer(layer_id, x, y))
    }

    pub fn set_draw_extra(&self, extra: Option<DrawExtra>) -> Result<(), CompositorError> {
        self.send(ApiMsg::SetDrawExtra(extra))
    }

    pub fn clear_collections(&self) -> Result<(), CompositorError> {
        self.send(ApiMsg::ClearCollections)
    }

    /// True while the last generation sent is waiting behind the one on
    /// screen. Producers should hold off on new layer trees until it clears.
    pub fn is_backed_up(&self) -> bool {
        self.backed_up.load(Ordering::Acquire)
    }
}
