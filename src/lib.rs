/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

/*!
A tiled, double-buffered compositor for retained layer trees.

The content side builds a [`LayerTree`] for every layout generation and sends
it through a [`RenderApi`]. On the UI thread, the [`Renderer`] groups the
tree's layers into surfaces, each backed by a grid of tiles that paint
workers fill in the background, and draws them with a [`Device`].

A new generation only replaces the one on screen once all its visible tiles
are painted. Tiles that did not change are shared between generations, so
only invalidated areas are ever repainted.

```ignore
let (mut renderer, api) = Renderer::new(CompositorOptions::default());
api.set_layer_tree(tree, false)?;

// Once per display refresh:
renderer.update();
let outcome = renderer.render(&mut device, &params);
if outcome.status.contains(DrawStatus::INVOKE) {
    // schedule another frame
}
```
*/

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

mod animation;
mod canvas;
mod compositor_state;
mod device;
mod error;
mod gl_extras;
mod layer;
mod layer_content;
mod picture_pile;
mod region;
mod render_api;
mod renderer;
mod surface;
mod surface_collection;
mod surface_collection_manager;
mod tile_generator;
mod tiled_texture;
mod types;
mod util;

pub use crate::animation::{AnimatedProperty, AnimatedValue, Animation};
pub use crate::canvas::{Bitmap, Canvas, DrawCommand, Picture, PictureRecorder};
pub use crate::compositor_state::{content_updates, next_content_update, CompositorOptions, CompositorState};
pub use crate::device::{Device, DeviceCommand, GlDevice, RecordingDevice};
pub use crate::error::CompositorError;
pub use crate::gl_extras::{CursorRing, DrawExtra, ExtraContent, FindOnPage, GlExtras, MatchInfo};
pub use crate::gl_extras::{draw_region, MAX_NUMBER_OF_MATCHES_TO_DRAW};
pub use crate::layer::{Layer, LayerNode, LayerTree, ScrollState};
pub use crate::layer_content::{LayerContent, PictureLayerContent, PicturePileLayerContent};
pub use crate::picture_pile::{PicturePainter, PicturePile, PrerenderedInval};
pub use crate::region::{BoundarySegment, EdgeDirection, Region};
pub use crate::render_api::{ApiMsg, RenderApi};
pub use crate::renderer::Renderer;
pub use crate::surface::{DrawContext, Surface};
pub use crate::surface_collection::SurfaceCollection;
pub use crate::surface_collection_manager::{DrawStatus, FrameOutcome, FrameParams, SurfaceCollectionManager};
pub use crate::tile_generator::TileGenerator;
pub use crate::tiled_texture::{PainterHandle, TexturesResult, TiledTexture, TilePainter};
pub use crate::types::*;
pub use crate::util::MatrixHelpers;
