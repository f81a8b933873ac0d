/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use euclid::{point2, rect, size2, vec2};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tile_compositor::{ColorF, CompositorOptions, CompositorState, DeviceCommand, DrawCommand};
use tile_compositor::{DrawExtra, DrawStatus, FindOnPage, FrameParams, LayerContent, LayerId};
use tile_compositor::{LayerNode, LayerTree, MatchInfo, Picture, PictureLayerContent};
use tile_compositor::{RecordingDevice, Region, Renderer, SurfaceCollection, SurfaceCollectionManager};
use tile_compositor::MAX_NUMBER_OF_MATCHES_TO_DRAW;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn options(worker_threads: usize) -> CompositorOptions {
    CompositorOptions {
        tile_size: 64,
        worker_threads,
        ..CompositorOptions::default()
    }
}

fn content(width: f32, height: f32) -> Arc<dyn LayerContent> {
    let commands = vec![DrawCommand::FillRect(rect(0.0, 0.0, width, height), ColorF::BLACK)];
    Arc::new(PictureLayerContent::new(Picture::new(size2(width, height), commands)))
}

fn page(inval: Option<Region<tile_compositor::LayerPixel>>) -> LayerTree {
    let mut root = LayerNode::new(LayerId(1), size2(200.0, 200.0)).with_content(content(200.0, 200.0));
    if let Some(inval) = inval {
        root = root.with_inval(inval);
    }
    LayerTree::new(root).unwrap()
}

fn params() -> FrameParams {
    FrameParams::new(0.0, rect(0, 0, 200, 200), rect(0.0, 0.0, 200.0, 200.0))
}

fn draw_textures(commands: &[DeviceCommand]) -> Vec<DeviceCommand> {
    commands
        .iter()
        .filter(|c| match **c {
            DeviceCommand::DrawTexture { .. } => true,
            _ => false,
        })
        .cloned()
        .collect()
}

#[test]
fn brand_new_collection_goes_on_screen_once_ready() {
    init_logging();
    let state = Arc::new(CompositorState::new(options(0)));
    let mut manager = SurfaceCollectionManager::new(Arc::clone(&state));
    let tree = LayerTree::new(LayerNode::new(LayerId(1), size2(100.0, 100.0))).unwrap();
    let c1 = SurfaceCollection::new(tree, Arc::clone(&state));
    let c1_id = c1.id();

    manager.update_with_surface_collection(Some(c1), true);
    assert_eq!(manager.painting_id(), Some(c1_id));
    assert_eq!(manager.drawing_id(), None);
    assert_eq!(manager.queued_id(), None);

    let outcome = manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
    assert_eq!(manager.drawing_id(), Some(c1_id));
    assert_eq!(manager.painting_id(), None);
    assert_eq!(manager.queued_id(), None);
    assert!(outcome.status.contains(DrawStatus::DRAW));
    assert!(outcome.collections_swapped);
}

#[test]
fn newer_generations_replace_the_queued_one() {
    init_logging();
    let state = Arc::new(CompositorState::new(options(0)));
    let mut manager = SurfaceCollectionManager::new(Arc::clone(&state));
    let c1 = SurfaceCollection::new(page(None), Arc::clone(&state));
    let c1_id = c1.id();
    manager.update_with_surface_collection(Some(c1), true);

    let c2 = SurfaceCollection::new(page(Some(Region::from_rect(rect(10, 10, 5, 5)))), Arc::clone(&state));
    let c2_id = c2.id();
    manager.update_with_surface_collection(Some(c2), false);
    assert_eq!(manager.painting_id(), Some(c1_id));
    assert_eq!(manager.queued_id(), Some(c2_id));

    let c3 = SurfaceCollection::new(page(Some(Region::from_rect(rect(100, 100, 5, 5)))), Arc::clone(&state));
    let c3_id = c3.id();
    manager.update_with_surface_collection(Some(c3), false);
    assert_eq!(manager.painting_id(), Some(c1_id));
    assert_eq!(manager.queued_id(), Some(c3_id));

    let queued = manager.queued_collection().unwrap();
    let inval = queued.tree().root().inval();
    assert!(inval.contains_rect(&rect(10, 10, 5, 5)));
    assert!(inval.contains_rect(&rect(100, 100, 5, 5)));

    // Put c1 on screen. c3 takes over its tiles and repaints only the two
    // 64px tiles under the invalidations, including the one c2 brought.
    manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
    assert_eq!(state.tile_generator().paint_pending(), 16);
    let outcome = manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
    assert!(outcome.collections_swapped);
    assert_eq!(manager.drawing_id(), Some(c1_id));
    assert_eq!(manager.painting_id(), Some(c3_id));
    assert_eq!(state.tile_generator().pending_count(), 2);

    assert_eq!(state.tile_generator().paint_pending(), 2);
    let outcome = manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
    assert!(outcome.collections_swapped);
    assert_eq!(manager.drawing_id(), Some(c3_id));
    assert_eq!(manager.painting_id(), None);
    assert_eq!(state.tile_generator().pending_count(), 0);
}

#[test]
fn offscreen_composited_layers_do_not_hold_back_a_generation() {
    init_logging();
    let state = Arc::new(CompositorState::new(options(0)));
    let mut manager = SurfaceCollectionManager::new(Arc::clone(&state));
    let root = LayerNode::new(LayerId(1), size2(1000.0, 1000.0))
        .with_content(content(1000.0, 1000.0))
        .add_child(
            LayerNode::new(LayerId(2), size2(100.0, 100.0))
                .with_position(point2(800.0, 800.0))
                .composited()
                .with_content(content(100.0, 100.0)),
        );
    let collection = SurfaceCollection::new(LayerTree::new(root).unwrap(), Arc::clone(&state));
    let id = collection.id();
    assert_eq!(collection.surfaces().len(), 2);
    manager.update_with_surface_collection(Some(collection), true);

    for _ in 0 .. 5 {
        manager.draw_gl(&params(), &mut RecordingDevice::new(), None);
        state.tile_generator().paint_pending();
        if manager.drawing_id().is_some() {
            break;
        }
    }
    assert_eq!(manager.drawing_id(), Some(id));
    assert_eq!(manager.painting_id(), None);
}

#[test]
fn nearer_siblings_are_drawn_on_top() {
    init_logging();
    let (mut renderer, api) = Renderer::new(options(0));
    let root = LayerNode::new(LayerId(1), size2(300.0, 100.0))
        .with_content(content(300.0, 100.0))
        .add_child(
            LayerNode::new(LayerId(2), size2(50.0, 50.0))
                .with_position(point2(200.0, 0.0))
                .with_z_index(5)
                .scrollable(vec2(0.0, 50.0))
                .with_content(content(50.0, 100.0)),
        )
        .add_child(
            LayerNode::new(LayerId(3), size2(50.0, 50.0))
                .with_position(point2(100.0, 0.0))
                .with_z_index(1)
                .scrollable(vec2(0.0, 50.0))
                .with_content(content(50.0, 100.0)),
        );
    api.set_layer_tree(LayerTree::new(root).unwrap(), true).unwrap();
    renderer.update();

    let params = FrameParams::new(0.0, rect(0, 0, 300, 100), rect(0.0, 0.0, 300.0, 100.0));
    let mut device = RecordingDevice::new();
    let outcome = renderer.render(&mut device, &params);
    assert!(!outcome.collections_swapped);
    assert!(outcome.status.contains(DrawStatus::INVOKE));

    renderer.paint_pending();
    device.take_commands();
    let outcome = renderer.render(&mut device, &params);
    assert!(outcome.collections_swapped);

    let drawing = renderer.manager().drawing_collection().unwrap();
    assert_eq!(drawing.drawing_order(), vec![LayerId(1), LayerId(3), LayerId(2)]);

    let draws = draw_textures(device.commands());
    let origins: Vec<_> = draws
        .iter()
        .rev()
        .take(2)
        .filter_map(|c| match *c {
            DeviceCommand::DrawTexture { device_rect, .. } => device_rect.map(|r| r.origin.x),
            _ => None,
        })
        .collect();
    // The z-index 5 layer at x = 200 comes last.
    assert_eq!(origins, vec![200.0, 100.0]);
}

#[test]
fn background_content_is_missing_until_tiles_are_swapped() {
    init_logging();
    let state = Arc::new(CompositorState::new(options(0)));
    let mut collection = SurfaceCollection::new(page(None), Arc::clone(&state));
    assert!(collection.is_missing_background_content());

    collection.prepare_gl(&rect(0.0, 0.0, 50.0, 50.0), 1.0, false);
    assert!(collection.is_missing_background_content());
    state.tile_generator().paint_pending();
    assert!(collection.is_missing_background_content());

    collection.swap_tiles(false);
    assert!(!collection.is_missing_background_content());
}

#[test]
fn prepare_is_idempotent() {
    init_logging();
    let state = Arc::new(CompositorState::new(options(0)));
    let mut collection = SurfaceCollection::new(page(None), Arc::clone(&state));
    let visible = rect(0.0, 0.0, 200.0, 200.0);
    collection.prepare_gl(&visible, 1.0, true);
    let scheduled = state.tile_generator().pending_count();
    // 200x200 in 64px tiles.
    assert_eq!(scheduled, 16);
    collection.prepare_gl(&visible, 1.0, true);
    assert_eq!(state.tile_generator().pending_count(), scheduled);
}

#[test]
fn queued_generation_implies_painting_generation() {
    init_logging();
    let state = Arc::new(CompositorState::new(options(0)));
    let mut manager = SurfaceCollectionManager::new(Arc::clone(&state));
    let mut device = RecordingDevice::new();
    let check = |manager: &SurfaceCollectionManager| {
        assert!(manager.queued_id().is_none() || manager.painting_id().is_some());
    };

    for round in 0 .. 6 {
        let collection = SurfaceCollection::new(page(None), Arc::clone(&state));
        manager.update_with_surface_collection(Some(collection), round == 3);
        check(&manager);
        if round % 2 == 1 {
            state.tile_generator().paint_pending();
            manager.draw_gl(&params(), &mut device, None);
            check(&manager);
        }
    }
    manager.clear_collections();
    check(&manager);
    assert!(manager.drawing_id().is_none());
}

#[test]
fn base_surface_is_drawn_before_composited_layers() {
    init_logging();
    let state = Arc::new(CompositorState::new(options(0)));
    let root = LayerNode::new(LayerId(1), size2(100.0, 100.0))
        .with_content(content(100.0, 100.0))
        .add_child(LayerNode::new(LayerId(2), size2(10.0, 10.0)).composited().with_z_index(-10).with_content(content(10.0, 10.0)));
    let collection = SurfaceCollection::new(LayerTree::new(root).unwrap(), state);
    assert_eq!(collection.drawing_order()[0], LayerId(1));
}

#[test]
fn incremental_updates_only_repaint_invalidated_tiles() {
    init_logging();
    let (mut renderer, api) = Renderer::new(options(0));
    let mut device = RecordingDevice::new();
    api.set_layer_tree(page(None), true).unwrap();
    renderer.update();
    renderer.render(&mut device, &params());
    assert_eq!(renderer.paint_pending(), 16);
    assert!(renderer.render(&mut device, &params()).collections_swapped);
    assert!(!renderer.take_framework_invals().is_empty());

    api.set_layer_tree(page(Some(Region::from_rect(rect(0, 0, 10, 10)))), false).unwrap();
    renderer.update();
    assert!(api.is_backed_up());

    device.take_commands();
    let outcome = renderer.render(&mut device, &params());
    assert!(!outcome.collections_swapped);
    assert!(outcome.status.contains(DrawStatus::INVOKE));
    assert_eq!(renderer.state().tile_generator().pending_count(), 1);
    // The old content stays on screen meanwhile.
    assert_eq!(draw_textures(device.commands()).len(), 16);

    assert_eq!(renderer.paint_pending(), 1);
    let outcome = renderer.render(&mut device, &params());
    assert!(outcome.collections_swapped);
    assert!(!api.is_backed_up());
}

#[test]
fn clearing_collections_cancels_paint_work() {
    init_logging();
    let (mut renderer, api) = Renderer::new(options(0));
    api.set_layer_tree(page(None), true).unwrap();
    renderer.update();
    renderer.render(&mut RecordingDevice::new(), &params());
    assert_eq!(renderer.state().tile_generator().pending_count(), 16);

    api.clear_collections().unwrap();
    renderer.update();
    assert_eq!(renderer.state().tile_generator().pending_count(), 0);
    assert!(renderer.manager().painting_id().is_none());
}

#[test]
fn api_reports_disconnected_renderer() {
    let (renderer, api) = Renderer::new(options(0));
    drop(renderer);
    assert!(api.clear_collections().is_err());
}

#[test]
fn find_on_page_above_the_cap_draws_one_region() {
    init_logging();
    let (mut renderer, api) = Renderer::new(options(0));
    let tree = LayerTree::new(LayerNode::new(LayerId(1), size2(200.0, 200.0))).unwrap();
    let matches = (0 .. MAX_NUMBER_OF_MATCHES_TO_DRAW as i32 + 20)
        .map(|i| MatchInfo {
            layer_id: LayerId(1),
            region: Region::from_rect(rect(i, i, 1, 1)),
        })
        .collect();
    api.set_layer_tree(tree, true).unwrap();
    api.set_draw_extra(Some(DrawExtra::FindOnPage(FindOnPage { matches, current: Some(3) }))).unwrap();
    renderer.update();

    let mut device = RecordingDevice::new();
    let outcome = renderer.render(&mut device, &params());
    assert!(outcome.collections_swapped);
    let solid: Vec<_> = device
        .commands()
        .iter()
        .filter_map(|c| match *c {
            DeviceCommand::DrawSolidRect { rect, .. } => Some(rect),
            _ => None,
        })
        .collect();
    assert_eq!(solid, vec![rect(3.0, 3.0, 1.0, 1.0)]);
}

#[test]
fn workers_paint_generations_in_the_background() {
    init_logging();
    let (mut renderer, api) = Renderer::new(options(2));
    api.set_layer_tree(page(None), true).unwrap();
    renderer.update();

    let mut device = RecordingDevice::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut swapped = false;
    while !swapped && Instant::now() < deadline {
        swapped = renderer.render(&mut device, &params()).collections_swapped;
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(swapped);
    assert!(renderer.manager().drawing_id().is_some());
}
