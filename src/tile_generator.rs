/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Paint work scheduling.
//!
//! Each `PaintOp` renders one tile of one surface into a CPU bitmap. Ops are
//! queued in order and either handed to a rayon pool, one job per op, or run
//! by the host through `paint_pending` when no workers are configured.
//!
//! Ops belong to a painter. Removing a painter's ops drops everything still
//! queued for it; an op that is already running checks the painter's
//! liveness flag before it commits, so nothing is ever written on behalf of a
//! surface that has gone away.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use crate::canvas::{Bitmap, Canvas};
use crate::tiled_texture::{TileBuffer, TilePainter};
use crate::types::{DeviceIntRect, LayerVector, PainterId};
use crate::util::{lock, ProfileScope};

pub struct PaintOp {
    pub painter: PainterId,
    pub(crate) alive: Arc<AtomicBool>,
    pub(crate) tile: Arc<TileBuffer>,
    pub(crate) version: u64,
    pub(crate) source: Arc<dyn TilePainter>,
    /// Tile area in surface pixels at `scale`.
    pub(crate) rect: DeviceIntRect,
    pub(crate) scale: f32,
}

impl PaintOp {
    fn run(self) {
        if !self.alive.load(Ordering::Acquire) || lock(&self.tile.work).version != self.version {
            self.abandon();
            return;
        }

        let mut bitmap = Bitmap::new(self.rect.size);
        {
            let _profile = ProfileScope::new("paint tile");
            bitmap.translate(LayerVector::new(-self.rect.origin.x as f32, -self.rect.origin.y as f32));
            bitmap.scale(self.scale);
            self.source.paint(&mut bitmap);
        }

        let mut work = lock(&self.tile.work);
        if work.scheduled == Some(self.version) {
            work.scheduled = None;
        }
        if self.alive.load(Ordering::Acquire) && work.version == self.version {
            work.painted = Some(bitmap);
            work.dirty = false;
        } else {
            trace!("dropping stale paint for {:?}", self.painter);
        }
    }

    /// Releases the tile so a later prepare can schedule it again.
    fn abandon(&self) {
        let mut work = lock(&self.tile.work);
        if work.scheduled == Some(self.version) {
            work.scheduled = None;
        }
    }
}

struct PaintQueue {
    ops: Mutex<VecDeque<PaintOp>>,
    paused: AtomicBool,
    running: AtomicUsize,
}

impl PaintQueue {
    fn pop(&self) -> Option<PaintOp> {
        if self.paused.load(Ordering::SeqCst) {
            return None;
        }
        let mut ops = lock(&self.ops);
        let op = ops.pop_front();
        if op.is_some() {
            self.running.fetch_add(1, Ordering::SeqCst);
        }
        op
    }

    fn run_one(&self) -> bool {
        match self.pop() {
            Some(op) => {
                op.run();
                self.running.fetch_sub(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

pub struct TileGenerator {
    queue: Arc<PaintQueue>,
    workers: Option<ThreadPool>,
}

impl TileGenerator {
    pub fn new(worker_threads: usize) -> TileGenerator {
        let workers = if worker_threads == 0 {
            None
        } else {
            let result = ThreadPoolBuilder::new()
                .num_threads(worker_threads)
                .thread_name(|idx| format!("TilePainter#{}", idx))
                .build();
            match result {
                Ok(pool) => Some(pool),
                Err(err) => {
                    warn!("unable to start paint workers ({}), painting on request only", err);
                    None
                }
            }
        };

        TileGenerator {
            queue: Arc::new(PaintQueue {
                ops: Mutex::new(VecDeque::new()),
                paused: AtomicBool::new(false),
                running: AtomicUsize::new(0),
            }),
            workers,
        }
    }

    pub fn has_workers(&self) -> bool {
        self.workers.is_some()
    }

    pub fn schedule(&self, op: PaintOp) {
        lock(&self.queue.ops).push_back(op);
        if !self.is_paused() {
            self.dispatch(1);
        }
    }

    fn dispatch(&self, count: usize) {
        if let Some(ref workers) = self.workers {
            for _ in 0 .. count {
                let queue = Arc::clone(&self.queue);
                workers.spawn(move || {
                    queue.run_one();
                });
            }
        }
    }

    /// Drops every queued op of `painter`. Returns how many were removed.
    pub fn remove_operations_for_painter(&self, painter: PainterId) -> usize {
        let removed = {
            let mut ops = lock(&self.queue.ops);
            let (removed, kept): (VecDeque<PaintOp>, VecDeque<PaintOp>) =
                ops.drain(..).partition(|op| op.painter == painter);
            *ops = kept;
            removed
        };
        for op in &removed {
            op.abandon();
        }
        if !removed.is_empty() {
            debug!("removed {} paint operations for {:?}", removed.len(), painter);
        }
        removed.len()
    }

    /// Ops queued or currently painting.
    pub fn pending_count(&self) -> usize {
        lock(&self.queue.ops).len() + self.queue.running.load(Ordering::SeqCst)
    }

    /// Runs every queued op on the calling thread. Returns how many ran.
    pub fn paint_pending(&self) -> usize {
        let mut count = 0;
        while self.queue.run_one() {
            count += 1;
        }
        count
    }

    pub fn set_paused(&self, paused: bool) {
        let was_paused = self.queue.paused.swap(paused, Ordering::SeqCst);
        if was_paused && !paused {
            let queued = lock(&self.queue.ops).len();
            debug!("resuming paint work, {} queued", queued);
            self.dispatch(queued);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.queue.paused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiled_texture::TileWork;
    use crate::types::ColorF;
    use euclid::rect;
    use std::time::{Duration, Instant};

    struct Solid;

    impl TilePainter for Solid {
        fn paint(&self, canvas: &mut dyn Canvas) {
            canvas.fill_rect(&rect(0.0, 0.0, 1000.0, 1000.0), ColorF::BLACK);
        }
    }

    fn op(painter: PainterId, alive: &Arc<AtomicBool>, tile: &Arc<TileBuffer>) -> PaintOp {
        let version = {
            let mut work = lock(&tile.work);
            work.scheduled = Some(work.version);
            work.version
        };
        PaintOp {
            painter,
            alive: Arc::clone(alive),
            tile: Arc::clone(tile),
            version,
            source: Arc::new(Solid),
            rect: rect(0, 0, 4, 4),
            scale: 1.0,
        }
    }

    fn dirty_tile() -> Arc<TileBuffer> {
        Arc::new(TileBuffer {
            work: Mutex::new(TileWork {
                dirty: true,
                ..TileWork::default()
            }),
        })
    }

    #[test]
    fn manual_painting_commits_results() {
        let generator = TileGenerator::new(0);
        let alive = Arc::new(AtomicBool::new(true));
        let tile = dirty_tile();
        generator.schedule(op(PainterId::new(), &alive, &tile));
        assert_eq!(generator.pending_count(), 1);
        assert_eq!(generator.paint_pending(), 1);
        assert_eq!(generator.pending_count(), 0);

        let work = lock(&tile.work);
        assert!(!work.dirty);
        assert_eq!(work.scheduled, None);
        assert_eq!(work.painted.as_ref().map(|b| b.pixel(1, 1)), Some([0, 0, 0, 255]));
    }

    #[test]
    fn removed_painters_never_commit() {
        let generator = TileGenerator::new(0);
        let alive = Arc::new(AtomicBool::new(true));
        let kept_tile = dirty_tile();
        let removed_tile = dirty_tile();
        let keep = PainterId::new();
        let remove = PainterId::new();
        generator.schedule(op(remove, &alive, &removed_tile));
        generator.schedule(op(keep, &alive, &kept_tile));

        assert_eq!(generator.remove_operations_for_painter(remove), 1);
        assert_eq!(lock(&removed_tile.work).scheduled, None);
        assert_eq!(generator.paint_pending(), 1);
        assert!(lock(&removed_tile.work).dirty);
        assert!(!lock(&kept_tile.work).dirty);
    }

    #[test]
    fn dead_painter_results_are_dropped() {
        let generator = TileGenerator::new(0);
        let alive = Arc::new(AtomicBool::new(true));
        let tile = dirty_tile();
        generator.schedule(op(PainterId::new(), &alive, &tile));
        alive.store(false, Ordering::Release);
        generator.paint_pending();
        let work = lock(&tile.work);
        assert!(work.painted.is_none());
        assert_eq!(work.scheduled, None);
    }

    #[test]
    fn paused_generator_holds_work() {
        let generator = TileGenerator::new(0);
        let alive = Arc::new(AtomicBool::new(true));
        let tile = dirty_tile();
        generator.set_paused(true);
        generator.schedule(op(PainterId::new(), &alive, &tile));
        assert_eq!(generator.paint_pending(), 0);
        generator.set_paused(false);
        assert_eq!(generator.paint_pending(), 1);
    }

    #[test]
    fn workers_paint_in_background() {
        let generator = TileGenerator::new(2);
        assert!(generator.has_workers());
        let alive = Arc::new(AtomicBool::new(true));
        let tiles: Vec<_> = (0 .. 8).map(|_| dirty_tile()).collect();
        let painter = PainterId::new();
        for tile in &tiles {
            generator.schedule(op(painter, &alive, tile));
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while generator.pending_count() > 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(generator.pending_count(), 0);
        assert!(tiles.iter().all(|tile| lock(&tile.work).painted.is_some()));
    }
}
