/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use crate::canvas::{Canvas, Picture, PictureRecorder};
use crate::picture_pile::{PicturePile, PrerenderedInval};
use crate::types::{LayerIntRect, LayerSize};
use crate::util::lock;

/// The paintable content of a layer.
///
/// Content is shared between generations and drawn from paint worker
/// threads, so implementations must be thread safe.
pub trait LayerContent: Send + Sync {
    fn width(&self) -> i32;
    fn height(&self) -> i32;

    fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    fn draw(&self, canvas: &mut dyn Canvas);

    /// Writes the content out as a recorded picture, for debugging.
    fn serialize(&self, stream: &mut dyn Write) -> io::Result<()> {
        let mut recorder = PictureRecorder::new(LayerSize::new(self.width() as f32, self.height() as f32));
        self.draw(&mut recorder);
        recorder.finish().serialize(stream)
    }

    fn prerender_for_rect(&self, _rect: &LayerIntRect) -> Option<Arc<PrerenderedInval>> {
        None
    }

    fn clear_prerenders(&self) {}

    fn can_update_with_blit(&self) -> bool {
        false
    }
}

/// Layer content backed by a picture pile.
pub struct PicturePileLayerContent {
    width: i32,
    height: i32,
    pile: Mutex<PicturePile>,
}

impl PicturePileLayerContent {
    pub fn new(pile: PicturePile) -> PicturePileLayerContent {
        // A pile with nothing recorded reports a zero size so tiles skip it.
        let (width, height) = if pile.is_empty() {
            (0, 0)
        } else {
            (pile.width(), pile.height())
        };
        PicturePileLayerContent {
            width,
            height,
            pile: Mutex::new(pile),
        }
    }
}

impl LayerContent for PicturePileLayerContent {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn draw(&self, canvas: &mut dyn Canvas) {
        lock(&self.pile).draw(canvas);
    }

    fn prerender_for_rect(&self, rect: &LayerIntRect) -> Option<Arc<PrerenderedInval>> {
        lock(&self.pile).prerendered_inval_for_area(rect)
    }

    fn clear_prerenders(&self) {
        lock(&self.pile).clear_prerenders();
    }

    fn can_update_with_blit(&self) -> bool {
        true
    }
}

/// Layer content holding a single recorded picture.
pub struct PictureLayerContent {
    picture: Option<Picture>,
}

impl PictureLayerContent {
    pub fn new(picture: Picture) -> PictureLayerContent {
        PictureLayerContent {
            picture: Some(picture),
        }
    }

    pub fn empty() -> PictureLayerContent {
        PictureLayerContent { picture: None }
    }
}

impl LayerContent for PictureLayerContent {
    fn width(&self) -> i32 {
        self.picture.as_ref().map_or(0, |p| p.size().width.ceil() as i32)
    }

    fn height(&self) -> i32 {
        self.picture.as_ref().map_or(0, |p| p.size().height.ceil() as i32)
    }

    fn draw(&self, canvas: &mut dyn Canvas) {
        if let Some(ref picture) = self.picture {
            picture.playback(canvas);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Bitmap;
    use crate::picture_pile::PicturePainter;
    use crate::types::ColorF;
    use euclid::{rect, size2};
    use std::thread;

    struct Fill(ColorF);

    impl PicturePainter for Fill {
        fn paint_contents(&self, canvas: &mut dyn Canvas, area: &LayerIntRect) {
            canvas.fill_rect(&area.to_f32(), self.0);
        }
    }

    #[test]
    fn unrecorded_pile_has_no_size() {
        let content = PicturePileLayerContent::new(PicturePile::new(300, 200));
        assert_eq!((content.width(), content.height()), (0, 0));
        assert!(content.is_empty());
    }

    #[test]
    fn pile_content_draws_from_many_threads() {
        let mut pile = PicturePile::new(16, 16);
        pile.update_pictures_if_needed(&Fill(ColorF::BLACK), false);
        let content: Arc<dyn LayerContent> = Arc::new(PicturePileLayerContent::new(pile));
        assert_eq!((content.width(), content.height()), (16, 16));
        assert!(content.can_update_with_blit());

        let workers: Vec<_> = (0 .. 4)
            .map(|_| {
                let content = Arc::clone(&content);
                thread::spawn(move || {
                    let mut bitmap = Bitmap::new(size2(16, 16));
                    content.draw(&mut bitmap);
                    bitmap.pixel(8, 8)
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), [0, 0, 0, 255]);
        }
    }

    #[test]
    fn serialize_records_a_picture() {
        let mut pile = PicturePile::new(4, 4);
        pile.update_pictures_if_needed(&Fill(ColorF::WHITE), false);
        let content = PicturePileLayerContent::new(pile);

        let mut blob = Vec::new();
        content.serialize(&mut blob).unwrap();
        let picture = Picture::deserialize(&mut &blob[..]).unwrap();
        assert_eq!(picture.size(), size2(4.0, 4.0));

        let mut bitmap = Bitmap::new(size2(4, 4));
        picture.playback(&mut bitmap);
        assert_eq!(bitmap.pixel(3, 3), [255, 255, 255, 255]);
        assert!(content.prerender_for_rect(&rect(0, 0, 1, 1)).is_none());
    }
}
