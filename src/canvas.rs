/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Drawing targets and recorded pictures.
//!
//! Rasterization here is deliberately simple (axis-aligned fills and
//! nearest-neighbour bitmap copies). Layer content only needs to land in the
//! right tiles; pixel-exact output is not a goal.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use euclid::{point2, size2, Rect};
use std::io::{self, Read, Write};
use std::sync::Arc;
use crate::types::{ColorF, DeviceIntRect, DeviceIntSize, LayerRect, LayerSize, LayerVector};

const PICTURE_MAGIC: &[u8; 4] = b"TCPI";
const PICTURE_VERSION: u32 = 1;

/// Largest bitmap edge, in pixels. Bitmaps are clamped to it.
pub const MAX_BITMAP_DIMENSION: i32 = 8192;

/// Commands reserved up front when reading a picture; the count in the
/// header is not trusted for allocation.
const MAX_PREALLOCATED_COMMANDS: usize = 1024;

pub trait Canvas {
    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, offset: LayerVector);
    fn scale(&mut self, factor: f32);
    fn clip_rect(&mut self, rect: &LayerRect);
    fn fill_rect(&mut self, rect: &LayerRect, color: ColorF);
    fn draw_bitmap(&mut self, bitmap: &Bitmap, dest: &LayerRect);
}

#[derive(Clone, Copy, Debug)]
struct CanvasState {
    offset_x: f32,
    offset_y: f32,
    scale: f32,
    clip: DeviceIntRect,
}

/// An RGBA8 pixel buffer that can be painted into.
#[derive(Clone)]
pub struct Bitmap {
    size: DeviceIntSize,
    data: Vec<u8>,
    state: CanvasState,
    state_stack: Vec<CanvasState>,
}

fn clamp_size(size: DeviceIntSize) -> DeviceIntSize {
    size2(
        size.width.max(0).min(MAX_BITMAP_DIMENSION),
        size.height.max(0).min(MAX_BITMAP_DIMENSION),
    )
}

fn byte_len(size: DeviceIntSize) -> usize {
    size.width as usize * size.height as usize * 4
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Bitmap({}x{})", self.size.width, self.size.height)
    }
}

impl Bitmap {
    pub fn new(size: DeviceIntSize) -> Bitmap {
        let size = clamp_size(size);
        Bitmap::from_data(size, vec![0; byte_len(size)])
    }

    fn from_data(size: DeviceIntSize, data: Vec<u8>) -> Bitmap {
        debug_assert_eq!(data.len(), byte_len(size));
        Bitmap {
            size,
            data,
            state: CanvasState {
                offset_x: 0.0,
                offset_y: 0.0,
                scale: 1.0,
                clip: Rect::new(point2(0, 0), size),
            },
            state_stack: Vec::new(),
        }
    }

    pub fn size(&self) -> DeviceIntSize {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        if x < 0 || y < 0 || x >= self.size.width || y >= self.size.height {
            return [0; 4];
        }
        let i = ((y * self.size.width + x) * 4) as usize;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    pub fn clear(&mut self, color: ColorF) {
        let rgba = color.to_rgba8();
        for px in self.data.chunks_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Copies `src_rect` of `other` into this bitmap at `dest_rect.origin`,
    /// ignoring the canvas transform and clip.
    pub fn copy_pixels(&mut self, other: &Bitmap, src_rect: &DeviceIntRect, dest_rect: &DeviceIntRect) {
        for y in 0 .. src_rect.size.height.min(dest_rect.size.height) {
            for x in 0 .. src_rect.size.width.min(dest_rect.size.width) {
                let px = other.pixel(src_rect.origin.x + x, src_rect.origin.y + y);
                self.put_pixel(dest_rect.origin.x + x, dest_rect.origin.y + y, px);
            }
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, px: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.size.width || y >= self.size.height {
            return;
        }
        let i = ((y * self.size.width + x) * 4) as usize;
        self.data[i .. i + 4].copy_from_slice(&px);
    }

    fn blend_pixel(&mut self, x: i32, y: i32, src: [u8; 4]) {
        let i = ((y * self.size.width + x) * 4) as usize;
        let sa = src[3] as u32;
        if sa == 255 {
            self.data[i .. i + 4].copy_from_slice(&src);
            return;
        }
        let inv = 255 - sa;
        for c in 0 .. 3 {
            self.data[i + c] = ((src[c] as u32 * sa + self.data[i + c] as u32 * inv) / 255) as u8;
        }
        self.data[i + 3] = (sa + self.data[i + 3] as u32 * inv / 255) as u8;
    }

    fn map_rect(&self, rect: &LayerRect) -> DeviceIntRect {
        let s = &self.state;
        let x0 = (rect.min_x() * s.scale + s.offset_x).round() as i32;
        let y0 = (rect.min_y() * s.scale + s.offset_y).round() as i32;
        let x1 = (rect.max_x() * s.scale + s.offset_x).round() as i32;
        let y1 = (rect.max_y() * s.scale + s.offset_y).round() as i32;
        Rect::new(point2(x0, y0), size2(x1 - x0, y1 - y0))
    }
}

impl Canvas for Bitmap {
    fn save(&mut self) {
        self.state_stack.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, offset: LayerVector) {
        self.state.offset_x += offset.x * self.state.scale;
        self.state.offset_y += offset.y * self.state.scale;
    }

    fn scale(&mut self, factor: f32) {
        self.state.scale *= factor;
    }

    fn clip_rect(&mut self, rect: &LayerRect) {
        let device_rect = self.map_rect(rect);
        self.state.clip = self.state.clip.intersection(&device_rect).unwrap_or_else(Rect::zero);
    }

    fn fill_rect(&mut self, rect: &LayerRect, color: ColorF) {
        let target = match self.map_rect(rect).intersection(&self.state.clip) {
            Some(target) => target,
            None => return,
        };
        let rgba = color.to_rgba8();
        for y in target.min_y() .. target.max_y() {
            for x in target.min_x() .. target.max_x() {
                self.blend_pixel(x, y, rgba);
            }
        }
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, dest: &LayerRect) {
        let dest_rect = self.map_rect(dest);
        let target = match dest_rect.intersection(&self.state.clip) {
            Some(target) => target,
            None => return,
        };
        let src_size = bitmap.size();
        for y in target.min_y() .. target.max_y() {
            let sy = (y - dest_rect.min_y()) * src_size.height / dest_rect.size.height.max(1);
            for x in target.min_x() .. target.max_x() {
                let sx = (x - dest_rect.min_x()) * src_size.width / dest_rect.size.width.max(1);
                let px = bitmap.pixel(sx, sy);
                self.blend_pixel(x, y, px);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum DrawCommand {
    Save,
    Restore,
    Translate(LayerVector),
    Scale(f32),
    ClipRect(LayerRect),
    FillRect(LayerRect, ColorF),
    DrawBitmap(Arc<Bitmap>, LayerRect),
}

/// A list of recorded drawing commands that can be replayed onto any canvas.
#[derive(Clone, Debug)]
pub struct Picture {
    size: LayerSize,
    commands: Vec<DrawCommand>,
}

impl Picture {
    pub fn new(size: LayerSize, commands: Vec<DrawCommand>) -> Picture {
        Picture { size, commands }
    }

    pub fn size(&self) -> LayerSize {
        self.size
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn playback(&self, canvas: &mut dyn Canvas) {
        for command in &self.commands {
            match *command {
                DrawCommand::Save => canvas.save(),
                DrawCommand::Restore => canvas.restore(),
                DrawCommand::Translate(offset) => canvas.translate(offset),
                DrawCommand::Scale(factor) => canvas.scale(factor),
                DrawCommand::ClipRect(ref rect) => canvas.clip_rect(rect),
                DrawCommand::FillRect(ref rect, color) => canvas.fill_rect(rect, color),
                DrawCommand::DrawBitmap(ref bitmap, ref dest) => canvas.draw_bitmap(bitmap, dest),
            }
        }
    }

    pub fn serialize(&self, stream: &mut dyn Write) -> io::Result<()> {
        stream.write_all(PICTURE_MAGIC)?;
        stream.write_u32::<LittleEndian>(PICTURE_VERSION)?;
        stream.write_f32::<LittleEndian>(self.size.width)?;
        stream.write_f32::<LittleEndian>(self.size.height)?;
        stream.write_u32::<LittleEndian>(self.commands.len() as u32)?;
        for command in &self.commands {
            match *command {
                DrawCommand::Save => stream.write_u8(0)?,
                DrawCommand::Restore => stream.write_u8(1)?,
                DrawCommand::Translate(offset) => {
                    stream.write_u8(2)?;
                    stream.write_f32::<LittleEndian>(offset.x)?;
                    stream.write_f32::<LittleEndian>(offset.y)?;
                }
                DrawCommand::Scale(factor) => {
                    stream.write_u8(3)?;
                    stream.write_f32::<LittleEndian>(factor)?;
                }
                DrawCommand::ClipRect(ref rect) => {
                    stream.write_u8(4)?;
                    write_rect(stream, rect)?;
                }
                DrawCommand::FillRect(ref rect, color) => {
                    stream.write_u8(5)?;
                    write_rect(stream, rect)?;
                    stream.write_all(&color.to_rgba8())?;
                }
                DrawCommand::DrawBitmap(ref bitmap, ref dest) => {
                    stream.write_u8(6)?;
                    write_rect(stream, dest)?;
                    stream.write_u32::<LittleEndian>(bitmap.size.width as u32)?;
                    stream.write_u32::<LittleEndian>(bitmap.size.height as u32)?;
                    stream.write_all(&bitmap.data)?;
                }
            }
        }
        Ok(())
    }

    pub fn deserialize(stream: &mut dyn Read) -> io::Result<Picture> {
        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic)?;
        if &magic != PICTURE_MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a recorded picture"));
        }
        let version = stream.read_u32::<LittleEndian>()?;
        if version != PICTURE_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported picture version {}", version),
            ));
        }
        let width = stream.read_f32::<LittleEndian>()?;
        let height = stream.read_f32::<LittleEndian>()?;
        let count = stream.read_u32::<LittleEndian>()?;
        let mut commands = Vec::with_capacity((count as usize).min(MAX_PREALLOCATED_COMMANDS));
        for _ in 0 .. count {
            let command = match stream.read_u8()? {
                0 => DrawCommand::Save,
                1 => DrawCommand::Restore,
                2 => {
                    let x = stream.read_f32::<LittleEndian>()?;
                    let y = stream.read_f32::<LittleEndian>()?;
                    DrawCommand::Translate(LayerVector::new(x, y))
                }
                3 => DrawCommand::Scale(stream.read_f32::<LittleEndian>()?),
                4 => DrawCommand::ClipRect(read_rect(stream)?),
                5 => {
                    let rect = read_rect(stream)?;
                    let mut rgba = [0u8; 4];
                    stream.read_exact(&mut rgba)?;
                    let color = ColorF::new(
                        rgba[0] as f32 / 255.0,
                        rgba[1] as f32 / 255.0,
                        rgba[2] as f32 / 255.0,
                        rgba[3] as f32 / 255.0,
                    );
                    DrawCommand::FillRect(rect, color)
                }
                6 => {
                    let dest = read_rect(stream)?;
                    let w = stream.read_u32::<LittleEndian>()?;
                    let h = stream.read_u32::<LittleEndian>()?;
                    let max = MAX_BITMAP_DIMENSION as u32;
                    if w > max || h > max {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("bitmap of {}x{} exceeds {}px", w, h, max),
                        ));
                    }
                    let size = size2(w as i32, h as i32);
                    let len = byte_len(size);
                    // Read before allocating, so a truncated blob cannot
                    // reserve the full size.
                    let mut data = Vec::new();
                    (&mut *stream).take(len as u64).read_to_end(&mut data)?;
                    if data.len() != len {
                        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated bitmap"));
                    }
                    DrawCommand::DrawBitmap(Arc::new(Bitmap::from_data(size, data)), dest)
                }
                tag => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown draw command {}", tag),
                    ));
                }
            };
            commands.push(command);
        }
        Ok(Picture::new(size2(width, height), commands))
    }
}

fn write_rect(stream: &mut dyn Write, rect: &LayerRect) -> io::Result<()> {
    stream.write_f32::<LittleEndian>(rect.origin.x)?;
    stream.write_f32::<LittleEndian>(rect.origin.y)?;
    stream.write_f32::<LittleEndian>(rect.size.width)?;
    stream.write_f32::<LittleEndian>(rect.size.height)
}

fn read_rect(stream: &mut dyn Read) -> io::Result<LayerRect> {
    let x = stream.read_f32::<LittleEndian>()?;
    let y = stream.read_f32::<LittleEndian>()?;
    let w = stream.read_f32::<LittleEndian>()?;
    let h = stream.read_f32::<LittleEndian>()?;
    Ok(euclid::rect(x, y, w, h))
}

/// A canvas that records into a `Picture` instead of painting pixels.
pub struct PictureRecorder {
    size: LayerSize,
    commands: Vec<DrawCommand>,
}

impl PictureRecorder {
    pub fn new(size: LayerSize) -> PictureRecorder {
        PictureRecorder {
            size,
            commands: Vec::new(),
        }
    }

    pub fn finish(self) -> Picture {
        Picture::new(self.size, self.commands)
    }
}

impl Canvas for PictureRecorder {
    fn save(&mut self) {
        self.commands.push(DrawCommand::Save);
    }

    fn restore(&mut self) {
        self.commands.push(DrawCommand::Restore);
    }

    fn translate(&mut self, offset: LayerVector) {
        self.commands.push(DrawCommand::Translate(offset));
    }

    fn scale(&mut self, factor: f32) {
        self.commands.push(DrawCommand::Scale(factor));
    }

    fn clip_rect(&mut self, rect: &LayerRect) {
        self.commands.push(DrawCommand::ClipRect(*rect));
    }

    fn fill_rect(&mut self, rect: &LayerRect, color: ColorF) {
        self.commands.push(DrawCommand::FillRect(*rect, color));
    }

    fn draw_bitmap(&mut self, bitmap: &Bitmap, dest: &LayerRect) {
        self.commands.push(DrawCommand::DrawBitmap(Arc::new(bitmap.clone()), *dest));
    }
}
