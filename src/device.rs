/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use euclid::{Rect, Transform3D};
use gleam::gl;
use std::rc::Rc;
use crate::canvas::Bitmap;
use crate::error::CompositorError;
use crate::types::{ColorF, DeviceIntRect, DeviceIntSize, DevicePixel, FastHashMap};
use crate::types::{LayerRect, LayerToDeviceTransform, TextureId};

/// The GPU operations the compositor needs.
pub trait Device {
    fn begin_frame(&mut self, viewport: &DeviceIntRect);
    fn clear(&mut self, color: ColorF);
    fn create_texture(&mut self, size: DeviceIntSize) -> TextureId;
    fn upload_texture(&mut self, texture: TextureId, bitmap: &Bitmap);
    fn delete_texture(&mut self, texture: TextureId);
    fn draw_texture(
        &mut self,
        texture: TextureId,
        rect: &LayerRect,
        transform: &LayerToDeviceTransform,
        opacity: f32,
    );
    fn draw_solid_rect(&mut self, rect: &LayerRect, transform: &LayerToDeviceTransform, color: ColorF);
    fn end_frame(&mut self);
}

#[derive(Clone, Debug, PartialEq)]
pub enum DeviceCommand {
    BeginFrame(DeviceIntRect),
    Clear(ColorF),
    CreateTexture(TextureId, DeviceIntSize),
    UploadTexture(TextureId),
    DeleteTexture(TextureId),
    DrawTexture {
        texture: TextureId,
        rect: LayerRect,
        device_rect: Option<Rect<f32, DevicePixel>>,
        opacity: f32,
    },
    DrawSolidRect {
        rect: LayerRect,
        device_rect: Option<Rect<f32, DevicePixel>>,
        color: ColorF,
    },
    EndFrame,
}

/// A device that only records what it is asked to do.
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    next_texture_id: u32,
    textures: FastHashMap<TextureId, Option<Bitmap>>,
}

impl RecordingDevice {
    pub fn new() -> RecordingDevice {
        RecordingDevice {
            commands: Vec::new(),
            next_texture_id: 1,
            textures: FastHashMap::default(),
        }
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::replace(&mut self.commands, Vec::new())
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// A pixel of the last bitmap uploaded to `texture`.
    pub fn uploaded_pixel(&self, texture: TextureId, x: i32, y: i32) -> Option<[u8; 4]> {
        match self.textures.get(&texture) {
            Some(Some(bitmap)) => Some(bitmap.pixel(x, y)),
            _ => None,
        }
    }
}

impl Default for RecordingDevice {
    fn default() -> RecordingDevice {
        RecordingDevice::new()
    }
}

impl Device for RecordingDevice {
    fn begin_frame(&mut self, viewport: &DeviceIntRect) {
        self.commands.push(DeviceCommand::BeginFrame(*viewport));
    }

    fn clear(&mut self, color: ColorF) {
        self.commands.push(DeviceCommand::Clear(color));
    }

    fn create_texture(&mut self, size: DeviceIntSize) -> TextureId {
        let texture = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(texture, None);
        self.commands.push(DeviceCommand::CreateTexture(texture, size));
        texture
    }

    fn upload_texture(&mut self, texture: TextureId, bitmap: &Bitmap) {
        if let Some(slot) = self.textures.get_mut(&texture) {
            *slot = Some(bitmap.clone());
        }
        self.commands.push(DeviceCommand::UploadTexture(texture));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.commands.push(DeviceCommand::DeleteTexture(texture));
    }

    fn draw_texture(
        &mut self,
        texture: TextureId,
        rect: &LayerRect,
        transform: &LayerToDeviceTransform,
        opacity: f32,
    ) {
        self.commands.push(DeviceCommand::DrawTexture {
            texture,
            rect: *rect,
            device_rect: transform.outer_transformed_rect(rect),
            opacity,
        });
    }

    fn draw_solid_rect(&mut self, rect: &LayerRect, transform: &LayerToDeviceTransform, color: ColorF) {
        self.commands.push(DeviceCommand::DrawSolidRect {
            rect: *rect,
            device_rect: transform.outer_transformed_rect(rect),
            color,
        });
    }

    fn end_frame(&mut self) {
        self.commands.push(DeviceCommand::EndFrame);
    }
}

const VERTEX_SHADER: &str = "
attribute vec2 aPosition;
attribute vec2 aTexCoord;
uniform mat4 uTransform;
varying vec2 vTexCoord;
void main() {
    vTexCoord = aTexCoord;
    gl_Position = uTransform * vec4(aPosition, 0.0, 1.0);
}
";

const FRAGMENT_SHADER: &str = "
#ifdef GL_ES
precision mediump float;
#endif
uniform sampler2D sColor;
uniform vec4 uColor;
uniform float uUseTexture;
varying vec2 vTexCoord;
void main() {
    vec4 texel = texture2D(sColor, vTexCoord);
    gl_FragColor = mix(uColor, texel * uColor, uUseTexture);
}
";

const ATTRIBUTE_POSITION: gl::GLuint = 0;
const ATTRIBUTE_TEX_COORD: gl::GLuint = 1;

struct NdcPixel;

struct Program {
    id: gl::GLuint,
    u_transform: gl::GLint,
    u_color: gl::GLint,
    u_use_texture: gl::GLint,
    s_color: gl::GLint,
}

struct Texture {
    id: gl::GLuint,
    size: DeviceIntSize,
}

/// A `Device` drawing with OpenGL through gleam. The GL context must be
/// current whenever a method is called.
pub struct GlDevice {
    gl: Rc<dyn gl::Gl>,
    program: Program,
    vao: gl::GLuint,
    vbo: gl::GLuint,
    textures: FastHashMap<TextureId, Texture>,
    next_texture_id: u32,
    viewport: DeviceIntRect,
    inside_frame: bool,
}

impl GlDevice {
    pub fn new(gl: Rc<dyn gl::Gl>) -> Result<GlDevice, CompositorError> {
        let program = GlDevice::create_program(&*gl)?;
        let vao = gl.gen_vertex_arrays(1)[0];
        let vbo = gl.gen_buffers(1)[0];

        Ok(GlDevice {
            gl,
            program,
            vao,
            vbo,
            textures: FastHashMap::default(),
            next_texture_id: 1,
            viewport: DeviceIntRect::zero(),
            inside_frame: false,
        })
    }

    fn compile_shader(
        gl: &dyn gl::Gl,
        name: &'static str,
        shader_type: gl::GLenum,
        source: &str,
    ) -> Result<gl::GLuint, CompositorError> {
        debug!("compile {}", name);
        let id = gl.create_shader(shader_type);
        gl.shader_source(id, &[source.as_bytes()]);
        gl.compile_shader(id);
        let log = gl.get_shader_info_log(id);
        let mut status = [0];
        unsafe {
            gl.get_shader_iv(id, gl::COMPILE_STATUS, &mut status);
        }
        if status[0] == 0 {
            error!("Failed to compile shader {}: {}", name, log);
            gl.delete_shader(id);
            return Err(CompositorError::ShaderCompile { name, log });
        }
        if !log.is_empty() {
            warn!("Warnings detected on shader {}: {}", name, log);
        }
        Ok(id)
    }

    fn create_program(gl: &dyn gl::Gl) -> Result<Program, CompositorError> {
        let vs_id = GlDevice::compile_shader(gl, "composite.vs", gl::VERTEX_SHADER, VERTEX_SHADER)?;
        let fs_id = match GlDevice::compile_shader(gl, "composite.fs", gl::FRAGMENT_SHADER, FRAGMENT_SHADER) {
            Ok(fs_id) => fs_id,
            Err(err) => {
                gl.delete_shader(vs_id);
                return Err(err);
            }
        };

        let pid = gl.create_program();
        gl.attach_shader(pid, vs_id);
        gl.attach_shader(pid, fs_id);
        gl.bind_attrib_location(pid, ATTRIBUTE_POSITION, "aPosition");
        gl.bind_attrib_location(pid, ATTRIBUTE_TEX_COORD, "aTexCoord");
        gl.link_program(pid);
        gl.detach_shader(pid, vs_id);
        gl.detach_shader(pid, fs_id);
        gl.delete_shader(vs_id);
        gl.delete_shader(fs_id);

        let mut status = [0];
        unsafe {
            gl.get_program_iv(pid, gl::LINK_STATUS, &mut status);
        }
        if status[0] == 0 {
            let log = gl.get_program_info_log(pid);
            error!("Failed to link shader program: {}", log);
            gl.delete_program(pid);
            return Err(CompositorError::ProgramLink(log));
        }

        Ok(Program {
            id: pid,
            u_transform: gl.get_uniform_location(pid, "uTransform"),
            u_color: gl.get_uniform_location(pid, "uColor"),
            u_use_texture: gl.get_uniform_location(pid, "uUseTexture"),
            s_color: gl.get_uniform_location(pid, "sColor"),
        })
    }

    fn draw_quad(&mut self, rect: &LayerRect, transform: &LayerToDeviceTransform) {
        debug_assert!(self.inside_frame);
        let vp = &self.viewport;
        let device_to_ndc: Transform3D<f32, DevicePixel, NdcPixel> =
            Transform3D::translation(-vp.origin.x as f32, -vp.origin.y as f32, 0.0)
                .then_scale(2.0 / vp.size.width.max(1) as f32, -2.0 / vp.size.height.max(1) as f32, 1.0)
                .then_translate(euclid::vec3(-1.0, 1.0, 0.0));
        let matrix = transform.then(&device_to_ndc);

        let (x0, y0, x1, y1) = (rect.min_x(), rect.min_y(), rect.max_x(), rect.max_y());
        let vertices: [f32; 16] = [
            x0, y0, 0.0, 0.0,
            x1, y0, 1.0, 0.0,
            x0, y1, 0.0, 1.0,
            x1, y1, 1.0, 1.0,
        ];
        self.gl.bind_buffer(gl::ARRAY_BUFFER, self.vbo);
        gl::buffer_data(&*self.gl, gl::ARRAY_BUFFER, &vertices, gl::STREAM_DRAW);
        self.gl.uniform_matrix_4fv(self.program.u_transform, false, &matrix.to_array());
        self.gl.draw_arrays(gl::TRIANGLE_STRIP, 0, 4);
    }
}

impl Device for GlDevice {
    fn begin_frame(&mut self, viewport: &DeviceIntRect) {
        debug_assert!(!self.inside_frame);
        self.inside_frame = true;
        self.viewport = *viewport;

        let gl = &self.gl;
        gl.viewport(viewport.origin.x, viewport.origin.y, viewport.size.width, viewport.size.height);
        gl.enable(gl::BLEND);
        gl.blend_func(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA);
        gl.disable(gl::DEPTH_TEST);
        gl.use_program(self.program.id);
        gl.uniform_1i(self.program.s_color, 0);
        gl.active_texture(gl::TEXTURE0);

        gl.bind_vertex_array(self.vao);
        gl.bind_buffer(gl::ARRAY_BUFFER, self.vbo);
        let stride = 4 * std::mem::size_of::<f32>() as gl::GLint;
        gl.enable_vertex_attrib_array(ATTRIBUTE_POSITION);
        gl.vertex_attrib_pointer(ATTRIBUTE_POSITION, 2, gl::FLOAT, false, stride, 0);
        gl.enable_vertex_attrib_array(ATTRIBUTE_TEX_COORD);
        gl.vertex_attrib_pointer(
            ATTRIBUTE_TEX_COORD,
            2,
            gl::FLOAT,
            false,
            stride,
            2 * std::mem::size_of::<f32>() as gl::GLuint,
        );
    }

    fn clear(&mut self, color: ColorF) {
        self.gl.clear_color(color.r, color.g, color.b, color.a);
        self.gl.clear(gl::COLOR_BUFFER_BIT);
    }

    fn create_texture(&mut self, size: DeviceIntSize) -> TextureId {
        let id = self.gl.gen_textures(1)[0];
        self.gl.bind_texture(gl::TEXTURE_2D, id);
        self.gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as gl::GLint);
        self.gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as gl::GLint);
        self.gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as gl::GLint);
        self.gl.tex_parameter_i(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as gl::GLint);
        self.gl.tex_image_2d(
            gl::TEXTURE_2D,
            0,
            gl::RGBA as gl::GLint,
            size.width,
            size.height,
            0,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
            None,
        );

        let texture = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(texture, Texture { id, size });
        texture
    }

    fn upload_texture(&mut self, texture: TextureId, bitmap: &Bitmap) {
        let texture = match self.textures.get(&texture) {
            Some(texture) => texture,
            None => {
                warn!("upload to unknown texture {:?}", texture);
                return;
            }
        };
        let size = bitmap.size();
        if size.width > texture.size.width || size.height > texture.size.height {
            warn!("bitmap {:?} does not fit texture {:?}", size, texture.size);
            return;
        }
        self.gl.bind_texture(gl::TEXTURE_2D, texture.id);
        self.gl.tex_sub_image_2d(
            gl::TEXTURE_2D,
            0,
            0,
            0,
            size.width,
            size.height,
            gl::RGBA,
            gl::UNSIGNED_BYTE,
            bitmap.data(),
        );
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(texture) = self.textures.remove(&texture) {
            self.gl.delete_textures(&[texture.id]);
        }
    }

    fn draw_texture(
        &mut self,
        texture: TextureId,
        rect: &LayerRect,
        transform: &LayerToDeviceTransform,
        opacity: f32,
    ) {
        let id = match self.textures.get(&texture) {
            Some(texture) => texture.id,
            None => return,
        };
        self.gl.bind_texture(gl::TEXTURE_2D, id);
        self.gl.uniform_4f(self.program.u_color, 1.0, 1.0, 1.0, opacity);
        self.gl.uniform_1f(self.program.u_use_texture, 1.0);
        self.draw_quad(rect, transform);
    }

    fn draw_solid_rect(&mut self, rect: &LayerRect, transform: &LayerToDeviceTransform, color: ColorF) {
        self.gl.uniform_4f(self.program.u_color, color.r, color.g, color.b, color.a);
        self.gl.uniform_1f(self.program.u_use_texture, 0.0);
        self.draw_quad(rect, transform);
    }

    fn end_frame(&mut self) {
        debug_assert!(self.inside_frame);
        self.inside_frame = false;
        self.gl.bind_vertex_array(0);
        self.gl.bind_texture(gl::TEXTURE_2D, 0);
        self.gl.use_program(0);
    }
}

impl Drop for GlDevice {
    fn drop(&mut self) {
        let ids: Vec<gl::GLuint> = self.textures.drain().map(|(_, texture)| texture.id).collect();
        if !ids.is_empty() {
            self.gl.delete_textures(&ids);
        }
        self.gl.delete_buffers(&[self.vbo]);
        self.gl.delete_vertex_arrays(&[self.vao]);
        self.gl.delete_program(self.program.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use euclid::{rect, size2};

    #[test]
    fn recording_device_tracks_textures() {
        let mut device = RecordingDevice::new();
        let texture = device.create_texture(size2(2, 2));
        let mut bitmap = Bitmap::new(size2(2, 2));
        bitmap.clear(ColorF::WHITE);
        device.upload_texture(texture, &bitmap);
        assert_eq!(device.uploaded_pixel(texture, 1, 1), Some([255, 255, 255, 255]));

        let transform = LayerToDeviceTransform::translation(10.0, 0.0, 0.0);
        device.draw_texture(texture, &rect(0.0, 0.0, 2.0, 2.0), &transform, 0.5);
        match device.commands().last() {
            Some(DeviceCommand::DrawTexture { device_rect, opacity, .. }) => {
                assert_eq!(*device_rect, Some(rect(10.0, 0.0, 2.0, 2.0)));
                assert_eq!(*opacity, 0.5);
            }
            other => panic!("unexpected command {:?}", other),
        }

        device.delete_texture(texture);
        assert_eq!(device.live_textures(), 0);
    }
}
