//! GL seam.
//!
//! The render loop talks to the GPU only through [`GlBackend`]. The real
//! implementation is [`GlowBackend`] (GLES 2.0 / WebGL1 via `glow`); tests use
//! a recording mock.

use std::cell::Cell;
use std::marker::PhantomData;
use std::rc::Rc;

use glow::HasContext;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "Vertex",
            ShaderStage::Fragment => "Fragment",
        }
    }

    fn gl_enum(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

/// Full-screen quad as two triangles, clip space.
pub const QUAD_POSITIONS: [f32; 12] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0];

/// Texture coordinates for [`QUAD_POSITIONS`], V flipped so row 0 of the frame is the top.
pub const QUAD_TEXCOORDS: [f32; 12] = [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width: width as i32, height: height as i32 }
    }
}

pub trait GlBackend {
    type Shader: Copy;
    type Program: Copy;
    type Buffer: Copy;
    type Texture: Copy;
    type UniformLocation: Clone;
    /// Whatever the host hands over as "the current video frame".
    type Frame: ?Sized;

    fn compile_shader(&mut self, stage: ShaderStage, src: &str) -> Result<Self::Shader, EngineError>;
    fn delete_shader(&mut self, shader: Self::Shader);

    /// Link `vs` + `fs`. Both shaders are detached and deleted whether or not
    /// linking succeeds; a failed program is deleted too.
    fn link_program(&mut self, vs: Self::Shader, fs: Self::Shader) -> Result<Self::Program, EngineError>;
    fn delete_program(&mut self, program: Self::Program);

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<Self::Buffer, EngineError>;
    fn delete_buffer(&mut self, buffer: Self::Buffer);

    /// Point attribute `name` at `buffer` (`size` floats per vertex).
    /// Returns false if the program has no such attribute.
    fn bind_attribute(&mut self, program: Self::Program, name: &str, buffer: Self::Buffer, size: i32) -> bool;

    /// RGBA texture with clamp-to-edge wrapping and linear filtering.
    fn create_video_texture(&mut self) -> Result<Self::Texture, EngineError>;
    fn delete_texture(&mut self, texture: Self::Texture);
    fn upload_frame(&mut self, texture: Self::Texture, frame: &Self::Frame);

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::UniformLocation>;
    fn use_program(&mut self, program: Self::Program);
    fn set_uniform_f32(&mut self, loc: &Self::UniformLocation, v: f32);
    fn set_uniform_vec2(&mut self, loc: &Self::UniformLocation, x: f32, y: f32);
    fn set_uniform_i32(&mut self, loc: &Self::UniformLocation, v: i32);

    /// Set the viewport, clear to transparent black and draw the 6-vertex quad.
    fn draw_quad(&mut self, viewport: Viewport);

    fn is_context_lost(&self) -> bool;
}

/// Tightly packed RGBA8 pixels, row 0 at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, pixels: vec![0; (width as usize) * (height as usize) * 4] }
    }
}

/// A frame type `glow` knows how to put into the currently bound texture.
pub trait GlowFrame {
    /// # Safety
    /// A `TEXTURE_2D` must be bound on `gl`.
    unsafe fn tex_image(&self, gl: &glow::Context);
}

impl GlowFrame for RgbaFrame {
    unsafe fn tex_image(&self, gl: &glow::Context) {
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA as i32,
            self.width as i32,
            self.height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            glow::PixelUnpackData::Slice(Some(&self.pixels)),
        );
    }
}

/// `glow` implementation. One backend per overlay canvas.
pub struct GlowBackend<F: GlowFrame + ?Sized> {
    gl: glow::Context,
    lost: Rc<Cell<bool>>,
    _frame: PhantomData<fn(&F)>,
}

impl<F: GlowFrame + ?Sized> GlowBackend<F> {
    pub fn new(gl: glow::Context) -> Self {
        Self { gl, lost: Rc::new(Cell::new(false)), _frame: PhantomData }
    }

    /// Shared flag the host flips when it observes a context-loss event.
    pub fn lost_flag(&self) -> Rc<Cell<bool>> {
        self.lost.clone()
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

impl<F: GlowFrame + ?Sized> GlBackend for GlowBackend<F> {
    type Shader = <glow::Context as HasContext>::Shader;
    type Program = <glow::Context as HasContext>::Program;
    type Buffer = <glow::Context as HasContext>::Buffer;
    type Texture = <glow::Context as HasContext>::Texture;
    type UniformLocation = <glow::Context as HasContext>::UniformLocation;
    type Frame = F;

    fn compile_shader(&mut self, stage: ShaderStage, src: &str) -> Result<Self::Shader, EngineError> {
        let gl = &self.gl;
        unsafe {
            let sh = gl
                .create_shader(stage.gl_enum())
                .map_err(|e| EngineError::GpuResource { what: "shader", msg: e })?;
            gl.shader_source(sh, src);
            gl.compile_shader(sh);
            if !gl.get_shader_compile_status(sh) {
                let log = gl.get_shader_info_log(sh);
                gl.delete_shader(sh);
                return Err(EngineError::Compile { stage, log });
            }
            Ok(sh)
        }
    }

    fn delete_shader(&mut self, shader: Self::Shader) {
        unsafe { self.gl.delete_shader(shader) };
    }

    fn link_program(&mut self, vs: Self::Shader, fs: Self::Shader) -> Result<Self::Program, EngineError> {
        let gl = &self.gl;
        unsafe {
            let program = match gl.create_program() {
                Ok(p) => p,
                Err(e) => {
                    gl.delete_shader(vs);
                    gl.delete_shader(fs);
                    return Err(EngineError::GpuResource { what: "program", msg: e });
                }
            };
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);

            let linked = gl.get_program_link_status(program);
            let log = if linked { String::new() } else { gl.get_program_info_log(program) };

            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);

            if !linked {
                gl.delete_program(program);
                return Err(EngineError::Link { log });
            }
            Ok(program)
        }
    }

    fn delete_program(&mut self, program: Self::Program) {
        unsafe { self.gl.delete_program(program) };
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<Self::Buffer, EngineError> {
        let gl = &self.gl;
        unsafe {
            let buf = gl
                .create_buffer()
                .map_err(|e| EngineError::GpuResource { what: "buffer", msg: e })?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buf));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(data), glow::STATIC_DRAW);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            Ok(buf)
        }
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        unsafe { self.gl.delete_buffer(buffer) };
    }

    fn bind_attribute(&mut self, program: Self::Program, name: &str, buffer: Self::Buffer, size: i32) -> bool {
        let gl = &self.gl;
        unsafe {
            let Some(index) = gl.get_attrib_location(program, name) else {
                return false;
            };
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.enable_vertex_attrib_array(index);
            gl.vertex_attrib_pointer_f32(index, size, glow::FLOAT, false, 0, 0);
            true
        }
    }

    fn create_video_texture(&mut self) -> Result<Self::Texture, EngineError> {
        let gl = &self.gl;
        unsafe {
            let tex = gl
                .create_texture()
                .map_err(|e| EngineError::GpuResource { what: "texture", msg: e })?;
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            Ok(tex)
        }
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) };
    }

    fn upload_frame(&mut self, texture: Self::Texture, frame: &F) {
        let gl = &self.gl;
        unsafe {
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            frame.tex_image(gl);
        }
    }

    fn uniform_location(&mut self, program: Self::Program, name: &str) -> Option<Self::UniformLocation> {
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn use_program(&mut self, program: Self::Program) {
        unsafe { self.gl.use_program(Some(program)) };
    }

    fn set_uniform_f32(&mut self, loc: &Self::UniformLocation, v: f32) {
        unsafe { self.gl.uniform_1_f32(Some(loc), v) };
    }

    fn set_uniform_vec2(&mut self, loc: &Self::UniformLocation, x: f32, y: f32) {
        unsafe { self.gl.uniform_2_f32(Some(loc), x, y) };
    }

    fn set_uniform_i32(&mut self, loc: &Self::UniformLocation, v: i32) {
        unsafe { self.gl.uniform_1_i32(Some(loc), v) };
    }

    fn draw_quad(&mut self, vp: Viewport) {
        let gl = &self.gl;
        unsafe {
            gl.viewport(vp.x, vp.y, vp.width, vp.height);
            gl.clear_color(0.0, 0.0, 0.0, 0.0);
            gl.clear(glow::COLOR_BUFFER_BIT);
            gl.draw_arrays(glow::TRIANGLES, 0, 6);
        }
    }

    fn is_context_lost(&self) -> bool {
        self.lost.get()
    }
}
