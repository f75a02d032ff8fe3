//! Frame-paced redraw.
//!
//! One [`RenderLoop`] per session. Scheduled ticks come from the video's
//! frame-available notification and re-arm it; forced ticks (uniform updates)
//! draw once and leave the cadence alone. At most one registration is pending
//! at any time, so ticks for one session never overlap.

use crate::error::EngineError;
use crate::gl::{GlBackend, ShaderStage, QUAD_POSITIONS, QUAD_TEXCOORDS};
use crate::host::{FrameCallbackId, OverlayCanvas, VideoElement};
use crate::logw;
use crate::settings::ShaderSource;
use crate::uniforms::UniformSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Scheduled,
    Forced,
}

#[derive(Debug, Default)]
pub struct RenderLoop {
    pending: Option<FrameCallbackId>,
    stopped: bool,
    ticks: u64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<FrameCallbackId> {
        self.pending
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Consume a frame notification. False for stale ids and after `stop`.
    pub fn accept(&mut self, id: FrameCallbackId) -> bool {
        if self.stopped || self.pending != Some(id) {
            return false;
        }
        self.pending = None;
        true
    }

    pub fn arm(&mut self, id: FrameCallbackId) {
        if !self.stopped {
            self.pending = Some(id);
        }
    }

    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    /// Stop for good. Returns the registration that still has to be cancelled.
    pub fn stop(&mut self) -> Option<FrameCallbackId> {
        self.stopped = true;
        self.pending.take()
    }
}

/// A schema uniform plus where it lives in the linked program.
#[derive(Debug, Clone)]
pub struct BoundUniform<L> {
    pub spec: UniformSpec,
    /// `None` if the program does not use it.
    pub location: Option<L>,
    pub value: f64,
}

/// Every GL object a session owns.
pub struct GpuObjects<G: GlBackend> {
    pub program: G::Program,
    pub position_buffer: G::Buffer,
    pub texcoord_buffer: G::Buffer,
    pub texture: G::Texture,
    pub texture_loc: Option<G::UniformLocation>,
    pub texture_size_loc: Option<G::UniformLocation>,
}

impl<G: GlBackend> GpuObjects<G> {
    /// Compile, link and allocate the quad + texture. On error every object
    /// created so far has already been released.
    pub fn build(gl: &mut G, source: &ShaderSource) -> Result<Self, EngineError> {
        let vs = gl.compile_shader(ShaderStage::Vertex, &source.vertex)?;
        let fs = match gl.compile_shader(ShaderStage::Fragment, &source.fragment) {
            Ok(fs) => fs,
            Err(e) => {
                gl.delete_shader(vs);
                return Err(e);
            }
        };
        let program = gl.link_program(vs, fs)?;

        let position_buffer = match gl.create_vertex_buffer(&QUAD_POSITIONS) {
            Ok(b) => b,
            Err(e) => {
                gl.delete_program(program);
                return Err(e);
            }
        };
        let texcoord_buffer = match gl.create_vertex_buffer(&QUAD_TEXCOORDS) {
            Ok(b) => b,
            Err(e) => {
                gl.delete_buffer(position_buffer);
                gl.delete_program(program);
                return Err(e);
            }
        };
        let texture = match gl.create_video_texture() {
            Ok(t) => t,
            Err(e) => {
                gl.delete_buffer(texcoord_buffer);
                gl.delete_buffer(position_buffer);
                gl.delete_program(program);
                return Err(e);
            }
        };

        gl.use_program(program);
        for (name, buf) in [("a_position", position_buffer), ("a_texCoord", texcoord_buffer)] {
            if !gl.bind_attribute(program, name, buf, 2) {
                logw!("SHADER", "attribute {name} not found in program");
            }
        }
        let texture_loc = gl.uniform_location(program, "u_texture");
        let texture_size_loc = gl.uniform_location(program, "u_textureSize");

        Ok(Self {
            program,
            position_buffer,
            texcoord_buffer,
            texture,
            texture_loc,
            texture_size_loc,
        })
    }

    pub fn release(&self, gl: &mut G) {
        gl.delete_texture(self.texture);
        gl.delete_buffer(self.texcoord_buffer);
        gl.delete_buffer(self.position_buffer);
        gl.delete_program(self.program);
    }
}

/// Upload the current frame, push every uniform and draw.
pub fn draw_frame<G, V, C>(
    gl: &mut G,
    video: &V,
    canvas: &C,
    gpu: &GpuObjects<G>,
    uniforms: &[BoundUniform<G::UniformLocation>],
) where
    G: GlBackend,
    V: VideoElement<Frame = G::Frame>,
    C: OverlayCanvas,
{
    gl.use_program(gpu.program);
    video.with_frame(|frame| gl.upload_frame(gpu.texture, frame));

    let size = video.native_size();
    if let Some(loc) = &gpu.texture_size_loc {
        gl.set_uniform_vec2(loc, size.width as f32, size.height as f32);
    }
    if let Some(loc) = &gpu.texture_loc {
        gl.set_uniform_i32(loc, 0);
    }
    for u in uniforms {
        if let Some(loc) = &u.location {
            gl.set_uniform_f32(loc, u.value as f32);
        }
    }

    gl.draw_quad(canvas.viewport());
    canvas.present();
}
