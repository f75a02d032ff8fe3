//! Recording fakes for the host and GL traits.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::error::EngineError;
use crate::gl::{GlBackend, ShaderStage, Viewport};
use crate::host::{
    FrameCallbackId, InsetStyle, ObserverSet, OverlayCanvas, PageHost, Rect, Size, VideoElement,
};
use crate::overlay::OverlayLayout;
use crate::page::VideoKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    VertexCompile,
    FragmentCompile,
    Link,
    Texture,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Upload { width: u32, height: u32 },
    UniformF32(String, f32),
    UniformVec2(String, f32, f32),
    UniformI32(String, i32),
    Draw(Viewport),
}

#[derive(Debug, Default)]
pub struct GlState {
    pub calls: Vec<GlCall>,
    /// Objects created and not yet deleted.
    pub live: BTreeSet<u32>,
    pub fail: Option<FailAt>,
    pub lost: bool,
    /// Uniform names the "linker" optimizes out.
    pub optimized_out: Vec<String>,
    next: u32,
}

impl GlState {
    fn alloc(&mut self) -> u32 {
        self.next += 1;
        self.live.insert(self.next);
        self.next
    }

    pub fn draws(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, GlCall::Draw(_))).count()
    }

    pub fn last_f32(&self, name: &str) -> Option<f32> {
        self.calls.iter().rev().find_map(|c| match c {
            GlCall::UniformF32(n, v) if n == name => Some(*v),
            _ => None,
        })
    }
}

pub type SharedGl = Rc<RefCell<GlState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeFrame {
    pub width: u32,
    pub height: u32,
}

pub struct FakeGl {
    state: SharedGl,
}

impl GlBackend for FakeGl {
    type Shader = u32;
    type Program = u32;
    type Buffer = u32;
    type Texture = u32;
    type UniformLocation = String;
    type Frame = FakeFrame;

    fn compile_shader(&mut self, stage: ShaderStage, _src: &str) -> Result<u32, EngineError> {
        let mut st = self.state.borrow_mut();
        let fail = matches!(
            (st.fail, stage),
            (Some(FailAt::VertexCompile), ShaderStage::Vertex) | (Some(FailAt::FragmentCompile), ShaderStage::Fragment)
        );
        if fail {
            return Err(EngineError::Compile { stage, log: "ERROR: 0:1: syntax error".into() });
        }
        Ok(st.alloc())
    }

    fn delete_shader(&mut self, shader: u32) {
        self.state.borrow_mut().live.remove(&shader);
    }

    fn link_program(&mut self, vs: u32, fs: u32) -> Result<u32, EngineError> {
        let mut st = self.state.borrow_mut();
        st.live.remove(&vs);
        st.live.remove(&fs);
        if st.fail == Some(FailAt::Link) {
            return Err(EngineError::Link { log: "ERROR: varying mismatch".into() });
        }
        Ok(st.alloc())
    }

    fn delete_program(&mut self, program: u32) {
        self.state.borrow_mut().live.remove(&program);
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> Result<u32, EngineError> {
        assert_eq!(data.len(), 12);
        Ok(self.state.borrow_mut().alloc())
    }

    fn delete_buffer(&mut self, buffer: u32) {
        self.state.borrow_mut().live.remove(&buffer);
    }

    fn bind_attribute(&mut self, _program: u32, _name: &str, _buffer: u32, _size: i32) -> bool {
        true
    }

    fn create_video_texture(&mut self) -> Result<u32, EngineError> {
        let mut st = self.state.borrow_mut();
        if st.fail == Some(FailAt::Texture) {
            return Err(EngineError::GpuResource { what: "texture", msg: "out of memory".into() });
        }
        Ok(st.alloc())
    }

    fn delete_texture(&mut self, texture: u32) {
        self.state.borrow_mut().live.remove(&texture);
    }

    fn upload_frame(&mut self, _texture: u32, frame: &FakeFrame) {
        self.state.borrow_mut().calls.push(GlCall::Upload { width: frame.width, height: frame.height });
    }

    fn uniform_location(&mut self, _program: u32, name: &str) -> Option<String> {
        let st = self.state.borrow();
        (!st.optimized_out.iter().any(|n| n == name)).then(|| name.to_string())
    }

    fn use_program(&mut self, _program: u32) {}

    fn set_uniform_f32(&mut self, loc: &String, v: f32) {
        self.state.borrow_mut().calls.push(GlCall::UniformF32(loc.clone(), v));
    }

    fn set_uniform_vec2(&mut self, loc: &String, x: f32, y: f32) {
        self.state.borrow_mut().calls.push(GlCall::UniformVec2(loc.clone(), x, y));
    }

    fn set_uniform_i32(&mut self, loc: &String, v: i32) {
        self.state.borrow_mut().calls.push(GlCall::UniformI32(loc.clone(), v));
    }

    fn draw_quad(&mut self, viewport: Viewport) {
        self.state.borrow_mut().calls.push(GlCall::Draw(viewport));
    }

    fn is_context_lost(&self) -> bool {
        self.state.borrow().lost
    }
}

#[derive(Debug, Clone)]
pub struct VideoState {
    pub native: Size,
    pub rect: Rect,
    pub filter: String,
    pub opacity: Option<String>,
    pub insets: InsetStyle,
    pub z_index: Option<String>,
    pub rate: f64,
    /// Registrations requested and not yet fired or cancelled.
    pub pending: Vec<FrameCallbackId>,
    pub requested: u32,
    pub cancelled: Vec<FrameCallbackId>,
    next_cb: u64,
}

#[derive(Debug, Clone)]
pub struct FakeVideo(pub Rc<RefCell<VideoState>>);

impl FakeVideo {
    pub fn new(width: u32, height: u32, rect: Rect) -> Self {
        Self(Rc::new(RefCell::new(VideoState {
            native: Size::new(width, height),
            rect,
            filter: String::new(),
            opacity: None,
            insets: InsetStyle::default(),
            z_index: None,
            rate: 1.0,
            pending: Vec::new(),
            requested: 0,
            cancelled: Vec::new(),
            next_cb: 0,
        })))
    }

    pub fn state(&self) -> std::cell::Ref<'_, VideoState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> std::cell::RefMut<'_, VideoState> {
        self.0.borrow_mut()
    }

    /// Fire the pending registration, as the browser would on a new frame.
    pub fn fire(&self) -> Option<FrameCallbackId> {
        let mut st = self.0.borrow_mut();
        if st.pending.is_empty() {
            None
        } else {
            Some(st.pending.remove(0))
        }
    }
}

impl VideoElement for FakeVideo {
    type Frame = FakeFrame;

    fn native_size(&self) -> Size {
        self.0.borrow().native
    }

    fn display_rect(&self) -> Rect {
        self.0.borrow().rect
    }

    fn with_frame<R>(&self, f: impl FnOnce(&FakeFrame) -> R) -> R {
        let n = self.native_size();
        f(&FakeFrame { width: n.width, height: n.height })
    }

    fn inline_filter(&self) -> String {
        self.0.borrow().filter.clone()
    }

    fn set_inline_filter(&self, css: &str) {
        self.0.borrow_mut().filter = css.to_string();
    }

    fn inline_opacity(&self) -> Option<String> {
        self.0.borrow().opacity.clone()
    }

    fn set_inline_opacity(&self, value: Option<&str>) {
        self.0.borrow_mut().opacity = value.map(str::to_string);
    }

    fn inline_insets(&self) -> InsetStyle {
        self.0.borrow().insets.clone()
    }

    fn z_index(&self) -> Option<String> {
        self.0.borrow().z_index.clone()
    }

    fn playback_rate(&self) -> f64 {
        self.0.borrow().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.0.borrow_mut().rate = rate;
    }

    fn request_video_frame(&self) -> FrameCallbackId {
        let mut st = self.0.borrow_mut();
        st.next_cb += 1;
        st.requested += 1;
        let id = FrameCallbackId(st.next_cb);
        st.pending.push(id);
        id
    }

    fn cancel_video_frame(&self, id: FrameCallbackId) {
        let mut st = self.0.borrow_mut();
        st.pending.retain(|p| *p != id);
        st.cancelled.push(id);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CanvasState {
    pub id: String,
    pub backing: Size,
    pub layout: Option<OverlayLayout>,
    pub insets: InsetStyle,
    pub filter: String,
    pub z_index: Option<String>,
    pub presents: u32,
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub struct FakeCanvas(pub Rc<RefCell<CanvasState>>);

impl FakeCanvas {
    pub fn state(&self) -> std::cell::Ref<'_, CanvasState> {
        self.0.borrow()
    }
}

impl OverlayCanvas for FakeCanvas {
    fn set_backing_size(&self, size: Size) {
        self.0.borrow_mut().backing = size;
    }

    fn backing_size(&self) -> Size {
        self.0.borrow().backing
    }

    fn apply_layout(&self, layout: &OverlayLayout, insets: &InsetStyle) {
        let mut st = self.0.borrow_mut();
        st.layout = Some(*layout);
        st.insets = insets.clone();
    }

    fn set_filter(&self, css: &str) {
        self.0.borrow_mut().filter = css.to_string();
    }

    fn set_z_index(&self, z: Option<&str>) {
        self.0.borrow_mut().z_index = Some(z.unwrap_or("auto").to_string());
    }

    fn present(&self) {
        self.0.borrow_mut().presents += 1;
    }

    fn remove(&self) {
        self.0.borrow_mut().removed = true;
    }
}

pub struct FakeObservers {
    disconnects: Rc<Cell<u32>>,
}

impl ObserverSet for FakeObservers {
    fn disconnect(&mut self) {
        self.disconnects.set(self.disconnects.get() + 1);
    }
}

pub struct FakeHost {
    pub uri: String,
    pub videos: Vec<FakeVideo>,
    pub gl: SharedGl,
    pub canvases: Vec<FakeCanvas>,
    pub observed: Vec<VideoKey>,
    pub disconnects: Rc<Cell<u32>>,
    pub no_context: bool,
    pub pip: Vec<bool>,
}

impl FakeHost {
    pub fn new(uri: &str, videos: Vec<FakeVideo>) -> Self {
        Self {
            uri: uri.to_string(),
            videos,
            gl: SharedGl::default(),
            canvases: Vec::new(),
            observed: Vec::new(),
            disconnects: Rc::new(Cell::new(0)),
            no_context: false,
            pip: Vec::new(),
        }
    }

    /// One 1920x1080 video shown at 300x100.
    pub fn single() -> Self {
        let rect = Rect { left: 0.0, top: 0.0, width: 300.0, height: 100.0 };
        Self::new("https://example.test/watch", vec![FakeVideo::new(1920, 1080, rect)])
    }

    pub fn live_canvases(&self) -> usize {
        self.canvases.iter().filter(|c| !c.state().removed).count()
    }
}

impl PageHost for FakeHost {
    type Gl = FakeGl;
    type Video = FakeVideo;
    type Canvas = FakeCanvas;
    type Observers = FakeObservers;

    fn frame_uri(&self) -> String {
        self.uri.clone()
    }

    fn find_videos(&self) -> Vec<FakeVideo> {
        self.videos.clone()
    }

    fn create_overlay(&mut self, _video: &FakeVideo, id: &str) -> Result<(FakeCanvas, FakeGl), EngineError> {
        if self.no_context {
            return Err(EngineError::ContextUnavailable { msg: "webgl disabled".into() });
        }
        let canvas = FakeCanvas(Rc::new(RefCell::new(CanvasState { id: id.to_string(), ..Default::default() })));
        self.canvases.push(canvas.clone());
        Ok((canvas, FakeGl { state: self.gl.clone() }))
    }

    fn observe(&mut self, key: &VideoKey, _video: &FakeVideo, _canvas: &FakeCanvas) -> FakeObservers {
        self.observed.push(key.clone());
        FakeObservers { disconnects: self.disconnects.clone() }
    }

    fn toggle_picture_in_picture(&mut self, _video: &FakeVideo, advanced: bool) -> Result<(), EngineError> {
        self.pip.push(advanced);
        Ok(())
    }
}
