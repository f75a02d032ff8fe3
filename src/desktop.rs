//! Desktop page host: one synthetic video drawn into the preview window.
//!
//! The window plays the part of the page. Its client area is the video's
//! display box and the window's default framebuffer is the overlay canvas, so
//! the engine's fit computation letterboxes the shader output exactly the way
//! it would inside a browser.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use videofilters_engine::error::EngineError;
use videofilters_engine::gl::{GlowBackend, RgbaFrame, Viewport};
use videofilters_engine::host::{
    FrameCallbackId, InsetStyle, ObserverSet, OverlayCanvas, PageHost, Rect, Size, VideoElement,
};
use videofilters_engine::overlay::OverlayLayout;
use videofilters_engine::page::VideoKey;

pub const PAGE_URI: &str = "desktop://preview";
pub const VIDEO_WIDTH: u32 = 1280;
pub const VIDEO_HEIGHT: u32 = 720;
pub const VIDEO_FPS: f64 = 30.0;

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

/// Scrolling colour bars over a grey ramp, with a white sweep line.
fn paint(frame: &mut RgbaFrame, n: u64) {
    let w = frame.width as usize;
    let h = frame.height as usize;
    if w == 0 || h == 0 {
        return;
    }
    let shift = (n as usize * 4) % w;
    let sweep = (n as usize * 8) % w;
    for (y, row) in frame.pixels.chunks_exact_mut(w * 4).enumerate() {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let rgb = if x.abs_diff(sweep) < 3 {
                [255, 255, 255]
            } else if y >= h * 3 / 4 {
                let g = (x * 255 / w) as u8;
                [g, g, g]
            } else {
                BARS[((x + shift) * BARS.len() / w) % BARS.len()]
            };
            px.copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
    }
}

struct VideoState {
    frame: RgbaFrame,
    frame_no: u64,
    rate: f64,
    filter: String,
    opacity: Option<String>,
    display: Rect,
    pending: Option<FrameCallbackId>,
    next_cb: u64,
    last_frame: Instant,
}

/// Animated test pattern standing in for a `<video>` element.
#[derive(Clone)]
pub struct TestPatternVideo(Rc<RefCell<VideoState>>);

impl TestPatternVideo {
    pub fn new(width: u32, height: u32) -> Self {
        let mut frame = RgbaFrame::new(width, height);
        paint(&mut frame, 0);
        Self(Rc::new(RefCell::new(VideoState {
            frame,
            frame_no: 0,
            rate: 1.0,
            filter: String::new(),
            opacity: None,
            display: Rect { left: 0.0, top: 0.0, width: width as f64, height: height as f64 },
            pending: None,
            next_cb: 0,
            last_frame: Instant::now(),
        })))
    }

    fn interval(rate: f64) -> Duration {
        Duration::from_secs_f64(1.0 / (VIDEO_FPS * rate.max(0.1)))
    }

    /// When the next frame is due.
    pub fn next_due(&self) -> Instant {
        let st = self.0.borrow();
        st.last_frame + Self::interval(st.rate)
    }

    /// Decode the next frame if it is due. Returns the registration to fire,
    /// if one is pending.
    pub fn advance(&self, now: Instant) -> Option<FrameCallbackId> {
        let mut st = self.0.borrow_mut();
        if now < st.last_frame + Self::interval(st.rate) {
            return None;
        }
        st.last_frame = now;
        st.frame_no += 1;
        let n = st.frame_no;
        paint(&mut st.frame, n);
        st.pending.take()
    }

    pub fn set_display(&self, size: Size) {
        self.0.borrow_mut().display = Rect { left: 0.0, top: 0.0, width: size.width as f64, height: size.height as f64 };
    }

    /// Inline filter as last set by the popup. The desktop preview has no CSS
    /// compositor, so it is reported but not applied.
    pub fn filter(&self) -> String {
        self.0.borrow().filter.clone()
    }
}

impl VideoElement for TestPatternVideo {
    type Frame = RgbaFrame;

    fn native_size(&self) -> Size {
        let st = self.0.borrow();
        Size::new(st.frame.width, st.frame.height)
    }

    fn display_rect(&self) -> Rect {
        self.0.borrow().display
    }

    fn with_frame<R>(&self, f: impl FnOnce(&RgbaFrame) -> R) -> R {
        f(&self.0.borrow().frame)
    }

    fn inline_filter(&self) -> String {
        self.filter()
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
        InsetStyle::default()
    }

    fn z_index(&self) -> Option<String> {
        None
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
        let id = FrameCallbackId(st.next_cb);
        st.pending = Some(id);
        id
    }

    fn cancel_video_frame(&self, id: FrameCallbackId) {
        let mut st = self.0.borrow_mut();
        if st.pending == Some(id) {
            st.pending = None;
        }
    }
}

#[derive(Default)]
struct CanvasState {
    backing: Size,
    window: Size,
    layout: Option<OverlayLayout>,
    filter: String,
    removed: bool,
}

/// The window's default framebuffer, seen as an overlay canvas.
#[derive(Clone)]
pub struct WindowCanvas {
    state: Rc<RefCell<CanvasState>>,
    dirty: Rc<Cell<bool>>,
}

impl WindowCanvas {
    fn set_window(&self, size: Size) {
        self.state.borrow_mut().window = size;
    }

    fn is_removed(&self) -> bool {
        self.state.borrow().removed
    }
}

impl OverlayCanvas for WindowCanvas {
    fn set_backing_size(&self, size: Size) {
        self.state.borrow_mut().backing = size;
    }

    fn backing_size(&self) -> Size {
        self.state.borrow().backing
    }

    fn apply_layout(&self, layout: &OverlayLayout, _insets: &InsetStyle) {
        self.state.borrow_mut().layout = Some(*layout);
    }

    fn set_filter(&self, css: &str) {
        self.state.borrow_mut().filter = css.to_string();
    }

    fn set_z_index(&self, _z: Option<&str>) {}

    /// The fitted box inside the window, GL origin bottom-left.
    fn viewport(&self) -> Viewport {
        let st = self.state.borrow();
        match st.layout {
            Some(l) => {
                let left = l.offset_left.unwrap_or(0.0);
                let top = l.offset_top.unwrap_or(0.0);
                Viewport {
                    x: left.round() as i32,
                    y: (st.window.height as f64 - top - l.height).round() as i32,
                    width: l.width.round() as i32,
                    height: l.height.round() as i32,
                }
            }
            None => Viewport::full(st.window.width, st.window.height),
        }
    }

    fn present(&self) {
        self.dirty.set(true);
    }

    fn remove(&self) {
        self.state.borrow_mut().removed = true;
        self.dirty.set(true);
    }
}

/// Resize and fullscreen changes come from the winit loop, so there is
/// nothing to detach.
pub struct WindowObservers;

impl ObserverSet for WindowObservers {
    fn disconnect(&mut self) {}
}

pub type MakeGl = Box<dyn Fn() -> glow::Context>;

pub struct DesktopHost {
    video: TestPatternVideo,
    canvases: Vec<WindowCanvas>,
    dirty: Rc<Cell<bool>>,
    window: Size,
    make_gl: MakeGl,
}

impl DesktopHost {
    /// `make_gl` loads a `glow` context for the window's current GL context.
    pub fn new(window: Size, make_gl: MakeGl) -> Self {
        let video = TestPatternVideo::new(VIDEO_WIDTH, VIDEO_HEIGHT);
        video.set_display(window);
        Self { video, canvases: Vec::new(), dirty: Rc::new(Cell::new(true)), window, make_gl }
    }

    pub fn video(&self) -> &TestPatternVideo {
        &self.video
    }

    pub fn video_key() -> VideoKey {
        VideoKey::new(PAGE_URI, 0)
    }

    pub fn set_window_size(&mut self, size: Size) {
        self.window = size;
        self.video.set_display(size);
        for c in &self.canvases {
            c.set_window(size);
        }
        self.dirty.set(true);
    }

    /// True once since the last call if anything was drawn or removed.
    pub fn take_dirty(&mut self) -> bool {
        self.canvases.retain(|c| !c.is_removed());
        self.dirty.replace(false)
    }
}

impl PageHost for DesktopHost {
    type Gl = GlowBackend<RgbaFrame>;
    type Video = TestPatternVideo;
    type Canvas = WindowCanvas;
    type Observers = WindowObservers;

    fn frame_uri(&self) -> String {
        PAGE_URI.to_string()
    }

    fn find_videos(&self) -> Vec<TestPatternVideo> {
        vec![self.video.clone()]
    }

    fn create_overlay(&mut self, _video: &TestPatternVideo, _id: &str) -> Result<(WindowCanvas, Self::Gl), EngineError> {
        let canvas = WindowCanvas {
            state: Rc::new(RefCell::new(CanvasState { window: self.window, ..Default::default() })),
            dirty: self.dirty.clone(),
        };
        self.canvases.push(canvas.clone());
        Ok((canvas, GlowBackend::new((self.make_gl)())))
    }

    fn observe(&mut self, _key: &VideoKey, _video: &TestPatternVideo, _canvas: &WindowCanvas) -> WindowObservers {
        WindowObservers
    }
}
