//! Page-side collaborator traits.
//!
//! The engine never touches a DOM or a window directly. A host (the browser
//! binding in `web`, the desktop harness, or the test fakes) implements these
//! traits for its own video, canvas and observer objects.

use crate::error::EngineError;
use crate::gl::{GlBackend, Viewport};
use crate::overlay::OverlayLayout;
use crate::page::VideoKey;

/// Decoded frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// On-screen box of an element, CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// The video's inline positioning properties, copied verbatim onto the canvas
/// for every edge the fit computation does not own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsetStyle {
    pub top: Option<String>,
    pub right: Option<String>,
    pub bottom: Option<String>,
    pub left: Option<String>,
}

/// Opaque handle of a pending frame-available registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameCallbackId(pub u64);

pub trait VideoElement {
    type Frame: ?Sized;

    /// Decoded size (`videoWidth` x `videoHeight`). Zero while no frame is available.
    fn native_size(&self) -> Size;
    fn display_rect(&self) -> Rect;

    /// Run `f` with the current frame.
    fn with_frame<R>(&self, f: impl FnOnce(&Self::Frame) -> R) -> R;

    fn inline_filter(&self) -> String;
    fn set_inline_filter(&self, css: &str);

    /// Inline `opacity` property, `None` when not set.
    fn inline_opacity(&self) -> Option<String>;
    /// `None` removes the property.
    fn set_inline_opacity(&self, value: Option<&str>);

    fn inline_insets(&self) -> InsetStyle;
    fn z_index(&self) -> Option<String>;

    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);

    /// Register for the next presented frame. The host later reports it as
    /// `PageEvent::VideoFrame` carrying the same id.
    fn request_video_frame(&self) -> FrameCallbackId;
    fn cancel_video_frame(&self, id: FrameCallbackId);
}

pub trait OverlayCanvas {
    /// Drawing-buffer size (the canvas `width`/`height` attributes).
    fn set_backing_size(&self, size: Size);
    fn backing_size(&self) -> Size;

    fn apply_layout(&self, layout: &OverlayLayout, insets: &InsetStyle);
    fn set_filter(&self, css: &str);
    /// `None` renders as `auto`.
    fn set_z_index(&self, z: Option<&str>);

    /// Region of the drawing buffer the quad is drawn into.
    fn viewport(&self) -> Viewport {
        let s = self.backing_size();
        Viewport::full(s.width, s.height)
    }

    /// Called after each draw. Browser canvases composite on their own.
    fn present(&self) {}

    fn remove(&self);
}

/// Resize / style / fullscreen observers attached for one session.
pub trait ObserverSet {
    fn disconnect(&mut self);
}

pub trait PageHost {
    type Gl: GlBackend;
    type Video: VideoElement<Frame = <Self::Gl as GlBackend>::Frame>;
    type Canvas: OverlayCanvas;
    type Observers: ObserverSet;

    /// URI of the frame this host lives in.
    fn frame_uri(&self) -> String;

    /// Every video-like element, in document order (top document first, then
    /// open shadow roots).
    fn find_videos(&self) -> Vec<Self::Video>;

    /// Insert an overlay canvas for `video` with element id `id` and acquire a
    /// GL context on it.
    fn create_overlay(&mut self, video: &Self::Video, id: &str) -> Result<(Self::Canvas, Self::Gl), EngineError>;

    /// Start delivering `VideoResized`, `Scrolled`, `FullscreenChanged` and
    /// `VideoStyleChanged` events for `key`.
    fn observe(&mut self, key: &VideoKey, video: &Self::Video, canvas: &Self::Canvas) -> Self::Observers;

    fn toggle_picture_in_picture(&mut self, _video: &Self::Video, _advanced: bool) -> Result<(), EngineError> {
        Err(EngineError::Unsupported { what: "picture-in-picture" })
    }
}
