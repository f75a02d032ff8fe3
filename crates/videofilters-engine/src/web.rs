//! Browser binding for the content script: DOM videos, WebGL1 overlay
//! canvases and the observers that keep them aligned.
//!
//! One [`PageContext`] lives per frame in a thread-local. The extension's
//! popup reaches it through [`vf_handle_command`]; DOM callbacks feed it
//! [`PageEvent`]s.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    AddEventListenerOptions, CssStyleDeclaration, Document, HtmlCanvasElement, HtmlVideoElement, MutationObserver,
    MutationObserverInit, NodeList, ResizeObserver, WebGlRenderingContext, Window,
};

use crate::error::EngineError;
use crate::events::EventSink;
use crate::gl::{GlowBackend, GlowFrame};
use crate::host::{FrameCallbackId, InsetStyle, ObserverSet, OverlayCanvas, PageHost, Rect, Size, VideoElement};
use crate::messaging::{FrameTarget, PageCommand, PageReply};
use crate::overlay::{px, OverlayLayout};
use crate::page::{PageContext, PageEvent, VideoKey};
use crate::{logi, logw};

impl GlowFrame for HtmlVideoElement {
    unsafe fn tex_image(&self, gl: &glow::Context) {
        gl.tex_image_2d_with_html_video(
            glow::TEXTURE_2D,
            0,
            glow::RGBA as i32,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            self,
        );
    }
}

thread_local! {
    static PAGE: RefCell<Option<PageContext<WebHost>>> = const { RefCell::new(None) };
}

/// Run `f` against this frame's context, creating it on first use. `None`
/// when there is no window or the context is already borrowed.
fn with_page<R>(f: impl FnOnce(&mut PageContext<WebHost>) -> R) -> Option<R> {
    PAGE.with(|cell| {
        let mut slot = cell.try_borrow_mut().ok()?;
        if slot.is_none() {
            let host = WebHost::new()?;
            logi!("PAGE", "context created for {}", host.uri);
            *slot = Some(PageContext::new(host, EventSink::none()));
        }
        slot.as_mut().map(f)
    })
}

fn dispatch(ev: PageEvent) {
    if with_page(|page| page.handle_event(ev)).is_none() {
        logw!("PAGE", "event dropped: page context busy");
    }
}

fn reply_json(reply: &PageReply) -> String {
    serde_json::to_string(reply).unwrap_or_else(|e| format!(r#"{{"type":"rejected","reason":"{e}"}}"#))
}

/// Entry point for the popup. `target` and `command` are JSON
/// ([`FrameTarget`], [`PageCommand`]); the reply is a JSON [`PageReply`].
#[wasm_bindgen]
pub fn vf_handle_command(target: &str, command: &str) -> String {
    let parsed = serde_json::from_str::<FrameTarget>(target)
        .and_then(|t| serde_json::from_str::<PageCommand>(command).map(|c| (t, c)));
    let reply = match parsed {
        Ok((target, cmd)) => with_page(|page| page.handle(&target, cmd))
            .unwrap_or_else(|| PageReply::Rejected { reason: "page context unavailable".into() }),
        Err(e) => PageReply::Rejected { reason: format!("malformed command: {e}") },
    };
    reply_json(&reply)
}

/// Page is going away: stop every session and restore the videos.
#[wasm_bindgen]
pub fn vf_page_closed() {
    with_page(|page| page.close());
}

fn js_err(what: &'static str) -> impl Fn(JsValue) -> EngineError {
    move |e| EngineError::GpuResource { what, msg: format!("{e:?}") }
}

fn call_method(target: &JsValue, name: &str, arg: &JsValue) -> Result<JsValue, JsValue> {
    let f: js_sys::Function = js_sys::Reflect::get(target, &JsValue::from_str(name))?.dyn_into()?;
    f.call1(target, arg)
}

fn style_value(style: &CssStyleDeclaration, prop: &str) -> Option<String> {
    style.get_property_value(prop).ok().filter(|v| !v.is_empty())
}

fn set_style(style: &CssStyleDeclaration, prop: &str, value: Option<&str>) {
    let _ = match value {
        Some(v) => style.set_property(prop, v),
        None => style.remove_property(prop).map(|_| ()),
    };
}

pub struct WebHost {
    window: Window,
    document: Document,
    uri: String,
}

impl WebHost {
    pub fn new() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        let uri = window.location().href().ok()?;
        Some(Self { window, document, uri })
    }

    fn collect(&self, list: NodeList, out: &mut Vec<HtmlVideoElement>) {
        for i in 0..list.length() {
            if let Some(v) = list.get(i).and_then(|n| n.dyn_into::<HtmlVideoElement>().ok()) {
                out.push(v);
            }
        }
    }
}

#[derive(Clone)]
pub struct WebVideo {
    el: HtmlVideoElement,
    key: VideoKey,
}

impl VideoElement for WebVideo {
    type Frame = HtmlVideoElement;

    fn native_size(&self) -> Size {
        Size::new(self.el.video_width(), self.el.video_height())
    }

    fn display_rect(&self) -> Rect {
        let r = self.el.get_bounding_client_rect();
        Rect { left: r.left(), top: r.top(), width: r.width(), height: r.height() }
    }

    fn with_frame<R>(&self, f: impl FnOnce(&HtmlVideoElement) -> R) -> R {
        f(&self.el)
    }

    fn inline_filter(&self) -> String {
        style_value(&self.el.style(), "filter").unwrap_or_default()
    }

    fn set_inline_filter(&self, css: &str) {
        set_style(&self.el.style(), "filter", Some(css));
    }

    fn inline_opacity(&self) -> Option<String> {
        style_value(&self.el.style(), "opacity")
    }

    fn set_inline_opacity(&self, value: Option<&str>) {
        set_style(&self.el.style(), "opacity", value);
    }

    fn inline_insets(&self) -> InsetStyle {
        let style = self.el.style();
        InsetStyle {
            top: style_value(&style, "top"),
            right: style_value(&style, "right"),
            bottom: style_value(&style, "bottom"),
            left: style_value(&style, "left"),
        }
    }

    fn z_index(&self) -> Option<String> {
        style_value(&self.el.style(), "z-index")
    }

    fn playback_rate(&self) -> f64 {
        self.el.playback_rate()
    }

    fn set_playback_rate(&self, rate: f64) {
        self.el.set_playback_rate(rate);
    }

    fn request_video_frame(&self) -> FrameCallbackId {
        let handle = Rc::new(Cell::new(0u64));
        let slot = handle.clone();
        let key = self.key.clone();
        // freed when it runs; a cancelled registration keeps its closure
        let cb = Closure::once_into_js(move |_now: f64, _meta: JsValue| {
            dispatch(PageEvent::VideoFrame { key, callback: FrameCallbackId(slot.get()) });
        });
        match call_method(&self.el, "requestVideoFrameCallback", &cb) {
            Ok(h) => {
                handle.set(h.as_f64().unwrap_or_default() as u64);
                FrameCallbackId(handle.get())
            }
            Err(e) => {
                logw!("RENDER", "requestVideoFrameCallback unavailable: {e:?}");
                FrameCallbackId(0)
            }
        }
    }

    fn cancel_video_frame(&self, id: FrameCallbackId) {
        if let Err(e) = call_method(&self.el, "cancelVideoFrameCallback", &JsValue::from_f64(id.0 as f64)) {
            logw!("RENDER", "cancelVideoFrameCallback failed: {e:?}");
        }
    }
}

pub struct WebCanvas {
    el: HtmlCanvasElement,
}

impl OverlayCanvas for WebCanvas {
    fn set_backing_size(&self, size: Size) {
        self.el.set_width(size.width);
        self.el.set_height(size.height);
    }

    fn backing_size(&self) -> Size {
        Size::new(self.el.width(), self.el.height())
    }

    fn apply_layout(&self, layout: &OverlayLayout, insets: &InsetStyle) {
        let style = self.el.style();
        set_style(&style, "width", Some(&px(layout.width)));
        set_style(&style, "height", Some(&px(layout.height)));
        let left = layout.offset_left.map(px).or_else(|| insets.left.clone());
        let top = layout.offset_top.map(px).or_else(|| insets.top.clone());
        set_style(&style, "left", left.as_deref());
        set_style(&style, "top", top.as_deref());
        set_style(&style, "right", insets.right.as_deref());
        set_style(&style, "bottom", insets.bottom.as_deref());
    }

    fn set_filter(&self, css: &str) {
        set_style(&self.el.style(), "filter", Some(css));
    }

    fn set_z_index(&self, z: Option<&str>) {
        set_style(&self.el.style(), "z-index", Some(z.unwrap_or("auto")));
    }

    fn remove(&self) {
        self.el.remove();
    }
}

#[derive(Default)]
pub struct WebObservers {
    resize: Option<ResizeObserver>,
    style: Option<MutationObserver>,
    removal: Option<MutationObserver>,
    listeners: Vec<(web_sys::EventTarget, &'static str, Closure<dyn FnMut()>)>,
    _callbacks: Vec<Closure<dyn FnMut(JsValue)>>,
}

impl ObserverSet for WebObservers {
    fn disconnect(&mut self) {
        if let Some(r) = self.resize.take() {
            r.disconnect();
        }
        for m in [self.style.take(), self.removal.take()].into_iter().flatten() {
            m.disconnect();
        }
        for (target, event, cb) in self.listeners.drain(..) {
            let _ = target.remove_event_listener_with_callback(event, cb.as_ref().unchecked_ref());
        }
        self._callbacks.clear();
    }
}

impl WebObservers {
    fn listen(&mut self, target: &web_sys::EventTarget, event: &'static str, ev: PageEvent) {
        let cb = Closure::<dyn FnMut()>::new(move || dispatch(ev.clone()));
        let opts = AddEventListenerOptions::new();
        opts.set_passive(true);
        match target.add_event_listener_with_callback_and_add_event_listener_options(
            event,
            cb.as_ref().unchecked_ref(),
            &opts,
        ) {
            Ok(()) => self.listeners.push((target.clone(), event, cb)),
            Err(e) => logw!("OVERLAY", "could not listen for {event}: {e:?}"),
        }
    }
}

impl PageHost for WebHost {
    type Gl = GlowBackend<HtmlVideoElement>;
    type Video = WebVideo;
    type Canvas = WebCanvas;
    type Observers = WebObservers;

    fn frame_uri(&self) -> String {
        self.uri.clone()
    }

    fn find_videos(&self) -> Vec<WebVideo> {
        let mut els = Vec::new();
        if let Ok(list) = self.document.query_selector_all("video") {
            self.collect(list, &mut els);
        }
        if let Ok(all) = self.document.query_selector_all("*") {
            for i in 0..all.length() {
                let root = all
                    .get(i)
                    .and_then(|n| n.dyn_into::<web_sys::Element>().ok())
                    .and_then(|e| e.shadow_root());
                if let Some(list) = root.and_then(|r| r.query_selector_all("video").ok()) {
                    self.collect(list, &mut els);
                }
            }
        }
        els.into_iter()
            .enumerate()
            .map(|(index, el)| WebVideo { el, key: VideoKey::new(self.uri.clone(), index) })
            .collect()
    }

    fn create_overlay(&mut self, video: &WebVideo, id: &str) -> Result<(WebCanvas, Self::Gl), EngineError> {
        let canvas: HtmlCanvasElement = self
            .document
            .create_element("canvas")
            .map_err(js_err("canvas"))?
            .dyn_into()
            .map_err(|_| EngineError::GpuResource { what: "canvas", msg: "not a canvas element".into() })?;
        canvas.set_id(id);
        let style = canvas.style();
        set_style(&style, "position", Some("absolute"));
        set_style(&style, "pointer-events", Some("none"));

        let parent = video
            .el
            .parent_node()
            .ok_or_else(|| EngineError::GpuResource { what: "canvas", msg: "video is detached".into() })?;
        let anchor: &web_sys::Node = video.el.as_ref();
        parent.insert_before(&canvas, Some(anchor)).map_err(js_err("canvas"))?;

        if let Ok(Some(computed)) = self.window.get_computed_style(&video.el) {
            if computed.get_property_value("position").ok().as_deref() == Some("static") {
                set_style(&video.el.style(), "position", Some("relative"));
            }
        }

        let ctx = ["webgl", "experimental-webgl"]
            .into_iter()
            .find_map(|kind| canvas.get_context(kind).ok().flatten())
            .and_then(|c| c.dyn_into::<WebGlRenderingContext>().ok());
        let Some(ctx) = ctx else {
            canvas.remove();
            return Err(EngineError::ContextUnavailable { msg: "WebGL not supported".into() });
        };

        let gl = GlowBackend::new(glow::Context::from_webgl1_context(ctx));
        let lost = gl.lost_flag();
        let on_lost = Closure::<dyn FnMut()>::new(move || lost.set(true));
        let _ = canvas.add_event_listener_with_callback("webglcontextlost", on_lost.as_ref().unchecked_ref());
        // lives as long as the canvas
        on_lost.forget();

        Ok((WebCanvas { el: canvas }, gl))
    }

    fn observe(&mut self, key: &VideoKey, video: &WebVideo, _canvas: &WebCanvas) -> WebObservers {
        let mut obs = WebObservers::default();

        let k = key.clone();
        let on_resize = Closure::<dyn FnMut(JsValue)>::new(move |_| dispatch(PageEvent::VideoResized(k.clone())));
        match ResizeObserver::new(on_resize.as_ref().unchecked_ref()) {
            Ok(r) => {
                r.observe(&video.el);
                obs.resize = Some(r);
            }
            Err(e) => logw!("OVERLAY", "ResizeObserver unavailable: {e:?}"),
        }
        obs._callbacks.push(on_resize);

        let k = key.clone();
        let on_style = Closure::<dyn FnMut(JsValue)>::new(move |_| dispatch(PageEvent::VideoStyleChanged(k.clone())));
        match MutationObserver::new(on_style.as_ref().unchecked_ref()) {
            Ok(m) => {
                let init = MutationObserverInit::new();
                init.set_attributes(true);
                init.set_attribute_filter(&js_sys::Array::of1(&JsValue::from_str("style")));
                if let Err(e) = m.observe_with_options(&video.el, &init) {
                    logw!("OVERLAY", "style observer failed: {e:?}");
                }
                obs.style = Some(m);
            }
            Err(e) => logw!("OVERLAY", "MutationObserver unavailable: {e:?}"),
        }
        obs._callbacks.push(on_style);

        // watch the video's tree (document or shadow root) for its detachment
        let k = key.clone();
        let el = video.el.clone();
        let on_removed = Closure::<dyn FnMut(JsValue)>::new(move |_| {
            if el.is_connected() {
                return;
            }
            // teardown drops this closure, so leave the callback before dispatching
            let k = k.clone();
            let later = Closure::once_into_js(move || dispatch(PageEvent::VideoRemoved(k)));
            if let Some(w) = web_sys::window() {
                w.queue_microtask(later.unchecked_ref());
            }
        });
        match MutationObserver::new(on_removed.as_ref().unchecked_ref()) {
            Ok(m) => {
                let init = MutationObserverInit::new();
                init.set_child_list(true);
                init.set_subtree(true);
                if let Err(e) = m.observe_with_options(&video.el.get_root_node(), &init) {
                    logw!("OVERLAY", "removal observer failed: {e:?}");
                }
                obs.removal = Some(m);
            }
            Err(e) => logw!("OVERLAY", "MutationObserver unavailable: {e:?}"),
        }
        obs._callbacks.push(on_removed);

        obs.listen(&self.window, "scroll", PageEvent::Scrolled);
        obs.listen(&video.el, "fullscreenchange", PageEvent::FullscreenChanged(key.clone()));
        obs
    }

    fn toggle_picture_in_picture(&mut self, video: &WebVideo, advanced: bool) -> Result<(), EngineError> {
        if advanced {
            return Err(EngineError::Unsupported { what: "document picture-in-picture" });
        }
        let doc: &JsValue = self.document.as_ref();
        let current = js_sys::Reflect::get(doc, &JsValue::from_str("pictureInPictureElement")).unwrap_or(JsValue::NULL);
        let r = if current.is_null() || current.is_undefined() {
            call_method(video.el.as_ref(), "requestPictureInPicture", &JsValue::UNDEFINED)
        } else {
            call_method(doc, "exitPictureInPicture", &JsValue::UNDEFINED)
        };
        r.map(|_| ()).map_err(|e| {
            logw!("PIP", "{e:?}");
            EngineError::Unsupported { what: "picture-in-picture" }
        })
    }
}
