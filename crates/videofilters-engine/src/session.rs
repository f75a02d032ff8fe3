//! Per-video shader session.
//!
//! A session owns the overlay canvas, its GL context and objects, the
//! observers that keep the overlay aligned, and the render loop. While it is
//! alive the video itself is hidden (inline `opacity: 0`) and the canvas shows
//! the processed frames with the video's CSS filter minus its opacity.

use crate::error::EngineError;
use crate::events::{EngineEvent, EventSink, StopReason};
use crate::filter::with_opaque;
use crate::gl::GlBackend;
use crate::host::{FrameCallbackId, ObserverSet, OverlayCanvas, PageHost, VideoElement};
use crate::overlay::fit_overlay;
use crate::page::VideoKey;
use crate::render::{draw_frame, BoundUniform, GpuObjects, RenderLoop, TickKind};
use crate::settings::ShaderSource;
use crate::uniforms::UniformSchema;
use crate::{loge, logi, logw};

type Location<H> = <<H as PageHost>::Gl as GlBackend>::UniformLocation;

pub struct ShaderSession<H: PageHost> {
    key: VideoKey,
    id: String,
    video: H::Video,
    canvas: H::Canvas,
    gl: H::Gl,
    gpu: GpuObjects<H::Gl>,
    uniforms: Vec<BoundUniform<Location<H>>>,
    observers: H::Observers,
    render: RenderLoop,
    original_opacity: Option<String>,
    torn_down: bool,
}

impl<H: PageHost> ShaderSession<H> {
    /// Build the overlay, compile + link, bind the quad and start rendering.
    ///
    /// On a compile or link failure nothing is left behind: the partial GL
    /// objects are deleted, the canvas is removed and the video is untouched.
    pub fn create(
        host: &mut H,
        key: VideoKey,
        video: H::Video,
        source: &ShaderSource,
        schema: &UniformSchema,
        events: &EventSink,
    ) -> Result<Self, EngineError> {
        let id = key.overlay_id();
        let (canvas, mut gl) = host.create_overlay(&video, &id)?;
        canvas.set_backing_size(video.native_size());

        let gpu = match GpuObjects::build(&mut gl, source) {
            Ok(gpu) => gpu,
            Err(e) => {
                canvas.remove();
                match &e {
                    EngineError::Compile { stage, log } => events.emit(EngineEvent::ShaderCompileErr {
                        id: id.clone(),
                        stage: *stage,
                        log: log.clone(),
                    }),
                    EngineError::Link { log } => events.emit(EngineEvent::ShaderLinkErr {
                        id: id.clone(),
                        log: log.clone(),
                    }),
                    _ => {}
                }
                loge!("SHADER", "{id}: {e}");
                return Err(e);
            }
        };

        let mut uniforms = Vec::with_capacity(schema.uniforms.len());
        for spec in &schema.uniforms {
            let location = gl.uniform_location(gpu.program, &spec.name);
            match &location {
                Some(loc) => gl.set_uniform_f32(loc, spec.default as f32),
                None => {
                    logw!("SHADER", "{id}: uniform {} not found in program", spec.name);
                    events.emit(EngineEvent::UniformMissing { id: id.clone(), name: spec.name.clone() });
                }
            }
            uniforms.push(BoundUniform { spec: spec.clone(), location, value: spec.default });
        }

        let original_opacity = video.inline_opacity();
        video.set_inline_opacity(Some("0"));

        let observers = host.observe(&key, &video, &canvas);

        let mut session = Self {
            key,
            id,
            video,
            canvas,
            gl,
            gpu,
            uniforms,
            observers,
            render: RenderLoop::new(),
            original_opacity,
            torn_down: false,
        };
        session.sync_style();
        session.update_layout();

        logi!("SHADER", "{}: session started ({} uniforms)", session.id, session.uniforms.len());
        events.emit(EngineEvent::SessionStarted { id: session.id.clone(), uniforms: session.uniforms.len() });

        session.tick(TickKind::Scheduled);
        Ok(session)
    }

    pub fn key(&self) -> &VideoKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn video(&self) -> &H::Video {
        &self.video
    }

    pub fn is_active(&self) -> bool {
        !self.torn_down
    }

    pub fn ticks(&self) -> u64 {
        self.render.ticks()
    }

    pub fn pending_frame(&self) -> Option<FrameCallbackId> {
        self.render.pending()
    }

    /// Current value of every uniform, in schema order.
    pub fn values(&self) -> Vec<(String, f64)> {
        self.uniforms.iter().map(|u| (u.spec.name.clone(), u.value)).collect()
    }

    /// Draw one frame. Scheduled ticks re-arm the frame notification.
    /// Returns false (and draws nothing) once torn down or after context loss.
    pub fn tick(&mut self, kind: TickKind) -> bool {
        if self.torn_down || self.render.is_stopped() {
            return false;
        }
        if self.gl.is_context_lost() {
            logw!("RENDER", "{}: context lost; skipping frame", self.id);
            return false;
        }

        let native = self.video.native_size();
        if !native.is_empty() && self.canvas.backing_size() != native {
            self.canvas.set_backing_size(native);
        }

        draw_frame(&mut self.gl, &self.video, &self.canvas, &self.gpu, &self.uniforms);
        self.render.record_tick();

        if kind == TickKind::Scheduled {
            let next = self.video.request_video_frame();
            self.render.arm(next);
        }
        true
    }

    /// Frame-available notification from the host. Stale ids are ignored.
    pub fn on_video_frame(&mut self, id: FrameCallbackId) -> bool {
        if !self.render.accept(id) {
            return false;
        }
        self.tick(TickKind::Scheduled)
    }

    /// Store a new value and redraw immediately. Values are clamped to the
    /// uniform's range; non-finite input is ignored.
    pub fn update_uniform(&mut self, name: &str, value: f64) -> Result<f64, EngineError> {
        if self.torn_down {
            return Err(EngineError::SessionNotFound { id: self.id.clone() });
        }
        let u = self
            .uniforms
            .iter_mut()
            .find(|u| u.spec.name == name)
            .ok_or_else(|| EngineError::UnknownUniform { name: name.to_string() })?;
        if value.is_finite() {
            u.value = u.spec.clamp(value);
        }
        let stored = u.value;
        self.tick(TickKind::Forced);
        Ok(stored)
    }

    /// Re-fit the canvas to the video's displayed box.
    pub fn update_layout(&self) {
        if self.torn_down {
            return;
        }
        let layout = fit_overlay(self.video.native_size(), self.video.display_rect());
        self.canvas.apply_layout(&layout, &self.video.inline_insets());
        self.canvas.set_z_index(self.video.z_index().as_deref());
        let native = self.video.native_size();
        if !native.is_empty() {
            self.canvas.set_backing_size(native);
        }
    }

    /// Mirror the video's filter (opacity forced to 1) and z-index onto the canvas.
    pub fn sync_style(&self) {
        if self.torn_down {
            return;
        }
        self.canvas.set_filter(&with_opaque(&self.video.inline_filter()));
        self.canvas.set_z_index(self.video.z_index().as_deref());
    }

    /// Release everything and restore the video. Safe to call more than once;
    /// only the first call does anything.
    pub fn teardown(&mut self, reason: StopReason, events: &EventSink) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;

        if let Some(pending) = self.render.stop() {
            self.video.cancel_video_frame(pending);
        }
        self.observers.disconnect();
        self.gpu.release(&mut self.gl);
        self.canvas.remove();
        self.video.set_inline_opacity(self.original_opacity.as_deref());

        logi!("SHADER", "{}: session stopped ({:?})", self.id, reason);
        events.emit(EngineEvent::SessionStopped { id: self.id.clone(), reason });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Fit;
    use crate::testing::{FailAt, FakeHost, GlCall};
    use crossbeam_channel::unbounded;

    fn key() -> VideoKey {
        VideoKey { uri: "https://example.test/watch".into(), index: 0 }
    }

    fn start(host: &mut FakeHost) -> Result<ShaderSession<FakeHost>, EngineError> {
        let source = ShaderSource::default();
        let schema = UniformSchema::from_source(&source.fragment);
        let video = host.videos[0].clone();
        ShaderSession::create(host, key(), video, &source, &schema, &EventSink::none())
    }

    #[test]
    fn create_renders_first_frame_and_arms_callback() {
        let mut host = FakeHost::single();
        let s = start(&mut host).unwrap();

        let gl = host.gl.borrow();
        assert_eq!(gl.draws(), 1);
        assert!(gl.calls.contains(&GlCall::Upload { width: 1920, height: 1080 }));
        assert!(gl.calls.contains(&GlCall::UniformVec2("u_textureSize".into(), 1920.0, 1080.0)));
        assert!(gl.calls.contains(&GlCall::UniformI32("u_texture".into(), 0)));
        assert_eq!(gl.last_f32("u_temperature"), Some(0.0));

        assert_eq!(s.id(), "vf-shader-0-https://example.test/watch");
        assert!(s.pending_frame().is_some());
        assert_eq!(host.videos[0].state().requested, 1);
    }

    #[test]
    fn create_applies_fit_filter_and_z_index() {
        let mut host = FakeHost::single();
        {
            let mut v = host.videos[0].state_mut();
            v.filter = "brightness(1.2) opacity(0.5)".into();
            v.z_index = Some("3".into());
        }
        let _s = start(&mut host).unwrap();

        let c = host.canvases[0].state();
        let layout = c.layout.unwrap();
        assert_eq!(layout.fit, Fit::Height);
        assert!((layout.width - 177.78).abs() < 0.01);
        assert!((layout.offset_left.unwrap_or_default() - 61.11).abs() < 0.01);
        assert_eq!(c.filter, "brightness(1.2) opacity(1)");
        assert_eq!(c.z_index.as_deref(), Some("3"));
        assert_eq!((c.backing.width, c.backing.height), (1920, 1080));
    }

    #[test]
    fn z_index_defaults_to_auto() {
        let mut host = FakeHost::single();
        let _s = start(&mut host).unwrap();
        assert_eq!(host.canvases[0].state().z_index.as_deref(), Some("auto"));
    }

    #[test]
    fn scheduled_ticks_rearm_and_forced_ticks_do_not() {
        let mut host = FakeHost::single();
        let mut s = start(&mut host).unwrap();
        let video = host.videos[0].clone();

        let first = video.fire().unwrap();
        assert!(s.on_video_frame(first));
        assert_eq!(video.state().requested, 2);

        s.update_uniform("u_vignette", 1.5).unwrap();
        assert_eq!(video.state().requested, 2);
        assert_eq!(video.state().pending.len(), 1);
        assert_eq!(host.gl.borrow().draws(), 3);
        assert_eq!(host.gl.borrow().last_f32("u_vignette"), Some(1.5));
    }

    #[test]
    fn stale_frame_ids_are_ignored() {
        let mut host = FakeHost::single();
        let mut s = start(&mut host).unwrap();
        assert!(!s.on_video_frame(FrameCallbackId(999)));
        assert_eq!(s.ticks(), 1);
    }

    #[test]
    fn update_uniform_clamps_and_rejects_unknown_names() {
        let mut host = FakeHost::single();
        let mut s = start(&mut host).unwrap();
        assert_eq!(s.update_uniform("u_temperature", 9.0).unwrap(), 2.0);
        assert_eq!(s.update_uniform("u_temperature", f64::NAN).unwrap(), 2.0);
        assert!(matches!(
            s.update_uniform("u_nope", 1.0),
            Err(EngineError::UnknownUniform { .. })
        ));
        let values = s.values();
        assert_eq!(values[2], ("u_temperature".to_string(), 2.0));
    }

    #[test]
    fn teardown_cancels_exactly_once_and_releases_everything() {
        let mut host = FakeHost::single();
        let mut s = start(&mut host).unwrap();
        let video = host.videos[0].clone();

        assert!(s.teardown(StopReason::Disabled, &EventSink::none()));
        assert!(!s.teardown(StopReason::Disabled, &EventSink::none()));

        assert_eq!(video.state().cancelled.len(), 1);
        assert!(video.state().pending.is_empty());
        assert!(host.gl.borrow().live.is_empty());
        assert!(host.canvases[0].state().removed);
        assert_eq!(host.disconnects.get(), 1);
        assert!(!s.is_active());
    }

    #[test]
    fn no_render_after_teardown() {
        let mut host = FakeHost::single();
        let mut s = start(&mut host).unwrap();
        let pending = s.pending_frame().unwrap();
        s.teardown(StopReason::Disabled, &EventSink::none());

        let draws = host.gl.borrow().draws();
        assert!(!s.on_video_frame(pending));
        assert!(!s.tick(TickKind::Forced));
        assert!(s.update_uniform("u_vignette", 1.0).is_err());
        assert_eq!(host.gl.borrow().draws(), draws);
    }

    #[test]
    fn opacity_is_restored_exactly() {
        for original in [None, Some("0.8"), Some("1")] {
            let mut host = FakeHost::single();
            host.videos[0].state_mut().opacity = original.map(str::to_string);

            for _ in 0..2 {
                let mut s = start(&mut host).unwrap();
                assert_eq!(host.videos[0].state().opacity.as_deref(), Some("0"));
                s.teardown(StopReason::Disabled, &EventSink::none());
                assert_eq!(host.videos[0].state().opacity.as_deref(), original);
            }
        }
    }

    #[test]
    fn compile_and_link_failures_leave_nothing_behind() {
        for fail in [FailAt::VertexCompile, FailAt::FragmentCompile, FailAt::Link, FailAt::Texture] {
            let mut host = FakeHost::single();
            host.videos[0].state_mut().opacity = Some("0.9".into());
            host.gl.borrow_mut().fail = Some(fail);

            let (tx, rx) = unbounded();
            let source = ShaderSource::default();
            let schema = UniformSchema::from_source(&source.fragment);
            let video = host.videos[0].clone();
            let r = ShaderSession::create(&mut host, key(), video, &source, &schema, &EventSink::new(tx));

            let err = r.err().expect("creation must fail");
            assert!(err.is_fatal_to_session(), "{fail:?}: {err}");
            assert!(host.gl.borrow().live.is_empty(), "{fail:?}");
            assert!(host.canvases[0].state().removed);
            assert_eq!(host.videos[0].state().opacity.as_deref(), Some("0.9"));
            assert_eq!(host.videos[0].state().requested, 0);
            assert!(host.observed.is_empty());

            let ev = rx.try_recv().ok();
            match fail {
                FailAt::VertexCompile | FailAt::FragmentCompile => {
                    assert!(matches!(ev, Some(EngineEvent::ShaderCompileErr { .. })))
                }
                FailAt::Link => assert!(matches!(ev, Some(EngineEvent::ShaderLinkErr { .. }))),
                FailAt::Texture => assert!(ev.is_none()),
            }
        }
    }

    #[test]
    fn missing_context_is_reported() {
        let mut host = FakeHost::single();
        host.no_context = true;
        assert!(matches!(start(&mut host), Err(EngineError::ContextUnavailable { .. })));
        assert!(host.canvases.is_empty());
    }

    #[test]
    fn optimized_out_uniform_warns_but_session_starts() {
        let mut host = FakeHost::single();
        host.gl.borrow_mut().optimized_out.push("u_edgeDetection".into());
        let (tx, rx) = unbounded();
        let source = ShaderSource::default();
        let schema = UniformSchema::from_source(&source.fragment);
        let video = host.videos[0].clone();
        let mut s = ShaderSession::create(&mut host, key(), video, &source, &schema, &EventSink::new(tx)).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::UniformMissing { name, .. } if name == "u_edgeDetection")));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::SessionStarted { uniforms: 5, .. })));
        assert_eq!(s.update_uniform("u_edgeDetection", 0.5).unwrap(), 0.5);
    }

    #[test]
    fn context_loss_stops_drawing() {
        let mut host = FakeHost::single();
        let mut s = start(&mut host).unwrap();
        host.gl.borrow_mut().lost = true;
        let id = host.videos[0].fire().unwrap();
        assert!(!s.on_video_frame(id));
        assert_eq!(host.gl.borrow().draws(), 1);
    }

    #[test]
    fn decoded_size_change_resizes_backing_and_texture_size() {
        let mut host = FakeHost::single();
        let mut s = start(&mut host).unwrap();
        host.videos[0].state_mut().native = crate::host::Size::new(1280, 720);
        s.tick(TickKind::Forced);
        assert_eq!(host.canvases[0].state().backing, crate::host::Size::new(1280, 720));
        assert!(host
            .gl
            .borrow()
            .calls
            .contains(&GlCall::UniformVec2("u_textureSize".into(), 1280.0, 720.0)));
    }
}
