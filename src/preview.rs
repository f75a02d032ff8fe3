//! Desktop preview: a glutin window acting as a page with one video.
//!
//! The main thread owns the GL context and the page context. The console
//! thread drives it through the popup messaging, the hot-reload watcher feeds
//! shader and settings edits back in.

use std::ffi::{c_void, CString};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use glow::HasContext;
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, NotCurrentContext, Version};
use glutin::display::{Display, GetGlDisplay};
use glutin::prelude::*;
use glutin::surface::{SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{KeyCode, PhysicalKey};

use videofilters_engine::events::{EngineEvent, EventSink};
use videofilters_engine::host::Size;
use videofilters_engine::messaging;
use videofilters_engine::page::{PageContext, PageEvent};
use videofilters_engine::settings::{Settings, ShaderSource};
use videofilters_engine::store::{load_json_result, read_to_string_result, resolve_settings_path, JsonFileStore};
use videofilters_engine::{check_shader, logi, logw, loge};

use crate::desktop::{DesktopHost, VIDEO_HEIGHT, VIDEO_WIDTH};
use crate::hotreload::{HotEvent, HotReload};
use crate::{console, log_issues, validate, PreviewArgs};

/// Popup requests wait this long for the main thread to pump them.
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound on how long the loop sleeps, so console requests stay snappy.
const MAX_IDLE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub enum AppEvent {
    Quit,
}

fn proc_address(display: &Display, name: &str) -> *const c_void {
    match CString::new(name) {
        Ok(s) => display.get_proc_address(&s),
        Err(_) => std::ptr::null(),
    }
}

fn validate_settings_file(path: &Path) {
    if !path.exists() {
        logi!("CONFIG", "{} does not exist yet; built-in settings will be written", path.display());
        return;
    }
    match load_json_result::<serde_json::Value>(path) {
        Ok(doc) => log_issues("CONFIG", &path.display().to_string(), &validate::validate_settings_json(&doc)),
        Err(e) => loge!("CONFIG", "{e}"),
    }
}

/// Read, check and commit a fragment shader file. Invalid shaders are
/// reported and leave the stored shader untouched.
fn commit_shader_file(settings: &mut Settings<JsonFileStore>, path: &Path) -> bool {
    let fragment = match read_to_string_result(path) {
        Ok(s) => s,
        Err(e) => {
            logw!("SHADER", "{e}");
            return false;
        }
    };
    let label = path.display().to_string();
    let report = check_shader(&fragment);
    log_issues("SHADER", &label, &report.to_issues(&label));
    if !report.is_valid() {
        return false;
    }
    if settings.shader().fragment == fragment {
        return false;
    }
    let source = ShaderSource { vertex: settings.shader().vertex.clone(), fragment };
    match settings.commit_shader(source) {
        Ok(schema) => {
            logi!("SHADER", "committed {label} ({} uniforms)", schema.uniforms.len());
            true
        }
        Err(e) => {
            logw!("SHADER", "commit failed: {e}");
            false
        }
    }
}

fn restart_sessions(pages: &mut [PageContext<DesktopHost>], settings: &Settings<JsonFileStore>) {
    let schema = videofilters_engine::UniformSchema::from_source(&settings.shader().fragment);
    for page in pages.iter_mut() {
        let n = page.replace_shader(settings.shader(), &schema);
        if n > 0 {
            logi!("SHADER", "{}: rebuilt {n} session(s)", page.uri());
        }
    }
}

pub fn run(args: PreviewArgs) -> anyhow::Result<()> {
    let settings_path = resolve_settings_path(args.settings.clone(), Path::new(env!("CARGO_MANIFEST_DIR")));
    logi!("INIT", "settings: {}", settings_path.display());
    validate_settings_file(&settings_path);

    let mut settings = Settings::load(JsonFileStore::new(&settings_path)).context("loading settings")?;
    if let Some(p) = &args.shader {
        logi!("INIT", "shader: {}", p.display());
        commit_shader_file(&mut settings, p);
    }

    let event_loop = EventLoopBuilder::<AppEvent>::with_user_event()
        .build()
        .context("creating event loop")?;
    let window_builder = winit::window::WindowBuilder::new()
        .with_title("videofilters")
        .with_inner_size(PhysicalSize::new(VIDEO_WIDTH, VIDEO_HEIGHT));

    let template = ConfigTemplateBuilder::new().with_alpha_size(8).with_depth_size(0);
    let display_builder = DisplayBuilder::new().with_window_builder(Some(window_builder));
    let (window, gl_config) = display_builder
        .build(&event_loop, template, |configs| {
            configs
                .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                .expect("glutin offers at least one config")
        })
        .map_err(|e| anyhow!("building GL display: {e}"))?;
    let window = window.context("no window created")?;

    let raw_window_handle = window.raw_window_handle();
    let gl_display = gl_config.display();

    // Shaders are GLSL ES 1.00; desktop GL 2.1 accepts them as a fallback.
    let gles = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(2, 0))))
        .build(Some(raw_window_handle));
    let desktop = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::OpenGl(Some(Version::new(2, 1))))
        .build(Some(raw_window_handle));
    let not_current: NotCurrentContext = unsafe {
        gl_display.create_context(&gl_config, &gles).or_else(|e| {
            logw!("GL", "GLES 2.0 unavailable ({e}); trying OpenGL 2.1");
            gl_display.create_context(&gl_config, &desktop)
        })
    }
    .context("creating GL context")?;

    let size = window.inner_size();
    let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window_handle,
        NonZeroU32::new(size.width).unwrap_or(NonZeroU32::MIN),
        NonZeroU32::new(size.height).unwrap_or(NonZeroU32::MIN),
    );
    let gl_surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs) }.context("creating window surface")?;
    let gl_context = not_current.make_current(&gl_surface).context("making GL context current")?;
    if let Err(e) = gl_surface.set_swap_interval(&gl_context, SwapInterval::Wait(NonZeroU32::MIN)) {
        logw!("GL", "vsync unavailable: {e}");
    }

    let gl = unsafe { glow::Context::from_loader_function(|s| proc_address(&gl_display, s)) };
    let loader_display = gl_display.clone();
    let make_gl = Box::new(move || unsafe { glow::Context::from_loader_function(|s| proc_address(&loader_display, s)) });

    let (ev_tx, ev_rx) = crossbeam_channel::unbounded::<EngineEvent>();
    let host = DesktopHost::new(Size::new(size.width, size.height), make_gl);
    let mut pages = vec![PageContext::new(host, EventSink::new(ev_tx))];
    let video_key = DesktopHost::video_key();

    let (transport, server) = messaging::channel(REPLY_TIMEOUT);
    console::spawn(transport, settings_path.clone(), event_loop.create_proxy()).context("starting console")?;

    let hot = match HotReload::new(args.shader.clone(), settings_path.clone()) {
        Ok(h) => Some(h),
        Err(e) => {
            logw!("HOT", "file watching disabled: {e:#}");
            None
        }
    };

    let mut closed = false;
    event_loop.run(move |event, target| {
        let mut quit = false;
        match event {
            Event::UserEvent(AppEvent::Quit) => quit = true,

            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => quit = true,
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                        quit = true;
                    }
                }
                WindowEvent::Resized(new_size) => {
                    gl_surface.resize(
                        &gl_context,
                        NonZeroU32::new(new_size.width).unwrap_or(NonZeroU32::MIN),
                        NonZeroU32::new(new_size.height).unwrap_or(NonZeroU32::MIN),
                    );
                    let page = &mut pages[0];
                    page.host_mut().set_window_size(Size::new(new_size.width, new_size.height));
                    page.handle_event(PageEvent::VideoResized(video_key.clone()));
                }
                _ => {}
            },

            Event::AboutToWait => {
                server.pump(&mut pages);

                if let Some(hot) = &hot {
                    for ev in hot.rx().try_iter() {
                        match ev {
                            HotEvent::ShaderChanged(p) => {
                                if commit_shader_file(&mut settings, &p) {
                                    restart_sessions(&mut pages, &settings);
                                }
                            }
                            HotEvent::SettingsChanged(p) => {
                                let before = settings.shader().clone();
                                match settings.reload() {
                                    Ok(()) if *settings.shader() != before => {
                                        logi!("CONFIG", "shader changed in {}", p.display());
                                        restart_sessions(&mut pages, &settings);
                                    }
                                    Ok(()) => {}
                                    Err(e) => logw!("CONFIG", "reload failed: {e}"),
                                }
                            }
                        }
                    }
                }

                let now = Instant::now();
                let page = &mut pages[0];
                if let Some(callback) = page.host().video().advance(now) {
                    page.handle_event(PageEvent::VideoFrame { key: video_key.clone(), callback });
                }

                for ev in ev_rx.try_iter() {
                    match ev {
                        EngineEvent::SessionStarted { .. } => window.set_title("videofilters (shader on)"),
                        EngineEvent::SessionStopped { .. } => window.set_title("videofilters"),
                        _ => {}
                    }
                }

                if page.host_mut().take_dirty() {
                    if page.active_sessions() == 0 {
                        let s = window.inner_size();
                        unsafe {
                            gl.viewport(0, 0, s.width as i32, s.height as i32);
                            gl.clear_color(0.05, 0.05, 0.05, 1.0);
                            gl.clear(glow::COLOR_BUFFER_BIT);
                        }
                    }
                    if let Err(e) = gl_surface.swap_buffers(&gl_context) {
                        logw!("GL", "swap_buffers failed: {e}");
                    }
                }

                let next = page.host().video().next_due().min(now + MAX_IDLE);
                target.set_control_flow(ControlFlow::WaitUntil(next));
            }

            _ => {}
        }

        if quit && !closed {
            closed = true;
            for page in pages.iter_mut() {
                page.close();
            }
            logi!("INIT", "shutting down");
            target.exit();
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use videofilters_engine::settings::DEFAULT_FRAGMENT_SHADER;
    use videofilters_engine::store::SettingsStore;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vf-preview-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn shader_file_commit_rules() {
        let dir = temp_dir("commit");
        let mut settings = Settings::load(JsonFileStore::new(dir.join("s.json"))).unwrap();

        let frag = dir.join("a.frag");
        std::fs::write(&frag, DEFAULT_FRAGMENT_SHADER).unwrap();
        // identical to the stored shader
        assert!(!commit_shader_file(&mut settings, &frag));

        let edited = DEFAULT_FRAGMENT_SHADER.replace("label: Vignette", "label: Corners");
        std::fs::write(&frag, &edited).unwrap();
        assert!(commit_shader_file(&mut settings, &frag));
        assert_eq!(settings.shader().fragment, edited);

        // persisted for the console thread's own Settings
        let stored = settings.store().get("defaults").unwrap().unwrap();
        assert_eq!(stored["shader"]["fragment"], edited.as_str());

        std::fs::write(&frag, "void main() {}").unwrap();
        assert!(!commit_shader_file(&mut settings, &frag));
        assert_eq!(settings.shader().fragment, edited);

        assert!(!commit_shader_file(&mut settings, &dir.join("missing.frag")));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
