//! Popup state: one panel per video found in the tab.
//!
//! The popup holds no GL state. Every user action becomes a [`PageCommand`]
//! for the frame that owns the video. Transport failures are logged under the
//! flow's tag and otherwise ignored, leaving the page as it was.

use std::collections::HashSet;

use crate::controls::ControlPanel;
use crate::error::EngineError;
use crate::filter::{FilterField, FilterState};
use crate::logw;
use crate::messaging::{FrameTarget, PageCommand, PageReply, Transport, VideoInfo};
use crate::page::VideoKey;
use crate::settings::{Settings, Template, DEFAULT_TEMPLATE};
use crate::store::SettingsStore;
use crate::uniforms::UniformSchema;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoPanel {
    /// "Video: N", numbered from the largest video down.
    pub label: String,
    pub key: VideoKey,
    pub filter: FilterState,
    pub playback_rate: f64,
    /// Selected preset, if any.
    pub preset: Option<String>,
    pub shader: ControlPanel,
}

impl VideoPanel {
    fn new(number: usize, info: &VideoInfo, schema: &UniformSchema) -> Self {
        let key = VideoKey::new(info.uri.clone(), info.index);
        let shader = ControlPanel::new(format!("{}-{}", info.index, info.uri), schema);
        Self {
            label: format!("Video: {number}"),
            key,
            filter: FilterState::parse(&info.filter),
            playback_rate: info.playback_rate,
            preset: None,
            shader,
        }
    }

    fn target(&self) -> FrameTarget {
        FrameTarget::Frame(self.key.uri.clone())
    }

    /// The opacity slider is unusable while a shader session hides the video.
    pub fn opacity_locked(&self) -> bool {
        self.shader.is_active()
    }

    pub fn filter_readout(&self, field: FilterField) -> String {
        let v = self.filter.get(field);
        match field {
            FilterField::HueRotate => format!("{v} deg"),
            FilterField::Blur => format!("{v} px"),
            _ => format!("{}%", (v * 100.0).round()),
        }
    }

    pub fn rate_readout(&self) -> String {
        format!("{}x", self.playback_rate)
    }

    /// Delete is offered only for a stored preset.
    pub fn can_delete_preset(&self) -> bool {
        matches!(&self.preset, Some(name) if name != DEFAULT_TEMPLATE)
    }
}

pub struct Popup<T: Transport, S: SettingsStore> {
    transport: T,
    settings: Settings<S>,
    schema: UniformSchema,
    panels: Vec<VideoPanel>,
    /// Sessions started from this popup.
    owned: HashSet<VideoKey>,
}

fn send_one<T: Transport>(transport: &T, tag: &str, target: &FrameTarget, cmd: PageCommand) -> Option<PageReply> {
    match transport.send(target, cmd) {
        Ok(replies) => {
            let reply = replies.into_iter().next().map(|r| r.reply)?;
            if let PageReply::Rejected { reason } = &reply {
                logw!(tag, "page rejected command: {reason}");
            }
            Some(reply)
        }
        Err(e) => {
            logw!(tag, "{e}");
            None
        }
    }
}

impl<T: Transport, S: SettingsStore> Popup<T, S> {
    /// Load settings and enumerate the tab's videos.
    pub fn open(transport: T, store: S) -> Result<Self, EngineError> {
        let settings = Settings::load(store)?;
        let schema = UniformSchema::from_source(&settings.shader().fragment);
        let mut popup = Self { transport, settings, schema, panels: Vec::new(), owned: HashSet::new() };
        popup.refresh();
        Ok(popup)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn settings(&self) -> &Settings<S> {
        &self.settings
    }

    pub fn schema(&self) -> &UniformSchema {
        &self.schema
    }

    pub fn panels(&self) -> &[VideoPanel] {
        &self.panels
    }

    pub fn panel(&self, i: usize) -> Option<&VideoPanel> {
        self.panels.get(i)
    }

    /// Re-read settings and rebuild every panel, adopting the values of
    /// sessions already running on the page.
    pub fn refresh(&mut self) {
        if let Err(e) = self.settings.reload() {
            logw!("SETTINGS", "reload failed: {e}");
        }
        self.schema = UniformSchema::from_source(&self.settings.shader().fragment);

        let mut videos: Vec<VideoInfo> = match self.transport.send(&FrameTarget::AllFrames, PageCommand::ListVideos) {
            Ok(replies) => replies
                .into_iter()
                .filter_map(|r| match r.reply {
                    PageReply::Videos { videos } => Some(videos),
                    _ => None,
                })
                .flatten()
                .collect(),
            Err(e) => {
                logw!("VIDEOS", "enumeration failed: {e}");
                Vec::new()
            }
        };
        videos.sort_by_key(|v| std::cmp::Reverse(v.area()));

        self.panels = videos
            .iter()
            .enumerate()
            .map(|(i, info)| VideoPanel::new(i + 1, info, &self.schema))
            .collect();

        for panel in &mut self.panels {
            let cmd = PageCommand::ShaderStatus { index: panel.key.index, uniforms: panel.shader.uniform_names() };
            if let Some(PageReply::ShaderStatus { active: true, values }) =
                send_one(&self.transport, "SHADER", &panel.target(), cmd)
            {
                panel.shader.activate_with(&values);
            }
        }
    }

    fn push_filter(&self, i: usize) {
        let p = &self.panels[i];
        let cmd = PageCommand::SetFilter { index: p.key.index, filter: p.filter.to_css() };
        send_one(&self.transport, "FILTER", &p.target(), cmd);
    }

    fn push_rate(&self, i: usize) {
        let p = &self.panels[i];
        let cmd = PageCommand::SetPlaybackRate { index: p.key.index, rate: p.playback_rate };
        send_one(&self.transport, "RATE", &p.target(), cmd);
    }

    /// Filter slider moved. False if the panel does not exist or the control is locked.
    pub fn set_filter(&mut self, i: usize, field: FilterField, value: f64) -> bool {
        let range = *self.settings.defaults().range(field);
        let Some(p) = self.panels.get_mut(i) else { return false };
        if field == FilterField::Opacity && p.opacity_locked() {
            return false;
        }
        if !value.is_finite() {
            return false;
        }
        p.filter.set(field, range.clamp(value));
        self.push_filter(i);
        true
    }

    pub fn reset_filter(&mut self, i: usize, field: FilterField) -> bool {
        let v = self.settings.defaults().range(field).v;
        self.set_filter(i, field, v)
    }

    pub fn set_playback_rate(&mut self, i: usize, rate: f64) -> bool {
        let range = self.settings.defaults().playback_rate;
        let Some(p) = self.panels.get_mut(i) else { return false };
        if !rate.is_finite() {
            return false;
        }
        p.playback_rate = range.clamp(rate);
        self.push_rate(i);
        true
    }

    pub fn reset_playback_rate(&mut self, i: usize) -> bool {
        let v = self.settings.defaults().playback_rate.v;
        self.set_playback_rate(i, v)
    }

    /// Apply a preset's filter and playback rate. Unknown names apply the
    /// neutral values.
    pub fn select_preset(&mut self, i: usize, name: &str) {
        let template = self
            .settings
            .template(name)
            .unwrap_or_else(|| self.settings.defaults().default_template());
        let Some(p) = self.panels.get_mut(i) else { return };
        let opacity = p.filter.opacity;
        p.filter = template.pf;
        if p.opacity_locked() {
            p.filter.opacity = opacity;
        }
        p.playback_rate = template.playback_rate;
        p.preset = Some(name.to_string());
        self.push_rate(i);
        self.push_filter(i);
    }

    /// Store the panel's current values under `name`, replacing a preset of
    /// the same name, and select it.
    pub fn save_preset(&mut self, i: usize, name: &str) -> bool {
        let Some(p) = self.panels.get(i) else { return false };
        let name = name.trim();
        if name.is_empty() || name == DEFAULT_TEMPLATE {
            logw!("PRESET", "refusing to save preset named '{name}'");
            return false;
        }
        let template = Template { name: name.to_string(), pf: p.filter.clone(), playback_rate: p.playback_rate };
        if let Err(e) = self.settings.save_template(template) {
            logw!("PRESET", "save failed: {e}");
            return false;
        }
        self.panels[i].preset = Some(name.to_string());
        true
    }

    /// Delete the panel's selected preset.
    pub fn delete_preset(&mut self, i: usize) -> bool {
        let Some(p) = self.panels.get(i) else { return false };
        if !p.can_delete_preset() {
            return false;
        }
        let name = p.preset.clone().unwrap_or_default();
        match self.settings.delete_template(&name) {
            Ok(deleted) => {
                if deleted {
                    for panel in &mut self.panels {
                        if panel.preset.as_deref() == Some(name.as_str()) {
                            panel.preset = None;
                        }
                    }
                }
                deleted
            }
            Err(e) => {
                logw!("PRESET", "delete failed: {e}");
                false
            }
        }
    }

    /// Start or stop the shader session for panel `i`. Returns whether a
    /// session is active afterwards.
    pub fn toggle_shader(&mut self, i: usize) -> bool {
        let Some(p) = self.panels.get(i) else { return false };
        let cmd = PageCommand::ToggleShader {
            index: p.key.index,
            source: self.settings.shader().clone(),
            uniforms: p.shader.specs(),
        };
        let reply = send_one(&self.transport, "SHADER", &p.target(), cmd);
        let p = &mut self.panels[i];
        match reply {
            Some(PageReply::ShaderStatus { active: true, values }) => {
                p.shader.activate_with(&values);
                self.owned.insert(p.key.clone());
            }
            Some(PageReply::ShaderStatus { active: false, .. }) | Some(PageReply::Rejected { .. }) => {
                p.shader.deactivate();
                self.owned.remove(&p.key);
            }
            _ => {}
        }
        p.shader.is_active()
    }

    /// Uniform slider moved. Sends exactly one update when the control is live.
    pub fn uniform_input(&mut self, i: usize, name: &str, value: f64) -> Option<f64> {
        let p = self.panels.get_mut(i)?;
        let update = p.shader.input(name, value)?;
        let cmd = PageCommand::UpdateUniform { index: p.key.index, name: update.name, value: update.value };
        send_one(&self.transport, "SHADER", &p.target(), cmd);
        Some(update.value)
    }

    pub fn uniform_reset(&mut self, i: usize, name: &str) -> Option<f64> {
        let p = self.panels.get_mut(i)?;
        let update = p.shader.reset(name)?;
        let cmd = PageCommand::UpdateUniform { index: p.key.index, name: update.name, value: update.value };
        send_one(&self.transport, "SHADER", &p.target(), cmd);
        Some(update.value)
    }

    pub fn toggle_pip(&mut self, i: usize) -> bool {
        let Some(p) = self.panels.get(i) else { return false };
        let advanced = self.settings.advanced_pip().unwrap_or_else(|e| {
            logw!("PIP", "could not read {}: {e}", crate::settings::ADVANCED_PIP_KEY);
            false
        });
        let cmd = PageCommand::TogglePictureInPicture { index: p.key.index, advanced };
        matches!(send_one(&self.transport, "PIP", &p.target(), cmd), Some(PageReply::Ack))
    }

    /// Stop the sessions this popup started and hand the transport back.
    pub fn close(self) -> T {
        for p in &self.panels {
            if self.owned.contains(&p.key) && p.shader.is_active() {
                send_one(&self.transport, "SHADER", &p.target(), PageCommand::DisableShader { index: p.key.index });
            }
        }
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSink;
    use crate::host::{Rect, VideoElement};
    use crate::messaging::LocalTransport;
    use crate::page::PageContext;
    use crate::settings::DEFAULTS_KEY;
    use crate::store::MemoryStore;
    use crate::testing::{FakeHost, FakeVideo};

    const TOP: &str = "https://example.test/watch";
    const EMBED: &str = "https://embed.test/player";

    fn page(uri: &str, sizes: &[(u32, u32)]) -> PageContext<FakeHost> {
        let rect = Rect { left: 0.0, top: 0.0, width: 320.0, height: 180.0 };
        let videos = sizes.iter().map(|&(w, h)| FakeVideo::new(w, h, rect)).collect();
        PageContext::new(FakeHost::new(uri, videos), EventSink::none())
    }

    fn open() -> Popup<LocalTransport<FakeHost>, MemoryStore> {
        let pages = vec![page(TOP, &[(640, 360), (1920, 1080)]), page(EMBED, &[(1280, 720)])];
        Popup::open(LocalTransport::new(pages), MemoryStore::new()).unwrap()
    }

    fn video(popup: &Popup<LocalTransport<FakeHost>, MemoryStore>, page: usize, index: usize) -> FakeVideo {
        popup.transport().pages()[page].host().videos[index].clone()
    }

    #[test]
    fn panels_are_sorted_largest_first_and_numbered() {
        let popup = open();
        let keys: Vec<_> = popup.panels().iter().map(|p| (p.label.as_str(), p.key.uri.as_str(), p.key.index)).collect();
        assert_eq!(keys, [("Video: 1", TOP, 1), ("Video: 2", EMBED, 0), ("Video: 3", TOP, 0)]);
        assert!(popup.panels().iter().all(|p| !p.shader.is_active()));
        assert_eq!(popup.panels()[0].shader.controls().len(), 5);
    }

    #[test]
    fn inverted_stored_range_does_not_break_filter_input() {
        let mut doc = serde_json::to_value(crate::settings::Defaults::default()).unwrap();
        doc["brightness"] = serde_json::json!({"v": 1, "min": 3, "max": 0.5, "step": 0.05});
        let pages = vec![page(TOP, &[(640, 360)])];
        let mut popup = Popup::open(LocalTransport::new(pages), MemoryStore::new().with(DEFAULTS_KEY, doc)).unwrap();
        assert!(popup.set_filter(0, FilterField::Brightness, 5.0));
        assert!(video(&popup, 0, 0).state().filter.contains("brightness(3)"));
    }

    #[test]
    fn filter_input_reaches_only_the_target_video() {
        let mut popup = open();
        assert!(popup.set_filter(1, FilterField::Brightness, 1.5));
        assert_eq!(
            video(&popup, 1, 0).state().filter,
            "blur(0px) brightness(1.5) contrast(1) saturate(1) invert(0) sepia(0) opacity(1) grayscale(0) hue-rotate(0deg)"
        );
        assert_eq!(video(&popup, 0, 0).state().filter, "");
        assert_eq!(popup.panel(1).unwrap().filter_readout(FilterField::Brightness), "150%");

        popup.set_filter(1, FilterField::Brightness, 99.0);
        assert_eq!(popup.panel(1).unwrap().filter.brightness, 3.0);
        popup.reset_filter(1, FilterField::Brightness);
        assert_eq!(popup.panel(1).unwrap().filter.brightness, 1.0);
    }

    #[test]
    fn playback_rate_is_clamped_and_applied() {
        let mut popup = open();
        popup.set_playback_rate(0, 10.0);
        assert_eq!(video(&popup, 0, 1).state().rate, 4.0);
        assert_eq!(popup.panel(0).unwrap().rate_readout(), "4x");
        popup.reset_playback_rate(0);
        assert_eq!(video(&popup, 0, 1).state().rate, 1.0);
    }

    #[test]
    fn existing_filter_is_parsed_into_the_panel() {
        let p = page(TOP, &[(640, 360)]);
        p.host().videos[0].set_inline_filter("sepia(50%) hue-rotate(90deg)");
        let popup = Popup::open(LocalTransport::new(vec![p]), MemoryStore::new()).unwrap();
        let panel = popup.panel(0).unwrap();
        assert_eq!(panel.filter.sepia, 0.5);
        assert_eq!(panel.filter_readout(FilterField::HueRotate), "90 deg");
    }

    #[test]
    fn shader_toggle_enables_controls_and_sliders_update_the_session() {
        let mut popup = open();
        assert!(popup.toggle_shader(0));
        assert!(popup.panel(0).unwrap().shader.is_active());
        assert!(popup.panel(0).unwrap().opacity_locked());

        assert_eq!(popup.uniform_input(0, "u_vignette", 1.25), Some(1.25));
        let values = popup.transport().pages()[0].session(1).unwrap().values();
        assert!(values.contains(&("u_vignette".to_string(), 1.25)));

        assert_eq!(popup.uniform_reset(0, "u_vignette"), Some(0.0));
        assert!(!popup.toggle_shader(0));
        let c = popup.panel(0).unwrap().shader.control("u_vignette").unwrap();
        assert!(!c.enabled);
        assert_eq!(popup.transport().pages()[0].active_sessions(), 0);
    }

    #[test]
    fn inactive_sliders_send_nothing() {
        let mut popup = open();
        assert_eq!(popup.uniform_input(0, "u_vignette", 1.0), None);
    }

    #[test]
    fn opacity_is_locked_while_a_session_runs() {
        let mut popup = open();
        popup.toggle_shader(0);
        assert!(!popup.set_filter(0, FilterField::Opacity, 0.2));
        assert_eq!(popup.panel(0).unwrap().filter.opacity, 1.0);
        assert!(popup.set_filter(0, FilterField::Contrast, 2.0));
        popup.toggle_shader(0);
        assert!(popup.set_filter(0, FilterField::Opacity, 0.2));
    }

    #[test]
    fn reopening_adopts_running_sessions() {
        let mut popup = open();
        popup.toggle_shader(0);
        popup.uniform_input(0, "u_sharpness", 2.0);
        let transport = std::mem::replace(&mut popup.transport, LocalTransport::new(Vec::new()));

        let popup = Popup::open(transport, MemoryStore::new()).unwrap();
        let panel = popup.panel(0).unwrap();
        assert!(panel.shader.is_active());
        assert_eq!(panel.shader.control("u_sharpness").unwrap().value, 2.0);
    }

    #[test]
    fn close_stops_owned_sessions_only() {
        let mut first = open();
        first.toggle_shader(1);
        let transport = std::mem::replace(&mut first.transport, LocalTransport::new(Vec::new()));

        let mut second = Popup::open(transport, MemoryStore::new()).unwrap();
        second.toggle_shader(0);
        let transport = second.close();

        let pages = transport.into_pages();
        assert_eq!(pages[0].active_sessions(), 0);
        assert_eq!(pages[1].active_sessions(), 1);
    }

    #[test]
    fn presets_save_select_and_delete() {
        let mut popup = open();
        popup.set_filter(0, FilterField::Sepia, 0.4);
        popup.set_playback_rate(0, 1.5);
        assert!(popup.save_preset(0, "warm"));
        assert!(!popup.save_preset(0, "default"));
        assert!(!popup.save_preset(0, "  "));
        assert_eq!(popup.settings().template_names(), ["default", "warm"]);

        popup.select_preset(1, "warm");
        let p = popup.panel(1).unwrap();
        assert_eq!((p.filter.sepia, p.playback_rate), (0.4, 1.5));
        assert_eq!(video(&popup, 1, 0).state().rate, 1.5);

        popup.select_preset(1, "default");
        assert_eq!(popup.panel(1).unwrap().filter, FilterState::default());
        assert!(!popup.delete_preset(1));

        popup.select_preset(1, "warm");
        assert!(popup.delete_preset(1));
        assert_eq!(popup.settings().template_names(), ["default"]);
        assert!(popup.panels().iter().all(|p| p.preset.is_none()));
        assert!(popup.settings().store().get(DEFAULTS_KEY).unwrap().is_some());
    }

    #[test]
    fn pip_uses_the_stored_flag() {
        let store = MemoryStore::new().with(crate::settings::ADVANCED_PIP_KEY, serde_json::Value::Bool(true));
        let mut popup = Popup::open(LocalTransport::new(vec![page(TOP, &[(640, 360)])]), store).unwrap();
        assert!(popup.toggle_pip(0));
        assert_eq!(popup.transport().pages()[0].host().pip, [true]);
    }

    #[test]
    fn failed_commands_leave_panels_alone() {
        let mut popup = open();
        popup.transport().pages()[0].host().gl.borrow_mut().fail = Some(crate::testing::FailAt::Link);
        assert!(!popup.toggle_shader(0));
        assert!(!popup.panel(0).unwrap().shader.is_active());
        assert!(!popup.set_filter(9, FilterField::Blur, 1.0));
    }
}
