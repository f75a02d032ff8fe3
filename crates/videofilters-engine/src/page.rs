//! Page context: the session registry for one frame.
//!
//! Everything GL-related happens here, inside the frame that owns the videos.
//! The popup side only ever reaches it through [`PageCommand`]s.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::events::{EventSink, StopReason};
use crate::host::{FrameCallbackId, PageHost, VideoElement};
use crate::messaging::{FrameTarget, PageCommand, PageReply, VideoInfo};
use crate::session::ShaderSession;
use crate::settings::ShaderSource;
use crate::uniforms::{UniformSchema, UniformSpec};
use crate::{logi, logw};

/// A video's identity for the lifetime of one popup: frame URI plus its
/// position in that frame's video list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoKey {
    pub uri: String,
    pub index: usize,
}

impl VideoKey {
    pub fn new(uri: impl Into<String>, index: usize) -> Self {
        Self { uri: uri.into(), index }
    }

    /// Element id of the overlay canvas.
    pub fn overlay_id(&self) -> String {
        format!("vf-shader-{}-{}", self.index, self.uri)
    }
}

/// Host notifications routed back into the context.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    VideoFrame { key: VideoKey, callback: FrameCallbackId },
    VideoResized(VideoKey),
    Scrolled,
    FullscreenChanged(VideoKey),
    VideoStyleChanged(VideoKey),
    VideoRemoved(VideoKey),
}

pub struct PageContext<H: PageHost> {
    host: H,
    uri: String,
    sessions: HashMap<VideoKey, ShaderSession<H>>,
    events: EventSink,
}

impl<H: PageHost> PageContext<H> {
    pub fn new(host: H, events: EventSink) -> Self {
        let uri = host.frame_uri();
        Self { host, uri, sessions: HashMap::new(), events }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn session(&self, index: usize) -> Option<&ShaderSession<H>> {
        self.sessions.get(&self.key(index))
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn key(&self, index: usize) -> VideoKey {
        VideoKey::new(self.uri.clone(), index)
    }

    fn video(&self, index: usize) -> Result<H::Video, EngineError> {
        self.host
            .find_videos()
            .into_iter()
            .nth(index)
            .ok_or_else(|| EngineError::VideoNotFound { uri: self.uri.clone(), index })
    }

    /// Run one command. Commands aimed at another frame are `Skipped`;
    /// failures come back as `Rejected` with the error text.
    pub fn handle(&mut self, target: &FrameTarget, cmd: PageCommand) -> PageReply {
        if !target.matches(&self.uri) {
            return PageReply::Skipped;
        }
        match self.execute(cmd) {
            Ok(reply) => reply,
            Err(e) => {
                logw!("PAGE", "{}: {e}", self.uri);
                PageReply::Rejected { reason: e.to_string() }
            }
        }
    }

    fn execute(&mut self, cmd: PageCommand) -> Result<PageReply, EngineError> {
        match cmd {
            PageCommand::ListVideos => Ok(PageReply::Videos { videos: self.list_videos() }),

            PageCommand::SetFilter { index, filter } => {
                self.video(index)?.set_inline_filter(&filter);
                if let Some(s) = self.sessions.get(&self.key(index)) {
                    s.sync_style();
                }
                Ok(PageReply::Ack)
            }

            PageCommand::SetPlaybackRate { index, rate } => {
                self.video(index)?.set_playback_rate(rate);
                Ok(PageReply::Ack)
            }

            PageCommand::EnableShader { index, source, uniforms } => {
                self.enable(index, &source, uniforms)?;
                Ok(PageReply::Ack)
            }

            PageCommand::DisableShader { index } => {
                self.disable(index, StopReason::Disabled)?;
                Ok(PageReply::Ack)
            }

            PageCommand::ToggleShader { index, source, uniforms } => {
                if self.sessions.contains_key(&self.key(index)) {
                    self.disable(index, StopReason::Disabled)?;
                } else {
                    self.enable(index, &source, uniforms)?;
                }
                Ok(self.status(index, None))
            }

            PageCommand::ShaderStatus { index, uniforms } => Ok(self.status(index, Some(&uniforms))),

            PageCommand::UpdateUniform { index, name, value } => {
                let key = self.key(index);
                let session = self
                    .sessions
                    .get_mut(&key)
                    .ok_or_else(|| EngineError::SessionNotFound { id: key.overlay_id() })?;
                session.update_uniform(&name, value)?;
                Ok(PageReply::Ack)
            }

            PageCommand::TogglePictureInPicture { index, advanced } => {
                let video = self.video(index)?;
                self.host.toggle_picture_in_picture(&video, advanced)?;
                Ok(PageReply::Ack)
            }
        }
    }

    fn list_videos(&self) -> Vec<VideoInfo> {
        self.host
            .find_videos()
            .iter()
            .enumerate()
            .map(|(index, v)| {
                let size = v.native_size();
                VideoInfo {
                    index,
                    filter: v.inline_filter(),
                    playback_rate: v.playback_rate(),
                    uri: self.uri.clone(),
                    width: size.width,
                    height: size.height,
                }
            })
            .collect()
    }

    fn status(&self, index: usize, names: Option<&[String]>) -> PageReply {
        match self.sessions.get(&self.key(index)) {
            Some(s) => {
                let values = s
                    .values()
                    .into_iter()
                    .filter(|(n, _)| names.map_or(true, |names| names.contains(n)))
                    .collect();
                PageReply::ShaderStatus { active: true, values }
            }
            None => PageReply::ShaderStatus { active: false, values: Vec::new() },
        }
    }

    /// Start a session for video `index`. Rejected if one is already live.
    pub fn enable(&mut self, index: usize, source: &ShaderSource, uniforms: Vec<UniformSpec>) -> Result<(), EngineError> {
        let key = self.key(index);
        if self.sessions.contains_key(&key) {
            return Err(EngineError::SessionExists { id: key.overlay_id() });
        }
        let errors: Vec<String> = uniforms
            .iter()
            .flat_map(|u| u.problems().into_iter().map(move |e| format!("{}: {e}", u.name)))
            .collect();
        if !errors.is_empty() {
            return Err(EngineError::ShaderRejected { errors });
        }
        let video = self.video(index)?;
        let schema = UniformSchema { uniforms, rejected: Vec::new() };
        let session = ShaderSession::create(&mut self.host, key.clone(), video, source, &schema, &self.events)?;
        self.sessions.insert(key, session);
        Ok(())
    }

    pub fn disable(&mut self, index: usize, reason: StopReason) -> Result<(), EngineError> {
        let key = self.key(index);
        let mut session = self
            .sessions
            .remove(&key)
            .ok_or_else(|| EngineError::SessionNotFound { id: key.overlay_id() })?;
        session.teardown(reason, &self.events);
        Ok(())
    }

    /// Rebuild every live session with a new shader. Sessions whose rebuild
    /// fails stay off. Returns how many came back.
    pub fn replace_shader(&mut self, source: &ShaderSource, schema: &UniformSchema) -> usize {
        let indices: Vec<usize> = self.sessions.keys().map(|k| k.index).collect();
        let mut restarted = 0;
        for index in indices {
            if self.disable(index, StopReason::Replaced).is_err() {
                continue;
            }
            match self.enable(index, source, schema.uniforms.clone()) {
                Ok(()) => restarted += 1,
                Err(e) => logw!("SHADER", "{}: rebuild of video {index} failed: {e}", self.uri),
            }
        }
        restarted
    }

    pub fn handle_event(&mut self, ev: PageEvent) {
        match ev {
            PageEvent::VideoFrame { key, callback } => {
                if let Some(s) = self.sessions.get_mut(&key) {
                    s.on_video_frame(callback);
                }
            }
            PageEvent::VideoResized(key) | PageEvent::FullscreenChanged(key) => {
                if let Some(s) = self.sessions.get(&key) {
                    s.update_layout();
                }
            }
            PageEvent::Scrolled => {
                for s in self.sessions.values() {
                    s.update_layout();
                }
            }
            PageEvent::VideoStyleChanged(key) => {
                if let Some(s) = self.sessions.get(&key) {
                    s.sync_style();
                }
            }
            PageEvent::VideoRemoved(key) => {
                if let Some(mut s) = self.sessions.remove(&key) {
                    s.teardown(StopReason::VideoRemoved, &self.events);
                }
            }
        }
    }

    /// Tear down every session (page unload).
    pub fn close(&mut self) {
        let n = self.sessions.len();
        for (_, mut s) in self.sessions.drain() {
            s.teardown(StopReason::PageClosed, &self.events);
        }
        if n > 0 {
            logi!("PAGE", "{}: closed {n} session(s)", self.uri);
        }
    }
}
