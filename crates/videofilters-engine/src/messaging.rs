//! Popup <-> page messaging.
//!
//! The popup never touches a page's GL state directly. It sends a
//! [`PageCommand`] to one frame (or all frames) and gets one reply per frame
//! that handled it.

use std::cell::{RefCell, RefMut};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::host::PageHost;
use crate::page::PageContext;
use crate::settings::ShaderSource;
use crate::uniforms::UniformSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameTarget {
    AllFrames,
    Frame(String),
}

impl FrameTarget {
    pub fn matches(&self, uri: &str) -> bool {
        match self {
            FrameTarget::AllFrames => true,
            FrameTarget::Frame(u) => u == uri,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageCommand {
    ListVideos,
    SetFilter { index: usize, filter: String },
    SetPlaybackRate { index: usize, rate: f64 },
    EnableShader { index: usize, source: ShaderSource, uniforms: Vec<UniformSpec> },
    DisableShader { index: usize },
    ToggleShader { index: usize, source: ShaderSource, uniforms: Vec<UniformSpec> },
    /// Current values of the named uniforms, if a session is live.
    ShaderStatus { index: usize, uniforms: Vec<String> },
    UpdateUniform { index: usize, name: String, value: f64 },
    TogglePictureInPicture { index: usize, advanced: bool },
}

/// One video as seen from the popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub index: usize,
    /// Inline CSS filter, possibly empty.
    pub filter: String,
    pub playback_rate: f64,
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    /// Native frame area, used to put the largest video first.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageReply {
    Videos { videos: Vec<VideoInfo> },
    Ack,
    /// The command was addressed to another frame.
    Skipped,
    ShaderStatus { active: bool, values: Vec<(String, f64)> },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReply {
    pub uri: String,
    pub reply: PageReply,
}

pub trait Transport {
    /// Deliver `cmd` and collect the replies of every frame that handled it.
    fn send(&self, target: &FrameTarget, cmd: PageCommand) -> Result<Vec<FrameReply>, EngineError>;
}

fn dispatch<H: PageHost>(
    pages: &mut [PageContext<H>],
    target: &FrameTarget,
    cmd: PageCommand,
) -> Result<Vec<FrameReply>, EngineError> {
    let mut out = Vec::new();
    for page in pages.iter_mut() {
        match page.handle(target, cmd.clone()) {
            PageReply::Skipped => {}
            reply => out.push(FrameReply { uri: page.uri().to_string(), reply }),
        }
    }
    if out.is_empty() {
        if let FrameTarget::Frame(uri) = target {
            return Err(EngineError::transport(format!("no frame {uri}")));
        }
    }
    Ok(out)
}

/// Page contexts living in the same thread as the caller.
pub struct LocalTransport<H: PageHost> {
    pages: RefCell<Vec<PageContext<H>>>,
}

impl<H: PageHost> LocalTransport<H> {
    pub fn new(pages: Vec<PageContext<H>>) -> Self {
        Self { pages: RefCell::new(pages) }
    }

    pub fn pages(&self) -> RefMut<'_, Vec<PageContext<H>>> {
        self.pages.borrow_mut()
    }

    pub fn into_pages(self) -> Vec<PageContext<H>> {
        self.pages.into_inner()
    }
}

impl<H: PageHost> Transport for LocalTransport<H> {
    fn send(&self, target: &FrameTarget, cmd: PageCommand) -> Result<Vec<FrameReply>, EngineError> {
        let mut pages = self
            .pages
            .try_borrow_mut()
            .map_err(|_| EngineError::transport("page context busy"))?;
        dispatch(&mut pages, target, cmd)
    }
}

struct PageRequest {
    target: FrameTarget,
    cmd: PageCommand,
    reply: Sender<Result<Vec<FrameReply>, EngineError>>,
}

/// Sending half; lives on the popup/console thread.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: Sender<PageRequest>,
    timeout: Duration,
}

/// Receiving half; drained by whoever owns the page contexts.
pub struct PageServer {
    rx: Receiver<PageRequest>,
}

pub fn channel(timeout: Duration) -> (ChannelTransport, PageServer) {
    let (tx, rx) = unbounded();
    (ChannelTransport { tx, timeout }, PageServer { rx })
}

impl Transport for ChannelTransport {
    fn send(&self, target: &FrameTarget, cmd: PageCommand) -> Result<Vec<FrameReply>, EngineError> {
        let (reply, reply_rx) = bounded(1);
        self.tx
            .send(PageRequest { target: target.clone(), cmd, reply })
            .map_err(|_| EngineError::transport("page side disconnected"))?;
        match reply_rx.recv_timeout(self.timeout) {
            Ok(r) => r,
            Err(RecvTimeoutError::Timeout) => {
                Err(EngineError::transport(format!("no reply within {:?}", self.timeout)))
            }
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::transport("page side dropped the request")),
        }
    }
}

impl PageServer {
    /// Handle every queued request. Returns how many were handled.
    pub fn pump<H: PageHost>(&self, pages: &mut [PageContext<H>]) -> usize {
        let mut n = 0;
        while let Ok(req) = self.rx.try_recv() {
            let result = dispatch(pages, &req.target, req.cmd);
            // requester may have timed out already
            let _ = req.reply.send(result);
            n += 1;
        }
        n
    }
}
