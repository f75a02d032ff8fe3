use crossbeam_channel::Sender;

use crate::gl::ShaderStage;

/// Why a shader session went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Disabled,
    VideoRemoved,
    Replaced,
    PageClosed,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A shader session is live and rendering.
    SessionStarted { id: String, uniforms: usize },

    /// A shader session was torn down.
    SessionStopped { id: String, reason: StopReason },

    /// Shader compile failed; the session was not created.
    ShaderCompileErr { id: String, stage: ShaderStage, log: String },

    /// Program link failed; the session was not created.
    ShaderLinkErr { id: String, log: String },

    /// A schema uniform has no location in the linked program (usually optimized out).
    UniformMissing { id: String, name: String },
}

/// Optional fan-out of engine events. Sending never blocks and a disconnected
/// receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<EngineEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, ev: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(ev);
        }
    }
}
