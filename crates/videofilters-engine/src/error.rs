use std::{fmt, path::PathBuf};

use crate::gl::ShaderStage;

#[derive(Debug)]
pub enum EngineError {
    /// I/O error reading or writing a settings file.
    Io { path: PathBuf, source: std::io::Error },
    /// JSON parse error for a settings file.
    Json { path: PathBuf, source: serde_json::Error },

    /// Stored settings are syntactically valid JSON but do not fit the expected shape.
    InvalidSettings { key: String, msg: String },

    /// A shader stage failed to compile. `log` is the driver's info log.
    Compile { stage: ShaderStage, log: String },
    /// The program failed to link.
    Link { log: String },
    /// A GL object (buffer, texture, program) could not be allocated.
    GpuResource { what: &'static str, msg: String },
    /// No rendering context could be acquired for the overlay canvas.
    ContextUnavailable { msg: String },

    /// No video at `index` in the target frame.
    VideoNotFound { uri: String, index: usize },
    /// Enabling a shader session while one is already live for that video.
    SessionExists { id: String },
    /// Operating on a session that does not exist (or was torn down).
    SessionNotFound { id: String },
    /// Uniform update for a name that is not part of the session's schema.
    UnknownUniform { name: String },

    /// Shader source failed schema validation or the required-lines check.
    ShaderRejected { errors: Vec<String> },

    /// Messaging between the popup and a page context failed.
    Transport { msg: String },
    /// The host does not implement an optional capability.
    Unsupported { what: &'static str },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io { path, source } => {
                write!(f, "I/O error for {}: {}", path.display(), source)
            }
            EngineError::Json { path, source } => {
                write!(f, "JSON parse error for {}: {}", path.display(), source)
            }
            EngineError::InvalidSettings { key, msg } => {
                write!(f, "Invalid settings '{}': {}", key, msg)
            }
            EngineError::Compile { stage, log } => {
                write!(f, "{} shader compile error:\n{}", stage.as_str(), log)
            }
            EngineError::Link { log } => write!(f, "Program link error:\n{}", log),
            EngineError::GpuResource { what, msg } => {
                write!(f, "Failed to create {}: {}", what, msg)
            }
            EngineError::ContextUnavailable { msg } => {
                write!(f, "No rendering context available: {}", msg)
            }
            EngineError::VideoNotFound { uri, index } => {
                write!(f, "No video at index {} in {}", index, uri)
            }
            EngineError::SessionExists { id } => write!(f, "Shader session already active: {}", id),
            EngineError::SessionNotFound { id } => write!(f, "No shader session: {}", id),
            EngineError::UnknownUniform { name } => write!(f, "Unknown uniform '{}'", name),
            EngineError::ShaderRejected { errors } => {
                write!(f, "Shader rejected ({} issue(s)): {}", errors.len(), errors.join("; "))
            }
            EngineError::Transport { msg } => write!(f, "Transport error: {}", msg),
            EngineError::Unsupported { what } => write!(f, "Unsupported: {}", what),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io { source, .. } => Some(source),
            EngineError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl EngineError {
    pub fn transport(msg: impl Into<String>) -> Self {
        EngineError::Transport { msg: msg.into() }
    }

    /// True for errors that abort session creation.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            EngineError::Compile { .. }
                | EngineError::Link { .. }
                | EngineError::GpuResource { .. }
                | EngineError::ContextUnavailable { .. }
        )
    }
}
