//! VideoFilters engine: shader uniform schemas, per-video WebGL shader
//! sessions, overlay layout and the popup/page messaging that drives them.
//!
//! The engine is host-agnostic. The browser binding lives in `web` (feature
//! `web`, wasm32 only); the desktop harness in the root crate provides its own
//! `PageHost` over a glutin window.

#[macro_use]
pub mod logging;

pub mod controls;
pub mod error;
pub mod events;
pub mod filter;
pub mod gl;
pub mod host;
pub mod messaging;
pub mod overlay;
pub mod page;
pub mod popup;
pub mod render;
pub mod session;
pub mod settings;
pub mod store;
pub mod uniforms;
pub mod validate;

#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

pub use error::EngineError;
pub use events::{EngineEvent, EventSink, StopReason};
pub use page::{PageContext, PageEvent, VideoKey};
pub use settings::{Settings, ShaderSource};
pub use uniforms::{parse_shader_uniforms, UniformSchema, UniformSpec};
pub use validate::{check_shader, validate_uniform};
