//! Overlay canvas geometry.
//!
//! The canvas box must show the native frame undistorted inside the video's
//! displayed box. When the two aspect ratios differ by more than
//! [`ASPECT_TOLERANCE`] the canvas is fitted to one axis and centered on the
//! other; otherwise it takes the display box as is.

use crate::host::{Rect, Size};

pub const ASPECT_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Display box is wider than the frame: full height, centered horizontally.
    Height,
    /// Display box is taller than the frame: full width, centered vertically.
    Width,
    Exact,
}

/// CSS box for the overlay canvas. `None` offsets are copied from the video's
/// own inline style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    pub fit: Fit,
    pub width: f64,
    pub height: f64,
    pub offset_left: Option<f64>,
    pub offset_top: Option<f64>,
}

pub fn fit_overlay(native: Size, display: Rect) -> OverlayLayout {
    let exact = OverlayLayout {
        fit: Fit::Exact,
        width: display.width,
        height: display.height,
        offset_left: None,
        offset_top: None,
    };
    if native.is_empty() || display.width <= 0.0 || display.height <= 0.0 {
        return exact;
    }

    let video_aspect = native.width as f64 / native.height as f64;
    let screen_aspect = display.width / display.height;

    if screen_aspect > video_aspect + ASPECT_TOLERANCE {
        let width = display.height * video_aspect;
        OverlayLayout {
            fit: Fit::Height,
            width,
            height: display.height,
            offset_left: Some((display.width - width) / 2.0),
            offset_top: None,
        }
    } else if screen_aspect < video_aspect - ASPECT_TOLERANCE {
        let height = display.width / video_aspect;
        OverlayLayout {
            fit: Fit::Width,
            width: display.width,
            height,
            offset_left: None,
            offset_top: Some((display.height - height) / 2.0),
        }
    } else {
        exact
    }
}

/// `12.5px`-style CSS length.
pub fn px(v: f64) -> String {
    format!("{v}px")
}
