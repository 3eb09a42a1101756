//! Coordinate transformation between display pixels, base space and PDF space
//!
//! Base space is the page rendered at the fixed base scale with a top-left
//! origin. Display space is base space multiplied by the live zoom. PDF
//! space is in points with a bottom-left origin.

use serde::{Deserialize, Serialize};

/// A point in base-space coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BasePoint {
    pub x: f64,
    pub y: f64,
}

/// A point in on-screen pixels at some zoom level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

impl BasePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl DisplayPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Convert a base-space value to display pixels
pub fn to_display(base: f64, zoom: f64) -> f64 {
    base * zoom
}

/// Convert display pixels back to base space
pub fn to_base(display: f64, zoom: f64) -> f64 {
    display / zoom
}

pub fn point_to_display(point: BasePoint, zoom: f64) -> DisplayPoint {
    DisplayPoint {
        x: to_display(point.x, zoom),
        y: to_display(point.y, zoom),
    }
}

pub fn point_to_base(point: DisplayPoint, zoom: f64) -> BasePoint {
    BasePoint {
        x: to_base(point.x, zoom),
        y: to_base(point.y, zoom),
    }
}

/// Convert a base-space point to PDF user space (points, bottom-left origin)
pub fn base_to_pdf(point: BasePoint, base_scale: f64, page_height: f64) -> (f64, f64) {
    let x = point.x / base_scale;
    let y = page_height - point.y / base_scale;
    (x, y)
}

/// Convert a PDF user-space point to base space
pub fn pdf_to_base(pdf_x: f64, pdf_y: f64, base_scale: f64, page_height: f64) -> BasePoint {
    BasePoint {
        x: pdf_x * base_scale,
        y: (page_height - pdf_y) * base_scale,
    }
}

/// Fit a `src_w x src_h` box into `dst_w x dst_h` preserving aspect ratio,
/// centered. Returns `(x, y, width, height)` inside the destination.
pub fn fit_centered(src_w: f64, src_h: f64, dst_w: f64, dst_h: f64) -> (f64, f64, f64, f64) {
    let src_aspect = src_w / src_h;
    let dst_aspect = dst_w / dst_h;

    let (width, height) = if src_aspect > dst_aspect {
        (dst_w, dst_w / src_aspect)
    } else {
        (dst_h * src_aspect, dst_h)
    };

    ((dst_w - width) / 2.0, (dst_h - height) / 2.0, width, height)
}
