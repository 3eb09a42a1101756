//! Rendering through a renderer object owned by the host page
//!
//! The host wraps its PDF rasterizer in an object with synchronous methods:
//!
//! ```javascript
//! {
//!   pageCount(): number,
//!   pageSize(page): [width, height],          // points, ignoring /Rotate
//!   paint(page, scale, width, height): Uint8ClampedArray,  // RGBA
//!   textRunCount(page): number,
//! }
//! ```

use pdfedit_core::{PageSize, RasterSurface, RenderBackend, RenderError, RenderHandle};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[derive(Clone)]
    pub type JsRenderer;

    #[wasm_bindgen(method, js_name = pageCount)]
    fn page_count(this: &JsRenderer) -> usize;

    #[wasm_bindgen(method, catch, js_name = pageSize)]
    fn page_size(this: &JsRenderer, page: usize) -> Result<js_sys::Array, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn paint(
        this: &JsRenderer,
        page: usize,
        scale: f64,
        width: u32,
        height: u32,
    ) -> Result<js_sys::Uint8ClampedArray, JsValue>;

    #[wasm_bindgen(method, catch, js_name = textRunCount)]
    fn text_run_count(this: &JsRenderer, page: usize) -> Result<usize, JsValue>;
}

pub(crate) fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| format!("{:?}", value))
}

pub struct JsRenderHandle {
    renderer: JsRenderer,
}

impl JsRenderHandle {
    pub fn new(renderer: JsRenderer) -> Self {
        Self { renderer }
    }
}

impl RenderHandle for JsRenderHandle {
    fn page_count(&self) -> usize {
        self.renderer.page_count()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        let size = self
            .renderer
            .page_size(page)
            .map_err(|e| RenderError::new(page, js_message(&e)))?;
        let size: Vec<f64> = size.iter().filter_map(|v| v.as_f64()).collect();
        match size.as_slice() {
            [width, height] if *width > 0.0 && *height > 0.0 => Ok(PageSize::new(*width, *height)),
            _ => Err(RenderError::new(page, "renderer returned an invalid page size")),
        }
    }

    fn paint(&self, page: usize, scale: f64, surface: &mut RasterSurface) -> Result<(), RenderError> {
        let pixels = self
            .renderer
            .paint(page, scale, surface.width(), surface.height())
            .map_err(|e| RenderError::new(page, js_message(&e)))?;
        surface
            .write_rgba(&pixels.to_vec())
            .map_err(|message| RenderError::new(page, message))
    }

    fn text_run_count(&self, page: usize) -> Result<usize, RenderError> {
        self.renderer
            .text_run_count(page)
            .map_err(|e| RenderError::new(page, js_message(&e)))
    }
}

/// Backend over a renderer the host already opened for the buffer
pub struct HostBackend {
    renderer: JsRenderer,
}

impl HostBackend {
    pub fn new(renderer: JsRenderer) -> Self {
        Self { renderer }
    }
}

impl RenderBackend for HostBackend {
    fn open(&self, _bytes: &[u8]) -> pdfedit_core::Result<Box<dyn RenderHandle>> {
        Ok(Box::new(JsRenderHandle::new(self.renderer.clone())))
    }
}
