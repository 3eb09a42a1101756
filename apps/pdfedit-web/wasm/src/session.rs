//! Editor session exposed to the host page
//!
//! All editing state lives in [`pdfedit_core::EditSession`]; this wrapper
//! converts arguments and results at the JavaScript boundary. Positions
//! passed in are display pixels at the current zoom.

use crate::js_render::{HostBackend, JsRenderer};
use crate::{js_error, task_queue};
use pdfedit_core::{
    DisplayPoint, DocumentLoader, EditSession, EngineConfig, ExportOptions, FieldValue, PageId,
    RenderedPage, TextStyle,
};
use wasm_bindgen::prelude::*;

/// A rendered page, or the size of the placeholder to draw instead
#[wasm_bindgen]
pub struct PageBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    placeholder: bool,
}

#[wasm_bindgen]
impl PageBitmap {
    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when the page failed to render; `pixels` is empty
    #[wasm_bindgen(getter)]
    pub fn placeholder(&self) -> bool {
        self.placeholder
    }

    /// RGBA pixels, ready for `new ImageData(pixels, width, height)`
    #[wasm_bindgen(getter)]
    pub fn pixels(&self) -> js_sys::Uint8ClampedArray {
        js_sys::Uint8ClampedArray::from(self.pixels.as_slice())
    }
}

impl From<RenderedPage> for PageBitmap {
    fn from(page: RenderedPage) -> Self {
        let (width, height) = page.dimensions();
        match page {
            RenderedPage::Bitmap(image) => Self {
                width,
                height,
                pixels: image.into_raw(),
                placeholder: false,
            },
            RenderedPage::Placeholder { .. } => Self {
                width,
                height,
                pixels: Vec::new(),
                placeholder: true,
            },
        }
    }
}

#[wasm_bindgen]
pub struct ExportedDocument {
    bytes: Vec<u8>,
    report: JsValue,
}

#[wasm_bindgen]
impl ExportedDocument {
    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.bytes.as_slice())
    }

    /// Page count, drawn annotations, fonts, compression and form results
    #[wasm_bindgen(getter)]
    pub fn report(&self) -> JsValue {
        self.report.clone()
    }
}

#[wasm_bindgen]
pub struct EditorSession {
    inner: EditSession,
    progress_callback: Option<js_sys::Function>,
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid argument: {}", e)))
}

#[wasm_bindgen]
impl EditorSession {
    /// Open a PDF for editing. `config` is an optional partial
    /// `EngineConfig` object.
    #[wasm_bindgen(constructor)]
    pub fn new(bytes: &[u8], renderer: JsRenderer, config: JsValue) -> Result<EditorSession, JsValue> {
        let config: EngineConfig = if config.is_undefined() || config.is_null() {
            EngineConfig::default()
        } else {
            from_js(config)?
        };
        let backend = HostBackend::new(renderer);
        let loaded = DocumentLoader::new(&backend)
            .load(bytes, Some("application/pdf"))
            .map_err(js_error)?;
        Ok(Self {
            inner: EditSession::open(config, loaded).map_err(js_error)?,
            progress_callback: None,
        })
    }

    /// Callback signature: (current: number, total: number, message: string) => void
    #[wasm_bindgen(js_name = setProgressCallback)]
    pub fn set_progress_callback(&mut self, callback: js_sys::Function) {
        self.progress_callback = Some(callback);
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> usize {
        self.inner.pages().len()
    }

    /// Page list in display order: `{id, source_page_index, rotation, selected}`
    pub fn pages(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.pages().pages())
    }

    pub fn texts(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.annotations().texts())
    }

    pub fn paths(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.annotations().paths())
    }

    #[wasm_bindgen(js_name = formFields)]
    pub fn form_fields(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.annotations().form_fields())
    }

    // History

    pub fn undo(&mut self) -> bool {
        self.inner.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.inner.redo()
    }

    #[wasm_bindgen(getter, js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.inner.can_undo()
    }

    #[wasm_bindgen(getter, js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.inner.can_redo()
    }

    // Navigation and zoom

    #[wasm_bindgen(getter, js_name = currentIndex)]
    pub fn current_index(&self) -> usize {
        self.inner.current_index()
    }

    #[wasm_bindgen(js_name = goTo)]
    pub fn go_to(&mut self, index: usize) -> Result<(), JsValue> {
        self.inner.go_to(index).map_err(js_error)
    }

    #[wasm_bindgen(js_name = nextPage)]
    pub fn next_page(&mut self) -> bool {
        self.inner.next_page()
    }

    #[wasm_bindgen(js_name = previousPage)]
    pub fn previous_page(&mut self) -> bool {
        self.inner.previous_page()
    }

    #[wasm_bindgen(getter)]
    pub fn zoom(&self) -> f64 {
        self.inner.zoom()
    }

    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        self.inner.set_zoom(zoom)
    }

    #[wasm_bindgen(js_name = zoomIn)]
    pub fn zoom_in(&mut self) -> f64 {
        self.inner.zoom_in()
    }

    #[wasm_bindgen(js_name = zoomOut)]
    pub fn zoom_out(&mut self) -> f64 {
        self.inner.zoom_out()
    }

    #[wasm_bindgen(js_name = resetZoom)]
    pub fn reset_zoom(&mut self) -> f64 {
        self.inner.reset_zoom()
    }

    // Rendering

    #[wasm_bindgen(js_name = renderPage)]
    pub fn render_page(&self, page_id: PageId) -> Result<PageBitmap, JsValue> {
        self.inner.render_page(page_id).map(PageBitmap::from).map_err(js_error)
    }

    #[wasm_bindgen(js_name = generateThumbnails)]
    pub fn generate_thumbnails(&mut self) -> Result<usize, JsValue> {
        let mut queue = task_queue(self.progress_callback.as_ref());
        self.inner.generate_thumbnails(&mut queue).map_err(js_error)
    }

    /// PNG thumbnail bytes, if generated
    pub fn thumbnail(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.inner
            .pages()
            .get(page_id)
            .and_then(|p| p.thumbnail.as_ref())
            .map(|png| png.to_vec())
    }

    // Pages

    #[wasm_bindgen(js_name = rotatePage)]
    pub fn rotate_page(&mut self, page_id: PageId, delta: i32) -> Result<u16, JsValue> {
        self.inner.rotate_page(page_id, delta).map_err(js_error)
    }

    #[wasm_bindgen(js_name = movePage)]
    pub fn move_page(&mut self, from: usize, to: usize) -> Result<(), JsValue> {
        self.inner.move_page(from, to).map_err(js_error)
    }

    #[wasm_bindgen(js_name = toggleSelect)]
    pub fn toggle_select(&mut self, page_id: PageId) -> Result<bool, JsValue> {
        self.inner.toggle_select(page_id).map_err(js_error)
    }

    #[wasm_bindgen(js_name = selectAll)]
    pub fn select_all(&mut self) {
        self.inner.select_all();
    }

    #[wasm_bindgen(js_name = deselectAll)]
    pub fn deselect_all(&mut self) {
        self.inner.deselect_all();
    }

    #[wasm_bindgen(js_name = deletePage)]
    pub fn delete_page(&mut self, page_id: PageId) -> Result<(), JsValue> {
        self.inner.delete_page(page_id).map_err(js_error)
    }

    #[wasm_bindgen(js_name = deleteSelected)]
    pub fn delete_selected(&mut self) -> usize {
        self.inner.delete_selected()
    }

    // Text

    /// Add a text box at a display position. `style` is an optional partial
    /// `{font_size, color, font_family, bold, italic}` object.
    #[wasm_bindgen(js_name = addText)]
    pub fn add_text(
        &mut self,
        page_id: PageId,
        x: f64,
        y: f64,
        text: &str,
        style: JsValue,
    ) -> Result<u64, JsValue> {
        let style: TextStyle = if style.is_undefined() || style.is_null() {
            TextStyle::default()
        } else {
            from_js(style)?
        };
        self.inner
            .add_text_at(page_id, DisplayPoint::new(x, y), text, style)
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = setText)]
    pub fn set_text(&mut self, id: u64, text: &str) -> Result<(), JsValue> {
        self.inner.set_text(id, text).map_err(js_error)
    }

    #[wasm_bindgen(js_name = moveText)]
    pub fn move_text(&mut self, id: u64, x: f64, y: f64) -> Result<(), JsValue> {
        let to = self.inner.to_base(DisplayPoint::new(x, y));
        self.inner.move_text(id, to).map_err(js_error)
    }

    #[wasm_bindgen(js_name = setTextStyle)]
    pub fn set_text_style(&mut self, id: u64, style: JsValue) -> Result<(), JsValue> {
        let style: TextStyle = from_js(style)?;
        self.inner.set_text_style(id, style).map_err(js_error)
    }

    #[wasm_bindgen(js_name = deleteText)]
    pub fn delete_text(&mut self, id: u64) -> bool {
        self.inner.delete_text(id)
    }

    // Drawing

    #[wasm_bindgen(js_name = beginStroke)]
    pub fn begin_stroke(
        &mut self,
        page_id: PageId,
        x: f64,
        y: f64,
        color: &str,
        line_width: f64,
    ) -> Result<(), JsValue> {
        self.inner
            .begin_stroke(page_id, DisplayPoint::new(x, y), color, line_width)
            .map_err(js_error)
    }

    #[wasm_bindgen(js_name = extendStroke)]
    pub fn extend_stroke(&mut self, x: f64, y: f64) -> bool {
        self.inner.extend_stroke(DisplayPoint::new(x, y))
    }

    /// Id of the stored path, or undefined for a discarded single-point stroke
    #[wasm_bindgen(js_name = endStroke)]
    pub fn end_stroke(&mut self) -> Option<u64> {
        self.inner.end_stroke()
    }

    #[wasm_bindgen(js_name = deletePath)]
    pub fn delete_path(&mut self, id: u64) -> bool {
        self.inner.delete_path(id)
    }

    #[wasm_bindgen(js_name = clearPage)]
    pub fn clear_page(&mut self, page_id: PageId) -> usize {
        self.inner.clear_page(page_id)
    }

    // Forms and fonts

    /// `value` is a boolean for checkboxes and a string otherwise
    #[wasm_bindgen(js_name = setFieldValue)]
    pub fn set_field_value(&mut self, name: &str, value: JsValue) -> Result<(), JsValue> {
        let value = match value.as_bool() {
            Some(checked) => FieldValue::Bool(checked),
            None => FieldValue::Text(
                value
                    .as_string()
                    .ok_or_else(|| JsValue::from_str("Field value must be a boolean or a string"))?,
            ),
        };
        self.inner.set_field_value(name, value).map_err(js_error)
    }

    /// Cache a font binary fetched by the host
    #[wasm_bindgen(js_name = preloadFont)]
    pub fn preload_font(&mut self, family: &str, bold: bool, italic: bool, data: Vec<u8>) -> Result<(), JsValue> {
        self.inner.preload_font(family, bold, italic, data).map_err(js_error)
    }

    /// `options` is an optional `{compression: {level, preserve_text}}` object
    pub fn export(&mut self, options: JsValue) -> Result<ExportedDocument, JsValue> {
        let options: ExportOptions = if options.is_undefined() || options.is_null() {
            ExportOptions::default()
        } else {
            from_js(options)?
        };
        let mut queue = task_queue(self.progress_callback.as_ref());
        let output = self.inner.export(&options, &mut queue).map_err(js_error)?;
        let report = to_js(&output)?;
        Ok(ExportedDocument {
            bytes: output.bytes,
            report,
        })
    }
}
