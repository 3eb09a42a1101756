//! Stateless document tools

use crate::js_render::{JsRenderHandle, JsRenderer};
use crate::{js_error, task_queue};
use pdfedit_core::{
    compress_pdf, images_to_pdf, inspect_pdf, merge_files, pdf_to_image_archive, process_command,
    split_document, CompressOptions, EngineCommand, PageSelection, PageSizePolicy, RasterOptions,
    SplitOutput, SplitPackaging, StructuralDocument,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

fn buffers(array: &js_sys::Array) -> Vec<Vec<u8>> {
    array
        .iter()
        .map(|value| js_sys::Uint8Array::new(&value).to_vec())
        .collect()
}

fn option_or_default<T: serde::de::DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid options: {}", e)))
}

/// Validate a PDF and return `{page_count, version, encrypted, size_bytes, title, author}`
#[wasm_bindgen(js_name = inspectPdf)]
pub fn inspect(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = inspect_pdf(bytes).map_err(js_error)?;
    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Merge an array of PDF buffers in order
#[wasm_bindgen(js_name = mergePdfs)]
pub fn merge(files: js_sys::Array, progress: Option<js_sys::Function>) -> Result<Vec<u8>, JsValue> {
    let mut queue = task_queue(progress.as_ref());
    merge_files(&buffers(&files), &mut queue).map_err(js_error)
}

#[derive(Serialize)]
struct SplitFile {
    name: String,
    #[serde(with = "serde_bytes_compat")]
    bytes: Vec<u8>,
}

mod serde_bytes_compat {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }
}

/// Split a PDF. `range` is a page range expression such as `"1-3, 5"`, or
/// empty for all pages. Returns `[{name, bytes}]`: one entry per page, or
/// a single zip when `archive` is set.
#[wasm_bindgen(js_name = splitPdf)]
pub fn split(
    bytes: &[u8],
    range: &str,
    archive: bool,
    progress: Option<js_sys::Function>,
) -> Result<JsValue, JsValue> {
    let doc = StructuralDocument::load(bytes).map_err(js_error)?;
    let selection = if range.trim().is_empty() {
        PageSelection::All
    } else {
        PageSelection::Custom(range.to_string())
    };
    let packaging = if archive {
        SplitPackaging::Archive
    } else {
        SplitPackaging::Files
    };

    let mut queue = task_queue(progress.as_ref());
    let files = match split_document(&doc, &selection, packaging, &mut queue).map_err(js_error)? {
        SplitOutput::Files(files) => files,
        SplitOutput::Archive(file) => vec![file],
    };
    let files: Vec<SplitFile> = files
        .into_iter()
        .map(|f| SplitFile {
            name: f.name,
            bytes: f.bytes,
        })
        .collect();
    serde_wasm_bindgen::to_value(&files)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Images (PNG/JPEG buffers) to one PDF. `page_size` is `"a4"`, `"letter"`
/// or `"fit"`.
#[wasm_bindgen(js_name = imagesToPdf)]
pub fn images(
    images: js_sys::Array,
    page_size: JsValue,
    progress: Option<js_sys::Function>,
) -> Result<Vec<u8>, JsValue> {
    let policy: PageSizePolicy = option_or_default(page_size)?;
    let mut queue = task_queue(progress.as_ref());
    images_to_pdf(&buffers(&images), policy, &mut queue).map_err(js_error)
}

/// Render every page through `renderer` into a zip of images.
/// `options` is an optional `{format: "png" | "jpg", quality: 1-100}`.
#[wasm_bindgen(js_name = pdfToImages)]
pub fn rasterize(
    renderer: JsRenderer,
    options: JsValue,
    progress: Option<js_sys::Function>,
) -> Result<Vec<u8>, JsValue> {
    let options: RasterOptions = option_or_default(options)?;
    let handle = JsRenderHandle::new(renderer);
    let mut queue = task_queue(progress.as_ref());
    pdf_to_image_archive(&handle, options, &mut queue).map_err(js_error)
}

#[wasm_bindgen]
pub struct CompressedPdf {
    bytes: Vec<u8>,
    report: JsValue,
}

#[wasm_bindgen]
impl CompressedPdf {
    #[wasm_bindgen(getter)]
    pub fn bytes(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.bytes.as_slice())
    }

    /// `{original_size, compressed_size, percent_saved, preserved_pages, rasterized_pages}`
    #[wasm_bindgen(getter)]
    pub fn report(&self) -> JsValue {
        self.report.clone()
    }
}

/// Hybrid compression. `options` is an optional `{level, preserve_text}`.
#[wasm_bindgen(js_name = compressPdf)]
pub fn compress(
    bytes: &[u8],
    renderer: JsRenderer,
    options: JsValue,
    text_run_threshold: Option<usize>,
    progress: Option<js_sys::Function>,
) -> Result<CompressedPdf, JsValue> {
    let options: CompressOptions = option_or_default(options)?;
    let doc = StructuralDocument::load(bytes).map_err(js_error)?;
    let handle = JsRenderHandle::new(renderer);
    let threshold = text_run_threshold.unwrap_or(pdfedit_core::EngineConfig::default().text_run_threshold);

    let mut queue = task_queue(progress.as_ref());
    let (bytes, report) = compress_pdf(&doc, &handle, options, threshold, &mut queue).map_err(js_error)?;
    let report = serde_wasm_bindgen::to_value(&report)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))?;
    Ok(CompressedPdf { bytes, report })
}

/// Run a JSON `EngineCommand` and return a JSON `ProcessResult`
#[wasm_bindgen(js_name = processCommand)]
pub fn command(json: &str) -> String {
    let started = js_sys::Date::now();
    let result = match serde_json::from_str::<EngineCommand>(json) {
        Ok(command) => {
            let mut queue = task_queue(None);
            process_command(command, &mut queue)
                .with_elapsed_ms((js_sys::Date::now() - started).max(0.0) as u64)
        }
        Err(e) => {
            return serde_json::json!({
                "success": false,
                "data": null,
                "error": format!("Invalid command: {}", e),
                "metrics": null,
            })
            .to_string()
        }
    };
    serde_json::to_string(&result).unwrap_or_else(|e| {
        serde_json::json!({ "success": false, "error": e.to_string() }).to_string()
    })
}
