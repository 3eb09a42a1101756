//! WASM bindings for the PDF editor
//!
//! All document state lives in Rust. The host page supplies a renderer
//! object (see [`js_render`]) and handles DOM events, canvases and file I/O.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { EditorSession, mergePdfs } from './pkg/pdfedit_wasm.js';
//!
//! await init();
//!
//! const renderer = await openRenderer(bytes);   // host's PDF rasterizer
//! const session = new EditorSession(bytes, renderer, { base_scale: 1.5 });
//! session.setProgressCallback((current, total, msg) => updateUI(current, total, msg));
//!
//! const bitmap = session.renderPage(session.pages()[0].id);
//! ctx.putImageData(new ImageData(bitmap.pixels, bitmap.width, bitmap.height), 0, 0);
//!
//! session.addText(0, 120, 80, "Approved", { font_family: "Roboto", bold: true });
//! session.preloadFont("Roboto", true, false, robotoBoldTtf);
//! const { bytes: edited, report } = session.export({ compression: { level: "medium" } });
//!
//! const merged = mergePdfs([bytesA, bytesB]);
//! ```

pub mod js_render;
pub mod session;
pub mod tools;

use pdfedit_core::task::ProgressCallback;
use pdfedit_core::{PdfEditError, TaskQueue};
use std::io;
use wasm_bindgen::prelude::*;

pub use js_render::{JsRenderHandle, JsRenderer};
pub use session::{EditorSession, ExportedDocument, PageBitmap};

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    // A second init (hot reload) keeps the existing subscriber
    let _ = tracing_subscriber::fmt()
        .with_writer(ConsoleWriter::default)
        .without_time()
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

/// Line sink for `tracing` output, flushed to the browser console
#[derive(Default)]
struct ConsoleWriter {
    buffer: Vec<u8>,
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer);
            web_sys::console::log_1(&JsValue::from_str(line.trim_end()));
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        let _ = io::Write::flush(self);
    }
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Font families accepted by `TextStyle.font_family`
#[wasm_bindgen(js_name = availableFonts)]
pub fn available_fonts() -> Vec<String> {
    pdfedit_core::available_families()
        .into_iter()
        .map(String::from)
        .collect()
}

/// Page count from PDF bytes
#[wasm_bindgen]
pub fn get_page_count(bytes: &[u8]) -> Result<u32, JsValue> {
    pdfedit_core::get_page_count(bytes)
        .map(|count| count as u32)
        .map_err(js_error)
}

pub(crate) fn js_error(error: PdfEditError) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// Task queue that forwards progress to `(current, total, message)`
pub(crate) fn task_queue(progress: Option<&js_sys::Function>) -> TaskQueue<'_> {
    let callback = progress.map(|function| {
        Box::new(move |done: usize, total: usize, message: &str| {
            let _ = function.call3(
                &JsValue::NULL,
                &JsValue::from(done as u32),
                &JsValue::from(total as u32),
                &JsValue::from_str(message),
            );
        }) as ProgressCallback<'_>
    });
    TaskQueue::new(0).with_optional_progress(callback)
}


// Browser-only: these call into JavaScript
#[cfg(test)]
#[cfg(target_arch = "wasm32")]
mod wasm_tests {
    use super::*;
    use std::io::Write;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_console_writer_flushes_to_console() {
        let mut writer = ConsoleWriter::default();
        writer.write_all(b"pdfedit console check\n").unwrap();
        writer.flush().unwrap();
        assert!(writer.buffer.is_empty());
    }

    #[wasm_bindgen_test]
    fn test_task_queue_reports_progress_to_js() {
        let callback = js_sys::Function::new_with_args(
            "done, total, message",
            "globalThis.__pdfeditProgress = [done, total, message];",
        );
        let mut queue = task_queue(Some(&callback));
        queue.add_tasks(2);
        queue.run("Page 1", || Ok(())).unwrap();

        let seen = js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str("__pdfeditProgress"))
            .unwrap();
        let seen = js_sys::Array::from(&seen);
        assert_eq!(seen.get(0).as_f64(), Some(1.0));
        assert_eq!(seen.get(1).as_f64(), Some(2.0));
        assert_eq!(seen.get(2).as_string().as_deref(), Some("Page 1"));
    }

    #[wasm_bindgen_test]
    fn test_errors_become_js_strings() {
        let err = get_page_count(b"not a pdf").unwrap_err();
        assert!(err.as_string().is_some_and(|m| !m.is_empty()));
    }

    #[wasm_bindgen_test]
    fn test_invalid_command_json_is_reported() {
        let out: serde_json::Value = serde_json::from_str(&tools::command("{")).unwrap();
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().starts_with("Invalid command"));
    }
}
