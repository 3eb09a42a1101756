//! Client-side PDF editing engine
//!
//! Loads a PDF into two handles: a structural one (lopdf) for edits and a
//! render one (a [`RenderHandle`] supplied by the host) for bitmaps. An
//! [`EditSession`] holds pages, annotations and undo history, and exports
//! everything back into a single PDF.
//!
//! Stateless tools work directly on byte buffers:
//! - [`merge_files`] / [`merge_documents`]: concatenate documents
//! - [`split_document`]: one file per selected page, optionally zipped
//! - [`images_to_pdf`] / [`pdf_to_images`]: conversion in both directions
//! - [`compress_pdf`]: hybrid compression that keeps text pages intact
//!
//! Long-running tools run on a [`TaskQueue`], which reports progress after
//! every page and can be cancelled between pages.

pub mod archive;
pub mod assembly;
pub mod command;
pub mod compress;
pub mod config;
pub mod convert;
pub mod coords;
pub mod document;
pub mod error;
pub mod export;
pub mod fonts;
pub mod forms;
pub mod history;
pub mod images;
pub mod merge;
pub mod model;
pub mod page_tree;
pub mod pages;
pub mod ranges;
pub mod render;
pub mod session;
pub mod split;
pub mod task;

pub use archive::{build_archive, NamedFile};
pub use command::{process_command, EngineCommand, ProcessMetrics, ProcessResult};
pub use compress::{compress_pdf, CompressOptions, CompressionLevel, CompressionReport};
pub use config::EngineConfig;
pub use convert::{
    images_to_pdf, pdf_to_image_archive, pdf_to_images, PageSizePolicy, RasterFormat, RasterOptions,
};
pub use coords::{BasePoint, DisplayPoint};
pub use document::{inspect_pdf, DocumentKind, DocumentLoader, LoadedDocument, PdfInfo, StructuralDocument};
pub use error::{FontFetchError, PdfEditError, RenderError, Result};
pub use export::{ExportOptions, ExportOutput};
pub use fonts::{available_families, FontCache, FontFetcher};
pub use forms::discover_form_fields;
pub use history::History;
pub use merge::{merge_documents, merge_files};
pub use model::{
    AnnotationId, AnnotationStore, DrawPath, FieldKind, FieldValue, FormFieldDescriptor, NewText,
    PageId, TextAnnotation, TextStyle,
};
pub use pages::{PageCollection, PageInfo};
pub use ranges::{parse_page_ranges, PageSelection};
pub use render::{PageSize, RasterSurface, RenderBackend, RenderHandle, RenderService, RenderedPage};
pub use session::EditSession;
pub use split::{split_document, SplitOutput, SplitPackaging};
pub use task::{CancelToken, TaskQueue};

/// Page count of a PDF buffer
pub fn get_page_count(bytes: &[u8]) -> Result<usize> {
    Ok(StructuralDocument::load(bytes)?.page_count())
}
