//! Document loading
//!
//! A loaded file yields a render handle for bitmaps and, for PDFs, a
//! structural handle for page-level edits. Loading either succeeds with both
//! or fails without leaving anything behind.

use crate::error::{PdfEditError, Result};
use crate::page_tree;
use crate::render::{ImageRenderHandle, PageSize, RenderBackend, RenderHandle};
use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" | "pdf" => Some(Self::Pdf),
            "image/png" | "png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Detect the kind from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            Some(Self::Pdf)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else {
            None
        }
    }

    /// Use the declared MIME type when recognized, otherwise sniff
    pub fn detect(mime: Option<&str>, bytes: &[u8]) -> Result<Self> {
        mime.and_then(Self::from_mime)
            .or_else(|| Self::sniff(bytes))
            .ok_or_else(|| {
                PdfEditError::DocumentLoad(format!(
                    "Unsupported file type: {}",
                    mime.unwrap_or("unknown")
                ))
            })
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, Self::Pdf)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// PDF file information extracted during validation
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct PdfInfo {
    pub page_count: usize,
    /// PDF version string (e.g., "1.7")
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// An editable, page-addressable PDF.
///
/// Owned by exactly one session; dropped when the session closes or another
/// document is opened.
#[derive(Debug, Clone)]
pub struct StructuralDocument {
    doc: Document,
    byte_len: usize,
}

impl StructuralDocument {
    pub fn load(bytes: &[u8]) -> Result<Self> {
        check_header(bytes)?;
        let doc = Document::load_mem(bytes)
            .map_err(|e| PdfEditError::DocumentLoad(format!("Failed to parse PDF: {}", e)))?;
        if doc.is_encrypted() {
            return Err(PdfEditError::DocumentLoad(
                "Encrypted PDFs are not supported".into(),
            ));
        }
        if doc.get_pages().is_empty() {
            return Err(PdfEditError::DocumentLoad("PDF has no pages".into()));
        }
        debug!(pages = doc.get_pages().len(), bytes = bytes.len(), "Parsed PDF");
        Ok(Self {
            doc,
            byte_len: bytes.len(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Object id of the page at a 0-based index
    pub fn page_id(&self, index: usize) -> Option<ObjectId> {
        self.doc.get_pages().values().nth(index).copied()
    }

    pub fn page_ids(&self) -> Vec<ObjectId> {
        page_tree::page_ids(&self.doc)
    }

    /// Visible page box size in points, ignoring /Rotate
    pub fn page_size(&self, index: usize) -> Option<PageSize> {
        let id = self.page_id(index)?;
        let [x1, y1, x2, y2] = page_tree::page_box(&self.doc, id);
        Some(PageSize::new(x2 - x1, y2 - y1))
    }

    pub fn page_rotation(&self, index: usize) -> u16 {
        self.page_id(index)
            .map(|id| page_tree::page_rotation(&self.doc, id))
            .unwrap_or(0)
    }

    /// Size of the buffer this document was parsed from
    pub fn original_size(&self) -> usize {
        self.byte_len
    }

    pub fn inner(&self) -> &Document {
        &self.doc
    }

    pub fn into_inner(self) -> Document {
        self.doc
    }

    pub fn info(&self) -> PdfInfo {
        let (title, author) = extract_metadata(&self.doc);
        PdfInfo {
            page_count: self.page_count(),
            version: self.doc.version.clone(),
            encrypted: self.doc.is_encrypted(),
            size_bytes: self.byte_len,
            title,
            author,
        }
    }
}

/// Both handles of a loaded file
pub struct LoadedDocument {
    pub kind: DocumentKind,
    pub render: Box<dyn RenderHandle>,
    /// Present for PDFs only
    pub structure: Option<StructuralDocument>,
}

impl std::fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("kind", &self.kind)
            .field("pages", &self.render.page_count())
            .field("structure", &self.structure.is_some())
            .finish()
    }
}

pub struct DocumentLoader<'a> {
    backend: &'a dyn RenderBackend,
}

impl<'a> DocumentLoader<'a> {
    pub fn new(backend: &'a dyn RenderBackend) -> Self {
        Self { backend }
    }

    /// Load a buffer with an optional declared MIME type
    pub fn load(&self, bytes: &[u8], mime: Option<&str>) -> Result<LoadedDocument> {
        let kind = DocumentKind::detect(mime, bytes)?;
        let loaded = match kind {
            DocumentKind::Pdf => {
                let structure = StructuralDocument::load(bytes)?;
                let render = self.backend.open(bytes).map_err(|e| match e {
                    PdfEditError::DocumentLoad(_) => e,
                    other => PdfEditError::DocumentLoad(other.to_string()),
                })?;
                if render.page_count() != structure.page_count() {
                    return Err(PdfEditError::DocumentLoad(format!(
                        "Renderer sees {} pages but the document has {}",
                        render.page_count(),
                        structure.page_count()
                    )));
                }
                LoadedDocument {
                    kind,
                    render,
                    structure: Some(structure),
                }
            }
            DocumentKind::Png | DocumentKind::Jpeg => LoadedDocument {
                kind,
                render: Box::new(ImageRenderHandle::from_bytes(bytes)?),
                structure: None,
            },
        };
        info!(kind = ?loaded.kind, pages = loaded.render.page_count(), "Loaded document");
        Ok(loaded)
    }
}

/// Validate a PDF and extract basic info without opening a session
pub fn inspect_pdf(bytes: &[u8]) -> Result<PdfInfo> {
    let mut info = StructuralDocument::load(bytes)?.info();
    if let Some(version) = header_version(bytes) {
        info.version = version;
    }
    Ok(info)
}

fn check_header(bytes: &[u8]) -> Result<()> {
    if bytes.len() < 8 {
        return Err(PdfEditError::DocumentLoad(
            "File too small to be a valid PDF".into(),
        ));
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err(PdfEditError::DocumentLoad(
            "Not a valid PDF file (missing %PDF- header)".into(),
        ));
    }
    Ok(())
}

fn header_version(bytes: &[u8]) -> Option<String> {
    let raw = bytes.get(5..8)?;
    std::str::from_utf8(raw).ok().map(|v| v.trim().to_string())
}

fn extract_metadata(doc: &Document) -> (Option<String>, Option<String>) {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|o| page_tree::resolve_dict(doc, o));
    let Some(info) = info else {
        return (None, None);
    };
    let text = |key: &[u8]| {
        info.get(key)
            .ok()
            .and_then(|o| o.as_str().ok())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .filter(|s| !s.is_empty())
    };
    (text(b"Title"), text(b"Author"))
}
