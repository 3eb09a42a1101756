use thiserror::Error;

/// A single page failed to rasterize.
///
/// Page-level: callers log it and fall back to a placeholder instead of
/// failing the whole operation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to render page {page}: {message}")]
pub struct RenderError {
    /// 0-based page index in the render handle
    pub page: usize,
    pub message: String,
}

impl RenderError {
    pub fn new(page: usize, message: impl Into<String>) -> Self {
        Self {
            page,
            message: message.into(),
        }
    }
}

/// A remote font could not be fetched or parsed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to fetch font {family}: {message}")]
pub struct FontFetchError {
    pub family: String,
    pub message: String,
}

impl FontFetchError {
    pub fn new(family: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PdfEditError {
    #[error("Failed to load document: {0}")]
    DocumentLoad(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    FontFetch(#[from] FontFetchError),

    #[error("Failed to write form field {name}: {message}")]
    FormField { name: String, message: String },

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("No pages selected: {0}")]
    SplitRange(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl PdfEditError {
    pub(crate) fn form_field(name: &str, message: impl Into<String>) -> Self {
        Self::FormField {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl From<lopdf::Error> for PdfEditError {
    fn from(e: lopdf::Error) -> Self {
        PdfEditError::Operation(e.to_string())
    }
}

pub type Result<T, E = PdfEditError> = std::result::Result<T, E>;
