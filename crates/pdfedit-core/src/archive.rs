//! Zip packaging for multi-file outputs

use crate::error::{PdfEditError, Result};
use serde::Serialize;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A named output file
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NamedFile {
    pub name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl NamedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Pack files into a single zip archive, in the given order
pub fn build_archive(files: &[NamedFile]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // PDFs and JPEGs are already compressed; deflate still helps PNG
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        zip.start_file(file.name.as_str(), options)
            .map_err(|e| PdfEditError::Archive(format!("{}: {}", file.name, e)))?;
        zip.write_all(&file.bytes)
            .map_err(|e| PdfEditError::Archive(format!("{}: {}", file.name, e)))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| PdfEditError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}
