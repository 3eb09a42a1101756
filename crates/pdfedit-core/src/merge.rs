//! PDF Merge
//!
//! Combines two or more PDFs into one: all pages of the first document, then
//! all pages of the second, and so on, each in its original order.

use crate::assembly::{AssembleOptions, PageAssembler, PagePick};
use crate::document::StructuralDocument;
use crate::error::{PdfEditError, Result};
use crate::page_tree::save_document;
use crate::task::TaskQueue;
use lopdf::Document;
use tracing::info;

/// Merge already-loaded documents. At least two are required.
pub fn merge_documents(documents: &[&StructuralDocument]) -> Result<Vec<u8>> {
    if documents.len() < 2 {
        return Err(PdfEditError::InvalidInput(format!(
            "Merging needs at least 2 documents, got {}",
            documents.len()
        )));
    }

    let sources: Vec<&Document> = documents.iter().map(|d| d.inner()).collect();
    let picks: Vec<PagePick> = documents
        .iter()
        .enumerate()
        .flat_map(|(source, doc)| (0..doc.page_count()).map(move |page| PagePick::new(source, page)))
        .collect();

    let mut assembled = PageAssembler::new(&sources)
        .with_options(AssembleOptions { keep_forms: true })
        .assemble(&picks)?;
    let bytes = save_document(&mut assembled.document)?;

    info!(
        documents = documents.len(),
        pages = picks.len(),
        bytes = bytes.len(),
        "Merged documents"
    );
    Ok(bytes)
}

/// Load and merge raw PDF buffers. Each load is one task on the queue.
pub fn merge_files(files: &[Vec<u8>], queue: &mut TaskQueue<'_>) -> Result<Vec<u8>> {
    if files.len() < 2 {
        return Err(PdfEditError::InvalidInput(format!(
            "Merging needs at least 2 documents, got {}",
            files.len()
        )));
    }

    queue.add_tasks(files.len());
    let mut loaded = Vec::with_capacity(files.len());
    for (i, bytes) in files.iter().enumerate() {
        let doc = queue.run(&format!("Loading document {}", i + 1), || {
            StructuralDocument::load(bytes).map_err(|e| {
                let detail = match e {
                    PdfEditError::DocumentLoad(message) => message,
                    other => other.to_string(),
                };
                PdfEditError::DocumentLoad(format!("Document {}: {}", i + 1, detail))
            })
        })?;
        loaded.push(doc);
    }
    queue.check_cancelled()?;

    let refs: Vec<&StructuralDocument> = loaded.iter().collect();
    merge_documents(&refs)
}
