//! PDF Split
//!
//! Resolves a page selection and copies each selected page into its own
//! single-page document, optionally packed into one archive.

use crate::archive::{build_archive, NamedFile};
use crate::assembly::{PageAssembler, PagePick};
use crate::document::StructuralDocument;
use crate::error::Result;
use crate::page_tree::save_document;
use crate::ranges::{resolve_selection, PageSelection};
use crate::task::TaskQueue;
use lopdf::Document;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Archive name used when split output is packaged
pub const SPLIT_ARCHIVE_NAME: &str = "split_pages.zip";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPackaging {
    /// One file per page
    #[default]
    Files,
    /// All pages in one zip
    Archive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitOutput {
    Files(Vec<NamedFile>),
    Archive(NamedFile),
}

impl SplitOutput {
    pub fn files(&self) -> Vec<&NamedFile> {
        match self {
            SplitOutput::Files(files) => files.iter().collect(),
            SplitOutput::Archive(file) => vec![file],
        }
    }
}

/// Split `doc` into single-page documents named `page_<n>.pdf`, where `n` is
/// the page's 1-based number in the source.
///
/// Fails with `SplitRange` before producing anything when the selection
/// resolves to no pages.
pub fn split_document(
    doc: &StructuralDocument,
    selection: &PageSelection,
    packaging: SplitPackaging,
    queue: &mut TaskQueue<'_>,
) -> Result<SplitOutput> {
    let pages = resolve_selection(selection, doc.page_count())?;
    queue.add_tasks(pages.len());

    let sources = [doc.inner()];
    let assembler = PageAssembler::new(&sources);
    let mut files = Vec::with_capacity(pages.len());
    for &page in &pages {
        let name = format!("page_{}.pdf", page + 1);
        let file = queue.run(&name, || {
            let mut out = assembler.assemble(&[PagePick::new(0, page)])?;
            Ok(NamedFile::new(name.clone(), save_document(&mut out.document)?))
        })?;
        files.push(file);
    }

    info!(pages = files.len(), ?packaging, "Split document");
    match packaging {
        SplitPackaging::Files => Ok(SplitOutput::Files(files)),
        SplitPackaging::Archive => Ok(SplitOutput::Archive(NamedFile::new(
            SPLIT_ARCHIVE_NAME,
            build_archive(&files)?,
        ))),
    }
}

/// Copy the selected pages, in selection order, into one new document
pub fn extract_pages(doc: &StructuralDocument, selection: &PageSelection) -> Result<Vec<u8>> {
    let pages = resolve_selection(selection, doc.page_count())?;
    let picks: Vec<PagePick> = pages.iter().map(|&p| PagePick::new(0, p)).collect();
    let sources: [&Document; 1] = [doc.inner()];
    let mut out = PageAssembler::new(&sources).assemble(&picks)?;
    save_document(&mut out.document)
}
