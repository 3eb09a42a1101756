//! JSON message interface for hosts that prefer one entry point over
//! individual function calls

use crate::convert::{images_to_pdf, PageSizePolicy};
use crate::document::StructuralDocument;
use crate::error::Result;
use crate::merge::merge_files;
use crate::ranges::PageSelection;
use crate::split::{split_document, SplitOutput, SplitPackaging};
use crate::task::TaskQueue;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum EngineCommand {
    Merge {
        files: Vec<Vec<u8>>,
    },
    Split {
        file: Vec<u8>,
        #[serde(default = "all_pages")]
        selection: PageSelection,
        #[serde(default)]
        packaging: SplitPackaging,
    },
    ImagesToPdf {
        images: Vec<Vec<u8>>,
        #[serde(default)]
        page_size: PageSizePolicy,
    },
}

fn all_pages() -> PageSelection {
    PageSelection::All
}

impl EngineCommand {
    fn input_size(&self) -> usize {
        match self {
            EngineCommand::Merge { files } => files.iter().map(Vec::len).sum(),
            EngineCommand::Split { file, .. } => file.len(),
            EngineCommand::ImagesToPdf { images, .. } => images.iter().map(Vec::len).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub success: bool,
    /// Base64-encoded output (PDF or zip)
    pub data: Option<String>,
    /// Individual split outputs, when not packaged into one archive
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<EncodedFile>,
    pub error: Option<String>,
    pub metrics: Option<ProcessMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncodedFile {
    pub name: String,
    /// Base64
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    /// Filled in by the host, which owns the clock
    pub processing_time_ms: u64,
}

impl ProcessResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            files: Vec::new(),
            error: Some(message),
            metrics: None,
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        if let Some(metrics) = self.metrics.as_mut() {
            metrics.processing_time_ms = elapsed_ms;
        }
        self
    }
}

struct Produced {
    data: Option<Vec<u8>>,
    files: Vec<(String, Vec<u8>)>,
    page_count: usize,
}

/// Run a command to completion. Errors are reported in the result rather
/// than returned.
pub fn process_command(command: EngineCommand, queue: &mut TaskQueue<'_>) -> ProcessResult {
    let input_size = command.input_size();
    match run(command, queue) {
        Ok(produced) => {
            let output_size = produced.data.as_ref().map_or(0, Vec::len)
                + produced.files.iter().map(|(_, bytes)| bytes.len()).sum::<usize>();
            ProcessResult {
                success: true,
                data: produced.data.map(|bytes| STANDARD.encode(bytes)),
                files: produced
                    .files
                    .into_iter()
                    .map(|(name, bytes)| EncodedFile {
                        name,
                        data: STANDARD.encode(bytes),
                    })
                    .collect(),
                error: None,
                metrics: Some(ProcessMetrics {
                    input_size_bytes: input_size,
                    output_size_bytes: output_size,
                    page_count: produced.page_count as u32,
                    processing_time_ms: 0,
                }),
            }
        }
        Err(e) => {
            warn!(error = %e, "Command failed");
            ProcessResult::failure(e.to_string())
        }
    }
}

fn run(command: EngineCommand, queue: &mut TaskQueue<'_>) -> Result<Produced> {
    match command {
        EngineCommand::Merge { files } => {
            let bytes = merge_files(&files, queue)?;
            let page_count = StructuralDocument::load(&bytes)?.page_count();
            Ok(Produced {
                data: Some(bytes),
                files: Vec::new(),
                page_count,
            })
        }
        EngineCommand::Split {
            file,
            selection,
            packaging,
        } => {
            let doc = StructuralDocument::load(&file)?;
            match split_document(&doc, &selection, packaging, queue)? {
                SplitOutput::Files(files) => Ok(Produced {
                    data: None,
                    page_count: files.len(),
                    files: files.into_iter().map(|f| (f.name, f.bytes)).collect(),
                }),
                SplitOutput::Archive(archive) => Ok(Produced {
                    page_count: crate::ranges::resolve_selection(&selection, doc.page_count())?.len(),
                    data: Some(archive.bytes),
                    files: Vec::new(),
                }),
            }
        }
        EngineCommand::ImagesToPdf { images, page_size } => {
            let page_count = images.len();
            Ok(Produced {
                data: Some(images_to_pdf(&images, page_size, queue)?),
                files: Vec::new(),
                page_count,
            })
        }
    }
}
