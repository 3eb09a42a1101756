//! Hybrid page compression
//!
//! Each page is either copied untouched (enough text runs to be worth
//! keeping selectable) or rasterized and replaced by one full-page JPEG.
//! Any failure aborts the whole run; nothing partial is returned.

use crate::assembly::{AssembleOptions, PageAssembler, PagePick};
use crate::document::StructuralDocument;
use crate::error::{PdfEditError, Result};
use crate::images::{draw_image_ops, embed_jpeg};
use crate::page_tree::{page_box, save_document};
use crate::render::{count_text_runs, encode_jpeg, render_page, RenderHandle};
use crate::task::TaskQueue;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Light,
    #[default]
    Medium,
    Aggressive,
}

/// Render scale and JPEG quality (0..=1) used for rasterized pages
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionSettings {
    pub scale: f64,
    pub quality: f32,
}

impl CompressionLevel {
    pub fn settings(&self) -> CompressionSettings {
        match self {
            CompressionLevel::Light => CompressionSettings {
                scale: 1.5,
                quality: 0.85,
            },
            CompressionLevel::Medium => CompressionSettings {
                scale: 1.2,
                quality: 0.70,
            },
            CompressionLevel::Aggressive => CompressionSettings {
                scale: 1.0,
                quality: 0.50,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressOptions {
    pub level: CompressionLevel,
    /// Copy text-heavy pages instead of rasterizing every page
    pub preserve_text: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: CompressionLevel::Medium,
            preserve_text: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageTreatment {
    Preserved,
    Rasterized,
}

/// Per-page outcome of [`compress_pages`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageDecisions {
    pub treatments: Vec<PageTreatment>,
}

impl PageDecisions {
    pub fn preserved(&self) -> usize {
        self.count(PageTreatment::Preserved)
    }

    pub fn rasterized(&self) -> usize {
        self.count(PageTreatment::Rasterized)
    }

    fn count(&self, treatment: PageTreatment) -> usize {
        self.treatments.iter().filter(|t| **t == treatment).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionReport {
    pub original_size: usize,
    pub compressed_size: usize,
    /// Negative when the output grew
    pub percent_saved: f64,
    pub preserved_pages: usize,
    pub rasterized_pages: usize,
}

impl CompressionReport {
    pub fn new(original_size: usize, compressed_size: usize, decisions: &PageDecisions) -> Self {
        let percent_saved = if original_size == 0 {
            0.0
        } else {
            (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0
        };
        Self {
            original_size,
            compressed_size,
            percent_saved,
            preserved_pages: decisions.preserved(),
            rasterized_pages: decisions.rasterized(),
        }
    }
}

/// A page of the working document and the render-handle page it shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressTarget {
    pub page_id: ObjectId,
    pub render_page: usize,
}

/// Decide and apply the treatment for every target page of `doc`, in order.
///
/// Text runs come from the render handle; when it cannot extract text the
/// page's own content stream is counted, and when that fails too the page
/// is treated as an image page.
pub fn compress_pages(
    doc: &mut Document,
    targets: &[CompressTarget],
    render: &dyn RenderHandle,
    options: CompressOptions,
    text_run_threshold: usize,
    queue: &mut TaskQueue<'_>,
) -> Result<PageDecisions> {
    let settings = options.level.settings();
    queue.add_tasks(targets.len());
    let mut decisions = PageDecisions::default();

    for (i, target) in targets.iter().enumerate() {
        let treatment = queue.run(&format!("Compressing page {}", i + 1), || {
            if options.preserve_text {
                let runs = match render.text_run_count(target.render_page) {
                    Ok(runs) => runs,
                    Err(_) => count_text_runs(doc, target.page_id).unwrap_or(0),
                };
                if runs > text_run_threshold {
                    debug!(page = i + 1, runs, "Keeping text page");
                    return Ok(PageTreatment::Preserved);
                }
                debug!(page = i + 1, runs, "Rasterizing image page");
            }
            rasterize_page(doc, target, render, settings)
                .map_err(|e| PdfEditError::Compression(format!("Page {}: {}", i + 1, e)))?;
            Ok(PageTreatment::Rasterized)
        })?;
        decisions.treatments.push(treatment);
    }
    Ok(decisions)
}

/// Replace a page's content with a JPEG of its rendering. The page keeps
/// its boxes, rotation and annotations.
fn rasterize_page(
    doc: &mut Document,
    target: &CompressTarget,
    render: &dyn RenderHandle,
    settings: CompressionSettings,
) -> Result<()> {
    let bitmap = render_page(render, target.render_page, settings.scale)?;
    let jpeg = encode_jpeg(&bitmap, settings.quality)?;
    let image = embed_jpeg(doc, &jpeg)?;

    let [x0, y0, x1, y1] = page_box(doc, target.page_id);
    let content_id = doc.add_object(Stream::new(
        Dictionary::new(),
        draw_image_ops("Im0", x0, y0, x1 - x0, y1 - y0),
    ));
    let resources = Dictionary::from_iter(vec![(
        "XObject",
        Object::Dictionary(Dictionary::from_iter(vec![(
            "Im0",
            Object::Reference(image.id),
        )])),
    )]);

    let page = doc.get_dictionary_mut(target.page_id)?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Reference(content_id));
    page.remove(b"Group");
    Ok(())
}

/// Compress a whole document on its own, reporting the size saved
pub fn compress_pdf(
    doc: &StructuralDocument,
    render: &dyn RenderHandle,
    options: CompressOptions,
    text_run_threshold: usize,
    queue: &mut TaskQueue<'_>,
) -> Result<(Vec<u8>, CompressionReport)> {
    if render.page_count() != doc.page_count() {
        return Err(PdfEditError::Compression(format!(
            "Renderer sees {} pages, document has {}",
            render.page_count(),
            doc.page_count()
        )));
    }

    let sources = [doc.inner()];
    let picks: Vec<PagePick> = (0..doc.page_count()).map(|p| PagePick::new(0, p)).collect();
    let mut assembled = PageAssembler::new(&sources)
        .with_options(AssembleOptions { keep_forms: true })
        .assemble(&picks)?;
    let targets: Vec<CompressTarget> = assembled
        .pages
        .iter()
        .enumerate()
        .map(|(i, &page_id)| CompressTarget {
            page_id,
            render_page: i,
        })
        .collect();

    let decisions = compress_pages(
        &mut assembled.document,
        &targets,
        render,
        options,
        text_run_threshold,
        queue,
    )?;
    assembled.document.prune_objects();
    let bytes = save_document(&mut assembled.document)?;
    let report = CompressionReport::new(doc.original_size(), bytes.len(), &decisions);

    info!(
        level = ?options.level,
        preserve_text = options.preserve_text,
        original = report.original_size,
        compressed = report.compressed_size,
        percent_saved = report.percent_saved,
        "Compressed document"
    );
    Ok((bytes, report))
}
