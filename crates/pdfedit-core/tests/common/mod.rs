//! Shared fixtures: in-memory PDFs and a fake renderer
#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pdfedit_core::{
    EngineConfig, LoadedDocument, PageSize, PdfEditError, RasterSurface, RenderBackend, RenderError,
    RenderHandle,
};

/// Letter-sized PDF. Page `i` shows `runs[i]` text runs (default one),
/// each reading `<label>-<page>-<run>`.
pub fn build_pdf(pages: u32, label: &str, runs: &[usize]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids = Vec::new();
    for i in 0..pages {
        let count = runs.get(i as usize).copied().unwrap_or(1);
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 11.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        for run in 0..count {
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(
                    format!("{}-{}-{}", label, i + 1, run).into_bytes(),
                    StringFormat::Literal,
                )],
            ));
            operations.push(Operation::new("Td", vec![0.into(), (-13).into()]));
        }
        operations.push(Operation::new("ET", vec![]));
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            Content { operations }.encode().unwrap(),
        ));
        kids.push(Object::Reference(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        })));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => pages as i64,
            "Kids" => kids,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn simple_pdf(pages: u32, label: &str) -> Vec<u8> {
    build_pdf(pages, label, &[])
}

/// Text of every `Tj` on a page, in content order
pub fn page_texts(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let content = doc.get_page_content(page_id).unwrap();
    Content::decode(&content)
        .unwrap()
        .operations
        .into_iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        })
        .collect()
}

/// First text run of every page, in page order
pub fn first_runs(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|id| page_texts(&doc, *id).into_iter().next().unwrap_or_default())
        .collect()
}

/// Renderer that paints a noisy pattern and reports text runs counted
/// from the content streams
pub struct FakeHandle {
    runs: Vec<usize>,
}

impl RenderHandle for FakeHandle {
    fn page_count(&self) -> usize {
        self.runs.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        if page >= self.runs.len() {
            return Err(RenderError::new(page, "no such page"));
        }
        Ok(PageSize::new(612.0, 792.0))
    }

    fn paint(&self, page: usize, _scale: f64, surface: &mut RasterSurface) -> Result<(), RenderError> {
        for (x, y, pixel) in surface.pixels_mut().enumerate_pixels_mut() {
            let v = ((x * 7 + y * 13 + page as u32 * 31) % 251) as u8;
            *pixel = image::Rgba([v, v / 2, 255 - v, 255]);
        }
        Ok(())
    }

    fn text_run_count(&self, page: usize) -> Result<usize, RenderError> {
        self.runs
            .get(page)
            .copied()
            .ok_or_else(|| RenderError::new(page, "no such page"))
    }
}

pub struct FakeBackend;

impl RenderBackend for FakeBackend {
    fn open(&self, bytes: &[u8]) -> pdfedit_core::Result<Box<dyn RenderHandle>> {
        let doc = Document::load_mem(bytes).map_err(|e| PdfEditError::DocumentLoad(e.to_string()))?;
        let runs = doc
            .get_pages()
            .values()
            .map(|id| page_texts(&doc, *id).len())
            .collect();
        Ok(Box::new(FakeHandle { runs }))
    }
}

/// Route engine logs through the test harness; `RUST_LOG=debug` shows them
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn load(bytes: &[u8]) -> LoadedDocument {
    init_logging();
    pdfedit_core::DocumentLoader::new(&FakeBackend)
        .load(bytes, Some("application/pdf"))
        .unwrap()
}

pub fn session(bytes: &[u8]) -> pdfedit_core::EditSession {
    pdfedit_core::EditSession::open(EngineConfig::default(), load(bytes))
        .unwrap()
        .with_font_fetcher(Box::new(pdfedit_core::fonts::OfflineFontFetcher))
}
