//! Export
//!
//! The single place that turns session state into output bytes. Steps, in
//! order:
//! 1. Assemble the page collection (order, rotation, deletions)
//! 2. Optionally compress the assembled pages
//! 3. Draw text annotations, flipping base-space y into PDF space
//! 4. Draw freehand paths
//! 5. Write form values back

use crate::assembly::{AssembleOptions, PageAssembler, PagePick};
use crate::compress::{compress_pages, CompressOptions, CompressTarget, CompressionReport};
use crate::coords::{base_to_pdf, BasePoint};
use crate::document::StructuralDocument;
use crate::error::{PdfEditError, Result};
use crate::fonts::embed::to_winansi_bytes;
use crate::fonts::{DocumentFonts, FontResolver, ResolvedFont};
use crate::forms::{write_form_values, FormWriteReport};
use crate::model::{AnnotationStore, DrawPath, PageId, Rgb, TextAnnotation};
use crate::page_tree::{add_resource, append_content, own_resources, page_box, save_document, unused_resource_name};
use crate::pages::PageCollection;
use crate::render::RenderHandle;
use crate::task::TaskQueue;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Line spacing as a multiple of the font size
const LINE_HEIGHT: f64 = 1.2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Compress pages before annotations are drawn
    pub compression: Option<CompressOptions>,
}

/// Everything export reads from an editing session
pub struct ExportInput<'a> {
    pub source: &'a StructuralDocument,
    pub render: &'a dyn RenderHandle,
    pub pages: &'a PageCollection,
    pub annotations: &'a AnnotationStore,
    pub base_scale: f64,
    pub text_run_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportOutput {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub texts_drawn: usize,
    pub paths_drawn: usize,
    pub fonts_embedded: usize,
    pub compression: Option<CompressionReport>,
    pub form_fields_written: usize,
    pub form_fields_skipped: Vec<String>,
}

pub fn export_document(
    input: &ExportInput<'_>,
    options: &ExportOptions,
    fonts: &mut FontResolver<'_>,
    queue: &mut TaskQueue<'_>,
) -> Result<ExportOutput> {
    if input.pages.is_empty() {
        return Err(PdfEditError::InvalidInput("No pages left to export".into()));
    }

    // 1. Page collection
    let sources = [input.source.inner()];
    let picks: Vec<PagePick> = input
        .pages
        .iter()
        .map(|page| PagePick::new(0, page.source_page_index).rotated(page.rotation))
        .collect();
    let assembled = PageAssembler::new(&sources)
        .with_options(AssembleOptions { keep_forms: true })
        .assemble(&picks)?;
    let mut doc = assembled.document;
    let page_objects: HashMap<PageId, ObjectId> = input
        .pages
        .iter()
        .map(|page| page.id)
        .zip(assembled.pages.iter().copied())
        .collect();

    // 2. Compression
    let mut decisions = None;
    if let Some(compress) = options.compression {
        let targets: Vec<CompressTarget> = input
            .pages
            .iter()
            .zip(assembled.pages.iter())
            .map(|(page, &page_id)| CompressTarget {
                page_id,
                render_page: page.source_page_index,
            })
            .collect();
        decisions = Some(compress_pages(
            &mut doc,
            &targets,
            input.render,
            compress,
            input.text_run_threshold,
            queue,
        )?);
    }

    // 3 + 4. Annotations, one appended content stream per page
    let texts: Vec<&TextAnnotation> = input
        .annotations
        .texts()
        .iter()
        .filter(|t| !t.text.trim().is_empty() && page_objects.contains_key(&t.page_id))
        .collect();
    let paths: Vec<&DrawPath> = input
        .annotations
        .paths()
        .iter()
        .filter(|p| p.is_drawable() && page_objects.contains_key(&p.page_id))
        .collect();

    let resolved = resolve_fonts(&texts, fonts, queue)?;
    let mut embedded = DocumentFonts::new();

    for page in input.pages.iter() {
        let page_texts: Vec<&&TextAnnotation> = texts.iter().filter(|t| t.page_id == page.id).collect();
        let page_paths: Vec<&&DrawPath> = paths.iter().filter(|p| p.page_id == page.id).collect();
        if page_texts.is_empty() && page_paths.is_empty() {
            continue;
        }
        let page_id = page_objects[&page.id];
        own_resources(&mut doc, page_id)?;
        let [x0, y0, x1, y1] = page_box(&doc, page_id);
        let placement = Placement {
            origin_x: x0,
            origin_y: y0,
            height: y1 - y0,
            base_scale: input.base_scale,
        };

        let mut operations = Vec::new();
        let mut resource_names: HashMap<ObjectId, String> = HashMap::new();
        for text in page_texts {
            let font = &resolved[&font_request(text)];
            let font_id = embedded.object_for(&mut doc, font)?;
            let resource = match resource_names.get(&font_id) {
                Some(name) => name.clone(),
                None => {
                    let name = unused_resource_name(&doc, page_id, "Font", "PEF");
                    add_resource(&mut doc, page_id, "Font", &name, font_id)?;
                    resource_names.insert(font_id, name.clone());
                    name
                }
            };
            operations.extend(text_operations(text, &resource, &placement));
        }
        for path in page_paths {
            operations.extend(path_operations(path, &placement));
        }

        let content = Content { operations }.encode()?;
        append_content(&mut doc, page_id, content)?;
    }

    // 5. Form fields
    let forms: FormWriteReport = write_form_values(&mut doc, input.annotations.form_fields());

    let bytes = save_document(&mut doc)?;
    let compression = decisions.map(|d| CompressionReport::new(input.source.original_size(), bytes.len(), &d));
    let output = ExportOutput {
        page_count: assembled.pages.len(),
        texts_drawn: texts.len(),
        paths_drawn: paths.len(),
        fonts_embedded: embedded.len(),
        compression,
        form_fields_written: forms.written,
        form_fields_skipped: forms.skipped,
        bytes,
    };
    info!(
        pages = output.page_count,
        texts = output.texts_drawn,
        paths = output.paths_drawn,
        fonts = output.fonts_embedded,
        bytes = output.bytes.len(),
        "Exported document"
    );
    Ok(output)
}

type FontRequest = (String, bool, bool);

fn font_request(text: &TextAnnotation) -> FontRequest {
    (text.font_family.clone(), text.bold, text.italic)
}

/// Resolve each distinct font once. Lookups that may hit the network are
/// queue tasks.
fn resolve_fonts(
    texts: &[&TextAnnotation],
    fonts: &mut FontResolver<'_>,
    queue: &mut TaskQueue<'_>,
) -> Result<HashMap<FontRequest, ResolvedFont>> {
    let mut resolved = HashMap::new();
    for text in texts {
        let request = font_request(text);
        if resolved.contains_key(&request) {
            continue;
        }
        let (family, bold, italic) = (&request.0, request.1, request.2);
        let font = if fonts.needs_fetch(family, bold, italic) {
            queue.add_tasks(1);
            queue.run(&format!("Loading font {}", family), || {
                Ok(fonts.resolve(family, bold, italic))
            })?
        } else {
            fonts.resolve(family, bold, italic)
        };
        debug!(family = %family, bold, italic, builtin = font.is_builtin(), "Resolved font");
        resolved.insert(request, font);
    }
    Ok(resolved)
}

/// Maps base-space points onto one output page
struct Placement {
    origin_x: f64,
    origin_y: f64,
    height: f64,
    base_scale: f64,
}

impl Placement {
    fn to_pdf(&self, x: f64, y: f64) -> (f64, f64) {
        let (px, py) = base_to_pdf(BasePoint::new(x, y), self.base_scale, self.height);
        (self.origin_x + px, self.origin_y + py)
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn color_operands(color: &str) -> Vec<Object> {
    let rgb = Rgb::from_hex(color);
    vec![real(rgb.r as f64), real(rgb.g as f64), real(rgb.b as f64)]
}

fn text_operations(text: &TextAnnotation, font_resource: &str, placement: &Placement) -> Vec<Operation> {
    let (x, y) = placement.to_pdf(text.x, text.y);
    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font_resource.as_bytes().to_vec()), real(text.font_size)],
        ),
        Operation::new("rg", color_operands(&text.color)),
        Operation::new("Td", vec![real(x), real(y)]),
    ];
    let leading = text.font_size * LINE_HEIGHT;
    for (i, line) in text.text.lines().enumerate() {
        if i > 0 {
            ops.push(Operation::new("Td", vec![real(0.0), real(-leading)]));
        }
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(to_winansi_bytes(line), StringFormat::Literal)],
        ));
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

fn path_operations(path: &DrawPath, placement: &Placement) -> Vec<Operation> {
    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new("w", vec![real(path.line_width)]),
        // Round caps and joins
        Operation::new("J", vec![Object::Integer(1)]),
        Operation::new("j", vec![Object::Integer(1)]),
        Operation::new("RG", color_operands(&path.color)),
    ];
    for (i, point) in path.points.iter().enumerate() {
        let (x, y) = placement.to_pdf(point.x, point.y);
        let operator = if i == 0 { "m" } else { "l" };
        ops.push(Operation::new(operator, vec![real(x), real(y)]));
    }
    ops.push(Operation::new("S", vec![]));
    ops.push(Operation::new("Q", vec![]));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionLevel;
    use crate::error::RenderError;
    use crate::fonts::{FontCache, OfflineFontFetcher};
    use crate::model::{FieldValue, NewText, TextStyle};
    use crate::page_tree::test_support::{create_test_pdf, create_test_pdf_with_runs, page_texts};
    use crate::render::{PageSize, RasterSurface};
    use pretty_assertions::assert_eq;

    struct Blank(usize);

    impl RenderHandle for Blank {
        fn page_count(&self) -> usize {
            self.0
        }
        fn page_size(&self, _page: usize) -> std::result::Result<PageSize, RenderError> {
            Ok(PageSize::new(612.0, 792.0))
        }
        fn paint(
            &self,
            _page: usize,
            _scale: f64,
            _surface: &mut RasterSurface,
        ) -> std::result::Result<(), RenderError> {
            Ok(())
        }
        fn text_run_count(&self, _page: usize) -> std::result::Result<usize, RenderError> {
            Err(RenderError::new(0, "no text layer"))
        }
    }

    fn run_export(
        source: &StructuralDocument,
        pages: &PageCollection,
        annotations: &AnnotationStore,
        options: ExportOptions,
    ) -> ExportOutput {
        let render = Blank(source.page_count());
        let input = ExportInput {
            source,
            render: &render,
            pages,
            annotations,
            base_scale: 1.5,
            text_run_threshold: 10,
        };
        let mut cache = FontCache::new();
        let fetcher = OfflineFontFetcher;
        let mut resolver = FontResolver::new(&mut cache, &fetcher);
        export_document(&input, &options, &mut resolver, &mut TaskQueue::new(0)).unwrap()
    }

    fn ops(doc: &Document, page_id: ObjectId) -> Vec<Operation> {
        Content::decode(&doc.get_page_content(page_id).unwrap())
            .unwrap()
            .operations
    }

    fn floats(op: &Operation) -> Vec<f64> {
        op.operands
            .iter()
            .map(|o| match o {
                Object::Real(r) => *r as f64,
                Object::Integer(i) => *i as f64,
                _ => f64::NAN,
            })
            .collect()
    }

    #[test]
    fn test_export_without_edits_keeps_page_count() {
        let source = StructuralDocument::load(&create_test_pdf(4, "E")).unwrap();
        let pages = PageCollection::from_page_count(4);
        let out = run_export(&source, &pages, &AnnotationStore::new(), ExportOptions::default());
        assert_eq!(out.page_count, 4);
        assert_eq!(Document::load_mem(&out.bytes).unwrap().get_pages().len(), 4);
    }

    #[test]
    fn test_export_applies_order_rotation_and_deletion() {
        let source = StructuralDocument::load(&create_test_pdf(3, "R")).unwrap();
        let mut pages = PageCollection::from_page_count(3);
        pages.reorder(2, 0).unwrap();
        pages.rotate(2, 90).unwrap();
        pages.delete(1).unwrap();

        let out = run_export(&source, &pages, &AnnotationStore::new(), ExportOptions::default());
        let doc = Document::load_mem(&out.bytes).unwrap();
        let ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        assert_eq!(page_texts(&doc, ids[0]), vec!["R-Page-3-Run-0"]);
        assert_eq!(page_texts(&doc, ids[1]), vec!["R-Page-1-Run-0"]);
        assert_eq!(
            doc.get_dictionary(ids[0]).unwrap().get(b"Rotate").unwrap().as_i64().unwrap(),
            90
        );
    }

    #[test]
    fn test_text_is_flipped_into_pdf_space() {
        let source = StructuralDocument::load(&create_test_pdf(1, "T")).unwrap();
        let pages = PageCollection::from_page_count(1);
        let mut store = AnnotationStore::new();
        store.add_text(NewText {
            page_id: 0,
            x: 150.0,
            y: 300.0,
            text: "Hello\nWorld".into(),
            style: TextStyle {
                color: "#ff0000".into(),
                ..TextStyle::default()
            },
        });
        store.add_text(NewText {
            page_id: 0,
            x: 10.0,
            y: 10.0,
            text: "   ".into(),
            style: TextStyle::default(),
        });

        let out = run_export(&source, &pages, &store, ExportOptions::default());
        assert_eq!(out.texts_drawn, 1);
        assert_eq!(out.fonts_embedded, 1);

        let doc = Document::load_mem(&out.bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let operations = ops(&doc, page_id);

        let td = operations.iter().find(|op| op.operator == "Td" && floats(op) == vec![100.0, 592.0]);
        assert!(td.is_some(), "first line at (150/1.5, 792 - 300/1.5)");
        let rg = operations.iter().find(|op| op.operator == "rg").unwrap();
        assert_eq!(floats(rg), vec![1.0, 0.0, 0.0]);
        let texts = page_texts(&doc, page_id);
        assert!(texts.contains(&"Hello".to_string()));
        assert!(texts.contains(&"World".to_string()));
    }

    #[test]
    fn test_paths_need_two_points() {
        let source = StructuralDocument::load(&create_test_pdf(1, "P")).unwrap();
        let pages = PageCollection::from_page_count(1);
        let mut store = AnnotationStore::new();
        store.add_path(
            0,
            vec![BasePoint::new(0.0, 0.0), BasePoint::new(30.0, 60.0), BasePoint::new(60.0, 0.0)],
            "#0000ff",
            2.0,
        );

        let out = run_export(&source, &pages, &store, ExportOptions::default());
        assert_eq!(out.paths_drawn, 1);
        let doc = Document::load_mem(&out.bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let operations = ops(&doc, page_id);
        assert_eq!(operations.iter().filter(|op| op.operator == "m").count(), 1);
        assert_eq!(operations.iter().filter(|op| op.operator == "l").count(), 2);
        let moveto = operations.iter().find(|op| op.operator == "m").unwrap();
        assert_eq!(floats(moveto), vec![0.0, 792.0]);
    }

    #[test]
    fn test_annotations_follow_their_page() {
        let source = StructuralDocument::load(&create_test_pdf(2, "F")).unwrap();
        let mut pages = PageCollection::from_page_count(2);
        pages.reorder(1, 0).unwrap();
        let mut store = AnnotationStore::new();
        store.add_text(NewText {
            page_id: 1,
            x: 0.0,
            y: 0.0,
            text: "on second".into(),
            style: TextStyle::default(),
        });

        let out = run_export(&source, &pages, &store, ExportOptions::default());
        let doc = Document::load_mem(&out.bytes).unwrap();
        let ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        assert!(page_texts(&doc, ids[0]).contains(&"on second".to_string()));
        assert!(!page_texts(&doc, ids[1]).contains(&"on second".to_string()));
    }

    #[test]
    fn test_remote_font_falls_back_when_offline() {
        let source = StructuralDocument::load(&create_test_pdf(1, "G")).unwrap();
        let pages = PageCollection::from_page_count(1);
        let mut store = AnnotationStore::new();
        store.add_text(NewText {
            page_id: 0,
            x: 0.0,
            y: 20.0,
            text: "serif".into(),
            style: TextStyle {
                font_family: "Playfair Display".into(),
                bold: true,
                ..TextStyle::default()
            },
        });

        let out = run_export(&source, &pages, &store, ExportOptions::default());
        let doc = Document::load_mem(&out.bytes).unwrap();
        let has_times_bold = doc.objects.values().any(|o| {
            o.as_dict()
                .ok()
                .and_then(|d| d.get(b"BaseFont").ok())
                .and_then(|b| b.as_name().ok())
                == Some(b"Times-Bold".as_slice())
        });
        assert!(has_times_bold);
    }

    #[test]
    fn test_compression_runs_before_annotations() {
        let source =
            StructuralDocument::load(&create_test_pdf_with_runs(2, "Z", &[20, 0])).unwrap();
        let pages = PageCollection::from_page_count(2);
        let mut store = AnnotationStore::new();
        store.add_text(NewText {
            page_id: 1,
            x: 30.0,
            y: 30.0,
            text: "kept".into(),
            style: TextStyle::default(),
        });
        let options = ExportOptions {
            compression: Some(CompressOptions {
                level: CompressionLevel::Aggressive,
                preserve_text: true,
            }),
        };

        let out = run_export(&source, &pages, &store, options);
        let report = out.compression.clone().unwrap();
        assert_eq!(report.preserved_pages, 1);
        assert_eq!(report.rasterized_pages, 1);

        let doc = Document::load_mem(&out.bytes).unwrap();
        let ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        assert_eq!(page_texts(&doc, ids[0]).len(), 20);
        assert_eq!(page_texts(&doc, ids[1]), vec!["kept"]);
    }

    #[test]
    fn test_form_values_written_on_export() {
        let source =
            StructuralDocument::load(&crate::forms::test_support::create_form_pdf()).unwrap();
        let pages = PageCollection::from_page_count(2);
        let mut store = AnnotationStore::with_form_fields(crate::forms::discover_form_fields(
            source.inner(),
        ));
        store.set_field_value("agree", FieldValue::Bool(true)).unwrap();
        store.set_field_value("size", FieldValue::Text("S".into())).unwrap();

        let out = run_export(&source, &pages, &store, ExportOptions::default());
        assert_eq!(out.form_fields_written, 4);
        let doc = Document::load_mem(&out.bytes).unwrap();
        let fields = crate::forms::discover_form_fields(&doc);
        let agree = fields.iter().find(|f| f.name == "agree").unwrap();
        assert_eq!(agree.value, FieldValue::Bool(true));
    }

    #[test]
    fn test_empty_collection_rejected() {
        let source = StructuralDocument::load(&create_test_pdf(1, "X")).unwrap();
        let mut pages = PageCollection::from_page_count(1);
        pages.delete(0).unwrap();
        let render = Blank(1);
        let store = AnnotationStore::new();
        let input = ExportInput {
            source: &source,
            render: &render,
            pages: &pages,
            annotations: &store,
            base_scale: 1.5,
            text_run_threshold: 10,
        };
        let mut cache = FontCache::new();
        let mut resolver = FontResolver::new(&mut cache, &OfflineFontFetcher);
        assert!(export_document(&input, &ExportOptions::default(), &mut resolver, &mut TaskQueue::new(0))
            .is_err());
    }
}
