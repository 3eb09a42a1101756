//! Editing session
//!
//! Owns everything for one open document: the structural and render
//! handles, the page collection, the annotation store, undo history and the
//! font cache. Every model mutation goes through a method here and ends in
//! a history commit.

use crate::config::EngineConfig;
use crate::coords::{point_to_base, point_to_display, BasePoint, DisplayPoint};
use crate::document::{LoadedDocument, StructuralDocument};
use crate::error::{PdfEditError, Result};
use crate::export::{export_document, ExportInput, ExportOptions, ExportOutput};
use crate::fonts::{default_fetcher, embed, remote_family, FontCache, FontFetcher, FontKey, FontResolver};
use crate::forms::discover_form_fields;
use crate::history::History;
use crate::model::{AnnotationId, AnnotationStore, FieldValue, NewText, PageId, TextStyle};
use crate::pages::{PageCollection, PageInfo};
use crate::render::{RenderService, RenderedPage};
use crate::task::TaskQueue;
use tracing::{debug, info, warn};

/// Undoable model state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub pages: PageCollection,
    pub annotations: AnnotationStore,
}

/// A freehand stroke still being drawn
#[derive(Debug, Clone)]
struct ActiveStroke {
    page_id: PageId,
    points: Vec<BasePoint>,
    color: String,
    line_width: f64,
}

pub struct EditSession {
    config: EngineConfig,
    document: StructuralDocument,
    render: RenderService,
    pages: PageCollection,
    annotations: AnnotationStore,
    history: History<SessionSnapshot>,
    fonts: FontCache,
    fetcher: Box<dyn FontFetcher>,
    zoom: f64,
    /// Index into the page collection
    current: usize,
    stroke: Option<ActiveStroke>,
}

impl EditSession {
    /// Start editing a loaded PDF. Image files have no structural handle
    /// and cannot be edited.
    pub fn open(config: EngineConfig, loaded: LoadedDocument) -> Result<Self> {
        config.validate()?;
        let document = loaded.structure.ok_or_else(|| {
            PdfEditError::InvalidInput(format!(
                "Only PDF documents can be edited, got {}",
                loaded.kind.extension()
            ))
        })?;

        let pages = PageCollection::from_page_count(document.page_count());
        let annotations = AnnotationStore::with_form_fields(discover_form_fields(document.inner()));
        let history = History::new(SessionSnapshot {
            pages: pages.clone(),
            annotations: annotations.clone(),
        });
        info!(
            pages = pages.len(),
            form_fields = annotations.form_fields().len(),
            "Opened editing session"
        );

        Ok(Self {
            render: RenderService::new(loaded.render, config.base_scale),
            fetcher: default_fetcher(&config),
            fonts: FontCache::new(),
            zoom: 1.0,
            current: 0,
            stroke: None,
            config,
            document,
            pages,
            annotations,
            history,
        })
    }

    /// Replace the font fetcher used during export
    pub fn with_font_fetcher(mut self, fetcher: Box<dyn FontFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn document(&self) -> &StructuralDocument {
        &self.document
    }

    pub fn pages(&self) -> &PageCollection {
        &self.pages
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn font_cache(&self) -> &FontCache {
        &self.fonts
    }

    // History

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            pages: self.pages.clone(),
            annotations: self.annotations.clone(),
        }
    }

    fn commit(&mut self) {
        let snapshot = self.snapshot();
        self.history.commit(snapshot);
    }

    fn restore(&mut self, snapshot: SessionSnapshot) {
        self.history.begin_replay();
        let mut pages = snapshot.pages;
        pages.adopt_thumbnails(&self.pages);
        self.pages = pages;
        self.annotations = snapshot.annotations;
        self.stroke = None;
        self.clamp_current();
        self.history.end_replay();
    }

    /// Step back one edit. Returns `false` at the oldest state.
    pub fn undo(&mut self) -> bool {
        match self.history.undo().cloned() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo().cloned() {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // Navigation and zoom

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> Option<&PageInfo> {
        self.pages.pages().get(self.current)
    }

    pub fn go_to(&mut self, index: usize) -> Result<()> {
        if index >= self.pages.len() {
            return Err(PdfEditError::InvalidInput(format!(
                "Page {} is out of range (1-{})",
                index + 1,
                self.pages.len()
            )));
        }
        self.current = index;
        Ok(())
    }

    pub fn next_page(&mut self) -> bool {
        if self.current + 1 < self.pages.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    pub fn previous_page(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    fn clamp_current(&mut self) {
        self.current = self.current.min(self.pages.len().saturating_sub(1));
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        self.zoom = self.config.clamp_zoom(zoom);
        self.zoom
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.set_zoom(self.zoom + self.config.zoom_step)
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.set_zoom(self.zoom - self.config.zoom_step)
    }

    pub fn reset_zoom(&mut self) -> f64 {
        self.set_zoom(1.0)
    }

    /// Convert a point on the displayed page into base space
    pub fn to_base(&self, point: DisplayPoint) -> BasePoint {
        point_to_base(point, self.zoom)
    }

    pub fn to_display(&self, point: BasePoint) -> DisplayPoint {
        point_to_display(point, self.zoom)
    }

    // Rendering

    fn page(&self, id: PageId) -> Result<&PageInfo> {
        self.pages
            .get(id)
            .ok_or_else(|| PdfEditError::InvalidInput(format!("No page with id {}", id)))
    }

    /// Render a page at the current zoom. Render failures yield a placeholder.
    pub fn render_page(&self, id: PageId) -> Result<RenderedPage> {
        let page = self.page(id)?;
        Ok(self.render.render(page.source_page_index, self.zoom))
    }

    pub fn render_current(&self) -> Option<RenderedPage> {
        self.current_page()
            .map(|page| self.render.render(page.source_page_index, self.zoom))
    }

    /// Page size in base space, before user rotation
    pub fn base_size(&self, id: PageId) -> Result<(f64, f64)> {
        let page = self.page(id)?;
        Ok(self.render.base_size(page.source_page_index)?)
    }

    /// Render missing thumbnails one page at a time. Returns how many were
    /// produced; failures are logged and leave the thumbnail empty.
    pub fn generate_thumbnails(&mut self, queue: &mut TaskQueue<'_>) -> Result<usize> {
        let missing: Vec<(PageId, usize)> = self
            .pages
            .iter()
            .filter(|p| p.thumbnail.is_none())
            .map(|p| (p.id, p.source_page_index))
            .collect();
        queue.add_tasks(missing.len());

        let mut produced = 0;
        for (i, (id, source)) in missing.into_iter().enumerate() {
            let render = &self.render;
            let width = self.config.thumbnail_width;
            let thumbnail = queue.run(&format!("Rendering thumbnail {}", i + 1), || {
                Ok(match render.thumbnail(source, width) {
                    Ok(png) => Some(png),
                    Err(e) => {
                        warn!(page = source + 1, error = %e, "Thumbnail failed");
                        None
                    }
                })
            })?;
            if let Some(png) = thumbnail {
                self.pages.set_thumbnail(id, png)?;
                produced += 1;
            }
        }
        Ok(produced)
    }

    // Page edits

    pub fn rotate_page(&mut self, id: PageId, delta: i32) -> Result<u16> {
        let rotation = self.pages.rotate(id, delta)?;
        self.commit();
        Ok(rotation)
    }

    pub fn move_page(&mut self, from: usize, to: usize) -> Result<()> {
        self.pages.reorder(from, to)?;
        self.commit();
        Ok(())
    }

    pub fn toggle_select(&mut self, id: PageId) -> Result<bool> {
        self.pages.toggle_select(id)
    }

    pub fn select_all(&mut self) {
        self.pages.select_all();
    }

    pub fn deselect_all(&mut self) {
        self.pages.deselect_all();
    }

    /// Delete one page along with its annotations
    pub fn delete_page(&mut self, id: PageId) -> Result<()> {
        self.pages.delete(id)?;
        self.after_page_removal();
        Ok(())
    }

    pub fn delete_selected(&mut self) -> usize {
        let removed = self.pages.delete_selected();
        if removed > 0 {
            self.after_page_removal();
        }
        removed
    }

    fn after_page_removal(&mut self) {
        let pages = &self.pages;
        self.annotations.retain_pages(|id| pages.contains(id));
        if self.stroke.as_ref().is_some_and(|s| !pages.contains(s.page_id)) {
            self.stroke = None;
        }
        self.clamp_current();
        self.commit();
    }

    // Text annotations

    /// Add a text box at a base-space position
    pub fn add_text(&mut self, new: NewText) -> Result<AnnotationId> {
        self.page(new.page_id)?;
        let id = self.annotations.add_text(new);
        self.commit();
        Ok(id)
    }

    /// Add a text box where the user clicked on the displayed page
    pub fn add_text_at(
        &mut self,
        page_id: PageId,
        at: DisplayPoint,
        text: impl Into<String>,
        style: TextStyle,
    ) -> Result<AnnotationId> {
        let base = self.to_base(at);
        self.add_text(NewText {
            page_id,
            x: base.x,
            y: base.y,
            text: text.into(),
            style,
        })
    }

    pub fn set_text(&mut self, id: AnnotationId, text: impl Into<String>) -> Result<()> {
        self.annotations.text_mut(id)?.text = text.into();
        self.commit();
        Ok(())
    }

    pub fn move_text(&mut self, id: AnnotationId, to: BasePoint) -> Result<()> {
        let annotation = self.annotations.text_mut(id)?;
        annotation.x = to.x;
        annotation.y = to.y;
        self.commit();
        Ok(())
    }

    pub fn set_text_style(&mut self, id: AnnotationId, style: TextStyle) -> Result<()> {
        self.annotations.text_mut(id)?.set_style(style);
        self.commit();
        Ok(())
    }

    pub fn delete_text(&mut self, id: AnnotationId) -> bool {
        let removed = self.annotations.remove_text(id);
        if removed {
            self.commit();
        }
        removed
    }

    // Freehand strokes

    /// Start a stroke at a display position. Any unfinished stroke is dropped.
    pub fn begin_stroke(
        &mut self,
        page_id: PageId,
        at: DisplayPoint,
        color: impl Into<String>,
        line_width: f64,
    ) -> Result<()> {
        self.page(page_id)?;
        self.stroke = Some(ActiveStroke {
            page_id,
            points: vec![self.to_base(at)],
            color: color.into(),
            line_width,
        });
        Ok(())
    }

    /// Returns `false` when no stroke is in progress
    pub fn extend_stroke(&mut self, at: DisplayPoint) -> bool {
        let base = self.to_base(at);
        match self.stroke.as_mut() {
            Some(stroke) => {
                stroke.points.push(base);
                true
            }
            None => false,
        }
    }

    /// Finish the stroke. Strokes with fewer than two points are discarded.
    pub fn end_stroke(&mut self) -> Option<AnnotationId> {
        let stroke = self.stroke.take()?;
        let id = self.annotations.add_path(
            stroke.page_id,
            stroke.points,
            &stroke.color,
            stroke.line_width,
        );
        match id {
            Some(_) => self.commit(),
            None => debug!(page_id = stroke.page_id, "Discarded single-point stroke"),
        }
        id
    }

    pub fn delete_path(&mut self, id: AnnotationId) -> bool {
        let removed = self.annotations.remove_path(id);
        if removed {
            self.commit();
        }
        removed
    }

    /// Remove every annotation on a page
    pub fn clear_page(&mut self, id: PageId) -> usize {
        let removed = self.annotations.clear_page(id);
        if removed > 0 {
            self.commit();
        }
        removed
    }

    // Forms

    pub fn set_field_value(&mut self, name: &str, value: FieldValue) -> Result<()> {
        self.annotations.set_field_value(name, value)?;
        self.commit();
        Ok(())
    }

    // Fonts and export

    /// Put a remote font binary into the cache so export does not fetch it
    pub fn preload_font(&mut self, family: &str, bold: bool, italic: bool, data: Vec<u8>) -> Result<()> {
        let remote = remote_family(family).ok_or_else(|| {
            PdfEditError::InvalidInput(format!("{} is not a remote font family", family))
        })?;
        embed::validate_font(remote.display_name, &data)?;
        let key = FontKey::new(remote.display_name, bold, italic);
        debug!(family = remote.display_name, weight = key.weight, italic, "Preloaded font");
        self.fonts.insert(key, data);
        Ok(())
    }

    /// Produce the output document from the current session state
    pub fn export(&mut self, options: &ExportOptions, queue: &mut TaskQueue<'_>) -> Result<ExportOutput> {
        let input = ExportInput {
            source: &self.document,
            render: self.render.handle(),
            pages: &self.pages,
            annotations: &self.annotations,
            base_scale: self.config.base_scale,
            text_run_threshold: self.config.text_run_threshold,
        };
        let mut resolver = FontResolver::new(&mut self.fonts, self.fetcher.as_ref());
        export_document(&input, options, &mut resolver, queue)
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        debug!(cached_fonts = self.fonts.len(), "Closing editing session");
        self.fonts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentKind;
    use crate::error::RenderError;
    use crate::fonts::OfflineFontFetcher;
    use crate::page_tree::test_support::create_test_pdf;
    use crate::render::{PageSize, RasterSurface, RenderHandle};
    use lopdf::Document;
    use pretty_assertions::assert_eq;

    struct Fake {
        pages: usize,
        broken: Option<usize>,
    }

    impl RenderHandle for Fake {
        fn page_count(&self) -> usize {
            self.pages
        }
        fn page_size(&self, page: usize) -> std::result::Result<PageSize, RenderError> {
            if page >= self.pages {
                return Err(RenderError::new(page, "no such page"));
            }
            Ok(PageSize::new(612.0, 792.0))
        }
        fn paint(
            &self,
            page: usize,
            _scale: f64,
            _surface: &mut RasterSurface,
        ) -> std::result::Result<(), RenderError> {
            if self.broken == Some(page) {
                return Err(RenderError::new(page, "corrupt stream"));
            }
            Ok(())
        }
        fn text_run_count(&self, _page: usize) -> std::result::Result<usize, RenderError> {
            Ok(20)
        }
    }

    fn session_with(pages: u32, broken: Option<usize>) -> EditSession {
        let loaded = LoadedDocument {
            kind: DocumentKind::Pdf,
            render: Box::new(Fake {
                pages: pages as usize,
                broken,
            }),
            structure: Some(StructuralDocument::load(&create_test_pdf(pages, "S")).unwrap()),
        };
        EditSession::open(EngineConfig::default(), loaded)
            .unwrap()
            .with_font_fetcher(Box::new(OfflineFontFetcher))
    }

    fn session(pages: u32) -> EditSession {
        session_with(pages, None)
    }

    fn note(page_id: PageId, text: &str) -> NewText {
        NewText {
            page_id,
            x: 10.0,
            y: 20.0,
            text: text.to_string(),
            style: TextStyle::default(),
        }
    }

    #[test]
    fn test_undo_all_edits_restores_initial_state() {
        let mut s = session(3);
        let initial = s.snapshot();

        let id = s.add_text(note(0, "a")).unwrap();
        s.set_text(id, "b").unwrap();
        s.rotate_page(1, 90).unwrap();
        s.move_page(2, 0).unwrap();

        for _ in 0..4 {
            assert!(s.undo());
        }
        assert!(!s.undo());
        assert_eq!(s.snapshot(), initial);
    }

    #[test]
    fn test_new_edit_after_undo_drops_redo() {
        let mut s = session(1);
        s.add_text(note(0, "first")).unwrap();
        s.add_text(note(0, "second")).unwrap();
        assert!(s.undo());
        assert!(s.can_redo());

        s.add_text(note(0, "third")).unwrap();
        assert!(!s.can_redo());
        assert!(!s.redo());
        let texts: Vec<&str> = s.annotations().texts().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "third"]);
    }

    #[test]
    fn test_undo_does_not_record_itself() {
        let mut s = session(1);
        s.add_text(note(0, "a")).unwrap();
        s.add_text(note(0, "b")).unwrap();
        assert!(s.undo());
        assert!(s.undo());
        assert!(s.redo());
        assert!(s.redo());
        assert_eq!(s.annotations().texts().len(), 2);
    }

    #[test]
    fn test_text_added_at_zoom_is_stored_in_base_space() {
        let mut s = session(1);
        s.set_zoom(2.0);
        let id = s
            .add_text_at(0, DisplayPoint::new(200.0, 100.0), "zoomed", TextStyle::default())
            .unwrap();
        s.zoom_out();
        s.reset_zoom();

        let text = s.annotations().text(id).unwrap();
        assert_eq!((text.x, text.y), (100.0, 50.0));
        assert_eq!(s.to_display(BasePoint::new(text.x, text.y)), DisplayPoint::new(100.0, 50.0));
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut s = session(1);
        for _ in 0..50 {
            s.zoom_in();
        }
        assert_eq!(s.zoom(), 3.0);
        for _ in 0..50 {
            s.zoom_out();
        }
        assert_eq!(s.zoom(), 0.25);
    }

    #[test]
    fn test_single_point_stroke_is_discarded() {
        let mut s = session(1);
        s.begin_stroke(0, DisplayPoint::new(5.0, 5.0), "#000000", 2.0).unwrap();
        assert_eq!(s.end_stroke(), None);
        assert!(!s.can_undo());

        s.begin_stroke(0, DisplayPoint::new(5.0, 5.0), "#000000", 2.0).unwrap();
        assert!(s.extend_stroke(DisplayPoint::new(9.0, 9.0)));
        assert!(s.end_stroke().is_some());
        assert_eq!(s.annotations().paths().len(), 1);
        assert!(!s.extend_stroke(DisplayPoint::new(1.0, 1.0)));
    }

    #[test]
    fn test_four_quarter_turns() {
        let mut s = session(1);
        for _ in 0..4 {
            s.rotate_page(0, 90).unwrap();
        }
        assert_eq!(s.pages().get(0).unwrap().rotation, 0);
        assert_eq!(s.rotate_page(0, -90).unwrap(), 270);
    }

    #[test]
    fn test_delete_page_drops_its_annotations_until_undo() {
        let mut s = session(2);
        s.add_text(note(1, "doomed")).unwrap();
        s.go_to(1).unwrap();
        s.delete_page(1).unwrap();
        assert_eq!(s.pages().len(), 1);
        assert!(s.annotations().texts().is_empty());
        assert_eq!(s.current_index(), 0);

        assert!(s.undo());
        assert_eq!(s.pages().len(), 2);
        assert_eq!(s.annotations().texts().len(), 1);
    }

    #[test]
    fn test_text_on_unknown_page_rejected() {
        let mut s = session(1);
        assert!(s.add_text(note(7, "nowhere")).is_err());
    }

    #[test]
    fn test_broken_page_renders_placeholder() {
        let s = session_with(2, Some(1));
        assert!(!s.render_page(0).unwrap().is_placeholder());
        assert!(s.render_page(1).unwrap().is_placeholder());
    }

    #[test]
    fn test_thumbnails_survive_failures_and_undo() {
        let mut s = session_with(3, Some(1));
        let produced = s.generate_thumbnails(&mut TaskQueue::new(0)).unwrap();
        assert_eq!(produced, 2);
        assert!(s.pages().get(1).unwrap().thumbnail.is_none());

        s.rotate_page(0, 90).unwrap();
        s.undo();
        assert!(s.pages().get(0).unwrap().thumbnail.is_some());
    }

    #[test]
    fn test_preload_rejects_non_font_data() {
        let mut s = session(1);
        assert!(s.preload_font("Roboto", false, false, b"<html>".to_vec()).is_err());
        assert!(s.preload_font("Helvetica", false, false, vec![0, 1, 0, 0]).is_err());
        assert!(s.font_cache().is_empty());
    }

    #[test]
    fn test_export_reflects_session_edits() {
        let mut s = session(3);
        s.delete_page(2).unwrap();
        s.add_text(note(0, "hello")).unwrap();
        let out = s.export(&ExportOptions::default(), &mut TaskQueue::new(0)).unwrap();
        assert_eq!(out.page_count, 2);
        assert_eq!(out.texts_drawn, 1);
        assert_eq!(Document::load_mem(&out.bytes).unwrap().get_pages().len(), 2);
    }

    #[test]
    fn test_image_documents_cannot_be_edited() {
        let image = image::RgbaImage::new(4, 4);
        let loaded = LoadedDocument {
            kind: DocumentKind::Png,
            render: Box::new(crate::render::ImageRenderHandle::from_image(image)),
            structure: None,
        };
        assert!(EditSession::open(EngineConfig::default(), loaded).is_err());
    }
}
