//! Page rendering
//!
//! Rasterization itself is delegated to a [`RenderHandle`] (the host's PDF
//! renderer, or [`ImageRenderHandle`] for image inputs). This module owns
//! the scale math, the per-call raster surface and bitmap encoding.

use crate::error::{PdfEditError, RenderError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbImage};
use lopdf::content::Content;
use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, warn};

pub type RgbaImage = image::RgbaImage;

/// Unrotated page size in PDF points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Bitmap dimensions for this page at `scale`, never smaller than 1x1
    pub fn pixels_at(&self, scale: f64) -> (u32, u32) {
        let w = (self.width * scale).round().max(1.0);
        let h = (self.height * scale).round().max(1.0);
        (w as u32, h as u32)
    }
}

/// A white bitmap acquired for the duration of one render call
pub struct RasterSurface {
    image: RgbaImage,
}

impl RasterSurface {
    pub fn acquire(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([255, 255, 255, 255])),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Copy a tightly packed RGBA buffer of the surface's size into it
    pub fn write_rgba(&mut self, rgba: &[u8]) -> std::result::Result<(), String> {
        let expected = self.image.width() as usize * self.image.height() as usize * 4;
        if rgba.len() != expected {
            return Err(format!(
                "expected {} bytes of RGBA, got {}",
                expected,
                rgba.len()
            ));
        }
        self.image.copy_from_slice(rgba);
        Ok(())
    }

    pub fn release(self) -> RgbaImage {
        self.image
    }
}

/// Read-only view of a document used to produce bitmaps
pub trait RenderHandle {
    fn page_count(&self) -> usize;

    /// Size of the visible page box in points, ignoring /Rotate
    fn page_size(&self, page: usize) -> std::result::Result<PageSize, RenderError>;

    /// Paint `page` at `scale` into a surface sized by [`PageSize::pixels_at`]
    fn paint(
        &self,
        page: usize,
        scale: f64,
        surface: &mut RasterSurface,
    ) -> std::result::Result<(), RenderError>;

    /// Number of text runs the renderer extracts from the page
    fn text_run_count(&self, page: usize) -> std::result::Result<usize, RenderError>;
}

/// Opens render handles for PDF buffers
pub trait RenderBackend {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn RenderHandle>>;
}

/// Render one page at an absolute scale
pub fn render_page(
    handle: &dyn RenderHandle,
    page: usize,
    scale: f64,
) -> std::result::Result<RgbaImage, RenderError> {
    if page >= handle.page_count() {
        return Err(RenderError::new(page, "page index out of range"));
    }
    let (width, height) = handle.page_size(page)?.pixels_at(scale);
    let mut surface = RasterSurface::acquire(width, height);
    handle.paint(page, scale, &mut surface)?;
    Ok(surface.release())
}

/// Result of a display render: a bitmap, or a numbered placeholder when the
/// page could not be rasterized
#[derive(Debug, Clone)]
pub enum RenderedPage {
    Bitmap(RgbaImage),
    Placeholder {
        /// 1-based
        page_number: usize,
        width: u32,
        height: u32,
    },
}

impl RenderedPage {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, RenderedPage::Placeholder { .. })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            RenderedPage::Bitmap(image) => image.dimensions(),
            RenderedPage::Placeholder { width, height, .. } => (*width, *height),
        }
    }
}

/// Renders pages at `base_scale * zoom` for the editor view
pub struct RenderService {
    handle: Box<dyn RenderHandle>,
    base_scale: f64,
}

impl RenderService {
    pub fn new(handle: Box<dyn RenderHandle>, base_scale: f64) -> Self {
        Self { handle, base_scale }
    }

    pub fn handle(&self) -> &dyn RenderHandle {
        self.handle.as_ref()
    }

    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    pub fn page_count(&self) -> usize {
        self.handle.page_count()
    }

    /// Page size in base space. Does not depend on zoom.
    pub fn base_size(&self, page: usize) -> std::result::Result<(f64, f64), RenderError> {
        let size = self.handle.page_size(page)?;
        Ok((size.width * self.base_scale, size.height * self.base_scale))
    }

    pub fn render_at(&self, page: usize, scale: f64) -> std::result::Result<RgbaImage, RenderError> {
        render_page(self.handle.as_ref(), page, scale)
    }

    /// Render for display. Failures are logged and yield a placeholder.
    pub fn render(&self, page: usize, zoom: f64) -> RenderedPage {
        let scale = self.base_scale * zoom;
        match self.render_at(page, scale) {
            Ok(bitmap) => RenderedPage::Bitmap(bitmap),
            Err(e) => {
                warn!(page = page + 1, error = %e, "Showing placeholder for page");
                let (width, height) = self
                    .handle
                    .page_size(page)
                    .unwrap_or(PageSize::new(612.0, 792.0))
                    .pixels_at(scale);
                RenderedPage::Placeholder {
                    page_number: page + 1,
                    width,
                    height,
                }
            }
        }
    }

    /// PNG thumbnail `width_px` wide
    pub fn thumbnail(&self, page: usize, width_px: u32) -> Result<Vec<u8>> {
        let size = self.handle.page_size(page)?;
        let scale = width_px.max(1) as f64 / size.width.max(1.0);
        let bitmap = self.render_at(page, scale)?;
        encode_png(&bitmap)
    }
}

/// Render handle over a single decoded image, used when the input file is
/// an image rather than a PDF. One pixel maps to one point.
pub struct ImageRenderHandle {
    image: RgbaImage,
}

impl ImageRenderHandle {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| PdfEditError::DocumentLoad(format!("Failed to decode image: {}", e)))?
            .to_rgba8();
        Ok(Self { image })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }
}

impl RenderHandle for ImageRenderHandle {
    fn page_count(&self) -> usize {
        1
    }

    fn page_size(&self, page: usize) -> std::result::Result<PageSize, RenderError> {
        if page != 0 {
            return Err(RenderError::new(page, "image documents have a single page"));
        }
        Ok(PageSize::new(
            self.image.width() as f64,
            self.image.height() as f64,
        ))
    }

    fn paint(
        &self,
        page: usize,
        _scale: f64,
        surface: &mut RasterSurface,
    ) -> std::result::Result<(), RenderError> {
        if page != 0 {
            return Err(RenderError::new(page, "image documents have a single page"));
        }
        let (width, height) = (surface.width(), surface.height());
        if (width, height) == self.image.dimensions() {
            image::imageops::overlay(surface.pixels_mut(), &self.image, 0, 0);
        } else {
            let scaled = image::imageops::resize(&self.image, width, height, FilterType::Triangle);
            image::imageops::overlay(surface.pixels_mut(), &scaled, 0, 0);
        }
        Ok(())
    }

    fn text_run_count(&self, _page: usize) -> std::result::Result<usize, RenderError> {
        Ok(0)
    }
}

/// Composite onto white and drop alpha
pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| PdfEditError::Image(format!("PNG encode failed: {}", e)))?;
    Ok(buffer)
}

/// Encode as baseline JPEG. `quality` is in `0.0..=1.0`.
pub fn encode_jpeg(image: &RgbaImage, quality: f32) -> Result<Vec<u8>> {
    let rgb = flatten_on_white(image);
    let quality = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|e| PdfEditError::Image(format!("JPEG encode failed: {}", e)))?;
    Ok(buffer)
}

/// Count text-showing operators (`Tj`, `TJ`, `'`, `"`) in a page's content
pub fn count_text_runs(doc: &Document, page_id: ObjectId) -> Result<usize> {
    let bytes = doc.get_page_content(page_id)?;
    let content = Content::decode(&bytes)?;
    let runs = content
        .operations
        .iter()
        .filter(|op| matches!(op.operator.as_str(), "Tj" | "TJ" | "'" | "\""))
        .count();
    debug!(?page_id, runs, "Counted text runs");
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_tree::test_support::create_test_pdf_with_runs;

    fn checkerboard(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([200, 30, 30, 255])
            } else {
                Rgba([20, 20, 220, 255])
            }
        })
    }

    struct FailingHandle;

    impl RenderHandle for FailingHandle {
        fn page_count(&self) -> usize {
            2
        }
        fn page_size(&self, _page: usize) -> std::result::Result<PageSize, RenderError> {
            Ok(PageSize::new(100.0, 200.0))
        }
        fn paint(
            &self,
            page: usize,
            _scale: f64,
            _surface: &mut RasterSurface,
        ) -> std::result::Result<(), RenderError> {
            Err(RenderError::new(page, "canvas lost"))
        }
        fn text_run_count(&self, _page: usize) -> std::result::Result<usize, RenderError> {
            Ok(0)
        }
    }

    #[test]
    fn test_page_size_pixels() {
        assert_eq!(PageSize::new(612.0, 792.0).pixels_at(1.5), (918, 1188));
        assert_eq!(PageSize::new(0.1, 0.1).pixels_at(1.0), (1, 1));
    }

    #[test]
    fn test_base_size_is_zoom_independent() {
        let service = RenderService::new(Box::new(ImageRenderHandle::from_image(checkerboard(40, 20))), 1.5);
        assert_eq!(service.base_size(0).unwrap(), (60.0, 30.0));
        let bitmap = service.render(0, 2.0);
        assert_eq!(bitmap.dimensions(), (120, 60));
    }

    #[test]
    fn test_render_failure_yields_placeholder() {
        let service = RenderService::new(Box::new(FailingHandle), 1.5);
        let page = service.render(1, 1.0);
        assert!(page.is_placeholder());
        match page {
            RenderedPage::Placeholder { page_number, width, height } => {
                assert_eq!(page_number, 2);
                assert_eq!((width, height), (150, 300));
            }
            RenderedPage::Bitmap(_) => unreachable!(),
        }
    }

    #[test]
    fn test_out_of_range_page_is_render_error() {
        let handle = ImageRenderHandle::from_image(checkerboard(8, 8));
        let err = render_page(&handle, 3, 1.0).unwrap_err();
        assert_eq!(err.page, 3);
    }

    #[test]
    fn test_thumbnail_is_png_of_requested_width() {
        let service = RenderService::new(Box::new(ImageRenderHandle::from_image(checkerboard(300, 150))), 1.5);
        let png = service.thumbnail(0, 150).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 150);
        assert_eq!(decoded.height(), 75);
    }

    #[test]
    fn test_jpeg_smaller_than_raw_raster() {
        let image = checkerboard(64, 64);
        let jpeg = encode_jpeg(&image, 0.5).unwrap();
        assert!(jpeg.len() < (64 * 64 * 4) as usize);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_flatten_on_white() {
        let image = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        assert_eq!(flatten_on_white(&image).get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_write_rgba_checks_length() {
        let mut surface = RasterSurface::acquire(2, 2);
        assert!(surface.write_rgba(&[0; 15]).is_err());
        surface.write_rgba(&[7; 16]).unwrap();
        assert_eq!(surface.release().get_pixel(1, 1).0, [7, 7, 7, 7]);
    }

    #[test]
    fn test_count_text_runs() {
        let pdf = create_test_pdf_with_runs(2, "Runs", &[12, 3]);
        let doc = Document::load_mem(&pdf).unwrap();
        let pages: Vec<_> = doc.get_pages().values().copied().collect();
        assert_eq!(count_text_runs(&doc, pages[0]).unwrap(), 12);
        assert_eq!(count_text_runs(&doc, pages[1]).unwrap(), 3);
    }
}
