//! Conversion between images and PDF

use crate::archive::{build_archive, NamedFile};
use crate::coords::fit_centered;
use crate::error::{PdfEditError, Result};
use crate::images::{draw_image_ops, embed_image};
use crate::page_tree::{rect_object, save_document};
use crate::render::{encode_jpeg, encode_png, render_page, RenderHandle};
use crate::task::TaskQueue;
use lopdf::{Dictionary, Document, Object, Stream};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How pages are sized when converting images to PDF
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSizePolicy {
    #[default]
    A4,
    Letter,
    /// Page matches the image's pixel size, one point per pixel
    Fit,
}

impl PageSizePolicy {
    /// Fixed paper size in points, `None` for [`PageSizePolicy::Fit`]
    pub fn paper_size(&self) -> Option<(f64, f64)> {
        match self {
            PageSizePolicy::A4 => Some((595.28, 841.89)),
            PageSizePolicy::Letter => Some((612.0, 792.0)),
            PageSizePolicy::Fit => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    #[default]
    Png,
    #[serde(alias = "jpeg")]
    Jpg,
}

impl RasterFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpg => "jpg",
        }
    }
}

/// Build a PDF with one page per image, each scaled to fit its page while
/// keeping its aspect ratio and centered
pub fn images_to_pdf(
    images: &[Vec<u8>],
    policy: PageSizePolicy,
    queue: &mut TaskQueue<'_>,
) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(PdfEditError::InvalidInput("No images to convert".into()));
    }
    queue.add_tasks(images.len());

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for (i, bytes) in images.iter().enumerate() {
        let page_id = queue.run(&format!("Image {}", i + 1), || {
            let image = embed_image(&mut doc, bytes)
                .map_err(|e| PdfEditError::Image(format!("Image {}: {}", i + 1, e)))?;
            let (img_w, img_h) = (image.width as f64, image.height as f64);
            let (page_w, page_h) = policy.paper_size().unwrap_or((img_w, img_h));
            let (x, y, w, h) = fit_centered(img_w, img_h, page_w, page_h);

            let content_id = doc.add_object(Stream::new(
                Dictionary::new(),
                draw_image_ops("Im0", x, y, w, h),
            ));
            let resources = Dictionary::from_iter(vec![(
                "XObject",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "Im0",
                    Object::Reference(image.id),
                )])),
            )]);
            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("MediaBox", rect_object([0.0, 0.0, page_w, page_h])),
                ("Resources", Object::Dictionary(resources)),
                ("Contents", Object::Reference(content_id)),
            ]);
            Ok(doc.add_object(page))
        })?;
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len();
    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(count as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let bytes = save_document(&mut doc)?;
    info!(pages = count, ?policy, bytes = bytes.len(), "Converted images to PDF");
    Ok(bytes)
}

/// Options for PDF to image conversion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterOptions {
    pub format: RasterFormat,
    /// 1..=100. Render scale is `quality / 50`, JPEG quality `quality / 100`.
    pub quality: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            format: RasterFormat::Png,
            quality: 75,
        }
    }
}

impl RasterOptions {
    pub fn scale(&self) -> f64 {
        self.quality.clamp(1, 100) as f64 / 50.0
    }

    pub fn jpeg_quality(&self) -> f32 {
        self.quality.clamp(1, 100) as f32 / 100.0
    }
}

/// Render every page to an image named `page_<n>.<ext>`.
///
/// A page that fails to render is logged and left out; the call fails only
/// when no page could be rendered.
pub fn pdf_to_images(
    handle: &dyn RenderHandle,
    options: RasterOptions,
    queue: &mut TaskQueue<'_>,
) -> Result<Vec<NamedFile>> {
    let page_count = handle.page_count();
    queue.add_tasks(page_count);
    let scale = options.scale();
    let mut files = Vec::with_capacity(page_count);
    let mut last_error = None;

    for page in 0..page_count {
        let name = format!("page_{}.{}", page + 1, options.format.extension());
        let encoded = queue.run(&name, || match render_page(handle, page, scale) {
            Ok(bitmap) => {
                let bytes = match options.format {
                    RasterFormat::Png => encode_png(&bitmap)?,
                    RasterFormat::Jpg => encode_jpeg(&bitmap, options.jpeg_quality())?,
                };
                Ok(Some(bytes))
            }
            Err(e) => {
                warn!(page = page + 1, error = %e, "Skipping page that failed to render");
                last_error = Some(e);
                Ok(None)
            }
        })?;
        if let Some(bytes) = encoded {
            files.push(NamedFile::new(name, bytes));
        }
    }

    if files.is_empty() {
        return Err(match last_error {
            Some(e) => e.into(),
            None => PdfEditError::InvalidInput("Document has no pages".into()),
        });
    }
    info!(pages = files.len(), format = options.format.extension(), "Rendered pages to images");
    Ok(files)
}

/// [`pdf_to_images`] packed into a zip archive
pub fn pdf_to_image_archive(
    handle: &dyn RenderHandle,
    options: RasterOptions,
    queue: &mut TaskQueue<'_>,
) -> Result<Vec<u8>> {
    let files = pdf_to_images(handle, options, queue)?;
    build_archive(&files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::page_tree::{page_box, page_ids};
    use crate::render::{ImageRenderHandle, PageSize, RasterSurface, RgbaImage};
    use image::Rgba;

    fn png(width: u32, height: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(width, height, Rgba([0, 120, 200, 255]))).unwrap()
    }

    #[test]
    fn test_images_to_pdf_a4() {
        let bytes = images_to_pdf(
            &[png(100, 50), png(20, 40)],
            PageSizePolicy::A4,
            &mut TaskQueue::new(0),
        )
        .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = page_ids(&doc);
        assert_eq!(pages.len(), 2);
        let [_, _, w, h] = page_box(&doc, pages[0]);
        assert!((w - 595.28).abs() < 0.01);
        assert!((h - 841.89).abs() < 0.01);
    }

    #[test]
    fn test_images_to_pdf_fit_uses_image_size() {
        let jpeg = encode_jpeg(&RgbaImage::from_pixel(300, 200, Rgba([9, 9, 9, 255])), 0.8).unwrap();
        let bytes = images_to_pdf(&[jpeg], PageSizePolicy::Fit, &mut TaskQueue::new(0)).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page = page_ids(&doc)[0];
        assert_eq!(page_box(&doc, page), [0.0, 0.0, 300.0, 200.0]);
    }

    #[test]
    fn test_images_to_pdf_rejects_empty_and_bad_input() {
        assert!(images_to_pdf(&[], PageSizePolicy::Letter, &mut TaskQueue::new(0)).is_err());
        let err = images_to_pdf(
            &[png(2, 2), b"nope".to_vec()],
            PageSizePolicy::Letter,
            &mut TaskQueue::new(0),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Image 2"));
    }

    #[test]
    fn test_raster_options_scale() {
        let options = RasterOptions {
            format: RasterFormat::Jpg,
            quality: 100,
        };
        assert_eq!(options.scale(), 2.0);
        assert_eq!(options.jpeg_quality(), 1.0);
        let low = RasterOptions {
            format: RasterFormat::Png,
            quality: 0,
        };
        assert_eq!(low.scale(), 0.02);
    }

    #[test]
    fn test_pdf_to_images_names_and_scale() {
        let handle = ImageRenderHandle::from_image(RgbaImage::from_pixel(50, 100, Rgba([1, 2, 3, 255])));
        let files = pdf_to_images(
            &handle,
            RasterOptions {
                format: RasterFormat::Png,
                quality: 100,
            },
            &mut TaskQueue::new(0),
        )
        .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "page_1.png");
        let decoded = image::load_from_memory(&files[0].bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 200));
    }

    struct HalfBroken;

    impl RenderHandle for HalfBroken {
        fn page_count(&self) -> usize {
            2
        }
        fn page_size(&self, _page: usize) -> std::result::Result<PageSize, RenderError> {
            Ok(PageSize::new(10.0, 10.0))
        }
        fn paint(
            &self,
            page: usize,
            _scale: f64,
            _surface: &mut RasterSurface,
        ) -> std::result::Result<(), RenderError> {
            if page == 0 {
                Err(RenderError::new(page, "broken"))
            } else {
                Ok(())
            }
        }
        fn text_run_count(&self, _page: usize) -> std::result::Result<usize, RenderError> {
            Ok(0)
        }
    }

    #[test]
    fn test_pdf_to_images_skips_failed_page() {
        let files = pdf_to_images(
            &HalfBroken,
            RasterOptions {
                format: RasterFormat::Jpg,
                quality: 50,
            },
            &mut TaskQueue::new(0),
        )
        .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "page_2.jpg");
    }
}
