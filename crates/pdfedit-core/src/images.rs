//! Embedding raster images as PDF image XObjects

use crate::error::{PdfEditError, Result};
use crate::render::{encode_jpeg, RgbaImage};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::{ExtendedColorType, ImageDecoder};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::{Cursor, Write};

/// An image XObject added to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Embed PNG or JPEG bytes. JPEGs are passed through untouched; anything
/// else is decoded and stored losslessly.
pub fn embed_image(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return embed_jpeg(doc, bytes);
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PdfEditError::Image(format!("Failed to decode image: {}", e)))?;
    embed_rgba(doc, &decoded.to_rgba8())
}

/// Embed a JPEG as a DCTDecode stream
pub fn embed_jpeg(doc: &mut Document, jpeg: &[u8]) -> Result<EmbeddedImage> {
    let decoder = JpegDecoder::new(Cursor::new(jpeg))
        .map_err(|e| PdfEditError::Image(format!("Invalid JPEG: {}", e)))?;
    let (width, height) = decoder.dimensions();
    let color_space: &[u8] = match decoder.original_color_type() {
        ExtendedColorType::L8 => b"DeviceGray",
        ExtendedColorType::Rgb8 => b"DeviceRGB",
        _ => {
            // CMYK and other layouts are re-encoded as RGB
            let decoded = image::load_from_memory(jpeg)
                .map_err(|e| PdfEditError::Image(format!("Invalid JPEG: {}", e)))?;
            let reencoded = encode_jpeg(&decoded.to_rgba8(), 0.92)?;
            return embed_jpeg(doc, &reencoded);
        }
    };

    let dict = image_dict(width, height, color_space, b"DCTDecode");
    let mut stream = Stream::new(dict, jpeg.to_vec());
    stream.allows_compression = false;
    Ok(EmbeddedImage {
        id: doc.add_object(stream),
        width,
        height,
    })
}

/// Embed an RGBA bitmap as a Flate-compressed RGB image, with a soft mask
/// when any pixel is not fully opaque
pub fn embed_rgba(doc: &mut Document, image: &RgbaImage) -> Result<EmbeddedImage> {
    let (width, height) = image.dimensions();
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    for pixel in image.pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let mut dict = image_dict(width, height, b"DeviceRGB", b"FlateDecode");
    if alpha.iter().any(|&a| a != 255) {
        let mask_dict = image_dict(width, height, b"DeviceGray", b"FlateDecode");
        let mut mask = Stream::new(mask_dict, deflate(&alpha)?);
        mask.allows_compression = false;
        let mask_id = doc.add_object(mask);
        dict.set("SMask", Object::Reference(mask_id));
    }

    let mut stream = Stream::new(dict, deflate(&rgb)?);
    stream.allows_compression = false;
    Ok(EmbeddedImage {
        id: doc.add_object(stream),
        width,
        height,
    })
}

fn image_dict(width: u32, height: u32, color_space: &[u8], filter: &[u8]) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(width as i64)),
        ("Height", Object::Integer(height as i64)),
        ("ColorSpace", Object::Name(color_space.to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(filter.to_vec())),
    ])
}

pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfEditError::Operation(format!("Deflate failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| PdfEditError::Operation(format!("Deflate failed: {}", e)))
}

/// Content operators painting image `name` into the rectangle at `(x, y)`
pub(crate) fn draw_image_ops(name: &str, x: f64, y: f64, width: f64, height: f64) -> Vec<u8> {
    format!(
        "q\n{:.4} 0 0 {:.4} {:.4} {:.4} cm\n/{} Do\nQ\n",
        width, height, x, y, name
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_embed_opaque_png_has_no_mask() {
        let mut doc = Document::with_version("1.7");
        let image = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        let embedded = embed_rgba(&mut doc, &image).unwrap();
        assert_eq!((embedded.width, embedded.height), (4, 2));
        let stream = doc.get_object(embedded.id).unwrap().as_stream().unwrap();
        assert!(!stream.dict.has(b"SMask"));
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 4);
    }

    #[test]
    fn test_embed_transparent_png_adds_soft_mask() {
        let mut doc = Document::with_version("1.7");
        let image = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 128]));
        let png = crate::render::encode_png(&image).unwrap();
        let embedded = embed_image(&mut doc, &png).unwrap();
        let stream = doc.get_object(embedded.id).unwrap().as_stream().unwrap();
        assert!(stream.dict.has(b"SMask"));
    }

    #[test]
    fn test_embed_jpeg_passthrough() {
        let mut doc = Document::with_version("1.7");
        let jpeg = encode_jpeg(&RgbaImage::from_pixel(8, 6, Rgba([200, 0, 0, 255])), 0.8).unwrap();
        let embedded = embed_image(&mut doc, &jpeg).unwrap();
        let stream = doc.get_object(embedded.id).unwrap().as_stream().unwrap();
        assert_eq!(stream.content, jpeg);
        assert_eq!(
            stream.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"DCTDecode"
        );
        assert_eq!((embedded.width, embedded.height), (8, 6));
    }

    #[test]
    fn test_embed_rejects_garbage() {
        let mut doc = Document::with_version("1.7");
        assert!(matches!(
            embed_image(&mut doc, b"definitely not an image"),
            Err(PdfEditError::Image(_))
        ));
    }

    #[test]
    fn test_draw_image_ops() {
        let ops = String::from_utf8(draw_image_ops("Im0", 10.0, 20.0, 100.0, 50.0)).unwrap();
        assert!(ops.contains("100.0000 0 0 50.0000 10.0000 20.0000 cm"));
        assert!(ops.contains("/Im0 Do"));
    }
}
