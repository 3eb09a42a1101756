mod common;

use common::{load, simple_pdf};
use image::{ImageFormat, Rgba, RgbaImage};
use lopdf::Document;
use pdfedit_core::{
    images_to_pdf, inspect_pdf, pdf_to_image_archive, PageSizePolicy, RasterFormat, RasterOptions,
    TaskQueue,
};
use pretty_assertions::assert_eq;
use std::io::Cursor;

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([20, 120, 220, 255]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[test]
fn images_become_one_page_each_with_progress() {
    let images = vec![png(200, 100), png(50, 300), png(10, 10)];
    let mut seen = Vec::new();
    let bytes = {
        let mut queue = TaskQueue::new(0).with_progress(|done, total, _| seen.push((done, total)));
        images_to_pdf(&images, PageSizePolicy::Letter, &mut queue).unwrap()
    };

    let info = inspect_pdf(&bytes).unwrap();
    assert_eq!(info.page_count, 3);
    assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
}

#[test]
fn fit_policy_sizes_page_to_image() {
    let bytes = images_to_pdf(&[png(320, 240)], PageSizePolicy::Fit, &mut TaskQueue::new(0)).unwrap();
    let doc = Document::load_mem(&bytes).unwrap();
    let page = doc.get_dictionary(*doc.get_pages().values().next().unwrap()).unwrap();
    let media: Vec<f64> = page
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_float().map(f64::from).or_else(|_| o.as_i64().map(|i| i as f64)).unwrap())
        .collect();
    assert_eq!(media, vec![0.0, 0.0, 320.0, 240.0]);
}

#[test]
fn garbage_image_names_its_position() {
    let err = images_to_pdf(&[png(4, 4), b"nope".to_vec()], PageSizePolicy::A4, &mut TaskQueue::new(0))
        .unwrap_err();
    assert!(err.to_string().contains("Image 2"));
}

#[test]
fn pdf_pages_become_archive_entries() {
    let loaded = load(&simple_pdf(3, "Z"));
    let options = RasterOptions {
        format: RasterFormat::Jpg,
        quality: 25,
    };
    let zip = pdf_to_image_archive(loaded.render.as_ref(), options, &mut TaskQueue::new(0)).unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(zip)).unwrap();
    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["page_1.jpg", "page_2.jpg", "page_3.jpg"]);
}
