//! Low-level page tree helpers on top of lopdf

use crate::error::{PdfEditError, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// US Letter, used when a page carries no usable MediaBox
pub const DEFAULT_PAGE_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Attributes a page may inherit from its ancestors in the page tree
pub(crate) const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

const MAX_DEPTH: usize = 32;

/// Follow indirect references until a direct object is reached
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).and_then(|o| o.as_dict().ok())
}

/// Look up `key` on a page, walking up through Parent nodes
pub(crate) fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Parse a rectangle array, normalizing so that x1 < x2 and y1 < y2
pub(crate) fn parse_rect(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let array = resolve(doc, obj)?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = number(resolve(doc, item)?)?;
    }
    let [a, b, c, d] = values;
    Some([a.min(c), b.min(d), a.max(c), b.max(d)])
}

/// The visible box of a page: CropBox when present, MediaBox otherwise
pub fn page_box(doc: &Document, page_id: ObjectId) -> [f64; 4] {
    inherited(doc, page_id, b"CropBox")
        .and_then(|o| parse_rect(doc, o))
        .or_else(|| inherited(doc, page_id, b"MediaBox").and_then(|o| parse_rect(doc, o)))
        .filter(|r| r[2] - r[0] > 0.0 && r[3] - r[1] > 0.0)
        .unwrap_or(DEFAULT_PAGE_BOX)
}

/// Page /Rotate normalized into 0, 90, 180, 270
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> u16 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|o| o.as_i64().ok())
        .map(|r| (r.rem_euclid(360) / 90 * 90) as u16)
        .unwrap_or(0)
}

pub(crate) fn rect_object(rect: [f64; 4]) -> Object {
    Object::Array(rect.iter().map(|v| Object::Real(*v as f32)).collect())
}

pub(crate) fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(|o| o.as_reference())
        .map_err(|_| PdfEditError::Operation("No Root in trailer".into()))
}

/// Page object ids in document order
pub(crate) fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Make a page's resources a direct dictionary owned by the page, so edits
/// do not leak into other pages sharing the same resources.
pub(crate) fn own_resources(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    // Category sub-dictionaries we write into must be direct as well
    for category in [b"Font".as_slice(), b"XObject".as_slice(), b"ExtGState".as_slice()] {
        let direct = resources
            .get(category)
            .ok()
            .and_then(|o| resolve_dict(doc, o))
            .cloned();
        if let Some(dict) = direct {
            resources.set(category.to_vec(), Object::Dictionary(dict));
        }
    }

    doc.get_dictionary_mut(page_id)?
        .set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Register `target` under `/Resources/<category>/<name>` of a page
pub(crate) fn add_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    target: ObjectId,
) -> Result<()> {
    let page = doc.get_dictionary_mut(page_id)?;
    let resources = match page.get_mut(b"Resources") {
        Ok(Object::Dictionary(dict)) => dict,
        _ => {
            return Err(PdfEditError::Operation(
                "Page resources must be owned before adding to them".into(),
            ))
        }
    };
    if !matches!(resources.get(category.as_bytes()), Ok(Object::Dictionary(_))) {
        resources.set(category, Object::Dictionary(Dictionary::new()));
    }
    if let Ok(Object::Dictionary(sub)) = resources.get_mut(category.as_bytes()) {
        sub.set(name, Object::Reference(target));
    }
    Ok(())
}

/// Pick a resource name with `prefix` not yet used in the page's category
pub(crate) fn unused_resource_name(
    doc: &Document,
    page_id: ObjectId,
    category: &str,
    prefix: &str,
) -> String {
    let existing = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|p| p.get(b"Resources").ok())
        .and_then(|o| resolve_dict(doc, o))
        .and_then(|r| r.get(category.as_bytes()).ok())
        .and_then(|o| resolve_dict(doc, o));
    (0..)
        .map(|i| format!("{}{}", prefix, i))
        .find(|name| existing.map_or(true, |d| !d.has(name.as_bytes())))
        .unwrap_or_else(|| prefix.to_string())
}

/// Append a content stream drawn on top of the existing page content.
/// The existing content is wrapped in `q`/`Q` so its graphics state cannot
/// leak into the appended operators.
pub(crate) fn append_content(doc: &mut Document, page_id: ObjectId, content: Vec<u8>) -> Result<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Array(items)) => items.clone(),
        Ok(other @ Object::Reference(_)) => vec![other.clone()],
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    if !existing.is_empty() {
        let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        contents.push(Object::Reference(open));
        contents.extend(existing);
        let mut tail = b"\nQ\n".to_vec();
        tail.extend(content);
        let close = doc.add_object(Stream::new(Dictionary::new(), tail));
        contents.push(Object::Reference(close));
    } else {
        let only = doc.add_object(Stream::new(Dictionary::new(), content));
        contents.push(Object::Reference(only));
    }

    doc.get_dictionary_mut(page_id)?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// Serialize a document, compressing streams first
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>> {
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| PdfEditError::Operation(format!("Failed to save PDF: {}", e)))?;
    Ok(buffer)
}
