//! Interactive form fields
//!
//! Fields are discovered once when a document is opened and written back
//! on export. A field that cannot take its value is reported, never fatal.

use crate::error::{PdfEditError, Result};
use crate::fonts::embed::winansi_to_char;
use crate::model::{FieldKind, FieldValue, FormFieldDescriptor, PageId};
use crate::page_tree::{catalog_id, page_ids, parse_rect, resolve, resolve_dict};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::HashSet;
use tracing::{debug, warn};

const FF_RADIO: i64 = 1 << 15;
const FF_PUSHBUTTON: i64 = 1 << 16;
const MAX_DEPTH: usize = 32;

/// A terminal field and the widget annotations that display it
#[derive(Debug, Clone)]
struct FieldNode {
    id: ObjectId,
    name: String,
    widgets: Vec<ObjectId>,
}

fn acro_form(doc: &Document) -> Option<&Dictionary> {
    let catalog = doc.get_dictionary(catalog_id(doc).ok()?).ok()?;
    resolve_dict(doc, catalog.get(b"AcroForm").ok()?)
}

fn terminal_fields(doc: &Document) -> Vec<FieldNode> {
    let Some(roots) = acro_form(doc)
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for root in roots {
        if let Ok(id) = root.as_reference() {
            visit_field(doc, id, "", &mut seen, &mut out, 0);
        }
    }
    out
}

fn visit_field(
    doc: &Document,
    id: ObjectId,
    parent_name: &str,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<FieldNode>,
    depth: usize,
) {
    if depth > MAX_DEPTH || !seen.insert(id) {
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };

    let partial = dict
        .get(b"T")
        .ok()
        .and_then(|t| t.as_str().ok())
        .map(decode_text_string);
    let name = match (parent_name.is_empty(), partial) {
        (_, None) => parent_name.to_string(),
        (true, Some(p)) => p,
        (false, Some(p)) => format!("{}.{}", parent_name, p),
    };

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|k| resolve(doc, k))
        .and_then(|k| k.as_array().ok())
        .map(|k| k.iter().filter_map(|o| o.as_reference().ok()).collect())
        .unwrap_or_default();

    let (child_fields, widgets): (Vec<ObjectId>, Vec<ObjectId>) = kids
        .into_iter()
        .partition(|kid| doc.get_dictionary(*kid).is_ok_and(|d| d.has(b"T")));

    let has_child_fields = !child_fields.is_empty();
    for child in child_fields {
        visit_field(doc, child, &name, seen, out, depth + 1);
    }

    if !widgets.is_empty() {
        out.push(FieldNode { id, name, widgets });
    } else if !has_child_fields && (dict.has(b"FT") || dict.has(b"Subtype")) {
        // Field and widget merged into one dictionary
        out.push(FieldNode {
            id,
            name,
            widgets: vec![id],
        });
    }
}

/// A field attribute, looked up through `/Parent` when not set directly
fn field_attr<'a>(doc: &'a Document, id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(id).ok()?;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn field_kind(doc: &Document, node: &FieldNode) -> Option<FieldKind> {
    let field_type = field_attr(doc, node.id, b"FT")?.as_name().ok()?;
    let flags = field_attr(doc, node.id, b"Ff")
        .and_then(|f| f.as_i64().ok())
        .unwrap_or(0);
    match field_type {
        b"Tx" => Some(FieldKind::Text),
        b"Btn" if flags & FF_PUSHBUTTON != 0 => None,
        b"Btn" if flags & FF_RADIO != 0 => Some(FieldKind::Radio),
        b"Btn" => Some(FieldKind::Checkbox),
        b"Ch" => Some(FieldKind::Dropdown),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with a byte order mark, otherwise
/// single-byte
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|b| winansi_to_char(*b)).collect()
}

/// Encode a text string, as Latin-1 when possible, else UTF-16BE
pub(crate) fn encode_text_string(text: &str) -> Object {
    let latin1 = text
        .chars()
        .all(|c| (c as u32) < 0x80 || (0xA0..=0xFF).contains(&(c as u32)));
    let bytes = if latin1 {
        text.chars().map(|c| c as u8).collect()
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        bytes
    };
    Object::String(bytes, StringFormat::Literal)
}

/// Names of a widget's "on" appearance states
fn on_states(doc: &Document, widget: ObjectId) -> Vec<String> {
    doc.get_dictionary(widget)
        .ok()
        .and_then(|w| w.get(b"AP").ok())
        .and_then(|ap| resolve_dict(doc, ap))
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| resolve_dict(doc, n))
        .map(|n| {
            n.iter()
                .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
                .filter(|k| k != "Off")
                .collect()
        })
        .unwrap_or_default()
}

fn choice_options(doc: &Document, node: &FieldNode) -> Vec<String> {
    let Some(options) = field_attr(doc, node.id, b"Opt").and_then(|o| o.as_array().ok()) else {
        return Vec::new();
    };
    options
        .iter()
        .filter_map(|opt| match resolve(doc, opt)? {
            Object::String(bytes, _) => Some(decode_text_string(bytes)),
            // [export value, display text]
            Object::Array(pair) => pair.first().and_then(|o| o.as_str().ok()).map(decode_text_string),
            _ => None,
        })
        .collect()
}

fn current_value(doc: &Document, node: &FieldNode, kind: FieldKind) -> FieldValue {
    let value = field_attr(doc, node.id, b"V");
    match kind {
        FieldKind::Checkbox => FieldValue::Bool(
            value
                .and_then(|v| v.as_name().ok())
                .is_some_and(|name| name != b"Off"),
        ),
        FieldKind::Radio => FieldValue::Text(
            value
                .and_then(|v| v.as_name().ok())
                .filter(|name| *name != b"Off")
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .unwrap_or_default(),
        ),
        FieldKind::Text | FieldKind::Dropdown => FieldValue::Text(match value {
            Some(Object::String(bytes, _)) => decode_text_string(bytes),
            // Multi-select lists keep the first choice
            Some(Object::Array(items)) => items
                .first()
                .and_then(|o| o.as_str().ok())
                .map(decode_text_string)
                .unwrap_or_default(),
            _ => String::new(),
        }),
    }
}

fn widget_page(doc: &Document, widget: ObjectId, pages: &[ObjectId]) -> Option<usize> {
    if let Some(page) = doc
        .get_dictionary(widget)
        .ok()
        .and_then(|w| w.get(b"P").ok())
        .and_then(|p| p.as_reference().ok())
    {
        if let Some(index) = pages.iter().position(|id| *id == page) {
            return Some(index);
        }
    }
    pages.iter().position(|page| {
        doc.get_dictionary(*page)
            .ok()
            .and_then(|p| p.get(b"Annots").ok())
            .and_then(|a| resolve(doc, a))
            .and_then(|a| a.as_array().ok())
            .is_some_and(|annots| annots.iter().any(|a| a.as_reference().ok() == Some(widget)))
    })
}

/// Find the fillable fields of a document. Page ids are the 0-based page
/// index, matching a freshly opened page collection.
pub fn discover_form_fields(doc: &Document) -> Vec<FormFieldDescriptor> {
    let pages = page_ids(doc);
    let fields: Vec<FormFieldDescriptor> = terminal_fields(doc)
        .into_iter()
        .filter(|node| !node.name.is_empty())
        .filter_map(|node| {
            let kind = field_kind(doc, &node)?;
            let first_widget = node.widgets.first().copied();
            let rect = first_widget
                .and_then(|w| doc.get_dictionary(w).ok())
                .and_then(|w| w.get(b"Rect").ok())
                .and_then(|r| parse_rect(doc, r))
                .unwrap_or([0.0; 4]);
            let page_id = first_widget
                .and_then(|w| widget_page(doc, w, &pages))
                .map(|index| index as PageId);
            let options = match kind {
                FieldKind::Dropdown => choice_options(doc, &node),
                FieldKind::Radio => {
                    let mut states: Vec<String> = Vec::new();
                    for widget in &node.widgets {
                        for state in on_states(doc, *widget) {
                            if !states.contains(&state) {
                                states.push(state);
                            }
                        }
                    }
                    states
                }
                _ => Vec::new(),
            };
            Some(FormFieldDescriptor {
                value: current_value(doc, &node, kind),
                name: node.name,
                kind,
                page_id,
                rect,
                options,
            })
        })
        .collect();
    debug!(fields = fields.len(), "Discovered form fields");
    fields
}

/// Outcome of writing form values back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormWriteReport {
    pub written: usize,
    pub skipped: Vec<String>,
}

/// Write every descriptor's value into the matching field of `doc`.
/// Fields that are missing or incompatible are logged and skipped.
pub fn write_form_values(doc: &mut Document, fields: &[FormFieldDescriptor]) -> FormWriteReport {
    let nodes = terminal_fields(doc);
    let mut report = FormWriteReport::default();
    let mut needs_appearances = false;

    for field in fields {
        let result = nodes
            .iter()
            .find(|node| node.name == field.name)
            .ok_or_else(|| PdfEditError::form_field(&field.name, "no such field in document"))
            .and_then(|node| write_field(doc, node, field));
        match result {
            Ok(regenerate) => {
                report.written += 1;
                needs_appearances |= regenerate;
            }
            Err(e) => {
                warn!(field = %field.name, error = %e, "Skipping form field");
                report.skipped.push(field.name.clone());
            }
        }
    }

    if needs_appearances {
        if let Err(e) = set_need_appearances(doc) {
            warn!(error = %e, "Could not flag form for appearance regeneration");
        }
    }
    report
}

/// Returns whether the viewer must regenerate appearances
fn write_field(doc: &mut Document, node: &FieldNode, field: &FormFieldDescriptor) -> Result<bool> {
    let actual = field_kind(doc, node)
        .ok_or_else(|| PdfEditError::form_field(&field.name, "unsupported field type"))?;
    if actual != field.kind {
        return Err(PdfEditError::form_field(
            &field.name,
            format!("document field is {:?}, value is for {:?}", actual, field.kind),
        ));
    }

    match (field.kind, &field.value) {
        (FieldKind::Text, FieldValue::Text(text)) => {
            doc.get_dictionary_mut(node.id)?.set("V", encode_text_string(text));
            clear_appearances(doc, node)?;
            Ok(true)
        }
        (FieldKind::Dropdown, FieldValue::Text(choice)) => {
            let options = choice_options(doc, node);
            if !choice.is_empty() && !options.is_empty() && !options.contains(choice) {
                return Err(PdfEditError::form_field(
                    &field.name,
                    format!("'{}' is not one of the options", choice),
                ));
            }
            doc.get_dictionary_mut(node.id)?.set("V", encode_text_string(choice));
            clear_appearances(doc, node)?;
            Ok(true)
        }
        (FieldKind::Checkbox, FieldValue::Bool(checked)) => {
            let mut any_on = false;
            for widget in &node.widgets {
                let state = match on_states(doc, *widget).into_iter().next() {
                    Some(on) if *checked => {
                        any_on = true;
                        on
                    }
                    _ => "Off".to_string(),
                };
                doc.get_dictionary_mut(*widget)?
                    .set("AS", Object::Name(state.into_bytes()));
            }
            let value = if *checked {
                node.widgets
                    .iter()
                    .find_map(|w| on_states(doc, *w).into_iter().next())
                    .unwrap_or_else(|| "Yes".to_string())
            } else {
                "Off".to_string()
            };
            if *checked && !any_on {
                debug!(field = %field.name, "Checkbox has no on appearance");
            }
            doc.get_dictionary_mut(node.id)?
                .set("V", Object::Name(value.into_bytes()));
            Ok(false)
        }
        (FieldKind::Radio, FieldValue::Text(choice)) => {
            let selected: Vec<bool> = node
                .widgets
                .iter()
                .map(|w| !choice.is_empty() && on_states(doc, *w).contains(choice))
                .collect();
            if !choice.is_empty() && !selected.contains(&true) {
                return Err(PdfEditError::form_field(
                    &field.name,
                    format!("'{}' is not one of the choices", choice),
                ));
            }
            for (widget, on) in node.widgets.iter().zip(selected) {
                let state = if on { choice.as_str() } else { "Off" };
                doc.get_dictionary_mut(*widget)?
                    .set("AS", Object::Name(state.as_bytes().to_vec()));
            }
            let value = if choice.is_empty() { "Off" } else { choice.as_str() };
            doc.get_dictionary_mut(node.id)?
                .set("V", Object::Name(value.as_bytes().to_vec()));
            Ok(false)
        }
        (kind, value) => Err(PdfEditError::form_field(
            &field.name,
            format!("{:?} field cannot hold {:?}", kind, value),
        )),
    }
}

/// Drop stale appearance streams so the viewer draws the new value
fn clear_appearances(doc: &mut Document, node: &FieldNode) -> Result<()> {
    for widget in &node.widgets {
        doc.get_dictionary_mut(*widget)?.remove(b"AP");
    }
    Ok(())
}

fn set_need_appearances(doc: &mut Document) -> Result<()> {
    let catalog_id = catalog_id(doc)?;
    let form_ref = match doc.get_dictionary(catalog_id)?.get(b"AcroForm") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(Object::Dictionary(_)) => None,
        _ => return Err(PdfEditError::Operation("Document has no AcroForm".into())),
    };
    let form = match form_ref {
        Some(id) => doc.get_dictionary_mut(id)?,
        None => match doc.get_dictionary_mut(catalog_id)?.get_mut(b"AcroForm") {
            Ok(Object::Dictionary(dict)) => dict,
            _ => return Err(PdfEditError::Operation("Document has no AcroForm".into())),
        },
    };
    form.set("NeedAppearances", Object::Boolean(true));
    Ok(())
}
