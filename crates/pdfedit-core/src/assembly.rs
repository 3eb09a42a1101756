//! Page assembly
//!
//! Builds a new document from an ordered list of pages picked out of one or
//! more source documents. Merge, split and export all go through here.
//!
//! The algorithm:
//! 1. For each source the first time it is used, import all of its objects
//!    with ids shifted past the destination's current max id
//! 2. Materialize inherited page attributes onto each picked page, since the
//!    source page tree nodes are left behind
//! 3. A page picked more than once is cloned into a fresh object
//! 4. Build a new page tree and catalog, then drop unreachable objects

use crate::error::{PdfEditError, Result};
use crate::page_tree::{self, INHERITABLE};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One output page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePick {
    /// Index into the sources slice
    pub source: usize,
    /// 0-based page index in that source
    pub page_index: usize,
    /// Extra clockwise rotation added to the page's own /Rotate
    pub rotation: u16,
}

impl PagePick {
    pub fn new(source: usize, page_index: usize) -> Self {
        Self {
            source,
            page_index,
            rotation: 0,
        }
    }

    pub fn rotated(mut self, rotation: u16) -> Self {
        self.rotation = rotation;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Carry interactive form fields over into the output
    pub keep_forms: bool,
}

pub struct PageAssembler<'a> {
    sources: &'a [&'a Document],
    options: AssembleOptions,
}

/// Output of an assembly: the document plus the object id of every picked
/// page, in pick order
pub struct Assembled {
    pub document: Document,
    pub pages: Vec<ObjectId>,
}

impl<'a> PageAssembler<'a> {
    pub fn new(sources: &'a [&'a Document]) -> Self {
        Self {
            sources,
            options: AssembleOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AssembleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn assemble(&self, picks: &[PagePick]) -> Result<Assembled> {
        if picks.is_empty() {
            return Err(PdfEditError::InvalidInput("No pages to assemble".into()));
        }

        let source_pages: Vec<Vec<ObjectId>> =
            self.sources.iter().map(|doc| page_tree::page_ids(doc)).collect();

        let mut dest = Document::with_version("1.7");
        let pages_id = dest.new_object_id();
        let mut offsets: HashMap<usize, u32> = HashMap::new();
        let mut used: HashSet<ObjectId> = HashSet::new();
        let mut out_pages = Vec::with_capacity(picks.len());

        for pick in picks {
            let source = self.sources.get(pick.source).ok_or_else(|| {
                PdfEditError::InvalidInput(format!("No source document {}", pick.source))
            })?;
            let src_page = *source_pages[pick.source].get(pick.page_index).ok_or_else(|| {
                PdfEditError::InvalidInput(format!(
                    "Document {} has no page {}",
                    pick.source,
                    pick.page_index + 1
                ))
            })?;

            let offset = match offsets.get(&pick.source) {
                Some(offset) => *offset,
                None => {
                    let offset = import_objects(&mut dest, source);
                    offsets.insert(pick.source, offset);
                    offset
                }
            };

            let mut page = remap_dict(materialized_page(source, src_page)?, offset);
            page.set("Parent", Object::Reference(pages_id));
            page.remove(b"StructParents");

            let base_rotation = page_tree::page_rotation(source, src_page);
            let rotation = (base_rotation + pick.rotation) % 360;
            if rotation == 0 {
                page.remove(b"Rotate");
            } else {
                page.set("Rotate", Object::Integer(rotation as i64));
            }

            let remapped_id = (src_page.0 + offset, src_page.1);
            let page_id = if used.insert(remapped_id) {
                dest.objects.insert(remapped_id, Object::Dictionary(page));
                remapped_id
            } else {
                // Widgets cannot belong to two pages
                page.remove(b"Annots");
                dest.add_object(Object::Dictionary(page))
            };
            out_pages.push(page_id);
        }

        let kids = out_pages.iter().map(|&id| Object::Reference(id)).collect();
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(out_pages.len() as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        dest.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        if self.options.keep_forms {
            if let Some(acro_form) = self.merged_acro_form(&offsets, &out_pages, &dest) {
                catalog.set("AcroForm", Object::Dictionary(acro_form));
            }
        }
        let catalog_id = dest.add_object(Object::Dictionary(catalog));
        dest.trailer = Dictionary::new();
        dest.trailer.set("Root", Object::Reference(catalog_id));

        let pruned = dest.prune_objects();
        debug!(
            pages = out_pages.len(),
            pruned = pruned.len(),
            "Assembled document"
        );

        Ok(Assembled {
            document: dest,
            pages: out_pages,
        })
    }

    /// Union of the sources' AcroForm field lists, limited to fields with a
    /// widget on an output page
    fn merged_acro_form(
        &self,
        offsets: &HashMap<usize, u32>,
        out_pages: &[ObjectId],
        dest: &Document,
    ) -> Option<Dictionary> {
        let mut ordered: Vec<(&usize, &u32)> = offsets.iter().collect();
        ordered.sort();

        let mut merged: Option<Dictionary> = None;
        let mut fields = Vec::new();
        for (&source_index, &offset) in ordered {
            let source = self.sources[source_index];
            let Some(form) = page_tree::catalog_id(source)
                .ok()
                .and_then(|id| source.get_dictionary(id).ok())
                .and_then(|catalog| catalog.get(b"AcroForm").ok())
                .and_then(|o| page_tree::resolve_dict(source, o))
            else {
                continue;
            };
            let form = remap_dict(form.clone(), offset);
            if let Ok(Object::Array(items)) = form.get(b"Fields") {
                fields.extend(items.iter().cloned());
            }
            if merged.is_none() {
                merged = Some(form);
            }
        }

        let live: HashSet<ObjectId> = out_pages.iter().copied().collect();
        fields.retain(|field| match field {
            Object::Reference(id) => field_on_pages(dest, *id, &live),
            _ => false,
        });

        let mut form = merged?;
        if fields.is_empty() {
            return None;
        }
        form.set("Fields", Object::Array(fields));
        Some(form)
    }
}

/// Copy every object of `source` into `dest` with ids shifted by the
/// returned offset
fn import_objects(dest: &mut Document, source: &Document) -> u32 {
    let offset = dest.max_id;
    for (old_id, object) in source.objects.iter() {
        let new_id = (old_id.0 + offset, old_id.1);
        dest.objects
            .insert(new_id, remap_object_refs(object.clone(), offset));
    }
    dest.max_id = dest.max_id.max(source.max_id + offset);
    offset
}

/// Clone a page dictionary with its inherited attributes made explicit
fn materialized_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        if let Some(value) = page_tree::inherited(doc, page_id, key) {
            page.set(key.to_vec(), value.clone());
        }
    }
    if !page.has(b"MediaBox") {
        page.set(
            "MediaBox",
            page_tree::rect_object(page_tree::DEFAULT_PAGE_BOX),
        );
    }
    Ok(page)
}

/// Whether a field (or one of its kids) has a widget on one of `pages`
fn field_on_pages(doc: &Document, field_id: ObjectId, pages: &HashSet<ObjectId>) -> bool {
    let mut stack = vec![field_id];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Ok(dict) = doc.get_dictionary(id) else {
            continue;
        };
        if let Ok(Object::Reference(page)) = dict.get(b"P") {
            if pages.contains(page) {
                return true;
            }
        }
        if let Ok(Object::Array(kids)) = dict.get(b"Kids") {
            stack.extend(kids.iter().filter_map(|k| k.as_reference().ok()));
        }
    }
    // Widgets without /P are found through page /Annots
    pages.iter().any(|page| {
        doc.get_dictionary(*page)
            .ok()
            .and_then(|p| p.get(b"Annots").ok())
            .and_then(|a| page_tree::resolve(doc, a))
            .and_then(|a| a.as_array().ok())
            .map_or(false, |annots| {
                annots
                    .iter()
                    .filter_map(|a| a.as_reference().ok())
                    .any(|a| seen.contains(&a))
            })
    })
}

fn remap_dict(mut dict: Dictionary, offset: u32) -> Dictionary {
    for (_, value) in dict.iter_mut() {
        *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
    }
    dict
}

/// Recursively remap object references in an object
pub(crate) fn remap_object_refs(obj: Object, offset: u32) -> Object {
    if offset == 0 {
        return obj;
    }
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(dict) => Object::Dictionary(remap_dict(dict, offset)),
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}
