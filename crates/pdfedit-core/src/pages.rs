//! Ordered page collection: reorder, rotate, select, delete

use crate::error::{PdfEditError, Result};
use crate::model::PageId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageInfo {
    pub id: PageId,
    /// 0-based index of the page in the source document
    pub source_page_index: usize,
    /// User rotation, one of 0, 90, 180, 270
    pub rotation: u16,
    pub selected: bool,
    /// PNG thumbnail, shared between snapshots
    #[serde(skip)]
    pub thumbnail: Option<Arc<[u8]>>,
}

/// Normalize `rotation + delta` into `0..360`. `delta` must be a multiple of 90.
pub fn normalize_rotation(rotation: u16, delta: i32) -> Result<u16> {
    if delta % 90 != 0 {
        return Err(PdfEditError::InvalidInput(format!(
            "Rotation must be a multiple of 90, got {}",
            delta
        )));
    }
    Ok((rotation as i32 + delta).rem_euclid(360) as u16)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageCollection {
    pages: Vec<PageInfo>,
}

impl PageCollection {
    /// One entry per source page, in document order
    pub fn from_page_count(count: usize) -> Self {
        let pages = (0..count)
            .map(|i| PageInfo {
                id: i as PageId,
                source_page_index: i,
                rotation: 0,
                selected: false,
                thumbnail: None,
            })
            .collect();
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageInfo> {
        self.pages.iter()
    }

    pub fn get(&self, id: PageId) -> Option<&PageInfo> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn index_of(&self, id: PageId) -> Option<usize> {
        self.pages.iter().position(|p| p.id == id)
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.index_of(id).is_some()
    }

    fn get_mut(&mut self, id: PageId) -> Result<&mut PageInfo> {
        self.pages
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PdfEditError::InvalidInput(format!("No page with id {}", id)))
    }

    /// Move the page at `from` so it ends up at index `to`
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.pages.len();
        if from >= len || to >= len {
            return Err(PdfEditError::InvalidInput(format!(
                "Cannot move page {} to {} in a {}-page collection",
                from, to, len
            )));
        }
        if from != to {
            let page = self.pages.remove(from);
            self.pages.insert(to, page);
        }
        Ok(())
    }

    /// Rotate by `delta` degrees (±90), wrapping into `0..360`
    pub fn rotate(&mut self, id: PageId, delta: i32) -> Result<u16> {
        let page = self.get_mut(id)?;
        page.rotation = normalize_rotation(page.rotation, delta)?;
        Ok(page.rotation)
    }

    pub fn toggle_select(&mut self, id: PageId) -> Result<bool> {
        let page = self.get_mut(id)?;
        page.selected = !page.selected;
        Ok(page.selected)
    }

    pub fn select_all(&mut self) {
        self.pages.iter_mut().for_each(|p| p.selected = true);
    }

    pub fn deselect_all(&mut self) {
        self.pages.iter_mut().for_each(|p| p.selected = false);
    }

    pub fn selected_count(&self) -> usize {
        self.pages.iter().filter(|p| p.selected).count()
    }

    /// Delete every selected page, returning how many were removed
    pub fn delete_selected(&mut self) -> usize {
        let before = self.pages.len();
        self.pages.retain(|p| !p.selected);
        before - self.pages.len()
    }

    pub fn delete(&mut self, id: PageId) -> Result<()> {
        let index = self
            .index_of(id)
            .ok_or_else(|| PdfEditError::InvalidInput(format!("No page with id {}", id)))?;
        self.pages.remove(index);
        Ok(())
    }

    pub fn set_thumbnail(&mut self, id: PageId, png: Vec<u8>) -> Result<()> {
        self.get_mut(id)?.thumbnail = Some(Arc::from(png));
        Ok(())
    }

    /// Carry thumbnails over from another collection with the same page ids
    pub(crate) fn adopt_thumbnails(&mut self, from: &PageCollection) {
        for page in &mut self.pages {
            if page.thumbnail.is_none() {
                page.thumbnail = from.get(page.id).and_then(|p| p.thumbnail.clone());
            }
        }
    }
}
