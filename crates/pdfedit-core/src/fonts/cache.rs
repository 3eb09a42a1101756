use super::FontKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Downloaded font binaries for the lifetime of one editing session
#[derive(Debug, Default, Clone)]
pub struct FontCache {
    entries: HashMap<FontKey, Arc<[u8]>>,
}

impl FontCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &FontKey) -> Option<Arc<[u8]>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: FontKey, data: impl Into<Arc<[u8]>>) -> Arc<[u8]> {
        let data = data.into();
        self.entries.insert(key, Arc::clone(&data));
        data
    }

    pub fn contains(&self, key: &FontKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
