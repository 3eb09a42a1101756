//! Font resolution
//!
//! Maps an annotation's `(family, bold, italic)` to something that can be
//! written into the output document:
//! - built-in families resolve to standard 14 fonts with no I/O
//! - remote families go through the session [`FontCache`], then the
//!   [`FontFetcher`]
//! - a remote font that cannot be fetched or parsed is logged and replaced
//!   by the closest built-in family

pub mod builtin;
pub mod cache;
pub mod embed;
pub mod remote;

pub use builtin::{BuiltinFamily, BuiltinFont};
pub use cache::FontCache;
pub use remote::{default_fetcher, FontFetcher, OfflineFontFetcher};

#[cfg(feature = "remote-fonts")]
pub use remote::HttpFontFetcher;

use crate::error::{FontFetchError, Result};
use lopdf::{Document, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const WEIGHT_REGULAR: u16 = 400;
pub const WEIGHT_BOLD: u16 = 700;

/// Cache key for a remote font binary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontKey {
    pub family: String,
    pub weight: u16,
    pub italic: bool,
}

impl FontKey {
    pub fn new(family: impl Into<String>, bold: bool, italic: bool) -> Self {
        Self {
            family: family.into(),
            weight: if bold { WEIGHT_BOLD } else { WEIGHT_REGULAR },
            italic,
        }
    }

    pub fn is_bold(&self) -> bool {
        self.weight >= WEIGHT_BOLD
    }
}

/// A family served by the remote font endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoteFamily {
    /// Name shown in the editor and stored on annotations
    pub display_name: &'static str,
    /// Name sent to the style endpoint
    pub query_name: &'static str,
    /// Used when the remote font is unavailable
    pub fallback: BuiltinFamily,
}

impl RemoteFamily {
    const fn new(display_name: &'static str, query_name: &'static str, fallback: BuiltinFamily) -> Self {
        Self {
            display_name,
            query_name,
            fallback,
        }
    }
}

pub const REMOTE_FAMILIES: &[RemoteFamily] = &[
    RemoteFamily::new("Arimo (Arial)", "Arimo", BuiltinFamily::Helvetica),
    RemoteFamily::new("Roboto", "Roboto", BuiltinFamily::Helvetica),
    RemoteFamily::new("Open Sans", "Open Sans", BuiltinFamily::Helvetica),
    RemoteFamily::new("Lato", "Lato", BuiltinFamily::Helvetica),
    RemoteFamily::new("Montserrat", "Montserrat", BuiltinFamily::Helvetica),
    RemoteFamily::new("Poppins", "Poppins", BuiltinFamily::Helvetica),
    RemoteFamily::new("Oswald", "Oswald", BuiltinFamily::Helvetica),
    RemoteFamily::new("Raleway", "Raleway", BuiltinFamily::Helvetica),
    RemoteFamily::new("Playfair Display", "Playfair Display", BuiltinFamily::Times),
];

/// Look up a remote family by display or query name
pub fn remote_family(name: &str) -> Option<&'static RemoteFamily> {
    REMOTE_FAMILIES
        .iter()
        .find(|f| f.display_name == name || f.query_name == name)
}

/// Every family the editor offers, built-ins first
pub fn available_families() -> Vec<&'static str> {
    [BuiltinFamily::Helvetica, BuiltinFamily::Times, BuiltinFamily::Courier]
        .iter()
        .map(|f| f.display_name())
        .chain(REMOTE_FAMILIES.iter().map(|f| f.display_name))
        .collect()
}

/// A font ready to embed
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedFont {
    Builtin(BuiltinFont),
    Remote { key: FontKey, data: Arc<[u8]> },
}

impl ResolvedFont {
    pub fn is_builtin(&self) -> bool {
        matches!(self, ResolvedFont::Builtin(_))
    }
}

/// Resolves fonts for one export. Keys that failed once are not fetched
/// again during the same export.
pub struct FontResolver<'a> {
    cache: &'a mut FontCache,
    fetcher: &'a dyn FontFetcher,
    failed: HashSet<FontKey>,
}

impl<'a> FontResolver<'a> {
    pub fn new(cache: &'a mut FontCache, fetcher: &'a dyn FontFetcher) -> Self {
        Self {
            cache,
            fetcher,
            failed: HashSet::new(),
        }
    }

    /// Whether resolving this family may touch the network
    pub fn needs_fetch(&self, family: &str, bold: bool, italic: bool) -> bool {
        remote_family(family).is_some_and(|remote| {
            let key = FontKey::new(remote.display_name, bold, italic);
            !self.cache.contains(&key) && !self.failed.contains(&key)
        })
    }

    /// Never fails: unavailable remote fonts degrade to a built-in family
    pub fn resolve(&mut self, family: &str, bold: bool, italic: bool) -> ResolvedFont {
        if let Some(builtin) = BuiltinFamily::from_name(family) {
            return ResolvedFont::Builtin(BuiltinFont::new(builtin, bold, italic));
        }
        let Some(remote) = remote_family(family) else {
            let closest = BuiltinFamily::closest(family);
            debug!(family, fallback = closest.display_name(), "Unknown family, using built-in");
            return ResolvedFont::Builtin(BuiltinFont::new(closest, bold, italic));
        };

        let key = FontKey::new(remote.display_name, bold, italic);
        match self.load(&key) {
            Ok(data) => ResolvedFont::Remote { key, data },
            Err(e) => {
                warn!(
                    family = %e.family,
                    weight = key.weight,
                    italic,
                    error = %e.message,
                    fallback = remote.fallback.display_name(),
                    "Font fetch failed, substituting built-in font"
                );
                ResolvedFont::Builtin(BuiltinFont::new(remote.fallback, bold, italic))
            }
        }
    }

    fn load(&mut self, key: &FontKey) -> std::result::Result<Arc<[u8]>, FontFetchError> {
        if let Some(data) = self.cache.get(key) {
            return Ok(data);
        }
        if self.failed.contains(key) {
            return Err(FontFetchError::new(&key.family, "failed earlier in this export"));
        }
        let fetched = self
            .fetcher
            .fetch(key)
            .and_then(|data| embed::validate_font(&key.family, &data).map(|_| data));
        match fetched {
            Ok(data) => {
                debug!(family = %key.family, weight = key.weight, italic = key.italic, bytes = data.len(), "Fetched font");
                Ok(self.cache.insert(key.clone(), data))
            }
            Err(e) => {
                self.failed.insert(key.clone());
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EmbeddedKey {
    Builtin(BuiltinFont),
    Remote(FontKey),
}

/// Font dictionaries already written into one output document, so each
/// font is embedded once however many annotations use it
#[derive(Debug, Default)]
pub struct DocumentFonts {
    ids: HashMap<EmbeddedKey, ObjectId>,
}

impl DocumentFonts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_for(&mut self, doc: &mut Document, font: &ResolvedFont) -> Result<ObjectId> {
        let key = match font {
            ResolvedFont::Builtin(builtin) => EmbeddedKey::Builtin(*builtin),
            ResolvedFont::Remote { key, .. } => EmbeddedKey::Remote(key.clone()),
        };
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }
        let id = match font {
            ResolvedFont::Builtin(builtin) => embed::add_builtin_font(doc, *builtin),
            ResolvedFont::Remote { key, data } => embed::add_truetype_font(doc, &key.family, data)?,
        };
        self.ids.insert(key, id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingFetcher {
        calls: Cell<usize>,
        result: std::result::Result<Vec<u8>, FontFetchError>,
    }

    impl FontFetcher for CountingFetcher {
        fn fetch(&self, _key: &FontKey) -> std::result::Result<Vec<u8>, FontFetchError> {
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    fn failing() -> CountingFetcher {
        CountingFetcher {
            calls: Cell::new(0),
            result: Err(FontFetchError::new("Roboto", "offline")),
        }
    }

    #[test]
    fn test_builtin_needs_no_fetch() {
        let mut cache = FontCache::new();
        let fetcher = failing();
        let mut resolver = FontResolver::new(&mut cache, &fetcher);
        let font = resolver.resolve("Times-Roman", true, false);
        assert_eq!(
            font,
            ResolvedFont::Builtin(BuiltinFont::new(BuiltinFamily::Times, true, false))
        );
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn test_unknown_family_maps_to_closest_builtin() {
        let mut cache = FontCache::new();
        let fetcher = failing();
        let mut resolver = FontResolver::new(&mut cache, &fetcher);
        let font = resolver.resolve("monospace", false, false);
        assert_eq!(
            font,
            ResolvedFont::Builtin(BuiltinFont::new(BuiltinFamily::Courier, false, false))
        );
    }

    #[test]
    fn test_failed_fetch_falls_back_once() {
        let mut cache = FontCache::new();
        let fetcher = failing();
        let mut resolver = FontResolver::new(&mut cache, &fetcher);

        let first = resolver.resolve("Playfair Display", false, true);
        let second = resolver.resolve("Playfair Display", false, true);
        assert_eq!(
            first,
            ResolvedFont::Builtin(BuiltinFont::new(BuiltinFamily::Times, false, true))
        );
        assert_eq!(first, second);
        assert_eq!(fetcher.calls.get(), 1);
        assert!(!resolver.needs_fetch("Playfair Display", false, true));
    }

    #[test]
    fn test_unparseable_font_counts_as_fetch_failure() {
        let mut cache = FontCache::new();
        let fetcher = CountingFetcher {
            calls: Cell::new(0),
            result: Ok(b"<html>rate limited</html>".to_vec()),
        };
        let mut resolver = FontResolver::new(&mut cache, &fetcher);
        assert!(resolver.resolve("Lato", true, false).is_builtin());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cached_font_skips_fetcher() {
        let mut cache = FontCache::new();
        cache.insert(FontKey::new("Arimo (Arial)", false, false), vec![0u8, 1, 0, 0]);
        let fetcher = failing();
        let mut resolver = FontResolver::new(&mut cache, &fetcher);

        assert!(!resolver.needs_fetch("Arimo", false, false));
        let font = resolver.resolve("Arimo", false, false);
        assert!(matches!(font, ResolvedFont::Remote { ref key, .. } if key.family == "Arimo (Arial)"));
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn test_document_fonts_embed_once() {
        let mut doc = Document::with_version("1.7");
        let mut fonts = DocumentFonts::new();
        let helvetica = ResolvedFont::Builtin(BuiltinFont::new(BuiltinFamily::Helvetica, false, false));
        let a = fonts.object_for(&mut doc, &helvetica).unwrap();
        let b = fonts.object_for(&mut doc, &helvetica).unwrap();
        assert_eq!(a, b);
        assert_eq!(fonts.len(), 1);
    }

    #[test]
    fn test_font_key_weights() {
        assert_eq!(FontKey::new("Lato", true, false).weight, 700);
        assert_eq!(FontKey::new("Lato", false, true).weight, 400);
        assert_eq!(available_families().len(), 12);
    }
}
