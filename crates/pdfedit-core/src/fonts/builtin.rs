//! Standard 14 font families available in every PDF viewer

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinFamily {
    Helvetica,
    Times,
    Courier,
}

impl BuiltinFamily {
    /// Exact match on the family names the editor offers
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Helvetica" => Some(BuiltinFamily::Helvetica),
            "Times-Roman" | "Times" => Some(BuiltinFamily::Times),
            "Courier" => Some(BuiltinFamily::Courier),
            _ => None,
        }
    }

    /// Closest standard family for any family name, including CSS generic
    /// families
    pub fn closest(name: &str) -> Self {
        if let Some(family) = Self::from_name(name) {
            return family;
        }
        let lower = name.to_lowercase();

        match lower.as_str() {
            "serif" => return BuiltinFamily::Times,
            "sans-serif" | "cursive" | "fantasy" => return BuiltinFamily::Helvetica,
            "monospace" => return BuiltinFamily::Courier,
            _ => {}
        }

        if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
            return BuiltinFamily::Times;
        }
        if lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas")
            || lower.contains("monaco")
        {
            return BuiltinFamily::Courier;
        }
        BuiltinFamily::Helvetica
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BuiltinFamily::Helvetica => "Helvetica",
            BuiltinFamily::Times => "Times-Roman",
            BuiltinFamily::Courier => "Courier",
        }
    }
}

/// One of the 12 family/style combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuiltinFont {
    pub family: BuiltinFamily,
    pub bold: bool,
    pub italic: bool,
}

impl BuiltinFont {
    pub fn new(family: BuiltinFamily, bold: bool, italic: bool) -> Self {
        Self {
            family,
            bold,
            italic,
        }
    }

    /// PostScript name for `/BaseFont`
    pub fn base_font(&self) -> &'static str {
        match self.family {
            BuiltinFamily::Times => match (self.bold, self.italic) {
                (true, true) => "Times-BoldItalic",
                (true, false) => "Times-Bold",
                (false, true) => "Times-Italic",
                (false, false) => "Times-Roman",
            },
            BuiltinFamily::Helvetica => match (self.bold, self.italic) {
                (true, true) => "Helvetica-BoldOblique",
                (true, false) => "Helvetica-Bold",
                (false, true) => "Helvetica-Oblique",
                (false, false) => "Helvetica",
            },
            BuiltinFamily::Courier => match (self.bold, self.italic) {
                (true, true) => "Courier-BoldOblique",
                (true, false) => "Courier-Bold",
                (false, true) => "Courier-Oblique",
                (false, false) => "Courier",
            },
        }
    }

    /// All 12 variants, family-major
    pub fn all() -> impl Iterator<Item = BuiltinFont> {
        [BuiltinFamily::Helvetica, BuiltinFamily::Times, BuiltinFamily::Courier]
            .into_iter()
            .flat_map(|family| {
                [(false, false), (true, false), (false, true), (true, true)]
                    .into_iter()
                    .map(move |(bold, italic)| BuiltinFont::new(family, bold, italic))
            })
    }
}
