//! Editable annotation model
//!
//! Text boxes, freehand paths and form-field values. All coordinates are in
//! base space (see [`crate::coords`]); the store never sees the live zoom.

use crate::coords::BasePoint;
use crate::error::{PdfEditError, Result};
use serde::{Deserialize, Serialize};

/// Stable page identifier, survives reordering
pub type PageId = u32;

pub type AnnotationId = u64;

/// RGB color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parse `#rrggbb` (or `#rgb`). Malformed input yields black.
    pub fn from_hex(color: &str) -> Self {
        let hex = color.trim().trim_start_matches('#');
        let expanded: String = if hex.len() == 3 {
            hex.chars().flat_map(|c| [c, c]).collect()
        } else {
            hex.to_string()
        };
        if expanded.len() < 6 || !expanded.is_ascii() {
            return Self::BLACK;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&expanded[range], 16).map(|v| v as f32 / 255.0)
        };
        match (channel(0..2), channel(2..4), channel(4..6)) {
            (Ok(r), Ok(g), Ok(b)) => Self { r, g, b },
            _ => Self::BLACK,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub page_id: PageId,
    /// Left edge in base space
    pub x: f64,
    /// Baseline of the first line in base space, measured from the top
    pub y: f64,
    pub text: String,
    /// Font size in points
    pub font_size: f64,
    /// Hex color, e.g. `#1a1a1a`
    pub color: String,
    pub font_family: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

/// Fields of a new text box; the store assigns the id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewText {
    pub page_id: PageId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextStyle {
    pub font_size: f64,
    pub color: String,
    pub font_family: String,
    pub bold: bool,
    pub italic: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            color: "#000000".to_string(),
            font_family: "Helvetica".to_string(),
            bold: false,
            italic: false,
        }
    }
}

impl TextAnnotation {
    pub fn style(&self) -> TextStyle {
        TextStyle {
            font_size: self.font_size,
            color: self.color.clone(),
            font_family: self.font_family.clone(),
            bold: self.bold,
            italic: self.italic,
        }
    }

    pub fn set_style(&mut self, style: TextStyle) {
        self.font_size = style.font_size;
        self.color = style.color;
        self.font_family = style.font_family;
        self.bold = style.bold;
        self.italic = style.italic;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawPath {
    pub id: AnnotationId,
    pub page_id: PageId,
    pub points: Vec<BasePoint>,
    pub color: String,
    pub line_width: f64,
}

impl DrawPath {
    /// A path needs at least one segment to be drawn
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Dropdown,
    Radio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Text(_) => None,
        }
    }
}

/// A form field discovered in the source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormFieldDescriptor {
    /// Fully qualified field name
    pub name: String,
    pub kind: FieldKind,
    /// Page of the first widget, if it could be located
    pub page_id: Option<PageId>,
    /// `[x1, y1, x2, y2]` in PDF points
    pub rect: [f64; 4],
    pub value: FieldValue,
    /// Choices for dropdowns, export values for radio groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FormFieldDescriptor {
    /// Check that `value` has the right shape for this field
    pub fn accepts(&self, value: &FieldValue) -> Result<()> {
        match (self.kind, value) {
            (FieldKind::Text, FieldValue::Text(_)) => Ok(()),
            (FieldKind::Checkbox, FieldValue::Bool(_)) => Ok(()),
            (FieldKind::Dropdown | FieldKind::Radio, FieldValue::Text(choice)) => {
                if choice.is_empty() || self.options.is_empty() || self.options.contains(choice) {
                    Ok(())
                } else {
                    Err(PdfEditError::form_field(
                        &self.name,
                        format!("'{}' is not one of the field's options", choice),
                    ))
                }
            }
            (kind, _) => Err(PdfEditError::form_field(
                &self.name,
                format!("value has the wrong type for a {:?} field", kind),
            )),
        }
    }
}

/// Owner of all user-editable annotation state for one session
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationStore {
    next_id: AnnotationId,
    texts: Vec<TextAnnotation>,
    paths: Vec<DrawPath>,
    form_fields: Vec<FormFieldDescriptor>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form_fields(form_fields: Vec<FormFieldDescriptor>) -> Self {
        Self {
            form_fields,
            ..Self::default()
        }
    }

    fn allocate_id(&mut self) -> AnnotationId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_text(&mut self, new: NewText) -> AnnotationId {
        let id = self.allocate_id();
        let style = new.style;
        self.texts.push(TextAnnotation {
            id,
            page_id: new.page_id,
            x: new.x,
            y: new.y,
            text: new.text,
            font_size: style.font_size,
            color: style.color,
            font_family: style.font_family,
            bold: style.bold,
            italic: style.italic,
        });
        id
    }

    pub fn text(&self, id: AnnotationId) -> Option<&TextAnnotation> {
        self.texts.iter().find(|t| t.id == id)
    }

    pub fn text_mut(&mut self, id: AnnotationId) -> Result<&mut TextAnnotation> {
        self.texts
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PdfEditError::InvalidInput(format!("No text annotation {}", id)))
    }

    pub fn remove_text(&mut self, id: AnnotationId) -> bool {
        if let Some(pos) = self.texts.iter().position(|t| t.id == id) {
            self.texts.remove(pos);
            true
        } else {
            false
        }
    }

    /// Store a finished stroke. Strokes with fewer than two points are
    /// discarded and `None` is returned.
    pub fn add_path(
        &mut self,
        page_id: PageId,
        points: Vec<BasePoint>,
        color: &str,
        line_width: f64,
    ) -> Option<AnnotationId> {
        if points.len() < 2 {
            return None;
        }
        let id = self.allocate_id();
        self.paths.push(DrawPath {
            id,
            page_id,
            points,
            color: color.to_string(),
            line_width,
        });
        Some(id)
    }

    pub fn remove_path(&mut self, id: AnnotationId) -> bool {
        if let Some(pos) = self.paths.iter().position(|p| p.id == id) {
            self.paths.remove(pos);
            true
        } else {
            false
        }
    }

    /// Remove every text box and path on a page, returning how many were removed
    pub fn clear_page(&mut self, page_id: PageId) -> usize {
        let before = self.texts.len() + self.paths.len();
        self.texts.retain(|t| t.page_id != page_id);
        self.paths.retain(|p| p.page_id != page_id);
        before - (self.texts.len() + self.paths.len())
    }

    /// Drop annotations that belong to pages no longer in the collection
    pub fn retain_pages(&mut self, live: impl Fn(PageId) -> bool) {
        self.texts.retain(|t| live(t.page_id));
        self.paths.retain(|p| live(p.page_id));
    }

    pub fn texts(&self) -> &[TextAnnotation] {
        &self.texts
    }

    pub fn paths(&self) -> &[DrawPath] {
        &self.paths
    }

    pub fn texts_for_page(&self, page_id: PageId) -> impl Iterator<Item = &TextAnnotation> {
        self.texts.iter().filter(move |t| t.page_id == page_id)
    }

    pub fn paths_for_page(&self, page_id: PageId) -> impl Iterator<Item = &DrawPath> {
        self.paths.iter().filter(move |p| p.page_id == page_id)
    }

    pub fn form_fields(&self) -> &[FormFieldDescriptor] {
        &self.form_fields
    }

    pub fn form_field(&self, name: &str) -> Option<&FormFieldDescriptor> {
        self.form_fields.iter().find(|f| f.name == name)
    }

    pub fn set_field_value(&mut self, name: &str, value: FieldValue) -> Result<()> {
        let field = self
            .form_fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| PdfEditError::form_field(name, "no such field"))?;
        field.accepts(&value)?;
        field.value = value;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.paths.is_empty()
    }
}
