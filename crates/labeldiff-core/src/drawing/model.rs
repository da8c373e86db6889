//! Owned drawing document tree.

use serde::{Deserialize, Serialize};

use super::dxf::DxfSource;

/// Entity family, selected once from the DXF type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Plain geometry: lines, polylines, arcs, splines, solids and the like.
    Linear,
    Text(TextKind),
    /// Any `DIMENSION*` type, `LEADER` and multileaders.
    Dimension,
    /// Block reference (`INSERT`).
    Reference,
    Hatch,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextKind {
    Text,
    MText,
    Attrib,
    AttDef,
}

const LINEAR_TYPES: [&str; 15] = [
    "LINE",
    "POLYLINE",
    "LWPOLYLINE",
    "CIRCLE",
    "ARC",
    "ELLIPSE",
    "SPLINE",
    "RAY",
    "XLINE",
    "POINT",
    "SOLID",
    "TRACE",
    "3DFACE",
    "HELIX",
    "REGION",
];

impl EntityKind {
    pub fn from_dxf_type(dxf_type: &str) -> Self {
        match dxf_type {
            "TEXT" => EntityKind::Text(TextKind::Text),
            "MTEXT" => EntityKind::Text(TextKind::MText),
            "ATTRIB" => EntityKind::Text(TextKind::Attrib),
            "ATTDEF" => EntityKind::Text(TextKind::AttDef),
            "LEADER" | "MULTILEADER" | "MLEADER" => EntityKind::Dimension,
            "INSERT" => EntityKind::Reference,
            "HATCH" => EntityKind::Hatch,
            t if t.starts_with("DIMENSION") || t.ends_with("_DIMENSION") => EntityKind::Dimension,
            t if LINEAR_TYPES.contains(&t) => EntityKind::Linear,
            _ => EntityKind::Other,
        }
    }
}

/// 24-bit true colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn from_packed(value: u32) -> Self {
        Self {
            r: ((value >> 16) & 0xff) as u8,
            g: ((value >> 8) & 0xff) as u8,
            b: (value & 0xff) as u8,
        }
    }

    pub fn packed(&self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }
}

/// A layer table entry. `color` is always the positive palette index; a layer
/// that is switched off keeps `off = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub color: i16,
    pub off: bool,
    pub true_color: Option<Rgb>,
    #[serde(skip)]
    pub(crate) origin: Option<usize>,
}

impl Layer {
    pub fn new(name: impl Into<String>, color: i16) -> Self {
        Self {
            name: name.into(),
            color: color.saturating_abs(),
            off: color < 0,
            true_color: None,
            origin: None,
        }
    }
}

/// One drawing entity with the attributes the annotation engine touches.
/// Attributes that do not apply to the entity's type are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub dxf_type: String,
    pub kind: EntityKind,
    pub handle: Option<String>,
    pub layer: Option<String>,
    pub color_index: Option<i16>,
    pub true_color: Option<Rgb>,
    pub color_book_name: Option<String>,
    /// Line weight in 0.01 mm units.
    pub lineweight: Option<i16>,
    pub text_content: Option<String>,
    pub text_height: Option<f64>,
    /// Dimension text height override.
    pub dim_text_height: Option<f64>,
    #[serde(skip)]
    pub(crate) origin: Option<usize>,
}

impl Entity {
    pub fn new(dxf_type: impl Into<String>) -> Self {
        let dxf_type = dxf_type.into();
        Self {
            kind: EntityKind::from_dxf_type(&dxf_type),
            dxf_type,
            handle: None,
            layer: None,
            color_index: None,
            true_color: None,
            color_book_name: None,
            lineweight: None,
            text_content: None,
            text_height: None,
            dim_text_height: None,
            origin: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>, height: f64) -> Self {
        self.text_content = Some(text.into());
        self.text_height = Some(height);
        self
    }

    pub fn with_color(mut self, color: i16) -> Self {
        self.color_index = Some(color);
        self
    }

    pub fn with_true_color(mut self, rgb: Rgb) -> Self {
        self.true_color = Some(rgb);
        self
    }

    /// Handle for diagnostics; `?` when the entity has none.
    pub fn handle_or_unknown(&self) -> &str {
        self.handle.as_deref().unwrap_or("?")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub name: String,
    pub entities: Vec<Entity>,
}

impl BlockDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    /// System blocks (`*Model_Space`, `*D12`, `*U3`, ...) are never annotated.
    pub fn is_system(&self) -> bool {
        self.name.starts_with('*')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperLayout {
    pub name: String,
    pub entities: Vec<Entity>,
}

impl PaperLayout {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }
}

/// A parsed drawing. Documents read from disk carry their source tags so
/// they can be written back without losing anything the model does not track.
#[derive(Debug, Clone, Default)]
pub struct DrawingDocument {
    pub layers: Vec<Layer>,
    pub blocks: Vec<BlockDefinition>,
    pub model_space: Vec<Entity>,
    pub paper_layouts: Vec<PaperLayout>,
    pub(crate) source: Option<DxfSource>,
}

impl DrawingDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paper layout by name, created on first use.
    pub fn paper_layout_mut(&mut self, name: &str) -> &mut PaperLayout {
        let idx = match self.paper_layouts.iter().position(|l| l.name == name) {
            Some(idx) => idx,
            None => {
                self.paper_layouts.push(PaperLayout::new(name));
                self.paper_layouts.len() - 1
            }
        };
        &mut self.paper_layouts[idx]
    }

    /// Every entity in traversal order: blocks, model space, paper layouts.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.blocks
            .iter()
            .flat_map(|b| b.entities.iter())
            .chain(self.model_space.iter())
            .chain(self.paper_layouts.iter().flat_map(|l| l.entities.iter()))
    }
}
