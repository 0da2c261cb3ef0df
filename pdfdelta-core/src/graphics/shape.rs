//! The interpreter's output: an ordered list of drawable and paint commands.
//!
//! Geometry comes first and the paint command that consumes it follows, so
//! a renderer walks the list once: `Path` then `Fill`/`Stroke`, `TextRun`
//! then its paints. Coordinates are in page space.

use super::color::Paint;
use super::path::{FillRule, LineCap, LineJoin, Path};
use super::state::{LineDashPattern, TextRenderMode};
use crate::geometry::{Matrix, Point, Rectangle};
use crate::objects::{Dictionary, ObjectId};
use std::sync::Arc;

/// Stroke parameters captured when the stroke was painted.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    /// Width in user space
    pub width: f64,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: f64,
    pub dash: LineDashPattern,
    /// CTM in effect, to scale the width
    pub ctm: Matrix,
}

/// One shown glyph, positioned relative to the start of its run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub code: u32,
    /// Origin in em units along the run
    pub position: Point,
    /// Advance in em units, without spacing
    pub width: f64,
}

/// Text shown by one `Tj`, `TJ`, `'` or `"`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// Raw string bytes as shown
    pub bytes: Vec<u8>,
    pub glyphs: Vec<Glyph>,
    /// Font resource name, if selected by name
    pub font: Option<String>,
    pub font_size: f64,
    /// Total advance in em units, spacing included
    pub advance: f64,
    /// Maps em space to page space: size, scale and rise, then Tm, then CTM
    pub matrix: Matrix,
    pub render_mode: TextRenderMode,
    pub vertical: bool,
}

impl TextRun {
    /// Page-space origin of the run.
    pub fn origin(&self) -> Point {
        self.matrix.transform_point(Point::origin())
    }
}

/// An image painted by `Do` or an inline `BI`/`ID`/`EI`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePaint {
    /// XObject resource name; `None` for inline images
    pub name: Option<String>,
    pub id: Option<ObjectId>,
    /// Image dictionary, with inline abbreviations expanded
    pub dict: Dictionary,
    /// Bytes after the filter pipeline; image codecs are left encoded
    pub data: Arc<Vec<u8>>,
    /// Maps the unit square, top row first, to page space
    pub matrix: Matrix,
    pub alpha: f64,
}

impl ImagePaint {
    pub fn width(&self) -> Option<i64> {
        self.dict.get_integer("Width")
    }

    pub fn height(&self) -> Option<i64> {
        self.dict.get_integer("Height")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Path(Path),
    /// Fill the preceding geometry
    Fill {
        paint: Paint,
        alpha: f64,
        rule: FillRule,
    },
    /// Stroke the preceding geometry
    Stroke {
        paint: Paint,
        alpha: f64,
        style: StrokeStyle,
    },
    /// Pattern paint source for the next fill or stroke
    PatternPaint {
        name: String,
        pattern_type: Option<i64>,
        stroke: bool,
        matrix: Matrix,
    },
    /// `sh`: paint a shading over the current clip
    Shading {
        name: String,
        matrix: Matrix,
        alpha: f64,
    },
    /// Intersect the clip with the preceding path
    Clip { rule: FillRule, bounds: Rectangle },
    /// Intersect the clip with a rectangle (form BBox)
    ClipRect(Rectangle),
    /// The clip after a restore; `None` is unclipped
    ResetClip(Option<Rectangle>),
    TextRun(TextRun),
    /// Clip to the text runs shown in a clipping render mode
    ClipText(Vec<TextRun>),
    Image(ImagePaint),
    BeginMarkedContent {
        tag: String,
        properties: Option<Dictionary>,
    },
    EndMarkedContent,
}

/// Width and bounding box declared by `d0`/`d1` in a Type 3 glyph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub width: Point,
    pub bbox: Option<Rectangle>,
}

/// Append-only result of interpreting a content stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeList {
    shapes: Vec<Shape>,
    incomplete: bool,
    glyph_metrics: Option<GlyphMetrics>,
}

impl ShapeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    /// Merge a form's shapes at the current position.
    pub fn append(&mut self, mut other: ShapeList) {
        self.shapes.append(&mut other.shapes);
        self.incomplete |= other.incomplete;
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn into_shapes(self) -> Vec<Shape> {
        self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Shape> {
        self.shapes.iter()
    }

    /// True when interpretation was cancelled before the end of the stream.
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    pub fn glyph_metrics(&self) -> Option<GlyphMetrics> {
        self.glyph_metrics
    }

    pub fn set_glyph_metrics(&mut self, metrics: GlyphMetrics) {
        self.glyph_metrics = Some(metrics);
    }

    pub fn text_runs(&self) -> impl Iterator<Item = &TextRun> {
        self.shapes.iter().filter_map(|shape| match shape {
            Shape::TextRun(run) => Some(run),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a ShapeList {
    type Item = &'a Shape;
    type IntoIter = std::slice::Iter<'a, Shape>;

    fn into_iter(self) -> Self::IntoIter {
        self.shapes.iter()
    }
}
