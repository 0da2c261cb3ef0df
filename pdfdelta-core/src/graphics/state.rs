//! Graphics state according to ISO 32000-1 Section 8.4
//!
//! [`GraphicsState`] is the full snapshot pushed by `q`; [`ExtGState`] holds
//! the parameters of an `ExtGState` resource applied by `gs`.

use super::color::{ColorSpace, Paint};
use super::path::{LineCap, LineJoin};
use crate::geometry::{Matrix, Rectangle};
use crate::objects::{Dictionary, Object, ObjectId, Resolve};
use tracing::{debug, warn};

/// Rendering intent values according to ISO 32000-1
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RenderingIntent {
    /// Absolute colorimetric
    AbsoluteColorimetric,
    /// Relative colorimetric
    #[default]
    RelativeColorimetric,
    /// Saturation
    Saturation,
    /// Perceptual
    Perceptual,
}

impl RenderingIntent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "AbsoluteColorimetric" => Some(RenderingIntent::AbsoluteColorimetric),
            "RelativeColorimetric" => Some(RenderingIntent::RelativeColorimetric),
            "Saturation" => Some(RenderingIntent::Saturation),
            "Perceptual" => Some(RenderingIntent::Perceptual),
            _ => None,
        }
    }

    /// Get the PDF name for this rendering intent
    pub fn pdf_name(&self) -> &'static str {
        match self {
            RenderingIntent::AbsoluteColorimetric => "AbsoluteColorimetric",
            RenderingIntent::RelativeColorimetric => "RelativeColorimetric",
            RenderingIntent::Saturation => "Saturation",
            RenderingIntent::Perceptual => "Perceptual",
        }
    }
}

/// Line dash pattern specification
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineDashPattern {
    /// Array of dash and gap lengths
    pub array: Vec<f64>,
    /// Phase offset
    pub phase: f64,
}

impl LineDashPattern {
    /// Create a new line dash pattern
    pub fn new(array: Vec<f64>, phase: f64) -> Self {
        Self { array, phase }
    }

    /// Create a solid line (no dashes)
    pub fn solid() -> Self {
        Self::default()
    }

    pub fn is_solid(&self) -> bool {
        self.array.is_empty() || self.array.iter().all(|&len| len == 0.0)
    }

    /// `[array phase]` as stored in an ExtGState `D` entry.
    fn from_object(resolver: &dyn Resolve, object: &Object) -> Option<Self> {
        let object = resolver.follow(object);
        let [array, phase] = object.as_array()? else {
            return None;
        };
        let array = resolver
            .follow(array)
            .as_array()?
            .iter()
            .filter_map(Object::as_number)
            .collect();
        Some(Self::new(array, phase.as_number().unwrap_or(0.0)))
    }
}

/// Text rendering mode set by `Tr` (ISO 32000-1 Table 106).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextRenderMode {
    #[default]
    Fill,
    Stroke,
    FillStroke,
    Invisible,
    FillClip,
    StrokeClip,
    FillStrokeClip,
    Clip,
}

impl TextRenderMode {
    pub fn from_i64(value: i64) -> Option<Self> {
        Some(match value {
            0 => TextRenderMode::Fill,
            1 => TextRenderMode::Stroke,
            2 => TextRenderMode::FillStroke,
            3 => TextRenderMode::Invisible,
            4 => TextRenderMode::FillClip,
            5 => TextRenderMode::StrokeClip,
            6 => TextRenderMode::FillStrokeClip,
            7 => TextRenderMode::Clip,
            _ => return None,
        })
    }

    pub fn fills(&self) -> bool {
        matches!(
            self,
            TextRenderMode::Fill
                | TextRenderMode::FillStroke
                | TextRenderMode::FillClip
                | TextRenderMode::FillStrokeClip
        )
    }

    pub fn strokes(&self) -> bool {
        matches!(
            self,
            TextRenderMode::Stroke
                | TextRenderMode::FillStroke
                | TextRenderMode::StrokeClip
                | TextRenderMode::FillStrokeClip
        )
    }

    pub fn clips(&self) -> bool {
        matches!(
            self,
            TextRenderMode::FillClip
                | TextRenderMode::StrokeClip
                | TextRenderMode::FillStrokeClip
                | TextRenderMode::Clip
        )
    }
}

/// The font selected by `Tf` or by an ExtGState `Font` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FontKey {
    /// Name in the `Font` resource dictionary
    Resource(String),
    /// Font dictionary referenced directly
    Reference(ObjectId),
}

/// Text state parameters (ISO 32000-1 Section 9.3) and the text matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct TextState {
    pub font: Option<FontKey>,
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// `Tz` as a fraction: 100 percent is 1.0
    pub horizontal_scale: f64,
    pub leading: f64,
    pub render_mode: TextRenderMode,
    pub rise: f64,
    pub knockout: bool,
    /// Tm
    pub matrix: Matrix,
    /// Tlm
    pub line_matrix: Matrix,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            render_mode: TextRenderMode::Fill,
            rise: 0.0,
            knockout: true,
            matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
        }
    }
}

/// Complete graphics state, the unit saved by `q` and restored by `Q`.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub ctm: Matrix,
    /// Bounds of the clip region in page space; `None` is unclipped
    pub clip: Option<Rectangle>,
    pub fill_color_space: ColorSpace,
    pub fill: Paint,
    pub stroke_color_space: ColorSpace,
    pub stroke: Paint,
    pub line_width: f64,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    pub miter_limit: f64,
    pub dash: LineDashPattern,
    pub rendering_intent: RenderingIntent,
    pub flatness: f64,
    pub text: TextState,
    pub fill_alpha: f64,
    pub stroke_alpha: f64,
    pub overprint_fill: bool,
    pub overprint_stroke: bool,
    pub overprint_mode: u8,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            clip: None,
            fill_color_space: ColorSpace::DeviceGray,
            fill: Paint::default(),
            stroke_color_space: ColorSpace::DeviceGray,
            stroke: Paint::default(),
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: LineDashPattern::solid(),
            rendering_intent: RenderingIntent::default(),
            flatness: 1.0,
            text: TextState::default(),
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            overprint_fill: false,
            overprint_stroke: false,
            overprint_mode: 0,
        }
    }
}

impl GraphicsState {
    /// State for a page whose user space is mapped by `ctm`.
    pub fn with_ctm(ctm: Matrix) -> Self {
        Self {
            ctm,
            ..Self::default()
        }
    }

    /// Narrow the clip to `bounds` (page space).
    pub fn intersect_clip(&mut self, bounds: Rectangle) {
        self.clip = Some(match self.clip {
            Some(current) => current.intersect(&bounds),
            None => bounds,
        });
    }

    /// Fill alpha with the overprint approximation applied.
    pub fn effective_fill_alpha(&self, overprint_alpha: f64) -> f64 {
        if self.overprint_fill {
            self.fill_alpha * overprint_alpha
        } else {
            self.fill_alpha
        }
    }

    /// Stroke alpha with the overprint approximation applied.
    pub fn effective_stroke_alpha(&self, overprint_alpha: f64) -> f64 {
        if self.overprint_stroke {
            self.stroke_alpha * overprint_alpha
        } else {
            self.stroke_alpha
        }
    }

    /// Apply the parameters of an ExtGState resource.
    pub fn apply(&mut self, ext: &ExtGState) {
        if let Some(width) = ext.line_width {
            self.line_width = width;
        }
        if let Some(cap) = ext.line_cap {
            self.line_cap = cap;
        }
        if let Some(join) = ext.line_join {
            self.line_join = join;
        }
        if let Some(limit) = ext.miter_limit {
            self.miter_limit = limit;
        }
        if let Some(dash) = &ext.dash_pattern {
            self.dash = dash.clone();
        }
        if let Some(intent) = ext.rendering_intent {
            self.rendering_intent = intent;
        }
        if let Some(flatness) = ext.flatness {
            self.flatness = flatness;
        }
        if let Some((font, size)) = &ext.font {
            self.text.font = Some(FontKey::Reference(*font));
            self.text.font_size = *size;
        }
        if let Some(alpha) = ext.alpha_stroke {
            self.stroke_alpha = alpha;
        }
        if let Some(alpha) = ext.alpha_fill {
            self.fill_alpha = alpha;
        }
        // OP sets both flags unless op is also present
        if let Some(overprint) = ext.overprint_stroke {
            self.overprint_stroke = overprint;
            if ext.overprint_fill.is_none() {
                self.overprint_fill = overprint;
            }
        }
        if let Some(overprint) = ext.overprint_fill {
            self.overprint_fill = overprint;
        }
        if let Some(mode) = ext.overprint_mode {
            self.overprint_mode = mode;
        }
        if let Some(knockout) = ext.text_knockout {
            self.text.knockout = knockout;
        }
    }
}

/// Extended graphics state parameters read from a resource dictionary.
/// Absent entries leave the state unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtGState {
    pub line_width: Option<f64>,
    pub line_cap: Option<LineCap>,
    pub line_join: Option<LineJoin>,
    pub miter_limit: Option<f64>,
    pub dash_pattern: Option<LineDashPattern>,
    pub rendering_intent: Option<RenderingIntent>,
    pub overprint_stroke: Option<bool>,
    pub overprint_fill: Option<bool>,
    pub overprint_mode: Option<u8>,
    pub font: Option<(ObjectId, f64)>,
    pub flatness: Option<f64>,
    pub alpha_stroke: Option<f64>,
    pub alpha_fill: Option<f64>,
    pub text_knockout: Option<bool>,
}

impl ExtGState {
    pub fn from_dict(resolver: &dyn Resolve, dict: &Dictionary) -> Self {
        let number = |key: &str| dict.get(key).and_then(|v| resolver.follow(v).as_number());
        let integer = |key: &str| dict.get(key).and_then(|v| resolver.follow(v).as_integer());
        let boolean = |key: &str| dict.get(key).and_then(|v| resolver.follow(v).as_bool());

        let font = dict.get("Font").and_then(|value| {
            let value = resolver.follow(value);
            match value.as_array() {
                Some([Object::Reference(font), size]) => Some((*font, size.as_number()?)),
                _ => {
                    debug!("Ignoring ExtGState Font entry that is not [ref size]");
                    None
                }
            }
        });

        Self {
            line_width: number("LW"),
            line_cap: integer("LC").and_then(LineCap::from_i64),
            line_join: integer("LJ").and_then(LineJoin::from_i64),
            miter_limit: number("ML"),
            dash_pattern: dict.get("D").and_then(|d| LineDashPattern::from_object(resolver, d)),
            rendering_intent: dict.get_name("RI").and_then(RenderingIntent::from_name),
            overprint_stroke: boolean("OP"),
            overprint_fill: boolean("op"),
            overprint_mode: integer("OPM").and_then(|m| u8::try_from(m).ok()),
            font,
            flatness: number("FL"),
            alpha_stroke: number("CA").map(|a| a.clamp(0.0, 1.0)),
            alpha_fill: number("ca").map(|a| a.clamp(0.0, 1.0)),
            text_knockout: boolean("TK"),
        }
    }
}

/// The `q`/`Q` stack. Popping an empty stack yields a fresh state.
#[derive(Debug, Clone, Default)]
pub struct GraphicsStateStack {
    saved: Vec<GraphicsState>,
}

impl GraphicsStateStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    pub fn push(&mut self, state: &GraphicsState) {
        self.saved.push(state.clone());
    }

    /// The saved state, or the identity state when nothing was saved.
    pub fn pop(&mut self) -> GraphicsState {
        self.saved.pop().unwrap_or_else(|| {
            warn!("Q without matching q, resetting graphics state");
            GraphicsState::default()
        })
    }
}
