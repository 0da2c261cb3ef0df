//! Content stream interpreter
//!
//! Replays a decoded content stream against a graphics state stack and
//! collects what it draws into a [`ShapeList`]. One interpreter serves one
//! stream on one thread; a form XObject is interpreted by a child
//! interpreter with its own state snapshot and shape list, merged into the
//! parent's list when it returns.
//!
//! # Example
//!
//! ```rust
//! use pdfdelta::graphics::Shape;
//! use pdfdelta::interpreter::{Interpreter, InterpreterOptions};
//! use pdfdelta::objects::{Object, ObjectId, Resolve, Stream};
//! use std::sync::Arc;
//!
//! struct Empty;
//!
//! impl Resolve for Empty {
//!     fn resolve(&self, _id: ObjectId) -> Arc<Object> {
//!         Arc::new(Object::Null)
//!     }
//! }
//!
//! impl pdfdelta::interpreter::ContentSource for Empty {
//!     fn decode_stream(&self, stream: &Stream) -> pdfdelta::Result<Arc<Vec<u8>>> {
//!         Ok(Arc::new(stream.raw_data().to_vec()))
//!     }
//! }
//!
//! let options = InterpreterOptions::default();
//! let shapes = Interpreter::new(&Empty, None, &options).run(b"0 0 m 10 0 l S");
//! assert!(matches!(shapes.shapes()[0], Shape::Path(_)));
//! assert!(matches!(shapes.shapes()[1], Shape::Stroke { .. }));
//! ```

mod color;
mod path;
mod resources;
mod text;
mod xobject;

pub use resources::{NamedResource, Resources};

use crate::error::{PdfError, Result};
use crate::fonts::{FontMetrics, FontProvider, StandardFontProvider};
use crate::geometry::Matrix;
use crate::graphics::{
    FillRule, FontKey, GraphicsState, GraphicsStateStack, Path, Shape, ShapeList, TextRun,
};
use crate::objects::{Dictionary, Object, ObjectId, Resolve, Stream};
use crate::parser::{ContentToken, ContentTokenizer, Operator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// What the interpreter needs from a document: reference resolution and
/// the filter pipeline.
pub trait ContentSource: Resolve {
    fn decode_stream(&self, stream: &Stream) -> Result<Arc<Vec<u8>>>;
}

impl ContentSource for crate::memory::ObjectStore {
    fn decode_stream(&self, stream: &Stream) -> Result<Arc<Vec<u8>>> {
        Ok(crate::memory::ObjectStore::decode_stream(self, stream)?)
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterOptions {
    /// Nesting limit for form XObjects
    pub max_form_depth: usize,
    /// Alpha multiplier standing in for overprint compositing
    pub overprint_alpha: f64,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_form_depth: 32,
            overprint_alpha: 0.5,
        }
    }
}

impl InterpreterOptions {
    pub fn with_max_form_depth(mut self, depth: usize) -> Self {
        self.max_form_depth = depth;
        self
    }

    pub fn with_overprint_alpha(mut self, alpha: f64) -> Self {
        self.overprint_alpha = alpha;
        self
    }
}

/// Cooperative cancellation signal, checked before every token.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    InTextBlock,
    InInlineImage,
}

/// Content stream interpreter for one stream.
pub struct Interpreter<'a> {
    resolver: &'a dyn Resolve,
    source: &'a dyn ContentSource,
    fonts: &'a dyn FontProvider,
    options: &'a InterpreterOptions,
    cancel: Option<&'a CancellationToken>,
    resources: Resources,
    state: GraphicsState,
    stack: GraphicsStateStack,
    /// CTM at the start of the stream; pattern space is relative to it
    base_ctm: Matrix,
    path: Path,
    pending_clip: Option<FillRule>,
    mode: Mode,
    /// Mode to return to after an inline image
    mode_before_image: Mode,
    operands: Vec<Object>,
    shapes: ShapeList,
    font_cache: HashMap<FontKey, Arc<dyn FontMetrics>>,
    marked_content: Vec<String>,
    text_clip: Vec<TextRun>,
    compatibility: usize,
    /// Form XObjects being interpreted, outermost first
    forms: Vec<ObjectId>,
    /// Form nesting depth of this interpreter
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new<S: ContentSource>(
        source: &'a S,
        resources: Option<Dictionary>,
        options: &'a InterpreterOptions,
    ) -> Self {
        Self {
            resolver: source,
            source,
            fonts: &StandardFontProvider,
            options,
            cancel: None,
            resources: Resources::new(resources),
            state: GraphicsState::default(),
            stack: GraphicsStateStack::new(),
            base_ctm: Matrix::IDENTITY,
            path: Path::new(),
            pending_clip: None,
            mode: Mode::Normal,
            mode_before_image: Mode::Normal,
            operands: Vec::new(),
            shapes: ShapeList::new(),
            font_cache: HashMap::new(),
            marked_content: Vec::new(),
            text_clip: Vec::new(),
            compatibility: 0,
            forms: Vec::new(),
            depth: 0,
        }
    }

    pub fn with_font_provider(mut self, fonts: &'a dyn FontProvider) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Initial CTM, mapping user space to the output space.
    pub fn with_ctm(mut self, ctm: Matrix) -> Self {
        self.state.ctm = ctm;
        self.base_ctm = ctm;
        self
    }

    /// Interpret `content` to the end. A cancelled run returns the shapes
    /// built so far, marked incomplete.
    pub fn run(mut self, content: &[u8]) -> ShapeList {
        match self.execute(content) {
            Ok(()) => {}
            Err(PdfError::Cancelled) => {
                debug!("Content stream interpretation cancelled");
                self.shapes.mark_incomplete();
            }
            Err(e) => warn!("Content stream interpretation stopped: {}", e),
        }
        self.shapes
    }

    /// Child interpreter for a form XObject.
    fn child(&self, resources: Resources, state: GraphicsState, form: Option<ObjectId>) -> Interpreter<'a> {
        let mut forms = self.forms.clone();
        forms.extend(form);
        Interpreter {
            resolver: self.resolver,
            source: self.source,
            fonts: self.fonts,
            options: self.options,
            cancel: self.cancel,
            resources,
            base_ctm: state.ctm,
            state,
            stack: GraphicsStateStack::new(),
            path: Path::new(),
            pending_clip: None,
            mode: Mode::Normal,
            mode_before_image: Mode::Normal,
            operands: Vec::new(),
            shapes: ShapeList::new(),
            font_cache: HashMap::new(),
            marked_content: Vec::new(),
            text_clip: Vec::new(),
            compatibility: 0,
            forms,
            depth: self.depth + 1,
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(PdfError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Token loop. Only cancellation ends it early.
    fn execute(&mut self, content: &[u8]) -> Result<()> {
        let mut tokenizer = ContentTokenizer::new(content);
        loop {
            self.check_cancelled()?;
            let Some(token) = tokenizer.next_token() else {
                break;
            };
            match token {
                ContentToken::Operand(operand) => self.operands.push(operand),
                ContentToken::Operator(Operator::InlineImageData) if self.mode == Mode::InInlineImage => {
                    let dict = self.inline_image_dict();
                    let length = dict
                        .get_integer("Length")
                        .and_then(|l| usize::try_from(l).ok());
                    let data = tokenizer.read_inline_image_data(length);
                    self.paint_inline_image(dict, data);
                    self.mode = self.mode_before_image;
                    self.operands.clear();
                }
                ContentToken::Operator(op) => {
                    self.dispatch(op)?;
                    self.operands.clear();
                }
                ContentToken::Unknown(word) => {
                    if self.compatibility > 0 {
                        debug!("Ignoring unknown operator {} inside BX/EX", word);
                    } else {
                        warn!("Unknown operator {} at {}", word, tokenizer.position());
                    }
                    self.operands.clear();
                }
            }
        }
        self.finish();
        Ok(())
    }

    /// End-of-stream cleanup: close what the producer left open.
    fn finish(&mut self) {
        if self.mode == Mode::InInlineImage {
            warn!("Inline image without ID at end of stream");
            self.mode = self.mode_before_image;
        }
        if self.mode == Mode::InTextBlock {
            debug!("Closing unterminated text object");
            self.end_text();
        }
        if !self.operands.is_empty() {
            warn!("Discarding {} operands left at end of stream", self.operands.len());
            self.operands.clear();
        }
        while self.marked_content.pop().is_some() {
            debug!("Closing unterminated marked content");
            self.shapes.push(Shape::EndMarkedContent);
        }
    }

    fn dispatch(&mut self, op: Operator) -> Result<()> {
        trace!("{} {:?}", op, self.operands);
        if self.mode == Mode::InInlineImage {
            if op != Operator::BeginInlineImage {
                debug!("{} inside an inline image dictionary", op);
            }
            return Ok(());
        }
        if self.mode == Mode::InTextBlock && !op.allowed_in_text_object() {
            debug!("{} inside a text object", op);
        }

        use Operator::*;
        match op {
            MoveTo | LineTo | CurveTo | CurveToV | CurveToY | ClosePath | Rectangle => self.construct_path(op),
            Stroke => self.paint_path(None, true, false),
            CloseStroke => self.paint_path(None, true, true),
            Fill => self.paint_path(Some(FillRule::NonZero), false, false),
            FillEvenOdd => self.paint_path(Some(FillRule::EvenOdd), false, false),
            FillStroke => self.paint_path(Some(FillRule::NonZero), true, false),
            FillStrokeEvenOdd => self.paint_path(Some(FillRule::EvenOdd), true, false),
            CloseFillStroke => self.paint_path(Some(FillRule::NonZero), true, true),
            CloseFillStrokeEvenOdd => self.paint_path(Some(FillRule::EvenOdd), true, true),
            EndPath => self.paint_path(None, false, false),
            Clip => self.pending_clip = Some(FillRule::NonZero),
            ClipEvenOdd => self.pending_clip = Some(FillRule::EvenOdd),

            SaveState => self.stack.push(&self.state),
            RestoreState => self.restore_state(),
            ConcatMatrix => match self.numbers::<6>() {
                Some([a, b, c, d, e, f]) => {
                    self.state.ctm = Matrix::new(a, b, c, d, e, f).concat(&self.state.ctm);
                }
                None => self.bad_operands(op),
            },
            SetLineWidth => match self.numbers::<1>() {
                Some([width]) => self.state.line_width = width,
                None => self.bad_operands(op),
            },
            SetLineCap => match self.numbers::<1>().and_then(|[cap]| crate::graphics::LineCap::from_i64(cap as i64)) {
                Some(cap) => self.state.line_cap = cap,
                None => self.bad_operands(op),
            },
            SetLineJoin => match self.numbers::<1>().and_then(|[join]| crate::graphics::LineJoin::from_i64(join as i64)) {
                Some(join) => self.state.line_join = join,
                None => self.bad_operands(op),
            },
            SetMiterLimit => match self.numbers::<1>() {
                Some([limit]) => self.state.miter_limit = limit,
                None => self.bad_operands(op),
            },
            SetDash => self.set_dash(),
            SetExtGState => self.set_ext_gstate(),
            SetRenderingIntent => {
                if let Some(intent) = self
                    .name_operand(0)
                    .and_then(crate::graphics::RenderingIntent::from_name)
                {
                    self.state.rendering_intent = intent;
                }
            }
            SetFlatness => {
                if let Some([flatness]) = self.numbers::<1>() {
                    self.state.flatness = flatness;
                }
            }

            SetFillGray | SetStrokeGray | SetFillRgb | SetStrokeRgb | SetFillCmyk | SetStrokeCmyk => {
                self.set_device_color(op)
            }
            SetFillColorSpace => self.set_color_space(false),
            SetStrokeColorSpace => self.set_color_space(true),
            SetFillColor | SetFillColorN => self.set_color(false),
            SetStrokeColor | SetStrokeColorN => self.set_color(true),
            PaintShading => self.paint_shading(),

            BeginText => self.begin_text(),
            EndText => {
                if self.mode == Mode::InTextBlock {
                    self.end_text();
                } else {
                    warn!("ET without BT");
                }
            }
            SetFont | MoveText | MoveTextSetLeading | SetTextMatrix | NextLine | SetCharSpacing
            | SetWordSpacing | SetLeading | SetRenderMode | SetHorizontalScale | SetRise => self.text_state_op(op),
            ShowText | ShowTextArray | NextLineShowText | NextLineShowTextSpacing => self.show_text_op(op),

            PaintXObject => self.paint_xobject()?,
            BeginInlineImage => {
                self.mode_before_image = self.mode;
                self.mode = Mode::InInlineImage;
            }
            InlineImageData => warn!("ID outside an inline image"),
            EndInlineImage => debug!("Stray EI"),

            BeginMarkedContent | BeginMarkedContentProps => self.begin_marked_content(op),
            EndMarkedContent => self.end_marked_content(),
            MarkedContentPoint | MarkedContentPointProps => {}

            BeginCompatibility => self.compatibility += 1,
            EndCompatibility => {
                if self.compatibility == 0 {
                    debug!("EX without BX");
                }
                self.compatibility = self.compatibility.saturating_sub(1);
            }

            SetGlyphWidth | SetGlyphWidthAndBBox => self.set_glyph_metrics(op),
        }
        Ok(())
    }

    fn restore_state(&mut self) {
        let clip_before = self.state.clip;
        let text_matrices = (self.state.text.matrix, self.state.text.line_matrix);
        self.state = self.stack.pop();
        if self.mode == Mode::InTextBlock {
            // The text matrices are not part of the saved state inside BT/ET
            self.state.text.matrix = text_matrices.0;
            self.state.text.line_matrix = text_matrices.1;
        }
        if self.state.clip != clip_before {
            self.shapes.push(Shape::ResetClip(self.state.clip));
        }
    }

    fn set_dash(&mut self) {
        let phase = self.operands.last().and_then(Object::as_number);
        let array = self
            .operands
            .len()
            .checked_sub(2)
            .and_then(|i| self.operands[i].as_array());
        match (array, phase) {
            (Some(array), Some(phase)) => {
                let lengths = array.iter().filter_map(Object::as_number).collect();
                self.state.dash = crate::graphics::LineDashPattern::new(lengths, phase);
            }
            _ => self.bad_operands(Operator::SetDash),
        }
    }

    fn set_ext_gstate(&mut self) {
        let Some(name) = self.name_operand(0).map(str::to_owned) else {
            return self.bad_operands(Operator::SetExtGState);
        };
        match self.resources.lookup(self.resolver, "ExtGState", &name) {
            Some(found) => match found.as_dict() {
                Some(dict) => {
                    let ext = crate::graphics::ExtGState::from_dict(self.resolver, dict);
                    self.state.apply(&ext);
                }
                None => warn!("ExtGState /{} is not a dictionary", name),
            },
            None => warn!("ExtGState /{} not found", name),
        }
    }

    /// The last `N` operands as numbers.
    fn numbers<const N: usize>(&self) -> Option<[f64; N]> {
        let start = self.operands.len().checked_sub(N)?;
        let mut values = [0.0; N];
        for (slot, operand) in values.iter_mut().zip(&self.operands[start..]) {
            *slot = operand.as_number()?;
        }
        Some(values)
    }

    /// Name operand `back` positions from the top of the stack.
    fn name_operand(&self, back: usize) -> Option<&str> {
        let index = self.operands.len().checked_sub(back + 1)?;
        self.operands[index].as_name()
    }

    fn bad_operands(&self, op: Operator) {
        warn!("Ignoring {} with operands {:?}", op, self.operands);
    }
}
