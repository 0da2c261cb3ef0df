//! Graphics state, paths and the shape list produced by the interpreter.

mod color;
mod path;
mod shape;
mod state;

pub use color::{Color, ColorSpace, Paint};
pub use path::{FillRule, LineCap, LineJoin, Path, PathCommand};
pub use shape::{Glyph, GlyphMetrics, ImagePaint, Shape, ShapeList, StrokeStyle, TextRun};
pub use state::{
    ExtGState, FontKey, GraphicsState, GraphicsStateStack, LineDashPattern, RenderingIntent,
    TextRenderMode, TextState,
};
