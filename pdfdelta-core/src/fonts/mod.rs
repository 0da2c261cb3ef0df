//! Font metrics for text placement
//!
//! Fonts are external collaborators of the interpreter: it only asks how a
//! string splits into character codes and how far each code advances. The
//! [`StandardFontProvider`] answers from the font dictionary itself; callers
//! with real font programs can plug in their own [`FontProvider`].

pub mod font_metrics;

pub use font_metrics::{
    CidFontMetrics, FontMetrics, FontProvider, SimpleFontMetrics, StandardFontProvider,
    VerticalMetrics,
};
