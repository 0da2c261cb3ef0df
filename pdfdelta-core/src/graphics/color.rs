//! Colors and color spaces as the interpreter tracks them.
//!
//! Colour conversion is left to the renderer: non-device spaces keep their
//! raw components.

use crate::objects::{Object, Resolve};
use tracing::debug;

/// Represents a color in PDF documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Color {
    /// Grayscale color with value from 0.0 (black) to 1.0 (white)
    Gray(f64),
    /// RGB color (red, green, blue) with values from 0.0 to 1.0
    Rgb(f64, f64, f64),
    /// CMYK color (cyan, magenta, yellow, key/black) with values from 0.0 to 1.0
    Cmyk(f64, f64, f64, f64),
    /// Components in a space the renderer converts (ICCBased, Indexed, Separation...)
    Components(Vec<f64>),
}

impl Color {
    /// Creates an RGB color with values clamped to 0.0-1.0.
    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Color::Rgb(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
    }

    /// Creates a grayscale color with value clamped to 0.0-1.0.
    pub fn gray(value: f64) -> Self {
        Color::Gray(value.clamp(0.0, 1.0))
    }

    /// Creates a CMYK color with values clamped to 0.0-1.0.
    pub fn cmyk(c: f64, m: f64, y: f64, k: f64) -> Self {
        Color::Cmyk(
            c.clamp(0.0, 1.0),
            m.clamp(0.0, 1.0),
            y.clamp(0.0, 1.0),
            k.clamp(0.0, 1.0),
        )
    }

    /// Black color (gray 0.0).
    pub fn black() -> Self {
        Color::Gray(0.0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::black()
    }
}

/// What a fill or stroke paints with.
#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Color),
    /// A pattern resource by name, with the underlying color of an
    /// uncolored tiling pattern
    Pattern {
        name: String,
        underlying: Option<Color>,
    },
}

impl Default for Paint {
    fn default() -> Self {
        Paint::Solid(Color::black())
    }
}

/// Color space families (ISO 32000-1 Section 8.6).
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    /// `/Pattern`, optionally with the base space of uncolored patterns
    Pattern(Option<Box<ColorSpace>>),
    /// Any other family, with its component count
    Other { family: String, components: usize },
}

impl Default for ColorSpace {
    fn default() -> Self {
        ColorSpace::DeviceGray
    }
}

impl ColorSpace {
    /// Space named by a `cs`/`CS` operand. Names that are not families are
    /// looked up in the `ColorSpace` resource dictionary by the caller and
    /// passed here as `definition`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DeviceGray" | "G" | "CalGray" => Some(ColorSpace::DeviceGray),
            "DeviceRGB" | "RGB" | "CalRGB" => Some(ColorSpace::DeviceRgb),
            "DeviceCMYK" | "CMYK" => Some(ColorSpace::DeviceCmyk),
            "Pattern" => Some(ColorSpace::Pattern(None)),
            _ => None,
        }
    }

    /// Space described by a resource entry: a family name or an array such
    /// as `[/ICCBased 5 0 R]` or `[/Indexed /DeviceRGB 255 <...>]`.
    pub fn from_definition(resolver: &dyn Resolve, definition: &Object) -> Self {
        let definition = resolver.follow(definition);
        match &*definition {
            Object::Name(name) => Self::from_name(name).unwrap_or_else(|| ColorSpace::Other {
                family: name.clone(),
                components: 1,
            }),
            Object::Array(items) => {
                let family = items.first().and_then(Object::as_name).unwrap_or("");
                match family {
                    "ICCBased" => {
                        let components = items
                            .get(1)
                            .map(|stream| resolver.follow(stream))
                            .and_then(|stream| {
                                stream.as_stream().and_then(|s| s.dictionary().get_integer("N"))
                            })
                            .and_then(|n| usize::try_from(n).ok())
                            .unwrap_or(3);
                        match components {
                            1 => ColorSpace::DeviceGray,
                            4 => ColorSpace::DeviceCmyk,
                            _ => ColorSpace::DeviceRgb,
                        }
                    }
                    "Pattern" => {
                        let base = items
                            .get(1)
                            .map(|base| Box::new(Self::from_definition(resolver, base)));
                        ColorSpace::Pattern(base)
                    }
                    "DeviceN" => {
                        let components = items
                            .get(1)
                            .map(|names| resolver.follow(names))
                            .and_then(|names| names.as_array().map(<[Object]>::len))
                            .unwrap_or(1);
                        ColorSpace::Other {
                            family: family.to_string(),
                            components,
                        }
                    }
                    "Lab" => ColorSpace::Other {
                        family: family.to_string(),
                        components: 3,
                    },
                    "Indexed" | "I" | "Separation" => ColorSpace::Other {
                        family: family.to_string(),
                        components: 1,
                    },
                    other => Self::from_name(other).unwrap_or_else(|| {
                        debug!("Unknown color space family {:?}", other);
                        ColorSpace::Other {
                            family: other.to_string(),
                            components: 1,
                        }
                    }),
                }
            }
            other => {
                debug!("Color space definition is a {}", other.type_name());
                ColorSpace::DeviceGray
            }
        }
    }

    pub fn components(&self) -> usize {
        match self {
            ColorSpace::DeviceGray => 1,
            ColorSpace::DeviceRgb => 3,
            ColorSpace::DeviceCmyk => 4,
            ColorSpace::Pattern(base) => base.as_ref().map_or(0, |b| b.components()),
            ColorSpace::Other { components, .. } => *components,
        }
    }

    /// Initial color after selecting this space (ISO 32000-1 Table 74).
    pub fn initial_paint(&self) -> Paint {
        match self {
            ColorSpace::Pattern(_) => Paint::Pattern {
                name: String::new(),
                underlying: None,
            },
            other => Paint::Solid(other.color(&[])),
        }
    }

    /// Color from `sc`/`scn` components. Missing components read as 0.
    pub fn color(&self, components: &[f64]) -> Color {
        let at = |i: usize| components.get(i).copied().unwrap_or(0.0);
        match self {
            ColorSpace::DeviceGray => Color::gray(at(0)),
            ColorSpace::DeviceRgb => Color::rgb(at(0), at(1), at(2)),
            ColorSpace::DeviceCmyk if components.is_empty() => Color::cmyk(0.0, 0.0, 0.0, 1.0),
            ColorSpace::DeviceCmyk => Color::cmyk(at(0), at(1), at(2), at(3)),
            ColorSpace::Pattern(Some(base)) => base.color(components),
            ColorSpace::Pattern(None) => Color::black(),
            ColorSpace::Other { components: n, .. } => Color::Components((0..*n).map(at).collect()),
        }
    }
}
