//! Glyph metrics read from font dictionaries
//!
//! Only what text placement needs: how a shown string splits into codes,
//! and how far each code advances. Widths are in 1/1000 em.

use crate::objects::{Dictionary, Object, Resolve};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Default vertical metrics of CIDFonts (`DW2`).
const DEFAULT_DW2: (f64, f64) = (880.0, -1000.0);

/// Vertical displacement and origin of one glyph (ISO 32000-1 Section 9.7.4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalMetrics {
    /// Vertical advance, usually negative
    pub w1: f64,
    /// Position vector from the horizontal to the vertical origin
    pub vx: f64,
    pub vy: f64,
}

/// Font metrics collaborator used by text placement.
pub trait FontMetrics: Send + Sync + fmt::Debug {
    /// Bytes per character code: 1 for simple fonts, 2 for CID fonts.
    fn code_length(&self) -> usize {
        1
    }

    /// Horizontal advance of `code`.
    fn advance(&self, code: u32) -> f64;

    fn is_vertical(&self) -> bool {
        false
    }

    fn vertical_metrics(&self, code: u32) -> VerticalMetrics {
        VerticalMetrics {
            w1: DEFAULT_DW2.1,
            vx: self.advance(code) / 2.0,
            vy: DEFAULT_DW2.0,
        }
    }

    /// Character codes of a shown string. For 2-byte fonts a trailing lone
    /// byte has no partner and is dropped.
    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        match self.code_length() {
            2 => bytes
                .chunks_exact(2)
                .map(|pair| u32::from(pair[0]) << 8 | u32::from(pair[1]))
                .collect(),
            _ => bytes.iter().map(|&b| u32::from(b)).collect(),
        }
    }
}

/// Builds metrics for a font dictionary.
pub trait FontProvider: Send + Sync {
    fn metrics(&self, resolver: &dyn Resolve, font: &Dictionary) -> Box<dyn FontMetrics>;
}

/// Metrics of a simple font: `Widths`, `FirstChar`, `MissingWidth`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleFontMetrics {
    pub first_char: u32,
    pub widths: Vec<f64>,
    pub missing_width: f64,
}

impl SimpleFontMetrics {
    /// Every code has the same advance.
    pub fn fixed(width: f64) -> Self {
        Self {
            first_char: 0,
            widths: Vec::new(),
            missing_width: width,
        }
    }

    pub fn from_dict(resolver: &dyn Resolve, font: &Dictionary) -> Self {
        let descriptor = font.get("FontDescriptor").map(|d| resolver.follow(d));
        let descriptor_width = descriptor
            .as_deref()
            .and_then(Object::as_dict)
            .and_then(|d| d.get_number("MissingWidth"));

        let widths: Vec<f64> = font
            .get("Widths")
            .map(|w| resolver.follow(w))
            .and_then(|w| {
                w.as_array()
                    .map(|items| items.iter().map(|i| resolver.follow(i).as_number().unwrap_or(0.0)).collect())
            })
            .unwrap_or_default();

        // Type 3 widths are in glyph space
        let scale = match font.get_name("Subtype") {
            Some("Type3") => font
                .get("FontMatrix")
                .map(|m| resolver.follow(m))
                .and_then(|m| m.as_array().and_then(|a| a.first().and_then(Object::as_number)))
                .map_or(1.0, |a| a * 1000.0),
            _ => 1.0,
        };

        let missing_width = descriptor_width.unwrap_or_else(|| {
            if widths.is_empty() {
                standard_font_width(font.get_name("BaseFont").unwrap_or(""))
            } else {
                0.0
            }
        });

        Self {
            first_char: font
                .get_integer("FirstChar")
                .and_then(|c| u32::try_from(c).ok())
                .unwrap_or(0),
            widths: widths.into_iter().map(|w| w * scale).collect(),
            missing_width: missing_width * scale,
        }
    }
}

impl FontMetrics for SimpleFontMetrics {
    fn advance(&self, code: u32) -> f64 {
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .unwrap_or(self.missing_width)
    }
}

/// Width of a standard 14 font without a `Widths` array. Courier is
/// monospaced; the others get an average width.
fn standard_font_width(base_font: &str) -> f64 {
    if base_font.starts_with("Courier") {
        600.0
    } else {
        500.0
    }
}

/// Metrics of a Type0 font through its descendant CIDFont.
/// Codes are taken as CIDs (Identity CMaps).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CidFontMetrics {
    widths: HashMap<u32, f64>,
    default_width: f64,
    vertical: bool,
    vertical_widths: HashMap<u32, VerticalMetrics>,
    default_vertical: (f64, f64),
}

impl CidFontMetrics {
    pub fn from_dict(resolver: &dyn Resolve, font: &Dictionary) -> Self {
        let vertical = match font.get("Encoding").map(|e| resolver.follow(e)) {
            Some(encoding) => match &*encoding {
                Object::Name(name) => name.ends_with("-V"),
                Object::Stream(cmap) => cmap.dictionary().get_integer("WMode") == Some(1),
                _ => false,
            },
            None => false,
        };

        let descendant = font
            .get("DescendantFonts")
            .map(|d| resolver.follow(d))
            .and_then(|d| d.as_array().and_then(|a| a.first().cloned()))
            .map(|d| (*resolver.follow(&d)).clone());
        let Some(Object::Dictionary(cid_font)) = descendant else {
            debug!("Type0 font without a descendant CIDFont");
            return Self {
                default_width: 1000.0,
                vertical,
                default_vertical: DEFAULT_DW2,
                ..Self::default()
            };
        };

        let default_width = cid_font.get_number("DW").unwrap_or(1000.0);
        let default_vertical = cid_font
            .get("DW2")
            .map(|d| resolver.follow(d))
            .and_then(|d| match d.as_array() {
                Some([vy, w1]) => Some((vy.as_number()?, w1.as_number()?)),
                _ => None,
            })
            .unwrap_or(DEFAULT_DW2);

        let mut metrics = Self {
            widths: HashMap::new(),
            default_width,
            vertical,
            vertical_widths: HashMap::new(),
            default_vertical,
        };
        if let Some(w) = cid_font.get("W").map(|w| resolver.follow(w)) {
            metrics.read_widths(resolver, w.as_array().unwrap_or(&[]));
        }
        if let Some(w2) = cid_font.get("W2").map(|w| resolver.follow(w)) {
            metrics.read_vertical_widths(resolver, w2.as_array().unwrap_or(&[]));
        }
        metrics
    }

    /// `W`: `c [w1 w2 ...]` or `cfirst clast w`.
    fn read_widths(&mut self, resolver: &dyn Resolve, items: &[Object]) {
        let mut i = 0;
        while i < items.len() {
            let Some(first) = items[i].as_integer().and_then(|c| u32::try_from(c).ok()) else {
                break;
            };
            match items.get(i + 1).map(|next| resolver.follow(next)) {
                Some(next) if next.as_array().is_some() => {
                    let list = next.as_array().unwrap_or(&[]);
                    for (offset, width) in list.iter().enumerate() {
                        if let Some(width) = width.as_number() {
                            self.widths.insert(first + offset as u32, width);
                        }
                    }
                    i += 2;
                }
                Some(next) => {
                    let last = next.as_integer().and_then(|c| u32::try_from(c).ok());
                    let width = items.get(i + 2).and_then(Object::as_number);
                    let (Some(last), Some(width)) = (last, width) else {
                        break;
                    };
                    for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                        self.widths.insert(cid, width);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    /// `W2`: `c [w1y vx vy ...]` or `cfirst clast w1y vx vy`.
    fn read_vertical_widths(&mut self, resolver: &dyn Resolve, items: &[Object]) {
        let mut i = 0;
        while i < items.len() {
            let Some(first) = items[i].as_integer().and_then(|c| u32::try_from(c).ok()) else {
                break;
            };
            match items.get(i + 1).map(|next| resolver.follow(next)) {
                Some(next) if next.as_array().is_some() => {
                    let list = next.as_array().unwrap_or(&[]);
                    for (offset, triple) in list.chunks_exact(3).enumerate() {
                        if let [Some(w1), Some(vx), Some(vy)] = [0, 1, 2].map(|k| triple[k].as_number()) {
                            self.vertical_widths
                                .insert(first + offset as u32, VerticalMetrics { w1, vx, vy });
                        }
                    }
                    i += 2;
                }
                Some(next) => {
                    let last = next.as_integer().and_then(|c| u32::try_from(c).ok());
                    let values: Vec<f64> = items
                        .get(i + 2..i + 5)
                        .map(|v| v.iter().filter_map(Object::as_number).collect())
                        .unwrap_or_default();
                    let (Some(last), [w1, vx, vy]) = (last, values.as_slice()) else {
                        break;
                    };
                    for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                        self.vertical_widths.insert(
                            cid,
                            VerticalMetrics {
                                w1: *w1,
                                vx: *vx,
                                vy: *vy,
                            },
                        );
                    }
                    i += 5;
                }
                None => break,
            }
        }
    }
}

impl FontMetrics for CidFontMetrics {
    fn code_length(&self) -> usize {
        2
    }

    fn advance(&self, code: u32) -> f64 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }

    fn is_vertical(&self) -> bool {
        self.vertical
    }

    fn vertical_metrics(&self, code: u32) -> VerticalMetrics {
        self.vertical_widths
            .get(&code)
            .copied()
            .unwrap_or_else(|| VerticalMetrics {
                w1: self.default_vertical.1,
                vx: self.advance(code) / 2.0,
                vy: self.default_vertical.0,
            })
    }
}

/// Reads metrics straight from the font dictionary.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFontProvider;

impl FontProvider for StandardFontProvider {
    fn metrics(&self, resolver: &dyn Resolve, font: &Dictionary) -> Box<dyn FontMetrics> {
        match font.get_name("Subtype") {
            Some("Type0") => Box::new(CidFontMetrics::from_dict(resolver, font)),
            _ => Box::new(SimpleFontMetrics::from_dict(resolver, font)),
        }
    }
}
