//! Text operators: BT ET, the text state and positioning operators, and
//! the four text-showing operators.
//!
//! Glyph positions are accumulated in em units along the writing
//! direction. Inside a `TJ` array the start of each glyph is ratcheted so
//! it never lies before the end of the glyph drawn just before it.

use super::{Interpreter, Mode};
use crate::fonts::{FontMetrics, SimpleFontMetrics};
use crate::geometry::{Matrix, Point};
use crate::graphics::{FillRule, FontKey, Glyph, Shape, TextRenderMode, TextRun};
use crate::objects::Object;
use crate::parser::Operator;
use std::sync::Arc;
use tracing::{debug, warn};

/// Width used when no font can be found.
const FALLBACK_WIDTH: f64 = 500.0;

/// One element of a shown string sequence.
enum TextElement<'o> {
    Bytes(&'o [u8]),
    /// TJ adjustment in thousandths of an em, subtracted from the position
    Adjust(f64),
}

impl Interpreter<'_> {
    pub(super) fn begin_text(&mut self) {
        if self.mode == Mode::InTextBlock {
            warn!("Nested BT");
        }
        self.mode = Mode::InTextBlock;
        self.state.text.matrix = Matrix::IDENTITY;
        self.state.text.line_matrix = Matrix::IDENTITY;
        self.text_clip.clear();
    }

    pub(super) fn end_text(&mut self) {
        self.mode = Mode::Normal;
        if !self.text_clip.is_empty() {
            let runs = std::mem::take(&mut self.text_clip);
            self.shapes.push(Shape::ClipText(runs));
        }
    }

    pub(super) fn text_state_op(&mut self, op: Operator) {
        match op {
            Operator::SetFont => {
                let size = self.operands.last().and_then(Object::as_number);
                let name = self
                    .operands
                    .len()
                    .checked_sub(2)
                    .and_then(|i| self.operands[i].as_name())
                    .map(str::to_owned);
                match (name, size) {
                    (Some(name), Some(size)) => {
                        self.state.text.font = Some(FontKey::Resource(name));
                        self.state.text.font_size = size;
                    }
                    _ => self.bad_operands(op),
                }
            }
            Operator::MoveText | Operator::MoveTextSetLeading => match self.numbers::<2>() {
                Some([tx, ty]) => {
                    if op == Operator::MoveTextSetLeading {
                        self.state.text.leading = -ty;
                    }
                    self.next_line(tx, ty);
                }
                None => self.bad_operands(op),
            },
            Operator::SetTextMatrix => match self.numbers::<6>() {
                Some([a, b, c, d, e, f]) => {
                    let m = Matrix::new(a, b, c, d, e, f);
                    self.state.text.matrix = m;
                    self.state.text.line_matrix = m;
                }
                None => self.bad_operands(op),
            },
            Operator::NextLine => {
                let leading = self.state.text.leading;
                self.next_line(0.0, -leading);
            }
            Operator::SetRenderMode => {
                match self.numbers::<1>().and_then(|[m]| TextRenderMode::from_i64(m as i64)) {
                    Some(mode) => self.state.text.render_mode = mode,
                    None => self.bad_operands(op),
                }
            }
            _ => {
                let Some([value]) = self.numbers::<1>() else {
                    return self.bad_operands(op);
                };
                let text = &mut self.state.text;
                match op {
                    Operator::SetCharSpacing => text.char_spacing = value,
                    Operator::SetWordSpacing => text.word_spacing = value,
                    Operator::SetLeading => text.leading = value,
                    Operator::SetHorizontalScale => text.horizontal_scale = value / 100.0,
                    Operator::SetRise => text.rise = value,
                    _ => {}
                }
            }
        }
    }

    /// Td: start a new line offset from the start of the current one.
    fn next_line(&mut self, tx: f64, ty: f64) {
        let text = &mut self.state.text;
        let m = Matrix::translate(tx, ty).concat(&text.line_matrix);
        text.line_matrix = m;
        text.matrix = m;
    }

    pub(super) fn show_text_op(&mut self, op: Operator) {
        if self.mode != Mode::InTextBlock {
            debug!("{} outside BT/ET", op);
        }
        let operands = std::mem::take(&mut self.operands);
        match op {
            Operator::ShowText | Operator::NextLineShowText => {
                let Some(Object::String(string)) = operands.last() else {
                    self.operands = operands;
                    return self.bad_operands(op);
                };
                if op == Operator::NextLineShowText {
                    let leading = self.state.text.leading;
                    self.next_line(0.0, -leading);
                }
                self.show(&[TextElement::Bytes(string.as_bytes())], false);
            }
            Operator::NextLineShowTextSpacing => {
                let [.., aw, ac, Object::String(string)] = operands.as_slice() else {
                    self.operands = operands;
                    return self.bad_operands(op);
                };
                let (Some(aw), Some(ac)) = (aw.as_number(), ac.as_number()) else {
                    self.operands = operands;
                    return self.bad_operands(op);
                };
                self.state.text.word_spacing = aw;
                self.state.text.char_spacing = ac;
                let leading = self.state.text.leading;
                self.next_line(0.0, -leading);
                self.show(&[TextElement::Bytes(string.as_bytes())], false);
            }
            Operator::ShowTextArray => {
                let Some(Object::Array(items)) = operands.last() else {
                    self.operands = operands;
                    return self.bad_operands(op);
                };
                let elements: Vec<TextElement<'_>> = items
                    .iter()
                    .filter_map(|item| match item {
                        Object::String(s) => Some(TextElement::Bytes(s.as_bytes())),
                        other => other.as_number().map(TextElement::Adjust),
                    })
                    .collect();
                self.show(&elements, true);
            }
            _ => {}
        }
    }

    /// Lay out `elements`, emit one run with its paints, and advance Tm.
    fn show(&mut self, elements: &[TextElement<'_>], ratchet: bool) {
        let metrics = self.font_metrics();
        let text = &self.state.text;
        let size = text.font_size;
        // Spacing is in unscaled text space units; glyph positions are in ems
        let spacing_scale = if size != 0.0 { 1.0 / size } else { 0.0 };
        let vertical = metrics.is_vertical();
        let single_byte = metrics.code_length() == 1;

        let mut bytes = Vec::new();
        let mut glyphs = Vec::new();
        let mut pen = 0.0_f64;
        let mut previous_end: Option<f64> = None;

        for element in elements {
            match element {
                TextElement::Adjust(amount) => pen -= amount / 1000.0,
                TextElement::Bytes(shown) => {
                    bytes.extend_from_slice(shown);
                    for code in metrics.codes(shown) {
                        let mut spacing = text.char_spacing;
                        if single_byte && code == 32 {
                            spacing += text.word_spacing;
                        }
                        let spacing = spacing * spacing_scale;
                        let w0 = metrics.advance(code) / 1000.0;

                        if vertical {
                            let v = metrics.vertical_metrics(code);
                            let w1 = v.w1 / 1000.0;
                            // Writing proceeds downwards
                            let start = match previous_end {
                                Some(end) if ratchet => pen.min(end),
                                _ => pen,
                            };
                            glyphs.push(Glyph {
                                code,
                                position: Point::new(-v.vx / 1000.0, start - v.vy / 1000.0),
                                width: w1,
                            });
                            previous_end = Some(start + w1);
                            pen = start + w1 + spacing;
                        } else {
                            let start = match previous_end {
                                Some(end) if ratchet => pen.max(end),
                                _ => pen,
                            };
                            glyphs.push(Glyph {
                                code,
                                position: Point::new(start, 0.0),
                                width: w0,
                            });
                            previous_end = Some(start + w0);
                            pen = start + w0 + spacing;
                        }
                    }
                }
            }
        }

        let font = match &text.font {
            Some(FontKey::Resource(name)) => Some(name.clone()),
            _ => None,
        };
        let render_mode = text.render_mode;
        let matrix = Matrix::new(size * text.horizontal_scale, 0.0, 0.0, size, 0.0, text.rise)
            .concat(&text.matrix)
            .concat(&self.state.ctm);
        let displacement = if vertical {
            Matrix::translate(0.0, pen * size)
        } else {
            Matrix::translate(pen * size * text.horizontal_scale, 0.0)
        };
        self.state.text.matrix = displacement.concat(&self.state.text.matrix);

        if glyphs.is_empty() {
            return;
        }
        let run = TextRun {
            bytes,
            glyphs,
            font,
            font_size: size,
            advance: pen,
            matrix,
            render_mode,
            vertical,
        };
        self.emit_text_run(run);
    }

    fn emit_text_run(&mut self, run: TextRun) {
        let mode = run.render_mode;
        if mode.fills() {
            self.push_pattern_paint(false);
        }
        if mode.strokes() {
            self.push_pattern_paint(true);
        }
        if mode.clips() {
            self.text_clip.push(run.clone());
        }
        self.shapes.push(Shape::TextRun(run));
        if mode.fills() {
            self.push_fill(FillRule::NonZero);
        }
        if mode.strokes() {
            self.push_stroke();
        }
    }

    /// Metrics of the selected font, cached per font key.
    fn font_metrics(&mut self) -> Arc<dyn FontMetrics> {
        let Some(key) = self.state.text.font.clone() else {
            debug!("Text shown without a font");
            return Arc::new(SimpleFontMetrics::fixed(FALLBACK_WIDTH));
        };
        if let Some(metrics) = self.font_cache.get(&key) {
            return metrics.clone();
        }

        let font = match &key {
            FontKey::Resource(name) => self
                .resources
                .lookup(self.resolver, "Font", name)
                .map(|found| found.object),
            FontKey::Reference(id) => Some(self.resolver.resolve(*id)),
        };
        let metrics: Arc<dyn FontMetrics> = match font.as_deref().and_then(Object::as_dict) {
            Some(dict) => Arc::from(self.fonts.metrics(self.resolver, dict)),
            None => {
                warn!("Font {:?} not found", key);
                Arc::new(SimpleFontMetrics::fixed(FALLBACK_WIDTH))
            }
        };
        self.font_cache.insert(key, metrics.clone());
        metrics
    }

    /// d0 / d1 in a Type 3 glyph description.
    pub(super) fn set_glyph_metrics(&mut self, op: Operator) {
        use crate::geometry::Rectangle;
        use crate::graphics::GlyphMetrics;

        let metrics = match op {
            Operator::SetGlyphWidth => self.numbers::<2>().map(|[wx, wy]| GlyphMetrics {
                width: Point::new(wx, wy),
                bbox: None,
            }),
            _ => self.numbers::<6>().map(|[wx, wy, llx, lly, urx, ury]| GlyphMetrics {
                width: Point::new(wx, wy),
                bbox: Some(Rectangle::from_corners(Point::new(llx, lly), Point::new(urx, ury))),
            }),
        };
        match metrics {
            Some(metrics) => self.shapes.set_glyph_metrics(metrics),
            None => self.bad_operands(op),
        }
    }
}
