//! Color operators: g G rg RG k K cs CS sc scn SC SCN.

use super::Interpreter;
use crate::graphics::{Color, ColorSpace, Paint};
use crate::objects::Object;
use crate::parser::Operator;
use tracing::warn;

impl Interpreter<'_> {
    pub(super) fn set_device_color(&mut self, op: Operator) {
        let (space, color, stroke) = match op {
            Operator::SetFillGray | Operator::SetStrokeGray => match self.numbers::<1>() {
                Some([g]) => (ColorSpace::DeviceGray, Color::gray(g), op == Operator::SetStrokeGray),
                None => return self.bad_operands(op),
            },
            Operator::SetFillRgb | Operator::SetStrokeRgb => match self.numbers::<3>() {
                Some([r, g, b]) => (ColorSpace::DeviceRgb, Color::rgb(r, g, b), op == Operator::SetStrokeRgb),
                None => return self.bad_operands(op),
            },
            Operator::SetFillCmyk | Operator::SetStrokeCmyk => match self.numbers::<4>() {
                Some([c, m, y, k]) => (
                    ColorSpace::DeviceCmyk,
                    Color::cmyk(c, m, y, k),
                    op == Operator::SetStrokeCmyk,
                ),
                None => return self.bad_operands(op),
            },
            _ => return,
        };

        if stroke {
            self.state.stroke_color_space = space;
            self.state.stroke = Paint::Solid(color);
        } else {
            self.state.fill_color_space = space;
            self.state.fill = Paint::Solid(color);
        }
    }

    /// cs / CS: select a space and reset the color to its initial value.
    pub(super) fn set_color_space(&mut self, stroke: bool) {
        let Some(name) = self.name_operand(0).map(str::to_owned) else {
            return self.bad_operands(if stroke {
                Operator::SetStrokeColorSpace
            } else {
                Operator::SetFillColorSpace
            });
        };

        let space = ColorSpace::from_name(&name).unwrap_or_else(|| {
            match self.resources.lookup(self.resolver, "ColorSpace", &name) {
                Some(found) => ColorSpace::from_definition(self.resolver, &found.object),
                None => {
                    warn!("Color space /{} not found, using DeviceGray", name);
                    ColorSpace::DeviceGray
                }
            }
        });

        let paint = space.initial_paint();
        if stroke {
            self.state.stroke_color_space = space;
            self.state.stroke = paint;
        } else {
            self.state.fill_color_space = space;
            self.state.fill = paint;
        }
    }

    /// sc / scn / SC / SCN in the current space. A trailing name selects a pattern.
    pub(super) fn set_color(&mut self, stroke: bool) {
        let space = if stroke {
            &self.state.stroke_color_space
        } else {
            &self.state.fill_color_space
        };
        let components: Vec<f64> = self.operands.iter().filter_map(Object::as_number).collect();

        let paint = match (space, self.operands.last()) {
            (ColorSpace::Pattern(base), Some(Object::Name(name))) => Paint::Pattern {
                name: name.clone(),
                underlying: base
                    .as_ref()
                    .filter(|_| !components.is_empty())
                    .map(|base| base.color(&components)),
            },
            (ColorSpace::Pattern(_), _) => {
                warn!("Pattern color without a pattern name");
                return;
            }
            (space, _) => {
                if components.len() < space.components() {
                    warn!(
                        "Color with {} components in a {}-component space",
                        components.len(),
                        space.components()
                    );
                }
                Paint::Solid(space.color(&components))
            }
        };

        if stroke {
            self.state.stroke = paint;
        } else {
            self.state.fill = paint;
        }
    }
}
