//! Path construction, painting and clipping operators.

use super::Interpreter;
use crate::geometry::Point;
use crate::graphics::{FillRule, Paint, Shape, StrokeStyle};
use crate::parser::Operator;
use tracing::warn;

impl Interpreter<'_> {
    /// m, l, c, v, y, h, re. A malformed segment abandons the path.
    pub(super) fn construct_path(&mut self, op: Operator) {
        let ctm = self.state.ctm;
        let ok = match op {
            Operator::MoveTo => self.numbers::<2>().map(|[x, y]| {
                self.path.move_to(Point::new(x, y), &ctm);
                true
            }),
            Operator::LineTo => self
                .numbers::<2>()
                .map(|[x, y]| self.path.line_to(Point::new(x, y), &ctm)),
            Operator::CurveTo => self.numbers::<6>().map(|[x1, y1, x2, y2, x3, y3]| {
                self.path
                    .curve_to(Point::new(x1, y1), Point::new(x2, y2), Point::new(x3, y3), &ctm)
            }),
            // v: the first control point is the current point
            Operator::CurveToV => self.numbers::<4>().map(|[x2, y2, x3, y3]| {
                match self.path.current_point() {
                    Some(current) => {
                        self.path
                            .curve_to(current, Point::new(x2, y2), Point::new(x3, y3), &ctm)
                    }
                    None => false,
                }
            }),
            // y: the second control point is the end point
            Operator::CurveToY => self.numbers::<4>().map(|[x1, y1, x3, y3]| {
                let end = Point::new(x3, y3);
                self.path.curve_to(Point::new(x1, y1), end, end, &ctm)
            }),
            Operator::ClosePath => {
                self.path.close();
                Some(true)
            }
            Operator::Rectangle => self.numbers::<4>().map(|[x, y, w, h]| {
                self.path.rectangle(x, y, w, h, &ctm);
                true
            }),
            _ => Some(true),
        };

        if ok != Some(true) {
            warn!("Abandoning path at {} with operands {:?}", op, self.operands);
            self.path.take();
        }
    }

    /// Emit the current path with the requested paints, then apply any
    /// pending clip. The path is consumed either way.
    pub(super) fn paint_path(&mut self, fill: Option<FillRule>, stroke: bool, close: bool) {
        if close {
            self.path.close();
        }
        let path = self.path.take();
        let clip = self.pending_clip.take();
        if path.is_empty() {
            return;
        }
        if fill.is_none() && !stroke && clip.is_none() {
            // n without W
            return;
        }

        let bounds = path.bounds();
        if fill.is_some() {
            self.push_pattern_paint(false);
        }
        if stroke {
            self.push_pattern_paint(true);
        }
        self.shapes.push(Shape::Path(path));
        if let Some(rule) = fill {
            self.push_fill(rule);
        }
        if stroke {
            self.push_stroke();
        }

        if let (Some(rule), Some(bounds)) = (clip, bounds) {
            self.state.intersect_clip(bounds);
            self.shapes.push(Shape::Clip { rule, bounds });
        }
    }

    pub(super) fn push_fill(&mut self, rule: FillRule) {
        self.shapes.push(Shape::Fill {
            paint: self.state.fill.clone(),
            alpha: self.state.effective_fill_alpha(self.options.overprint_alpha),
            rule,
        });
    }

    pub(super) fn push_stroke(&mut self) {
        let state = &self.state;
        self.shapes.push(Shape::Stroke {
            paint: state.stroke.clone(),
            alpha: state.effective_stroke_alpha(self.options.overprint_alpha),
            style: StrokeStyle {
                width: state.line_width,
                cap: state.line_cap,
                join: state.line_join,
                miter_limit: state.miter_limit,
                dash: state.dash.clone(),
                ctm: state.ctm,
            },
        });
    }

    /// The pattern source for the next fill or stroke, when the paint is a pattern.
    pub(super) fn push_pattern_paint(&mut self, stroke: bool) {
        let paint = if stroke { &self.state.stroke } else { &self.state.fill };
        let Paint::Pattern { name, .. } = paint else {
            return;
        };
        let name = name.clone();

        let pattern = self.resources.lookup(self.resolver, "Pattern", &name);
        let dict = pattern.as_ref().and_then(|p| p.as_dict());
        if dict.is_none() {
            warn!("Pattern /{} not found", name);
        }
        let pattern_type = dict.and_then(|d| d.get_integer("PatternType"));
        let matrix = dict
            .and_then(|d| d.get_array("Matrix"))
            .and_then(|m| {
                let values: Vec<f64> = m.iter().filter_map(|v| v.as_number()).collect();
                crate::geometry::Matrix::from_slice(&values)
            })
            .unwrap_or_default()
            .concat(&self.base_ctm);

        self.shapes.push(Shape::PatternPaint {
            name,
            pattern_type,
            stroke,
            matrix,
        });
    }

    /// sh: paint a shading over the current clip.
    pub(super) fn paint_shading(&mut self) {
        let Some(name) = self.name_operand(0).map(str::to_owned) else {
            return self.bad_operands(Operator::PaintShading);
        };
        if self.resources.lookup(self.resolver, "Shading", &name).is_none() {
            warn!("Shading /{} not found", name);
            return;
        }
        self.shapes.push(Shape::Shading {
            name,
            matrix: self.state.ctm,
            alpha: self.state.effective_fill_alpha(self.options.overprint_alpha),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{run, TestSource};
    use crate::geometry::{Point, Rectangle};
    use crate::graphics::{FillRule, PathCommand, Shape};
    use crate::objects::{Dictionary, Object};

    #[test]
    fn test_curve_variants_use_current_point() {
        let shapes = run(&TestSource::default(), None, "0 0 m 1 1 2 2 v 3 3 4 4 y S");
        let Shape::Path(path) = &shapes.shapes()[0] else {
            panic!("expected a path");
        };
        assert_eq!(
            path.commands()[1],
            PathCommand::CurveTo(Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0))
        );
        assert_eq!(
            path.commands()[2],
            PathCommand::CurveTo(Point::new(3.0, 3.0), Point::new(4.0, 4.0), Point::new(4.0, 4.0))
        );
    }

    #[test]
    fn test_fill_stroke_emits_one_path() {
        let shapes = run(&TestSource::default(), None, "0 0 10 10 re B*");
        assert_eq!(shapes.len(), 3);
        assert!(matches!(shapes.shapes()[0], Shape::Path(_)));
        assert!(matches!(
            shapes.shapes()[1],
            Shape::Fill {
                rule: FillRule::EvenOdd,
                ..
            }
        ));
        assert!(matches!(shapes.shapes()[2], Shape::Stroke { .. }));
    }

    #[test]
    fn test_end_path_without_clip_emits_nothing() {
        let shapes = run(&TestSource::default(), None, "0 0 10 10 re n");
        assert!(shapes.is_empty());
    }

    #[test]
    fn test_clip_applies_after_paint() {
        let shapes = run(&TestSource::default(), None, "0 0 10 10 re W* f");
        assert_eq!(
            shapes.shapes()[2],
            Shape::Clip {
                rule: FillRule::EvenOdd,
                bounds: Rectangle::from_position_and_size(0.0, 0.0, 10.0, 10.0),
            }
        );
    }

    #[test]
    fn test_pattern_fill_precedes_geometry() {
        let mut pattern = Dictionary::new();
        pattern.set("PatternType", Object::Integer(2));
        let mut patterns = Dictionary::new();
        patterns.set("P0", Object::Dictionary(pattern));
        let mut resources = Dictionary::new();
        resources.set("Pattern", Object::Dictionary(patterns));

        let shapes = run(&TestSource::default(), Some(resources), "/Pattern cs /P0 scn 0 0 5 5 re f");
        let Shape::PatternPaint {
            name,
            pattern_type,
            stroke,
            ..
        } = &shapes.shapes()[0]
        else {
            panic!("expected a pattern paint, got {:?}", shapes.shapes()[0]);
        };
        assert_eq!(name, "P0");
        assert_eq!(*pattern_type, Some(2));
        assert!(!stroke);
        assert!(matches!(shapes.shapes()[1], Shape::Path(_)));
        assert!(matches!(shapes.shapes()[2], Shape::Fill { .. }));
    }
}
