//! Content interpretation through the document API

mod common;

use common::PdfBuilder;
use pdfdelta::geometry::Point;
use pdfdelta::graphics::{Color, Paint, PathCommand, Shape, ShapeList};
use pdfdelta::{CancellationToken, Document};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn interpret(content: &str) -> ShapeList {
    let doc = Document::open(PdfBuilder::single_page(content).build()).unwrap();
    doc.interpret_page(0).unwrap()
}

#[test]
fn test_one_path_then_one_stroke() {
    let shapes = interpret("0 0 m 10 0 l S");
    assert_eq!(shapes.len(), 2);

    let Shape::Path(path) = &shapes.shapes()[0] else {
        panic!("expected a path, found {:?}", shapes.shapes()[0]);
    };
    assert_eq!(
        path.commands(),
        &[PathCommand::MoveTo(Point::new(0.0, 0.0)), PathCommand::LineTo(Point::new(10.0, 0.0))]
    );
    let Shape::Stroke { paint, alpha, .. } = &shapes.shapes()[1] else {
        panic!("expected a stroke, found {:?}", shapes.shapes()[1]);
    };
    assert_eq!(paint, &Paint::Solid(Color::black()));
    assert_eq!(*alpha, 1.0);
}

#[test]
fn test_stroke_uses_current_stroke_color() {
    let shapes = interpret("1 0 0 RG 0 0 1 rg 0 0 m 10 0 l S");
    assert!(matches!(
        &shapes.shapes()[1],
        Shape::Stroke { paint: Paint::Solid(Color::Rgb(r, g, b)), .. } if (*r, *g, *b) == (1.0, 0.0, 0.0)
    ));
}

#[test]
fn test_text_advance_in_em_units() {
    let shapes = interpret("BT /F1 12 Tf (AB) Tj ET");
    let run = shapes.text_runs().next().unwrap();
    assert!((run.advance - 1.2).abs() < 1e-9);
    assert_eq!(run.font_size, 12.0);
    assert_eq!(run.font.as_deref(), Some("F1"));
}

#[test]
fn test_unbalanced_restore_resets_to_identity() {
    let shapes = interpret("2 0 0 2 0 0 cm Q Q 0 0 m 10 0 l S");
    let Shape::Path(path) = shapes.iter().find(|s| matches!(s, Shape::Path(_))).unwrap() else {
        unreachable!()
    };
    assert_eq!(path.commands()[1], PathCommand::LineTo(Point::new(10.0, 0.0)));
    assert!(!shapes.is_incomplete());
}

#[test]
fn test_save_restore_scopes_the_ctm() {
    let shapes = interpret("q 2 0 0 2 0 0 cm 0 0 m 5 0 l S Q 0 0 m 5 0 l S");
    let ends: Vec<Point> = shapes
        .iter()
        .filter_map(|s| match s {
            Shape::Path(path) => path.current_point(),
            _ => None,
        })
        .collect();
    assert_eq!(ends, vec![Point::new(10.0, 0.0), Point::new(5.0, 0.0)]);
}

#[test]
fn test_garbage_operators_do_not_stop_interpretation() {
    let shapes = interpret("1 2 3 foo 0 0 m 10 0 l S 7 8");
    assert_eq!(shapes.len(), 2);
}

#[test]
fn test_cancelled_before_start() {
    let doc = Document::open(PdfBuilder::single_page("0 0 m 10 0 l S").build()).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let shapes = doc.interpret_page_with(0, Some(&token)).unwrap();
    assert!(shapes.is_incomplete());
    assert!(shapes.is_empty());
}

#[test]
fn test_each_form_invocation_paints() {
    let form = "0 0 m 1 1 l S";
    let pdf = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Contents 4 0 R \
             /Resources << /XObject << /Fm 5 0 R >> >> >>",
        )
        .stream(4, "", b"/Fm Do /Fm Do")
        .stream(5, "/Type /XObject /Subtype /Form /BBox [0 0 10 10]", form.as_bytes())
        .build();
    let doc = Document::open(pdf).unwrap();

    let complete = doc.interpret_page(0).unwrap();
    assert!(!complete.is_incomplete());
    assert_eq!(complete.iter().filter(|s| matches!(s, Shape::Stroke { .. })).count(), 2);
}

proptest! {
    #[test]
    fn prop_tj_glyphs_never_overlap(
        parts in proptest::collection::vec(("[AB]{1,4}", -2000i32..2000), 1..6)
    ) {
        let array: String = parts
            .iter()
            .map(|(text, adjust)| format!("({text}) {adjust} "))
            .collect();
        let shapes = interpret(&format!("BT /F1 10 Tf [{array}] TJ ET"));
        let run = shapes.text_runs().next().unwrap();

        for pair in run.glyphs.windows(2) {
            let end = pair[0].position.x + pair[0].width;
            prop_assert!(pair[1].position.x >= end - 1e-9);
        }
    }

    #[test]
    fn prop_paths_keep_every_point(points in proptest::collection::vec((-500i32..500, -500i32..500), 2..12)) {
        let mut content = format!("{} {} m ", points[0].0, points[0].1);
        for (x, y) in &points[1..] {
            content.push_str(&format!("{x} {y} l "));
        }
        content.push('S');
        let shapes = interpret(&content);
        let Shape::Path(path) = &shapes.shapes()[0] else {
            panic!("expected a path");
        };
        prop_assert_eq!(path.commands().len(), points.len());
    }
}
