//! External objects: `Do` for forms and images, inline images, and
//! marked content.

use super::{Interpreter, Resources};
use crate::error::Result;
use crate::geometry::{Matrix, Rectangle};
use crate::graphics::{ImagePaint, Shape};
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::parser::{Filter, Operator};
use std::sync::Arc;
use tracing::{debug, warn};

fn numbers(values: &[Object]) -> Vec<f64> {
    values.iter().filter_map(Object::as_number).collect()
}

/// Full key for an inline image dictionary abbreviation.
fn inline_key(key: &str) -> &str {
    match key {
        "BPC" => "BitsPerComponent",
        "CS" => "ColorSpace",
        "D" => "Decode",
        "DP" => "DecodeParms",
        "F" => "Filter",
        "H" => "Height",
        "IM" => "ImageMask",
        "I" => "Interpolate",
        "W" => "Width",
        "L" => "Length",
        other => other,
    }
}

fn expand_names(value: &Object, expand: &dyn Fn(&str) -> String) -> Object {
    match value {
        Object::Name(name) => Object::Name(expand(name)),
        Object::Array(items) => Object::Array(items.iter().map(|item| expand_names(item, expand)).collect()),
        other => other.clone(),
    }
}

fn inline_color_space(name: &str) -> String {
    match name {
        "G" => "DeviceGray",
        "RGB" => "DeviceRGB",
        "CMYK" => "DeviceCMYK",
        "I" => "Indexed",
        other => other,
    }
    .to_string()
}

impl Interpreter<'_> {
    /// Do
    pub(super) fn paint_xobject(&mut self) -> Result<()> {
        let Some(name) = self.name_operand(0).map(str::to_owned) else {
            self.bad_operands(Operator::PaintXObject);
            return Ok(());
        };
        let Some(found) = self.resources.lookup(self.resolver, "XObject", &name) else {
            warn!("XObject /{} not found", name);
            return Ok(());
        };
        let Object::Stream(stream) = &*found.object else {
            warn!("XObject /{} is a {}, not a stream", name, found.object.type_name());
            return Ok(());
        };

        match stream.dictionary().get_name("Subtype") {
            Some("Form") => self.paint_form(&name, found.id, stream),
            Some("Image") => {
                match self.source.decode_stream(stream) {
                    Ok(data) => self.push_image(Some(name), found.id, stream.dictionary().clone(), data),
                    Err(e) => warn!("Skipping image /{}: {}", name, e),
                }
                Ok(())
            }
            Some("PS") => {
                debug!("Ignoring PostScript XObject /{}", name);
                Ok(())
            }
            other => {
                warn!("XObject /{} has subtype {:?}", name, other);
                Ok(())
            }
        }
    }

    /// Interpret a form in a child interpreter and merge its shapes.
    /// Cancellation inside the form is returned to the caller.
    fn paint_form(&mut self, name: &str, id: Option<ObjectId>, stream: &Stream) -> Result<()> {
        if let Some(id) = id {
            if self.forms.contains(&id) {
                warn!("Form /{} ({}) draws itself, skipping", name, id);
                return Ok(());
            }
        }
        if self.depth >= self.options.max_form_depth {
            warn!("Form /{} exceeds nesting depth {}", name, self.options.max_form_depth);
            return Ok(());
        }

        let content = match self.source.decode_stream(stream) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping form /{}: {}", name, e);
                return Ok(());
            }
        };

        let dict = stream.dictionary();
        let matrix = dict
            .get_array("Matrix")
            .and_then(|m| Matrix::from_slice(&numbers(m)))
            .unwrap_or_default();
        let mut state = self.state.clone();
        state.ctm = matrix.concat(&self.state.ctm);

        let bbox = dict.get_array("BBox").and_then(|b| {
            let values: [f64; 4] = numbers(b).try_into().ok()?;
            Some(Rectangle::from_array(values).transform(&state.ctm))
        });
        if let Some(bbox) = bbox {
            state.intersect_clip(bbox);
            self.shapes.push(Shape::ClipRect(bbox));
        }

        let resources = match dict.get("Resources").map(|r| self.resolver.follow(r)) {
            Some(r) => match r.as_dict() {
                Some(d) => Resources::new(Some(d.clone())),
                None => self.resources.clone(),
            },
            None => self.resources.clone(),
        };

        let mut child = self.child(resources, state, id);
        let result = child.execute(&content);
        let clip_changed = child.state.clip != self.state.clip;
        self.shapes.append(child.shapes);
        if clip_changed {
            self.shapes.push(Shape::ResetClip(self.state.clip));
        }
        result
    }

    fn push_image(&mut self, name: Option<String>, id: Option<ObjectId>, dict: Dictionary, data: Arc<Vec<u8>>) {
        if dict.get("ImageMask").and_then(Object::as_bool) == Some(true) {
            // Stencil masks paint with the fill color
            self.push_pattern_paint(false);
        }
        // Image space has its origin at the top left of the unit square
        let matrix = Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0).concat(&self.state.ctm);
        self.shapes.push(Shape::Image(ImagePaint {
            name,
            id,
            dict,
            data,
            matrix,
            alpha: self.state.effective_fill_alpha(self.options.overprint_alpha),
        }));
    }

    /// The operands between BI and ID as a dictionary with full key names.
    pub(super) fn inline_image_dict(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        for pair in self.operands.chunks(2) {
            let [Object::Name(key), value] = pair else {
                warn!("Malformed inline image entry {:?}", pair);
                continue;
            };
            let key = inline_key(key);
            let value = match key {
                "Filter" => expand_names(value, &|n: &str| Filter::from_name(n).name().to_string()),
                "ColorSpace" => expand_names(value, &inline_color_space),
                _ => value.clone(),
            };
            dict.set(key, value);
        }
        dict
    }

    pub(super) fn paint_inline_image(&mut self, dict: Dictionary, data: Vec<u8>) {
        let stream = Stream::new(dict, data);
        match self.source.decode_stream(&stream) {
            Ok(decoded) => self.push_image(None, None, stream.dictionary().clone(), decoded),
            Err(e) => warn!("Skipping inline image: {}", e),
        }
    }

    /// BMC / BDC
    pub(super) fn begin_marked_content(&mut self, op: Operator) {
        let with_properties = op == Operator::BeginMarkedContentProps;
        let Some(tag) = self.name_operand(usize::from(with_properties)).map(str::to_owned) else {
            return self.bad_operands(op);
        };

        let properties = if with_properties {
            match self.operands.last() {
                Some(Object::Dictionary(dict)) => Some(dict.clone()),
                Some(Object::Name(name)) => {
                    let found = self.resources.lookup(self.resolver, "Properties", name);
                    let dict = found.as_ref().and_then(|p| p.as_dict()).cloned();
                    if dict.is_none() {
                        warn!("Marked content properties /{} not found", name);
                    }
                    dict
                }
                _ => {
                    warn!("BDC /{} without a property list", tag);
                    None
                }
            }
        } else {
            None
        };

        self.marked_content.push(tag.clone());
        self.shapes.push(Shape::BeginMarkedContent { tag, properties });
    }

    /// EMC
    pub(super) fn end_marked_content(&mut self) {
        if self.marked_content.pop().is_none() {
            warn!("EMC without BMC or BDC");
            return;
        }
        self.shapes.push(Shape::EndMarkedContent);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{run, TestSource};
    use super::super::{CancellationToken, ContentSource, Interpreter, InterpreterOptions};
    use crate::error::Result;
    use crate::geometry::{Matrix, Point, Rectangle};
    use crate::graphics::{PathCommand, Shape};
    use crate::objects::{Dictionary, Object, ObjectId, Resolve, Stream};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Cancels `token` as soon as `trigger` is resolved.
    struct CancelOnResolve {
        inner: TestSource,
        trigger: ObjectId,
        token: CancellationToken,
    }

    impl Resolve for CancelOnResolve {
        fn resolve(&self, id: ObjectId) -> Arc<Object> {
            if id == self.trigger {
                self.token.cancel();
            }
            self.inner.resolve(id)
        }
    }

    impl ContentSource for CancelOnResolve {
        fn decode_stream(&self, stream: &Stream) -> Result<Arc<Vec<u8>>> {
            self.inner.decode_stream(stream)
        }
    }

    fn form(content: &str, extra: &[(&str, Object)]) -> Object {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name("XObject".into()));
        dict.set("Subtype", Object::Name("Form".into()));
        for (key, value) in extra {
            dict.set(*key, value.clone());
        }
        Object::Stream(Stream::new(dict, content.as_bytes().to_vec()))
    }

    fn xobjects(entries: &[(&str, u32)]) -> Dictionary {
        let mut xobjects = Dictionary::new();
        for (name, number) in entries {
            xobjects.set(*name, Object::Reference(ObjectId::new(*number, 0)));
        }
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));
        resources
    }

    fn numbers(values: &[f64]) -> Object {
        Object::Array(values.iter().map(|v| Object::Real(*v)).collect())
    }

    #[test]
    fn test_form_matrix_and_bbox() {
        let mut source = TestSource::default();
        source.objects.insert(
            ObjectId::new(10, 0),
            form(
                "0 0 m 1 1 l S",
                &[
                    ("Matrix", numbers(&[1.0, 0.0, 0.0, 1.0, 100.0, 0.0])),
                    ("BBox", numbers(&[0.0, 0.0, 10.0, 10.0])),
                ],
            ),
        );

        let shapes = run(&source, Some(xobjects(&[("Fm0", 10)])), "/Fm0 Do");
        assert_eq!(
            shapes.shapes()[0],
            Shape::ClipRect(Rectangle::from_position_and_size(100.0, 0.0, 10.0, 10.0))
        );
        let Shape::Path(path) = &shapes.shapes()[1] else {
            panic!("expected the form's path");
        };
        assert_eq!(path.commands()[0], PathCommand::MoveTo(Point::new(100.0, 0.0)));
        assert_eq!(shapes.shapes().last(), Some(&Shape::ResetClip(None)));
    }

    #[test]
    fn test_form_inherits_parent_resources() {
        let mut source = TestSource::default();
        source.objects.insert(ObjectId::new(10, 0), form("/Inner Do", &[]));
        source
            .objects
            .insert(ObjectId::new(11, 0), form("0 0 m 5 5 l S", &[]));

        let shapes = run(&source, Some(xobjects(&[("Outer", 10), ("Inner", 11)])), "/Outer Do");
        assert_eq!(shapes.len(), 2);
    }

    #[test]
    fn test_self_referencing_form_is_skipped() {
        let mut source = TestSource::default();
        source
            .objects
            .insert(ObjectId::new(10, 0), form("0 0 m 1 1 l S /Loop Do", &[]));

        let shapes = run(&source, Some(xobjects(&[("Loop", 10)])), "/Loop Do");
        // One level is drawn, the recursive Do is refused
        assert_eq!(shapes.len(), 2);
    }

    #[test]
    fn test_form_depth_limit() {
        let mut source = TestSource::default();
        // A chain 10 -> 11 -> 12, each drawing a line
        source.objects.insert(ObjectId::new(10, 0), form("0 0 m 1 1 l S /B Do", &[]));
        source.objects.insert(ObjectId::new(11, 0), form("0 0 m 1 1 l S /C Do", &[]));
        source.objects.insert(ObjectId::new(12, 0), form("0 0 m 1 1 l S", &[]));
        let resources = xobjects(&[("A", 10), ("B", 11), ("C", 12)]);

        let options = InterpreterOptions::default().with_max_form_depth(2);
        let shapes = Interpreter::new(&source, Some(resources), &options).run(b"/A Do");
        assert_eq!(shapes.len(), 4);
    }

    #[test]
    fn test_cancellation_inside_nested_form_unwinds_every_level() {
        let mut inner = TestSource::default();
        inner
            .objects
            .insert(ObjectId::new(10, 0), form("1 1 m 2 2 l S /Inner Do 3 3 m 4 4 l S", &[]));
        inner.objects.insert(ObjectId::new(11, 0), form("7 7 m 8 8 l S", &[]));
        let source = CancelOnResolve {
            inner,
            trigger: ObjectId::new(11, 0),
            token: CancellationToken::new(),
        };
        let resources = xobjects(&[("Outer", 10), ("Inner", 11)]);

        let options = InterpreterOptions::default();
        let shapes = Interpreter::new(&source, Some(resources), &options)
            .with_cancellation(&source.token)
            .run(b"0 0 m 10 0 l S /Outer Do 5 5 m 6 6 l S");

        assert!(shapes.is_incomplete());
        // The page's stroke and the outer form's stroke survive
        assert_eq!(shapes.len(), 4);
        assert_eq!(shapes.iter().filter(|s| matches!(s, Shape::Stroke { .. })).count(), 2);
        let ends: Vec<Point> = shapes
            .iter()
            .filter_map(|s| match s {
                Shape::Path(path) => path.current_point(),
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec![Point::new(10.0, 0.0), Point::new(2.0, 2.0)]);
    }

    #[test]
    fn test_image_maps_unit_square_top_down() {
        let mut image = Dictionary::new();
        image.set("Subtype", Object::Name("Image".into()));
        image.set("Width", Object::Integer(2));
        image.set("Height", Object::Integer(1));
        let mut source = TestSource::default();
        source.objects.insert(
            ObjectId::new(20, 0),
            Object::Stream(Stream::new(image, vec![0, 255])),
        );

        let shapes = run(&source, Some(xobjects(&[("Im0", 20)])), "q 50 0 0 20 10 10 cm /Im0 Do Q");
        let Shape::Image(paint) = &shapes.shapes()[0] else {
            panic!("expected an image");
        };
        assert_eq!(paint.name.as_deref(), Some("Im0"));
        assert_eq!(paint.id, Some(ObjectId::new(20, 0)));
        assert_eq!(paint.width(), Some(2));
        assert_eq!(paint.matrix, Matrix::new(50.0, 0.0, 0.0, -20.0, 10.0, 30.0));
        assert_eq!(*paint.data, vec![0, 255]);
    }

    #[test]
    fn test_inline_image_abbreviations_and_filter() {
        let shapes = run(
            &TestSource::default(),
            None,
            "BI /W 2 /H 1 /CS /G /BPC 8 /F /AHx ID 00FF> EI 0 0 m 1 1 l S",
        );
        let Shape::Image(paint) = &shapes.shapes()[0] else {
            panic!("expected an inline image, got {:?}", shapes.shapes()[0]);
        };
        assert_eq!(paint.name, None);
        assert_eq!(paint.dict.get_name("ColorSpace"), Some("DeviceGray"));
        assert_eq!(paint.dict.get_name("Filter"), Some("ASCIIHexDecode"));
        assert_eq!(paint.dict.get_integer("BitsPerComponent"), Some(8));
        assert_eq!(*paint.data, vec![0x00, 0xFF]);
        // The stream continues after EI
        assert!(matches!(shapes.shapes()[1], Shape::Path(_)));
    }

    #[test]
    fn test_marked_content_with_named_properties() {
        let mut props = Dictionary::new();
        props.set("Type", Object::Name("OCG".into()));
        let mut properties = Dictionary::new();
        properties.set("oc1", Object::Dictionary(props));
        let mut resources = Dictionary::new();
        resources.set("Properties", Object::Dictionary(properties));

        let shapes = run(
            &TestSource::default(),
            Some(resources),
            "/OC /oc1 BDC /Span BMC EMC EMC EMC",
        );
        let Shape::BeginMarkedContent { tag, properties } = &shapes.shapes()[0] else {
            panic!("expected marked content");
        };
        assert_eq!(tag, "OC");
        assert!(properties.as_ref().unwrap().is_type("OCG"));
        // The third EMC is unbalanced and dropped
        assert_eq!(shapes.len(), 4);
        assert_eq!(shapes.shapes()[3], Shape::EndMarkedContent);
    }

    #[test]
    fn test_unclosed_marked_content_closed_at_end() {
        let shapes = run(&TestSource::default(), None, "/Artifact BMC 0 0 m 1 1 l S");
        assert_eq!(shapes.shapes().last(), Some(&Shape::EndMarkedContent));
    }
}
