use crate::geometry::{Matrix, Point, Rectangle};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(u8)]
pub enum LineCap {
    #[default]
    Butt = 0,
    Round = 1,
    Square = 2,
}

impl LineCap {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(LineCap::Butt),
            1 => Some(LineCap::Round),
            2 => Some(LineCap::Square),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(u8)]
pub enum LineJoin {
    #[default]
    Miter = 0,
    Round = 1,
    Bevel = 2,
}

impl LineJoin {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(LineJoin::Miter),
            1 => Some(LineJoin::Round),
            2 => Some(LineJoin::Bevel),
            _ => None,
        }
    }
}

/// Winding rule of a fill or clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// One path segment, in page space.
#[derive(Debug, Clone, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    ClosePath,
}

/// A path under construction. Points are given in user space and stored
/// transformed by the CTM in effect when they were added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    commands: Vec<PathCommand>,
    /// Current point in user space, for `v` and `h`
    current: Option<Point>,
    subpath_start: Option<Point>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// User-space current point.
    pub fn current_point(&self) -> Option<Point> {
        self.current
    }

    /// Points of the path, control points included.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.commands.iter().flat_map(|command| match command {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => vec![*p],
            PathCommand::CurveTo(a, b, c) => vec![*a, *b, *c],
            PathCommand::ClosePath => Vec::new(),
        })
    }

    pub fn move_to(&mut self, p: Point, ctm: &Matrix) {
        self.commands.push(PathCommand::MoveTo(ctm.transform_point(p)));
        self.current = Some(p);
        self.subpath_start = Some(p);
    }

    /// Returns false when there is no current point.
    pub fn line_to(&mut self, p: Point, ctm: &Matrix) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.commands.push(PathCommand::LineTo(ctm.transform_point(p)));
        self.current = Some(p);
        true
    }

    /// Returns false when there is no current point.
    pub fn curve_to(&mut self, c1: Point, c2: Point, end: Point, ctm: &Matrix) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.commands.push(PathCommand::CurveTo(
            ctm.transform_point(c1),
            ctm.transform_point(c2),
            ctm.transform_point(end),
        ));
        self.current = Some(end);
        true
    }

    pub fn close(&mut self) {
        if self.current.is_some() {
            self.commands.push(PathCommand::ClosePath);
            self.current = self.subpath_start;
        }
    }

    /// `re`: a closed subpath of four sides.
    pub fn rectangle(&mut self, x: f64, y: f64, width: f64, height: f64, ctm: &Matrix) {
        self.move_to(Point::new(x, y), ctm);
        self.line_to(Point::new(x + width, y), ctm);
        self.line_to(Point::new(x + width, y + height), ctm);
        self.line_to(Point::new(x, y + height), ctm);
        self.close();
    }

    /// Page-space bounds, control points included.
    pub fn bounds(&self) -> Option<Rectangle> {
        let mut points = self.points();
        let first = points.next()?;
        Some(points.fold(Rectangle::new(first, first), |mut bounds, p| {
            bounds.lower_left.x = bounds.lower_left.x.min(p.x);
            bounds.lower_left.y = bounds.lower_left.y.min(p.y);
            bounds.upper_right.x = bounds.upper_right.x.max(p.x);
            bounds.upper_right.y = bounds.upper_right.y.max(p.y);
            bounds
        }))
    }

    /// Take the finished path, leaving an empty one behind.
    pub fn take(&mut self) -> Path {
        std::mem::take(self)
    }
}
