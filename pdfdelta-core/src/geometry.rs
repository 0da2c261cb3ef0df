//! Basic geometric types for PDF

/// A point in 2D space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Origin point (0, 0)
    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }
}

/// A rectangle defined by two points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle {
    /// Lower-left corner
    pub lower_left: Point,
    /// Upper-right corner
    pub upper_right: Point,
}

impl Rectangle {
    /// Create a new rectangle from two points
    pub fn new(lower_left: Point, upper_right: Point) -> Self {
        Self {
            lower_left,
            upper_right,
        }
    }

    /// Create a rectangle from position and size
    pub fn from_position_and_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_corners(Point::new(x, y), Point::new(x + width, y + height))
    }

    /// Normalized rectangle spanning two opposite corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            lower_left: Point::new(a.x.min(b.x), a.y.min(b.y)),
            upper_right: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// `[llx lly urx ury]` as found in page boxes and form BBox entries.
    pub fn from_array(values: [f64; 4]) -> Self {
        Self::from_corners(Point::new(values[0], values[1]), Point::new(values[2], values[3]))
    }

    /// Get the width
    pub fn width(&self) -> f64 {
        self.upper_right.x - self.lower_left.x
    }

    /// Get the height
    pub fn height(&self) -> f64 {
        self.upper_right.y - self.lower_left.y
    }

    /// Get the center point
    pub fn center(&self) -> Point {
        Point::new(
            (self.lower_left.x + self.upper_right.x) / 2.0,
            (self.lower_left.y + self.upper_right.y) / 2.0,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Overlap of two rectangles; empty (zero-sized) when they are disjoint.
    pub fn intersect(&self, other: &Rectangle) -> Rectangle {
        let llx = self.lower_left.x.max(other.lower_left.x);
        let lly = self.lower_left.y.max(other.lower_left.y);
        let urx = self.upper_right.x.min(other.upper_right.x).max(llx);
        let ury = self.upper_right.y.min(other.upper_right.y).max(lly);
        Rectangle::new(Point::new(llx, lly), Point::new(urx, ury))
    }

    /// Axis-aligned bounds of this rectangle after `matrix`.
    pub fn transform(&self, matrix: &Matrix) -> Rectangle {
        let corners = [
            matrix.transform_point(self.lower_left),
            matrix.transform_point(Point::new(self.upper_right.x, self.lower_left.y)),
            matrix.transform_point(self.upper_right),
            matrix.transform_point(Point::new(self.lower_left.x, self.upper_right.y)),
        ];
        let mut bounds = Rectangle::new(corners[0], corners[0]);
        for corner in &corners[1..] {
            bounds.lower_left.x = bounds.lower_left.x.min(corner.x);
            bounds.lower_left.y = bounds.lower_left.y.min(corner.y);
            bounds.upper_right.x = bounds.upper_right.x.max(corner.x);
            bounds.upper_right.y = bounds.upper_right.y.max(corner.y);
        }
        bounds
    }
}

/// Affine transform `[a b c d e f]`, mapping (x, y) to
/// (a*x + c*y + e, b*x + d*y + f).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Matrix from a six-number array operand; `None` for other lengths.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [a, b, c, d, e, f] => Some(Self::new(*a, *b, *c, *d, *e, *f)),
            _ => None,
        }
    }

    /// `self` applied first, then `then`.
    pub fn concat(&self, then: &Matrix) -> Self {
        Self {
            a: self.a * then.a + self.b * then.c,
            b: self.a * then.b + self.b * then.d,
            c: self.c * then.a + self.d * then.c,
            d: self.c * then.b + self.d * then.d,
            e: self.e * then.a + self.f * then.c + then.e,
            f: self.e * then.b + self.f * then.d + then.f,
        }
    }

    /// Transform a point by this matrix
    pub fn transform_point(&self, p: Point) -> Point {
        Point {
            x: p.x * self.a + p.y * self.c + self.e,
            y: p.x * self.b + p.y * self.d + self.f,
        }
    }

    /// Transform a distance vector, ignoring the translation part.
    pub fn transform_vector(&self, p: Point) -> Point {
        Point {
            x: p.x * self.a + p.y * self.c,
            y: p.x * self.b + p.y * self.d,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}
