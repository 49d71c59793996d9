use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};

pub type Point = (f64, f64);
pub type Segment = (Point, Point);

/// Tolerance used by the orientation and on-segment tests.
const GEOM_EPSILON: f64 = 1e-9;

/// Axis selector for axis-generic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dim {
    Horizontal,
    Vertical,
}

pub fn conjugate(dim: Dim) -> Dim {
    match dim {
        Dim::Horizontal => Dim::Vertical,
        Dim::Vertical => Dim::Horizontal,
    }
}

/// Axis-aligned box; `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rectangle {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_centre(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    /// Rejects non-finite coordinates and non-positive extents.
    pub fn validate(&self, index: usize) -> Result<()> {
        let invalid = |reason: &str| LayoutError::InvalidRectangle {
            index,
            reason: reason.to_string(),
        };
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(invalid("non-finite position"));
        }
        if !self.width.is_finite() || !self.height.is_finite() {
            return Err(invalid("non-finite size"));
        }
        if self.width <= 0.0 || self.height <= 0.0 {
            return Err(invalid("width and height must be positive"));
        }
        Ok(())
    }

    pub fn centre_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn centre_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn centre(&self) -> Point {
        (self.centre_x(), self.centre_y())
    }

    pub fn centre_d(&self, dim: Dim) -> f64 {
        match dim {
            Dim::Horizontal => self.centre_x(),
            Dim::Vertical => self.centre_y(),
        }
    }

    pub fn min_d(&self, dim: Dim) -> f64 {
        match dim {
            Dim::Horizontal => self.x,
            Dim::Vertical => self.y,
        }
    }

    pub fn max_d(&self, dim: Dim) -> f64 {
        match dim {
            Dim::Horizontal => self.x + self.width,
            Dim::Vertical => self.y + self.height,
        }
    }

    pub fn length(&self, dim: Dim) -> f64 {
        match dim {
            Dim::Horizontal => self.width,
            Dim::Vertical => self.height,
        }
    }

    pub fn move_centre_d(&mut self, dim: Dim, centre: f64) {
        match dim {
            Dim::Horizontal => self.x = centre - self.width / 2.0,
            Dim::Vertical => self.y = centre - self.height / 2.0,
        }
    }

    pub fn move_centre(&mut self, cx: f64, cy: f64) {
        self.move_centre_d(Dim::Horizontal, cx);
        self.move_centre_d(Dim::Vertical, cy);
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Length of the shared interval along `dim`; non-positive when disjoint.
    pub fn overlap_d(&self, dim: Dim, other: &Rectangle) -> f64 {
        self.max_d(dim).min(other.max_d(dim)) - self.min_d(dim).max(other.min_d(dim))
    }

    pub fn overlap_x(&self, other: &Rectangle) -> f64 {
        self.overlap_d(Dim::Horizontal, other)
    }

    pub fn overlap_y(&self, other: &Rectangle) -> f64 {
        self.overlap_d(Dim::Vertical, other)
    }

    /// True when the interiors intersect by more than `tolerance` on both axes.
    pub fn overlaps(&self, other: &Rectangle, tolerance: f64) -> bool {
        self.overlap_x(other) > tolerance && self.overlap_y(other) > tolerance
    }

    pub fn expanded(&self, margin: f64) -> Rectangle {
        Rectangle::new(
            self.x - margin,
            self.y - margin,
            self.width + margin * 2.0,
            self.height + margin * 2.0,
        )
    }

    /// Whether `other` lies inside this rectangle, allowing `tolerance` slack.
    pub fn contains_rect(&self, other: &Rectangle, tolerance: f64) -> bool {
        other.x >= self.x - tolerance
            && other.y >= self.y - tolerance
            && other.x + other.width <= self.x + self.width + tolerance
            && other.y + other.height <= self.y + self.height + tolerance
    }

    /// Corners in the order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            (self.x, self.y),
            (self.x + self.width, self.y),
            (self.x + self.width, self.y + self.height),
            (self.x, self.y + self.height),
        ]
    }

    pub fn union(&self, other: &Rectangle) -> Rectangle {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        Rectangle::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// Axis-aligned bounding box of a rectangle set; `None` for an empty set.
pub fn bounds(rects: &[Rectangle]) -> Option<Rectangle> {
    let (first, rest) = rects.split_first()?;
    Some(rest.iter().fold(*first, |acc, rect| acc.union(rect)))
}

/// Signed area of the triangle (p0, p1, p2) doubled; positive when p2 lies
/// counter-clockwise of the directed line p0->p1 in a y-up frame.
pub fn cross_product(x0: f64, y0: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0)
}

pub(crate) fn orient(a: Point, b: Point, c: Point) -> f64 {
    cross_product(a.0, a.1, b.0, b.1, c.0, c.1)
}

pub fn distance(a: Point, b: Point) -> f64 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

pub fn points_coincide(a: Point, b: Point, tolerance: f64) -> bool {
    (a.0 - b.0).abs() <= tolerance && (a.1 - b.1).abs() <= tolerance
}

pub fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    fn on_segment(a: Point, b: Point, c: Point) -> bool {
        let min_x = a.0.min(b.0);
        let max_x = a.0.max(b.0);
        let min_y = a.1.min(b.1);
        let max_y = a.1.max(b.1);
        c.0 >= min_x - GEOM_EPSILON
            && c.0 <= max_x + GEOM_EPSILON
            && c.1 >= min_y - GEOM_EPSILON
            && c.1 <= max_y + GEOM_EPSILON
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if (o1 > 0.0 && o2 < 0.0 || o1 < 0.0 && o2 > 0.0)
        && (o3 > 0.0 && o4 < 0.0 || o3 < 0.0 && o4 > 0.0)
    {
        return true;
    }
    if o1.abs() <= GEOM_EPSILON && on_segment(a, b, c) {
        return true;
    }
    if o2.abs() <= GEOM_EPSILON && on_segment(a, b, d) {
        return true;
    }
    if o3.abs() <= GEOM_EPSILON && on_segment(c, d, a) {
        return true;
    }
    if o4.abs() <= GEOM_EPSILON && on_segment(c, d, b) {
        return true;
    }
    false
}

/// Strict crossing: the segments intersect at a single interior point of both.
pub fn segments_cross_properly(a: Point, b: Point, c: Point, d: Point) -> bool {
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    (o1 > GEOM_EPSILON && o2 < -GEOM_EPSILON || o1 < -GEOM_EPSILON && o2 > GEOM_EPSILON)
        && (o3 > GEOM_EPSILON && o4 < -GEOM_EPSILON || o3 < -GEOM_EPSILON && o4 > GEOM_EPSILON)
}

/// Whether segment `a`-`b` passes through the open interior of `rect`
/// (shrunk by `epsilon`). Touching the boundary does not count.
pub fn segment_crosses_interior(a: Point, b: Point, rect: &Rectangle, epsilon: f64) -> bool {
    let min_x = rect.x + epsilon;
    let max_x = rect.x + rect.width - epsilon;
    let min_y = rect.y + epsilon;
    let max_y = rect.y + rect.height - epsilon;
    if min_x >= max_x || min_y >= max_y {
        return false;
    }
    // Liang-Barsky clip against the shrunken box.
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let checks = [
        (-dx, a.0 - min_x),
        (dx, max_x - a.0),
        (-dy, a.1 - min_y),
        (dy, max_y - a.1),
    ];
    for (p, q) in checks {
        if p.abs() < f64::EPSILON {
            if q <= 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return false;
            }
            if r > t0 {
                t0 = r;
            }
        } else {
            if r < t0 {
                return false;
            }
            if r < t1 {
                t1 = r;
            }
        }
    }
    t1 - t0 > f64::EPSILON
}

/// Graham scan. Returns indices into `points` of the hull in counter-clockwise
/// order (y-up), starting from the lowest, leftmost point.
pub fn convex_hull(points: &[Point]) -> Vec<usize> {
    if points.len() < 3 {
        return (0..points.len()).collect();
    }
    let mut pivot = 0usize;
    for (idx, p) in points.iter().enumerate() {
        let best = points[pivot];
        if p.1 < best.1 || p.1 == best.1 && p.0 < best.0 {
            pivot = idx;
        }
    }
    let origin = points[pivot];
    let mut rest: Vec<usize> = (0..points.len()).filter(|&idx| idx != pivot).collect();
    rest.sort_by(|&i, &j| {
        let pi = points[i];
        let pj = points[j];
        let o = orient(origin, pi, pj);
        if o > 0.0 {
            Ordering::Less
        } else if o < 0.0 {
            Ordering::Greater
        } else {
            // Ties: nearer point first so the farther one survives the scan.
            distance(origin, pi)
                .partial_cmp(&distance(origin, pj))
                .unwrap_or(Ordering::Equal)
                .then(i.cmp(&j))
        }
    });

    let mut hull = vec![pivot];
    for idx in rest {
        while hull.len() >= 2 {
            let a = points[hull[hull.len() - 2]];
            let b = points[hull[hull.len() - 1]];
            if orient(a, b, points[idx]) > 0.0 {
                break;
            }
            hull.pop();
        }
        hull.push(idx);
    }
    hull
}
