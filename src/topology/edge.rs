use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};
use crate::geom::{Point, Rectangle, distance, orient, points_coincide, segments_intersect};

/// Relative cross-product magnitude under which a bend counts as straight.
const COLLINEAR_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Corner {
    Centre,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const OUTER: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    pub fn point(self, rect: &Rectangle) -> Point {
        match self {
            Corner::Centre => rect.centre(),
            Corner::TopLeft => (rect.x, rect.y),
            Corner::TopRight => (rect.x + rect.width, rect.y),
            Corner::BottomLeft => (rect.x, rect.y + rect.height),
            Corner::BottomRight => (rect.x + rect.width, rect.y + rect.height),
        }
    }
}

/// A point of an edge path: either attached to a node or free-standing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EdgePoint {
    Node { node: usize, corner: Corner },
    Free { x: f64, y: f64 },
}

impl EdgePoint {
    pub fn centre(node: usize) -> Self {
        EdgePoint::Node {
            node,
            corner: Corner::Centre,
        }
    }

    pub fn position(&self, rects: &[Rectangle]) -> Option<Point> {
        match *self {
            EdgePoint::Node { node, corner } => rects.get(node).map(|r| corner.point(r)),
            EdgePoint::Free { x, y } => Some((x, y)),
        }
    }

    pub fn node(&self) -> Option<usize> {
        match *self {
            EdgePoint::Node { node, .. } => Some(node),
            EdgePoint::Free { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeState {
    Unrouted,
    Routed,
    /// An endpoint or obstacle moved and the path no longer checks out.
    Invalidated,
    /// The path revisits a point; it must be routed again from scratch.
    Degenerate,
}

/// Whether the bend at `w` (between `u` and `v`) turns around `wrap`.
/// Straight-through points and free points pass; doubling back never does.
pub(crate) fn valid_turn(u: Point, w: Point, v: Point, wrap: Option<&Rectangle>) -> bool {
    let cp = orient(u, w, v);
    if collinear(u, w, v) {
        return !is_reversal(u, w, v);
    }
    let Some(rect) = wrap else {
        return true;
    };
    let r = rect.centre();
    let cp_uwr = orient(u, w, r);
    let cp_wvr = orient(w, v, r);
    cp * cp_uwr > 0.0 && cp * cp_wvr > 0.0
}

fn collinear(u: Point, w: Point, v: Point) -> bool {
    orient(u, w, v).abs() <= COLLINEAR_EPSILON * distance(u, w) * distance(w, v)
}

/// Collinear bend where the path turns back on itself.
pub(crate) fn is_reversal(u: Point, w: Point, v: Point) -> bool {
    let dot = (w.0 - u.0) * (v.0 - w.0) + (w.1 - u.1) * (v.1 - w.1);
    dot < 0.0 && collinear(u, w, v)
}

/// Collinear bend that keeps going the same way.
pub(crate) fn is_straight(u: Point, w: Point, v: Point) -> bool {
    collinear(u, w, v) && !is_reversal(u, w, v)
}

pub(crate) fn resolve(path: &[EdgePoint], rects: &[Rectangle], id: usize) -> Result<Vec<Point>> {
    path.iter()
        .map(|p| {
            p.position(rects).ok_or_else(|| LayoutError::InvalidEdge {
                id,
                reason: format!("path point {p:?} refers to a missing node"),
            })
        })
        .collect()
}

pub(crate) fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// An edge between two nodes, carried as a polyline of [`EdgePoint`]s from
/// the source centre to the target centre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyEdge {
    pub id: usize,
    pub ideal_length: f64,
    source: usize,
    target: usize,
    path: Vec<EdgePoint>,
    state: EdgeState,
}

impl TopologyEdge {
    /// Edge with a caller-supplied path; the first and last points must be
    /// node attachments and name the source and target.
    pub fn new(id: usize, ideal_length: f64, path: Vec<EdgePoint>) -> Result<Self> {
        let invalid = |reason: &str| LayoutError::InvalidEdge {
            id,
            reason: reason.to_string(),
        };
        if !ideal_length.is_finite() || ideal_length < 0.0 {
            return Err(invalid("ideal length must be finite and non-negative"));
        }
        if path.len() < 2 {
            return Err(invalid("path needs at least a start and an end point"));
        }
        let (Some(source), Some(target)) = (
            path.first().and_then(EdgePoint::node),
            path.last().and_then(EdgePoint::node),
        ) else {
            return Err(invalid("path must start and end on a node"));
        };
        if source == target {
            return Err(invalid("source and target are the same node"));
        }
        Ok(Self {
            id,
            ideal_length,
            source,
            target,
            path,
            state: EdgeState::Routed,
        })
    }

    /// Unrouted edge; its path is the straight segment between centres until
    /// a router assigns one.
    pub fn between(id: usize, source: usize, target: usize, ideal_length: f64) -> Result<Self> {
        let mut edge = Self::new(
            id,
            ideal_length,
            vec![EdgePoint::centre(source), EdgePoint::centre(target)],
        )?;
        edge.state = EdgeState::Unrouted;
        Ok(edge)
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn state(&self) -> EdgeState {
        self.state
    }

    pub fn path(&self) -> &[EdgePoint] {
        &self.path
    }

    pub fn n_segments(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    pub(crate) fn set_path(&mut self, path: Vec<EdgePoint>) {
        self.path = path;
        self.state = EdgeState::Routed;
    }

    /// Drop the route back to a straight centre-to-centre path.
    pub(crate) fn clear_route(&mut self) {
        self.path = vec![EdgePoint::centre(self.source()), EdgePoint::centre(self.target())];
        self.state = EdgeState::Unrouted;
    }

    pub(crate) fn set_state(&mut self, state: EdgeState) {
        self.state = state;
    }

    /// Current path coordinates. Fails while the path is degenerate.
    pub fn get_path(&self, rects: &[Rectangle]) -> Result<Vec<Point>> {
        if self.state == EdgeState::Degenerate {
            return Err(LayoutError::DegeneratePath { id: self.id });
        }
        resolve(&self.path, rects, self.id)
    }

    /// Sum of Euclidean segment lengths; points on missing nodes are skipped.
    pub fn path_length(&self, rects: &[Rectangle]) -> f64 {
        let points: Vec<Point> = self.path.iter().filter_map(|p| p.position(rects)).collect();
        polyline_length(&points)
    }

    /// `path_length - ideal_length`.
    pub fn length_deviation(&self, rects: &[Rectangle]) -> f64 {
        self.path_length(rects) - self.ideal_length
    }

    /// Endpoint distance over path length: 1 for a straight edge.
    pub fn straightness(&self, rects: &[Rectangle]) -> f64 {
        let points: Vec<Point> = self.path.iter().filter_map(|p| p.position(rects)).collect();
        let total = polyline_length(&points);
        match (points.first(), points.last()) {
            (Some(&a), Some(&b)) if total > 0.0 => distance(a, b) / total,
            _ => 1.0,
        }
    }

    /// Every interior bend turns around the rectangle it is attached to.
    pub fn assert_convex_bends(&self, rects: &[Rectangle]) -> bool {
        let Ok(points) = resolve(&self.path, rects, self.id) else {
            return false;
        };
        (1..points.len().saturating_sub(1)).all(|i| {
            let wrap = self.path[i].node().and_then(|n| rects.get(n));
            valid_turn(points[i - 1], points[i], points[i + 1], wrap)
        })
    }

    /// True when the path revisits itself: a repeated node attachment, a
    /// coordinate within `tolerance` of an earlier one, a bend that doubles
    /// back, or two non-adjacent segments that touch, overlap or cross.
    pub fn cycle(&self, rects: &[Rectangle], tolerance: f64) -> bool {
        let positions: Vec<Option<Point>> = self.path.iter().map(|p| p.position(rects)).collect();
        for i in 0..self.path.len() {
            for j in (i + 1)..self.path.len() {
                if self.path[i] == self.path[j] {
                    return true;
                }
                if let (Some(a), Some(b)) = (positions[i], positions[j]) {
                    if points_coincide(a, b, tolerance) {
                        return true;
                    }
                }
            }
        }

        let Some(points) = positions.into_iter().collect::<Option<Vec<Point>>>() else {
            return false;
        };
        if points
            .windows(3)
            .any(|w| is_reversal(w[0], w[1], w[2]))
        {
            return true;
        }
        let segments = points.len().saturating_sub(1);
        for i in 0..segments {
            for j in (i + 2)..segments {
                if segments_intersect(points[i], points[i + 1], points[j], points[j + 1]) {
                    return true;
                }
            }
        }
        false
    }
}
