//! Shortest obstacle-avoiding paths over a corner visibility graph.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::edge::{Corner, EdgePoint};
use crate::geom::{Point, Rectangle, distance, segment_crosses_interior};

/// Heap entry for the A* frontier; orders by estimate, then cost, then node,
/// reversed so `BinaryHeap` pops the smallest.
#[derive(Clone, Copy, Debug)]
struct SearchEntry {
    est: f64,
    cost: f64,
    node: usize,
}

impl Ord for SearchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .total_cmp(&self.est)
            .then_with(|| other.cost.total_cmp(&self.cost))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for SearchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SearchEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchEntry {}

/// One shortest-path request between two path points.
#[derive(Debug, Clone)]
pub(crate) struct RouteQuery<'a> {
    pub(crate) rects: &'a [Rectangle],
    pub(crate) from: EdgePoint,
    pub(crate) to: EdgePoint,
    /// Rectangles whose corners may serve as bend points.
    pub(crate) corner_rects: &'a [usize],
    /// Rectangle whose interior segments leaving `from` may cross.
    pub(crate) from_exempt: Option<usize>,
    /// Rectangle whose interior segments reaching `to` may cross.
    pub(crate) to_exempt: Option<usize>,
    pub(crate) epsilon: f64,
}

impl RouteQuery<'_> {
    /// Whether segment `a`-`b` avoids every rectangle interior it must avoid.
    /// `touches_from` / `touches_to` say whether the segment ends at the
    /// query's `from` / `to` point.
    pub(crate) fn clear(&self, a: Point, b: Point, touches_from: bool, touches_to: bool) -> bool {
        segment_clear(
            self.rects,
            a,
            b,
            if touches_from { self.from_exempt } else { None },
            if touches_to { self.to_exempt } else { None },
            self.epsilon,
        )
    }

    /// A* from `from` to `to`; returns the full point sequence including
    /// both ends, or `None` when the obstacles leave no way through.
    pub(crate) fn shortest_path(&self) -> Option<Vec<EdgePoint>> {
        let start = self.from.position(self.rects)?;
        let goal = self.to.position(self.rects)?;
        let mut nodes: Vec<(EdgePoint, Point)> = vec![(self.from, start), (self.to, goal)];
        for &r in self.corner_rects {
            let Some(rect) = self.rects.get(r) else {
                continue;
            };
            for corner in Corner::OUTER {
                nodes.push((EdgePoint::Node { node: r, corner }, corner.point(rect)));
            }
        }

        let mut best_cost = vec![f64::INFINITY; nodes.len()];
        let mut prev: Vec<Option<usize>> = vec![None; nodes.len()];
        let mut heap = BinaryHeap::new();
        best_cost[0] = 0.0;
        heap.push(SearchEntry {
            est: distance(start, goal),
            cost: 0.0,
            node: 0,
        });

        let mut reached = false;
        while let Some(SearchEntry { cost, node, .. }) = heap.pop() {
            if cost > best_cost[node] {
                continue;
            }
            if node == 1 {
                reached = true;
                break;
            }
            let here = nodes[node].1;
            for next in 1..nodes.len() {
                if next == node {
                    continue;
                }
                let there = nodes[next].1;
                if !self.clear(here, there, node == 0, next == 1) {
                    continue;
                }
                let next_cost = cost + distance(here, there);
                if next_cost >= best_cost[next] {
                    continue;
                }
                best_cost[next] = next_cost;
                prev[next] = Some(node);
                heap.push(SearchEntry {
                    est: next_cost + distance(there, goal),
                    cost: next_cost,
                    node: next,
                });
            }
        }
        if !reached {
            return None;
        }

        let mut order = vec![1usize];
        let mut cursor = 1usize;
        while let Some(p) = prev[cursor] {
            order.push(p);
            cursor = p;
        }
        order.reverse();
        Some(order.into_iter().map(|idx| nodes[idx].0).collect())
    }
}

pub(crate) fn segment_clear(
    rects: &[Rectangle],
    a: Point,
    b: Point,
    exempt_a: Option<usize>,
    exempt_b: Option<usize>,
    epsilon: f64,
) -> bool {
    rects.iter().enumerate().all(|(idx, rect)| {
        Some(idx) == exempt_a
            || Some(idx) == exempt_b
            || !segment_crosses_interior(a, b, rect, epsilon)
    })
}

/// Rectangles within `margin` of the bounding box of `a`-`b`.
pub(crate) fn nearby_rects(rects: &[Rectangle], a: Point, b: Point, margin: f64) -> Vec<usize> {
    let window = Rectangle::new(
        a.0.min(b.0) - margin,
        a.1.min(b.1) - margin,
        (a.0 - b.0).abs() + 2.0 * margin,
        (a.1 - b.1).abs() + 2.0 * margin,
    );
    rects
        .iter()
        .enumerate()
        .filter(|(_, rect)| rect.overlap_x(&window) >= 0.0 && rect.overlap_y(&window) >= 0.0)
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query<'a>(rects: &'a [Rectangle], corners: &'a [usize]) -> RouteQuery<'a> {
        RouteQuery {
            rects,
            from: EdgePoint::centre(0),
            to: EdgePoint::centre(1),
            corner_rects: corners,
            from_exempt: Some(0),
            to_exempt: Some(1),
            epsilon: 1e-7,
        }
    }

    #[test]
    fn unobstructed_route_is_direct() {
        let rects = vec![
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(100.0, 0.0, 10.0, 10.0),
        ];
        let path = query(&rects, &[0, 1]).shortest_path().expect("path");
        assert_eq!(path, vec![EdgePoint::centre(0), EdgePoint::centre(1)]);
    }

    #[test]
    fn route_bends_around_blocking_rectangle() {
        let rects = vec![
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(100.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(50.0, 2.0, 20.0, 20.0),
        ];
        let path = query(&rects, &[0, 1, 2]).shortest_path().expect("path");
        assert_eq!(
            path,
            vec![
                EdgePoint::centre(0),
                EdgePoint::Node {
                    node: 2,
                    corner: Corner::TopLeft
                },
                EdgePoint::Node {
                    node: 2,
                    corner: Corner::TopRight
                },
                EdgePoint::centre(1),
            ]
        );
    }

    #[test]
    fn tiny_detour_takes_the_strictly_shorter_side() {
        // The bottom side is shorter by about 1e-5; both sides tie if step
        // lengths are rounded to thousandths.
        let rects = vec![
            Rectangle::from_centre(0.0, 0.0, 0.01, 0.01),
            Rectangle::from_centre(0.1, 0.0, 0.01, 0.01),
            Rectangle::from_centre(0.05, -0.00001, 0.02, 0.02),
        ];
        let path = query(&rects, &[0, 1, 2]).shortest_path().expect("path");
        assert_eq!(
            path,
            vec![
                EdgePoint::centre(0),
                EdgePoint::Node {
                    node: 2,
                    corner: Corner::BottomLeft
                },
                EdgePoint::Node {
                    node: 2,
                    corner: Corner::BottomRight
                },
                EdgePoint::centre(1),
            ]
        );
    }

    #[test]
    fn enclosed_target_has_no_route() {
        let rects = vec![
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(100.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(100.0, 0.0, 40.0, 40.0),
        ];
        assert!(query(&rects, &[0, 1, 2]).shortest_path().is_none());
    }

    #[test]
    fn nearby_rects_uses_margin() {
        let rects = vec![
            Rectangle::new(0.0, 0.0, 5.0, 5.0),
            Rectangle::new(30.0, 30.0, 5.0, 5.0),
        ];
        assert_eq!(nearby_rects(&rects, (0.0, 10.0), (10.0, 10.0), 5.0), vec![0]);
        assert_eq!(nearby_rects(&rects, (0.0, 10.0), (10.0, 10.0), 25.0), vec![0, 1]);
    }
}
