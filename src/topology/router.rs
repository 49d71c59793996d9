use tracing::{debug, trace, warn};

use super::edge::{
    Corner, EdgePoint, EdgeState, TopologyEdge, is_straight, resolve, valid_turn,
};
use super::visibility::{RouteQuery, nearby_rects, segment_clear};
use crate::config::RoutingConfig;
use crate::error::{LayoutError, Result};
use crate::geom::{Point, Rectangle, points_coincide, segments_cross_properly};

/// Local repair attempts before an edge falls back to a full route.
const REPAIR_ROUNDS: usize = 3;

/// Owns a set of edges and keeps their paths valid as rectangles move.
#[derive(Debug, Clone, Default)]
pub struct TopologyRouter {
    edges: Vec<TopologyEdge>,
    config: RoutingConfig,
}

impl TopologyRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            edges: Vec::new(),
            config,
        }
    }

    pub fn edges(&self) -> &[TopologyEdge] {
        &self.edges
    }

    pub fn edge(&self, id: usize) -> Option<&TopologyEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    fn index_of(&self, id: usize) -> Result<usize> {
        self.edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| LayoutError::InvalidEdge {
                id,
                reason: "no such edge".to_string(),
            })
    }

    /// Register an edge. A supplied path is checked against `rects` and the
    /// edge starts out routed, invalidated or degenerate accordingly.
    pub fn add_edge(&mut self, mut edge: TopologyEdge, rects: &[Rectangle]) -> Result<()> {
        if self.edges.iter().any(|e| e.id == edge.id) {
            return Err(LayoutError::InvalidEdge {
                id: edge.id,
                reason: "duplicate edge id".to_string(),
            });
        }
        resolve(edge.path(), rects, edge.id)?;
        if edge.state() == EdgeState::Routed {
            let state = self.check(&edge, rects);
            edge.set_state(state);
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Route one edge from scratch, discarding its current path.
    pub fn route(&mut self, id: usize, rects: &[Rectangle]) -> Result<()> {
        let idx = self.index_of(id)?;
        let path = self.full_route(&self.edges[idx], rects)?;
        self.edges[idx].set_path(path);
        trace!(edge = id, segments = self.edges[idx].n_segments(), "edge routed");
        Ok(())
    }

    pub fn route_all(&mut self, rects: &[Rectangle]) -> Result<()> {
        let ids: Vec<usize> = self.edges.iter().map(|e| e.id).collect();
        for id in ids {
            self.route(id, rects)?;
        }
        debug!(edges = self.edges.len(), "routed all edges");
        Ok(())
    }

    /// Re-validate every routed edge against moved rectangles, repairing the
    /// broken ones locally where possible. Unrouted and degenerate edges are
    /// left for an explicit [`TopologyRouter::route`].
    ///
    /// An edge with no route left is reset to a straight, unrouted path and
    /// the rest are still updated; the ids of such edges are returned.
    pub fn update_positions(&mut self, rects: &[Rectangle]) -> Result<Vec<usize>> {
        let mut repaired = 0usize;
        let mut unrouted = Vec::new();
        for idx in 0..self.edges.len() {
            if !matches!(
                self.edges[idx].state(),
                EdgeState::Routed | EdgeState::Invalidated
            ) {
                continue;
            }
            match self.check(&self.edges[idx], rects) {
                EdgeState::Routed => {
                    self.edges[idx].set_state(EdgeState::Routed);
                    continue;
                }
                EdgeState::Degenerate => {
                    warn!(edge = self.edges[idx].id, "edge path became degenerate");
                    self.edges[idx].set_state(EdgeState::Degenerate);
                    continue;
                }
                _ => {}
            }
            self.edges[idx].set_state(EdgeState::Invalidated);
            match self.incremental_route(idx, rects) {
                Ok(path) => {
                    self.edges[idx].set_path(path);
                    repaired += 1;
                }
                Err(LayoutError::NoRoute { id }) => {
                    warn!(edge = id, "no route after update; edge left unrouted");
                    self.edges[idx].clear_route();
                    unrouted.push(id);
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            edges = self.edges.len(),
            repaired,
            unrouted = unrouted.len(),
            "edge positions updated"
        );
        Ok(unrouted)
    }

    /// Proper crossings between the paths of edges `a` and `b`.
    pub fn crossings(&self, a: usize, b: usize, rects: &[Rectangle]) -> Result<usize> {
        let pa = self.edges[self.index_of(a)?].get_path(rects)?;
        let pb = self.edges[self.index_of(b)?].get_path(rects)?;
        Ok(count_crossings(&pa, &pb))
    }

    /// Crossings summed over every pair of non-degenerate edges.
    pub fn total_crossings(&self, rects: &[Rectangle]) -> usize {
        let paths: Vec<Vec<Point>> = self
            .edges
            .iter()
            .filter_map(|e| e.get_path(rects).ok())
            .collect();
        let mut total = 0;
        for i in 0..paths.len() {
            for j in (i + 1)..paths.len() {
                total += count_crossings(&paths[i], &paths[j]);
            }
        }
        total
    }

    fn check(&self, edge: &TopologyEdge, rects: &[Rectangle]) -> EdgeState {
        let Ok(points) = resolve(edge.path(), rects, edge.id) else {
            return EdgeState::Invalidated;
        };
        if edge.cycle(rects, self.config.point_tolerance) {
            return EdgeState::Degenerate;
        }
        if self.path_valid(edge, edge.path(), &points, rects) {
            EdgeState::Routed
        } else {
            EdgeState::Invalidated
        }
    }

    fn path_valid(
        &self,
        edge: &TopologyEdge,
        path: &[EdgePoint],
        points: &[Point],
        rects: &[Rectangle],
    ) -> bool {
        if path.first() != Some(&EdgePoint::centre(edge.source()))
            || path.last() != Some(&EdgePoint::centre(edge.target()))
        {
            return false;
        }
        let last = points.len().saturating_sub(2);
        let segments_clear = points.windows(2).enumerate().all(|(k, w)| {
            segment_clear(
                rects,
                w[0],
                w[1],
                (k == 0).then_some(edge.source()),
                (k == last).then_some(edge.target()),
                self.config.interior_epsilon,
            )
        });
        segments_clear && bends_valid(path, points, rects)
    }

    fn full_route(&self, edge: &TopologyEdge, rects: &[Rectangle]) -> Result<Vec<EdgePoint>> {
        let all: Vec<usize> = (0..rects.len()).collect();
        let query = RouteQuery {
            rects,
            from: EdgePoint::centre(edge.source()),
            to: EdgePoint::centre(edge.target()),
            corner_rects: &all,
            from_exempt: Some(edge.source()),
            to_exempt: Some(edge.target()),
            epsilon: self.config.interior_epsilon,
        };
        let path = query
            .shortest_path()
            .ok_or(LayoutError::NoRoute { id: edge.id })?;
        Ok(tidy(path, rects, self.config.point_tolerance))
    }

    /// Prune bends that no longer wrap their rectangle, patch blocked
    /// segments with local searches, and keep the result only if it is valid
    /// and adds no crossings over a full route.
    fn incremental_route(&self, idx: usize, rects: &[Rectangle]) -> Result<Vec<EdgePoint>> {
        let edge = &self.edges[idx];
        let candidate = self.repair(edge, rects);
        let Some(candidate) = candidate else {
            debug!(edge = edge.id, "local repair failed; routing from scratch");
            return self.full_route(edge, rects);
        };

        let others: Vec<Vec<Point>> = self
            .edges
            .iter()
            .enumerate()
            .filter(|(i, e)| *i != idx && e.state() == EdgeState::Routed)
            .filter_map(|(_, e)| e.get_path(rects).ok())
            .collect();
        let candidate_points = resolve(&candidate, rects, edge.id)?;
        let candidate_crossings: usize = others
            .iter()
            .map(|o| count_crossings(&candidate_points, o))
            .sum();
        if candidate_crossings == 0 {
            return Ok(candidate);
        }
        let full = self.full_route(edge, rects)?;
        let full_points = resolve(&full, rects, edge.id)?;
        let full_crossings: usize = others.iter().map(|o| count_crossings(&full_points, o)).sum();
        if full_crossings < candidate_crossings {
            debug!(
                edge = edge.id,
                candidate_crossings, full_crossings, "full route beats local repair"
            );
            Ok(full)
        } else {
            Ok(candidate)
        }
    }

    fn repair(&self, edge: &TopologyEdge, rects: &[Rectangle]) -> Option<Vec<EdgePoint>> {
        let mut path = edge.path().to_vec();
        for _ in 0..REPAIR_ROUNDS {
            prune_invalid_bends(&mut path, rects);
            let points = resolve(&path, rects, edge.id).ok()?;
            if self.path_valid(edge, &path, &points, rects) {
                let path = tidy(path, rects, self.config.point_tolerance);
                let tidied = resolve(&path, rects, edge.id).ok()?;
                let tidied_edge = TopologyEdge::new(edge.id, edge.ideal_length, path.clone()).ok()?;
                if tidied_edge.cycle(rects, self.config.point_tolerance)
                    || !self.path_valid(edge, &path, &tidied, rects)
                {
                    return None;
                }
                return Some(path);
            }
            path = self.patch_segments(edge, &path, &points, rects)?;
        }
        None
    }

    fn patch_segments(
        &self,
        edge: &TopologyEdge,
        path: &[EdgePoint],
        points: &[Point],
        rects: &[Rectangle],
    ) -> Option<Vec<EdgePoint>> {
        let last = points.len().saturating_sub(2);
        let mut out = vec![*path.first()?];
        for k in 0..points.len().saturating_sub(1) {
            let from_exempt = (k == 0).then_some(edge.source());
            let to_exempt = (k == last).then_some(edge.target());
            let (a, b) = (points[k], points[k + 1]);
            if segment_clear(rects, a, b, from_exempt, to_exempt, self.config.interior_epsilon) {
                out.push(path[k + 1]);
                continue;
            }
            let local = nearby_rects(rects, a, b, self.config.repair_margin);
            let all: Vec<usize> = (0..rects.len()).collect();
            let mut query = RouteQuery {
                rects,
                from: path[k],
                to: path[k + 1],
                corner_rects: &local,
                from_exempt,
                to_exempt,
                epsilon: self.config.interior_epsilon,
            };
            let sub = query.shortest_path().or_else(|| {
                trace!(edge = edge.id, segment = k, "widening repair to all obstacles");
                query.corner_rects = &all;
                query.shortest_path()
            })?;
            out.extend(sub.into_iter().skip(1));
        }
        Some(out)
    }
}

fn bends_valid(path: &[EdgePoint], points: &[Point], rects: &[Rectangle]) -> bool {
    (1..points.len().saturating_sub(1)).all(|i| {
        let wrap = path[i].node().and_then(|n| rects.get(n));
        valid_turn(points[i - 1], points[i], points[i + 1], wrap)
    })
}

/// Drop interior bends that fail the turn test, one at a time from the
/// front, until every remaining bend passes.
fn prune_invalid_bends(path: &mut Vec<EdgePoint>, rects: &[Rectangle]) {
    loop {
        let points: Vec<Option<Point>> = path.iter().map(|p| p.position(rects)).collect();
        let bad = (1..path.len().saturating_sub(1)).find(|&i| {
            match (points[i - 1], points[i], points[i + 1]) {
                (Some(u), Some(w), Some(v)) => {
                    let wrap = path[i].node().and_then(|n| rects.get(n));
                    !valid_turn(u, w, v, wrap)
                }
                _ => true,
            }
        });
        match bad {
            Some(i) => {
                path.remove(i);
            }
            None => return,
        }
    }
}

/// Remove repeated and straight-through points, then move each remaining
/// bend onto a rectangle it actually turns around.
fn tidy(mut path: Vec<EdgePoint>, rects: &[Rectangle], tolerance: f64) -> Vec<EdgePoint> {
    let position = |p: &EdgePoint| p.position(rects).unwrap_or((f64::NAN, f64::NAN));
    let mut i = 1;
    while i + 1 < path.len() {
        let (u, w, v) = (position(&path[i - 1]), position(&path[i]), position(&path[i + 1]));
        if points_coincide(u, w, tolerance) || is_straight(u, w, v) {
            path.remove(i);
            i = i.saturating_sub(1).max(1);
            continue;
        }
        i += 1;
    }
    for i in 1..path.len().saturating_sub(1) {
        let (u, w, v) = (position(&path[i - 1]), position(&path[i]), position(&path[i + 1]));
        let wrap = path[i].node().and_then(|n| rects.get(n));
        if valid_turn(u, w, v, wrap) {
            continue;
        }
        let replacement = rects.iter().enumerate().find_map(|(r, rect)| {
            Corner::OUTER.iter().find_map(|&corner| {
                let p = corner.point(rect);
                (points_coincide(p, w, tolerance) && valid_turn(u, w, v, Some(rect)))
                    .then_some(EdgePoint::Node { node: r, corner })
            })
        });
        if let Some(replacement) = replacement {
            path[i] = replacement;
        }
    }
    path
}

fn count_crossings(a: &[Point], b: &[Point]) -> usize {
    let mut count = 0;
    for sa in a.windows(2) {
        for sb in b.windows(2) {
            if segments_cross_properly(sa[0], sa[1], sb[0], sb[1]) {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::segment_crosses_interior;

    fn scene() -> Vec<Rectangle> {
        vec![
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(100.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(50.0, 60.0, 20.0, 20.0),
        ]
    }

    fn router_with_edge(rects: &[Rectangle]) -> TopologyRouter {
        let mut router = TopologyRouter::new(RoutingConfig::default());
        router
            .add_edge(TopologyEdge::between(0, 0, 1, 100.0).expect("edge"), rects)
            .expect("add");
        router
    }

    #[test]
    fn routed_edge_is_valid_and_ends_on_centres() {
        let rects = scene();
        let mut router = router_with_edge(&rects);
        router.route_all(&rects).expect("route");
        let edge = router.edge(0).expect("edge");
        assert_eq!(edge.state(), EdgeState::Routed);
        assert!(edge.assert_convex_bends(&rects));
        assert!(!edge.cycle(&rects, 1e-9));
        let path = edge.get_path(&rects).expect("path");
        assert_eq!(path.first(), Some(&(0.0, 0.0)));
        assert_eq!(path.last(), Some(&(100.0, 0.0)));
        assert_eq!(edge.n_segments(), 1);
    }

    #[test]
    fn moving_obstacle_into_the_way_triggers_repair() {
        let mut rects = scene();
        let mut router = router_with_edge(&rects);
        router.route_all(&rects).expect("route");

        rects[2] = Rectangle::from_centre(50.0, 3.0, 20.0, 20.0);
        router.update_positions(&rects).expect("update");
        let edge = router.edge(0).expect("edge");
        assert_eq!(edge.state(), EdgeState::Routed);
        assert!(edge.assert_convex_bends(&rects));
        assert!(!edge.cycle(&rects, 1e-9));
        assert_eq!(edge.n_segments(), 3);
        assert!(edge.path().iter().any(|p| p.node() == Some(2)));

        // Moving it away again lets the bends go slack and they are pruned.
        rects[2] = Rectangle::from_centre(50.0, 60.0, 20.0, 20.0);
        router.update_positions(&rects).expect("update");
        let edge = router.edge(0).expect("edge");
        assert_eq!(edge.n_segments(), 1);
        assert!((edge.straightness(&rects) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn supplied_cyclic_path_is_degenerate_until_rerouted() {
        let rects = scene();
        let mut router = TopologyRouter::default();
        let looped = vec![
            EdgePoint::centre(0),
            EdgePoint::Free { x: 30.0, y: 30.0 },
            EdgePoint::Free { x: 30.0, y: 30.0 },
            EdgePoint::centre(1),
        ];
        router
            .add_edge(TopologyEdge::new(3, 100.0, looped).expect("edge"), &rects)
            .expect("add");
        let edge = router.edge(3).expect("edge");
        assert_eq!(edge.state(), EdgeState::Degenerate);
        assert!(matches!(edge.get_path(&rects), Err(LayoutError::DegeneratePath { id: 3 })));

        assert!(router.update_positions(&rects).expect("update").is_empty());
        assert_eq!(router.edge(3).map(|e| e.state()), Some(EdgeState::Degenerate));

        router.route(3, &rects).expect("reroute");
        assert_eq!(router.edge(3).map(|e| e.state()), Some(EdgeState::Routed));
    }

    #[test]
    fn supplied_path_that_doubles_back_is_degenerate() {
        let rects = scene();
        let mut router = TopologyRouter::default();
        let doubled = vec![
            EdgePoint::centre(0),
            EdgePoint::Free { x: 60.0, y: 0.0 },
            EdgePoint::Free { x: 30.0, y: 0.0 },
            EdgePoint::centre(1),
        ];
        router
            .add_edge(TopologyEdge::new(5, 100.0, doubled).expect("edge"), &rects)
            .expect("add");
        assert_eq!(router.edge(5).map(|e| e.state()), Some(EdgeState::Degenerate));
    }

    #[test]
    fn one_unroutable_edge_does_not_stop_the_others() {
        let mut rects = vec![
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(100.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(0.0, 100.0, 10.0, 10.0),
            Rectangle::from_centre(100.0, 100.0, 10.0, 10.0),
            Rectangle::from_centre(500.0, 500.0, 10.0, 10.0),
            Rectangle::from_centre(600.0, 600.0, 10.0, 10.0),
        ];
        let mut router = TopologyRouter::default();
        router
            .add_edge(TopologyEdge::between(0, 0, 1, 100.0).expect("edge"), &rects)
            .expect("add");
        router
            .add_edge(TopologyEdge::between(1, 2, 3, 100.0).expect("edge"), &rects)
            .expect("add");
        router.route_all(&rects).expect("route");

        // Rect 4 swallows node 1; rect 5 lands on the second edge.
        rects[4] = Rectangle::from_centre(100.0, 0.0, 40.0, 40.0);
        rects[5] = Rectangle::from_centre(50.0, 100.0, 20.0, 20.0);
        let unrouted = router.update_positions(&rects).expect("update");
        assert_eq!(unrouted, vec![0]);

        let blocked = router.edge(0).expect("edge");
        assert_eq!(blocked.state(), EdgeState::Unrouted);
        assert_eq!(blocked.n_segments(), 1);

        let detoured = router.edge(1).expect("edge");
        assert_eq!(detoured.state(), EdgeState::Routed);
        assert_eq!(detoured.n_segments(), 3);
        let points = detoured.get_path(&rects).expect("path");
        assert!(
            points
                .windows(2)
                .all(|w| !segment_crosses_interior(w[0], w[1], &rects[5], 1e-7))
        );
    }

    #[test]
    fn crossings_count_proper_intersections() {
        let rects = vec![
            Rectangle::from_centre(0.0, 0.0, 4.0, 4.0),
            Rectangle::from_centre(100.0, 100.0, 4.0, 4.0),
            Rectangle::from_centre(0.0, 100.0, 4.0, 4.0),
            Rectangle::from_centre(100.0, 0.0, 4.0, 4.0),
        ];
        let mut router = TopologyRouter::default();
        router
            .add_edge(TopologyEdge::between(0, 0, 1, 10.0).expect("edge"), &rects)
            .expect("add");
        router
            .add_edge(TopologyEdge::between(1, 2, 3, 10.0).expect("edge"), &rects)
            .expect("add");
        router.route_all(&rects).expect("route");
        assert_eq!(router.crossings(0, 1, &rects).expect("count"), 1);
        assert_eq!(router.total_crossings(&rects), 1);
    }

    #[test]
    fn duplicate_and_dangling_edges_are_rejected() {
        let rects = scene();
        let mut router = router_with_edge(&rects);
        let dup = TopologyEdge::between(0, 1, 2, 10.0).expect("edge");
        assert!(router.add_edge(dup, &rects).is_err());
        let dangling = TopologyEdge::between(9, 0, 7, 10.0).expect("edge");
        assert!(matches!(
            router.add_edge(dangling, &rects),
            Err(LayoutError::InvalidEdge { id: 9, .. })
        ));
        assert!(router.route(42, &rects).is_err());
    }

    #[test]
    fn enclosed_endpoint_reports_no_route() {
        let mut rects = scene();
        rects.push(Rectangle::from_centre(100.0, 0.0, 40.0, 40.0));
        let mut router = router_with_edge(&rects);
        assert_eq!(router.route(0, &rects), Err(LayoutError::NoRoute { id: 0 }));
    }
}
