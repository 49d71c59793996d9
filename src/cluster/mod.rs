//! Hierarchical clusters of rectangles with movable boundaries.

mod compound;

pub use compound::{
    BoundaryConstraint, CompoundConstraint, Offset, SeparationConstraint,
    generate_variables_and_constraints,
};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::geom::{Dim, Point, Rectangle, convex_hull};
use crate::overlap::{self, RemoveOverlapsOptions};
use crate::vpsc::{Solver, Variable};

pub type ClusterId = usize;

/// The root cluster; rectangles never added elsewhere belong to it.
pub const ROOT_CLUSTER: ClusterId = 0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub parent: Option<ClusterId>,
    pub children: Vec<ClusterId>,
    pub rects: Vec<usize>,
    /// Extent including margin, as of the last overlap pass.
    pub bounds: Option<Rectangle>,
}

/// Pins a rectangle's centre at `(x, y)` for one cluster pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub rect: usize,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    Rect(usize),
    Cluster(ClusterId),
}

/// Arena of clusters. A cluster's id is always larger than its parent's, so
/// walking ids in reverse visits children before parents.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterHierarchy {
    clusters: Vec<Cluster>,
    owner: BTreeMap<usize, ClusterId>,
}

impl Default for ClusterHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterHierarchy {
    pub fn new() -> Self {
        Self {
            clusters: vec![Cluster::default()],
            owner: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Only the root exists.
    pub fn is_flat(&self) -> bool {
        self.clusters.len() == 1
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn add_cluster(&mut self, parent: ClusterId) -> Result<ClusterId> {
        if parent >= self.clusters.len() {
            return Err(LayoutError::InvalidCluster {
                reason: format!("parent cluster {parent} does not exist"),
            });
        }
        let id = self.clusters.len();
        self.clusters.push(Cluster {
            parent: Some(parent),
            ..Cluster::default()
        });
        self.clusters[parent].children.push(id);
        Ok(id)
    }

    pub fn add_rectangle(&mut self, cluster: ClusterId, rect: usize) -> Result<()> {
        if cluster >= self.clusters.len() {
            return Err(LayoutError::InvalidCluster {
                reason: format!("cluster {cluster} does not exist"),
            });
        }
        if let Some(existing) = self.owner.get(&rect) {
            return Err(LayoutError::InvalidCluster {
                reason: format!("rectangle {rect} already belongs to cluster {existing}"),
            });
        }
        self.owner.insert(rect, cluster);
        self.clusters[cluster].rects.push(rect);
        Ok(())
    }

    pub fn owner_of(&self, rect: usize) -> ClusterId {
        self.owner.get(&rect).copied().unwrap_or(ROOT_CLUSTER)
    }

    fn validate(&self, rect_count: usize) -> Result<()> {
        if let Some((&rect, &cluster)) = self.owner.range(rect_count..).next() {
            return Err(LayoutError::InvalidCluster {
                reason: format!(
                    "cluster {cluster} holds rectangle {rect} but only {rect_count} rectangles exist"
                ),
            });
        }
        Ok(())
    }

    /// Every rectangle in the subtree rooted at `id`.
    pub fn subtree_rects(&self, id: ClusterId, rect_count: usize) -> Vec<usize> {
        if id == ROOT_CLUSTER {
            return (0..rect_count).collect();
        }
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(c) = stack.pop() {
            let Some(cluster) = self.clusters.get(c) else {
                continue;
            };
            out.extend(cluster.rects.iter().copied().filter(|&r| r < rect_count));
            stack.extend(cluster.children.iter().rev());
        }
        out
    }

    /// Direct members: own rectangles first, then child clusters that have
    /// a computed extent.
    fn members(&self, id: ClusterId, rect_count: usize) -> Vec<Member> {
        let mut out: Vec<Member> = if id == ROOT_CLUSTER {
            (0..rect_count)
                .filter(|&r| self.owner_of(r) == ROOT_CLUSTER)
                .map(Member::Rect)
                .collect()
        } else {
            self.clusters[id].rects.iter().copied().map(Member::Rect).collect()
        };
        out.extend(
            self.clusters[id]
                .children
                .iter()
                .copied()
                .filter(|&c| self.clusters[c].bounds.is_some())
                .map(Member::Cluster),
        );
        out
    }

    fn member_rect(&self, member: Member, rects: &[Rectangle]) -> Option<Rectangle> {
        match member {
            Member::Rect(r) => rects.get(r).copied(),
            Member::Cluster(c) => self.clusters[c].bounds,
        }
    }

    /// Translate a cluster together with everything inside it.
    fn translate_subtree(&mut self, id: ClusterId, dx: f64, dy: f64, rects: &mut [Rectangle]) {
        let mut stack = vec![id];
        while let Some(c) = stack.pop() {
            let cluster = &mut self.clusters[c];
            if let Some(bounds) = cluster.bounds.as_mut() {
                bounds.translate(dx, dy);
            }
            for &r in &cluster.rects {
                if let Some(rect) = rects.get_mut(r) {
                    rect.translate(dx, dy);
                }
            }
            stack.extend(cluster.children.iter().copied());
        }
    }

    fn apply_moves(
        &mut self,
        members: &[Member],
        before: &[Rectangle],
        after: &[Rectangle],
        rects: &mut [Rectangle],
    ) {
        for ((&member, old), new) in members.iter().zip(before).zip(after) {
            match member {
                Member::Rect(r) => rects[r] = *new,
                Member::Cluster(c) => {
                    self.translate_subtree(c, new.x - old.x, new.y - old.y, rects);
                }
            }
        }
    }

    fn refresh_bounds(&mut self, id: ClusterId, rects: &[Rectangle], margin: f64) {
        let items: Vec<Rectangle> = self
            .members(id, rects.len())
            .into_iter()
            .filter_map(|m| self.member_rect(m, rects))
            .collect();
        let extent = crate::geom::bounds(&items);
        self.clusters[id].bounds = if id == ROOT_CLUSTER {
            extent
        } else {
            extent.map(|r| r.expanded(margin))
        };
    }

    /// Clusters that hold a locked rectangle anywhere in their subtree.
    fn locked_clusters(&self, locked_rects: &BTreeSet<usize>) -> Vec<bool> {
        let mut locked = vec![false; self.clusters.len()];
        for &r in locked_rects {
            let mut cursor = Some(self.owner_of(r));
            while let Some(c) = cursor {
                if locked[c] {
                    break;
                }
                locked[c] = true;
                cursor = self.clusters[c].parent;
            }
        }
        locked
    }

    /// Convex hull of all member rectangle corners, counter-clockwise.
    pub fn cluster_hull(&self, id: ClusterId, rects: &[Rectangle]) -> Result<Vec<Point>> {
        if id >= self.clusters.len() {
            return Err(LayoutError::InvalidCluster {
                reason: format!("cluster {id} does not exist"),
            });
        }
        self.validate(rects.len())?;
        let corners: Vec<Point> = self
            .subtree_rects(id, rects.len())
            .into_iter()
            .flat_map(|r| rects[r].corners())
            .collect();
        Ok(convex_hull(&corners).into_iter().map(|i| corners[i]).collect())
    }
}

fn locked_members(members: &[Member], locked_rects: &BTreeSet<usize>, locked_clusters: &[bool]) -> BTreeSet<usize> {
    members
        .iter()
        .enumerate()
        .filter(|(_, m)| match m {
            Member::Rect(r) => locked_rects.contains(r),
            Member::Cluster(c) => locked_clusters[*c],
        })
        .map(|(idx, _)| idx)
        .collect()
}

/// Cluster-aware overlap removal.
///
/// Bottom-up, each cluster's own rectangles and child-cluster extents are
/// made overlap-free, child clusters moving rigidly with their contents.
/// Top-down, every cluster then re-solves containment of its members
/// against a boundary of its final extent.
pub fn remove_cluster_overlap_fast(
    hierarchy: &mut ClusterHierarchy,
    rects: &mut [Rectangle],
    locks: &[Lock],
    config: &LayoutConfig,
) -> Result<()> {
    overlap::validate_rectangles(rects)?;
    hierarchy.validate(rects.len())?;
    let mut locked_rects = BTreeSet::new();
    for lock in locks {
        if lock.rect >= rects.len() || !lock.x.is_finite() || !lock.y.is_finite() {
            return Err(LayoutError::InvalidRectangle {
                index: lock.rect,
                reason: "lock refers to a missing rectangle or a non-finite position".to_string(),
            });
        }
        rects[lock.rect].move_centre(lock.x, lock.y);
        locked_rects.insert(lock.rect);
    }
    let locked_clusters = hierarchy.locked_clusters(&locked_rects);
    let margin = config.cluster.margin;

    for id in (0..hierarchy.len()).rev() {
        let members = hierarchy.members(id, rects.len());
        let before: Vec<Rectangle> = members
            .iter()
            .filter_map(|&m| hierarchy.member_rect(m, rects))
            .collect();
        if before.len() > 1 {
            let mut after = before.clone();
            let options = RemoveOverlapsOptions {
                locked: locked_members(&members, &locked_rects, &locked_clusters),
                ..RemoveOverlapsOptions::from_config(config)
            };
            overlap::remove_overlaps_with_options(&mut after, &options, config)?;
            hierarchy.apply_moves(&members, &before, &after, rects);
        }
        hierarchy.refresh_bounds(id, rects, margin);
    }

    for id in 1..hierarchy.len() {
        contain_members(hierarchy, id, rects, &locked_rects, &locked_clusters, config)?;
    }
    hierarchy.refresh_bounds(ROOT_CLUSTER, rects, margin);
    debug!(
        clusters = hierarchy.len(),
        rects = rects.len(),
        locks = locks.len(),
        "cluster overlap removal finished"
    );
    Ok(())
}

/// Solve, per axis, the members of `id` against a boundary spanning the
/// cluster's extent, keeping siblings separated.
///
/// The extent comes from the bottom-up pass and already encloses every
/// member plus margin, so the boundary constraints start satisfied. The
/// pass moves members only when a sibling constraint still needs it, and
/// leaves the bounds refitted to the members plus margin.
fn contain_members(
    hierarchy: &mut ClusterHierarchy,
    id: ClusterId,
    rects: &mut [Rectangle],
    locked_rects: &BTreeSet<usize>,
    locked_clusters: &[bool],
    config: &LayoutConfig,
) -> Result<()> {
    let Some(mut extent) = hierarchy.clusters[id].bounds else {
        return Ok(());
    };
    let members = hierarchy.members(id, rects.len());
    let locked = locked_members(&members, locked_rects, locked_clusters);
    let mut items: Vec<Rectangle> = members
        .iter()
        .filter_map(|&m| hierarchy.member_rect(m, rects))
        .collect();
    let before = items.clone();

    for dim in [Dim::Horizontal, Dim::Vertical] {
        let (mut vars, mut cs) = overlap::generate_constraints(&items, dim, false)?;
        for &idx in &locked {
            vars[idx].weight = config.overlap.locked_weight;
        }
        let mut boundary = BoundaryConstraint::new(
            extent.centre_d(dim),
            extent.length(dim) / 2.0,
            config.cluster.margin,
            config.cluster.boundary_weight,
        );
        for (idx, item) in items.iter().enumerate() {
            boundary.add_child(idx, item.length(dim) / 2.0);
        }
        generate_variables_and_constraints(&mut [&mut boundary], &mut vars, &mut cs);
        let mut solver = Solver::with_config(vars, cs, &config.solver)?;
        solver.solve()?;
        let solved: &[Variable] = solver.variables();
        for (item, var) in items.iter_mut().zip(solved) {
            item.move_centre_d(dim, var.final_position);
        }
        boundary.update_position(solved);
        let (lo, hi) = boundary.extent();
        match dim {
            Dim::Horizontal => {
                extent.x = lo;
                extent.width = hi - lo;
            }
            Dim::Vertical => {
                extent.y = lo;
                extent.height = hi - lo;
            }
        }
    }

    hierarchy.apply_moves(&members, &before, &items, rects);
    hierarchy.clusters[id].bounds = Some(extent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlap::has_overlaps;

    fn two_cluster_scene() -> (ClusterHierarchy, Vec<Rectangle>) {
        let mut hierarchy = ClusterHierarchy::new();
        let a = hierarchy.add_cluster(ROOT_CLUSTER).expect("a");
        let b = hierarchy.add_cluster(ROOT_CLUSTER).expect("b");
        let rects = vec![
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(4.0, 2.0, 10.0, 10.0),
            Rectangle::from_centre(6.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(8.0, 3.0, 10.0, 10.0),
            Rectangle::from_centre(3.0, 1.0, 8.0, 8.0),
        ];
        hierarchy.add_rectangle(a, 0).expect("add");
        hierarchy.add_rectangle(a, 1).expect("add");
        hierarchy.add_rectangle(b, 2).expect("add");
        hierarchy.add_rectangle(b, 3).expect("add");
        (hierarchy, rects)
    }

    #[test]
    fn top_down_pass_refits_bounds_to_members() {
        let (mut hierarchy, mut rects) = two_cluster_scene();
        let config = LayoutConfig::default();
        remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &[], &config).expect("remove");

        for id in 1..hierarchy.len() {
            let cluster = hierarchy.cluster(id).expect("cluster");
            let bounds = cluster.bounds.expect("bounds");
            let members: Vec<Rectangle> = cluster.rects.iter().map(|&r| rects[r]).collect();
            let fitted = crate::geom::bounds(&members)
                .expect("members")
                .expanded(config.cluster.margin);
            assert!((bounds.x - fitted.x).abs() < 1e-6, "{bounds:?} vs {fitted:?}");
            assert!((bounds.y - fitted.y).abs() < 1e-6, "{bounds:?} vs {fitted:?}");
            assert!((bounds.width - fitted.width).abs() < 1e-6, "{bounds:?} vs {fitted:?}");
            assert!((bounds.height - fitted.height).abs() < 1e-6, "{bounds:?} vs {fitted:?}");
        }
    }

    #[test]
    fn clusters_and_members_end_up_disjoint_and_contained() {
        let (mut hierarchy, mut rects) = two_cluster_scene();
        let config = LayoutConfig::default();
        remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &[], &config).expect("remove");

        assert!(!has_overlaps(&rects, 1e-6));
        let margin = config.cluster.margin;
        for id in 1..hierarchy.len() {
            let bounds = hierarchy.cluster(id).and_then(|c| c.bounds).expect("bounds");
            for r in hierarchy.subtree_rects(id, rects.len()) {
                assert!(
                    bounds.contains_rect(&rects[r].expanded(margin), 1e-6),
                    "rect {r} escapes cluster {id}"
                );
            }
        }
        let a = hierarchy.cluster(1).and_then(|c| c.bounds).expect("a");
        let b = hierarchy.cluster(2).and_then(|c| c.bounds).expect("b");
        assert!(!a.overlaps(&b, 1e-6));
    }

    #[test]
    fn locked_rectangle_is_moved_to_lock_and_held() {
        let (mut hierarchy, mut rects) = two_cluster_scene();
        let lock = Lock {
            rect: 0,
            x: -20.0,
            y: 5.0,
        };
        remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &[lock], &LayoutConfig::default())
            .expect("remove");
        let (cx, cy) = rects[0].centre();
        assert!((cx + 20.0).abs() < 1e-2, "x drifted to {cx}");
        assert!((cy - 5.0).abs() < 1e-2, "y drifted to {cy}");
        assert!(!has_overlaps(&rects, 1e-6));
    }

    #[test]
    fn nested_cluster_moves_rigidly_with_parent() {
        let mut hierarchy = ClusterHierarchy::new();
        let outer = hierarchy.add_cluster(ROOT_CLUSTER).expect("outer");
        let inner = hierarchy.add_cluster(outer).expect("inner");
        let mut rects = vec![
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(30.0, 0.0, 10.0, 10.0),
            Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
        ];
        hierarchy.add_rectangle(inner, 0).expect("add");
        hierarchy.add_rectangle(inner, 1).expect("add");
        hierarchy.add_rectangle(outer, 2).expect("add");
        remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &[], &LayoutConfig::default())
            .expect("remove");
        // The two inner rectangles never overlapped, so their spacing holds.
        assert!((rects[1].centre_x() - rects[0].centre_x() - 30.0).abs() < 1e-6);
        assert!(!has_overlaps(&rects, 1e-6));
        let outer_bounds = hierarchy.cluster(outer).and_then(|c| c.bounds).expect("outer");
        let inner_bounds = hierarchy.cluster(inner).and_then(|c| c.bounds).expect("inner");
        assert!(outer_bounds.contains_rect(&inner_bounds, 1e-6));
    }

    #[test]
    fn hierarchy_rejects_bad_inserts() {
        let mut hierarchy = ClusterHierarchy::new();
        assert!(hierarchy.add_cluster(5).is_err());
        let c = hierarchy.add_cluster(ROOT_CLUSTER).expect("cluster");
        hierarchy.add_rectangle(c, 0).expect("first insert");
        let err = hierarchy.add_rectangle(ROOT_CLUSTER, 0).expect_err("second parent");
        assert!(matches!(err, LayoutError::InvalidCluster { .. }));
        assert_eq!(hierarchy.owner_of(0), c);
        assert_eq!(hierarchy.owner_of(1), ROOT_CLUSTER);
    }

    #[test]
    fn missing_rectangle_in_cluster_is_reported() {
        let mut hierarchy = ClusterHierarchy::new();
        let c = hierarchy.add_cluster(ROOT_CLUSTER).expect("cluster");
        hierarchy.add_rectangle(c, 7).expect("insert");
        let mut rects = vec![Rectangle::new(0.0, 0.0, 1.0, 1.0)];
        let err = remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &[], &LayoutConfig::default())
            .expect_err("dangling");
        assert!(matches!(err, LayoutError::InvalidCluster { .. }));
    }

    #[test]
    fn hull_wraps_member_corners() {
        let mut hierarchy = ClusterHierarchy::new();
        let c = hierarchy.add_cluster(ROOT_CLUSTER).expect("cluster");
        let rects = vec![Rectangle::new(0.0, 0.0, 2.0, 2.0), Rectangle::new(4.0, 1.0, 2.0, 2.0)];
        hierarchy.add_rectangle(c, 0).expect("add");
        hierarchy.add_rectangle(c, 1).expect("add");
        let hull = hierarchy.cluster_hull(c, &rects).expect("hull");
        assert_eq!(hull.len(), 6);
        for corner in [(0.0, 0.0), (6.0, 1.0), (6.0, 3.0), (0.0, 2.0)] {
            assert!(hull.contains(&corner), "missing {corner:?}");
        }
        assert!(!hull.contains(&(2.0, 2.0)));
    }
}
