//! JSON scene description and the layout pipeline the CLI runs over it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cluster::{ClusterHierarchy, ClusterId, Lock, ROOT_CLUSTER, remove_cluster_overlap_fast};
use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::geom::{Point, Rectangle, bounds};
use crate::overlap::has_overlaps;
use crate::topology::{EdgePoint, EdgeState, TopologyEdge, TopologyRouter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub rects: Vec<Rectangle>,
    #[serde(default)]
    pub clusters: Vec<SceneCluster>,
    #[serde(default)]
    pub locks: Vec<Lock>,
    #[serde(default)]
    pub edges: Vec<SceneEdge>,
}

/// A cluster; `parent` indexes an earlier entry of `Scene::clusters`, and
/// clusters without one hang off the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneCluster {
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneEdge {
    pub source: usize,
    pub target: usize,
    #[serde(default)]
    pub ideal_length: f64,
    /// Optional starting path; repaired after the rectangles move.
    #[serde(default)]
    pub path: Option<Vec<EdgePoint>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDump {
    pub rects: Vec<Rectangle>,
    pub clusters: Vec<ClusterDump>,
    pub edges: Vec<EdgeDump>,
    pub width: f64,
    pub height: f64,
    pub residual_overlap: bool,
    pub crossings: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDump {
    pub index: usize,
    pub bounds: Option<Rectangle>,
    pub hull: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDump {
    pub source: usize,
    pub target: usize,
    pub state: EdgeState,
    pub points: Vec<[f64; 2]>,
    pub length: f64,
    pub length_deviation: f64,
    pub straightness: f64,
}

impl Scene {
    /// Build the cluster arena; scene cluster `i` becomes hierarchy id `i + 1`.
    pub fn hierarchy(&self) -> Result<ClusterHierarchy> {
        let mut hierarchy = ClusterHierarchy::new();
        for (idx, cluster) in self.clusters.iter().enumerate() {
            let parent: ClusterId = match cluster.parent {
                None => ROOT_CLUSTER,
                Some(p) if p < idx => p + 1,
                Some(p) => {
                    return Err(LayoutError::InvalidCluster {
                        reason: format!("cluster {idx} names parent {p}, which is not declared before it"),
                    });
                }
            };
            let id = hierarchy.add_cluster(parent)?;
            for &rect in &cluster.members {
                hierarchy.add_rectangle(id, rect)?;
            }
        }
        Ok(hierarchy)
    }
}

/// Remove overlaps (cluster-aware) and, when `route` is set, route every
/// edge around the final rectangles.
pub fn run(scene: &Scene, config: &LayoutConfig, route: bool) -> Result<SceneDump> {
    let mut rects = scene.rects.clone();
    let mut hierarchy = scene.hierarchy()?;

    let mut router = TopologyRouter::new(config.routing.clone());
    if route {
        for (id, edge) in scene.edges.iter().enumerate() {
            let topology_edge = match &edge.path {
                Some(path) => TopologyEdge::new(id, edge.ideal_length, path.clone())?,
                None => TopologyEdge::between(id, edge.source, edge.target, edge.ideal_length)?,
            };
            if (topology_edge.source(), topology_edge.target()) != (edge.source, edge.target) {
                return Err(LayoutError::InvalidEdge {
                    id,
                    reason: format!(
                        "path runs {} -> {} but the edge is {} -> {}",
                        topology_edge.source(),
                        topology_edge.target(),
                        edge.source,
                        edge.target
                    ),
                });
            }
            router.add_edge(topology_edge, &rects)?;
        }
    }

    remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &scene.locks, config)?;
    let residual_overlap = has_overlaps(&rects, config.overlap.tolerance);
    if residual_overlap {
        warn!(rects = rects.len(), "overlap remains after removal");
    }

    if route {
        let unrouted = router.update_positions(&rects)?;
        let pending: Vec<usize> = router
            .edges()
            .iter()
            .filter(|e| matches!(e.state(), EdgeState::Unrouted | EdgeState::Degenerate))
            .map(|e| e.id)
            .filter(|id| !unrouted.contains(id))
            .collect();
        for id in pending {
            match router.route(id, &rects) {
                Ok(()) => {}
                Err(LayoutError::NoRoute { id }) => warn!(edge = id, "edge left unrouted"),
                Err(err) => return Err(err),
            }
        }
    }

    let mut clusters = Vec::with_capacity(scene.clusters.len());
    for idx in 0..scene.clusters.len() {
        let id = idx + 1;
        let hull = hierarchy.cluster_hull(id, &rects)?;
        clusters.push(ClusterDump {
            index: idx,
            bounds: hierarchy.cluster(id).and_then(|c| c.bounds),
            hull: hull.into_iter().map(point_pair).collect(),
        });
    }

    let edges = router
        .edges()
        .iter()
        .map(|edge| EdgeDump {
            source: edge.source(),
            target: edge.target(),
            state: edge.state(),
            points: edge
                .get_path(&rects)
                .map(|points| points.into_iter().map(point_pair).collect())
                .unwrap_or_default(),
            length: edge.path_length(&rects),
            length_deviation: edge.length_deviation(&rects),
            straightness: edge.straightness(&rects),
        })
        .collect();

    let extent = bounds(&rects);
    let dump = SceneDump {
        width: extent.map_or(0.0, |b| b.width),
        height: extent.map_or(0.0, |b| b.height),
        residual_overlap,
        crossings: router.total_crossings(&rects),
        rects,
        clusters,
        edges,
    };
    debug!(
        rects = dump.rects.len(),
        clusters = dump.clusters.len(),
        edges = dump.edges.len(),
        crossings = dump.crossings,
        "scene laid out"
    );
    Ok(dump)
}

fn point_pair(p: Point) -> [f64; 2] {
    [p.0, p.1]
}
