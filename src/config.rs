use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Slack below which a constraint counts as violated.
    pub zero_upper_bound: f64,
    /// Lagrange multiplier below which an active constraint is split.
    pub lagrangian_tolerance: f64,
    /// Cost change under which the satisfy/split loop stops.
    pub cost_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            zero_upper_bound: -1e-10,
            lagrangian_tolerance: -1e-4,
            cost_tolerance: 1e-4,
            max_iterations: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapConfig {
    pub use_neighbour_lists: bool,
    pub third_pass: bool,
    /// Weight given to locked rectangles; large enough to keep them in place.
    pub locked_weight: f64,
    /// Overlap (on both axes) tolerated before a pair counts as overlapping.
    pub tolerance: f64,
    /// Extra rounds allowed when residual overlap survives a pass.
    pub max_rounds: usize,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            use_neighbour_lists: false,
            third_pass: true,
            locked_weight: 1e6,
            tolerance: 1e-6,
            max_rounds: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Space kept between a cluster boundary and its children.
    pub margin: f64,
    /// Stiffness of boundary variables; small so children drive the boundary.
    pub boundary_weight: f64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            margin: 10.0,
            boundary_weight: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Inset applied to obstacles when testing whether a segment enters them.
    pub interior_epsilon: f64,
    /// Distance under which two path points are treated as the same point.
    pub point_tolerance: f64,
    /// Padding around a blocked segment when collecting obstacles for a local repair.
    pub repair_margin: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            interior_epsilon: 1e-7,
            point_tolerance: 1e-7,
            repair_margin: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub solver: SolverConfig,
    pub overlap: OverlapConfig,
    pub cluster: ClusterConfig,
    pub routing: RoutingConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolverConfigFile {
    zero_upper_bound: Option<f64>,
    lagrangian_tolerance: Option<f64>,
    cost_tolerance: Option<f64>,
    max_iterations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverlapConfigFile {
    use_neighbour_lists: Option<bool>,
    third_pass: Option<bool>,
    locked_weight: Option<f64>,
    tolerance: Option<f64>,
    max_rounds: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfigFile {
    margin: Option<f64>,
    boundary_weight: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutingConfigFile {
    interior_epsilon: Option<f64>,
    point_tolerance: Option<f64>,
    repair_margin: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    solver: Option<SolverConfigFile>,
    overlap: Option<OverlapConfigFile>,
    cluster: Option<ClusterConfigFile>,
    routing: Option<RoutingConfigFile>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<LayoutConfig> {
    let Some(path) = path else {
        return Ok(LayoutConfig::default());
    };

    let contents = std::fs::read_to_string(path)?;
    let is_json5 = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json5"))
        .unwrap_or(false);
    let parsed = parse_config_file(&contents, is_json5)?;
    Ok(apply_config_file(LayoutConfig::default(), parsed))
}

pub fn parse_config_str(contents: &str) -> anyhow::Result<LayoutConfig> {
    let parsed = parse_config_file(contents, false)?;
    Ok(apply_config_file(LayoutConfig::default(), parsed))
}

fn parse_config_file(contents: &str, is_json5: bool) -> anyhow::Result<ConfigFile> {
    if is_json5 {
        return json5::from_str(contents)
            .map_err(|err| anyhow::anyhow!("invalid json5 config: {err}"));
    }
    Ok(serde_json::from_str(contents)?)
}

fn apply_config_file(mut config: LayoutConfig, parsed: ConfigFile) -> LayoutConfig {
    if let Some(solver) = parsed.solver {
        if let Some(v) = solver.zero_upper_bound {
            config.solver.zero_upper_bound = v;
        }
        if let Some(v) = solver.lagrangian_tolerance {
            config.solver.lagrangian_tolerance = v;
        }
        if let Some(v) = solver.cost_tolerance {
            config.solver.cost_tolerance = v;
        }
        if let Some(v) = solver.max_iterations {
            config.solver.max_iterations = v.max(1);
        }
    }
    if let Some(overlap) = parsed.overlap {
        if let Some(v) = overlap.use_neighbour_lists {
            config.overlap.use_neighbour_lists = v;
        }
        if let Some(v) = overlap.third_pass {
            config.overlap.third_pass = v;
        }
        if let Some(v) = overlap.locked_weight {
            config.overlap.locked_weight = v;
        }
        if let Some(v) = overlap.tolerance {
            config.overlap.tolerance = v.max(0.0);
        }
        if let Some(v) = overlap.max_rounds {
            config.overlap.max_rounds = v;
        }
    }
    if let Some(cluster) = parsed.cluster {
        if let Some(v) = cluster.margin {
            config.cluster.margin = v.max(0.0);
        }
        if let Some(v) = cluster.boundary_weight {
            config.cluster.boundary_weight = v;
        }
    }
    if let Some(routing) = parsed.routing {
        if let Some(v) = routing.interior_epsilon {
            config.routing.interior_epsilon = v;
        }
        if let Some(v) = routing.point_tolerance {
            config.routing.point_tolerance = v;
        }
        if let Some(v) = routing.repair_margin {
            config.routing.repair_margin = v.max(0.0);
        }
    }
    config
}
