use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// A directed cycle of constraints whose gaps sum to a positive value.
    #[error("unsatisfiable constraint set: cycle through variables {cycle:?} requires total gap {total_gap}")]
    InfeasibleConstraints { cycle: Vec<usize>, total_gap: f64 },

    /// The solver stopped with constraint `constraint` still violated by
    /// `slack`, although the set has no infeasible cycle.
    #[error("solver failed to satisfy constraint {constraint} (slack {slack})")]
    SolverDiverged { constraint: usize, slack: f64 },

    #[error("invalid rectangle {index}: {reason}")]
    InvalidRectangle { index: usize, reason: String },

    #[error("invalid variable {index}: {reason}")]
    InvalidVariable { index: usize, reason: String },

    #[error("invalid constraint {index}: {reason}")]
    InvalidConstraint { index: usize, reason: String },

    #[error("invalid cluster hierarchy: {reason}")]
    InvalidCluster { reason: String },

    #[error("invalid edge {id}: {reason}")]
    InvalidEdge { id: usize, reason: String },

    #[error("no obstacle-free route for edge {id}")]
    NoRoute { id: usize },

    /// The edge path revisits a point and must be routed from scratch.
    #[error("edge {id} has a degenerate (cyclic) path")]
    DegeneratePath { id: usize },
}

pub type Result<T> = std::result::Result<T, LayoutError>;
