//! Variable placement with separation constraints.
//!
//! Minimises `sum(weight * (position - desired)^2)` subject to
//! `right.scale * right - left.scale * left >= gap` for every constraint,
//! by merging variables into rigid blocks along active constraints and
//! splitting blocks whose Lagrange multipliers turn negative.

mod block;
mod cycle;
mod solver;
mod variable;

pub use solver::{Solver, solve, solve_with};
pub use variable::{Constraint, Variable};
