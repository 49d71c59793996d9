use tracing::{debug, trace, warn};

use super::block::BlockSet;
use super::cycle::find_positive_cycle;
use super::variable::{Constraint, Variable};
use crate::config::SolverConfig;
use crate::error::{LayoutError, Result};

/// Relative slack tolerated when checking the final solution.
const VERIFY_TOLERANCE: f64 = 1e-6;

/// Incremental separation-constraint solver.
///
/// Owns its variables and constraints. Blocks survive between calls to
/// [`Solver::solve`], so moving desired positions with
/// [`Solver::set_desired_positions`] and solving again reuses the previous
/// merge structure.
#[derive(Debug, Clone)]
pub struct Solver {
    blocks: BlockSet,
    config: SolverConfig,
}

impl Solver {
    pub fn new(vars: Vec<Variable>, cs: Vec<Constraint>) -> Result<Self> {
        Self::with_config(vars, cs, &SolverConfig::default())
    }

    /// Validate input and reject infeasible constraint cycles before any
    /// block is built.
    pub fn with_config(vars: Vec<Variable>, cs: Vec<Constraint>, config: &SolverConfig) -> Result<Self> {
        for (idx, var) in vars.iter().enumerate() {
            var.validate(idx)?;
        }
        for (idx, c) in cs.iter().enumerate() {
            c.validate(idx, vars.len())?;
        }
        if let Some((cycle, total_gap)) = find_positive_cycle(vars.len(), &cs) {
            warn!(?cycle, total_gap, "infeasible constraint cycle");
            return Err(LayoutError::InfeasibleConstraints { cycle, total_gap });
        }
        Ok(Self {
            blocks: BlockSet::new(vars, cs),
            config: config.clone(),
        })
    }

    pub fn variables(&self) -> &[Variable] {
        &self.blocks.vars
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.blocks.cs
    }

    pub fn into_variables(self) -> Vec<Variable> {
        self.blocks.vars
    }

    /// Current position of every variable.
    pub fn positions(&self) -> Vec<f64> {
        (0..self.blocks.vars.len())
            .map(|v| self.blocks.position(v))
            .collect()
    }

    pub fn is_active(&self, constraint: usize) -> bool {
        self.blocks
            .cs_state
            .get(constraint)
            .is_some_and(|state| state.active)
    }

    pub fn cost(&self) -> f64 {
        self.blocks.cost()
    }

    pub fn set_desired_positions(&mut self, desired: &[f64]) -> Result<()> {
        if desired.len() != self.blocks.vars.len() {
            return Err(LayoutError::InvalidVariable {
                index: desired.len().min(self.blocks.vars.len()),
                reason: format!(
                    "expected {} desired positions, got {}",
                    self.blocks.vars.len(),
                    desired.len()
                ),
            });
        }
        for (idx, &d) in desired.iter().enumerate() {
            if !d.is_finite() {
                return Err(LayoutError::InvalidVariable {
                    index: idx,
                    reason: "desired position is not finite".to_string(),
                });
            }
        }
        for (var, &d) in self.blocks.vars.iter_mut().zip(desired) {
            var.desired_position = d;
        }
        self.blocks.recompute_all();
        Ok(())
    }

    /// Run satisfy/split rounds until no block splits and the cost stops
    /// improving, then write solved positions back into the variables.
    pub fn solve(&mut self) -> Result<()> {
        self.blocks.clear_unsatisfiable();
        let mut splits = self.satisfy_round()?;
        let mut last_cost = f64::MAX;
        let mut cost = self.blocks.cost();
        let mut iterations = 1usize;
        while (splits > 0 || (last_cost - cost).abs() > self.config.cost_tolerance)
            && iterations < self.config.max_iterations
        {
            splits = self.satisfy_round()?;
            last_cost = cost;
            cost = self.blocks.cost();
            iterations += 1;
        }
        self.blocks.compact();
        for v in 0..self.blocks.vars.len() {
            let position = self.blocks.position(v);
            self.blocks.vars[v].final_position = position;
        }
        debug!(
            variables = self.blocks.vars.len(),
            constraints = self.blocks.cs.len(),
            blocks = self.blocks.live_blocks().len(),
            iterations,
            cost,
            "vpsc solve finished"
        );
        Ok(())
    }

    /// Split every block at its most negative multiplier, then merge across
    /// violated constraints until none remain.
    pub fn satisfy(&mut self) -> Result<()> {
        self.blocks.clear_unsatisfiable();
        self.satisfy_round().map(|_| ())
    }

    fn satisfy_round(&mut self) -> Result<usize> {
        let splits = self.split_blocks();
        let merge_cap = self
            .config
            .max_iterations
            .saturating_mul(self.blocks.cs.len().max(1))
            .max(self.blocks.cs.len() * 4);
        let mut merges = 0usize;
        while let Some(c) = self.most_violated() {
            if merges >= merge_cap {
                warn!(merges, "vpsc satisfy hit merge cap");
                break;
            }
            merges += 1;
            let (left, right) = (self.blocks.cs[c].left, self.blocks.cs[c].right);
            let lb = self.blocks.block_of(left);
            let rb = self.blocks.block_of(right);
            if lb != rb {
                trace!(constraint = c, "merge");
                self.blocks.merge(c);
                continue;
            }
            if self.blocks.active_directed_path(right, left) {
                self.blocks.cs_state[c].unsatisfiable = true;
                continue;
            }
            match self.blocks.find_min_lm_between(left, right) {
                Some(split_at) => {
                    trace!(constraint = c, split_at, "split within block");
                    self.blocks.split(lb, split_at);
                    if self.blocks.slack(c) < 0.0 || self.blocks.cs[c].equality {
                        self.blocks.merge(c);
                    }
                }
                None => {
                    self.blocks.cs_state[c].unsatisfiable = true;
                }
            }
        }
        self.blocks.recompute_all();
        self.verify()?;
        Ok(splits)
    }

    fn split_blocks(&mut self) -> usize {
        let mut splits = 0;
        for id in self.blocks.live_blocks() {
            if self.blocks.block(id).vars.len() < 2 {
                continue;
            }
            let Some(c) = self.blocks.find_min_lm(id) else {
                continue;
            };
            if self.blocks.cs_state[c].lm < self.config.lagrangian_tolerance {
                trace!(constraint = c, lm = self.blocks.cs_state[c].lm, "split");
                self.blocks.split(id, c);
                splits += 1;
            }
        }
        self.blocks.compact();
        splits
    }

    /// Inactive equalities come first; otherwise the inactive constraint with
    /// the smallest slack, earliest index on ties.
    fn most_violated(&self) -> Option<usize> {
        let candidates = (0..self.blocks.cs.len()).filter(|&c| {
            let state = self.blocks.cs_state[c];
            !state.active && !state.unsatisfiable
        });
        let mut best: Option<(usize, f64)> = None;
        for c in candidates {
            let slack = self.blocks.slack(c);
            let con = &self.blocks.cs[c];
            if con.equality {
                let joined = self.blocks.block_of(con.left) == self.blocks.block_of(con.right);
                if !joined || slack.abs() > -self.config.zero_upper_bound {
                    return Some(c);
                }
                continue;
            }
            match best {
                Some((_, min)) if slack >= min => {}
                _ => best = Some((c, slack)),
            }
        }
        best.filter(|&(_, slack)| slack < self.config.zero_upper_bound)
            .map(|(c, _)| c)
    }

    fn verify(&self) -> Result<()> {
        for (idx, c) in self.blocks.cs.iter().enumerate() {
            let slack = self.blocks.slack(idx);
            let tolerance = VERIFY_TOLERANCE
                * (1.0
                    + c.gap.abs()
                    + self.blocks.scaled_position(c.left).abs()
                    + self.blocks.scaled_position(c.right).abs());
            let violated = slack < -tolerance || (c.equality && slack > tolerance);
            if violated {
                warn!(constraint = idx, slack, "vpsc left a constraint violated");
                return Err(LayoutError::SolverDiverged {
                    constraint: idx,
                    slack,
                });
            }
        }
        Ok(())
    }
}

/// Solve a one-shot problem and return the final positions.
pub fn solve(vars: &[Variable], cs: &[Constraint]) -> Result<Vec<f64>> {
    solve_with(vars, cs, &SolverConfig::default())
}

pub fn solve_with(vars: &[Variable], cs: &[Constraint], config: &SolverConfig) -> Result<Vec<f64>> {
    let mut solver = Solver::with_config(vars.to_vec(), cs.to_vec(), config)?;
    solver.solve()?;
    Ok(solver.positions())
}
