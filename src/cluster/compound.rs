use serde::{Deserialize, Serialize};

use crate::vpsc::{Constraint, Variable};

/// A group of constraints that may own solver variables of its own.
///
/// Variables for every compound are generated before any constraints, so a
/// compound may refer to variables created by another.
pub trait CompoundConstraint {
    fn generate_variables(&mut self, vars: &mut Vec<Variable>);
    fn generate_separation_constraints(&self, cs: &mut Vec<Constraint>);
    /// Read solved positions back into the compound's own state.
    fn update_position(&mut self, vars: &[Variable]);
}

pub fn generate_variables_and_constraints(
    compounds: &mut [&mut dyn CompoundConstraint],
    vars: &mut Vec<Variable>,
    cs: &mut Vec<Constraint>,
) {
    for compound in compounds.iter_mut() {
        compound.generate_variables(vars);
    }
    for compound in compounds.iter() {
        compound.generate_separation_constraints(cs);
    }
}

/// A child variable kept within `offset` of the boundary position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub var: usize,
    pub offset: f64,
}

/// Movable boundary along one axis, with children held between
/// `position - offset` (left list) and `position + offset` (right list).
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConstraint {
    pub position: f64,
    pub half_extent: f64,
    pub margin: f64,
    pub weight: f64,
    pub left_offsets: Vec<Offset>,
    pub right_offsets: Vec<Offset>,
    variable: Option<usize>,
}

impl BoundaryConstraint {
    pub fn new(position: f64, half_extent: f64, margin: f64, weight: f64) -> Self {
        Self {
            position,
            half_extent,
            margin,
            weight,
            left_offsets: Vec::new(),
            right_offsets: Vec::new(),
            variable: None,
        }
    }

    /// Contain a child whose centre is `var` and whose half size is
    /// `child_half`, leaving `margin` to the boundary on both sides.
    pub fn add_child(&mut self, var: usize, child_half: f64) {
        let offset = self.half_extent - child_half - self.margin;
        self.left_offsets.push(Offset { var, offset });
        self.right_offsets.push(Offset { var, offset });
    }

    /// Index of the boundary variable once generated.
    pub fn variable(&self) -> Option<usize> {
        self.variable
    }

    pub fn extent(&self) -> (f64, f64) {
        (self.position - self.half_extent, self.position + self.half_extent)
    }

    fn child_half(&self, offset: f64) -> f64 {
        self.half_extent - self.margin - offset
    }
}

impl CompoundConstraint for BoundaryConstraint {
    fn generate_variables(&mut self, vars: &mut Vec<Variable>) {
        self.variable = Some(vars.len());
        vars.push(Variable::new(self.position, self.weight));
    }

    fn generate_separation_constraints(&self, cs: &mut Vec<Constraint>) {
        let Some(boundary) = self.variable else {
            return;
        };
        for o in &self.left_offsets {
            cs.push(Constraint::new(boundary, o.var, -o.offset));
        }
        for o in &self.right_offsets {
            cs.push(Constraint::new(o.var, boundary, -o.offset));
        }
    }

    /// Recentre on the children's current extent and refit the offsets.
    fn update_position(&mut self, vars: &[Variable]) {
        let children: Vec<(f64, f64)> = self
            .left_offsets
            .iter()
            .chain(&self.right_offsets)
            .filter_map(|o| {
                vars.get(o.var)
                    .map(|v| (v.final_position, self.child_half(o.offset)))
            })
            .collect();
        if children.is_empty() {
            if let Some(v) = self.variable.and_then(|idx| vars.get(idx)) {
                self.position = v.final_position;
            }
            return;
        }
        let lo = children
            .iter()
            .map(|(pos, half)| pos - half)
            .fold(f64::INFINITY, f64::min);
        let hi = children
            .iter()
            .map(|(pos, half)| pos + half)
            .fold(f64::NEG_INFINITY, f64::max);
        let new_half = (hi - lo) / 2.0 + self.margin;
        for o in self.left_offsets.iter_mut().chain(self.right_offsets.iter_mut()) {
            let child_half = self.half_extent - self.margin - o.offset;
            o.offset = new_half - child_half - self.margin;
        }
        self.position = (lo + hi) / 2.0;
        self.half_extent = new_half;
    }
}

/// Plain `left + gap <= right` (or `==`) packaged as a compound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparationConstraint {
    pub left: usize,
    pub right: usize,
    pub gap: f64,
    pub equality: bool,
}

impl SeparationConstraint {
    pub fn new(left: usize, right: usize, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            equality: false,
        }
    }
}

impl CompoundConstraint for SeparationConstraint {
    fn generate_variables(&mut self, _vars: &mut Vec<Variable>) {}

    fn generate_separation_constraints(&self, cs: &mut Vec<Constraint>) {
        if self.equality {
            cs.push(Constraint::equality(self.left, self.right, self.gap));
        } else {
            cs.push(Constraint::new(self.left, self.right, self.gap));
        }
    }

    fn update_position(&mut self, _vars: &[Variable]) {}
}
