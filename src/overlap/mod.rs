//! Rectangle overlap removal.
//!
//! One variable per rectangle centre per axis, separation constraints from a
//! sweep over the other axis, solved X then Y (then optionally X again).

mod scan;

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::geom::{Dim, Rectangle};
use crate::vpsc::{self, Constraint, Variable};

/// Options for a single [`remove_overlaps_with_options`] call.
#[derive(Debug, Clone, Default)]
pub struct RemoveOverlapsOptions {
    /// Indices of rectangles held in place.
    pub locked: BTreeSet<usize>,
    pub third_pass: bool,
    pub use_neighbour_lists: bool,
}

impl RemoveOverlapsOptions {
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self {
            locked: BTreeSet::new(),
            third_pass: config.overlap.third_pass,
            use_neighbour_lists: config.overlap.use_neighbour_lists,
        }
    }
}

pub(crate) fn validate_rectangles(rects: &[Rectangle]) -> Result<()> {
    for (idx, rect) in rects.iter().enumerate() {
        rect.validate(idx)?;
    }
    Ok(())
}

fn centre_variables(rects: &[Rectangle], dim: Dim) -> Vec<Variable> {
    rects
        .iter()
        .map(|rect| Variable::new(rect.centre_d(dim), 1.0))
        .collect()
}

/// Variables (rectangle centres along `dim`) and the separation constraints
/// keeping rectangles that overlap along the other axis apart along `dim`.
pub fn generate_constraints(
    rects: &[Rectangle],
    dim: Dim,
    use_neighbour_lists: bool,
) -> Result<(Vec<Variable>, Vec<Constraint>)> {
    validate_rectangles(rects)?;
    let cs = if use_neighbour_lists {
        scan::pruned_neighbour_constraints(rects, dim)
    } else {
        scan::neighbour_chain_constraints(rects, dim)
    };
    Ok((centre_variables(rects, dim), cs))
}

pub fn generate_x_constraints(
    rects: &[Rectangle],
    use_neighbour_lists: bool,
) -> Result<(Vec<Variable>, Vec<Constraint>)> {
    generate_constraints(rects, Dim::Horizontal, use_neighbour_lists)
}

pub fn generate_y_constraints(rects: &[Rectangle]) -> Result<(Vec<Variable>, Vec<Constraint>)> {
    generate_constraints(rects, Dim::Vertical, false)
}

/// Quadratic reference generator: a constraint for every pair overlapping
/// along the other axis.
pub fn generate_pairwise_constraints(
    rects: &[Rectangle],
    dim: Dim,
) -> Result<(Vec<Variable>, Vec<Constraint>)> {
    validate_rectangles(rects)?;
    Ok((centre_variables(rects, dim), scan::pairwise_constraints(rects, dim)))
}

pub fn has_overlaps(rects: &[Rectangle], tolerance: f64) -> bool {
    first_overlap(rects, tolerance).is_some()
}

pub(crate) fn first_overlap(rects: &[Rectangle], tolerance: f64) -> Option<(usize, usize)> {
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].overlaps(&rects[j], tolerance) {
                return Some((i, j));
            }
        }
    }
    None
}

fn solve_axis(
    rects: &mut [Rectangle],
    dim: Dim,
    use_neighbour_lists: bool,
    locked: &BTreeSet<usize>,
    config: &LayoutConfig,
) -> Result<()> {
    let (mut vars, cs) = generate_constraints(rects, dim, use_neighbour_lists)?;
    for &idx in locked {
        vars[idx].weight = config.overlap.locked_weight;
    }
    let positions = vpsc::solve_with(&vars, &cs, &config.solver)?;
    for (rect, pos) in rects.iter_mut().zip(positions) {
        rect.move_centre_d(dim, pos);
    }
    debug!(?dim, constraints = cs.len(), "overlap axis pass");
    Ok(())
}

pub fn remove_overlaps(rects: &mut [Rectangle]) -> Result<()> {
    remove_overlaps_with(rects, &BTreeSet::new(), true)
}

pub fn remove_overlaps_locked(rects: &mut [Rectangle], locked: &BTreeSet<usize>) -> Result<()> {
    remove_overlaps_with(rects, locked, true)
}

pub fn remove_overlaps_with(
    rects: &mut [Rectangle],
    locked: &BTreeSet<usize>,
    third_pass: bool,
) -> Result<()> {
    let options = RemoveOverlapsOptions {
        locked: locked.clone(),
        third_pass,
        use_neighbour_lists: false,
    };
    remove_overlaps_with_options(rects, &options, &LayoutConfig::default())
}

/// X pass, Y pass, optional third X pass from the original X positions,
/// then extra full passes while any pair still overlaps.
pub fn remove_overlaps_with_options(
    rects: &mut [Rectangle],
    options: &RemoveOverlapsOptions,
    config: &LayoutConfig,
) -> Result<()> {
    validate_rectangles(rects)?;
    if let Some(&bad) = options.locked.iter().find(|&&idx| idx >= rects.len()) {
        return Err(LayoutError::InvalidRectangle {
            index: bad,
            reason: format!("locked index out of range for {} rectangles", rects.len()),
        });
    }
    if rects.len() < 2 {
        return Ok(());
    }
    let original_x: Vec<f64> = rects.iter().map(|r| r.centre_x()).collect();

    solve_axis(rects, Dim::Horizontal, options.use_neighbour_lists, &options.locked, config)?;
    solve_axis(rects, Dim::Vertical, false, &options.locked, config)?;
    if options.third_pass {
        for (rect, &x) in rects.iter_mut().zip(&original_x) {
            rect.move_centre_d(Dim::Horizontal, x);
        }
        solve_axis(rects, Dim::Horizontal, false, &options.locked, config)?;
    }

    clear_residual_overlap(rects, &options.locked, config)?;
    Ok(())
}

/// Full X and Y rounds while any pair still overlaps, at most
/// `config.overlap.max_rounds` of them. Returns the rounds run.
fn clear_residual_overlap(
    rects: &mut [Rectangle],
    locked: &BTreeSet<usize>,
    config: &LayoutConfig,
) -> Result<usize> {
    let tolerance = config.overlap.tolerance;
    let mut rounds = 0;
    while let Some((a, b)) = first_overlap(rects, tolerance) {
        if rounds >= config.overlap.max_rounds {
            warn!(a, b, rounds, "overlap remains after extra rounds");
            break;
        }
        debug!(a, b, round = rounds + 1, "residual overlap; running another round");
        solve_axis(rects, Dim::Horizontal, false, locked, config)?;
        solve_axis(rects, Dim::Vertical, false, locked, config)?;
        rounds += 1;
    }
    Ok(rounds)
}
