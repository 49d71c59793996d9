use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};

/// One scalar coordinate the solver may adjust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub desired_position: f64,
    /// Stiffness: cost of moving is `weight * (position - desired)^2`.
    pub weight: f64,
    pub scale: f64,
    /// Solved position; equals `desired_position` until a solve runs.
    pub final_position: f64,
}

impl Variable {
    pub fn new(desired_position: f64, weight: f64) -> Self {
        Self {
            desired_position,
            weight,
            scale: 1.0,
            final_position: desired_position,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub(crate) fn validate(&self, index: usize) -> Result<()> {
        let invalid = |reason: &str| LayoutError::InvalidVariable {
            index,
            reason: reason.to_string(),
        };
        if !self.desired_position.is_finite() {
            return Err(invalid("desired position is not finite"));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(invalid("weight must be positive and finite"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(invalid("scale must be positive and finite"));
        }
        Ok(())
    }
}

/// `right.position - left.position >= gap` (or `==` for equalities),
/// with both positions multiplied by their variable's scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub left: usize,
    pub right: usize,
    pub gap: f64,
    pub equality: bool,
}

impl Constraint {
    pub fn new(left: usize, right: usize, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            equality: false,
        }
    }

    pub fn equality(left: usize, right: usize, gap: f64) -> Self {
        Self {
            left,
            right,
            gap,
            equality: true,
        }
    }

    pub(crate) fn validate(&self, index: usize, var_count: usize) -> Result<()> {
        let invalid = |reason: String| LayoutError::InvalidConstraint { index, reason };
        if self.left >= var_count || self.right >= var_count {
            return Err(invalid(format!(
                "references variable {} but only {} exist",
                self.left.max(self.right),
                var_count
            )));
        }
        if self.left == self.right {
            return Err(invalid("left and right are the same variable".to_string()));
        }
        if !self.gap.is_finite() {
            return Err(invalid("gap is not finite".to_string()));
        }
        Ok(())
    }

    /// Slack for the given scaled positions; negative when violated.
    pub fn slack_for(&self, left_scaled: f64, right_scaled: f64) -> f64 {
        right_scaled - self.gap - left_scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_validation_rejects_bad_weights() {
        assert!(Variable::new(0.0, 0.0).validate(0).is_err());
        assert!(Variable::new(f64::INFINITY, 1.0).validate(0).is_err());
        assert!(Variable::new(0.0, 1.0).with_scale(-2.0).validate(0).is_err());
        assert!(Variable::new(3.0, 2.0).validate(0).is_ok());
    }

    #[test]
    fn constraint_validation_checks_indices() {
        assert!(Constraint::new(0, 3, 1.0).validate(0, 2).is_err());
        assert!(Constraint::new(1, 1, 1.0).validate(0, 2).is_err());
        assert!(Constraint::new(0, 1, f64::NAN).validate(0, 2).is_err());
        assert!(Constraint::new(0, 1, -2.0).validate(0, 2).is_ok());
    }
}
