//! Block arena for the separation-constraint solver.
//!
//! Every variable belongs to exactly one block. Inside a block the active
//! constraints form a spanning tree and fix each member's offset from the
//! block reference position, so the block moves rigidly to the weighted
//! average of its members' desired positions.

use super::variable::{Constraint, Variable};

pub(crate) type BlockId = usize;

/// Running sums from which the optimal block position is derived.
#[derive(Debug, Clone, Copy, Default)]
struct PositionStats {
    scale: f64,
    ab: f64,
    ad: f64,
    a2: f64,
}

impl PositionStats {
    fn add_variable(&mut self, var: &Variable, offset: f64) {
        let ai = self.scale / var.scale;
        let bi = offset / var.scale;
        let wi = var.weight;
        self.ab += wi * ai * bi;
        self.ad += wi * ai * var.desired_position;
        self.a2 += wi * ai * ai;
    }

    fn optimal_position(&self) -> f64 {
        (self.ad - self.ab) / self.a2
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Block {
    pub(crate) vars: Vec<usize>,
    pub(crate) posn: f64,
    stats: PositionStats,
    pub(crate) deleted: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct VarState {
    pub(crate) offset: f64,
    pub(crate) block: BlockId,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ConstraintState {
    pub(crate) lm: f64,
    pub(crate) active: bool,
    pub(crate) unsatisfiable: bool,
}

/// A step of a tree walk: the variable reached and the constraint crossed.
type Visit = (usize, Option<usize>);

#[derive(Debug, Clone)]
pub(crate) struct BlockSet {
    pub(crate) vars: Vec<Variable>,
    pub(crate) cs: Vec<Constraint>,
    pub(crate) var_state: Vec<VarState>,
    pub(crate) cs_state: Vec<ConstraintState>,
    in_cs: Vec<Vec<usize>>,
    out_cs: Vec<Vec<usize>>,
    blocks: Vec<Block>,
    visited: Vec<bool>,
    dfdv: Vec<f64>,
}

impl BlockSet {
    pub(crate) fn new(vars: Vec<Variable>, cs: Vec<Constraint>) -> Self {
        let n = vars.len();
        let mut in_cs = vec![Vec::new(); n];
        let mut out_cs = vec![Vec::new(); n];
        for (idx, c) in cs.iter().enumerate() {
            out_cs[c.left].push(idx);
            in_cs[c.right].push(idx);
        }
        let var_state = (0..n)
            .map(|idx| VarState {
                offset: 0.0,
                block: idx,
            })
            .collect();
        let cs_state = vec![ConstraintState::default(); cs.len()];
        let mut set = Self {
            vars,
            cs,
            var_state,
            cs_state,
            in_cs,
            out_cs,
            blocks: Vec::with_capacity(n),
            visited: vec![false; n],
            dfdv: vec![0.0; n],
        };
        for idx in 0..n {
            set.blocks.push(Block {
                vars: vec![idx],
                posn: 0.0,
                stats: PositionStats::default(),
                deleted: false,
            });
            set.recompute(idx);
        }
        set
    }

    pub(crate) fn clear_unsatisfiable(&mut self) {
        for state in &mut self.cs_state {
            state.unsatisfiable = false;
        }
    }

    pub(crate) fn live_blocks(&self) -> Vec<BlockId> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| !block.deleted)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub(crate) fn block_of(&self, var: usize) -> BlockId {
        self.var_state[var].block
    }

    pub(crate) fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Position multiplied by the variable's scale.
    pub(crate) fn scaled_position(&self, var: usize) -> f64 {
        let state = self.var_state[var];
        let block = &self.blocks[state.block];
        block.stats.scale * block.posn + state.offset
    }

    pub(crate) fn position(&self, var: usize) -> f64 {
        self.scaled_position(var) / self.vars[var].scale
    }

    pub(crate) fn slack(&self, c: usize) -> f64 {
        let con = &self.cs[c];
        con.slack_for(self.scaled_position(con.left), self.scaled_position(con.right))
    }

    pub(crate) fn cost(&self) -> f64 {
        self.vars
            .iter()
            .enumerate()
            .map(|(idx, var)| {
                let d = self.position(idx) - var.desired_position;
                var.weight * d * d
            })
            .sum()
    }

    /// Re-derive the block's statistics and optimal position from its members.
    pub(crate) fn recompute(&mut self, id: BlockId) {
        let block = &self.blocks[id];
        let Some(&first) = block.vars.first() else {
            return;
        };
        let mut stats = PositionStats {
            scale: self.vars[first].scale,
            ..PositionStats::default()
        };
        for &v in &block.vars {
            stats.add_variable(&self.vars[v], self.var_state[v].offset);
        }
        let block = &mut self.blocks[id];
        block.stats = stats;
        block.posn = stats.optimal_position();
    }

    pub(crate) fn recompute_all(&mut self) {
        for id in self.live_blocks() {
            self.recompute(id);
        }
    }

    /// Merge the blocks joined by constraint `c`, making `c` active.
    /// The smaller block is folded into the larger one.
    pub(crate) fn merge(&mut self, c: usize) -> BlockId {
        let con = &self.cs[c];
        let (left, right, gap) = (con.left, con.right, con.gap);
        let lb = self.var_state[left].block;
        let rb = self.var_state[right].block;
        debug_assert_ne!(lb, rb);
        let dist = self.var_state[right].offset - self.var_state[left].offset - gap;
        let (target, source, shift) = if self.blocks[lb].vars.len() < self.blocks[rb].vars.len() {
            (rb, lb, dist)
        } else {
            (lb, rb, -dist)
        };
        self.cs_state[c].active = true;

        let moved = std::mem::take(&mut self.blocks[source].vars);
        self.blocks[source].deleted = true;
        let mut stats = self.blocks[target].stats;
        for &v in &moved {
            let state = &mut self.var_state[v];
            state.block = target;
            state.offset += shift;
            stats.add_variable(&self.vars[v], state.offset);
        }
        let block = &mut self.blocks[target];
        block.vars.extend(moved);
        block.stats = stats;
        block.posn = stats.optimal_position();
        target
    }

    /// Split `block` at active constraint `c` into two new blocks.
    pub(crate) fn split(&mut self, block: BlockId, c: usize) -> (BlockId, BlockId) {
        self.cs_state[c].active = false;
        let (left, right) = (self.cs[c].left, self.cs[c].right);
        let lb = self.populate_split_block(left, block);
        let rb = self.populate_split_block(right, block);
        self.blocks[block].deleted = true;
        self.blocks[block].vars.clear();
        (lb, rb)
    }

    fn populate_split_block(&mut self, start: usize, old: BlockId) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block {
            vars: Vec::new(),
            posn: 0.0,
            stats: PositionStats::default(),
            deleted: false,
        });
        // Reassigning the block id doubles as the visited mark.
        self.var_state[start].block = id;
        let mut stack = vec![start];
        let mut members = Vec::new();
        while let Some(v) = stack.pop() {
            members.push(v);
            for &c in &self.out_cs[v] {
                let other = self.cs[c].right;
                if self.cs_state[c].active && self.var_state[other].block == old {
                    self.var_state[other].block = id;
                    stack.push(other);
                }
            }
            for &c in &self.in_cs[v] {
                let other = self.cs[c].left;
                if self.cs_state[c].active && self.var_state[other].block == old {
                    self.var_state[other].block = id;
                    stack.push(other);
                }
            }
        }
        self.blocks[id].vars = members;
        self.recompute(id);
        id
    }

    /// Walk the active-constraint tree of `block` from `root`, returning the
    /// visit order together with the constraint used to reach each variable.
    fn walk_tree(&mut self, root: usize, block: BlockId) -> Vec<Visit> {
        let mut order = Vec::new();
        let mut stack: Vec<Visit> = vec![(root, None)];
        self.visited[root] = true;
        while let Some((v, via)) = stack.pop() {
            order.push((v, via));
            for &c in &self.out_cs[v] {
                let other = self.cs[c].right;
                if self.cs_state[c].active
                    && self.var_state[other].block == block
                    && !self.visited[other]
                {
                    self.visited[other] = true;
                    stack.push((other, Some(c)));
                }
            }
            for &c in &self.in_cs[v] {
                let other = self.cs[c].left;
                if self.cs_state[c].active
                    && self.var_state[other].block == block
                    && !self.visited[other]
                {
                    self.visited[other] = true;
                    stack.push((other, Some(c)));
                }
            }
        }
        for &(v, _) in &order {
            self.visited[v] = false;
        }
        order
    }

    /// Compute Lagrange multipliers for the active constraints of `block`.
    /// A negative multiplier means the constraint is pulling its endpoints
    /// together rather than holding them apart.
    fn compute_lagrange_multipliers(&mut self, block: BlockId) -> Vec<Visit> {
        let Some(&root) = self.blocks[block].vars.first() else {
            return Vec::new();
        };
        let order = self.walk_tree(root, block);
        for &(v, _) in &order {
            let var = &self.vars[v];
            let gradient = 2.0 * var.weight * (self.position(v) - var.desired_position);
            self.dfdv[v] = gradient;
        }
        for &(v, via) in order.iter().rev() {
            let Some(c) = via else {
                continue;
            };
            let result = self.dfdv[v] / self.vars[v].scale;
            let (left, right) = (self.cs[c].left, self.cs[c].right);
            if right == v {
                self.cs_state[c].lm = result;
                self.dfdv[left] += result * self.vars[left].scale;
            } else {
                self.cs_state[c].lm = -result;
                self.dfdv[right] += result * self.vars[right].scale;
            }
        }
        order
    }

    /// Active non-equality constraint with the smallest multiplier.
    pub(crate) fn find_min_lm(&mut self, block: BlockId) -> Option<usize> {
        let order = self.compute_lagrange_multipliers(block);
        let mut best: Option<usize> = None;
        for c in order.into_iter().filter_map(|(_, via)| via) {
            if self.cs[c].equality {
                continue;
            }
            match best {
                Some(b) if self.cs_state[b].lm <= self.cs_state[c].lm => {}
                _ => best = Some(c),
            }
        }
        best
    }

    /// Whether `to` is reachable from `from` along active constraints
    /// traversed left-to-right.
    pub(crate) fn active_directed_path(&mut self, from: usize, to: usize) -> bool {
        let block = self.var_state[from].block;
        let mut stack = vec![from];
        let mut touched = vec![from];
        self.visited[from] = true;
        let mut found = false;
        while let Some(v) = stack.pop() {
            if v == to {
                found = true;
                break;
            }
            for &c in &self.out_cs[v] {
                let other = self.cs[c].right;
                if self.cs_state[c].active
                    && self.var_state[other].block == block
                    && !self.visited[other]
                {
                    self.visited[other] = true;
                    touched.push(other);
                    stack.push(other);
                }
            }
        }
        for v in touched {
            self.visited[v] = false;
        }
        found
    }

    /// Along the tree path from `lv` to `rv`, the forward (left-to-right)
    /// non-equality constraint with the smallest multiplier.
    pub(crate) fn find_min_lm_between(&mut self, lv: usize, rv: usize) -> Option<usize> {
        let block = self.var_state[lv].block;
        self.compute_lagrange_multipliers(block);
        let mut parent: Vec<Option<(usize, usize)>> = vec![None; self.vars.len()];
        let mut seen = vec![false; self.vars.len()];
        seen[lv] = true;
        let mut stack = vec![lv];
        while let Some(v) = stack.pop() {
            if v == rv {
                break;
            }
            for &c in &self.out_cs[v] {
                let other = self.cs[c].right;
                if self.cs_state[c].active && self.var_state[other].block == block && !seen[other] {
                    seen[other] = true;
                    parent[other] = Some((v, c));
                    stack.push(other);
                }
            }
            for &c in &self.in_cs[v] {
                let other = self.cs[c].left;
                if self.cs_state[c].active && self.var_state[other].block == block && !seen[other] {
                    seen[other] = true;
                    parent[other] = Some((v, c));
                    stack.push(other);
                }
            }
        }
        if !seen[rv] {
            return None;
        }
        let mut best: Option<usize> = None;
        let mut cursor = rv;
        while let Some((prev, c)) = parent[cursor] {
            let forward = self.cs[c].left == prev && self.cs[c].right == cursor;
            if forward && !self.cs[c].equality {
                match best {
                    Some(b) if self.cs_state[b].lm <= self.cs_state[c].lm => {}
                    _ => best = Some(c),
                }
            }
            cursor = prev;
        }
        best
    }

    /// Drop deleted blocks and renumber the survivors in arena order.
    pub(crate) fn compact(&mut self) {
        if self.blocks.iter().all(|block| !block.deleted) {
            return;
        }
        let mut remap = vec![usize::MAX; self.blocks.len()];
        let mut kept = Vec::with_capacity(self.blocks.len());
        for (idx, block) in std::mem::take(&mut self.blocks).into_iter().enumerate() {
            if block.deleted {
                continue;
            }
            remap[idx] = kept.len();
            kept.push(block);
        }
        for state in &mut self.var_state {
            state.block = remap[state.block];
        }
        self.blocks = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(desired: &[f64], cs: Vec<Constraint>) -> BlockSet {
        let vars = desired.iter().map(|&d| Variable::new(d, 1.0)).collect();
        BlockSet::new(vars, cs)
    }

    #[test]
    fn singleton_blocks_sit_at_desired_positions() {
        let blocks = set(&[3.0, -2.0], vec![Constraint::new(0, 1, 1.0)]);
        assert_eq!(blocks.position(0), 3.0);
        assert_eq!(blocks.position(1), -2.0);
        assert_eq!(blocks.slack(0), -6.0);
    }

    #[test]
    fn merge_makes_constraint_tight_and_averages() {
        let mut blocks = set(&[0.0, 0.0], vec![Constraint::new(0, 1, 10.0)]);
        let id = blocks.merge(0);
        assert_eq!(blocks.block(id).vars.len(), 2);
        assert!((blocks.position(0) + 5.0).abs() < 1e-12);
        assert!((blocks.position(1) - 5.0).abs() < 1e-12);
        assert!(blocks.slack(0).abs() < 1e-12);
    }

    #[test]
    fn negative_multiplier_identifies_split_candidate() {
        let mut blocks = set(&[0.0, 20.0], vec![Constraint::new(0, 1, 10.0)]);
        let id = blocks.merge(0);
        let c = blocks.find_min_lm(id).expect("one active constraint");
        assert!(blocks.cs_state[c].lm < 0.0);
        let (l, r) = blocks.split(id, c);
        assert_ne!(l, r);
        assert_eq!(blocks.position(0), 0.0);
        assert_eq!(blocks.position(1), 20.0);
        blocks.compact();
        assert_eq!(blocks.live_blocks().len(), 2);
    }

    #[test]
    fn directed_path_follows_constraint_direction() {
        let mut blocks = set(
            &[0.0, 0.0, 0.0],
            vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 2, 1.0)],
        );
        blocks.merge(0);
        blocks.merge(1);
        assert!(blocks.active_directed_path(0, 2));
        assert!(!blocks.active_directed_path(2, 0));
    }
}
