//! Up-front feasibility check for a constraint set.
//!
//! Each constraint `l + gap <= r` is an edge `l -> r` of weight `gap` in a
//! difference-constraint graph (equalities add the reverse edge with weight
//! `-gap`). The set is infeasible exactly when that graph has a cycle of
//! positive total weight, and such a cycle always lives inside one strongly
//! connected component.

use super::variable::Constraint;

/// Weight slack tolerated before a cycle counts as positive.
const CYCLE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: usize,
    to: usize,
    weight: f64,
}

fn edges(constraints: &[Constraint]) -> Vec<Edge> {
    let mut out = Vec::with_capacity(constraints.len());
    for c in constraints {
        out.push(Edge {
            from: c.left,
            to: c.right,
            weight: c.gap,
        });
        if c.equality {
            out.push(Edge {
                from: c.right,
                to: c.left,
                weight: -c.gap,
            });
        }
    }
    out
}

/// Iterative Tarjan; components come out in reverse topological order.
fn strongly_connected_components(n: usize, adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNSEEN: usize = usize::MAX;
    let mut index = vec![UNSEEN; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut next_index = 0usize;

    for root in 0..n {
        if index[root] != UNSEEN {
            continue;
        }
        // (node, next neighbour position)
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if let Some(&w) = adj[v].get(frame.1) {
                frame.1 += 1;
                if index[w] == UNSEEN {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }
            call.pop();
            if let Some(&(parent, _)) = call.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
            if lowlink[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }
        }
    }
    components
}

/// Look for a positive-weight cycle; returns its variables in edge order and
/// the summed gap around it.
pub(crate) fn find_positive_cycle(
    var_count: usize,
    constraints: &[Constraint],
) -> Option<(Vec<usize>, f64)> {
    let edges = edges(constraints);
    let mut adj = vec![Vec::new(); var_count];
    for edge in &edges {
        adj[edge.from].push(edge.to);
    }
    let components = strongly_connected_components(var_count, &adj);

    let mut component_of = vec![usize::MAX; var_count];
    for (cid, component) in components.iter().enumerate() {
        for &v in component {
            component_of[v] = cid;
        }
    }

    // Process components in variable order so the reported cycle is stable.
    let mut ordered: Vec<usize> = (0..components.len())
        .filter(|&cid| components[cid].len() > 1)
        .collect();
    ordered.sort_by_key(|&cid| components[cid][0]);

    for cid in ordered {
        let members = &components[cid];
        let local: Vec<Edge> = edges
            .iter()
            .copied()
            .filter(|e| component_of[e.from] == cid && component_of[e.to] == cid)
            .collect();
        if let Some(cycle) = longest_path_cycle(var_count, members, &local) {
            let total_gap = cycle_weight(&cycle, &local);
            return Some((cycle, total_gap));
        }
    }
    None
}

/// Bellman-Ford for longest paths inside one component; a relaxation that
/// still succeeds after `|members|` rounds sits on or behind a positive cycle.
fn longest_path_cycle(var_count: usize, members: &[usize], edges: &[Edge]) -> Option<Vec<usize>> {
    let mut dist = vec![0.0f64; var_count];
    let mut pred: Vec<Option<usize>> = vec![None; var_count];
    let mut last_updated = None;
    for _ in 0..members.len() {
        last_updated = None;
        for edge in edges {
            let candidate = dist[edge.from] + edge.weight;
            if candidate > dist[edge.to] + CYCLE_EPSILON {
                dist[edge.to] = candidate;
                pred[edge.to] = Some(edge.from);
                last_updated = Some(edge.to);
            }
        }
        if last_updated.is_none() {
            return None;
        }
    }
    let mut v = last_updated?;
    for _ in 0..members.len() {
        v = pred[v]?;
    }
    let start = v;
    let mut cycle = vec![start];
    let mut cursor = pred[start]?;
    while cursor != start {
        cycle.push(cursor);
        cursor = pred[cursor]?;
    }
    cycle.reverse();
    Some(cycle)
}

fn cycle_weight(cycle: &[usize], edges: &[Edge]) -> f64 {
    let mut total = 0.0;
    for (i, &from) in cycle.iter().enumerate() {
        let to = cycle[(i + 1) % cycle.len()];
        let best = edges
            .iter()
            .filter(|e| e.from == from && e.to == to)
            .map(|e| e.weight)
            .fold(f64::NEG_INFINITY, f64::max);
        total += best;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_feasible() {
        let cs = vec![Constraint::new(0, 1, 5.0), Constraint::new(1, 2, 5.0)];
        assert!(find_positive_cycle(3, &cs).is_none());
    }

    #[test]
    fn two_variable_cycle_is_reported() {
        let cs = vec![Constraint::new(0, 1, 1.0), Constraint::new(1, 0, 1.0)];
        let (cycle, total) = find_positive_cycle(2, &cs).expect("cycle");
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&0) && cycle.contains(&1));
        assert_eq!(total, 2.0);
    }

    #[test]
    fn zero_weight_cycle_is_feasible() {
        let cs = vec![Constraint::new(0, 1, 3.0), Constraint::new(1, 0, -3.0)];
        assert!(find_positive_cycle(2, &cs).is_none());
    }

    #[test]
    fn equality_conflicting_with_inequality() {
        let cs = vec![Constraint::equality(0, 1, 2.0), Constraint::new(0, 1, 4.0)];
        let (_, total) = find_positive_cycle(2, &cs).expect("cycle");
        assert_eq!(total, 2.0);
    }

    #[test]
    fn scc_components_are_found() {
        let adj = vec![vec![1], vec![0, 2], vec![], vec![3]];
        let comps = strongly_connected_components(4, &adj);
        assert!(comps.contains(&vec![0, 1]));
        assert!(comps.contains(&vec![2]));
        assert!(comps.contains(&vec![3]));
    }
}
