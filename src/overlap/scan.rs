//! Sweep-line constraint generation.
//!
//! Rectangles are swept along the conjugate axis. While a rectangle is open
//! it sits in a scanline ordered by its centre along the solve axis, and the
//! neighbours it meets there become the endpoints of its separation
//! constraints.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::geom::{Dim, Rectangle, conjugate};
use crate::vpsc::Constraint;

/// Overlap along the sweep axis at or below this, per side, is treated as
/// touching so solver round-off never yields a spurious constraint.
const SCAN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    // Closes sort first so rectangles that only touch never meet.
    Close,
    Open,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    pos: f64,
    kind: EventKind,
    rect: usize,
}

fn events(rects: &[Rectangle], sweep: Dim) -> Vec<Event> {
    let mut events = Vec::with_capacity(rects.len() * 2);
    for (idx, rect) in rects.iter().enumerate() {
        let (mut open, mut close) = (rect.min_d(sweep) + SCAN_EPSILON, rect.max_d(sweep) - SCAN_EPSILON);
        if open > close {
            open = rect.centre_d(sweep);
            close = open;
        }
        events.push(Event {
            pos: open,
            kind: EventKind::Open,
            rect: idx,
        });
        events.push(Event {
            pos: close,
            kind: EventKind::Close,
            rect: idx,
        });
    }
    events.sort_by(|a, b| {
        a.pos
            .total_cmp(&b.pos)
            .then(a.kind.cmp(&b.kind))
            .then(a.rect.cmp(&b.rect))
    });
    events
}

/// Scanline key: centre along the solve axis, index breaking ties.
#[derive(Debug, Clone, Copy)]
struct ScanKey {
    centre: f64,
    rect: usize,
}

impl PartialEq for ScanKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScanKey {}

impl PartialOrd for ScanKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScanKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.centre
            .total_cmp(&other.centre)
            .then(self.rect.cmp(&other.rect))
    }
}

fn separation(rects: &[Rectangle], dim: Dim, left: usize, right: usize) -> Constraint {
    let gap = (rects[left].length(dim) + rects[right].length(dim)) / 2.0;
    Constraint::new(left, right, gap)
}

/// Constraints between immediate scanline neighbours. Every pair that
/// overlaps along the sweep axis ends up ordered through a chain of these.
pub(crate) fn neighbour_chain_constraints(rects: &[Rectangle], dim: Dim) -> Vec<Constraint> {
    let mut scanline: BTreeSet<ScanKey> = BTreeSet::new();
    let mut first_left: Vec<Option<usize>> = vec![None; rects.len()];
    let mut first_right: Vec<Option<usize>> = vec![None; rects.len()];
    let mut out = Vec::new();

    for event in events(rects, conjugate(dim)) {
        let v = event.rect;
        let key = ScanKey {
            centre: rects[v].centre_d(dim),
            rect: v,
        };
        match event.kind {
            EventKind::Open => {
                scanline.insert(key);
                if let Some(u) = scanline.range(..key).next_back() {
                    first_left[v] = Some(u.rect);
                    first_right[u.rect] = Some(v);
                }
                if let Some(u) = scanline.range(key..).nth(1) {
                    first_right[v] = Some(u.rect);
                    first_left[u.rect] = Some(v);
                }
            }
            EventKind::Close => {
                let left = first_left[v];
                let right = first_right[v];
                if let Some(l) = left {
                    out.push(separation(rects, dim, l, v));
                    first_right[l] = right;
                }
                if let Some(r) = right {
                    out.push(separation(rects, dim, v, r));
                    first_left[r] = left;
                }
                scanline.remove(&key);
            }
        }
    }
    out
}

/// Walk outward from `key` collecting neighbours that are cheaper to
/// separate along `dim` than along the other axis; the walk ends with the
/// first rectangle that no longer overlaps along `dim`.
fn pruned_neighbours<'a, I>(rects: &[Rectangle], dim: Dim, v: usize, walk: I) -> BTreeSet<usize>
where
    I: Iterator<Item = &'a ScanKey>,
{
    let other = conjugate(dim);
    let mut found = BTreeSet::new();
    for u in walk {
        let along = rects[u.rect].overlap_d(dim, &rects[v]);
        if along <= 0.0 {
            found.insert(u.rect);
            break;
        }
        if along <= rects[u.rect].overlap_d(other, &rects[v]) {
            found.insert(u.rect);
        }
    }
    found
}

/// Sparse variant: only neighbours selected by [`pruned_neighbours`] get a
/// constraint along `dim`; the rest are left for the other axis.
pub(crate) fn pruned_neighbour_constraints(rects: &[Rectangle], dim: Dim) -> Vec<Constraint> {
    let mut scanline: BTreeSet<ScanKey> = BTreeSet::new();
    let mut left_of: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); rects.len()];
    let mut right_of: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); rects.len()];
    let mut out = Vec::new();

    for event in events(rects, conjugate(dim)) {
        let v = event.rect;
        let key = ScanKey {
            centre: rects[v].centre_d(dim),
            rect: v,
        };
        match event.kind {
            EventKind::Open => {
                scanline.insert(key);
                let lefts = pruned_neighbours(rects, dim, v, scanline.range(..key).rev());
                let rights = pruned_neighbours(rects, dim, v, scanline.range(key..).skip(1));
                for &u in &lefts {
                    right_of[u].insert(v);
                }
                for &u in &rights {
                    left_of[u].insert(v);
                }
                left_of[v].extend(lefts);
                right_of[v].extend(rights);
            }
            EventKind::Close => {
                for u in std::mem::take(&mut left_of[v]) {
                    out.push(separation(rects, dim, u, v));
                    right_of[u].remove(&v);
                }
                for u in std::mem::take(&mut right_of[v]) {
                    out.push(separation(rects, dim, v, u));
                    left_of[u].remove(&v);
                }
                scanline.remove(&key);
            }
        }
    }
    out
}

/// One constraint per pair overlapping along the conjugate axis.
pub(crate) fn pairwise_constraints(rects: &[Rectangle], dim: Dim) -> Vec<Constraint> {
    let other = conjugate(dim);
    let mut out = Vec::new();
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if rects[i].overlap_d(other, &rects[j]) <= 2.0 * SCAN_EPSILON {
                continue;
            }
            let ki = ScanKey {
                centre: rects[i].centre_d(dim),
                rect: i,
            };
            let kj = ScanKey {
                centre: rects[j].centre_d(dim),
                rect: j,
            };
            if ki < kj {
                out.push(separation(rects, dim, i, j));
            } else {
                out.push(separation(rects, dim, j, i));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(cs: &[Constraint]) -> Vec<(usize, usize)> {
        let mut out: Vec<_> = cs.iter().map(|c| (c.left, c.right)).collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn touching_rectangles_get_no_constraint() {
        let rects = vec![Rectangle::new(0.0, 0.0, 10.0, 10.0), Rectangle::new(0.0, 10.0, 10.0, 10.0)];
        assert!(neighbour_chain_constraints(&rects, Dim::Horizontal).is_empty());
        assert!(pairwise_constraints(&rects, Dim::Horizontal).is_empty());
    }

    #[test]
    fn round_off_overlap_counts_as_touching() {
        let rects = vec![
            Rectangle::new(0.0, 0.0, 10.0, 10.0),
            Rectangle::new(2.0, 10.0 - 1e-12, 10.0, 10.0),
        ];
        assert!(neighbour_chain_constraints(&rects, Dim::Horizontal).is_empty());
        assert!(pairwise_constraints(&rects, Dim::Horizontal).is_empty());
    }

    #[test]
    fn chain_links_only_adjacent_rectangles() {
        let rects = vec![
            Rectangle::new(0.0, 0.0, 4.0, 4.0),
            Rectangle::new(2.0, 0.0, 4.0, 4.0),
            Rectangle::new(4.0, 0.0, 4.0, 4.0),
        ];
        let cs = neighbour_chain_constraints(&rects, Dim::Horizontal);
        assert_eq!(pairs(&cs), vec![(0, 1), (1, 2)]);
        assert!(cs.iter().all(|c| c.gap == 4.0));
        assert_eq!(pairs(&pairwise_constraints(&rects, Dim::Horizontal)), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn identical_centres_order_by_index() {
        let rects = vec![Rectangle::new(0.0, 0.0, 10.0, 10.0), Rectangle::new(0.0, 0.0, 10.0, 10.0)];
        let cs = neighbour_chain_constraints(&rects, Dim::Horizontal);
        assert_eq!(pairs(&cs), vec![(0, 1)]);
    }

    #[test]
    fn pruned_scan_skips_pairs_cheaper_to_split_vertically() {
        // Wide overlap in x, shallow overlap in y: leave it for the y pass.
        let rects = vec![Rectangle::new(0.0, 0.0, 10.0, 10.0), Rectangle::new(1.0, 9.0, 10.0, 10.0)];
        assert!(pruned_neighbour_constraints(&rects, Dim::Horizontal).is_empty());
        // Shallow x overlap, deep y overlap: separate horizontally.
        let rects = vec![Rectangle::new(0.0, 0.0, 10.0, 10.0), Rectangle::new(9.0, 1.0, 10.0, 10.0)];
        assert_eq!(pairs(&pruned_neighbour_constraints(&rects, Dim::Horizontal)), vec![(0, 1)]);
    }

    #[test]
    fn pruned_walk_stops_past_first_disjoint_neighbour() {
        let rects = vec![
            Rectangle::new(0.0, 0.0, 4.0, 10.0),
            Rectangle::new(6.0, 0.0, 4.0, 10.0),
            Rectangle::new(20.0, 0.0, 4.0, 10.0),
            Rectangle::new(22.0, 0.0, 4.0, 10.0),
        ];
        let found = pairs(&pruned_neighbour_constraints(&rects, Dim::Horizontal));
        assert_eq!(found, vec![(0, 1), (1, 2), (1, 3), (2, 3)]);
    }
}
