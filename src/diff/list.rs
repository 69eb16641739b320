//! Element alignment strategies for ordered containers.

use super::change::ElementChange;
use crate::graph::node::PropertyValue;

/// Positional comparison: index `i` of the old sequence is matched with
/// index `i` of the new one. Surplus old elements are removed one by one at
/// the first index past the common prefix.
pub fn simple<F>(left: &[PropertyValue], right: &[PropertyValue], eq: F) -> Vec<ElementChange>
where
    F: Fn(&PropertyValue, &PropertyValue) -> bool,
{
    let common = left.len().min(right.len());
    let mut changes = Vec::new();

    for i in 0..common {
        if !eq(&left[i], &right[i]) {
            changes.push(ElementChange::ElementValueChange {
                index: i,
                left: left[i].clone(),
                right: right[i].clone(),
            });
        }
    }
    for (i, value) in right.iter().enumerate().skip(common) {
        changes.push(ElementChange::ValueAdded {
            index: i,
            value: value.clone(),
        });
    }
    for value in &left[common..] {
        changes.push(ElementChange::ValueRemoved {
            index: common,
            value: value.clone(),
        });
    }
    changes
}

enum Step {
    Keep,
    Substitute(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// Minimum edit distance alignment with unit costs for insert, delete and
/// substitute. Runs in `O(n * m)` time and memory.
///
/// Among optimal alignments a match is preferred over a substitution, and a
/// substitution over an insert or delete; the result for `(right, left)` is
/// the exact inverse of the result for `(left, right)`.
pub fn levenshtein<F>(
    left: &[PropertyValue],
    right: &[PropertyValue],
    eq: F,
) -> Vec<ElementChange>
where
    F: Fn(&PropertyValue, &PropertyValue) -> bool,
{
    let (n, m) = (left.len(), right.len());
    let width = m + 1;
    let mut dist = vec![0usize; (n + 1) * width];
    for i in 0..=n {
        dist[i * width] = i;
    }
    for j in 0..=m {
        dist[j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(!eq(&left[i - 1], &right[j - 1]));
            let sub = dist[(i - 1) * width + j - 1] + cost;
            let del = dist[(i - 1) * width + j] + 1;
            let ins = dist[i * width + j - 1] + 1;
            dist[i * width + j] = sub.min(del).min(ins);
        }
    }

    let mut steps = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        let here = dist[i * width + j];
        if i > 0 && j > 0 {
            let diag = dist[(i - 1) * width + j - 1];
            if here == diag && eq(&left[i - 1], &right[j - 1]) {
                steps.push(Step::Keep);
                i -= 1;
                j -= 1;
                continue;
            }
            if here == diag + 1 {
                steps.push(Step::Substitute(i - 1, j - 1));
                i -= 1;
                j -= 1;
                continue;
            }
        }
        let can_delete = i > 0 && here == dist[(i - 1) * width + j] + 1;
        let can_insert = j > 0 && here == dist[i * width + j - 1] + 1;
        // Ties go to the smaller element so that swapping the inputs
        // mirrors the alignment.
        let delete = can_delete && (!can_insert || left[i - 1] < right[j - 1]);
        if delete {
            steps.push(Step::Delete(i - 1));
            i -= 1;
        } else {
            steps.push(Step::Insert(j - 1));
            j -= 1;
        }
    }

    let mut changes = Vec::new();
    let mut pos = 0;
    for step in steps.into_iter().rev() {
        match step {
            Step::Keep => pos += 1,
            Step::Substitute(l, r) => {
                changes.push(ElementChange::ElementValueChange {
                    index: pos,
                    left: left[l].clone(),
                    right: right[r].clone(),
                });
                pos += 1;
            }
            Step::Delete(l) => changes.push(ElementChange::ValueRemoved {
                index: pos,
                value: left[l].clone(),
            }),
            Step::Insert(r) => {
                changes.push(ElementChange::ValueAdded {
                    index: pos,
                    value: right[r].clone(),
                });
                pos += 1;
            }
        }
    }
    changes
}

/// Applies element edits in order.
pub fn apply(items: &[PropertyValue], changes: &[ElementChange]) -> Vec<PropertyValue> {
    let mut out = items.to_vec();
    for change in changes {
        change.apply(&mut out);
    }
    out
}

