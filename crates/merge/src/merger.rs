//! The merge algorithm.
//!
//! Intervals are visited in [`combine_and_sort`] order. Each key has at most
//! one open parent; a candidate either folds into it (see
//! [`MergePolicy::should_merge`]) or replaces it as the open parent. Every
//! parent the scan produced is returned, in creation order, because a parent
//! closed early may still have grown.

use std::cmp::Ordering;
use std::collections::HashMap;

use vigil_core::AnomalyInterval;

use crate::key::AnomalyKey;
use crate::policy::MergePolicy;

pub const PROP_DETECTOR_COMPONENT_NAME: &str = "detectorComponentName";
const COMPONENT_DELIMITER: &str = ",";

/// Start ascending, then end descending, then persisted before fresh, then
/// more children first.
fn merge_order(a: &AnomalyInterval, b: &AnomalyInterval) -> Ordering {
    a.start_time
        .cmp(&b.start_time)
        .then_with(|| b.end_time.cmp(&a.end_time))
        .then_with(|| b.id.is_some().cmp(&a.id.is_some()))
        .then_with(|| b.children.len().cmp(&a.children.len()))
}

/// Fresh and stored intervals in merge order. The sort is stable, so equal
/// intervals keep fresh-then-stored input order.
pub fn combine_and_sort(
    fresh: Vec<AnomalyInterval>,
    existing: Vec<AnomalyInterval>,
) -> Vec<AnomalyInterval> {
    let mut all = fresh;
    all.extend(existing);
    all.sort_by(merge_order);
    all
}

/// Fold a sorted list into parents. Intervals flagged `is_child` are skipped;
/// they are only reached through their parent.
pub fn merge(sorted: Vec<AnomalyInterval>, policy: &MergePolicy) -> Vec<AnomalyInterval> {
    let mut parents: Vec<AnomalyInterval> = Vec::new();
    let mut open: HashMap<AnomalyKey, usize> = HashMap::new();

    for candidate in sorted {
        if candidate.is_child {
            continue;
        }
        let key = AnomalyKey::of(&candidate);
        match open.get(&key).copied() {
            Some(idx) if policy.should_merge(&parents[idx], &candidate) => {
                merge_into_parent(&mut parents[idx], candidate);
            }
            _ => {
                open.insert(key, parents.len());
                parents.push(candidate);
            }
        }
    }

    parents
}

fn merge_into_parent(parent: &mut AnomalyInterval, mut candidate: AnomalyInterval) {
    if parent.children.is_empty() {
        let mut first = parent.snapshot();
        first.is_child = true;
        parent.children.push(first);
    }

    parent.end_time = parent.end_time.max(candidate.end_time);
    merge_properties(parent, &candidate);
    for label in &candidate.labels {
        if !parent.labels.contains(label) {
            parent.labels.push(label.clone());
        }
    }
    parent.severity = parent.severity.most_severe(candidate.severity);

    if candidate.children.is_empty() {
        candidate.is_child = true;
        adopt_child(parent, candidate);
    } else {
        // The candidate's own record is replaced by `parent`.
        let absorbed = candidate.id.into_iter().chain(candidate.absorbed_ids.drain(..));
        for id in absorbed {
            if parent.id != Some(id) && !parent.absorbed_ids.contains(&id) {
                parent.absorbed_ids.push(id);
            }
        }
        for mut child in candidate.children {
            child.is_child = true;
            adopt_child(parent, child);
        }
    }
}

/// Children form a set: a stored child already present is not added twice.
fn adopt_child(parent: &mut AnomalyInterval, child: AnomalyInterval) {
    let known = child
        .id
        .is_some_and(|id| parent.children.iter().any(|c| c.id == Some(id)));
    if !known {
        parent.children.push(child);
    }
}

/// Additive: existing parent keys win, except component names which combine.
fn merge_properties(parent: &mut AnomalyInterval, child: &AnomalyInterval) {
    for (key, value) in &child.properties {
        match parent.properties.get_mut(key) {
            None => {
                parent.properties.insert(key.clone(), value.clone());
            }
            Some(existing) if key == PROP_DETECTOR_COMPONENT_NAME => {
                *existing = combine_components(existing, value);
            }
            Some(_) => {}
        }
    }
}

fn combine_components(a: &str, b: &str) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for part in a.split(COMPONENT_DELIMITER).chain(b.split(COMPONENT_DELIMITER)) {
        if !seen.contains(&part) {
            seen.push(part);
        }
    }
    seen.join(COMPONENT_DELIMITER)
}
