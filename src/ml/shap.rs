//! Exact tree-SHAP attribution (Lundberg & Lee 2017, algorithm 2 of the
//! 2018 tree paper). Runs in polynomial time per prediction by carrying a
//! path of unique features with their subset-permutation weights down the
//! tree. All attributions are in margin (log-odds) space; together with
//! the expected margin they sum to the instance margin.

use crate::ml::model::{GbdtModel, Tree};

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: i32,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

fn extend(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: i32) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    for i in (0..depth).rev() {
        path[i + 1].pweight +=
            one_fraction * path[i].pweight * (i + 1) as f64 / (depth + 1) as f64;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / (depth + 1) as f64;
    }
}

fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one = path[depth].pweight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one * (depth + 1) as f64 / ((i + 1) as f64 * one_fraction);
            next_one = tmp - path[i].pweight * zero_fraction * (depth - i) as f64 / (depth + 1) as f64;
        } else {
            path[i].pweight =
                path[i].pweight * (depth + 1) as f64 / (zero_fraction * (depth - i) as f64);
        }
    }
    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one = path[depth].pweight;
    let mut total = 0.0;

    if one_fraction != 0.0 {
        for i in (0..depth).rev() {
            let tmp = next_one * (depth + 1) as f64 / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one = path[i].pweight - tmp * zero_fraction * (depth - i) as f64 / (depth + 1) as f64;
        }
    } else {
        for i in (0..depth).rev() {
            total += path[i].pweight * (depth + 1) as f64 / (zero_fraction * (depth - i) as f64);
        }
    }
    total
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    x: &[f64],
    phi: &mut [f64],
    node: usize,
    mut path: Vec<PathElement>,
    parent_zero: f64,
    parent_one: f64,
    parent_feature: i32,
) {
    extend(&mut path, parent_zero, parent_one, parent_feature);

    if tree.left[node] < 0 {
        let depth = path.len() - 1;
        for i in 1..=depth {
            let weight = unwound_sum(&path, i);
            let element = path[i];
            phi[element.feature as usize] +=
                weight * (element.one_fraction - element.zero_fraction) * tree.value[node];
        }
        return;
    }

    let feature = tree.split_feature[node] as usize;
    let left = tree.left[node] as usize;
    let right = tree.right[node] as usize;
    let (hot, cold) = if x[feature] < tree.threshold[node] {
        (left, right)
    } else {
        (right, left)
    };
    let hot_zero = tree.cover[hot] / tree.cover[node];
    let cold_zero = tree.cover[cold] / tree.cover[node];

    // A feature already on the path is unwound first so its fractions
    // combine instead of double-counting.
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;
    if let Some(k) = path.iter().position(|e| e.feature == feature as i32) {
        incoming_zero = path[k].zero_fraction;
        incoming_one = path[k].one_fraction;
        unwind(&mut path, k);
    }

    recurse(
        tree,
        x,
        phi,
        hot,
        path.clone(),
        hot_zero * incoming_zero,
        incoming_one,
        feature as i32,
    );
    recurse(
        tree,
        x,
        phi,
        cold,
        path,
        cold_zero * incoming_zero,
        0.0,
        feature as i32,
    );
}

/// Per-feature SHAP values for one instance, summed over every tree in
/// the ensemble. `phi.len() == x.len()`; `sum(phi)` equals
/// `model.margin(x) - model.expected_margin()` up to float error.
pub fn shap_values(model: &GbdtModel, x: &[f64]) -> Vec<f64> {
    let mut phi = vec![0.0; x.len()];
    for tree in model.trees() {
        recurse(tree, x, &mut phi, 0, Vec::new(), 1.0, 1.0, -1);
    }
    phi
}
