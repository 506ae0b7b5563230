//! Per-region internal node state assignment
//!
//! Labels every node with a confidence in [0,1] that it belonged to the
//! region of interest, from the membership of its descendant leaves:
//!
//! 1. A leaf is 1 if it is one of the region's samples, otherwise 0.
//! 2. All descendant leaves IN: 1. All OUT: 0.
//! 3. Mixed: `c = 1/(1 + (d_in/n_in)/(d_out/n_out))` where `d_in`/`d_out`
//!    are the mutation distances to the nearest IN/OUT descendant leaf
//!    (nearest = first of that kind in pre-order DFS) and `n_in`/`n_out`
//!    the descendant leaf counts. A zero `d_in` wins outright, then a zero
//!    `d_out`; the zero-zero tie goes to IN.
//!
//! A single bottom-up scan carries `(n_in, n_out, d_in, d_out)` per node, so
//! the whole map costs one pass over the tree.

use crate::tree::{NodeIdx, Tree};
use anyhow::{bail, Result};
use std::collections::HashSet;

/// Leaf membership summary for one subtree
#[derive(Debug, Clone, Copy, Default)]
struct SubtreeView {
    n_in: usize,
    n_out: usize,
    /// Distance to the first IN leaf in DFS order, including this node's
    /// own edge mutations; None when the subtree has no IN leaf
    d_in: Option<u64>,
    d_out: Option<u64>,
}

/// Compute the confidence map for one region.
///
/// Returns one entry per node, indexed by `NodeIdx`. Leaves are strictly
/// 0 or 1. A NaN confidence indicates broken input and is fatal.
pub fn assign_states(tree: &Tree, samples: &HashSet<&str>) -> Result<Vec<f32>> {
    let dfs = tree.depth_first(None);
    let mut views = vec![SubtreeView::default(); tree.len()];

    // Reverse pre-order puts every child before its parent
    for &idx in dfs.iter().rev() {
        let node = tree.node(idx);
        let own = node.mutations.len() as u64;
        let view = if node.children.is_empty() {
            if samples.contains(node.identifier.as_str()) {
                SubtreeView { n_in: 1, n_out: 0, d_in: Some(own), d_out: None }
            } else {
                SubtreeView { n_in: 0, n_out: 1, d_in: None, d_out: Some(own) }
            }
        } else {
            let mut merged = SubtreeView::default();
            for &child in &node.children {
                let cv = views[child];
                merged.n_in += cv.n_in;
                merged.n_out += cv.n_out;
                // First child in DFS order holding a leaf of the kind wins
                if merged.d_in.is_none() {
                    merged.d_in = cv.d_in;
                }
                if merged.d_out.is_none() {
                    merged.d_out = cv.d_out;
                }
            }
            merged.d_in = merged.d_in.map(|d| d + own);
            merged.d_out = merged.d_out.map(|d| d + own);
            merged
        };
        views[idx] = view;
    }

    let mut assignments = vec![0.0f32; tree.len()];
    for &idx in &dfs {
        let view = views[idx];
        assignments[idx] = if tree.is_leaf(idx) {
            if view.n_in > 0 { 1.0 } else { 0.0 }
        } else if view.n_out == 0 {
            1.0
        } else if view.n_in == 0 {
            0.0
        } else {
            mixed_confidence(tree, idx, view)?
        };
    }
    Ok(assignments)
}

fn mixed_confidence(tree: &Tree, idx: NodeIdx, view: SubtreeView) -> Result<f32> {
    let (Some(d_in), Some(d_out)) = (view.d_in, view.d_out) else {
        bail!(
            "Node {} is mixed but lacks a nearest-leaf distance",
            tree.node(idx).identifier
        );
    };
    // An identical IN sample pins the node IN; the zero-zero tie also goes IN
    if d_in == 0 {
        return Ok(1.0);
    }
    if d_out == 0 {
        return Ok(0.0);
    }
    let vir = d_in as f32 / view.n_in as f32;
    let vor = d_out as f32 / view.n_out as f32;
    let c = 1.0 / (1.0 + vir / vor);
    if c.is_nan() {
        bail!(
            "Invalid state assignment for node {}: d_in {}, d_out {}, n_in {}, n_out {}",
            tree.node(idx).identifier,
            d_in,
            d_out,
            view.n_in,
            view.n_out
        );
    }
    Ok(c)
}
