//! Trait-phylogeny association statistics
//!
//! Association Index (Wang et al. 2005): small for strong trait-phylogeny
//! correlation, computed over all internal nodes of a subtree. Monophyletic
//! clade size (Salemi et al. 2005): the largest clade consisting entirely of
//! IN samples, bounded 1..=N.
//!
//! AI runs over a reverse breadth-first expansion so every child is counted
//! before its parent; each internal node then only consults its direct
//! children plus a per-call cache of `(in, out)` pairs.

use crate::tree::{NodeIdx, Tree};
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;

/// Rounds drawn for the AI null distribution
pub const PERMUTATION_ROUNDS: usize = 100;

/// How the per-node `max(in,out)/(in+out)` term is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiFormula {
    /// Integer division: the term truncates to 0 for any mixed node and 1
    /// for a pure one. Matches the established tool output.
    Truncating,
    /// Floating-point division, the literal published definition.
    FloatDivision,
}

/// Association index of the subtree at `subroot` (full tree when None).
pub fn association_index(
    tree: &Tree,
    assignments: &[f32],
    subroot: Option<NodeIdx>,
    formula: AiFormula,
) -> Result<f32> {
    ai_traverse(tree, assignments, subroot, formula, None)
}

/// Association index with leaf states replaced by Bernoulli draws at the
/// subtree's observed IN frequency. Only used to build a null distribution;
/// node labels are never permuted.
pub fn permuted_association_index(
    tree: &Tree,
    assignments: &[f32],
    subroot: Option<NodeIdx>,
    formula: AiFormula,
    rng: &mut StdRng,
) -> Result<f32> {
    ai_traverse(tree, assignments, subroot, formula, Some(rng))
}

fn ai_traverse(
    tree: &Tree,
    assignments: &[f32],
    subroot: Option<NodeIdx>,
    formula: AiFormula,
    mut permute: Option<&mut StdRng>,
) -> Result<f32> {
    let mut bfs = tree.breadth_first(subroot);

    // Baseline IN frequency over the traversed subtree drives the draws
    let in_rate = if permute.is_some() {
        let mut leaf_count = 0usize;
        let mut sample_count = 0usize;
        for &idx in &bfs {
            if tree.is_leaf(idx) {
                leaf_count += 1;
                if assignments[idx] > 0.5 {
                    sample_count += 1;
                }
            }
        }
        sample_count as f32 / leaf_count as f32
    } else {
        0.0
    };

    bfs.reverse();
    let mut total_ai = 0.0f32;
    let mut tracker: HashMap<NodeIdx, (usize, usize)> = HashMap::new();
    for &idx in &bfs {
        if tree.is_leaf(idx) {
            continue;
        }
        let mut in_c = 0usize;
        let mut out_c = 0usize;
        for &child in &tree.node(idx).children {
            if tree.is_leaf(child) {
                let is_in = match permute.as_deref_mut() {
                    Some(rng) => rng.gen::<f32>() < in_rate,
                    None => assignments[child] > 0.5,
                };
                if is_in {
                    in_c += 1;
                } else {
                    out_c += 1;
                }
            } else {
                let Some(&(ci, co)) = tracker.get(&child) else {
                    bail!(
                        "Association index reached internal node {} before its subtree",
                        tree.node(child).identifier
                    );
                };
                in_c += ci;
                out_c += co;
            }
        }
        tracker.insert(idx, (in_c, out_c));
        let total = in_c + out_c;
        let dominant = match formula {
            AiFormula::Truncating => (in_c.max(out_c) / total) as f32,
            AiFormula::FloatDivision => in_c.max(out_c) as f32 / total as f32,
        };
        total_ai += (1.0 - dominant) / 2.0f32.powi(total as i32 - 1);
    }
    Ok(total_ai)
}

/// Largest contiguous run of IN leaves in depth-first leaf order.
///
/// Contiguity in DFS leaf order stands in for monophyly, matching the
/// published usage of the statistic.
pub fn monophyletic_cladesize(
    tree: &Tree,
    assignments: &[f32],
    subroot: Option<NodeIdx>,
) -> usize {
    let mut biggest = 0usize;
    let mut current = 0usize;
    for idx in tree.depth_first(subroot) {
        if !tree.is_leaf(idx) {
            continue;
        }
        if assignments[idx] > 0.5 {
            current += 1;
        } else {
            biggest = biggest.max(current);
            current = 0;
        }
    }
    biggest.max(current)
}

/// Sorted AI null quantiles (5th, 25th, 50th, 75th, 95th of 100 rounds).
pub fn ai_null_quantiles(
    tree: &Tree,
    assignments: &[f32],
    formula: AiFormula,
    rng: &mut StdRng,
) -> Result<[f32; 5]> {
    let mut draws = Vec::with_capacity(PERMUTATION_ROUNDS);
    for _ in 0..PERMUTATION_ROUNDS {
        draws.push(permuted_association_index(tree, assignments, None, formula, rng)?);
    }
    draws.sort_by(f32::total_cmp);
    Ok([draws[5], draws[25], draws[50], draws[75], draws[95]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use rand::SeedableRng;

    /// ((i1,o1)n1,(i2,i3)n2)root with one mutation per leaf edge
    fn four_leaf_tree() -> (Tree, Vec<f32>) {
        let tree = Tree::from_json(
            r#"{
                "nodes": [
                    {"id": "root"},
                    {"id": "n1", "parent": "root"},
                    {"id": "i1", "parent": "n1", "mutations": ["C1T"]},
                    {"id": "o1", "parent": "n1", "mutations": ["C2T"]},
                    {"id": "n2", "parent": "root"},
                    {"id": "i2", "parent": "n2", "mutations": ["C3T"]},
                    {"id": "i3", "parent": "n2", "mutations": ["C4T"]}
                ]
            }"#,
        )
        .unwrap();
        let mut assignments = vec![0.0f32; tree.len()];
        for id in ["i1", "i2", "i3"] {
            assignments[tree.node_index(id).unwrap()] = 1.0;
        }
        (tree, assignments)
    }

    #[test]
    fn test_ai_float_division() {
        let (tree, assignments) = four_leaf_tree();
        // n1: (1 - 1/2)/2^1 = 0.25; n2: (1 - 2/2)/2^1 = 0;
        // root: (1 - 3/4)/2^3 = 0.03125
        let ai =
            association_index(&tree, &assignments, None, AiFormula::FloatDivision).unwrap();
        assert!((ai - 0.28125).abs() < 1e-6);
    }

    #[test]
    fn test_ai_truncating_division() {
        let (tree, assignments) = four_leaf_tree();
        // The truncated term is 0 for mixed nodes and 1 for pure ones:
        // n1: 1/2; n2: 0; root: 1/8
        let ai = association_index(&tree, &assignments, None, AiFormula::Truncating).unwrap();
        assert!((ai - 0.625).abs() < 1e-6);
    }

    #[test]
    fn test_ai_subtree_only() {
        let (tree, assignments) = four_leaf_tree();
        let n2 = tree.node_index("n2").unwrap();
        let ai =
            association_index(&tree, &assignments, Some(n2), AiFormula::FloatDivision).unwrap();
        assert_eq!(ai, 0.0);
    }

    #[test]
    fn test_ai_leaf_subroot_is_zero() {
        let (tree, assignments) = four_leaf_tree();
        let i1 = tree.node_index("i1").unwrap();
        let ai =
            association_index(&tree, &assignments, Some(i1), AiFormula::FloatDivision).unwrap();
        assert_eq!(ai, 0.0);
    }

    #[test]
    fn test_permutation_is_seed_deterministic() {
        let (tree, assignments) = four_leaf_tree();
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = permuted_association_index(
            &tree,
            &assignments,
            None,
            AiFormula::FloatDivision,
            &mut rng_a,
        )
        .unwrap();
        let b = permuted_association_index(
            &tree,
            &assignments,
            None,
            AiFormula::FloatDivision,
            &mut rng_b,
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_null_quantiles_monotone() {
        let (tree, assignments) = four_leaf_tree();
        let mut rng = StdRng::seed_from_u64(11);
        let q =
            ai_null_quantiles(&tree, &assignments, AiFormula::FloatDivision, &mut rng).unwrap();
        for w in q.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn test_monophyletic_cladesize_run() {
        // Leaf DFS order i,i,o,i,i,i,o,i: the longest IN run is 3
        let tree = Tree::from_json(
            r#"{
                "nodes": [
                    {"id": "root"},
                    {"id": "l1", "parent": "root"},
                    {"id": "l2", "parent": "root"},
                    {"id": "l3", "parent": "root"},
                    {"id": "l4", "parent": "root"},
                    {"id": "l5", "parent": "root"},
                    {"id": "l6", "parent": "root"},
                    {"id": "l7", "parent": "root"},
                    {"id": "l8", "parent": "root"}
                ]
            }"#,
        )
        .unwrap();
        let mut assignments = vec![0.0f32; tree.len()];
        for id in ["l1", "l2", "l4", "l5", "l6", "l8"] {
            assignments[tree.node_index(id).unwrap()] = 1.0;
        }
        assert_eq!(monophyletic_cladesize(&tree, &assignments, None), 3);
    }

    #[test]
    fn test_monophyletic_cladesize_all_in() {
        let (tree, mut assignments) = four_leaf_tree();
        assignments[tree.node_index("o1").unwrap()] = 1.0;
        assert_eq!(monophyletic_cladesize(&tree, &assignments, None), 4);
    }

    #[test]
    fn test_monophyletic_boundary_is_strict() {
        // A leaf sitting exactly at 0.5 does not count as IN
        let (tree, mut assignments) = four_leaf_tree();
        assignments[tree.node_index("i2").unwrap()] = 0.5;
        assert_eq!(monophyletic_cladesize(&tree, &assignments, None), 1);
    }
}
