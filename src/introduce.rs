//! Introduction detection across regional assignment maps
//!
//! Drives the per-region state assignment (parallel across regions), builds
//! the cross-region index of IN nodes, then walks root-ward from every
//! regional sample until the inferred regional state drops below the
//! confidence threshold. The last confidently-IN ancestor is the
//! introduction node: the branch on which the lineage entered the region.

use crate::assign::assign_states;
use crate::association::{
    ai_null_quantiles, association_index, monophyletic_cladesize, AiFormula,
};
use crate::regions::RegionSamples;
use crate::tree::{NodeIdx, Tree};
use anyhow::Result;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Knobs shared across the pipeline
#[derive(Debug, Clone)]
pub struct Options {
    /// Compute AI/MC globally per region and per introduction
    pub additional_info: bool,
    /// Threshold below which an ancestor counts as OUT of the region
    pub origin_confidence: f32,
    /// Division mode for the association index
    pub ai_formula: AiFormula,
}

/// One region's samples plus its finished confidence map
#[derive(Debug, Clone)]
pub struct RegionState {
    pub name: String,
    pub samples: Vec<String>,
    /// Confidence per node, indexed by `NodeIdx`
    pub assignments: Vec<f32>,
}

/// Node → regions in which it is confidently IN, with matching confidences.
///
/// The two lists are parallel and follow region insertion order.
#[derive(Debug, Default)]
pub struct RegionIndex {
    ins: HashMap<NodeIdx, (Vec<String>, Vec<f32>)>,
}

/// Putative source regions for one introduction
#[derive(Debug, Clone)]
pub struct Origins {
    /// Regions, other than the sample's own, where the introduction node is
    /// confidently IN; empty means indeterminate
    pub regions: Vec<String>,
    pub confidences: Vec<f32>,
}

/// Optional per-introduction association metrics
#[derive(Debug, Clone, Copy)]
pub struct IntroductionMetrics {
    pub monophyletic_size: usize,
    pub association_index: f32,
}

/// One output row of the engine
#[derive(Debug, Clone)]
pub struct Introduction {
    pub sample: String,
    pub intro_node: String,
    pub intro_confidence: f32,
    pub parent_confidence: f32,
    /// Mutations accumulated from the sample up to the introduction node
    pub distance: u64,
    pub region: String,
    /// None in single-region runs (the columns are omitted entirely)
    pub origins: Option<Origins>,
    /// Comma-joined clade annotations between introduction node and root
    pub clades: String,
    /// Reversed-direction mutation trace, `<`-separated per ancestor
    pub mutation_path: String,
    pub metrics: Option<IntroductionMetrics>,
}

/// Run the state assigner for every region, in parallel.
///
/// Regions come back in input order. With additional info enabled, each
/// worker also logs the region's global MC/AI and the AI null quantiles
/// from its own entropy-seeded generator.
pub fn assign_regions(
    tree: &Tree,
    regions: Vec<RegionSamples>,
    opts: &Options,
) -> Result<Vec<RegionState>> {
    regions
        .into_par_iter()
        .map(|region| {
            info!(
                "Processing region {} with {} total samples",
                region.name,
                region.samples.len()
            );
            let sample_set: HashSet<&str> = region.samples.iter().map(String::as_str).collect();
            let assignments = assign_states(tree, &sample_set)?;
            if opts.additional_info {
                let global_mc = monophyletic_cladesize(tree, &assignments, None);
                let global_ai = association_index(tree, &assignments, None, opts.ai_formula)?;
                info!(
                    "Region {} largest monophyletic clade: {}, regional association index: {}",
                    region.name, global_mc, global_ai
                );
                let mut rng = StdRng::from_entropy();
                let q = ai_null_quantiles(tree, &assignments, opts.ai_formula, &mut rng)?;
                info!(
                    "Real value {}. Quantiles of random expected AI for this sample size: {}, {}, {}, {}, {}",
                    global_ai, q[0], q[1], q[2], q[3], q[4]
                );
            }
            Ok(RegionState {
                name: region.name,
                samples: region.samples,
                assignments,
            })
        })
        .collect()
}

/// Index every node that is confidently IN at least one region.
pub fn build_region_index(states: &[RegionState], min_confidence: f32) -> RegionIndex {
    let mut index = RegionIndex::default();
    for state in states {
        for (idx, &confidence) in state.assignments.iter().enumerate() {
            if confidence > min_confidence {
                let entry = index.ins.entry(idx).or_default();
                entry.0.push(state.name.clone());
                entry.1.push(confidence);
            }
        }
    }
    index
}

impl RegionIndex {
    /// Regions (and confidences) in which `idx` is IN, skipping `own`
    fn origins_for(&self, idx: NodeIdx, own: &str) -> Origins {
        let mut origins = Origins { regions: Vec::new(), confidences: Vec::new() };
        if let Some((regions, confidences)) = self.ins.get(&idx) {
            for (region, &confidence) in regions.iter().zip(confidences) {
                if region != own {
                    origins.regions.push(region.clone());
                    origins.confidences.push(confidence);
                }
            }
        }
        origins
    }
}

/// Walk every regional sample to its introduction node.
///
/// Samples missing from the tree contribute no row. Rows come out in region
/// input order and, within a region, sample input order.
pub fn find_introductions(
    tree: &Tree,
    states: &[RegionState],
    index: &RegionIndex,
    opts: &Options,
) -> Result<Vec<Introduction>> {
    let multi_region = states.len() > 1;
    let mut records = Vec::new();
    for state in states {
        // Repeated introductions at one node share the subtree metrics
        let mut metric_memo: HashMap<NodeIdx, IntroductionMetrics> = HashMap::new();
        for sample in &state.samples {
            let Some(leaf) = tree.node_index(sample) else {
                continue;
            };
            let record = walk_to_introduction(
                tree,
                state,
                index,
                opts,
                multi_region,
                leaf,
                sample,
                &mut metric_memo,
            )?;
            if let Some(record) = record {
                records.push(record);
            }
        }
    }
    Ok(records)
}

#[allow(clippy::too_many_arguments)]
fn walk_to_introduction(
    tree: &Tree,
    state: &RegionState,
    index: &RegionIndex,
    opts: &Options,
    multi_region: bool,
    leaf: NodeIdx,
    sample: &str,
    metric_memo: &mut HashMap<NodeIdx, IntroductionMetrics>,
) -> Result<Option<Introduction>> {
    let mut last_encountered = leaf;
    let mut last_confidence = 1.0f32;
    let mut traversed = 0u64;
    for ancestor in tree.rsearch(leaf, true) {
        let anc_state = if tree.is_root(ancestor) {
            // The root always terminates the walk; it becomes the
            // introduction node itself, reported with its real confidence
            last_encountered = ancestor;
            last_confidence = state.assignments[ancestor];
            0.0
        } else {
            state.assignments[ancestor]
        };
        if anc_state < opts.origin_confidence {
            let origins = if multi_region {
                if tree.is_root(last_encountered) {
                    // No ancestry above the root to attribute a source to
                    Some(Origins { regions: Vec::new(), confidences: Vec::new() })
                } else {
                    Some(index.origins_for(last_encountered, &state.name))
                }
            } else {
                None
            };
            let (clades, mutation_path) = trace_to_root(tree, last_encountered);
            let metrics = if opts.additional_info {
                Some(introduction_metrics(
                    tree,
                    state,
                    opts,
                    last_encountered,
                    metric_memo,
                )?)
            } else {
                None
            };
            return Ok(Some(Introduction {
                sample: sample.to_string(),
                intro_node: tree.node(last_encountered).identifier.clone(),
                intro_confidence: last_confidence,
                parent_confidence: anc_state,
                distance: traversed,
                region: state.name.clone(),
                origins,
                clades,
                mutation_path,
                metrics,
            }));
        }
        last_encountered = ancestor;
        last_confidence = anc_state;
        traversed += tree.node(ancestor).mutations.len() as u64;
    }
    Ok(None)
}

/// Clade labels and the reversed mutation trace from `from` up to the root
fn trace_to_root(tree: &Tree, from: NodeIdx) -> (String, String) {
    let mut clades: Vec<&str> = Vec::new();
    let mut mutation_path = String::new();
    for ancestor in tree.rsearch(from, true) {
        let node = tree.node(ancestor);
        mutation_path.push_str(&node.mutations.join(","));
        mutation_path.push('<');
        for annotation in &node.clade_annotations {
            if !annotation.is_empty() {
                clades.push(annotation);
            }
        }
    }
    let clades = if clades.is_empty() { "none".to_string() } else { clades.join(",") };
    (clades, mutation_path)
}

fn introduction_metrics(
    tree: &Tree,
    state: &RegionState,
    opts: &Options,
    intro_node: NodeIdx,
    memo: &mut HashMap<NodeIdx, IntroductionMetrics>,
) -> Result<IntroductionMetrics> {
    if let Some(&metrics) = memo.get(&intro_node) {
        return Ok(metrics);
    }
    let metrics = IntroductionMetrics {
        monophyletic_size: monophyletic_cladesize(tree, &state.assignments, Some(intro_node)),
        association_index: association_index(
            tree,
            &state.assignments,
            Some(intro_node),
            opts.ai_formula,
        )?,
    };
    memo.insert(intro_node, metrics);
    Ok(metrics)
}
