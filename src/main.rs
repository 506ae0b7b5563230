//! introtrace: phylogeographic introduction inference on mutation-annotated trees
//!
//! Given a tree and an assignment of sampled genomes to geographic regions,
//! infers per-region confidence for every internal node, locates the
//! ancestral branch on which each regional sample's lineage entered its
//! region, and attributes putative origin regions to each introduction.
//! Optionally computes trait-phylogeny association statistics (association
//! index and monophyletic clade size) per region and per introduction.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

mod assign;
mod association;
mod clades;
mod introduce;
mod output;
mod regions;
mod tree;

use crate::association::AiFormula;
use crate::introduce::Options;
use crate::tree::Tree;

/// Infer introductions of sampled lineages into geographic regions
#[derive(Parser, Debug)]
#[command(name = "introtrace")]
#[command(version)]
#[command(about = "Trace pathogen introductions between regions on a mutation-annotated tree")]
struct Args {
    /// Input mutation-annotated tree (JSON)
    #[arg(short, long)]
    input_mat: PathBuf,

    /// Two-column sample/region table; one column assigns everything to
    /// the region "default"
    #[arg(short = 's', long)]
    population_samples: PathBuf,

    /// Output TSV with one row per introduction
    #[arg(short, long)]
    output: PathBuf,

    /// Calculate trait association statistics for whole regions and
    /// individual introductions. WARNING: adds significantly to runtime
    #[arg(short, long)]
    additional_info: bool,

    /// Record, for each clade root, the support for that root being IN
    /// each region, as a TSV at the given path
    #[arg(short, long)]
    clade_regions: Option<PathBuf>,

    /// Threshold for counting an ancestor as IN a region
    #[arg(short = 'C', long, default_value_t = 0.5)]
    origin_confidence: f32,

    /// Use floating-point division in the association index formula
    /// instead of the established truncating behavior
    #[arg(long)]
    ai_float_division: bool,

    /// Number of threads for parallel processing
    #[arg(short, long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()?;

    info!("introtrace v{}", env!("CARGO_PKG_VERSION"));
    info!("Using {} threads", args.threads);

    let mut tree = Tree::from_path(&args.input_mat)?;
    if !tree.condensed_nodes.is_empty() {
        tree.uncondense_leaves()
            .with_context(|| format!("Failed to uncondense {}", args.input_mat.display()))?;
    }
    info!("Loaded tree with {} nodes ({} leaves)", tree.len(), tree.num_leaves());

    let region_samples = regions::read_sample_regions(&args.population_samples)?;
    if region_samples.is_empty() {
        anyhow::bail!(
            "No samples found in {}",
            args.population_samples.display()
        );
    }
    info!("Read {} regions from sample table", region_samples.len());

    let opts = Options {
        additional_info: args.additional_info,
        origin_confidence: args.origin_confidence,
        ai_formula: if args.ai_float_division {
            AiFormula::FloatDivision
        } else {
            AiFormula::Truncating
        },
    };

    let states = introduce::assign_regions(&tree, region_samples, &opts)?;

    if let Some(ref clade_path) = args.clade_regions {
        info!("Clade root region support requested; recording...");
        clades::write_clade_regions(&tree, &states, clade_path)?;
    }

    let index = introduce::build_region_index(&states, args.origin_confidence);
    info!("Regions processed; identifying introductions.");
    let records = introduce::find_introductions(&tree, &states, &index, &opts)?;

    output::write_introductions(&args.output, &records, states.len() > 1, args.additional_info)?;
    info!("Wrote {} introductions to {}", records.len(), args.output.display());

    Ok(())
}
