//! Clade root region support TSV
//!
//! One row per non-empty clade annotation encountered in DFS order, with the
//! annotated node's confidence for every region. Every column, including the
//! last, is followed by a TAB; region order is frozen in the header.

use crate::introduce::RegionState;
use crate::tree::Tree;
use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write the per-clade-root region support table.
pub fn write_clade_regions(tree: &Tree, states: &[RegionState], path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create clade regions file: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    render_clade_regions(tree, states, &mut out)
        .with_context(|| format!("Failed to write clade regions file: {}", path.display()))?;
    out.flush()
        .with_context(|| format!("Failed to write clade regions file: {}", path.display()))?;
    Ok(())
}

fn render_clade_regions<W: Write>(tree: &Tree, states: &[RegionState], out: &mut W) -> Result<()> {
    write!(out, "clade\t")?;
    for state in states {
        write!(out, "{}\t", state.name)?;
    }
    writeln!(out)?;

    for idx in tree.depth_first(None) {
        for annotation in &tree.node(idx).clade_annotations {
            if annotation.is_empty() {
                continue;
            }
            write!(out, "{}\t", annotation)?;
            for state in states {
                write!(out, "{}\t", state.assignments[idx])?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}
