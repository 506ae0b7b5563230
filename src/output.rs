//! Introduction report writing
//!
//! One TSV row per introduction, in discovery order. Multi-region runs gain
//! `region`, `origins` and `origins_confidence` columns; additional-info
//! runs append the two association metric columns. Numbers print through the
//! default formatter, no fixed precision.

use crate::introduce::{Introduction, Origins};
use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write the introduction table to `path`.
pub fn write_introductions(
    path: &Path,
    records: &[Introduction],
    multi_region: bool,
    additional_info: bool,
) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    render_introductions(records, multi_region, additional_info, &mut out)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    out.flush()
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    Ok(())
}

fn render_introductions<W: Write>(
    records: &[Introduction],
    multi_region: bool,
    additional_info: bool,
    out: &mut W,
) -> Result<()> {
    let mut header = String::from(
        "sample\tintroduction_node\tintro_confidence\tparent_confidence\tdistance",
    );
    if multi_region {
        header.push_str("\tregion\torigins\torigins_confidence");
    }
    header.push_str("\tclades\tmutation_path");
    if additional_info {
        header.push_str("\tmonophyl_size\tassoc_index");
    }
    writeln!(out, "{}", header)?;

    for r in records {
        write!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            r.sample, r.intro_node, r.intro_confidence, r.parent_confidence, r.distance
        )?;
        if multi_region {
            let (origins, confidences) = format_origins(r.origins.as_ref());
            write!(out, "\t{}\t{}\t{}", r.region, origins, confidences)?;
        }
        write!(out, "\t{}\t{}", r.clades, r.mutation_path)?;
        if additional_info {
            if let Some(m) = r.metrics {
                write!(out, "\t{}\t{}", m.monophyletic_size, m.association_index)?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Origins column pair; an empty attribution reads `indeterminate` / `0`
fn format_origins(origins: Option<&Origins>) -> (String, String) {
    match origins {
        Some(o) if !o.regions.is_empty() => {
            let names = o.regions.join(",");
            let mut confidences = String::new();
            for c in &o.confidences {
                confidences.push_str(&c.to_string());
                confidences.push(',');
            }
            (names, confidences)
        }
        _ => ("indeterminate".to_string(), "0".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introduce::{Introduction, IntroductionMetrics, Origins};

    fn record(sample: &str, origins: Option<Origins>) -> Introduction {
        Introduction {
            sample: sample.to_string(),
            intro_node: "node_5".to_string(),
            intro_confidence: 0.75,
            parent_confidence: 0.25,
            distance: 3,
            region: "italy".to_string(),
            origins,
            clades: "B.1,B.1.1".to_string(),
            mutation_path: "C1T,G2A<T3C<<".to_string(),
            metrics: None,
        }
    }

    #[test]
    fn test_single_region_layout() {
        let records = vec![record("s1", None)];
        let mut buf = Vec::new();
        render_introductions(&records, false, false, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "sample\tintroduction_node\tintro_confidence\tparent_confidence\tdistance\tclades\tmutation_path\n\
             s1\tnode_5\t0.75\t0.25\t3\tB.1,B.1.1\tC1T,G2A<T3C<<\n"
        );
    }

    #[test]
    fn test_multi_region_layout() {
        let origins = Origins {
            regions: vec!["france".to_string(), "spain".to_string()],
            confidences: vec![0.75, 0.625],
        };
        let records = vec![record("s1", Some(origins))];
        let mut buf = Vec::new();
        render_introductions(&records, true, false, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "sample\tintroduction_node\tintro_confidence\tparent_confidence\tdistance\tregion\torigins\torigins_confidence\tclades\tmutation_path\n\
             s1\tnode_5\t0.75\t0.25\t3\titaly\tfrance,spain\t0.75,0.625,\tB.1,B.1.1\tC1T,G2A<T3C<<\n"
        );
    }

    #[test]
    fn test_indeterminate_origins() {
        let records = vec![record(
            "s1",
            Some(Origins { regions: Vec::new(), confidences: Vec::new() }),
        )];
        let mut buf = Vec::new();
        render_introductions(&records, true, false, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\titaly\tindeterminate\t0\t"));
    }

    #[test]
    fn test_additional_info_columns() {
        let mut r = record("s1", None);
        r.metrics = Some(IntroductionMetrics {
            monophyletic_size: 4,
            association_index: 0.125,
        });
        let mut buf = Vec::new();
        render_introductions(&[r], false, true, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with(
            "sample\tintroduction_node\tintro_confidence\tparent_confidence\tdistance\tclades\tmutation_path\tmonophyl_size\tassoc_index\n"
        ));
        assert!(text.ends_with("\t4\t0.125\n"));
    }
}
