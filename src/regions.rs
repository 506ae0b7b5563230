//! Sample-to-region table parsing
//!
//! One record per line, whitespace-split. A single column names a sample in
//! the implicit region "default"; two columns are `sample region`. Anything
//! wider is a format error. CRLF input is tolerated (a trailing CR is
//! whitespace and drops out of the split).

use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Samples of interest for one region, in input order
#[derive(Debug, Clone)]
pub struct RegionSamples {
    /// Region name
    pub name: String,
    /// Sample identifiers, first-seen order preserved
    pub samples: Vec<String>,
}

/// Parse a sample→region table.
///
/// Regions come back in first-seen order; downstream iteration (and the
/// output row order) follows it.
pub fn read_sample_regions(path: &Path) -> Result<Vec<RegionSamples>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open sample file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut regions: Vec<RegionSamples> = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line
            .with_context(|| format!("Failed to read sample file: {}", path.display()))?;
        let fields: Vec<&str> = line.split_ascii_whitespace().collect();
        let (sample, region) = match fields.as_slice() {
            [] => continue,
            [sample] => (*sample, "default"),
            [sample, region] => (*sample, *region),
            _ => bail!(
                "Too many columns in {} line {} - check format",
                path.display(),
                lineno + 1
            ),
        };
        match regions.iter_mut().find(|r| r.name == region) {
            Some(r) => r.samples.push(sample.to_string()),
            None => regions.push(RegionSamples {
                name: region.to_string(),
                samples: vec![sample.to_string()],
            }),
        }
    }
    Ok(regions)
}
