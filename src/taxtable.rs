//src/taxtable.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{AMatrixError, Result};
use crate::types::{Feature, FeatureTable, NUM_RANKS};

/// Parses a tab-separated taxonomy table in the format:
/// ```text
/// <feature_id>\t<kingdom>\t<phylum>\t<class>\t<order>\t<family>\t<genus>\t<species>
/// ```
/// The first line is a header and is only checked for width. Files ending
/// in `.gz` are decompressed on the fly.
pub fn parse_feature_table<P: AsRef<Path>>(path: P) -> Result<FeatureTable> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };

    let table = read_feature_table(reader)?;
    log::info!("Loaded {} features from {}", table.len(), path.display());
    Ok(table)
}

/// Same as [`parse_feature_table`] over any buffered reader.
pub fn read_feature_table<R: BufRead>(reader: R) -> Result<FeatureTable> {
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(AMatrixError::EmptyTable),
    };
    let header_width = header.trim_end_matches(&['\r', '\n'][..]).split('\t').count();
    if header_width < NUM_RANKS + 1 {
        return Err(AMatrixError::MissingRanks {
            line: 1,
            found: header_width.saturating_sub(1),
        });
    }
    if header_width > NUM_RANKS + 1 {
        log::warn!(
            "Taxonomy header has {} columns; only the first {} are used",
            header_width,
            NUM_RANKS + 1
        );
    }

    let mut features = Vec::new();
    for (i, line_result) in lines.enumerate() {
        let line = line_result?;
        let line_no = i + 2;
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < NUM_RANKS + 1 {
            return Err(AMatrixError::MissingRanks {
                line: line_no,
                found: parts.len() - 1,
            });
        }

        let ranks = parts[1..=NUM_RANKS].iter().map(|s| s.to_string()).collect();
        features.push(Feature::new(features.len(), parts[0], ranks)?);
    }

    FeatureTable::new(features)
}
