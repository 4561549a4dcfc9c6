//src/lineage.rs

use ahash::{AHashMap, AHashSet};

use crate::error::{AMatrixError, Result};
use crate::types::{AMatrixConfig, FeatureTable, Rank, NUM_RANKS, PLACEHOLDER_WIDTH};

/// Segments per lineage: seven ranks plus the feature identifier.
pub const LINEAGE_DEPTH: usize = NUM_RANKS + 1;

/// Whether `label` means "unassigned at `rank`".
///
/// A placeholder is any label no longer than the rank's own marker (`g__`
/// for genus), the bare marker and the empty string included.
pub fn is_placeholder(rank: Rank, label: &str) -> bool {
    label.trim().chars().count() <= rank.prefix().chars().count()
}

/// Whether joining `segment` with `delimiter` keeps the boundaries
/// recoverable: the segment must not contain the delimiter, nor start or
/// end with any of its characters.
pub fn splits_cleanly(segment: &str, delimiter: &str) -> bool {
    let touches = |c: Option<char>| c.is_some_and(|c| delimiter.contains(c));
    !segment.contains(delimiter)
        && !touches(segment.chars().next())
        && !touches(segment.chars().next_back())
}

/// The fully qualified root-to-leaf path of one feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lineage {
    /// Normalized labels, kingdom first, feature id last.
    pub segments: Vec<String>,
    /// Column of the feature in the source table.
    pub feature: usize,
    delimiter: String,
}

impl Lineage {
    pub fn new(feature: usize, segments: Vec<String>, delimiter: &str) -> Result<Self> {
        if segments.len() != LINEAGE_DEPTH {
            return Err(AMatrixError::InvalidLineage(format!(
                "expected {} segments, found {}",
                LINEAGE_DEPTH,
                segments.len()
            )));
        }
        if delimiter.is_empty() {
            return Err(AMatrixError::InvalidLineage("empty delimiter".to_string()));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(AMatrixError::InvalidLineage(format!(
                "empty segment in '{}'",
                segments.join(delimiter)
            )));
        }
        if let Some(bad) = segments.iter().find(|s| !splits_cleanly(s, delimiter)) {
            return Err(AMatrixError::InvalidLineage(format!(
                "segment '{}' is ambiguous next to the delimiter '{}'",
                bad, delimiter
            )));
        }
        Ok(Self {
            segments,
            feature,
            delimiter: delimiter.to_string(),
        })
    }

    /// Splits a delimited path back into its segments.
    pub fn parse(path: &str, delimiter: &str, feature: usize) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(AMatrixError::InvalidLineage("empty delimiter".to_string()));
        }
        // a trailing delimiter would otherwise vanish into the last segment
        let segments = path.split(delimiter).map(str::to_string).collect();
        Self::new(feature, segments, delimiter)
    }

    /// Key of the ancestor `depth` segments below the root. Depth 0 is the
    /// root itself (empty key); `LINEAGE_DEPTH` is the leaf.
    pub fn qualified(&self, depth: usize) -> String {
        self.segments[..depth.min(LINEAGE_DEPTH)].join(&self.delimiter)
    }

    pub fn path(&self) -> String {
        self.qualified(LINEAGE_DEPTH)
    }

    pub fn feature_id(&self) -> &str {
        &self.segments[LINEAGE_DEPTH - 1]
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

/// Turns every feature of `table` into a unique lineage, in table order.
///
/// Placeholder labels are numbered per rank across the whole table (the
/// k-th unassigned genus becomes `g__k`), so two unknown genera only share
/// a node when nothing distinguishes them. Numbers whose name is already
/// taken by a real label at that rank are skipped. Identical paths after
/// that are bad input and are reported, never merged.
pub fn normalize_lineages(table: &FeatureTable, config: &AMatrixConfig) -> Result<Vec<Lineage>> {
    let delimiter = config.delimiter.as_str();
    if delimiter.is_empty() {
        return Err(AMatrixError::InvalidLineage("empty delimiter".to_string()));
    }

    let mut named: [AHashSet<&str>; NUM_RANKS] = Default::default();
    for (row, feature) in table.features().iter().enumerate() {
        for rank in Rank::ALL {
            let label = feature.label(rank);
            if !splits_cleanly(label, delimiter) {
                return Err(AMatrixError::DelimiterInLabel {
                    row,
                    label: label.to_string(),
                });
            }
            if !is_placeholder(rank, label) {
                named[rank.index()].insert(label);
            }
        }
        if !splits_cleanly(&feature.id, delimiter) {
            return Err(AMatrixError::DelimiterInLabel {
                row,
                label: feature.id.clone(),
            });
        }
    }

    let mut placeholder_counts = [0usize; NUM_RANKS];
    let mut next_suffix = [0usize; NUM_RANKS];
    let mut lineages = Vec::with_capacity(table.len());

    for (row, feature) in table.features().iter().enumerate() {
        let mut segments = Vec::with_capacity(LINEAGE_DEPTH);
        for rank in Rank::ALL {
            let label = feature.label(rank);
            if is_placeholder(rank, label) {
                let r = rank.index();
                placeholder_counts[r] += 1;
                let base = if label.chars().count() == PLACEHOLDER_WIDTH {
                    label
                } else {
                    rank.prefix()
                };
                let renamed = loop {
                    next_suffix[r] += 1;
                    let candidate = format!("{}{}", base, next_suffix[r]);
                    if !named[r].contains(candidate.as_str()) {
                        break candidate;
                    }
                };
                segments.push(renamed);
            } else {
                segments.push(label.to_string());
            }
        }
        segments.push(feature.id.clone());
        lineages.push(Lineage::new(row, segments, delimiter)?);
    }

    let mut seen: AHashMap<String, usize> = AHashMap::with_capacity(lineages.len());
    for lineage in &lineages {
        if let Some(&first) = seen.get(&lineage.path()) {
            return Err(AMatrixError::DuplicateLineage {
                lineage: lineage.path(),
                first: table.features()[first].id.clone(),
                second: lineage.feature_id().to_string(),
            });
        }
        seen.insert(lineage.path(), lineage.feature);
    }

    log::info!(
        "Normalized {} lineages ({} placeholder labels renamed)",
        lineages.len(),
        placeholder_counts.iter().sum::<usize>()
    );
    for rank in Rank::ALL {
        let count = placeholder_counts[rank.index()];
        if count > 0 {
            log::debug!("{count} unassigned {rank} label(s)");
        }
    }

    Ok(lineages)
}
