//src/types.rs

use std::fmt;

use crate::error::{AMatrixError, Result};

/// Number of taxonomic ranks every feature carries.
pub const NUM_RANKS: usize = 7;

/// Width of a bare rank marker such as `g__`.
pub const PLACEHOLDER_WIDTH: usize = 3;

/// One level of the fixed kingdom..species hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    pub const ALL: [Rank; NUM_RANKS] = [
        Rank::Kingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
    ];

    /// The marker an unassigned label at this rank reduces to, e.g. `f__`.
    pub fn prefix(self) -> &'static str {
        match self {
            Rank::Kingdom => "k__",
            Rank::Phylum => "p__",
            Rank::Class => "c__",
            Rank::Order => "o__",
            Rank::Family => "f__",
            Rank::Genus => "g__",
            Rank::Species => "s__",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rank::Kingdom => "kingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
        };
        f.write_str(name)
    }
}

/// One OTU/ASV: an identifier plus its kingdom..species labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub id: String,
    pub ranks: [String; NUM_RANKS],
}

impl Feature {
    /// `row` is only used to locate the feature in error messages.
    pub fn new(row: usize, id: &str, ranks: Vec<String>) -> Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AMatrixError::EmptyIdentifier { row });
        }
        let found = ranks.len();
        let ranks: [String; NUM_RANKS] = ranks
            .into_iter()
            .map(|label| label.trim().to_string())
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| AMatrixError::MissingRanks { line: row, found })?;

        Ok(Self {
            id: id.to_string(),
            ranks,
        })
    }

    pub fn label(&self, rank: Rank) -> &str {
        &self.ranks[rank.index()]
    }
}

/// The features of one dataset, in input order. That order is the column
/// order of every incidence matrix derived from the table.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    features: Vec<Feature>,
}

impl FeatureTable {
    pub fn new(features: Vec<Feature>) -> Result<Self> {
        if features.is_empty() {
            return Err(AMatrixError::EmptyTable);
        }
        Ok(Self { features })
    }

    /// Convenience constructor from `(id, ranks)` rows.
    pub fn from_rows<I, S>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: AsRef<str>,
    {
        let features = rows
            .into_iter()
            .enumerate()
            .map(|(row, (id, ranks))| {
                let ranks = ranks.iter().map(|s| s.as_ref().to_string()).collect();
                Feature::new(row, id.as_ref(), ranks)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(features)
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_ids(&self) -> Vec<String> {
        self.features.iter().map(|f| f.id.clone()).collect()
    }
}

/// One row of the indented tree report, in the spirit of a Kraken report:
/// each node with the share of features below it.
#[derive(Debug, Clone)]
pub struct TreeReportRow {
    pub pct: f32,
    pub leaves: usize,
    pub depth: usize,
    pub rank: String,
    pub name: String,
    pub key: String,
    pub parent_key: Option<String>,
    pub children_keys: Vec<String>,
}

/// Knobs for one lineage → tree → A-matrix run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AMatrixConfig {
    /// Separator between lineage segments.
    pub delimiter: String,
    /// Label shown for the root node in reports and Newick output.
    pub root_label: String,
    /// Emit a row for the root (all ones).
    pub include_root: bool,
    /// Remove internal nodes that have exactly one child.
    pub collapse_singletons: bool,
}

impl Default for AMatrixConfig {
    fn default() -> Self {
        Self {
            delimiter: "::".to_string(),
            root_label: "Life".to_string(),
            include_root: false,
            collapse_singletons: true,
        }
    }
}

impl AMatrixConfig {
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_root_label(mut self, label: impl Into<String>) -> Self {
        self.root_label = label.into();
        self
    }

    pub fn with_root(mut self, include_root: bool) -> Self {
        self.include_root = include_root;
        self
    }

    pub fn with_collapse(mut self, collapse: bool) -> Self {
        self.collapse_singletons = collapse;
        self
    }
}
