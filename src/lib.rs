// src/lib.rs
pub mod error;
pub mod incidence;
pub mod lineage;
pub mod taxtable;
pub mod tree;
pub mod types;

use std::path::Path;

use crate::error::Result;
use crate::incidence::IncidenceMatrix;
use crate::lineage::{normalize_lineages, Lineage};
use crate::taxtable::parse_feature_table;
use crate::tree::{format_tree_report, TaxonomyTree};
use crate::types::{AMatrixConfig, FeatureTable, TreeReportRow};

/// Everything derived from one feature table. Built once, then only read.
/// Text renderings are generated on demand from the structured data.
pub struct AggregationResults {
    /// One normalized lineage per feature, in table order
    pub lineages: Vec<Lineage>,

    /// The aggregation tree (collapsed if the config asked for it)
    pub tree: TaxonomyTree,

    /// Node × feature incidence, rows in tree pre-order
    pub a_matrix: IncidenceMatrix,

    pub config: AMatrixConfig,
}

impl AggregationResults {
    /// A matrix as dense TSV
    pub fn get_a_matrix_tsv(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.a_matrix.to_tsv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn get_newick(&self) -> String {
        self.tree.to_newick()
    }

    pub fn get_tree_report_rows(&self) -> Vec<TreeReportRow> {
        self.tree.report_rows()
    }

    /// Indented per-node report, largest clades first
    pub fn get_tree_report(&self) -> String {
        format_tree_report(&self.tree.report_rows())
    }

    /// Normalized lineage paths, one per line, in table order
    pub fn get_lineages_text(&self) -> String {
        let mut output = String::new();
        for lineage in &self.lineages {
            output.push_str(&lineage.path());
            output.push('\n');
        }
        output
    }
}

/// Runs lineage normalization, tree construction and incidence emission
/// over an already loaded table.
pub fn build_a_matrix(table: &FeatureTable, config: &AMatrixConfig) -> Result<AggregationResults> {
    // 1. Unique lineage per feature
    let lineages = normalize_lineages(table, config)?;

    // 2. Tree, optionally without single-child chains
    let mut tree = TaxonomyTree::build(&lineages, config)?;
    if config.collapse_singletons {
        tree = tree.collapse_single_child_chains()?;
    }

    // 3. Incidence rows per node
    let a_matrix = IncidenceMatrix::from_tree(&tree, &table.feature_ids(), config)?;

    Ok(AggregationResults {
        lineages,
        tree,
        a_matrix,
        config: config.clone(),
    })
}

/// [`build_a_matrix`] over a taxonomy TSV (optionally gzipped).
pub fn build_a_matrix_from_path<P: AsRef<Path>>(
    taxonomy_path: P,
    config: &AMatrixConfig,
) -> Result<AggregationResults> {
    let table = parse_feature_table(taxonomy_path)?;
    build_a_matrix(&table, config)
}
