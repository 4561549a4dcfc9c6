//! End-to-end checks of lineage normalization, tree building and A matrix
//! emission on small hand-made taxonomies.

use std::collections::BTreeSet;

use taxa_amatrix_rs::build_a_matrix;
use taxa_amatrix_rs::error::AMatrixError;
use taxa_amatrix_rs::lineage::normalize_lineages;
use taxa_amatrix_rs::tree::TaxonomyTree;
use taxa_amatrix_rs::types::{AMatrixConfig, FeatureTable};

fn soils_table() -> FeatureTable {
    FeatureTable::from_rows(vec![
        ("A", vec!["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Bacillaceae", "g__", "s__pasteurii"]),
        ("B", vec!["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Bacillaceae", "g__", "s__firmus"]),
        ("C", vec!["Bacteria", "Firmicutes", "Clostridia", "Clostridiales", "Clostridiaceae", "Clostridium", "s__"]),
        ("D", vec!["Bacteria", "Acidobacteria", "Acidobacteriia", "Acidobacteriales", "Koribacteraceae", "g__", "s__"]),
        ("E", vec!["Bacteria", "Acidobacteria", "Acidobacteriia", "Acidobacteriales", "Koribacteraceae", "Candidatus Koribacter", "s__"]),
        ("F", vec!["Archaea", "Crenarchaeota", "Thaumarchaeota", "Nitrososphaerales", "Nitrososphaeraceae", "Nitrososphaera", "s__"]),
    ])
    .unwrap()
}

fn uncollapsed() -> AMatrixConfig {
    AMatrixConfig::default().with_collapse(false).with_root(true)
}

#[test]
fn leaves_are_a_bijection_with_lineages() {
    let table = soils_table();
    let config = uncollapsed();
    let lineages = normalize_lineages(&table, &config).unwrap();
    let tree = TaxonomyTree::build(&lineages, &config).unwrap();

    let leaf_keys: BTreeSet<String> = tree
        .nodes()
        .iter()
        .filter(|n| n.is_leaf())
        .map(|n| n.key.clone())
        .collect();
    let paths: BTreeSet<String> = lineages.iter().map(|l| l.path()).collect();
    assert_eq!(leaf_keys.len(), table.len());
    assert_eq!(leaf_keys, paths);
}

#[test]
fn unknown_genera_split_under_firmicutes() {
    let results = build_a_matrix(&soils_table(), &uncollapsed()).unwrap();
    let a = &results.a_matrix;

    assert_eq!(results.lineages[0].segments[5], "g__1");
    assert_eq!(results.lineages[1].segments[5], "g__2");

    let g1 = a.row_of("Bacteria::Firmicutes::Bacilli::Bacillales::Bacillaceae::g__1").unwrap();
    let g2 = a.row_of("Bacteria::Firmicutes::Bacilli::Bacillales::Bacillaceae::g__2").unwrap();
    assert_eq!(a.row_features(g1), vec![0]);
    assert_eq!(a.row_features(g2), vec![1]);

    let firmicutes = a.row_of("Bacteria::Firmicutes").unwrap();
    assert_eq!(a.row_features(firmicutes), vec![0, 1, 2]);

    let root = a.row_of("").unwrap();
    assert_eq!(a.row_sums()[root], 6);
}

#[test]
fn family_splits_into_two_genera() {
    let table = FeatureTable::from_rows(vec![
        ("x1", vec!["Bacteria", "Proteobacteria", "Alphaproteobacteria", "Rhizobiales", "Bradyrhizobiaceae", "Bradyrhizobium", "s__elkanii"]),
        ("x2", vec!["Bacteria", "Proteobacteria", "Alphaproteobacteria", "Rhizobiales", "Bradyrhizobiaceae", "Rhodopseudomonas", "s__palustris"]),
        ("x3", vec!["Bacteria", "Proteobacteria", "Alphaproteobacteria", "Rhizobiales", "Bradyrhizobiaceae", "Bradyrhizobium", "s__japonicum"]),
    ])
    .unwrap();
    let results = build_a_matrix(&table, &uncollapsed()).unwrap();
    let a = &results.a_matrix;
    let sums = a.row_sums();

    let family = "Bacteria::Proteobacteria::Alphaproteobacteria::Rhizobiales::Bradyrhizobiaceae";
    let brady = a.row_of(&format!("{family}::Bradyrhizobium")).unwrap();
    let rhodo = a.row_of(&format!("{family}::Rhodopseudomonas")).unwrap();
    assert_eq!(sums[a.row_of(family).unwrap()], 3);
    assert_eq!((sums[brady], sums[rhodo]), (2, 1));
    assert_eq!(sums[brady] + sums[rhodo], 3);
}

#[test]
fn row_sums_match_descendant_counts() {
    for config in [uncollapsed(), AMatrixConfig::default()] {
        let results = build_a_matrix(&soils_table(), &config).unwrap();
        let a = &results.a_matrix;
        let sums = a.row_sums();
        for (row, &node) in a.row_nodes().iter().enumerate() {
            assert_eq!(sums[row], results.tree.descendant_leaves(node).len());
            if results.tree.node(node).is_leaf() {
                assert_eq!(sums[row], 1);
            }
        }
        // each feature is its own leaf row
        for feature in 0..a.n_features() {
            let leaf = results.tree.leaf_of(feature).unwrap();
            let row = a.row_of(&results.tree.node(leaf).key).unwrap();
            assert_eq!(a.row_features(row), vec![feature]);
        }
    }
}

#[test]
fn pipeline_output_is_reproducible() {
    let first = build_a_matrix(&soils_table(), &AMatrixConfig::default()).unwrap();
    let second = build_a_matrix(&soils_table(), &AMatrixConfig::default()).unwrap();
    assert_eq!(first.get_a_matrix_tsv().unwrap(), second.get_a_matrix_tsv().unwrap());
    assert_eq!(first.get_newick(), second.get_newick());
    assert_eq!(first.tree, second.tree);
}

#[test]
fn tree_shape_ignores_row_order() {
    let table = soils_table();
    let mut features = table.features().to_vec();
    features.reverse();
    let reversed = FeatureTable::new(features).unwrap();

    let config = AMatrixConfig::default();
    let a = build_a_matrix(&table, &config).unwrap();
    let b = build_a_matrix(&reversed, &config).unwrap();

    // placeholder numbers differ, but the branching does not
    let shape = |t: &TaxonomyTree| -> Vec<(usize, usize)> {
        t.nodes().iter().map(|n| (n.depth, n.num_children())).collect()
    };
    assert_eq!(shape(&a.tree), shape(&b.tree));

    let clades = |r: &taxa_amatrix_rs::AggregationResults| -> BTreeSet<Vec<String>> {
        let ids = r.a_matrix.feature_ids();
        (0..r.a_matrix.n_nodes())
            .map(|row| {
                let mut clade: Vec<String> =
                    r.a_matrix.row_features(row).iter().map(|&f| ids[f].clone()).collect();
                clade.sort();
                clade
            })
            .collect()
    };
    assert_eq!(clades(&a), clades(&b));
}

#[test]
fn collapse_preserves_every_surviving_leaf_set() {
    let table = soils_table();
    let config = uncollapsed();
    let lineages = normalize_lineages(&table, &config).unwrap();
    let full = TaxonomyTree::build(&lineages, &config).unwrap();
    let collapsed = full.collapse_single_child_chains().unwrap();

    assert!(collapsed.len() < full.len());
    assert_eq!(collapsed.leaf_count(), full.leaf_count());
    for node in collapsed.nodes() {
        assert!(node.is_leaf() || node.num_children() > 1 || node.parent.is_none());
        let before = full.find(&node.key).unwrap();
        let after = collapsed.find(&node.key).unwrap();
        assert_eq!(full.descendant_leaves(before), collapsed.descendant_leaves(after));
    }
}

#[test]
fn duplicate_lineages_are_fatal() {
    let table = FeatureTable::from_rows(vec![
        ("dup", vec!["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Bacillaceae", "Bacillus", "s__cereus"]),
        ("dup", vec!["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Bacillaceae", "Bacillus", "s__cereus"]),
    ])
    .unwrap();
    let err = build_a_matrix(&table, &AMatrixConfig::default()).err().unwrap();
    assert!(matches!(err, AMatrixError::DuplicateLineage { .. }));
    assert!(err.to_string().contains("dup"));
}

#[test]
fn missing_ranks_are_fatal() {
    let err = FeatureTable::from_rows(vec![("otu1", vec!["Bacteria", "Firmicutes"])]).unwrap_err();
    assert!(matches!(err, AMatrixError::MissingRanks { found: 2, .. }));
}

#[test]
fn unknown_genus_stays_apart_from_a_named_lookalike() {
    let table = FeatureTable::from_rows(vec![
        ("A", vec!["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Bacillaceae", "g__1", "s__alpha"]),
        ("B", vec!["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Bacillaceae", "g__", "s__beta"]),
        ("C", vec!["Bacteria", "Firmicutes", "Bacilli", "Bacillales", "Bacillaceae", "Bacillus", "s__cereus"]),
    ])
    .unwrap();
    let results = build_a_matrix(&table, &uncollapsed()).unwrap();
    let a = &results.a_matrix;

    assert_ne!(results.lineages[1].segments[5], "g__1");
    let named = a.row_of("Bacteria::Firmicutes::Bacilli::Bacillales::Bacillaceae::g__1").unwrap();
    assert_eq!(a.row_features(named), vec![0]);
}

#[test]
fn delimiter_fragments_cannot_forge_a_shared_key() {
    let table = FeatureTable::from_rows(vec![
        ("A", vec!["Bact:", "Firm", "Bacilli", "Bacillales", "Bacillaceae", "Bacillus", "s__cereus"]),
        ("B", vec!["Bact", ":Firm", "Bacilli", "Bacillales", "Bacillaceae", "Bacillus", "s__cereus"]),
    ])
    .unwrap();
    let err = build_a_matrix(&table, &uncollapsed()).err().unwrap();
    assert!(matches!(err, AMatrixError::DelimiterInLabel { row: 0, .. }));
}
