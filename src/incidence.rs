//src/incidence.rs

use std::io::Write;

use sprs::{CsMat, TriMat};

use crate::error::{AMatrixError, Result};
use crate::tree::{NodeId, TaxonomyTree};
use crate::types::AMatrixConfig;

/// Binary node × feature matrix: entry (node, feature) is 1 iff the
/// feature is a leaf below the node. Rows follow the tree's pre-order,
/// columns follow the feature table.
#[derive(Debug, Clone)]
pub struct IncidenceMatrix {
    data: CsMat<u8>,
    row_keys: Vec<String>,
    row_nodes: Vec<NodeId>,
    feature_ids: Vec<String>,
}

impl IncidenceMatrix {
    /// Accumulates each node's leaf set from its children in one pass over
    /// the arena in reverse pre-order (children before parents).
    pub fn from_tree(
        tree: &TaxonomyTree,
        feature_ids: &[String],
        config: &AMatrixConfig,
    ) -> Result<Self> {
        tree.verify()?;
        let n_features = tree.leaf_count();
        if feature_ids.len() != n_features {
            return Err(AMatrixError::DimensionMismatch {
                expected: n_features,
                actual: feature_ids.len(),
            });
        }

        let nodes = tree.nodes();
        let mut below: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for id in (0..nodes.len()).rev() {
            let node = &nodes[id];
            if node.is_leaf() {
                let feature = node.feature.ok_or_else(|| AMatrixError::MissingFeature {
                    key: node.key.clone(),
                })?;
                below[id].push(feature);
                continue;
            }
            let mut set = Vec::new();
            for child in node.children() {
                if child.0 <= id {
                    return Err(AMatrixError::DuplicateChild {
                        parent: node.key.clone(),
                        key: nodes[child.0].key.clone(),
                    });
                }
                set.extend_from_slice(&below[child.0]);
            }
            set.sort_unstable();
            below[id] = set;
        }

        let root_set = &below[TaxonomyTree::ROOT.0];
        if root_set.len() != n_features {
            let key = (0..n_features)
                .find(|f| root_set.binary_search(f).is_err())
                .and_then(|f| tree.leaf_of(f))
                .map(|leaf| tree.node(leaf).key.clone())
                .unwrap_or_default();
            return Err(AMatrixError::UnreachableLeaf { key });
        }

        let first_row = if config.include_root { 0 } else { 1 };
        let n_rows = nodes.len() - first_row;
        let mut tri = TriMat::new((n_rows, n_features));
        let mut row_keys = Vec::with_capacity(n_rows);
        let mut row_nodes = Vec::with_capacity(n_rows);

        for (row, id) in (first_row..nodes.len()).enumerate() {
            for &feature in &below[id] {
                tri.add_triplet(row, feature, 1u8);
            }
            row_keys.push(nodes[id].key.clone());
            row_nodes.push(NodeId(id));
        }

        let data: CsMat<u8> = tri.to_csr();
        log::info!(
            "Emitted incidence matrix: {} node rows x {} features, {} nonzeros",
            n_rows,
            n_features,
            data.nnz()
        );

        Ok(Self {
            data,
            row_keys,
            row_nodes,
            feature_ids: feature_ids.to_vec(),
        })
    }

    /// Sparse CSR view (rows = nodes).
    pub fn data(&self) -> &CsMat<u8> {
        &self.data
    }

    /// `(nodes, features)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn n_nodes(&self) -> usize {
        self.row_keys.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn row_keys(&self) -> &[String] {
        &self.row_keys
    }

    /// Tree node behind each row.
    pub fn row_nodes(&self) -> &[NodeId] {
        &self.row_nodes
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn row_of(&self, key: &str) -> Option<usize> {
        self.row_keys.iter().position(|k| k == key)
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data.get(row, col).copied().unwrap_or(0)
    }

    /// Feature columns set in `row`, ascending.
    pub fn row_features(&self, row: usize) -> Vec<usize> {
        self.data
            .outer_view(row)
            .map(|v| v.indices().to_vec())
            .unwrap_or_default()
    }

    /// Number of leaves below each row's node.
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.n_nodes())
            .map(|row| self.data.outer_view(row).map(|v| v.nnz()).unwrap_or(0))
            .collect()
    }

    /// The same incidence in features × nodes orientation, the layout
    /// tree-aggregated regression multiplies the log-abundances against.
    pub fn to_feature_major(&self) -> CsMat<u8> {
        let mut tri = TriMat::new((self.n_features(), self.n_nodes()));
        for row in 0..self.n_nodes() {
            if let Some(view) = self.data.outer_view(row) {
                for &feature in view.indices() {
                    tri.add_triplet(feature, row, 1u8);
                }
            }
        }
        tri.to_csr()
    }

    /// Sums samples × features log-abundances over every node's leaves,
    /// giving the samples × nodes aggregated design.
    pub fn aggregate(&self, log_abundance: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let n_features = self.n_features();
        let mut out = Vec::with_capacity(log_abundance.len());
        for sample in log_abundance {
            if sample.len() != n_features {
                return Err(AMatrixError::DimensionMismatch {
                    expected: n_features,
                    actual: sample.len(),
                });
            }
            let aggregated = (0..self.n_nodes())
                .map(|row| {
                    self.data
                        .outer_view(row)
                        .map(|v| v.indices().iter().map(|&f| sample[f]).sum())
                        .unwrap_or(0.0)
                })
                .collect();
            out.push(aggregated);
        }
        Ok(out)
    }

    /// Dense TSV: a `node` header followed by feature ids, then one 0/1
    /// row per node.
    pub fn to_tsv<W: Write>(&self, mut writer: W) -> Result<()> {
        write!(writer, "node")?;
        for id in &self.feature_ids {
            write!(writer, "\t{}", id)?;
        }
        writeln!(writer)?;

        let mut dense = vec![0u8; self.n_features()];
        for (row, key) in self.row_keys.iter().enumerate() {
            dense.iter_mut().for_each(|v| *v = 0);
            for feature in self.row_features(row) {
                dense[feature] = 1;
            }
            write!(writer, "{}", key)?;
            for v in &dense {
                write!(writer, "\t{}", v)?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}
