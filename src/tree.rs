//src/tree.rs

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

use ahash::AHashMap;

use crate::error::{AMatrixError, Result};
use crate::lineage::{Lineage, LINEAGE_DEPTH};
use crate::types::{AMatrixConfig, Rank, TreeReportRow};

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Ancestor-qualified path of the node; empty for the root.
    pub key: String,
    /// Last segment of `key`, or the root label.
    pub label: String,
    /// Segments below the root: 0 for the root, `LINEAGE_DEPTH` for leaves.
    pub depth: usize,
    pub parent: Option<NodeId>,
    /// Feature column, set on leaves only.
    pub feature: Option<usize>,
    /// Keys of single-child ancestors folded into this node, outermost first.
    pub collapsed: Vec<String>,
    children: BTreeMap<String, NodeId>,
}

impl TreeNode {
    fn new(key: String, label: String, depth: usize, parent: Option<NodeId>) -> Self {
        Self {
            key,
            label,
            depth,
            parent,
            feature: None,
            collapsed: Vec::new(),
            children: BTreeMap::new(),
        }
    }

    /// Children in key order.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// The taxonomic rank the node sits at, if it is not the root or a leaf.
    pub fn rank(&self) -> Option<Rank> {
        match self.depth {
            1..=7 => Some(Rank::ALL[self.depth - 1]),
            _ => None,
        }
    }

    fn rank_name(&self) -> String {
        match (self.depth, self.rank()) {
            (0, _) => "root".to_string(),
            (_, Some(rank)) => rank.to_string(),
            _ => "feature".to_string(),
        }
    }
}

/// Rooted taxonomy over a set of lineages. Leaves are features.
///
/// The arena is kept in pre-order (children visited in key order), so a
/// node id is always greater than its parent's and the layout depends only
/// on the set of lineages, never on the order they were supplied in.
#[derive(Debug, Clone)]
pub struct TaxonomyTree {
    nodes: Vec<TreeNode>,
    /// feature column -> leaf
    leaves: Vec<NodeId>,
    index: AHashMap<String, NodeId>,
    delimiter: String,
}

impl TaxonomyTree {
    pub const ROOT: NodeId = NodeId(0);

    /// Builds the tree by walking each lineage from the root and creating
    /// the nodes it introduces.
    pub fn build(lineages: &[Lineage], config: &AMatrixConfig) -> Result<Self> {
        if lineages.is_empty() {
            return Err(AMatrixError::EmptyTable);
        }
        let n_features = lineages.len();
        let mut nodes = vec![TreeNode::new(
            String::new(),
            config.root_label.clone(),
            0,
            None,
        )];
        let mut leaf_owner: Vec<Option<usize>> = vec![None; n_features];

        for (i, lineage) in lineages.iter().enumerate() {
            if lineage.feature >= n_features {
                return Err(AMatrixError::InvalidLineage(format!(
                    "feature column {} out of range for {} lineages",
                    lineage.feature, n_features
                )));
            }
            if let Some(other) = leaf_owner[lineage.feature] {
                return Err(AMatrixError::InvalidLineage(format!(
                    "feature column {} claimed by '{}' and '{}'",
                    lineage.feature,
                    lineages[other].path(),
                    lineage.path()
                )));
            }

            let mut cur = Self::ROOT;
            for depth in 1..=LINEAGE_DEPTH {
                let key = lineage.qualified(depth);
                let existing = nodes[cur.0].children.get(&key).copied();
                match existing {
                    Some(child) if depth == LINEAGE_DEPTH => {
                        let first = nodes[child.0]
                            .feature
                            .and_then(|f| leaf_owner[f])
                            .map(|owner| lineages[owner].feature_id().to_string())
                            .unwrap_or_default();
                        return Err(AMatrixError::DuplicateLineage {
                            lineage: key,
                            first,
                            second: lineage.feature_id().to_string(),
                        });
                    }
                    Some(child) => cur = child,
                    None => {
                        let id = NodeId(nodes.len());
                        let label = lineage.segments[depth - 1].clone();
                        nodes.push(TreeNode::new(key.clone(), label, depth, Some(cur)));
                        nodes[cur.0].children.insert(key, id);
                        cur = id;
                    }
                }
            }
            nodes[cur.0].feature = Some(lineage.feature);
            leaf_owner[lineage.feature] = Some(i);
        }

        let tree = Self::from_arena(nodes, n_features, &config.delimiter)?;
        log::info!(
            "Built taxonomy tree: {} nodes, {} leaves",
            tree.len(),
            tree.leaf_count()
        );
        Ok(tree)
    }

    /// Re-lays `nodes` out in pre-order starting from slot 0. Slots that are
    /// no longer reachable from the root are dropped.
    fn from_arena(nodes: Vec<TreeNode>, n_features: usize, delimiter: &str) -> Result<Self> {
        let mut order: Vec<usize> = Vec::with_capacity(nodes.len());
        let mut new_id: Vec<Option<NodeId>> = vec![None; nodes.len()];
        let mut stack = vec![0usize];

        while let Some(old) = stack.pop() {
            if new_id[old].is_some() {
                let parent = nodes[old]
                    .parent
                    .map(|p| nodes[p.0].key.clone())
                    .unwrap_or_default();
                return Err(AMatrixError::DuplicateChild {
                    parent,
                    key: nodes[old].key.clone(),
                });
            }
            new_id[old] = Some(NodeId(order.len()));
            order.push(old);
            // reversed so the smallest key is popped first
            stack.extend(nodes[old].children.values().rev().map(|c| c.0));
        }

        let remap = |id: NodeId| -> Result<NodeId> {
            new_id[id.0].ok_or_else(|| AMatrixError::UnreachableLeaf {
                key: nodes[id.0].key.clone(),
            })
        };

        let mut arranged = Vec::with_capacity(order.len());
        let mut leaves: Vec<Option<NodeId>> = vec![None; n_features];
        let mut index = AHashMap::with_capacity(order.len());

        for &old in &order {
            let node = &nodes[old];
            let parent = match node.parent {
                Some(p) if old != 0 => Some(remap(p)?),
                _ => None,
            };
            let mut children = BTreeMap::new();
            for (key, &child) in &node.children {
                children.insert(key.clone(), remap(child)?);
            }
            let id = NodeId(arranged.len());
            if node.is_leaf() && old != 0 {
                let feature = node.feature.ok_or_else(|| AMatrixError::MissingFeature {
                    key: node.key.clone(),
                })?;
                if feature >= n_features {
                    return Err(AMatrixError::MissingFeature {
                        key: node.key.clone(),
                    });
                }
                leaves[feature] = Some(id);
            }
            if index.insert(node.key.clone(), id).is_some() {
                return Err(AMatrixError::AmbiguousKey {
                    key: node.key.clone(),
                });
            }
            arranged.push(TreeNode {
                key: node.key.clone(),
                label: node.label.clone(),
                depth: node.depth,
                parent,
                feature: node.feature,
                collapsed: node.collapsed.clone(),
                children,
            });
        }

        let leaves = leaves
            .into_iter()
            .enumerate()
            .map(|(feature, leaf)| {
                leaf.ok_or_else(|| AMatrixError::UnreachableLeaf {
                    key: format!("feature column {feature}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            nodes: arranged,
            leaves,
            index,
            delimiter: delimiter.to_string(),
        })
    }

    /// Returns a copy without internal nodes that have a single child.
    ///
    /// Each removed node's child moves up to the removed node's parent and
    /// records the removed key in `collapsed`. The root and the leaves
    /// always survive, and every surviving node keeps its exact set of
    /// descendant leaves.
    pub fn collapse_single_child_chains(&self) -> Result<Self> {
        let mut nodes = self.nodes.clone();
        let mut removed = 0usize;

        // Pre-order: by the time a node is visited its parent is final.
        for id in 1..nodes.len() {
            if nodes[id].children.len() != 1 {
                continue;
            }
            let Some(parent) = nodes[id].parent else {
                continue;
            };
            let (_, child) = nodes[id]
                .children
                .pop_first()
                .ok_or_else(|| AMatrixError::MissingFeature {
                    key: nodes[id].key.clone(),
                })?;
            let key = nodes[id].key.clone();
            nodes[parent.0].children.remove(&key);

            let child_key = nodes[child.0].key.clone();
            if nodes[parent.0].children.insert(child_key.clone(), child).is_some() {
                return Err(AMatrixError::DuplicateChild {
                    parent: nodes[parent.0].key.clone(),
                    key: child_key,
                });
            }

            let mut absorbed = std::mem::take(&mut nodes[id].collapsed);
            absorbed.push(key);
            absorbed.append(&mut nodes[child.0].collapsed);
            nodes[child.0].collapsed = absorbed;
            nodes[child.0].parent = Some(parent);
            nodes[id].parent = None;
            removed += 1;
        }

        let tree = Self::from_arena(nodes, self.leaves.len(), &self.delimiter)?;
        log::info!(
            "Collapsed {} single-child node(s): {} -> {} nodes",
            removed,
            self.len(),
            tree.len()
        );
        Ok(tree)
    }

    /// Checks that every leaf reaches the root and that parent and child
    /// links agree.
    pub fn verify(&self) -> Result<()> {
        for (id, node) in self.nodes.iter().enumerate() {
            for child in node.children() {
                let back = self.nodes.get(child.0).and_then(|c| c.parent);
                if back != Some(NodeId(id)) {
                    return Err(AMatrixError::BrokenLink {
                        parent: node.key.clone(),
                        key: self
                            .nodes
                            .get(child.0)
                            .map(|c| c.key.clone())
                            .unwrap_or_default(),
                    });
                }
            }
        }

        for &leaf in &self.leaves {
            let mut cur = leaf;
            let mut steps = 0usize;
            while let Some(parent) = self.nodes[cur.0].parent {
                cur = parent;
                steps += 1;
                if steps > self.nodes.len() {
                    break;
                }
            }
            if cur != Self::ROOT || steps > self.nodes.len() {
                return Err(AMatrixError::UnreachableLeaf {
                    key: self.nodes[leaf.0].key.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[Self::ROOT.0]
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Leaf holding feature column `feature`.
    pub fn leaf_of(&self, feature: usize) -> Option<NodeId> {
        self.leaves.get(feature).copied()
    }

    pub fn find(&self, key: &str) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Feature columns below `id`, ascending.
    pub fn descendant_leaves(&self, id: NodeId) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let node = &self.nodes[cur.0];
            if let Some(feature) = node.feature {
                out.push(feature);
            }
            stack.extend(node.children());
        }
        out.sort_unstable();
        out
    }

    /// Newick rendering with feature ids on the leaves and node labels on
    /// internal nodes.
    pub fn to_newick(&self) -> String {
        fn write_node(tree: &TaxonomyTree, id: NodeId, out: &mut String) {
            let node = tree.node(id);
            if !node.is_leaf() {
                out.push('(');
                for (i, child) in node.children().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_node(tree, child, out);
                }
                out.push(')');
            }
            out.push_str(&newick_label(&node.label));
        }

        let mut out = String::new();
        write_node(self, Self::ROOT, &mut out);
        out.push(';');
        out
    }

    /// Depth-first rows for the indented report, largest clades first.
    pub fn report_rows(&self) -> Vec<TreeReportRow> {
        let mut clade_size = vec![0usize; self.nodes.len()];
        for id in (0..self.nodes.len()).rev() {
            let node = &self.nodes[id];
            clade_size[id] = if node.is_leaf() {
                1
            } else {
                node.children().map(|c| clade_size[c.0]).sum()
            };
        }

        let total = self.leaf_count().max(1);
        let mut rows = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(Self::ROOT, 0usize)];

        while let Some((id, depth)) = stack.pop() {
            let node = &self.nodes[id.0];
            let mut kids: Vec<NodeId> = node.children().collect();
            // stable, so ties keep key order
            kids.sort_by_key(|c| std::cmp::Reverse(clade_size[c.0]));

            rows.push(TreeReportRow {
                pct: 100.0 * clade_size[id.0] as f32 / total as f32,
                leaves: clade_size[id.0],
                depth,
                rank: node.rank_name(),
                name: node.label.clone(),
                key: node.key.clone(),
                parent_key: node.parent.map(|p| self.nodes[p.0].key.clone()),
                children_keys: kids.iter().map(|c| self.nodes[c.0].key.clone()).collect(),
            });

            stack.extend(kids.into_iter().rev().map(|c| (c, depth + 1)));
        }
        rows
    }
}

impl PartialEq for TaxonomyTree {
    fn eq(&self, other: &Self) -> bool {
        // `index` is derived from `nodes`
        self.nodes == other.nodes && self.leaves == other.leaves && self.delimiter == other.delimiter
    }
}

impl Eq for TaxonomyTree {}

fn newick_label(label: &str) -> String {
    const SPECIAL: &[char] = &['(', ')', '[', ']', '\'', ':', ';', ',', ' ', '\t'];
    if label.contains(SPECIAL) {
        let mut quoted = String::with_capacity(label.len() + 2);
        quoted.push('\'');
        for ch in label.chars() {
            if ch == '\'' {
                quoted.push('\'');
            }
            quoted.push(ch);
        }
        quoted.push('\'');
        quoted
    } else {
        label.to_string()
    }
}

/// Text form of [`TaxonomyTree::report_rows`].
pub fn format_tree_report(rows: &[TreeReportRow]) -> String {
    let mut output = String::new();
    output.push_str("%\tleaves\trank\tname\n");
    for row in rows {
        let mut indented_name = String::new();
        for _ in 0..row.depth {
            indented_name.push('\t');
        }
        indented_name.push_str(&row.name);
        let _ = writeln!(
            output,
            "{:.4}\t{}\t{}\t{}",
            row.pct, row.leaves, row.rank, indented_name
        );
    }
    output
}
