//! Mutation-annotated tree structure and traversals
//!
//! The tree is loaded once from a flat JSON document (a list of nodes with
//! parent references, so deep phylogenies never hit parser recursion limits)
//! and is read-only for the rest of the run. Nodes live in an arena indexed
//! by `NodeIdx`; parent/child links are indices into it.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;

/// Index of a node in the tree arena
pub type NodeIdx = usize;

/// A single tree node with its edge annotations
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable identifier (sample name for leaves)
    pub identifier: String,
    /// Parent index; None for the root
    pub parent: Option<NodeIdx>,
    /// Children in file order (fixes DFS order)
    pub children: Vec<NodeIdx>,
    /// Mutations on the edge above this node, as opaque strings
    pub mutations: Vec<String>,
    /// Clade labels rooted at this node; empty string = no clade on that slot
    pub clade_annotations: Vec<String>,
}

/// Rooted mutation-annotated tree
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeIdx,
    index: HashMap<String, NodeIdx>,
    /// Collapsed identical-leaf groups, keyed by the placeholder leaf id
    pub condensed_nodes: HashMap<String, Vec<String>>,
}

/// On-disk node record
#[derive(Debug, Deserialize)]
struct NodeDoc {
    id: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    mutations: Vec<String>,
    #[serde(default)]
    clade_annotations: Vec<String>,
}

/// On-disk tree document
#[derive(Debug, Deserialize)]
struct TreeDoc {
    nodes: Vec<NodeDoc>,
    #[serde(default)]
    condensed_nodes: HashMap<String, Vec<String>>,
}

impl Tree {
    /// Load a tree from a JSON document on disk
    pub fn from_path(path: &Path) -> Result<Tree> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open tree file: {}", path.display()))?;
        let doc: TreeDoc = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse tree file: {}", path.display()))?;
        Tree::from_doc(doc)
    }

    /// Parse a tree from an in-memory JSON string
    pub fn from_json(json: &str) -> Result<Tree> {
        let doc: TreeDoc = serde_json::from_str(json).context("Failed to parse tree JSON")?;
        Tree::from_doc(doc)
    }

    fn from_doc(doc: TreeDoc) -> Result<Tree> {
        if doc.nodes.is_empty() {
            bail!("Tree document contains no nodes");
        }

        // First pass: create every node and the identifier index
        let mut nodes: Vec<Node> = Vec::with_capacity(doc.nodes.len());
        let mut index: HashMap<String, NodeIdx> = HashMap::with_capacity(doc.nodes.len());
        for rec in &doc.nodes {
            if index.insert(rec.id.clone(), nodes.len()).is_some() {
                bail!("Duplicate node identifier in tree: {}", rec.id);
            }
            nodes.push(Node {
                identifier: rec.id.clone(),
                parent: None,
                children: Vec::new(),
                mutations: rec.mutations.clone(),
                clade_annotations: rec.clade_annotations.clone(),
            });
        }

        // Second pass: link parents; children attach in file order
        let mut root: Option<NodeIdx> = None;
        for (idx, rec) in doc.nodes.iter().enumerate() {
            match &rec.parent {
                Some(pid) => {
                    let pidx = *index
                        .get(pid.as_str())
                        .with_context(|| format!("Node {} names unknown parent {}", rec.id, pid))?;
                    if pidx == idx {
                        bail!("Node {} is its own parent", rec.id);
                    }
                    nodes[idx].parent = Some(pidx);
                    nodes[pidx].children.push(idx);
                }
                None => {
                    if let Some(prev) = root {
                        bail!(
                            "Tree has multiple roots: {} and {}",
                            nodes[prev].identifier,
                            rec.id
                        );
                    }
                    root = Some(idx);
                }
            }
        }
        let root = root.context("Tree has no root (every node names a parent)")?;

        let tree = Tree {
            nodes,
            root,
            index,
            condensed_nodes: doc.condensed_nodes,
        };

        // Every node must hang off the root, or downstream per-node maps
        // would silently miss entries
        let reachable = tree.depth_first(None).len();
        if reachable != tree.nodes.len() {
            bail!(
                "Tree has {} nodes unreachable from the root",
                tree.nodes.len() - reachable
            );
        }
        Ok(tree)
    }

    /// Total node count
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Leaf count
    pub fn num_leaves(&self) -> usize {
        (0..self.nodes.len()).filter(|&i| self.is_leaf(i)).count()
    }

    /// Root index
    pub fn root(&self) -> NodeIdx {
        self.root
    }

    /// Borrow a node by index
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    /// Look a node up by identifier
    pub fn node_index(&self, identifier: &str) -> Option<NodeIdx> {
        self.index.get(identifier).copied()
    }

    pub fn is_leaf(&self, idx: NodeIdx) -> bool {
        self.nodes[idx].children.is_empty()
    }

    pub fn is_root(&self, idx: NodeIdx) -> bool {
        idx == self.root
    }

    /// Pre-order depth-first expansion from `from` (root when None)
    pub fn depth_first(&self, from: Option<NodeIdx>) -> Vec<NodeIdx> {
        let mut order = Vec::new();
        let mut stack = vec![from.unwrap_or(self.root)];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().rev());
        }
        order
    }

    /// Breadth-first expansion from `from` (root when None)
    pub fn breadth_first(&self, from: Option<NodeIdx>) -> Vec<NodeIdx> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([from.unwrap_or(self.root)]);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            queue.extend(self.nodes[idx].children.iter());
        }
        order
    }

    /// Leaves under `from`, in depth-first order
    pub fn leaves_under(&self, from: NodeIdx) -> Vec<NodeIdx> {
        self.depth_first(Some(from))
            .into_iter()
            .filter(|&i| self.is_leaf(i))
            .collect()
    }

    /// Iterate a node and its ancestors up to the root
    pub fn rsearch(
        &self,
        from: NodeIdx,
        include_self: bool,
    ) -> impl Iterator<Item = NodeIdx> + '_ {
        let start = if include_self {
            Some(from)
        } else {
            self.nodes[from].parent
        };
        std::iter::successors(start, move |&idx| self.nodes[idx].parent)
    }

    /// Expand collapsed identical-leaf groups.
    ///
    /// A single-member group renames the placeholder leaf in place. A
    /// multi-member group turns the placeholder into an internal node that
    /// keeps its edge mutations and gains one zero-mutation leaf child per
    /// member, so the members stay mutually identical and at the original
    /// distance from the rest of the tree.
    pub fn uncondense_leaves(&mut self) -> Result<()> {
        let groups = std::mem::take(&mut self.condensed_nodes);
        for (placeholder, members) in groups {
            let idx = self
                .node_index(&placeholder)
                .with_context(|| format!("Condensed node {} is not in the tree", placeholder))?;
            if !self.is_leaf(idx) {
                bail!("Condensed node {} is not a leaf", placeholder);
            }
            if members.is_empty() {
                bail!("Condensed node {} has no member samples", placeholder);
            }
            if members.len() == 1 {
                let name = members.into_iter().next().unwrap();
                self.index.remove(&placeholder);
                if self.index.insert(name.clone(), idx).is_some() {
                    bail!("Condensed member {} collides with an existing node", name);
                }
                self.nodes[idx].identifier = name;
                continue;
            }
            for name in members {
                let child = self.nodes.len();
                if self.index.insert(name.clone(), child).is_some() {
                    bail!("Condensed member {} collides with an existing node", name);
                }
                self.nodes.push(Node {
                    identifier: name,
                    parent: Some(idx),
                    children: Vec::new(),
                    mutations: Vec::new(),
                    clade_annotations: Vec::new(),
                });
                self.nodes[idx].children.push(child);
            }
        }
        Ok(())
    }
}
