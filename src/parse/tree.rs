//! Reconstructing a syntax tree from the builder's flat node list.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::ops::Range;

use super::builder::{CompletedNode, NodeKind};

/// A node in a [`SyntaxTree`].
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TreeNode {
    /// The kind of node.
    pub kind: NodeKind,
    /// The half-open token range of the node.
    pub tokens: Range<usize>,
    /// The indices of this node's children (in source order).
    pub children: Vec<usize>,
}

/// A tree of nodes, where every child's token range is inside its parent's.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SyntaxTree {
    nodes: Vec<TreeNode>,
}
impl SyntaxTree {
    /// Builds a tree out of completed nodes.
    ///
    /// Nodes are ordered by start, then by decreasing end.
    /// Nodes with the same range are ordered by creation order, except that
    /// a node made with `precede` counts as created with the node it wraps
    /// and is placed outside of it.
    /// Each node's parent is the nearest earlier node which contains it.
    ///
    /// If there is more than one outermost node, the first becomes the root
    /// and the rest are attached to it.
    pub fn new(completed: &[CompletedNode]) -> Option<Self> {
        let by_id: HashMap<_, _> = completed.iter().map(|n| (n.id, n)).collect();
        // The innermost node of this node's `precedes` chain, and how many wraps away it is.
        let chain = |n: &CompletedNode| {
            let (mut root, mut depth) = (n.id, 0usize);
            let mut cur = n.precedes;
            while let Some(id) = cur {
                root = id;
                depth += 1;
                cur = by_id.get(&id).and_then(|n| n.precedes);
            }
            (root, Reverse(depth))
        };

        let mut order: Vec<_> = completed.iter().collect();
        order.sort_by_key(|n| (n.start_token, Reverse(n.end_token), chain(n)));

        let mut nodes: Vec<TreeNode> = Vec::with_capacity(order.len());
        let mut stack: Vec<usize> = vec![];
        for n in order {
            while let Some(&top) = stack.last() {
                let parent = &nodes[top].tokens;
                if parent.start <= n.start_token && n.end_token <= parent.end {
                    break;
                }
                if stack.len() == 1 {
                    // Never pop the root.
                    break;
                }
                stack.pop();
            }

            let index = nodes.len();
            nodes.push(TreeNode { kind: n.kind, tokens: n.range(), children: vec![] });
            if let Some(&parent) = stack.last() {
                nodes[parent].children.push(index);
            }
            stack.push(index);
        }

        match nodes.is_empty() {
            true => None,
            false => Some(Self { nodes }),
        }
    }

    /// The index of the root node.
    pub fn root(&self) -> usize {
        0
    }

    /// Gets a node by index.
    pub fn node(&self, index: usize) -> &TreeNode {
        &self.nodes[index]
    }

    /// The children of a node.
    pub fn children(&self, index: usize) -> impl Iterator<Item = (usize, &TreeNode)> + '_ {
        self.nodes[index].children.iter().map(|&i| (i, &self.nodes[i]))
    }

    /// The number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty (it never is).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
