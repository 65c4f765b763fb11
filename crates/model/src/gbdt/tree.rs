//! Decision tree structures for GBDT inference
//!
//! Nodes are stored in a flat vector with node 0 as the root. Thresholds and
//! leaf values are fixed-point integers at the booster scale.

use serde::{Deserialize, Serialize};

/// Sentinel used for "no child" and "no feature" on leaf nodes.
pub const NO_INDEX: i32 = -1;

fn no_index() -> i32 {
    NO_INDEX
}

/// A decision tree node (internal split or leaf)
///
/// Internal nodes carry a non-negative `feature` index and child indexes.
/// Leaves carry `leaf = Some(value)`; their other fields may be omitted from
/// the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    /// Feature index to split on (-1 for leaves)
    #[serde(default = "no_index")]
    pub feature: i32,

    /// Split threshold; `value <= threshold` goes left
    #[serde(default)]
    pub threshold: i64,

    /// Left child index (-1 for leaves)
    #[serde(default = "no_index")]
    pub left: i32,

    /// Right child index (-1 for leaves)
    #[serde(default = "no_index")]
    pub right: i32,

    /// Leaf value, present only on leaves
    #[serde(default)]
    pub leaf: Option<i64>,
}

impl Node {
    /// Create an internal (split) node
    pub fn split(feature: i32, threshold: i64, left: i32, right: i32) -> Self {
        Self {
            feature,
            threshold,
            left,
            right,
            leaf: None,
        }
    }

    /// Create a leaf node
    pub fn leaf(value: i64) -> Self {
        Self {
            feature: NO_INDEX,
            threshold: 0,
            left: NO_INDEX,
            right: NO_INDEX,
            leaf: Some(value),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }
}

/// A single decision tree with integer-only nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Tree {
    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,

    /// Tree weight for ensemble aggregation (fixed-point integer)
    pub weight: i64,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, weight: i64) -> Self {
        Self { nodes, weight }
    }

    /// Walk the tree for one encoded feature vector and return the leaf value.
    ///
    /// Assumes the tree passed [`Tree::validate`] against a feature vector of
    /// at least `features.len()` entries; malformed paths evaluate to 0.
    pub fn evaluate(&self, features: &[i64]) -> i64 {
        let mut idx = 0usize;

        while let Some(node) = self.nodes.get(idx) {
            if let Some(value) = node.leaf {
                return value;
            }

            let Some(&value) = usize::try_from(node.feature)
                .ok()
                .and_then(|feature| features.get(feature))
            else {
                return 0;
            };

            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };

            match usize::try_from(next) {
                Ok(next) => idx = next,
                Err(_) => return 0,
            }
        }

        0
    }

    /// Highest feature index referenced by any split, if the tree has splits.
    pub fn max_feature_index(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter(|node| !node.is_leaf())
            .filter_map(|node| usize::try_from(node.feature).ok())
            .max()
    }

    /// Validate tree structure
    ///
    /// Children must point strictly forward, which rules out cycles and
    /// guarantees traversal terminates.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                continue;
            }

            if node.feature < 0 {
                return Err(format!(
                    "split node {i} has invalid feature index {}",
                    node.feature
                ));
            }

            for (side, child) in [("left", node.left), ("right", node.right)] {
                let valid = usize::try_from(child)
                    .map(|child| child > i && child < len)
                    .unwrap_or(false);
                if !valid {
                    return Err(format!("split node {i} has invalid {side} child {child}"));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree::new(
            vec![Node::split(0, 50, 1, 2), Node::leaf(100), Node::leaf(200)],
            1_000_000,
        )
    }

    #[test]
    fn test_tree_evaluation() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[30]), 100);
        assert_eq!(tree.evaluate(&[50]), 100); // Equal goes left
        assert_eq!(tree.evaluate(&[60]), 200);
    }

    #[test]
    fn test_missing_feature_evaluates_to_zero() {
        let tree = stump();
        assert_eq!(tree.evaluate(&[]), 0);
    }

    #[test]
    fn test_tree_validation() {
        assert!(stump().validate().is_ok());

        let out_of_bounds = Tree::new(
            vec![Node::split(0, 50, 5, 2), Node::leaf(100), Node::leaf(200)],
            1_000_000,
        );
        assert!(out_of_bounds.validate().is_err());

        let backwards = Tree::new(
            vec![Node::leaf(1), Node::split(0, 50, 0, 2), Node::leaf(2)],
            1_000_000,
        );
        assert!(backwards.validate().is_err());

        assert!(Tree::new(vec![], 1).validate().is_err());
    }

    #[test]
    fn test_compact_leaf_deserialization() {
        let tree: Tree = serde_json::from_str(
            r#"{"nodes":[{"feature":2,"threshold":7,"left":1,"right":2},{"leaf":-3},{"leaf":3}],"weight":1}"#,
        )
        .unwrap();

        assert_eq!(tree.nodes[1], Node::leaf(-3));
        assert_eq!(tree.max_feature_index(), Some(2));
        assert_eq!(tree.evaluate(&[0, 0, 8]), 3);
    }
}
