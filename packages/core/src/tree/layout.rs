//! Layout Engine - Canvas Positions for a Conversation Forest
//!
//! `calculate_tree_layout` is a pure, synchronous function. Every subtree is given a
//! horizontal band whose width is its leaf count times the horizontal spacing; a node
//! sits in the middle of its band and its children split the band left to right in
//! input order. Roots are laid side by side the same way. Vertical position is
//! `depth * vertical_spacing`.
//!
//! Bands of siblings never overlap, so no two siblings share an x coordinate. Output
//! depends only on the input slice and its order.

use crate::models::{Node, PositionUpdate};
use crate::tree::forest::Forest;
use serde::{Deserialize, Serialize};

/// Spacing between layout slots, in canvas units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    pub horizontal_spacing: f64,
    pub vertical_spacing: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_spacing: 300.0,
            vertical_spacing: 150.0,
        }
    }
}

/// The only two fields the layout looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutInput {
    pub id: String,
    pub parent_id: Option<String>,
}

impl LayoutInput {
    pub fn new(id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
        }
    }
}

impl From<&Node> for LayoutInput {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            parent_id: node.parent_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPosition {
    pub node_id: String,
    pub position_x: f64,
    pub position_y: f64,
}

impl From<LayoutPosition> for PositionUpdate {
    fn from(position: LayoutPosition) -> Self {
        Self {
            node_id: position.node_id,
            position_x: position.position_x,
            position_y: position.position_y,
        }
    }
}

/// Compute a position for every distinct id in `nodes`
///
/// Results come back in input order. A repeated id is laid out once, at its first
/// occurrence.
pub fn calculate_tree_layout(nodes: &[LayoutInput], config: &LayoutConfig) -> Vec<LayoutPosition> {
    let forest = Forest::build(
        nodes
            .iter()
            .map(|node| (node.id.as_str(), node.parent_id.as_deref())),
    );

    // Leaf counts, children before parents
    let mut leaves = vec![1usize; forest.len()];
    for &member in forest.preorder.iter().rev() {
        let children = &forest.children[member];
        if !children.is_empty() {
            leaves[member] = children.iter().map(|&child| leaves[child]).sum();
        }
    }

    // Band starts in leaf units, parents before children
    let mut band_start = vec![0usize; forest.len()];
    let mut cursor = 0;
    for &root in &forest.roots {
        band_start[root] = cursor;
        cursor += leaves[root];
    }
    for &member in &forest.preorder {
        let mut start = band_start[member];
        for &child in &forest.children[member] {
            band_start[child] = start;
            start += leaves[child];
        }
    }

    forest
        .members
        .iter()
        .enumerate()
        .map(|(member, &position)| {
            let center = band_start[member] as f64 + (leaves[member] as f64 - 1.0) / 2.0;
            LayoutPosition {
                node_id: nodes[position].id.clone(),
                position_x: center * config.horizontal_spacing,
                position_y: forest.depth[member] as f64 * config.vertical_spacing,
            }
        })
        .collect()
}
