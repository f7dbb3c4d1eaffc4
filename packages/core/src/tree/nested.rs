//! Nested conversation tree built from a flat node list.

use crate::models::Node;
use crate::tree::forest::Forest;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

/// A node with its children embedded
///
/// Serializes as the node's own fields plus a `children` array. Serializing
/// and dropping walk the tree with an explicit stack, so chain depth is not
/// bounded by the thread's stack.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedNode {
    pub node: Node,
    pub children: Vec<NestedNode>,
}

impl NestedNode {
    /// Number of nodes in this subtree, including itself
    pub fn size(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            total += 1;
            stack.extend(current.children.iter());
        }
        total
    }

    /// Render this subtree as a JSON object
    pub fn to_json(&self) -> serde_json::Result<String> {
        enum Step<'a> {
            Open(&'a NestedNode),
            Comma,
            Close,
        }

        let mut out = String::new();
        let mut steps = vec![Step::Open(self)];

        while let Some(step) = steps.pop() {
            match step {
                Step::Open(nested) => {
                    let fields = serde_json::to_string(&nested.node)?;
                    let body = fields.strip_suffix('}').ok_or_else(|| {
                        serde_json::Error::custom("node did not serialize as an object")
                    })?;
                    out.push_str(body);
                    if !body.ends_with('{') {
                        out.push(',');
                    }
                    out.push_str("\"children\":[");

                    steps.push(Step::Close);
                    for (i, child) in nested.children.iter().enumerate().rev() {
                        steps.push(Step::Open(child));
                        if i > 0 {
                            steps.push(Step::Comma);
                        }
                    }
                }
                Step::Comma => out.push(','),
                Step::Close => out.push_str("]}"),
            }
        }

        Ok(out)
    }
}

impl Serialize for NestedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let json = self.to_json().map_err(S::Error::custom)?;
        let raw = RawValue::from_string(json).map_err(S::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl Drop for NestedNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut nested) = stack.pop() {
            stack.append(&mut nested.children);
        }
    }
}

/// Group a flat node list into nested trees
///
/// Children keep the order of `nodes` (callers pass creation order). Nodes whose
/// parent is absent from `nodes` are returned as additional roots.
pub fn build_nested_tree(nodes: Vec<Node>) -> Vec<NestedNode> {
    let forest = Forest::build(
        nodes
            .iter()
            .map(|node| (node.id.as_str(), node.parent_id.as_deref())),
    );

    let mut pending: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
    let mut built: Vec<Option<NestedNode>> = (0..forest.len()).map(|_| None).collect();

    // Children before parents
    for &member in forest.preorder.iter().rev() {
        let children = forest.children[member]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();

        if let Some(node) = pending[forest.members[member]].take() {
            built[member] = Some(NestedNode { node, children });
        }
    }

    forest
        .roots
        .iter()
        .filter_map(|&root| built[root].take())
        .collect()
}
