//! Pure algorithms over a flat node snapshot: nested tree building and auto-layout.
//!
//! Nothing in this module touches the store or suspends.

pub(crate) mod forest;
mod layout;
mod nested;

pub use layout::{calculate_tree_layout, LayoutConfig, LayoutInput, LayoutPosition};
pub use nested::{build_nested_tree, NestedNode};
