//! Decision-tree construction (spec §4.D). A tree is built fresh for each
//! generation's chunk, then flattened into persisted `treenode`/`rule`/
//! `leaf_info` rows by [`crate::forest`].

pub mod build;
pub mod engine;
pub mod node;
pub mod rule;

pub use build::{derive_confusion_matrix, TreeBuilder};
pub use node::{Node, Tree};
pub use rule::{Rule, RuleType, ValueType};
