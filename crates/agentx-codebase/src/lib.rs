//! Codebase view of an AgentX sandbox.
//!
//! [`build_file_tree`] turns the sandbox's flat listing into a sorted tree;
//! [`CodebaseViewer`] keeps that tree, its expansion, and the selected file's
//! content, reading through a [`FileSource`].

pub mod source;
pub mod tree;
pub mod viewer;

pub use source::{FileSource, SandboxFiles};
pub use tree::{
    ExpansionState, FileTreeNode, NodeKind, TreeRow, build_file_tree, compare_names, find_node,
    parent_path, toggle_expanded, visible_rows,
};
pub use viewer::{CodebaseViewer, LOAD_FAILED_MESSAGE, LoadState};
