//! Flat sandbox listing to nested file tree.
//!
//! Nodes are immutable and shared through [`Arc`]. Expanding or collapsing a
//! directory copies only the path from the root down to that directory, so
//! every untouched subtree keeps its identity and a renderer can skip it with
//! [`Arc::ptr_eq`].

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agentx_client::{EntryKind, FileEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Dir,
}

impl From<EntryKind> for NodeKind {
    fn from(kind: EntryKind) -> Self {
        if kind.is_dir() {
            NodeKind::Dir
        } else {
            NodeKind::File
        }
    }
}

/// One file or directory of the tree. Identity is the path.
#[derive(Clone, Debug, PartialEq)]
pub struct FileTreeNode {
    pub entry: FileEntry,
    pub kind: NodeKind,
    /// Entries whose parent path is this node. Only directories show them.
    pub children: Vec<Arc<FileTreeNode>>,
    pub is_expanded: bool,
}

impl FileTreeNode {
    pub fn path(&self) -> &str {
        &self.entry.path
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    fn contains(&self, path: &str) -> bool {
        path.strip_prefix(self.path())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Parent of `path`: everything before the last `/`.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

/// Name order used at every tree level.
///
/// Case-insensitive first; on a tie the lowercase spelling sorts first
/// (`"readme" < "README" < "src"`).
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| {
        a.chars()
            .zip(b.chars())
            .find(|(x, y)| x != y)
            .map(|(x, y)| match (x.is_lowercase(), y.is_lowercase()) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => x.cmp(&y),
            })
            .unwrap_or_else(|| a.len().cmp(&b.len()))
    })
}

fn compare_nodes(a: &Arc<FileTreeNode>, b: &Arc<FileTreeNode>) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| compare_names(a.name(), b.name()))
        .then_with(|| a.path().cmp(b.path()))
}

/// Builds the nested tree for a flat listing.
///
/// An entry hangs under its parent path whenever that path is listed, even
/// when the parent is a file (such children are never shown). Entries whose
/// parent is not listed become roots. Directories sort before files, then by
/// [`compare_names`]. When a path is listed twice the first entry wins. Every
/// node starts collapsed.
pub fn build_file_tree(entries: &[FileEntry]) -> Vec<Arc<FileTreeNode>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    let mut unique = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        if index.contains_key(entry.path.as_str()) {
            tracing::debug!(path = %entry.path, "duplicate listing entry ignored");
            continue;
        }
        index.insert(entry.path.as_str(), i);
        unique.push(i);
    }

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots = Vec::new();
    for &i in &unique {
        let parent = parent_path(&entries[i].path).and_then(|p| index.get(p).copied());
        match parent {
            Some(p) => children.entry(p).or_default().push(i),
            None => roots.push(i),
        }
    }

    let mut tree: Vec<_> = roots
        .into_iter()
        .map(|i| build_node(entries, i, &children))
        .collect();
    tree.sort_by(compare_nodes);
    tree
}

fn build_node(
    entries: &[FileEntry],
    i: usize,
    children: &HashMap<usize, Vec<usize>>,
) -> Arc<FileTreeNode> {
    let mut kids: Vec<_> = children
        .get(&i)
        .map(|ids| {
            ids.iter()
                .map(|&c| build_node(entries, c, children))
                .collect()
        })
        .unwrap_or_default();
    kids.sort_by(compare_nodes);
    Arc::new(FileTreeNode {
        entry: entries[i].clone(),
        kind: entries[i].kind.into(),
        children: kids,
        is_expanded: false,
    })
}

/// Flips `is_expanded` on the directory at `path`.
///
/// Only the ancestors of that directory are rebuilt. Toggling a file or a
/// path that is not in the tree returns the same nodes.
pub fn toggle_expanded(tree: &[Arc<FileTreeNode>], path: &str) -> Vec<Arc<FileTreeNode>> {
    toggle_in(tree, path).unwrap_or_else(|| tree.to_vec())
}

fn toggle_in(nodes: &[Arc<FileTreeNode>], path: &str) -> Option<Vec<Arc<FileTreeNode>>> {
    for (i, node) in nodes.iter().enumerate() {
        let replacement = if node.path() == path {
            if !node.is_dir() {
                return None;
            }
            Arc::new(FileTreeNode {
                is_expanded: !node.is_expanded,
                ..FileTreeNode::clone(node)
            })
        } else if node.contains(path) {
            match toggle_in(&node.children, path) {
                Some(children) => Arc::new(FileTreeNode {
                    children,
                    ..FileTreeNode::clone(node)
                }),
                None => continue,
            }
        } else {
            continue;
        };
        let mut out = nodes.to_vec();
        out[i] = replacement;
        return Some(out);
    }
    None
}

/// Finds the node at `path`.
pub fn find_node<'a>(tree: &'a [Arc<FileTreeNode>], path: &str) -> Option<&'a Arc<FileTreeNode>> {
    tree.iter().find_map(|node| {
        if node.path() == path {
            Some(node)
        } else if node.contains(path) {
            find_node(&node.children, path)
        } else {
            None
        }
    })
}

/// Expanded directories, keyed by path, kept apart from the tree so the
/// expansion survives a rebuild from a fresh listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpansionState {
    expanded: HashSet<String>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the expanded directories of an existing tree.
    pub fn from_tree(tree: &[Arc<FileTreeNode>]) -> Self {
        let mut state = Self::new();
        let mut stack: Vec<&Arc<FileTreeNode>> = tree.iter().collect();
        while let Some(node) = stack.pop() {
            if node.is_expanded {
                state.expanded.insert(node.path().to_string());
            }
            stack.extend(node.children.iter());
        }
        state
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    pub fn set_expanded(&mut self, path: impl Into<String>, expanded: bool) {
        let path = path.into();
        if expanded {
            self.expanded.insert(path);
        } else {
            self.expanded.remove(&path);
        }
    }

    /// Flips `path` and returns the new flag.
    pub fn toggle(&mut self, path: &str) -> bool {
        if self.expanded.remove(path) {
            false
        } else {
            self.expanded.insert(path.to_string());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }

    /// Drops paths that are no longer directories of `tree`.
    pub fn retain_present(&mut self, tree: &[Arc<FileTreeNode>]) {
        self.expanded
            .retain(|path| find_node(tree, path).is_some_and(|n| n.is_dir()));
    }

    /// Sets every directory's flag from this map. Subtrees whose flags already
    /// match are returned as-is.
    pub fn apply(&self, tree: &[Arc<FileTreeNode>]) -> Vec<Arc<FileTreeNode>> {
        tree.iter().map(|node| self.apply_node(node)).collect()
    }

    fn apply_node(&self, node: &Arc<FileTreeNode>) -> Arc<FileTreeNode> {
        let children = self.apply(&node.children);
        let expanded = node.is_dir() && self.is_expanded(node.path());
        let unchanged = expanded == node.is_expanded
            && children
                .iter()
                .zip(node.children.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b));
        if unchanged {
            return node.clone();
        }
        Arc::new(FileTreeNode {
            children,
            is_expanded: expanded,
            ..FileTreeNode::clone(node)
        })
    }
}

/// A node as it appears in the flattened, rendered listing.
#[derive(Clone, Debug)]
pub struct TreeRow {
    pub depth: usize,
    pub node: Arc<FileTreeNode>,
}

/// Depth-first listing of the rows a renderer shows. Children of files and
/// of collapsed directories are not visited.
pub fn visible_rows(tree: &[Arc<FileTreeNode>]) -> Vec<TreeRow> {
    let mut rows = Vec::new();
    let mut stack: Vec<(usize, &Arc<FileTreeNode>)> = tree.iter().rev().map(|n| (0, n)).collect();
    while let Some((depth, node)) = stack.pop() {
        if node.is_dir() && node.is_expanded {
            stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        }
        rows.push(TreeRow {
            depth,
            node: node.clone(),
        });
    }
    rows
}
