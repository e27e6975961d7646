//! Codebase viewer state: the file tree of a sandbox plus the file the user
//! is reading.
//!
//! Methods take `&self` so the viewer can sit behind an `Arc` and be read by
//! a renderer while a listing or content fetch is in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentx_client::FileContent;
use tracing::{debug, warn};

use crate::source::FileSource;
use crate::tree::{
    ExpansionState, FileTreeNode, TreeRow, build_file_tree, find_node, toggle_expanded,
    visible_rows,
};

/// Shown in place of the tree when the listing cannot be fetched.
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load files";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

#[derive(Debug)]
struct ViewerState {
    tree: Vec<Arc<FileTreeNode>>,
    expansion: ExpansionState,
    load_state: LoadState,
    selected: Option<FileContent>,
    // Latest content request; older responses are dropped.
    selection_seq: u64,
    loading_content: bool,
    refresh_seq: u64,
}

pub struct CodebaseViewer {
    source: Arc<dyn FileSource>,
    state: Mutex<ViewerState>,
}

impl CodebaseViewer {
    pub fn new(source: Arc<dyn FileSource>) -> Self {
        Self {
            source,
            state: Mutex::new(ViewerState {
                tree: Vec::new(),
                expansion: ExpansionState::new(),
                load_state: LoadState::Idle,
                selected: None,
                selection_seq: 0,
                loading_content: false,
                refresh_seq: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ViewerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the listing and rebuilds the tree, keeping directories that
    /// were expanded before.
    pub async fn refresh(&self) {
        let seq = {
            let mut state = self.state();
            state.refresh_seq += 1;
            state.load_state = LoadState::Loading;
            state.refresh_seq
        };

        let listing = self.source.list_files().await;

        let mut state = self.state();
        if state.refresh_seq != seq {
            debug!(seq, "stale listing dropped");
            return;
        }
        match listing {
            Ok(entries) => {
                let tree = build_file_tree(&entries);
                state.expansion.retain_present(&tree);
                state.tree = state.expansion.apply(&tree);
                state.load_state = LoadState::Loaded;
                debug!(entries = entries.len(), roots = state.tree.len(), "file tree rebuilt");
            }
            Err(error) => {
                warn!(%error, "failed to load file listing");
                state.tree.clear();
                state.load_state = LoadState::Failed(LOAD_FAILED_MESSAGE.to_string());
            }
        }
    }

    /// Expands or collapses the directory at `path`. Files are ignored.
    pub fn toggle(&self, path: &str) {
        let mut state = self.state();
        let Some(node) = find_node(&state.tree, path) else {
            return;
        };
        if !node.is_dir() {
            return;
        }
        state.tree = toggle_expanded(&state.tree, path);
        state.expansion.toggle(path);
    }

    /// Directories toggle; files load their content.
    ///
    /// Every file selection fetches again. When the fetch fails the previous
    /// selection stays in place.
    pub async fn select(&self, path: &str) {
        let seq = {
            let mut state = self.state();
            match find_node(&state.tree, path).map(|n| n.is_dir()) {
                None => {
                    debug!(path, "selected path not in tree");
                    return;
                }
                Some(true) => {
                    drop(state);
                    self.toggle(path);
                    return;
                }
                Some(false) => {}
            }
            state.selection_seq += 1;
            state.loading_content = true;
            state.selection_seq
        };

        let fetched = self.source.read_file(path).await;

        let mut state = self.state();
        if state.selection_seq != seq {
            debug!(path, "stale file content dropped");
            return;
        }
        state.loading_content = false;
        match fetched {
            Ok(content) => state.selected = Some(content),
            Err(error) => warn!(path, %error, "failed to load file content"),
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.state().load_state.clone()
    }

    pub fn tree(&self) -> Vec<Arc<FileTreeNode>> {
        self.state().tree.clone()
    }

    /// Rows to render, children of collapsed directories omitted.
    pub fn rows(&self) -> Vec<TreeRow> {
        visible_rows(&self.state().tree)
    }

    pub fn selected(&self) -> Option<FileContent> {
        self.state().selected.clone()
    }

    pub fn is_loading_content(&self) -> bool {
        self.state().loading_content
    }
}
