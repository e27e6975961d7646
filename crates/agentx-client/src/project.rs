//! Project and sandbox file models returned by the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: uuid::Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sandbox attached to the project, once one has been started.
    #[serde(default)]
    pub sandbox_id: Option<String>,
}

/// Kind of a sandbox filesystem entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// Anything else the sandbox reports (sockets, devices, ...). Shown as a file.
    #[serde(other)]
    Other,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, Self::Dir)
    }
}

/// One entry of a flat sandbox listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub path: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub mode: Option<u32>,
    #[serde(default)]
    pub permissions: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub symlink_target: Option<String>,
}

impl FileEntry {
    /// Creates an entry with only the fields the tree needs.
    pub fn new(path: impl Into<String>, name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            size: None,
            mode: None,
            permissions: None,
            owner: None,
            group: None,
            modified_time: None,
            symlink_target: None,
        }
    }

    pub fn file(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(path, name, EntryKind::File)
    }

    pub fn dir(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(path, name, EntryKind::Dir)
    }
}

/// Text content of one sandbox file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
}
