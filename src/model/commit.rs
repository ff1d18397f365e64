use serde::{Deserialize, Serialize};

use super::ObjectId;

/// Git mode for a regular file entry
pub const MODE_BLOB: u32 = 0o100644;
/// Git mode for a subdirectory entry
pub const MODE_TREE: u32 = 0o040000;

/// Seconds since the epoch plus the recorded timezone offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub offset_minutes: i32,
}

/// Author or committer identity.
///
/// `time` is `None` for synthetic identities; the store stamps those with
/// the current time when the commit is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub time: Option<Timestamp>,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time: None,
        }
    }

    pub fn at(mut self, seconds: i64, offset_minutes: i32) -> Self {
        self.time = Some(Timestamp { seconds, offset_minutes });
        self
    }
}

/// Everything the reconciler needs to know about an existing commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Option<Signature>,
    pub committer: Option<Signature>,
    pub message: String,
}

/// Request to write a new commit
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub message: String,
    pub author: Signature,
    pub committer: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule links and anything else we never descend into
    Other,
}

/// One immediate child of a tree object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: u32,
    pub kind: EntryKind,
    pub id: ObjectId,
    pub name: String,
}

impl TreeEntry {
    pub fn blob(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode: MODE_BLOB,
            kind: EntryKind::Blob,
            id,
            name: name.into(),
        }
    }

    pub fn tree(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode: MODE_TREE,
            kind: EntryKind::Tree,
            id,
            name: name.into(),
        }
    }

    pub fn is_tree(&self) -> bool {
        self.kind == EntryKind::Tree
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}
