//! Object store service
//!
//! The narrow surface the reconciler needs from the version-control
//! backend. Everything above this trait deals in `ObjectId`s only.

use anyhow::Result;
use rustc_hash::FxHashSet;

use crate::model::{CommitMeta, NewCommit, ObjectId, TreeEntry};

pub trait ObjectStore {
    /// Branch names starting with `prefix`, sorted
    fn list_refs(&self, prefix: &str) -> Result<Vec<String>>;

    /// Commits reachable from `reference`, newest first. The walk stops
    /// after the first commit found in `stop`, which is included.
    fn log(&self, reference: &str, stop: &FxHashSet<ObjectId>) -> Result<Vec<ObjectId>>;

    /// Commit a reference points at, `None` if the reference does not exist
    fn resolve(&self, reference: &str) -> Result<Option<ObjectId>>;

    fn commit_metadata(&self, commit: ObjectId) -> Result<CommitMeta>;

    /// Immediate entries of a tree, in tree order
    fn tree_entries(&self, tree: ObjectId) -> Result<Vec<TreeEntry>>;

    fn write_blob(&self, contents: &[u8]) -> Result<ObjectId>;

    fn compose_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId>;

    fn create_commit(&self, commit: &NewCommit) -> Result<ObjectId>;

    fn create_tag(&self, name: &str, commit: ObjectId) -> Result<()>;

    /// Create `name` at `commit`; an existing branch is only moved when
    /// `force` is set
    fn create_branch(&self, name: &str, commit: ObjectId, force: bool) -> Result<()>;
}
