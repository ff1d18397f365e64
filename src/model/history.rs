use serde::Serialize;

use super::{InstallKind, ObjectId};

/// Content timeline of one path within one imported branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subhistory {
    /// Branch name joined with the path, e.g. `svn/tags/v1.0/`
    pub name: String,
    pub branch: String,
    pub path: String,
    pub kind: InstallKind,
    /// Distinct trees observed at `path`, oldest first, runs collapsed
    pub trees: Vec<ObjectId>,
    pub linkage: Linkage,
    pub correlation: Correlation,
}

impl Subhistory {
    pub fn new(branch: &str, path: &str, kind: InstallKind, first: ObjectId) -> Self {
        Self {
            name: format!("{branch}{path}"),
            branch: branch.to_string(),
            path: path.to_string(),
            kind,
            trees: vec![first],
            linkage: Linkage::default(),
            correlation: Correlation::default(),
        }
    }

    /// Append `tree` unless it repeats the latest entry.
    /// Returns whether anything was appended.
    pub fn observe(&mut self, tree: ObjectId) -> bool {
        if self.trees.last() == Some(&tree) {
            return false;
        }
        self.trees.push(tree);
        true
    }

    pub fn oldest(&self) -> Option<ObjectId> {
        self.trees.first().copied()
    }

    pub fn newest(&self) -> Option<ObjectId> {
        self.trees.last().copied()
    }

    pub fn is_partial(&self) -> bool {
        self.kind == InstallKind::Partial
    }

    /// Last path segment of the name (`svn/tags/v1.0/` -> `v1.0`)
    pub fn terminal_segment(&self) -> &str {
        self.name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// Collapse consecutive duplicates, keeping order
pub fn collapse_runs(trees: &[ObjectId]) -> Vec<ObjectId> {
    let mut out = trees.to_vec();
    out.dedup();
    out
}

/// Main-line commits whose content equals the oldest and newest
/// entries of a subhistory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Linkage {
    pub branched_from: Option<ObjectId>,
    pub merged_to: Option<ObjectId>,
}

/// Original commits that introduced each tree of a subhistory.
///
/// `commits[i]` introduced `trees[i]`; matching is sequential, so when it
/// falls short every entry past `commits.len()` lacks a source commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Correlation {
    pub commits: Vec<ObjectId>,
    pub expected: usize,
}

impl Correlation {
    pub fn is_complete(&self) -> bool {
        self.commits.len() == self.expected
    }

    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.commits.len())
    }

    pub fn commit_for(&self, index: usize) -> Option<ObjectId> {
        self.commits.get(index).copied()
    }
}
