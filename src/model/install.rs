//! Install records: where a commit carries copies of the project.
//!
//! Paths are rooted at `/` and always end with `/`, so a subdirectory path
//! is built by plain concatenation (`/tags/` + `v1.0` -> `/tags/v1.0/`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ObjectId;

/// Path of the root directory of a commit
pub const ROOT_PATH: &str = "/";

/// Path of the subdirectory `name` under `parent`
pub fn child_path(parent: &str, name: &str) -> String {
    format!("{parent}{name}/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallKind {
    /// Wrapper directory holding the canonical project directory
    Full,
    /// Bare copy of the inner project directory
    Partial,
}

impl InstallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InstallKind::Full => "full",
            InstallKind::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full" => Some(InstallKind::Full),
            "partial" => Some(InstallKind::Partial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Install {
    Full(ObjectId),
    Partial(ObjectId),
}

impl Install {
    pub fn new(kind: InstallKind, tree: ObjectId) -> Self {
        match kind {
            InstallKind::Full => Install::Full(tree),
            InstallKind::Partial => Install::Partial(tree),
        }
    }

    pub fn kind(&self) -> InstallKind {
        match self {
            Install::Full(_) => InstallKind::Full,
            Install::Partial(_) => InstallKind::Partial,
        }
    }

    pub fn tree(&self) -> ObjectId {
        match *self {
            Install::Full(tree) | Install::Partial(tree) => tree,
        }
    }
}

/// Every install discovered in one commit, keyed by path.
///
/// Serialized as two maps (`full` and `partial`) which is the checkpoint
/// layout; in memory each path carries exactly one classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "InstallMaps", into = "InstallMaps")]
pub struct CommitSurvey {
    installs: BTreeMap<String, Install>,
}

impl CommitSurvey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an install. The first classification of a path wins;
    /// returns false when the path was already classified.
    pub fn record(&mut self, path: impl Into<String>, install: Install) -> bool {
        match self.installs.entry(path.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(install);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<Install> {
        self.installs.get(path).copied()
    }

    /// Tree at `path`, only if it was classified as `kind`
    pub fn tree_at(&self, path: &str, kind: InstallKind) -> Option<ObjectId> {
        self.get(path)
            .filter(|install| install.kind() == kind)
            .map(|install| install.tree())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Install)> + '_ {
        self.installs.iter().map(|(path, install)| (path.as_str(), *install))
    }

    /// True when `path` is the inner project directory of a full install
    /// recorded in this same commit.
    pub fn is_inner_of_full(&self, path: &str, project_dir: &str) -> bool {
        let Some(parent) = path
            .strip_suffix('/')
            .and_then(|p| p.strip_suffix(project_dir))
        else {
            return false;
        };
        matches!(self.get(parent), Some(Install::Full(_)))
    }

    pub fn len(&self) -> usize {
        self.installs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installs.is_empty()
    }
}

#[derive(Default, Serialize, Deserialize)]
struct InstallMaps {
    #[serde(default)]
    full: BTreeMap<String, ObjectId>,
    #[serde(default)]
    partial: BTreeMap<String, ObjectId>,
}

impl From<InstallMaps> for CommitSurvey {
    fn from(maps: InstallMaps) -> Self {
        let mut survey = CommitSurvey::new();
        for (path, tree) in maps.full {
            survey.record(path, Install::Full(tree));
        }
        for (path, tree) in maps.partial {
            survey.record(path, Install::Partial(tree));
        }
        survey
    }
}

impl From<CommitSurvey> for InstallMaps {
    fn from(survey: CommitSurvey) -> Self {
        let mut maps = InstallMaps::default();
        for (path, install) in survey.installs {
            match install {
                Install::Full(tree) => maps.full.insert(path, tree),
                Install::Partial(tree) => maps.partial.insert(path, tree),
            };
        }
        maps
    }
}
