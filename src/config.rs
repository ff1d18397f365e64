//! Reconciliation settings
//!
//! Everything that describes the layout of one particular imported
//! repository lives here, including the hand-maintained override tables,
//! so the algorithm itself carries no repository-specific knowledge.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::{Signature, Version};
use crate::reconcile::InstallLayout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Branch that every other branch is cross-referenced against
    pub main_line: String,
    /// Only branches under this prefix are collected
    pub branch_prefix: String,
    /// Name of the canonical top-level project directory
    pub project_dir: String,
    /// File that marks a bare copy of the project directory
    pub marker_file: String,
    /// Leading text of a release directory name (`v` in `v2.4.2`)
    pub version_prefix: String,
    pub release_tag_prefix: String,
    /// Branch holding the chain of synthesized release commits
    pub legacy_branch: String,
    pub identity: Identity,
    pub placeholder: Placeholder,
    /// Subhistory name -> release version, for releases filed under a
    /// name that does not carry their version
    pub version_overrides: BTreeMap<String, String>,
    /// Subhistory name -> reference whose commit is the branch point
    pub branch_ancestors: BTreeMap<String, String>,
    pub relinks: Vec<Relink>,
    pub survey: SurveySettings,
}

/// Author and committer used for synthesized commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Identity {
    pub fn signature(&self) -> Signature {
        Signature::new(&self.name, &self.email)
    }
}

/// Entry placed next to the project directory when a bare copy is
/// promoted to a full install
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    pub contents: String,
}

/// A branch whose history was severed at the source; its commits are
/// replayed on top of `onto`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relink {
    pub branch: String,
    pub onto: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveySettings {
    /// Worker threads; 0 lets rayon decide
    pub threads: usize,
    /// Commits per worker batch, also the checkpoint granularity
    pub batch_size: usize,
}

impl Default for SurveySettings {
    fn default() -> Self {
        Self {
            threads: 0,
            batch_size: 64,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            main_line: "svn/trunk".to_string(),
            branch_prefix: "svn/".to_string(),
            project_dir: "vice".to_string(),
            marker_file: "README".to_string(),
            version_prefix: "v".to_string(),
            release_tag_prefix: "release/".to_string(),
            legacy_branch: "legacy_releases".to_string(),
            identity: Identity {
                name: "Release Reconciler".to_string(),
                email: "reconciler@localhost".to_string(),
            },
            placeholder: Placeholder {
                name: "svn-instructions.txt".to_string(),
                contents: "This tree was reconstructed from a copy of the project directory.\n"
                    .to_string(),
            },
            version_overrides: BTreeMap::new(),
            branch_ancestors: BTreeMap::new(),
            relinks: Vec::new(),
            survey: SurveySettings::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn layout(&self) -> InstallLayout<'_> {
        InstallLayout {
            project_dir: &self.project_dir,
            marker_file: &self.marker_file,
        }
    }

    /// Name of the branch created for a subhistory:
    /// `svn/amatthies/current/` -> `amatthies/current`
    pub fn display_name(&self, subhistory: &str) -> String {
        subhistory
            .strip_prefix(&self.branch_prefix)
            .unwrap_or(subhistory)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn release_tag(&self, version: &Version) -> String {
        format!("{}{}", self.release_tag_prefix, version.tag_name())
    }

    pub fn is_relinked(&self, branch: &str) -> bool {
        self.relinks.iter().any(|r| r.branch == branch)
    }
}
