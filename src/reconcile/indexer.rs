//! Cross-reference index
//!
//! Maps main-line content to main-line commits, folds every other branch
//! into per-path subhistories and links each subhistory back to the main
//! line and to the original commits that produced it.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ReconcileConfig;
use crate::model::{
    CommitSurvey, Correlation, Install, InstallKind, Linkage, ObjectId, ROOT_PATH, Subhistory,
    child_path,
};
use crate::repository::Checkpoint;

use super::report::{Issue, Report};

/// Tree hash -> earliest main-line commit carrying it
#[derive(Debug, Default)]
pub struct MainLineIndex {
    full: FxHashMap<ObjectId, ObjectId>,
    partial: FxHashMap<ObjectId, ObjectId>,
}

impl MainLineIndex {
    /// `history` is newest first, as collected. It is indexed oldest
    /// first and the first commit to claim a tree keeps it.
    pub fn build(
        history: &[ObjectId],
        surveys: &BTreeMap<ObjectId, CommitSurvey>,
        project_dir: &str,
    ) -> Self {
        let mut index = Self::default();
        let inner = child_path(ROOT_PATH, project_dir);

        for commit in history.iter().rev() {
            let Some(survey) = surveys.get(commit) else {
                continue;
            };
            // Early imports have no install at the root at all
            let Some(Install::Full(tree)) = survey.get(ROOT_PATH) else {
                continue;
            };
            index.full.entry(tree).or_insert(*commit);
            if let Some(Install::Partial(tree)) = survey.get(&inner) {
                index.partial.entry(tree).or_insert(*commit);
            }
        }
        index
    }

    pub fn lookup(&self, kind: InstallKind, tree: ObjectId) -> Option<ObjectId> {
        match kind {
            InstallKind::Full => self.full.get(&tree).copied(),
            InstallKind::Partial => self.partial.get(&tree).copied(),
        }
    }

    pub fn linkage(&self, sub: &Subhistory) -> Linkage {
        Linkage {
            branched_from: sub.oldest().and_then(|t| self.lookup(sub.kind, t)),
            merged_to: sub.newest().and_then(|t| self.lookup(sub.kind, t)),
        }
    }

    pub fn len(&self) -> usize {
        self.full.len()
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }
}

/// Output of the indexing phase
#[derive(Debug, Default, Serialize)]
pub struct Index {
    #[serde(skip)]
    pub main_line: MainLineIndex,
    pub subhistories: BTreeMap<String, Subhistory>,
}

impl Index {
    pub fn incomplete(&self) -> impl Iterator<Item = &Subhistory> + '_ {
        self.subhistories
            .values()
            .filter(|s| !s.correlation.is_complete())
    }
}

/// Fold every non-main branch into subhistories keyed by `branch + path`.
///
/// Commits are replayed oldest first. The inner project directory of a
/// full install never forms a subhistory of its own, and a path keeps the
/// kind it was first seen with.
pub fn fold_subhistories(
    checkpoint: &Checkpoint,
    config: &ReconcileConfig,
) -> BTreeMap<String, Subhistory> {
    let mut subhistories: BTreeMap<String, Subhistory> = BTreeMap::new();

    for (branch, commits) in &checkpoint.branch_history {
        if *branch == config.main_line {
            continue;
        }
        for commit in commits.iter().rev() {
            let Some(survey) = checkpoint.survey(commit) else {
                continue;
            };
            for (path, install) in survey.iter() {
                if install.kind() == InstallKind::Partial
                    && survey.is_inner_of_full(path, &config.project_dir)
                {
                    continue;
                }
                let name = format!("{branch}{path}");
                match subhistories.get_mut(&name) {
                    None => {
                        if install.kind() == InstallKind::Partial {
                            debug!("{name} is a partial install");
                        }
                        subhistories.insert(
                            name,
                            Subhistory::new(branch, path, install.kind(), install.tree()),
                        );
                    }
                    Some(sub) if sub.kind == install.kind() => {
                        sub.observe(install.tree());
                    }
                    Some(sub) => debug!(
                        "{} changes from {} to {} at {}, ignored",
                        name,
                        sub.kind.as_str(),
                        install.kind().as_str(),
                        commit.short()
                    ),
                }
            }
        }
    }

    subhistories
}

/// Find the commits of `branch_commits` (newest first) that introduced
/// each tree of `sub`, scanning oldest to newest.
pub fn correlate(
    sub: &Subhistory,
    branch_commits: &[ObjectId],
    surveys: &BTreeMap<ObjectId, CommitSurvey>,
) -> Correlation {
    let mut commits = Vec::with_capacity(sub.trees.len());
    for commit in branch_commits.iter().rev() {
        let Some(&target) = sub.trees.get(commits.len()) else {
            break;
        };
        let tree = surveys
            .get(commit)
            .and_then(|s| s.tree_at(&sub.path, sub.kind));
        if tree == Some(target) {
            commits.push(*commit);
        }
    }
    Correlation {
        commits,
        expected: sub.trees.len(),
    }
}

/// Every history commit without a survey loses its content from the
/// index; report each one once, under the first branch that names it
fn report_unsurveyed(checkpoint: &Checkpoint, report: &mut Report) {
    let mut seen = FxHashSet::default();
    for (branch, commits) in &checkpoint.branch_history {
        for commit in commits {
            if checkpoint.survey(commit).is_none() && seen.insert(*commit) {
                report.push(Issue::Unsurveyed {
                    commit: *commit,
                    branch: branch.clone(),
                });
            }
        }
    }
}

/// Build the full cross-reference index from a checkpoint
pub fn build_index(checkpoint: &Checkpoint, config: &ReconcileConfig, report: &mut Report) -> Index {
    let main_history = checkpoint
        .branch_history
        .get(&config.main_line)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let main_line = MainLineIndex::build(main_history, &checkpoint.commit_trees, &config.project_dir);

    report_unsurveyed(checkpoint, report);

    let mut subhistories = fold_subhistories(checkpoint, config);
    for sub in subhistories.values_mut() {
        sub.linkage = main_line.linkage(sub);
        let commits = checkpoint
            .branch_history
            .get(&sub.branch)
            .map(Vec::as_slice)
            .unwrap_or_default();
        sub.correlation = correlate(sub, commits, &checkpoint.commit_trees);
        if !sub.correlation.is_complete() {
            report.push(Issue::IncompleteCorrelation {
                subhistory: sub.name.clone(),
                missing: sub.correlation.missing(),
            });
        }
    }

    Index {
        main_line,
        subhistories,
    }
}
