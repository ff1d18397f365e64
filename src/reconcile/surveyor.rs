//! Tree survey: find every copy of the project inside a commit
//!
//! The walk uses an explicit worklist. Once a directory is classified as
//! an install nothing beneath it is visited, which keeps the number of
//! tree lookups per commit close to the number of install wrappers.

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;

use crate::model::{CommitSurvey, Install, ObjectId, ROOT_PATH, child_path};
use crate::repository::ObjectStore;

/// Names that identify a project install
#[derive(Debug, Clone, Copy)]
pub struct InstallLayout<'a> {
    /// Subdirectory that makes its parent a full install
    pub project_dir: &'a str,
    /// File that makes its directory a partial install
    pub marker_file: &'a str,
}

/// Survey the tree rooted at `root`.
///
/// A directory holding `project_dir` is a full install; its project
/// directory is also recorded as a partial install one level down. Failing
/// that, a directory holding `marker_file` is a partial install. Anything
/// else is descended into.
pub fn survey_tree(
    store: &impl ObjectStore,
    root: ObjectId,
    layout: &InstallLayout<'_>,
) -> Result<CommitSurvey> {
    let mut survey = CommitSurvey::new();
    let mut worklist = vec![(root, ROOT_PATH.to_string())];

    while let Some((tree, path)) = worklist.pop() {
        let entries = store.tree_entries(tree)?;

        if let Some(project) = entries
            .iter()
            .find(|e| e.is_tree() && e.name == layout.project_dir)
        {
            survey.record(child_path(&path, layout.project_dir), Install::Partial(project.id));
            survey.record(path, Install::Full(tree));
            continue;
        }

        if entries
            .iter()
            .any(|e| e.is_blob() && e.name == layout.marker_file)
        {
            survey.record(path, Install::Partial(tree));
            continue;
        }

        // Reverse so subdirectories pop in tree order
        for entry in entries.iter().rev().filter(|e| e.is_tree()) {
            worklist.push((entry.id, child_path(&path, &entry.name)));
        }
    }

    Ok(survey)
}

/// Survey the tree of `commit`
pub fn survey_commit(
    store: &impl ObjectStore,
    commit: ObjectId,
    layout: &InstallLayout<'_>,
) -> Result<CommitSurvey> {
    let meta = store.commit_metadata(commit)?;
    survey_tree(store, meta.tree, layout)
        .with_context(|| format!("Failed to survey commit {commit}"))
}

/// Bounded worker pool for surveys.
///
/// Each worker opens its own store handle; results are handed back per
/// batch so the caller is the only writer to the checkpoint.
pub struct SurveyPool {
    pool: rayon::ThreadPool,
}

impl SurveyPool {
    /// `threads == 0` lets rayon pick the thread count
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("survey-{i}"))
            .build()
            .context("Failed to start survey workers")?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Survey one batch, returning an outcome per commit in batch order
    pub fn survey_batch<S, F>(
        &self,
        open: F,
        batch: &[ObjectId],
        layout: &InstallLayout<'_>,
    ) -> Vec<(ObjectId, Result<CommitSurvey>)>
    where
        S: ObjectStore,
        F: Fn() -> Result<S> + Sync + Send,
    {
        self.pool.install(|| {
            batch
                .par_iter()
                .map_init(&open, |store, &commit| {
                    let outcome = match store {
                        Ok(store) => survey_commit(&*store, commit, layout),
                        Err(e) => Err(anyhow!("worker could not open the store: {e:#}")),
                    };
                    (commit, outcome)
                })
                .collect()
        })
    }
}
