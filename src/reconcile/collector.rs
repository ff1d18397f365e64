//! Branch history collection
//!
//! The main line is walked in full first; its commits then terminate every
//! other walk, so shared ancestry is never walked twice.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::ReconcileConfig;
use crate::model::ObjectId;
use crate::repository::ObjectStore;

use super::progress::ProgressReporter;
use super::report::{Issue, Report};

/// Newest-first commits of `branch`, ending at (and including) the first
/// terminator met, or at the root
pub fn branch_history(
    store: &impl ObjectStore,
    branch: &str,
    terminators: &FxHashSet<ObjectId>,
) -> Result<Vec<ObjectId>> {
    store.log(branch, terminators)
}

/// Collect the history of the main line and of every branch under the
/// configured prefix. A branch that cannot be walked is reported and left
/// out; failing to walk the main line is fatal.
pub fn collect_histories(
    store: &impl ObjectStore,
    config: &ReconcileConfig,
    progress: &dyn ProgressReporter,
    report: &mut Report,
) -> Result<BTreeMap<String, Vec<ObjectId>>> {
    let mut histories = BTreeMap::new();

    let main = branch_history(store, &config.main_line, &FxHashSet::default())
        .with_context(|| format!("Failed to walk main line {}", config.main_line))?;
    let terminators: FxHashSet<ObjectId> = main.iter().copied().collect();
    debug!("{} has {} commits", config.main_line, main.len());
    histories.insert(config.main_line.clone(), main);

    let branches: Vec<String> = store
        .list_refs(&config.branch_prefix)?
        .into_iter()
        .filter(|name| *name != config.main_line)
        .collect();

    let pb = progress.start("Collecting", branches.len() as u64);
    for branch in branches {
        pb.set_message(&branch);
        match branch_history(store, &branch, &terminators) {
            Ok(commits) => {
                debug!("{} has {} branch-specific commits", branch, commits.len());
                histories.insert(branch, commits);
            }
            Err(e) => report.push(Issue::BranchUnreadable {
                branch,
                reason: format!("{e:#}"),
            }),
        }
        pb.inc(1);
    }
    pb.finish();

    Ok(histories)
}
