//! Repository history reconciliation
//!
//! Rebuilds release tags and branches for a repository imported from a
//! system that stored them as copied directories.
//!
//! # Architecture
//!
//! Phases run strictly in order, each consuming the previous one's output:
//!
//! - **collector**: branch histories, main line first
//! - **surveyor**: project installs per commit, on a worker pool
//! - **indexer**: main-line content index, subhistories, linkage, correlation
//! - **releases**: ordered release records
//! - **synthesizer**: new commits, tags and branches (destructive, run once)
//!
//! Supporting layers:
//!
//! - **progress**: progress reporting abstraction
//! - **report**: non-fatal issues collected over a run

mod collector;
mod indexer;
mod progress;
mod releases;
mod report;
mod surveyor;
mod synthesizer;

pub use collector::{branch_history, collect_histories};
pub use indexer::{Index, MainLineIndex, build_index, correlate, fold_subhistories};
pub use progress::{NoopProgress, ProgressHandle, ProgressReporter, VerboseProgress};
pub use releases::{Releases, reconcile_releases};
pub use report::{Issue, Report, Severity};
pub use surveyor::{InstallLayout, SurveyPool, survey_commit, survey_tree};
pub use synthesizer::{SynthesisSummary, Synthesizer};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::ReconcileConfig;
use crate::repository::{Checkpoint, CheckpointStore, GitStore};

/// Drives the reconciliation phases against one repository
pub struct Reconciler {
    repo_path: PathBuf,
    config: ReconcileConfig,
    verbose: bool,
    profile: bool,
}

impl Reconciler {
    pub fn new(repo_path: impl Into<PathBuf>, config: ReconcileConfig) -> Self {
        Self {
            repo_path: repo_path.into(),
            config,
            verbose: true,
            profile: false,
        }
    }

    /// Create a quiet reconciler (no progress bars, used by tests and benchmarks)
    pub fn quiet(repo_path: impl Into<PathBuf>, config: ReconcileConfig) -> Self {
        Self {
            verbose: false,
            ..Self::new(repo_path, config)
        }
    }

    /// Print per-phase timings
    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn open_store(&self) -> Result<GitStore> {
        GitStore::open(&self.repo_path)
    }

    /// Collect branch histories and survey every commit the checkpoint
    /// does not know yet. Each worker batch is appended to the checkpoint
    /// as soon as it completes.
    pub async fn survey(
        &self,
        checkpoints: &impl CheckpointStore,
        report: &mut Report,
    ) -> Result<Checkpoint> {
        let progress = VerboseProgress::new(self.verbose && !self.profile);

        self.log(&format!("Opening repository at {}", self.repo_path.display()));
        let store = self.open_store()?;

        let phase_start = Instant::now();
        let history = collect_histories(&store, &self.config, &progress, report)?;
        self.profile_phase(&format!("Collect histories ({} branches)", history.len()), phase_start);
        checkpoints.save_branch_history(&history).await?;

        let mut checkpoint = checkpoints.load_checkpoint().await?;
        checkpoint.branch_history = history;
        let pending = checkpoint.unsurveyed();
        self.log(&format!(
            "{} unique commits, {} new to survey",
            checkpoint.unique_commits().len(),
            pending.len()
        ));
        if pending.is_empty() {
            return Ok(checkpoint);
        }

        let phase_start = Instant::now();
        let pool = Arc::new(SurveyPool::new(self.config.survey.threads)?);
        let threads = pool.threads();
        let config = Arc::new(self.config.clone());
        let pb = progress.start("Surveying", pending.len() as u64);
        for batch in pending.chunks(self.config.survey.batch_size.max(1)) {
            // Keep the rayon batch off the async runtime's worker threads
            let outcomes = {
                let pool = Arc::clone(&pool);
                let config = Arc::clone(&config);
                let repo_path = self.repo_path.clone();
                let batch = batch.to_vec();
                tokio::task::spawn_blocking(move || {
                    pool.survey_batch(|| GitStore::open(&repo_path), &batch, &config.layout())
                })
                .await
                .context("Survey worker panicked")?
            };

            let mut surveyed = Vec::with_capacity(outcomes.len());
            for (commit, outcome) in outcomes {
                match outcome {
                    Ok(survey) => surveyed.push((commit, survey)),
                    Err(e) => report.push(Issue::SurveyFailed {
                        commit,
                        reason: format!("{e:#}"),
                    }),
                }
            }
            checkpoints.append_surveys(&surveyed).await?;
            checkpoint.commit_trees.extend(surveyed);
            pb.inc(batch.len() as u64);
        }
        pb.finish();
        self.profile_phase(
            &format!("Survey {} commits on {} workers", pending.len(), threads),
            phase_start,
        );

        Ok(checkpoint)
    }

    pub fn index(&self, checkpoint: &Checkpoint, report: &mut Report) -> Index {
        let phase_start = Instant::now();
        let index = build_index(checkpoint, &self.config, report);
        self.profile_phase(
            &format!("Index ({} subhistories)", index.subhistories.len()),
            phase_start,
        );
        index
    }

    pub fn reconcile(&self, index: &Index, report: &mut Report) -> Releases {
        reconcile_releases(index, &self.config, report)
    }

    /// Write the reconciled history into the repository. Not safe to run
    /// twice against the same repository.
    pub fn synthesize(
        &self,
        index: &mut Index,
        releases: &Releases,
        report: &mut Report,
    ) -> Result<SynthesisSummary> {
        let phase_start = Instant::now();
        let store = self.open_store()?;
        let summary = Synthesizer::new(&store, &self.config).run(index, releases, report)?;
        self.profile_phase("Synthesize", phase_start);
        Ok(summary)
    }

    fn log(&self, msg: &str) {
        if self.verbose {
            info!("{}", msg);
        }
    }

    fn profile_phase(&self, name: &str, start: Instant) {
        if self.profile {
            eprintln!("[PROFILE] {}: {:?}", name, start.elapsed());
        }
    }
}
