//! History synthesis
//!
//! The only phase that writes to the store. It runs once against a freshly
//! mirrored repository: every step creates new commits, so running it
//! twice would duplicate history. Any store error aborts the run.

use anyhow::{Context, Result, bail};
use rustc_hash::FxHashSet;
use tracing::{debug, info};

use crate::config::{ReconcileConfig, Relink};
use crate::model::{InstallKind, NewCommit, ObjectId, ReleaseRecord, Subhistory, TreeEntry};
use crate::repository::ObjectStore;

use super::indexer::Index;
use super::releases::Releases;
use super::report::{Issue, Report};

/// What a synthesis run created
#[derive(Debug, Default)]
pub struct SynthesisSummary {
    /// Release tags placed directly on main-line commits
    pub tagged_main: usize,
    pub synthetic_releases: usize,
    pub legacy_tip: Option<ObjectId>,
    pub promoted: usize,
    pub skipped_merged: usize,
    /// Materialized branches and their tips
    pub branches: Vec<(String, ObjectId)>,
    pub relinked: usize,
}

pub struct Synthesizer<'a, S: ObjectStore> {
    store: &'a S,
    config: &'a ReconcileConfig,
    placeholder: Option<ObjectId>,
}

impl<'a, S: ObjectStore> Synthesizer<'a, S> {
    pub fn new(store: &'a S, config: &'a ReconcileConfig) -> Self {
        Self {
            store,
            config,
            placeholder: None,
        }
    }

    pub fn run(
        &mut self,
        index: &mut Index,
        releases: &Releases,
        report: &mut Report,
    ) -> Result<SynthesisSummary> {
        self.ensure_unprocessed(releases)?;

        let mut summary = SynthesisSummary::default();
        self.legacy_release_chain(releases, &mut summary)?;
        self.promote_partials(index, &mut summary)?;
        self.materialize_branches(index, releases, report, &mut summary)?;
        for relink in &self.config.relinks {
            if self.relink(relink, report)? {
                summary.relinked += 1;
            }
        }
        Ok(summary)
    }

    /// Refuse to touch a store that already carries our output
    fn ensure_unprocessed(&self, releases: &Releases) -> Result<()> {
        if self.store.resolve(&self.config.legacy_branch)?.is_some() {
            bail!(
                "Branch {} already exists; this repository was already reconciled",
                self.config.legacy_branch
            );
        }
        if let Some(first) = releases.records.first() {
            let tag = self.config.release_tag(&first.version);
            if self.store.resolve(&tag)?.is_some() {
                bail!("Tag {tag} already exists; this repository was already reconciled");
            }
        }
        Ok(())
    }

    /// Tag every release in version order. Releases with no main-line
    /// commit are stacked into one synthetic lineage on the legacy branch.
    pub fn legacy_release_chain(
        &mut self,
        releases: &Releases,
        summary: &mut SynthesisSummary,
    ) -> Result<()> {
        let mut previous: Option<ObjectId> = None;

        for record in &releases.records {
            let tag = self.config.release_tag(&record.version);
            let target = match record.main_commit {
                Some(commit) => {
                    summary.tagged_main += 1;
                    commit
                }
                None => {
                    let commit = self.legacy_commit(record, previous)?;
                    summary.synthetic_releases += 1;
                    previous = Some(commit);
                    commit
                }
            };
            self.store.create_tag(&tag, target)?;
            debug!("Tagged {} at {}", tag, target.short());
        }

        match previous {
            Some(tip) => {
                self.store
                    .create_branch(&self.config.legacy_branch, tip, false)?;
                summary.legacy_tip = Some(tip);
            }
            None => info!(
                "Every release is on the main line; {} not created",
                self.config.legacy_branch
            ),
        }
        Ok(())
    }

    fn legacy_commit(&mut self, record: &ReleaseRecord, parent: Option<ObjectId>) -> Result<ObjectId> {
        let tree = match record.kind {
            InstallKind::Full => record.tree,
            InstallKind::Partial => self.wrap_partial(record.tree)?,
        };
        let identity = self.config.identity.signature();
        self.store
            .create_commit(&NewCommit {
                tree,
                parents: parent.into_iter().collect(),
                message: format!("Legacy release {}", record.version.tag_name()),
                author: identity.clone(),
                committer: identity,
            })
            .with_context(|| format!("Failed to write release {}", record.version))
    }

    /// Rewrite every partial subhistory to full trees so it can be
    /// materialized like any other branch
    pub fn promote_partials(&mut self, index: &mut Index, summary: &mut SynthesisSummary) -> Result<()> {
        for sub in index.subhistories.values_mut() {
            if sub.kind != InstallKind::Partial {
                continue;
            }
            debug!("Filling out partial branch {}", sub.name);
            for tree in sub.trees.iter_mut() {
                *tree = self.wrap_partial(*tree)?;
            }
            sub.kind = InstallKind::Full;
            summary.promoted += 1;
        }
        Ok(())
    }

    /// Full tree holding the placeholder entry and `inner` as the
    /// project directory
    pub fn wrap_partial(&mut self, inner: ObjectId) -> Result<ObjectId> {
        let placeholder = match self.placeholder {
            Some(blob) => blob,
            None => {
                let blob = self
                    .store
                    .write_blob(self.config.placeholder.contents.as_bytes())?;
                self.placeholder = Some(blob);
                blob
            }
        };
        self.store.compose_tree(&[
            TreeEntry::blob(&self.config.placeholder.name, placeholder),
            TreeEntry::tree(&self.config.project_dir, inner),
        ])
    }

    fn materialize_branches(
        &self,
        index: &Index,
        releases: &Releases,
        report: &mut Report,
        summary: &mut SynthesisSummary,
    ) -> Result<()> {
        for sub in index.subhistories.values() {
            if releases.is_release(&sub.name) {
                continue;
            }
            if let Some(merged) = sub.linkage.merged_to {
                info!("{} was already merged into the main line at {}", sub.name, merged.short());
                summary.skipped_merged += 1;
                continue;
            }
            let (name, tip) = self.materialize(sub, report)?;
            summary.branches.push((name, tip));
        }
        Ok(())
    }

    /// Replay one subhistory as real commits and point a branch at the tip
    pub fn materialize(&self, sub: &Subhistory, report: &mut Report) -> Result<(String, ObjectId)> {
        let name = self.config.display_name(&sub.name);

        let mut parent = sub.linkage.branched_from;
        if let Some(reference) = self.config.branch_ancestors.get(&sub.name) {
            match self.store.resolve(reference)? {
                Some(commit) => parent = Some(commit),
                None => report.push(Issue::MissingAncestor {
                    subhistory: sub.name.clone(),
                    reference: reference.clone(),
                }),
            }
        }
        // Relinked branches get their start point afterwards
        if parent.is_none() && !self.config.is_relinked(&name) {
            report.push(Issue::NoStartPoint { branch: name.clone() });
        }

        // The first version is usually the branch point itself
        let skip = match (parent, sub.trees.first()) {
            (Some(start), Some(first)) => usize::from(self.store.commit_metadata(start)?.tree == *first),
            _ => 0,
        };
        for (i, tree) in sub.trees.iter().enumerate().skip(skip) {
            let source = sub.correlation.commit_for(i);
            parent = Some(self.recreate(*tree, parent, source, &name, report)?);
        }
        let Some(tip) = parent else {
            bail!("Subhistory {} has no content", sub.name);
        };

        self.store.create_branch(&name, tip, false)?;
        debug!("Created branch {} at {}", name, tip.short());
        Ok((name, tip))
    }

    fn recreate(
        &self,
        tree: ObjectId,
        parent: Option<ObjectId>,
        source: Option<ObjectId>,
        branch: &str,
        report: &mut Report,
    ) -> Result<ObjectId> {
        let identity = self.config.identity.signature();
        let (author, committer, message) = match source {
            Some(original) => {
                let meta = self.store.commit_metadata(original)?;
                if meta.author.is_none() {
                    report.push(Issue::MissingAuthor { commit: original });
                }
                (
                    meta.author.unwrap_or_else(|| identity.clone()),
                    meta.committer.unwrap_or(identity),
                    meta.message,
                )
            }
            None => (
                identity.clone(),
                identity,
                format!("Recreated revision of {branch}"),
            ),
        };
        self.store.create_commit(&NewCommit {
            tree,
            parents: parent.into_iter().collect(),
            message,
            author,
            committer,
        })
    }

    /// Replay the commits unique to `relink.branch` on top of
    /// `relink.onto`, keeping trees and metadata, dropping commits that
    /// would not change the tree, then move the branch. Returns false when
    /// either side is missing.
    pub fn relink(&self, relink: &Relink, report: &mut Report) -> Result<bool> {
        let Some(onto) = self.store.resolve(&relink.onto)? else {
            report.push(Issue::MissingRelinkTarget {
                branch: relink.branch.clone(),
                reference: relink.onto.clone(),
            });
            return Ok(false);
        };
        if self.store.resolve(&relink.branch)?.is_none() {
            report.push(Issue::MissingRelinkTarget {
                branch: relink.branch.clone(),
                reference: relink.branch.clone(),
            });
            return Ok(false);
        }

        let base: FxHashSet<ObjectId> = self
            .store
            .log(&relink.onto, &FxHashSet::default())?
            .into_iter()
            .collect();
        let mut own: Vec<ObjectId> = self
            .store
            .log(&relink.branch, &base)?
            .into_iter()
            .filter(|c| !base.contains(c))
            .collect();
        own.reverse();

        let mut parent = onto;
        let mut parent_tree = self.store.commit_metadata(onto)?.tree;
        for commit in own {
            let meta = self.store.commit_metadata(commit)?;
            if meta.tree == parent_tree {
                continue;
            }
            let fallback = self.config.identity.signature();
            parent = self.store.create_commit(&NewCommit {
                tree: meta.tree,
                parents: vec![parent],
                message: meta.message,
                author: meta.author.unwrap_or_else(|| fallback.clone()),
                committer: meta.committer.unwrap_or(fallback),
            })?;
            parent_tree = meta.tree;
        }

        self.store.create_branch(&relink.branch, parent, true)?;
        info!("Relinked {} onto {}", relink.branch, relink.onto);
        Ok(true)
    }
}

