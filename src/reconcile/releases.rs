//! Release reconciliation
//!
//! Picks out the subhistories that are releases, orders them by version
//! and decides for each whether it is already a main-line commit or needs
//! a synthetic one.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::ReconcileConfig;
use crate::model::{ReleaseRecord, Subhistory, Version};

use super::indexer::Index;
use super::report::{Issue, Report};

/// Output of release reconciliation
#[derive(Debug, Default, Serialize)]
pub struct Releases {
    /// Resolved releases in ascending version order
    pub records: Vec<ReleaseRecord>,
    /// Every subhistory treated as a release, resolved or not
    pub names: BTreeSet<String>,
    /// Releases left for manual attention
    pub unresolved: Vec<Version>,
}

impl Releases {
    pub fn is_release(&self, subhistory: &str) -> bool {
        self.names.contains(subhistory)
    }

    pub fn synthetic_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_synthetic()).count()
    }

    pub fn direct_count(&self) -> usize {
        self.records.len() - self.synthetic_count()
    }
}

enum Classification {
    NotRelease,
    Release(Version),
    BadOverride(String),
}

fn classify(sub: &Subhistory, config: &ReconcileConfig) -> Classification {
    if let Some(value) = config.version_overrides.get(&sub.name) {
        return match Version::parse(value) {
            Some(version) => Classification::Release(version),
            None => Classification::BadOverride(value.clone()),
        };
    }
    let Some(rest) = sub.terminal_segment().strip_prefix(config.version_prefix.as_str()) else {
        return Classification::NotRelease;
    };
    match Version::parse(rest) {
        Some(version) => Classification::Release(version),
        None => {
            // A branch off a release, e.g. v2.1-gtkfilefilters
            debug!("{} is not a release", sub.name);
            Classification::NotRelease
        }
    }
}

/// Resolve one release. The newest tree version that exists on the main
/// line wins; with no match, a single-version release becomes synthetic.
fn resolve(version: Version, sub: &Subhistory, index: &Index) -> Option<ReleaseRecord> {
    let direct = sub
        .trees
        .iter()
        .rev()
        .find_map(|tree| index.main_line.lookup(sub.kind, *tree).map(|c| (*tree, c)));

    match (direct, sub.trees.as_slice()) {
        (Some((tree, commit)), _) => Some(ReleaseRecord {
            version,
            subhistory: sub.name.clone(),
            kind: sub.kind,
            tree,
            main_commit: Some(commit),
        }),
        (None, [only]) => Some(ReleaseRecord {
            version,
            subhistory: sub.name.clone(),
            kind: sub.kind,
            tree: *only,
            main_commit: None,
        }),
        (None, _) => None,
    }
}

pub fn reconcile_releases(index: &Index, config: &ReconcileConfig, report: &mut Report) -> Releases {
    let mut releases = Releases::default();
    let mut candidates: Vec<(Version, &Subhistory)> = Vec::new();

    for sub in index.subhistories.values() {
        match classify(sub, config) {
            Classification::NotRelease => {}
            Classification::Release(version) => {
                releases.names.insert(sub.name.clone());
                candidates.push((version, sub));
            }
            Classification::BadOverride(value) => {
                releases.names.insert(sub.name.clone());
                report.push(Issue::BadVersionOverride {
                    subhistory: sub.name.clone(),
                    value,
                });
            }
        }
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));

    let mut kept: Option<(Version, String)> = None;
    for (version, sub) in candidates {
        if let Some((kept_version, kept_name)) = &kept {
            if *kept_version == version {
                report.push(Issue::DuplicateRelease {
                    version,
                    kept: kept_name.clone(),
                    ignored: sub.name.clone(),
                });
                continue;
            }
        }
        kept = Some((version.clone(), sub.name.clone()));

        match resolve(version.clone(), sub, index) {
            Some(record) => releases.records.push(record),
            None => {
                report.push(Issue::UnresolvedRelease {
                    version: version.clone(),
                    subhistory: sub.name.clone(),
                    versions: sub.trees.len(),
                });
                releases.unresolved.push(version);
            }
        }
    }

    releases
}
