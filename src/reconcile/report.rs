//! Conditions that need reporting but must not stop the run

use std::fmt;
use tracing::warn;

use crate::model::{ObjectId, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Handled with a documented default
    PartialData,
    /// Needs an operator decision, usually a new override entry
    NeedsAttention,
    /// One item is unusable; the rest of the run carries on
    InvariantViolation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    BranchUnreadable { branch: String, reason: String },
    SurveyFailed { commit: ObjectId, reason: String },
    Unsurveyed { commit: ObjectId, branch: String },
    IncompleteCorrelation { subhistory: String, missing: usize },
    MissingAuthor { commit: ObjectId },
    UnresolvedRelease { version: Version, subhistory: String, versions: usize },
    DuplicateRelease { version: Version, kept: String, ignored: String },
    BadVersionOverride { subhistory: String, value: String },
    MissingAncestor { subhistory: String, reference: String },
    NoStartPoint { branch: String },
    MissingRelinkTarget { branch: String, reference: String },
}

impl Issue {
    pub fn severity(&self) -> Severity {
        match self {
            Issue::BranchUnreadable { .. }
            | Issue::IncompleteCorrelation { .. }
            | Issue::MissingAuthor { .. }
            | Issue::DuplicateRelease { .. } => Severity::PartialData,
            Issue::UnresolvedRelease { .. }
            | Issue::MissingAncestor { .. }
            | Issue::NoStartPoint { .. }
            | Issue::MissingRelinkTarget { .. } => Severity::NeedsAttention,
            Issue::SurveyFailed { .. }
            | Issue::Unsurveyed { .. }
            | Issue::BadVersionOverride { .. } => Severity::InvariantViolation,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::BranchUnreadable { branch, reason } => {
                write!(f, "branch {branch} could not be walked, skipped: {reason}")
            }
            Issue::SurveyFailed { commit, reason } => {
                write!(f, "commit {} could not be surveyed: {reason}", commit.short())
            }
            Issue::Unsurveyed { commit, branch } => write!(
                f,
                "commit {} on {branch} has no survey; its content is missing from the index",
                commit.short()
            ),
            Issue::IncompleteCorrelation { subhistory, missing } => write!(
                f,
                "{subhistory}: no source commit for the newest {missing} version(s), default authorship used"
            ),
            Issue::MissingAuthor { commit } => {
                write!(f, "commit {} has no author, synthetic identity used", commit.short())
            }
            Issue::UnresolvedRelease { version, subhistory, versions } => write!(
                f,
                "release {} ({subhistory}) matches no main-line commit and has {versions} versions",
                version.tag_name()
            ),
            Issue::DuplicateRelease { version, kept, ignored } => write!(
                f,
                "release {} claimed by {kept} and {ignored}; keeping {kept}",
                version.tag_name()
            ),
            Issue::BadVersionOverride { subhistory, value } => {
                write!(f, "version override {value:?} for {subhistory} is not a version")
            }
            Issue::MissingAncestor { subhistory, reference } => {
                write!(f, "ancestor {reference} configured for {subhistory} does not exist")
            }
            Issue::NoStartPoint { branch } => {
                write!(f, "branch {branch} has no detectable start point")
            }
            Issue::MissingRelinkTarget { branch, reference } => {
                write!(f, "cannot relink {branch}: {reference} does not exist")
            }
        }
    }
}

/// Issues collected over one command
#[derive(Debug, Default)]
pub struct Report {
    issues: Vec<Issue>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue; it is logged immediately and kept for the summary
    pub fn push(&mut self, issue: Issue) {
        warn!("{issue}");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Issue> + '_ {
        self.issues.iter().filter(move |i| i.severity() == severity)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.with_severity(severity).count()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}
