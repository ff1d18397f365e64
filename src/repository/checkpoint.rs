//! Survey checkpoints
//!
//! The survey pass is expensive, so its results are cached between runs.
//! A checkpoint is advisory: commits already present are never surveyed
//! again, but branch histories are always re-walked because tips move.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

use crate::model::{CommitSurvey, ObjectId};

use super::Database;

/// Branch histories plus every surveyed commit.
///
/// Ordered maps keep the serialized form stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Newest-first commit list per branch, main line included
    #[serde(default)]
    pub branch_history: BTreeMap<String, Vec<ObjectId>>,
    #[serde(default)]
    pub commit_trees: BTreeMap<ObjectId, CommitSurvey>,
}

impl Checkpoint {
    /// Every commit named by any branch history, deduplicated
    pub fn unique_commits(&self) -> BTreeSet<ObjectId> {
        self.branch_history.values().flatten().copied().collect()
    }

    /// Commits in the branch histories that have no survey yet, sorted
    pub fn unsurveyed(&self) -> Vec<ObjectId> {
        self.unique_commits()
            .into_iter()
            .filter(|commit| !self.commit_trees.contains_key(commit))
            .collect()
    }

    pub fn survey(&self, commit: &ObjectId) -> Option<&CommitSurvey> {
        self.commit_trees.get(commit)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Malformed checkpoint")
    }

    /// Write to `path` via a sibling temp file so readers never see a
    /// half-written checkpoint
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let text = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    pub async fn read_json(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&text)
    }
}

/// Persistence for survey results
///
/// `append_surveys` is called once per worker batch so an interrupted
/// survey loses at most the batch in flight.
#[allow(async_fn_in_trait)]
pub trait CheckpointStore {
    async fn load_checkpoint(&self) -> Result<Checkpoint>;

    /// Replace all stored branch histories
    async fn save_branch_history(&self, history: &BTreeMap<String, Vec<ObjectId>>) -> Result<()>;

    async fn append_surveys(&self, surveys: &[(ObjectId, CommitSurvey)]) -> Result<()>;
}

/// Checkpoint kept as a single JSON document, rewritten on every append
pub struct JsonCheckpoint {
    path: PathBuf,
    state: Mutex<Checkpoint>,
}

impl JsonCheckpoint {
    /// Open `path`. A missing or unreadable file starts an empty checkpoint.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if tokio::fs::try_exists(&path).await? {
            match Checkpoint::read_json(&path).await {
                Ok(checkpoint) => checkpoint,
                Err(e) => {
                    warn!("Ignoring unreadable checkpoint {}: {e:#}", path.display());
                    Checkpoint::default()
                }
            }
        } else {
            Checkpoint::default()
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for JsonCheckpoint {
    async fn load_checkpoint(&self) -> Result<Checkpoint> {
        Ok(self.state.lock().await.clone())
    }

    async fn save_branch_history(&self, history: &BTreeMap<String, Vec<ObjectId>>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.branch_history = history.clone();
        state.write_json(&self.path).await
    }

    async fn append_surveys(&self, surveys: &[(ObjectId, CommitSurvey)]) -> Result<()> {
        if surveys.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        for (commit, survey) in surveys {
            state.commit_trees.insert(*commit, survey.clone());
        }
        state.write_json(&self.path).await
    }
}

/// Checkpoint backend chosen from the command line
pub enum CheckpointBackend {
    Sqlite(Database),
    Json(JsonCheckpoint),
}

impl CheckpointBackend {
    /// `.json` paths get the JSON backend, anything else is a SQLite file
    pub async fn open(path: &Path) -> Result<Self> {
        if path.extension().is_some_and(|ext| ext == "json") {
            return Ok(Self::Json(JsonCheckpoint::open(path).await?));
        }
        let path_str = path.to_str().context("Invalid checkpoint path encoding")?;
        let db = Database::new(path_str).await?;
        db.init_schema().await?;
        Ok(Self::Sqlite(db))
    }
}

impl CheckpointStore for CheckpointBackend {
    async fn load_checkpoint(&self) -> Result<Checkpoint> {
        match self {
            Self::Sqlite(db) => db.load_checkpoint().await,
            Self::Json(file) => file.load_checkpoint().await,
        }
    }

    async fn save_branch_history(&self, history: &BTreeMap<String, Vec<ObjectId>>) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.save_branch_history(history).await,
            Self::Json(file) => file.save_branch_history(history).await,
        }
    }

    async fn append_surveys(&self, surveys: &[(ObjectId, CommitSurvey)]) -> Result<()> {
        match self {
            Self::Sqlite(db) => db.append_surveys(surveys).await,
            Self::Json(file) => file.append_surveys(surveys).await,
        }
    }
}
