use anyhow::{Context, Result, anyhow};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, Pool, QueryBuilder, Row, Sqlite, Transaction};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::info;

use crate::model::{CommitSurvey, Install, InstallKind, ObjectId};

use super::SCHEMA_VERSION;
use super::checkpoint::{Checkpoint, CheckpointStore};

/// Multi-row INSERT chunk size; keeps bind counts under SQLite's limit
const BATCH_SIZE: usize = 5000;

/// An install row for database storage
struct InstallRecord<'a> {
    commit: [u8; 20],
    path: &'a str,
    kind: InstallKind,
    tree: [u8; 20],
}

/// SQLite-backed checkpoint store
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Configure connection options with PRAGMAs applied to every connection
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("cache_size", "-64000"); // 64MB cache

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Initialize database schema, returns true if schema was rebuilt
    pub async fn init_schema(&self) -> Result<bool> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"
        ).execute(&self.pool).await?;

        let stored_version = self.get_metadata("schema_version").await;
        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if let Some(old) = &stored_version {
                info!("Checkpoint schema changed ({} -> {}), discarding cached surveys", old, SCHEMA_VERSION);
            }
            sqlx::query("DROP TABLE IF EXISTS branch_history").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS surveyed_commits").execute(&self.pool).await?;
            sqlx::query("DROP TABLE IF EXISTS installs").execute(&self.pool).await?;
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS branch_history (
                branch TEXT NOT NULL,
                position INTEGER NOT NULL,
                oid BLOB NOT NULL,
                PRIMARY KEY (branch, position)
            )"
        ).execute(&self.pool).await?;

        // A commit with no installs still counts as surveyed
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS surveyed_commits (
                oid BLOB PRIMARY KEY
            )"
        ).execute(&self.pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS installs (
                commit_oid BLOB NOT NULL,
                path TEXT NOT NULL,
                kind TEXT NOT NULL,
                tree_oid BLOB NOT NULL,
                PRIMARY KEY (commit_oid, path)
            )"
        ).execute(&self.pool).await?;

        if needs_rebuild {
            self.set_metadata("schema_version", SCHEMA_VERSION).await?;
        }

        Ok(needs_rebuild)
    }

    async fn get_metadata(&self, key: &str) -> Option<String> {
        sqlx::query("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .map(|row| row.get("value"))
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_branch_history(&self) -> Result<BTreeMap<String, Vec<ObjectId>>> {
        let rows = sqlx::query("SELECT branch, oid FROM branch_history ORDER BY branch, position")
            .fetch_all(&self.pool)
            .await?;

        let mut history: BTreeMap<String, Vec<ObjectId>> = BTreeMap::new();
        for row in rows {
            let branch: String = row.get("branch");
            let oid: Vec<u8> = row.get("oid");
            history.entry(branch).or_default().push(ObjectId::from_bytes(&oid)?);
        }
        Ok(history)
    }

    async fn load_surveys(&self) -> Result<BTreeMap<ObjectId, CommitSurvey>> {
        let mut surveys = BTreeMap::new();

        let commits: Vec<Vec<u8>> = sqlx::query_scalar("SELECT oid FROM surveyed_commits")
            .fetch_all(&self.pool)
            .await?;
        for oid in commits {
            surveys.insert(ObjectId::from_bytes(&oid)?, CommitSurvey::new());
        }

        let rows = sqlx::query("SELECT commit_oid, path, kind, tree_oid FROM installs")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let commit = ObjectId::from_bytes(&row.get::<Vec<u8>, _>("commit_oid"))?;
            let tree = ObjectId::from_bytes(&row.get::<Vec<u8>, _>("tree_oid"))?;
            let kind_text: String = row.get("kind");
            let kind = InstallKind::parse(&kind_text)
                .ok_or_else(|| anyhow!("Unknown install kind {kind_text:?} in checkpoint"))?;
            let path: String = row.get("path");
            surveys
                .entry(commit)
                .or_insert_with(CommitSurvey::new)
                .record(path, Install::new(kind, tree));
        }

        Ok(surveys)
    }

    async fn save_branch_history_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        history: &BTreeMap<String, Vec<ObjectId>>,
    ) -> Result<()> {
        sqlx::query("DELETE FROM branch_history").execute(&mut **tx).await?;

        let rows: Vec<(&str, i64, &ObjectId)> = history
            .iter()
            .flat_map(|(branch, commits)| {
                commits
                    .iter()
                    .enumerate()
                    .map(move |(i, oid)| (branch.as_str(), i as i64, oid))
            })
            .collect();

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO branch_history (branch, position, oid) "
            );
            qb.push_values(chunk, |mut row, (branch, position, oid)| {
                row.push_bind(*branch)
                    .push_bind(*position)
                    .push_bind(oid.as_bytes().as_slice());
            });
            qb.build().execute(&mut **tx).await?;
        }

        Ok(())
    }

    async fn mark_surveyed_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        commits: &[[u8; 20]],
    ) -> Result<()> {
        for chunk in commits.chunks(BATCH_SIZE) {
            if chunk.is_empty() {
                continue;
            }

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO surveyed_commits (oid) "
            );
            qb.push_values(chunk, |mut row, oid| {
                row.push_bind(oid.as_slice());
            });
            qb.build().execute(&mut **tx).await?;
        }

        Ok(())
    }

    async fn save_installs_in_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        installs: &[InstallRecord<'_>],
    ) -> Result<()> {
        for chunk in installs.chunks(BATCH_SIZE) {
            if chunk.is_empty() {
                continue;
            }

            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT OR REPLACE INTO installs (commit_oid, path, kind, tree_oid) "
            );
            qb.push_values(chunk, |mut row, record| {
                row.push_bind(record.commit.as_slice())
                    .push_bind(record.path)
                    .push_bind(record.kind.as_str())
                    .push_bind(record.tree.as_slice());
            });
            qb.build().execute(&mut **tx).await?;
        }

        Ok(())
    }
}

impl CheckpointStore for Database {
    async fn load_checkpoint(&self) -> Result<Checkpoint> {
        Ok(Checkpoint {
            branch_history: self.load_branch_history().await?,
            commit_trees: self.load_surveys().await?,
        })
    }

    async fn save_branch_history(&self, history: &BTreeMap<String, Vec<ObjectId>>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        self.save_branch_history_in_tx(&mut tx, history).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Installs and the surveyed marker land in ONE transaction
    async fn append_surveys(&self, surveys: &[(ObjectId, CommitSurvey)]) -> Result<()> {
        if surveys.is_empty() {
            return Ok(());
        }

        let commits: Vec<[u8; 20]> = surveys.iter().map(|(oid, _)| *oid.as_bytes()).collect();
        let installs: Vec<InstallRecord<'_>> = surveys
            .iter()
            .flat_map(|(commit, survey)| {
                survey.iter().map(move |(path, install)| InstallRecord {
                    commit: *commit.as_bytes(),
                    path,
                    kind: install.kind(),
                    tree: *install.tree().as_bytes(),
                })
            })
            .collect();

        let mut tx = self.pool.begin().await?;
        self.save_installs_in_tx(&mut tx, &installs).await?;
        self.mark_surveyed_in_tx(&mut tx, &commits).await?;
        tx.commit().await?;
        Ok(())
    }
}
