// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use git2::{Oid, Repository, Signature, Time};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tagsmith::config::ReconcileConfig;
use tagsmith::model::ObjectId;
use tagsmith::repository::Database;
use tempfile::TempDir;

/// Create an in-memory test database
pub async fn create_test_db() -> Database {
    Database::new(":memory:").await.unwrap()
}

/// Create an empty temporary git repository
pub fn create_test_repo() -> (TempDir, PathBuf, Repository) {
    let dir = TempDir::new().unwrap();
    let repo_path = dir.path().to_path_buf();
    let repo = Repository::init(&repo_path).unwrap();

    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();

    (dir, repo_path, repo)
}

/// Config with the default layout and no repository-specific overrides
pub fn test_config() -> ReconcileConfig {
    ReconcileConfig::default()
}

pub fn id(oid: Oid) -> ObjectId {
    ObjectId::from_bytes(oid.as_bytes()).unwrap()
}

pub fn oid(id: ObjectId) -> Oid {
    Oid::from_bytes(id.as_bytes()).unwrap()
}

/// Write a tree from `(path, contents)` pairs; paths use `/` separators
pub fn write_tree(repo: &Repository, files: &[(&str, &str)]) -> Oid {
    let mut blobs: BTreeMap<&str, &str> = BTreeMap::new();
    let mut dirs: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for (path, contents) in files {
        match path.split_once('/') {
            Some((dir, rest)) => dirs.entry(dir).or_default().push((rest, contents)),
            None => {
                blobs.insert(path, contents);
            }
        }
    }

    let mut builder = repo.treebuilder(None).unwrap();
    for (name, contents) in blobs {
        let blob = repo.blob(contents.as_bytes()).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
    }
    for (name, children) in dirs {
        let subtree = write_tree(repo, &children);
        builder.insert(name, subtree, 0o040000).unwrap();
    }
    builder.write().unwrap()
}

/// Commit `tree` with a fixed author time and point `refs/heads/<branch>` at it
pub fn commit_tree(
    repo: &Repository,
    branch: &str,
    tree: Oid,
    parents: &[Oid],
    message: &str,
    time: i64,
) -> Oid {
    let sig = Signature::new("Test User", "test@example.com", &Time::new(time, 0)).unwrap();
    let tree = repo.find_tree(tree).unwrap();
    let parents: Vec<git2::Commit> = parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

    let commit = repo
        .commit(None, &sig, &sig, message, &tree, &parent_refs)
        .unwrap();
    repo.reference(&format!("refs/heads/{branch}"), commit, true, message)
        .unwrap();
    commit
}

/// Write `files` as a full snapshot and commit it on `branch`
pub fn commit_files(
    repo: &Repository,
    branch: &str,
    parent: Option<Oid>,
    files: &[(&str, &str)],
    message: &str,
    time: i64,
) -> Oid {
    let tree = write_tree(repo, files);
    let parents: Vec<Oid> = parent.into_iter().collect();
    commit_tree(repo, branch, tree, &parents, message, time)
}

/// Tree id of a commit
pub fn tree_of(repo: &Repository, commit: Oid) -> Oid {
    repo.find_commit(commit).unwrap().tree_id()
}

/// Commit a branch tip points at
pub fn tip(repo: &Repository, branch: &str) -> Oid {
    repo.revparse_single(branch).unwrap().peel_to_commit().unwrap().id()
}

/// Tag target, peeled to a commit
pub fn tag_target(repo: &Repository, tag: &str) -> Oid {
    repo.revparse_single(&format!("refs/tags/{tag}"))
        .unwrap()
        .peel_to_commit()
        .unwrap()
        .id()
}

/// A mirrored repository with releases and branches in every shape the
/// reconciler handles.
///
/// - `svn/trunk`: T1 (1.0 content), T2 (1.1), T3 (2.0)
/// - `svn/tags/v1.1`: straight copy of T2
/// - `svn/tags/v1.0`: orphan whose content never reached trunk
/// - `svn/tags/v0.9`: orphan bare copy of the project directory
/// - `svn/amatthies`: two commits of unmerged work on top of T1
/// - `svn/merged`: one commit whose content trunk took over in T2
pub struct MirrorFixture {
    pub dir: TempDir,
    pub path: PathBuf,
    pub repo: Repository,
    pub trunk: Vec<Oid>,
    pub tag_v11: Oid,
    pub tag_v10: Oid,
    pub tag_v09: Oid,
    pub feature: Vec<Oid>,
    pub merged: Oid,
}

pub fn mirror_fixture() -> MirrorFixture {
    let (dir, path, repo) = create_test_repo();

    let t1 = commit_files(
        &repo,
        "svn/trunk",
        None,
        &[("vice/README", "vice 1.0"), ("vice/src/main.c", "int main;")],
        "Initial import",
        1_000_000,
    );
    let t2 = commit_files(
        &repo,
        "svn/trunk",
        Some(t1),
        &[("vice/README", "vice 1.1"), ("vice/src/main.c", "int main(void);")],
        "Release 1.1",
        1_000_100,
    );
    let t3 = commit_files(
        &repo,
        "svn/trunk",
        Some(t2),
        &[("vice/README", "vice 2.0"), ("vice/src/main.c", "int main(void) {}")],
        "Start 2.0",
        1_000_200,
    );

    let tag_v11 = commit_tree(&repo, "svn/tags/v1.1", tree_of(&repo, t2), &[t2], "Tag 1.1", 1_000_150);
    let tag_v10 = commit_files(
        &repo,
        "svn/tags/v1.0",
        None,
        &[("vice/README", "vice 1.0 final"), ("vice/src/main.c", "int main;")],
        "Tag 1.0",
        1_000_050,
    );
    let tag_v09 = commit_files(
        &repo,
        "svn/tags/v0.9",
        None,
        &[("README", "vice 0.9"), ("src/main.c", "main;")],
        "Tag 0.9",
        999_000,
    );

    let f1 = commit_files(
        &repo,
        "svn/amatthies",
        Some(t1),
        &[
            ("vice/README", "vice 1.0"),
            ("vice/src/main.c", "int main;"),
            ("vice/src/sound.c", "sound"),
        ],
        "Add sound driver",
        1_000_010,
    );
    let f2 = commit_files(
        &repo,
        "svn/amatthies",
        Some(f1),
        &[
            ("vice/README", "vice 1.0"),
            ("vice/src/main.c", "int main;"),
            ("vice/src/sound.c", "sound v2"),
        ],
        "Fix sound driver",
        1_000_020,
    );

    let merged = commit_tree(&repo, "svn/merged", tree_of(&repo, t2), &[t1], "Work later merged", 1_000_030);

    MirrorFixture {
        dir,
        path,
        repo,
        trunk: vec![t1, t2, t3],
        tag_v11,
        tag_v10,
        tag_v09,
        feature: vec![f1, f2],
        merged,
    }
}
