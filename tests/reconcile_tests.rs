// End-to-end reconciliation tests
// Full pipeline from a mirrored repository to tags and branches

mod common;

use common::{id, oid};
use tagsmith::model::{Correlation, InstallKind, Linkage, Subhistory, Version};
use tagsmith::reconcile::{Issue, Reconciler, Report, Severity, Synthesizer};
use tagsmith::repository::{Database, GitStore, JsonCheckpoint, ObjectStore};
use tempfile::TempDir;

/// Create a test database in a temp directory
async fn create_db_in_dir(dir: &TempDir) -> Database {
    let db_path = dir.path().join("checkpoint.db");
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    db.init_schema().await.unwrap();
    db
}

fn version(s: &str) -> Version {
    Version::parse(s).unwrap()
}

#[tokio::test]
async fn test_index_finds_every_subhistory() {
    let fx = common::mirror_fixture();
    let db = common::create_test_db().await;
    db.init_schema().await.unwrap();

    let reconciler = Reconciler::quiet(&fx.path, common::test_config());
    let mut report = Report::new();
    let checkpoint = reconciler.survey(&db, &mut report).await.unwrap();
    let index = reconciler.index(&checkpoint, &mut report);

    let names: Vec<&str> = index.subhistories.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "svn/amatthies/",
            "svn/merged/",
            "svn/tags/v0.9/",
            "svn/tags/v1.0/",
            "svn/tags/v1.1/",
        ]
    );

    let feature = &index.subhistories["svn/amatthies/"];
    assert_eq!(feature.kind, InstallKind::Full);
    assert_eq!(feature.trees.len(), 3);
    assert_eq!(feature.linkage.branched_from, Some(id(fx.trunk[0])));
    assert_eq!(feature.linkage.merged_to, None);
    assert!(feature.correlation.is_complete());
    assert_eq!(feature.correlation.commits[2], id(fx.feature[1]));

    let merged = &index.subhistories["svn/merged/"];
    assert_eq!(merged.linkage.merged_to, Some(id(fx.trunk[1])));

    let bare = &index.subhistories["svn/tags/v0.9/"];
    assert_eq!(bare.kind, InstallKind::Partial);

    assert!(report.is_empty(), "unexpected issues: {:?}", report.issues());
}

#[tokio::test]
async fn test_release_table() {
    let fx = common::mirror_fixture();
    let dir = TempDir::new().unwrap();
    let db = create_db_in_dir(&dir).await;

    let reconciler = Reconciler::quiet(&fx.path, common::test_config());
    let mut report = Report::new();
    let checkpoint = reconciler.survey(&db, &mut report).await.unwrap();
    let index = reconciler.index(&checkpoint, &mut report);
    let releases = reconciler.reconcile(&index, &mut report);

    let versions: Vec<Version> = releases.records.iter().map(|r| r.version.clone()).collect();
    assert_eq!(versions, vec![version("0.9"), version("1.0"), version("1.1")]);

    assert!(releases.records[0].is_synthetic());
    assert_eq!(releases.records[0].kind, InstallKind::Partial);
    assert!(releases.records[1].is_synthetic());
    assert_eq!(releases.records[2].main_commit, Some(id(fx.trunk[1])));

    assert_eq!(releases.synthetic_count(), 2);
    assert_eq!(releases.direct_count(), 1);
    assert!(releases.unresolved.is_empty());
    assert!(releases.is_release("svn/tags/v1.0/"));
    assert!(!releases.is_release("svn/amatthies/"));
}

#[tokio::test]
async fn test_synthesize_writes_tags_and_branches() {
    let fx = common::mirror_fixture();
    let dir = TempDir::new().unwrap();
    let db = create_db_in_dir(&dir).await;

    let config = common::test_config();
    let reconciler = Reconciler::quiet(&fx.path, config.clone());
    let mut report = Report::new();
    let checkpoint = reconciler.survey(&db, &mut report).await.unwrap();
    let mut index = reconciler.index(&checkpoint, &mut report);
    let releases = reconciler.reconcile(&index, &mut report);
    let summary = reconciler
        .synthesize(&mut index, &releases, &mut report)
        .unwrap();

    assert_eq!(summary.tagged_main, 1);
    assert_eq!(summary.synthetic_releases, 2);
    assert_eq!(summary.promoted, 1);
    assert_eq!(summary.skipped_merged, 1);
    assert_eq!(summary.branches.len(), 1);
    assert_eq!(summary.branches[0].0, "amatthies");

    let repo = &fx.repo;

    // Main-line release is tagged in place
    assert_eq!(common::tag_target(repo, "release/v1.1"), fx.trunk[1]);

    // Synthetic releases form one lineage, oldest version first
    let v09 = repo.find_commit(common::tag_target(repo, "release/v0.9")).unwrap();
    let v10 = repo.find_commit(common::tag_target(repo, "release/v1.0")).unwrap();
    assert_eq!(v09.parent_count(), 0);
    assert_eq!(v10.parent_ids().collect::<Vec<_>>(), vec![v09.id()]);
    assert_eq!(v10.message(), Some("Legacy release v1.0"));
    assert_eq!(v10.author().name(), Some(config.identity.name.as_str()));
    assert_eq!(v10.tree_id(), common::tree_of(repo, fx.tag_v10));
    assert_eq!(common::tip(repo, "legacy_releases"), v10.id());

    // The bare copy was wrapped into a full tree
    let wrapped = v09.tree().unwrap();
    assert!(wrapped.get_name("svn-instructions.txt").is_some());
    let inner = wrapped.get_name("vice").unwrap();
    assert_eq!(inner.id(), common::tree_of(repo, fx.tag_v09));

    // The unmerged branch is rebuilt on top of its branch point
    let tip = repo.find_commit(common::tip(repo, "amatthies")).unwrap();
    assert_eq!(tip.message(), Some("Fix sound driver"));
    assert_eq!(tip.author().name(), Some("Test User"));
    assert_eq!(tip.author().when().seconds(), 1_000_020);
    assert_eq!(tip.tree_id(), common::tree_of(repo, fx.feature[1]));
    // The branch point's own content is not recreated on top of itself
    let mut walk = tip;
    for _ in 0..2 {
        walk = walk.parent(0).unwrap();
    }
    assert_eq!(walk.id(), fx.trunk[0]);

    // Merged work is not recreated
    assert!(repo.revparse_single("merged").is_err());
    assert_eq!(report.count(Severity::InvariantViolation), 0);
}

#[tokio::test]
async fn test_synthesize_refuses_second_run() {
    let fx = common::mirror_fixture();
    let db = common::create_test_db().await;
    db.init_schema().await.unwrap();

    let reconciler = Reconciler::quiet(&fx.path, common::test_config());
    let mut report = Report::new();
    let checkpoint = reconciler.survey(&db, &mut report).await.unwrap();
    let mut index = reconciler.index(&checkpoint, &mut report);
    let releases = reconciler.reconcile(&index, &mut report);
    reconciler
        .synthesize(&mut index, &releases, &mut report)
        .unwrap();

    let mut index = reconciler.index(&checkpoint, &mut report);
    let err = reconciler
        .synthesize(&mut index, &releases, &mut report)
        .unwrap_err();
    assert!(err.to_string().contains("already reconciled"));
}

#[tokio::test]
async fn test_branch_ancestor_override() {
    let fx = common::mirror_fixture();
    let db = common::create_test_db().await;
    db.init_schema().await.unwrap();

    let mut config = common::test_config();
    config
        .branch_ancestors
        .insert("svn/amatthies/".to_string(), "release/v1.1".to_string());
    let reconciler = Reconciler::quiet(&fx.path, config);
    let mut report = Report::new();
    let checkpoint = reconciler.survey(&db, &mut report).await.unwrap();
    let mut index = reconciler.index(&checkpoint, &mut report);
    let releases = reconciler.reconcile(&index, &mut report);
    reconciler
        .synthesize(&mut index, &releases, &mut report)
        .unwrap();

    let repo = &fx.repo;
    let mut walk = repo.find_commit(common::tip(repo, "amatthies")).unwrap();
    for _ in 0..3 {
        walk = walk.parent(0).unwrap();
    }
    assert_eq!(walk.id(), fx.trunk[1]);
}

#[tokio::test]
async fn test_relink_replays_onto_target() {
    let (_dir, path, repo) = common::create_test_repo();

    let a1 = common::commit_files(&repo, "base", None, &[("f", "1")], "a1", 100);
    let a2 = common::commit_files(&repo, "base", Some(a1), &[("f", "2")], "a2", 200);
    // Same content as the tip of base, history link lost
    let p1 = common::commit_files(&repo, "topic", None, &[("f", "2")], "p1", 300);
    common::commit_files(&repo, "topic", Some(p1), &[("f", "3")], "p2", 400);

    let mut config = common::test_config();
    config.relinks.push(tagsmith::config::Relink {
        branch: "topic".to_string(),
        onto: "base".to_string(),
    });

    let store = GitStore::open(&path).unwrap();
    let synthesizer = tagsmith::reconcile::Synthesizer::new(&store, &config);
    let mut report = Report::new();
    assert!(synthesizer.relink(&config.relinks[0], &mut report).unwrap());

    let tip = repo.find_commit(common::tip(&repo, "topic")).unwrap();
    assert_eq!(tip.message(), Some("p2"));
    assert_eq!(tip.parent_ids().collect::<Vec<_>>(), vec![a2]);
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_relink_missing_target_is_reported() {
    let (_dir, path, repo) = common::create_test_repo();
    common::commit_files(&repo, "topic", None, &[("f", "1")], "p1", 100);

    let config = common::test_config();
    let relink = tagsmith::config::Relink {
        branch: "topic".to_string(),
        onto: "nowhere".to_string(),
    };

    let store = GitStore::open(&path).unwrap();
    let synthesizer = tagsmith::reconcile::Synthesizer::new(&store, &config);
    let mut report = Report::new();
    assert!(!synthesizer.relink(&relink, &mut report).unwrap());
    assert_eq!(report.count(Severity::NeedsAttention), 1);
}

#[tokio::test]
async fn test_json_checkpoint_pipeline() {
    let fx = common::mirror_fixture();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("checkpoint.json");

    let reconciler = Reconciler::quiet(&fx.path, common::test_config());
    let mut report = Report::new();
    let checkpoints = JsonCheckpoint::open(&path).await.unwrap();
    let first = reconciler.survey(&checkpoints, &mut report).await.unwrap();
    let first_text = std::fs::read_to_string(&path).unwrap();

    // A second run over an unchanged repository surveys nothing new and
    // leaves the file byte-identical
    let checkpoints = JsonCheckpoint::open(&path).await.unwrap();
    let second = reconciler.survey(&checkpoints, &mut report).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), first_text);

    let store = GitStore::open(&fx.path).unwrap();
    let tip = store.resolve("svn/trunk").unwrap().unwrap();
    assert_eq!(oid(tip), fx.trunk[2]);
    assert!(second.survey(&tip).is_some());
}

#[tokio::test]
async fn test_synthetic_releases_chain_in_version_order() {
    let (_dir, path, repo) = common::create_test_repo();
    let c1 = common::commit_files(&repo, "svn/trunk", None, &[("vice/README", "a")], "c1", 100);
    let c2 = common::commit_files(&repo, "svn/trunk", Some(c1), &[("vice/README", "b")], "c2", 200);
    common::commit_files(&repo, "svn/tags/v1.1", None, &[("vice/README", "1.1")], "tag", 300);
    common::commit_files(&repo, "svn/tags/v1.0", None, &[("vice/README", "1.0")], "tag", 310);
    common::commit_tree(&repo, "svn/tags/v3.0", common::tree_of(&repo, c2), &[c2], "tag", 320);

    let reconciler = Reconciler::quiet(&path, common::test_config());
    let db = common::create_test_db().await;
    db.init_schema().await.unwrap();
    let mut report = Report::new();
    let checkpoint = reconciler.survey(&db, &mut report).await.unwrap();
    let mut index = reconciler.index(&checkpoint, &mut report);
    let releases = reconciler.reconcile(&index, &mut report);
    let summary = reconciler
        .synthesize(&mut index, &releases, &mut report)
        .unwrap();

    assert_eq!(summary.synthetic_releases, 2);
    assert_eq!(summary.tagged_main, 1);
    assert!(summary.branches.is_empty());

    assert_eq!(common::tag_target(&repo, "release/v3.0"), c2);

    let v10 = repo.find_commit(common::tag_target(&repo, "release/v1.0")).unwrap();
    let v11 = repo.find_commit(common::tag_target(&repo, "release/v1.1")).unwrap();
    assert_eq!(v10.parent_count(), 0);
    assert_eq!(v11.parent_ids().collect::<Vec<_>>(), vec![v10.id()]);
    assert_eq!(v11.message(), Some("Legacy release v1.1"));
    assert_eq!(common::tip(&repo, "legacy_releases"), v11.id());
}

#[test]
fn test_branch_history_stops_at_main_line() {
    use rustc_hash::FxHashSet;
    use tagsmith::reconcile::branch_history;

    let fx = common::mirror_fixture();
    let store = GitStore::open(&fx.path).unwrap();

    let main = branch_history(&store, "svn/trunk", &FxHashSet::default()).unwrap();
    assert_eq!(
        main,
        fx.trunk.iter().rev().map(|c| id(*c)).collect::<Vec<_>>()
    );

    let terminators: FxHashSet<_> = main.iter().copied().collect();
    let feature = branch_history(&store, "svn/amatthies", &terminators).unwrap();
    assert_eq!(
        feature,
        vec![id(fx.feature[1]), id(fx.feature[0]), id(fx.trunk[0])]
    );

    let refs = store.list_refs("svn/").unwrap();
    assert_eq!(
        refs,
        vec![
            "svn/amatthies",
            "svn/merged",
            "svn/tags/v0.9",
            "svn/tags/v1.0",
            "svn/tags/v1.1",
            "svn/trunk",
        ]
    );
}

#[tokio::test]
async fn test_partial_branch_is_promoted_and_materialized() {
    let (_dir, path, repo) = common::create_test_repo();
    let t1 = common::commit_files(
        &repo,
        "svn/trunk",
        None,
        &[("vice/README", "vice 1.0"), ("vice/src/main.c", "int main;")],
        "import",
        100,
    );
    // A bare copy of the project directory, edited twice
    let b1 = common::commit_files(
        &repo,
        "svn/fab",
        Some(t1),
        &[("gtk/README", "vice 1.0"), ("gtk/src/main.c", "int main;")],
        "copy",
        200,
    );
    let b2 = common::commit_files(
        &repo,
        "svn/fab",
        Some(b1),
        &[("gtk/README", "vice 1.0"), ("gtk/src/main.c", "int main;"), ("gtk/x.c", "x1")],
        "add x",
        300,
    );
    let b3 = common::commit_files(
        &repo,
        "svn/fab",
        Some(b2),
        &[("gtk/README", "vice 1.0"), ("gtk/src/main.c", "int main;"), ("gtk/x.c", "x2")],
        "edit x",
        400,
    );

    let reconciler = Reconciler::quiet(&path, common::test_config());
    let db = common::create_test_db().await;
    db.init_schema().await.unwrap();
    let mut report = Report::new();
    let checkpoint = reconciler.survey(&db, &mut report).await.unwrap();
    let mut index = reconciler.index(&checkpoint, &mut report);

    let sub = &index.subhistories["svn/fab/gtk/"];
    assert_eq!(sub.kind, InstallKind::Partial);
    assert_eq!(sub.trees.len(), 3);
    assert_eq!(sub.linkage.branched_from, Some(id(t1)));

    let releases = reconciler.reconcile(&index, &mut report);
    let summary = reconciler
        .synthesize(&mut index, &releases, &mut report)
        .unwrap();
    assert_eq!(summary.promoted, 1);
    assert_eq!(summary.branches.len(), 1);
    assert_eq!(summary.branches[0].0, "fab/gtk");

    let tip = repo.find_commit(common::tip(&repo, "fab/gtk")).unwrap();
    assert_eq!(tip.message(), Some("edit x"));
    let tree = tip.tree().unwrap();
    let names: Vec<_> = tree.iter().map(|e| e.name().unwrap().to_string()).collect();
    assert_eq!(names, vec!["svn-instructions.txt", "vice"]);
    let b3_gtk = repo.find_commit(b3).unwrap().tree().unwrap().get_name("gtk").unwrap().id();
    assert_eq!(tree.get_name("vice").unwrap().id(), b3_gtk);

    let mut walk = tip;
    for _ in 0..3 {
        walk = walk.parent(0).unwrap();
    }
    assert_eq!(walk.id(), t1);
    assert_eq!(report.count(Severity::InvariantViolation), 0);
}

#[test]
fn test_materialize_falls_back_to_synthetic_identity() {
    let (_dir, path, repo) = common::create_test_repo();
    let first = common::write_tree(&repo, &[("vice/README", "one")]);
    let second = common::write_tree(&repo, &[("vice/README", "two")]);
    let source = common::commit_tree(&repo, "svn/lost", first, &[], "only surviving commit", 500);

    // The second version has no matching source commit
    let sub = Subhistory {
        name: "svn/lost/".to_string(),
        branch: "svn/lost".to_string(),
        path: "/".to_string(),
        kind: InstallKind::Full,
        trees: vec![id(first), id(second)],
        linkage: Linkage::default(),
        correlation: Correlation {
            commits: vec![id(source)],
            expected: 2,
        },
    };

    let config = common::test_config();
    let store = GitStore::open(&path).unwrap();
    let synthesizer = Synthesizer::new(&store, &config);
    let mut report = Report::new();
    let (name, tip) = synthesizer.materialize(&sub, &mut report).unwrap();
    assert_eq!(name, "lost");

    let tip = repo.find_commit(oid(tip)).unwrap();
    assert_eq!(tip.tree_id(), second);
    assert_eq!(tip.message(), Some("Recreated revision of lost"));
    assert_eq!(tip.author().name(), Some(config.identity.name.as_str()));
    assert_eq!(tip.committer().email(), Some(config.identity.email.as_str()));

    let root = tip.parent(0).unwrap();
    assert_eq!(root.parent_count(), 0);
    assert_eq!(root.tree_id(), first);
    assert_eq!(root.message(), Some("only surviving commit"));
    assert_eq!(root.author().name(), Some("Test User"));
    assert_eq!(root.author().when().seconds(), 500);

    assert_eq!(
        report.issues(),
        &[Issue::NoStartPoint {
            branch: "lost".to_string()
        }]
    );
}

#[test]
fn test_materialize_commit_without_author() {
    let (_dir, path, repo) = common::create_test_repo();
    let trunk = common::commit_files(&repo, "svn/trunk", None, &[("vice/README", "base")], "base", 100);
    let tree = common::write_tree(&repo, &[("vice/README", "anonymous")]);

    // Imported commit whose author and committer are blank
    let raw = format!(
        "tree {tree}\nparent {trunk}\nauthor  <> 200 +0000\ncommitter  <> 200 +0000\n\nanonymous change\n"
    );
    let anonymous = repo
        .odb()
        .unwrap()
        .write(git2::ObjectType::Commit, raw.as_bytes())
        .unwrap();

    let sub = Subhistory {
        name: "svn/anon/".to_string(),
        branch: "svn/anon".to_string(),
        path: "/".to_string(),
        kind: InstallKind::Full,
        trees: vec![id(tree)],
        linkage: Linkage {
            branched_from: Some(id(trunk)),
            merged_to: None,
        },
        correlation: Correlation {
            commits: vec![id(anonymous)],
            expected: 1,
        },
    };

    let config = common::test_config();
    let store = GitStore::open(&path).unwrap();
    let synthesizer = Synthesizer::new(&store, &config);
    let mut report = Report::new();
    let (_, tip) = synthesizer.materialize(&sub, &mut report).unwrap();

    let tip = repo.find_commit(oid(tip)).unwrap();
    assert_eq!(tip.message(), Some("anonymous change\n"));
    assert_eq!(tip.author().name(), Some(config.identity.name.as_str()));
    assert_eq!(tip.parent_ids().collect::<Vec<_>>(), vec![trunk]);
    assert_eq!(
        report.issues(),
        &[Issue::MissingAuthor {
            commit: id(anonymous)
        }]
    );
}
