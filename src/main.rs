mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use tagsmith::config::ReconcileConfig;
use tagsmith::reconcile::{Index, Reconciler, Releases, Report, Severity, SynthesisSummary};
use tagsmith::repository::{CheckpointBackend, CheckpointStore, ObjectStore};
use tagsmith::util::{format_count, format_timestamp};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => ReconcileConfig::load(path)?,
        None => ReconcileConfig::default(),
    };

    let checkpoint_path = match &cli.checkpoint {
        Some(path) => path.clone(),
        None => default_checkpoint_path(&cli.repo)?,
    };
    eprintln!("Using checkpoint: {}", checkpoint_path.display());
    let checkpoints = CheckpointBackend::open(&checkpoint_path).await?;

    let reconciler = Reconciler::new(&cli.repo, config).with_profile(cli.profile);
    let mut report = Report::new();

    match cli.command {
        Command::Survey => {
            let checkpoint = reconciler.survey(&checkpoints, &mut report).await?;
            eprintln!(
                "{} branches, {} surveyed commits",
                format_count(checkpoint.branch_history.len()),
                format_count(checkpoint.commit_trees.len())
            );
        }
        Command::Index { json } => {
            let checkpoint = checkpoints.load_checkpoint().await?;
            let index = reconciler.index(&checkpoint, &mut report);
            if json {
                println!("{}", serde_json::to_string_pretty(&index)?);
            } else {
                print_index(&index);
            }
        }
        Command::Reconcile => {
            let checkpoint = reconciler.survey(&checkpoints, &mut report).await?;
            let index = reconciler.index(&checkpoint, &mut report);
            let releases = reconciler.reconcile(&index, &mut report);
            print_releases(&reconciler, &releases)?;
        }
        Command::Synthesize => {
            let checkpoint = reconciler.survey(&checkpoints, &mut report).await?;
            let mut index = reconciler.index(&checkpoint, &mut report);
            let releases = reconciler.reconcile(&index, &mut report);
            let summary = reconciler.synthesize(&mut index, &releases, &mut report)?;
            print_summary(&summary);
        }
        Command::Export { path } => {
            let checkpoint = checkpoints.load_checkpoint().await?;
            checkpoint.write_json(&path).await?;
            eprintln!("Checkpoint written to {}", path.display());
        }
    }

    print_report(&report);
    if report.count(Severity::InvariantViolation) > 0 {
        std::process::exit(2);
    }
    Ok(())
}

/// Checkpoint file in the user cache dir, unique per repository path
fn default_checkpoint_path(repo: &Path) -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("tagsmith");
    fs::create_dir_all(&cache_dir)?;

    let abs_repo_path = fs::canonicalize(repo)
        .with_context(|| format!("Could not resolve path: {}", repo.display()))?;
    let repo_name = abs_repo_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo");
    let mut hasher = DefaultHasher::new();
    abs_repo_path.hash(&mut hasher);
    let hash = hasher.finish();
    Ok(cache_dir.join(format!("{}_{:016x}.db", repo_name, hash)))
}

fn print_index(index: &Index) {
    println!(
        "{:<60} {:>7} {:>6} {:>5}  {:<12} {}",
        "SUBHISTORY", "KIND", "TREES", "GAPS", "BRANCHED", "MERGED"
    );
    for sub in index.subhistories.values() {
        println!(
            "{:<60} {:>7} {:>6} {:>5}  {:<12} {}",
            sub.name,
            sub.kind.as_str(),
            sub.trees.len(),
            sub.correlation.missing(),
            sub.linkage
                .branched_from
                .map(|id| id.short())
                .unwrap_or_else(|| "-".to_string()),
            sub.linkage
                .merged_to
                .map(|id| id.short())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    println!(
        "{} subhistories, {} main-line trees indexed",
        format_count(index.subhistories.len()),
        format_count(index.main_line.len())
    );
}

fn print_releases(reconciler: &Reconciler, releases: &Releases) -> Result<()> {
    let store = reconciler.open_store()?;
    println!("{:<12} {:<8} {:<14} {:<12} {}", "VERSION", "KIND", "COMMIT", "DATE", "SOURCE");
    for record in &releases.records {
        let (commit, date) = match record.main_commit {
            Some(id) => {
                let meta = store.commit_metadata(id)?;
                let time = meta.committer.as_ref().and_then(|s| s.time);
                (id.short(), format_timestamp(time))
            }
            None => ("synthetic".to_string(), "-".to_string()),
        };
        println!(
            "{:<12} {:<8} {:<14} {:<12} {}",
            record.version.to_string(),
            record.kind.as_str(),
            commit,
            date,
            record.subhistory
        );
    }
    println!(
        "{} releases: {} on the main line, {} synthetic, {} unresolved",
        releases.records.len(),
        releases.direct_count(),
        releases.synthetic_count(),
        releases.unresolved.len()
    );
    Ok(())
}

fn print_summary(summary: &SynthesisSummary) {
    println!("Tagged {} main-line releases", summary.tagged_main);
    println!("Created {} synthetic releases", summary.synthetic_releases);
    if let Some(tip) = summary.legacy_tip {
        println!("Legacy release chain ends at {}", tip.short());
    }
    println!("Promoted {} partial installs", summary.promoted);
    println!("Skipped {} merged subhistories", summary.skipped_merged);
    for (name, tip) in &summary.branches {
        println!("  {:<60} {}", name, tip.short());
    }
    println!("Materialized {} branches, relinked {}", summary.branches.len(), summary.relinked);
}

fn print_report(report: &Report) {
    if report.is_empty() {
        return;
    }
    for severity in [Severity::InvariantViolation, Severity::NeedsAttention, Severity::PartialData] {
        let count = report.count(severity);
        if count == 0 {
            continue;
        }
        eprintln!("{:?}: {}", severity, count);
        for issue in report.with_severity(severity) {
            eprintln!("  {}", issue);
        }
    }
}
