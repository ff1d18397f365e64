//! `ObjectStore` backed by a git repository through libgit2

use anyhow::{Context, Result};
use git2::{ErrorCode, ObjectType, Oid, Repository, Sort};
use rustc_hash::FxHashSet;
use std::path::Path;

use crate::model::{CommitMeta, EntryKind, NewCommit, ObjectId, Signature, Timestamp, TreeEntry};

use super::store::ObjectStore;

pub struct GitStore {
    repo: Repository,
}

impl GitStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .with_context(|| format!("Failed to open git repository at {}", path.display()))?;
        Ok(Self { repo })
    }

    fn peel(&self, reference: &str) -> Result<Oid> {
        let object = self
            .repo
            .revparse_single(reference)
            .with_context(|| format!("Unknown reference {reference}"))?;
        Ok(object.peel_to_commit()?.id())
    }
}

fn to_oid(id: ObjectId) -> Result<Oid> {
    Ok(Oid::from_bytes(id.as_bytes())?)
}

fn to_id(oid: Oid) -> Result<ObjectId> {
    ObjectId::from_bytes(oid.as_bytes())
}

fn read_signature(sig: &git2::Signature<'_>) -> Option<Signature> {
    let name = String::from_utf8_lossy(sig.name_bytes()).trim().to_string();
    let email = String::from_utf8_lossy(sig.email_bytes()).trim().to_string();
    if name.is_empty() && email.is_empty() {
        return None;
    }
    let when = sig.when();
    Some(Signature {
        name,
        email,
        time: Some(Timestamp {
            seconds: when.seconds(),
            offset_minutes: when.offset_minutes(),
        }),
    })
}

fn write_signature(sig: &Signature) -> Result<git2::Signature<'static>> {
    let sig = match sig.time {
        Some(t) => git2::Signature::new(
            &sig.name,
            &sig.email,
            &git2::Time::new(t.seconds, t.offset_minutes),
        ),
        None => git2::Signature::now(&sig.name, &sig.email),
    };
    Ok(sig?)
}

impl ObjectStore for GitStore {
    fn list_refs(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for branch in self.repo.branches(None)? {
            let (branch, _) = branch?;
            let Some(name) = branch.name()? else {
                continue;
            };
            if name.starts_with(prefix) && !name.ends_with("/HEAD") {
                names.push(name.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn log(&self, reference: &str, stop: &FxHashSet<ObjectId>) -> Result<Vec<ObjectId>> {
        let tip = self.peel(reference)?;
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(tip)?;

        let mut commits = Vec::new();
        for oid in walk {
            let id = to_id(oid?)?;
            commits.push(id);
            if stop.contains(&id) {
                break;
            }
        }
        Ok(commits)
    }

    fn resolve(&self, reference: &str) -> Result<Option<ObjectId>> {
        match self.repo.revparse_single(reference) {
            Ok(object) => Ok(Some(to_id(object.peel_to_commit()?.id())?)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to resolve {reference}")),
        }
    }

    fn commit_metadata(&self, commit: ObjectId) -> Result<CommitMeta> {
        let found = self
            .repo
            .find_commit(to_oid(commit)?)
            .with_context(|| format!("Missing commit {commit}"))?;
        let parents = found.parent_ids().map(to_id).collect::<Result<Vec<_>>>()?;
        Ok(CommitMeta {
            id: commit,
            tree: to_id(found.tree_id())?,
            parents,
            author: read_signature(&found.author()),
            committer: read_signature(&found.committer()),
            message: String::from_utf8_lossy(found.message_bytes()).into_owned(),
        })
    }

    fn tree_entries(&self, tree: ObjectId) -> Result<Vec<TreeEntry>> {
        let found = self
            .repo
            .find_tree(to_oid(tree)?)
            .with_context(|| format!("Missing tree {tree}"))?;
        found
            .iter()
            .map(|entry| {
                let kind = match entry.kind() {
                    Some(ObjectType::Tree) => EntryKind::Tree,
                    Some(ObjectType::Blob) => EntryKind::Blob,
                    _ => EntryKind::Other,
                };
                Ok(TreeEntry {
                    mode: entry.filemode() as u32,
                    kind,
                    id: to_id(entry.id())?,
                    name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                })
            })
            .collect()
    }

    fn write_blob(&self, contents: &[u8]) -> Result<ObjectId> {
        to_id(self.repo.blob(contents)?)
    }

    fn compose_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId> {
        let mut builder = self.repo.treebuilder(None)?;
        for entry in entries {
            builder
                .insert(&entry.name, to_oid(entry.id)?, entry.mode as i32)
                .with_context(|| format!("Failed to add {} to tree", entry.name))?;
        }
        to_id(builder.write()?)
    }

    fn create_commit(&self, commit: &NewCommit) -> Result<ObjectId> {
        let tree = self
            .repo
            .find_tree(to_oid(commit.tree)?)
            .with_context(|| format!("Missing tree {}", commit.tree))?;
        let parents = commit
            .parents
            .iter()
            .map(|p| Ok(self.repo.find_commit(to_oid(*p)?)?))
            .collect::<Result<Vec<_>>>()?;
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        let author = write_signature(&commit.author)?;
        let committer = write_signature(&commit.committer)?;
        let oid = self
            .repo
            .commit(None, &author, &committer, &commit.message, &tree, &parent_refs)?;
        to_id(oid)
    }

    fn create_tag(&self, name: &str, commit: ObjectId) -> Result<()> {
        self.repo
            .reference(&format!("refs/tags/{name}"), to_oid(commit)?, false, "reconcile: tag")
            .with_context(|| format!("Failed to create tag {name}"))?;
        Ok(())
    }

    fn create_branch(&self, name: &str, commit: ObjectId, force: bool) -> Result<()> {
        let target = self.repo.find_commit(to_oid(commit)?)?;
        self.repo
            .branch(name, &target, force)
            .with_context(|| format!("Failed to create branch {name}"))?;
        Ok(())
    }
}
