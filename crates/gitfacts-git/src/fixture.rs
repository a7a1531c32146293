//! Builds small repositories with controlled contents and author times.
//!
//! Used by the integration tests of this crate and of the crates above it.

use gitfacts_core::{GitfactsError, ObjectId};
use git2::{Oid, Signature, Time};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{git_err, object_id, oid};

pub const AUTHOR_NAME: &str = "Test Author";
pub const AUTHOR_EMAIL: &str = "author@example.com";

/// Writes commits straight into the object database, without a work tree.
pub struct RepoBuilder {
    repo: git2::Repository,
}

enum Node<'a> {
    File(&'a [u8]),
    Dir(BTreeMap<&'a str, Node<'a>>),
}

impl RepoBuilder {
    /// `git init` at `path`.
    pub fn init(path: &Path) -> Result<Self, GitfactsError> {
        let repo = git2::Repository::init(path).map_err(git_err("failed to init repository"))?;
        Ok(Self { repo })
    }

    /// Commit a snapshot of `files` on top of HEAD, authored at `when`
    /// (unix seconds, UTC).
    pub fn commit(&self, message: &str, when: i64, files: &[(&str, &str)]) -> Result<ObjectId, GitfactsError> {
        let parents = self.head()?.into_iter().collect::<Vec<_>>();
        self.write(Some("HEAD"), message, Time::new(when, 0), &parents, files)
    }

    /// Commit with an explicit author offset in minutes east of UTC.
    pub fn commit_at(
        &self,
        message: &str,
        when: i64,
        offset_minutes: i32,
        files: &[(&str, &str)],
    ) -> Result<ObjectId, GitfactsError> {
        let parents = self.head()?.into_iter().collect::<Vec<_>>();
        self.write(Some("HEAD"), message, Time::new(when, offset_minutes), &parents, files)
    }

    /// Commit on the given parents without moving HEAD.
    pub fn commit_detached(
        &self,
        message: &str,
        when: i64,
        parents: &[ObjectId],
        files: &[(&str, &str)],
    ) -> Result<ObjectId, GitfactsError> {
        self.write(None, message, Time::new(when, 0), parents, files)
    }

    /// Merge `other` into HEAD.
    pub fn merge(&self, message: &str, when: i64, other: ObjectId, files: &[(&str, &str)]) -> Result<ObjectId, GitfactsError> {
        let mut parents = self.head()?.into_iter().collect::<Vec<_>>();
        parents.push(other);
        self.write(Some("HEAD"), message, Time::new(when, 0), &parents, files)
    }

    /// Store a blob that no tree references.
    pub fn blob(&self, content: &[u8]) -> Result<ObjectId, GitfactsError> {
        object_id(self.repo.blob(content).map_err(git_err("failed to write blob"))?)
    }

    /// Root tree id of a commit.
    pub fn tree_of(&self, commit: ObjectId) -> Result<ObjectId, GitfactsError> {
        let commit = self
            .repo
            .find_commit(oid(&commit)?)
            .map_err(git_err("failed to read commit"))?;
        object_id(commit.tree_id())
    }

    fn head(&self) -> Result<Option<ObjectId>, GitfactsError> {
        match self.repo.head() {
            Ok(reference) => {
                let commit = reference
                    .peel_to_commit()
                    .map_err(git_err("failed to resolve HEAD"))?;
                object_id(commit.id()).map(Some)
            }
            Err(_) => Ok(None),
        }
    }

    fn write(
        &self,
        update_ref: Option<&str>,
        message: &str,
        time: Time,
        parents: &[ObjectId],
        files: &[(&str, &str)],
    ) -> Result<ObjectId, GitfactsError> {
        let mut root = BTreeMap::new();
        for (path, content) in files {
            insert(&mut root, path, content.as_bytes());
        }
        let tree_id = self.write_tree(&root).map_err(git_err("failed to write tree"))?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(git_err("failed to read tree"))?;

        let signature =
            Signature::new(AUTHOR_NAME, AUTHOR_EMAIL, &time).map_err(git_err("invalid signature"))?;
        let parents = parents
            .iter()
            .map(|id| {
                self.repo
                    .find_commit(oid(id)?)
                    .map_err(git_err("failed to read parent"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let parent_refs = parents.iter().collect::<Vec<_>>();

        let id = self
            .repo
            .commit(update_ref, &signature, &signature, message, &tree, &parent_refs)
            .map_err(git_err("failed to write commit"))?;
        object_id(id)
    }

    fn write_tree(&self, dir: &BTreeMap<&str, Node<'_>>) -> Result<Oid, git2::Error> {
        let mut builder = self.repo.treebuilder(None)?;
        for (name, node) in dir {
            match node {
                Node::File(content) => {
                    let id = self.repo.blob(content)?;
                    builder.insert(*name, id, 0o100644)?;
                }
                Node::Dir(children) => {
                    let id = self.write_tree(children)?;
                    builder.insert(*name, id, 0o040000)?;
                }
            }
        }
        builder.write()
    }
}

fn insert<'a>(dir: &mut BTreeMap<&'a str, Node<'a>>, path: &'a str, content: &'a [u8]) {
    match path.split_once('/') {
        None => {
            dir.insert(path, Node::File(content));
        }
        Some((head, rest)) => {
            let child = dir
                .entry(head)
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            if let Node::Dir(children) = child {
                insert(children, rest, content);
            }
        }
    }
}
